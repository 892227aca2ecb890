//! IMAP IDLE command support (RFC 2177).
//!
//! IDLE allows the client to receive real-time notifications from the server
//! about mailbox changes without polling. A wait that ends without an event
//! is reported as [`IdleOutcome::Timeout`], not as an error, so callers
//! simply issue IDLE again.

use std::time::Duration;

use tracing::debug;

use super::client::{Client, SessionState, check_completion};
use crate::command::Command;
use crate::parser::Response;
use crate::types::Status;
use crate::{Error, Result};

/// Longest time to stay in one IDLE command (28 minutes, under the
/// 30 minute server inactivity limit of RFC 2177).
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(1680);

/// Mailbox change reported during IDLE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleEvent {
    /// New message count (EXISTS response).
    Exists(u32),
    /// Recent count changed.
    Recent(u32),
    /// Message expunged (EXPUNGE response).
    Expunge(u32),
    /// Message flags changed (FETCH response).
    Fetch(u32),
}

impl IdleEvent {
    fn from_response(response: &Response) -> Option<Self> {
        let n = response.number?;
        match response.kind.as_str() {
            "EXISTS" => Some(Self::Exists(n)),
            "RECENT" => Some(Self::Recent(n)),
            "EXPUNGE" => Some(Self::Expunge(n)),
            "FETCH" => Some(Self::Fetch(n)),
            _ => None,
        }
    }
}

/// How an IDLE wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleOutcome {
    /// The server reported a change.
    Event(IdleEvent),
    /// Nothing happened before the wait ran out.
    Timeout,
}

impl Client {
    /// Runs one IDLE command: waits for the continuation, then up to `wait`
    /// for a mailbox change, then sends DONE and reads the tagged
    /// completion.
    ///
    /// # Example
    ///
    /// ```ignore
    /// loop {
    ///     match client.idle(IDLE_TIMEOUT).await? {
    ///         IdleOutcome::Event(event) => break,
    ///         IdleOutcome::Timeout => continue,
    ///     }
    /// }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a protocol error outside the selected state or if the server
    /// refuses IDLE, [`Error::Bye`] if the server disconnects, or a
    /// transport error (including an abort).
    pub async fn idle(&mut self, wait: Duration) -> Result<IdleOutcome> {
        self.require_selected("IDLE")?;

        let tag = self.tag_gen.next();
        debug!(command = %Command::Idle.redacted(&tag), "C:");
        self.stream
            .write_command(&Command::Idle.serialize(&tag))
            .await?;

        // Wait for continuation response
        loop {
            let response = Response::parse(&self.stream.read_response().await?)?;
            if response.is_continuation() {
                break;
            }
            if response.is_untagged() {
                self.check_untagged(&response)?;
                continue;
            }
            if response.tag == tag {
                check_completion(&response)?;
                return Err(Error::Protocol("IDLE completed without continuation".to_string()));
            }
            return Err(Error::Protocol(format!(
                "unexpected tag {} during IDLE",
                response.tag
            )));
        }

        let outcome = loop {
            let line = match self.stream.read_response_within(wait).await {
                Ok(line) => line,
                Err(Error::Net(mailwatch_net::Error::Timeout { .. })) => {
                    debug!(?wait, "IDLE wait elapsed");
                    break IdleOutcome::Timeout;
                }
                Err(e) => return Err(e),
            };
            let response = Response::parse(&line)?;
            if response.tag == tag {
                // server ended IDLE on its own
                check_completion(&response)?;
                return Ok(IdleOutcome::Timeout);
            }
            if !response.is_untagged() {
                return Err(Error::Protocol(format!(
                    "unexpected tag {} during IDLE",
                    response.tag
                )));
            }
            self.check_untagged(&response)?;
            if let Some(event) = IdleEvent::from_response(&response) {
                debug!(?event, "IDLE event");
                break IdleOutcome::Event(event);
            }
        };

        self.done(&tag).await?;
        Ok(outcome)
    }

    /// Ends IDLE and drains responses up to the tagged completion.
    async fn done(&mut self, tag: &str) -> Result<()> {
        self.stream
            .write_command(&Command::Done.serialize(""))
            .await?;

        loop {
            let response = Response::parse(&self.stream.read_response().await?)?;
            if response.tag == tag {
                return check_completion(&response);
            }
            if response.is_untagged() {
                if response.status() == Some(Status::Bye) && self.state != SessionState::Logout {
                    return Err(Error::Bye(response.text()));
                }
                // Ignore untagged responses that may arrive before the tagged response
                continue;
            }
            return Err(Error::Protocol(format!(
                "unexpected tag {} after DONE",
                response.tag
            )));
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use mailwatch_net::{AbortHandle, AbortSignal, Timeouts, Transport};
    use tokio_test::io::Builder;

    use super::*;
    use crate::command::TagGenerator;
    use crate::connection::Config;
    use crate::types::Mailbox;

    async fn selected(mock: tokio_test::io::Mock, abort: AbortSignal) -> Client {
        let transport = Transport::from_socket(mock, Timeouts::default(), abort);
        let mut client = Client::from_transport(transport, Config::new("imap.example.com"))
            .await
            .unwrap();
        client.tag_gen = TagGenerator::with_seed(0);
        client.examine(&Mailbox::inbox()).await.unwrap();
        client
    }

    fn preamble(builder: &mut Builder) -> &mut Builder {
        builder
            .read(b"* PREAUTH ready\r\n")
            .write(b"AAAA EXAMINE INBOX\r\n")
            .read(b"AAAA OK done\r\n")
    }

    #[test]
    fn test_idle_ceiling() {
        assert_eq!(IDLE_TIMEOUT.as_secs(), 1680);
    }

    #[tokio::test]
    async fn test_idle_event() {
        let mut builder = Builder::new();
        preamble(&mut builder)
            .write(b"AAAB IDLE\r\n")
            .read(b"+ idling\r\n")
            .read(b"* OK still here\r\n")
            .read(b"* 5 EXISTS\r\n")
            .write(b"DONE\r\n")
            .read(b"* 1 RECENT\r\nAAAB OK IDLE terminated\r\n");
        let mut client = selected(builder.build(), AbortSignal::never()).await;

        let outcome = client.idle(IDLE_TIMEOUT).await.unwrap();
        assert_eq!(outcome, IdleOutcome::Event(IdleEvent::Exists(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout_is_not_an_error() {
        let mut builder = Builder::new();
        preamble(&mut builder)
            .write(b"AAAB IDLE\r\n")
            .read(b"+ idling\r\n")
            .wait(Duration::from_secs(90))
            .write(b"DONE\r\n")
            .read(b"AAAB OK IDLE terminated\r\n");
        let mut client = selected(builder.build(), AbortSignal::never()).await;

        let outcome = client.idle(Duration::from_secs(60)).await.unwrap();
        assert_eq!(outcome, IdleOutcome::Timeout);
    }

    #[tokio::test]
    async fn test_idle_refused() {
        let mut builder = Builder::new();
        preamble(&mut builder)
            .write(b"AAAB IDLE\r\n")
            .read(b"AAAB BAD unknown command\r\n");
        let mut client = selected(builder.build(), AbortSignal::never()).await;

        assert!(matches!(
            client.idle(IDLE_TIMEOUT).await,
            Err(Error::Bad(text)) if text == "unknown command"
        ));
    }

    #[tokio::test]
    async fn test_bye_during_idle() {
        let mut builder = Builder::new();
        preamble(&mut builder)
            .write(b"AAAB IDLE\r\n")
            .read(b"+ idling\r\n")
            .read(b"* BYE autologout\r\n");
        let mut client = selected(builder.build(), AbortSignal::never()).await;

        assert!(matches!(client.idle(IDLE_TIMEOUT).await, Err(Error::Bye(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_unblocks_idle() {
        let abort = AbortHandle::new();
        let mut builder = Builder::new();
        preamble(&mut builder)
            .write(b"AAAB IDLE\r\n")
            .read(b"+ idling\r\n")
            .wait(Duration::from_secs(3600));
        let mut client = selected(builder.build(), abort.signal()).await;

        let trigger = abort.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.abort();
        });
        let result = client.idle(IDLE_TIMEOUT).await;
        assert!(matches!(&result, Err(e) if e.is_aborted()), "{result:?}");
    }

    #[tokio::test]
    async fn test_idle_requires_selected() {
        let transport = Transport::from_socket(
            Builder::new().read(b"* PREAUTH ready\r\n").build(),
            Timeouts::default(),
            AbortSignal::never(),
        );
        let mut client = Client::from_transport(transport, Config::new("imap.example.com"))
            .await
            .unwrap();
        assert!(matches!(
            client.idle(IDLE_TIMEOUT).await,
            Err(Error::Protocol(_))
        ));
    }
}
