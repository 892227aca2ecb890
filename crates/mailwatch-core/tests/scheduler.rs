//! Scheduler cycles against in-process IMAP and POP3 servers.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use mailwatch_core::{
    FetchStatus, IgnoreStore, Mailbox, MemoryStore, Password, Recent, Scheduler, Summary,
    WorkerState,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

const HEADER: &str = "Subject: Lunch\r\nFrom: Bob <bob@example.com>\r\nDate: Tue, 1 Jul 2003 10:52:37 +0200\r\n\r\n";
const LATE_HEADER: &str = "Subject: Dinner\r\nFrom: Carol <carol@example.com>\r\n\r\n";

#[derive(Clone, Copy, Default)]
struct ImapOptions {
    idle: bool,
    /// Announce a second message during the first IDLE.
    idle_event: bool,
    greeting_delay: Duration,
}

/// Starts a server on a random port that runs `handler` for every
/// connection. Returns the port and a connection counter.
async fn spawn_server<F, Fut>(handler: F) -> (u16, Arc<AtomicUsize>)
where
    F: Fn(TcpStream) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let connections = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&connections);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(handler(stream));
        }
    });
    (port, connections)
}

async fn imap_session(stream: TcpStream, options: ImapOptions) {
    tokio::time::sleep(options.greeting_delay).await;
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    write.write_all(b"* OK ready\r\n").await.unwrap();
    let mut idle_tag = String::new();
    let mut delivered = false;

    while let Ok(Some(line)) = lines.next_line().await {
        if line == "DONE" {
            let reply = format!("{idle_tag} OK IDLE terminated\r\n");
            if write.write_all(reply.as_bytes()).await.is_err() {
                return;
            }
            continue;
        }
        let (tag, command) = line.split_once(' ').unwrap_or((line.as_str(), ""));
        let reply = match command {
            "CAPABILITY" if options.idle => {
                format!("* CAPABILITY IMAP4rev1 IDLE\r\n{tag} OK done\r\n")
            }
            "CAPABILITY" => format!("* CAPABILITY IMAP4rev1\r\n{tag} OK done\r\n"),
            "LOGIN alice pw" => format!("{tag} OK logged in\r\n"),
            "EXAMINE INBOX" => format!("* 1 EXISTS\r\n{tag} OK [READ-ONLY] done\r\n"),
            "UID SEARCH UNSEEN" if delivered => format!("* SEARCH 7 8\r\n{tag} OK done\r\n"),
            "UID SEARCH UNSEEN" => format!("* SEARCH 7\r\n{tag} OK done\r\n"),
            c if c.starts_with("UID FETCH 7 ") => format!(
                "* 1 FETCH (UID 7 BODY[HEADER.FIELDS (SUBJECT FROM DATE)] {{{}}}\r\n{HEADER})\r\n{tag} OK done\r\n",
                HEADER.len()
            ),
            c if c.starts_with("UID FETCH 8 ") => format!(
                "* 2 FETCH (UID 8 BODY[HEADER.FIELDS (SUBJECT FROM DATE)] {{{}}}\r\n{LATE_HEADER})\r\n{tag} OK done\r\n",
                LATE_HEADER.len()
            ),
            "IDLE" => {
                idle_tag = tag.to_string();
                if options.idle_event && !delivered {
                    delivered = true;
                    "+ idling\r\n* 2 EXISTS\r\n".to_string()
                } else {
                    // never reports a change; the client has to be stopped
                    "+ idling\r\n".to_string()
                }
            }
            "LOGOUT" => {
                let bye = format!("* BYE see you\r\n{tag} OK done\r\n");
                let _ = write.write_all(bye.as_bytes()).await;
                return;
            }
            _ => format!("{tag} BAD unexpected {command}\r\n"),
        };
        if write.write_all(reply.as_bytes()).await.is_err() {
            return;
        }
    }
}

async fn pop3_session(stream: TcpStream) {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    write.write_all(b"+OK POP3 ready\r\n").await.unwrap();

    while let Ok(Some(line)) = lines.next_line().await {
        let reply = match line.as_str() {
            "CAPA" => "+OK\r\nTOP\r\nUSER\r\nUIDL\r\n.\r\n".to_string(),
            "USER alice" | "PASS pw" => "+OK\r\n".to_string(),
            "UIDL" => "+OK\r\n1 uid-a\r\n2 uid-b\r\n.\r\n".to_string(),
            "TOP 1 0" => format!("+OK\r\n{HEADER}.\r\n"),
            "TOP 2 0" => "+OK\r\nSubject: Old news\r\nStatus: RO\r\n\r\n.\r\n".to_string(),
            "QUIT" => {
                let _ = write.write_all(b"+OK bye\r\n").await;
                return;
            }
            _ => "-ERR unknown command\r\n".to_string(),
        };
        if write.write_all(reply.as_bytes()).await.is_err() {
            return;
        }
    }
}

fn mailbox(uri: &str) -> Arc<Mailbox> {
    Arc::new(Mailbox::new("test", uri.parse().unwrap(), Password::new("pw")))
}

fn scheduler(mailbox: &Arc<Mailbox>, store: &Arc<MemoryStore>) -> Scheduler {
    let store: Arc<dyn IgnoreStore> = store.clone();
    Scheduler::new(vec![Arc::clone(mailbox)], store)
}

/// Forces one cycle and waits for its counts and for the worker to stop.
async fn cycle(scheduler: &Scheduler, mailbox: &Mailbox) -> Summary {
    assert_eq!(scheduler.fetch(true), FetchStatus::Dispatched(1));
    let summary = tokio::time::timeout(Duration::from_secs(10), scheduler.settled())
        .await
        .unwrap();
    stopped(mailbox).await;
    summary
}

async fn stopped(mailbox: &Mailbox) {
    let mut state = mailbox.watch_state();
    tokio::time::timeout(
        Duration::from_secs(10),
        state.wait_for(|s| *s == WorkerState::Stopped),
    )
    .await
    .unwrap()
    .unwrap();
}

#[tokio::test]
async fn test_imap_new_mail_reported_once() {
    let (port, _) = spawn_server(|s| imap_session(s, ImapOptions::default())).await;
    let mailbox = mailbox(&format!("imap://alice@127.0.0.1:{port}/"));
    let store = Arc::new(MemoryStore::new());
    let scheduler = scheduler(&mailbox, &store);

    let summary = cycle(&scheduler, &mailbox).await;
    assert_eq!(
        summary,
        Summary {
            recent: 1,
            unseen: 1,
            failed: 0
        }
    );
    let mails = mailbox.mails();
    assert_eq!(mails[0].uid, "7");
    assert_eq!(mails[0].subject, "Lunch");
    assert_eq!(mails[0].from_display(), "Bob");

    // still unseen on the server, but already known
    let summary = cycle(&scheduler, &mailbox).await;
    assert_eq!(summary.recent, 0);
    assert_eq!(summary.unseen, 1);

    scheduler.ignore_current(&mailbox).unwrap();
    assert_eq!(store.load_ignore(&mailbox.key()).unwrap(), vec!["7"]);

    // the ignore list survives a poll while the message stays unseen
    let summary = cycle(&scheduler, &mailbox).await;
    assert_eq!(summary.recent, 0);
    assert_eq!(store.load_ignore(&mailbox.key()).unwrap(), vec!["7"]);
}

#[tokio::test]
async fn test_pop3_default_mode() {
    let (port, _) = spawn_server(pop3_session).await;
    let mailbox = mailbox(&format!("pop://alice@127.0.0.1:{port}"));
    let store = Arc::new(MemoryStore::new());
    let scheduler = scheduler(&mailbox, &store);

    let summary = cycle(&scheduler, &mailbox).await;
    assert_eq!(summary.recent, 1);
    assert_eq!(mailbox.mails().len(), 1);
    assert_eq!(store.load_ignore(&mailbox.key()).unwrap(), vec!["uid-b"]);

    let summary = cycle(&scheduler, &mailbox).await;
    assert_eq!(summary.recent, 0);
    assert_eq!(summary.unseen, 1);
}

#[tokio::test]
async fn test_pop3_recent_mode() {
    let (port, _) = spawn_server(pop3_session).await;
    let mailbox = mailbox(&format!("pop://alice@127.0.0.1:{port}#recent"));
    let store = Arc::new(MemoryStore::new());
    let scheduler = scheduler(&mailbox, &store);

    let summary = cycle(&scheduler, &mailbox).await;
    assert_eq!(summary.recent, 1);
    assert_eq!(
        store.load_ignore(&mailbox.key()).unwrap(),
        vec!["uid-a", "uid-b"]
    );

    let summary = cycle(&scheduler, &mailbox).await;
    assert_eq!(summary, Summary::default());
    assert!(mailbox.mails().is_empty());
}

#[tokio::test]
async fn test_connect_failure_counts_as_failed() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let mailbox = mailbox(&format!("imap://alice@127.0.0.1:{port}/"));
    let scheduler = scheduler(&mailbox, &Arc::new(MemoryStore::new()));

    let summary = cycle(&scheduler, &mailbox).await;
    assert_eq!(summary.failed, 1);
    assert!(mailbox.recent().is_failed());

    // not due again until the backoff has passed
    assert_eq!(scheduler.fetch(false), FetchStatus::Dispatched(0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_fetches_start_one_worker() {
    let options = ImapOptions {
        greeting_delay: Duration::from_millis(300),
        ..ImapOptions::default()
    };
    let (port, connections) = spawn_server(move |s| imap_session(s, options)).await;
    let mailbox = mailbox(&format!("imap://alice@127.0.0.1:{port}/"));
    let scheduler = scheduler(&mailbox, &Arc::new(MemoryStore::new()));

    let calls: Vec<_> = (0..8)
        .map(|_| {
            let scheduler = scheduler.clone();
            tokio::spawn(async move {
                loop {
                    match scheduler.fetch(true) {
                        FetchStatus::Dispatched(n) => return n,
                        FetchStatus::Deferred => tokio::task::yield_now().await,
                    }
                }
            })
        })
        .collect();
    let mut dispatched = 0;
    for call in calls {
        dispatched += call.await.unwrap();
    }
    assert_eq!(dispatched, 1);

    tokio::time::timeout(Duration::from_secs(10), scheduler.settled())
        .await
        .unwrap();
    stopped(&mailbox).await;
    assert_eq!(connections.load(Ordering::SeqCst), 1);
    assert_eq!(mailbox.recent(), Recent::Count(1));
}

#[tokio::test]
async fn test_shutdown_stops_idle_worker() {
    let options = ImapOptions {
        idle: true,
        ..ImapOptions::default()
    };
    let (port, _) = spawn_server(move |s| imap_session(s, options)).await;
    let mailbox = mailbox(&format!("imap://alice@127.0.0.1:{port}/"));
    let scheduler = scheduler(&mailbox, &Arc::new(MemoryStore::new()));

    assert_eq!(scheduler.fetch(true), FetchStatus::Dispatched(1));
    let summary = tokio::time::timeout(Duration::from_secs(10), scheduler.settled())
        .await
        .unwrap();
    assert_eq!(summary.recent, 1);

    tokio::time::timeout(Duration::from_secs(10), async {
        while !mailbox.is_idle() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(mailbox.state(), WorkerState::Running);

    // a mailbox in IDLE is never dispatched again
    assert_eq!(scheduler.fetch(true), FetchStatus::Dispatched(0));

    tokio::time::timeout(Duration::from_secs(10), scheduler.shutdown())
        .await
        .unwrap();
    assert_eq!(mailbox.state(), WorkerState::Stopped);
    assert!(!mailbox.is_idle());
    assert_eq!(mailbox.recent(), Recent::Count(1));
}

#[tokio::test]
async fn test_idle_event_triggers_poll() {
    let options = ImapOptions {
        idle: true,
        idle_event: true,
        ..ImapOptions::default()
    };
    let (port, connections) = spawn_server(move |s| imap_session(s, options)).await;
    let mailbox = mailbox(&format!("imap://alice@127.0.0.1:{port}/"));
    let store = Arc::new(MemoryStore::new());
    let scheduler = scheduler(&mailbox, &store);
    let mut summaries = scheduler.subscribe();

    assert_eq!(scheduler.fetch(true), FetchStatus::Dispatched(1));
    let summary = *tokio::time::timeout(
        Duration::from_secs(10),
        summaries.wait_for(|s| s.unseen == 2),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(
        summary,
        Summary {
            recent: 1,
            unseen: 2,
            failed: 0
        }
    );

    let subjects: Vec<_> = mailbox.mails().into_iter().map(|m| m.subject).collect();
    assert_eq!(subjects, vec!["Lunch", "Dinner"]);
    assert_eq!(mailbox.state(), WorkerState::Running);
    // the same session polled again
    assert_eq!(connections.load(Ordering::SeqCst), 1);
    assert_eq!(scheduler.fetch(true), FetchStatus::Dispatched(0));

    tokio::time::timeout(Duration::from_secs(10), scheduler.shutdown())
        .await
        .unwrap();
    assert_eq!(mailbox.state(), WorkerState::Stopped);
}
