//! # mailwatch-mime
//!
//! Mail header decoding for the mailwatch retrieval engine.
//!
//! ## Features
//!
//! - **Tokenizer**: quoted strings, nestable comments, bracketed domains and
//!   IMAP literals, shared with the IMAP response parser
//! - **Encoded words**: RFC 2047 Base64 / Q decoding with charset conversion
//! - **Charsets**: name to code page resolution backed by `encoding_rs`
//! - **Fields**: folded header splitting, address and date parsing
//! - **UTF-7**: RFC 2152 and IMAP modified UTF-7
//!
//! ## Example
//!
//! ```
//! use mailwatch_mime::{Address, HeaderFields, MailDate, encoded_word};
//!
//! let raw = b"Subject: =?UTF-8?Q?caf=C3=A9?=\r\n\
//!             From: Alice <alice@example.com>\r\n\
//!             Date: Tue, 1 Jul 2003 10:52:37 +0200\r\n\r\n";
//!
//! let mut fields = HeaderFields::new(raw);
//! let names = ["Subject", "From", "Date"];
//! while let Some((index, value)) = fields.field(&names) {
//!     match index {
//!         0 => assert_eq!(encoded_word::decode(&value), "café"),
//!         1 => assert_eq!(Address::parse(&value).display(), "Alice"),
//!         _ => assert!(MailDate::parse(&value).valid().is_some()),
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod address;
mod date;
mod error;
mod header;

pub mod charset;
pub mod encoded_word;
pub mod encoding;
pub mod tokenizer;
pub mod utf7;

pub use address::Address;
pub use date::{MailDate, parse_date};
pub use error::{Error, Result};
pub use header::HeaderFields;
pub use tokenizer::{Token, Tokenizer};
