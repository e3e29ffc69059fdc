//! Read and write records on NTAG tags through a block-addressed NFC reader.
//!
//! Payloads are stored from page 4 on in 4-byte blocks with zero padding and
//! no length header; see [`nfc::codec`] for how the end of data is found.

pub mod commands;
pub mod config;
pub mod error;
pub mod nfc;
pub mod record;
pub mod session;
pub mod store;

pub use error::{ErrorKind, TagError};
pub use record::{NewRecord, Record};
pub use session::{Session, SessionState};
