//! Tag operations composed from discovery, transport and codec.
//!
//! One operation holds the reader at a time. The busy indicator goes on once
//! a tag is found and is switched off by [`Busy`]'s drop, whatever the
//! outcome.

use std::fmt;
use std::ops::{Deref, DerefMut};

use parking_lot::Mutex as StateCell;
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::TagError;
use crate::nfc::codec::{self, Encoded};
use crate::nfc::discovery::{self, DiscoveryConfig};
use crate::nfc::driver::{TagDriver, TagId};
use crate::nfc::transport::{self, USER_START, WINDOW_BLOCKS};
use crate::record::{NewRecord, Record};
use crate::store::RecordStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Discovering,
    Clearing,
    Transferring,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::Idle => "idle",
            SessionState::Discovering => "discovering",
            SessionState::Clearing => "clearing",
            SessionState::Transferring => "transferring",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRead {
    pub uid: TagId,
    pub payload: Vec<u8>,
    /// Blocks successfully read, including the terminating empty block.
    pub blocks_read: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawWrite {
    pub uid: TagId,
    /// Payload length before padding.
    pub bytes_written: usize,
    pub blocks_written: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordWrite {
    pub uid: TagId,
    pub record: Record,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordRead {
    pub uid: TagId,
    pub record: Record,
}

pub struct Session {
    reader: Mutex<Box<dyn TagDriver>>,
    state: StateCell<SessionState>,
    store: RecordStore,
    discovery: DiscoveryConfig,
    shutdown: CancellationToken,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &*self.state.lock())
            .field("records", &self.store.len())
            .field("discovery", &self.discovery)
            .finish()
    }
}

/// Exclusive use of the reader for one operation.
///
/// Dropping it switches the indicator off (if it was switched on), releases
/// the tag and returns the session to `Idle`.
struct Busy<'a> {
    driver: MutexGuard<'a, Box<dyn TagDriver>>,
    state: &'a StateCell<SessionState>,
    lit: bool,
}

impl Busy<'_> {
    fn enter(&mut self, next: SessionState) {
        debug!(state = %next, "session state");
        *self.state.lock() = next;
    }

    fn light(&mut self) {
        self.driver.set_indicator(true);
        self.lit = true;
    }
}

impl Deref for Busy<'_> {
    type Target = dyn TagDriver;

    fn deref(&self) -> &Self::Target {
        &**self.driver
    }
}

impl DerefMut for Busy<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut **self.driver
    }
}

impl Drop for Busy<'_> {
    fn drop(&mut self) {
        if self.lit {
            self.driver.set_indicator(false);
        }
        self.driver.release();
        *self.state.lock() = SessionState::Idle;
        debug!(state = %SessionState::Idle, "session state");
    }
}

impl Session {
    pub fn new(driver: impl TagDriver + 'static, discovery: DiscoveryConfig) -> Self {
        Session {
            reader: Mutex::new(Box::new(driver)),
            state: StateCell::new(SessionState::Idle),
            store: RecordStore::new(),
            discovery,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Records written since startup, ordered by id.
    pub fn records(&self) -> Vec<Record> {
        self.store.list()
    }

    /// Abort any discovery in progress and refuse new ones.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    async fn acquire(&self) -> Result<Busy<'_>, TagError> {
        if self.shutdown.is_cancelled() {
            return Err(TagError::Cancelled);
        }
        let driver = self.reader.lock().await;
        Ok(Busy {
            driver,
            state: &self.state,
            lit: false,
        })
    }

    /// Find a tag and switch the indicator on.
    async fn discover(&self, busy: &mut Busy<'_>) -> Result<TagId, TagError> {
        busy.enter(SessionState::Discovering);
        let uid = discovery::discover(&mut **busy, &self.discovery, &self.shutdown).await?;
        busy.light();
        Ok(uid)
    }

    fn read_window(&self, busy: &mut Busy<'_>, uid: &TagId) -> Result<(Vec<u8>, usize), TagError> {
        busy.enter(SessionState::Transferring);
        let read = transport::read_blocks(&mut **busy, uid, USER_START, WINDOW_BLOCKS);
        if !read.skipped.is_empty() {
            warn!(%uid, skipped = ?read.skipped, "some blocks could not be read, data may be incomplete");
        }
        let blocks_read = read.blocks.len();
        let payload = codec::decode(&read.blocks)?;
        Ok((payload, blocks_read))
    }

    /// Read the raw payload stored from block 4 on.
    pub async fn read_raw(&self) -> Result<RawRead, TagError> {
        let mut busy = self.acquire().await?;
        let uid = self.discover(&mut busy).await?;
        let (payload, blocks_read) = self.read_window(&mut busy, &uid)?;
        info!(%uid, bytes = payload.len(), blocks = blocks_read, "read raw payload");
        Ok(RawRead {
            uid,
            payload,
            blocks_read,
        })
    }

    /// Write a hex-encoded payload from block 4 on.
    pub async fn write_raw(&self, hex_string: &str) -> Result<RawWrite, TagError> {
        let payload = parse_hex(hex_string)?;
        let encoded = codec::encode(&payload);
        check_capacity(&encoded, transport::capacity_from(USER_START))?;
        warn_lossy(&payload, &encoded);
        debug!(
            bytes = encoded.original_len,
            padded = encoded.padded_len(),
            "encoded raw payload"
        );

        let mut busy = self.acquire().await?;
        let uid = self.discover(&mut busy).await?;
        busy.enter(SessionState::Transferring);
        let blocks_written = transport::write_blocks(&mut *busy, &uid, USER_START, &encoded.blocks)?;
        info!(%uid, bytes = encoded.original_len, blocks = blocks_written, "wrote raw payload");

        Ok(RawWrite {
            uid,
            bytes_written: encoded.original_len,
            blocks_written,
        })
    }

    /// Validate a record, write it over a cleared window and remember it.
    pub async fn write_record(&self, new: NewRecord) -> Result<RecordWrite, TagError> {
        let record = new.validate()?;
        let encoded = codec::encode(&record.to_bytes()?);
        check_capacity(&encoded, WINDOW_BLOCKS as usize)?;

        let mut busy = self.acquire().await?;
        // checked under the reader lock so two writers cannot both claim an id
        if self.store.contains(&record.id) {
            return Err(TagError::DuplicateId(record.id));
        }

        let uid = self.discover(&mut busy).await?;
        busy.enter(SessionState::Clearing);
        transport::clear_blocks(&mut *busy, &uid, USER_START, WINDOW_BLOCKS);
        busy.enter(SessionState::Transferring);
        transport::write_blocks(&mut *busy, &uid, USER_START, &encoded.blocks)?;

        self.store.insert(record.clone());
        info!(%uid, id = %record.id, bytes = encoded.original_len, "wrote record");
        Ok(RecordWrite { uid, record })
    }

    /// Read a record back from the tag.
    pub async fn read_record(&self) -> Result<RecordRead, TagError> {
        let mut busy = self.acquire().await?;
        let uid = self.discover(&mut busy).await?;
        let (payload, _) = self.read_window(&mut busy, &uid)?;
        drop(busy);

        let record = Record::from_tag_bytes(&payload)?;
        info!(%uid, id = %record.id, "read record");
        Ok(RecordRead { uid, record })
    }
}

/// Decode the caller's hex string. Whitespace between digit pairs is ignored.
fn parse_hex(input: &str) -> Result<Vec<u8>, TagError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(TagError::invalid_input("No hex string provided"));
    }
    let mut bytes = Vec::with_capacity(trimmed.len() / 2);
    // each group must hold whole pairs, so "d ead" is rejected
    for group in trimmed.split_whitespace() {
        bytes.extend(hex::decode(group).map_err(invalid_hex)?);
    }
    Ok(bytes)
}

fn invalid_hex(err: hex::FromHexError) -> TagError {
    TagError::invalid_input(format!(
        "Invalid hex string: {err}. Please ensure the string contains only valid hexadecimal characters (0-9, a-f, A-F)"
    ))
}

fn check_capacity(encoded: &Encoded, max_blocks: usize) -> Result<(), TagError> {
    if encoded.blocks.len() > max_blocks {
        return Err(TagError::invalid_input(format!(
            "Payload of {} bytes needs {} blocks but only {} fit on the tag",
            encoded.original_len,
            encoded.blocks.len(),
            max_blocks
        )));
    }
    Ok(())
}

fn warn_lossy(payload: &[u8], encoded: &Encoded) {
    if let Some(index) = encoded.interior_terminator() {
        warn!(
            block = USER_START as usize + index,
            "payload contains an all-zero block, reads will stop there"
        );
    }
    if payload.last() == Some(&0) {
        warn!("payload ends with a zero byte, it will be trimmed on read");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_input_rules() {
        assert_eq!(parse_hex(" DEADbeef ").unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(parse_hex("de ad\tbe").unwrap(), vec![0xde, 0xad, 0xbe]);
        assert_eq!(parse_hex("dead  beef").unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
        for bad in ["", "   ", "abc", "zz", "0x12", "d ead", "dea d", "de a d"] {
            assert!(
                matches!(parse_hex(bad), Err(TagError::InvalidInput(_))),
                "{bad:?} should be rejected"
            );
        }
        match parse_hex("  ") {
            Err(TagError::InvalidInput(msg)) => assert_eq!(msg, "No hex string provided"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn capacity_check() {
        let encoded = codec::encode(&[1u8; 65]);
        assert!(check_capacity(&encoded, 17).is_ok());
        assert!(matches!(
            check_capacity(&encoded, 16),
            Err(TagError::InvalidInput(_))
        ));
    }
}
