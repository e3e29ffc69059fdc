//! Simulated NTAG216 held in memory.
//!
//! Backs the `memory` reader backend and the tests. Clones share the same
//! tag, so a test can keep a handle while the session owns another.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use parking_lot::Mutex;
use tracing::debug;

use super::codec::{Block, EMPTY_BLOCK};
use super::driver::{TagDriver, TagId};
use super::transport::USER_END;

const PAGES: usize = USER_END as usize + 1;

#[derive(Debug)]
struct Inner {
    uid: Vec<u8>,
    pages: Vec<Block>,
    present: bool,
    /// Polls that report nothing before the tag shows up.
    hidden_polls: usize,
    connected: bool,
    indicator: bool,
    indicator_history: Vec<bool>,
    polls: usize,
    reads: usize,
    writes: usize,
    fail_reads: HashSet<u8>,
    no_data: HashSet<u8>,
    fail_writes: HashSet<u8>,
    fail_polls: bool,
}

#[derive(Debug, Clone)]
pub struct MemoryTag {
    inner: Arc<Mutex<Inner>>,
}

impl Default for MemoryTag {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTag {
    /// A blank tag resting on the reader.
    pub fn new() -> Self {
        MemoryTag {
            inner: Arc::new(Mutex::new(Inner {
                uid: vec![0x04, 0x5A, 0x3C, 0x12, 0x7F, 0x61, 0x80],
                pages: vec![EMPTY_BLOCK; PAGES],
                present: true,
                hidden_polls: 0,
                connected: false,
                indicator: false,
                indicator_history: Vec::new(),
                polls: 0,
                reads: 0,
                writes: 0,
                fail_reads: HashSet::new(),
                no_data: HashSet::new(),
                fail_writes: HashSet::new(),
                fail_polls: false,
            })),
        }
    }

    pub fn with_uid(self, uid: impl Into<Vec<u8>>) -> Self {
        self.inner.lock().uid = uid.into();
        self
    }

    pub fn set_present(&self, present: bool) {
        self.inner.lock().present = present;
    }

    /// Report no tag for the next `polls` discovery attempts.
    pub fn appear_after(&self, polls: usize) {
        self.inner.lock().hidden_polls = polls;
    }

    /// Make every discovery attempt fail with a reader error.
    pub fn fail_polls(&self, fail: bool) {
        self.inner.lock().fail_polls = fail;
    }

    pub fn fail_read_at(&self, block: u8) {
        self.inner.lock().fail_reads.insert(block);
    }

    pub fn no_data_at(&self, block: u8) {
        self.inner.lock().no_data.insert(block);
    }

    pub fn fail_write_at(&self, block: u8) {
        self.inner.lock().fail_writes.insert(block);
    }

    /// Store `blocks` from `start` on, bypassing the reader.
    pub fn fill(&self, start: u8, blocks: &[Block]) {
        let mut inner = self.inner.lock();
        for (i, block) in blocks.iter().enumerate() {
            inner.pages[start as usize + i] = *block;
        }
    }

    pub fn block(&self, block: u8) -> Block {
        self.inner.lock().pages[block as usize]
    }

    pub fn indicator(&self) -> bool {
        self.inner.lock().indicator
    }

    /// Every value passed to `set_indicator`, in order.
    pub fn indicator_history(&self) -> Vec<bool> {
        self.inner.lock().indicator_history.clone()
    }

    pub fn connected(&self) -> bool {
        self.inner.lock().connected
    }

    pub fn polls(&self) -> usize {
        self.inner.lock().polls
    }

    pub fn read_attempts(&self) -> usize {
        self.inner.lock().reads
    }

    pub fn write_attempts(&self) -> usize {
        self.inner.lock().writes
    }

    /// Total block operations attempted against the tag.
    pub fn io_count(&self) -> usize {
        let inner = self.inner.lock();
        inner.reads + inner.writes
    }
}

impl TagDriver for MemoryTag {
    fn discover_tag(&mut self, _poll_timeout: Duration) -> Result<Option<TagId>> {
        let mut inner = self.inner.lock();
        inner.polls += 1;
        if inner.fail_polls {
            bail!("simulated reader fault");
        }
        if inner.hidden_polls > 0 {
            inner.hidden_polls -= 1;
            return Ok(None);
        }
        if !inner.present {
            return Ok(None);
        }
        inner.connected = true;
        Ok(Some(TagId::new(inner.uid.clone())))
    }

    fn read_block(&mut self, block: u8) -> Result<Option<Block>> {
        let mut inner = self.inner.lock();
        inner.reads += 1;
        if !inner.connected {
            bail!("no tag connected");
        }
        if inner.fail_reads.contains(&block) {
            bail!("simulated read error at block {block}");
        }
        if inner.no_data.contains(&block) {
            return Ok(None);
        }
        Ok(inner.pages.get(block as usize).copied())
    }

    fn write_block(&mut self, block: u8, data: &Block) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.writes += 1;
        if !inner.connected {
            bail!("no tag connected");
        }
        if inner.fail_writes.contains(&block) {
            bail!("simulated write error at block {block}");
        }
        match inner.pages.get_mut(block as usize) {
            Some(page) => {
                *page = *data;
                Ok(())
            }
            None => bail!("block {block} is out of range"),
        }
    }

    fn set_indicator(&mut self, on: bool) {
        let mut inner = self.inner.lock();
        debug!(on, "simulated indicator");
        inner.indicator = on;
        inner.indicator_history.push(on);
    }

    fn release(&mut self) {
        self.inner.lock().connected = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_need_a_discovered_tag() {
        let mut tag = MemoryTag::new();
        assert!(tag.read_block(4).is_err());
        assert!(tag.discover_tag(Duration::ZERO).unwrap().is_some());
        assert_eq!(tag.read_block(4).unwrap(), Some(EMPTY_BLOCK));
        tag.release();
        assert!(tag.write_block(4, b"abcd").is_err());
    }

    #[test]
    fn appears_after_hidden_polls() {
        let mut tag = MemoryTag::new().with_uid(vec![1, 2, 3, 4]);
        tag.appear_after(2);
        assert!(tag.discover_tag(Duration::ZERO).unwrap().is_none());
        assert!(tag.discover_tag(Duration::ZERO).unwrap().is_none());
        let uid = tag.discover_tag(Duration::ZERO).unwrap().unwrap();
        assert_eq!(uid.as_bytes(), &[1, 2, 3, 4]);
        assert_eq!(tag.polls(), 3);
    }

    #[test]
    fn out_of_range_blocks_fail() {
        let mut tag = MemoryTag::new();
        tag.discover_tag(Duration::ZERO).unwrap();
        assert_eq!(tag.read_block(0xFF).unwrap(), None);
        assert!(tag.write_block(0xFF, b"abcd").is_err());
    }
}
