use std::fmt;
use std::time::Duration;

use anyhow::Result;

use super::codec::Block;

/// Identifier returned by a successful discovery.
///
/// Only meaningful for the operation that discovered it.
#[derive(Clone, PartialEq, Eq)]
pub struct TagId(Vec<u8>);

impl TagId {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        TagId(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Upper-case hex, the form handed back to API callers.
    pub fn to_hex(&self) -> String {
        hex::encode_upper(&self.0)
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TagId({})", self.to_hex())
    }
}

/// Reader-side operations needed by the block protocol.
///
/// Lets the session work the same against a PC/SC reader and the in-memory
/// simulated tag. Block calls address the tag found by the last successful
/// `discover_tag`.
pub trait TagDriver: Send + Sync {
    /// One poll attempt, waiting at most `poll_timeout` for a tag.
    fn discover_tag(&mut self, poll_timeout: Duration) -> Result<Option<TagId>>;

    /// Read a single 4-byte block. `Ok(None)` means the reader answered without data.
    fn read_block(&mut self, block: u8) -> Result<Option<Block>>;

    /// Write a single 4-byte block.
    fn write_block(&mut self, block: u8, data: &Block) -> Result<()>;

    /// Switch the busy indicator. Failures are logged by the implementation.
    fn set_indicator(&mut self, on: bool);

    /// Drop the connection to the current tag, if any.
    fn release(&mut self) {}
}

impl<T: TagDriver + ?Sized> TagDriver for Box<T> {
    fn discover_tag(&mut self, poll_timeout: Duration) -> Result<Option<TagId>> {
        (**self).discover_tag(poll_timeout)
    }

    fn read_block(&mut self, block: u8) -> Result<Option<Block>> {
        (**self).read_block(block)
    }

    fn write_block(&mut self, block: u8, data: &Block) -> Result<()> {
        (**self).write_block(block, data)
    }

    fn set_indicator(&mut self, on: bool) {
        (**self).set_indicator(on)
    }

    fn release(&mut self) {
        (**self).release()
    }
}
