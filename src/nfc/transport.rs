//! Sequential block I/O against the tag found by discovery.
//!
//! Writes are all-or-error: the first failed block aborts the payload.
//! Clearing and reading absorb per-block failures and keep going.

use tracing::{debug, error, warn};

use super::codec::{is_terminator, Block, EMPTY_BLOCK};
use super::driver::{TagDriver, TagId};
use crate::error::TagError;

/// First page of NTAG user memory. Pages 0-3 hold UID, lock and CC bytes.
pub const USER_START: u8 = 0x04;

/// Last user page of an NTAG216, the largest of the family.
pub const USER_END: u8 = 0xE1;

/// Blocks cleared before a record write and read back by the read operations.
pub const WINDOW_BLOCKS: u8 = 16;

/// Number of user blocks available from `start` on.
pub fn capacity_from(start: u8) -> usize {
    (USER_END as usize + 1).saturating_sub(start as usize)
}

/// Blocks returned by [`read_blocks`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReadBlocks {
    pub blocks: Vec<Block>,
    /// Block numbers that failed and were skipped.
    pub skipped: Vec<u8>,
}

/// Write `blocks` starting at `start`, stopping at the first failure.
///
/// On failure the tag holds the blocks written so far followed by whatever
/// was there before.
pub fn write_blocks(
    driver: &mut dyn TagDriver,
    uid: &TagId,
    start: u8,
    blocks: &[Block],
) -> Result<usize, TagError> {
    if blocks.len() > capacity_from(start) {
        return Err(TagError::invalid_input(format!(
            "{} blocks do not fit in tag user memory from block {start} ({} blocks available)",
            blocks.len(),
            capacity_from(start)
        )));
    }

    for (i, data) in blocks.iter().enumerate() {
        // bounded by the capacity check above
        let block = start + i as u8;
        debug!(%uid, block, data = %hex::encode(data), "writing block");
        if let Err(cause) = driver.write_block(block, data) {
            error!(%uid, block, written = i, "block write failed: {cause:#}");
            return Err(TagError::WriteFailure {
                block,
                written: i,
                cause,
            });
        }
    }

    Ok(blocks.len())
}

/// Zero `count` blocks from `start` on. Failures are logged and skipped.
///
/// Returns the number of blocks actually cleared.
pub fn clear_blocks(driver: &mut dyn TagDriver, uid: &TagId, start: u8, count: u8) -> usize {
    let count = count.min(capacity_from(start).min(u8::MAX as usize) as u8);
    let mut cleared = 0;

    for block in start..start + count {
        match driver.write_block(block, &EMPTY_BLOCK) {
            Ok(()) => {
                debug!(%uid, block, "cleared block");
                cleared += 1;
            }
            Err(err) => warn!(%uid, block, "could not clear block: {err:#}"),
        }
    }

    if cleared < count as usize {
        warn!(
            %uid,
            cleared,
            requested = count,
            "clear was partial, stale bytes may remain past the new payload"
        );
    }
    cleared
}

/// Read up to `max` blocks from `start`.
///
/// Stops when the reader returns no data, or after including the first
/// all-zero block. A block that fails to read is skipped.
pub fn read_blocks(driver: &mut dyn TagDriver, uid: &TagId, start: u8, max: u8) -> ReadBlocks {
    let max = max.min(capacity_from(start).min(u8::MAX as usize) as u8);
    let mut out = ReadBlocks::default();

    for block in start..start + max {
        match driver.read_block(block) {
            Ok(Some(data)) => {
                debug!(%uid, block, data = %hex::encode(data), "read block");
                out.blocks.push(data);
                if is_terminator(&data) {
                    debug!(%uid, block, "reached end of data");
                    break;
                }
            }
            Ok(None) => {
                warn!(%uid, block, "reader returned no data, stopping");
                break;
            }
            Err(err) => {
                warn!(%uid, block, "error reading block, skipping: {err:#}");
                out.skipped.push(block);
            }
        }
    }

    out
}
