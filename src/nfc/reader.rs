//! PC/SC backend for ACR122U-class readers.
//!
//! Block access uses the reader's pseudo-APDUs: `FF CA` for the UID,
//! `FF B0` / `FF D6` for page reads and writes, and `FF 00 40` for the LED
//! that serves as the busy indicator.

use std::ffi::CString;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use pcsc::{Card, Context as PcscContext, Protocols, ReaderState, Scope, ShareMode, State};
use tracing::{debug, info, warn};

use super::codec::{Block, BLOCK_SIZE};
use super::driver::{TagDriver, TagId};

const GET_UID: [u8; 5] = [0xFF, 0xCA, 0x00, 0x00, 0x00];

/// LED state byte: green final state + green mask.
const LED_GREEN_ON: u8 = 0x0A;
/// LED state byte: green mask only, final state off.
const LED_GREEN_OFF: u8 = 0x08;

pub struct NfcReader {
    ctx: PcscContext,
    reader: CString,
    card: Option<Card>,
}

impl NfcReader {
    /// Connect to the PC/SC service and pick a reader.
    ///
    /// With `name` the first reader whose name contains it is used, otherwise
    /// the first reader listed.
    pub fn new(name: Option<&str>) -> Result<Self> {
        let ctx = PcscContext::establish(Scope::User)
            .context("could not connect to the PC/SC service")?;

        let readers = list_readers(&ctx)?;
        let reader = readers
            .into_iter()
            .find(|r| match name {
                Some(name) => r.to_string_lossy().contains(name),
                None => true,
            })
            .ok_or_else(|| match name {
                Some(name) => anyhow::anyhow!("no NFC reader matching {name:?} is connected"),
                None => anyhow::anyhow!("no NFC reader is connected"),
            })?;

        info!(reader = ?reader, "using NFC reader");
        Ok(NfcReader {
            ctx,
            reader,
            card: None,
        })
    }

    fn card(&self) -> Result<&Card> {
        self.card
            .as_ref()
            .context("no NFC tag is connected, discover one first")
    }

    fn tag_present(&self, poll_timeout: Duration) -> Result<bool> {
        let mut states = [ReaderState::new(self.reader.clone(), State::UNAWARE)];
        self.ctx
            .get_status_change(Duration::ZERO, &mut states)
            .context("could not query reader state")?;
        if states[0].event_state().contains(State::PRESENT) {
            return Ok(true);
        }

        states[0].sync_current_state();
        match self.ctx.get_status_change(poll_timeout, &mut states) {
            Ok(()) => Ok(states[0].event_state().contains(State::PRESENT)),
            Err(pcsc::Error::Timeout) => Ok(false),
            Err(err) => Err(err).context("could not wait for a tag"),
        }
    }
}

fn list_readers(ctx: &PcscContext) -> Result<Vec<CString>> {
    let mut buffer = [0u8; 2048];
    let readers = ctx
        .list_readers(&mut buffer)
        .context("could not list NFC readers")?;
    Ok(readers.map(|r| r.to_owned()).collect())
}

/// Send an APDU and strip the `90 00` status word.
fn transmit(card: &Card, apdu: &[u8]) -> Result<Vec<u8>> {
    transmit_checked(card, apdu, command_ok)
}

fn transmit_checked(card: &Card, apdu: &[u8], ok: fn([u8; 2]) -> bool) -> Result<Vec<u8>> {
    let mut response_buffer = [0u8; pcsc::MAX_BUFFER_SIZE];
    let response = card
        .transmit(apdu, &mut response_buffer)
        .context("could not communicate with the NFC tag")?;
    Ok(check_status(response, ok)?.to_vec())
}

/// Split the trailing status word off `response` and check it with `ok`.
fn check_status(response: &[u8], ok: fn([u8; 2]) -> bool) -> Result<&[u8]> {
    let Some((data, status)) = response.split_last_chunk::<2>() else {
        bail!("truncated response from the NFC tag: {:02X?}", response);
    };
    if !ok(*status) {
        bail!(
            "NFC tag error: SW1=0x{:02X}, SW2=0x{:02X}",
            status[0],
            status[1]
        );
    }
    Ok(data)
}

fn command_ok(status: [u8; 2]) -> bool {
    status == [0x90, 0x00]
}

/// The LED command answers `90` followed by the resulting LED state.
fn led_ok(status: [u8; 2]) -> bool {
    status[0] == 0x90
}

impl TagDriver for NfcReader {
    fn discover_tag(&mut self, poll_timeout: Duration) -> Result<Option<TagId>> {
        if !self.tag_present(poll_timeout)? {
            return Ok(None);
        }

        let card = match self
            .ctx
            .connect(&self.reader, ShareMode::Shared, Protocols::ANY)
        {
            Ok(card) => card,
            Err(pcsc::Error::NoSmartcard | pcsc::Error::RemovedCard) => return Ok(None),
            Err(err) => return Err(err).context("could not connect to the NFC tag"),
        };

        let uid = transmit(&card, &GET_UID).context("could not read the tag UID")?;
        self.card = Some(card);
        Ok(Some(TagId::new(uid)))
    }

    fn read_block(&mut self, block: u8) -> Result<Option<Block>> {
        let data = transmit(self.card()?, &[0xFF, 0xB0, 0x00, block, BLOCK_SIZE as u8])?;
        // some firmware answers with four pages at once; the first is ours
        Ok(data.first_chunk::<BLOCK_SIZE>().copied())
    }

    fn write_block(&mut self, block: u8, data: &Block) -> Result<()> {
        let mut apdu = vec![0xFF, 0xD6, 0x00, block, BLOCK_SIZE as u8];
        apdu.extend_from_slice(data);
        transmit(self.card()?, &apdu).with_context(|| format!("could not write block {block}"))?;
        Ok(())
    }

    fn set_indicator(&mut self, on: bool) {
        let Some(card) = self.card.as_ref() else {
            debug!(on, "no tag connected, leaving LED alone");
            return;
        };
        let state = if on { LED_GREEN_ON } else { LED_GREEN_OFF };
        let apdu = [0xFF, 0x00, 0x40, state, 0x04, 0x00, 0x00, 0x00, 0x00];
        if let Err(err) = transmit_checked(card, &apdu, led_ok) {
            warn!(on, "could not switch reader LED: {err:#}");
        }
    }

    fn release(&mut self) {
        if let Some(card) = self.card.take() {
            if let Err((_, err)) = card.disconnect(pcsc::Disposition::LeaveCard) {
                warn!("could not disconnect from the NFC tag: {err}");
            }
        }
    }
}
