//! Wire format for the VDS command/response protocol.
//!
//! Commands are short ASCII literals sent over the bulk-out endpoint. The
//! only structured reply is the identification reply, which arrives in two
//! packets: a fixed header carrying the model name and the size of the
//! second packet, then a semicolon-delimited property record. Decoding is
//! incremental; [`decode_version_reply`] tells the caller whether another
//! packet is expected and how large the inbound buffer must be for it.

use std::str::Utf8Error;

use log::{debug, trace};
use thiserror::Error;

use crate::identity::{DeviceIdentity, Locales};
use crate::models::VdsModel;

/// Command requesting the two-packet identification reply.
pub const VERSION_COMMAND: &[u8] = b":SDSLVER#";

/// Header the scope prefixes to the first identification reply packet.
pub const VERSION_REPLY_HEADER: &[u8] = b":SDSLVERSPB";

/// The property code that ends the identification record.
const TERMINAL_PROPERTY: u8 = b'8';

/// Logical command for a session: queued, in flight, or reserved for
/// automatic resubmission.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// No command outstanding.
    #[default]
    None,
    /// Finish the current receive cycle, then go quiet.
    Stop,
    /// Run the identification exchange.
    GetVersion,
}

/// Outcome of feeding one inbound packet to the identification decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionProgress {
    /// Another packet is coming. The inbound buffer must hold at least this
    /// many bytes before the receive is resubmitted.
    NeedMoreInput(usize),
    /// The record was consumed and the identity is fully populated.
    Complete,
    /// Not enough bytes to tell what this packet is, or a header for a
    /// different model. The caller should leave its state unchanged.
    Indeterminate,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("record must start with property '1' and end with ';'")]
    BadRecordShape,

    #[error("record ends inside the field for property '{0}'")]
    TruncatedRecord(char),

    #[error("text field contained invalid UTF-8: {0}")]
    InvalidText(#[from] Utf8Error),
}

/// Decodes one packet of the identification reply.
///
/// `actual` is the byte count the transport reported for the packet. The
/// first packet declares the size of the second; the reported
/// [`NeedMoreInput`](VersionProgress::NeedMoreInput) size is that length
/// plus one, reserving room for the terminator written into the second
/// packet. Identity fields decode independently and are never rolled back,
/// so a failure partway through the record retains everything decoded
/// before it.
pub fn decode_version_reply(
    buf: &mut [u8],
    actual: usize,
    model: &VdsModel,
    identity: &mut DeviceIdentity,
) -> Result<VersionProgress, DecodeError> {
    if actual < VERSION_REPLY_HEADER.len() {
        // Could be a partial header or a very short record. The original
        // handshake cannot tell these apart, so don't guess.
        debug!("reply shorter than the version header, leaving state unchanged");
        return Ok(VersionProgress::Indeterminate);
    }

    if buf[..actual].starts_with(VERSION_REPLY_HEADER) {
        decode_first_packet(&buf[..actual], model)
    } else {
        decode_record(buf, actual, identity)
    }
}

/// Parses the header packet: fixed literal, model name, then the big-endian
/// length of the second packet.
fn decode_first_packet(buf: &[u8], model: &VdsModel) -> Result<VersionProgress, DecodeError> {
    debug!("received header for version reply");

    let name = model.name.as_bytes();
    let length_at = VERSION_REPLY_HEADER.len() + name.len();
    if buf.len() < length_at + 4 {
        debug!("version header is missing the packet length field");
        return Ok(VersionProgress::Indeterminate);
    }
    if &buf[VERSION_REPLY_HEADER.len()..length_at] != name {
        debug!("version header names a different model than {}", model.name);
        return Ok(VersionProgress::Indeterminate);
    }
    trace!("received model name: {}", model.name);

    let declared = u32::from_be_bytes(buf[length_at..length_at + 4].try_into().unwrap());
    // One extra byte for the terminator appended to the second packet.
    Ok(VersionProgress::NeedMoreInput(declared as usize + 1))
}

/// Walks the semicolon-delimited property record of the second packet.
fn decode_record(
    buf: &mut [u8],
    actual: usize,
    identity: &mut DeviceIdentity,
) -> Result<VersionProgress, DecodeError> {
    if actual < 2 || buf[0] != b'1' || buf[actual - 1] != b';' {
        return Err(DecodeError::BadRecordShape);
    }
    // The first packet reserved one byte past the declared length for this.
    if actual < buf.len() {
        buf[actual] = 0;
    }

    let record = &buf[..actual];
    let mut p = 0;
    loop {
        let property = record[p];
        let i = match record[p..].iter().position(|&b| b == b';') {
            Some(offset) => p + offset,
            None => actual,
        };
        // A field may only run to the end of the record if it carries the
        // terminal property. Anything else is a truncated or foreign reply.
        if i + 1 >= actual && property != TERMINAL_PROPERTY {
            return Err(DecodeError::TruncatedRecord(property as char));
        }

        match property {
            b'1' => identity.board_version = Some(field_text(&record[p + 1..i])?),
            b'2' => identity.serial_number = Some(field_text(&record[p + 1..i])?),
            b'3' => {
                // Pairs of (locale index, enabled) bytes.
                let mut q = p + 1;
                while q + 1 < i {
                    let locale = Locales::from_bits_retain(1 << (record[q] & 0x0f));
                    if record[q + 1] != 0 {
                        identity.locales.insert(locale);
                    } else {
                        identity.locales.remove(locale);
                    }
                    q += 2;
                }
            }
            b'4' => identity.neutral = record[i - 1] != 0,
            b'5' => identity.pluggable = record[i - 1] != 0,
            b'6' => identity.encrypted = record[i - 1] != 0,
            b'7' => identity.single_trigger = record[i - 1] != 0,
            b'8' => {
                identity.unified_clock = record[i - 1] != 0;
                break;
            }
            // Unknown property codes are skipped for forward compatibility.
            _ => {}
        }
        p = i + 1;
    }

    trace!("board version: {:?}", identity.board_version);
    trace!("serial number: {:?}", identity.serial_number);
    trace!("languages supported by device: {:?}", identity.locales);
    trace!("device {} neutral", if identity.neutral { "is" } else { "isn't" });
    trace!(
        "device {} pluggable firmware",
        if identity.pluggable { "has" } else { "hasn't" }
    );
    trace!(
        "device {} encrypted firmware",
        if identity.encrypted { "has" } else { "doesn't have" }
    );
    trace!(
        "device {} new single trigger",
        if identity.single_trigger { "has" } else { "doesn't have" }
    );
    trace!(
        "device {} unified clock",
        if identity.unified_clock { "has" } else { "doesn't have" }
    );
    Ok(VersionProgress::Complete)
}

/// Bytes strictly between the property code and the trailing separator.
fn field_text(bytes: &[u8]) -> Result<String, DecodeError> {
    Ok(std::str::from_utf8(bytes)?.to_owned())
}
