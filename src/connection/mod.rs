//! The boundary between the protocol engine and the physical USB link.
//!
//! Discovering, opening, and claiming the device belongs to the caller;
//! what arrives here is an already-opened bulk transport implementing
//! [`Transport`]. Submissions are asynchronous: they return as soon as the
//! transfer is queued, and the outcome is delivered later as a
//! [`TransferEvent`] from [`Transport::poll`]. Received bytes are only
//! copied into the session's inbound buffer during `poll`, so buffer growth
//! always happens strictly between one completion and the next submission.

use std::time::Duration;

use thiserror::Error;

/// The USB vendor ID the scopes enumerate with.
pub const USB_VID: u16 = 0x5345;

/// The USB product ID the scopes enumerate with.
pub const USB_PID: u16 = 0x1234;

/// The configuration holding the bulk interface.
pub const USB_CONFIG: u8 = 1;

/// The interface the caller must claim before submitting transfers.
pub const USB_INTERFACE: u8 = 0;

/// Bulk-in endpoint address.
pub const USB_IN_ENDPOINT: u8 = 0x81;

/// Bulk-out endpoint address.
pub const USB_OUT_ENDPOINT: u8 = 0x03;

/// Per-transfer timeout enforced by the transport.
pub const USB_TIMEOUT: Duration = Duration::from_millis(300);

/// Outcome the transport reports for a completed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    /// The transfer finished successfully.
    Completed,
    /// The transport gave up waiting on the device.
    TimedOut,
    /// Any other transport-reported failure, with its diagnostic code.
    Failed(i32),
}

impl TransferStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, TransferStatus::Completed)
    }
}

/// A completion notification delivered by [`Transport::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEvent {
    /// The outbound command left the host.
    Sent { status: TransferStatus },
    /// An inbound transfer finished with `actual` bytes now in the
    /// session's inbound buffer.
    Received { status: TransferStatus, actual: usize },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TransportError {
    /// The transport refused to queue a transfer. Reported to the caller
    /// and never retried automatically.
    #[error("transport rejected the transfer submission: {code}")]
    Rejected { code: i32 },

    /// Completion processing itself failed, with the transport's
    /// diagnostic code.
    #[error("transport event processing failed: {code}")]
    Events { code: i32 },
}

/// An opened asynchronous bulk link to one device.
///
/// All three operations may be called from within a completion dispatch;
/// the engine chains outbound to inbound submissions and resubmits the
/// receive for multi-packet replies that way.
pub trait Transport {
    /// Queues `payload` for transmission on the bulk-out endpoint.
    fn submit_out(&mut self, payload: &[u8], timeout: Duration) -> Result<(), TransportError>;

    /// Queues a receive of up to `len` bytes on the bulk-in endpoint.
    fn submit_in(&mut self, len: usize, timeout: Duration) -> Result<(), TransportError>;

    /// Waits up to `timeout` for the next completion. Bytes received for an
    /// inbound transfer are copied into `inbound` before the event is
    /// returned; `Ok(None)` means no transfer completed in time.
    fn poll(
        &mut self,
        inbound: &mut [u8],
        timeout: Duration,
    ) -> Result<Option<TransferEvent>, TransportError>;
}
