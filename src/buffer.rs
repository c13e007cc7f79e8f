//! Transfer buffers for the bulk endpoints.
//!
//! Each session owns one buffer per direction. A buffer is the byte storage
//! plus the length last bound to the transfer handed to the transport;
//! growing the storage and rebinding that length are a single operation, so
//! a transfer can never be resubmitted against stale storage.

use log::debug;
use thiserror::Error;

/// Default inbound allocation. Way too low for data acquisition; most
/// replies are short single packets and the buffer grows when more data
/// starts to flow.
pub const DEFAULT_IN_SIZE: usize = 100;

/// Default outbound allocation. Commands are short ASCII literals.
pub const DEFAULT_OUT_SIZE: usize = 15;

/// Direction of a bulk transfer, host-relative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Host to device.
    Out,
    /// Device to host.
    In,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum BufferError {
    #[error("invalid transfer buffer size: {0}")]
    InvalidSize(i64),

    #[error("transfer buffer allocation failed")]
    OutOfMemory,
}

/// One direction of the bulk link: owned storage plus the bound transfer
/// length.
#[derive(Debug, Default)]
pub struct TransferBuffer {
    storage: Vec<u8>,
    /// Length the bound transfer was last told about. Equals the capacity
    /// after any growth; narrowed when a command payload is written.
    transfer_len: usize,
}

impl TransferBuffer {
    /// Current storage capacity in bytes. Zero means never allocated.
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// The length currently bound to the transfer.
    pub fn transfer_len(&self) -> usize {
        self.transfer_len
    }

    /// The bytes a submission would hand to the transport.
    pub fn payload(&self) -> &[u8] {
        &self.storage[..self.transfer_len]
    }

    /// Full storage, for the transport to copy received bytes into.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.storage
    }

    /// Grows storage to exactly `size` bytes, preserving existing contents,
    /// and rebinds the transfer length in the same step.
    fn grow(&mut self, size: usize) -> Result<(), BufferError> {
        let additional = size.saturating_sub(self.storage.len());
        self.storage
            .try_reserve_exact(additional)
            .map_err(|_| BufferError::OutOfMemory)?;
        self.storage.resize(size, 0);
        self.transfer_len = size;
        Ok(())
    }

    fn release(&mut self) {
        self.storage = Vec::new();
        self.transfer_len = 0;
    }
}

/// The per-session buffer pair. Both directions are always constructed
/// together, so an allocation failure tears both down together.
#[derive(Debug, Default)]
pub struct TransferBuffers {
    outbound: TransferBuffer,
    inbound: TransferBuffer,
}

impl TransferBuffers {
    pub fn outbound(&self) -> &TransferBuffer {
        &self.outbound
    }

    pub fn inbound(&self) -> &TransferBuffer {
        &self.inbound
    }

    pub fn inbound_mut(&mut self) -> &mut TransferBuffer {
        &mut self.inbound
    }

    /// Makes the buffer for `direction` hold at least `min_size` bytes.
    ///
    /// A buffer that was never allocated gets its direction's default size
    /// (or `min_size` if that is larger); an existing buffer only ever
    /// grows. Sizes arrive from a device-controlled wire field, so negative
    /// values are rejected rather than wrapped.
    pub fn ensure_capacity(&mut self, direction: Direction, min_size: i64) -> Result<(), BufferError> {
        if min_size < 0 {
            return Err(BufferError::InvalidSize(min_size));
        }
        let min_size = min_size as usize;

        let (buffer, default_size) = match direction {
            Direction::Out => (&mut self.outbound, DEFAULT_OUT_SIZE),
            Direction::In => (&mut self.inbound, DEFAULT_IN_SIZE),
        };
        let size = if buffer.capacity() == 0 {
            default_size.max(min_size)
        } else {
            buffer.capacity().max(min_size)
        };

        if let Err(err) = buffer.grow(size) {
            debug!("failed to allocate {size} byte {direction:?} buffer, releasing the pair");
            self.release();
            return Err(err);
        }
        Ok(())
    }

    /// Writes a command payload into the outbound buffer and narrows the
    /// bound transfer length to it.
    pub fn write_command(&mut self, payload: &[u8]) -> Result<(), BufferError> {
        self.ensure_capacity(Direction::Out, payload.len() as i64)?;
        self.outbound.storage[..payload.len()].copy_from_slice(payload);
        self.outbound.transfer_len = payload.len();
        Ok(())
    }

    /// Frees both buffers and resets all sizes. Safe to call on a pair that
    /// was never allocated.
    pub fn release(&mut self) {
        self.outbound.release();
        self.inbound.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_size_is_rejected_without_allocating() {
        let mut buffers = TransferBuffers::default();
        assert_eq!(
            buffers.ensure_capacity(Direction::In, -1),
            Err(BufferError::InvalidSize(-1))
        );
        assert_eq!(buffers.inbound().capacity(), 0);
        assert_eq!(buffers.inbound().transfer_len(), 0);
    }

    #[test]
    fn first_allocation_uses_direction_defaults() {
        let mut buffers = TransferBuffers::default();
        buffers.ensure_capacity(Direction::In, 0).unwrap();
        buffers.ensure_capacity(Direction::Out, 0).unwrap();

        assert_eq!(buffers.inbound().capacity(), DEFAULT_IN_SIZE);
        assert_eq!(buffers.outbound().capacity(), DEFAULT_OUT_SIZE);
    }

    #[test]
    fn growth_never_shrinks_and_rebinds_the_transfer() {
        let mut buffers = TransferBuffers::default();
        buffers.ensure_capacity(Direction::In, 4096).unwrap();
        assert_eq!(buffers.inbound().capacity(), 4096);
        assert_eq!(buffers.inbound().transfer_len(), 4096);

        // Asking for less must not shrink below the earlier minimum.
        buffers.ensure_capacity(Direction::In, 10).unwrap();
        assert_eq!(buffers.inbound().capacity(), 4096);
        assert_eq!(buffers.inbound().transfer_len(), buffers.inbound().capacity());
    }

    #[test]
    fn growth_preserves_existing_bytes() {
        let mut buffers = TransferBuffers::default();
        buffers.ensure_capacity(Direction::In, 4).unwrap();
        buffers.inbound_mut().bytes_mut()[..4].copy_from_slice(b"spbv");

        buffers.ensure_capacity(Direction::In, 512).unwrap();
        assert_eq!(&buffers.inbound().payload()[..4], b"spbv");
    }

    #[test]
    fn write_command_narrows_the_bound_length() {
        let mut buffers = TransferBuffers::default();
        buffers.write_command(b":SDSLVER#").unwrap();

        assert_eq!(buffers.outbound().payload(), b":SDSLVER#");
        assert_eq!(buffers.outbound().transfer_len(), 9);
        assert_eq!(buffers.outbound().capacity(), DEFAULT_OUT_SIZE);
    }

    #[test]
    fn release_is_idempotent() {
        let mut buffers = TransferBuffers::default();
        // Never allocated.
        buffers.release();

        buffers.ensure_capacity(Direction::In, 0).unwrap();
        buffers.ensure_capacity(Direction::Out, 0).unwrap();
        buffers.release();
        buffers.release();

        assert_eq!(buffers.inbound().capacity(), 0);
        assert_eq!(buffers.outbound().capacity(), 0);
        assert_eq!(buffers.inbound().transfer_len(), 0);
        assert_eq!(buffers.outbound().transfer_len(), 0);
    }
}
