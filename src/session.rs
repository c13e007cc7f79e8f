//! Per-device session: target state machine, completion handling, and the
//! cooperative event pump.
//!
//! A [`Session`] owns everything for one open device: the three target
//! fields, the accumulated [`DeviceIdentity`], and both transfer buffers.
//! Callers queue work with [`Session::request`] and then drive the exchange
//! by pumping transport completions through [`Session::pump_events`];
//! exactly one completion is dispatched at a time, so no locking is needed.

use log::{trace, warn};
use thiserror::Error;

use crate::buffer::{BufferError, Direction, TransferBuffers};
use crate::connection::{Transport, TransportError, TransferEvent, TransferStatus, USB_TIMEOUT};
use crate::identity::DeviceIdentity;
use crate::models::VdsModel;
use crate::protocol::{decode_version_reply, DecodeError, Target, VersionProgress, VERSION_COMMAND};

/// Event-loop turns the identification handshake is given before the
/// device is reported unusable: one send plus two reply packets.
pub const IDENTIFY_EVENT_TURNS: usize = 3;

#[derive(Error, Debug)]
pub enum DeviceError {
    /// A command was requested while another exchange is outstanding.
    #[error("a command is already outstanding")]
    Busy,

    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The identification reply could not be parsed. Whatever decoded
    /// before the failure stays populated; the caller should treat the
    /// device as unsupported.
    #[error("malformed identification reply: {0}")]
    MalformedReply(#[from] DecodeError),
}

/// The per-connection aggregate. Created when a device is opened, released
/// when it is closed; never shared between connections.
#[derive(Debug)]
pub struct Session {
    model: &'static VdsModel,
    identity: DeviceIdentity,
    buffers: TransferBuffers,
    /// Target of the outstanding exchange.
    current_target: Target,
    /// Target queued for the next exchange.
    next_target: Target,
    /// Reserved for targets that need automatic resubmission. No current
    /// transition drives it; it is only cleared by the fail-fast reset.
    repeat_target: Target,
}

impl Session {
    pub fn new(model: &'static VdsModel) -> Self {
        Self {
            model,
            identity: DeviceIdentity::default(),
            buffers: TransferBuffers::default(),
            current_target: Target::None,
            next_target: Target::None,
            repeat_target: Target::None,
        }
    }

    pub fn model(&self) -> &'static VdsModel {
        self.model
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn current_target(&self) -> Target {
        self.current_target
    }

    pub fn next_target(&self) -> Target {
        self.next_target
    }

    pub fn repeat_target(&self) -> Target {
        self.repeat_target
    }

    /// Allocates both transfer buffers at their default sizes, as done once
    /// when the device is opened.
    pub fn init_transfers(&mut self) -> Result<(), DeviceError> {
        self.buffers.ensure_capacity(Direction::Out, 0)?;
        self.buffers.ensure_capacity(Direction::In, 0)?;
        Ok(())
    }

    /// Queues `target` and submits the exchange.
    ///
    /// Fails with [`DeviceError::Busy`], leaving all state untouched, while
    /// an exchange is outstanding. A [`Target::None`] request is a no-op
    /// success. [`Target::Stop`] sends no payload; it takes effect once the
    /// receive cycle it rides on completes, never by interrupting a
    /// transfer in flight.
    pub fn request<T: Transport>(
        &mut self,
        target: Target,
        transport: &mut T,
    ) -> Result<(), DeviceError> {
        if self.current_target != Target::None {
            warn!("pending usb message");
            return Err(DeviceError::Busy);
        }
        self.next_target = target;
        match self.next_target {
            Target::None => return Ok(()),
            Target::Stop => self.buffers.write_command(&[])?,
            Target::GetVersion => self.buffers.write_command(VERSION_COMMAND)?,
        }
        self.buffers.ensure_capacity(Direction::In, 0)?;

        transport.submit_out(self.buffers.outbound().payload(), USB_TIMEOUT)?;
        transport.submit_in(self.buffers.inbound().transfer_len(), USB_TIMEOUT)?;
        Ok(())
    }

    /// Outbound completion: the queued target is now the one in flight.
    /// The transmit side performs no further I/O.
    pub fn handle_transmit_complete(&mut self, status: TransferStatus) {
        self.current_target = self.next_target;
        self.next_target = Target::None;
        trace!("transmit transfer completed with status {status:?}");
    }

    /// Inbound completion: decode, grow, resubmit, or finish.
    ///
    /// A non-success status resets every target field and is reported as a
    /// warning, not an error; the session stays open for new commands.
    pub fn handle_receive_complete<T: Transport>(
        &mut self,
        transport: &mut T,
        status: TransferStatus,
        actual: usize,
    ) -> Result<(), DeviceError> {
        if !status.is_completed() {
            self.current_target = Target::None;
            self.next_target = Target::None;
            self.repeat_target = Target::None;
            warn!("usb reply failed: {status:?}");
            return Ok(());
        }

        match self.current_target {
            Target::None => {}
            Target::Stop => {
                // The receive cycle the stop rode on is done.
                self.current_target = Target::None;
            }
            Target::GetVersion => {
                let progress = decode_version_reply(
                    self.buffers.inbound_mut().bytes_mut(),
                    actual,
                    self.model,
                    &mut self.identity,
                )?;
                match progress {
                    VersionProgress::NeedMoreInput(next_size) => {
                        if next_size > self.buffers.inbound().capacity() {
                            self.buffers.ensure_capacity(Direction::In, next_size as i64)?;
                        }
                        transport.submit_in(self.buffers.inbound().transfer_len(), USB_TIMEOUT)?;
                    }
                    VersionProgress::Complete => {
                        self.current_target = Target::None;
                    }
                    VersionProgress::Indeterminate => {}
                }
            }
        }
        Ok(())
    }

    /// Dispatches up to `count` transport completions.
    ///
    /// Each turn waits twice the per-transfer timeout, so a turn with no
    /// event means the device went quiet. Poll failures stop the pump with
    /// a warning; dispatch failures propagate.
    pub fn pump_events<T: Transport>(
        &mut self,
        transport: &mut T,
        count: usize,
    ) -> Result<(), DeviceError> {
        for _ in 0..count {
            let event = match transport.poll(self.buffers.inbound_mut().bytes_mut(), USB_TIMEOUT * 2) {
                Ok(event) => event,
                Err(err) => {
                    warn!("unable to handle reply: {err}");
                    break;
                }
            };
            match event {
                Some(TransferEvent::Sent { status }) => self.handle_transmit_complete(status),
                Some(TransferEvent::Received { status, actual }) => {
                    self.handle_receive_complete(transport, status, actual)?
                }
                None => {}
            }
        }
        Ok(())
    }

    /// Runs the identification handshake after the device is opened and
    /// reports whether the identity became populated.
    pub fn identify<T: Transport>(&mut self, transport: &mut T) -> Result<bool, DeviceError> {
        self.init_transfers()?;
        self.request(Target::GetVersion, transport)?;
        self.pump_events(transport, IDENTIFY_EVENT_TURNS)?;
        Ok(self.identity.is_populated())
    }

    /// Frees both transfer buffers. Safe to call on a session that was
    /// never initialized, and safe to call twice.
    pub fn release(&mut self) {
        self.buffers.release();
    }
}
