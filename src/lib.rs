//! Crate for talking to OWON VDS series oscilloscopes over their USB bulk
//! link. Not affiliated with Owon.
//!
//! The engine is built around a per-device [`Session`](session::Session)
//! that tracks which [`Target`](protocol::Target) command is queued and in
//! flight, owns the [transfer buffers](buffer), and incrementally decodes
//! the two-packet identification reply into a
//! [`DeviceIdentity`](identity::DeviceIdentity).
//!
//! Opening and claiming the USB device is the caller's job; the opened link
//! arrives as an implementation of [`Transport`](connection::Transport) and
//! the caller drives exchanges by pumping its completions through
//! [`Session::pump_events`](session::Session::pump_events). A typical
//! discovery flow matches the device's iSerialNumber string against
//! [`models::MODELS`] and then runs
//! [`Session::identify`](session::Session::identify).

pub mod buffer;
pub mod connection;
pub mod identity;
pub mod models;
pub mod protocol;
pub mod session;
