//! Telephony provider surface for the callbridge relay.
//!
//! Three concerns live here:
//!
//! - [`media`]: the media-stream socket protocol, decoded into
//!   [`TelephonyEvent`] and encoded from [`TelephonyCommand`].
//! - [`twiml`]: the markup instruction documents returned from call-setup
//!   callbacks (speak, hang up, open a media stream).
//! - [`client`]: the REST client that places outbound calls.
//!
//! Nothing in this crate holds per-call state; the relay in the server crate
//! owns that.

pub mod client;
pub mod config;
pub mod error;
pub mod media;
pub mod twiml;

pub use client::{CallPlacer, TwilioClient};
pub use config::TelephonyConfig;
pub use error::TelephonyError;
pub use media::{MediaChunk, StreamStart, TelephonyCommand, TelephonyEvent};
pub use twiml::{TwimlResponse, HANGUP_TWIML};
