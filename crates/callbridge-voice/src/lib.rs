//! Voice-AI session adapter for the callbridge relay.
//!
//! Owns the upstream connection to the conversational-voice provider for the
//! lifetime of one call:
//!
//! 1. [`ElevenLabsClient`] fetches a signed connection URL, opens the socket
//!    and sends the conversation initiation message built by
//!    [`ConversationRequest::initiation`].
//! 2. A supervised task ([`link::run_link`]) then owns the socket. It writes
//!    frames queued through the returned [`VoiceLink`] and dispatches provider
//!    events: audio and barge-in go to the telephony socket through the
//!    [`VoiceBridge`], conversation ids go to the session registry, pings are
//!    answered in place. An `end_of_conversation` event or a normal close from
//!    the provider is reported once as a [`LinkEnd`].
//!
//! The telephony side never touches the provider socket directly; it only
//! queues [`ClientMessage`]s on the link, which keeps each socket to a single
//! writer and preserves audio order.

pub mod client;
pub mod config;
pub mod error;
pub mod initiation;
pub mod link;
pub mod messages;

pub use client::{ElevenLabsClient, VoiceConnector};
pub use config::VoiceConfig;
pub use error::VoiceError;
pub use initiation::{ConversationRequest, FIRST_MESSAGE, GENERIC_PROMPT};
pub use link::{LinkEnd, Outgoing, VoiceBridge, VoiceLink};
pub use messages::{ClientMessage, ProviderEvent};
