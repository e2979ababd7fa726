//! In-memory session bookkeeping for bridged calls.
//!
//! A [`Session`] correlates one phone call's telephony identifiers with the
//! voice-AI conversation identifier and the caller profile. Sessions live in
//! a [`SessionRegistry`], an explicitly constructed handle that is cloned into
//! every task that needs it. There is no process-wide table: tests build an
//! isolated registry per case.
//!
//! Inbound sessions are keyed by the media stream identifier, outbound
//! sessions by the call identifier. The registry does not care which; it only
//! guarantees that a key maps to at most one session at a time.

mod registry;
mod session;


pub use registry::{ConversationAssignment, SessionRegistry};
pub use session::{mask_phone, Session};
