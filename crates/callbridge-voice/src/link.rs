//! The supervised task that owns one voice-AI provider socket.

use crate::error::VoiceError;
use crate::messages::{discriminator, ClientMessage, ProviderEvent};
use callbridge_session::{ConversationAssignment, SessionRegistry};
use callbridge_telephony::TelephonyCommand;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};

/// Queue depth between the telephony task and the provider socket writer.
pub const LINK_QUEUE_CAPACITY: usize = 256;

/// How the provider side of a call finished on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEnd {
    /// `end_of_conversation` was received.
    ConversationEnded,
    /// The provider closed the socket normally.
    ProviderClosed,
}

/// Where provider events for one call are delivered.
#[derive(Debug, Clone)]
pub struct VoiceBridge {
    pub registry: SessionRegistry,
    /// Registry key of the session (stream id inbound, call id outbound).
    pub session_key: String,
    /// Media stream that audio and barge-in commands are addressed to.
    pub stream_sid: String,
    pub telephony: mpsc::Sender<TelephonyCommand>,
    /// Told once when the provider ends the call.
    pub ended: mpsc::Sender<LinkEnd>,
}

impl VoiceBridge {
    /// Queues a command for the telephony socket writer, preserving order.
    pub async fn forward(&self, command: TelephonyCommand) {
        if self.telephony.send(command).await.is_err() {
            tracing::debug!(
                stream_sid = %self.stream_sid,
                "telephony socket writer gone, dropping command"
            );
        }
    }

    /// Reports that the provider ended the call. Only the first report per
    /// call is kept.
    pub fn signal_end(&self, end: LinkEnd) {
        match self.ended.try_send(end) {
            Ok(()) => tracing::info!(
                stream_sid = %self.stream_sid,
                reason = ?end,
                "voice provider ended the call"
            ),
            Err(mpsc::error::TrySendError::Full(_)) => {}
            Err(mpsc::error::TrySendError::Closed(_)) => tracing::debug!(
                stream_sid = %self.stream_sid,
                "relay gone, dropping end signal"
            ),
        }
    }
}

/// Instruction queued for the provider socket writer.
#[derive(Debug)]
pub enum Outgoing {
    Message(ClientMessage),
    /// Send a close frame and stop the task.
    Close,
}

/// Handle to an open voice-AI session.
///
/// Dropping the handle closes the outgoing queue, which ends the task after
/// it sends a close frame.
#[derive(Debug)]
pub struct VoiceLink {
    outgoing: mpsc::Sender<Outgoing>,
    task: JoinHandle<()>,
}

impl VoiceLink {
    pub fn new(outgoing: mpsc::Sender<Outgoing>, task: JoinHandle<()>) -> Self {
        Self { outgoing, task }
    }

    /// Spawns the link task over an already negotiated socket.
    pub fn spawn<S>(socket: S, bridge: VoiceBridge) -> Self
    where
        S: Stream<Item = Result<Message, tungstenite::Error>>
            + Sink<Message, Error = tungstenite::Error>
            + Unpin
            + Send
            + 'static,
    {
        let (tx, rx) = mpsc::channel(LINK_QUEUE_CAPACITY);
        let task = tokio::spawn(run_link(socket, bridge, rx));
        Self::new(tx, task)
    }

    pub fn is_open(&self) -> bool {
        !self.outgoing.is_closed() && !self.task.is_finished()
    }

    pub async fn send(&self, message: ClientMessage) -> Result<(), VoiceError> {
        self.outgoing
            .send(Outgoing::Message(message))
            .await
            .map_err(|_| VoiceError::LinkClosed)
    }

    /// Ends the conversation and waits up to `grace` for the task to finish,
    /// aborting it afterwards.
    pub async fn close(mut self, grace: Duration) {
        if self.is_open() {
            let _ = self
                .outgoing
                .send(Outgoing::Message(ClientMessage::end_conversation()))
                .await;
            let _ = self.outgoing.send(Outgoing::Close).await;
        }

        match tokio::time::timeout(grace, &mut self.task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.is_panic() => {
                tracing::error!("voice link task panicked: {}", e);
            }
            Ok(Err(_)) => {}
            Err(_) => {
                tracing::warn!(
                    grace_ms = grace.as_millis() as u64,
                    "voice link did not close in time, aborting"
                );
                self.task.abort();
            }
        }
    }
}

/// Drives one provider socket until either side closes it.
pub async fn run_link<S>(socket: S, bridge: VoiceBridge, mut outgoing: mpsc::Receiver<Outgoing>)
where
    S: Stream<Item = Result<Message, tungstenite::Error>>
        + Sink<Message, Error = tungstenite::Error>
        + Unpin,
{
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            queued = outgoing.recv() => match queued {
                Some(Outgoing::Message(message)) => {
                    if let Err(e) = sink.send(Message::text(message.to_json())).await {
                        tracing::warn!(stream_sid = %bridge.stream_sid, "voice socket write failed: {}", e);
                        break;
                    }
                }
                Some(Outgoing::Close) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Some(reply) = dispatch_frame(&bridge, text.as_str()).await {
                        if let Err(e) = sink.send(Message::text(reply.to_json())).await {
                            tracing::warn!(stream_sid = %bridge.stream_sid, "voice socket write failed: {}", e);
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    if is_normal_close(frame.as_ref()) {
                        tracing::info!(stream_sid = %bridge.stream_sid, "voice socket closed by provider");
                        bridge.signal_end(LinkEnd::ProviderClosed);
                    } else {
                        tracing::warn!(
                            stream_sid = %bridge.stream_sid,
                            code = frame.as_ref().map(|f| u16::from(f.code)).unwrap_or_default(),
                            "voice socket closed abnormally"
                        );
                    }
                    break;
                }
                None => {
                    tracing::info!(stream_sid = %bridge.stream_sid, "voice socket ended without close frame");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(stream_sid = %bridge.stream_sid, "voice socket read failed: {}", e);
                    break;
                }
            },
        }
    }

    tracing::debug!(stream_sid = %bridge.stream_sid, "voice link finished");
}

/// A close with no status or 1000 ends the call; other codes do not.
fn is_normal_close(frame: Option<&CloseFrame>) -> bool {
    match frame {
        None => true,
        Some(frame) => matches!(frame.code, CloseCode::Normal | CloseCode::Status),
    }
}

/// Decodes and handles one text frame, returning a reply for the provider.
pub async fn dispatch_frame(bridge: &VoiceBridge, text: &str) -> Option<ClientMessage> {
    match ProviderEvent::decode(text) {
        Ok(ProviderEvent::Unhandled) => {
            tracing::debug!(
                kind = discriminator(text).as_deref().unwrap_or("unknown"),
                "ignoring provider event"
            );
            None
        }
        Ok(event) => handle_event(bridge, event).await,
        Err(e) => {
            tracing::debug!(
                kind = discriminator(text).as_deref().unwrap_or("unknown"),
                "malformed provider frame: {}",
                e
            );
            None
        }
    }
}

pub async fn handle_event(bridge: &VoiceBridge, event: ProviderEvent) -> Option<ClientMessage> {
    match event {
        ProviderEvent::Audio { audio_event } => {
            bridge
                .forward(TelephonyCommand::media(
                    bridge.stream_sid.clone(),
                    audio_event.audio_base_64,
                ))
                .await;
            None
        }
        ProviderEvent::ConversationInitiationMetadata {
            conversation_initiation_metadata_event: metadata,
        } => {
            match bridge
                .registry
                .assign_conversation_id(&bridge.session_key, &metadata.conversation_id)
            {
                ConversationAssignment::Assigned => tracing::info!(
                    session = %bridge.session_key,
                    conversation_id = %metadata.conversation_id,
                    "voice conversation started"
                ),
                ConversationAssignment::AlreadyAssigned(existing) => tracing::debug!(
                    session = %bridge.session_key,
                    existing = %existing,
                    ignored = %metadata.conversation_id,
                    "conversation id already assigned"
                ),
                ConversationAssignment::Missing => tracing::debug!(
                    session = %bridge.session_key,
                    "conversation metadata for unknown session"
                ),
            }
            None
        }
        ProviderEvent::Interruption => {
            bridge
                .forward(TelephonyCommand::clear(bridge.stream_sid.clone()))
                .await;
            None
        }
        ProviderEvent::Ping { ping_event } => ping_event.event_id.map(ClientMessage::pong),
        ProviderEvent::EndOfConversation => {
            bridge.signal_end(LinkEnd::ConversationEnded);
            None
        }
        ProviderEvent::Unhandled => None,
    }
}
