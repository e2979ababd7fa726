//! Per-call relay between a telephony media stream and a voice-AI session.
//!
//! Each accepted media-stream socket gets one [`CallRelay`]. The socket task
//! feeds it decoded [`TelephonyEvent`]s; the relay owns the call's
//! [`VoiceLink`] and a queue to the telephony socket writer, which it shares
//! with the link so provider audio and relay control frames reach the caller
//! in order.
//!
//! Phases: `Idle` until `start`, `Streaming` once the voice session is open,
//! `Disconnecting` while teardown runs, `Closed` afterwards. Outside
//! `Streaming` every event except `stop` is dropped.
//!
//! When the provider ends the conversation or closes its socket normally,
//! the link reports a [`LinkEnd`] and the relay runs the same teardown as a
//! telephony `stop`.

use crate::AppState;
use axum::extract::ws::{Message, WebSocket};
use callbridge_session::Session;
use callbridge_telephony::{MediaChunk, StreamStart, TelephonyCommand, TelephonyEvent};
use callbridge_types::{CallDirection, CallerProfile};
use callbridge_voice::{ClientMessage, ConversationRequest, LinkEnd, VoiceBridge, VoiceLink};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Queue depth for frames bound for the telephony socket.
pub const TELEPHONY_QUEUE_CAPACITY: usize = 256;

/// Custom stream parameter names.
pub const PARAM_CALLER_PHONE: &str = "caller_phone";
pub const PARAM_USER_DATA: &str = "user_data";
pub const PARAM_NUMBER: &str = "number";
pub const PARAM_PROMPT: &str = "prompt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayPhase {
    Idle,
    Streaming,
    Disconnecting,
    Closed,
}

/// Whether the socket loop should keep reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayFlow {
    Continue,
    Stop,
}

pub struct CallRelay {
    state: Arc<AppState>,
    direction: CallDirection,
    phase: RelayPhase,
    stream_sid: Option<String>,
    session_key: Option<String>,
    link: Option<VoiceLink>,
    telephony: mpsc::Sender<TelephonyCommand>,
    ended: mpsc::Sender<LinkEnd>,
}

impl CallRelay {
    pub fn new(
        state: Arc<AppState>,
        direction: CallDirection,
        telephony: mpsc::Sender<TelephonyCommand>,
        ended: mpsc::Sender<LinkEnd>,
    ) -> Self {
        Self {
            state,
            direction,
            phase: RelayPhase::Idle,
            stream_sid: None,
            session_key: None,
            link: None,
            telephony,
            ended,
        }
    }

    pub fn phase(&self) -> RelayPhase {
        self.phase
    }

    pub fn session_key(&self) -> Option<&str> {
        self.session_key.as_deref()
    }

    pub async fn handle_event(&mut self, event: TelephonyEvent) -> RelayFlow {
        if self.phase != RelayPhase::Idle
            && self.phase != RelayPhase::Streaming
            && !matches!(event, TelephonyEvent::Stop)
        {
            tracing::debug!(
                event = event.name(),
                phase = ?self.phase,
                "ignoring event during disconnect"
            );
            return RelayFlow::Continue;
        }

        match event {
            TelephonyEvent::Start { start } => self.on_start(start).await,
            TelephonyEvent::Media { media } => {
                self.on_media(media).await;
                RelayFlow::Continue
            }
            TelephonyEvent::Stop => {
                self.stop().await;
                RelayFlow::Stop
            }
            TelephonyEvent::Ignored => RelayFlow::Continue,
        }
    }

    async fn on_start(&mut self, start: StreamStart) -> RelayFlow {
        if self.phase != RelayPhase::Idle {
            tracing::warn!(stream_sid = %start.stream_sid, "duplicate start event ignored");
            return RelayFlow::Continue;
        }

        let (phone, profile, prompt, key) = match self.direction {
            CallDirection::Inbound => {
                let phone = start
                    .parameter(PARAM_CALLER_PHONE)
                    .unwrap_or("Unknown")
                    .to_string();
                let profile = start.parameter(PARAM_USER_DATA).and_then(decode_user_data);
                (phone, profile, None, start.stream_sid.clone())
            }
            CallDirection::Outbound => {
                let phone = start.parameter(PARAM_NUMBER).unwrap_or("unknown").to_string();
                let profile = match start.parameter(PARAM_NUMBER) {
                    Some(number) if !number.is_empty() => self.state.callers.lookup(number).await,
                    _ => None,
                };
                let prompt = start.parameter(PARAM_PROMPT).map(str::to_string);
                let key = if start.call_sid.is_empty() {
                    tracing::warn!(stream_sid = %start.stream_sid, "start event without call id, keying by stream");
                    start.stream_sid.clone()
                } else {
                    start.call_sid.clone()
                };
                (phone, profile, prompt, key)
            }
        };

        tracing::info!(
            direction = %self.direction,
            stream_sid = %start.stream_sid,
            call_sid = %start.call_sid,
            profiled = profile.is_some(),
            "media stream started"
        );

        let session = Session::new(
            self.direction,
            start.stream_sid.clone(),
            start.call_sid.clone(),
            phone.clone(),
            profile.clone(),
        );
        self.state.registry.put(key.clone(), session);
        self.stream_sid = Some(start.stream_sid.clone());
        self.session_key = Some(key.clone());

        let mut request = ConversationRequest::new(phone, profile);
        if let Some(prompt) = prompt {
            request = request.with_prompt(prompt);
        }
        let bridge = VoiceBridge {
            registry: self.state.registry.clone(),
            session_key: key.clone(),
            stream_sid: start.stream_sid.clone(),
            telephony: self.telephony.clone(),
            ended: self.ended.clone(),
        };

        match self.state.voice.open(&request, bridge).await {
            Ok(link) => {
                self.link = Some(link);
                self.phase = RelayPhase::Streaming;
                RelayFlow::Continue
            }
            Err(e) => {
                tracing::error!(
                    stream_sid = %start.stream_sid,
                    "failed to open voice session: {}",
                    e
                );
                self.state.registry.delete(&key);
                self.session_key = None;
                self.phase = RelayPhase::Closed;
                RelayFlow::Stop
            }
        }
    }

    async fn on_media(&mut self, media: MediaChunk) {
        let Some(link) = self.link.as_ref().filter(|link| link.is_open()) else {
            return;
        };
        if self.phase != RelayPhase::Streaming {
            return;
        }

        let payload = match media.canonical_payload() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(
                    stream_sid = self.stream_sid.as_deref().unwrap_or_default(),
                    "dropping undecodable media chunk: {}",
                    e
                );
                return;
            }
        };

        if let Err(e) = link.send(ClientMessage::user_audio(payload)).await {
            tracing::debug!("voice link rejected audio: {}", e);
        }
    }

    /// Ends the call after the provider finished it.
    pub async fn provider_ended(&mut self, end: LinkEnd) -> RelayFlow {
        if self.phase != RelayPhase::Streaming {
            tracing::debug!(reason = ?end, phase = ?self.phase, "stale provider end ignored");
            return RelayFlow::Continue;
        }
        tracing::info!(
            direction = %self.direction,
            stream_sid = self.stream_sid.as_deref().unwrap_or_default(),
            reason = ?end,
            "voice provider ended the call, disconnecting"
        );
        self.stop().await;
        RelayFlow::Stop
    }

    /// Orderly teardown after a `stop` event.
    pub async fn stop(&mut self) {
        if self.phase == RelayPhase::Closed {
            return;
        }
        self.teardown().await;

        if let Some(stream_sid) = self.stream_sid.clone() {
            self.send_telephony(TelephonyCommand::mark_done(stream_sid.clone()))
                .await;
            self.send_telephony(TelephonyCommand::clear(stream_sid.clone()))
                .await;
            // Outbound calls keep their line open here; the provider ends the
            // call once the stream closes.
            if self.direction == CallDirection::Inbound {
                self.send_telephony(TelephonyCommand::hangup(stream_sid))
                    .await;
            }
        }
        self.phase = RelayPhase::Closed;
    }

    /// Teardown after the telephony socket failed, closed, or the process is
    /// shutting down. No control frames are sent.
    pub async fn abort(&mut self) {
        if self.phase == RelayPhase::Closed {
            return;
        }
        self.teardown().await;
        self.phase = RelayPhase::Closed;
    }

    async fn teardown(&mut self) {
        self.phase = RelayPhase::Disconnecting;
        if let Some(key) = &self.session_key {
            self.state.registry.mark_disconnecting(key);
        }

        if let Some(link) = self.link.take() {
            link.close(self.state.close_grace).await;
        }

        let Some(key) = self.session_key.clone() else {
            return;
        };
        if let Some(session) = self.state.registry.get(&key) {
            let report = session.report();
            let channel = self.direction.webhook_channel();
            if let Err(e) = self.state.notifier.notify(channel, &report).await {
                tracing::error!(
                    channel = channel,
                    call_sid = %report.call_sid,
                    "failed to deliver call report: {}",
                    e
                );
            }
        }
        self.state.registry.delete(&key);
        tracing::info!(direction = %self.direction, session = %key, "call session ended");
    }

    async fn send_telephony(&self, command: TelephonyCommand) {
        if self.telephony.send(command).await.is_err() {
            tracing::debug!("telephony socket writer gone");
        }
    }
}

/// Decodes the URL-encoded JSON profile carried in a stream parameter.
///
/// Accepts both `%20` and `+` for spaces. Empty or malformed profiles are
/// treated as absent.
pub fn decode_user_data(raw: &str) -> Option<CallerProfile> {
    let spaced = raw.replace('+', " ");
    let decoded = match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded,
        Err(e) => {
            tracing::warn!("user data is not valid percent-encoding: {}", e);
            return None;
        }
    };
    match CallerProfile::from_json(&decoded) {
        Ok(profile) => profile.filter(|p| !p.is_empty()),
        Err(e) => {
            tracing::warn!("user data is not valid JSON: {}", e);
            None
        }
    }
}

/// Drives one accepted telephony media-stream socket to completion.
pub async fn run_socket(socket: WebSocket, state: Arc<AppState>, direction: CallDirection) {
    tracing::info!(direction = %direction, "telephony media stream connected");

    let mut shutdown = state.shutdown.subscribe();
    if *shutdown.borrow_and_update() {
        tracing::info!(direction = %direction, "refusing media stream during shutdown");
        let mut socket = socket;
        let _ = socket.send(Message::Close(None)).await;
        return;
    }

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<TelephonyCommand>(TELEPHONY_QUEUE_CAPACITY);
    let (ended_tx, mut ended_rx) = mpsc::channel::<LinkEnd>(1);

    let send_task = tokio::spawn(async move {
        while let Some(command) = rx.recv().await {
            if sender.send(Message::Text(command.to_json().into())).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    let close_grace = state.close_grace;
    let mut relay = CallRelay::new(state, direction, tx, ended_tx);

    loop {
        tokio::select! {
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => match TelephonyEvent::decode(text.as_str()) {
                    Ok(event) => {
                        if relay.handle_event(event).await == RelayFlow::Stop {
                            break;
                        }
                    }
                    Err(e) => tracing::debug!("ignoring malformed telephony frame: {}", e),
                },
                Some(Ok(Message::Close(_))) | None => {
                    tracing::info!(direction = %direction, "telephony media stream closed");
                    relay.abort().await;
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(direction = %direction, "telephony socket read failed: {}", e);
                    relay.abort().await;
                    break;
                }
            },
            Some(end) = ended_rx.recv() => {
                if relay.provider_ended(end).await == RelayFlow::Stop {
                    break;
                }
            }
            Ok(()) = shutdown.changed() => {
                if *shutdown.borrow() {
                    tracing::info!(direction = %direction, "shutting down active call");
                    relay.abort().await;
                    break;
                }
            }
        }
    }

    drop(relay);
    if tokio::time::timeout(close_grace, send_task).await.is_err() {
        tracing::warn!(direction = %direction, "telephony writer did not drain in time");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::CallerDirectory;
    use crate::webhook::{NotifyError, SessionNotifier};
    use async_trait::async_trait;
    use callbridge_session::SessionRegistry;
    use callbridge_telephony::{CallPlacer, TelephonyError};
    use callbridge_types::CallReport;
    use callbridge_voice::{Outgoing, VoiceConnector, VoiceError};
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::watch;

    #[derive(Default)]
    struct FakeVoice {
        fail: bool,
        requests: Mutex<Vec<ConversationRequest>>,
        bridges: Mutex<Vec<VoiceBridge>>,
        sent: Arc<Mutex<Vec<ClientMessage>>>,
    }

    #[async_trait]
    impl VoiceConnector for FakeVoice {
        async fn open(
            &self,
            request: &ConversationRequest,
            bridge: VoiceBridge,
        ) -> Result<VoiceLink, VoiceError> {
            if self.fail {
                return Err(VoiceError::SignedUrlRejected(503));
            }
            self.requests.lock().unwrap().push(request.clone());
            self.bridges.lock().unwrap().push(bridge);

            let (tx, mut rx) = mpsc::channel(16);
            let sent = self.sent.clone();
            let task = tokio::spawn(async move {
                while let Some(outgoing) = rx.recv().await {
                    match outgoing {
                        Outgoing::Message(message) => sent.lock().unwrap().push(message),
                        Outgoing::Close => break,
                    }
                }
            });
            Ok(VoiceLink::new(tx, task))
        }
    }

    #[derive(Default)]
    struct FakeCallers {
        profile: Option<CallerProfile>,
        lookups: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CallerDirectory for FakeCallers {
        async fn lookup(&self, phone: &str) -> Option<CallerProfile> {
            self.lookups.lock().unwrap().push(phone.to_string());
            self.profile.clone()
        }
    }

    #[derive(Default)]
    struct FakeNotifier {
        fail: bool,
        reports: Mutex<Vec<(String, CallReport)>>,
    }

    #[async_trait]
    impl SessionNotifier for FakeNotifier {
        async fn notify(&self, channel: &str, report: &CallReport) -> Result<(), NotifyError> {
            self.reports
                .lock()
                .unwrap()
                .push((channel.to_string(), report.clone()));
            if self.fail {
                Err(NotifyError::Rejected {
                    status: 500,
                    body: "down".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    struct NoCalls;

    #[async_trait]
    impl CallPlacer for NoCalls {
        async fn place_call(&self, _to: &str, _url: &str) -> Result<String, TelephonyError> {
            Err(TelephonyError::MissingCallSid)
        }
    }

    struct Harness {
        state: Arc<AppState>,
        voice: Arc<FakeVoice>,
        callers: Arc<FakeCallers>,
        notifier: Arc<FakeNotifier>,
    }

    fn harness(voice: FakeVoice, callers: FakeCallers, notifier: FakeNotifier) -> Harness {
        let voice = Arc::new(voice);
        let callers = Arc::new(callers);
        let notifier = Arc::new(notifier);
        let (shutdown, _) = watch::channel(false);
        let state = Arc::new(AppState {
            registry: SessionRegistry::new(),
            voice: voice.clone(),
            callers: callers.clone(),
            notifier: notifier.clone(),
            calls: Arc::new(NoCalls),
            public_host: None,
            close_grace: Duration::from_millis(200),
            shutdown: Arc::new(shutdown),
        });
        Harness {
            state,
            voice,
            callers,
            notifier,
        }
    }

    fn relay_for(
        h: &Harness,
        direction: CallDirection,
        tx: mpsc::Sender<TelephonyCommand>,
    ) -> CallRelay {
        let (ended, _) = mpsc::channel(1);
        CallRelay::new(h.state.clone(), direction, tx, ended)
    }

    fn event(value: serde_json::Value) -> TelephonyEvent {
        TelephonyEvent::decode(&value.to_string()).unwrap()
    }

    fn inbound_start() -> TelephonyEvent {
        let user_data = urlencoding::encode(r#"{"debtor_id":"d1"}"#).into_owned();
        event(json!({
            "event": "start",
            "start": {
                "streamSid": "SS1",
                "callSid": "CA1",
                "customParameters": {"caller_phone": "+15551234567", "user_data": user_data}
            }
        }))
    }

    fn media(payload: &str) -> TelephonyEvent {
        event(json!({"event": "media", "media": {"payload": payload}}))
    }

    fn stop() -> TelephonyEvent {
        event(json!({"event": "stop"}))
    }

    fn drain(rx: &mut mpsc::Receiver<TelephonyCommand>) -> Vec<TelephonyCommand> {
        let mut out = Vec::new();
        while let Ok(command) = rx.try_recv() {
            out.push(command);
        }
        out
    }

    #[tokio::test]
    async fn inbound_call_end_to_end() {
        let h = harness(FakeVoice::default(), FakeCallers::default(), FakeNotifier::default());
        let (tx, mut rx) = mpsc::channel(32);
        let mut relay = relay_for(&h, CallDirection::Inbound, tx);

        assert_eq!(relay.handle_event(inbound_start()).await, RelayFlow::Continue);
        assert_eq!(relay.phase(), RelayPhase::Streaming);
        assert!(h.state.registry.contains("SS1"));

        let request = h.voice.requests.lock().unwrap()[0].clone();
        assert_eq!(request.counterparty_phone, "+15551234567");
        assert_eq!(
            request.caller_profile.as_ref().and_then(|p| p.subject_id()).as_deref(),
            Some("d1")
        );

        let bridge = h.voice.bridges.lock().unwrap()[0].clone();
        callbridge_voice::link::dispatch_frame(
            &bridge,
            r#"{"type":"conversation_initiation_metadata","conversation_initiation_metadata_event":{"conversation_id":"conv-1"}}"#,
        )
        .await;

        relay.handle_event(media("AAA=")).await;
        assert_eq!(relay.handle_event(stop()).await, RelayFlow::Stop);
        assert_eq!(relay.phase(), RelayPhase::Closed);

        let sent = h.voice.sent.lock().unwrap().clone();
        assert_eq!(
            sent,
            vec![
                ClientMessage::user_audio("AAA="),
                ClientMessage::end_conversation()
            ]
        );

        let reports = h.notifier.reports.lock().unwrap().clone();
        assert_eq!(
            reports,
            vec![(
                "inbound-calls".to_string(),
                CallReport {
                    conversation_id: "conv-1".into(),
                    phone_number: "+15551234567".into(),
                    call_sid: "SS1".into(),
                }
            )]
        );
        assert!(!h.state.registry.contains("SS1"));

        assert_eq!(
            drain(&mut rx),
            vec![
                TelephonyCommand::mark_done("SS1"),
                TelephonyCommand::clear("SS1"),
                TelephonyCommand::hangup("SS1"),
            ]
        );
    }

    #[tokio::test]
    async fn media_after_stop_is_dropped() {
        let h = harness(FakeVoice::default(), FakeCallers::default(), FakeNotifier::default());
        let (tx, _rx) = mpsc::channel(32);
        let mut relay = relay_for(&h, CallDirection::Inbound, tx);

        relay.handle_event(inbound_start()).await;
        relay.handle_event(stop()).await;
        relay.handle_event(media("BBB=")).await;

        let sent = h.voice.sent.lock().unwrap().clone();
        assert!(!sent.contains(&ClientMessage::user_audio("BBB=")));
        assert!(h.state.registry.is_empty());
    }

    #[tokio::test]
    async fn audio_is_forwarded_in_arrival_order() {
        let h = harness(FakeVoice::default(), FakeCallers::default(), FakeNotifier::default());
        let (tx, _rx) = mpsc::channel(32);
        let mut relay = relay_for(&h, CallDirection::Inbound, tx);

        relay.handle_event(inbound_start()).await;
        let chunks = ["AAA=", "AAE=", "AAI=", "AAM="];
        for chunk in chunks {
            relay.handle_event(media(chunk)).await;
        }
        relay.handle_event(stop()).await;

        let sent = h.voice.sent.lock().unwrap().clone();
        let expected: Vec<ClientMessage> = chunks
            .iter()
            .map(|c| ClientMessage::user_audio(*c))
            .chain(std::iter::once(ClientMessage::end_conversation()))
            .collect();
        assert_eq!(sent, expected);
    }

    #[tokio::test]
    async fn media_before_start_and_invalid_chunks_are_dropped() {
        let h = harness(FakeVoice::default(), FakeCallers::default(), FakeNotifier::default());
        let (tx, _rx) = mpsc::channel(32);
        let mut relay = relay_for(&h, CallDirection::Inbound, tx);

        relay.handle_event(media("AAA=")).await;
        relay.handle_event(inbound_start()).await;
        relay.handle_event(media("not base64!")).await;
        relay.handle_event(stop()).await;

        let sent = h.voice.sent.lock().unwrap().clone();
        assert_eq!(sent, vec![ClientMessage::end_conversation()]);
    }

    #[tokio::test]
    async fn webhook_failure_still_removes_session() {
        let notifier = FakeNotifier {
            fail: true,
            ..FakeNotifier::default()
        };
        let h = harness(FakeVoice::default(), FakeCallers::default(), notifier);
        let (tx, mut rx) = mpsc::channel(32);
        let mut relay = relay_for(&h, CallDirection::Inbound, tx);

        relay.handle_event(inbound_start()).await;
        relay.handle_event(stop()).await;

        assert_eq!(h.notifier.reports.lock().unwrap().len(), 1);
        assert_eq!(
            h.notifier.reports.lock().unwrap()[0].1.conversation_id,
            ""
        );
        assert!(h.state.registry.is_empty());
        assert_eq!(drain(&mut rx).len(), 3);
    }

    #[tokio::test]
    async fn voice_open_failure_rolls_back_session() {
        let voice = FakeVoice {
            fail: true,
            ..FakeVoice::default()
        };
        let h = harness(voice, FakeCallers::default(), FakeNotifier::default());
        let (tx, mut rx) = mpsc::channel(32);
        let mut relay = relay_for(&h, CallDirection::Inbound, tx);

        assert_eq!(relay.handle_event(inbound_start()).await, RelayFlow::Stop);
        assert_eq!(relay.phase(), RelayPhase::Closed);
        assert!(h.state.registry.is_empty());
        assert!(h.notifier.reports.lock().unwrap().is_empty());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn outbound_call_looks_up_profile_and_omits_hangup() {
        let callers = FakeCallers {
            profile: CallerProfile::from_value(json!({"debtor_id": 42})),
            ..FakeCallers::default()
        };
        let h = harness(FakeVoice::default(), callers, FakeNotifier::default());
        let (tx, mut rx) = mpsc::channel(32);
        let mut relay = relay_for(&h, CallDirection::Outbound, tx);

        let start = event(json!({
            "event": "start",
            "start": {
                "streamSid": "SS9",
                "callSid": "CA9",
                "customParameters": {"number": "+15557654321", "prompt": "Mention the due date."}
            }
        }));
        relay.handle_event(start).await;

        assert_eq!(relay.session_key(), Some("CA9"));
        assert!(h.state.registry.contains("CA9"));
        assert_eq!(*h.callers.lookups.lock().unwrap(), vec!["+15557654321".to_string()]);
        let request = h.voice.requests.lock().unwrap()[0].clone();
        assert_eq!(request.prompt.as_deref(), Some("Mention the due date."));
        assert_eq!(
            request.caller_profile.and_then(|p| p.subject_id()).as_deref(),
            Some("42")
        );

        relay.handle_event(stop()).await;

        let reports = h.notifier.reports.lock().unwrap().clone();
        assert_eq!(reports[0].0, "outbound-calls");
        assert_eq!(reports[0].1.call_sid, "CA9");
        assert_eq!(reports[0].1.phone_number, "+15557654321");
        assert_eq!(
            drain(&mut rx),
            vec![TelephonyCommand::mark_done("SS9"), TelephonyCommand::clear("SS9")]
        );
    }

    #[tokio::test]
    async fn outbound_without_profile_uses_generic_context() {
        let h = harness(FakeVoice::default(), FakeCallers::default(), FakeNotifier::default());
        let (tx, _rx) = mpsc::channel(32);
        let mut relay = relay_for(&h, CallDirection::Outbound, tx);

        let start = event(json!({
            "event": "start",
            "start": {"streamSid": "SS2", "callSid": "CA2", "customParameters": {"number": "+1"}}
        }));
        assert_eq!(relay.handle_event(start).await, RelayFlow::Continue);
        let request = h.voice.requests.lock().unwrap()[0].clone();
        assert!(request.caller_profile.is_none());
        relay.abort().await;
    }

    #[tokio::test]
    async fn abort_reports_without_control_frames() {
        let h = harness(FakeVoice::default(), FakeCallers::default(), FakeNotifier::default());
        let (tx, mut rx) = mpsc::channel(32);
        let mut relay = relay_for(&h, CallDirection::Inbound, tx);

        relay.handle_event(inbound_start()).await;
        relay.abort().await;
        relay.abort().await;

        assert_eq!(relay.phase(), RelayPhase::Closed);
        assert_eq!(h.notifier.reports.lock().unwrap().len(), 1);
        assert!(h.state.registry.is_empty());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn duplicate_start_keeps_first_session() {
        let h = harness(FakeVoice::default(), FakeCallers::default(), FakeNotifier::default());
        let (tx, _rx) = mpsc::channel(32);
        let mut relay = relay_for(&h, CallDirection::Inbound, tx);

        relay.handle_event(inbound_start()).await;
        relay.handle_event(inbound_start()).await;
        assert_eq!(h.voice.requests.lock().unwrap().len(), 1);
        relay.abort().await;
    }

    #[tokio::test]
    async fn provider_end_tears_down_inbound_call() {
        let h = harness(FakeVoice::default(), FakeCallers::default(), FakeNotifier::default());
        let (tx, mut rx) = mpsc::channel(32);
        let (ended, mut ended_rx) = mpsc::channel(1);
        let mut relay = CallRelay::new(h.state.clone(), CallDirection::Inbound, tx, ended);

        relay.handle_event(inbound_start()).await;
        let bridge = h.voice.bridges.lock().unwrap()[0].clone();
        callbridge_voice::link::dispatch_frame(&bridge, r#"{"type":"end_of_conversation"}"#).await;

        let end = ended_rx.recv().await.unwrap();
        assert_eq!(end, LinkEnd::ConversationEnded);
        assert_eq!(relay.provider_ended(end).await, RelayFlow::Stop);

        assert_eq!(relay.phase(), RelayPhase::Closed);
        assert!(h.state.registry.is_empty());
        assert_eq!(h.notifier.reports.lock().unwrap().len(), 1);
        assert_eq!(
            drain(&mut rx),
            vec![
                TelephonyCommand::mark_done("SS1"),
                TelephonyCommand::clear("SS1"),
                TelephonyCommand::hangup("SS1"),
            ]
        );

        // Media arriving after the provider hung up goes nowhere.
        relay.handle_event(media("AAA=")).await;
        assert!(!h
            .voice
            .sent
            .lock()
            .unwrap()
            .contains(&ClientMessage::user_audio("AAA=")));
    }

    #[tokio::test]
    async fn provider_close_on_outbound_call_skips_hangup() {
        let h = harness(FakeVoice::default(), FakeCallers::default(), FakeNotifier::default());
        let (tx, mut rx) = mpsc::channel(32);
        let mut relay = relay_for(&h, CallDirection::Outbound, tx);

        let start = event(json!({
            "event": "start",
            "start": {"streamSid": "SS3", "callSid": "CA3", "customParameters": {"number": "+1"}}
        }));
        relay.handle_event(start).await;
        assert_eq!(
            relay.provider_ended(LinkEnd::ProviderClosed).await,
            RelayFlow::Stop
        );

        let reports = h.notifier.reports.lock().unwrap().clone();
        assert_eq!(reports[0].0, "outbound-calls");
        assert!(h.state.registry.is_empty());
        assert_eq!(
            drain(&mut rx),
            vec![TelephonyCommand::mark_done("SS3"), TelephonyCommand::clear("SS3")]
        );
    }

    #[tokio::test]
    async fn provider_end_outside_streaming_is_ignored() {
        let h = harness(FakeVoice::default(), FakeCallers::default(), FakeNotifier::default());
        let (tx, mut rx) = mpsc::channel(32);
        let mut relay = relay_for(&h, CallDirection::Inbound, tx);

        assert_eq!(
            relay.provider_ended(LinkEnd::ProviderClosed).await,
            RelayFlow::Continue
        );
        assert_eq!(relay.phase(), RelayPhase::Idle);

        relay.handle_event(inbound_start()).await;
        relay.handle_event(stop()).await;
        drain(&mut rx);
        assert_eq!(
            relay.provider_ended(LinkEnd::ConversationEnded).await,
            RelayFlow::Continue
        );
        assert_eq!(h.notifier.reports.lock().unwrap().len(), 1);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn user_data_decoding() {
        let encoded = urlencoding::encode(r#"{"debtor_id":"d1","name":"Ann Lee"}"#).into_owned();
        let profile = decode_user_data(&encoded).unwrap();
        assert_eq!(profile.subject_id().as_deref(), Some("d1"));

        let plus_spaced = "%7B%22name%22%3A%22Ann+Lee%22%7D";
        let profile = decode_user_data(plus_spaced).unwrap();
        assert_eq!(profile.get("name"), Some(&json!("Ann Lee")));

        assert!(decode_user_data("%7B%7D").is_none());
        assert!(decode_user_data("not-json").is_none());
        assert!(decode_user_data("%5B1%2C2%5D").is_none());
    }
}
