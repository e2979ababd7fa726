#![allow(dead_code)]

use async_trait::async_trait;
use callbridge_server::authz::CallerDirectory;
use callbridge_server::webhook::{NotifyError, SessionNotifier};
use callbridge_server::AppState;
use callbridge_session::SessionRegistry;
use callbridge_telephony::{CallPlacer, TelephonyError};
use callbridge_types::{CallReport, CallerProfile};
use callbridge_voice::link::dispatch_frame;
use callbridge_voice::{
    ClientMessage, ConversationRequest, Outgoing, VoiceBridge, VoiceConnector, VoiceError,
    VoiceLink,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Voice provider double: replays `script` as provider frames once opened and
/// records every message the relay queues.
#[derive(Default)]
pub struct ScriptedVoice {
    pub script: Vec<String>,
    pub requests: Mutex<Vec<ConversationRequest>>,
    pub sent: Arc<Mutex<Vec<ClientMessage>>>,
}

#[async_trait]
impl VoiceConnector for ScriptedVoice {
    async fn open(
        &self,
        request: &ConversationRequest,
        bridge: VoiceBridge,
    ) -> Result<VoiceLink, VoiceError> {
        self.requests.lock().unwrap().push(request.clone());

        let (tx, mut rx) = mpsc::channel(64);
        let sent = self.sent.clone();
        let script = self.script.clone();
        let task = tokio::spawn(async move {
            for frame in &script {
                dispatch_frame(&bridge, frame).await;
            }
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

/// Authorization double keyed by phone number.
#[derive(Default)]
pub struct StaticCallers {
    pub profiles: HashMap<String, CallerProfile>,
}

#[async_trait]
impl CallerDirectory for StaticCallers {
    async fn lookup(&self, phone: &str) -> Option<CallerProfile> {
        self.profiles.get(phone).cloned()
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub reports: Mutex<Vec<(String, CallReport)>>,
}

#[async_trait]
impl SessionNotifier for RecordingNotifier {
    async fn notify(&self, channel: &str, report: &CallReport) -> Result<(), NotifyError> {
        self.reports
            .lock()
            .unwrap()
            .push((channel.to_string(), report.clone()));
        Ok(())
    }
}

/// Call placement double; `None` simulates a provider failure.
pub struct FakeCalls {
    pub sid: Option<String>,
    pub placed: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl CallPlacer for FakeCalls {
    async fn place_call(&self, to: &str, instructions_url: &str) -> Result<String, TelephonyError> {
        self.placed
            .lock()
            .unwrap()
            .push((to.to_string(), instructions_url.to_string()));
        match &self.sid {
            Some(sid) => Ok(sid.clone()),
            None => Err(TelephonyError::Api {
                status: 400,
                body: "invalid number".into(),
            }),
        }
    }
}

pub struct Fixture {
    pub state: AppState,
    pub voice: Arc<ScriptedVoice>,
    pub notifier: Arc<RecordingNotifier>,
    pub calls: Arc<FakeCalls>,
}

pub fn fixture(
    voice: ScriptedVoice,
    callers: StaticCallers,
    call_sid: Option<&str>,
) -> Fixture {
    let voice = Arc::new(voice);
    let notifier = Arc::new(RecordingNotifier::default());
    let calls = Arc::new(FakeCalls {
        sid: call_sid.map(str::to_string),
        placed: Mutex::new(Vec::new()),
    });
    let (shutdown, _) = watch::channel(false);
    let state = AppState {
        registry: SessionRegistry::new(),
        voice: voice.clone(),
        callers: Arc::new(callers),
        notifier: notifier.clone(),
        calls: calls.clone(),
        public_host: None,
        close_grace: Duration::from_millis(500),
        shutdown: Arc::new(shutdown),
    };
    Fixture {
        state,
        voice,
        notifier,
        calls,
    }
}
