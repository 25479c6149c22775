//! Scripted transport engine for driving the executor without a network.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use roundtrip_core::{
    AuthChallenge, ChallengeDecision, Completion, Credential, EventSink, MemoryIdentityStore,
    NativeRequest, NativeResponse, TaskHandle, Transport,
};

pub const CLIENT_PEM: &[u8] = include_bytes!("../../../testdata/identities/client-example.pem");
pub const OTHER_PEM: &[u8] = include_bytes!("../../../testdata/identities/other-example.pem");

/// What the engine did with one challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decided {
    Credential { subject: String, serial: String },
    Default,
}

impl Decided {
    fn label(&self) -> String {
        match self {
            Decided::Credential { serial, .. } => format!("credential:{serial}"),
            Decided::Default => "default".to_string(),
        }
    }
}

/// Issues `challenges` client-certificate challenges, then completes
/// `completions` times with `outcome`, all on a fresh worker thread.
///
/// Successful outcomes get an `x-decision` header naming the last decision,
/// and with `echo_body` the request body is sent back as the response body.
pub struct ScriptedTransport {
    pub challenges: usize,
    pub completions: usize,
    pub echo_body: bool,
    pub outcome: Completion,
    pub decisions: Arc<Mutex<Vec<Decided>>>,
    pub requests: Mutex<Vec<NativeRequest>>,
}

impl ScriptedTransport {
    pub fn new(outcome: Completion) -> Self {
        Self {
            challenges: 0,
            completions: 1,
            echo_body: false,
            outcome,
            decisions: Arc::new(Mutex::new(Vec::new())),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn challenges(mut self, n: usize) -> Self {
        self.challenges = n;
        self
    }

    pub fn completions(mut self, n: usize) -> Self {
        self.completions = n;
        self
    }

    pub fn echo_body(mut self) -> Self {
        self.echo_body = true;
        self
    }

    pub fn decisions(&self) -> Vec<Decided> {
        self.decisions.lock().unwrap().clone()
    }

    pub fn requests(&self) -> Vec<NativeRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Transport for ScriptedTransport {
    fn start(&self, request: NativeRequest, sink: Arc<dyn EventSink>) -> TaskHandle {
        self.requests.lock().unwrap().push(request.clone());
        let (challenges, completions, echo_body) = (self.challenges, self.completions, self.echo_body);
        let outcome = self.outcome.clone();
        let decisions = Arc::clone(&self.decisions);
        std::thread::spawn(move || {
            let mut last = Decided::Default;
            for _ in 0..challenges {
                let decision = sink.on_auth_challenge(&AuthChallenge {
                    host: "example.test".to_string(),
                    acceptable_issuers: Vec::new(),
                });
                last = match decision {
                    ChallengeDecision::UseCredential(c) => Decided::Credential {
                        subject: c.subject().to_string(),
                        serial: c.serial().to_string(),
                    },
                    ChallengeDecision::UseDefaultHandling => Decided::Default,
                };
                decisions.lock().unwrap().push(last.clone());
            }

            let outcome = outcome.map(|mut native| {
                if challenges > 0 {
                    native.headers.push(("x-decision".to_string(), last.label()));
                }
                if echo_body {
                    native.body = request.body.clone().unwrap_or_default();
                }
                native
            });
            for _ in 0..completions {
                sink.on_task_complete(outcome.clone());
            }
        });
        TaskHandle::detached()
    }
}

pub fn ok_outcome(body: &'static [u8]) -> Completion {
    Ok(NativeResponse {
        status: 200,
        protocol: "http/1.1".to_string(),
        headers: vec![("Content-Type".to_string(), "text/plain".to_string())],
        body: Bytes::from_static(body),
        body_error: None,
    })
}

pub fn identities() -> Arc<MemoryIdentityStore> {
    Arc::new(
        MemoryIdentityStore::new()
            .with(Credential::from_pem(CLIENT_PEM).unwrap())
            .with(Credential::from_pem(OTHER_PEM).unwrap()),
    )
}
