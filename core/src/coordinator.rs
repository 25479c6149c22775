//! Per-round-trip event sink and completion signal.
//!
//! # Design
//! A `Coordinator` is created for one round trip and handed to the engine
//! as its `EventSink`. It moves through `Pending`, `ChallengeInFlight`, and
//! `Completed`. The sending half of the completion channel lives inside the
//! locked state and is taken on the first completion, so the caller receives
//! exactly one `Response`. The response is fully built before it is sent,
//! and the channel hand-off orders that write before the caller's read.
//!
//! The caller keeps the `CompletionSignal`. If the engine drops the
//! coordinator without completing, the channel disconnects and the wait
//! returns a `Cancelled` response instead of blocking forever.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, warn};

use crate::engine::{AuthChallenge, ChallengeDecision, Completion, EventSink};
use crate::http::{ErrorKind, HeaderField, Response, TransportError};
use crate::identity::Credential;

/// Where a coordinator is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Pending,
    ChallengeInFlight,
    Completed,
}

struct State {
    phase: Phase,
    challenges: usize,
    done: Option<SyncSender<Response>>,
}

/// One-shot event sink for a single round trip.
pub struct Coordinator {
    credential: Option<Credential>,
    state: Mutex<State>,
}

impl Coordinator {
    /// Create a coordinator seeded with the resolved credential, if any,
    /// together with the signal the caller waits on.
    pub fn new(credential: Option<Credential>) -> (Arc<Self>, CompletionSignal) {
        let (tx, rx) = mpsc::sync_channel(1);
        let coordinator = Arc::new(Self {
            credential,
            state: Mutex::new(State {
                phase: Phase::Pending,
                challenges: 0,
                done: Some(tx),
            }),
        });
        (coordinator, CompletionSignal { rx })
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    /// Number of challenges answered so far.
    pub fn challenges_seen(&self) -> usize {
        self.lock().challenges
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventSink for Coordinator {
    fn on_auth_challenge(&self, challenge: &AuthChallenge) -> ChallengeDecision {
        // Held for the whole decision so concurrent challenges are answered
        // one at a time.
        let mut state = self.lock();
        if state.phase == Phase::Completed {
            debug!(host = %challenge.host, "challenge after completion, using default handling");
            return ChallengeDecision::UseDefaultHandling;
        }
        state.phase = Phase::ChallengeInFlight;
        state.challenges += 1;

        let decision = match &self.credential {
            Some(credential) => {
                debug!(
                    host = %challenge.host,
                    subject = credential.subject(),
                    serial = credential.serial(),
                    "presenting client identity"
                );
                ChallengeDecision::UseCredential(credential.clone())
            }
            None => {
                debug!(host = %challenge.host, "no client identity, using default handling");
                ChallengeDecision::UseDefaultHandling
            }
        };

        state.phase = Phase::Pending;
        decision
    }

    fn on_task_complete(&self, completion: Completion) {
        let mut state = self.lock();
        let Some(done) = state.done.take() else {
            warn!("duplicate task completion ignored");
            return;
        };
        let response = capture(completion);
        state.phase = Phase::Completed;
        // The receiver may already be gone if the caller gave up; nothing
        // else is waiting for this response then.
        let _ = done.send(response);
    }
}

fn capture(completion: Completion) -> Response {
    match completion {
        Ok(native) => Response {
            status_code: native.status,
            proto: normalize_proto(&native.protocol),
            headers: native.headers.into_iter().map(HeaderField::from).collect(),
            body: native.body.to_vec(),
            error: native.body_error,
        },
        Err(error) => Response::from_error(error),
    }
}

/// Map engine protocol identifiers to HTTP version strings.
pub fn normalize_proto(protocol: &str) -> String {
    match protocol {
        "h2" | "h2c" => "HTTP/2.0".to_string(),
        "http/1.1" => "HTTP/1.1".to_string(),
        "http/1.0" => "HTTP/1.0".to_string(),
        other => other.to_string(),
    }
}

/// Caller half of the completion hand-off.
#[derive(Debug)]
pub struct CompletionSignal {
    rx: Receiver<Response>,
}

impl CompletionSignal {
    /// Block until the round trip completes.
    pub fn wait(self) -> Response {
        self.rx.recv().unwrap_or_else(|_| abandoned())
    }

    /// Block for at most `limit`. `None` means the deadline passed first.
    pub fn wait_timeout(&self, limit: Duration) -> Option<Response> {
        match self.rx.recv_timeout(limit) {
            Ok(response) => Some(response),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(abandoned()),
        }
    }
}

fn abandoned() -> Response {
    Response::from_error(TransportError::new(
        ErrorKind::Cancelled,
        "transport dropped the task without completing it",
    ))
}
