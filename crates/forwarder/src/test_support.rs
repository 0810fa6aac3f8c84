use parking_lot::{Condvar, Mutex};
use serde_json::json;
use std::thread;
use std::time::{Duration, Instant};

use crate::client::{ForwardRequest, ForwardResponse, ForwardStatus, PeerForwarderClient};
use crate::error::ClientError;
use crate::event::{Event, Record};
use crate::hash_ring::PeerHashRing;

pub fn record_with(key: &str, value: &str) -> Record {
    let mut event = Event::new("test");
    event.put(key, json!(value));
    Record::new(event)
}

/// Polls `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(2));
    }
}

enum Behaviour {
    Respond(Result<ForwardResponse, ClientError>),
    Block,
}

/// Client that remembers every request and answers with a fixed outcome.
pub struct RecordingClient {
    behaviour: Behaviour,
    requests: Mutex<Vec<ForwardRequest>>,
    gate: Mutex<(usize, bool)>,
    released: Condvar,
}

impl RecordingClient {
    fn with(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            requests: Mutex::new(Vec::new()),
            gate: Mutex::new((0, false)),
            released: Condvar::new(),
        }
    }

    pub fn succeeding() -> Self {
        Self::with(Behaviour::Respond(Ok(ForwardResponse::ok())))
    }

    pub fn responding(status: ForwardStatus) -> Self {
        Self::with(Behaviour::Respond(Ok(ForwardResponse::new(status))))
    }

    pub fn unreachable() -> Self {
        Self::with(Behaviour::Respond(Err(ClientError::Connection {
            destination: "peer".to_string(),
            reason: "connection refused".to_string(),
        })))
    }

    /// Holds every request until [`release`](Self::release), then succeeds.
    pub fn blocking() -> Self {
        Self::with(Behaviour::Block)
    }

    pub fn requests(&self) -> Vec<ForwardRequest> {
        self.requests.lock().clone()
    }

    /// Requests currently held by a blocking client.
    pub fn in_flight(&self) -> usize {
        self.gate.lock().0
    }

    pub fn release(&self) {
        self.gate.lock().1 = true;
        self.released.notify_all();
    }
}

impl PeerForwarderClient for RecordingClient {
    fn forward(&self, request: &ForwardRequest) -> Result<ForwardResponse, ClientError> {
        self.requests.lock().push(request.clone());
        match &self.behaviour {
            Behaviour::Respond(outcome) => outcome.clone(),
            Behaviour::Block => {
                let mut gate = self.gate.lock();
                gate.0 += 1;
                while !gate.1 {
                    self.released.wait(&mut gate);
                }
                gate.0 -= 1;
                Ok(ForwardResponse::ok())
            }
        }
    }
}

/// First generated key value that `ring` assigns to `peer`.
pub fn key_owned_by(ring: &PeerHashRing, peer: &str) -> String {
    (0..)
        .map(|i| format!("key-{}", i))
        .find(|value| ring.get_server_ip(&[Some(value.clone())]).as_deref() == Some(peer))
        .unwrap()
}
