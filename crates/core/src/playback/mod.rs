//! Supervision of a single playback session on an embedded surface.
//!
//! A session moves `Idle -> Running -> Ended` and never leaves `Ended`. Two
//! producers race to end it: an `ended` message from the surface and a
//! failsafe timer armed on start. A manual stop goes through the same gate.
//! Whichever reaches the gate first flips the `ended` flag and runs the
//! completion callback; every later trigger is discarded.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::{
    runtime::Handle,
    sync::{mpsc, watch},
    task::JoinHandle,
};

use crate::{config::PlaybackConfig, ChoreoError, Result};

/// Payload tag the surface posts when content finishes.
pub const ENDED_TAG: &str = "ended";

/// A message posted by the playback surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceMessage {
    pub origin: String,
    pub payload: Value,
}

impl SurfaceMessage {
    pub fn new(origin: impl Into<String>, payload: Value) -> Self {
        Self {
            origin: origin.into(),
            payload,
        }
    }

    pub fn ended(origin: impl Into<String>) -> Self {
        Self::new(origin, serde_json::json!({ "type": ENDED_TAG }))
    }

    pub fn tag(&self) -> Option<&str> {
        self.payload.get("type").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Running,
    Ended,
}

/// How a session reached `Ended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndReason {
    /// The surface reported the end of content.
    Completed,
    /// No completion signal arrived inside the failsafe window.
    Failsafe,
    /// Explicit stop action.
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub week_key: String,
    pub started: bool,
    pub ended: bool,
}

type Completion = Box<dyn FnOnce(EndReason) + Send + 'static>;

struct Gate {
    week_key: String,
    started: bool,
    ended: bool,
    unmounted: bool,
    on_complete: Option<Completion>,
    listener: Option<JoinHandle<()>>,
    failsafe: Option<JoinHandle<()>>,
}

impl Gate {
    fn cancel_tasks(&mut self) {
        if let Some(handle) = self.failsafe.take() {
            handle.abort();
        }
        if let Some(handle) = self.listener.take() {
            handle.abort();
        }
    }
}

struct Shared {
    gate: Mutex<Gate>,
    outcome: watch::Sender<Option<EndReason>>,
}

impl Shared {
    // The gate only holds flags and handles, so a panicking callback elsewhere
    // cannot leave it inconsistent.
    fn lock(&self) -> MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `Running -> Ended`. Returns whether this call won the race.
    fn finish(&self, reason: EndReason) -> bool {
        let (week_key, callback) = {
            let mut gate = self.lock();
            if !gate.started || gate.ended || gate.unmounted {
                return false;
            }
            gate.ended = true;
            gate.cancel_tasks();
            (gate.week_key.clone(), gate.on_complete.take())
        };

        match reason {
            EndReason::Failsafe => tracing::warn!(
                week_key = %week_key,
                "no completion signal before failsafe, ending session"
            ),
            _ => tracing::info!(week_key = %week_key, ?reason, "playback session ended"),
        }

        self.outcome.send_replace(Some(reason));
        if let Some(callback) = callback {
            callback(reason);
        }
        true
    }
}

/// Mounts playback sessions with a shared configuration.
#[derive(Debug, Clone, Default)]
pub struct PlaybackSynchronizer {
    config: PlaybackConfig,
}

impl PlaybackSynchronizer {
    pub fn new(config: PlaybackConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    /// Mounts a session for `week_key`, listening on `messages`.
    ///
    /// `on_complete` runs at most once, when the session ends. With
    /// `auto_start` the session is running (and the failsafe armed) on return.
    /// Must be called from within a tokio runtime.
    pub fn mount<F>(
        &self,
        week_key: impl Into<String>,
        messages: mpsc::Receiver<SurfaceMessage>,
        on_complete: F,
    ) -> Result<PlaybackSession>
    where
        F: FnOnce(EndReason) + Send + 'static,
    {
        let runtime = Handle::try_current().map_err(|_| ChoreoError::NoRuntime)?;
        let week_key = week_key.into();
        let (outcome_tx, outcome_rx) = watch::channel(None);

        let shared = Arc::new(Shared {
            gate: Mutex::new(Gate {
                week_key: week_key.clone(),
                started: false,
                ended: false,
                unmounted: false,
                on_complete: Some(Box::new(on_complete)),
                listener: None,
                failsafe: None,
            }),
            outcome: outcome_tx,
        });

        let listener = runtime.spawn(listen(
            shared.clone(),
            messages,
            self.config.host_origin.clone(),
        ));
        shared.lock().listener = Some(listener);
        tracing::debug!(week_key = %week_key, "playback surface mounted");

        let mut session = PlaybackSession {
            shared,
            config: self.config.clone(),
            runtime,
            outcome: outcome_rx,
        };
        if self.config.auto_start {
            session.start();
        }
        Ok(session)
    }
}

async fn listen(shared: Arc<Shared>, mut messages: mpsc::Receiver<SurfaceMessage>, origin: String) {
    while let Some(message) = messages.recv().await {
        if message.origin != origin {
            tracing::debug!(origin = %message.origin, "ignoring message from foreign origin");
            continue;
        }
        match message.tag() {
            Some(ENDED_TAG) => {
                if !shared.finish(EndReason::Completed) {
                    tracing::debug!("ended signal arrived outside a running session");
                }
            }
            tag => tracing::debug!(?tag, "ignoring surface message"),
        }
    }
}

/// Handle to a mounted session. Dropping it unmounts the surface.
pub struct PlaybackSession {
    shared: Arc<Shared>,
    config: PlaybackConfig,
    runtime: Handle,
    outcome: watch::Receiver<Option<EndReason>>,
}

impl PlaybackSession {
    /// `Idle -> Running`, arming the failsafe. Returns false if the session
    /// was already started or has been unmounted.
    pub fn start(&mut self) -> bool {
        let mut gate = self.shared.lock();
        if gate.started || gate.unmounted {
            return false;
        }
        gate.started = true;

        let failsafe = self.config.failsafe();
        let shared = self.shared.clone();
        gate.failsafe = Some(self.runtime.spawn(async move {
            tokio::time::sleep(failsafe).await;
            shared.finish(EndReason::Failsafe);
        }));
        tracing::info!(
            week_key = %gate.week_key,
            failsafe_ms = self.config.failsafe_ms,
            "playback session started"
        );
        true
    }

    /// Manual early termination.
    pub fn stop(&mut self) -> bool {
        self.shared.finish(EndReason::Stopped)
    }

    pub fn state(&self) -> SessionState {
        let gate = self.shared.lock();
        if gate.ended {
            SessionState::Ended
        } else if gate.started {
            SessionState::Running
        } else {
            SessionState::Idle
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let gate = self.shared.lock();
        SessionSnapshot {
            week_key: gate.week_key.clone(),
            started: gate.started,
            ended: gate.ended,
        }
    }

    /// Waits for the terminal outcome.
    pub async fn finished(&self) -> Option<EndReason> {
        let mut outcome = self.outcome.clone();
        outcome
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|reason| *reason)
    }

    /// Cancels pending timers and detaches the listener. No callback fires
    /// afterwards.
    pub fn unmount(self) {
        drop(self);
    }

    fn teardown(&mut self) {
        let mut gate = self.shared.lock();
        if gate.unmounted {
            return;
        }
        gate.unmounted = true;
        gate.on_complete = None;
        gate.cancel_tasks();
        tracing::debug!(week_key = %gate.week_key, ended = gate.ended, "playback surface unmounted");
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}
