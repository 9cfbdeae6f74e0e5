//! Named capture sessions over the single [`CaptureEngine`].
//!
//! At most one session is active. A session whose worker ended on its own
//! (source exhausted, facility failure) is closed the next time the manager
//! is touched, so its `ended_at` is stamped and a new session can start.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use sleuth_telemetry::logging::EventLogger;

use super::capture::CaptureEngine;
use super::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Active,
    Ended,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSession {
    pub id: u64,
    pub name: String,
    pub interface: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl CaptureSession {
    pub fn state(&self) -> SessionState {
        match (self.started_at, self.ended_at) {
            (_, Some(_)) => SessionState::Ended,
            (Some(_), None) => SessionState::Active,
            (None, None) => SessionState::Idle,
        }
    }
}

#[derive(Default)]
struct SessionBook {
    sessions: BTreeMap<u64, CaptureSession>,
    active: Option<u64>,
    last_id: u64,
}

pub struct SessionManager {
    engine: Arc<CaptureEngine>,
    book: Mutex<SessionBook>,
}

impl SessionManager {
    pub fn new(engine: Arc<CaptureEngine>) -> Self {
        Self {
            engine,
            book: Mutex::new(SessionBook::default()),
        }
    }

    /// Registers an idle session. Without a name it is called `Session <id>`.
    pub fn create(&self, name: Option<&str>) -> CaptureSession {
        let mut book = self.book.lock();
        book.last_id += 1;
        let id = book.last_id;
        let session = CaptureSession {
            id,
            name: name.map_or_else(|| format!("Session {id}"), str::to_owned),
            interface: None,
            started_at: None,
            ended_at: None,
        };
        book.sessions.insert(id, session.clone());

        EventLogger::log_event(
            "session_created",
            vec![
                KeyValue::new("session_id", id as i64),
                KeyValue::new("name", session.name.clone()),
            ],
        );
        session
    }

    /// Starts capturing for session `id`.
    ///
    /// Fails with `AlreadyRunning` while another session is active, with
    /// `SessionEnded` for a finished session, and with the engine's error when
    /// the facility cannot be opened (the session stays idle).
    pub fn start(&self, id: u64, interface: Option<&str>) -> Result<CaptureSession, EngineError> {
        let mut book = self.book.lock();
        self.reconcile(&mut book);

        let session = book
            .sessions
            .get(&id)
            .ok_or(EngineError::UnknownSession(id))?;
        match session.state() {
            SessionState::Ended => return Err(EngineError::SessionEnded(id)),
            SessionState::Active => return Err(EngineError::AlreadyRunning),
            SessionState::Idle => {}
        }
        if book.active.is_some() {
            return Err(EngineError::AlreadyRunning);
        }

        self.engine.start(interface)?;

        let started_at = Utc::now();
        book.active = Some(id);
        let session = book
            .sessions
            .get_mut(&id)
            .ok_or(EngineError::UnknownSession(id))?;
        session.started_at = Some(started_at);
        session.interface = interface.map(str::to_owned);
        let session = session.clone();

        info!(session_id = id, "Session started");
        EventLogger::log_event(
            "session_started",
            vec![
                KeyValue::new("session_id", id as i64),
                KeyValue::new("interface", interface.unwrap_or("default").to_string()),
            ],
        );
        Ok(session)
    }

    /// Stops session `id` and stamps `ended_at`.
    ///
    /// Stopping an ended session is a no-op; stopping one that never started
    /// fails with `NotRunning`.
    pub fn stop(&self, id: u64) -> Result<CaptureSession, EngineError> {
        let mut book = self.book.lock();
        self.reconcile(&mut book);

        let session = book
            .sessions
            .get(&id)
            .ok_or(EngineError::UnknownSession(id))?;
        match session.state() {
            SessionState::Ended => return Ok(session.clone()),
            SessionState::Idle => return Err(EngineError::NotRunning),
            SessionState::Active => {}
        }

        if let Err(e) = self.engine.stop() {
            warn!(session_id = id, error = %e, "Capture worker did not exit cleanly");
        }
        Self::close(&mut book, id, "session_stopped").ok_or(EngineError::UnknownSession(id))
    }

    pub fn get(&self, id: u64) -> Option<CaptureSession> {
        let mut book = self.book.lock();
        self.reconcile(&mut book);
        book.sessions.get(&id).cloned()
    }

    /// All sessions, oldest first.
    pub fn list(&self) -> Vec<CaptureSession> {
        let mut book = self.book.lock();
        self.reconcile(&mut book);
        book.sessions.values().cloned().collect()
    }

    pub fn active(&self) -> Option<CaptureSession> {
        let mut book = self.book.lock();
        self.reconcile(&mut book);
        book.active.and_then(|id| book.sessions.get(&id).cloned())
    }

    /// Closes the active session if its worker has already exited.
    fn reconcile(&self, book: &mut SessionBook) {
        let Some(id) = book.active else {
            return;
        };
        if self.engine.is_running() {
            return;
        }
        if let Err(e) = self.engine.stop() {
            warn!(session_id = id, error = %e, "Capture worker did not exit cleanly");
        }
        let event = match self.engine.last_error() {
            Some(_) => "session_failed",
            None => "session_completed",
        };
        Self::close(book, id, event);
    }

    fn close(book: &mut SessionBook, id: u64, event: &str) -> Option<CaptureSession> {
        if book.active == Some(id) {
            book.active = None;
        }
        let session = book.sessions.get_mut(&id)?;
        session.ended_at = Some(Utc::now());
        let session = session.clone();

        info!(session_id = id, event, "Session ended");
        EventLogger::log_event(event, vec![KeyValue::new("session_id", id as i64)]);
        Some(session)
    }
}
