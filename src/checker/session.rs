//! Scan session state machine
//!
//! [`ScanSession::apply`] is the only way the session changes. It consumes
//! socket and user events and answers with [`Effect`]s for the runner to
//! carry out (open/close the socket, send, arm/disarm the flush timer), so
//! batching and pause behaviour can be exercised without a socket or a
//! real clock.

use crate::proxy::models::ProxyResult;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

/// Buffered results are flushed once this many are waiting
pub const BATCH_SIZE: usize = 20;

/// Longest a buffered result waits before being flushed
pub const BATCH_INTERVAL: Duration = Duration::from_millis(100);

/// Lifecycle of one scan
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ScanState {
    #[default]
    Idle,
    Scanning,
    Paused,
    Completed,
    Errored(String),
}

impl ScanState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanState::Completed | ScanState::Errored(_))
    }
}

/// Input to the reducer
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Start(Vec<String>),
    /// The socket finished its handshake
    Opened,
    /// Raw text frame from the socket
    Message(String),
    SocketError(String),
    /// The socket closed, for whatever reason
    Closed,
    FlushTimer,
    Pause,
    Resume,
    Stop,
}

/// Side effects requested by the reducer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Connect,
    Send(String),
    Close,
    ScheduleFlush(Duration),
    CancelFlush,
}

/// Decoded inbound socket message
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Result(ProxyResult),
    Done,
    Error(String),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    status: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    ip: Option<Value>,
}

impl ServerMessage {
    /// Decode one text frame.
    ///
    /// A frame is terminal when it carries `"status": "done"`, or an
    /// `error` field without a proxy `ip` (a dead proxy's result also has
    /// an `error`). This deliberately narrows the plain "any `error` field
    /// ends the scan" rule so dead-proxy results are kept.
    pub fn decode(text: &str) -> Result<Self, String> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| format!("Invalid message from checker: {}", e))?;
        let envelope: Envelope = serde_json::from_value(value.clone())
            .map_err(|e| format!("Invalid message from checker: {}", e))?;

        if envelope.status.as_ref().and_then(Value::as_str) == Some("done") {
            return Ok(ServerMessage::Done);
        }

        if envelope.ip.is_none() {
            if let Some(error) = envelope.error {
                let message = match error {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                return Ok(ServerMessage::Error(message));
            }
        }

        serde_json::from_value(value)
            .map(ServerMessage::Result)
            .map_err(|e| format!("Invalid proxy result from checker: {}", e))
    }
}

/// Client-side state of a bulk check
#[derive(Debug, Clone, Default)]
pub struct ScanSession {
    state: ScanState,
    total_proxies: usize,
    proxies: Vec<String>,
    results: Vec<ProxyResult>,
    buffer: Vec<ProxyResult>,
    socket_open: bool,
    flush_scheduled: bool,
}

impl ScanSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ScanState {
        &self.state
    }

    pub fn total_proxies(&self) -> usize {
        self.total_proxies
    }

    /// Results visible so far, in arrival order
    pub fn results(&self) -> &[ProxyResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<ProxyResult> {
        self.results
    }

    /// Results received but not yet flushed
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_scanning(&self) -> bool {
        matches!(self.state, ScanState::Scanning | ScanState::Paused)
    }

    pub fn is_paused(&self) -> bool {
        self.state == ScanState::Paused
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            ScanState::Errored(message) => Some(message),
            _ => None,
        }
    }

    pub fn socket_open(&self) -> bool {
        self.socket_open
    }

    pub fn flush_scheduled(&self) -> bool {
        self.flush_scheduled
    }

    /// Percentage of the submitted proxies that have results, rounded
    pub fn progress(&self) -> u8 {
        if self.total_proxies == 0 {
            return 0;
        }
        let pct = (self.results.len() as f64 / self.total_proxies as f64 * 100.0).round();
        pct.min(255.0) as u8
    }

    /// Feed one event through the state machine
    pub fn apply(&mut self, event: SessionEvent) -> Vec<Effect> {
        let mut effects = Vec::new();

        match event {
            SessionEvent::Start(proxies) => {
                self.cancel_flush(&mut effects);
                if self.socket_open {
                    effects.push(Effect::Close);
                    self.socket_open = false;
                }
                self.buffer.clear();
                self.results.clear();
                self.total_proxies = proxies.len();
                self.proxies = proxies;
                self.state = ScanState::Scanning;
                effects.push(Effect::Connect);
            }
            SessionEvent::Opened => {
                if self.is_scanning() {
                    self.socket_open = true;
                    let payload = json!({ "proxies": self.proxies }).to_string();
                    effects.push(Effect::Send(payload));
                }
            }
            SessionEvent::Message(text) => {
                if self.is_scanning() {
                    self.handle_message(&text, &mut effects);
                }
            }
            SessionEvent::SocketError(message) => {
                if self.is_scanning() {
                    self.fail(message, &mut effects);
                }
            }
            SessionEvent::Closed => {
                self.socket_open = false;
                if self.is_scanning() {
                    self.fail(
                        "Connection to checker closed before the scan completed".to_string(),
                        &mut effects,
                    );
                }
            }
            SessionEvent::FlushTimer => {
                self.flush_scheduled = false;
                self.flush();
            }
            SessionEvent::Pause => {
                if self.state == ScanState::Scanning {
                    self.state = ScanState::Paused;
                }
            }
            SessionEvent::Resume => {
                if self.state == ScanState::Paused {
                    self.state = ScanState::Scanning;
                }
            }
            SessionEvent::Stop => {
                self.cancel_flush(&mut effects);
                self.flush();
                if self.socket_open {
                    effects.push(Effect::Close);
                    self.socket_open = false;
                }
                self.state = ScanState::Idle;
            }
        }

        effects
    }

    fn handle_message(&mut self, text: &str, effects: &mut Vec<Effect>) {
        match ServerMessage::decode(text) {
            Ok(ServerMessage::Done) => {
                self.cancel_flush(effects);
                self.flush();
                self.state = ScanState::Completed;
                if self.socket_open {
                    effects.push(Effect::Close);
                    self.socket_open = false;
                }
                debug!(results = self.results.len(), "Scan completed");
            }
            Ok(ServerMessage::Error(message)) => self.fail(message, effects),
            Ok(ServerMessage::Result(result)) => {
                if self.is_paused() {
                    return;
                }
                self.buffer.push(result);
                if self.buffer.len() >= BATCH_SIZE {
                    self.cancel_flush(effects);
                    self.flush();
                } else if !self.flush_scheduled {
                    self.flush_scheduled = true;
                    effects.push(Effect::ScheduleFlush(BATCH_INTERVAL));
                }
            }
            Err(message) => self.fail(message, effects),
        }
    }

    fn fail(&mut self, message: String, effects: &mut Vec<Effect>) {
        warn!(error = %message, "Scan failed");
        self.cancel_flush(effects);
        self.flush();
        self.state = ScanState::Errored(message);
    }

    fn flush(&mut self) {
        if !self.buffer.is_empty() {
            self.results.append(&mut self.buffer);
        }
    }

    fn cancel_flush(&mut self, effects: &mut Vec<Effect>) {
        if self.flush_scheduled {
            self.flush_scheduled = false;
            effects.push(Effect::CancelFlush);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_msg(i: usize) -> String {
        json!({
            "ip": format!("10.0.0.{}", i % 256),
            "port": 1080,
            "protocol": "socks5",
            "status": i % 3 != 0,
            "latency": 100 + i as u64,
        })
        .to_string()
    }

    fn done_msg() -> String {
        r#"{"status":"done"}"#.to_string()
    }

    fn started(n: usize) -> ScanSession {
        let mut session = ScanSession::new();
        let proxies = (0..n).map(|i| format!("10.0.0.{}:1080", i)).collect();
        session.apply(SessionEvent::Start(proxies));
        session.apply(SessionEvent::Opened);
        session
    }

    #[test]
    fn test_start_connects_then_sends_proxies() {
        let mut session = ScanSession::new();
        let effects = session.apply(SessionEvent::Start(vec!["1.1.1.1:80".into()]));
        assert_eq!(effects, vec![Effect::Connect]);
        assert_eq!(session.state(), &ScanState::Scanning);
        assert_eq!(session.total_proxies(), 1);

        let effects = session.apply(SessionEvent::Opened);
        assert_eq!(effects, vec![Effect::Send(r#"{"proxies":["1.1.1.1:80"]}"#.to_string())]);
        assert!(session.socket_open());
    }

    #[test]
    fn test_restart_closes_previous_socket_and_resets() {
        let mut session = started(3);
        session.apply(SessionEvent::Message(result_msg(1)));

        let effects = session.apply(SessionEvent::Start(vec!["2.2.2.2:80".into()]));
        assert_eq!(effects, vec![Effect::CancelFlush, Effect::Close, Effect::Connect]);
        assert!(session.results().is_empty());
        assert_eq!(session.buffered(), 0);
        assert_eq!(session.total_proxies(), 1);
        assert_eq!(session.state(), &ScanState::Scanning);
    }

    #[test]
    fn test_first_result_schedules_single_flush_timer() {
        let mut session = started(5);
        let effects = session.apply(SessionEvent::Message(result_msg(1)));
        assert_eq!(effects, vec![Effect::ScheduleFlush(BATCH_INTERVAL)]);

        let effects = session.apply(SessionEvent::Message(result_msg(2)));
        assert!(effects.is_empty());
        assert_eq!(session.buffered(), 2);
        assert!(session.results().is_empty());

        session.apply(SessionEvent::FlushTimer);
        assert_eq!(session.results().len(), 2);
        assert!(!session.flush_scheduled());

        // Next result arms a new timer
        let effects = session.apply(SessionEvent::Message(result_msg(3)));
        assert_eq!(effects, vec![Effect::ScheduleFlush(BATCH_INTERVAL)]);
    }

    #[test]
    fn test_full_batch_flushes_immediately() {
        let mut session = started(50);
        for i in 0..BATCH_SIZE - 1 {
            session.apply(SessionEvent::Message(result_msg(i)));
        }
        assert!(session.results().is_empty());

        let effects = session.apply(SessionEvent::Message(result_msg(99)));
        assert_eq!(effects, vec![Effect::CancelFlush]);
        assert_eq!(session.results().len(), BATCH_SIZE);
        assert_eq!(session.buffered(), 0);
    }

    #[test]
    fn test_all_messages_survive_batching() {
        for n in [0, 1, 19, 20, 21, 57, 100] {
            let mut session = started(n);
            for i in 0..n {
                session.apply(SessionEvent::Message(result_msg(i)));
                if i % 7 == 3 {
                    session.apply(SessionEvent::FlushTimer);
                }
            }
            let effects = session.apply(SessionEvent::Message(done_msg()));
            assert!(effects.contains(&Effect::Close));
            assert_eq!(session.state(), &ScanState::Completed);
            assert_eq!(session.results().len(), n, "n = {}", n);
            assert!(!session.socket_open());
        }
    }

    #[test]
    fn test_results_while_paused_are_dropped() {
        let mut session = started(4);
        session.apply(SessionEvent::Pause);
        assert!(session.is_paused());
        assert!(session.is_scanning());

        for i in 0..3 {
            let effects = session.apply(SessionEvent::Message(result_msg(i)));
            assert!(effects.is_empty());
        }

        session.apply(SessionEvent::Resume);
        assert_eq!(session.state(), &ScanState::Scanning);
        session.apply(SessionEvent::Message(result_msg(3)));
        session.apply(SessionEvent::Message(done_msg()));

        assert_eq!(session.results().len(), 1);
        assert_eq!(session.progress(), 25);
    }

    #[test]
    fn test_done_while_paused_still_completes() {
        let mut session = started(2);
        session.apply(SessionEvent::Message(result_msg(0)));
        session.apply(SessionEvent::Pause);
        session.apply(SessionEvent::Message(done_msg()));
        assert_eq!(session.state(), &ScanState::Completed);
        assert_eq!(session.results().len(), 1);
    }

    #[test]
    fn test_server_error_keeps_buffered_results() {
        let mut session = started(10);
        session.apply(SessionEvent::Message(result_msg(0)));
        session.apply(SessionEvent::Message(result_msg(1)));

        let effects = session.apply(SessionEvent::Message(r#"{"error":"rate limited"}"#.into()));
        assert_eq!(effects, vec![Effect::CancelFlush]);
        assert_eq!(session.error(), Some("rate limited"));
        assert!(!session.is_scanning());
        assert_eq!(session.results().len(), 2);

        // Terminal: later frames are ignored
        session.apply(SessionEvent::Message(result_msg(2)));
        assert_eq!(session.results().len(), 2);
    }

    #[test]
    fn test_dead_proxy_with_error_is_a_result() {
        let mut session = started(1);
        let dead = r#"{"ip":"3.3.3.3","port":80,"protocol":"http","status":false,"latency":0,"error":"timeout"}"#;
        session.apply(SessionEvent::Message(dead.into()));
        session.apply(SessionEvent::Message(done_msg()));

        assert_eq!(session.state(), &ScanState::Completed);
        assert_eq!(session.results()[0].error.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_malformed_json_errors_scan() {
        let mut session = started(1);
        session.apply(SessionEvent::Message("{not json".into()));
        assert!(session.error().unwrap().starts_with("Invalid message from checker"));
        assert!(!session.is_scanning());
    }

    #[test]
    fn test_socket_error_and_abnormal_close() {
        let mut session = started(1);
        session.apply(SessionEvent::SocketError("connection refused".into()));
        assert_eq!(session.error(), Some("connection refused"));

        let mut session = started(1);
        session.apply(SessionEvent::Closed);
        assert!(matches!(session.state(), ScanState::Errored(_)));
        assert!(!session.socket_open());
    }

    #[test]
    fn test_close_after_completion_is_ignored() {
        let mut session = started(0);
        session.apply(SessionEvent::Message(done_msg()));
        session.apply(SessionEvent::Closed);
        assert_eq!(session.state(), &ScanState::Completed);
    }

    #[test]
    fn test_stop_flushes_closes_and_returns_to_idle() {
        let mut session = started(10);
        session.apply(SessionEvent::Message(result_msg(0)));

        let effects = session.apply(SessionEvent::Stop);
        assert_eq!(effects, vec![Effect::CancelFlush, Effect::Close]);
        assert_eq!(session.state(), &ScanState::Idle);
        assert_eq!(session.results().len(), 1);
        assert!(!session.is_scanning());

        // Nothing is accepted after a stop
        session.apply(SessionEvent::Message(result_msg(1)));
        assert_eq!(session.results().len(), 1);
    }

    #[test]
    fn test_pause_and_resume_only_from_matching_states() {
        let mut session = ScanSession::new();
        session.apply(SessionEvent::Pause);
        assert_eq!(session.state(), &ScanState::Idle);

        let mut session = started(1);
        session.apply(SessionEvent::Resume);
        assert_eq!(session.state(), &ScanState::Scanning);
    }

    #[test]
    fn test_progress_rounds() {
        let mut session = started(3);
        assert_eq!(session.progress(), 0);
        session.apply(SessionEvent::Message(result_msg(0)));
        session.apply(SessionEvent::FlushTimer);
        assert_eq!(session.progress(), 33);
        session.apply(SessionEvent::Message(result_msg(1)));
        session.apply(SessionEvent::FlushTimer);
        assert_eq!(session.progress(), 67);

        assert_eq!(ScanSession::new().progress(), 0);
    }

    #[test]
    fn test_decode_server_messages() {
        assert_eq!(ServerMessage::decode(r#"{"status":"done"}"#), Ok(ServerMessage::Done));
        assert_eq!(
            ServerMessage::decode(r#"{"error":"bad request"}"#),
            Ok(ServerMessage::Error("bad request".into()))
        );
        assert!(matches!(
            ServerMessage::decode(&result_msg(4)),
            Ok(ServerMessage::Result(_))
        ));
        assert!(ServerMessage::decode(r#"{"hello":1}"#).is_err());
        assert!(ServerMessage::decode("[]").is_err());
    }
}
