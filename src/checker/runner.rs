//! Drives a [`ScanSession`] over a live WebSocket connection

use crate::checker::session::{Effect, ScanSession, SessionEvent};
use futures::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Sleep;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Longest a close handshake may take before the socket is dropped
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// User commands for a running scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanControl {
    Pause,
    Resume,
    Stop,
}

impl From<ScanControl> for SessionEvent {
    fn from(control: ScanControl) -> Self {
        match control {
            ScanControl::Pause => SessionEvent::Pause,
            ScanControl::Resume => SessionEvent::Resume,
            ScanControl::Stop => SessionEvent::Stop,
        }
    }
}

/// Sends [`ScanControl`] commands to a running scan
#[derive(Debug, Clone)]
pub struct ScanController {
    tx: mpsc::UnboundedSender<ScanControl>,
}

impl ScanController {
    /// Create a controller and the receiver to hand to [`ScanRunner::run`]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ScanControl>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn pause(&self) {
        let _ = self.tx.send(ScanControl::Pause);
    }

    pub fn resume(&self) {
        let _ = self.tx.send(ScanControl::Resume);
    }

    pub fn stop(&self) {
        let _ = self.tx.send(ScanControl::Stop);
    }
}

/// Runs one scan against the checking service.
///
/// The connection has no timeout and is never re-established: a dropped
/// socket ends the scan with an error.
#[derive(Debug, Clone)]
pub struct ScanRunner {
    ws_url: String,
}

impl ScanRunner {
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
        }
    }

    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Scan `proxies` until the service reports done, an error occurs, or a
    /// [`ScanControl::Stop`] arrives. `observe` sees the session after
    /// every processed event.
    ///
    /// Dropping the returned future closes the socket and the flush timer.
    pub async fn run<F>(
        &self,
        proxies: Vec<String>,
        mut controls: mpsc::UnboundedReceiver<ScanControl>,
        mut observe: F,
    ) -> ScanSession
    where
        F: FnMut(&ScanSession),
    {
        let mut session = ScanSession::new();
        let mut socket: Option<WsStream> = None;
        let mut flush_timer: Option<Pin<Box<Sleep>>> = None;

        info!(url = %self.ws_url, proxies = proxies.len(), "Starting scan");
        let mut effects: VecDeque<Effect> = session.apply(SessionEvent::Start(proxies)).into();

        loop {
            while let Some(effect) = effects.pop_front() {
                let follow_up = self
                    .execute(
                        effect,
                        &mut session,
                        &mut socket,
                        &mut flush_timer,
                        &mut controls,
                    )
                    .await;
                effects.extend(follow_up);
            }

            observe(&session);
            if !session.is_scanning() {
                break;
            }

            let event = tokio::select! {
                event = next_frame(&mut socket) => event,
                Some(control) = controls.recv() => control.into(),
                _ = wait_for(&mut flush_timer) => SessionEvent::FlushTimer,
            };

            match &event {
                SessionEvent::FlushTimer => flush_timer = None,
                SessionEvent::Closed | SessionEvent::SocketError(_) => socket = None,
                _ => {}
            }

            effects.extend(session.apply(event));
        }

        info!(
            state = ?session.state(),
            results = session.results().len(),
            "Scan finished"
        );
        session
    }

    async fn execute(
        &self,
        effect: Effect,
        session: &mut ScanSession,
        socket: &mut Option<WsStream>,
        flush_timer: &mut Option<Pin<Box<Sleep>>>,
        controls: &mut mpsc::UnboundedReceiver<ScanControl>,
    ) -> Vec<Effect> {
        match effect {
            Effect::Connect => {
                let connect = connect_async(self.ws_url.as_str());
                tokio::pin!(connect);

                // Controls stay live while the handshake is pending
                loop {
                    tokio::select! {
                        result = &mut connect => {
                            return match result {
                                Ok((ws, _response)) => {
                                    debug!(url = %self.ws_url, "Connected to checker");
                                    *socket = Some(ws);
                                    session.apply(SessionEvent::Opened)
                                }
                                Err(e) => session.apply(SessionEvent::SocketError(format!(
                                    "Failed to connect to checker: {}",
                                    e
                                ))),
                            };
                        }
                        Some(control) = controls.recv() => {
                            let effects = session.apply(control.into());
                            if !session.is_scanning() {
                                debug!(url = %self.ws_url, "Scan stopped while connecting");
                                return effects;
                            }
                        }
                    }
                }
            }
            Effect::Send(payload) => {
                let Some(ws) = socket.as_mut() else {
                    return Vec::new();
                };
                let mut effects = Vec::new();

                let sent = {
                    let send = ws.send(Message::Text(payload.into()));
                    tokio::pin!(send);

                    loop {
                        tokio::select! {
                            result = &mut send => break result.map_err(|e| e.to_string()),
                            Some(control) = controls.recv() => {
                                effects.extend(session.apply(control.into()));
                                if !session.is_scanning() {
                                    break Ok(());
                                }
                            }
                        }
                    }
                };

                if let Err(e) = sent {
                    *socket = None;
                    effects.extend(session.apply(SessionEvent::SocketError(format!(
                        "Failed to send proxies to checker: {}",
                        e
                    ))));
                }
                effects
            }
            Effect::Close => {
                if let Some(mut ws) = socket.take() {
                    if tokio::time::timeout(CLOSE_TIMEOUT, ws.close(None)).await.is_err() {
                        warn!(url = %self.ws_url, "Checker did not acknowledge close");
                    }
                }
                Vec::new()
            }
            Effect::ScheduleFlush(delay) => {
                *flush_timer = Some(Box::pin(tokio::time::sleep(delay)));
                Vec::new()
            }
            Effect::CancelFlush => {
                *flush_timer = None;
                Vec::new()
            }
        }
    }
}

/// Next session event from the socket; never resolves without one
async fn next_frame(socket: &mut Option<WsStream>) -> SessionEvent {
    let Some(ws) = socket.as_mut() else {
        return futures::future::pending().await;
    };

    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return SessionEvent::Message(text.to_string()),
            Some(Ok(Message::Binary(bytes))) => {
                return SessionEvent::Message(String::from_utf8_lossy(&bytes).into_owned())
            }
            Some(Ok(Message::Close(_))) | None => return SessionEvent::Closed,
            Some(Ok(_)) => continue,
            Some(Err(e)) => return SessionEvent::SocketError(format!("Checker connection error: {}", e)),
        }
    }
}

async fn wait_for(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer.as_mut() {
        Some(sleep) => sleep.as_mut().await,
        None => futures::future::pending().await,
    }
}
