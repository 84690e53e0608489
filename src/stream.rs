use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::Utc;
use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, info, warn};

use crate::{
    consts::{ERROR_BODY_LIMIT, NOTIFICATION_ACCEPT},
    diagnostics::{snapshot_runtime, ConnectionState, RuntimeDiagnostics, RuntimeState},
    error::{Error, Result},
    poll::{CheckOutcome, PollCursor, ResponsePhase, ResponseSnapshot},
    settings::Settings,
    util::truncate_message,
};

/// Receives what the notification reader observes.
pub trait PollListener: Send + 'static {
    /// Called once per non-blank notification line, in arrival order.
    fn on_message(&mut self, message: &str);

    fn on_state(&mut self, _state: ConnectionState) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollEvent {
    Message(String),
    State(ConnectionState),
}

impl PollListener for mpsc::UnboundedSender<PollEvent> {
    fn on_message(&mut self, message: &str) {
        let _ = self.send(PollEvent::Message(message.to_string()));
    }

    fn on_state(&mut self, state: ConnectionState) {
        let _ = self.send(PollEvent::State(state));
    }
}

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub check_interval: Duration,
    pub line_threshold: usize,
    /// Consecutive failed connections tolerated before giving up.
    pub max_reconnect_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for PollConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            check_interval: settings.poll_check_interval(),
            line_threshold: settings.reconnect_line_threshold,
            max_reconnect_attempts: settings.max_reconnect_attempts,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(settings.max_backoff_secs),
        }
    }
}

/// Long-polls a newline-delimited notification feed over a single
/// streaming GET, reconnecting when the body grows too long or the
/// connection fails.
pub struct NotificationReader {
    http: reqwest::Client,
    runtime: Arc<Mutex<RuntimeState>>,
    stop_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl NotificationReader {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            runtime: Arc::new(Mutex::new(RuntimeState::default())),
            stop_tx: None,
            task: None,
        }
    }

    /// Starts polling `uri`, replacing any connection already running.
    pub fn start<L: PollListener>(
        &mut self,
        uri: &str,
        token: &str,
        listener: L,
        config: PollConfig,
    ) {
        self.stop();

        let (tx, rx) = watch::channel(false);
        let epoch = match self.runtime.lock() {
            Ok(mut runtime) => {
                runtime.epoch = runtime.epoch.wrapping_add(1);
                runtime.last_error = None;
                runtime.backoff_ms = 0;
                runtime.reconnect_attempts = 0;
                runtime.epoch
            }
            Err(_) => {
                warn!("notification runtime lock poisoned, not starting");
                return;
            }
        };
        self.stop_tx = Some(tx);

        info!("starting notification poll on {uri}");
        let task = PollTask {
            http: self.http.clone(),
            uri: uri.to_string(),
            token: token.to_string(),
            config,
            runtime: Arc::clone(&self.runtime),
            epoch,
        };
        self.task = Some(tokio::spawn(task.run(listener, rx)));
    }

    /// Cancels the in-flight request, if any.
    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
        self.task = None;
    }

    pub fn diagnostics(&self) -> RuntimeDiagnostics {
        match self.runtime.lock() {
            Ok(runtime) => snapshot_runtime(&runtime),
            Err(poisoned) => snapshot_runtime(&poisoned.into_inner()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Waits for the poll task to exit on its own (stop or give-up).
    pub async fn finished(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(error) = task.await {
                warn!("notification task ended abnormally: {error}");
            }
        }
    }
}

impl Drop for NotificationReader {
    fn drop(&mut self) {
        self.stop();
    }
}

enum PollEnd {
    Stopped,
    /// Body crossed the line threshold; reopen straight away.
    Reconnect,
    /// Server finished a successful response.
    Completed { delivered: u64, elapsed: Duration },
}

struct PollTask {
    http: reqwest::Client,
    uri: String,
    token: String,
    config: PollConfig,
    runtime: Arc<Mutex<RuntimeState>>,
    epoch: u64,
}

impl PollTask {
    async fn run<L: PollListener>(self, mut listener: L, mut stop_rx: watch::Receiver<bool>) {
        let mut backoff = self.config.initial_backoff;
        let mut failures: u32 = 0;
        let mut final_state = ConnectionState::Disconnected;
        debug!("poll task started epoch={}", self.epoch);

        loop {
            if *stop_rx.borrow() {
                break;
            }

            self.set_state(&mut listener, ConnectionState::Connecting);
            let error = match self.poll_once(&mut listener, &mut stop_rx).await {
                Ok(PollEnd::Stopped) => break,
                Ok(PollEnd::Reconnect) => {
                    failures = 0;
                    backoff = self.config.initial_backoff;
                    self.note_reconnect();
                    continue;
                }
                // empty close inside one check interval counts as a failure
                Ok(PollEnd::Completed { delivered, elapsed })
                    if delivered == 0 && elapsed < self.config.check_interval =>
                {
                    Error::FeedClosed {
                        url: self.uri.clone(),
                    }
                }
                Ok(PollEnd::Completed { .. }) => {
                    failures = 0;
                    backoff = self.config.initial_backoff;
                    self.note_reconnect();
                    if !pause(&mut stop_rx, self.config.check_interval).await {
                        break;
                    }
                    continue;
                }
                Err(error) => error,
            };

            if *stop_rx.borrow() {
                break;
            }
            failures = failures.saturating_add(1);
            warn!(
                "notification poll failed ({failures}/{}): {error}",
                self.config.max_reconnect_attempts
            );
            let backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX);
            self.with_runtime(|runtime| {
                runtime.last_error = Some(truncate_message(&error.to_string(), 300));
                runtime.backoff_ms = backoff_ms;
                runtime.reconnect_attempts = runtime.reconnect_attempts.saturating_add(1);
            });

            if failures >= self.config.max_reconnect_attempts {
                warn!("notification poll giving up after {failures} failures");
                final_state = ConnectionState::Failed;
                break;
            }

            self.set_state(&mut listener, ConnectionState::Backoff);
            if !pause(&mut stop_rx, backoff + jitter(backoff)).await {
                break;
            }
            backoff = std::cmp::min(backoff.saturating_mul(2), self.config.max_backoff);
        }

        self.set_state(&mut listener, final_state);
        debug!("poll task exited epoch={} state={final_state}", self.epoch);
    }

    async fn poll_once<L: PollListener>(
        &self,
        listener: &mut L,
        stop_rx: &mut watch::Receiver<bool>,
    ) -> Result<PollEnd> {
        let request = self
            .http
            .get(&self.uri)
            .bearer_auth(&self.token)
            .header(ACCEPT, NOTIFICATION_ACCEPT)
            .send();

        let response = tokio::select! {
            _ = stop_rx.changed() => return Ok(PollEnd::Stopped),
            response = request => response?,
        };

        let opened_at = Instant::now();
        let success = response.status().is_success();
        let status = response.status().as_u16();
        debug!("notification response HTTP {status}");
        if success {
            self.with_runtime(|runtime| {
                runtime.last_connected_at = Some(Utc::now());
                runtime.connections_opened = runtime.connections_opened.saturating_add(1);
            });
            self.set_state(listener, ConnectionState::Connected);
        }

        let mut cursor = PollCursor::new(self.config.line_threshold);
        let mut body: Vec<u8> = Vec::new();
        let mut phase = ResponsePhase::Receiving;
        let mut delivered_total: u64 = 0;
        let mut chunks = response.bytes_stream();
        let mut ticker = tokio::time::interval(self.config.check_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        return Ok(PollEnd::Stopped);
                    }
                }
                chunk = chunks.next(), if phase == ResponsePhase::Receiving => {
                    match chunk {
                        Some(Ok(bytes)) if success => body.extend_from_slice(&bytes),
                        Some(Ok(bytes)) => append_bounded(&mut body, &bytes, ERROR_BODY_LIMIT),
                        Some(Err(error)) => return Err(error.into()),
                        None => phase = ResponsePhase::Complete,
                    }
                }
                _ = ticker.tick() => {}
            }

            // error responses get one check interval and a bounded body to finish in
            if !success
                && phase == ResponsePhase::Receiving
                && (body.len() >= ERROR_BODY_LIMIT
                    || opened_at.elapsed() >= self.config.check_interval)
            {
                debug!("abandoning streaming HTTP {status} response");
                return Err(self.http_error(status, &body));
            }

            let snapshot = ResponseSnapshot {
                phase,
                status,
                body: &body,
            };
            let mut delivered: u64 = 0;
            let outcome = cursor.check(snapshot, |line| {
                debug!("notification line: {}", truncate_message(line, 140));
                listener.on_message(line);
                delivered += 1;
            });
            if delivered > 0 {
                delivered_total += delivered;
                self.with_runtime(|runtime| {
                    runtime.last_message_at = Some(Utc::now());
                    runtime.messages_delivered = runtime.messages_delivered.saturating_add(delivered);
                });
            }

            match outcome {
                CheckOutcome::Pending | CheckOutcome::Continue => {}
                CheckOutcome::Reconnect => {
                    debug!(
                        "notification body past {} lines, reconnecting",
                        self.config.line_threshold
                    );
                    return Ok(PollEnd::Reconnect);
                }
                CheckOutcome::Finished => {
                    debug!("notification response completed after {delivered_total} messages");
                    return Ok(PollEnd::Completed {
                        delivered: delivered_total,
                        elapsed: opened_at.elapsed(),
                    });
                }
                CheckOutcome::Failed(status) => return Err(self.http_error(status, &body)),
            }
        }
    }

    fn http_error(&self, status: u16, body: &[u8]) -> Error {
        Error::Http {
            status,
            url: self.uri.clone(),
            message: String::from_utf8_lossy(body).into_owned(),
        }
    }

    fn note_reconnect(&self) {
        self.with_runtime(|runtime| {
            runtime.backoff_ms = 0;
            runtime.reconnect_attempts = runtime.reconnect_attempts.saturating_add(1);
        });
    }

    fn set_state<L: PollListener>(&self, listener: &mut L, state: ConnectionState) {
        let changed = self
            .with_runtime(|runtime| {
                let changed = runtime.connection_state != state;
                runtime.connection_state = state;
                changed
            })
            .unwrap_or(false);
        if changed {
            debug!("notification connection state -> {state}");
            listener.on_state(state);
        }
    }

    fn with_runtime<T>(&self, apply: impl FnOnce(&mut RuntimeState) -> T) -> Option<T> {
        match self.runtime.lock() {
            Ok(mut runtime) if runtime.epoch == self.epoch => Some(apply(&mut runtime)),
            Ok(_) => None,
            Err(_) => {
                warn!("notification runtime lock poisoned");
                None
            }
        }
    }
}

/// Sleeps for `delay` unless stopped first. Returns `false` when stopped.
async fn pause(stop_rx: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    tokio::select! {
        changed = stop_rx.changed() => changed.is_ok() && !*stop_rx.borrow(),
        _ = tokio::time::sleep(delay) => true,
    }
}

fn append_bounded(body: &mut Vec<u8>, chunk: &[u8], limit: usize) {
    let room = limit.saturating_sub(body.len());
    body.extend_from_slice(&chunk[..chunk.len().min(room)]);
}

fn jitter(backoff: Duration) -> Duration {
    let cap = (backoff.as_millis() / 2).min(500) as u32;
    if cap == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(u64::from(Utc::now().timestamp_subsec_millis() % cap))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_is_bounded() {
        assert_eq!(jitter(Duration::from_millis(1)), Duration::ZERO);
        assert!(jitter(Duration::from_millis(40)) < Duration::from_millis(20));
        assert!(jitter(Duration::from_secs(30)) < Duration::from_millis(500));
    }

    #[test]
    fn error_body_stops_growing_at_limit() {
        let mut body = Vec::new();
        append_bounded(&mut body, &[b'x'; 3000], 4096);
        append_bounded(&mut body, &[b'y'; 3000], 4096);
        append_bounded(&mut body, &[b'z'; 10], 4096);
        assert_eq!(body.len(), 4096);
        assert_eq!(body.last(), Some(&b'y'));
    }

    #[tokio::test]
    async fn pause_returns_early_on_stop() {
        let (tx, mut rx) = watch::channel(false);
        assert!(pause(&mut rx, Duration::from_millis(1)).await);
        tx.send(true).unwrap();
        let started = Instant::now();
        assert!(!pause(&mut rx, Duration::from_secs(30)).await);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn config_follows_settings() {
        let settings = Settings {
            poll_check_interval_ms: 250,
            reconnect_line_threshold: 10,
            max_reconnect_attempts: 2,
            max_backoff_secs: 5,
            ..Settings::default()
        };
        let config = PollConfig::from(&settings);
        assert_eq!(config.check_interval, Duration::from_millis(250));
        assert_eq!(config.line_threshold, 10);
        assert_eq!(config.max_reconnect_attempts, 2);
        assert_eq!(config.max_backoff, Duration::from_secs(5));
    }

    #[test]
    fn channel_listener_forwards_events() {
        let (mut tx, mut rx) = mpsc::unbounded_channel();
        tx.on_message("changed");
        tx.on_state(ConnectionState::Connected);
        assert_eq!(rx.try_recv().unwrap(), PollEvent::Message("changed".into()));
        assert_eq!(
            rx.try_recv().unwrap(),
            PollEvent::State(ConnectionState::Connected)
        );
    }
}
