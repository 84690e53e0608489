use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Waiting before the next attempt after a failure.
    Backoff,
    /// Gave up; no notifications will arrive until restarted.
    Failed,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Backoff => "Backoff",
            ConnectionState::Failed => "Failed",
        }
    }

    pub fn is_degraded(self) -> bool {
        matches!(self, ConnectionState::Backoff | ConnectionState::Failed)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) struct RuntimeState {
    /// Incremented every time a new poll task is spawned. The task captures
    /// its own epoch and only writes cleanup state if the epoch still
    /// matches, so a late-exiting old task cannot clobber its replacement.
    pub(crate) epoch: u64,
    pub(crate) connection_state: ConnectionState,
    pub(crate) last_connected_at: Option<DateTime<Utc>>,
    pub(crate) last_message_at: Option<DateTime<Utc>>,
    pub(crate) messages_delivered: u64,
    pub(crate) last_error: Option<String>,
    pub(crate) backoff_ms: u64,
    pub(crate) reconnect_attempts: u64,
    pub(crate) connections_opened: u64,
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self {
            epoch: 0,
            connection_state: ConnectionState::Disconnected,
            last_connected_at: None,
            last_message_at: None,
            messages_delivered: 0,
            last_error: None,
            backoff_ms: 0,
            reconnect_attempts: 0,
            connections_opened: 0,
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct RuntimeDiagnostics {
    pub connection_state: ConnectionState,
    pub epoch: u64,
    pub last_connected_at: Option<DateTime<Utc>>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub stale_for_seconds: Option<i64>,
    pub messages_delivered: u64,
    pub last_error: Option<String>,
    pub backoff_ms: u64,
    pub reconnect_attempts: u64,
    pub connections_opened: u64,
}

pub(crate) fn snapshot_runtime(runtime: &RuntimeState) -> RuntimeDiagnostics {
    let stale_for_seconds = runtime
        .last_message_at
        .or(runtime.last_connected_at)
        .map(|last| (Utc::now() - last).num_seconds().max(0));

    RuntimeDiagnostics {
        connection_state: runtime.connection_state,
        epoch: runtime.epoch,
        last_connected_at: runtime.last_connected_at,
        last_message_at: runtime.last_message_at,
        stale_for_seconds,
        messages_delivered: runtime.messages_delivered,
        last_error: runtime.last_error.clone(),
        backoff_ms: runtime.backoff_ms,
        reconnect_attempts: runtime.reconnect_attempts,
        connections_opened: runtime.connections_opened,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_runtime_is_disconnected() {
        let diag = snapshot_runtime(&RuntimeState::default());
        assert_eq!(diag.connection_state, ConnectionState::Disconnected);
        assert_eq!(diag.stale_for_seconds, None);
        assert!(!diag.connection_state.is_degraded());
    }

    #[test]
    fn staleness_counts_from_last_message() {
        let runtime = RuntimeState {
            last_connected_at: Some(Utc::now() - chrono::Duration::seconds(120)),
            last_message_at: Some(Utc::now() - chrono::Duration::seconds(30)),
            ..RuntimeState::default()
        };
        let stale = snapshot_runtime(&runtime).stale_for_seconds.unwrap();
        assert!((30..=31).contains(&stale));
    }

    #[test]
    fn serializes_state_name() {
        let json = serde_json::to_value(snapshot_runtime(&RuntimeState {
            connection_state: ConnectionState::Backoff,
            ..RuntimeState::default()
        }))
        .unwrap();
        assert_eq!(json["connection_state"], "Backoff");
        assert!(ConnectionState::Failed.is_degraded());
    }
}
