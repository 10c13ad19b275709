use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Seconds before an event opens during which it is announced.
pub const ANNOUNCE_WINDOW_SECS: i64 = 180;
/// Seconds an event stays open.
pub const OPEN_WINDOW_SECS: i64 = 900;
/// Seconds between the close of an event and the announcement of the next one.
pub const COOLDOWN_GAP_SECS: i64 = 1620;

/// Lifecycle of the event published for one server.
///
/// Times are unix epoch seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EventRecord {
    /// No event is running. The next opening may be known in advance.
    Closed {
        /// When the next event is expected to open.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        predicted_open_time: Option<i64>,
    },
    /// The next event is known but not open yet.
    Announced {
        /// Announced event.
        event: AnnouncedEvent,
    },
    /// An event is running.
    Open {
        /// Running event.
        event: OpenEvent,
    },
}

/// Event that has been announced but has not opened yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AnnouncedEvent {
    pub name: String,
    pub open_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_time: Option<i64>,
}

/// Event that is currently open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct OpenEvent {
    pub name: String,
    pub open_time: i64,
    pub close_time: i64,
}

impl AnnouncedEvent {
    /// Close time reported by the API, or the canonical one derived from the open time.
    pub fn effective_close_time(&self) -> i64 {
        self.close_time.unwrap_or(self.open_time + OPEN_WINDOW_SECS)
    }

    /// Promote the announcement to a running event.
    pub fn into_open(self) -> OpenEvent {
        let close_time = self.effective_close_time();
        OpenEvent {
            name: self.name,
            open_time: self.open_time,
            close_time,
        }
    }
}

impl EventRecord {
    /// Check the `open_time < close_time` invariant where both are known.
    pub fn is_consistent(&self) -> bool {
        match self {
            EventRecord::Closed { .. } => true,
            EventRecord::Announced { event } => event
                .close_time
                .is_none_or(|close_time| event.open_time < close_time),
            EventRecord::Open { event } => event.open_time < event.close_time,
        }
    }

    /// Short variant name, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            EventRecord::Closed { .. } => "closed",
            EventRecord::Announced { .. } => "announced",
            EventRecord::Open { .. } => "open",
        }
    }
}

/// Entry of the server directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ServerDescriptor {
    pub id: String,
    pub name: String,
    pub active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_record_uses_state_tag() {
        let record = EventRecord::Closed {
            predicted_open_time: Some(1_700_000_000),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"state": "closed", "predicted_open_time": 1_700_000_000})
        );
    }

    #[test]
    fn announced_without_close_time_parses() {
        let record: EventRecord = serde_json::from_str(
            r#"{"state":"announced","event":{"name":"Siege","open_time":100}}"#,
        )
        .unwrap();
        match record {
            EventRecord::Announced { event } => {
                assert_eq!(event.close_time, None);
                assert_eq!(event.effective_close_time(), 100 + OPEN_WINDOW_SECS);
            }
            other => panic!("expected announced, got {other:?}"),
        }
    }

    #[test]
    fn inverted_window_is_inconsistent() {
        let record = EventRecord::Open {
            event: OpenEvent {
                name: "Siege".into(),
                open_time: 500,
                close_time: 400,
            },
        };
        assert!(!record.is_consistent());

        let announced = EventRecord::Announced {
            event: AnnouncedEvent {
                name: "Siege".into(),
                open_time: 500,
                close_time: None,
            },
        };
        assert!(announced.is_consistent());
    }
}
