use serde::Deserialize;

use crate::state::event::{AnnouncedEvent, EventRecord, OpenEvent, ServerDescriptor};

/// Event record as sent by the API, before the close time is derived.
#[derive(Debug, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RawEventRecord {
    Closed {
        #[serde(default)]
        predicted_open_time: Option<i64>,
    },
    Announced {
        event: RawEvent,
    },
    Open {
        event: RawEvent,
    },
}

#[derive(Debug, Deserialize)]
pub struct RawEvent {
    pub name: String,
    pub open_time: i64,
    #[serde(default)]
    pub close_time: Option<i64>,
}

impl RawEventRecord {
    /// Derive missing close times and enforce `open_time < close_time`.
    pub fn try_into_record(self) -> Result<EventRecord, &'static str> {
        let record = match self {
            RawEventRecord::Closed {
                predicted_open_time,
            } => EventRecord::Closed {
                predicted_open_time,
            },
            RawEventRecord::Announced { event } => EventRecord::Announced {
                event: AnnouncedEvent {
                    name: event.name,
                    open_time: event.open_time,
                    close_time: event.close_time,
                },
            },
            RawEventRecord::Open { event } => {
                let announced = AnnouncedEvent {
                    name: event.name,
                    open_time: event.open_time,
                    close_time: event.close_time,
                };
                EventRecord::Open {
                    event: OpenEvent::from(announced),
                }
            }
        };

        if record.is_consistent() {
            Ok(record)
        } else {
            Err("open_time must precede close_time")
        }
    }
}

impl From<AnnouncedEvent> for OpenEvent {
    fn from(event: AnnouncedEvent) -> Self {
        event.into_open()
    }
}

/// Body of `GET /servers`.
#[derive(Debug, Deserialize)]
pub struct ServersResponse {
    pub servers: Vec<RawServer>,
}

#[derive(Debug, Deserialize)]
pub struct RawServer {
    pub server_id: String,
    pub name: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl From<RawServer> for ServerDescriptor {
    fn from(raw: RawServer) -> Self {
        Self {
            id: raw.server_id,
            name: raw.name,
            active: raw.active,
        }
    }
}

/// Optional JSON error body (`{error}` or `{message}`).
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorBody {
    /// Extract the message from a raw body, ignoring anything that is not JSON.
    pub fn message_from(body: &[u8]) -> Option<String> {
        let parsed: ErrorBody = serde_json::from_slice(body).ok()?;
        parsed.error.or(parsed.message)
    }
}
