//! Local replay of the fixed-duration event lifecycle.
//!
//! The lifecycle is `closed -> announced -> open -> closed`. Every transition
//! except `closed -> announced` only depends on elapsed time, so a record
//! observed earlier can be advanced without asking the API. The announcement
//! carries the name of the next event, which cannot be guessed locally.

use crate::state::event::{ANNOUNCE_WINDOW_SECS, COOLDOWN_GAP_SECS, EventRecord};

/// Upper bound on single-step transitions applied by [`predict`].
///
/// A full cycle needs at most three steps; reaching the bound means the
/// transition graph grew and prediction gives up rather than looping.
pub const MAX_PREDICTION_STEPS: usize = 4;

/// Outcome of a single transition step.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    /// Nothing changes at this time.
    Unchanged,
    /// The record moved to its next lifecycle state.
    Advanced(EventRecord),
    /// The next state cannot be derived locally.
    NeedsQuery,
}

/// Advance `last_observed` to `now` (epoch seconds).
///
/// Returns `None` when the current state cannot be derived locally and the
/// API must be queried.
pub fn predict(last_observed: &EventRecord, now: i64) -> Option<EventRecord> {
    let mut current = last_observed.clone();

    for _ in 0..MAX_PREDICTION_STEPS {
        match step(&current, now) {
            Step::Unchanged => return Some(current),
            Step::Advanced(next) => current = next,
            Step::NeedsQuery => return None,
        }
    }

    None
}

/// Whether a predicted record is stale enough that the API has to be asked.
pub fn needs_query(predicted: Option<&EventRecord>, now: i64) -> bool {
    match predicted {
        None => true,
        Some(EventRecord::Closed {
            predicted_open_time: Some(open_time),
        }) => now >= open_time - ANNOUNCE_WINDOW_SECS,
        Some(EventRecord::Closed {
            predicted_open_time: None,
        }) => true,
        Some(_) => false,
    }
}

/// Convenience wrapper combining [`predict`] and [`needs_query`].
pub fn requires_live_query(last_observed: Option<&EventRecord>, now: i64) -> bool {
    let predicted = last_observed.and_then(|record| predict(record, now));
    needs_query(predicted.as_ref(), now)
}

fn step(record: &EventRecord, now: i64) -> Step {
    match record {
        EventRecord::Closed {
            predicted_open_time: Some(open_time),
        } => {
            if now >= open_time - ANNOUNCE_WINDOW_SECS {
                Step::NeedsQuery
            } else {
                Step::Unchanged
            }
        }
        EventRecord::Closed {
            predicted_open_time: None,
        } => Step::NeedsQuery,
        EventRecord::Announced { event } if now >= event.open_time => Step::Advanced(
            EventRecord::Open {
                event: event.clone().into_open(),
            },
        ),
        EventRecord::Open { event } if now >= event.close_time => {
            Step::Advanced(EventRecord::Closed {
                predicted_open_time: Some(
                    event.close_time + COOLDOWN_GAP_SECS + ANNOUNCE_WINDOW_SECS,
                ),
            })
        }
        EventRecord::Announced { .. } | EventRecord::Open { .. } => Step::Unchanged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::event::{AnnouncedEvent, OPEN_WINDOW_SECS, OpenEvent};

    const T: i64 = 1_700_000_000;

    fn announced(open_time: i64) -> EventRecord {
        EventRecord::Announced {
            event: AnnouncedEvent {
                name: "Siege".into(),
                open_time,
                close_time: None,
            },
        }
    }

    fn open(open_time: i64, close_time: i64) -> EventRecord {
        EventRecord::Open {
            event: OpenEvent {
                name: "Siege".into(),
                open_time,
                close_time,
            },
        }
    }

    fn closed(predicted_open_time: i64) -> EventRecord {
        EventRecord::Closed {
            predicted_open_time: Some(predicted_open_time),
        }
    }

    #[test]
    fn announced_opens_at_open_time() {
        assert_eq!(
            predict(&announced(T), T),
            Some(open(T, T + OPEN_WINDOW_SECS))
        );
    }

    #[test]
    fn announced_stays_before_open_time() {
        assert_eq!(predict(&announced(T), T - 1), Some(announced(T)));
    }

    #[test]
    fn announced_keeps_reported_close_time() {
        let record = EventRecord::Announced {
            event: AnnouncedEvent {
                name: "Siege".into(),
                open_time: T,
                close_time: Some(T + 600),
            },
        };
        assert_eq!(predict(&record, T + 10), Some(open(T, T + 600)));
    }

    #[test]
    fn open_closes_at_close_time() {
        let close = T + OPEN_WINDOW_SECS;
        assert_eq!(
            predict(&open(T, close), close),
            Some(closed(close + COOLDOWN_GAP_SECS + ANNOUNCE_WINDOW_SECS))
        );
    }

    #[test]
    fn closed_enters_query_window_at_announce_boundary() {
        let p = T + 5_000;
        assert!(!needs_query(predict(&closed(p), p - 181).as_ref(), p - 181));
        assert!(needs_query(Some(&closed(p)), p - 180));
        assert_eq!(predict(&closed(p), p - 180), None);
    }

    #[test]
    fn full_cycle_replays_to_next_query_window() {
        // announced -> open -> closed, then the closed record is already due.
        let close = T + OPEN_WINDOW_SECS;
        let next_open = close + COOLDOWN_GAP_SECS + ANNOUNCE_WINDOW_SECS;
        assert_eq!(predict(&announced(T), next_open), None);
        assert_eq!(
            predict(&announced(T), next_open - ANNOUNCE_WINDOW_SECS - 1),
            Some(closed(next_open))
        );
    }

    #[test]
    fn closed_without_prediction_needs_query() {
        let record = EventRecord::Closed {
            predicted_open_time: None,
        };
        assert_eq!(predict(&record, T), None);
        assert!(needs_query(Some(&record), T));
    }

    #[test]
    fn running_events_do_not_need_query() {
        assert!(!needs_query(Some(&open(T, T + 900)), T + 10));
        assert!(!needs_query(Some(&announced(T)), T - 10));
        assert!(needs_query(None, T));
    }

    #[test]
    fn missing_observation_requires_live_query() {
        assert!(requires_live_query(None, T));
        assert!(!requires_live_query(Some(&announced(T)), T));
    }
}
