//! The flight-event vocabulary: one structured record per phase transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Category of a recorded event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Navigation,
    WorldState,
    Decision,
    Action,
    Warning,
    Error,
    Recovery,
    Completion,
}

/// One structured record in the run's flight log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightEvent {
    pub timestamp: DateTime<Utc>,
    /// Step counter at the time of emission (0 before the loop starts).
    pub run_step: u32,
    pub event_type: EventType,
    pub payload: Value,
}

impl FlightEvent {
    pub fn new(run_step: u32, event_type: EventType, payload: Value) -> Self {
        Self {
            timestamp: Utc::now(),
            run_step,
            event_type,
            payload,
        }
    }

    pub fn warning(run_step: u32, message: impl Into<String>) -> Self {
        Self::new(
            run_step,
            EventType::Warning,
            serde_json::json!({ "message": message.into() }),
        )
    }

    pub fn error(run_step: u32, message: impl Into<String>) -> Self {
        Self::new(
            run_step,
            EventType::Error,
            serde_json::json!({ "message": message.into() }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_serializes_snake_case() {
        let json = serde_json::to_string(&EventType::WorldState).unwrap();
        assert_eq!(json, "\"world_state\"");
    }

    #[test]
    fn warning_helper_wraps_message() {
        let event = FlightEvent::warning(4, "low confidence");
        assert_eq!(event.event_type, EventType::Warning);
        assert_eq!(event.payload["message"], "low confidence");
        assert_eq!(event.run_step, 4);
    }
}
