// ABOUTME: Button event types fanned out to live viewers.
// ABOUTME: The allow-list of event kinds is closed; anything else is rejected at ingress.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The kinds of button press a viewer can be told about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Capture,
    Play,
    Reset,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [EventKind::Capture, EventKind::Play, EventKind::Reset];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Capture => "capture",
            EventKind::Play => "play",
            EventKind::Reset => "reset",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown event type: {0:?}")]
pub struct UnknownEventKind(pub String);

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    /// Exact, lowercase match only. Lenient token mapping belongs to input sources.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownEventKind(s.to_string()))
    }
}

/// Message pushed to every subscriber, serialized as `{"type": "..."}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
}

impl ButtonEvent {
    pub fn new(kind: EventKind) -> Self {
        Self { kind }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_allowed_kinds_only() {
        assert_eq!("capture".parse::<EventKind>(), Ok(EventKind::Capture));
        assert_eq!("play".parse::<EventKind>(), Ok(EventKind::Play));
        assert_eq!("reset".parse::<EventKind>(), Ok(EventKind::Reset));
        assert!("CAPTURE".parse::<EventKind>().is_err());
        assert!("undo".parse::<EventKind>().is_err());
        assert!("".parse::<EventKind>().is_err());
    }

    #[test]
    fn wire_form_is_a_type_object() {
        let event = ButtonEvent::new(EventKind::Capture);
        assert_eq!(serde_json::to_string(&event).unwrap(), r#"{"type":"capture"}"#);
        assert_eq!(
            serde_json::to_value(ButtonEvent::new(EventKind::Play)).unwrap(),
            serde_json::json!({ "type": "play" })
        );

        let back: ButtonEvent = serde_json::from_str(r#"{"type":"reset"}"#).unwrap();
        assert_eq!(back.kind, EventKind::Reset);
    }
}
