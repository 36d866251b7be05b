//! JSON messages exchanged over the real-time channel.
//!
//! Every frame is an object with a `type` tag; field names are camelCase.

use crate::domain::model::{Item, ParticipantId, RoundResult, SessionSnapshot, Submission};
use crate::utils::error::{AppraisalError, Result};
use serde::{Deserialize, Serialize};

/// Client → server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientCommand {
    RegisterItem {
        #[serde(default)]
        name: String,
        #[serde(default)]
        category: String,
    },
    OpenRound,
    Submit {
        #[serde(default)]
        participant_id: String,
        /// Number or numeric string; anything else is rejected as `InvalidValue`.
        #[serde(default)]
        value: serde_json::Value,
    },
    CloseRound,
    RequestSnapshot,
    Identify {
        #[serde(default)]
        participant_id: String,
    },
    Retract {
        #[serde(default)]
        participant_id: String,
    },
}

impl ClientCommand {
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| AppraisalError::MalformedCommand {
            message: e.to_string(),
        })
    }

    /// Whether the command changes session state (refused while storage is down).
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            ClientCommand::RegisterItem { .. }
                | ClientCommand::OpenRound
                | ClientCommand::Submit { .. }
                | ClientCommand::CloseRound
                | ClientCommand::Retract { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClientCommand::RegisterItem { .. } => "registerItem",
            ClientCommand::OpenRound => "openRound",
            ClientCommand::Submit { .. } => "submit",
            ClientCommand::CloseRound => "closeRound",
            ClientCommand::RequestSnapshot => "requestSnapshot",
            ClientCommand::Identify { .. } => "identify",
            ClientCommand::Retract { .. } => "retract",
        }
    }
}

/// Reads a submitted estimate; accepts JSON numbers and numeric strings.
pub fn parse_estimate(value: &serde_json::Value) -> Result<f64> {
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| AppraisalError::InvalidValue {
        value: value.to_string(),
    })
}

/// Server → clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    ItemRegistered {
        item: Item,
    },
    RoundOpened {
        item: Item,
    },
    SubmissionReceived {
        submission: Submission,
        replaced: bool,
    },
    SubmissionRetracted {
        participant_id: ParticipantId,
    },
    RoundClosed(RoundResult),
    CounterReset {
        daily_counter: u32,
    },
    Snapshot {
        snapshot: SessionSnapshot,
    },
    Error {
        kind: String,
        message: String,
    },
}

impl ServerEvent {
    pub fn error(err: &AppraisalError) -> Self {
        ServerEvent::Error {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::ItemRegistered { .. } => "itemRegistered",
            ServerEvent::RoundOpened { .. } => "roundOpened",
            ServerEvent::SubmissionReceived { .. } => "submissionReceived",
            ServerEvent::SubmissionRetracted { .. } => "submissionRetracted",
            ServerEvent::RoundClosed(_) => "roundClosed",
            ServerEvent::CounterReset { .. } => "counterReset",
            ServerEvent::Snapshot { .. } => "snapshot",
            ServerEvent::Error { .. } => "error",
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::Category;
    use serde_json::json;

    #[test]
    fn test_parse_commands() {
        let cmd = ClientCommand::parse(r#"{"type":"registerItem","name":"Casa A","category":"Casa"}"#).unwrap();
        assert_eq!(
            cmd,
            ClientCommand::RegisterItem {
                name: "Casa A".to_string(),
                category: "Casa".to_string()
            }
        );

        let cmd = ClientCommand::parse(r#"{"type":"submit","participantId":"p1","value":100000}"#).unwrap();
        match cmd {
            ClientCommand::Submit { participant_id, value } => {
                assert_eq!(participant_id, "p1");
                assert_eq!(parse_estimate(&value).unwrap(), 100000.0);
            }
            other => panic!("unexpected command: {:?}", other),
        }

        assert_eq!(
            ClientCommand::parse(r#"{"type":"openRound"}"#).unwrap(),
            ClientCommand::OpenRound
        );
        assert!(!ClientCommand::RequestSnapshot.is_mutating());
        assert!(ClientCommand::CloseRound.is_mutating());
    }

    #[test]
    fn test_missing_fields_default_to_empty() {
        let cmd = ClientCommand::parse(r#"{"type":"registerItem"}"#).unwrap();
        assert_eq!(
            cmd,
            ClientCommand::RegisterItem {
                name: String::new(),
                category: String::new()
            }
        );
    }

    #[test]
    fn test_malformed_command() {
        let err = ClientCommand::parse(r#"{"type":"launchRocket"}"#).unwrap_err();
        assert_eq!(err.kind(), "MalformedCommand");
        let err = ClientCommand::parse("not json").unwrap_err();
        assert_eq!(err.kind(), "MalformedCommand");
    }

    #[test]
    fn test_parse_estimate() {
        assert_eq!(parse_estimate(&json!(120000.5)).unwrap(), 120000.5);
        assert_eq!(parse_estimate(&json!(" 99000 ")).unwrap(), 99000.0);
        assert_eq!(parse_estimate(&json!("abc")).unwrap_err().kind(), "InvalidValue");
        assert_eq!(parse_estimate(&json!(null)).unwrap_err().kind(), "InvalidValue");
        assert_eq!(parse_estimate(&json!([1])).unwrap_err().kind(), "InvalidValue");
    }

    #[test]
    fn test_event_wire_format() {
        let item = Item::new("Casa A", Category::Casa).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&ServerEvent::RoundOpened { item }.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "roundOpened");
        assert_eq!(json["item"]["name"], "Casa A");
        assert_eq!(json["item"]["category"], "Casa");

        let err = ServerEvent::error(&AppraisalError::NoActiveItem);
        let json: serde_json::Value = serde_json::from_str(&err.to_json().unwrap()).unwrap();
        assert_eq!(json, json!({"type": "error", "kind": "NoActiveItem", "message": "No item is registered"}));

        let reset = ServerEvent::CounterReset { daily_counter: 0 };
        let json: serde_json::Value = serde_json::from_str(&reset.to_json().unwrap()).unwrap();
        assert_eq!(json, json!({"type": "counterReset", "dailyCounter": 0}));
    }
}
