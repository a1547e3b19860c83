//! Relay wire messages.
//!
//! Frames are heterogeneous JSON arrays, so encoding and decoding go through
//! `serde_json::Value` with a tolerant reader: unknown frame types are
//! preserved rather than rejected.

use serde_json::Value;

use crate::error::ProtoError;
use crate::event::Event;
use crate::filter::Filter;

/// A message sent from client to relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// `["EVENT", {event}]`
    Event(Event),
    /// `["REQ", subscription_id, filter...]`
    Req {
        subscription_id: String,
        filters: Vec<Filter>,
    },
    /// `["CLOSE", subscription_id]`
    Close { subscription_id: String },
}

impl ClientMessage {
    /// Serialize to a wire frame.
    pub fn to_json(&self) -> Result<String, ProtoError> {
        let frame = match self {
            Self::Event(event) => {
                serde_json::json!(["EVENT", event])
            }
            Self::Req {
                subscription_id,
                filters,
            } => {
                let mut parts = vec![
                    Value::String("REQ".into()),
                    Value::String(subscription_id.clone()),
                ];
                for filter in filters {
                    parts.push(serde_json::to_value(filter)?);
                }
                Value::Array(parts)
            }
            Self::Close { subscription_id } => {
                serde_json::json!(["CLOSE", subscription_id])
            }
        };
        Ok(serde_json::to_string(&frame)?)
    }
}

/// A message received from a relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    /// `["EVENT", subscription_id, {event}]`
    Event {
        subscription_id: String,
        event: Event,
    },
    /// `["EOSE", subscription_id]` — end of stored events.
    EndOfStored { subscription_id: String },
    /// `["OK", event_id, accepted, message]` — publish acknowledgement.
    Ok {
        event_id: String,
        accepted: bool,
        message: String,
    },
    /// `["NOTICE", message]`
    Notice(String),
    /// `["CLOSED", subscription_id, message]`
    Closed {
        subscription_id: String,
        message: String,
    },
    /// Anything this client does not understand.
    Unknown { frame_type: String },
}

fn frame_str(frame: &[Value], index: usize, what: &str) -> Result<String, ProtoError> {
    frame
        .get(index)
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| ProtoError::MalformedMessage(format!("missing {what}")))
}

impl RelayMessage {
    /// Parse a wire frame.
    pub fn from_json(raw: &str) -> Result<Self, ProtoError> {
        let value: Value = serde_json::from_str(raw)?;
        let frame = value
            .as_array()
            .ok_or_else(|| ProtoError::MalformedMessage("frame is not an array".into()))?;
        let frame_type = frame_str(frame, 0, "frame type")?;

        match frame_type.as_str() {
            "EVENT" => {
                let subscription_id = frame_str(frame, 1, "subscription id")?;
                let event_value = frame
                    .get(2)
                    .ok_or_else(|| ProtoError::MalformedMessage("missing event".into()))?;
                let event: Event = serde_json::from_value(event_value.clone())?;
                Ok(Self::Event {
                    subscription_id,
                    event,
                })
            }
            "EOSE" => Ok(Self::EndOfStored {
                subscription_id: frame_str(frame, 1, "subscription id")?,
            }),
            "OK" => Ok(Self::Ok {
                event_id: frame_str(frame, 1, "event id")?,
                accepted: frame.get(2).and_then(Value::as_bool).unwrap_or(false),
                message: frame
                    .get(3)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            }),
            "NOTICE" => Ok(Self::Notice(frame_str(frame, 1, "notice message")?)),
            "CLOSED" => Ok(Self::Closed {
                subscription_id: frame_str(frame, 1, "subscription id")?,
                message: frame
                    .get(2)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            }),
            _ => Ok(Self::Unknown { frame_type }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::event::EventTemplate;
    use crate::keys::Keys;

    #[test]
    fn req_frame_shape() {
        let msg = ClientMessage::Req {
            subscription_id: "sub-1".into(),
            filters: vec![Filter::new().kind(7000)],
        };
        let json = msg.to_json().unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0], "REQ");
        assert_eq!(value[1], "sub-1");
        assert_eq!(value[2]["kinds"], serde_json::json!([7000]));
    }

    #[test]
    fn close_frame_shape() {
        let msg = ClientMessage::Close {
            subscription_id: "sub-1".into(),
        };
        assert_eq!(msg.to_json().unwrap(), r#"["CLOSE","sub-1"]"#);
    }

    #[test]
    fn event_frame_roundtrips_through_relay_message() {
        let keys = Keys::generate();
        let event = EventTemplate::new(5003, Vec::new(), "").sign(&keys).unwrap();
        let json = ClientMessage::Event(event.clone()).to_json().unwrap();

        // A relay echoes the same event body inside an EVENT frame
        let value: Value = serde_json::from_str(&json).unwrap();
        let relayed = serde_json::json!(["EVENT", "sub-1", value[1]]).to_string();
        match RelayMessage::from_json(&relayed).unwrap() {
            RelayMessage::Event {
                subscription_id,
                event: received,
            } => {
                assert_eq!(subscription_id, "sub-1");
                assert_eq!(received, event);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn eose_and_ok_frames_parse() {
        match RelayMessage::from_json(r#"["EOSE","sub-9"]"#).unwrap() {
            RelayMessage::EndOfStored { subscription_id } => assert_eq!(subscription_id, "sub-9"),
            other => panic!("unexpected message: {other:?}"),
        }
        match RelayMessage::from_json(r#"["OK","abc",true,"saved"]"#).unwrap() {
            RelayMessage::Ok {
                event_id,
                accepted,
                message,
            } => {
                assert_eq!(event_id, "abc");
                assert!(accepted);
                assert_eq!(message, "saved");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn unknown_frame_is_tolerated() {
        match RelayMessage::from_json(r#"["AUTH","challenge"]"#).unwrap() {
            RelayMessage::Unknown { frame_type } => assert_eq!(frame_type, "AUTH"),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn malformed_frames_are_rejected() {
        assert!(RelayMessage::from_json("{}").is_err());
        assert!(RelayMessage::from_json("[]").is_err());
        assert!(RelayMessage::from_json(r#"["EVENT","sub-1"]"#).is_err());
        assert!(RelayMessage::from_json("not json").is_err());
    }
}
