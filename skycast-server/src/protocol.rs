//! Inbound control messages.
//!
//! ```json
//! {"action": "activate", "type": "radar-sweep", "site": "KTLX", "field": "REF", "elev": 0.5}
//! {"action": "deactivate", "handler": "radar.KTLX.REF.0.5"}
//! ```
//!
//! Everything on an `activate` other than `action` and `type` is handed to
//! the Data Source constructor untouched.

use serde_json::{Map, Value};

use skycast_core::{FeedId, FeedKind, Params};

use crate::error::ProtocolError;

#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    Activate { kind: FeedKind, params: Params },
    Deactivate { handler: FeedId },
}

impl ControlMessage {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let Value::Object(mut fields) = serde_json::from_str::<Value>(text)? else {
            return Err(ProtocolError::NotAnObject);
        };

        let action = take_string(&mut fields, "action")?;
        match action.as_str() {
            "activate" => {
                let kind = take_string(&mut fields, "type")?.parse::<FeedKind>()?;
                Ok(ControlMessage::Activate {
                    kind,
                    params: Params::new(fields),
                })
            }
            "deactivate" => Ok(ControlMessage::Deactivate {
                handler: FeedId(take_string(&mut fields, "handler")?),
            }),
            _ => Err(ProtocolError::UnknownAction(action)),
        }
    }
}

fn take_string(fields: &mut Map<String, Value>, key: &'static str) -> Result<String, ProtocolError> {
    match fields.remove(key) {
        Some(Value::String(s)) => Ok(s),
        _ => Err(ProtocolError::MissingField(key)),
    }
}
