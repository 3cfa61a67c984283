//! Out-of-band control messages from the foreground application.
//!
//! The only message with an effect is
//! `{ "type": "UPDATE_CACHE", "data": <json> }`, which seeds the synthetic
//! data resource with `data`.

use seamcache_core::Error;
use serde::Deserialize;
use serde_json::Value;

pub const UPDATE_CACHE: &str = "UPDATE_CACHE";

/// A parsed control message.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    /// Store the payload under the synthetic data key.
    UpdateCache(Value),
    /// A message type this worker does not handle.
    Unknown(String),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Option<Value>,
}

/// JavaScript truthiness, which is what senders of this message expect.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

impl ControlMessage {
    /// Parse a raw message body.
    ///
    /// # Errors
    ///
    /// `Error::InvalidInput` for bodies that are not a `{type, data}` object,
    /// and for `UPDATE_CACHE` messages whose `data` is absent or falsy.
    pub fn parse(body: &[u8]) -> Result<Self, Error> {
        let envelope: Envelope =
            serde_json::from_slice(body).map_err(|e| Error::InvalidInput(format!("malformed control message: {e}")))?;

        if envelope.kind != UPDATE_CACHE {
            return Ok(ControlMessage::Unknown(envelope.kind));
        }

        match envelope.data {
            Some(data) if is_truthy(&data) => Ok(ControlMessage::UpdateCache(data)),
            _ => Err(Error::InvalidInput("UPDATE_CACHE without usable data".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_update_cache() {
        let message = ControlMessage::parse(br#"{"type":"UPDATE_CACHE","data":{"foo":1}}"#).unwrap();
        assert_eq!(message, ControlMessage::UpdateCache(json!({"foo": 1})));
    }

    #[test]
    fn test_parse_rejects_missing_or_falsy_data() {
        for body in [
            r#"{"type":"UPDATE_CACHE"}"#,
            r#"{"type":"UPDATE_CACHE","data":null}"#,
            r#"{"type":"UPDATE_CACHE","data":false}"#,
            r#"{"type":"UPDATE_CACHE","data":0}"#,
            r#"{"type":"UPDATE_CACHE","data":""}"#,
        ] {
            let result = ControlMessage::parse(body.as_bytes());
            assert!(matches!(result, Err(Error::InvalidInput(_))), "accepted {body}");
        }
    }

    #[test]
    fn test_parse_accepts_truthy_scalars_and_empty_containers() {
        for data in [json!(1), json!("x"), json!(true), json!([]), json!({})] {
            let body = serde_json::to_vec(&json!({"type": "UPDATE_CACHE", "data": data.clone()})).unwrap();
            assert_eq!(ControlMessage::parse(&body).unwrap(), ControlMessage::UpdateCache(data));
        }
    }

    #[test]
    fn test_parse_unknown_type() {
        let message = ControlMessage::parse(br#"{"type":"PING"}"#).unwrap();
        assert_eq!(message, ControlMessage::Unknown("PING".into()));
    }

    #[test]
    fn test_parse_malformed() {
        assert!(ControlMessage::parse(b"not json").is_err());
        assert!(ControlMessage::parse(br#"{"data":{}}"#).is_err());
        assert!(ControlMessage::parse(br#"[1,2]"#).is_err());
    }
}
