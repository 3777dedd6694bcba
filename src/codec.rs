//! Wire codec for intents and feedback.
//!
//! Payloads are flat JSON objects of field-name/value pairs. Decoding never
//! panics on bad input; a failed decode means "no message this tick".

use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::MAX_DATAGRAM;
use crate::messages::{Feedback, Intent};

// Any of these keys marks a payload as an intent
const INTENT_KEYS: [&str; 5] = ["Left", "Right", "vx", "vy", "rot"];
const FEEDBACK_KEY: &str = "is_self_hit";

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("empty payload")]
    Empty,

    #[error("payload of {0} bytes exceeds {MAX_DATAGRAM}")]
    TooLarge(usize),

    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("payload is neither an intent nor feedback")]
    UnknownMessage,

    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Any message that can cross the channel
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Intent(Intent),
    Feedback(Feedback),
}

pub fn encode<T: Serialize>(msg: &T) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(msg)
}

/// Decode either kind of message
///
/// Intent keys pick the intent decoder, and a broken intent is an error
/// rather than feedback. Feedback must carry `is_self_hit`.
pub fn decode(bytes: &[u8]) -> Result<Message, DecodeError> {
    let fields = parse_object(bytes)?;
    if INTENT_KEYS.iter().any(|k| fields.contains_key(*k)) {
        return intent_from(fields).map(Message::Intent);
    }
    if fields.contains_key(FEEDBACK_KEY) {
        let fb = serde_json::from_value(Value::Object(fields))?;
        return Ok(Message::Feedback(fb));
    }
    Err(DecodeError::UnknownMessage)
}

/// Decode an operator intent, clamping every field into [-1, 1]
pub fn decode_intent(bytes: &[u8]) -> Result<Intent, DecodeError> {
    intent_from(parse_object(bytes)?)
}

pub fn decode_feedback(bytes: &[u8]) -> Result<Feedback, DecodeError> {
    let fields = parse_object(bytes)?;
    Ok(serde_json::from_value(Value::Object(fields))?)
}

fn intent_from(fields: Map<String, Value>) -> Result<Intent, DecodeError> {
    let intent: Intent = serde_json::from_value(Value::Object(fields))?;
    Ok(intent.clamped())
}

// Only field-name/value pairs are accepted; serde would also take a
// positional array for a struct.
fn parse_object(bytes: &[u8]) -> Result<Map<String, Value>, DecodeError> {
    check_size(bytes)?;
    match serde_json::from_slice::<Value>(bytes)? {
        Value::Object(fields) => Ok(fields),
        _ => Err(DecodeError::NotAnObject),
    }
}

fn check_size(bytes: &[u8]) -> Result<(), DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    if bytes.len() > MAX_DATAGRAM {
        return Err(DecodeError::TooLarge(bytes.len()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tank_payload_from_console() {
        // The console sends integers for key presses
        let intent = decode_intent(br#"{"Left": 1, "Right": -1}"#).unwrap();
        assert_eq!(intent, Intent::tank(1.0, -1.0));
    }

    #[test]
    fn test_mecanum_payload() {
        let intent = decode_intent(br#"{"vx": 0.5, "vy": -0.25, "rot": 0}"#).unwrap();
        assert_eq!(intent, Intent::mecanum(0.5, -0.25, 0.0));
    }

    #[test]
    fn test_tank_encodes_with_console_field_names() {
        let bytes = encode(&Intent::tank(0.5, -0.5)).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, r#"{"Left":0.5,"Right":-0.5}"#);
    }

    #[test]
    fn test_out_of_range_values_are_clamped_not_rejected() {
        let intent = decode_intent(br#"{"Left": 12.0, "Right": -3}"#).unwrap();
        assert_eq!(intent, Intent::tank(1.0, -1.0));

        let intent = decode_intent(br#"{"vx": 2, "vy": -2, "rot": 0.5}"#).unwrap();
        assert_eq!(intent, Intent::mecanum(1.0, -1.0, 0.5));
    }

    #[test]
    fn test_malformed_payloads_are_errors() {
        assert!(matches!(decode_intent(b""), Err(DecodeError::Empty)));
        assert!(matches!(
            decode_intent(b"not json"),
            Err(DecodeError::Malformed(_))
        ));
        // Missing field: no partial success
        assert!(matches!(
            decode_intent(br#"{"vx": 0.1, "vy": 0.2}"#),
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(
            decode_intent(br#"{"Left": "fast", "Right": 0}"#),
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(decode_intent(&[0xFF, 0xFE, 0x00]), Err(_)));
    }

    #[test]
    fn test_positional_arrays_are_rejected() {
        assert!(matches!(decode_intent(b"[1, -1]"), Err(DecodeError::NotAnObject)));
        assert!(matches!(
            decode_intent(b"[0.5, 0.5, 0]"),
            Err(DecodeError::NotAnObject)
        ));
        assert!(matches!(decode(b"[1, -1]"), Err(DecodeError::NotAnObject)));
        assert!(matches!(decode_feedback(b"[true]"), Err(DecodeError::NotAnObject)));
        assert!(matches!(decode_intent(b"42"), Err(DecodeError::NotAnObject)));
    }

    #[test]
    fn test_generic_decode_rejects_partial_intents() {
        assert!(matches!(
            decode(br#"{"vx": 0.1, "vy": 0.2}"#),
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(
            decode(br#"{"Left": 1}"#),
            Err(DecodeError::Malformed(_))
        ));
        // No intent keys and no self-hit flag
        assert!(matches!(
            decode(br#"{"health": "ok"}"#),
            Err(DecodeError::UnknownMessage)
        ));
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let big = vec![b' '; MAX_DATAGRAM + 1];
        assert!(matches!(
            decode_intent(&big),
            Err(DecodeError::TooLarge(n)) if n == MAX_DATAGRAM + 1
        ));
    }

    #[test]
    fn test_feedback_keeps_unknown_fields() {
        let fb = decode_feedback(br#"{"is_self_hit": true, "battery": 11.4}"#).unwrap();
        assert!(fb.is_self_hit);
        assert_eq!(fb.field("battery"), Some(&serde_json::json!(11.4)));

        // Absent flag reads as false
        let fb = decode_feedback(br#"{"health": "ok"}"#).unwrap();
        assert!(!fb.is_self_hit);
    }

    #[test]
    fn test_generic_decode_tells_messages_apart() {
        match decode(br#"{"Left": 0.2, "Right": 0.4}"#).unwrap() {
            Message::Intent(i) => assert_eq!(i, Intent::tank(0.2, 0.4)),
            other => panic!("expected intent, got {:?}", other),
        }
        match decode(br#"{"is_self_hit": false}"#).unwrap() {
            Message::Feedback(fb) => assert!(!fb.is_self_hit),
            other => panic!("expected feedback, got {:?}", other),
        }
    }
}
