//! Logical wire shapes, expressed over `serde_json::Value`.
//!
//! The codec turns these into bytes; this module only cares about shape.
//! A request is the array `[id, [namespace, name], [args...]]` and a
//! response is `[id, payload]`. Elements past the expected ones are
//! ignored so newer peers can append fields.

use serde_json::{json, Value};

use crate::error::RemoteError;
use crate::key::FunctionKey;

/// Correlation id used in a response when the offending request's own id
/// could not be determined. Client ids start at 1, so this never matches
/// a live waiter.
pub const UNKNOWN_ID: u64 = 0;

/// Legacy peers report failures as bare strings with this prefix.
pub const LEGACY_ERROR_PREFIX: &str = "#ERR ";

/// A decoded request frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: u64,
    pub key: FunctionKey,
    pub args: Vec<Value>,
}

/// Response payload as seen by the client demultiplexer.
#[derive(Debug, Clone)]
pub enum Payload {
    /// Explicit success.
    Result(Value),
    /// Structured failure from the peer.
    Error(RemoteError),
    /// Error reported in the legacy string form.
    LegacyError(String),
    /// Anything else: treated as a direct success value.
    Bare(Value),
}

/// A frame that did not match the expected shape.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct ShapeViolation(pub String);

pub fn encode_request(request: &Request) -> Value {
    Value::Array(vec![
        Value::from(request.id),
        json!([request.key.namespace(), request.key.name()]),
        Value::Array(request.args.clone()),
    ])
}

pub fn decode_request(frame: Value) -> Result<Request, ShapeViolation> {
    let Value::Array(elements) = frame else {
        return Err(ShapeViolation("request frame is not an array".into()));
    };
    if elements.len() < 3 {
        return Err(ShapeViolation(format!(
            "request frame has {} elements, expected at least 3",
            elements.len()
        )));
    }
    let mut elements = elements.into_iter();
    let id = elements
        .next()
        .and_then(|v| v.as_u64())
        .ok_or_else(|| ShapeViolation("correlation id is not an unsigned integer".into()))?;
    let key = elements
        .next()
        .map(serde_json::from_value::<FunctionKey>)
        .transpose()
        .map_err(|e| ShapeViolation(format!("function key: {e}")))?
        .ok_or_else(|| ShapeViolation("function key is missing".into()))?;
    let args = match elements.next() {
        Some(Value::Array(args)) => args,
        Some(_) => return Err(ShapeViolation("argument list is not an array".into())),
        None => return Err(ShapeViolation("argument list is missing".into())),
    };
    Ok(Request { id, key, args })
}

pub fn encode_result(id: u64, value: Value) -> Value {
    json!([id, { "result": value }])
}

pub fn encode_error(id: u64, error: &RemoteError) -> Value {
    json!([id, { "error": error }])
}

pub fn decode_response(frame: Value) -> Result<(u64, Payload), ShapeViolation> {
    let Value::Array(elements) = frame else {
        return Err(ShapeViolation("response frame is not an array".into()));
    };
    if elements.len() < 2 {
        return Err(ShapeViolation(format!(
            "response frame has {} elements, expected at least 2",
            elements.len()
        )));
    }
    let mut elements = elements.into_iter();
    let id = elements
        .next()
        .and_then(|v| v.as_u64())
        .ok_or_else(|| ShapeViolation("correlation id is not an unsigned integer".into()))?;
    let payload = elements.next().map(classify_payload).unwrap_or_else(|| {
        // unreachable given the length check, but stay total
        Payload::Bare(Value::Null)
    });
    Ok((id, payload))
}

fn classify_payload(value: Value) -> Payload {
    match value {
        Value::Object(mut map) if map.len() == 1 => {
            if let Some(result) = map.remove("result") {
                return Payload::Result(result);
            }
            if let Some(error) = map.remove("error") {
                return match serde_json::from_value::<RemoteError>(error.clone()) {
                    Ok(remote) => Payload::Error(remote),
                    // error-shaped but undecodable: still a failure
                    Err(_) => Payload::LegacyError(error.to_string()),
                };
            }
            Payload::Bare(Value::Object(map))
        }
        Value::String(s) if s.starts_with(LEGACY_ERROR_PREFIX) => {
            Payload::LegacyError(s[LEGACY_ERROR_PREFIX.len()..].to_string())
        }
        other => Payload::Bare(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Fault;

    fn demo_key() -> FunctionKey {
        FunctionKey::new(["Demo"], "add")
    }

    #[test]
    fn request_round_trip() {
        let request = Request {
            id: 7,
            key: demo_key(),
            args: vec![json!(10), json!(20)],
        };
        let frame = encode_request(&request);
        assert_eq!(frame, json!([7, [["Demo"], "add"], [10, 20]]));
        assert_eq!(decode_request(frame).unwrap(), request);
    }

    #[test]
    fn request_with_no_args_is_well_formed() {
        let frame = json!([3, [[], "ping"], []]);
        let request = decode_request(frame).unwrap();
        assert_eq!(request.key, FunctionKey::global("ping"));
        assert!(request.args.is_empty());
    }

    #[test]
    fn trailing_request_elements_are_ignored() {
        let frame = json!([7, [["Demo"], "add"], [1, 2], "future-field"]);
        assert!(decode_request(frame).is_ok());
    }

    #[test]
    fn malformed_requests_are_rejected() {
        for frame in [
            json!("not an array"),
            json!([7, [["Demo"], "add"]]),
            json!(["seven", [["Demo"], "add"], []]),
            json!([7, "Demo::add", []]),
            json!([7, [["Demo"], "add"], "args"]),
            json!([-1, [["Demo"], "add"], []]),
        ] {
            assert!(decode_request(frame).is_err());
        }
    }

    #[test]
    fn response_payload_classification() {
        let (id, payload) = decode_response(json!([4, { "result": 30 }])).unwrap();
        assert_eq!(id, 4);
        assert!(matches!(payload, Payload::Result(v) if v == json!(30)));

        let remote = RemoteError::wrap("failed", Fault::new("Boom", "went boom"));
        let (_, payload) = decode_response(encode_error(4, &remote)).unwrap();
        assert!(matches!(payload, Payload::Error(e) if e.is_kind("Boom")));

        let (_, payload) = decode_response(json!([4, "#ERR out of cheese"])).unwrap();
        assert!(matches!(payload, Payload::LegacyError(m) if m == "out of cheese"));

        // forward-compatibility fallback: a bare value is a success
        let (_, payload) = decode_response(json!([4, 42])).unwrap();
        assert!(matches!(payload, Payload::Bare(v) if v == json!(42)));

        // error-shaped but not a RemoteError: still a failure
        let (_, payload) = decode_response(json!([4, { "error": "boom" }])).unwrap();
        assert!(matches!(payload, Payload::LegacyError(_)));
    }

    #[test]
    fn malformed_responses_are_rejected() {
        assert!(decode_response(json!({ "id": 4 })).is_err());
        assert!(decode_response(json!([4])).is_err());
        assert!(decode_response(json!([null, 1])).is_err());
    }
}
