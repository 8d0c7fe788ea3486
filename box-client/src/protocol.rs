//! Call-shaped requests and strict reply decoding
//!
//! A request is a function name plus positional arguments; a successful reply
//! is an ordered list of dynamic values. Typed replies are deserialized with
//! serde, and a failure carries the path of the first offending field.

use crate::error::{DecodeError, ErrorCode, RemoteCallError};
use serde::de::DeserializeOwned;
use serde_json::Value;
use serde_path_to_error::Segment;
use std::fmt;

/// A named remote call with positional arguments
#[derive(Debug, Clone, PartialEq)]
pub struct CallRequest {
    function: String,
    args: Vec<Value>,
}

impl CallRequest {
    /// Create a call with no arguments
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            args: Vec::new(),
        }
    }

    /// Create a call with positional arguments
    pub fn with_args(function: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            function: function.into(),
            args,
        }
    }

    /// Append one positional argument
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn function(&self) -> &str {
        &self.function
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }
}

/// Reply envelope produced by the engine for one call
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Call returned, possibly with no values
    Success { data: Vec<Value> },
    /// Call raised an engine error
    Error { error: RemoteCallError },
}

impl Response {
    /// Creates a success response
    pub fn success(data: Vec<Value>) -> Self {
        Self::Success { data }
    }

    /// Creates an empty success response
    pub fn empty() -> Self {
        Self::Success { data: Vec::new() }
    }

    /// Creates an error response
    pub fn error(code: impl Into<ErrorCode>, message: impl Into<String>) -> Self {
        Self::Error {
            error: RemoteCallError::new(code, message),
        }
    }

    /// Extract the returned values or the engine error
    pub fn into_result(self) -> Result<Vec<Value>, RemoteCallError> {
        match self {
            Self::Success { data } => Ok(data),
            Self::Error { error } => Err(error),
        }
    }
}

/// Location inside a reply, rendered as `$[0].replication.1.uuid`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath(String);

impl FieldPath {
    pub fn root() -> Self {
        Self("$".to_string())
    }

    pub fn index(&self, index: usize) -> Self {
        Self(format!("{}[{}]", self.0, index))
    }

    pub fn field(&self, name: &str) -> Self {
        Self(format!("{}.{}", self.0, name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Decode one dynamic value, reporting failures relative to `path`
pub fn decode_value<T: DeserializeOwned>(
    value: &Value,
    path: &FieldPath,
) -> Result<T, DecodeError> {
    serde_path_to_error::deserialize(value).map_err(|err| {
        let at = err.path().iter().fold(path.clone(), |at, segment| match segment {
            Segment::Seq { index } => at.index(*index),
            Segment::Map { key } => at.field(key),
            Segment::Enum { variant } => at.field(variant),
            Segment::Unknown => at.field("?"),
        });
        DecodeError::new(at, err.inner().to_string())
    })
}

/// Check the number of returned values
pub fn expect_arity(data: &[Value], arity: usize) -> Result<(), DecodeError> {
    if data.len() == arity {
        Ok(())
    } else {
        Err(DecodeError::mismatch(
            FieldPath::root(),
            &format!("{} returned value(s)", arity),
            &format!("{} value(s)", data.len()),
        ))
    }
}

/// Decode a reply that carries exactly one value
pub fn decode_single<T: DeserializeOwned>(data: &[Value]) -> Result<T, DecodeError> {
    expect_arity(data, 1)?;
    decode_value(&data[0], &FieldPath::root().index(0))
}

/// Typed result decoded from a whole reply
pub trait FromReply: Sized {
    fn from_reply(data: &[Value]) -> Result<Self, DecodeError>;
}

impl FromReply for () {
    fn from_reply(data: &[Value]) -> Result<Self, DecodeError> {
        expect_arity(data, 0)
    }
}

impl FromReply for bool {
    fn from_reply(data: &[Value]) -> Result<Self, DecodeError> {
        decode_single(data)
    }
}

impl FromReply for String {
    fn from_reply(data: &[Value]) -> Result<Self, DecodeError> {
        decode_single(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_building() {
        let req = CallRequest::new("box.schema.user.exists").arg("alice");
        assert_eq!(req.function(), "box.schema.user.exists");
        assert_eq!(req.args(), &[json!("alice")]);

        let req = CallRequest::with_args("echo", vec![json!(1), json!(2)]);
        assert_eq!(req.args().len(), 2);
    }

    #[test]
    fn test_response_into_result() {
        let data = Response::success(vec![json!(true)]).into_result().unwrap();
        assert_eq!(data, vec![json!(true)]);

        let err = Response::error(ErrorCode::ACCESS_DENIED, "denied")
            .into_result()
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ACCESS_DENIED);
    }

    #[test]
    fn test_single_value_arity() {
        assert!(bool::from_reply(&[json!(true)]).unwrap());

        let err = bool::from_reply(&[]).unwrap_err();
        assert_eq!(err.path, "$");
        assert_eq!(err.reason, "expected 1 returned value(s), found 0 value(s)");

        let err = bool::from_reply(&[json!(true), json!(false)]).unwrap_err();
        assert!(err.reason.ends_with("found 2 value(s)"));
    }

    #[test]
    fn test_type_mismatch_reports_path() {
        let err = String::from_reply(&[json!(12)]).unwrap_err();
        assert_eq!(err.path, "$[0]");
        assert!(err.reason.contains("expected a string"), "{}", err.reason);
    }

    #[test]
    fn test_empty_reply() {
        assert!(<()>::from_reply(&[]).is_ok());
        assert!(<()>::from_reply(&[json!(null)]).is_err());
    }

    #[test]
    fn test_nested_path() {
        #[derive(Debug, serde::Deserialize)]
        struct Outer {
            #[allow(dead_code)]
            items: Vec<Inner>,
        }

        #[derive(Debug, serde::Deserialize)]
        struct Inner {
            #[allow(dead_code)]
            pid: u32,
        }

        let value = json!({"items": [{"pid": 1}, {"pid": "two"}]});
        let err = decode_value::<Outer>(&value, &FieldPath::root().index(0)).unwrap_err();
        assert_eq!(err.path, "$[0].items[1].pid");

        let value = json!({"items": [{"pid": 1}, {}]});
        let err = decode_value::<Outer>(&value, &FieldPath::root()).unwrap_err();
        assert_eq!(err.path, "$.items[1]");
        assert!(err.reason.contains("missing field `pid`"), "{}", err.reason);
    }

    #[test]
    fn test_u32_overflow() {
        let err = decode_value::<u32>(&json!(u64::MAX), &FieldPath::root()).unwrap_err();
        assert_eq!(err.path, "$");
    }
}
