//! Request types and their parsing from JSON.
//!
//! A JSON object carrying `"operation"` is a single request. A non-empty
//! JSON object without it is a batch: every value is a sub-request keyed by
//! a caller-chosen id. Parsing never fails as a whole; malformed entries are
//! kept as `MalformedRequest` so the router can report them per id.

use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::object::Object;

/// Free-form attribute mapping carried by a request.
pub type Attributes = serde_json::Map<String, Value>;

pub(crate) const NO_OPERATION: &str = "No operation specified in request";
pub(crate) const MISSING_SUB_OPERATION: &str = "Missing 'operation' in sub-request";

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// A single request: `{operation, obj?, method?, attributes?}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Request<O> {
    pub operation: Option<String>,
    pub obj: Option<O>,
    pub method: Option<String>,
    pub attributes: Option<Attributes>,
}

impl<O> Request<O> {
    /// Request for `operation` against the managing object.
    #[must_use]
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: Some(operation.into()),
            obj: None,
            method: None,
            attributes: None,
        }
    }

    /// Request without an operation name. Dispatching it always fails.
    #[must_use]
    pub fn without_operation() -> Self {
        Self {
            operation: None,
            obj: None,
            method: None,
            attributes: None,
        }
    }

    #[must_use]
    pub fn with_object(mut self, obj: O) -> Self {
        self.obj = Some(obj);
        self
    }

    #[must_use]
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    #[must_use]
    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = Some(attributes);
        self
    }
}

// ---------------------------------------------------------------------------
// MalformedRequest
// ---------------------------------------------------------------------------

/// A request that could not be turned into a `Request`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedRequest {
    /// Display name of the object the caller supplied, if recognisable.
    pub object: Option<String>,
    pub error: String,
}

impl fmt::Display for MalformedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.error)
    }
}

impl std::error::Error for MalformedRequest {}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// Ordered set of sub-requests keyed by id.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<O> {
    entries: Vec<(String, Result<Request<O>, MalformedRequest>)>,
}

impl<O> Batch<O> {
    #[must_use]
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Append a sub-request. Ids are not deduplicated here; the JSON form
    /// cannot carry duplicates and typed callers own their ids.
    pub fn push(&mut self, id: impl Into<String>, request: Request<O>) {
        self.entries.push((id.into(), Ok(request)));
    }

    #[must_use]
    pub fn with(mut self, id: impl Into<String>, request: Request<O>) -> Self {
        self.push(id, request);
        self
    }

    pub(crate) fn push_malformed(&mut self, id: String, malformed: MalformedRequest) {
        self.entries.push((id, Err(malformed)));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Result<Request<O>, MalformedRequest>)> {
        self.entries.iter().map(|(id, entry)| (id.as_str(), entry))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<O> Default for Batch<O> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// A parsed JSON request.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound<O> {
    Single(Result<Request<O>, MalformedRequest>),
    Batch(Batch<O>),
}

impl<O: Object + DeserializeOwned> Inbound<O> {
    /// Classify and parse a JSON request.
    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        let Value::Object(map) = value else {
            return Self::Single(Err(MalformedRequest {
                object: None,
                error: format!("Request must be a JSON object, got {}", kind(value)),
            }));
        };

        if map.is_empty() || map.contains_key("operation") {
            return Self::Single(parse_fields(map, NO_OPERATION));
        }

        let mut batch = Batch::new();
        for (id, sub) in map {
            match sub {
                Value::Object(fields) => match parse_fields(fields, MISSING_SUB_OPERATION) {
                    Ok(request) => batch.push(id.clone(), request),
                    Err(malformed) => batch.push_malformed(id.clone(), malformed),
                },
                other => batch.push_malformed(
                    id.clone(),
                    MalformedRequest {
                        object: None,
                        error: format!(
                            "Invalid sub-request type: expected object, got {}",
                            kind(other)
                        ),
                    },
                ),
            }
        }
        Self::Batch(batch)
    }
}

/// Validate fields in the order operation, method, attributes, obj.
fn parse_fields<O: Object + DeserializeOwned>(
    fields: &Attributes,
    missing_operation: &str,
) -> Result<Request<O>, MalformedRequest> {
    let obj: Result<Option<O>, String> = match fields.get("obj") {
        None | Some(Value::Null) => Ok(None),
        Some(raw) => serde_json::from_value(raw.clone())
            .map(Some)
            .map_err(|e| format!("Invalid 'obj': {e}")),
    };
    let echo = match &obj {
        Ok(obj) => obj.as_ref().and_then(<O as Object>::label),
        Err(_) => fields
            .get("obj")
            .and_then(|raw| raw.get("name"))
            .and_then(Value::as_str)
            .map(str::to_owned),
    };
    let malformed = |error: String| MalformedRequest {
        object: echo.clone(),
        error,
    };

    let operation = match fields.get("operation") {
        None | Some(Value::Null) => return Err(malformed(missing_operation.to_owned())),
        Some(Value::String(name)) => name.clone(),
        Some(other) => {
            return Err(malformed(format!(
                "Invalid 'operation' type: expected string, got {}",
                kind(other)
            )))
        }
    };

    let method = match fields.get("method") {
        None | Some(Value::Null) => None,
        Some(Value::String(name)) => Some(name.clone()),
        Some(other) => {
            return Err(malformed(format!(
                "Invalid 'method' type: expected string or null, got {}",
                kind(other)
            )))
        }
    };

    let attributes = match fields.get("attributes") {
        None | Some(Value::Null) => None,
        Some(Value::Object(attributes)) => Some(attributes.clone()),
        Some(other) => {
            return Err(malformed(format!(
                "Invalid 'attributes' type: expected object or null, got {}",
                kind(other)
            )))
        }
    };

    let obj = obj.map_err(malformed)?;

    Ok(Request {
        operation: Some(operation),
        obj,
        method,
        attributes,
    })
}

/// JSON type name used in error messages.
pub(crate) fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
