//! Result envelopes returned by every dispatch path.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Uniform result shape: `{status, object, method, result, error?}`.
///
/// `object` carries the display name of the object the operation acted on,
/// `method` the handler method that produced the result. `error` is present
/// only when `status` is false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub status: bool,
    pub object: Option<String>,
    pub method: Option<String>,
    pub result: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Envelope {
    /// Successful result.
    #[must_use]
    pub fn success(object: Option<String>, method: Option<&str>, result: Value) -> Self {
        Self {
            status: true,
            object,
            method: method.map(str::to_owned),
            result,
            error: None,
        }
    }

    /// Failed result carrying an error message.
    #[must_use]
    pub fn failure(object: Option<String>, method: Option<&str>, error: impl Into<String>) -> Self {
        Self {
            status: false,
            object,
            method: method.map(str::to_owned),
            result: Value::Null,
            error: Some(error.into()),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status
    }

    /// Enforce the envelope invariant: `error` exists iff `status` is false.
    #[must_use]
    pub(crate) fn normalize(mut self, operation: &str) -> Self {
        if self.status {
            self.error = None;
        } else if self.error.is_none() {
            self.error = Some(format!("Operation '{operation}' failed"));
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// Output of `Router::process_request`: one envelope, or one per batch entry.
///
/// A batch serializes as a JSON object keyed by request id, in input order.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Single(Envelope),
    Batch(Vec<(String, Envelope)>),
}

impl Response {
    /// The envelope of a single request.
    #[must_use]
    pub fn as_single(&self) -> Option<&Envelope> {
        match self {
            Self::Single(envelope) => Some(envelope),
            Self::Batch(_) => None,
        }
    }

    /// The per-id envelopes of a batch.
    #[must_use]
    pub fn as_batch(&self) -> Option<&[(String, Envelope)]> {
        match self {
            Self::Single(_) => None,
            Self::Batch(entries) => Some(entries),
        }
    }

    /// Envelope for a batch entry id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Envelope> {
        self.as_batch()?
            .iter()
            .find(|(entry_id, _)| entry_id == id)
            .map(|(_, envelope)| envelope)
    }

    /// True when every contained envelope succeeded.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        match self {
            Self::Single(envelope) => envelope.status,
            Self::Batch(entries) => entries.iter().all(|(_, envelope)| envelope.status),
        }
    }
}

impl Serialize for Response {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Single(envelope) => envelope.serialize(serializer),
            Self::Batch(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (id, envelope) in entries {
                    map.serialize_entry(id, envelope)?;
                }
                map.end()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn success_omits_error_field() {
        let envelope = Envelope::success(Some("B1".into()), Some("manage_block"), json!(1));
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            value,
            json!({"status": true, "object": "B1", "method": "manage_block", "result": 1})
        );
    }

    #[test]
    fn failure_carries_error_and_null_result() {
        let envelope = Envelope::failure(None, None, "boom");
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            value,
            json!({"status": false, "object": null, "method": null, "result": null, "error": "boom"})
        );
    }

    #[test]
    fn normalize_drops_error_on_success() {
        let mut envelope = Envelope::success(None, None, Value::Null);
        envelope.error = Some("stale".into());
        assert_eq!(envelope.normalize("manage").error, None);
    }

    #[test]
    fn normalize_fills_missing_error_on_failure() {
        let mut envelope = Envelope::failure(None, None, "x");
        envelope.error = None;
        let envelope = envelope.normalize("render");
        assert_eq!(envelope.error.as_deref(), Some("Operation 'render' failed"));
    }

    #[test]
    fn batch_serializes_in_input_order() {
        let response = Response::Batch(vec![
            ("z".into(), Envelope::success(None, None, json!(1))),
            ("a".into(), Envelope::failure(None, None, "no")),
        ]);
        let text = serde_json::to_string(&response).unwrap();
        assert!(text.find("\"z\"").unwrap() < text.find("\"a\"").unwrap());
        assert!(!response.all_succeeded());
        assert_eq!(response.get("a").unwrap().error.as_deref(), Some("no"));
        assert!(response.as_single().is_none());
    }
}
