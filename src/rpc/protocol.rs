//! JSON-RPC 2.0 message types.
//!
//! One envelope type covers calls, notifications and responses, as they share a wire
//! shape. Parameters are kept as raw JSON so each method decodes (or pattern-matches)
//! them itself.
//! See: https://www.jsonrpc.org/specification

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use serde_json::value::RawValue;

pub const JSONRPC_VERSION: &str = "2.0";

/// Method name of server-pushed subscription notifications.
pub const SUBSCRIPTION_METHOD: &str = "eth_subscription";

// Standard JSON-RPC 2.0 error codes
pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;

/// A JSON-RPC 2.0 message: a call, a notification, or a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub jsonrpc: String,
    /// Correlation identifier. Present on calls and their responses, absent on notifications.
    /// An explicit `null` is kept as `Some(Value::Null)`.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub method: String,
    /// Parameters, left undecoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Box<RawValue>>,
    /// Result on success (mutually exclusive with error)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error on failure (mutually exclusive with result)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Parameters of an `eth_subscription` notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionResult<T> {
    pub subscription: String,
    pub result: T,
}

impl Message {
    /// A call. Mostly useful to clients and tests.
    pub fn call(id: impl Into<Value>, method: &str, params: Option<Box<RawValue>>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id.into()),
            method: method.to_string(),
            params,
            result: None,
            error: None,
        }
    }

    /// A server-initiated notification.
    pub fn notification(method: &str, params: impl Serialize) -> serde_json::Result<Self> {
        Ok(Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: method.to_string(),
            params: Some(serde_json::value::to_raw_value(&params)?),
            result: None,
            error: None,
        })
    }

    /// A success response to this message, echoing its id.
    pub fn response(&self, result: impl Serialize) -> serde_json::Result<Self> {
        Ok(Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: self.id.clone(),
            method: String::new(),
            params: None,
            result: Some(serde_json::to_value(result)?),
            error: None,
        })
    }

    /// An error response. `id` is `null` when the request could not be identified.
    pub fn error_response(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id.unwrap_or(Value::Null)),
            method: String::new(),
            params: None,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// Create a parse error response for a frame that could not be decoded.
    pub fn parse_error(details: impl std::fmt::Display) -> Self {
        Self::error_response(None, PARSE_ERROR, format!("Parse error: {}", details))
    }

    /// A call has a method and a string, number or null id.
    pub fn is_call(&self) -> bool {
        self.has_valid_id() && !self.method.is_empty()
    }

    /// A notification has a method and no id.
    pub fn is_notification(&self) -> bool {
        self.id.is_none() && !self.method.is_empty()
    }

    /// A response carries an id and either a result or an error, and no method.
    pub fn is_response(&self) -> bool {
        self.id.is_some() && self.method.is_empty() && (self.result.is_some() || self.error.is_some())
    }

    /// Raw JSON text of the parameters, or `""` when there are none.
    pub fn params_text(&self) -> &str {
        self.params.as_deref().map(RawValue::get).unwrap_or("")
    }

    fn has_valid_id(&self) -> bool {
        matches!(
            self.id,
            Some(Value::String(_) | Value::Number(_) | Value::Null)
        )
    }
}

/// Deserialize a field that is known to be present, so that `null` is not read as absent.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}
