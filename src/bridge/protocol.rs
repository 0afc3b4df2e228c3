//! Wire types exchanged with the worker process.
//!
//! Every message is a single JSON object on a single line. `serde_json`
//! escapes embedded newlines inside strings, so a serialized value can never
//! break the line framing.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Free-form key/value payload carried in `data` and `secure_data`.
pub type Payload = Map<String, Value>;

/// Gateway definition handed to the worker at startup.
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GatewayConfig {
    /// Worker-side adapter type (e.g. "bogus").
    pub module: String,

    /// Logical name callers use to address this gateway.
    pub name: String,

    /// Adapter parameters, usually processor credentials.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl GatewayConfig {
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

// Credentials live in `params`; only the keys are printed.
impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("module", &self.module)
            .field("name", &self.name)
            .field("params", &self.params.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Operations a gateway may support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Authorize,
    Capture,
    Purchase,
    Void,
    Refund,
    Store,
    Retrieve,
    Update,
    Unstore,
}

impl Action {
    pub const ALL: [Action; 9] = [
        Action::Authorize,
        Action::Capture,
        Action::Purchase,
        Action::Void,
        Action::Refund,
        Action::Store,
        Action::Retrieve,
        Action::Update,
        Action::Unstore,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Authorize => "authorize",
            Action::Capture => "capture",
            Action::Purchase => "purchase",
            Action::Void => "void",
            Action::Refund => "refund",
            Action::Store => "store",
            Action::Retrieve => "retrieve",
            Action::Update => "update",
            Action::Unstore => "unstore",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing an action name that is not in [`Action::ALL`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAction(pub String);

impl fmt::Display for UnknownAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown action '{}'", self.0)
    }
}

impl std::error::Error for UnknownAction {}

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .iter()
            .find(|a| a.as_str() == s)
            .copied()
            .ok_or_else(|| UnknownAction(s.to_string()))
    }
}

/// Outbound message: one per dispatch.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Request {
    pub request_id: u32,
    pub data: Option<Payload>,
    pub secure_data: Option<Payload>,
    pub gateway: String,
    /// `None` asks the worker for the gateway's supported actions.
    pub action: Option<String>,
}

impl Request {
    pub fn is_discovery(&self) -> bool {
        self.action.is_none()
    }
}

/// Inbound message: exactly one per request.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct Response {
    pub request_id: u32,

    #[serde(default)]
    pub success: bool,

    #[serde(default)]
    pub message: String,

    /// Present only when answering a discovery request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supported_actions: Option<BTreeSet<String>>,

    /// Action-specific fields (authorization, cc_display, amount, ...).
    #[serde(flatten)]
    pub fields: Payload,
}

impl Response {
    /// A failed response produced locally, without a worker round trip.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            request_id: 0,
            success: false,
            message: message.into(),
            supported_actions: None,
            fields: Payload::new(),
        }
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Flatten back into a single mapping, the shape handed to the codec.
    pub fn into_payload(self) -> Payload {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Payload::new(),
        }
    }
}
