//! JSON-RPC 2.0 envelope spoken on the AppGate service control socket.
//!
//! The service is loose about the envelope: replies to `loginSaml` carry their
//! payload under `params` rather than `result`, and pushes arrive without an
//! `id`. Every incoming field is therefore optional, and payload extraction is
//! done through small typed structs that fail with a `serde_json::Error`
//! instead of silently defaulting.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";
pub const INVALID_PARAMS: i32 = -32602;

/// JSON-RPC 2.0 Request ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(u64),
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<u64> for RequestId {
    fn from(n: u64) -> Self {
        RequestId::Number(n)
    }
}

/// JSON-RPC 2.0 Request
///
/// `params` is always serialized; an absent parameter set goes out as `{}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    pub params: Value,
}

impl Request {
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>, id: RequestId) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params: params.unwrap_or_else(|| Value::Object(serde_json::Map::new())),
        }
    }
}

/// Reply read back after a request.
///
/// The service does not always echo the request id, and callers do not
/// correlate on it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    /// Extract the login view name carried under `params.view`.
    ///
    /// Returns `Ok(None)` when the reply has no `params` at all, and an error
    /// when `params` is present but does not hold a string `view`.
    ///
    /// # Errors
    ///
    /// Returns the deserialization error for a malformed `params` object.
    pub fn login_view(&self) -> Result<Option<LoginView>, serde_json::Error> {
        self.params.as_ref().map(LoginView::deserialize).transpose()
    }
}

/// Message pushed by the service without a preceding request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Notification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Notification {
    /// Extract `params.viewData.setup.selectedProfile.id`.
    ///
    /// # Errors
    ///
    /// Returns a deserialization error naming the first missing or mistyped
    /// field on the path.
    pub fn saml_profile_id(&self) -> Result<SamlProfileId, serde_json::Error> {
        let Some(params) = &self.params else {
            return Err(<serde_json::Error as serde::de::Error>::missing_field(
                "params",
            ));
        };
        let setup = SetupParams::deserialize(params)?;
        Ok(setup.view_data.setup.selected_profile.id)
    }
}

/// Identifier of the SAML login profile selected in the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SamlProfileId(pub i64);

impl fmt::Display for SamlProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetupParams {
    view_data: ViewData,
}

#[derive(Debug, Deserialize)]
struct ViewData {
    setup: Setup,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Setup {
    selected_profile: SelectedProfile,
}

#[derive(Debug, Deserialize)]
struct SelectedProfile {
    id: SamlProfileId,
}

/// `params` payload of a `loginSaml` reply
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoginView {
    pub view: String,
}

/// JSON-RPC 2.0 Error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("RPC error {code}: {message}")]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    #[must_use]
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

/// Service error codes that are known to be benign noise
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoredErrorCodes(BTreeSet<i32>);

impl IgnoredErrorCodes {
    #[must_use]
    pub fn contains(&self, code: i32) -> bool {
        self.0.contains(&code)
    }

    #[must_use]
    pub fn is_ignored(&self, error: &RpcError) -> bool {
        self.contains(error.code)
    }
}

impl Default for IgnoredErrorCodes {
    fn default() -> Self {
        Self(BTreeSet::from([INVALID_PARAMS]))
    }
}

impl FromIterator<i32> for IgnoredErrorCodes {
    fn from_iter<I: IntoIterator<Item = i32>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
