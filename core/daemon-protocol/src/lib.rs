//! Wire protocol types and validation for seeme-daemon.
//!
//! This crate is shared by the daemon and its clients to prevent schema drift.
//! The daemon remains the authority on validation, but clients can reuse the
//! same types to construct valid requests.
//!
//! Framing is one JSON request per line and one JSON response per line.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_REQUEST_BYTES: usize = 1024 * 1024; // 1MB

pub const MAX_IDENTITY_LEN: usize = 64;
pub const MAX_DISPLAY_NAME_LEN: usize = 128;
pub const MAX_PASSWORD_LEN: usize = 1024;
pub const MAX_LABEL_LEN: usize = 1024;

pub const ERROR_AUTH_FAILED: &str = "auth_failed";
pub const ERROR_NOT_LOGGED_IN: &str = "not_logged_in";
pub const ERROR_NOT_FOUND: &str = "not_found";
pub const ERROR_INVALID_INPUT: &str = "invalid_input";
pub const ERROR_INVALID_PARAMS: &str = "invalid_params";
pub const ERROR_MISSING_FIELD: &str = "missing_field";
pub const ERROR_FORBIDDEN: &str = "forbidden";
pub const ERROR_STORAGE: &str = "storage_error";
pub const ERROR_TOO_MANY_CONNECTIONS: &str = "too_many_connections";

/// Shared by unknown-user and bad-password rejections.
pub const AUTH_FAILED_MESSAGE: &str = "User or password error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum Method {
    GetHealth,
    Login,
    ReportActivity,
    ListAccounts,
    QueryActivity,
    AddAccount,
    DeleteAccount,
    UpdateAccount,
}

impl Method {
    /// Account administration methods.
    pub fn is_admin(self) -> bool {
        matches!(
            self,
            Method::AddAccount | Method::DeleteAccount | Method::UpdateAccount
        )
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Request {
    pub protocol_version: u32,
    pub method: Method,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
}

impl Request {
    pub fn new(method: Method, params: Option<Value>) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            method,
            id: None,
            params,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl Response {
    pub fn ok(id: Option<String>, data: Value) -> Self {
        Self {
            ok: true,
            id,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(id: Option<String>, code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(ErrorInfo::new(code, message)),
        }
    }

    pub fn error_with_info(id: Option<String>, error: ErrorInfo) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(error),
        }
    }

    /// Decodes `data` into a typed payload.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, ErrorInfo> {
        let data = self
            .data
            .clone()
            .ok_or_else(|| ErrorInfo::new("missing_data", "response carried no data"))?;
        serde_json::from_value(data)
            .map_err(|err| ErrorInfo::new("invalid_data", format!("unexpected response data: {}", err)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request Params
// ─────────────────────────────────────────────────────────────────────────────

pub trait Validate {
    fn validate(&self) -> Result<(), ErrorInfo>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginParams {
    pub identity: String,
    pub display_name: String,
    pub password: String,
}

impl Validate for LoginParams {
    fn validate(&self) -> Result<(), ErrorInfo> {
        require_string(&self.identity, "identity", MAX_IDENTITY_LEN)?;
        require_present(&self.display_name, "display_name", MAX_DISPLAY_NAME_LEN)?;
        require_present(&self.password, "password", MAX_PASSWORD_LEN)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportActivityParams {
    pub identity: String,
    pub display_name: String,
    pub password: String,
    pub label: String,
}

impl Validate for ReportActivityParams {
    fn validate(&self) -> Result<(), ErrorInfo> {
        require_string(&self.identity, "identity", MAX_IDENTITY_LEN)?;
        require_present(&self.display_name, "display_name", MAX_DISPLAY_NAME_LEN)?;
        require_present(&self.password, "password", MAX_PASSWORD_LEN)?;
        require_length(&self.label, "label", MAX_LABEL_LEN)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdentityParams {
    pub identity: String,
}

impl Validate for IdentityParams {
    fn validate(&self) -> Result<(), ErrorInfo> {
        require_string(&self.identity, "identity", MAX_IDENTITY_LEN)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddAccountParams {
    pub display_name: String,
    pub password: String,
}

impl Validate for AddAccountParams {
    fn validate(&self) -> Result<(), ErrorInfo> {
        require_length(&self.display_name, "display_name", MAX_DISPLAY_NAME_LEN)?;
        require_length(&self.password, "password", MAX_PASSWORD_LEN)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateAccountParams {
    pub identity: String,
    pub new_display_name: String,
    pub new_password: String,
}

impl Validate for UpdateAccountParams {
    fn validate(&self) -> Result<(), ErrorInfo> {
        require_string(&self.identity, "identity", MAX_IDENTITY_LEN)?;
        require_length(&self.new_display_name, "new_display_name", MAX_DISPLAY_NAME_LEN)?;
        require_length(&self.new_password, "new_password", MAX_PASSWORD_LEN)?;
        Ok(())
    }
}

/// Decodes and validates request params.
///
/// Empty display names and passwords on admin methods pass here; the store
/// rejects them as `invalid_input`.
pub fn parse_params<T>(params: Option<Value>) -> Result<T, ErrorInfo>
where
    T: DeserializeOwned + Validate,
{
    let params =
        params.ok_or_else(|| ErrorInfo::new(ERROR_INVALID_PARAMS, "params are required"))?;
    if !params.is_object() {
        return Err(ErrorInfo::new(
            ERROR_INVALID_PARAMS,
            "params must be an object",
        ));
    }
    let parsed: T = serde_json::from_value(params).map_err(|err| {
        ErrorInfo::new(
            ERROR_INVALID_PARAMS,
            format!("params are invalid: {}", err),
        )
    })?;
    parsed.validate()?;
    Ok(parsed)
}

/// Identities are generated, so a blank one is never meaningful.
fn require_string(value: &str, field: &str, max_len: usize) -> Result<(), ErrorInfo> {
    if value.trim().is_empty() {
        return Err(missing(field));
    }
    require_length(value, field, max_len)
}

/// Credentials are compared byte for byte, so only the empty string is missing.
fn require_present(value: &str, field: &str, max_len: usize) -> Result<(), ErrorInfo> {
    if value.is_empty() {
        return Err(missing(field));
    }
    require_length(value, field, max_len)
}

fn missing(field: &str) -> ErrorInfo {
    ErrorInfo::new(ERROR_MISSING_FIELD, format!("{} is required", field))
}

fn require_length(value: &str, field: &str, max_len: usize) -> Result<(), ErrorInfo> {
    if value.chars().count() > max_len {
        return Err(ErrorInfo::new(
            ERROR_INVALID_PARAMS,
            format!("{} must be {} characters or fewer", field, max_len),
        ));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Response Payloads
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusData {
    pub status: String,
}

impl StatusData {
    pub fn success() -> Self {
        Self {
            status: "success".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEntry {
    pub identity: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityData {
    pub label: String,
    pub updated_at: DateTime<Utc>,
    pub online: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddAccountData {
    pub identity: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoundData {
    pub found: bool,
}
