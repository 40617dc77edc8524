//! Subcommand implementations. Each one sends its requests and renders the
//! replies to `out`.

use chrono::{DateTime, Local, Utc};
use seeme_core::ClientSection;
use seeme_protocol::{
    AccountEntry, ActivityData, AddAccountData, FoundData, Method, Response, ERROR_NOT_FOUND,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::io::Write;
use std::time::Duration;
use thiserror::Error;

use crate::daemon_client::DaemonClient;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },

    #[error("{field} is not set; pass it as a flag or set it under [client] in seeme.toml")]
    MissingCredential { field: &'static str },

    #[error("Daemon unreachable: {0}")]
    Transport(String),

    #[error("{message} ({code})")]
    Daemon { code: String, message: String },

    #[error("No account with identity {identity}")]
    UnknownIdentity { identity: String },

    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

type Result<T> = std::result::Result<T, CliError>;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The triple a monitored machine logs in and reports with.
#[derive(Clone)]
pub struct Credentials {
    pub identity: String,
    pub display_name: String,
    pub password: String,
}

impl Credentials {
    /// Flags win over the `[client]` config section.
    pub fn resolve(
        identity: Option<String>,
        display_name: Option<String>,
        password: Option<String>,
        client: &ClientSection,
    ) -> Result<Self> {
        Ok(Self {
            identity: pick("identity", identity, &client.identity)?,
            display_name: pick("name", display_name, &client.display_name)?,
            password: pick("password", password, &client.password)?,
        })
    }

    fn check(&self) -> Result<()> {
        require("identity", &self.identity)?;
        require_present("name", &self.display_name)?;
        require_present("password", &self.password)
    }

    fn params(&self) -> Value {
        json!({
            "identity": self.identity,
            "display_name": self.display_name,
            "password": self.password,
        })
    }
}

pub fn add(client: &DaemonClient, name: &str, password: &str, out: &mut dyn Write) -> Result<()> {
    require_present("name", name)?;
    require_present("password", password)?;
    let data: AddAccountData = call(
        client,
        Method::AddAccount,
        json!({ "display_name": name, "password": password }),
    )?;
    writeln!(out, "{}", data.identity)?;
    Ok(())
}

pub fn delete(client: &DaemonClient, identity: &str, out: &mut dyn Write) -> Result<()> {
    require("identity", identity)?;
    let data: FoundData = call(client, Method::DeleteAccount, json!({ "identity": identity }))?;
    found_or_unknown(data, identity)?;
    writeln!(out, "Deleted {}", identity)?;
    Ok(())
}

pub fn update(
    client: &DaemonClient,
    identity: &str,
    name: &str,
    password: &str,
    out: &mut dyn Write,
) -> Result<()> {
    require("identity", identity)?;
    require_present("name", name)?;
    require_present("password", password)?;
    let data: FoundData = call(
        client,
        Method::UpdateAccount,
        json!({
            "identity": identity,
            "new_display_name": name,
            "new_password": password,
        }),
    )?;
    found_or_unknown(data, identity)?;
    writeln!(out, "Updated {}", identity)?;
    Ok(())
}

pub fn list(client: &DaemonClient, out: &mut dyn Write) -> Result<()> {
    let response = send(client, Method::ListAccounts, None)?;
    let accounts: Vec<AccountEntry> = decode(response)?;
    if accounts.is_empty() {
        writeln!(out, "No accounts")?;
        return Ok(());
    }
    for account in accounts {
        writeln!(out, "{}\t{}", account.identity, account.display_name)?;
    }
    Ok(())
}

pub fn status(client: &DaemonClient, identity: &str, out: &mut dyn Write) -> Result<()> {
    require("identity", identity)?;
    let response = send(
        client,
        Method::QueryActivity,
        Some(json!({ "identity": identity })),
    )?;
    if is_code(&response, ERROR_NOT_FOUND) {
        return Err(CliError::UnknownIdentity {
            identity: identity.to_string(),
        });
    }
    let activity: ActivityData = decode(response)?;
    writeln!(out, "label:   {}", activity.label)?;
    writeln!(out, "updated: {}", local_time(activity.updated_at))?;
    writeln!(
        out,
        "state:   {}",
        if activity.online { "online" } else { "disconnect" }
    )?;
    Ok(())
}

pub fn login(client: &DaemonClient, credentials: &Credentials, out: &mut dyn Write) -> Result<()> {
    credentials.check()?;
    let _: Value = call(client, Method::Login, credentials.params())?;
    writeln!(out, "Logged in")?;
    Ok(())
}

/// Logs in, then reports `label` once, or every `every` until a push fails.
///
/// The label is free text and may be empty.
pub fn report(
    client: &DaemonClient,
    credentials: &Credentials,
    label: &str,
    every: Option<Duration>,
    out: &mut dyn Write,
) -> Result<()> {
    login(client, credentials, out)?;

    let mut params = credentials.params();
    params["label"] = Value::String(label.to_string());

    loop {
        let _: Value = call(client, Method::ReportActivity, params.clone())?;
        writeln!(out, "Reported {}", label)?;
        match every {
            Some(interval) => std::thread::sleep(interval),
            None => return Ok(()),
        }
    }
}

pub fn health(client: &DaemonClient, out: &mut dyn Write) -> Result<()> {
    let response = send(client, Method::GetHealth, None)?;
    let data: Value = decode(response)?;
    let text = serde_json::to_string_pretty(&data)
        .map_err(|err| CliError::Transport(format!("Failed to render health: {}", err)))?;
    writeln!(out, "{}", text)?;
    Ok(())
}

fn require(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(CliError::EmptyField { field });
    }
    Ok(())
}

/// Names and passwords are compared byte for byte; whitespace counts.
fn require_present(field: &'static str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(CliError::EmptyField { field });
    }
    Ok(())
}

fn pick(field: &'static str, flag: Option<String>, configured: &Option<String>) -> Result<String> {
    flag.or_else(|| configured.clone())
        .ok_or(CliError::MissingCredential { field })
}

fn found_or_unknown(data: FoundData, identity: &str) -> Result<()> {
    if data.found {
        Ok(())
    } else {
        Err(CliError::UnknownIdentity {
            identity: identity.to_string(),
        })
    }
}

fn call<T: DeserializeOwned>(client: &DaemonClient, method: Method, params: Value) -> Result<T> {
    decode(send(client, method, Some(params))?)
}

fn send(client: &DaemonClient, method: Method, params: Option<Value>) -> Result<Response> {
    tracing::debug!(method = ?method, addr = %client.addr(), "Sending request");
    client.call(method, params).map_err(CliError::Transport)
}

fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    if !response.ok {
        let (code, message) = response
            .error
            .map(|err| (err.code, err.message))
            .unwrap_or_else(|| ("unknown".to_string(), "Unknown daemon error".to_string()));
        tracing::warn!(code = %code, message = %message, "Daemon rejected request");
        return Err(CliError::Daemon { code, message });
    }
    response.data_as().map_err(|err| CliError::Daemon {
        code: err.code,
        message: err.message,
    })
}

fn is_code(response: &Response, code: &str) -> bool {
    response
        .error
        .as_ref()
        .map(|err| err.code == code)
        .unwrap_or(false)
}

fn local_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format(TIME_FORMAT).to_string()
}
