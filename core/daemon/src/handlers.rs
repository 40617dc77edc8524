//! Request dispatch: one validated request in, one response out.

use std::net::SocketAddr;

use seeme_core::{LoginOutcome, ReportOutcome, SeemeError};
use seeme_protocol::{
    parse_params, AccountEntry, ActivityData, AddAccountParams, AddAccountData, ErrorInfo,
    FoundData, IdentityParams, LoginParams, Method, ReportActivityParams, Request, Response,
    StatusData, UpdateAccountParams, AUTH_FAILED_MESSAGE, ERROR_AUTH_FAILED, ERROR_FORBIDDEN,
    ERROR_INVALID_INPUT, ERROR_NOT_FOUND, ERROR_NOT_LOGGED_IN, ERROR_STORAGE, PROTOCOL_VERSION,
};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::state::SharedState;

pub fn handle_request(request: Request, peer: Option<SocketAddr>, state: &SharedState) -> Response {
    if request.protocol_version != PROTOCOL_VERSION {
        return Response::error(
            request.id,
            "protocol_mismatch",
            "unsupported protocol version",
        );
    }

    if request.method.is_admin() && state.server().admin_loopback_only && !is_loopback(peer) {
        warn!(method = ?request.method, peer = ?peer, "Admin request from non-loopback peer refused");
        return Response::error(
            request.id,
            ERROR_FORBIDDEN,
            "account administration is only accepted from localhost",
        );
    }

    let coordinator = state.coordinator();
    let id = request.id;
    match request.method {
        Method::GetHealth => match coordinator.health() {
            Ok(health) => Response::ok(
                id,
                serde_json::json!({
                    "status": "ok",
                    "pid": std::process::id(),
                    "version": env!("CARGO_PKG_VERSION"),
                    "protocol_version": PROTOCOL_VERSION,
                    "accounts": health.accounts,
                    "sessions": health.sessions,
                    "security": state.security_snapshot(),
                }),
            ),
            Err(err) => core_error(id, err),
        },
        Method::Login => {
            let params: LoginParams = match parse_params(request.params) {
                Ok(params) => params,
                Err(err) => return Response::error_with_info(id, err),
            };
            match coordinator.authenticate(&params.identity, &params.display_name, &params.password)
            {
                Ok(LoginOutcome::Accepted) => {
                    info!(identity = %params.identity, "Login accepted");
                    to_response(id, &StatusData::success())
                }
                Ok(LoginOutcome::Rejected(reason)) => {
                    info!(identity = %params.identity, reason = ?reason, "Login rejected");
                    Response::error(id, ERROR_AUTH_FAILED, AUTH_FAILED_MESSAGE)
                }
                Err(err) => core_error(id, err),
            }
        }
        Method::ReportActivity => {
            let params: ReportActivityParams = match parse_params(request.params) {
                Ok(params) => params,
                Err(err) => return Response::error_with_info(id, err),
            };
            match coordinator.report_activity(
                &params.identity,
                &params.display_name,
                &params.password,
                &params.label,
            ) {
                Ok(ReportOutcome::Accepted) => to_response(id, &StatusData::success()),
                Ok(ReportOutcome::Unauthenticated) => {
                    Response::error(id, ERROR_NOT_LOGGED_IN, "User not logged in")
                }
                Err(err) => core_error(id, err),
            }
        }
        Method::ListAccounts => match coordinator.list_accounts() {
            Ok(accounts) => {
                let entries: Vec<AccountEntry> = accounts
                    .into_iter()
                    .map(|account| AccountEntry {
                        identity: account.identity,
                        display_name: account.display_name,
                    })
                    .collect();
                debug!(accounts = entries.len(), "Account list");
                to_response(id, &entries)
            }
            Err(err) => core_error(id, err),
        },
        Method::QueryActivity => {
            let params: IdentityParams = match parse_params(request.params) {
                Ok(params) => params,
                Err(err) => return Response::error_with_info(id, err),
            };
            match coordinator.query_activity(&params.identity) {
                Some(snapshot) => to_response(
                    id,
                    &ActivityData {
                        label: snapshot.label,
                        updated_at: snapshot.updated_at,
                        online: snapshot.online,
                    },
                ),
                None => Response::error(id, ERROR_NOT_FOUND, "Data not found"),
            }
        }
        Method::AddAccount => {
            let params: AddAccountParams = match parse_params(request.params) {
                Ok(params) => params,
                Err(err) => return Response::error_with_info(id, err),
            };
            match coordinator.add_account(&params.display_name, &params.password) {
                Ok(identity) => to_response(id, &AddAccountData { identity }),
                Err(err) => core_error(id, err),
            }
        }
        Method::DeleteAccount => {
            let params: IdentityParams = match parse_params(request.params) {
                Ok(params) => params,
                Err(err) => return Response::error_with_info(id, err),
            };
            match coordinator.delete_account(&params.identity) {
                Ok(found) => to_response(id, &FoundData { found }),
                Err(err) => core_error(id, err),
            }
        }
        Method::UpdateAccount => {
            let params: UpdateAccountParams = match parse_params(request.params) {
                Ok(params) => params,
                Err(err) => return Response::error_with_info(id, err),
            };
            match coordinator.update_account(
                &params.identity,
                &params.new_display_name,
                &params.new_password,
            ) {
                Ok(found) => to_response(id, &FoundData { found }),
                Err(err) => core_error(id, err),
            }
        }
    }
}

fn is_loopback(peer: Option<SocketAddr>) -> bool {
    peer.map(|addr| addr.ip().is_loopback()).unwrap_or(false)
}

fn to_response<T: Serialize>(id: Option<String>, payload: &T) -> Response {
    match serde_json::to_value(payload) {
        Ok(value) => Response::ok(id, value),
        Err(err) => Response::error(
            id,
            "serialization_error",
            format!("Failed to serialize response: {}", err),
        ),
    }
}

fn core_error(id: Option<String>, err: SeemeError) -> Response {
    let info = match &err {
        SeemeError::InvalidInput { .. } => ErrorInfo::new(ERROR_INVALID_INPUT, err.to_string()),
        _ if err.is_storage() => {
            error!(error = %err, "Account store operation failed");
            ErrorInfo::new(ERROR_STORAGE, "account store unavailable")
        }
        _ => {
            error!(error = %err, "Request failed");
            ErrorInfo::new("internal_error", "request could not be completed")
        }
    };
    Response::error_with_info(id, info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use seeme_core::{Coordinator, SeemeConfig, StorageConfig};
    use serde_json::{json, Value};
    use tempfile::TempDir;

    const LOCAL: &str = "127.0.0.1:40000";
    const REMOTE: &str = "192.0.2.10:40000";

    fn setup_with(admin_loopback_only: bool) -> (TempDir, SharedState) {
        let temp = TempDir::new().expect("temp dir");
        let mut config = SeemeConfig::default();
        config.security.hash_iterations = 500;
        config.server.admin_loopback_only = admin_loopback_only;
        let coordinator =
            Coordinator::open(&StorageConfig::with_root(temp.path().to_path_buf()), &config)
                .expect("open coordinator");
        (temp, SharedState::new(coordinator, config.server))
    }

    fn setup() -> (TempDir, SharedState) {
        setup_with(true)
    }

    fn call(state: &SharedState, method: Method, params: Option<Value>) -> Response {
        let peer: SocketAddr = LOCAL.parse().unwrap();
        handle_request(Request::new(method, params), Some(peer), state)
    }

    fn error_code(response: &Response) -> &str {
        response
            .error
            .as_ref()
            .map(|e| e.code.as_str())
            .unwrap_or("missing")
    }

    fn add(state: &SharedState, name: &str, pw: &str) -> String {
        let response = call(
            state,
            Method::AddAccount,
            Some(json!({ "display_name": name, "password": pw })),
        );
        assert!(response.ok, "add failed: {:?}", response.error);
        response.data_as::<AddAccountData>().unwrap().identity
    }

    fn credentials(id: &str, name: &str, pw: &str) -> Value {
        json!({ "identity": id, "display_name": name, "password": pw })
    }

    #[test]
    fn login_report_query_round_trip() {
        let (_temp, state) = setup();
        let id = add(&state, "alice", "pw1");

        let login = call(&state, Method::Login, Some(credentials(&id, "alice", "pw1")));
        assert!(login.ok);
        assert_eq!(login.data_as::<StatusData>().unwrap(), StatusData::success());

        let report = call(
            &state,
            Method::ReportActivity,
            Some(json!({
                "identity": id,
                "display_name": "alice",
                "password": "pw1",
                "label": "editor"
            })),
        );
        assert!(report.ok);

        let query = call(&state, Method::QueryActivity, Some(json!({ "identity": id })));
        let activity: ActivityData = query.data_as().unwrap();
        assert_eq!(activity.label, "editor");
        assert!(activity.online);
    }

    #[test]
    fn whitespace_password_account_can_log_in_and_report() {
        let (_temp, state) = setup();
        let id = add(&state, "alice", "   ");

        let login = call(&state, Method::Login, Some(credentials(&id, "alice", "   ")));
        assert!(login.ok, "login failed: {:?}", login.error);

        let report = call(
            &state,
            Method::ReportActivity,
            Some(json!({
                "identity": id,
                "display_name": "alice",
                "password": "   ",
                "label": ""
            })),
        );
        assert!(report.ok, "report failed: {:?}", report.error);

        let query = call(&state, Method::QueryActivity, Some(json!({ "identity": id })));
        assert_eq!(query.data_as::<ActivityData>().unwrap().label, "");
    }

    #[test]
    fn unknown_user_and_bad_password_look_identical() {
        let (_temp, state) = setup();
        let id = add(&state, "alice", "pw1");

        let unknown = call(&state, Method::Login, Some(credentials("NOPE", "alice", "pw1")));
        let wrong = call(&state, Method::Login, Some(credentials(&id, "alice", "bad")));

        assert!(!unknown.ok && !wrong.ok);
        assert_eq!(unknown.error, wrong.error);
        assert_eq!(error_code(&unknown), ERROR_AUTH_FAILED);
    }

    #[test]
    fn report_without_login_is_not_logged_in() {
        let (_temp, state) = setup();
        let id = add(&state, "alice", "pw1");

        let report = call(
            &state,
            Method::ReportActivity,
            Some(json!({
                "identity": id,
                "display_name": "alice",
                "password": "pw1",
                "label": "editor"
            })),
        );
        assert_eq!(error_code(&report), ERROR_NOT_LOGGED_IN);
    }

    #[test]
    fn query_unknown_identity_is_not_found() {
        let (_temp, state) = setup();
        let query = call(&state, Method::QueryActivity, Some(json!({ "identity": "NOPE" })));
        assert_eq!(error_code(&query), ERROR_NOT_FOUND);
    }

    #[test]
    fn add_with_empty_name_is_invalid_input() {
        let (_temp, state) = setup();
        let response = call(
            &state,
            Method::AddAccount,
            Some(json!({ "display_name": "", "password": "pw" })),
        );
        assert_eq!(error_code(&response), ERROR_INVALID_INPUT);
    }

    #[test]
    fn delete_and_update_report_found_flag() {
        let (_temp, state) = setup();
        let id = add(&state, "alice", "pw1");

        let update = call(
            &state,
            Method::UpdateAccount,
            Some(json!({ "identity": id, "new_display_name": "alicia", "new_password": "pw2" })),
        );
        assert!(update.data_as::<FoundData>().unwrap().found);

        let delete = call(&state, Method::DeleteAccount, Some(json!({ "identity": id })));
        assert!(delete.data_as::<FoundData>().unwrap().found);

        let again = call(&state, Method::DeleteAccount, Some(json!({ "identity": id })));
        assert!(again.ok);
        assert!(!again.data_as::<FoundData>().unwrap().found);
    }

    #[test]
    fn list_accounts_returns_entries_in_order() {
        let (_temp, state) = setup();
        let alice = add(&state, "alice", "pw1");
        let bob = add(&state, "bob", "pw2");

        let list = call(&state, Method::ListAccounts, None);
        let entries: Vec<AccountEntry> = list.data_as().unwrap();
        assert_eq!(
            entries,
            vec![
                AccountEntry {
                    identity: alice,
                    display_name: "alice".to_string()
                },
                AccountEntry {
                    identity: bob,
                    display_name: "bob".to_string()
                },
            ]
        );
    }

    #[test]
    fn admin_from_remote_peer_is_forbidden() {
        let (_temp, state) = setup();
        let peer: SocketAddr = REMOTE.parse().unwrap();
        let response = handle_request(
            Request::new(
                Method::AddAccount,
                Some(json!({ "display_name": "mallory", "password": "pw" })),
            ),
            Some(peer),
            &state,
        );
        assert_eq!(error_code(&response), ERROR_FORBIDDEN);
        assert!(state.coordinator().list_accounts().unwrap().is_empty());

        let list = handle_request(Request::new(Method::ListAccounts, None), Some(peer), &state);
        assert!(list.ok, "reads stay public");
    }

    #[test]
    fn admin_from_remote_peer_allowed_when_configured() {
        let (_temp, state) = setup_with(false);
        let peer: SocketAddr = REMOTE.parse().unwrap();
        let response = handle_request(
            Request::new(
                Method::AddAccount,
                Some(json!({ "display_name": "alice", "password": "pw" })),
            ),
            Some(peer),
            &state,
        );
        assert!(response.ok);
    }

    #[test]
    fn protocol_mismatch_is_rejected() {
        let (_temp, state) = setup();
        let mut request = Request::new(Method::GetHealth, None);
        request.protocol_version = PROTOCOL_VERSION + 1;
        let response = handle_request(request, None, &state);
        assert_eq!(error_code(&response), "protocol_mismatch");
    }

    #[test]
    fn health_reports_counts() {
        let (_temp, state) = setup();
        add(&state, "alice", "pw1");

        let health = call(&state, Method::GetHealth, None);
        let data = health.data.expect("health data");
        assert_eq!(data["status"], "ok");
        assert_eq!(data["accounts"], 1);
        assert_eq!(data["sessions"], 0);
        assert_eq!(data["security"]["rejected_connections"], 0);
    }
}
