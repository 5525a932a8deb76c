//! GitHub commit statuses.
//!
//! Two credentials can update a status: an app installation token, tried first
//! when the repository has an installation, and per-user OAuth tokens tried in
//! order until one succeeds. A small set of 4xx answers is expected (revoked
//! tokens, missing repos, too many statuses) and only moves on to the next
//! candidate; anything else is surfaced.

use async_trait::async_trait;
use serde::Serialize;

use herald_common::config::AppConfig;
use herald_common::error::AddonError;
use herald_common::types::{BuildState, NotificationPayload};

use crate::adapters::RequestDescriptor;
use crate::target::StatusParams;

const USER_TOKEN_ACCEPT: &str = "application/vnd.github.v3+json";
const APP_ACCEPT: &str = "application/vnd.github.antiope-preview+json";

/// Provides installation tokens for app-based status updates.
#[async_trait]
pub trait AppCredentials: Send + Sync {
    async fn installation_token(&self, installation_id: u64) -> Result<String, AddonError>;
}

/// Which credential a status request was sent with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusPath {
    GithubApps,
    UserToken,
}

impl StatusPath {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusPath::GithubApps => "github_apps",
            StatusPath::UserToken => "user_token",
        }
    }
}

/// How a status API response is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    /// Known rejection: logged with the reason, next candidate is tried.
    Expected(&'static str),
    /// Anything else: the status target fails and the error is surfaced.
    Unexpected,
}

pub fn classify(status: u16) -> StatusClass {
    match status {
        200..=299 => StatusClass::Success,
        401 => StatusClass::Expected("incorrect_auth"),
        403 => StatusClass::Expected("incorrect_auth_or_suspended_acct_or_rate_limited"),
        404 => StatusClass::Expected("repo_not_found_or_incorrect_auth"),
        422 => StatusClass::Expected("maximum_number_of_statuses"),
        _ => StatusClass::Unexpected,
    }
}

/// Commit status state for a build state.
pub fn state(build_state: BuildState) -> &'static str {
    match build_state {
        BuildState::Created | BuildState::Queued | BuildState::Received | BuildState::Started => {
            "pending"
        }
        BuildState::Passed => "success",
        BuildState::Failed => "failure",
        BuildState::Errored | BuildState::Canceled => "error",
    }
}

pub fn description(status_state: &str, product_name: &str) -> String {
    match status_state {
        "pending" => format!("The {product_name} build is in progress"),
        "success" => format!("The {product_name} build passed"),
        "failure" => format!("The {product_name} build failed"),
        _ => format!("The {product_name} build could not complete due to an error"),
    }
}

pub fn context(payload: &NotificationPayload) -> String {
    let build_type = if payload.is_pull_request() { "pr" } else { "push" };
    format!("continuous-integration/travis-ci/{build_type}")
}

pub fn target_url(config: &AppConfig, payload: &NotificationPayload) -> String {
    format!(
        "{}/{}/builds/{}?utm_source=github_status&utm_medium=notification",
        config.http_host.trim_end_matches('/'),
        payload.repository.slug,
        payload.build.id
    )
}

pub fn url(config: &AppConfig, params: &StatusParams) -> String {
    format!(
        "{}/repos/{}/statuses/{}",
        config.github_api_url.trim_end_matches('/'),
        params.slug,
        params.commit_ref
    )
}

#[derive(Debug, Serialize)]
pub struct StatusBody {
    pub state: &'static str,
    pub description: String,
    pub target_url: String,
    pub context: String,
}

pub fn body(config: &AppConfig, payload: &NotificationPayload) -> StatusBody {
    let state = state(payload.build.state);
    StatusBody {
        state,
        description: description(state, &config.product_name),
        target_url: target_url(config, payload),
        context: context(payload),
    }
}

/// Request authenticated with a per-user token or an installation token.
pub fn request(
    config: &AppConfig,
    params: &StatusParams,
    payload: &NotificationPayload,
    path: StatusPath,
    token: &str,
) -> Result<RequestDescriptor, AddonError> {
    let accept = match path {
        StatusPath::GithubApps => APP_ACCEPT,
        StatusPath::UserToken => USER_TOKEN_ACCEPT,
    };
    RequestDescriptor::post(url(config, params))
        .with_header("Authorization", format!("token {token}"))
        .with_header("Accept", accept)
        .with_json(&body(config, payload))
}
