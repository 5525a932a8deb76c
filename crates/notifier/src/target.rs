//! Destination parsing.
//!
//! Every target specifier is resolved once into a [`TargetKind`]; adapters are
//! then selected by matching on the kind. Malformed specifiers come back as a
//! [`TargetError`] value and never panic.

use percent_encoding::percent_decode_str;
use thiserror::Error;
use url::Url;

use herald_common::config::AppConfig;
use herald_common::error::AddonError;
use herald_common::types::{DeliveryParams, NotificationPayload};

use crate::Addon;
use crate::transport::redact_query;

/// HipChat v1 tokens are 30 characters long.
pub const API_V1_TOKEN_LENGTH: usize = 30;
/// HipChat v2 tokens are 40 characters long.
pub const API_V2_TOKEN_LENGTH: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TargetError {
    #[error("malformed {addon} target: {reason}")]
    Malformed { addon: &'static str, reason: String },

    #[error("unsupported token length {0}, expected 30 (v1) or 40 (v2)")]
    TokenLength(usize),

    #[error("invalid webhook url: {0}")]
    InvalidUrl(String),
}

impl From<TargetError> for AddonError {
    fn from(err: TargetError) -> Self {
        AddonError::Parse(err.to_string())
    }
}

fn malformed(addon: Addon, reason: impl Into<String>) -> TargetError {
    TargetError::Malformed {
        addon: addon.name(),
        reason: reason.into(),
    }
}

/// Chat room connection parameters shared by both HipChat protocol versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatParams {
    pub token: String,
    pub room_id: String,
    pub host: String,
    /// Whether `host` is the public API host, which is never contacted.
    pub default_host: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampfireParams {
    pub subdomain: String,
    pub token: String,
    pub room_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookParams {
    /// Target URL with any embedded credentials removed.
    pub url: String,
    /// Percent-decoded `user:password` taken from the URL.
    pub credentials: Option<(String, String)>,
}

/// Commit status destination, derived from the payload rather than a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusParams {
    pub repository_id: u64,
    pub github_id: Option<u64>,
    pub slug: String,
    pub vcs_type: String,
    pub commit_ref: String,
    pub installation_id: Option<u64>,
}

/// A destination resolved to its protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetKind {
    ChatV1(ChatParams),
    ChatV2(ChatParams),
    Campfire(CampfireParams),
    Webhook(WebhookParams),
    StatusApi(StatusParams),
    Email(String),
}

impl TargetKind {
    pub fn label(&self) -> &'static str {
        match self {
            TargetKind::ChatV1(_) => "chat_v1",
            TargetKind::ChatV2(_) => "chat_v2",
            TargetKind::Campfire(_) => "campfire",
            TargetKind::Webhook(_) => "webhook",
            TargetKind::StatusApi(_) => "status_api",
            TargetKind::Email(_) => "email",
        }
    }
}

/// A parsed destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Log-safe rendering of the specifier, without tokens or passwords.
    pub display: String,
    pub kind: TargetKind,
}

impl Target {
    /// Parse a specifier string for the given addon.
    pub fn parse(addon: Addon, spec: &str, config: &AppConfig) -> Result<Self, TargetError> {
        let spec = spec.trim();
        match addon {
            Addon::Hipchat => parse_chat(spec, &config.hipchat_default_host),
            Addon::Campfire => parse_campfire(spec),
            Addon::Webhook => parse_webhook(spec),
            Addon::Email => parse_email(spec),
            Addon::GithubStatus => Err(malformed(
                addon,
                "status targets are derived from the payload",
            )),
        }
    }

    /// The commit status destination for a payload.
    pub fn status(payload: &NotificationPayload, params: &DeliveryParams) -> Self {
        let status = StatusParams {
            repository_id: payload.repository.id,
            github_id: payload.repository.github_id,
            slug: payload.repository.slug.clone(),
            vcs_type: payload.repository.vcs_type.clone(),
            commit_ref: payload.status_sha().to_string(),
            installation_id: params.installation,
        };
        Self {
            display: format!("{}@{}", status.slug, status.commit_ref),
            kind: TargetKind::StatusApi(status),
        }
    }
}

/// Accepts `TOKEN@ROOM`, `TOKEN@ROOM#HOSTNAME` and `TOKEN@HOST/ROOM`.
fn parse_chat(spec: &str, default_host: &str) -> Result<Target, TargetError> {
    let addon = Addon::Hipchat;
    let (token, rest) = spec
        .split_once('@')
        .ok_or_else(|| malformed(addon, "expected TOKEN@ROOM"))?;
    if token.is_empty() {
        return Err(malformed(addon, "empty token"));
    }

    let (room_id, host) = if let Some((room, host)) = rest.split_once('#') {
        (room, host)
    } else if let Some((host, room)) = rest.split_once('/') {
        (room, host)
    } else {
        (rest, default_host)
    };

    if room_id.is_empty() {
        return Err(malformed(addon, "empty room"));
    }
    if host.is_empty() {
        return Err(malformed(addon, "empty host"));
    }

    let params = ChatParams {
        token: token.to_string(),
        room_id: room_id.to_string(),
        host: host.to_string(),
        default_host: host.eq_ignore_ascii_case(default_host),
    };
    let display = format!("{}@{}", params.room_id, params.host);

    let kind = match token.len() {
        API_V1_TOKEN_LENGTH => TargetKind::ChatV1(params),
        API_V2_TOKEN_LENGTH => TargetKind::ChatV2(params),
        other => return Err(TargetError::TokenLength(other)),
    };

    Ok(Target { display, kind })
}

/// Accepts `SUBDOMAIN:TOKEN@ROOM_ID`.
fn parse_campfire(spec: &str) -> Result<Target, TargetError> {
    let addon = Addon::Campfire;
    let (credentials, room_id) = spec
        .rsplit_once('@')
        .ok_or_else(|| malformed(addon, "expected SUBDOMAIN:TOKEN@ROOM_ID"))?;
    let (subdomain, token) = credentials
        .split_once(':')
        .ok_or_else(|| malformed(addon, "expected SUBDOMAIN:TOKEN"))?;

    let is_word = |s: &str| {
        !s.is_empty()
            && s
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    };
    if !is_word(subdomain) || !is_word(token) {
        return Err(malformed(addon, "subdomain and token must be word characters"));
    }
    if room_id.is_empty() || !room_id.chars().all(|c| c.is_ascii_digit()) {
        return Err(malformed(addon, "room id must be numeric"));
    }

    Ok(Target {
        display: format!("{subdomain}@{room_id}"),
        kind: TargetKind::Campfire(CampfireParams {
            subdomain: subdomain.to_string(),
            token: token.to_string(),
            room_id: room_id.to_string(),
        }),
    })
}

fn parse_webhook(spec: &str) -> Result<Target, TargetError> {
    let mut url = Url::parse(spec).map_err(|e| TargetError::InvalidUrl(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(TargetError::InvalidUrl(format!(
            "unsupported scheme '{}'",
            url.scheme()
        )));
    }

    let credentials = match (url.username(), url.password()) {
        (user, Some(password)) if !user.is_empty() => Some((
            percent_decode_str(user).decode_utf8_lossy().into_owned(),
            percent_decode_str(password).decode_utf8_lossy().into_owned(),
        )),
        _ => None,
    };

    // Credentials never travel in the request line.
    let _ = url.set_username("");
    let _ = url.set_password(None);

    // Query strings often carry receiver secrets.
    Ok(Target {
        display: redact_query(url.as_str()).to_string(),
        kind: TargetKind::Webhook(WebhookParams {
            url: url.to_string(),
            credentials,
        }),
    })
}

fn parse_email(spec: &str) -> Result<Target, TargetError> {
    match spec.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(Target {
            display: spec.to_string(),
            kind: TargetKind::Email(spec.to_string()),
        }),
        _ => Err(malformed(Addon::Email, "expected an email address")),
    }
}
