//! Generic webhook notifications.

use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use herald_common::error::AddonError;
use herald_common::types::{NotificationPayload, Repository};

use crate::adapters::RequestDescriptor;
use crate::target::WebhookParams;

/// How the payload is encoded in the request body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookFormat {
    /// `{"payload": {...}}` as `application/json`.
    #[default]
    Json,
    /// `payload=<json>` as `application/x-www-form-urlencoded`, for legacy receivers.
    Form,
}

/// Per-build webhook settings from `notifications.webhooks`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookConfig {
    #[serde(default)]
    pub format: WebhookFormat,
}

#[derive(Serialize)]
struct WebhookBody<'a> {
    payload: &'a NotificationPayload,
}

/// `Authorization` header value for a webhook target.
///
/// Credentials embedded in the URL win. Otherwise the receiver gets
/// `hex(sha256("owner/name" + token))`, which it can recompute to verify the
/// sender.
pub fn authorization(params: &WebhookParams, repository: &Repository, token: Option<&str>) -> String {
    match &params.credentials {
        Some((user, password)) => format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(format!("{user}:{password}"))
        ),
        None => {
            let mut hasher = Sha256::new();
            hasher.update(format!("{}/{}", repository.owner_name, repository.name));
            hasher.update(token.unwrap_or_default());
            hex::encode(hasher.finalize())
        }
    }
}

pub fn request(
    params: &WebhookParams,
    payload: &NotificationPayload,
    token: Option<&str>,
    config: &WebhookConfig,
) -> Result<RequestDescriptor, AddonError> {
    let public = payload.without_internal_params();
    let request = RequestDescriptor::post(params.url.as_str()).with_header(
        "Authorization",
        authorization(params, &payload.repository, token),
    );

    match config.format {
        WebhookFormat::Json => request.with_json(&WebhookBody { payload: &public }),
        WebhookFormat::Form => {
            let json = serde_json::to_string(&public)
                .map_err(|e| AddonError::Config(format!("failed to encode payload: {e}")))?;
            Ok(request.with_form(&[("payload", json.as_str())]))
        }
    }
}
