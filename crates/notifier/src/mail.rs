//! Email collaborator seam.
//!
//! Rendering and sending mail is done elsewhere; the dispatcher only builds the
//! envelope and hands it to a [`Mailer`].

use async_trait::async_trait;

use herald_common::config::AppConfig;
use herald_common::error::AddonError;
use herald_common::types::NotificationPayload;

use crate::template::BuildResult;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn deliver(&self, envelope: &MailEnvelope) -> Result<(), AddonError>;
}

/// Addressing and subject for a build email. The payload is passed through for
/// the body template.
#[derive(Debug, Clone)]
pub struct MailEnvelope {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub payload: NotificationPayload,
}

impl MailEnvelope {
    pub fn new(config: &AppConfig, payload: &NotificationPayload, to: Vec<String>) -> Self {
        Self {
            from: from_address(config),
            to,
            subject: subject(payload),
            payload: payload.clone(),
        }
    }
}

/// `[Passed] owner/repo#12 (main - abcdef1)`
pub fn subject(payload: &NotificationPayload) -> String {
    format!(
        "[{}] {}#{} ({} - {})",
        BuildResult::of(&payload.build).short(),
        payload.repository.slug,
        payload.build.number,
        payload.commit.branch,
        payload.short_sha()
    )
}

pub fn from_address(config: &AppConfig) -> String {
    let email = config
        .email_from
        .clone()
        .unwrap_or_else(|| format!("notifications@{}", config.host()));
    format!("\"{}\" <{}>", config.product_name, email)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> NotificationPayload {
        serde_json::from_value(serde_json::json!({
            "repository": { "id": 1, "slug": "acme/widget", "owner_name": "acme", "name": "widget" },
            "build": { "id": 3, "number": "12", "state": "failed", "previous_state": "passed" },
            "commit": { "sha": "abcdef1234", "branch": "main" }
        }))
        .unwrap()
    }

    #[test]
    fn test_subject() {
        assert_eq!(subject(&payload()), "[Broken] acme/widget#12 (main - abcdef1)");
    }

    #[test]
    fn test_from_address_fallback() {
        assert_eq!(
            from_address(&AppConfig::default()),
            "\"Travis CI\" <notifications@travis-ci.org>"
        );

        let config = AppConfig {
            email_from: Some("builds@example.com".to_string()),
            ..Default::default()
        };
        assert_eq!(from_address(&config), "\"Travis CI\" <builds@example.com>");
    }

    #[test]
    fn test_envelope() {
        let envelope = MailEnvelope::new(
            &AppConfig::default(),
            &payload(),
            vec!["jane@example.com".to_string()],
        );
        assert_eq!(envelope.to, ["jane@example.com"]);
        assert!(envelope.subject.starts_with("[Broken]"));
    }
}
