//! Build notification addons.
//!
//! A scheduler hands the [`task::Dispatcher`] a [`task::Job`]: a build payload,
//! the addon to run and the destination targets. The dispatcher parses the
//! targets, renders the message, builds protocol-specific requests through the
//! [`adapters`], sends them over the shared [`transport::HttpTransport`] and
//! records one [`outcome::DeliveryOutcome`] per target.

pub mod adapters;
pub mod mail;
pub mod outcome;
pub mod target;
pub mod task;
pub mod template;
pub mod transport;

use serde::Deserialize;

/// Notification addons supported by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Addon {
    Hipchat,
    Campfire,
    Webhook,
    GithubStatus,
    Email,
}

impl Addon {
    /// Tag used in log lines and `utm_source` parameters.
    pub fn name(self) -> &'static str {
        match self {
            Addon::Hipchat => "hipchat",
            Addon::Campfire => "campfire",
            Addon::Webhook => "webhook",
            Addon::GithubStatus => "github_status",
            Addon::Email => "email",
        }
    }

    /// Key of this addon's node under `notifications` in the build config.
    pub fn config_key(self) -> &'static str {
        match self {
            Addon::Hipchat => "hipchat",
            Addon::Campfire => "campfire",
            Addon::Webhook => "webhooks",
            Addon::GithubStatus => "github_status",
            Addon::Email => "email",
        }
    }
}

impl std::fmt::Display for Addon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
