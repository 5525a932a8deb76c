//! Protocol adapters.
//!
//! Adapters are stateless: they turn connection parameters, the payload and
//! the rendered message into [`RequestDescriptor`]s. Sending and response
//! handling live in the delivery task.

pub mod campfire;
pub mod hipchat;
pub mod status;
pub mod webhook;

use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use herald_common::error::AddonError;
use herald_common::types::NotificationPayload;

use crate::Addon;

/// A fully built HTTP request, ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RequestDescriptor {
    pub fn post(url: impl Into<String>) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    /// JSON body with a matching content type. Fields are written in
    /// declaration order.
    pub fn with_json<T: Serialize + ?Sized>(self, body: &T) -> Result<Self, AddonError> {
        let encoded = serde_json::to_string(body)
            .map_err(|e| AddonError::Config(format!("failed to encode request body: {e}")))?;
        let mut request = self.with_header("Content-Type", "application/json");
        request.body = encoded;
        Ok(request)
    }

    /// `application/x-www-form-urlencoded` body from ordered pairs.
    pub fn with_form(self, pairs: &[(&str, &str)]) -> Self {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        let mut request = self.with_header("Content-Type", "application/x-www-form-urlencoded");
        request.body = body;
        request
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Read the addon's `notifications.<key>` node into its configuration struct.
///
/// A missing node or a non-object node (for example a bare list of targets)
/// yields the defaults. An object that does not match the struct fails the
/// target with a configuration error.
pub fn notifier_config<T>(payload: &NotificationPayload, addon: Addon) -> Result<T, AddonError>
where
    T: DeserializeOwned + Default,
{
    match payload.notification_config(addon.config_key()) {
        Some(node @ Value::Object(_)) => serde_json::from_value(node.clone()).map_err(|e| {
            AddonError::Config(format!(
                "invalid notifications.{} configuration: {e}",
                addon.config_key()
            ))
        }),
        _ => Ok(T::default()),
    }
}
