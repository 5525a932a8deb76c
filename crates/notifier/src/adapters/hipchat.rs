//! HipChat room notifications, API v1 and v2.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};

use herald_common::error::AddonError;
use herald_common::types::BuildState;

use crate::adapters::RequestDescriptor;
use crate::target::ChatParams;
use crate::template::{Message, TemplateSpec};

/// Bytes escaped in v2 room ids: everything except ASCII alphanumerics and
/// `-_.!*'()`. This is stricter than path encoding and has to match what the
/// HipChat API expects, or the request is answered with a 400.
const ROOM_UNSAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Per-build HipChat settings from `notifications.hipchat`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatConfig {
    /// Custom message template.
    #[serde(default)]
    pub template: Option<TemplateSpec>,
    /// `text` (default) or `html`.
    #[serde(default)]
    pub format: Option<String>,
    /// Whether v2 notifications should ping room members (default: false).
    #[serde(default)]
    pub notify: Option<bool>,
}

impl ChatConfig {
    pub fn message_format(&self) -> &str {
        self.format.as_deref().unwrap_or("text")
    }
}

#[derive(Serialize)]
struct V2Body<'a> {
    message: &'a str,
    color: &'a str,
    message_format: &'a str,
    notify: bool,
}

/// Message color for a build state.
pub fn color(state: BuildState) -> &'static str {
    match state {
        BuildState::Passed => "green",
        BuildState::Failed => "red",
        BuildState::Errored | BuildState::Canceled => "gray",
        _ => "yellow",
    }
}

/// Percent-encode a room id for the v2 URL path.
pub fn encode_room(room_id: &str) -> String {
    utf8_percent_encode(room_id, ROOM_UNSAFE).to_string()
}

pub fn v1_url(params: &ChatParams) -> String {
    format!(
        "https://{}/v1/rooms/message?format=json&auth_token={}",
        params.host, params.token
    )
}

pub fn v2_url(params: &ChatParams) -> String {
    format!(
        "https://{}/v2/room/{}/notification?auth_token={}",
        params.host,
        encode_room(&params.room_id),
        params.token
    )
}

/// One form-encoded v1 request per message line.
pub fn v1_requests(
    params: &ChatParams,
    state: BuildState,
    message: &Message,
    config: &ChatConfig,
    product_name: &str,
) -> Vec<RequestDescriptor> {
    let url = v1_url(params);
    message
        .lines()
        .iter()
        .map(|line| {
            RequestDescriptor::post(url.as_str()).with_form(&[
                ("room_id", params.room_id.as_str()),
                ("message", line.as_str()),
                ("color", color(state)),
                ("from", product_name),
                ("message_format", config.message_format()),
            ])
        })
        .collect()
}

/// One JSON v2 request per message line.
pub fn v2_requests(
    params: &ChatParams,
    state: BuildState,
    message: &Message,
    config: &ChatConfig,
) -> Result<Vec<RequestDescriptor>, AddonError> {
    let url = v2_url(params);
    message
        .lines()
        .iter()
        .map(|line| {
            RequestDescriptor::post(url.as_str()).with_json(&V2Body {
                message: line,
                color: color(state),
                message_format: config.message_format(),
                notify: config.notify.unwrap_or(false),
            })
        })
        .collect()
}
