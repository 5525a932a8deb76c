//! Campfire room notifications.

use base64::Engine;
use serde::{Deserialize, Serialize};

use herald_common::error::AddonError;

use crate::adapters::RequestDescriptor;
use crate::target::CampfireParams;
use crate::template::{Message, TemplateSpec};

/// Per-build Campfire settings from `notifications.campfire`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CampfireConfig {
    #[serde(default)]
    pub template: Option<TemplateSpec>,
}

#[derive(Serialize)]
struct SpeakBody<'a> {
    message: SpeakMessage<'a>,
}

#[derive(Serialize)]
struct SpeakMessage<'a> {
    body: &'a str,
}

pub fn speak_url(params: &CampfireParams) -> String {
    format!(
        "https://{}.campfirenow.com/room/{}/speak.json",
        params.subdomain, params.room_id
    )
}

/// Campfire authenticates with the API token as user and a dummy password.
pub fn authorization(params: &CampfireParams) -> String {
    let credentials = format!("{}:X", params.token);
    format!(
        "Basic {}",
        base64::engine::general_purpose::STANDARD.encode(credentials)
    )
}

/// One JSON request per message line.
pub fn requests(
    params: &CampfireParams,
    message: &Message,
) -> Result<Vec<RequestDescriptor>, AddonError> {
    let url = speak_url(params);
    let auth = authorization(params);
    message
        .lines()
        .iter()
        .map(|line| {
            RequestDescriptor::post(url.as_str())
                .with_header("Authorization", auth.as_str())
                .with_json(&SpeakBody {
                    message: SpeakMessage { body: line },
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> CampfireParams {
        CampfireParams {
            subdomain: "acme".to_string(),
            token: "secret".to_string(),
            room_id: "123".to_string(),
        }
    }

    #[test]
    fn test_speak_url() {
        assert_eq!(
            speak_url(&params()),
            "https://acme.campfirenow.com/room/123/speak.json"
        );
    }

    #[test]
    fn test_authorization_uses_token_and_dummy_password() {
        // base64("secret:X")
        assert_eq!(authorization(&params()), "Basic c2VjcmV0Olg=");
    }
}
