use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lifecycle states a build moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildState {
    Created,
    Queued,
    Received,
    Started,
    Passed,
    Failed,
    Errored,
    Canceled,
}

impl std::fmt::Display for BuildState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildState::Created => write!(f, "created"),
            BuildState::Queued => write!(f, "queued"),
            BuildState::Received => write!(f, "received"),
            BuildState::Started => write!(f, "started"),
            BuildState::Passed => write!(f, "passed"),
            BuildState::Failed => write!(f, "failed"),
            BuildState::Errored => write!(f, "errored"),
            BuildState::Canceled => write!(f, "canceled"),
        }
    }
}

fn default_vcs_type() -> String {
    "GithubRepository".to_string()
}

/// Repository the build belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub id: u64,
    /// `owner/name`
    pub slug: String,
    pub owner_name: String,
    pub name: String,
    #[serde(default)]
    pub github_id: Option<u64>,
    #[serde(default = "default_vcs_type")]
    pub vcs_type: String,
}

/// The build that changed state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Build {
    pub id: u64,
    pub number: String,
    pub state: BuildState,
    /// State of the previous build on the same branch, used for result messages
    /// such as "fixed" or "broken".
    #[serde(default)]
    pub previous_state: Option<BuildState>,
    #[serde(default)]
    pub pull_request: bool,
    /// The build's `.travis.yml` configuration.
    #[serde(default)]
    pub config: Value,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

/// The commit being built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub sha: String,
    pub branch: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub author_name: String,
    #[serde(default)]
    pub compare_url: String,
}

/// The request that triggered the build. Only meaningful for pull requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub head_commit: Option<String>,
}

/// Normalized build data handed to every addon. Built once per delivery task
/// and never mutated.
///
/// Unknown top-level fields are kept in `extra` so that webhooks receive the
/// payload as it was produced upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub repository: Repository,
    pub build: Build,
    pub commit: Commit,
    #[serde(default)]
    pub request: Request,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Top-level payload key holding scheduler-internal parameters. Never sent to
/// third parties.
pub const INTERNAL_PARAMS_KEY: &str = "params";

impl NotificationPayload {
    /// First seven characters of the commit sha.
    pub fn short_sha(&self) -> &str {
        let sha = self.commit.sha.as_str();
        match sha.char_indices().nth(7) {
            Some((idx, _)) => &sha[..idx],
            None => sha,
        }
    }

    pub fn is_pull_request(&self) -> bool {
        self.build.pull_request
    }

    /// Sha a commit status should be attached to: the head commit for pull
    /// requests, the built commit otherwise.
    pub fn status_sha(&self) -> &str {
        if self.is_pull_request()
            && let Some(head) = self.request.head_commit.as_deref()
        {
            return head;
        }
        &self.commit.sha
    }

    /// The `notifications.<addon>` node of the build configuration, if any.
    pub fn notification_config(&self, addon: &str) -> Option<&Value> {
        self.build.config.get("notifications")?.get(addon)
    }

    /// Copy of the payload with scheduler-internal parameters removed, safe to
    /// hand to third parties.
    pub fn without_internal_params(&self) -> Self {
        let mut public = self.clone();
        public.extra.remove(INTERNAL_PARAMS_KEY);
        public
    }
}

/// A per-user credential for the status API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserToken {
    pub username: String,
    pub token: String,
}

/// Extra parameters supplied by the scheduler alongside the payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryParams {
    /// Legacy single token. Used for webhook authorization and as the sole
    /// status token when `tokens` is empty.
    #[serde(default)]
    pub token: Option<String>,
    /// Candidate status tokens, tried in order.
    #[serde(default)]
    pub tokens: Vec<UserToken>,
    /// App installation id, enabling the installation-token status path.
    #[serde(default)]
    pub installation: Option<u64>,
}

/// Username recorded for a token passed in the legacy single-token form.
pub const LEGACY_TOKEN_USERNAME: &str = "<legacy format>";

impl DeliveryParams {
    /// Status API candidates in the order they should be tried.
    pub fn candidate_tokens(&self) -> Vec<UserToken> {
        if !self.tokens.is_empty() {
            return self.tokens.clone();
        }
        self.token
            .iter()
            .map(|token| UserToken {
                username: LEGACY_TOKEN_USERNAME.to_string(),
                token: token.clone(),
            })
            .collect()
    }
}
