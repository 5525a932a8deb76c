//! Template interpolation for chat messages.
//!
//! Templates are lists of lines containing `%{name}` placeholders. Every name
//! must resolve against the payload; an unknown placeholder fails the render
//! instead of leaking the literal text into a room.

use std::collections::BTreeMap;

use serde::Deserialize;
use thiserror::Error;

use herald_common::config::AppConfig;
use herald_common::error::AddonError;
use herald_common::types::{Build, BuildState, NotificationPayload};

use crate::Addon;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unknown placeholder %{{{0}}}")]
    UnknownPlaceholder(String),

    #[error("unterminated placeholder at byte {0}")]
    Unterminated(usize),
}

impl From<TemplateError> for AddonError {
    fn from(err: TemplateError) -> Self {
        AddonError::Template(err.to_string())
    }
}

/// Outcome of a build as phrased in messages, taking the previous build into
/// account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildResult {
    Pending,
    Passed,
    Fixed,
    Broken,
    Failed,
    StillFailing,
    Errored,
    Canceled,
}

impl BuildResult {
    pub fn of(build: &Build) -> Self {
        match (build.state, build.previous_state) {
            (BuildState::Passed, Some(BuildState::Failed | BuildState::Errored)) => Self::Fixed,
            (BuildState::Passed, _) => Self::Passed,
            (BuildState::Failed, Some(BuildState::Passed)) => Self::Broken,
            (BuildState::Failed, Some(BuildState::Failed)) => Self::StillFailing,
            (BuildState::Failed, _) => Self::Failed,
            (BuildState::Errored, _) => Self::Errored,
            (BuildState::Canceled, _) => Self::Canceled,
            _ => Self::Pending,
        }
    }

    /// Sentence used in `%{message}`.
    pub fn sentence(self) -> &'static str {
        match self {
            Self::Pending => "The build is pending.",
            Self::Passed => "The build passed.",
            Self::Fixed => "The build was fixed.",
            Self::Broken => "The build was broken.",
            Self::Failed => "The build failed.",
            Self::StillFailing => "The build is still failing.",
            Self::Errored => "The build has errored.",
            Self::Canceled => "The build was canceled.",
        }
    }

    /// Title-case label used in email subjects.
    pub fn short(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Passed => "Passed",
            Self::Fixed => "Fixed",
            Self::Broken => "Broken",
            Self::Failed => "Failed",
            Self::StillFailing => "Still Failing",
            Self::Errored => "Errored",
            Self::Canceled => "Canceled",
        }
    }
}

/// Template as written in the build configuration: a single line or a list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TemplateSpec {
    Line(String),
    Lines(Vec<String>),
}

/// An ordered list of template lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    lines: Vec<String>,
}

impl Template {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    pub fn chat_default() -> Self {
        Self::new([
            "%{repository}#%{build_number} (%{branch} - %{commit} : %{author}): the build has %{result}",
            "Change view: %{compare_url}",
            "Build details: %{build_url}",
        ])
    }

    pub fn campfire_default() -> Self {
        Self::new(
            Self::chat_default()
                .lines
                .iter()
                .map(|line| format!("[travis-ci] {line}")),
        )
    }

    /// The configured template, or `default` when none is configured.
    pub fn from_spec(spec: Option<&TemplateSpec>, default: Self) -> Self {
        match spec {
            Some(TemplateSpec::Line(line)) => Self::new([line.as_str()]),
            Some(TemplateSpec::Lines(lines)) if !lines.is_empty() => Self::new(lines.iter().cloned()),
            _ => default,
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

/// Rendered message lines, one request per line. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    lines: Vec<String>,
}

impl Message {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Resolves placeholders against the fields of one payload.
#[derive(Debug, Clone)]
pub struct Interpolator {
    fields: BTreeMap<&'static str, String>,
}

impl Interpolator {
    pub fn new(payload: &NotificationPayload, config: &AppConfig, addon: Addon) -> Self {
        let result = BuildResult::of(&payload.build);
        let build_url = format!(
            "{}/{}/builds/{}?utm_source={}&utm_medium=notification",
            config.http_host.trim_end_matches('/'),
            payload.repository.slug,
            payload.build.id,
            addon.name()
        );

        let mut fields = BTreeMap::new();
        fields.insert("repository", payload.repository.slug.clone());
        fields.insert("repository_slug", payload.repository.slug.clone());
        fields.insert("repository_name", payload.repository.name.clone());
        fields.insert("build_number", payload.build.number.clone());
        fields.insert("build_id", payload.build.id.to_string());
        fields.insert("branch", payload.commit.branch.clone());
        fields.insert("commit", payload.short_sha().to_string());
        fields.insert("commit_message", payload.commit.message.clone());
        fields.insert("author", payload.commit.author_name.clone());
        // `result` is the raw state; the previous build only shapes `message`.
        fields.insert("result", payload.build.state.to_string());
        fields.insert("message", result.sentence().to_string());
        fields.insert("compare_url", payload.commit.compare_url.clone());
        fields.insert("build_url", build_url);
        fields.insert("pull_request", payload.is_pull_request().to_string());

        Self { fields }
    }

    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Substitute every placeholder in a single line.
    pub fn render(&self, line: &str) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(line.len());
        let mut rest = line;
        let mut offset = 0;

        while let Some(start) = rest.find("%{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                return Err(TemplateError::Unterminated(offset + start));
            };

            let name = &after[..end];
            let value = self
                .lookup(name)
                .ok_or_else(|| TemplateError::UnknownPlaceholder(name.to_string()))?;
            out.push_str(value);

            let consumed = start + 2 + end + 1;
            offset += consumed;
            rest = &rest[consumed..];
        }

        out.push_str(rest);
        Ok(out)
    }

    /// Lazily render a template line by line. The iterator can be cloned to
    /// start over and yields exactly one item per template line.
    pub fn render_lines<'a>(&'a self, template: &'a Template) -> RenderedLines<'a> {
        RenderedLines {
            interpolator: self,
            lines: template.lines.iter(),
        }
    }

    /// Render every line, failing on the first bad placeholder.
    pub fn render_message(&self, template: &Template) -> Result<Message, TemplateError> {
        let lines = self.render_lines(template).collect::<Result<Vec<_>, _>>()?;
        Ok(Message { lines })
    }
}

/// Iterator returned by [`Interpolator::render_lines`].
#[derive(Debug, Clone)]
pub struct RenderedLines<'a> {
    interpolator: &'a Interpolator,
    lines: std::slice::Iter<'a, String>,
}

impl Iterator for RenderedLines<'_> {
    type Item = Result<String, TemplateError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.lines.next().map(|line| self.interpolator.render(line))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.lines.size_hint()
    }
}

impl ExactSizeIterator for RenderedLines<'_> {}
