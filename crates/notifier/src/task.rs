//! Delivery task: resolves the targets of a job, builds and sends the requests
//! and records one outcome per target.
//!
//! A task moves through `Pending → Dispatching → Delivering → Completed`.
//! Failures stay scoped to their target: a malformed specifier, a rejected
//! token or a connection reset is logged and recorded while the remaining
//! targets are still delivered. Retrying is left to the scheduler, which sees
//! unexpected responses through [`TaskReport::into_result`].

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Deserialize;
use uuid::Uuid;

use herald_common::config::AppConfig;
use herald_common::error::AddonError;
use herald_common::types::{DeliveryParams, NotificationPayload};

use crate::Addon;
use crate::adapters::campfire::{self, CampfireConfig};
use crate::adapters::hipchat::{self, ChatConfig};
use crate::adapters::status::{self, AppCredentials, StatusClass, StatusPath};
use crate::adapters::webhook::{self, WebhookConfig};
use crate::adapters::{RequestDescriptor, notifier_config};
use crate::mail::{MailEnvelope, Mailer};
use crate::outcome::{DeliveryOutcome, TargetOutcome, TaskReport};
use crate::target::{ChatParams, StatusParams, Target, TargetError, TargetKind};
use crate::template::{Interpolator, Message, Template, TemplateSpec};
use crate::transport::{HttpTransport, ReqwestTransport, TransportError, redact_query};

/// One unit of work handed over by the scheduler.
#[derive(Debug, Clone, Deserialize)]
pub struct Job {
    pub addon: Addon,
    pub payload: NotificationPayload,
    /// Target specifiers. Ignored for commit statuses, whose target is the
    /// payload's commit.
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default)]
    pub params: DeliveryParams,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Dispatching,
    Delivering,
    Completed,
}

/// Shared entry point for running delivery tasks.
///
/// Holds the only resources shared between tasks: the configuration, the
/// pooled HTTP transport and the optional app-credential and mail
/// collaborators.
#[derive(Clone)]
pub struct Dispatcher {
    config: AppConfig,
    transport: Arc<dyn HttpTransport>,
    app_credentials: Option<Arc<dyn AppCredentials>>,
    mailer: Option<Arc<dyn Mailer>>,
}

impl Dispatcher {
    pub fn new(config: AppConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            config,
            transport,
            app_credentials: None,
            mailer: None,
        }
    }

    /// Dispatcher over a reqwest client configured from `config`.
    pub fn from_config(config: AppConfig) -> Result<Self, TransportError> {
        let transport = ReqwestTransport::from_config(&config)?;
        Ok(Self::new(config, Arc::new(transport)))
    }

    pub fn with_app_credentials(mut self, credentials: Arc<dyn AppCredentials>) -> Self {
        self.app_credentials = Some(credentials);
        self
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Run a job to completion.
    pub async fn dispatch(&self, job: Job) -> TaskReport {
        DeliveryTask::new(self, job).run().await
    }
}

/// A target specifier after the dispatching step.
struct Resolved {
    display: String,
    target: Result<Target, TargetError>,
}

/// Result of one commit status attempt that did not fail the target.
enum StatusAttempt {
    Delivered,
    Rejected { status: u16, reason: &'static str },
}

pub struct DeliveryTask<'a> {
    id: Uuid,
    dispatcher: &'a Dispatcher,
    job: Job,
    state: TaskState,
}

impl<'a> DeliveryTask<'a> {
    pub fn new(dispatcher: &'a Dispatcher, job: Job) -> Self {
        Self {
            id: Uuid::new_v4(),
            dispatcher,
            job,
            state: TaskState::Pending,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    fn transition(&mut self, next: TaskState) {
        tracing::debug!(
            task_id = %self.id,
            from = ?self.state,
            to = ?next,
            "Delivery task state changed"
        );
        self.state = next;
    }

    pub async fn run(mut self) -> TaskReport {
        self.transition(TaskState::Dispatching);
        let resolved = self.resolve();

        self.transition(TaskState::Delivering);
        let outcomes = self.deliver_all(resolved).await;

        self.transition(TaskState::Completed);
        let report = TaskReport {
            task_id: self.id,
            addon: self.job.addon,
            outcomes,
        };

        tracing::info!(
            "type" = self.job.addon.name(),
            build = self.job.payload.build.id,
            repo = %self.job.payload.repository.slug,
            task_id = %self.id,
            targets = report.outcomes.len(),
            delivered = report.count("delivered"),
            success = report.is_success(),
            "Delivery task completed"
        );

        report
    }

    /// Parse every target up front. Malformed ones never reach the network.
    fn resolve(&self) -> Vec<Resolved> {
        let job = &self.job;
        // Commit statuses have a single target derived from the payload
        if job.addon == Addon::GithubStatus {
            let target = Target::status(&job.payload, &job.params);
            return vec![Resolved {
                display: target.display.clone(),
                target: Ok(target),
            }];
        }

        job.targets
            .iter()
            .map(
                |spec| match Target::parse(job.addon, spec, &self.dispatcher.config) {
                    Ok(target) => Resolved {
                        display: target.display.clone(),
                        target: Ok(target),
                    },
                    Err(err) => Resolved {
                        display: redact_spec(spec),
                        target: Err(err),
                    },
                },
            )
            .collect()
    }

    /// Deliver all targets, at most `max_concurrency` at a time. Outcomes are
    /// logged and returned in target order.
    async fn deliver_all(&self, resolved: Vec<Resolved>) -> Vec<TargetOutcome> {
        let concurrency = self.dispatcher.config.max_concurrency.max(1);
        let mut outcomes = Vec::with_capacity(resolved.len());

        let mut deliveries = std::pin::pin!(
            stream::iter(resolved)
                .map(|resolved| self.deliver_one(resolved))
                .buffered(concurrency)
        );

        // `buffered` yields in input order, so logs follow target order too
        while let Some(outcome) = deliveries.next().await {
            self.log_outcome(&outcome);
            outcomes.push(outcome);
        }

        outcomes
    }

    async fn deliver_one(&self, resolved: Resolved) -> TargetOutcome {
        let outcome = match resolved.target {
            Err(err) => AddonError::from(err).into(),
            Ok(target) => match self.deliver(&target).await {
                Ok(outcome) => outcome,
                Err(err) => err.into(),
            },
        };

        TargetOutcome {
            target: resolved.display,
            outcome,
        }
    }

    async fn deliver(&self, target: &Target) -> Result<DeliveryOutcome, AddonError> {
        let payload = &self.job.payload;
        let config = &self.dispatcher.config;

        match &target.kind {
            // Rooms on the public host are never contacted
            TargetKind::ChatV1(params) | TargetKind::ChatV2(params) if params.default_host => {
                Ok(skip_default_host(params))
            }
            TargetKind::ChatV1(params) => {
                let chat: ChatConfig = notifier_config(payload, self.job.addon)?;
                let message = self.render(chat.template.as_ref(), Template::chat_default())?;
                let requests = hipchat::v1_requests(
                    params,
                    payload.build.state,
                    &message,
                    &chat,
                    &config.product_name,
                );
                self.send_all(&requests).await
            }
            TargetKind::ChatV2(params) => {
                let chat: ChatConfig = notifier_config(payload, self.job.addon)?;
                let message = self.render(chat.template.as_ref(), Template::chat_default())?;
                let requests = hipchat::v2_requests(params, payload.build.state, &message, &chat)?;
                self.send_all(&requests).await
            }
            TargetKind::Campfire(params) => {
                let campfire: CampfireConfig = notifier_config(payload, self.job.addon)?;
                let message =
                    self.render(campfire.template.as_ref(), Template::campfire_default())?;
                let requests = campfire::requests(params, &message)?;
                self.send_all(&requests).await
            }
            TargetKind::Webhook(params) => {
                let hook: WebhookConfig = notifier_config(payload, self.job.addon)?;
                let request =
                    webhook::request(params, payload, self.job.params.token.as_deref(), &hook)?;
                self.send_webhook(&request).await
            }
            TargetKind::StatusApi(params) => self.deliver_status(params).await,
            TargetKind::Email(recipient) => {
                let mailer = self.dispatcher.mailer.as_ref().ok_or_else(|| {
                    AddonError::Config("no mailer configured for email notifications".to_string())
                })?;
                let envelope = MailEnvelope::new(config, payload, vec![recipient.clone()]);
                mailer.deliver(&envelope).await?;
                Ok(DeliveryOutcome::Delivered)
            }
        }
    }

    fn render(
        &self,
        spec: Option<&TemplateSpec>,
        default: Template,
    ) -> Result<Message, AddonError> {
        let template = Template::from_spec(spec, default);
        let interpolator =
            Interpolator::new(&self.job.payload, &self.dispatcher.config, self.job.addon);
        Ok(interpolator.render_message(&template)?)
    }

    /// Send every request of a chat message. The first failure ends the
    /// target; lines already posted stay posted.
    async fn send_all(&self, requests: &[RequestDescriptor]) -> Result<DeliveryOutcome, AddonError> {
        for request in requests {
            let response = self.dispatcher.transport.send(request).await?;
            // Stop at the first failed line
            if !response.is_success() {
                return Err(AddonError::UnexpectedResponse {
                    addon: self.job.addon.name().to_string(),
                    status: response.status,
                    body: response.body,
                });
            }
        }
        Ok(DeliveryOutcome::Delivered)
    }

    /// Webhook receivers are third-party endpoints; a failing one is recorded
    /// and never retried.
    async fn send_webhook(&self, request: &RequestDescriptor) -> Result<DeliveryOutcome, AddonError> {
        let response = self.dispatcher.transport.send(request).await?;
        if response.is_success() {
            return Ok(DeliveryOutcome::Delivered);
        }
        Err(AddonError::Rejected {
            status: response.status,
            reason: format!(
                "could not notify {}, body={:?}",
                redact_query(&request.url),
                response.body
            ),
        })
    }

    /// Installation token first, then user tokens in order, stopping at the
    /// first success.
    async fn deliver_status(&self, params: &StatusParams) -> Result<DeliveryOutcome, AddonError> {
        let payload = &self.job.payload;
        let config = &self.dispatcher.config;
        let candidates = self.job.params.candidate_tokens();
        let mut last_rejection = None;

        // App installation first, when the repository has one
        if let Some(installation_id) = params.installation_id {
            match self.installation_token(installation_id).await {
                Ok(token) => {
                    let request =
                        status::request(config, params, payload, StatusPath::GithubApps, &token)?;
                    match self
                        .send_status(&request, params, StatusPath::GithubApps, None)
                        .await?
                    {
                        StatusAttempt::Delivered => return Ok(DeliveryOutcome::Delivered),
                        // Expected rejection: fall through to the user tokens
                        StatusAttempt::Rejected { status, reason } => {
                            last_rejection = Some((status, reason));
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        "type" = "github_status",
                        build = payload.build.id,
                        repo = %params.slug,
                        installation_id,
                        error = %err,
                        "Installation token unavailable, falling back to user tokens"
                    );
                }
            }
        }

        // Then every user token in order until one is accepted
        for candidate in &candidates {
            let request = status::request(
                config,
                params,
                payload,
                StatusPath::UserToken,
                &candidate.token,
            )?;
            match self
                .send_status(
                    &request,
                    params,
                    StatusPath::UserToken,
                    Some(candidate.username.as_str()),
                )
                .await?
            {
                StatusAttempt::Delivered => return Ok(DeliveryOutcome::Delivered),
                StatusAttempt::Rejected { status, reason } => {
                    last_rejection = Some((status, reason));
                }
            }
        }

        // Nothing accepted: keep the last known reason
        match last_rejection {
            Some((status, reason)) => Err(AddonError::Rejected {
                status,
                reason: reason.to_string(),
            }),
            None => Err(AddonError::Config(
                "no installation or user token available for commit status".to_string(),
            )),
        }
    }

    async fn installation_token(&self, installation_id: u64) -> Result<String, AddonError> {
        match &self.dispatcher.app_credentials {
            Some(credentials) => credentials.installation_token(installation_id).await,
            None => Err(AddonError::Config(
                "installation id present but no app credentials configured".to_string(),
            )),
        }
    }

    async fn send_status(
        &self,
        request: &RequestDescriptor,
        params: &StatusParams,
        path: StatusPath,
        username: Option<&str>,
    ) -> Result<StatusAttempt, AddonError> {
        let payload = &self.job.payload;
        let response = self.dispatcher.transport.send(request).await?;
        let state = status::state(payload.build.state);
        let username = username.unwrap_or("-");

        match status::classify(response.status) {
            StatusClass::Success => {
                tracing::info!(
                    "type" = "github_status",
                    build = payload.build.id,
                    repo = %params.slug,
                    state,
                    commit = %params.commit_ref,
                    username,
                    response_status = response.status,
                    processed_with = path.as_str(),
                    "Commit status updated"
                );
                Ok(StatusAttempt::Delivered)
            }
            StatusClass::Expected(reason) => {
                tracing::error!(
                    "type" = "github_status",
                    build = payload.build.id,
                    repo = %params.slug,
                    state,
                    commit = %params.commit_ref,
                    username,
                    response_status = response.status,
                    reason,
                    processed_with = path.as_str(),
                    repository_id = params.repository_id,
                    github_id = ?params.github_id,
                    vcs_type = %params.vcs_type,
                    body = %response.body,
                    "Commit status not updated"
                );
                Ok(StatusAttempt::Rejected {
                    status: response.status,
                    reason,
                })
            }
            StatusClass::Unexpected => {
                tracing::error!(
                    "type" = "github_status",
                    build = payload.build.id,
                    repo = %params.slug,
                    error = "not_updated",
                    commit = %params.commit_ref,
                    url = %request.url,
                    response_status = response.status,
                    processed_with = path.as_str(),
                    repository_id = params.repository_id,
                    github_id = ?params.github_id,
                    vcs_type = %params.vcs_type,
                    body = %response.body,
                    "Commit status update failed"
                );
                Err(AddonError::UnexpectedResponse {
                    addon: Addon::GithubStatus.name().to_string(),
                    status: response.status,
                    body: response.body,
                })
            }
        }
    }

    fn log_outcome(&self, outcome: &TargetOutcome) {
        let addon = self.job.addon.name();
        let build = self.job.payload.build.id;
        let repo = self.job.payload.repository.slug.as_str();
        let label = outcome.outcome.label();
        let detail = outcome.outcome.detail().unwrap_or_default();

        match &outcome.outcome {
            DeliveryOutcome::Delivered => tracing::info!(
                "type" = addon,
                build,
                repo,
                task_id = %self.id,
                target = %outcome.target,
                outcome = label,
                "Notification delivered"
            ),
            DeliveryOutcome::Skipped(_) => tracing::info!(
                "type" = addon,
                build,
                repo,
                task_id = %self.id,
                target = %outcome.target,
                outcome = label,
                detail = %detail,
                "Skipping {} notification",
                addon
            ),
            DeliveryOutcome::Rejected(_) | DeliveryOutcome::TransportError(_) => tracing::warn!(
                "type" = addon,
                build,
                repo,
                task_id = %self.id,
                target = %outcome.target,
                outcome = label,
                detail = %detail,
                "Notification not delivered"
            ),
            DeliveryOutcome::Failed { .. } => tracing::error!(
                "type" = addon,
                build,
                repo,
                task_id = %self.id,
                target = %outcome.target,
                outcome = label,
                detail = %detail,
                "Notification failed"
            ),
        }
    }
}

fn skip_default_host(params: &ChatParams) -> DeliveryOutcome {
    DeliveryOutcome::Skipped(format!(
        "room {} is on the default host {}",
        params.room_id, params.host
    ))
}

/// Log-safe rendering of a specifier that failed to parse. Only the part after
/// the last `@` (room or host) is kept.
fn redact_spec(spec: &str) -> String {
    match spec.rsplit_once('@') {
        Some((_, tail)) if !tail.is_empty() => format!("*@{tail}"),
        _ => "<unparseable>".to_string(),
    }
}
