//! One unit of work per tenant: the producer publishes a message for every
//! active tenant, the consumer turns each message into a mailed report.
//!
//! Both sides await every task and collect every outcome; one tenant's
//! failure never hides another's result.

use std::sync::Arc;

use anyhow::{Context, Result};
use futures::future::join_all;

use crate::bus::MessageBus;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::{ensure_valid, error_chain, BatchFailure, ReportError};
use crate::mail::{report_subject, MailerFactory, SendEmailRequest};
use crate::model::tenant::{ProcessRequest, TenantConfig};
use crate::pipeline::ReportPipeline;
use crate::store::TenantStore;
use crate::validation::rules;

fn batch_result(total: usize, failures: Vec<BatchFailure>) -> Result<usize, ReportError> {
    if failures.is_empty() {
        Ok(total)
    } else {
        Err(ReportError::PartialBatchFailure { total, failures })
    }
}

pub struct Producer {
    store: Arc<dyn TenantStore>,
    bus: Arc<dyn MessageBus>,
    diagnostics: Arc<dyn Diagnostics>,
}

impl Producer {
    pub fn new(
        store: Arc<dyn TenantStore>,
        bus: Arc<dyn MessageBus>,
        diagnostics: Arc<dyn Diagnostics>,
    ) -> Self {
        Self {
            store,
            bus,
            diagnostics,
        }
    }

    /// Publish one message per active tenant and return how many went out.
    ///
    /// A store that cannot be listed fails the call outright; individual
    /// publish failures come back together as `PartialBatchFailure`.
    pub async fn produce(&self) -> Result<usize> {
        let tenants = self
            .store
            .list_active()
            .await
            .context("Failed to list active tenants")?;
        let total = tenants.len();

        let outcomes = join_all(
            tenants
                .into_iter()
                .enumerate()
                .map(|(index, tenant)| self.publish(index, tenant)),
        )
        .await;

        let failures: Vec<BatchFailure> = outcomes.into_iter().filter_map(Result::err).collect();
        Ok(batch_result(total, failures)?)
    }

    async fn publish(&self, index: usize, tenant: TenantConfig) -> Result<(), BatchFailure> {
        let request = ProcessRequest::from(tenant);
        let label = request.label();
        let outcome = match serde_json::to_value(&request) {
            Ok(payload) => self.bus.publish(&payload).await,
            Err(e) => Err(e.into()),
        };

        match outcome {
            Ok(()) => {
                self.diagnostics.emit(Diagnostic::TenantPublished {
                    tenant: label.unwrap_or_else(|| format!("#{index}")),
                });
                Ok(())
            }
            Err(err) => Err(BatchFailure {
                index,
                tenant: label,
                error: format!("{err:#}"),
            }),
        }
    }
}

/// Validates one request, builds its report and mails it.
pub struct TenantProcessor {
    pipeline: ReportPipeline,
    mailers: Arc<dyn MailerFactory>,
}

impl TenantProcessor {
    pub fn new(pipeline: ReportPipeline, mailers: Arc<dyn MailerFactory>) -> Self {
        Self { pipeline, mailers }
    }

    pub async fn process(&self, request: ProcessRequest) -> Result<(), ReportError> {
        ensure_valid("ProcessRequest", rules::process_request().validate(&request))?;
        let tracking = request.tracking.unwrap_or_default();
        let email = request.email.unwrap_or_default();

        let report = self.pipeline.execute(&tracking).await?;

        let team = tracking.team.as_deref().unwrap_or_default();
        let subject = report_subject(team, Some(&report.iteration_name));
        let message = SendEmailRequest {
            email: email.clone(),
            subject: subject.clone(),
            html: report.markup,
        }
        .into_message()?;

        let mailer = self
            .mailers
            .mailer(&email)
            .map_err(|source| ReportError::SendFailure {
                subject: subject.clone(),
                source,
            })?;
        mailer
            .send(&message)
            .await
            .map_err(|source| ReportError::SendFailure { subject, source })
    }
}

pub struct Consumer {
    processor: TenantProcessor,
    diagnostics: Arc<dyn Diagnostics>,
}

impl Consumer {
    pub fn new(processor: TenantProcessor, diagnostics: Arc<dyn Diagnostics>) -> Self {
        Self {
            processor,
            diagnostics,
        }
    }

    /// Process every message concurrently. Returns the number handled, or
    /// `PartialBatchFailure` listing each message that failed.
    pub async fn consume(&self, messages: Vec<String>) -> Result<usize, ReportError> {
        let total = messages.len();
        let outcomes = join_all(
            messages
                .iter()
                .enumerate()
                .map(|(index, body)| self.handle(index, body)),
        )
        .await;

        let mut failures = Vec::new();
        for (index, (tenant, outcome)) in outcomes.into_iter().enumerate() {
            if let Err(err) = outcome {
                let error = error_chain(&err);
                self.diagnostics.emit(Diagnostic::MessageFailed {
                    index,
                    tenant: tenant.clone(),
                    error: error.clone(),
                });
                failures.push(BatchFailure {
                    index,
                    tenant,
                    error,
                });
            }
        }
        batch_result(total, failures)
    }

    async fn handle(&self, index: usize, body: &str) -> (Option<String>, Result<(), ReportError>) {
        let request: ProcessRequest = match serde_json::from_str(body) {
            Ok(request) => request,
            Err(source) => return (None, Err(ReportError::MalformedMessage { index, source })),
        };
        let label = request.label();
        (label, self.processor.process(request).await)
    }
}
