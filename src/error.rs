use std::fmt;

use thiserror::Error;

use crate::validation::ValidationErrors;

/// Identifiers attached to every pipeline failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunContext {
    pub project: String,
    pub team: String,
    pub iteration: Option<String>,
}

impl RunContext {
    pub fn new(project: &str, team: &str) -> Self {
        Self {
            project: project.to_string(),
            team: team.to_string(),
            iteration: None,
        }
    }

    pub fn with_iteration(&self, iteration: &str) -> Self {
        Self {
            iteration: Some(iteration.to_string()),
            ..self.clone()
        }
    }
}

impl fmt::Display for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "project '{}', team '{}'", self.project, self.team)?;
        if let Some(iteration) = &self.iteration {
            write!(f, ", iteration '{iteration}'")?;
        }
        Ok(())
    }
}

/// One failed unit of a fan-out batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    /// Zero-based position of the message or tenant in the batch.
    pub index: usize,
    pub tenant: Option<String>,
    pub error: String,
}

impl fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.index)?;
        if let Some(tenant) = &self.tenant {
            write!(f, " tenant '{tenant}'")?;
        }
        write!(f, ": {}", self.error)
    }
}

/// `" for <context>"` when a context is attached.
fn scope(context: &Option<RunContext>) -> String {
    context
        .as_ref()
        .map(|context| format!(" for {context}"))
        .unwrap_or_default()
}

/// The error and every `source` below it, joined with `": "`.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn list_failures(failures: &[BatchFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("{subject} is not valid{}: {errors}", scope(context))]
    InvalidRequest {
        subject: &'static str,
        errors: ValidationErrors,
        context: Option<RunContext>,
    },

    #[error("no active iteration for {context}")]
    NoActiveIteration { context: RunContext },

    #[error("nothing to report: backlog is empty for {context}")]
    EmptyBacklog { context: RunContext },

    #[error("burndown image unavailable for {context}")]
    BurndownUnavailable { context: RunContext },

    #[error("failed to render report for {context}: {reason}")]
    RenderFailure { context: RunContext, reason: String },

    #[error("failed to send report '{subject}'")]
    SendFailure {
        subject: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(
        "invalid source work item{}{}: {reason}",
        id.map(|id| format!(" {id}")).unwrap_or_default(),
        scope(context)
    )]
    InvalidSourceRecord {
        id: Option<i64>,
        reason: String,
        context: Option<RunContext>,
    },

    #[error("tracking service call '{stage}' failed for {context}")]
    Tracking {
        stage: &'static str,
        context: RunContext,
        #[source]
        source: anyhow::Error,
    },

    #[error("message [{index}] is not a valid process request")]
    MalformedMessage {
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("configuration is not valid: {0}")]
    Configuration(ValidationErrors),

    #[error("{} of {total} failed: {}", failures.len(), list_failures(failures))]
    PartialBatchFailure {
        total: usize,
        failures: Vec<BatchFailure>,
    },
}

impl ReportError {
    pub fn invalid(subject: &'static str, errors: ValidationErrors) -> Self {
        Self::InvalidRequest {
            subject,
            errors,
            context: None,
        }
    }

    /// Attach `context` to a variant raised before the run's identifiers were
    /// known. Contexts already present are kept.
    pub fn in_context(self, run: &RunContext) -> Self {
        match self {
            Self::InvalidRequest {
                subject,
                errors,
                context: None,
            } => Self::InvalidRequest {
                subject,
                errors,
                context: Some(run.clone()),
            },
            Self::InvalidSourceRecord {
                id,
                reason,
                context: None,
            } => Self::InvalidSourceRecord {
                id,
                reason,
                context: Some(run.clone()),
            },
            other => other,
        }
    }
}

/// Turn a validation map into `InvalidRequest` when it is non-empty.
pub fn ensure_valid(subject: &'static str, errors: ValidationErrors) -> Result<(), ReportError> {
    errors
        .into_result()
        .map_err(|errors| ReportError::invalid(subject, errors))
}
