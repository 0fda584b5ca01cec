//! Narrow observer through which the core reports what it decided.
//!
//! Components hold an `Arc<dyn Diagnostics>`; the binary wires in
//! [`TracingDiagnostics`], tests use [`RecordingDiagnostics`].

use std::sync::Arc;

use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// The iteration's relation graph referenced no items at all.
    NoLinkedItems { iteration: String },
    /// A link source had no matching fetched item; it and its children were dropped.
    BacklogItemNotFound { id: i64 },
    /// A link target had no matching fetched item; it was left out of its parent.
    ChildItemNotFound { parent: i64, id: i64 },
    StageStarted { stage: &'static str, context: String },
    RunCompleted { context: String },
    RunFailed { context: String, error: String },
    TenantPublished { tenant: String },
    MessageFailed { index: usize, tenant: Option<String>, error: String },
    CloseFailed { context: String, error: String },
}

pub trait Diagnostics: Send + Sync {
    fn emit(&self, event: Diagnostic);
}

/// Forwards every event to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn emit(&self, event: Diagnostic) {
        match event {
            Diagnostic::NoLinkedItems { iteration } => {
                warn!(%iteration, "iteration does not have a single linked work item")
            }
            Diagnostic::BacklogItemNotFound { id } => {
                warn!(id, "backlog item not found, dropping it and its children")
            }
            Diagnostic::ChildItemNotFound { parent, id } => {
                warn!(parent, id, "child item not found, dropping it")
            }
            Diagnostic::StageStarted { stage, context } => info!(stage, %context, "stage started"),
            Diagnostic::RunCompleted { context } => info!(%context, "report built"),
            Diagnostic::RunFailed { context, error } => {
                warn!(%context, %error, "report run failed")
            }
            Diagnostic::TenantPublished { tenant } => info!(%tenant, "report message published"),
            Diagnostic::MessageFailed {
                index,
                tenant,
                error,
            } => warn!(index, tenant = ?tenant, %error, "message processing failed"),
            Diagnostic::CloseFailed { context, error } => {
                warn!(%context, %error, "failed to close tracking session")
            }
        }
    }
}

pub fn tracing_diagnostics() -> Arc<dyn Diagnostics> {
    Arc::new(TracingDiagnostics)
}

/// Keeps every event in memory.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingDiagnostics {
    events: std::sync::Mutex<Vec<Diagnostic>>,
}

#[cfg(test)]
impl RecordingDiagnostics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Diagnostic> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
impl Diagnostics for RecordingDiagnostics {
    fn emit(&self, event: Diagnostic) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
