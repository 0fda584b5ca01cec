//! Builds one squad report: iteration, backlog, burndown, then markup.
//!
//! Stages run strictly in order and the first failure ends the run. The
//! tracking session is closed whatever the outcome.

use std::sync::Arc;

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::{ensure_valid, error_chain, ReportError, RunContext};
use crate::hierarchy::HierarchyBuilder;
use crate::model::tenant::TrackingConfig;
use crate::render::{ReportModel, Renderer};
use crate::tracking::{TrackingClient, TrackingClientFactory};
use crate::validation::rules;

pub const STAGE_VALIDATE: &str = "validate";
pub const STAGE_ITERATION: &str = "resolve-iteration";
pub const STAGE_BACKLOG: &str = "resolve-backlog";
pub const STAGE_BURNDOWN: &str = "resolve-burndown";
pub const STAGE_RENDER: &str = "render";

/// The identifiers a run needs before it touches the tracking service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportRequest {
    pub project: String,
    pub team: String,
    pub has_custom_burndown: Option<bool>,
}

impl From<&TrackingConfig> for ReportRequest {
    fn from(config: &TrackingConfig) -> Self {
        Self {
            project: config.project.clone().unwrap_or_default(),
            team: config.team.clone().unwrap_or_default(),
            has_custom_burndown: config.has_custom_burndown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub markup: String,
    pub iteration_name: String,
}

pub struct ReportPipeline {
    tracking: Arc<dyn TrackingClientFactory>,
    renderer: Arc<dyn Renderer>,
    hierarchy: HierarchyBuilder,
    diagnostics: Arc<dyn Diagnostics>,
}

impl ReportPipeline {
    pub fn new(
        tracking: Arc<dyn TrackingClientFactory>,
        renderer: Arc<dyn Renderer>,
        diagnostics: Arc<dyn Diagnostics>,
    ) -> Self {
        Self {
            tracking,
            renderer,
            hierarchy: HierarchyBuilder::new(diagnostics.clone()),
            diagnostics,
        }
    }

    pub async fn execute(&self, config: &TrackingConfig) -> Result<Report, ReportError> {
        let request = ReportRequest::from(config);
        let context = RunContext::new(&request.project, &request.team);

        let result = self.execute_request(config, &request, &context).await;
        match &result {
            Ok(report) => self.diagnostics.emit(Diagnostic::RunCompleted {
                context: context.with_iteration(&report.iteration_name).to_string(),
            }),
            Err(err) => self.diagnostics.emit(Diagnostic::RunFailed {
                context: context.to_string(),
                error: error_chain(err),
            }),
        }
        result
    }

    async fn execute_request(
        &self,
        config: &TrackingConfig,
        request: &ReportRequest,
        context: &RunContext,
    ) -> Result<Report, ReportError> {
        self.stage(STAGE_VALIDATE, context);
        ensure_valid("ReportRequest", rules::report_request().validate(request))
            .map_err(|err| err.in_context(context))?;

        let client = self
            .tracking
            .connect(config)
            .await
            .map_err(|source| ReportError::Tracking {
                stage: "connect",
                context: context.clone(),
                source,
            })?;

        let result = self.run(client.as_ref(), request, context).await;

        if let Err(err) = client.close().await {
            self.diagnostics.emit(Diagnostic::CloseFailed {
                context: context.to_string(),
                error: format!("{err:#}"),
            });
        }
        result
    }

    async fn run(
        &self,
        client: &dyn TrackingClient,
        request: &ReportRequest,
        context: &RunContext,
    ) -> Result<Report, ReportError> {
        let tracking = |stage: &'static str, context: &RunContext| {
            let context = context.clone();
            move |source| ReportError::Tracking {
                stage,
                context,
                source,
            }
        };

        self.stage(STAGE_ITERATION, context);
        let team = client
            .resolve_team(&request.project, &request.team)
            .await
            .map_err(tracking(STAGE_ITERATION, context))?;
        let iteration = client
            .current_iteration(&team)
            .await
            .map_err(tracking(STAGE_ITERATION, context))?
            .ok_or_else(|| ReportError::NoActiveIteration {
                context: context.clone(),
            })?;
        let context = &context.with_iteration(&iteration.name);

        self.stage(STAGE_BACKLOG, context);
        let linked = client
            .linked_items(&team, &iteration)
            .await
            .map_err(tracking(STAGE_BACKLOG, context))?;
        let backlog = self
            .hierarchy
            .build(&iteration.name, &linked.links, &linked.items)
            .map_err(|err| err.in_context(context))?;
        if backlog.is_empty() {
            return Err(ReportError::EmptyBacklog {
                context: context.clone(),
            });
        }

        self.stage(STAGE_BURNDOWN, context);
        let custom = request.has_custom_burndown == Some(true);
        let burndown = client
            .burndown_image(&team, &iteration, custom)
            .await
            .map_err(tracking(STAGE_BURNDOWN, context))?
            .filter(|image| !image.trim().is_empty())
            .ok_or_else(|| ReportError::BurndownUnavailable {
                context: context.clone(),
            })?;

        self.stage(STAGE_RENDER, context);
        let iteration_name = iteration.name.clone();
        let model = ReportModel::new(backlog, burndown, iteration);
        ensure_valid("ReportModel", rules::render_request().validate(&model))
            .map_err(|err| err.in_context(context))?;
        let markup = self
            .renderer
            .render(&model)
            .await
            .map_err(|err| ReportError::RenderFailure {
                context: context.clone(),
                reason: format!("{err:#}"),
            })?;
        if markup.trim().is_empty() {
            return Err(ReportError::RenderFailure {
                context: context.clone(),
                reason: "template produced no output".into(),
            });
        }

        Ok(Report {
            markup,
            iteration_name,
        })
    }

    fn stage(&self, stage: &'static str, context: &RunContext) {
        self.diagnostics.emit(Diagnostic::StageStarted {
            stage,
            context: context.to_string(),
        });
    }
}
