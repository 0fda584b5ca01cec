use anyhow::{Context, Result};
use async_trait::async_trait;
use handlebars::Handlebars;
use serde::Serialize;

use crate::model::iteration::Iteration;
use crate::model::work_item::WorkItem;

const TEMPLATE_NAME: &str = "report";
const TEMPLATE: &str = include_str!("../templates/report.hbs");

/// Everything the report template sees.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportModel {
    pub backlog: Vec<WorkItem>,
    /// Base64-encoded PNG.
    pub burndown: String,
    pub iteration: Iteration,
    pub summary: BacklogSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_remaining: Option<i64>,
}

impl ReportModel {
    pub fn new(backlog: Vec<WorkItem>, burndown: String, iteration: Iteration) -> Self {
        let summary = BacklogSummary::of(&backlog);
        let days_remaining = iteration.days_remaining(chrono::Utc::now());
        Self {
            backlog,
            burndown,
            iteration,
            summary,
            days_remaining,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BacklogSummary {
    /// Backlog items plus their children.
    pub items: usize,
    /// Story points of the backlog-level items.
    pub story_points: f64,
    /// Hours of the child items.
    pub remaining_work: f64,
    pub completed_work: f64,
}

impl BacklogSummary {
    pub fn of(backlog: &[WorkItem]) -> Self {
        let mut summary = Self::default();
        for root in backlog {
            summary.items += 1 + root.children.len();
            summary.story_points += root.story_points.unwrap_or_default();
            for child in &root.children {
                summary.remaining_work += child.remaining_work.unwrap_or_default();
                summary.completed_work += child.completed_work.unwrap_or_default();
            }
        }
        summary
    }
}

#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, model: &ReportModel) -> Result<String>;
}

pub struct HandlebarsRenderer {
    registry: Handlebars<'static>,
}

impl HandlebarsRenderer {
    pub fn new() -> Result<Self> {
        Self::with_template(TEMPLATE)
    }

    pub fn with_template(template: &str) -> Result<Self> {
        let mut registry = Handlebars::new();
        registry
            .register_template_string(TEMPLATE_NAME, template)
            .context("Failed to compile report template")?;
        Ok(Self { registry })
    }
}

#[async_trait]
impl Renderer for HandlebarsRenderer {
    async fn render(&self, model: &ReportModel) -> Result<String> {
        self.registry
            .render(TEMPLATE_NAME, model)
            .context("Failed to render report template")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: i64, title: &str, points: Option<f64>, remaining: Option<f64>) -> WorkItem {
        WorkItem {
            id,
            title: title.into(),
            kind: "Task".into(),
            state: "Active".into(),
            url: format!("https://dev.azure.com/acme/_workitems/edit/{id}"),
            story_points: points,
            original_estimate: None,
            remaining_work: remaining,
            completed_work: None,
            children: Vec::new(),
        }
    }

    fn model() -> ReportModel {
        let backlog = vec![
            item(1, "Checkout <flow>", Some(5.0), None)
                .with_children(vec![item(2, "Wire payment", None, Some(3.0))]),
            item(3, "Search", Some(3.0), None),
        ];
        ReportModel::new(
            backlog,
            "iVBORw0KGgo=".into(),
            Iteration {
                id: "it-7".into(),
                name: "Sprint 7".into(),
                path: "Apollo\\Sprint 7".into(),
                start_date: None,
                finish_date: None,
            },
        )
    }

    #[test]
    fn summary_totals_roots_and_children() {
        let summary = model().summary;
        assert_eq!(summary.items, 3);
        assert_eq!(summary.story_points, 8.0);
        assert_eq!(summary.remaining_work, 3.0);
    }

    #[tokio::test]
    async fn renders_backlog_burndown_and_iteration() {
        let renderer = HandlebarsRenderer::new().unwrap();
        let html = renderer.render(&model()).await.unwrap();

        assert!(html.contains("<h2>Sprint 7</h2>"));
        assert!(html.contains("data:image/png;base64,iVBORw0KGgo="));
        assert!(html.contains("https://dev.azure.com/acme/_workitems/edit/2"));
        assert!(html.contains("Wire payment"));
        assert!(html.contains("Checkout &lt;flow&gt;"));
    }

    #[test]
    fn broken_template_is_rejected_up_front() {
        assert!(HandlebarsRenderer::with_template("{{#each backlog}}").is_err());
    }
}
