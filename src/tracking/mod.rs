pub mod azure;
pub mod capture;

use anyhow::Result;
use async_trait::async_trait;

use crate::model::iteration::Iteration;
use crate::model::link::Link;
use crate::model::tenant::TrackingConfig;
use crate::model::work_item::RawLinkedItem;

/// Resolved project and team identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamContext {
    pub project_id: String,
    pub project: String,
    pub team_id: String,
    pub team: String,
}

/// Relation records of an iteration plus the fetched records they reference.
/// A `None` item is one the service returned as null.
#[derive(Debug, Clone, Default)]
pub struct LinkedItems {
    pub links: Vec<Link>,
    pub items: Vec<Option<RawLinkedItem>>,
}

/// One tracking-service session. Every call is a single attempt.
#[async_trait]
pub trait TrackingClient: Send + Sync {
    async fn resolve_team(&self, project: &str, team: &str) -> Result<TeamContext>;
    async fn current_iteration(&self, team: &TeamContext) -> Result<Option<Iteration>>;
    async fn linked_items(&self, team: &TeamContext, iteration: &Iteration) -> Result<LinkedItems>;
    /// Base64 PNG of the iteration burndown; `custom` selects the browser capture.
    async fn burndown_image(
        &self,
        team: &TeamContext,
        iteration: &Iteration,
        custom: bool,
    ) -> Result<Option<String>>;
    /// Release anything the session opened.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Opens a fresh client per report run.
#[async_trait]
pub trait TrackingClientFactory: Send + Sync {
    async fn connect(&self, config: &TrackingConfig) -> Result<Box<dyn TrackingClient>>;
}
