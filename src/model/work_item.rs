use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ReportError;
use crate::util::fields::{number_field, text_field};

pub const FIELD_TITLE: &str = "System.Title";
pub const FIELD_STATE: &str = "System.State";
pub const FIELD_TYPE: &str = "System.WorkItemType";
pub const FIELD_STORY_POINTS: &str = "Microsoft.VSTS.Scheduling.StoryPoints";
pub const FIELD_ORIGINAL_ESTIMATE: &str = "Microsoft.VSTS.Scheduling.OriginalEstimate";
pub const FIELD_REMAINING_WORK: &str = "Microsoft.VSTS.Scheduling.RemainingWork";
pub const FIELD_COMPLETED_WORK: &str = "Microsoft.VSTS.Scheduling.CompletedWork";

/// Fields requested for every item in a batch fetch.
pub const REPORT_FIELDS: [&str; 7] = [
    FIELD_TITLE,
    FIELD_STATE,
    FIELD_TYPE,
    FIELD_STORY_POINTS,
    FIELD_ORIGINAL_ESTIMATE,
    FIELD_REMAINING_WORK,
    FIELD_COMPLETED_WORK,
];

/// A work item as returned by the tracking service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawLinkedItem {
    pub id: Option<i64>,
    pub fields: Option<Map<String, Value>>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    pub id: i64,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub state: String,
    /// Browsable link, rewritten from the API url when the item is built.
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub story_points: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_estimate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_work: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_work: Option<f64>,
    pub children: Vec<WorkItem>,
}

impl WorkItem {
    pub fn with_children(self, children: Vec<WorkItem>) -> Self {
        Self { children, ..self }
    }
}

/// Turn an API work-item url into the web url a person can open:
/// `.../_apis/wit/workItems/42` becomes `.../_workitems/edit/42`.
///
/// Only the first occurrence of each segment is replaced, so this must run
/// once per item.
pub fn browsable_url(api_url: &str) -> String {
    api_url
        .replacen("_apis/wit", "_workitems", 1)
        .replacen("workItems", "edit", 1)
}

/// Normalize a raw record. `None` models a record the service returned as
/// null.
pub fn normalize(raw: Option<&RawLinkedItem>) -> Result<WorkItem, ReportError> {
    let raw = raw.ok_or_else(|| invalid(None, "record is absent"))?;
    let id = match raw.id {
        Some(id) if id != 0 => id,
        _ => return Err(invalid(None, "id is missing")),
    };
    let fields = raw.fields.as_ref().ok_or_else(|| invalid(Some(id), "fields are missing"))?;
    let url = raw
        .url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| invalid(Some(id), "url is missing"))?;

    Ok(WorkItem {
        id,
        title: text_field(fields, FIELD_TITLE).unwrap_or_default(),
        kind: text_field(fields, FIELD_TYPE).unwrap_or_default(),
        state: text_field(fields, FIELD_STATE).unwrap_or_default(),
        url: browsable_url(url),
        story_points: number_field(fields, FIELD_STORY_POINTS),
        original_estimate: number_field(fields, FIELD_ORIGINAL_ESTIMATE),
        remaining_work: number_field(fields, FIELD_REMAINING_WORK),
        completed_work: number_field(fields, FIELD_COMPLETED_WORK),
        children: Vec::new(),
    })
}

fn invalid(id: Option<i64>, reason: &str) -> ReportError {
    ReportError::InvalidSourceRecord {
        id,
        reason: reason.to_string(),
        context: None,
    }
}
