//! Tenant configuration as stored and as carried on the message bus.
//!
//! Every field is optional on the wire so that a malformed record reaches the
//! validation rules and yields a full error map instead of a parse error.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<EmailConfig>,
    #[serde(default, alias = "azureDevOps", skip_serializing_if = "Option::is_none")]
    pub tracking: Option<TrackingConfig>,
}

/// Body of one bus message: everything needed to build and mail one report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<EmailConfig>,
    #[serde(default, alias = "azureDevOps", skip_serializing_if = "Option::is_none")]
    pub tracking: Option<TrackingConfig>,
}

impl From<TenantConfig> for ProcessRequest {
    fn from(tenant: TenantConfig) -> Self {
        Self {
            id: tenant.id,
            email: tenant.email,
            tracking: tenant.tracking,
        }
    }
}

impl ProcessRequest {
    /// Best available label for diagnostics: the tenant id, else the team.
    pub fn label(&self) -> Option<String> {
        self.id.clone().or_else(|| {
            self.tracking
                .as_ref()
                .and_then(|t| t.team.clone())
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<EmailAuthentication>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<EmailServer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipients: Option<Vec<String>>,
    #[serde(
        default,
        alias = "carbonCopyRecipients",
        skip_serializing_if = "Option::is_none"
    )]
    pub cc_recipients: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailAuthentication {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailServer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<TrackingAuthentication>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_custom_burndown: Option<bool>,
}

impl TrackingConfig {
    pub fn custom_burndown(&self) -> bool {
        self.has_custom_burndown == Some(true)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackingAuthentication {
    #[serde(default, alias = "pat", skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}
