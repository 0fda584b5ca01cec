use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::capture::BurndownCapture;
use super::{LinkedItems, TeamContext, TrackingClient, TrackingClientFactory};
use crate::config::{BrowserConfig, TrackingServiceConfig};
use crate::hierarchy::collect_ids;
use crate::model::iteration::Iteration;
use crate::model::link::Link;
use crate::model::tenant::TrackingConfig;
use crate::model::work_item::{RawLinkedItem, REPORT_FIELDS};

/// Upper bound on ids per `workitemsbatch` call.
const BATCH_LIMIT: usize = 200;
const CURRENT_TIME_FRAME: &str = "current";

pub struct AzureDevOpsClient {
    org_url: String,
    api_version: String,
    auth_header: String,
    client: reqwest::Client,
    chart_width: u32,
    chart_height: u32,
    credentials: Option<(String, String)>,
    capture: BurndownCapture,
}

impl AzureDevOpsClient {
    pub fn new(
        service: &TrackingServiceConfig,
        browser: &BrowserConfig,
        tracking: &TrackingConfig,
    ) -> Result<Self> {
        let organization = tracking
            .organization
            .as_deref()
            .filter(|o| !o.trim().is_empty())
            .context("Organization not set")?;
        let auth = tracking
            .authentication
            .as_ref()
            .context("Tracking authentication not set")?;
        let token = auth.token.as_deref().context("Personal access token not set")?;

        // PATs go in the password slot of basic auth with an empty user.
        let encoded = base64::engine::general_purpose::STANDARD.encode(format!(":{token}"));
        let credentials = match (&auth.user, &auth.password) {
            (Some(user), Some(password)) => Some((user.clone(), password.clone())),
            _ => None,
        };

        Ok(Self {
            org_url: format!(
                "{}/{}",
                service.base_url.trim_end_matches('/'),
                urlencoding::encode(organization)
            ),
            api_version: service.api_version.clone(),
            auth_header: format!("Basic {encoded}"),
            client: reqwest::Client::new(),
            chart_width: service.chart_width,
            chart_height: service.chart_height,
            credentials,
            capture: BurndownCapture::new(browser.clone()),
        })
    }

    fn team_url(&self, team: &TeamContext) -> String {
        format!(
            "{}/{}/{}",
            self.org_url,
            urlencoding::encode(&team.project),
            urlencoding::encode(&team.team)
        )
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T> {
        let resp = self
            .client
            .get(url)
            .header("Authorization", &self.auth_header)
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("Azure DevOps {what} request failed"))?
            .error_for_status()
            .with_context(|| format!("Azure DevOps {what} request was rejected"))?;

        resp.json()
            .await
            .with_context(|| format!("Failed to parse Azure DevOps {what} response"))
    }

    async fn fetch_batch(&self, ids: &[i64]) -> Result<Vec<Option<RawLinkedItem>>> {
        let url = format!(
            "{}/_apis/wit/workitemsbatch?api-version={}",
            self.org_url, self.api_version
        );
        let mut items = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(BATCH_LIMIT) {
            let body = serde_json::json!({
                "ids": chunk,
                "fields": REPORT_FIELDS,
                "errorPolicy": "omit",
            });
            let batch: ListResponse<Option<RawLinkedItem>> = self
                .client
                .post(&url)
                .header("Authorization", &self.auth_header)
                .json(&body)
                .send()
                .await
                .context("Azure DevOps work item batch request failed")?
                .error_for_status()
                .context("Azure DevOps work item batch request was rejected")?
                .json()
                .await
                .context("Failed to parse Azure DevOps work item batch response")?;
            items.extend(batch.value);
        }
        Ok(items)
    }

    async fn chart_image(&self, team: &TeamContext, iteration: &Iteration) -> Result<Option<String>> {
        let url = format!(
            "{}/_apis/work/iterations/{}/chartimages/burndown?width={}&height={}&showDetails=true&api-version={}-preview.1",
            self.team_url(team),
            urlencoding::encode(&iteration.id),
            self.chart_width,
            self.chart_height,
            self.api_version
        );
        let bytes = self
            .client
            .get(&url)
            .header("Authorization", &self.auth_header)
            .header("Accept", "image/png")
            .send()
            .await
            .context("Azure DevOps burndown chart request failed")?
            .error_for_status()
            .context("Azure DevOps burndown chart request was rejected")?
            .bytes()
            .await
            .context("Failed to read burndown chart image")?;

        if bytes.is_empty() {
            return Ok(None);
        }
        Ok(Some(base64::engine::general_purpose::STANDARD.encode(bytes)))
    }

    fn analytics_url(&self, team: &TeamContext, iteration: &Iteration) -> String {
        let path = iteration
            .path
            .split('\\')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!(
            "{}/{}/_sprints/analytics/{}/{}?fullScreen=true",
            self.org_url,
            urlencoding::encode(&team.project),
            urlencoding::encode(&team.team),
            path
        )
    }
}

#[derive(Deserialize)]
struct ListResponse<T> {
    value: Vec<T>,
}

#[derive(Deserialize)]
struct Project {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct Team {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct TeamIteration {
    id: String,
    name: String,
    #[serde(default)]
    path: String,
    attributes: Option<IterationAttributes>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IterationAttributes {
    start_date: Option<DateTime<Utc>>,
    finish_date: Option<DateTime<Utc>>,
    time_frame: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IterationWorkItems {
    #[serde(default)]
    work_item_relations: Vec<Link>,
}

impl From<TeamIteration> for Iteration {
    fn from(it: TeamIteration) -> Self {
        let (start_date, finish_date) = it
            .attributes
            .map(|a| (a.start_date, a.finish_date))
            .unwrap_or_default();
        Iteration {
            id: it.id,
            name: it.name,
            path: it.path,
            start_date,
            finish_date,
        }
    }
}

#[async_trait]
impl TrackingClient for AzureDevOpsClient {
    async fn resolve_team(&self, project: &str, team: &str) -> Result<TeamContext> {
        let url = format!("{}/_apis/projects?api-version={}", self.org_url, self.api_version);
        let projects: ListResponse<Project> = self.get_json(&url, "projects").await?;
        let found = projects
            .value
            .into_iter()
            .find(|p| p.name == project)
            .with_context(|| format!("Project with name {project} not found"))?;

        let url = format!(
            "{}/_apis/projects/{}/teams?api-version={}",
            self.org_url,
            urlencoding::encode(&found.id),
            self.api_version
        );
        let teams: ListResponse<Team> = self.get_json(&url, "teams").await?;
        let team = teams
            .value
            .into_iter()
            .find(|t| t.name == team)
            .with_context(|| format!("Team with name {team} not found in {project}"))?;

        Ok(TeamContext {
            project_id: found.id,
            project: found.name,
            team_id: team.id,
            team: team.name,
        })
    }

    async fn current_iteration(&self, team: &TeamContext) -> Result<Option<Iteration>> {
        let url = format!(
            "{}/_apis/work/teamsettings/iterations?$timeframe={}&api-version={}",
            self.team_url(team),
            CURRENT_TIME_FRAME,
            self.api_version
        );
        let iterations: ListResponse<TeamIteration> = self.get_json(&url, "iterations").await?;
        Ok(iterations
            .value
            .into_iter()
            .find(|it| {
                it.attributes
                    .as_ref()
                    .and_then(|a| a.time_frame.as_deref())
                    .map_or(true, |frame| frame.eq_ignore_ascii_case(CURRENT_TIME_FRAME))
            })
            .map(Iteration::from))
    }

    async fn linked_items(&self, team: &TeamContext, iteration: &Iteration) -> Result<LinkedItems> {
        let url = format!(
            "{}/_apis/work/teamsettings/iterations/{}/workitems?api-version={}",
            self.team_url(team),
            urlencoding::encode(&iteration.id),
            self.api_version
        );
        let relations: IterationWorkItems = self.get_json(&url, "iteration work items").await?;
        let links = relations.work_item_relations;

        let ids: Vec<i64> = collect_ids(&links).all.into_iter().collect();
        if ids.is_empty() {
            return Ok(LinkedItems {
                links,
                items: Vec::new(),
            });
        }

        let items = self.fetch_batch(&ids).await?;
        Ok(LinkedItems { links, items })
    }

    async fn burndown_image(
        &self,
        team: &TeamContext,
        iteration: &Iteration,
        custom: bool,
    ) -> Result<Option<String>> {
        if !custom {
            return self.chart_image(team, iteration).await;
        }
        let Some((user, password)) = &self.credentials else {
            return Ok(None);
        };
        let url = self.analytics_url(team, iteration);
        let image = self.capture.capture(&url, user, password).await?;
        Ok(Some(image).filter(|i| !i.is_empty()))
    }

    async fn close(&self) -> Result<()> {
        self.capture.close().await
    }
}

pub struct AzureDevOpsFactory {
    service: TrackingServiceConfig,
    browser: BrowserConfig,
}

impl AzureDevOpsFactory {
    pub fn new(service: TrackingServiceConfig, browser: BrowserConfig) -> Self {
        Self { service, browser }
    }
}

#[async_trait]
impl TrackingClientFactory for AzureDevOpsFactory {
    async fn connect(&self, config: &TrackingConfig) -> Result<Box<dyn TrackingClient>> {
        Ok(Box::new(AzureDevOpsClient::new(
            &self.service,
            &self.browser,
            config,
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tenant::TrackingAuthentication;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tracking() -> TrackingConfig {
        TrackingConfig {
            authentication: Some(TrackingAuthentication {
                token: Some("secret".into()),
                user: None,
                password: None,
            }),
            organization: Some("acme".into()),
            project: Some("Apollo".into()),
            team: Some("Core".into()),
            has_custom_burndown: Some(false),
        }
    }

    fn client(server: &MockServer) -> AzureDevOpsClient {
        let service = TrackingServiceConfig {
            base_url: server.uri(),
            ..TrackingServiceConfig::default()
        };
        AzureDevOpsClient::new(&service, &BrowserConfig::default(), &tracking()).unwrap()
    }

    fn team() -> TeamContext {
        TeamContext {
            project_id: "p-1".into(),
            project: "Apollo".into(),
            team_id: "t-1".into(),
            team: "Core Team".into(),
        }
    }

    fn iteration() -> Iteration {
        Iteration {
            id: "it-7".into(),
            name: "Sprint 7".into(),
            path: "Apollo\\Sprint 7".into(),
            start_date: None,
            finish_date: None,
        }
    }

    #[tokio::test]
    async fn resolves_project_and_team_by_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/acme/_apis/projects"))
            .and(header("Authorization", "Basic OnNlY3JldA=="))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{ "id": "p-0", "name": "Other" }, { "id": "p-1", "name": "Apollo" }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/acme/_apis/projects/p-1/teams"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{ "id": "t-1", "name": "Core" }]
            })))
            .mount(&server)
            .await;

        let team = client(&server).resolve_team("Apollo", "Core").await.unwrap();
        assert_eq!(team.project_id, "p-1");
        assert_eq!(team.team_id, "t-1");
    }

    #[tokio::test]
    async fn unknown_project_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/acme/_apis/projects"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": [] })))
            .mount(&server)
            .await;

        let err = client(&server).resolve_team("Apollo", "Core").await.unwrap_err();
        assert!(err.to_string().contains("Project with name Apollo not found"));
    }

    #[tokio::test]
    async fn current_iteration_reads_dates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/acme/Apollo/Core%20Team/_apis/work/teamsettings/iterations"))
            .and(query_param("$timeframe", "current"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{
                    "id": "it-7",
                    "name": "Sprint 7",
                    "path": "Apollo\\Sprint 7",
                    "attributes": {
                        "startDate": "2024-05-06T00:00:00Z",
                        "finishDate": "2024-05-17T00:00:00Z",
                        "timeFrame": "current"
                    }
                }]
            })))
            .mount(&server)
            .await;

        let iteration = client(&server).current_iteration(&team()).await.unwrap().unwrap();
        assert_eq!(iteration.name, "Sprint 7");
        assert!(iteration.finish_date.is_some());
    }

    #[tokio::test]
    async fn no_current_iteration_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/acme/Apollo/Core%20Team/_apis/work/teamsettings/iterations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": [] })))
            .mount(&server)
            .await;

        assert!(client(&server).current_iteration(&team()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn linked_items_fetches_every_referenced_id_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(
                "/acme/Apollo/Core%20Team/_apis/work/teamsettings/iterations/it-7/workitems",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "workItemRelations": [
                    { "rel": null, "source": null, "target": { "id": 1, "url": "u" } },
                    { "rel": "System.LinkTypes.Hierarchy-Forward", "source": { "id": 1 }, "target": { "id": 2 } }
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/acme/_apis/wit/workitemsbatch"))
            .and(body_partial_json(json!({ "ids": [1, 2] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [
                    { "id": 1, "fields": { "System.Title": "Story" }, "url": "https://x/_apis/wit/workItems/1" },
                    null
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let linked = client(&server).linked_items(&team(), &iteration()).await.unwrap();
        assert_eq!(linked.links.len(), 2);
        assert_eq!(linked.links[1].source_id(), Some(1));
        assert_eq!(linked.items.len(), 2);
        assert!(linked.items[1].is_none());
    }

    #[tokio::test]
    async fn empty_iteration_skips_batch_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(
                "/acme/Apollo/Core%20Team/_apis/work/teamsettings/iterations/it-7/workitems",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "workItemRelations": [] })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let linked = client(&server).linked_items(&team(), &iteration()).await.unwrap();
        assert!(linked.links.is_empty());
        assert!(linked.items.is_empty());
    }

    #[tokio::test]
    async fn chart_burndown_is_base64_encoded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(
                "/acme/Apollo/Core%20Team/_apis/work/iterations/it-7/chartimages/burndown",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x89, b'P', b'N', b'G']))
            .mount(&server)
            .await;

        let image = client(&server)
            .burndown_image(&team(), &iteration(), false)
            .await
            .unwrap();
        assert_eq!(image.as_deref(), Some("iVBORw=="));
    }

    #[tokio::test]
    async fn custom_burndown_without_credentials_is_absent() {
        let server = MockServer::start().await;
        let image = client(&server)
            .burndown_image(&team(), &iteration(), true)
            .await
            .unwrap();
        assert!(image.is_none());
    }

    #[tokio::test]
    async fn rejected_request_surfaces_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = client(&server).resolve_team("Apollo", "Core").await.unwrap_err();
        assert!(err.to_string().contains("rejected"));
    }

    #[test]
    fn analytics_url_escapes_names_and_path() {
        let server_uri = "https://dev.azure.com";
        let service = TrackingServiceConfig {
            base_url: server_uri.into(),
            ..TrackingServiceConfig::default()
        };
        let client =
            AzureDevOpsClient::new(&service, &BrowserConfig::default(), &tracking()).unwrap();
        assert_eq!(
            client.analytics_url(&team(), &iteration()),
            "https://dev.azure.com/acme/Apollo/_sprints/analytics/Core%20Team/Apollo/Sprint%207?fullScreen=true"
        );
    }

    #[test]
    fn missing_token_is_rejected() {
        let mut config = tracking();
        config.authentication = Some(TrackingAuthentication::default());
        let result = AzureDevOpsClient::new(
            &TrackingServiceConfig::default(),
            &BrowserConfig::default(),
            &config,
        );
        assert!(result.is_err());
    }
}
