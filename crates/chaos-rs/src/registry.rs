//! Remote registry (control plane) client
//!
//! The control plane exposes a GraphQL endpoint at `<endpoint>/api/query`.
//! Only the three calls needed for agent provisioning are implemented.

use crate::error::ChaosError;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

const LIST_INFRAS: &str = r#"query listInfras($projectID: ID!, $request: ListInfraRequest) {
  listInfras(projectID: $projectID, request: $request) {
    totalNoOfInfras
    infras { infraID name isActive }
  }
}"#;

const REGISTER_INFRA: &str = r#"mutation registerInfra($projectID: ID!, $request: RegisterInfraRequest!) {
  registerInfra(projectID: $projectID, request: $request) {
    token
    infraID
    name
  }
}"#;

const DELETE_INFRA: &str = r#"mutation deleteInfra($projectID: ID!, $infraID: String!) {
  deleteInfra(projectID: $projectID, infraID: $infraID)
}"#;

/// Everything the control plane needs to register a new agent
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfraDescriptor {
    #[serde(skip)]
    pub project_id: String,
    pub name: String,
    pub description: String,
    pub platform_name: String,
    #[serde(rename = "environmentID", skip_serializing_if = "Option::is_none")]
    pub environment_id: Option<String>,
    pub infrastructure_type: String,
    pub infra_scope: String,
    pub infra_namespace: String,
    pub service_account: String,
    pub infra_ns_exists: bool,
    pub infra_sa_exists: bool,
    pub skip_ssl: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<String>,
}

/// Result of a successful registration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationToken {
    pub token: String,
    #[serde(rename = "infraID")]
    pub infra_id: String,
    pub name: String,
}

/// Registry operations used during provisioning
#[async_trait]
pub trait RegistryApi: Send + Sync {
    /// Names of all agents registered under a project
    async fn list_agent_names(&self, project_id: &str) -> Result<Vec<String>, ChaosError>;

    /// Register a new agent
    async fn register_agent(
        &self,
        descriptor: &InfraDescriptor,
    ) -> Result<RegistrationToken, ChaosError>;

    /// Remove a registered agent
    async fn deregister_agent(&self, project_id: &str, infra_id: &str) -> Result<(), ChaosError>;
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphqlErrorMessage>,
}

#[derive(Debug, Deserialize)]
struct GraphqlErrorMessage {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListInfrasData {
    list_infras: ListInfrasPayload,
}

#[derive(Debug, Deserialize)]
struct ListInfrasPayload {
    #[serde(default)]
    infras: Vec<InfraEntry>,
}

#[derive(Debug, Deserialize)]
struct InfraEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterInfraData {
    register_infra: RegistrationToken,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteInfraData {
    #[allow(dead_code)]
    delete_infra: String,
}

/// Unwrap a GraphQL envelope into its data, turning `errors` into a typed error
fn into_data<T>(response: GraphqlResponse<T>, subject: &str) -> Result<T, ChaosError> {
    if !response.errors.is_empty() {
        let message = response
            .errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");

        if message.to_lowercase().contains("already exists") {
            return Err(ChaosError::AlreadyExists {
                kind: "chaos infrastructure",
                name: subject.to_string(),
            });
        }
        return Err(ChaosError::Registry(message));
    }

    response
        .data
        .ok_or_else(|| ChaosError::Registry("empty response".to_string()))
}

/// `RegistryApi` over the control plane's GraphQL endpoint
pub struct GraphqlRegistry {
    http: reqwest::Client,
    endpoint: String,
    token: String,
}

impl GraphqlRegistry {
    /// Build a client for `endpoint` authenticating with a bearer `token`
    pub fn new(endpoint: &str, token: &str, skip_ssl: bool) -> Result<Self, ChaosError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .danger_accept_invalid_certs(skip_ssl)
            .build()?;

        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
        subject: &str,
    ) -> Result<T, ChaosError> {
        let url = format!("{}/api/query", self.endpoint);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &url, &body));
        }

        let envelope: GraphqlResponse<T> = response.json().await?;
        into_data(envelope, subject)
    }
}

#[async_trait]
impl RegistryApi for GraphqlRegistry {
    async fn list_agent_names(&self, project_id: &str) -> Result<Vec<String>, ChaosError> {
        let data: ListInfrasData = self
            .execute(
                LIST_INFRAS,
                json!({ "projectID": project_id, "request": {} }),
                project_id,
            )
            .await?;

        let names: Vec<String> = data
            .list_infras
            .infras
            .into_iter()
            .map(|i| i.name)
            .collect();
        tracing::debug!(project_id, count = names.len(), "Listed agents");
        Ok(names)
    }

    async fn register_agent(
        &self,
        descriptor: &InfraDescriptor,
    ) -> Result<RegistrationToken, ChaosError> {
        let data: RegisterInfraData = self
            .execute(
                REGISTER_INFRA,
                json!({ "projectID": descriptor.project_id, "request": descriptor }),
                &descriptor.name,
            )
            .await?;

        tracing::info!(
            project_id = %descriptor.project_id,
            infra_id = %data.register_infra.infra_id,
            "Registered chaos infrastructure"
        );
        Ok(data.register_infra)
    }

    async fn deregister_agent(&self, project_id: &str, infra_id: &str) -> Result<(), ChaosError> {
        let _: DeleteInfraData = self
            .execute(
                DELETE_INFRA,
                json!({ "projectID": project_id, "infraID": infra_id }),
                infra_id,
            )
            .await?;
        tracing::info!(project_id, infra_id, "Deregistered chaos infrastructure");
        Ok(())
    }
}

/// Map a non-success HTTP status to an error
fn status_error(status: StatusCode, url: &str, body: &str) -> ChaosError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ChaosError::Unauthorized(format!("HTTP {} from {}", status, url))
        }
        _ => ChaosError::Registry(format!("HTTP {} from {}: {}", status, url, body.trim())),
    }
}
