//! Remote persistence over the Treetrack REST API

use super::persistence::Persistence;
use crate::auth::session::SESSION_COOKIE;
use crate::store::{
    BulkChangeRequest, BulkChangeResponse, CreateDependencyRequest, CreateTaskRequest,
    DependencyNode, ProjectGraph, TaskNode, UpdateTaskRequest,
};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Project-scoped client for a remote server
#[derive(Clone)]
pub struct HttpPersistence {
    client: Client,
    base_url: String,
    project_id: i64,
    session_token: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl HttpPersistence {
    pub fn new(base_url: impl Into<String>, project_id: i64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            project_id,
            session_token: None,
        })
    }

    /// Authenticate requests with an existing session token
    pub fn with_session(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/projects/{}{}", self.base_url, self.project_id, path)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.session_token {
            Some(ref token) => builder.header(
                reqwest::header::COOKIE,
                format!("{SESSION_COOKIE}={token}"),
            ),
            None => builder,
        }
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.error)
            .unwrap_or(body);
        Err(anyhow!("server returned {status}: {message}"))
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = self
            .authed(builder)
            .send()
            .await
            .context("Request to Treetrack server failed")?;
        let response = Self::check(response).await?;
        response
            .json::<T>()
            .await
            .context("Failed to decode Treetrack response")
    }

    async fn send_empty(&self, builder: RequestBuilder) -> Result<()> {
        let response = self
            .authed(builder)
            .send()
            .await
            .context("Request to Treetrack server failed")?;
        Self::check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl Persistence for HttpPersistence {
    async fn load_graph(&self) -> Result<ProjectGraph> {
        // The snapshot endpoint also carries a checksum, which is ignored here
        self.send_json(self.client.get(self.url("/graph"))).await
    }

    async fn create_task(&self, req: &CreateTaskRequest) -> Result<TaskNode> {
        debug!(project_id = self.project_id, title = %req.title, "Creating remote task");
        self.send_json(self.client.post(self.url("/tasks")).json(req))
            .await
    }

    async fn update_task(&self, task_id: i64, req: &UpdateTaskRequest) -> Result<TaskNode> {
        self.send_json(
            self.client
                .patch(self.url(&format!("/tasks/{task_id}")))
                .json(req),
        )
        .await
    }

    async fn delete_task(&self, task_id: i64) -> Result<()> {
        self.send_empty(self.client.delete(self.url(&format!("/tasks/{task_id}"))))
            .await
    }

    async fn create_dependency(&self, from_task: i64, to_task: i64) -> Result<DependencyNode> {
        let body = CreateDependencyRequest { from_task, to_task };
        self.send_json(self.client.post(self.url("/dependencies")).json(&body))
            .await
    }

    async fn delete_dependency(&self, dependency_id: i64) -> Result<()> {
        self.send_empty(
            self.client
                .delete(self.url(&format!("/dependencies/{dependency_id}"))),
        )
        .await
    }

    async fn bulk_change(&self, req: &BulkChangeRequest) -> Result<BulkChangeResponse> {
        self.send_json(self.client.post(self.url("/bulk")).json(req))
            .await
    }
}
