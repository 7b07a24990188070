//! Remote record service backend.
//!
//! Talks to a PostgREST-style API (as exposed by Supabase):
//!
//! ```text
//! GET    {url}/{table}?select=*&user_id=eq.{owner}&order=due_date.asc
//! POST   {url}/{table}                 body: [record]
//! PATCH  {url}/{table}?id=eq.{id}      body: partial record
//! DELETE {url}/{table}?id=eq.{id}
//! ```
//!
//! Writes ask for `Prefer: return=representation`, so the service answers
//! with the affected rows; an empty answer to PATCH or DELETE means the id
//! did not exist.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};

use crate::config::RemoteConfig;
use crate::error::{Error, Result};
use crate::gateway::TaskGateway;
use crate::task::{NewTask, Task, TaskPatch};

const PREFER_REPRESENTATION: &str = "return=representation";

/// Backend backed by a remote REST record service.
pub struct RemoteGateway {
    base_url: String,
    table: String,
    api_key: Option<String>,
    client: Client,
}

impl RemoteGateway {
    /// Create a gateway against `base_url` (the REST root) and `table`.
    pub fn new(
        base_url: impl Into<String>,
        table: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let mut base = base_url.into();
        while base.ends_with('/') {
            base.pop();
        }
        if base.is_empty() {
            return Err(Error::InvalidConfig("remote.url cannot be empty".to_string()));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base,
            table: table.into(),
            api_key,
            client,
        })
    }

    pub fn from_config(config: &RemoteConfig) -> Result<Self> {
        Self::new(
            config.url.trim(),
            config.table.trim(),
            config.api_key.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn table_url(&self) -> String {
        format!("{}/{}", self.base_url, self.table)
    }

    fn apply_auth(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => req
                .header("apikey", key)
                .header("Authorization", format!("Bearer {key}")),
            None => req,
        }
    }

    async fn send(&self, req: RequestBuilder, action: &str) -> Result<Response> {
        let resp = self.apply_auth(req).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        let body = body.trim();
        Err(Error::Backend(if body.is_empty() {
            format!("{action} failed: HTTP {status}")
        } else {
            format!("{action} failed: HTTP {status}: {body}")
        }))
    }

    async fn rows(&self, req: RequestBuilder, action: &str) -> Result<Vec<Task>> {
        let resp = self.send(req, action).await?;
        Ok(resp.json::<Vec<Task>>().await?)
    }
}

fn id_filter(id: &str) -> [(&'static str, String); 1] {
    [("id", format!("eq.{id}"))]
}

#[async_trait]
impl TaskGateway for RemoteGateway {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn fetch_all(&self, owner: &str) -> Result<Vec<Task>> {
        let req = self.client.get(self.table_url()).query(&[
            ("select", "*".to_string()),
            ("user_id", format!("eq.{owner}")),
            ("order", "due_date.asc".to_string()),
        ]);
        self.rows(req, "fetch").await
    }

    async fn create(&self, task: NewTask) -> Result<Task> {
        task.validate()?;
        let req = self
            .client
            .post(self.table_url())
            .header("Prefer", PREFER_REPRESENTATION)
            .json(&[task]);
        self.rows(req, "create")
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Backend("create returned no record".to_string()))
    }

    async fn update(&self, id: &str, patch: &TaskPatch) -> Result<Task> {
        patch.validate()?;
        let req = self
            .client
            .patch(self.table_url())
            .query(&id_filter(id))
            .header("Prefer", PREFER_REPRESENTATION)
            .json(patch);
        self.rows(req, "update")
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let req = self
            .client
            .delete(self.table_url())
            .query(&id_filter(id))
            .header("Prefer", PREFER_REPRESENTATION);
        if self.rows(req, "delete").await?.is_empty() {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }
}
