use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;

use super::types::*;
use super::{NotFoundError, ResourceKind, SliceQuery, Testbed};
use crate::models::slice::{SliceRecord, SliceSelector, SliceSubmission};
use crate::models::Record;

/// Orchestrator API client
pub struct OrchestratorClient {
    base_url: String,
    client: Client,
}

impl OrchestratorClient {
    pub fn new(url: &str, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            base_url: url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, req: RequestBuilder, token: Option<&str>) -> RequestBuilder {
        let req = req.header("Accept", "application/json");
        match token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Turn a non-success response into an error carrying the orchestrator's message
    async fn check(resp: Response, action: &str) -> Result<Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.summary())
            .unwrap_or(body);
        Err(anyhow::anyhow!("Orchestrator {} error {}: {}", action, status, detail))
    }

    /// Helper to perform a GET that returns an envelope of items
    async fn list_envelope<T: serde::de::DeserializeOwned>(
        &self,
        token: Option<&str>,
        path: &str,
        query: &[(&str, String)],
        action: &str,
    ) -> Result<Vec<T>> {
        let resp = self
            .authorize(self.client.get(self.api_url(path)), token)
            .query(query)
            .send()
            .await?;
        let envelope: Envelope<T> = Self::check(resp, action).await?.json().await?;
        Ok(envelope.data)
    }

    /// Helper for slice actions addressed by id; 404 maps to a typed NotFoundError
    async fn slice_action(&self, req: RequestBuilder, slice_id: &str, action: &str) -> Result<Response> {
        let resp = req.send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(NotFoundError::new("slice", slice_id).into());
        }
        Self::check(resp, action).await
    }
}

#[async_trait]
impl Testbed for OrchestratorClient {
    async fn list_resources(
        &self,
        token: Option<&str>,
        kind: ResourceKind,
        limit: usize,
    ) -> Result<Vec<Record>> {
        self.list_envelope(
            token,
            &format!("/resources/{}", kind.as_str()),
            &[("limit", limit.to_string())],
            "resource list",
        )
        .await
    }

    async fn create_slice(&self, token: Option<&str>, submission: &SliceSubmission) -> Result<String> {
        let resp = self
            .authorize(self.client.post(self.api_url("/slices")), token)
            .json(submission)
            .send()
            .await?;
        let envelope: Envelope<CreatedSlice> = Self::check(resp, "create").await?.json().await?;
        envelope
            .into_first()
            .map(|created| created.id)
            .ok_or_else(|| anyhow::anyhow!("Orchestrator create returned no slice id"))
    }

    async fn get_slice(
        &self,
        token: Option<&str>,
        selector: &SliceSelector,
    ) -> Result<Option<SliceRecord>> {
        let req = match selector {
            SliceSelector::Id(id) => self.client.get(self.api_url(&format!("/slices/{}", id))),
            SliceSelector::Name(name) => self
                .client
                .get(self.api_url("/slices"))
                .query(&[("name", name.as_str()), ("as_self", "true")]),
        };
        let resp = self.authorize(req, token).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let envelope: Envelope<SliceRecord> = Self::check(resp, "get slice").await?.json().await?;
        Ok(envelope.into_first())
    }

    async fn modify_slice(
        &self,
        token: Option<&str>,
        slice_id: &str,
        submission: &SliceSubmission,
    ) -> Result<()> {
        let req = self
            .authorize(
                self.client.put(self.api_url(&format!("/slices/modify/{}", slice_id))),
                token,
            )
            .json(submission);
        self.slice_action(req, slice_id, "modify").await?;
        Ok(())
    }

    async fn accept_modify(&self, token: Option<&str>, slice_id: &str) -> Result<Value> {
        let req = self.authorize(
            self.client
                .post(self.api_url(&format!("/slices/modify/{}/accept", slice_id))),
            token,
        );
        let envelope: Envelope<AcceptResult> = self
            .slice_action(req, slice_id, "accept modify")
            .await?
            .json()
            .await?;
        Ok(envelope.into_first().unwrap_or(Value::Null))
    }

    async fn renew_slice(&self, token: Option<&str>, slice_id: &str, lease_end_time: &str) -> Result<()> {
        let req = self
            .authorize(
                self.client.post(self.api_url(&format!("/slices/renew/{}", slice_id))),
                token,
            )
            .json(&RenewBody { lease_end_time });
        self.slice_action(req, slice_id, "renew").await?;
        Ok(())
    }

    async fn delete_slice(&self, token: Option<&str>, slice_id: &str) -> Result<()> {
        let req = self.authorize(
            self.client
                .delete(self.api_url(&format!("/slices/delete/{}", slice_id))),
            token,
        );
        self.slice_action(req, slice_id, "delete").await?;
        Ok(())
    }

    async fn list_slices(&self, token: Option<&str>, query: &SliceQuery) -> Result<Vec<Record>> {
        let slices: Vec<Record> = self
            .list_envelope(
                token,
                "/slices",
                &[
                    ("as_self", query.as_self.to_string()),
                    ("limit", query.limit.to_string()),
                ],
                "slice list",
            )
            .await?;
        Ok(slices
            .into_iter()
            .filter(|s| {
                let state = s.get("state").and_then(Value::as_str).unwrap_or_default();
                !query.exclude_states.iter().any(|x| x == state)
            })
            .collect())
    }
}
