use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{NotFoundError, ResourceKind, SliceQuery, Testbed};
use crate::models::slice::{SliceRecord, SliceSelector, SliceSubmission};
use crate::models::Record;

/// In-memory testbed for exercising tools and handlers without a network
#[derive(Default)]
pub struct FakeTestbed {
    resources: Mutex<HashMap<ResourceKind, Vec<Record>>>,
    slices: Mutex<Vec<SliceRecord>>,
    failure: Mutex<Option<String>>,
    pub submissions: Mutex<Vec<SliceSubmission>>,
    pub tokens: Mutex<Vec<Option<String>>>,
    pub resource_calls: AtomicUsize,
}

impl FakeTestbed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resources(self, kind: ResourceKind, records: Value) -> Self {
        let records = records
            .as_array()
            .map(|items| items.iter().filter_map(|v| v.as_object().cloned()).collect())
            .unwrap_or_default();
        self.resources.lock().unwrap().insert(kind, records);
        self
    }

    pub fn with_slice(self, slice: SliceRecord) -> Self {
        self.slices.lock().unwrap().push(slice);
        self
    }

    /// Make every call fail with an upstream error
    pub fn failing(self, message: &str) -> Self {
        *self.failure.lock().unwrap() = Some(message.to_string());
        self
    }

    pub fn slice(&self, id: &str) -> Option<SliceRecord> {
        self.slices.lock().unwrap().iter().find(|s| s.id == id).cloned()
    }

    fn record_call(&self, token: Option<&str>) -> Result<()> {
        self.tokens.lock().unwrap().push(token.map(String::from));
        match self.failure.lock().unwrap().as_ref() {
            Some(msg) => Err(anyhow::anyhow!("{}", msg)),
            None => Ok(()),
        }
    }

    fn with_slice_mut<T>(&self, slice_id: &str, f: impl FnOnce(&mut SliceRecord) -> T) -> Result<T> {
        let mut slices = self.slices.lock().unwrap();
        let slice = slices
            .iter_mut()
            .find(|s| s.id == slice_id)
            .ok_or_else(|| NotFoundError::new("slice", slice_id))?;
        Ok(f(slice))
    }
}

#[async_trait]
impl Testbed for FakeTestbed {
    async fn list_resources(
        &self,
        token: Option<&str>,
        kind: ResourceKind,
        limit: usize,
    ) -> Result<Vec<Record>> {
        self.record_call(token)?;
        self.resource_calls.fetch_add(1, Ordering::SeqCst);
        let resources = self.resources.lock().unwrap();
        Ok(resources
            .get(&kind)
            .map(|records| records.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn create_slice(&self, token: Option<&str>, submission: &SliceSubmission) -> Result<String> {
        self.record_call(token)?;
        let id = format!("slice-{}", self.slices.lock().unwrap().len() + 1);
        self.slices.lock().unwrap().push(SliceRecord {
            id: id.clone(),
            name: submission.name.clone(),
            state: Some("Configuring".to_string()),
            lease_start_time: submission.lease_start_time.clone(),
            lease_end_time: submission.lease_end_time.clone(),
            graph: submission.graph.clone(),
        });
        self.submissions.lock().unwrap().push(submission.clone());
        Ok(id)
    }

    async fn get_slice(
        &self,
        token: Option<&str>,
        selector: &SliceSelector,
    ) -> Result<Option<SliceRecord>> {
        self.record_call(token)?;
        let slices = self.slices.lock().unwrap();
        Ok(slices
            .iter()
            .find(|s| match selector {
                SliceSelector::Id(id) => &s.id == id,
                SliceSelector::Name(name) => &s.name == name,
            })
            .cloned())
    }

    async fn modify_slice(
        &self,
        token: Option<&str>,
        slice_id: &str,
        submission: &SliceSubmission,
    ) -> Result<()> {
        self.record_call(token)?;
        self.with_slice_mut(slice_id, |s| {
            s.graph = submission.graph.clone();
            s.state = Some("ModifyOK".to_string());
        })?;
        self.submissions.lock().unwrap().push(submission.clone());
        Ok(())
    }

    async fn accept_modify(&self, token: Option<&str>, slice_id: &str) -> Result<Value> {
        self.record_call(token)?;
        self.with_slice_mut(slice_id, |s| {
            s.state = Some("StableOK".to_string());
            json!({"id": s.id, "name": s.name, "state": "StableOK"})
        })
    }

    async fn renew_slice(&self, token: Option<&str>, slice_id: &str, lease_end_time: &str) -> Result<()> {
        self.record_call(token)?;
        self.with_slice_mut(slice_id, |s| {
            s.lease_end_time = Some(lease_end_time.to_string());
        })
    }

    async fn delete_slice(&self, token: Option<&str>, slice_id: &str) -> Result<()> {
        self.record_call(token)?;
        self.with_slice_mut(slice_id, |s| {
            s.state = Some("Dead".to_string());
        })
    }

    async fn list_slices(&self, token: Option<&str>, query: &SliceQuery) -> Result<Vec<Record>> {
        self.record_call(token)?;
        let slices = self.slices.lock().unwrap();
        Ok(slices
            .iter()
            .filter(|s| {
                let state = s.state.as_deref().unwrap_or_default();
                !query.exclude_states.iter().any(|x| x == state)
            })
            .take(query.limit)
            .map(|s| {
                let mut record = Record::new();
                record.insert("id".into(), json!(s.id));
                record.insert("name".into(), json!(s.name));
                record.insert("state".into(), json!(s.state));
                record.insert("lease_end_time".into(), json!(s.lease_end_time));
                record
            })
            .collect())
    }
}
