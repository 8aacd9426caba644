//! In-memory runtime used by the engine tests.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::RuntimeError;
use crate::model::Resource;

use super::adapter::{
    ApplyRequest, DeleteRequest, ImportRequest, ReadRequest, Runtime, WatchEvent, WatchEventKind,
    WatchRequest,
};

/// Runtime keeping live resources in memory and recording every call.
#[derive(Debug, Default)]
pub struct FakeRuntime {
    live: Mutex<BTreeMap<String, Resource>>,
    calls: Mutex<Vec<String>>,
    fail_on: HashSet<String>,
    panic_on: HashSet<String>,
    delays: HashMap<String, Duration>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the real apply of `id` fail.
    pub fn failing_on(mut self, id: &str) -> Self {
        self.fail_on.insert(id.to_string());
        self
    }

    /// Makes any apply of `id` panic.
    pub fn panicking_on(mut self, id: &str) -> Self {
        self.panic_on.insert(id.to_string());
        self
    }

    /// Delays every call touching `id`.
    pub fn delayed(mut self, id: &str, delay: Duration) -> Self {
        self.delays.insert(id.to_string(), delay);
        self
    }

    /// Seeds a live resource as if it already existed.
    pub fn with_live(self, resource: Resource) -> Self {
        let converged = Self::converge(&resource);
        self.live.lock().unwrap().insert(resource.id.clone(), converged);
        self
    }

    pub fn live(&self, id: &str) -> Option<Resource> {
        self.live.lock().unwrap().get(id).cloned()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls that mutate infrastructure.
    pub fn mutating_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with("apply:") || c.starts_with("delete:") || c.starts_with("import:"))
            .collect()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    async fn pause(&self, id: &str) {
        if let Some(delay) = self.delays.get(id) {
            tokio::time::sleep(*delay).await;
        }
    }

    /// What the resource looks like once applied: a computed `uid` is added.
    fn converge(planned: &Resource) -> Resource {
        let mut converged = planned.clone();
        if let Value::Object(map) = &mut converged.attributes {
            map.insert(String::from("uid"), json!(format!("uid-{}", planned.id)));
        }
        converged
    }
}

#[async_trait]
impl Runtime for FakeRuntime {
    async fn apply(&self, request: ApplyRequest) -> Result<Resource, RuntimeError> {
        let id = request.planned.id.clone();
        self.pause(&id).await;
        assert!(!self.panic_on.contains(&id), "runtime panicked applying {id}");

        if request.dry_run {
            self.record(format!("dry_run:{id}"));
            return Ok(Self::converge(&request.planned));
        }

        self.record(format!("apply:{id}"));
        if self.fail_on.contains(&id) {
            return Err(RuntimeError::adapter("apply", id, "injected failure"));
        }

        let converged = Self::converge(&request.planned);
        self.live.lock().unwrap().insert(id, converged.clone());
        Ok(converged)
    }

    async fn read(&self, request: ReadRequest) -> Result<Option<Resource>, RuntimeError> {
        let Some(id) = request
            .planned
            .as_ref()
            .or(request.prior.as_ref())
            .map(|r| r.id.clone())
        else {
            return Ok(None);
        };
        self.pause(&id).await;
        self.record(format!("read:{id}"));
        Ok(self.live.lock().unwrap().get(&id).cloned())
    }

    async fn delete(&self, request: DeleteRequest) -> Result<(), RuntimeError> {
        let id = request.resource.id;
        self.pause(&id).await;
        self.record(format!("delete:{id}"));
        self.live.lock().unwrap().remove(&id);
        Ok(())
    }

    async fn import(&self, request: ImportRequest) -> Result<Resource, RuntimeError> {
        let id = request.planned.id.clone();
        self.record(format!("import:{id}"));
        self.live
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| RuntimeError::EmptyResponse {
                operation: "import",
                id,
            })
    }

    async fn watch(
        &self,
        request: WatchRequest,
    ) -> Result<BoxStream<'static, WatchEvent>, RuntimeError> {
        let id = request.resource.id.clone();
        let current = self.live(&id);
        let event = WatchEvent {
            resource_id: id,
            kind: if current.is_some() {
                WatchEventKind::Added
            } else {
                WatchEventKind::Deleted
            },
            resource: current,
        };
        Ok(stream::iter(vec![event]).boxed())
    }
}
