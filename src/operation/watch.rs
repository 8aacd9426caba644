//! Watch flow.

use futures::stream::{self, BoxStream, StreamExt};
use tracing::info;

use crate::engine::Engine;
use crate::error::Result;
use crate::runtime::{WatchEvent, WatchRequest};

use super::request::Request;

impl Engine {
    pub(crate) async fn run_watch(&self, request: &Request) -> Result<BoxStream<'static, WatchEvent>> {
        let spec = request.validate_spec()?;
        self.registry.ensure_supported(&spec.resources)?;

        let mut streams = Vec::with_capacity(spec.len());
        for resource in &spec.resources {
            let runtime = self.registry.get(resource.resource_type)?;
            let events = runtime
                .watch(WatchRequest {
                    resource: resource.clone(),
                })
                .await?;
            streams.push(events);
        }

        info!(
            "Watching {} resources of {}/{}",
            streams.len(),
            request.project,
            request.workspace
        );
        Ok(stream::select_all(streams).boxed())
    }
}
