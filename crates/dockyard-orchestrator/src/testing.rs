//! In-memory engine and sink for exercising the orchestrator without a
//! Docker daemon.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use dockyard_common::{
    short_container_id, short_image_id, BuiltImage, ContainerEngine, ContainerStatus,
    ContainerSummary, CreateContainerRequest, CreatedContainer, EngineError, EngineResult,
    StatsSnapshot,
};
use futures::stream::{self, BoxStream, StreamExt};

use crate::sink::MetricsSink;

/// Engine operations that can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    Build,
    RemoveImage,
    Create,
    Start,
    Kill,
    Status,
    RemoveContainer,
    List,
}

/// What a stream does once its scripted items are exhausted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StreamTail {
    #[default]
    Close,
    /// Stay pending forever, like a followed stream of a live container.
    Hold,
    Fail,
}

#[derive(Debug, Clone)]
struct MockContainer {
    name: String,
    status: ContainerStatus,
}

#[derive(Default)]
struct MockState {
    next_id: u64,
    images: HashMap<String, BuiltImage>,
    containers: HashMap<String, MockContainer>,
    failures: HashSet<MockOperation>,
    stats: HashMap<String, Vec<StatsSnapshot>>,
    logs: HashMap<String, Vec<String>>,
    tail: StreamTail,
    create_requests: Vec<CreateContainerRequest>,
    stats_requests: Vec<String>,
    log_requests: Vec<(String, i64)>,
}

impl MockState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn check(&self, op: MockOperation) -> EngineResult<()> {
        if self.failures.contains(&op) {
            Err(EngineError::Api(format!("mock {op:?} failure")))
        } else {
            Ok(())
        }
    }

    fn container_mut(&mut self, id: &str) -> EngineResult<&mut MockContainer> {
        self.containers
            .get_mut(id)
            .ok_or_else(|| EngineError::NotFound(format!("No such container: {id}")))
    }
}

/// Hand-rolled [`ContainerEngine`] keeping images and containers in memory.
///
/// Clones share state, so a test can keep a handle while the orchestrator
/// owns another.
#[derive(Clone, Default)]
pub struct MockEngine {
    state: Arc<Mutex<MockState>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Default::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn fail(&self, op: MockOperation) {
        self.state().failures.insert(op);
    }

    pub fn recover(&self, op: MockOperation) {
        self.state().failures.remove(&op);
    }

    pub fn set_stream_tail(&self, tail: StreamTail) {
        self.state().tail = tail;
    }

    /// Registers a container the orchestrator did not create.
    pub fn add_container(&self, name: &str, status: ContainerStatus) -> String {
        let mut state = self.state();
        let id = format!("{:064x}", state.next_id());
        state.containers.insert(
            id.clone(),
            MockContainer {
                name: name.to_string(),
                status,
            },
        );
        id
    }

    pub fn set_status(&self, container_id: &str, status: ContainerStatus) {
        if let Some(container) = self.state().containers.get_mut(container_id) {
            container.status = status;
        }
    }

    pub fn script_stats(&self, container_id: &str, snapshots: Vec<StatsSnapshot>) {
        self.state()
            .stats
            .insert(container_id.to_string(), snapshots);
    }

    pub fn script_logs<I, L>(&self, container_id: &str, lines: I)
    where
        I: IntoIterator<Item = L>,
        L: Into<String>,
    {
        self.state().logs.insert(
            container_id.to_string(),
            lines.into_iter().map(Into::into).collect(),
        );
    }

    pub fn image_ids(&self) -> Vec<String> {
        self.state().images.keys().cloned().collect()
    }

    pub fn container_ids(&self) -> Vec<String> {
        self.state().containers.keys().cloned().collect()
    }

    pub fn last_create_request(&self) -> Option<CreateContainerRequest> {
        self.state().create_requests.last().cloned()
    }

    pub fn stats_requests(&self) -> Vec<String> {
        self.state().stats_requests.clone()
    }

    pub fn log_requests(&self) -> Vec<(String, i64)> {
        self.state().log_requests.clone()
    }

    fn scripted<T: Send + 'static>(items: Vec<T>, tail: StreamTail) -> BoxStream<'static, EngineResult<T>> {
        let scripted = stream::iter(items.into_iter().map(Ok));
        match tail {
            StreamTail::Close => scripted.boxed(),
            StreamTail::Hold => scripted.chain(stream::pending()).boxed(),
            StreamTail::Fail => scripted
                .chain(stream::once(async {
                    Err(EngineError::Stream("mock stream failure".to_string()))
                }))
                .boxed(),
        }
    }
}

#[async_trait]
impl ContainerEngine for MockEngine {
    async fn build_image(&self, _context: &Path, tag: &str) -> EngineResult<BuiltImage> {
        let mut state = self.state();
        if state.failures.contains(&MockOperation::Build) {
            return Err(EngineError::Build("mock build failure".to_string()));
        }
        let id = format!("sha256:{:064x}", state.next_id());
        let image = BuiltImage {
            short_id: short_image_id(&id),
            id: id.clone(),
            tags: vec![tag.to_string()],
        };
        state.images.insert(id, image.clone());
        Ok(image)
    }

    async fn remove_image(&self, image_id: &str) -> EngineResult<()> {
        let mut state = self.state();
        state.check(MockOperation::RemoveImage)?;
        state
            .images
            .remove(image_id)
            .map(|_| ())
            .ok_or_else(|| EngineError::NotFound(format!("No such image: {image_id}")))
    }

    async fn create_container(
        &self,
        request: CreateContainerRequest,
    ) -> EngineResult<CreatedContainer> {
        let mut state = self.state();
        state.create_requests.push(request.clone());
        state.check(MockOperation::Create)?;

        let known = state.images.contains_key(&request.image)
            || state
                .images
                .values()
                .any(|image| image.tags.contains(&request.image));
        if !known {
            return Err(EngineError::NotFound(format!(
                "No such image: {}",
                request.image
            )));
        }
        if let Some(name) = &request.name {
            if state.containers.values().any(|c| &c.name == name) {
                return Err(EngineError::Api(format!(
                    "Conflict. The container name \"/{name}\" is already in use"
                )));
            }
        }

        let n = state.next_id();
        let id = format!("{n:064x}");
        let name = request
            .name
            .unwrap_or_else(|| format!("mock_container_{n}"));
        state.containers.insert(
            id.clone(),
            MockContainer {
                name: name.clone(),
                status: ContainerStatus::Created,
            },
        );
        Ok(CreatedContainer {
            short_id: short_container_id(&id),
            id,
            name,
            status: ContainerStatus::Created,
        })
    }

    async fn start_container(&self, container_id: &str) -> EngineResult<()> {
        let mut state = self.state();
        state.check(MockOperation::Start)?;
        state.container_mut(container_id)?.status = ContainerStatus::Running;
        Ok(())
    }

    async fn kill_container(&self, container_id: &str) -> EngineResult<()> {
        let mut state = self.state();
        state.check(MockOperation::Kill)?;
        let container = state.container_mut(container_id)?;
        if !container.status.is_running() {
            return Err(EngineError::Api(format!(
                "Container {container_id} is not running"
            )));
        }
        container.status = ContainerStatus::Exited;
        Ok(())
    }

    async fn container_status(&self, container_id: &str) -> EngineResult<ContainerStatus> {
        let mut state = self.state();
        state.check(MockOperation::Status)?;
        Ok(state.container_mut(container_id)?.status)
    }

    async fn remove_container(&self, container_id: &str) -> EngineResult<()> {
        let mut state = self.state();
        state.check(MockOperation::RemoveContainer)?;
        state
            .containers
            .remove(container_id)
            .map(|_| ())
            .ok_or_else(|| EngineError::NotFound(format!("No such container: {container_id}")))
    }

    async fn list_containers(&self) -> EngineResult<Vec<ContainerSummary>> {
        let state = self.state();
        state.check(MockOperation::List)?;
        Ok(state
            .containers
            .iter()
            .map(|(id, c)| ContainerSummary {
                id: id.clone(),
                name: c.name.clone(),
                status: c.status,
            })
            .collect())
    }

    fn stats_stream(&self, container_id: &str) -> BoxStream<'static, EngineResult<StatsSnapshot>> {
        let mut state = self.state();
        state.stats_requests.push(container_id.to_string());
        let items = state.stats.get(container_id).cloned().unwrap_or_default();
        Self::scripted(items, state.tail)
    }

    fn log_stream(&self, container_id: &str, since: i64) -> BoxStream<'static, EngineResult<String>> {
        let mut state = self.state();
        state.log_requests.push((container_id.to_string(), since));
        let items = state.logs.get(container_id).cloned().unwrap_or_default();
        Self::scripted(items, state.tail)
    }
}

/// Sink that keeps every line in memory. Clones share the buffers.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
    raw: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn raw(&self) -> Vec<String> {
        self.raw.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl MetricsSink for MemorySink {
    async fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
        Ok(())
    }

    async fn write_raw(&mut self, raw: &str) -> std::io::Result<()> {
        self.raw
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(raw.to_string());
        Ok(())
    }
}
