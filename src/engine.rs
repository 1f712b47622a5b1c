//! Pass scheduling and preview publishing
//!
//! [`Engine`] is the handle the editor talks to. It owns the graph, applies
//! mutations under a single lock and turns bursts of change notifications
//! into one trailing evaluation pass. Passes run on a copy of the graph; a
//! pass that finishes after the graph has changed again is thrown away
//! instead of being published.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{EdgeRejected, EvaluationError, GraphError, SnapshotError};
use crate::executor::{Executor, PassReport};
use crate::graph::NodeGraph;
use crate::image_data::ImageData;
use crate::nodes::{NodeProperties, NodeType, Position};
use crate::snapshot::GraphSnapshot;

/// Receiver for computed previews.
///
/// Callbacks run while the engine holds its graph lock, so a pass is never
/// published after a mutation lands. A sink must not call back into the
/// engine; hand the work to another task instead.
pub trait PreviewSink: Send + Sync {
    /// Called once per node per completed pass, in evaluation order.
    /// `None` means the node failed or produced no image.
    fn on_node_output(&self, node_id: Uuid, output: Option<&ImageData>);

    /// Called after every node of a pass has been published
    fn on_pass_complete(&self, _report: &PassReport) {}
}

/// Sink that drops everything
pub struct NullSink;

impl PreviewSink for NullSink {
    fn on_node_output(&self, _node_id: Uuid, _output: Option<&ImageData>) {}
}

struct Shared {
    graph: Mutex<NodeGraph>,
    /// Bumped on every mutation that can change outputs
    generation: AtomicU64,
    /// Set while a pass request is waiting to be picked up
    pending: AtomicBool,
    wake: Notify,
    shutdown: AtomicBool,
    /// Serializes passes between the worker and `evaluate_now`
    executor: tokio::sync::Mutex<Executor>,
    config: EngineConfig,
    sink: Arc<dyn PreviewSink>,
    published: watch::Sender<u64>,
}

/// Shared handle to a graph and its evaluation worker
#[derive(Clone)]
pub struct Engine {
    shared: Arc<Shared>,
}

impl Engine {
    pub fn new(config: EngineConfig, sink: Arc<dyn PreviewSink>) -> Self {
        Self::with_graph(NodeGraph::new(), config, sink)
    }

    pub fn with_graph(graph: NodeGraph, config: EngineConfig, sink: Arc<dyn PreviewSink>) -> Self {
        let (published, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                graph: Mutex::new(graph),
                generation: AtomicU64::new(0),
                pending: AtomicBool::new(false),
                wake: Notify::new(),
                shutdown: AtomicBool::new(false),
                executor: tokio::sync::Mutex::new(Executor::from_config(&config)),
                config,
                sink,
                published,
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Start the background worker that serves `request_evaluation`.
    /// Must be called from within a tokio runtime.
    pub fn spawn(&self) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            log::debug!("Evaluation worker started");
            loop {
                shared.wake.notified().await;
                if shared.shutdown.load(Ordering::Acquire) {
                    break;
                }

                let debounce = shared.config.debounce();
                if debounce.is_zero() {
                    tokio::task::yield_now().await;
                } else {
                    tokio::time::sleep(debounce).await;
                }

                // Requests from here on need another pass
                shared.pending.store(false, Ordering::Release);
                let _ = shared.run_pass().await;
            }
            log::debug!("Evaluation worker stopped");
        })
    }

    /// Stop the worker after its current pass
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.wake.notify_one();
    }

    /// Ask for a pass over the current graph. Requests made before the
    /// worker picks one up collapse into a single pass.
    pub fn request_evaluation(&self) {
        if !self.shared.pending.swap(true, Ordering::AcqRel) {
            self.shared.wake.notify_one();
        }
    }

    /// Run one pass right away and publish it. If the graph changes while
    /// the pass is running, the pass is repeated on the new graph.
    pub async fn evaluate_now(&self) -> Result<PassReport, EvaluationError> {
        loop {
            if let Some(result) = self.shared.run_pass().await {
                return result;
            }
        }
    }

    /// Number of passes published so far
    pub fn passes_published(&self) -> u64 {
        *self.shared.published.borrow()
    }

    /// Watch the published pass counter
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.published.subscribe()
    }

    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::Acquire)
    }

    /// Copy of the current graph
    pub fn graph(&self) -> NodeGraph {
        self.shared.graph.lock().clone()
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        self.shared.graph.lock().to_snapshot()
    }

    /// Replace the whole graph with a restored snapshot
    pub fn load_snapshot(&self, snapshot: &GraphSnapshot) -> Result<(), SnapshotError> {
        let graph = snapshot.to_graph()?;
        self.mutate(|g| *g = graph);
        Ok(())
    }

    pub fn add_node(&self, node_type: NodeType, position: Position) -> Uuid {
        self.mutate(|g| g.add_node(node_type, position))
    }

    pub fn add_node_named(&self, type_name: &str, position: Position) -> Result<Uuid, GraphError> {
        let node_type = type_name.parse::<NodeType>()?;
        Ok(self.add_node(node_type, position))
    }

    pub fn remove_node(&self, node_id: Uuid) -> bool {
        self.mutate_if(|g| {
            let removed = g.remove_node(node_id);
            (removed, removed)
        })
    }

    pub fn add_edge(&self, from: Uuid, from_port: &str, to: Uuid, to_port: &str) -> Result<Uuid, EdgeRejected> {
        let result = self.mutate_if(|g| {
            let result = g.add_connection(from, from_port, to, to_port);
            (result.is_ok(), result)
        });
        if let Err(e) = &result {
            log::warn!("Connection {}.{} -> {}.{} rejected: {}", from, from_port, to, to_port, e);
        }
        result
    }

    pub fn remove_edge(&self, edge_id: Uuid) -> bool {
        self.mutate_if(|g| {
            let removed = g.remove_connection(edge_id);
            (removed, removed)
        })
    }

    pub fn set_properties(&self, node_id: Uuid, properties: NodeProperties) -> Result<(), GraphError> {
        self.mutate_if(|g| {
            let result = g.set_properties(node_id, properties);
            (result.is_ok(), result)
        })
    }

    /// Move a node. Positions don't affect outputs, so no pass is requested.
    pub fn set_position(&self, node_id: Uuid, position: Position) -> Result<(), GraphError> {
        self.shared.graph.lock().set_position(node_id, position)
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut NodeGraph) -> T) -> T {
        self.mutate_if(|g| (true, f(g)))
    }

    /// Apply `f` under the graph lock. When it reports a change the
    /// generation is bumped before the lock is released, then a pass is
    /// requested.
    fn mutate_if<T>(&self, f: impl FnOnce(&mut NodeGraph) -> (bool, T)) -> T {
        let (changed, out) = {
            let mut graph = self.shared.graph.lock();
            let (changed, out) = f(&mut graph);
            if changed {
                self.shared.generation.fetch_add(1, Ordering::AcqRel);
            }
            (changed, out)
        };
        if changed {
            self.request_evaluation();
        }
        out
    }
}

impl Shared {
    /// Evaluate a copy of the graph. `None` means the graph changed while
    /// the pass ran and nothing was published.
    async fn run_pass(&self) -> Option<Result<PassReport, EvaluationError>> {
        let mut executor = self.executor.lock().await;
        let (graph, generation) = {
            let graph = self.graph.lock();
            (graph.clone(), self.generation.load(Ordering::Acquire))
        };

        let result = executor.execute(&graph).await;
        self.publish(generation, result)
    }

    fn publish(
        &self,
        generation: u64,
        result: Result<PassReport, EvaluationError>,
    ) -> Option<Result<PassReport, EvaluationError>> {
        // Mutations bump the generation under this lock, so none can land
        // between the check and the last sink callback
        let _graph = self.graph.lock();
        if self.generation.load(Ordering::Acquire) != generation {
            log::warn!("Graph changed during evaluation, discarding stale pass");
            return None;
        }

        // A cycle publishes nothing; previews keep showing the last pass
        if let Ok(report) = &result {
            for (node_id, output) in report.published() {
                self.sink.on_node_output(node_id, output);
            }
            self.sink.on_pass_complete(report);
            self.published.send_modify(|n| *n += 1);
        }
        Some(result)
    }
}
