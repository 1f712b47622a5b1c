//! Node graph execution engine
//!
//! Executes the node graph in topological order, processing images through
//! connected nodes. One call to [`Executor::execute`] is one pass: every
//! node is computed at most once and the output cache is rebuilt from
//! scratch.

use std::collections::HashMap;
use std::time::Duration;

use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{ComputeError, EvaluationError};
use crate::graph::{Connection, NodeGraph};
use crate::image_data::ImageData;
use crate::nodes::{ComputeContext, Node, PortMap, IMAGE_PORT};

/// Result of one evaluation pass
#[derive(Debug, Clone, Default)]
pub struct PassReport {
    /// Nodes in the order they were evaluated
    pub order: Vec<Uuid>,
    /// Each node's image output, `None` when it failed or produced nothing
    pub outputs: HashMap<Uuid, Option<ImageData>>,
    /// Nodes whose compute step failed
    pub failures: HashMap<Uuid, ComputeError>,
}

impl PassReport {
    pub fn output(&self, node_id: Uuid) -> Option<&ImageData> {
        self.outputs.get(&node_id).and_then(Option::as_ref)
    }

    pub fn failed(&self, node_id: Uuid) -> bool {
        self.failures.contains_key(&node_id)
    }

    /// `(node, output)` pairs in evaluation order
    pub fn published(&self) -> impl Iterator<Item = (Uuid, Option<&ImageData>)> + '_ {
        self.order.iter().map(move |id| (*id, self.output(*id)))
    }
}

/// Execution context for running the node graph
pub struct Executor {
    /// Cached outputs from nodes, valid for the current pass only
    outputs: HashMap<Uuid, PortMap>,
    ctx: ComputeContext,
    timeout: Option<Duration>,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(ComputeContext::default())
    }
}

impl Executor {
    pub fn new(ctx: ComputeContext) -> Self {
        Self {
            outputs: HashMap::new(),
            ctx,
            timeout: None,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.compute_context()).with_timeout(config.compute_timeout())
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Execute the entire graph.
    ///
    /// A failing node is logged and recorded, and its outputs are treated as
    /// absent by downstream nodes; the pass carries on. Only a cycle aborts
    /// the pass, in which case nothing is computed.
    pub async fn execute(&mut self, graph: &NodeGraph) -> Result<PassReport, EvaluationError> {
        // Clear previous outputs
        self.outputs.clear();

        // Get topological order
        let order = graph.topological_order().map_err(|e| {
            log::error!("Evaluation aborted: {}", e);
            e
        })?;

        let mut incoming: HashMap<Uuid, Vec<&Connection>> = HashMap::new();
        for conn in graph.connections_iter() {
            incoming.entry(conn.to.node).or_default().push(conn);
        }

        let mut report = PassReport {
            order: order.clone(),
            ..Default::default()
        };

        // Execute each node in order
        for node_id in order {
            let Some(node) = graph.node(node_id) else {
                continue;
            };
            let inputs = self.gather_inputs(incoming.get(&node_id).map(Vec::as_slice).unwrap_or(&[]));

            match self.execute_node(node, &inputs).await {
                Ok(outputs) => {
                    log::debug!(
                        "Evaluated {} ({}) with {} input(s)",
                        node_id,
                        node.node_type(),
                        inputs.len()
                    );
                    report
                        .outputs
                        .insert(node_id, outputs.get(IMAGE_PORT).cloned());
                    self.outputs.insert(node_id, outputs);
                }
                Err(e) => {
                    log::error!("Compute error for node {} ({}): {}", node_id, node.node_type(), e);
                    report.outputs.insert(node_id, None);
                    report.failures.insert(node_id, e);
                }
            }
        }

        log::info!(
            "Evaluated {} node(s), {} failure(s)",
            report.order.len(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Execute a single node, bounded by the configured timeout. A node
    /// that times out finishes on the blocking pool and its result is dropped.
    async fn execute_node(&self, node: &Node, inputs: &PortMap) -> Result<PortMap, ComputeError> {
        let compute = node.properties.compute(inputs, &self.ctx);
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, compute)
                .await
                .map_err(|_| ComputeError::Timeout(limit.as_millis() as u64))?,
            None => compute.await,
        }
    }

    /// Collect upstream outputs for a node's connected input ports.
    /// Ports whose source failed or produced nothing stay absent.
    fn gather_inputs(&self, connections: &[&Connection]) -> PortMap {
        let mut inputs = PortMap::new();
        for conn in connections {
            if let Some(img) = self
                .outputs
                .get(&conn.from.node)
                .and_then(|out| out.get(&conn.from.port))
            {
                inputs.insert(conn.to.port.clone(), img.clone());
            }
        }
        inputs
    }

    /// Output of a node from the last pass
    pub fn output(&self, node_id: Uuid) -> Option<&ImageData> {
        self.outputs.get(&node_id).and_then(|out| out.get(IMAGE_PORT))
    }
}
