//! Saved graph format
//!
//! The layout matches what the browser studio writes to storage and to
//! exported `graph.json` files: nodes carry their type tag, canvas position
//! and raw parameters, edges name both endpoints by node id and port.
//!
//! The studio mints ids like `node_k3j9a1b`. Those are mapped to name-based
//! UUIDs on restore, so the same file always yields the same node ids.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EdgeRejected, SnapshotError};
use crate::graph::{Connection, Endpoint, NodeGraph};
use crate::nodes::{Node, NodeProperties, NodeType, Position};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotEndpoint {
    pub node_id: String,
    pub port: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEdge {
    pub id: String,
    pub from: SnapshotEndpoint,
    pub to: SnapshotEndpoint,
}

/// Canvas transform saved by the editor. Carried through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub world_scale: f32,
    pub world_x: f32,
    pub world_y: f32,
}

/// Full saved graph
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<SnapshotNode>,
    pub edges: Vec<SnapshotEdge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<Viewport>,
}

impl GraphSnapshot {
    /// Convert from internal NodeGraph format
    pub fn from_graph(graph: &NodeGraph) -> Self {
        let nodes = graph
            .nodes_iter()
            .map(|node| SnapshotNode {
                id: node.id.to_string(),
                node_type: node.node_type().name().to_string(),
                x: node.position.x,
                y: node.position.y,
                params: node.properties.to_value(),
            })
            .collect();

        let edges = graph
            .connections_iter()
            .map(|conn| SnapshotEdge {
                id: conn.id.to_string(),
                from: SnapshotEndpoint {
                    node_id: conn.from.node.to_string(),
                    port: conn.from.port.clone(),
                },
                to: SnapshotEndpoint {
                    node_id: conn.to.node.to_string(),
                    port: conn.to.port.clone(),
                },
            })
            .collect();

        Self {
            nodes,
            edges,
            view: None,
        }
    }

    /// Convert to internal NodeGraph format.
    ///
    /// Rejects anything that would break the graph's invariants: unknown
    /// node types, malformed parameters, dangling or duplicate ids, inputs
    /// bound twice, undeclared ports and cycles.
    pub fn to_graph(&self) -> Result<NodeGraph, SnapshotError> {
        let mut graph = NodeGraph::new();

        for saved in &self.nodes {
            let id = parse_id(&saved.id)?;
            let node_type = saved
                .node_type
                .parse::<NodeType>()
                .map_err(|_| SnapshotError::UnknownNodeType(saved.node_type.clone()))?;
            let properties = NodeProperties::from_value(node_type, saved.params.clone())
                .map_err(|e| SnapshotError::InvalidParams {
                    node: saved.id.clone(),
                    reason: e.to_string(),
                })?;

            if graph.contains_node(id) {
                return Err(SnapshotError::DuplicateId(id));
            }
            graph.insert_node(Node {
                id,
                position: Position::new(saved.x, saved.y),
                properties,
            });
        }

        let mut edge_ids = HashSet::new();
        for saved in &self.edges {
            let id = parse_id(&saved.id)?;
            if !edge_ids.insert(id) {
                return Err(SnapshotError::DuplicateId(id));
            }
            let from = parse_id(&saved.from.node_id)?;
            let to = parse_id(&saved.to.node_id)?;

            if graph.input_connection(to, &saved.to.port).is_some() {
                return Err(SnapshotError::DuplicateBinding {
                    node: to,
                    port: saved.to.port.clone(),
                });
            }
            graph
                .check_connection(from, &saved.from.port, to, &saved.to.port)
                .map_err(|reason: EdgeRejected| SnapshotError::InvalidEdge { edge: id, reason })?;

            graph.push_connection_unchecked(Connection {
                id,
                from: Endpoint::new(from, saved.from.port.clone()),
                to: Endpoint::new(to, saved.to.port.clone()),
            });
        }

        log::info!(
            "Restored graph with {} node(s) and {} connection(s)",
            graph.node_count(),
            graph.connection_count()
        );
        Ok(graph)
    }

    /// Serialize the graph to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize the graph from JSON
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_str(json)?)
    }
}

impl NodeGraph {
    pub fn to_snapshot(&self) -> GraphSnapshot {
        GraphSnapshot::from_graph(self)
    }

    pub fn from_snapshot(snapshot: &GraphSnapshot) -> Result<Self, SnapshotError> {
        snapshot.to_graph()
    }
}

/// Namespace for UUIDs derived from non-UUID ids
const STUDIO_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6a0f_3c2e_91d4_4b7a_8e15_f0c9_2d6b_7e31);

fn parse_id(raw: &str) -> Result<Uuid, SnapshotError> {
    if raw.trim().is_empty() {
        return Err(SnapshotError::InvalidId(raw.to_string()));
    }
    Ok(Uuid::parse_str(raw).unwrap_or_else(|_| Uuid::new_v5(&STUDIO_ID_NAMESPACE, raw.as_bytes())))
}
