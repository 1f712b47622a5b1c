//! Node graph state: nodes, connections and their invariants

use std::collections::{HashMap, HashSet, VecDeque};

use uuid::Uuid;

use crate::error::{EdgeRejected, EvaluationError, GraphError};
use crate::nodes::{Node, NodeProperties, NodeType, Position};

/// One end of a connection: a node and one of its named ports
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub node: Uuid,
    pub port: String,
}

impl Endpoint {
    pub fn new(node: Uuid, port: impl Into<String>) -> Self {
        Self {
            node,
            port: port.into(),
        }
    }
}

/// A connection from an output port to an input port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub id: Uuid,
    pub from: Endpoint,
    pub to: Endpoint,
}

/// The entire node graph.
///
/// Nodes keep their insertion order, which is also the order independent
/// nodes are evaluated in. Every input port carries at most one
/// connection, connections never dangle and never form a cycle.
#[derive(Debug, Clone, Default)]
pub struct NodeGraph {
    nodes: HashMap<Uuid, Node>,
    order: Vec<Uuid>,
    connections: Vec<Connection>,
}

impl NodeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: Uuid) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: Uuid) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn contains_node(&self, id: Uuid) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Nodes in insertion order
    pub fn nodes_iter(&self) -> impl Iterator<Item = &Node> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    /// Connections in insertion order
    pub fn connections_iter(&self) -> impl Iterator<Item = &Connection> {
        self.connections.iter()
    }

    pub fn connection(&self, id: Uuid) -> Option<&Connection> {
        self.connections.iter().find(|c| c.id == id)
    }

    /// The connection feeding `port` of `node`, if any
    pub fn input_connection(&self, node: Uuid, port: &str) -> Option<&Connection> {
        self.connections
            .iter()
            .find(|c| c.to.node == node && c.to.port == port)
    }

    /// Add a node of the named type with default properties
    pub fn add_node_named(&mut self, type_name: &str, position: Position) -> Result<Uuid, GraphError> {
        let node_type = type_name.parse::<NodeType>()?;
        Ok(self.add_node(node_type, position))
    }

    pub fn add_node(&mut self, node_type: NodeType, position: Position) -> Uuid {
        let node = Node::new(node_type, position);
        let id = node.id;
        self.insert_node(node);
        log::info!("Created node {} ({}) at {:?}", id, node_type, position);
        id
    }

    /// Insert a fully built node, replacing any node with the same id
    pub(crate) fn insert_node(&mut self, node: Node) {
        let id = node.id;
        if self.nodes.insert(id, node).is_none() {
            self.order.push(id);
        }
    }

    /// Delete a node and all its connections. Returns false if it was absent.
    pub fn remove_node(&mut self, node_id: Uuid) -> bool {
        if self.nodes.remove(&node_id).is_none() {
            return false;
        }
        self.order.retain(|id| *id != node_id);

        let before = self.connections.len();
        self.connections
            .retain(|c| c.from.node != node_id && c.to.node != node_id);

        log::info!(
            "Deleted node {} and {} connection(s)",
            node_id,
            before - self.connections.len()
        );
        true
    }

    /// Replace a node's properties with a record of the same type
    pub fn set_properties(&mut self, node_id: Uuid, properties: NodeProperties) -> Result<(), GraphError> {
        let node = self
            .nodes
            .get_mut(&node_id)
            .ok_or(GraphError::UnknownNode(node_id))?;
        if node.node_type() != properties.node_type() {
            return Err(GraphError::PropertyTypeMismatch {
                node: node_id,
                expected: node.node_type().name(),
                actual: properties.node_type().name(),
            });
        }
        node.properties = properties;
        Ok(())
    }

    pub fn set_position(&mut self, node_id: Uuid, position: Position) -> Result<(), GraphError> {
        let node = self
            .nodes
            .get_mut(&node_id)
            .ok_or(GraphError::UnknownNode(node_id))?;
        node.position = position;
        Ok(())
    }

    /// Connect `from_port` of `from` to `to_port` of `to`.
    ///
    /// An input port takes a single connection, so an existing connection
    /// into `(to, to_port)` is replaced. Nothing changes when the
    /// connection is rejected.
    pub fn add_connection(
        &mut self,
        from: Uuid,
        from_port: &str,
        to: Uuid,
        to_port: &str,
    ) -> Result<Uuid, EdgeRejected> {
        self.check_connection(from, from_port, to, to_port)?;

        self.connections
            .retain(|c| !(c.to.node == to && c.to.port == to_port));

        let id = Uuid::new_v4();
        self.connections.push(Connection {
            id,
            from: Endpoint::new(from, from_port),
            to: Endpoint::new(to, to_port),
        });
        log::info!("Connection created: {}.{} -> {}.{}", from, from_port, to, to_port);
        Ok(id)
    }

    /// Validate a prospective connection without committing it
    pub fn check_connection(
        &self,
        from: Uuid,
        from_port: &str,
        to: Uuid,
        to_port: &str,
    ) -> Result<(), EdgeRejected> {
        if from == to {
            return Err(EdgeRejected::SelfLoop);
        }
        let source = self.nodes.get(&from).ok_or(EdgeRejected::UnknownNode(from))?;
        let target = self.nodes.get(&to).ok_or(EdgeRejected::UnknownNode(to))?;
        if !source.node_type().has_output(from_port) {
            return Err(EdgeRejected::UnknownPort {
                node: from,
                port: from_port.to_string(),
                direction: "output",
            });
        }
        if !target.node_type().has_input(to_port) {
            return Err(EdgeRejected::UnknownPort {
                node: to,
                port: to_port.to_string(),
                direction: "input",
            });
        }
        if self.creates_cycle(from, to) {
            return Err(EdgeRejected::Cycle);
        }
        Ok(())
    }

    /// Would adding `from -> to` close a cycle? True when `from` is
    /// reachable from `to` once the candidate edge is in place.
    pub fn creates_cycle(&self, from: Uuid, to: Uuid) -> bool {
        let mut adjacency: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for conn in &self.connections {
            adjacency.entry(conn.from.node).or_default().push(conn.to.node);
        }
        adjacency.entry(from).or_default().push(to);

        let mut seen = HashSet::new();
        let mut stack = vec![to];
        while let Some(v) = stack.pop() {
            if v == from {
                return true;
            }
            if !seen.insert(v) {
                continue;
            }
            if let Some(next) = adjacency.get(&v) {
                stack.extend(next.iter().copied());
            }
        }
        false
    }

    /// Delete a specific connection. Returns false if it was absent.
    pub fn remove_connection(&mut self, connection_id: Uuid) -> bool {
        let before = self.connections.len();
        self.connections.retain(|c| c.id != connection_id);
        let removed = self.connections.len() != before;
        if removed {
            log::info!("Connection deleted: {}", connection_id);
        }
        removed
    }

    /// Topological sort of nodes (Kahn's algorithm).
    ///
    /// Ready nodes are taken first-in first-out, seeded in node insertion
    /// order, so independent nodes evaluate in the order they were added.
    pub fn topological_order(&self) -> Result<Vec<Uuid>, EvaluationError> {
        let mut in_degree: HashMap<Uuid, usize> = self.order.iter().map(|id| (*id, 0)).collect();
        let mut successors: HashMap<Uuid, Vec<Uuid>> = HashMap::new();

        for conn in &self.connections {
            successors.entry(conn.from.node).or_default().push(conn.to.node);
            if let Some(deg) = in_degree.get_mut(&conn.to.node) {
                *deg += 1;
            }
        }

        let mut queue: VecDeque<Uuid> = self
            .order
            .iter()
            .filter(|id| in_degree.get(*id) == Some(&0))
            .copied()
            .collect();

        let mut result = Vec::with_capacity(self.order.len());
        while let Some(node) = queue.pop_front() {
            result.push(node);
            for next in successors.get(&node).into_iter().flatten() {
                if let Some(deg) = in_degree.get_mut(next) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(*next);
                    }
                }
            }
        }

        if result.len() != self.order.len() {
            return Err(EvaluationError::CycleDetected);
        }
        Ok(result)
    }

    /// Push a connection without any validation. Only for restoring
    /// snapshots (which validate separately) and for tests.
    pub(crate) fn push_connection_unchecked(&mut self, connection: Connection) {
        self.connections.push(connection);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::IMAGE_PORT;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn origin() -> Position {
        Position::default()
    }

    /// noise -> combine.A, gradient -> combine.B, combine -> display
    fn starter_graph() -> (NodeGraph, [Uuid; 4]) {
        let mut graph = NodeGraph::new();
        let noise = graph.add_node(NodeType::PerlinNoise, origin());
        let gradient = graph.add_node(NodeType::Gradient, origin());
        let combine = graph.add_node(NodeType::Combine, origin());
        let display = graph.add_node(NodeType::Display, origin());
        graph.add_connection(noise, IMAGE_PORT, combine, "A").unwrap();
        graph.add_connection(gradient, IMAGE_PORT, combine, "B").unwrap();
        graph.add_connection(combine, IMAGE_PORT, display, IMAGE_PORT).unwrap();
        (graph, [noise, gradient, combine, display])
    }

    #[test]
    fn test_add_node_named() {
        let mut graph = NodeGraph::new();
        let id = graph.add_node_named("Gradient", origin()).unwrap();
        assert_eq!(graph.node(id).unwrap().node_type(), NodeType::Gradient);

        let err = graph.add_node_named("Sharpen", origin()).unwrap_err();
        assert_eq!(err, GraphError::UnknownNodeType("Sharpen".to_string()));
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn test_self_loop_rejected() {
        let mut graph = NodeGraph::new();
        let combine = graph.add_node(NodeType::Combine, origin());
        assert_eq!(
            graph.add_connection(combine, IMAGE_PORT, combine, "A"),
            Err(EdgeRejected::SelfLoop)
        );
        assert_eq!(graph.connection_count(), 0);
    }

    #[test]
    fn test_unknown_ports_rejected() {
        let mut graph = NodeGraph::new();
        let noise = graph.add_node(NodeType::PerlinNoise, origin());
        let display = graph.add_node(NodeType::Display, origin());
        assert!(matches!(
            graph.add_connection(noise, "mask", display, IMAGE_PORT),
            Err(EdgeRejected::UnknownPort { direction: "output", .. })
        ));
        assert!(matches!(
            graph.add_connection(noise, IMAGE_PORT, display, "A"),
            Err(EdgeRejected::UnknownPort { direction: "input", .. })
        ));
        assert!(matches!(
            graph.add_connection(display, IMAGE_PORT, noise, IMAGE_PORT),
            Err(EdgeRejected::UnknownPort { .. })
        ));
        let ghost = Uuid::new_v4();
        assert_eq!(
            graph.add_connection(ghost, IMAGE_PORT, display, IMAGE_PORT),
            Err(EdgeRejected::UnknownNode(ghost))
        );
    }

    #[test]
    fn test_cycle_rejected_and_graph_unchanged() {
        let mut graph = NodeGraph::new();
        let a = graph.add_node(NodeType::Combine, origin());
        let b = graph.add_node(NodeType::Combine, origin());
        let c = graph.add_node(NodeType::Combine, origin());
        graph.add_connection(a, IMAGE_PORT, b, "A").unwrap();
        graph.add_connection(b, IMAGE_PORT, c, "A").unwrap();
        assert_eq!(graph.add_connection(b, IMAGE_PORT, a, "B"), Err(EdgeRejected::Cycle));
        assert_eq!(graph.add_connection(c, IMAGE_PORT, a, "A"), Err(EdgeRejected::Cycle));

        // b.A is already bound; a refused re-bind keeps the old connection
        let before: Vec<Connection> = graph.connections_iter().cloned().collect();
        assert_eq!(graph.add_connection(c, IMAGE_PORT, b, "A"), Err(EdgeRejected::Cycle));
        let after: Vec<Connection> = graph.connections_iter().cloned().collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_rebinding_input_replaces_edge() {
        let mut graph = NodeGraph::new();
        let first = graph.add_node(NodeType::CreateImage, origin());
        let second = graph.add_node(NodeType::Gradient, origin());
        let combine = graph.add_node(NodeType::Combine, origin());

        let old = graph.add_connection(first, IMAGE_PORT, combine, "A").unwrap();
        let new = graph.add_connection(second, IMAGE_PORT, combine, "A").unwrap();

        assert!(graph.connection(old).is_none());
        let bound: Vec<&Connection> = graph
            .connections_iter()
            .filter(|c| c.to.node == combine && c.to.port == "A")
            .collect();
        assert_eq!(bound.len(), 1);
        assert_eq!(bound[0].id, new);
        assert_eq!(bound[0].from.node, second);
        assert_eq!(graph.input_connection(combine, "A").unwrap().id, new);
    }

    #[test]
    fn test_remove_node_cascades() {
        let (mut graph, [noise, gradient, combine, display]) = starter_graph();
        assert!(graph.remove_node(combine));
        assert!(!graph.remove_node(combine));
        assert_eq!(graph.node_count(), 3);
        assert!(graph
            .connections_iter()
            .all(|c| c.from.node != combine && c.to.node != combine));
        assert_eq!(graph.connection_count(), 0);
        let order: Vec<Uuid> = graph.nodes_iter().map(|n| n.id).collect();
        assert_eq!(order, vec![noise, gradient, display]);
    }

    #[test]
    fn test_remove_connection() {
        let (mut graph, _) = starter_graph();
        let id = graph.connections_iter().next().unwrap().id;
        assert!(graph.remove_connection(id));
        assert!(!graph.remove_connection(id));
        assert_eq!(graph.connection_count(), 2);
    }

    #[test]
    fn test_topological_order_respects_edges() {
        let (graph, [noise, gradient, combine, display]) = starter_graph();
        let order = graph.topological_order().unwrap();
        assert_eq!(order, vec![noise, gradient, combine, display]);
    }

    #[test]
    fn test_topological_order_independent_nodes_keep_insertion_order() {
        let mut graph = NodeGraph::new();
        let ids: Vec<Uuid> = (0..5)
            .map(|_| graph.add_node(NodeType::CreateImage, origin()))
            .collect();
        assert_eq!(graph.topological_order().unwrap(), ids);
    }

    #[test]
    fn test_topological_order_detects_forced_cycle() {
        let mut graph = NodeGraph::new();
        let a = graph.add_node(NodeType::Combine, origin());
        let b = graph.add_node(NodeType::Combine, origin());
        graph.add_connection(a, IMAGE_PORT, b, "A").unwrap();
        graph.push_connection_unchecked(Connection {
            id: Uuid::new_v4(),
            from: Endpoint::new(b, IMAGE_PORT),
            to: Endpoint::new(a, "A"),
        });
        assert_eq!(graph.topological_order(), Err(EvaluationError::CycleDetected));
    }

    #[test]
    fn test_set_properties_type_checked() {
        let (mut graph, [noise, _, combine, _]) = starter_graph();
        let props = NodeProperties::for_type(NodeType::Gradient);
        assert!(matches!(
            graph.set_properties(noise, props),
            Err(GraphError::PropertyTypeMismatch { expected: "PerlinNoise", .. })
        ));

        let mut props = NodeProperties::for_type(NodeType::Combine);
        if let NodeProperties::Combine(p) = &mut props {
            p.alpha = 0.25;
        }
        graph.set_properties(combine, props.clone()).unwrap();
        assert_eq!(graph.node(combine).unwrap().properties, props);

        let ghost = Uuid::new_v4();
        assert_eq!(
            graph.set_position(ghost, Position::new(1.0, 2.0)),
            Err(GraphError::UnknownNode(ghost))
        );
    }

    #[test]
    fn test_random_edits_never_create_cycles() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _round in 0..50 {
            let mut graph = NodeGraph::new();
            let mut ids = Vec::new();
            for _ in 0..40 {
                match rng.gen_range(0..10) {
                    0..=2 => {
                        let t = NodeType::ALL[rng.gen_range(0..NodeType::ALL.len())];
                        ids.push(graph.add_node(t, origin()));
                    }
                    3 if !ids.is_empty() => {
                        let victim = ids.swap_remove(rng.gen_range(0..ids.len()));
                        graph.remove_node(victim);
                    }
                    _ if ids.len() >= 2 => {
                        let from = ids[rng.gen_range(0..ids.len())];
                        let to = ids[rng.gen_range(0..ids.len())];
                        let from_ports = graph.node(from).unwrap().node_type().outputs();
                        let to_ports = graph.node(to).unwrap().node_type().inputs();
                        if from_ports.is_empty() || to_ports.is_empty() {
                            continue;
                        }
                        let to_port = to_ports[rng.gen_range(0..to_ports.len())];
                        let _ = graph.add_connection(from, from_ports[0], to, to_port);
                    }
                    _ => {}
                }
                let order = graph.topological_order().expect("graph stayed acyclic");
                assert_eq!(order.len(), graph.node_count());
                for conn in graph.connections_iter() {
                    assert!(graph.contains_node(conn.from.node));
                    assert!(graph.contains_node(conn.to.node));
                }
            }
        }
    }
}
