//! FlowNode Engine - headless evaluation of image node graphs
//!
//! The editor front end mutates a [`NodeGraph`] through an [`Engine`]; the
//! engine evaluates the graph in dependency order and hands each node's
//! image to a [`PreviewSink`].

#![warn(clippy::all)]

pub mod blend;
pub mod color;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod graph;
pub mod image_data;
pub mod nodes;
pub mod perlin;
pub mod snapshot;

pub use blend::BlendMode;
pub use color::Color;
pub use config::EngineConfig;
pub use engine::{Engine, NullSink, PreviewSink};
pub use error::{ComputeError, ConfigError, EdgeRejected, EvaluationError, GraphError, SnapshotError};
pub use executor::{Executor, PassReport};
pub use graph::{Connection, Endpoint, NodeGraph};
pub use image_data::ImageData;
pub use nodes::{ComputeContext, Node, NodeProperties, NodeType, PortMap, Position, IMAGE_PORT};
pub use perlin::Perlin;
pub use snapshot::GraphSnapshot;

/// The graph a fresh studio opens with: noise and a gradient multiplied
/// together and shown on a display node.
pub fn starter_graph() -> NodeGraph {
    let mut graph = NodeGraph::new();
    let noise = graph.add_node(NodeType::PerlinNoise, Position::new(1900.0, 1920.0));
    let gradient = graph.add_node(NodeType::Gradient, Position::new(1900.0, 2100.0));
    let combine = graph.add_node(NodeType::Combine, Position::new(2100.0, 2010.0));
    let display = graph.add_node(NodeType::Display, Position::new(2300.0, 2010.0));

    let wires = [
        (noise, combine, "A"),
        (gradient, combine, "B"),
        (combine, display, IMAGE_PORT),
    ];
    for (from, to, port) in wires {
        if let Err(e) = graph.add_connection(from, IMAGE_PORT, to, port) {
            log::error!("Starter graph connection rejected: {}", e);
        }
    }
    graph
}
