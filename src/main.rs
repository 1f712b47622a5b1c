//! FlowNode headless runner
//!
//! Evaluates a saved graph (or the starter graph) once and writes every
//! node's image as a PNG.
//!
//! ```text
//! flownode [graph.json] [--out DIR] [--config engine.json] [--data-url]
//! ```
//!
//! `--data-url` also prints `<id> <data URL>` for every Display node, for
//! pasting previews straight into a browser.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use flownode_engine::{
    image_data, starter_graph, Engine, EngineConfig, GraphSnapshot, ImageData, NodeGraph, NodeType, PreviewSink,
};
use uuid::Uuid;

/// Writes each published preview to `<out>/<type>-<id>.png`
struct PngWriter {
    out_dir: PathBuf,
    graph: NodeGraph,
    data_urls: bool,
}

impl PreviewSink for PngWriter {
    fn on_node_output(&self, node_id: Uuid, output: Option<&ImageData>) {
        let Some(image) = output else {
            log::warn!("Node {} produced no image", node_id);
            return;
        };
        let Some(node_type) = self.graph.node(node_id).map(|n| n.node_type()) else {
            return;
        };
        let path = self.out_dir.join(format!("{}-{}.png", node_type.name(), node_id));

        match image_data::encode_png(image) {
            Ok(bytes) => match std::fs::write(&path, &bytes) {
                Ok(()) => log::info!(
                    "Wrote {} {}x{} ({} bytes raw) to {}",
                    node_type.label(),
                    image.width,
                    image.height,
                    image.byte_size(),
                    path.display()
                ),
                Err(e) => log::error!("Failed to write {}: {}", path.display(), e),
            },
            Err(e) => log::error!("Failed to encode PNG for {}: {}", node_id, e),
        }

        if self.data_urls && node_type == NodeType::Display {
            match image.to_data_url() {
                Ok(url) => println!("{} {}", node_id, url),
                Err(e) => log::error!("Failed to build data URL for {}: {}", node_id, e),
            }
        }
    }
}

struct Args {
    graph: Option<PathBuf>,
    out_dir: PathBuf,
    config: Option<PathBuf>,
    data_urls: bool,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        graph: None,
        out_dir: PathBuf::from("."),
        config: None,
        data_urls: false,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--out" => args.out_dir = iter.next().ok_or("--out needs a directory")?.into(),
            "--config" => args.config = Some(iter.next().ok_or("--config needs a file")?.into()),
            "--data-url" => args.data_urls = true,
            flag if flag.starts_with("--") => return Err(format!("Unknown option {}", flag)),
            path => args.graph = Some(path.into()),
        }
    }
    Ok(args)
}

fn load_graph(path: &Path) -> Result<NodeGraph, Box<dyn std::error::Error>> {
    let json = std::fs::read_to_string(path)?;
    Ok(GraphSnapshot::from_json(&json)?.to_graph()?)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = parse_args()?;
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let graph = match &args.graph {
        Some(path) => load_graph(path)?,
        None => {
            log::info!("No graph given, using the starter graph");
            starter_graph()
        }
    };

    std::fs::create_dir_all(&args.out_dir)?;
    let sink = Arc::new(PngWriter {
        out_dir: args.out_dir.clone(),
        graph: graph.clone(),
        data_urls: args.data_urls,
    });

    let engine = Engine::with_graph(graph, config, sink);
    let report = engine.evaluate_now().await?;

    for (node_id, err) in &report.failures {
        log::error!("Node {} failed: {}", node_id, err);
    }
    log::info!(
        "Pass complete: {} node(s), {} failure(s)",
        report.order.len(),
        report.failures.len()
    );
    Ok(())
}
