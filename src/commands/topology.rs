//! Topology command implementation.
//!
//! Loads the topology file and prints the resulting coordination graph.

use anyhow::Result;
use std::path::PathBuf;

use crate::config::{Config, DEFAULT_TOPOLOGY_PATH};
use crate::topology::Topology;

/// Loads the topology file and prints the resulting graph.
pub fn command_topology(config: &Config, verbose: bool) -> Result<()> {
    let path = config
        .topology
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_TOPOLOGY_PATH));

    let topology = Topology::load(&path)?;
    let graph = topology.build_graph()?;

    println!("🗺️  Topology: {}", path.display());
    println!("=========================================");
    println!(
        "{} processes, {} pages, {} frames",
        graph.process_count(),
        graph.page_count(),
        graph.frame_count()
    );

    for (_, page) in graph.pages() {
        println!("\n📄 Page: {} ({} frames)", page.name, page.frame_count());
        for frame_id in page.frame_ids() {
            let frame = graph.frame(*frame_id);
            let process = graph.process(frame.process_id);
            println!("   ├─ frame in {} (pid {})", process.name, process.pid);
        }
    }

    if verbose {
        println!("\n⚙️  Processes:");
        for (_, process) in graph.processes() {
            println!(
                "   ├─ {} (pid {}): {} frames",
                process.name,
                process.pid,
                process.frame_count()
            );
        }
    }

    Ok(())
}
