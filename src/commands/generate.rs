//! Generate command implementation.
//!
//! Generates synthetic topology files for trying out the exporter without a
//! real multi-process deployment.

use anyhow::Result;
use chrono::Utc;
use rand::Rng;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

use crate::topology::{FrameSpec, PageSpec, ProcessSpec, Topology};

/// Generates a synthetic topology file.
pub fn command_generate(
    output: PathBuf,
    processes: usize,
    pages: usize,
    max_frames_per_page: usize,
) -> Result<()> {
    debug!(
        "Generating topology: processes={}, pages={}, max_frames_per_page={}, output={}",
        processes,
        pages,
        max_frames_per_page,
        output.display()
    );

    let mut rng = rand::thread_rng();
    let processes = processes.max(1);
    let max_frames_per_page = max_frames_per_page.max(1);

    let mut current_pid: u32 = rng.gen_range(1_000..30_000);
    let process_specs: Vec<ProcessSpec> = (0..processes)
        .map(|i| {
            let spec = ProcessSpec {
                pid: current_pid,
                name: format!("worker-{}", i + 1),
            };
            current_pid += rng.gen_range(1..50);
            spec
        })
        .collect();

    let page_specs: Vec<PageSpec> = (0..pages)
        .map(|i| {
            let frame_count = rng.gen_range(1..=max_frames_per_page);
            let frames = (0..frame_count)
                .map(|_| FrameSpec {
                    process: process_specs[rng.gen_range(0..process_specs.len())]
                        .name
                        .clone(),
                })
                .collect();
            PageSpec {
                name: format!("page-{}", i + 1),
                frames,
            }
        })
        .collect();

    let topology = Topology {
        version: "1.0".to_string(),
        generated_at: Some(Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()),
        processes: process_specs,
        pages: page_specs,
    };
    topology.validate()?;

    let content = match output.extension().and_then(|s| s.to_str()) {
        Some("json") => serde_json::to_string_pretty(&topology)?,
        Some("toml") => toml::to_string_pretty(&topology)?,
        _ => serde_yaml::to_string(&topology)?,
    };
    fs::write(&output, content)?;

    println!(
        "✅ Generated topology: {} processes, {} pages in {}",
        topology.processes.len(),
        topology.pages.len(),
        output.display()
    );

    Ok(())
}
