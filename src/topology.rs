//! Topology file loading and coordination-graph construction.
//!
//! The topology describes the multi-process application being attributed:
//! which pids exist, which logical pages the application serves, and which
//! process hosts each of a page's frames. YAML is the default format; JSON
//! and TOML are accepted by file extension.

use ahash::AHashMap as HashMap;
use ahash::AHashSet as HashSet;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::graph::CoordinationGraph;

/// A process entry in the topology file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSpec {
    pub pid: u32,
    pub name: String,
}

/// One frame of a page, referencing its hosting process by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameSpec {
    pub process: String,
}

/// A page entry in the topology file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSpec {
    pub name: String,
    pub frames: Vec<FrameSpec>,
}

/// Root structure of a topology file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topology {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<String>,
    pub processes: Vec<ProcessSpec>,
    #[serde(default)]
    pub pages: Vec<PageSpec>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Topology {
    /// Loads and validates a topology file, choosing the parser by extension.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read topology file {}", path.display()))?;

        let topology: Topology = match path.extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse topology JSON {}", path.display()))?,
            Some("toml") => toml::from_str(&content)
                .with_context(|| format!("Failed to parse topology TOML {}", path.display()))?,
            _ => serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse topology YAML {}", path.display()))?,
        };

        topology.validate()?;
        info!(
            "Loaded topology from {}: {} processes, {} pages",
            path.display(),
            topology.processes.len(),
            topology.pages.len()
        );
        Ok(topology)
    }

    /// Validates internal consistency: unique pids and names, every frame
    /// referencing a declared process, no empty pages.
    pub fn validate(&self) -> Result<()> {
        if self.processes.is_empty() {
            bail!("Topology defines no processes");
        }

        let mut pids: HashSet<u32> = HashSet::new();
        let mut process_names: HashSet<&str> = HashSet::new();
        for process in &self.processes {
            if !pids.insert(process.pid) {
                bail!("Duplicate pid {} in topology", process.pid);
            }
            if !process_names.insert(process.name.as_str()) {
                bail!("Duplicate process name '{}' in topology", process.name);
            }
        }

        let mut page_names: HashSet<&str> = HashSet::new();
        for page in &self.pages {
            if !page_names.insert(page.name.as_str()) {
                bail!("Duplicate page name '{}' in topology", page.name);
            }
            if page.frames.is_empty() {
                bail!("Page '{}' has no frames", page.name);
            }
            for frame in &page.frames {
                if !process_names.contains(frame.process.as_str()) {
                    bail!(
                        "Page '{}' references unknown process '{}'",
                        page.name,
                        frame.process
                    );
                }
            }
        }

        Ok(())
    }

    /// Builds the coordination graph described by this topology.
    pub fn build_graph(&self) -> Result<CoordinationGraph> {
        self.validate()?;

        let mut graph = CoordinationGraph::new();
        let mut by_name = HashMap::new();
        for process in &self.processes {
            let id = graph.add_process(process.pid, &process.name);
            by_name.insert(process.name.as_str(), id);
        }

        for page in &self.pages {
            let page_id = graph.add_page(&page.name);
            for frame in &page.frames {
                // Validated above, the reference always resolves.
                let process_id = by_name[frame.process.as_str()];
                graph.add_frame(process_id, page_id);
            }
        }

        Ok(graph)
    }
}
