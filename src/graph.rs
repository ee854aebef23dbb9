//! Coordination graph of processes, frames, and pages.
//!
//! The graph is an arena of nodes indexed by stable integer ids. Ownership
//! edges are stored as index lists: a process knows the frames it hosts, a
//! page knows the frames it owns, and a frame points back at both. Nodes are
//! created by the topology layer; the distributor only reads the structure
//! and annotates measurement fields.

use ahash::AHashMap as HashMap;
use std::time::{Duration, Instant};

/// Stable index of a process node within the graph arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessId(usize);

/// Stable index of a frame node within the graph arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(usize);

/// Stable index of a page node within the graph arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageId(usize);

/// An OS process hosting zero or more frames.
///
/// The measurement fields are written exclusively by the distributor: the
/// cumulative counter advances with each batch, while `cpu_usage_percent` and
/// `private_footprint_kb` reflect only the most recent cycle.
#[derive(Debug)]
pub struct ProcessNode {
    pub pid: u32,
    pub name: String,
    pub cumulative_cpu_usage: Duration,
    pub cpu_usage_percent: f64,
    pub private_footprint_kb: u64,
    frame_ids: Vec<FrameId>,
}

impl ProcessNode {
    pub fn frame_ids(&self) -> &[FrameId] {
        &self.frame_ids
    }

    pub fn frame_count(&self) -> usize {
        self.frame_ids.len()
    }
}

/// A rendering context hosted by one process and owned by one page.
///
/// Frames carry no measurements of their own; they exist to fan process-level
/// measurements out to pages. Both edges are immutable for the frame's
/// lifetime.
#[derive(Debug)]
pub struct FrameNode {
    pub process_id: ProcessId,
    pub page_id: PageId,
}

/// A logical page aggregating one or more frames.
#[derive(Debug)]
pub struct PageNode {
    pub name: String,
    pub cumulative_cpu_usage_estimate: Duration,
    pub usage_estimate_time: Option<Instant>,
    pub private_footprint_kb_estimate: f64,
    frame_ids: Vec<FrameId>,
}

impl PageNode {
    pub fn frame_ids(&self) -> &[FrameId] {
        &self.frame_ids
    }

    pub fn frame_count(&self) -> usize {
        self.frame_ids.len()
    }
}

/// Arena holding all coordination nodes plus a pid lookup index.
#[derive(Debug, Default)]
pub struct CoordinationGraph {
    processes: Vec<ProcessNode>,
    frames: Vec<FrameNode>,
    pages: Vec<PageNode>,
    pid_index: HashMap<u32, ProcessId>,
}

impl CoordinationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a process node. Pids must be unique within the graph.
    pub fn add_process(&mut self, pid: u32, name: &str) -> ProcessId {
        debug_assert!(
            !self.pid_index.contains_key(&pid),
            "duplicate pid {pid} in coordination graph"
        );
        let id = ProcessId(self.processes.len());
        self.processes.push(ProcessNode {
            pid,
            name: name.to_string(),
            cumulative_cpu_usage: Duration::ZERO,
            cpu_usage_percent: 0.0,
            private_footprint_kb: 0,
            frame_ids: Vec::new(),
        });
        self.pid_index.insert(pid, id);
        id
    }

    /// Adds a page node with no frames yet.
    pub fn add_page(&mut self, name: &str) -> PageId {
        let id = PageId(self.pages.len());
        self.pages.push(PageNode {
            name: name.to_string(),
            cumulative_cpu_usage_estimate: Duration::ZERO,
            usage_estimate_time: None,
            private_footprint_kb_estimate: 0.0,
            frame_ids: Vec::new(),
        });
        id
    }

    /// Adds a frame hosted by `process_id` and owned by `page_id`, wiring the
    /// index lists on both sides.
    pub fn add_frame(&mut self, process_id: ProcessId, page_id: PageId) -> FrameId {
        let id = FrameId(self.frames.len());
        self.frames.push(FrameNode {
            process_id,
            page_id,
        });
        self.processes[process_id.0].frame_ids.push(id);
        self.pages[page_id.0].frame_ids.push(id);
        id
    }

    pub fn process_by_pid(&self, pid: u32) -> Option<ProcessId> {
        self.pid_index.get(&pid).copied()
    }

    pub fn process(&self, id: ProcessId) -> &ProcessNode {
        &self.processes[id.0]
    }

    pub fn process_mut(&mut self, id: ProcessId) -> &mut ProcessNode {
        &mut self.processes[id.0]
    }

    pub fn frame(&self, id: FrameId) -> &FrameNode {
        &self.frames[id.0]
    }

    pub fn page(&self, id: PageId) -> &PageNode {
        &self.pages[id.0]
    }

    pub fn page_mut(&mut self, id: PageId) -> &mut PageNode {
        &mut self.pages[id.0]
    }

    pub fn process_ids(&self) -> impl Iterator<Item = ProcessId> + '_ {
        (0..self.processes.len()).map(ProcessId)
    }

    pub fn processes(&self) -> impl Iterator<Item = (ProcessId, &ProcessNode)> {
        self.processes
            .iter()
            .enumerate()
            .map(|(i, node)| (ProcessId(i), node))
    }

    pub fn pages(&self) -> impl Iterator<Item = (PageId, &PageNode)> {
        self.pages
            .iter()
            .enumerate()
            .map(|(i, node)| (PageId(i), node))
    }

    pub fn process_count(&self) -> usize {
        self.processes.len()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// All pids known to the graph, in insertion order.
    pub fn pids(&self) -> Vec<u32> {
        self.processes.iter().map(|p| p.pid).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_lookup_process() {
        let mut graph = CoordinationGraph::new();
        let id = graph.add_process(100, "browser");

        assert_eq!(graph.process_by_pid(100), Some(id));
        assert_eq!(graph.process_by_pid(101), None);
        assert_eq!(graph.process(id).name, "browser");
        assert_eq!(graph.process(id).cumulative_cpu_usage, Duration::ZERO);
        assert_eq!(graph.process(id).frame_count(), 0);
    }

    #[test]
    fn test_frame_wires_both_sides() {
        let mut graph = CoordinationGraph::new();
        let process = graph.add_process(100, "renderer");
        let page = graph.add_page("checkout");
        let frame = graph.add_frame(process, page);

        assert_eq!(graph.process(process).frame_ids(), &[frame]);
        assert_eq!(graph.page(page).frame_ids(), &[frame]);
        assert_eq!(graph.frame(frame).process_id, process);
        assert_eq!(graph.frame(frame).page_id, page);
        assert_eq!(graph.frame_count(), 1);
    }

    #[test]
    fn test_page_spanning_two_processes() {
        let mut graph = CoordinationGraph::new();
        let p1 = graph.add_process(100, "renderer-1");
        let p2 = graph.add_process(200, "renderer-2");
        let page = graph.add_page("dashboard");
        graph.add_frame(p1, page);
        graph.add_frame(p2, page);

        assert_eq!(graph.page(page).frame_count(), 2);
        assert_eq!(graph.process(p1).frame_count(), 1);
        assert_eq!(graph.process(p2).frame_count(), 1);
    }

    #[test]
    fn test_pids_in_insertion_order() {
        let mut graph = CoordinationGraph::new();
        graph.add_process(300, "a");
        graph.add_process(100, "b");
        graph.add_process(200, "c");

        assert_eq!(graph.pids(), vec![300, 100, 200]);
    }
}
