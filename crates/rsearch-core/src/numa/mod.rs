//! NUMA topology and per-node resources
//!
//! - `ComputeNode`: one memory node with its core count, CPU mask and lazily
//!   created counter-move history
//! - `NodeRegistry`: discovery, thread-to-node assignment and binding
//! - `Platform`: OS access, selected at compile time by `platform::native`
//!
//! The registry never comes up empty: when the OS reports nothing usable it
//! holds one dummy node (id rendered as `-1`) covering the whole machine, and
//! binding to it does nothing.

mod cpumask;
mod platform;
mod topology;

use std::fmt;
use std::sync::OnceLock;

use log::{debug, warn};

use crate::history::CounterMoveHistory;
use crate::output::SyncOutput;

pub use cpumask::{CpuMask, CpuSet};
#[cfg(windows)]
pub use platform::WindowsGroups;
pub use platform::{BindError, LinuxSysfs, Platform, Unsupported, native};
pub use topology::{RawNode, RawTopology};

/// A memory node and the physical cores attached to it
pub struct ComputeNode {
    /// `None` for the dummy node
    id: Option<u32>,
    core_count: usize,
    mask: CpuMask,
    scratch: OnceLock<Box<CounterMoveHistory>>,
}

impl ComputeNode {
    fn new(id: Option<u32>, core_count: usize, mask: CpuMask) -> Self {
        Self {
            id,
            core_count,
            mask,
            scratch: OnceLock::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> Option<u32> {
        self.id
    }

    /// The "no topology" stand-in
    #[inline]
    pub fn is_dummy(&self) -> bool {
        self.id.is_none()
    }

    #[inline]
    pub fn core_count(&self) -> usize {
        self.core_count
    }

    pub fn mask(&self) -> &CpuMask {
        &self.mask
    }

    /// History table shared by every thread of this node, created on first use
    pub fn scratch(&self) -> &CounterMoveHistory {
        self.scratch.get_or_init(|| {
            debug!("allocating counter-move history for node {}", NodeId(self.id));
            CounterMoveHistory::new_boxed()
        })
    }

    /// Address of the history table, if it was created
    pub fn scratch_addr(&self) -> Option<usize> {
        self.scratch.get().map(|table| &**table as *const CounterMoveHistory as usize)
    }
}

impl fmt::Display for ComputeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "node: {}, cores: {}, cmh: {:x}, mask: {}",
            NodeId(self.id),
            self.core_count,
            self.scratch_addr().unwrap_or(0),
            self.mask
        )
    }
}

impl fmt::Debug for ComputeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputeNode")
            .field("id", &self.id)
            .field("core_count", &self.core_count)
            .field("mask", &self.mask)
            .field("scratch", &self.scratch_addr())
            .finish()
    }
}

/// Renders a node id, `-1` for the dummy node
struct NodeId(Option<u32>);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(id) => write!(f, "{id}"),
            None => f.write_str("-1"),
        }
    }
}

/// Discovered nodes plus the platform used to bind threads to them
pub struct NodeRegistry {
    nodes: Vec<ComputeNode>,
    /// Sum of the node core counts, at least 1
    core_count: usize,
    platform: Box<dyn Platform>,
}

impl NodeRegistry {
    /// Discovers the topology of the running machine
    pub fn discover() -> Self {
        Self::with_platform(native())
    }

    /// Discovers through `platform`
    pub fn with_platform(platform: Box<dyn Platform>) -> Self {
        let fallback = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        let (nodes, core_count) = topology::assemble(platform.query(), fallback);
        debug!(
            "{}: {} node(s), {} core(s)",
            platform.name(),
            nodes.len(),
            core_count
        );
        Self {
            nodes,
            core_count,
            platform,
        }
    }

    pub fn nodes(&self) -> &[ComputeNode] {
        &self.nodes
    }

    pub fn core_count(&self) -> usize {
        self.core_count
    }

    pub fn platform_name(&self) -> &'static str {
        self.platform.name()
    }

    /// Node the `thread_index`-th search thread should run on
    ///
    /// Threads fill the nodes in registry order, each node taking as many
    /// consecutive indices as it has cores; indices wrap at the total core
    /// count.
    pub fn preferred_node(&self, thread_index: usize) -> &ComputeNode {
        if self.nodes.len() == 1 {
            return &self.nodes[0];
        }

        let mut position = thread_index % self.core_count;
        for node in &self.nodes {
            if position < node.core_count {
                return node;
            }
            position -= node.core_count;
        }
        // Core counts sum to core_count, so the walk always ends above
        &self.nodes[0]
    }

    /// Binds the calling thread to `node`
    ///
    /// Does nothing for the dummy node. On failure the thread keeps running
    /// unbound.
    pub fn bind(&self, node: &ComputeNode) -> Result<(), BindError> {
        let Some(id) = node.id else {
            return Ok(());
        };
        self.platform.bind_current_thread(id, &node.mask).inspect_err(|err| {
            warn!("binding thread to node {id} failed: {err}");
        })
    }

    /// Writes the topology dump to `out`, one line per node
    pub fn display(&self, out: &dyn SyncOutput) {
        out.line("");
        out.line("Numa Hardware Configuration:");
        for node in &self.nodes {
            out.line(&node.to_string());
        }
    }
}

impl fmt::Display for NodeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Numa Hardware Configuration:")?;
        for node in &self.nodes {
            writeln!(f, "{node}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("platform", &self.platform.name())
            .field("core_count", &self.core_count)
            .field("nodes", &self.nodes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::MemoryOutput;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Fixed topology, records bind calls
    struct FixedTopology {
        raw: Option<RawTopology>,
        binds: Arc<AtomicUsize>,
    }

    impl Platform for FixedTopology {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn query(&self) -> Option<RawTopology> {
            self.raw.clone()
        }

        fn bind_current_thread(&self, _node: u32, _mask: &CpuMask) -> Result<(), BindError> {
            self.binds.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    /// Nodes with the given core counts, cpus numbered consecutively
    fn registry(core_counts: &[usize]) -> (NodeRegistry, Arc<AtomicUsize>) {
        let mut raw = RawTopology::default();
        let mut next_cpu = 0;
        for (id, &count) in core_counts.iter().enumerate() {
            let cpus: CpuSet = (next_cpu..next_cpu + count).collect();
            raw.nodes.push(RawNode {
                id: id as u32,
                mask: CpuMask::Set(cpus),
            });
            for cpu in next_cpu..next_cpu + count {
                raw.cores.push(CpuMask::Set(CpuSet::single(cpu)));
            }
            next_cpu += count;
        }
        let binds = Arc::new(AtomicUsize::new(0));
        let platform = FixedTopology {
            raw: Some(raw),
            binds: Arc::clone(&binds),
        };
        (NodeRegistry::with_platform(Box::new(platform)), binds)
    }

    #[test]
    fn test_preferred_node_two_equal_nodes() {
        let (reg, _) = registry(&[4, 4]);
        assert_eq!(reg.core_count(), 8);
        for thread in 0..4 {
            assert_eq!(reg.preferred_node(thread).id(), Some(0));
        }
        for thread in 4..8 {
            assert_eq!(reg.preferred_node(thread).id(), Some(1));
        }
        assert_eq!(reg.preferred_node(9).id(), Some(0));
    }

    #[test]
    fn test_preferred_node_is_proportional() {
        let (reg, _) = registry(&[2, 6, 4]);
        let mut hits = [0usize; 3];
        for thread in 0..120 {
            let id = reg.preferred_node(thread).id().unwrap() as usize;
            hits[id] += 1;
        }
        assert_eq!(hits, [20, 60, 40]);
        // Deterministic
        assert_eq!(reg.preferred_node(37).id(), reg.preferred_node(37).id());
    }

    #[test]
    fn test_dummy_node_registry() {
        let reg = NodeRegistry::with_platform(Box::new(Unsupported));
        assert_eq!(reg.nodes().len(), 1);
        let node = reg.preferred_node(123);
        assert!(node.is_dummy());
        assert!(reg.core_count() >= 1);
        assert_eq!(node.core_count(), reg.core_count());
        assert!(reg.bind(node).is_ok());
    }

    #[test]
    fn test_bind_skips_dummy_and_calls_platform() {
        let (reg, binds) = registry(&[2, 2]);
        reg.bind(reg.preferred_node(3)).unwrap();
        assert_eq!(binds.load(Ordering::Relaxed), 1);

        let dummy = ComputeNode::new(None, 1, CpuMask::All);
        reg.bind(&dummy).unwrap();
        assert_eq!(binds.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_scratch_created_once_per_node() {
        let (reg, _) = registry(&[2, 2]);
        let node0 = reg.preferred_node(0);
        assert!(node0.scratch_addr().is_none());

        let addrs: Vec<usize> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| node0.scratch() as *const CounterMoveHistory as usize))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(addrs.iter().all(|&a| a == addrs[0]));
        assert_eq!(node0.scratch_addr(), Some(addrs[0]));

        // Other node gets its own table
        let node1 = reg.preferred_node(2);
        assert_ne!(node1.scratch() as *const _ as usize, addrs[0]);
    }

    #[test]
    fn test_display_lists_every_node() {
        let (reg, _) = registry(&[2, 2]);
        reg.nodes()[1].scratch();

        let out = MemoryOutput::new();
        reg.display(&out);
        let lines = out.take();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1], "Numa Hardware Configuration:");
        assert_eq!(lines[2], "node: 0, cores: 2, cmh: 0, mask: cpus 0-1");
        assert!(lines[3].starts_with("node: 1, cores: 2, cmh: "));
        assert!(lines[3].ends_with("mask: cpus 2-3"));
        assert!(!lines[3].contains("cmh: 0,"));

        let text = reg.to_string();
        assert!(text.starts_with("Numa Hardware Configuration:\n"));
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_dummy_node_renders_minus_one() {
        let node = ComputeNode::new(None, 3, CpuMask::All);
        assert_eq!(node.to_string(), "node: -1, cores: 3, cmh: 0, mask: all");
    }
}
