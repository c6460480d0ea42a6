//! Platform-agnostic topology assembly
//!
//! A platform reports its nodes and physical cores as masks; `assemble`
//! counts cores per node and applies the fallbacks. Every path ends with a
//! non-empty node list and a positive total core count.

use log::debug;

use super::ComputeNode;
use super::cpumask::CpuMask;

/// Node as reported by the OS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawNode {
    pub id: u32,
    pub mask: CpuMask,
}

/// Unprocessed OS topology: nodes in OS order and one mask per physical core
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTopology {
    pub nodes: Vec<RawNode>,
    pub cores: Vec<CpuMask>,
}

/// Builds the final node list
///
/// Each core is credited to the first node whose mask intersects it; cores no
/// node claims are dropped, as are nodes left without cores. If nothing is
/// counted, a single dummy node with `fallback_cores` cores and a
/// whole-machine mask is returned.
pub(super) fn assemble(raw: Option<RawTopology>, fallback_cores: usize) -> (Vec<ComputeNode>, usize) {
    let raw = raw.unwrap_or_default();
    let mut counts = vec![0usize; raw.nodes.len()];
    let mut total = 0;

    for core in &raw.cores {
        match raw.nodes.iter().position(|node| node.mask.intersects(core)) {
            Some(index) => {
                counts[index] += 1;
                total += 1;
            }
            None => debug!("core {core} belongs to no node, ignored"),
        }
    }

    let nodes: Vec<ComputeNode> = if total == 0 {
        Vec::new()
    } else {
        raw.nodes
            .into_iter()
            .zip(counts)
            .filter(|(node, count)| {
                if *count == 0 {
                    debug!("node {} has no cores, ignored", node.id);
                }
                *count > 0
            })
            .map(|(node, count)| ComputeNode::new(Some(node.id), count, node.mask))
            .collect()
    };

    if nodes.is_empty() {
        let cores = fallback_cores.max(1);
        debug!("no usable topology, using a dummy node with {cores} cores");
        return (vec![ComputeNode::new(None, cores, CpuMask::All)], cores);
    }

    (nodes, total)
}
