//! OS access for topology discovery and thread binding
//!
//! - `LinuxSysfs`: `/sys/devices/system` tree plus `sched_setaffinity` and
//!   `set_mempolicy(MPOL_PREFERRED)`
//! - `WindowsGroups`: `GetLogicalProcessorInformationEx` plus
//!   `SetThreadGroupAffinity`
//! - `Unsupported`: no topology, binding does nothing

use std::fs;
use std::io;
use std::path::PathBuf;

use log::debug;
use thiserror::Error;

use super::cpumask::{CpuMask, CpuSet};
use super::topology::{RawNode, RawTopology};

#[derive(Debug, Error)]
pub enum BindError {
    #[error("{call} failed for node {node}: {source}")]
    Os {
        node: u32,
        call: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("node {node} carries a mask ({mask}) this platform cannot bind")]
    MaskKind { node: u32, mask: CpuMask },
    #[error("thread binding is not supported on this platform")]
    Unsupported,
}

/// OS capability used by the node registry
pub trait Platform: Send + Sync {
    fn name(&self) -> &'static str;

    /// Reads nodes and physical cores; `None` when the OS offers no topology
    fn query(&self) -> Option<RawTopology>;

    /// Restricts the calling thread to the node's processors
    fn bind_current_thread(&self, node: u32, mask: &CpuMask) -> Result<(), BindError>;
}

/// Platform for the running OS
pub fn native() -> Box<dyn Platform> {
    #[cfg(target_os = "linux")]
    {
        Box::new(LinuxSysfs::default())
    }
    #[cfg(windows)]
    {
        Box::new(WindowsGroups)
    }
    #[cfg(not(any(target_os = "linux", windows)))]
    {
        Box::new(Unsupported)
    }
}

/// No topology information, binding is a no-op
#[derive(Debug, Default, Clone, Copy)]
pub struct Unsupported;

impl Platform for Unsupported {
    fn name(&self) -> &'static str {
        "unsupported"
    }

    fn query(&self) -> Option<RawTopology> {
        None
    }

    fn bind_current_thread(&self, _node: u32, _mask: &CpuMask) -> Result<(), BindError> {
        Ok(())
    }
}

// =============================================================================
// Linux
// =============================================================================

/// Topology from sysfs
///
/// Reads `<root>/node/node*/cpulist` for node membership and
/// `<root>/cpu/cpu*/{online,topology/thread_siblings_list}` for physical
/// cores. A CPU is a physical core when it is the first id of its sibling
/// list.
#[derive(Debug, Clone)]
pub struct LinuxSysfs {
    root: PathBuf,
}

impl Default for LinuxSysfs {
    fn default() -> Self {
        Self::with_root("/sys/devices/system")
    }
}

impl LinuxSysfs {
    /// Reads from an alternative sysfs tree
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read_nodes(&self) -> Option<Vec<RawNode>> {
        let dir = fs::read_dir(self.root.join("node")).ok()?;
        let mut nodes = Vec::new();

        for entry in dir.flatten() {
            let name = entry.file_name();
            let Some(id) = name
                .to_str()
                .and_then(|n| n.strip_prefix("node"))
                .and_then(|n| n.parse::<u32>().ok())
            else {
                continue;
            };
            let Ok(list) = fs::read_to_string(entry.path().join("cpulist")) else {
                debug!("node{id}: cpulist unreadable");
                continue;
            };
            let Some(cpus) = CpuSet::parse_cpu_list(&list) else {
                debug!("node{id}: malformed cpulist {:?}", list.trim());
                continue;
            };
            nodes.push(RawNode {
                id,
                mask: CpuMask::Set(cpus),
            });
        }

        nodes.sort_by_key(|node| node.id);
        Some(nodes)
    }

    /// One single-CPU mask per physical core, in CPU order
    ///
    /// Stops at the first missing `cpuN` directory. Offline CPUs are skipped;
    /// a CPU without an `online` file (cpu0, or kernels without hotplug)
    /// counts as online.
    fn read_cores(&self) -> Vec<CpuMask> {
        let base = self.root.join("cpu");
        let mut cores = Vec::new();

        for cpu in 0usize.. {
            let dir = base.join(format!("cpu{cpu}"));
            if !dir.is_dir() {
                break;
            }
            match fs::read_to_string(dir.join("online")) {
                Ok(online) if online.trim() != "1" => continue,
                _ => {}
            }
            let Ok(siblings) = fs::read_to_string(dir.join("topology/thread_siblings_list")) else {
                continue;
            };
            let first = siblings
                .split([',', '-'])
                .next()
                .and_then(|s| s.trim().parse::<usize>().ok());
            if first == Some(cpu) {
                cores.push(CpuMask::Set(CpuSet::single(cpu)));
            }
        }
        cores
    }
}

impl Platform for LinuxSysfs {
    fn name(&self) -> &'static str {
        "linux-sysfs"
    }

    fn query(&self) -> Option<RawTopology> {
        let nodes = self.read_nodes()?;
        let cores = self.read_cores();
        Some(RawTopology { nodes, cores })
    }

    #[cfg(target_os = "linux")]
    fn bind_current_thread(&self, node: u32, mask: &CpuMask) -> Result<(), BindError> {
        let CpuMask::Set(cpus) = mask else {
            return Err(BindError::MaskKind {
                node,
                mask: mask.clone(),
            });
        };

        // SAFETY: cpu_set_t is a plain bit array, zero is the empty set
        let mut set: libc::cpu_set_t = unsafe { std::mem::zeroed() };
        for cpu in cpus.iter().filter(|&cpu| cpu < libc::CPU_SETSIZE as usize) {
            unsafe { libc::CPU_SET(cpu, &mut set) };
        }
        let rc = unsafe { libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set) };
        if rc != 0 {
            return Err(BindError::Os {
                node,
                call: "sched_setaffinity",
                source: io::Error::last_os_error(),
            });
        }

        prefer_memory_node(node);
        Ok(())
    }

    #[cfg(not(target_os = "linux"))]
    fn bind_current_thread(&self, _node: u32, _mask: &CpuMask) -> Result<(), BindError> {
        Err(BindError::Unsupported)
    }
}

/// Sets the calling thread's memory policy to prefer `node`
///
/// The affinity is already applied at this point, so a refused policy (for
/// example under a seccomp filter) only costs locality and is logged.
#[cfg(target_os = "linux")]
fn prefer_memory_node(node: u32) {
    const MPOL_PREFERRED: libc::c_long = 1;
    let bits = libc::c_ulong::BITS as usize;
    let node = node as usize;

    let mut nodemask: Vec<libc::c_ulong> = vec![0; node / bits + 1];
    nodemask[node / bits] |= (1 as libc::c_ulong) << (node % bits);
    let maxnode = (nodemask.len() * bits + 1) as libc::c_ulong;

    let rc = unsafe {
        libc::syscall(libc::SYS_set_mempolicy, MPOL_PREFERRED, nodemask.as_ptr(), maxnode)
    };
    if rc != 0 {
        log::warn!(
            "set_mempolicy(MPOL_PREFERRED, node {node}) failed: {}",
            io::Error::last_os_error()
        );
    }
}

// =============================================================================
// Windows
// =============================================================================

/// Topology from processor groups
#[cfg(windows)]
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsGroups;

#[cfg(windows)]
mod windows_impl {
    use std::io;

    use windows_sys::Win32::Foundation::{ERROR_INSUFFICIENT_BUFFER, GetLastError};
    use windows_sys::Win32::System::SystemInformation::{
        GROUP_AFFINITY, GetLogicalProcessorInformationEx, NUMA_NODE_RELATIONSHIP,
        PROCESSOR_RELATIONSHIP, RelationAll, RelationNumaNode, RelationProcessorCore,
        SYSTEM_LOGICAL_PROCESSOR_INFORMATION_EX,
    };
    use windows_sys::Win32::System::Threading::{GetCurrentThread, SetThreadGroupAffinity};

    use super::{BindError, CpuMask, Platform, RawNode, RawTopology, WindowsGroups};

    /// Fetches the variable-length record buffer, 8-byte aligned
    fn processor_information() -> Option<(Vec<u64>, usize)> {
        let mut len: u32 = 0;
        let mut buffer: Vec<u64> = Vec::new();
        loop {
            let ok = unsafe {
                GetLogicalProcessorInformationEx(RelationAll, buffer.as_mut_ptr().cast(), &mut len)
            };
            if ok != 0 {
                return Some((buffer, len as usize));
            }
            if unsafe { GetLastError() } != ERROR_INSUFFICIENT_BUFFER {
                log::debug!("GetLogicalProcessorInformationEx failed: {}", io::Error::last_os_error());
                return None;
            }
            buffer = vec![0u64; (len as usize).div_ceil(8)];
        }
    }

    impl Platform for WindowsGroups {
        fn name(&self) -> &'static str {
            "windows-groups"
        }

        fn query(&self) -> Option<RawTopology> {
            let (buffer, len) = processor_information()?;
            let base = buffer.as_ptr().cast::<u8>();
            let mut topology = RawTopology::default();
            let mut offset = 0usize;

            while offset + 8 <= len {
                // SAFETY: records are laid out back to back inside the first
                // `len` bytes; only the header and the relation that fits in
                // `Size` are read.
                unsafe {
                    let info = base.add(offset).cast::<SYSTEM_LOGICAL_PROCESSOR_INFORMATION_EX>();
                    let size = std::ptr::addr_of!((*info).Size).read_unaligned() as usize;
                    if size == 0 || offset + size > len {
                        break;
                    }
                    let relationship = std::ptr::addr_of!((*info).Relationship).read_unaligned();
                    if relationship == RelationNumaNode {
                        let numa: NUMA_NODE_RELATIONSHIP =
                            std::ptr::addr_of!((*info).Anonymous.NumaNode).read_unaligned();
                        let group: GROUP_AFFINITY = numa.Anonymous.GroupMask;
                        topology.nodes.push(RawNode {
                            id: numa.NodeNumber,
                            mask: CpuMask::Group {
                                group: group.Group,
                                mask: group.Mask as u64,
                            },
                        });
                    } else if relationship == RelationProcessorCore {
                        let core: PROCESSOR_RELATIONSHIP =
                            std::ptr::addr_of!((*info).Anonymous.Processor).read_unaligned();
                        let group = core.GroupMask[0];
                        topology.cores.push(CpuMask::Group {
                            group: group.Group,
                            mask: group.Mask as u64,
                        });
                    }
                    offset += size;
                }
            }
            Some(topology)
        }

        fn bind_current_thread(&self, node: u32, mask: &CpuMask) -> Result<(), BindError> {
            let CpuMask::Group { group, mask: bits } = mask else {
                return Err(BindError::MaskKind {
                    node,
                    mask: mask.clone(),
                });
            };
            let affinity = GROUP_AFFINITY {
                Mask: *bits as usize,
                Group: *group,
                Reserved: [0; 3],
            };
            let ok = unsafe {
                SetThreadGroupAffinity(GetCurrentThread(), &affinity, std::ptr::null_mut())
            };
            if ok == 0 {
                return Err(BindError::Os {
                    node,
                    call: "SetThreadGroupAffinity",
                    source: io::Error::last_os_error(),
                });
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    /// Two nodes of 2 cores with 2 hyperthreads each; cpu7 is offline
    fn fake_sysfs(root: &Path) {
        write(root, "node/node0/cpulist", "0-1,4-5\n");
        write(root, "node/node1/cpulist", "2-3,6-7\n");
        write(root, "node/possible", "0-1\n");
        let siblings = ["0,4", "1,5", "2,6", "3,7", "0,4", "1,5", "2,6", "3,7"];
        for (cpu, list) in siblings.iter().enumerate() {
            write(root, &format!("cpu/cpu{cpu}/topology/thread_siblings_list"), &format!("{list}\n"));
            if cpu > 0 {
                let online = if cpu == 7 { "0\n" } else { "1\n" };
                write(root, &format!("cpu/cpu{cpu}/online"), online);
            }
        }
    }

    #[test]
    fn test_linux_sysfs_query() {
        let dir = tempfile::tempdir().unwrap();
        fake_sysfs(dir.path());

        let raw = LinuxSysfs::with_root(dir.path()).query().unwrap();
        assert_eq!(raw.nodes.len(), 2);
        assert_eq!(raw.nodes[0].id, 0);
        assert_eq!(raw.nodes[1].mask, CpuMask::Set([2, 3, 6, 7].into_iter().collect()));
        assert_eq!(
            raw.cores,
            (0..4).map(|cpu| CpuMask::Set(CpuSet::single(cpu))).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_linux_sysfs_skips_malformed_node() {
        let dir = tempfile::tempdir().unwrap();
        fake_sysfs(dir.path());
        write(dir.path(), "node/node1/cpulist", "garbage\n");

        let raw = LinuxSysfs::with_root(dir.path()).query().unwrap();
        assert_eq!(raw.nodes.len(), 1);
        assert_eq!(raw.nodes[0].id, 0);
    }

    #[test]
    fn test_linux_sysfs_missing_tree() {
        let dir = tempfile::tempdir().unwrap();
        assert!(LinuxSysfs::with_root(dir.path().join("nope")).query().is_none());
    }

    #[test]
    fn test_unsupported_platform() {
        assert!(Unsupported.query().is_none());
        assert!(Unsupported.bind_current_thread(0, &CpuMask::All).is_ok());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_linux_bind_rejects_group_mask() {
        let err = LinuxSysfs::default()
            .bind_current_thread(3, &CpuMask::Group { group: 0, mask: 1 })
            .unwrap_err();
        assert!(matches!(err, BindError::MaskKind { node: 3, .. }));
    }
}
