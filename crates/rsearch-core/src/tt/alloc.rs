//! Backing memory for the cluster array
//!
//! Alignment contract: the returned block is zero-filled and aligned to at
//! least the requested alignment (the cluster alignment, 32 bytes, raised to a
//! 64-byte cache line). When large pages are requested and granted the block is
//! additionally aligned to the large page size. Allocation failure aborts the
//! process through `handle_alloc_error`; a table-less search cannot run.

use std::alloc::{Layout, handle_alloc_error};
use std::ptr::NonNull;

use log::{debug, warn};

#[cfg(not(windows))]
use std::alloc::{alloc_zeroed, dealloc};

#[cfg(windows)]
use windows_sys::Win32::Foundation::{CloseHandle, ERROR_SUCCESS, GetLastError};
#[cfg(windows)]
use windows_sys::Win32::Security::{
    AdjustTokenPrivileges, LUID, LUID_AND_ATTRIBUTES, LookupPrivilegeValueA, SE_PRIVILEGE_ENABLED,
    TOKEN_ADJUST_PRIVILEGES, TOKEN_PRIVILEGES, TOKEN_QUERY,
};
#[cfg(windows)]
use windows_sys::Win32::System::Memory::{
    GetLargePageMinimum, MEM_COMMIT, MEM_LARGE_PAGES, MEM_RELEASE, MEM_RESERVE, PAGE_READWRITE,
    VirtualAlloc, VirtualFree,
};
#[cfg(windows)]
use windows_sys::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};

/// Cache line size used as the minimum alignment
pub(super) const CACHE_LINE_SIZE: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum AllocKind {
    LargePages,
    Regular,
}

pub(super) struct Allocation {
    ptr: NonNull<u8>,
    size: usize,
    kind: AllocKind,
    #[cfg(not(windows))]
    layout: Layout,
}

impl Allocation {
    /// Allocates `size` zeroed bytes
    pub(super) fn allocate(size: usize, alignment: usize, large_pages: bool) -> Self {
        debug_assert!(size > 0);
        let alignment = alignment.max(CACHE_LINE_SIZE);

        #[cfg(windows)]
        {
            let _ = alignment;
            if large_pages {
                if let Some(alloc) = try_alloc_large_pages(size) {
                    return alloc;
                }
                warn!(
                    "Failed to allocate {}MB large page memory for transposition table, switching to default",
                    size >> 20
                );
            }
            alloc_windows(size)
        }

        #[cfg(not(windows))]
        {
            alloc_unix(size, alignment, large_pages)
        }
    }

    pub(super) fn ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    pub(super) fn size(&self) -> usize {
        self.size
    }

    pub(super) fn kind(&self) -> AllocKind {
        self.kind
    }
}

#[cfg(windows)]
fn align_up(value: usize, align: usize) -> usize {
    debug_assert!(
        value.checked_add(align - 1).is_some(),
        "align_up overflow: value={value}, align={align}"
    );
    value.div_ceil(align) * align
}

#[cfg(windows)]
fn try_alloc_large_pages(size: usize) -> Option<Allocation> {
    unsafe {
        let large_page_size = GetLargePageMinimum();
        if large_page_size == 0 {
            debug!("large pages are not supported on this system");
            return None;
        }

        let mut token = std::ptr::null_mut();
        if OpenProcessToken(GetCurrentProcess(), TOKEN_ADJUST_PRIVILEGES | TOKEN_QUERY, &mut token)
            == 0
        {
            return None;
        }

        let mut luid = LUID {
            LowPart: 0,
            HighPart: 0,
        };
        if LookupPrivilegeValueA(std::ptr::null(), c"SeLockMemoryPrivilege".as_ptr().cast(), &mut luid)
            == 0
        {
            CloseHandle(token);
            return None;
        }

        let tp = TOKEN_PRIVILEGES {
            PrivilegeCount: 1,
            Privileges: [LUID_AND_ATTRIBUTES {
                Luid: luid,
                Attributes: SE_PRIVILEGE_ENABLED,
            }],
        };
        let mut prev_tp = TOKEN_PRIVILEGES {
            PrivilegeCount: 0,
            Privileges: [LUID_AND_ATTRIBUTES {
                Luid: LUID {
                    LowPart: 0,
                    HighPart: 0,
                },
                Attributes: 0,
            }],
        };
        let mut prev_len = std::mem::size_of::<TOKEN_PRIVILEGES>() as u32;

        // A non-zero return with a last error other than ERROR_SUCCESS means the
        // privilege was not actually granted (ERROR_NOT_ALL_ASSIGNED)
        if AdjustTokenPrivileges(token, 0, &tp, prev_len, &mut prev_tp, &mut prev_len) == 0
            || GetLastError() != ERROR_SUCCESS
        {
            warn!("No privilege for large pages");
            CloseHandle(token);
            return None;
        }

        let alloc_size = align_up(size, large_page_size);
        let ptr = VirtualAlloc(
            std::ptr::null(),
            alloc_size,
            MEM_RESERVE | MEM_COMMIT | MEM_LARGE_PAGES,
            PAGE_READWRITE,
        );

        AdjustTokenPrivileges(
            token,
            0,
            &prev_tp,
            0,
            std::ptr::null_mut(),
            std::ptr::null_mut(),
        );
        CloseHandle(token);

        let ptr = NonNull::new(ptr.cast::<u8>())?;
        debug!("allocated {}MB of large page memory", alloc_size >> 20);
        Some(Allocation {
            ptr,
            size,
            kind: AllocKind::LargePages,
        })
    }
}

#[cfg(windows)]
fn alloc_windows(size: usize) -> Allocation {
    // VirtualAlloc returns page-aligned, zero-filled memory
    let ptr = unsafe {
        VirtualAlloc(std::ptr::null(), size, MEM_RESERVE | MEM_COMMIT, PAGE_READWRITE)
    };
    let ptr = NonNull::new(ptr.cast::<u8>()).unwrap_or_else(|| {
        handle_alloc_error(
            Layout::from_size_align(size, 4096).unwrap_or_else(|_| Layout::new::<[u8; 4096]>()),
        )
    });
    Allocation {
        ptr,
        size,
        kind: AllocKind::Regular,
    }
}

#[cfg(not(windows))]
fn alloc_unix(size: usize, alignment: usize, large_pages: bool) -> Allocation {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    let alignment = if large_pages {
        alignment.max(2 * 1024 * 1024)
    } else {
        alignment
    };

    let layout = match Layout::from_size_align(size, alignment) {
        Ok(layout) => layout.pad_to_align(),
        // Only reachable with sizes near isize::MAX, which no allocator can satisfy
        Err(_) => handle_alloc_error(Layout::new::<[u8; CACHE_LINE_SIZE]>()),
    };
    let ptr = unsafe { alloc_zeroed(layout) };
    let Some(ptr) = NonNull::new(ptr) else {
        handle_alloc_error(layout);
    };

    let kind = if large_pages {
        advise_huge_pages(ptr, layout.size())
    } else {
        AllocKind::Regular
    };

    Allocation {
        ptr,
        size,
        kind,
        layout,
    }
}

/// Asks the kernel to back the block with transparent huge pages
#[cfg(any(target_os = "linux", target_os = "android"))]
fn advise_huge_pages(ptr: NonNull<u8>, len: usize) -> AllocKind {
    let result = unsafe { libc::madvise(ptr.as_ptr().cast(), len, libc::MADV_HUGEPAGE) };
    if result == 0 {
        debug!("madvise(MADV_HUGEPAGE) accepted for {}MB", len >> 20);
        AllocKind::LargePages
    } else {
        warn!(
            "madvise(MADV_HUGEPAGE) failed: {}, using regular pages",
            std::io::Error::last_os_error()
        );
        AllocKind::Regular
    }
}

#[cfg(all(not(windows), not(any(target_os = "linux", target_os = "android"))))]
fn advise_huge_pages(_ptr: NonNull<u8>, _len: usize) -> AllocKind {
    debug!("large pages are not supported on this platform");
    AllocKind::Regular
}

impl Drop for Allocation {
    fn drop(&mut self) {
        unsafe {
            #[cfg(windows)]
            {
                let ok = VirtualFree(self.ptr.as_ptr().cast(), 0, MEM_RELEASE);
                if ok == 0 {
                    warn!("VirtualFree failed with error {}", GetLastError());
                    debug_assert!(false, "VirtualFree failed");
                }
            }
            #[cfg(not(windows))]
            {
                dealloc(self.ptr.as_ptr(), self.layout);
            }
        }
    }
}

// SAFETY: Allocation exclusively owns its block; access is mediated by the table.
unsafe impl Send for Allocation {}
unsafe impl Sync for Allocation {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_is_zeroed_and_aligned() {
        let alloc = Allocation::allocate(4096, 32, false);
        assert_eq!(alloc.ptr().as_ptr() as usize % CACHE_LINE_SIZE, 0);
        assert_eq!(alloc.size(), 4096);
        assert_eq!(alloc.kind(), AllocKind::Regular);

        let bytes = unsafe { std::slice::from_raw_parts(alloc.ptr().as_ptr(), alloc.size()) };
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_large_page_request_falls_back_gracefully() {
        // Whatever the platform grants, the memory is usable and zeroed
        let alloc = Allocation::allocate(1 << 20, 32, true);
        let bytes = unsafe { std::slice::from_raw_parts(alloc.ptr().as_ptr(), alloc.size()) };
        assert!(bytes.iter().all(|&b| b == 0));
    }
}
