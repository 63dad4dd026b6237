//! Raw code-memory access.
//!
//! This is the only module that turns a [`TargetAddress`] into a pointer.
//! Writes raise the protection of every page the span touches to
//! read+write+execute, copy the bytes, flush the instruction cache and put
//! each page back to the protection it had before. Pages are handled one by
//! one so a span straddling two differently protected pages restores both
//! correctly.

use crate::hooks::TargetAddress;
use log::trace;
use once_cell::sync::Lazy;
use shared::errors::HookError;
use std::io;
use std::ptr;
use std::sync::{Mutex, PoisonError};

/// Byte-level access to executable memory.
///
/// The engine talks to code exclusively through this trait, which keeps the
/// unsafe surface in one place and lets tests substitute a fake backend.
pub trait CodeMemory {
    /// Copies `len` bytes starting at `address`.
    ///
    /// # Safety
    /// `address..address + len` must be mapped and readable.
    unsafe fn read(&self, address: TargetAddress, len: usize) -> Result<Vec<u8>, HookError>;

    /// Overwrites the bytes at `address` and makes the CPU observe them.
    ///
    /// # Safety
    /// `address..address + bytes.len()` must be mapped code owned by the
    /// caller, and no thread may be executing those bytes during the call.
    unsafe fn write(&self, address: TargetAddress, bytes: &[u8]) -> Result<(), HookError>;
}

/// Page protection is process-wide state. Two writers raising and restoring
/// the same page concurrently could otherwise leave it read-only under the
/// other's copy.
static PROTECT_LOCK: Mutex<()> = Mutex::new(());

static PAGE_SIZE: Lazy<usize> = Lazy::new(os::page_size);

/// [`CodeMemory`] over the current process's address space.
#[derive(Debug, Clone, Copy)]
pub struct ProcessMemory {
    page_size: usize,
}

impl ProcessMemory {
    /// Fails with [`HookError::UnsupportedPlatform`] when this OS has no
    /// protection backend.
    pub fn new() -> Result<Self, HookError> {
        if !os::SUPPORTED {
            return Err(HookError::UnsupportedPlatform(format!(
                "no memory-protection backend for {}",
                std::env::consts::OS
            )));
        }
        Ok(Self { page_size: *PAGE_SIZE })
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }
}

impl CodeMemory for ProcessMemory {
    unsafe fn read(&self, address: TargetAddress, len: usize) -> Result<Vec<u8>, HookError> {
        let mut buf = vec![0u8; len];
        unsafe { ptr::copy_nonoverlapping(address.get() as *const u8, buf.as_mut_ptr(), len) };
        Ok(buf)
    }

    unsafe fn write(&self, address: TargetAddress, bytes: &[u8]) -> Result<(), HookError> {
        if bytes.is_empty() {
            return Ok(());
        }

        let span = PageSpan::covering(address.get(), bytes.len(), self.page_size);
        let _guard = PROTECT_LOCK.lock().unwrap_or_else(PoisonError::into_inner);

        let prior = unsafe { os::raise(&span)? };
        trace!(
            "raised {} page(s) at {:#x} for a {}-byte write to {}",
            span.page_count(),
            span.start,
            bytes.len(),
            address
        );

        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), address.get() as *mut u8, bytes.len());
            os::flush_icache(address.get(), bytes.len())?;
            os::restore(&prior, self.page_size)?;
        }
        Ok(())
    }
}

/// Page-aligned range covering a byte span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PageSpan {
    start: usize,
    len: usize,
    page_size: usize,
}

impl PageSpan {
    /// `page_size` must be a power of two; `len` of zero still covers the
    /// page holding `address`.
    pub(crate) fn covering(address: usize, len: usize, page_size: usize) -> Self {
        debug_assert!(page_size.is_power_of_two());
        let mask = !(page_size - 1);
        let start = address & mask;
        let last = address.saturating_add(len.max(1) - 1);
        let end = (last & mask).saturating_add(page_size);
        Self {
            start,
            len: end - start,
            page_size,
        }
    }

    pub(crate) fn pages(&self) -> impl Iterator<Item = usize> + '_ {
        (self.start..self.start + self.len).step_by(self.page_size)
    }

    pub(crate) fn page_count(&self) -> usize {
        self.len / self.page_size
    }
}

fn native(api: &'static str, address: usize, source: io::Error) -> HookError {
    HookError::NativeApiFailure { api, address, source }
}

#[cfg(windows)]
mod os {
    use super::{native, PageSpan};
    use shared::errors::HookError;
    use std::ffi::c_void;
    use std::io;
    use windows::Win32::System::{
        Diagnostics::Debug::FlushInstructionCache,
        Memory::{VirtualProtect, PAGE_EXECUTE_READWRITE, PAGE_PROTECTION_FLAGS},
        SystemInformation::{GetSystemInfo, SYSTEM_INFO},
        Threading::GetCurrentProcess,
    };

    pub(super) const SUPPORTED: bool = true;

    pub(super) type Protection = PAGE_PROTECTION_FLAGS;

    pub(super) fn page_size() -> usize {
        let mut info = SYSTEM_INFO::default();
        unsafe { GetSystemInfo(&mut info) };
        info.dwPageSize as usize
    }

    /// `VirtualProtect` hands back the previous value, so each page's prior
    /// protection is captured by the call that changes it.
    pub(super) unsafe fn raise(span: &PageSpan) -> Result<Vec<(usize, Protection)>, HookError> {
        let mut prior = Vec::with_capacity(span.page_count());
        for page in span.pages() {
            let mut old = PAGE_PROTECTION_FLAGS::default();
            let changed = unsafe {
                VirtualProtect(page as *const c_void, span.page_size, PAGE_EXECUTE_READWRITE, &mut old)
            };
            changed.map_err(|e| native("VirtualProtect", page, io::Error::other(e)))?;
            prior.push((page, old));
        }
        Ok(prior)
    }

    pub(super) unsafe fn restore(prior: &[(usize, Protection)], page_size: usize) -> Result<(), HookError> {
        for &(page, protection) in prior.iter().rev() {
            let mut tmp = PAGE_PROTECTION_FLAGS::default();
            let restored = unsafe { VirtualProtect(page as *const c_void, page_size, protection, &mut tmp) };
            restored.map_err(|e| native("VirtualProtect", page, io::Error::other(e)))?;
        }
        Ok(())
    }

    pub(super) unsafe fn flush_icache(address: usize, len: usize) -> Result<(), HookError> {
        let flushed = unsafe { FlushInstructionCache(GetCurrentProcess(), Some(address as *const c_void), len) };
        flushed.map_err(|e| native("FlushInstructionCache", address, io::Error::other(e)))
    }
}

#[cfg(target_os = "linux")]
mod os {
    use super::{native, PageSpan};
    use shared::errors::HookError;
    use std::fs;
    use std::io;
    use std::sync::atomic::{fence, Ordering};

    pub(super) const SUPPORTED: bool = true;

    pub(super) type Protection = libc::c_int;

    const MAPS: &str = "/proc/self/maps";

    pub(super) fn page_size() -> usize {
        unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
    }

    /// One line of `/proc/self/maps`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(super) struct Region {
        pub start: usize,
        pub end: usize,
        pub protection: Protection,
    }

    pub(super) fn parse_maps(maps: &str) -> Vec<Region> {
        maps.lines().filter_map(parse_line).collect()
    }

    fn parse_line(line: &str) -> Option<Region> {
        let mut fields = line.split_whitespace();
        let (start, end) = fields.next()?.split_once('-')?;
        let perms = fields.next()?.as_bytes();
        if perms.len() < 3 {
            return None;
        }

        let mut protection = libc::PROT_NONE;
        if perms[0] == b'r' {
            protection |= libc::PROT_READ;
        }
        if perms[1] == b'w' {
            protection |= libc::PROT_WRITE;
        }
        if perms[2] == b'x' {
            protection |= libc::PROT_EXEC;
        }

        Some(Region {
            start: usize::from_str_radix(start, 16).ok()?,
            end: usize::from_str_radix(end, 16).ok()?,
            protection,
        })
    }

    pub(super) fn protection_of(regions: &[Region], page: usize) -> Option<Protection> {
        regions
            .iter()
            .find(|r| r.start <= page && page < r.end)
            .map(|r| r.protection)
    }

    /// `mprotect` does not report the previous protection, so it is read from
    /// the kernel's mapping table before anything changes.
    pub(super) unsafe fn raise(span: &PageSpan) -> Result<Vec<(usize, Protection)>, HookError> {
        let maps = fs::read_to_string(MAPS).map_err(|e| native(MAPS, span.start, e))?;
        let regions = parse_maps(&maps);

        let prior = span
            .pages()
            .map(|page| {
                protection_of(&regions, page)
                    .map(|protection| (page, protection))
                    .ok_or_else(|| {
                        native(MAPS, page, io::Error::new(io::ErrorKind::NotFound, "page is not mapped"))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let rwx = libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC;
        if unsafe { libc::mprotect(span.start as *mut libc::c_void, span.len, rwx) } != 0 {
            return Err(native("mprotect", span.start, io::Error::last_os_error()));
        }
        Ok(prior)
    }

    pub(super) unsafe fn restore(prior: &[(usize, Protection)], page_size: usize) -> Result<(), HookError> {
        for &(page, protection) in prior.iter().rev() {
            if unsafe { libc::mprotect(page as *mut libc::c_void, page_size, protection) } != 0 {
                return Err(native("mprotect", page, io::Error::last_os_error()));
            }
        }
        Ok(())
    }

    /// x86 keeps instruction fetch coherent with stores from the same core;
    /// a full fence orders the patch before any later call into it.
    pub(super) unsafe fn flush_icache(_address: usize, _len: usize) -> Result<(), HookError> {
        fence(Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(not(any(windows, target_os = "linux")))]
mod os {
    use super::{native, PageSpan};
    use shared::errors::HookError;
    use std::io;

    pub(super) const SUPPORTED: bool = false;

    pub(super) type Protection = ();

    pub(super) fn page_size() -> usize {
        4096
    }

    pub(super) unsafe fn raise(span: &PageSpan) -> Result<Vec<(usize, Protection)>, HookError> {
        Err(native("mprotect", span.start, io::Error::from(io::ErrorKind::Unsupported)))
    }

    pub(super) unsafe fn restore(_prior: &[(usize, Protection)], _page_size: usize) -> Result<(), HookError> {
        Ok(())
    }

    pub(super) unsafe fn flush_icache(_address: usize, _len: usize) -> Result<(), HookError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_inside_one_page() {
        let span = PageSpan::covering(0x1010, 13, 0x1000);
        assert_eq!(span.start, 0x1000);
        assert_eq!(span.page_count(), 1);
        assert_eq!(span.pages().collect::<Vec<_>>(), vec![0x1000]);
    }

    #[test]
    fn span_ending_on_page_boundary_stays_on_one_page() {
        let span = PageSpan::covering(0x1ff3, 13, 0x1000);
        assert_eq!(span.page_count(), 1);
    }

    #[test]
    fn span_straddling_two_pages() {
        let span = PageSpan::covering(0x1ffa, 13, 0x1000);
        assert_eq!(span.start, 0x1000);
        assert_eq!(span.pages().collect::<Vec<_>>(), vec![0x1000, 0x2000]);
    }

    #[test]
    fn empty_span_covers_its_page() {
        let span = PageSpan::covering(0x3456, 0, 0x1000);
        assert_eq!(span.pages().collect::<Vec<_>>(), vec![0x3000]);
    }

    #[test]
    #[cfg(any(windows, target_os = "linux"))]
    fn read_copies_bytes() {
        let data = [1u8, 2, 3, 4, 5, 6];
        let mem = ProcessMemory::new().unwrap();
        let got = unsafe { mem.read(TargetAddress::from_ptr(data.as_ptr()), data.len()) }.unwrap();
        assert_eq!(got, data);
    }

    #[cfg(target_os = "linux")]
    mod linux {
        use super::super::os::{parse_maps, protection_of};
        use super::*;
        use std::fs;

        const SAMPLE: &str = "\
55d4c7a00000-55d4c7a21000 r-xp 00000000 08:01 1234   /usr/bin/thing
55d4c7a21000-55d4c7a22000 rw-p 00021000 08:01 1234   /usr/bin/thing
7ffd1c000000-7ffd1c021000 ---p 00000000 00:00 0
garbage line
";

        #[test]
        fn parses_proc_maps() {
            let regions = parse_maps(SAMPLE);
            assert_eq!(regions.len(), 3);
            assert_eq!(
                protection_of(&regions, 0x55d4c7a10000),
                Some(libc::PROT_READ | libc::PROT_EXEC)
            );
            assert_eq!(
                protection_of(&regions, 0x55d4c7a21000),
                Some(libc::PROT_READ | libc::PROT_WRITE)
            );
            assert_eq!(protection_of(&regions, 0x7ffd1c000000), Some(libc::PROT_NONE));
            assert_eq!(protection_of(&regions, 0x1000), None);
        }

        fn current_protection(page: usize) -> Option<libc::c_int> {
            let maps = fs::read_to_string("/proc/self/maps").unwrap();
            protection_of(&parse_maps(&maps), page)
        }

        #[test]
        fn straddling_write_restores_each_page() {
            let mem = ProcessMemory::new().unwrap();
            let page_size = mem.page_size();
            unsafe {
                let base = libc::mmap(
                    ptr::null_mut(),
                    page_size * 2,
                    libc::PROT_READ | libc::PROT_EXEC,
                    libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                    -1,
                    0,
                );
                assert_ne!(base, libc::MAP_FAILED);
                let first = base as usize;
                let second = first + page_size;
                assert_eq!(libc::mprotect(second as *mut libc::c_void, page_size, libc::PROT_READ), 0);

                let at = TargetAddress::new(second - 5);
                let patch = [0x49, 0xBB, 1, 2, 3, 4, 5, 6, 7, 8, 0x41, 0xFF, 0xE3];
                mem.write(at, &patch).unwrap();

                assert_eq!(mem.read(at, patch.len()).unwrap(), patch);
                assert_eq!(current_protection(first), Some(libc::PROT_READ | libc::PROT_EXEC));
                assert_eq!(current_protection(second), Some(libc::PROT_READ));

                libc::munmap(base, page_size * 2);
            }
        }

        #[test]
        fn write_to_unmapped_page_is_native_failure() {
            let mem = ProcessMemory::new().unwrap();
            let page_size = mem.page_size();
            unsafe {
                // Reserve then release a range so the address is known to be unmapped.
                let base = libc::mmap(
                    ptr::null_mut(),
                    page_size,
                    libc::PROT_NONE,
                    libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                    -1,
                    0,
                );
                assert_ne!(base, libc::MAP_FAILED);
                libc::munmap(base, page_size);

                let err = mem.write(TargetAddress::new(base as usize), &[0xC3]).unwrap_err();
                assert!(matches!(err, HookError::NativeApiFailure { .. }));
                assert!(err.is_environmental());
            }
        }
    }
}
