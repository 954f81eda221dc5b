//! Support for safely touching a task's memory from kernel code.
//!
//! A task's entire address space -- both its stack and anything it has
//! `MALLOC`'d -- lives in the MPU-managed SRAM arena and is described
//! completely by its `srd_mask` (see `mpu`). That means "can this task
//! read/write this range" reduces to "are all the subregions this range
//! touches granted in the mask", which is what `Task::can_read`/
//! `can_write` check before the kernel ever dereferences a task-supplied
//! pointer -- mirroring the teacher's `Task::can_read`/`can_write` +
//! `USlice` pattern, simplified here because this kernel has no IPC
//! lease/message machinery to generalize over.

use crate::mpu::range_access_ok;
use crate::task::Task;

impl Task {
    /// True if every byte of `[base_addr, base_addr + len)` lies within a
    /// subregion this task's `srd_mask` currently grants.
    pub fn can_read(&self, base_addr: u32, len: u32) -> bool {
        range_access_ok(&self.srd_mask, base_addr, len)
    }

    /// Same check, used at call sites that are about to write rather than
    /// read. The two are identical today (the mask doesn't distinguish
    /// read from write access), but kept as separate methods so a future
    /// read-only window doesn't require renaming call sites.
    pub fn can_write(&self, base_addr: u32, len: u32) -> bool {
        range_access_ok(&self.srd_mask, base_addr, len)
    }
}

/// Copies `src` into the task-owned buffer at `dest_addr` after checking
/// that `task` may write that range. Returns the number of bytes copied,
/// which is `min(src.len(), dest_len)`, or `None` if the check fails.
///
/// # Safety
///
/// The caller must ensure `dest_addr` really is backed by live memory of
/// at least `dest_len` bytes -- the MPU check only proves the *task* is
/// entitled to that range, not that the range is valid kernel-readable
/// memory (the kernel's view of SRAM is direct, so in practice this holds
/// whenever `can_write` passed, but the invariant is worth stating).
pub unsafe fn copy_to_task(task: &Task, dest_addr: u32, dest_len: usize, src: &[u8]) -> Option<usize> {
    if !task.can_write(dest_addr, dest_len as u32) {
        return None;
    }
    let n = src.len().min(dest_len);
    let dest = core::slice::from_raw_parts_mut(dest_addr as *mut u8, n);
    dest.copy_from_slice(&src[..n]);
    Some(n)
}

/// Reads up to `len` bytes from task memory at `addr` into `out`, after
/// checking `task` may read that range. Returns the number of bytes
/// actually read, or `None` if the check fails.
///
/// # Safety
///
/// Same caveat as `copy_to_task`: a passing MPU check is what makes this
/// sound, because task memory otherwise looks like ordinary readable
/// kernel-address-space memory.
pub unsafe fn copy_from_task(task: &Task, addr: u32, len: usize, out: &mut [u8]) -> Option<usize> {
    if !task.can_read(addr, len as u32) {
        return None;
    }
    let n = len.min(out.len());
    let src = core::slice::from_raw_parts(addr as *const u8, n);
    out[..n].copy_from_slice(src);
    Some(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpu::{add_access_window, Heap, SrdMask};

    #[test]
    fn can_read_false_with_no_grants() {
        let t = Task {
            srd_mask: SrdMask::DENY_ALL,
            ..Task::EMPTY
        };
        assert!(!t.can_read(0x2000_1000, 4));
    }

    #[test]
    fn can_read_true_within_granted_allocation() {
        let mut heap = Heap::new();
        let alloc = heap.allocate(100).unwrap();
        let mut mask = SrdMask::DENY_ALL;
        add_access_window(&mut mask, &heap, alloc.base_addr, alloc.size_bytes);
        let t = Task {
            srd_mask: mask,
            ..Task::EMPTY
        };
        assert!(t.can_read(alloc.base_addr, 4));
    }
}
