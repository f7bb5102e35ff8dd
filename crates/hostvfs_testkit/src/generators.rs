//! Property-based test generators using proptest.
//!
//! Provides strategies for lock-call sequences, allocation sizes and file
//! I/O, plus the reference model the lock sequences are checked against.

use hostvfs_core::LockLevel;
use proptest::prelude::*;

/// One lock-related call on a file handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOp {
    /// `lock(level)`.
    Lock(LockLevel),
    /// `unlock(level)`.
    Unlock(LockLevel),
}

impl LockOp {
    /// Applies the op to `current` under the strict ordering rule.
    ///
    /// Returns the new level, or `None` if the call must be rejected.
    #[must_use]
    pub fn apply(self, current: LockLevel) -> Option<LockLevel> {
        match self {
            Self::Lock(level) if level > current => Some(level),
            Self::Unlock(level) if level < current => Some(level),
            _ => None,
        }
    }
}

/// Strategy for generating any lock level.
pub fn lock_level_strategy() -> impl Strategy<Value = LockLevel> {
    prop::sample::select(LockLevel::ALL.to_vec())
}

/// Strategy for generating a single lock or unlock call.
pub fn lock_op_strategy() -> impl Strategy<Value = LockOp> {
    prop_oneof![
        lock_level_strategy().prop_map(LockOp::Lock),
        lock_level_strategy().prop_map(LockOp::Unlock),
    ]
}

/// Strategy for generating a sequence of lock calls.
pub fn lock_sequence_strategy(max_ops: usize) -> impl Strategy<Value = Vec<LockOp>> {
    prop::collection::vec(lock_op_strategy(), 0..max_ops)
}

/// Strategy for allocation sizes: zero, tiny, struct-sized, pages, large.
pub fn alloc_size_strategy() -> impl Strategy<Value = usize> {
    prop_oneof![
        Just(0usize),
        1usize..16,
        16usize..512,
        512usize..65_536,
        65_536usize..(4 << 20),
    ]
}

/// Strategy for a write: an offset and a non-empty payload.
pub fn write_strategy(max_offset: u64) -> impl Strategy<Value = (u64, Vec<u8>)> {
    (0..max_offset, prop::collection::vec(any::<u8>(), 1..256))
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use crate::fixtures::{memory_vfs, RW_CREATE};
    use hostvfs_core::{
        HeaderAllocator, IoMethods, MemMethods, PassthroughAllocator, ResultCode, Vfs, HEADER_SIZE,
    };
    use hostvfs_platform::{PlatformHeap, SystemHeap};
    use std::path::Path;
    use std::sync::Arc;

    fn allocators() -> Vec<Box<dyn MemMethods>> {
        vec![
            Box::new(PassthroughAllocator::new(Arc::new(SystemHeap::new()))),
            Box::new(HeaderAllocator::new(Arc::new(
                SystemHeap::without_size_reporting(),
            ))),
        ]
    }

    #[test]
    fn model_rejects_equal_levels() {
        assert_eq!(LockOp::Lock(LockLevel::Shared).apply(LockLevel::Shared), None);
        assert_eq!(LockOp::Unlock(LockLevel::None).apply(LockLevel::None), None);
        assert_eq!(
            LockOp::Lock(LockLevel::Exclusive).apply(LockLevel::None),
            Some(LockLevel::Exclusive)
        );
    }

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn lock_calls_follow_strict_ordering(ops in lock_sequence_strategy(32)) {
            let vfs = memory_vfs();
            let id = vfs.open(Some(Path::new("/db")), RW_CREATE).unwrap().id;
            let mut model = LockLevel::None;

            for op in ops {
                let result = match op {
                    LockOp::Lock(level) => vfs.lock(id, level),
                    LockOp::Unlock(level) => vfs.unlock(id, level),
                };
                match op.apply(model) {
                    Some(next) => {
                        prop_assert!(result.is_ok());
                        model = next;
                    }
                    None => {
                        let expected = match op {
                            LockOp::Lock(_) => ResultCode::IoErrLock,
                            LockOp::Unlock(_) => ResultCode::IoErrUnlock,
                        };
                        prop_assert_eq!(result.unwrap_err().code(), expected);
                    }
                }
                prop_assert_eq!(vfs.lock_level(id).unwrap(), model);
                prop_assert_eq!(vfs.check_reserved_lock(id).unwrap(), model > LockLevel::None);
            }
        }

        #[test]
        fn allocations_report_at_least_requested(n in alloc_size_strategy()) {
            for alloc in allocators() {
                let ptr = alloc.malloc(n).unwrap();
                unsafe {
                    prop_assert!(alloc.size(ptr) >= n);
                    std::ptr::write_bytes(ptr.as_ptr(), 0xC3, n);
                    prop_assert!(alloc.size(ptr) >= n);
                    alloc.free(ptr);
                }
            }
        }

        #[test]
        fn header_is_untouched_by_caller_writes(n in alloc_size_strategy()) {
            let heap = Arc::new(SystemHeap::without_size_reporting());
            let alloc = HeaderAllocator::new(Arc::clone(&heap) as Arc<dyn PlatformHeap>);
            let ptr = alloc.malloc(n).unwrap();
            unsafe {
                let header = std::slice::from_raw_parts(ptr.as_ptr().sub(HEADER_SIZE), HEADER_SIZE).to_vec();
                std::ptr::write_bytes(ptr.as_ptr(), 0xFF, n);
                let after = std::slice::from_raw_parts(ptr.as_ptr().sub(HEADER_SIZE), HEADER_SIZE);
                prop_assert_eq!(header.as_slice(), after);
                prop_assert_eq!(alloc.size(ptr), n);
                alloc.free(ptr);
            }
            prop_assert_eq!(heap.live_blocks(), 0);
        }

        #[test]
        fn realloc_keeps_prefix(n in alloc_size_strategy(), m in alloc_size_strategy()) {
            for alloc in allocators() {
                let ptr = alloc.malloc(n).unwrap();
                unsafe {
                    std::ptr::write_bytes(ptr.as_ptr(), 0x5A, n);
                    let moved = alloc.realloc(ptr, m).unwrap();
                    prop_assert!(alloc.size(moved) >= m);
                    let kept = std::slice::from_raw_parts(moved.as_ptr(), n.min(m));
                    prop_assert!(kept.iter().all(|b| *b == 0x5A));
                    alloc.free(moved);
                }
            }
        }

        #[test]
        fn roundup_is_idempotent(n in any::<usize>()) {
            for alloc in allocators() {
                let once = alloc.roundup(n);
                prop_assert_eq!(alloc.roundup(once), once);
            }
        }

        #[test]
        fn roundup_covers_request(n in any::<usize>()) {
            for alloc in allocators() {
                prop_assert!(alloc.roundup(n) >= n);
            }
        }

        #[test]
        fn reads_see_last_write(writes in prop::collection::vec(write_strategy(8192), 1..16)) {
            let vfs = memory_vfs();
            let id = vfs.open(Some(Path::new("/db")), RW_CREATE).unwrap().id;
            let mut model = Vec::new();

            for (offset, data) in &writes {
                vfs.write(id, data, *offset).unwrap();
                let start = usize::try_from(*offset).unwrap();
                if model.len() < start + data.len() {
                    model.resize(start + data.len(), 0);
                }
                model[start..start + data.len()].copy_from_slice(data);
            }

            prop_assert_eq!(vfs.file_size(id).unwrap(), model.len() as u64);
            let mut buf = vec![0u8; model.len()];
            vfs.read(id, &mut buf, 0).unwrap();
            prop_assert_eq!(buf, model);
        }
    }
}
