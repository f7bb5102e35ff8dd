//! Allocator provider.
//!
//! Two strategies sit over a [`PlatformHeap`]:
//!
//! - [`PassthroughAllocator`] forwards every call, and relies on the heap to
//!   report block sizes back.
//! - [`HeaderAllocator`] prefixes each block with a [`HEADER_SIZE`]-byte
//!   header holding the requested size, for heaps that cannot report sizes.
//!
//! [`resolve_strategy`] picks one once, at registration time, by probing the
//! heap with a single small allocation.

use crate::config::AllocatorStrategy;
use crate::error::OsResult;
use hostvfs_platform::{PlatformHeap, DEFAULT_ALIGNMENT};
use std::fmt::Debug;
use std::ptr::NonNull;
use std::sync::Arc;

/// Size of the header [`HeaderAllocator`] writes ahead of each block.
///
/// Equal to the heap's alignment so the returned pointer keeps it.
pub const HEADER_SIZE: usize = DEFAULT_ALIGNMENT;

/// Size of the block the capability probe allocates.
const PROBE_SIZE: usize = 16;

/// The engine's allocator table.
///
/// `malloc` and `realloc` return `None` on exhaustion; nothing else fails.
/// For every live block `p` returned by `malloc(n)` or `realloc(_, n)`,
/// `size(p) >= n`.
pub trait MemMethods: Send + Sync + Debug {
    /// Allocates at least `size` bytes.
    fn malloc(&self, size: usize) -> Option<NonNull<u8>>;

    /// Releases a block.
    ///
    /// # Safety
    ///
    /// `ptr` must come from this allocator and not have been freed.
    unsafe fn free(&self, ptr: NonNull<u8>);

    /// Resizes a block, preserving its contents up to the smaller size.
    ///
    /// On `None` the original block is untouched.
    ///
    /// # Safety
    ///
    /// `ptr` must come from this allocator and not have been freed.
    unsafe fn realloc(&self, ptr: NonNull<u8>, size: usize) -> Option<NonNull<u8>>;

    /// Returns the usable size of a block.
    ///
    /// # Safety
    ///
    /// `ptr` must come from this allocator and not have been freed.
    unsafe fn size(&self, ptr: NonNull<u8>) -> usize;

    /// Returns the size a request for `size` bytes is rounded up to.
    fn roundup(&self, size: usize) -> usize;

    /// Prepares the allocator.
    ///
    /// # Errors
    ///
    /// Returns an error if the allocator cannot be used.
    fn init(&self) -> OsResult<()> {
        Ok(())
    }

    /// Releases allocator-wide state.
    fn shutdown(&self) {}
}

/// Forwards straight to a heap that reports block sizes.
#[derive(Debug, Clone)]
pub struct PassthroughAllocator {
    heap: Arc<dyn PlatformHeap>,
}

impl PassthroughAllocator {
    /// Creates an allocator over `heap`.
    pub fn new(heap: Arc<dyn PlatformHeap>) -> Self {
        Self { heap }
    }
}

impl MemMethods for PassthroughAllocator {
    fn malloc(&self, size: usize) -> Option<NonNull<u8>> {
        self.heap.malloc(size)
    }

    unsafe fn free(&self, ptr: NonNull<u8>) {
        // SAFETY: forwarded caller contract
        unsafe { self.heap.free(ptr) }
    }

    unsafe fn realloc(&self, ptr: NonNull<u8>, size: usize) -> Option<NonNull<u8>> {
        // SAFETY: forwarded caller contract
        unsafe { self.heap.realloc(Some(ptr), size) }
    }

    unsafe fn size(&self, ptr: NonNull<u8>) -> usize {
        // SAFETY: forwarded caller contract
        unsafe { self.heap.alloc_size(ptr) }
    }

    fn roundup(&self, size: usize) -> usize {
        self.heap.quantize_size(size)
    }
}

/// Stores each block's requested size in a header ahead of the returned
/// pointer.
///
/// ```text
/// heap block:  [ size: usize | padding ][ caller bytes ... ]
///              ^ heap pointer            ^ returned pointer (+HEADER_SIZE)
/// ```
#[derive(Debug, Clone)]
pub struct HeaderAllocator {
    heap: Arc<dyn PlatformHeap>,
}

impl HeaderAllocator {
    /// Creates an allocator over `heap`.
    pub fn new(heap: Arc<dyn PlatformHeap>) -> Self {
        Self { heap }
    }

    /// Writes the header at the start of `block` and returns the caller's
    /// pointer.
    ///
    /// # Safety
    ///
    /// `block` must be a live heap block of at least `HEADER_SIZE` bytes.
    unsafe fn finish(block: NonNull<u8>, size: usize) -> NonNull<u8> {
        // SAFETY: the block is aligned to DEFAULT_ALIGNMENT >= align_of::<usize>()
        // and is at least HEADER_SIZE bytes long
        unsafe {
            block.cast::<usize>().as_ptr().write(size);
            block.add(HEADER_SIZE)
        }
    }

    /// Returns the heap pointer behind a caller pointer.
    ///
    /// # Safety
    ///
    /// `ptr` must have been produced by [`Self::finish`].
    unsafe fn block_of(ptr: NonNull<u8>) -> NonNull<u8> {
        // SAFETY: `ptr` sits HEADER_SIZE bytes into its heap block
        unsafe { ptr.sub(HEADER_SIZE) }
    }
}

impl MemMethods for HeaderAllocator {
    fn malloc(&self, size: usize) -> Option<NonNull<u8>> {
        let block = self.heap.malloc(size.checked_add(HEADER_SIZE)?)?;
        // SAFETY: fresh block of size + HEADER_SIZE bytes
        Some(unsafe { Self::finish(block, size) })
    }

    unsafe fn free(&self, ptr: NonNull<u8>) {
        // SAFETY: caller guarantees `ptr` is a live block from `malloc`
        unsafe { self.heap.free(Self::block_of(ptr)) }
    }

    unsafe fn realloc(&self, ptr: NonNull<u8>, size: usize) -> Option<NonNull<u8>> {
        let total = size.checked_add(HEADER_SIZE)?;
        // SAFETY: caller guarantees `ptr` is a live block from `malloc`; the
        // heap keeps the header bytes in place when it moves the block
        unsafe {
            let block = self.heap.realloc(Some(Self::block_of(ptr)), total)?;
            Some(Self::finish(block, size))
        }
    }

    unsafe fn size(&self, ptr: NonNull<u8>) -> usize {
        // SAFETY: caller guarantees `ptr` is live, so its header is too
        unsafe { Self::block_of(ptr).cast::<usize>().as_ptr().read() }
    }

    fn roundup(&self, size: usize) -> usize {
        // Near the top of the address space the header eats into the
        // quantum; the request itself is the floor
        self.heap
            .quantize_size(size.saturating_add(HEADER_SIZE))
            .saturating_sub(HEADER_SIZE)
            .max(size)
    }
}

/// Returns true if `heap` reports the size of a small block correctly.
///
/// Only one size class is probed. A heap whose reporting differs between
/// size classes can pass the probe and still misreport larger blocks.
pub fn probe_reports_size(heap: &dyn PlatformHeap) -> bool {
    let Some(block) = heap.malloc(PROBE_SIZE) else {
        return false;
    };
    // SAFETY: `block` was just allocated by `heap` and is freed exactly once
    unsafe {
        let reported = heap.alloc_size(block);
        heap.free(block);
        reported >= PROBE_SIZE
    }
}

/// Turns a configured strategy into a concrete one.
///
/// `Probe` becomes `Passthrough` when the heap reports sizes and
/// `HeaderPrefixed` otherwise; explicit choices are kept.
pub fn resolve_strategy(heap: &dyn PlatformHeap, requested: AllocatorStrategy) -> AllocatorStrategy {
    match requested {
        AllocatorStrategy::Probe if probe_reports_size(heap) => AllocatorStrategy::Passthrough,
        AllocatorStrategy::Probe => AllocatorStrategy::HeaderPrefixed,
        explicit => explicit,
    }
}

/// Builds the allocator for `heap`, probing it if `requested` is `Probe`.
pub fn allocator_for(
    heap: Arc<dyn PlatformHeap>,
    requested: AllocatorStrategy,
) -> Arc<dyn MemMethods> {
    let strategy = resolve_strategy(heap.as_ref(), requested);
    tracing::debug!(?requested, ?strategy, "allocator strategy selected");
    match strategy {
        AllocatorStrategy::Passthrough => {
            if !probe_reports_size(heap.as_ref()) {
                tracing::warn!("passthrough allocator over a heap that does not report sizes");
            }
            Arc::new(PassthroughAllocator::new(heap))
        }
        AllocatorStrategy::Probe | AllocatorStrategy::HeaderPrefixed => {
            Arc::new(HeaderAllocator::new(heap))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostvfs_platform::SystemHeap;

    fn header() -> (Arc<SystemHeap>, HeaderAllocator) {
        let heap = Arc::new(SystemHeap::without_size_reporting());
        (Arc::clone(&heap), HeaderAllocator::new(heap))
    }

    #[test]
    fn probe_picks_passthrough_for_reporting_heap() {
        let heap = SystemHeap::new();
        assert!(probe_reports_size(&heap));
        assert_eq!(
            resolve_strategy(&heap, AllocatorStrategy::Probe),
            AllocatorStrategy::Passthrough
        );
        assert_eq!(heap.live_blocks(), 0);
    }

    #[test]
    fn probe_picks_header_for_silent_heap() {
        let heap = SystemHeap::without_size_reporting();
        assert!(!probe_reports_size(&heap));
        assert_eq!(
            resolve_strategy(&heap, AllocatorStrategy::Probe),
            AllocatorStrategy::HeaderPrefixed
        );
    }

    #[test]
    fn explicit_strategy_is_kept() {
        let heap = SystemHeap::new();
        assert_eq!(
            resolve_strategy(&heap, AllocatorStrategy::HeaderPrefixed),
            AllocatorStrategy::HeaderPrefixed
        );
    }

    #[test]
    fn header_allocator_round_trip() {
        let (heap, alloc) = header();
        for n in [0usize, 1, 7, 16, 40, 4096, 100_000] {
            let ptr = alloc.malloc(n).unwrap();
            assert_eq!(ptr.as_ptr() as usize % DEFAULT_ALIGNMENT, 0);
            unsafe {
                assert!(alloc.size(ptr) >= n);
                std::ptr::write_bytes(ptr.as_ptr(), 0xAB, n);
                assert_eq!(alloc.size(ptr), n);
                alloc.free(ptr);
            }
        }
        assert_eq!(heap.live_blocks(), 0);
    }

    #[test]
    fn header_realloc_keeps_contents_and_size() {
        let (heap, alloc) = header();
        unsafe {
            let ptr = alloc.malloc(5).unwrap();
            ptr.as_ptr().copy_from_nonoverlapping(b"hello".as_ptr(), 5);

            let grown = alloc.realloc(ptr, 500).unwrap();
            assert_eq!(alloc.size(grown), 500);
            assert_eq!(std::slice::from_raw_parts(grown.as_ptr(), 5), b"hello");

            let shrunk = alloc.realloc(grown, 2).unwrap();
            assert_eq!(alloc.size(shrunk), 2);
            assert_eq!(std::slice::from_raw_parts(shrunk.as_ptr(), 2), b"he");

            alloc.free(shrunk);
        }
        assert_eq!(heap.live_blocks(), 0);
    }

    #[test]
    fn header_roundup() {
        let (_heap, alloc) = header();
        assert_eq!(alloc.roundup(0), 0);
        assert_eq!(alloc.roundup(1), 16);
        assert_eq!(alloc.roundup(16), 16);
        assert_eq!(alloc.roundup(17), 32);
        for n in [0usize, 3, 33, 1000, usize::MAX] {
            let once = alloc.roundup(n);
            assert_eq!(alloc.roundup(once), once);
        }
    }

    #[test]
    fn header_roundup_never_shrinks_huge_requests() {
        let (_heap, alloc) = header();
        for n in [usize::MAX, usize::MAX - 3, usize::MAX - 15, usize::MAX - 16] {
            assert!(alloc.roundup(n) >= n, "roundup({n}) = {}", alloc.roundup(n));
        }
        assert_eq!(alloc.roundup(usize::MAX - 3), usize::MAX - 3);
    }

    #[test]
    fn header_malloc_overflow_is_none() {
        let (_heap, alloc) = header();
        assert!(alloc.malloc(usize::MAX).is_none());
        assert!(alloc.malloc(usize::MAX - HEADER_SIZE).is_none());
    }

    #[test]
    fn passthrough_round_trip() {
        let heap = Arc::new(SystemHeap::new());
        let alloc = PassthroughAllocator::new(Arc::clone(&heap) as Arc<dyn PlatformHeap>);
        let ptr = alloc.malloc(24).unwrap();
        unsafe {
            assert_eq!(alloc.size(ptr), 32);
            let grown = alloc.realloc(ptr, 64).unwrap();
            assert_eq!(alloc.size(grown), 64);
            alloc.free(grown);
        }
        assert_eq!(alloc.roundup(24), 32);
        assert_eq!(heap.live_blocks(), 0);
    }

    #[test]
    fn allocator_for_probe_is_consistent_with_size() {
        for heap in [SystemHeap::new(), SystemHeap::without_size_reporting()] {
            let alloc = allocator_for(Arc::new(heap), AllocatorStrategy::Probe);
            alloc.init().unwrap();
            let ptr = alloc.malloc(10).unwrap();
            unsafe {
                assert!(alloc.size(ptr) >= 10);
                alloc.free(ptr);
            }
            alloc.shutdown();
        }
    }
}
