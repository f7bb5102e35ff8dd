//! Host heap trait and the system heap implementation.

use parking_lot::Mutex;
use std::alloc::{self, Layout};
use std::collections::HashMap;
use std::fmt::Debug;
use std::ptr::NonNull;

/// Alignment of every block handed out by a [`PlatformHeap`].
///
/// This is also the largest alignment any caller may rely on.
pub const DEFAULT_ALIGNMENT: usize = 16;

/// A host heap.
///
/// Blocks are aligned to [`DEFAULT_ALIGNMENT`]. Unlike `std::alloc`, callers
/// never pass sizes back on free: the heap does its own bookkeeping. Whether
/// it *reports* a block's size back through [`alloc_size`](Self::alloc_size)
/// is a capability that varies between hosts.
pub trait PlatformHeap: Send + Sync + Debug {
    /// Allocates at least `size` bytes.
    ///
    /// Returns `None` when the heap is exhausted.
    fn malloc(&self, size: usize) -> Option<NonNull<u8>>;

    /// Releases a block.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by this heap and not freed since.
    unsafe fn free(&self, ptr: NonNull<u8>);

    /// Resizes a block, or allocates a new one when `ptr` is `None`.
    ///
    /// On failure `None` is returned and the original block stays valid.
    ///
    /// # Safety
    ///
    /// `ptr`, if present, must have been returned by this heap and not freed
    /// since.
    unsafe fn realloc(&self, ptr: Option<NonNull<u8>>, size: usize) -> Option<NonNull<u8>>;

    /// Returns the usable size of a block, or 0 if the heap cannot tell.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by this heap and not freed since.
    unsafe fn alloc_size(&self, ptr: NonNull<u8>) -> usize;

    /// Returns the size a request for `size` bytes is rounded up to.
    fn quantize_size(&self, size: usize) -> usize;
}

/// A heap over `std::alloc` with block bookkeeping.
///
/// [`SystemHeap::new`] reports block sizes; [`SystemHeap::without_size_reporting`]
/// models hosts whose allocator cannot, which forces the allocator provider
/// onto its header-prefixed strategy.
///
/// # Thread Safety
///
/// The block table is guarded by a mutex; the heap can be shared across
/// threads.
#[derive(Debug)]
pub struct SystemHeap {
    reports_size: bool,
    blocks: Mutex<HashMap<usize, Layout>>,
}

impl Default for SystemHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemHeap {
    /// Creates a heap that reports block sizes.
    #[must_use]
    pub fn new() -> Self {
        Self {
            reports_size: true,
            blocks: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a heap whose `alloc_size` always returns 0.
    #[must_use]
    pub fn without_size_reporting() -> Self {
        Self {
            reports_size: false,
            blocks: Mutex::new(HashMap::new()),
        }
    }

    /// Returns true if `alloc_size` reports real sizes.
    #[must_use]
    pub fn reports_size(&self) -> bool {
        self.reports_size
    }

    /// Returns the number of blocks currently allocated.
    #[must_use]
    pub fn live_blocks(&self) -> usize {
        self.blocks.lock().len()
    }

    fn layout_for(&self, size: usize) -> Option<Layout> {
        Layout::from_size_align(self.quantize_size(size), DEFAULT_ALIGNMENT).ok()
    }
}

impl PlatformHeap for SystemHeap {
    fn malloc(&self, size: usize) -> Option<NonNull<u8>> {
        let layout = self.layout_for(size)?;
        // SAFETY: layout has a non-zero size (quantize_size never returns 0)
        let ptr = NonNull::new(unsafe { alloc::alloc(layout) })?;
        self.blocks.lock().insert(ptr.as_ptr() as usize, layout);
        Some(ptr)
    }

    unsafe fn free(&self, ptr: NonNull<u8>) {
        let Some(layout) = self.blocks.lock().remove(&(ptr.as_ptr() as usize)) else {
            tracing::warn!(ptr = ?ptr, "free of a block this heap does not own");
            return;
        };
        // SAFETY: the block table only holds live blocks allocated with `layout`
        unsafe { alloc::dealloc(ptr.as_ptr(), layout) };
    }

    unsafe fn realloc(&self, ptr: Option<NonNull<u8>>, size: usize) -> Option<NonNull<u8>> {
        let Some(ptr) = ptr else {
            return self.malloc(size);
        };

        let mut blocks = self.blocks.lock();
        let old_layout = *blocks.get(&(ptr.as_ptr() as usize))?;
        let new_layout = self.layout_for(size)?;

        // SAFETY: `ptr` is live and was allocated with `old_layout`; the new
        // size is non-zero and does not overflow when rounded to the alignment
        let new_ptr =
            NonNull::new(unsafe { alloc::realloc(ptr.as_ptr(), old_layout, new_layout.size()) })?;

        blocks.remove(&(ptr.as_ptr() as usize));
        blocks.insert(new_ptr.as_ptr() as usize, new_layout);
        Some(new_ptr)
    }

    unsafe fn alloc_size(&self, ptr: NonNull<u8>) -> usize {
        if !self.reports_size {
            return 0;
        }
        self.blocks
            .lock()
            .get(&(ptr.as_ptr() as usize))
            .map_or(0, Layout::size)
    }

    fn quantize_size(&self, size: usize) -> usize {
        size.max(1)
            .checked_next_multiple_of(DEFAULT_ALIGNMENT)
            .unwrap_or(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_malloc_is_aligned_and_tracked() {
        let heap = SystemHeap::new();
        let ptr = heap.malloc(24).unwrap();
        assert_eq!(ptr.as_ptr() as usize % DEFAULT_ALIGNMENT, 0);
        assert_eq!(heap.live_blocks(), 1);

        unsafe {
            assert_eq!(heap.alloc_size(ptr), 32);
            heap.free(ptr);
        }
        assert_eq!(heap.live_blocks(), 0);
    }

    #[test]
    fn heap_without_size_reporting_returns_zero() {
        let heap = SystemHeap::without_size_reporting();
        let ptr = heap.malloc(16).unwrap();
        unsafe {
            assert_eq!(heap.alloc_size(ptr), 0);
            heap.free(ptr);
        }
    }

    #[test]
    fn heap_realloc_preserves_contents() {
        let heap = SystemHeap::new();
        unsafe {
            let ptr = heap.malloc(4).unwrap();
            ptr.as_ptr().copy_from_nonoverlapping(b"abcd".as_ptr(), 4);

            let grown = heap.realloc(Some(ptr), 100).unwrap();
            assert_eq!(std::slice::from_raw_parts(grown.as_ptr(), 4), b"abcd");
            assert_eq!(heap.alloc_size(grown), 112);
            assert_eq!(heap.live_blocks(), 1);

            heap.free(grown);
        }
        assert_eq!(heap.live_blocks(), 0);
    }

    #[test]
    fn heap_realloc_of_none_allocates() {
        let heap = SystemHeap::new();
        unsafe {
            let ptr = heap.realloc(None, 8).unwrap();
            heap.free(ptr);
        }
    }

    #[test]
    fn heap_quantize() {
        let heap = SystemHeap::new();
        assert_eq!(heap.quantize_size(0), 16);
        assert_eq!(heap.quantize_size(16), 16);
        assert_eq!(heap.quantize_size(17), 32);
        assert_eq!(heap.quantize_size(usize::MAX), usize::MAX);
    }

    #[test]
    fn heap_huge_request_fails() {
        let heap = SystemHeap::new();
        assert!(heap.malloc(usize::MAX).is_none());
    }
}
