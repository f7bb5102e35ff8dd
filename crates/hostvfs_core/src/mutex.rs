//! Mutex provider.
//!
//! The engine asks for two kinds of mutex:
//!
//! - **dynamic** mutexes (`Fast`, `Recursive`), created per `alloc` and
//!   destroyed per `free`
//! - **static** mutexes, a fixed set of twelve the engine uses for its own
//!   shared state. They are created once by `init`, destroyed once by `end`,
//!   and every `alloc` of a static kind in between returns the same mutex.
//!
//! `enter`/`leave` are not scoped: the engine acquires in one call and
//! releases in another, so [`EngineMutex`] keeps its own holder record
//! behind a `parking_lot` mutex and parks waiters on a condvar.

use crate::error::{OsError, OsResult};
use parking_lot::{Condvar, Mutex, RwLock};
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[cfg(feature = "mutex-debug")]
const NO_OWNER: u64 = 0;

/// Number of static mutexes the engine expects.
pub const STATIC_MUTEX_COUNT: usize = 12;

/// The kind of mutex requested from [`MutexMethods::alloc`].
///
/// Discriminants match the engine's mutex identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum MutexKind {
    /// Non-recursive dynamic mutex.
    Fast = 0,
    /// Recursive dynamic mutex.
    Recursive = 1,
    /// Static: main engine state.
    StaticMain = 2,
    /// Static: memory allocator.
    StaticMem = 3,
    /// Static: open/close of shared resources.
    StaticOpen = 4,
    /// Static: pseudo-random number generator.
    StaticPrng = 5,
    /// Static: page cache LRU.
    StaticLru = 6,
    /// Static: page cache memory.
    StaticPmem = 7,
    /// Static: application use.
    StaticApp1 = 8,
    /// Static: application use.
    StaticApp2 = 9,
    /// Static: application use.
    StaticApp3 = 10,
    /// Static: VFS use.
    StaticVfs1 = 11,
    /// Static: VFS use.
    StaticVfs2 = 12,
    /// Static: VFS use.
    StaticVfs3 = 13,
}

impl MutexKind {
    const STATICS: [Self; STATIC_MUTEX_COUNT] = [
        Self::StaticMain,
        Self::StaticMem,
        Self::StaticOpen,
        Self::StaticPrng,
        Self::StaticLru,
        Self::StaticPmem,
        Self::StaticApp1,
        Self::StaticApp2,
        Self::StaticApp3,
        Self::StaticVfs1,
        Self::StaticVfs2,
        Self::StaticVfs3,
    ];

    /// Converts an engine mutex identifier.
    ///
    /// Returns `None` for identifiers outside the known range.
    #[must_use]
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Fast),
            1 => Some(Self::Recursive),
            _ => usize::try_from(raw - 2)
                .ok()
                .and_then(|index| Self::STATICS.get(index).copied()),
        }
    }

    /// Returns the engine mutex identifier.
    #[must_use]
    pub const fn raw(self) -> i32 {
        self as i32
    }

    /// Returns true for the fast and recursive kinds.
    #[must_use]
    pub const fn is_dynamic(self) -> bool {
        matches!(self, Self::Fast | Self::Recursive)
    }

    /// Returns the slot of a static kind in the static array.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub const fn static_index(self) -> Option<usize> {
        if self.is_dynamic() {
            None
        } else {
            Some((self as i32 - 2) as usize)
        }
    }
}

fn current_thread() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    thread_local! {
        static TOKEN: u64 = NEXT.fetch_add(1, Ordering::Relaxed);
    }
    TOKEN.with(|token| *token)
}

#[derive(Debug, Default)]
struct LockState {
    holder: Option<u64>,
    depth: u32,
}

/// One mutex handed to the engine.
#[derive(Debug)]
pub struct EngineMutex {
    kind: MutexKind,
    state: Mutex<LockState>,
    released: Condvar,
    #[cfg(feature = "mutex-debug")]
    track_owner: bool,
    #[cfg(feature = "mutex-debug")]
    owner: AtomicU64,
}

impl EngineMutex {
    fn new(kind: MutexKind, track_owner: bool) -> Self {
        #[cfg(not(feature = "mutex-debug"))]
        let _ = track_owner;

        Self {
            kind,
            state: Mutex::new(LockState::default()),
            released: Condvar::new(),
            #[cfg(feature = "mutex-debug")]
            track_owner,
            #[cfg(feature = "mutex-debug")]
            owner: AtomicU64::new(NO_OWNER),
        }
    }

    /// Returns the kind this mutex was allocated as.
    #[must_use]
    pub fn kind(&self) -> MutexKind {
        self.kind
    }

    fn can_take(&self, state: &LockState, me: u64) -> bool {
        match state.holder {
            None => true,
            Some(holder) => holder == me && self.kind == MutexKind::Recursive,
        }
    }

    fn take(&self, state: &mut LockState, me: u64) {
        #[cfg(feature = "mutex-debug")]
        if self.track_owner {
            self.owner.store(me, Ordering::Release);
        }
        state.holder = Some(me);
        state.depth += 1;
    }

    /// Blocks until the mutex is acquired.
    pub fn enter(&self) {
        let me = current_thread();
        let mut state = self.state.lock();
        while !self.can_take(&state, me) {
            self.released.wait(&mut state);
        }
        self.take(&mut state, me);
    }

    /// Acquires the mutex if that does not require waiting.
    ///
    /// Returns false when the mutex is busy. A fast or static mutex already
    /// held by the calling thread is busy too.
    pub fn try_enter(&self) -> bool {
        let me = current_thread();
        let mut state = self.state.lock();
        if !self.can_take(&state, me) {
            return false;
        }
        self.take(&mut state, me);
        true
    }

    /// Releases one level of the mutex.
    ///
    /// # Errors
    ///
    /// Returns `MutexMisuse` if the calling thread does not hold it.
    pub fn leave(&self) -> OsResult<()> {
        let me = current_thread();
        let mut state = self.state.lock();
        if state.holder != Some(me) {
            return Err(OsError::MutexMisuse {
                reason: "leave by a thread that does not hold the mutex",
            });
        }

        state.depth -= 1;
        if state.depth == 0 {
            state.holder = None;
            #[cfg(feature = "mutex-debug")]
            self.owner.store(NO_OWNER, Ordering::Release);
            drop(state);
            self.released.notify_one();
        }
        Ok(())
    }

    /// Returns true if the calling thread holds the mutex.
    ///
    /// Without owner tracking this always returns true.
    #[must_use]
    pub fn held(&self) -> bool {
        #[cfg(feature = "mutex-debug")]
        if self.track_owner {
            return self.owner.load(Ordering::Acquire) == current_thread();
        }
        true
    }

    /// Returns true if the calling thread does not hold the mutex.
    ///
    /// Without owner tracking this always returns true.
    #[must_use]
    pub fn notheld(&self) -> bool {
        #[cfg(feature = "mutex-debug")]
        if self.track_owner {
            return self.owner.load(Ordering::Acquire) != current_thread();
        }
        true
    }
}

/// A mutex as handed to the engine.
pub type MutexRef = Arc<EngineMutex>;

/// The engine's mutex table.
///
/// Mirrors the engine's mutex callback contract. All operations succeed
/// except `try_enter`, whose busy answer is a normal outcome the engine
/// retries or falls back on.
pub trait MutexMethods: Send + Sync + Debug {
    /// Creates the static mutexes.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot set itself up.
    fn init(&self) -> OsResult<()>;

    /// Destroys the static mutexes.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot tear itself down.
    fn end(&self) -> OsResult<()>;

    /// Returns a new dynamic mutex, or the existing static one for `kind`.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized` for a static kind before `init`.
    fn alloc(&self, kind: MutexKind) -> OsResult<MutexRef>;

    /// Releases a mutex returned by `alloc`. Static mutexes are unaffected.
    fn free(&self, mutex: MutexRef);

    /// Blocks until `mutex` is acquired.
    fn enter(&self, mutex: &EngineMutex);

    /// Acquires `mutex` without waiting; returns false when busy.
    fn try_enter(&self, mutex: &EngineMutex) -> bool;

    /// Releases `mutex`.
    fn leave(&self, mutex: &EngineMutex);

    /// Returns true if the calling thread holds `mutex`.
    fn held(&self, mutex: &EngineMutex) -> bool;

    /// Returns true if the calling thread does not hold `mutex`.
    fn notheld(&self, mutex: &EngineMutex) -> bool;
}

/// The mutex provider.
///
/// Owns the static mutex array between `init` and `end`. The array is
/// never rebuilt while initialised, so repeated `alloc` calls for a static
/// kind always return the same mutex.
#[derive(Debug, Default)]
pub struct MutexProvider {
    statics: RwLock<Option<Vec<MutexRef>>>,
    track_owner: bool,
}

impl MutexProvider {
    /// Creates a provider without owner tracking.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a provider whose mutexes record their owning thread.
    ///
    /// Only effective with the `mutex-debug` feature.
    #[must_use]
    pub fn with_owner_tracking() -> Self {
        Self {
            statics: RwLock::new(None),
            track_owner: true,
        }
    }

    /// Returns true between `init` and `end`.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.statics.read().is_some()
    }
}

impl MutexMethods for MutexProvider {
    fn init(&self) -> OsResult<()> {
        let mut statics = self.statics.write();
        if statics.is_none() {
            *statics = Some(
                MutexKind::STATICS
                    .iter()
                    .map(|kind| Arc::new(EngineMutex::new(*kind, self.track_owner)))
                    .collect(),
            );
            tracing::debug!(count = STATIC_MUTEX_COUNT, "static mutexes created");
        }
        Ok(())
    }

    fn end(&self) -> OsResult<()> {
        if self.statics.write().take().is_some() {
            tracing::debug!("static mutexes destroyed");
        }
        Ok(())
    }

    fn alloc(&self, kind: MutexKind) -> OsResult<MutexRef> {
        let Some(index) = kind.static_index() else {
            return Ok(Arc::new(EngineMutex::new(kind, self.track_owner)));
        };

        let statics = self.statics.read();
        let statics = statics.as_ref().ok_or(OsError::NotInitialized {
            what: "mutex provider",
        })?;
        Ok(Arc::clone(&statics[index]))
    }

    fn free(&self, mutex: MutexRef) {
        if mutex.kind.is_dynamic() && mutex.state.lock().holder.is_some() {
            tracing::warn!(kind = ?mutex.kind, "freeing a mutex that is still held");
        }
        drop(mutex);
    }

    fn enter(&self, mutex: &EngineMutex) {
        mutex.enter();
    }

    fn try_enter(&self, mutex: &EngineMutex) -> bool {
        mutex.try_enter()
    }

    fn leave(&self, mutex: &EngineMutex) {
        if let Err(e) = mutex.leave() {
            tracing::warn!(kind = ?mutex.kind, error = %e, "mutex leave ignored");
        }
    }

    fn held(&self, mutex: &EngineMutex) -> bool {
        mutex.held()
    }

    fn notheld(&self, mutex: &EngineMutex) -> bool {
        mutex.notheld()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    fn initialized() -> MutexProvider {
        let provider = MutexProvider::new();
        provider.init().unwrap();
        provider
    }

    #[test]
    fn kind_raw_round_trip() {
        for raw in 0..14 {
            assert_eq!(MutexKind::from_raw(raw).unwrap().raw(), raw);
        }
        assert!(MutexKind::from_raw(14).is_none());
        assert!(MutexKind::from_raw(-1).is_none());
    }

    #[test]
    fn static_indices_cover_array() {
        assert_eq!(MutexKind::StaticMain.static_index(), Some(0));
        assert_eq!(MutexKind::StaticVfs3.static_index(), Some(11));
        assert_eq!(MutexKind::Fast.static_index(), None);
    }

    #[test]
    fn static_alloc_returns_same_mutex() {
        let provider = initialized();
        let a = provider.alloc(MutexKind::StaticPrng).unwrap();
        let b = provider.alloc(MutexKind::StaticPrng).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        provider.enter(&a);
        assert!(!provider.try_enter(&b));
        provider.leave(&a);
        assert!(provider.try_enter(&b));
        provider.leave(&b);
    }

    #[test]
    fn static_alloc_before_init_fails() {
        let provider = MutexProvider::new();
        assert!(matches!(
            provider.alloc(MutexKind::StaticMain),
            Err(OsError::NotInitialized { .. })
        ));
        assert!(provider.alloc(MutexKind::Fast).is_ok());
    }

    #[test]
    fn repeated_init_keeps_identity() {
        let provider = initialized();
        let before = provider.alloc(MutexKind::StaticLru).unwrap();
        provider.init().unwrap();
        let after = provider.alloc(MutexKind::StaticLru).unwrap();
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn end_then_init_creates_new_statics() {
        let provider = initialized();
        let before = provider.alloc(MutexKind::StaticMem).unwrap();
        provider.end().unwrap();
        assert!(!provider.is_initialized());
        provider.init().unwrap();
        let after = provider.alloc(MutexKind::StaticMem).unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn dynamic_allocs_are_distinct() {
        let provider = initialized();
        let a = provider.alloc(MutexKind::Fast).unwrap();
        let b = provider.alloc(MutexKind::Fast).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));

        provider.enter(&a);
        assert!(provider.try_enter(&b));
        provider.leave(&b);
        provider.leave(&a);
        provider.free(a);
        provider.free(b);
    }

    #[test]
    fn freeing_static_keeps_it_alive() {
        let provider = initialized();
        let a = provider.alloc(MutexKind::StaticApp1).unwrap();
        provider.free(a);
        let b = provider.alloc(MutexKind::StaticApp1).unwrap();
        assert!(provider.try_enter(&b));
        provider.leave(&b);
    }

    #[test]
    fn recursive_mutex_reenters() {
        let provider = initialized();
        let m = provider.alloc(MutexKind::Recursive).unwrap();
        provider.enter(&m);
        provider.enter(&m);
        assert!(provider.try_enter(&m));
        provider.leave(&m);
        provider.leave(&m);
        provider.leave(&m);

        let other = Arc::clone(&m);
        let acquired = thread::spawn(move || {
            let ok = other.try_enter();
            if ok {
                other.leave().unwrap();
            }
            ok
        })
        .join()
        .unwrap();
        assert!(acquired);
    }

    #[test]
    fn fast_mutex_is_busy_for_its_holder() {
        let provider = initialized();
        let m = provider.alloc(MutexKind::Fast).unwrap();
        provider.enter(&m);
        assert!(!provider.try_enter(&m));
        provider.leave(&m);
    }

    #[test]
    fn leave_without_holding_is_misuse() {
        let provider = initialized();
        let m = provider.alloc(MutexKind::Fast).unwrap();
        assert!(matches!(m.leave(), Err(OsError::MutexMisuse { .. })));
    }

    #[test]
    fn try_from_other_thread_is_busy() {
        let provider = initialized();
        let m = provider.alloc(MutexKind::StaticOpen).unwrap();
        provider.enter(&m);

        let other = Arc::clone(&m);
        let acquired = thread::spawn(move || other.try_enter()).join().unwrap();
        assert!(!acquired);
        provider.leave(&m);
    }

    #[test]
    fn enter_blocks_until_leave() {
        let provider = Arc::new(initialized());
        let m = provider.alloc(MutexKind::Fast).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        provider.enter(&m);
        let waiter = {
            let (provider, m, counter) = (Arc::clone(&provider), Arc::clone(&m), Arc::clone(&counter));
            thread::spawn(move || {
                provider.enter(&m);
                counter.fetch_add(1, Ordering::SeqCst);
                provider.leave(&m);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        provider.leave(&m);
        waiter.join().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn contended_counter_is_consistent() {
        let provider = Arc::new(initialized());
        let m = provider.alloc(MutexKind::StaticMain).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let (provider, m, counter) =
                    (Arc::clone(&provider), Arc::clone(&m), Arc::clone(&counter));
                thread::spawn(move || {
                    for _ in 0..500 {
                        provider.enter(&m);
                        let value = counter.load(Ordering::Relaxed);
                        counter.store(value + 1, Ordering::Relaxed);
                        provider.leave(&m);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 2000);
    }

    #[cfg(not(feature = "mutex-debug"))]
    #[test]
    fn held_checks_degrade_to_true() {
        let provider = MutexProvider::with_owner_tracking();
        provider.init().unwrap();
        let m = provider.alloc(MutexKind::Fast).unwrap();
        assert!(provider.held(&m));
        assert!(provider.notheld(&m));
    }

    #[cfg(feature = "mutex-debug")]
    #[test]
    fn held_checks_track_owner() {
        let provider = MutexProvider::with_owner_tracking();
        provider.init().unwrap();
        let m = provider.alloc(MutexKind::Fast).unwrap();
        assert!(!provider.held(&m));
        assert!(provider.notheld(&m));

        provider.enter(&m);
        assert!(provider.held(&m));
        assert!(!provider.notheld(&m));

        let other = Arc::clone(&m);
        let seen_from_other = thread::spawn(move || (other.held(), other.notheld()))
            .join()
            .unwrap();
        assert_eq!(seen_from_other, (false, true));

        provider.leave(&m);
        assert!(!provider.held(&m));
    }
}
