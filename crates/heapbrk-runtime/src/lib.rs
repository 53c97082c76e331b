pub mod config;
pub mod error;

pub use config::*;
pub use error::*;

use heapbrk_core::{
    BreakLocator, BreakObserver, BreakPointerManager, BrkError, LocalBreak, MemProfile,
    ProfileSnapshot, SharedBreak,
};
use heapbrk_memory::{LinearMemory, MemoryGrower, MemorySizeOracle, SharedRegion};
use log::{error, info};
use std::sync::Arc;

type LocalManager = BreakPointerManager<LocalBreak, LinearMemory>;
type SharedManager = BreakPointerManager<SharedBreak, SharedRegion>;

enum Mode {
    Local(LocalManager),
    Shared(SharedHeap),
}

/// A heap whose break mode is fixed when it is built.
///
/// A local heap owns its linear memory and is `Send` but not `Sync`. A shared
/// heap wraps a [`SharedHeap`], reachable through [`Heap::as_shared`]; other
/// modules (typically on other threads) attach to the same region with
/// [`Heap::attach_module`] or [`Heap::attach`].
pub struct Heap {
    mode: Mode,
    profile: Option<Arc<MemProfile>>,
}

impl Heap {
    pub fn new(config: HeapConfig) -> Result<Self, RuntimeError> {
        config.validate()?;

        let profile = config.profile.then(|| Arc::new(MemProfile::new()));

        let heap = if config.shared {
            let region = SharedRegion::new(config.memory.clone())?;
            Self::attach(region, config.heap_base, profile)
        } else {
            let memory = LinearMemory::new(config.memory.clone())?;
            let manager = with_profile(
                BreakPointerManager::new(LocalBreak::new(config.heap_base), memory),
                profile.as_ref(),
            );
            Self {
                mode: Mode::Local(manager),
                profile,
            }
        };

        info!(
            "Heap created: {} mode, base {:#x}, {} initial pages",
            if heap.is_shared() { "shared" } else { "local" },
            config.heap_base,
            config.memory.initial_pages
        );

        Ok(heap)
    }

    /// Attach a module with its own `heap_base` to an existing shared region.
    ///
    /// The region's break is initialised by whichever module touches it first.
    pub fn attach(
        region: SharedRegion,
        heap_base: usize,
        profile: Option<Arc<MemProfile>>,
    ) -> Self {
        SharedHeap::attach(region, heap_base, profile).into()
    }

    /// Another module on this heap's shared region, with the same heap base
    /// and profile.
    pub fn attach_module(&self) -> Result<Self, RuntimeError> {
        self.as_shared()
            .map(|shared| shared.clone().into())
            .ok_or(RuntimeError::NotShared)
    }

    pub fn is_shared(&self) -> bool {
        matches!(self.mode, Mode::Shared(_))
    }

    /// The thread-safe half of a shared heap
    pub fn as_shared(&self) -> Option<&SharedHeap> {
        match &self.mode {
            Mode::Shared(shared) => Some(shared),
            Mode::Local(_) => None,
        }
    }

    pub fn region(&self) -> Option<&SharedRegion> {
        self.as_shared().map(SharedHeap::region)
    }

    pub fn memory(&self) -> &LinearMemory {
        match &self.mode {
            Mode::Local(m) => m.memory(),
            Mode::Shared(shared) => shared.memory(),
        }
    }

    pub fn heap_base(&self) -> usize {
        match &self.mode {
            Mode::Local(m) => m.locator().heap_base(),
            Mode::Shared(shared) => shared.heap_base(),
        }
    }

    pub fn heap_size(&self) -> usize {
        self.memory().size()
    }

    pub fn current_break(&self) -> usize {
        match &self.mode {
            Mode::Local(m) => m.current_break(),
            Mode::Shared(shared) => shared.current_break(),
        }
    }

    pub fn grow(&self, increment: isize) -> Result<usize, BrkError> {
        match &self.mode {
            Mode::Local(m) => m.grow(increment),
            Mode::Shared(shared) => shared.grow(increment),
        }
    }

    pub fn sbrk(&self, increment: isize) -> usize {
        match &self.mode {
            Mode::Local(m) => m.sbrk(increment),
            Mode::Shared(shared) => shared.sbrk(increment),
        }
    }

    /// # Panics
    ///
    /// On a shared heap: moving the break to an absolute address has no
    /// thread-safe meaning, so this is treated as fatal misuse.
    pub fn set_break(&self, addr: usize) -> Result<(), BrkError> {
        match &self.mode {
            Mode::Local(m) => m.set_break(addr),
            Mode::Shared(_) => unsupported("brk"),
        }
    }

    /// C-style `brk`. Panics on a shared heap, see [`Heap::set_break`].
    pub fn brk(&self, addr: usize) -> i32 {
        match &self.mode {
            Mode::Local(m) => m.brk(addr),
            Mode::Shared(_) => unsupported("brk"),
        }
    }

    pub fn profile(&self) -> Option<ProfileSnapshot> {
        self.profile.as_ref().map(|p| p.snapshot())
    }
}

impl From<SharedHeap> for Heap {
    fn from(shared: SharedHeap) -> Self {
        Self {
            profile: shared.profile.clone(),
            mode: Mode::Shared(shared),
        }
    }
}

/// One module's view of a heap whose break lives in a [`SharedRegion`].
///
/// `Send + Sync`, so a single handle can sit in an `Arc` and be called from
/// any thread. Cloning attaches another module to the same region with the
/// same heap base and profile. There is no `brk`.
pub struct SharedHeap {
    manager: SharedManager,
    profile: Option<Arc<MemProfile>>,
}

impl SharedHeap {
    pub fn attach(
        region: SharedRegion,
        heap_base: usize,
        profile: Option<Arc<MemProfile>>,
    ) -> Self {
        let manager = with_profile(
            BreakPointerManager::new(SharedBreak::new(region.clone(), heap_base), region),
            profile.as_ref(),
        );
        Self { manager, profile }
    }

    pub fn region(&self) -> &SharedRegion {
        self.manager.memory()
    }

    pub fn memory(&self) -> &LinearMemory {
        self.region().memory()
    }

    pub fn heap_base(&self) -> usize {
        self.manager.locator().heap_base()
    }

    pub fn heap_size(&self) -> usize {
        self.memory().size()
    }

    pub fn current_break(&self) -> usize {
        self.manager.current_break()
    }

    pub fn grow(&self, increment: isize) -> Result<usize, BrkError> {
        self.manager.grow(increment)
    }

    pub fn sbrk(&self, increment: isize) -> usize {
        self.manager.sbrk(increment)
    }

    pub fn profile(&self) -> Option<ProfileSnapshot> {
        self.profile.as_ref().map(|p| p.snapshot())
    }
}

impl Clone for SharedHeap {
    fn clone(&self) -> Self {
        Self::attach(self.region().clone(), self.heap_base(), self.profile.clone())
    }
}

fn with_profile<L, M>(
    manager: BreakPointerManager<L, M>,
    profile: Option<&Arc<MemProfile>>,
) -> BreakPointerManager<L, M>
where
    L: BreakLocator,
    M: MemorySizeOracle + MemoryGrower,
{
    match profile {
        Some(p) => manager.with_observer(Arc::clone(p) as Arc<dyn BreakObserver>),
        None => manager,
    }
}

fn unsupported(op: &str) -> ! {
    error!("{}() called on a shared heap", op);
    panic!("{}() is not thread-safe and is unsupported on a shared heap", op);
}
