use heapbrk_core::{errno, BrkError, ENOMEM, SBRK_FAILED};
use heapbrk_memory::{GrowthPolicy, MemoryConfig, WASM_PAGE_SIZE};
use heapbrk_runtime::{Heap, HeapConfig, RuntimeError, SharedHeap};
use std::sync::Arc;
use std::thread;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn small_memory() -> MemoryConfig {
    MemoryConfig::default()
        .with_initial_pages(1)
        .with_maximum_pages(4)
        .with_growth(GrowthPolicy::Exact)
}

#[test]
fn test_local_heap_lifecycle() {
    init_logging();
    let heap = Heap::new(
        HeapConfig::default()
            .with_heap_base(0x400)
            .with_memory(small_memory())
            .profiled(true),
    )
    .unwrap();

    assert!(!heap.is_shared());
    assert!(heap.region().is_none());
    assert_eq!(heap.heap_base(), 0x400);
    assert_eq!(heap.current_break(), 0x400);

    assert_eq!(heap.sbrk(100), 0x400);
    assert_eq!(heap.current_break(), 0x470);

    // Crossing the first page grows the memory.
    assert_eq!(heap.grow(WASM_PAGE_SIZE as isize), Ok(0x470));
    assert_eq!(heap.heap_size(), 2 * WASM_PAGE_SIZE);

    assert_eq!(heap.brk(0x800), 0);
    assert_eq!(heap.current_break(), 0x800);

    let profile = heap.profile().unwrap();
    assert_eq!(profile.moves, 3);
    assert_eq!(profile.peak_break, 0x470 + WASM_PAGE_SIZE);
    assert_eq!(profile.net_growth(), 0x400);
}

#[test]
fn test_local_heap_out_of_memory() {
    init_logging();
    let heap = Heap::new(
        HeapConfig::default()
            .with_heap_base(0x400)
            .with_memory(small_memory()),
    )
    .unwrap();

    assert!(matches!(
        heap.grow(4 * WASM_PAGE_SIZE as isize),
        Err(BrkError::GrowthDenied { .. })
    ));
    assert_eq!(heap.sbrk(4 * WASM_PAGE_SIZE as isize), SBRK_FAILED);
    assert_eq!(errno(), ENOMEM);
    assert_eq!(heap.current_break(), 0x400);
    assert_eq!(heap.memory().denied_count(), 2);
    assert!(heap.profile().is_none());
}

#[test]
fn test_invalid_config_is_rejected() {
    assert_eq!(
        Heap::new(HeapConfig::default().with_heap_base(0)).err(),
        Some(RuntimeError::ZeroHeapBase)
    );
}

#[test]
fn test_local_heap_cannot_be_attached() {
    let heap = Heap::new(HeapConfig::default()).unwrap();
    assert_eq!(heap.attach_module().err(), Some(RuntimeError::NotShared));
}

#[test]
fn test_shared_modules_across_threads() {
    init_logging();
    let heap = Heap::new(
        HeapConfig::default()
            .with_heap_base(0x400)
            .with_memory(small_memory())
            .shared(true)
            .profiled(true),
    )
    .unwrap();
    assert!(heap.is_shared());

    let modules: Vec<Heap> = (0..4).map(|_| heap.attach_module().unwrap()).collect();
    assert!(modules.iter().all(|m| m.region() == heap.region()));

    let mut starts: Vec<usize> = modules
        .into_iter()
        .map(|module| {
            thread::spawn(move || (0..50).map(|_| module.sbrk(32)).collect::<Vec<_>>())
        })
        .collect::<Vec<_>>()
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();

    starts.sort_unstable();
    starts.dedup();
    assert_eq!(starts.len(), 200);
    assert_eq!(heap.current_break(), 0x400 + 200 * 32);

    // Modules share one profile.
    let profile = heap.profile().unwrap();
    assert_eq!(profile.moves, 200);
    assert_eq!(profile.bytes_grown, 200 * 32);
}

fn assert_send_sync<T: Send + Sync>() {}

fn assert_send<T: Send>() {}

#[test]
fn test_heap_thread_bounds() {
    assert_send_sync::<SharedHeap>();
    assert_send::<Heap>();
}

#[test]
fn test_one_shared_heap_used_from_many_threads() {
    init_logging();
    let heap = Heap::new(
        HeapConfig::default()
            .with_heap_base(0x400)
            .with_memory(small_memory())
            .shared(true),
    )
    .unwrap();
    let shared = Arc::new(heap.as_shared().unwrap().clone());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let shared = Arc::clone(&shared);
            thread::spawn(move || (0..25).map(|_| shared.sbrk(16)).collect::<Vec<_>>())
        })
        .collect();
    let mut starts: Vec<usize> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();

    starts.sort_unstable();
    starts.dedup();
    assert_eq!(starts.len(), 100);
    assert_eq!(heap.current_break(), 0x400 + 100 * 16);
}

#[test]
fn test_shared_heap_clone_attaches_to_same_region() {
    init_logging();
    let heap = Heap::new(
        HeapConfig::default()
            .with_heap_base(0x400)
            .with_memory(small_memory())
            .shared(true)
            .profiled(true),
    )
    .unwrap();
    let shared = heap.as_shared().unwrap();
    let other = shared.clone();
    assert_eq!(other.region(), shared.region());
    assert_eq!(other.heap_base(), 0x400);

    let moved = other.clone();
    assert_eq!(thread::spawn(move || moved.sbrk(32)).join().unwrap(), 0x400);
    assert_eq!(shared.current_break(), 0x420);
    assert_eq!(heap.profile().unwrap().moves, 1);
    assert_eq!(other.profile(), heap.profile());
}

#[test]
fn test_local_heap_has_no_shared_half() {
    let heap = Heap::new(HeapConfig::default()).unwrap();
    assert!(heap.as_shared().is_none());
}

#[test]
fn test_attach_to_existing_region_keeps_first_base() {
    init_logging();
    let heap = Heap::new(
        HeapConfig::default()
            .with_heap_base(0x400)
            .with_memory(small_memory())
            .shared(true),
    )
    .unwrap();
    heap.sbrk(0x100);

    let other = Heap::attach(heap.region().unwrap().clone(), 0x8000, None);
    assert_eq!(other.heap_base(), 0x8000);
    assert_eq!(other.current_break(), 0x500);
}

#[test]
#[should_panic(expected = "unsupported on a shared heap")]
fn test_brk_on_shared_heap_is_fatal() {
    let heap = Heap::new(HeapConfig::default().shared(true)).unwrap();
    heap.brk(heap.current_break() + 64);
}

#[test]
#[should_panic(expected = "unsupported on a shared heap")]
fn test_set_break_on_shared_heap_is_fatal() {
    let heap = Heap::new(HeapConfig::default().shared(true)).unwrap();
    let _ = heap.set_break(heap.current_break());
}
