use anyhow::{bail, ensure, Context};
use heapbrk_core::{align_increment, is_aligned};
use heapbrk_runtime::Heap;
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::thread;

#[derive(Debug, Default)]
pub struct StressReport {
    pub threads: usize,
    pub granted: usize,
    pub failed: usize,
    pub bytes: usize,
    pub final_break: usize,
    pub heap_size: usize,
}

impl fmt::Display for StressReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} threads: {} sbrk calls granted ({} bytes), {} failed; break {:#x}, memory {:#x} bytes",
            self.threads, self.granted, self.bytes, self.failed, self.final_break, self.heap_size
        )
    }
}

struct ThreadResult {
    ranges: Vec<(usize, usize)>,
    failed: usize,
}

/// Run `threads` modules attached to `heap`'s region, each issuing `calls`
/// random positive sbrk calls, then check that nobody was handed an
/// overlapping range and that the break accounts for every granted byte.
pub fn run(
    heap: &Heap,
    threads: usize,
    calls: usize,
    max_delta: usize,
    seed: Option<u64>,
) -> anyhow::Result<StressReport> {
    threads
        .checked_mul(calls)
        .context("total number of sbrk calls overflows")?;
    let start = heap.current_break();
    let max_delta = max_delta.min(isize::MAX as usize) as isize;

    let mut handles = Vec::new();
    for t in 0..threads {
        let module = heap.attach_module()?;
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(t as u64)),
            None => StdRng::from_entropy(),
        };
        handles.push(thread::spawn(move || {
            let mut result = ThreadResult {
                ranges: Vec::new(),
                failed: 0,
            };
            for _ in 0..calls {
                let delta = rng.gen_range(1..=max_delta);
                match module.grow(delta) {
                    Ok(addr) => result.ranges.push((addr, align_increment(delta))),
                    Err(e) => {
                        debug!("thread {}: {}", t, e);
                        result.failed += 1;
                    }
                }
            }
            result
        }));
    }

    let mut ranges = Vec::new();
    let mut failed = 0;
    for handle in handles {
        match handle.join() {
            Ok(result) => {
                ranges.extend(result.ranges);
                failed += result.failed;
            }
            Err(_) => bail!("stress thread panicked"),
        }
    }

    if failed > 0 {
        warn!("{} sbrk calls ran out of memory", failed);
    }

    let bytes: usize = ranges.iter().map(|&(_, len)| len).sum();
    let final_break = heap.current_break();
    ensure!(
        final_break == start + bytes,
        "break {:#x} does not match start {:#x} plus {} granted bytes",
        final_break,
        start,
        bytes
    );

    ranges.sort_unstable();
    for pair in ranges.windows(2) {
        let (addr, len) = pair[0];
        ensure!(
            addr + len <= pair[1].0,
            "ranges overlap: {:#x}+{} and {:#x}",
            addr,
            len,
            pair[1].0
        );
    }
    ensure!(
        ranges.iter().all(|&(addr, _)| is_aligned(addr)),
        "misaligned sbrk result"
    );

    Ok(StressReport {
        threads,
        granted: ranges.len(),
        failed,
        bytes,
        final_break,
        heap_size: heap.heap_size(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use heapbrk_memory::MemoryConfig;
    use heapbrk_runtime::HeapConfig;

    #[test]
    fn test_stress_run_is_consistent() {
        let heap = Heap::new(
            HeapConfig::default()
                .with_memory(MemoryConfig::default().with_initial_pages(2))
                .shared(true),
        )
        .unwrap();
        let report = run(&heap, 4, 250, 512, Some(7)).unwrap();
        assert_eq!(report.granted, 1000);
        assert_eq!(report.failed, 0);
        assert_eq!(report.final_break, heap.heap_base() + report.bytes);
        assert!(report.heap_size >= report.final_break);
    }

    #[test]
    fn test_stress_reports_out_of_memory() {
        let heap = Heap::new(
            HeapConfig::default()
                .with_memory(
                    MemoryConfig::default()
                        .with_initial_pages(2)
                        .with_maximum_pages(2),
                )
                .shared(true),
        )
        .unwrap();
        let report = run(&heap, 2, 1000, 256, Some(1)).unwrap();
        assert!(report.failed > 0);
        assert!(report.final_break <= 2 * heapbrk_memory::WASM_PAGE_SIZE);
    }

    #[test]
    fn test_stress_rejects_overflowing_call_count() {
        let heap = Heap::new(HeapConfig::default().shared(true)).unwrap();
        let err = run(&heap, 2, usize::MAX, 16, Some(0)).unwrap_err();
        assert!(err.to_string().contains("overflows"));
        assert_eq!(heap.current_break(), heap.heap_base());
    }

    #[test]
    fn test_stress_needs_shared_heap() {
        let heap = Heap::new(HeapConfig::default()).unwrap();
        assert!(run(&heap, 1, 1, 16, None).is_err());
    }
}
