mod stress;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use heapbrk_memory::{GrowthPolicy, MemoryConfig};
use heapbrk_runtime::{Heap, HeapConfig, DEFAULT_HEAP_BASE};
use log::info;

/// Upper bound on `stress --threads`; each thread is a real OS thread.
const MAX_STRESS_THREADS: usize = 1024;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a sequence of sbrk calls to a fresh heap
    Run {
        #[command(flatten)]
        heap: HeapArgs,

        /// Increment passed to sbrk; repeat for several calls
        #[arg(long = "delta", allow_negative_numbers = true)]
        deltas: Vec<isize>,

        /// Finally move the break to this address with brk
        #[arg(long, value_parser = parse_addr)]
        brk: Option<usize>,

        /// Keep the break in a shared region
        #[arg(long)]
        shared: bool,
    },
    /// Race threads growing one shared heap and check the ranges they get
    Stress {
        #[command(flatten)]
        heap: HeapArgs,

        #[arg(long, default_value_t = 4)]
        threads: usize,

        /// sbrk calls per thread
        #[arg(long, default_value_t = 1000)]
        calls: usize,

        /// Largest increment a thread asks for
        #[arg(long, default_value_t = 256)]
        max_delta: usize,

        /// Seed for the per-thread increment generators
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(Args)]
struct HeapArgs {
    /// Static heap boundary (decimal or 0x-prefixed hex)
    #[arg(long, default_value_t = DEFAULT_HEAP_BASE, value_parser = parse_addr)]
    heap_base: usize,

    /// Initial linear memory size in 64 KiB pages
    #[arg(long, default_value_t = 16)]
    initial_pages: usize,

    /// Maximum linear memory size in 64 KiB pages
    #[arg(long, default_value_t = 1024)]
    maximum_pages: usize,

    /// Grow memory by exactly the pages needed instead of overgrowing
    #[arg(long)]
    exact_growth: bool,
}

impl HeapArgs {
    fn config(&self) -> HeapConfig {
        let growth = if self.exact_growth {
            GrowthPolicy::Exact
        } else {
            GrowthPolicy::default()
        };
        HeapConfig::default()
            .with_heap_base(self.heap_base)
            .with_memory(
                MemoryConfig::default()
                    .with_initial_pages(self.initial_pages)
                    .with_maximum_pages(self.maximum_pages)
                    .with_growth(growth),
            )
            .profiled(true)
    }
}

fn parse_addr(s: &str) -> Result<usize, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid address {:?}: {}", s, e))
}

fn check_stress_args(threads: usize, max_delta: usize) -> anyhow::Result<()> {
    if threads == 0 || max_delta == 0 {
        bail!("--threads and --max-delta must be at least 1");
    }
    if threads > MAX_STRESS_THREADS {
        bail!("--threads must be at most {}", MAX_STRESS_THREADS);
    }
    Ok(())
}

fn run(heap: &Heap, deltas: &[isize], brk: Option<usize>) -> anyhow::Result<()> {
    println!(
        "Heap base {:#x}, memory {:#x} bytes",
        heap.heap_base(),
        heap.heap_size()
    );

    for &delta in deltas {
        match heap.grow(delta) {
            Ok(old) => println!(
                "sbrk({}) = {:#x}, break now {:#x}",
                delta,
                old,
                heap.current_break()
            ),
            Err(e) => println!("sbrk({}) failed: {}", delta, e),
        }
    }

    if let Some(addr) = brk {
        match heap.set_break(addr) {
            Ok(()) => println!("brk({:#x}) = 0, break now {:#x}", addr, heap.current_break()),
            Err(e) => println!("brk({:#x}) failed: {}", addr, e),
        }
    }

    if let Some(profile) = heap.profile() {
        println!(
            "{} break moves, peak {:#x}, net growth {} bytes, memory {:#x} bytes",
            profile.moves,
            profile.peak_break,
            profile.net_growth(),
            heap.heap_size()
        );
    }

    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            heap,
            deltas,
            brk,
            shared,
        } => {
            if shared && brk.is_some() {
                bail!("--brk is not available on a shared heap");
            }
            let heap =
                Heap::new(heap.config().shared(shared)).context("failed to create heap")?;
            run(&heap, &deltas, brk)?;
        }
        Commands::Stress {
            heap,
            threads,
            calls,
            max_delta,
            seed,
        } => {
            check_stress_args(threads, max_delta)?;
            let heap = Heap::new(heap.config().shared(true)).context("failed to create heap")?;
            info!(
                "Stress: {} threads x {} calls, increments up to {}",
                threads, calls, max_delta
            );
            let report = stress::run(&heap, threads, calls, max_delta, seed)?;
            println!("{}", report);
        }
    }

    Ok(())
}
