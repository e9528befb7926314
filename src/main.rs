//! kernmem demo entry

// Use jemalloc as global allocator
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

// Global type definitions
mod types;

// Import various modules
mod cache;
mod clock;
mod disk;
mod palloc;

use cache::BlockCache;
use clock::RecencyClock;
use disk::MemDisk;
use palloc::PageAllocator;
use std::sync::Arc;
use types::{CoreConfig, CoreResult};

fn load_config() -> CoreResult<CoreConfig> {
    match std::env::args().nth(1) {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&text)?)
        }
        None => Ok(CoreConfig::default()),
    }
}

fn run(config: &CoreConfig) -> CoreResult<()> {
    let device = Arc::new(MemDisk::new());
    let clock = Arc::new(RecencyClock::new());
    let blockcache = BlockCache::new(config.cache, device.clone(), clock);

    {
        let mut guard = blockcache.read(1, 1)?;
        guard[..11].copy_from_slice(b"hello block");
        guard.write()?;
    }
    let guard = blockcache.read(1, 1)?;
    println!(
        "block (1, 1): {:?}",
        std::str::from_utf8(&guard[..11]).unwrap_or("<invalid>")
    );
    drop(guard);
    println!(
        "cache: {} slots over {} buckets, device holds {} blocks",
        blockcache.blocks(),
        blockcache.buckets(),
        device.block_count()
    );

    let pages = PageAllocator::new(config.alloc);
    println!("allocator: {} pages free", pages.free_pages());
    if let Some(page) = pages.alloc() {
        pages.add_ref(page);
        pages.free(page);
        println!(
            "page shared then released once, {} owners left, {} pages free",
            pages.ref_count(page),
            pages.free_pages()
        );
        pages.free(page);
        println!("page fully released, {} pages free", pages.free_pages());
    }

    Ok(())
}

fn main() {
    let config = match load_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("kernmem: {}", err);
            std::process::exit(2);
        }
    };

    if config.enable_log {
        println!("kernmem core starting...");
        println!("Loaded modules: types, clock, disk, cache, palloc");
    }
    match run(&config) {
        Ok(()) => {
            if config.enable_log {
                println!("kernmem core demo completed!");
            }
        }
        Err(err) => {
            eprintln!("kernmem: {}", err);
            std::process::exit(1);
        }
    }
}
