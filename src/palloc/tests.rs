// Page allocator tests

use super::*;
use crate::types::AllocConfig;
use std::collections::HashSet;
use std::sync::Arc;

fn make_allocator(total_pages: usize) -> PageAllocator {
    PageAllocator::new(AllocConfig { total_pages })
}

#[test]
fn test_init_populates_free_list() {
    let allocator = make_allocator(8);
    // One page of the range is reserved for the reference table.
    assert_eq!(allocator.page_count(), 7);
    assert_eq!(allocator.free_pages(), 7);
}

#[test]
#[should_panic(expected = "region too small")]
fn test_region_smaller_than_table_is_fatal() {
    let _ = make_allocator(1);
}

#[test]
fn test_alloc_sets_count_and_fill_pattern() {
    let allocator = make_allocator(8);
    let page = allocator.alloc().unwrap();
    assert_eq!(allocator.ref_count(page), 1);
    let bytes = unsafe { allocator.page_bytes(page) };
    assert!(bytes.iter().all(|&b| b == ALLOC_FILL));
}

#[test]
fn test_exhaustion_is_recoverable() {
    let allocator = make_allocator(8);

    let mut pages = Vec::new();
    let mut seen = HashSet::new();
    while let Some(page) = allocator.alloc() {
        assert!(seen.insert(page));
        pages.push(page);
    }
    assert_eq!(pages.len(), allocator.page_count());
    assert_eq!(allocator.free_pages(), 0);

    // Out of memory is a None, not a fault; freeing makes room again.
    assert!(allocator.alloc().is_none());
    allocator.free(pages.pop().unwrap());
    assert!(allocator.alloc().is_some());
}

#[test]
fn test_shared_page_frees_once_per_owner() {
    let allocator = make_allocator(8);
    let baseline = allocator.free_pages();

    let page = allocator.alloc().unwrap();
    allocator.add_ref(page);
    assert_eq!(allocator.ref_count(page), 2);

    // First free only drops one owner; the page stays allocated.
    allocator.free(page);
    assert_eq!(allocator.ref_count(page), 1);
    assert_eq!(allocator.free_pages(), baseline - 1);

    // Last owner's free scrubs the page and returns it to the free list.
    allocator.free(page);
    assert_eq!(allocator.ref_count(page), 0);
    assert_eq!(allocator.free_pages(), baseline);

    // Past the free-list link, the page is junk-filled.
    let bytes =
        unsafe { std::slice::from_raw_parts(allocator.page_ptr(page.0), crate::types::PAGE_SIZE) };
    assert!(bytes[4..].iter().all(|&b| b == FREE_FILL));
}

#[test]
#[should_panic(expected = "double free")]
fn test_freeing_free_page_is_fatal() {
    let allocator = make_allocator(8);
    let page = allocator.alloc().unwrap();
    allocator.free(page);
    allocator.free(page);
}

#[test]
#[should_panic(expected = "add_ref on free page")]
fn test_sharing_free_page_is_fatal() {
    let allocator = make_allocator(8);
    let page = allocator.alloc().unwrap();
    allocator.free(page);
    allocator.add_ref(page);
}

#[test]
#[should_panic(expected = "out of range")]
fn test_out_of_range_page_is_fatal() {
    let allocator = make_allocator(8);
    allocator.free(PageRef(10_000));
}

#[test]
fn test_free_then_alloc_reuses_head() {
    let allocator = make_allocator(8);
    let page = allocator.alloc().unwrap();
    allocator.free(page);
    // LIFO free list: the page just freed comes back first.
    assert_eq!(allocator.alloc(), Some(page));
}

#[test]
fn test_page_bytes_roundtrip() {
    let allocator = make_allocator(8);
    let page = allocator.alloc().unwrap();

    let bytes = unsafe { allocator.page_bytes_mut(page) };
    for (i, b) in bytes.iter_mut().enumerate() {
        *b = (i % 249) as u8;
    }
    let bytes = unsafe { allocator.page_bytes(page) };
    for (i, &b) in bytes.iter().enumerate() {
        assert_eq!(b, (i % 249) as u8);
    }
}

#[test]
fn test_concurrent_alloc_free_conserves_pages() {
    let allocator = Arc::new(make_allocator(64));
    let total = allocator.free_pages();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let allocator = allocator.clone();
        handles.push(std::thread::spawn(move || {
            let mut held = Vec::new();
            for round in 0..500usize {
                if round % 3 == 2 {
                    if let Some(page) = held.pop() {
                        allocator.free(page);
                    }
                } else if let Some(page) = allocator.alloc() {
                    assert_eq!(allocator.ref_count(page), 1);
                    held.push(page);
                }
            }
            for page in held {
                allocator.free(page);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(allocator.free_pages(), total);
}

#[test]
fn test_concurrent_sharing_balances_counts() {
    let allocator = Arc::new(make_allocator(16));
    let page = allocator.alloc().unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let allocator = allocator.clone();
        handles.push(std::thread::spawn(move || {
            for _ in 0..200 {
                allocator.add_ref(page);
                allocator.free(page);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(allocator.ref_count(page), 1);
    allocator.free(page);
    assert_eq!(allocator.free_pages(), allocator.page_count());
}
