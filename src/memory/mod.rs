//! Kernel heap and the boot memory map.
//!
//! The loader identity-maps low memory, so the kernel needs no paging of
//! its own. The heap lives in a static region; the pools grow their slices
//! out of it.

use linked_list_allocator::LockedHeap;
use multiboot2::{BootInformation, BootInformationHeader};

use crate::{log_info, log_warn};

pub const HEAP_SIZE: usize = 2 * 1024 * 1024;

#[repr(C, align(4096))]
struct HeapSpace([u8; HEAP_SIZE]);

static mut HEAP_SPACE: HeapSpace = HeapSpace([0; HEAP_SIZE]);

#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

/// Hand the static heap region to the allocator and log the firmware
/// memory map.
pub fn init(multiboot_info_addr: usize) {
    unsafe {
        let start = (&raw mut HEAP_SPACE) as *mut u8;
        ALLOCATOR.lock().init(start, HEAP_SIZE);
    }
    log_info!("Heap: {} KiB at {:#x}", HEAP_SIZE / 1024, (&raw const HEAP_SPACE) as usize);

    log_memory_map(multiboot_info_addr);
}

fn log_memory_map(multiboot_info_addr: usize) {
    let info = match unsafe { BootInformation::load(multiboot_info_addr as *const BootInformationHeader) } {
        Ok(info) => info,
        Err(e) => {
            log_warn!("no multiboot2 information at {:#x}: {:?}", multiboot_info_addr, e);
            return;
        }
    };
    let Some(tag) = info.memory_map_tag() else {
        log_warn!("multiboot2 information has no memory map");
        return;
    };

    let mut usable = 0u64;
    for area in tag.memory_areas() {
        // type 1 is RAM available to the OS
        let kind = u32::from(area.typ());
        if kind == 1 {
            usable += area.size();
        }
        log_info!(
            "  {:#012x}..{:#012x} type {}",
            area.start_address(),
            area.end_address(),
            kind
        );
    }
    log_info!("Memory map: {} MiB usable", usable / (1024 * 1024));
}
