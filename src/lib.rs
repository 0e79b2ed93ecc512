#![cfg_attr(not(test), no_std)]
#![cfg_attr(target_os = "none", feature(abi_x86_interrupt))]

extern crate alloc;

pub mod config;
pub mod serial;
pub mod error;
pub mod pool;
pub mod queue;
pub mod process;
pub mod scheduler;
pub mod clock;
pub mod syscalls;
pub mod kernel;
pub mod kshell;
pub mod drivers;

#[cfg(target_os = "none")]
pub mod interrupts;
#[cfg(target_os = "none")]
pub mod memory;
#[cfg(target_os = "none")]
pub mod userland;

/// Entered from the multiboot loader's 64-bit stub with the address of the
/// boot information in `rdi`.
#[cfg(target_os = "none")]
#[no_mangle]
pub extern "C" fn _start(multiboot_info_addr: usize) -> ! {
    use alloc::boxed::Box;
    use drivers::{console::ConsoleDevice, uart::SerialDevice};

    drivers::uart::init();
    memory::init(multiboot_info_addr);
    drivers::console::init();
    interrupts::init();
    drivers::pit::init();
    drivers::keyboard::init();
    log_info!("Baseline OS kernel started.");

    let mut kernel = kernel::Kernel::new(Box::new(ConsoleDevice::new()), Box::new(SerialDevice::new()));
    kernel.boot(userland::init as usize as u64, userland::idle as usize as u64);
    kernel.report();

    let first = kernel.resume_context();
    *kernel::KERNEL.lock() = Some(kernel);

    match first {
        // Interrupts come back on with init's RFLAGS.
        Some(context) => unsafe { interrupts::entry::resume(context) },
        None => panic!("boot left no current process"),
    }
}

#[cfg(target_os = "none")]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    x86_64::instructions::interrupts::disable();
    log_error!("{}", info);
    loop {
        x86_64::instructions::hlt();
    }
}
