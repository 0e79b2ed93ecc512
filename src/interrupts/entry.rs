//! Interrupt entry and exit for the vectors that can switch processes.
//!
//! Each stub pushes an error-code placeholder and its vector number, then
//! the common path pushes the general registers. What ends up on the
//! interrupted process's stack is exactly a `Context`. The common path
//! switches to the interrupt stack, lets the kernel handle the event and
//! resumes whichever context the kernel hands back.

use core::arch::naked_asm;

use x86_64::instructions::port::Port;

use super::idt::{InterruptIndex, PICS};
use crate::drivers::{console, keyboard, uart, CharDevice};
use crate::kernel::KERNEL;
use crate::process::Context;
use crate::{log_error, log_warn};

const ISR_STACK_SIZE: usize = 4096 * 4;

#[repr(C, align(16))]
struct IsrStack([u8; ISR_STACK_SIZE]);

static mut ISR_STACK: IsrStack = IsrStack([0; ISR_STACK_SIZE]);

macro_rules! isr_stub {
    ($name:ident, $vector:expr) => {
        #[unsafe(naked)]
        pub extern "C" fn $name() {
            naked_asm!(
                "push 0",
                "push {vector}",
                "jmp {common}",
                vector = const $vector,
                common = sym isr_common,
            );
        }
    };
}

isr_stub!(timer_stub, InterruptIndex::Timer as u8);
isr_stub!(keyboard_stub, InterruptIndex::Keyboard as u8);
isr_stub!(com1_stub, InterruptIndex::Com1 as u8);
isr_stub!(syscall_stub, InterruptIndex::Syscall as u8);

#[unsafe(naked)]
extern "C" fn isr_common() {
    naked_asm!(
        "push rax",
        "push rbx",
        "push rcx",
        "push rdx",
        "push rsi",
        "push rdi",
        "push rbp",
        "push r8",
        "push r9",
        "push r10",
        "push r11",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "cld",
        // rdi = saved context; run the kernel on its own stack
        "mov rdi, rsp",
        "lea rsp, [rip + {stack}]",
        "add rsp, {size}",
        "call {handler}",
        "mov rdi, rax",
        "jmp {resume}",
        stack = sym ISR_STACK,
        size = const ISR_STACK_SIZE,
        handler = sym isr_dispatch,
        resume = sym resume,
    );
}

/// Load the registers saved at `context` and return into that process.
///
/// # Safety
/// `context` must point at a complete `Context` laid out by `setup` or by
/// the entry path, on a live process stack.
#[unsafe(naked)]
pub unsafe extern "C" fn resume(context: u64) -> ! {
    naked_asm!(
        "mov rsp, rdi",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop r11",
        "pop r10",
        "pop r9",
        "pop r8",
        "pop rbp",
        "pop rdi",
        "pop rsi",
        "pop rdx",
        "pop rcx",
        "pop rbx",
        "pop rax",
        // vector and error code
        "add rsp, 16",
        "iretq",
    );
}

fn end_of_interrupt(index: InterruptIndex) {
    unsafe { PICS.lock().notify_end_of_interrupt(index.as_u8()) };
}

/// Kernel side of the entry path. Returns the context to resume.
extern "C" fn isr_dispatch(context: u64) -> u64 {
    // SAFETY: the entry path just built a `Context` at this address.
    let vector = unsafe { (*(context as *const Context)).vector } as u8;

    let mut guard = KERNEL.lock();
    let Some(k) = guard.as_mut() else {
        if vector == InterruptIndex::Keyboard.as_u8() {
            let mut data: Port<u8> = Port::new(0x60);
            let _ = unsafe { data.read() };
        }
        if vector != InterruptIndex::Syscall.as_u8() {
            unsafe { PICS.lock().notify_end_of_interrupt(vector) };
        }
        return context;
    };

    k.save_context(context);

    match InterruptIndex::from_vector(vector) {
        Some(InterruptIndex::Timer) => {
            k.tick();
            console::show_pinwheel(k.clock.pinwheel());
            end_of_interrupt(InterruptIndex::Timer);
        }
        Some(InterruptIndex::Keyboard) => {
            if let Some(key) = keyboard::read_key() {
                k.console_input(key);
            }
            end_of_interrupt(InterruptIndex::Keyboard);
        }
        Some(InterruptIndex::Com1) => {
            uart::drain_receiver(|byte| k.serial.receive(byte));
            k.serial_input_ready();
            end_of_interrupt(InterruptIndex::Com1);
        }
        Some(InterruptIndex::Syscall) => k.syscall(),
        None => {
            log_warn!("unexpected vector {:#x}", vector);
        }
    }

    match k.resume_context() {
        Some(next) => next,
        None => {
            log_error!("no process to resume after vector {:#x}", vector);
            k.fault(format_args!("nothing to resume"));
        }
    }
}
