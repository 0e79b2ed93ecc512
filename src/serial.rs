//! Kernel log output.
//!
//! On bare metal everything goes to COM1; host test builds print to the
//! harness's captured stdout and other host builds drop the output.

#[cfg(target_os = "none")]
#[doc(hidden)]
pub fn _print(args: ::core::fmt::Arguments) {
    use core::fmt::Write;
    x86_64::instructions::interrupts::without_interrupts(|| {
        let _ = crate::drivers::uart::SERIAL1.lock().write_fmt(args);
    });
}

#[cfg(all(not(target_os = "none"), test))]
#[doc(hidden)]
pub fn _print(args: ::core::fmt::Arguments) {
    std::print!("{}", args);
}

#[cfg(all(not(target_os = "none"), not(test)))]
#[doc(hidden)]
pub fn _print(_args: ::core::fmt::Arguments) {}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::serial::_print(format_args!("[INFO] "));
        $crate::serial::_print(format_args!($($arg)*));
        $crate::serial::_print(format_args!("\n"));
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::serial::_print(format_args!("[WARN] "));
        $crate::serial::_print(format_args!($($arg)*));
        $crate::serial::_print(format_args!("\n"));
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::serial::_print(format_args!("[ERROR] "));
        $crate::serial::_print(format_args!($($arg)*));
        $crate::serial::_print(format_args!("\n"));
    };
}

/// Trace output, compiled in only for the paths selected by `config::TRACE`.
#[macro_export]
macro_rules! log_trace {
    ($flag:expr, $($arg:tt)*) => {
        if $crate::config::TRACE.contains($flag) {
            $crate::serial::_print(format_args!("[TRACE] "));
            $crate::serial::_print(format_args!($($arg)*));
            $crate::serial::_print(format_args!("\n"));
        }
    };
}
