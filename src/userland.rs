//! The processes the kernel boots: init, idle and a small console shell.
//!
//! They share the kernel's address space but only reach the kernel through
//! `int 0x80`. Nothing here allocates: a process preempted inside the heap
//! lock would stall the interrupt path.

use core::fmt::{self, Write};

use crate::error::SysError;
use crate::process::Priority;
use crate::syscalls::{Channel, Syscall};

/// System-call wrappers.
pub mod ulib {
    use super::*;

    unsafe fn syscall(code: Syscall, a1: u64, a2: u64, a3: u64, a4: u64) -> i64 {
        let ret: u64;
        core::arch::asm!(
            "int 0x80",
            inlateout("rax") code as u64 => ret,
            in("rdi") a1,
            in("rsi") a2,
            in("rdx") a3,
            in("rcx") a4,
        );
        ret as i64
    }

    fn result(raw: i64) -> Result<u64, SysError> {
        match i32::try_from(raw).ok().and_then(SysError::from_code) {
            Some(e) if raw < 0 => Err(e),
            _ => Ok(raw as u64),
        }
    }

    pub fn exit(status: i32) -> ! {
        unsafe { syscall(Syscall::Exit, status as u64, 0, 0, 0) };
        unreachable!("exit returned");
    }

    pub fn spawn(entry: extern "C" fn(usize, *const u8), priority: Priority, args: &[u8]) -> Result<u32, SysError> {
        let raw = unsafe {
            syscall(Syscall::Spawn, entry as usize as u64, priority as u64, args.len() as u64, args.as_ptr() as u64)
        };
        result(raw).map(|pid| pid as u32)
    }

    pub fn read(channel: Channel, buf: &mut [u8]) -> Result<usize, SysError> {
        let raw = unsafe { syscall(Syscall::Read, channel as u64, buf.as_mut_ptr() as u64, buf.len() as u64, 0) };
        result(raw).map(|n| n as usize)
    }

    pub fn write(channel: Channel, buf: &[u8]) -> Result<usize, SysError> {
        let raw = unsafe { syscall(Syscall::Write, channel as u64, buf.as_ptr() as u64, buf.len() as u64, 0) };
        result(raw).map(|n| n as usize)
    }

    pub fn sleep(ms: u32) {
        unsafe { syscall(Syscall::Sleep, ms as u64, 0, 0, 0) };
    }

    pub fn kill(pid: u32) -> Result<(), SysError> {
        result(unsafe { syscall(Syscall::Kill, pid as u64, 0, 0, 0) }).map(|_| ())
    }

    /// Wait for `pid` (0 for any child); returns the reaped pid and status.
    pub fn waitpid(pid: u32) -> Result<(u32, i32), SysError> {
        let mut status: i32 = 0;
        let raw = unsafe { syscall(Syscall::Waitpid, pid as u64, &mut status as *mut i32 as u64, 0, 0) };
        result(raw).map(|pid| (pid as u32, status))
    }

    pub fn ushell() -> u32 {
        unsafe { syscall(Syscall::Ushell, 0, 0, 0, 0) as u32 }
    }
}

/// Fixed-size line for formatted output.
struct Line {
    buf: [u8; 96],
    len: usize,
}

impl Line {
    fn new() -> Self {
        Line { buf: [0; 96], len: 0 }
    }

    fn send(&self, channel: Channel) {
        let _ = ulib::write(channel, &self.buf[..self.len]);
    }
}

impl Write for Line {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = self.buf.len() - self.len;
        let n = s.len().min(room);
        self.buf[self.len..self.len + n].copy_from_slice(&s.as_bytes()[..n]);
        self.len += n;
        Ok(())
    }
}

fn say(channel: Channel, args: fmt::Arguments) {
    let mut line = Line::new();
    let _ = line.write_fmt(args);
    line.send(channel);
}

/// Argument bytes handed over by `spawn`, fields separated by `\r`.
fn args<'a>(len: usize, ptr: *const u8) -> &'a [u8] {
    if ptr.is_null() || len == 0 {
        return &[];
    }
    unsafe { core::slice::from_raw_parts(ptr, len) }
}

fn parse_u32(field: &[u8]) -> Option<u32> {
    core::str::from_utf8(field).ok()?.trim().parse().ok()
}

pub extern "C" fn init(_len: usize, _args: *const u8) {
    say(Channel::Serial, format_args!("init: starting shell\n"));
    if let Err(e) = ulib::spawn(shell, Priority::User, b"shell") {
        say(Channel::Serial, format_args!("init: cannot start shell: {}\n", e));
    }

    // Reap everything, including orphans handed over by exiting parents.
    loop {
        match ulib::waitpid(0) {
            Ok((pid, status)) => say(Channel::Serial, format_args!("init: pid {} exited, status {}\n", pid, status)),
            Err(e) => {
                say(Channel::Serial, format_args!("init: waitpid: {}\n", e));
                ulib::sleep(1000);
            }
        }
    }
}

pub extern "C" fn idle(_len: usize, _args: *const u8) {
    say(Channel::Serial, format_args!("idle running\n"));
    loop {
        x86_64::instructions::hlt();
    }
}

/// `ticker\rC\rN`: print `C` N times, a tenth of a second apart.
extern "C" fn ticker(len: usize, ptr: *const u8) {
    let mut fields = args(len, ptr).split(|&b| b == b'\r').skip(1);
    let ch = fields.next().and_then(|f| f.first().copied()).unwrap_or(b'*');
    let count = fields.next().and_then(parse_u32).unwrap_or(10);

    for _ in 0..count {
        let _ = ulib::write(Channel::Console, &[ch]);
        ulib::sleep(100);
    }
    ulib::exit(count as i32);
}

const SHELL_HELP: &str = "t C N  print C N times\nk PID  kill\nw      reap a child\n";

extern "C" fn shell(_len: usize, _args: *const u8) {
    let owner = ulib::ushell();
    if owner != 0 {
        say(Channel::Serial, format_args!("shell: pid {} already owns the console\n", owner));
        ulib::exit(1);
    }

    let mut line = [0u8; 64];
    let mut used = 0;
    let _ = ulib::write(Channel::Console, b"> ");
    loop {
        let mut key = [0u8; 1];
        match ulib::read(Channel::Console, &mut key) {
            Ok(1) => {}
            // nothing typed; sleep until the keyboard wakes us
            _ => {
                ulib::sleep(1);
                continue;
            }
        }

        match key[0] {
            b'\n' => {
                run_command(&line[..used]);
                used = 0;
                let _ = ulib::write(Channel::Console, b"> ");
            }
            0x08 => used = used.saturating_sub(1),
            b if used < line.len() => {
                line[used] = b;
                used += 1;
            }
            _ => {}
        }
    }
}

fn run_command(line: &[u8]) {
    let mut words = line.split(|&b| b == b' ').filter(|w| !w.is_empty());
    let Some(cmd) = words.next() else {
        return;
    };

    match cmd {
        b"t" => {
            let ch = words.next().and_then(|w| w.first().copied()).unwrap_or(b'*');
            let count = words.next().and_then(parse_u32).unwrap_or(10);
            let mut args = Line::new();
            let _ = write!(args, "ticker\r{}\r{}", ch as char, count);
            match ulib::spawn(ticker, Priority::User, &args.buf[..args.len]) {
                Ok(pid) => say(Channel::Console, format_args!("started pid {}\n", pid)),
                Err(e) => say(Channel::Console, format_args!("spawn: {}\n", e)),
            }
        }
        b"k" => match words.next().and_then(parse_u32) {
            Some(pid) => {
                if let Err(e) = ulib::kill(pid) {
                    say(Channel::Console, format_args!("kill {}: {}\n", pid, e));
                }
            }
            None => say(Channel::Console, format_args!("k needs a pid\n")),
        },
        b"w" => match ulib::waitpid(0) {
            Ok((pid, status)) => say(Channel::Console, format_args!("pid {} exited, status {}\n", pid, status)),
            Err(e) => say(Channel::Console, format_args!("waitpid: {}\n", e)),
        },
        _ => say(Channel::Console, format_args!("{}", SHELL_HELP)),
    }
}
