//! Kernel console commands.
//!
//! Until a user shell registers itself, each console keystroke is a one-key
//! diagnostic command. Afterwards keystrokes are input for that shell.

use crate::config::Trace;
use crate::kernel::Kernel;
use crate::{log_info, log_trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Active,
    Contexts,
    Pcbs,
    Queues,
    Report,
    Stacks,
    WakeShell,
    Help,
}

impl Command {
    pub fn from_key(key: u8) -> Command {
        match key {
            b'a' => Command::Active,
            b'c' => Command::Contexts,
            b'p' => Command::Pcbs,
            b'q' => Command::Queues,
            b'r' => Command::Report,
            b's' => Command::Stacks,
            b'u' => Command::WakeShell,
            _ => Command::Help,
        }
    }
}

const HELP: &[&str] = &[
    "Commands:",
    "  a  -- dump the active process table",
    "  c  -- dump contexts of active processes",
    "  p  -- dump the process table and PCBs",
    "  q  -- dump the queues",
    "  r  -- print the system configuration",
    "  s  -- dump stacks of active processes",
    "  u  -- wake the user shell",
    "  h  -- this message",
];

impl Kernel {
    /// A keystroke arrived on the console.
    pub fn console_input(&mut self, key: u8) {
        log_trace!(Trace::CONSOLE, "console: key {:#04x}", key);
        if self.user_shell.is_some() {
            self.console.receive(key);
            self.wake_user_shell();
        } else {
            self.kshell(Command::from_key(key));
        }
    }

    pub fn kshell(&mut self, command: Command) {
        match command {
            Command::Active => self.ptable_dump("Active processes", false),
            Command::Contexts => self.ctx_dump_all("Contexts:"),
            Command::Pcbs => {
                self.ptable_dump("Processes", true);
                for slot in self.table.iter() {
                    self.pcb_dump("  pcb", slot);
                }
            }
            Command::Queues => self.queue_dump(),
            Command::Report => self.report(),
            Command::Stacks => self.stack_dump_all(32),
            Command::WakeShell => {
                if !self.wake_user_shell() {
                    log_info!("No sleeping user shell to wake");
                }
            }
            Command::Help => {
                for line in HELP {
                    log_info!("{}", line);
                }
            }
        }
    }
}
