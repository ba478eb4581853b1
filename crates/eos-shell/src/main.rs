//! eos — an educational operating-system emulator.
//!
//! A pre-emptive multi-core scheduler over paged virtual memory with a
//! persistent backing store, driven from an interactive shell.

mod logger;
mod report;
mod screen;
mod shell;

use std::io;
use std::sync::Arc;

use eos_hal::NativeHal;

use crate::shell::Shell;

fn main() {
    logger::init();

    let hal = Arc::new(NativeHal::new());
    let mut shell = Shell::new(hal);

    let stdin = io::stdin();
    let mut input = stdin.lock();
    shell.run(&mut input);
}
