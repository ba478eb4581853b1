//! The attached process screen.
//!
//! Attaching to a process opens a nested prompt where the full
//! instruction set runs interactively, including the `read`/`write`
//! memory accessors. An access violation terminates the process,
//! reclaims its memory and closes the screen.

use std::io::BufRead;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use eos_core::format_timestamp;
use eos_hal::Hal;
use eos_memory::MemoryError;
use eos_process::Process;

use crate::shell::{read_line, Emulator};

/// Print a process's identity, logs and program.
pub fn print_process(p: &Arc<Process>) {
    println!();
    println!("Process name: {}", p.name);
    println!("ID: {}", p.id);
    println!("Logs:");
    let body = p.body();
    for entry in &body.logs {
        println!("({})\t\"{}\"", entry.timestamp, entry.message);
    }
    println!();
    println!("Lines of Code:");
    for (i, line) in body.lines.iter().enumerate() {
        println!("{}     {}", i + 1, line);
    }
    println!();
}

/// Run the attached screen loop for `p`.
pub fn run<H: Hal>(hal: &H, emu: &Emulator<H>, p: &Arc<Process>, input: &mut dyn BufRead) {
    print_process(p);

    let prompt = format!("root:\\{}\\> ", p.name);
    while let Some(line) = read_line(input, &prompt) {
        if line.is_empty() {
            continue;
        }
        let mut tokens = line.split_whitespace();
        let cmd = tokens.next().unwrap_or("");
        let args: Vec<&str> = tokens.collect();

        match cmd {
            "exit" => break,
            "process-smi" => print_process(p),
            "vmstat" => print!("{}", crate::report::format_vmstat(&emu.counters.snapshot())),
            "declare" => cmd_declare(hal, p, &args, input),
            "add" | "sub" => cmd_arith(hal, p, cmd, &args, input),
            "print" => cmd_print(hal, p, &line, input),
            "sleep" => cmd_sleep(hal, p, &args, input),
            "for" => cmd_for(hal, p, &args, input),
            "read" => {
                if !cmd_read(hal, emu, p, &args) {
                    break; // access violation closed the screen
                }
            }
            "write" => {
                if !cmd_write(hal, emu, p, &args) {
                    break;
                }
            }
            _ => println!(
                "Unknown command inside screen. Available: process-smi, vmstat, exit, \
                 declare, add, sub, print, sleep, for, read, write"
            ),
        }
    }

    // an unfinished process goes back to the scheduler on detach
    if !p.is_finished() {
        emu.scheduler.add_process(p);
        println!("[Info] Process {} added to scheduler queue.", p.name);
    }
}

fn now<H: Hal>(hal: &H) -> String {
    format_timestamp(hal.wallclock_ms())
}

/// Take `args[idx]`, or prompt for it.
fn operand(
    args: &[&str],
    idx: usize,
    input: &mut dyn BufRead,
    prompt: &str,
) -> Option<String> {
    match args.get(idx) {
        Some(tok) => Some(tok.to_string()),
        None => read_line(input, prompt).filter(|s| !s.is_empty()),
    }
}

fn cmd_declare<H: Hal>(hal: &H, p: &Arc<Process>, args: &[&str], input: &mut dyn BufRead) {
    let Some(var) = operand(args, 0, input, "Enter variable name: ") else {
        println!("Invalid variable name.");
        return;
    };
    let Some(val_str) = operand(args, 1, input, "Enter value: ") else {
        println!("Invalid value.");
        return;
    };
    let Ok(val) = val_str.parse::<i64>() else {
        println!("Invalid value: must be an integer.");
        return;
    };
    let val = val.clamp(0, 65_535) as u16;

    {
        let mut body = p.body();
        if !body.set_symbol(&var, val) {
            println!("Symbol table full: cannot declare {}.", var);
            return;
        }
        let line = format!("DECLARE {} {}", var, val);
        body.lines.push(line);
    }
    p.push_log(now(hal), -1, format!("Declared {} = {}", var, val));
    println!("Variable '{}' = {} declared successfully.", var, val);
}

fn cmd_arith<H: Hal>(hal: &H, p: &Arc<Process>, cmd: &str, args: &[&str], input: &mut dyn BufRead) {
    let Some(target) = operand(args, 0, input, "Enter target variable: ") else {
        println!("Invalid input.");
        return;
    };
    let Some(a) = operand(args, 1, input, "Enter first operand (variable or value): ") else {
        println!("Invalid input.");
        return;
    };
    let Some(b) = operand(args, 2, input, "Enter second operand (variable or value): ") else {
        println!("Invalid input.");
        return;
    };

    let adding = cmd == "add";
    let result = {
        let mut body = p.body();
        let va = body.resolve_token(&a);
        let vb = body.resolve_token(&b);
        let result = if adding {
            va.saturating_add(vb)
        } else {
            va.saturating_sub(vb)
        };
        body.set_symbol(&target, result);
        let mnemonic = if adding { "ADD" } else { "SUB" };
        let line = format!("{} {} {} {}", mnemonic, target, a, b);
        body.lines.push(line);
        result
    };

    let sign = if adding { "+" } else { "-" };
    p.push_log(
        now(hal),
        -1,
        format!(
            "{}: {} = {} {} {} -> {}",
            if adding { "ADD" } else { "SUB" },
            target,
            a,
            sign,
            b,
            result
        ),
    );
    println!(
        "{} successfully. {} = {}",
        if adding { "Added" } else { "Subtracted" },
        target,
        result
    );
}

fn cmd_print<H: Hal>(hal: &H, p: &Arc<Process>, line: &str, input: &mut dyn BufRead) {
    let rest = line
        .split_once(char::is_whitespace)
        .map(|(_, r)| r.trim().to_string());
    let msg = match rest.filter(|r| !r.is_empty()) {
        Some(msg) => msg,
        None => match read_line(input, "Enter message to PRINT: ") {
            Some(msg) => msg,
            None => return,
        },
    };

    p.push_log(now(hal), -1, format!("PRINT: {}", msg));
    p.body().lines.push(format!("PRINT \"{}\"", msg));
    println!("Printed message logged.");
}

fn cmd_sleep<H: Hal>(hal: &H, p: &Arc<Process>, args: &[&str], input: &mut dyn BufRead) {
    let Some(t_str) = operand(args, 0, input, "Enter sleep time in ms: ") else {
        return;
    };
    let Ok(t) = t_str.parse::<u64>() else {
        println!("Invalid number.");
        return;
    };

    p.push_log(now(hal), -1, format!("SLEEP start for {} ms", t));
    hal.sleep_ms(t);
    p.push_log(now(hal), -1, "SLEEP end");
    p.body().lines.push(format!("SLEEP {}", t));
    println!("Slept {} ms.", t);
}

fn cmd_for<H: Hal>(hal: &H, p: &Arc<Process>, args: &[&str], input: &mut dyn BufRead) {
    let Some(count_str) = operand(args, 0, input, "Enter repeat count: ") else {
        return;
    };
    let Ok(count) = count_str.parse::<u32>() else {
        println!("Invalid count");
        return;
    };

    p.push_log(now(hal), -1, format!("FOR start x{}", count));
    for i in 1..=count {
        p.push_log(now(hal), -1, format!("FOR iteration {}", i));
        hal.sleep_ms(50);
    }
    p.push_log(now(hal), -1, "FOR end");
    p.body().lines.push(format!("FOR {}", count));
    println!("For loop executed {} times.", count);
}

/// Parse a hex address, with or without a `0x` prefix.
fn parse_hex_addr(token: &str) -> Option<u32> {
    let token = token.trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(token, 16).ok()
}

/// `read <var> <hex-addr>`; false when a violation closed the screen.
fn cmd_read<H: Hal>(hal: &H, emu: &Emulator<H>, p: &Arc<Process>, args: &[&str]) -> bool {
    let (Some(var), Some(addr)) = (args.first(), args.get(1)) else {
        println!("Usage: read <var> <hex-addr>");
        return true;
    };
    let Some(addr) = parse_hex_addr(addr) else {
        println!("invalid command");
        return true;
    };

    match emu.memory.read_u16(p, addr) {
        Ok(value) => {
            if !p.body().set_symbol(var, value) {
                println!("Symbol table full: cannot store {}.", var);
                return true;
            }
            p.push_log(
                now(hal),
                -1,
                format!("READ {} = {} from 0x{:X}", var, value, addr),
            );
            println!("{} = {}", var, value);
            true
        }
        Err(e) => {
            terminate_on_violation(emu, p, e);
            false
        }
    }
}

/// `write <hex-addr> <value>`; false when a violation closed the screen.
fn cmd_write<H: Hal>(hal: &H, emu: &Emulator<H>, p: &Arc<Process>, args: &[&str]) -> bool {
    let (Some(addr), Some(val_str)) = (args.first(), args.get(1)) else {
        println!("Usage: write <hex-addr> <value>");
        return true;
    };
    let Some(addr) = parse_hex_addr(addr) else {
        println!("invalid command");
        return true;
    };
    let Ok(value) = val_str.parse::<i64>() else {
        println!("Invalid value: must be an integer.");
        return true;
    };
    let value = value.clamp(0, 65_535) as u16;

    match emu.memory.write_u16(p, addr, value) {
        Ok(()) => {
            p.push_log(now(hal), -1, format!("WRITE 0x{:X} = {}", addr, value));
            println!("Wrote {} to 0x{:X}.", value, addr);
            true
        }
        Err(e) => {
            terminate_on_violation(emu, p, e);
            false
        }
    }
}

/// Terminate a process that violated its address space and reclaim its
/// memory.
fn terminate_on_violation<H: Hal>(emu: &Emulator<H>, p: &Arc<Process>, e: MemoryError) {
    println!("{}", e);
    p.finished.store(true, Ordering::SeqCst);
    p.assigned_core.store(-1, Ordering::SeqCst);
    emu.memory.free_process(p);
    let (reserved, mem) = {
        let mut body = p.body();
        let reserved = body.mem_reserved;
        body.mem_reserved = false;
        (reserved, body.mem_bytes)
    };
    if reserved {
        emu.counters.release_memory(mem as u64);
    }
}
