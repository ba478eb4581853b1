//! The top-level command loop.

use std::io::{BufRead, Write};
use std::sync::Arc;

use eos_core::{format_timestamp, Config, SystemCounters};
use eos_hal::Hal;
use eos_memory::{backing::BACKING_STORE_FILE, BackingStore, MemoryManager};
use eos_process::Repository;
use eos_sched::Scheduler;

use crate::report;
use crate::screen;

/// File the `report-util` summary is written to.
const REPORT_FILE: &str = "csopesy-log.txt";
/// Config file read by `initialize`.
const CONFIG_FILE: &str = "config.txt";

/// Everything `initialize` wires together.
pub struct Emulator<H: Hal> {
    pub config: Config,
    pub repo: Arc<Repository>,
    pub counters: Arc<SystemCounters>,
    pub memory: Arc<MemoryManager>,
    pub scheduler: Scheduler<H>,
}

/// The interactive shell.
pub struct Shell<H: Hal> {
    hal: Arc<H>,
    emu: Option<Emulator<H>>,
}

/// Memory sizes accepted by the screen commands: a power of two in
/// `[64, 65536]`.
pub fn is_valid_mem_size(mem: u32) -> bool {
    (64..=65536).contains(&mem) && mem.is_power_of_two()
}

/// Print a prompt and read one line; `None` on EOF.
pub fn read_line(input: &mut dyn BufRead, prompt: &str) -> Option<String> {
    print!("{}", prompt);
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    match input.read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim().to_string()),
    }
}

impl<H: Hal> Shell<H> {
    pub fn new(hal: Arc<H>) -> Self {
        Self { hal, emu: None }
    }

    fn now(&self) -> String {
        format_timestamp(self.hal.wallclock_ms())
    }

    /// The emulator, or a reminder to initialize first.
    fn emu(&self) -> Option<&Emulator<H>> {
        if self.emu.is_none() {
            println!("Error: Must run 'initialize' first.");
        }
        self.emu.as_ref()
    }

    /// Run the command loop until `exit` or EOF.
    pub fn run(&mut self, input: &mut dyn BufRead) {
        println!("Welcome to CSOPESY!");
        println!();

        while let Some(line) = read_line(input, "root:\\> ") {
            if line.is_empty() {
                continue;
            }
            if !self.handle_command(&line, input) {
                break;
            }
        }

        if let Some(emu) = &self.emu {
            emu.scheduler.stop();
            emu.memory.persist();
        }
    }

    /// Dispatch one top-level command; false means exit.
    fn handle_command(&mut self, line: &str, input: &mut dyn BufRead) -> bool {
        let mut tokens = line.split_whitespace();
        let Some(root) = tokens.next() else {
            return true;
        };

        match root {
            "exit" => return false,
            "initialize" => self.cmd_initialize(),
            "screen" => self.cmd_screen(line, input),
            "scheduler-start" => self.cmd_scheduler_start(),
            "scheduler-stop" => self.cmd_scheduler_stop(),
            "report-util" => self.cmd_report_util(),
            "vmstat" => self.cmd_vmstat(),
            "process-smi" => self.cmd_process_smi(),
            _ => {
                println!(
                    "Unknown command. Available: initialize, exit, screen, \
                     scheduler-start, scheduler-stop, report-util, vmstat, process-smi"
                );
            }
        }
        true
    }

    /// Load `config.txt` and wire up the emulator.
    fn cmd_initialize(&mut self) {
        let config = match Config::load(CONFIG_FILE) {
            Ok(config) => config,
            Err(e) => {
                println!("Failed to initialize: {}", e);
                return;
            }
        };

        // re-initializing tears down a previous emulator first
        if let Some(old) = self.emu.take() {
            old.scheduler.stop();
            old.memory.persist();
        }

        let repo = Arc::new(Repository::new());
        let counters = Arc::new(SystemCounters::new());
        let memory = Arc::new(MemoryManager::new(
            config.max_overall_mem,
            config.mem_per_frame,
            BackingStore::open(BACKING_STORE_FILE),
            Arc::clone(&repo),
            Arc::clone(&counters),
        ));
        let scheduler = Scheduler::new(
            config.clone(),
            Arc::clone(&self.hal),
            Arc::clone(&repo),
            Arc::clone(&memory),
            Arc::clone(&counters),
        );

        println!("Initialized from {}", CONFIG_FILE);
        println!(" num-cpu={}", config.num_cpu);
        println!(" scheduler={}", config.scheduler);
        println!(" quantum-cycles={}", config.quantum_cycles);
        println!(" batch-process-freq={}", config.batch_process_freq);
        println!(" min-ins={}", config.min_ins);
        println!(" max-ins={}", config.max_ins);
        println!(" delay-per-exec={}", config.delay_per_exec);
        println!(" max-overall-mem={}", config.max_overall_mem);
        println!(" mem-per-frame={}", config.mem_per_frame);
        println!(" min-mem-per-proc={}", config.min_mem_per_proc);
        println!(" max-mem-per-proc={}", config.max_mem_per_proc);

        self.emu = Some(Emulator {
            config,
            repo,
            counters,
            memory,
            scheduler,
        });
    }

    /// `screen -s | -r | -c | -ls`.
    fn cmd_screen(&mut self, line: &str, input: &mut dyn BufRead) {
        if self.emu().is_none() {
            return;
        }
        let mut tokens = line.split_whitespace().skip(1);
        match tokens.next() {
            Some("-s") => {
                let (Some(name), Some(mem)) = (tokens.next(), tokens.next()) else {
                    println!("Usage: screen -s <process_name> <memory_bytes>");
                    return;
                };
                self.screen_create(name, mem, None, input);
            }
            Some("-r") => {
                let Some(name) = tokens.next() else {
                    println!("Usage: screen -r <process_name>");
                    return;
                };
                self.screen_attach(name, input);
            }
            Some("-c") => {
                let (Some(name), Some(mem)) = (tokens.next(), tokens.next()) else {
                    println!("Usage: screen -c <process_name> <memory_bytes> \"<instructions>\"");
                    return;
                };
                let Some(program) = quoted_payload(line) else {
                    println!("invalid command");
                    return;
                };
                self.screen_create(name, mem, Some(program.as_str()), input);
            }
            Some("-ls") => {
                let emu = self.emu.as_ref().unwrap();
                print!(
                    "{}",
                    report::format_summary(
                        &emu.config,
                        &emu.counters.snapshot(),
                        &emu.repo.snapshots()
                    )
                );
            }
            _ => {
                println!(
                    "screen commands: -s <name> <mem> (create+attach), -r <name> (attach), \
                     -c <name> <mem> \"<instructions>\" (create with program), -ls (list)"
                );
            }
        }
    }

    /// Create a process (`screen -s`/`-c`), allocate its memory and
    /// either attach or enqueue it.
    fn screen_create(
        &mut self,
        name: &str,
        mem: &str,
        program: Option<&str>,
        input: &mut dyn BufRead,
    ) {
        let emu = self.emu.as_ref().unwrap();

        let Ok(mem) = mem.parse::<u32>() else {
            println!("invalid memory allocation");
            return;
        };
        if !is_valid_mem_size(mem) {
            println!("invalid memory allocation");
            return;
        }
        if emu.repo.contains(name) {
            println!("Process {} already exists.", name);
            return;
        }

        let lines: Vec<String> = match program {
            Some(program) => {
                let lines: Vec<String> = program
                    .split(';')
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string)
                    .collect();
                if lines.is_empty() || lines.len() > 50 {
                    println!("invalid command");
                    return;
                }
                lines
            }
            None => Vec::new(),
        };

        let p = emu.repo.create(name, &self.now());
        if let Err(e) = emu.memory.allocate_process(&p, mem) {
            log::warn!("allocation for {} failed: {}", name, e);
            println!("invalid memory allocation");
            return;
        }
        if emu.counters.reserve_memory(mem as u64) {
            p.body().mem_reserved = true;
        }

        if !lines.is_empty() {
            p.body().lines = lines;
            emu.scheduler.add_process(&p);
            let total = p.body().total_instructions;
            println!("Process {} created with {} instructions.", name, total);
        } else {
            screen::run(self.hal.as_ref(), emu, &p, input);
        }
    }

    /// Attach to an existing process (`screen -r`).
    fn screen_attach(&mut self, name: &str, input: &mut dyn BufRead) {
        let emu = self.emu.as_ref().unwrap();
        let Some(p) = emu.repo.get(name) else {
            println!("Process {} not found.", name);
            return;
        };
        if p.is_finished() {
            println!(
                "Process {} has already finished execution, but you can still view its logs.",
                name
            );
            screen::print_process(&p);
            return;
        }
        screen::run(self.hal.as_ref(), emu, &p, input);
    }

    fn cmd_scheduler_start(&mut self) {
        let Some(emu) = self.emu() else { return };
        if emu.scheduler.is_running() {
            println!("Scheduler already running.");
        } else {
            emu.scheduler.start();
            println!("Scheduler started.");
        }
    }

    fn cmd_scheduler_stop(&mut self) {
        let Some(emu) = self.emu() else { return };
        if !emu.scheduler.is_running() {
            println!("Scheduler is not running.");
        } else {
            emu.scheduler.stop();
            println!("Scheduler stopped.");
        }
    }

    fn cmd_report_util(&mut self) {
        let Some(emu) = self.emu() else { return };
        let summary = report::format_summary(
            &emu.config,
            &emu.counters.snapshot(),
            &emu.repo.snapshots(),
        );
        match std::fs::write(REPORT_FILE, summary) {
            Ok(()) => println!("Saved report to {}", REPORT_FILE),
            Err(_) => println!("Failed to open {} for writing.", REPORT_FILE),
        }
    }

    fn cmd_vmstat(&mut self) {
        let Some(emu) = self.emu() else { return };
        print!("{}", report::format_vmstat(&emu.counters.snapshot()));
    }

    fn cmd_process_smi(&mut self) {
        let Some(emu) = self.emu() else { return };
        print!(
            "{}",
            report::format_process_smi(
                &emu.config,
                &emu.counters.snapshot(),
                &emu.repo.snapshots()
            )
        );
    }
}

/// The first double-quoted payload of `line`, if any.
fn quoted_payload(line: &str) -> Option<String> {
    let start = line.find('"')?;
    let end = line.rfind('"')?;
    if end <= start {
        return None;
    }
    Some(line[start + 1..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_sizes_must_be_powers_of_two_in_range() {
        assert!(is_valid_mem_size(64));
        assert!(is_valid_mem_size(256));
        assert!(is_valid_mem_size(65536));
        assert!(!is_valid_mem_size(32));
        assert!(!is_valid_mem_size(100));
        assert!(!is_valid_mem_size(131072));
        assert!(!is_valid_mem_size(0));
    }

    #[test]
    fn quoted_payload_extracts_the_program() {
        let line = "screen -c p1 256 \"PRINT \"a\"; SLEEP 5\"";
        assert_eq!(
            quoted_payload(line).as_deref(),
            Some("PRINT \"a\"; SLEEP 5")
        );
        assert_eq!(quoted_payload("screen -c p1 256"), None);
    }
}
