//! Report formatting for `screen -ls`, `report-util`, `vmstat` and
//! `process-smi`.
//!
//! Pure functions over snapshots, so the shell and the report file
//! render identically and the formats are testable.

use eos_core::{Config, CounterSnapshot};
use eos_process::ProcessSnapshot;

const RULE: &str = "---------------------------------------------------";

/// CPU utilization in percent.
fn utilization(config: &Config, counters: &CounterSnapshot) -> f64 {
    (100.0 * counters.active_cores as f64) / config.num_cpu as f64
}

/// The `screen -ls` / `report-util` summary.
pub fn format_summary(
    config: &Config,
    counters: &CounterSnapshot,
    processes: &[ProcessSnapshot],
) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "CPU Utilization: {:.2}%\n",
        utilization(config, counters)
    ));
    out.push_str(&format!("Cores used: {}\n", counters.active_cores));
    out.push_str(&format!(
        "Cores available: {}\n",
        config.num_cpu as i64 - counters.active_cores
    ));
    out.push_str(RULE);
    out.push('\n');

    out.push_str("Running Processes:\n");
    for p in processes {
        if !p.finished && p.assigned_core >= 0 {
            out.push_str(&format!(
                "{}\t({})\tCore: {}\t{} / {}\n",
                p.name, p.created, p.assigned_core, p.current_instruction, p.total_instructions
            ));
        }
    }

    out.push_str("\nFinished Processes:\n");
    for p in processes {
        if p.finished {
            out.push_str(&format!(
                "{}\t({})\tFinished\t{} / {}\n",
                p.name, p.created, p.total_instructions, p.total_instructions
            ));
        }
    }
    out.push_str(RULE);
    out.push('\n');
    out
}

/// The `vmstat` report: memory pools, tick accounting, paging activity.
pub fn format_vmstat(counters: &CounterSnapshot) -> String {
    format!(
        "total memory: {} bytes\n\
         used memory: {} bytes\n\
         free memory: {} bytes\n\
         idle cpu ticks: {}\n\
         active cpu ticks: {}\n\
         total cpu ticks: {}\n\
         num paged in: {}\n\
         num paged out: {}\n",
        counters.total_memory,
        counters.used_memory,
        counters.free_memory,
        counters.idle_ticks,
        counters.active_ticks,
        counters.total_ticks,
        counters.num_paged_in,
        counters.num_paged_out,
    )
}

/// The top-level `process-smi` overview.
pub fn format_process_smi(
    config: &Config,
    counters: &CounterSnapshot,
    processes: &[ProcessSnapshot],
) -> String {
    let mut out = String::new();
    out.push_str(RULE);
    out.push('\n');
    out.push_str(&format!(
        "CPU-Util: {:.2}%\n",
        utilization(config, counters)
    ));
    out.push_str(&format!(
        "Memory Usage: {} / {} bytes\n",
        counters.used_memory, counters.total_memory
    ));
    out.push_str(RULE);
    out.push('\n');
    out.push_str("Running processes and memory usage:\n");
    for p in processes {
        if !p.finished {
            out.push_str(&format!("{}\t{} bytes\n", p.name, p.mem_bytes));
        }
    }
    out.push_str(RULE);
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(name: &str, finished: bool, core: i32, cur: usize, total: usize) -> ProcessSnapshot {
        ProcessSnapshot {
            name: name.to_string(),
            id: 1,
            created: "01/01/1970 12:00:00AM".to_string(),
            finished,
            current_instruction: cur,
            total_instructions: total,
            assigned_core: core,
            mem_bytes: 256,
            num_pages: 1,
        }
    }

    #[test]
    fn summary_splits_running_and_finished() {
        let config = Config {
            num_cpu: 4,
            ..Config::default()
        };
        let counters = CounterSnapshot {
            active_cores: 1,
            ..CounterSnapshot::default()
        };
        let procs = vec![
            snapshot("runner", false, 0, 3, 10),
            snapshot("done", true, -1, 10, 10),
            snapshot("queued", false, -1, 0, 10),
        ];

        let text = format_summary(&config, &counters, &procs);
        assert!(text.contains("CPU Utilization: 25.00%"));
        assert!(text.contains("Cores used: 1"));
        assert!(text.contains("Cores available: 3"));
        assert!(text.contains("runner\t(01/01/1970 12:00:00AM)\tCore: 0\t3 / 10"));
        assert!(text.contains("done\t(01/01/1970 12:00:00AM)\tFinished\t10 / 10"));
        // queued but unscheduled processes are in neither section
        assert!(!text.contains("queued\t"));
    }

    #[test]
    fn vmstat_reports_every_counter() {
        let counters = CounterSnapshot {
            active_cores: 0,
            idle_ticks: 7,
            active_ticks: 3,
            total_ticks: 10,
            num_paged_in: 4,
            num_paged_out: 2,
            used_memory: 512,
            free_memory: 512,
            total_memory: 1024,
        };
        let text = format_vmstat(&counters);
        assert_eq!(
            text,
            "total memory: 1024 bytes\n\
             used memory: 512 bytes\n\
             free memory: 512 bytes\n\
             idle cpu ticks: 7\n\
             active cpu ticks: 3\n\
             total cpu ticks: 10\n\
             num paged in: 4\n\
             num paged out: 2\n"
        );
    }

    #[test]
    fn process_smi_lists_unfinished_processes() {
        let config = Config::default();
        let counters = CounterSnapshot {
            used_memory: 256,
            total_memory: 65536,
            ..CounterSnapshot::default()
        };
        let procs = vec![
            snapshot("alive", false, 0, 1, 5),
            snapshot("gone", true, -1, 5, 5),
        ];
        let text = format_process_smi(&config, &counters, &procs);
        assert!(text.contains("Memory Usage: 256 / 65536 bytes"));
        assert!(text.contains("alive\t256 bytes"));
        assert!(!text.contains("gone\t"));
    }
}
