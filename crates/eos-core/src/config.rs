//! Emulator configuration.
//!
//! Parsed from a `key value` text file (`config.txt`). Lines starting
//! with `#` are comments; values may be double-quoted. Out-of-range
//! numeric values are clamped into their accepted range rather than
//! rejected; the only fatal inputs are a missing file, an unknown
//! scheduler name and an unparsable number.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Scheduling policy run by the worker cores.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulerPolicy {
    /// First-come-first-served: run each process to completion.
    Fcfs,
    /// Round-robin: pre-empt after `quantum_cycles` instructions.
    Rr,
}

impl SchedulerPolicy {
    /// Display name, as written in the config file.
    pub fn name(&self) -> &'static str {
        match self {
            SchedulerPolicy::Fcfs => "fcfs",
            SchedulerPolicy::Rr => "rr",
        }
    }
}

impl FromStr for SchedulerPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fcfs" => Ok(SchedulerPolicy::Fcfs),
            "rr" => Ok(SchedulerPolicy::Rr),
            _ => Err(ConfigError::InvalidScheduler),
        }
    }
}

impl fmt::Display for SchedulerPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors from loading the configuration file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigError {
    /// The config file does not exist or cannot be opened.
    FileNotFound,
    /// The `scheduler` key names an unknown policy.
    InvalidScheduler,
    /// A numeric value failed to parse.
    Parse {
        /// 1-based line number of the offending entry.
        line: usize,
        /// The key whose value failed to parse.
        key: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound => f.write_str("file-not-found"),
            ConfigError::InvalidScheduler => f.write_str("invalid-scheduler"),
            ConfigError::Parse { line, key } => {
                write!(f, "parse-error (line {}, key {})", line, key)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Emulator configuration.
///
/// Defaults match an uninitialized emulator; `load` overrides whichever
/// keys the file provides.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Worker cores, clamped to [1, 128].
    pub num_cpu: u32,
    /// Scheduling policy.
    pub scheduler: SchedulerPolicy,
    /// Instructions per round-robin turn, at least 1.
    pub quantum_cycles: u32,
    /// Seconds between batch-generated processes, at least 1.
    pub batch_process_freq: u32,
    /// Minimum dummy instructions per generated process, at least 1.
    pub min_ins: u32,
    /// Maximum dummy instructions per generated process; coerced up to
    /// `min_ins` after parsing.
    pub max_ins: u32,
    /// Milliseconds slept per executed instruction.
    pub delay_per_exec: u32,
    /// Total physical memory in bytes, clamped to [64, 65536].
    pub max_overall_mem: u32,
    /// Frame size in bytes, clamped to [64, 65536].
    pub mem_per_frame: u32,
    /// Smallest per-process memory requirement, clamped to [64, 65536].
    pub min_mem_per_proc: u32,
    /// Largest per-process memory requirement, clamped to [64, 65536].
    pub max_mem_per_proc: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_cpu: 1,
            scheduler: SchedulerPolicy::Rr,
            quantum_cycles: 5,
            batch_process_freq: 1,
            min_ins: 1,
            max_ins: 1,
            delay_per_exec: 0,
            max_overall_mem: 65536,
            mem_per_frame: 256,
            min_mem_per_proc: 256,
            max_mem_per_proc: 4096,
        }
    }
}

/// Clamp a parsed value into the accepted memory-size range.
fn clamp_mem(v: u32) -> u32 {
    v.clamp(64, 65536)
}

/// Strip one layer of surrounding double quotes, if present.
fn unquote(s: &str) -> &str {
    let s = s.trim();
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

impl Config {
    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound)?;
        Self::parse(&text)
    }

    /// Parse configuration from the `key value` text format.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut out = Config::default();

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (key, rest) = match line.split_once(char::is_whitespace) {
                Some((k, r)) => (k, r),
                None => continue, // key with no value
            };
            let val = unquote(rest);
            let lineno = idx + 1;

            let num = |s: &str| -> Result<u32, ConfigError> {
                s.parse::<u32>().map_err(|_| ConfigError::Parse {
                    line: lineno,
                    key: key.to_string(),
                })
            };

            match key {
                "num-cpu" => out.num_cpu = num(val)?.clamp(1, 128),
                "scheduler" => out.scheduler = val.parse()?,
                "quantum-cycles" | "quantum_cycles" => {
                    out.quantum_cycles = num(val)?.max(1);
                }
                "batch-process-freq" => out.batch_process_freq = num(val)?.max(1),
                "min-ins" => out.min_ins = num(val)?.max(1),
                "max-ins" => out.max_ins = num(val)?.max(1),
                "delay-per-exec" | "delays-per-exec" => out.delay_per_exec = num(val)?,
                "max-overall-mem" => out.max_overall_mem = clamp_mem(num(val)?),
                "mem-per-frame" => out.mem_per_frame = clamp_mem(num(val)?),
                "min-mem-per-proc" => out.min_mem_per_proc = clamp_mem(num(val)?),
                "max-mem-per-proc" => out.max_mem_per_proc = clamp_mem(num(val)?),
                _ => {} // unknown keys are ignored
            }
        }

        if out.max_ins < out.min_ins {
            out.max_ins = out.min_ins;
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_uninitialized_emulator() {
        let c = Config::default();
        assert_eq!(c.num_cpu, 1);
        assert_eq!(c.scheduler, SchedulerPolicy::Rr);
        assert_eq!(c.quantum_cycles, 5);
        assert_eq!(c.batch_process_freq, 1);
        assert_eq!(c.max_overall_mem, 65536);
        assert_eq!(c.mem_per_frame, 256);
    }

    #[test]
    fn parses_all_keys() {
        let text = "\
num-cpu 4
scheduler rr
quantum-cycles 3
batch-process-freq 2
min-ins 5
max-ins 9
delay-per-exec 10
max-overall-mem 1024
mem-per-frame 256
min-mem-per-proc 256
max-mem-per-proc 512
";
        let c = Config::parse(text).unwrap();
        assert_eq!(c.num_cpu, 4);
        assert_eq!(c.scheduler, SchedulerPolicy::Rr);
        assert_eq!(c.quantum_cycles, 3);
        assert_eq!(c.batch_process_freq, 2);
        assert_eq!(c.min_ins, 5);
        assert_eq!(c.max_ins, 9);
        assert_eq!(c.delay_per_exec, 10);
        assert_eq!(c.max_overall_mem, 1024);
        assert_eq!(c.max_mem_per_proc, 512);
    }

    #[test]
    fn skips_comments_and_blank_lines() {
        let c = Config::parse("# a comment\n\nnum-cpu 2\n").unwrap();
        assert_eq!(c.num_cpu, 2);
    }

    #[test]
    fn accepts_quoted_values() {
        let c = Config::parse("scheduler \"fcfs\"\n").unwrap();
        assert_eq!(c.scheduler, SchedulerPolicy::Fcfs);
    }

    #[test]
    fn scheduler_is_case_insensitive() {
        let c = Config::parse("scheduler FCFS\n").unwrap();
        assert_eq!(c.scheduler, SchedulerPolicy::Fcfs);
    }

    #[test]
    fn unknown_scheduler_is_rejected() {
        assert_eq!(
            Config::parse("scheduler sjf\n"),
            Err(ConfigError::InvalidScheduler)
        );
    }

    #[test]
    fn bad_number_reports_line_and_key() {
        let err = Config::parse("num-cpu 1\nquantum-cycles many\n").unwrap_err();
        assert_eq!(
            err,
            ConfigError::Parse {
                line: 2,
                key: "quantum-cycles".to_string()
            }
        );
    }

    #[test]
    fn values_are_clamped() {
        let c = Config::parse("num-cpu 500\nquantum-cycles 0\nmax-overall-mem 16\n").unwrap();
        assert_eq!(c.num_cpu, 128);
        assert_eq!(c.quantum_cycles, 1);
        assert_eq!(c.max_overall_mem, 64);
    }

    #[test]
    fn max_ins_is_coerced_up_to_min_ins() {
        let c = Config::parse("min-ins 10\nmax-ins 3\n").unwrap();
        assert_eq!(c.max_ins, 10);
    }

    #[test]
    fn legacy_aliases_are_accepted() {
        let c = Config::parse("quantum_cycles 7\ndelays-per-exec 4\n").unwrap();
        assert_eq!(c.quantum_cycles, 7);
        assert_eq!(c.delay_per_exec, 4);
    }

    #[test]
    fn missing_file_is_file_not_found() {
        assert_eq!(
            Config::load("/nonexistent/config.txt"),
            Err(ConfigError::FileNotFound)
        );
    }
}
