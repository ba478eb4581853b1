//! The instruction subset workers execute.
//!
//! The interactive shell handles the full instruction set; a worker
//! core runs only `PRINT`, `SLEEP`, `ADD`, `SUB`/`SUBTRACT` and `FOR`.
//! Anything else is logged as skipped. All arithmetic is on 16-bit
//! unsigned values: `ADD` saturates at 65535 and `SUB` floors at zero.

use std::sync::Arc;

use eos_core::format_timestamp;
use eos_hal::Hal;
use eos_process::Process;

/// Strip one layer of surrounding double quotes.
fn unquote(s: &str) -> &str {
    let s = s.trim();
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

/// Execute one instruction line on behalf of `p`.
///
/// `core` is the executing core id, stamped into the log entries.
pub fn execute<H: Hal>(hal: &H, p: &Arc<Process>, line: &str, core: i32) {
    let line = line.trim();
    let (op, rest) = match line.split_once(char::is_whitespace) {
        Some((op, rest)) => (op, rest.trim()),
        None => (line, ""),
    };

    match op {
        "PRINT" => {
            let msg = unquote(rest);
            p.push_log(now(hal), core, format!("PRINT: {}", msg));
        }
        "SLEEP" => {
            let ms: u64 = rest
                .split_whitespace()
                .next()
                .and_then(|t| t.parse().ok())
                .unwrap_or(50);
            p.push_log(now(hal), core, format!("SLEEP start for {} ms", ms));
            hal.sleep_ms(ms);
            p.push_log(now(hal), core, "SLEEP end");
        }
        "ADD" | "SUB" | "SUBTRACT" => {
            let mut tokens = rest.split_whitespace();
            let (Some(target), Some(a), Some(b)) = (tokens.next(), tokens.next(), tokens.next())
            else {
                p.push_log(now(hal), core, format!("Skipped: {}", line));
                return;
            };
            let adding = op == "ADD";
            let result = {
                let mut body = p.body();
                let va = body.resolve_token(a);
                let vb = body.resolve_token(b);
                let result = if adding {
                    va.saturating_add(vb)
                } else {
                    va.saturating_sub(vb)
                };
                body.set_symbol(target, result);
                result
            };
            let sign = if adding { "+" } else { "-" };
            let mnemonic = if adding { "ADD" } else { "SUB" };
            p.push_log(
                now(hal),
                core,
                format!("{}: {} = {} {} {} -> {}", mnemonic, target, a, sign, b, result),
            );
        }
        "FOR" => {
            let n: u64 = rest
                .split_whitespace()
                .next()
                .and_then(|t| t.parse().ok())
                .unwrap_or(0);
            p.push_log(now(hal), core, format!("FOR start x{}", n));
            hal.sleep_ms(10 * n.min(5));
            p.push_log(now(hal), core, "FOR end");
        }
        "" => {}
        _ => {
            p.push_log(now(hal), core, format!("Skipped: {}", line));
        }
    }
}

fn now<H: Hal>(hal: &H) -> String {
    format_timestamp(hal.wallclock_ms())
}

#[cfg(test)]
mod tests {
    use super::*;
    use eos_hal::testing::MockHal;

    fn proc_fixture() -> Arc<Process> {
        Arc::new(Process::new("p", 1, "ts"))
    }

    fn last_log(p: &Arc<Process>) -> String {
        p.body().logs.last().unwrap().message.clone()
    }

    #[test]
    fn print_strips_surrounding_quotes() {
        let hal = MockHal::new();
        let p = proc_fixture();
        execute(&hal, &p, "PRINT \"Hello world from p!\"", 0);
        assert_eq!(last_log(&p), "Core 0: PRINT: Hello world from p!");
    }

    #[test]
    fn add_saturates_at_u16_max() {
        let hal = MockHal::new();
        let p = proc_fixture();
        p.body().set_symbol("a", 65_000);
        execute(&hal, &p, "ADD t a 1000", 1);
        assert_eq!(p.body().symbols["t"], 65_535);
        assert_eq!(last_log(&p), "Core 1: ADD: t = a + 1000 -> 65535");
    }

    #[test]
    fn sub_floors_at_zero() {
        let hal = MockHal::new();
        let p = proc_fixture();
        execute(&hal, &p, "SUB t 3 10", 0);
        assert_eq!(p.body().symbols["t"], 0);
    }

    #[test]
    fn subtract_is_an_alias_for_sub() {
        let hal = MockHal::new();
        let p = proc_fixture();
        execute(&hal, &p, "SUBTRACT t 10 3", 0);
        assert_eq!(p.body().symbols["t"], 7);
        assert!(last_log(&p).starts_with("Core 0: SUB: t = 10 - 3"));
    }

    #[test]
    fn unknown_operands_resolve_to_zero_entries() {
        let hal = MockHal::new();
        let p = proc_fixture();
        execute(&hal, &p, "ADD t x y", 0);
        assert_eq!(p.body().symbols["t"], 0);
        assert_eq!(p.body().symbols.get("x"), Some(&0));
        assert_eq!(p.body().symbols.get("y"), Some(&0));
    }

    #[test]
    fn sleep_parses_duration_and_blocks() {
        let hal = MockHal::new();
        let p = proc_fixture();
        execute(&hal, &p, "SLEEP 120", 0);
        assert_eq!(hal.recorded_sleeps(), vec![120]);
        let logs = p.body().logs.clone();
        assert_eq!(logs[0].message, "Core 0: SLEEP start for 120 ms");
        assert_eq!(logs[1].message, "Core 0: SLEEP end");
    }

    #[test]
    fn sleep_parse_failure_defaults_to_fifty() {
        let hal = MockHal::new();
        let p = proc_fixture();
        execute(&hal, &p, "SLEEP soon", 0);
        assert_eq!(hal.recorded_sleeps(), vec![50]);
    }

    #[test]
    fn for_sleeps_ten_ms_per_capped_iteration() {
        let hal = MockHal::new();
        let p = proc_fixture();
        execute(&hal, &p, "FOR 3", 0);
        execute(&hal, &p, "FOR 20", 0);
        assert_eq!(hal.recorded_sleeps(), vec![30, 50]);
    }

    #[test]
    fn other_ops_are_skipped() {
        let hal = MockHal::new();
        let p = proc_fixture();
        execute(&hal, &p, "DECLARE x0 7", 2);
        assert_eq!(last_log(&p), "Core 2: Skipped: DECLARE x0 7");
        assert!(p.body().symbols.is_empty());
    }

    #[test]
    fn numeric_operands_are_clamped() {
        let hal = MockHal::new();
        let p = proc_fixture();
        execute(&hal, &p, "ADD t 70000 -12", 0);
        assert_eq!(p.body().symbols["t"], 65_535);
    }
}
