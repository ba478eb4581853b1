//! Dummy-instruction synthesis for batch-generated processes.

use std::sync::Arc;

use eos_hal::Hal;
use eos_process::Process;

/// Fill `p`'s instruction list with `count` randomized entries.
///
/// The mix matches the batch generator's program shape: declarations,
/// arithmetic on `x0`/`x1`, greetings, short sleeps, and `FOR` picks
/// expanded into one to three `PRINT` iterations (so the final line
/// count can exceed `count`). Resets the progress counter; the total
/// instruction count is derived from the line count at enqueue time.
pub fn generate_dummy_instructions<H: Hal>(hal: &H, p: &Arc<Process>, count: usize) {
    {
        let mut body = p.body();
        for i in 0..count {
            match hal.random_range(0, 5) {
                0 => {
                    let line = format!("DECLARE x{} {}", i, hal.random_range(0, 99));
                    body.lines.push(line);
                }
                1 => {
                    let line = format!("ADD x0 x1 {}", hal.random_range(0, 9));
                    body.lines.push(line);
                }
                2 => {
                    let line = format!("SUBTRACT x0 x1 {}", hal.random_range(0, 9));
                    body.lines.push(line);
                }
                3 => {
                    let line = format!("PRINT \"Hello world from {}!\"", p.name);
                    body.lines.push(line);
                }
                4 => {
                    let line = format!("SLEEP {}", hal.random_range(0, 199));
                    body.lines.push(line);
                }
                _ => {
                    let repeats = hal.random_range(1, 3);
                    for j in 1..=repeats {
                        body.lines.push(format!("PRINT \"FOR iteration {}\"", j));
                    }
                }
            }
        }
    }
    p.current_instruction.store(0, std::sync::atomic::Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;
    use eos_hal::testing::MockHal;

    #[test]
    fn generates_at_least_the_requested_count() {
        let hal = MockHal::with_seed(42);
        let p = Arc::new(Process::new("proc01", 1, "ts"));
        generate_dummy_instructions(&hal, &p, 20);
        assert!(p.body().lines.len() >= 20);
    }

    #[test]
    fn every_line_uses_a_known_opcode() {
        let hal = MockHal::with_seed(7);
        let p = Arc::new(Process::new("proc01", 1, "ts"));
        generate_dummy_instructions(&hal, &p, 50);
        for line in &p.body().lines {
            let op = line.split_whitespace().next().unwrap();
            assert!(
                matches!(op, "DECLARE" | "ADD" | "SUBTRACT" | "PRINT" | "SLEEP" | "FOR"),
                "unexpected opcode in {:?}",
                line
            );
        }
    }

    #[test]
    fn same_seed_generates_the_same_program() {
        let a = Arc::new(Process::new("p", 1, "ts"));
        let b = Arc::new(Process::new("p", 2, "ts"));
        generate_dummy_instructions(&MockHal::with_seed(9), &a, 15);
        generate_dummy_instructions(&MockHal::with_seed(9), &b, 15);
        assert_eq!(a.body().lines, b.body().lines);
    }
}
