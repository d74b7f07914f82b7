//! Fuzz target for the full script pipeline: parse, then run against a
//! small dataset under a tight budget.
//!
//! Run with: cargo +nightly fuzz run script_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use lumen_core::{Cell, Dataset, SandboxConfig};
use lumen_sandbox::{parse_program, Sandbox};

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        if let Err(err) = parse_program(input) {
            assert!(err.line >= 1, "Error line should be >= 1");
            assert!(err.column >= 1, "Error column should be >= 1");
            assert!(!err.message.is_empty(), "Error message should not be empty");
        }

        let dataset = Dataset::new(
            vec!["Nom".to_string(), "Secteur".to_string(), "CA".to_string()],
            vec![
                vec![Cell::from("Acme"), Cell::from("Industrie"), Cell::Integer(12)],
                vec![Cell::from("Globex"), Cell::Null, Cell::Real(3.5)],
            ],
        );
        let sandbox = Sandbox::new(SandboxConfig {
            max_steps: 20_000,
            max_duration_ms: 200,
            ..SandboxConfig::default()
        });
        let run = sandbox.run(input, &dataset);
        if run.error.is_some() {
            assert!(run.image.is_none(), "A failed run must not carry an image");
        }
    }
});
