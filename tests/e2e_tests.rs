//! End-to-end integration tests
//!
//! These tests replay predefined CSV command files through the full pipeline.
//! Each test:
//! 1. Reads input.csv from a fixture directory
//! 2. Replays every command through the ledger service
//! 3. Writes the final balances as CSV
//! 4. Compares actual output with expected.csv
//!
//! Test fixtures are located in tests/fixtures/ and cover:
//! - Happy path credits, debits and transfers
//! - Declined debits and transfers
//! - Same-account transfers
//! - Malformed and invalid rows
//! - Amount precision and whitespace
//! - Output ordering across several users
//!
//! Each fixture is replayed twice: once inline and once through the batching worker pool.

#[cfg(test)]
mod tests {
    use ledger_link::cli::ReplayMode;
    use ledger_link::core::BatchConfig;
    use ledger_link::replay::Replayer;
    use ledger_link::LedgerConfig;
    use rstest::rstest;
    use std::fs;
    use std::io::Write;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    /// Replay tests/fixtures/{fixture_name}/input.csv and compare with expected.csv
    ///
    /// # Panics
    ///
    /// Panics if:
    /// - Input or expected files cannot be read
    /// - Output doesn't match expected
    fn run_test_fixture(fixture_name: &str, mode: ReplayMode, config: LedgerConfig) {
        let fixture_dir = format!("tests/fixtures/{}", fixture_name);
        let input_path = format!("{}/input.csv", fixture_dir);
        let expected_path = format!("{}/expected.csv", fixture_dir);

        assert!(
            Path::new(&input_path).exists(),
            "Input file not found: {}",
            input_path
        );
        assert!(
            Path::new(&expected_path).exists(),
            "Expected file not found: {}",
            expected_path
        );

        let mut temp_output = NamedTempFile::new().expect("Failed to create temp file");

        Replayer::new(mode, config)
            .process(Path::new(&input_path), &mut temp_output)
            .unwrap_or_else(|e| panic!("Failed to replay commands: {}", e));

        temp_output.flush().expect("Failed to flush temp file");

        let actual_output = fs::read_to_string(temp_output.path())
            .unwrap_or_else(|e| panic!("Failed to read temp output file: {}", e));
        let expected_output = fs::read_to_string(&expected_path)
            .unwrap_or_else(|e| panic!("Failed to read expected file {}: {}", expected_path, e));

        assert_eq!(
            actual_output, expected_output,
            "\n\nOutput mismatch for fixture: {} (mode: {:?})\n\nActual output:\n{}\n\nExpected output:\n{}\n",
            fixture_name, mode, actual_output, expected_output
        );
    }

    /// End-to-end test for all fixtures in both replay modes
    #[rstest]
    #[case("happy_path")]
    #[case("insufficient_funds")]
    #[case("transfers")]
    #[case("same_account")]
    #[case("malformed_data")]
    #[case("precision")]
    #[case("multiple_users")]
    fn test_fixtures(
        #[case] fixture: &str,
        #[values(ReplayMode::Inline, ReplayMode::Batched)] mode: ReplayMode,
    ) {
        run_test_fixture(fixture, mode, LedgerConfig::default());
    }

    /// Tiny batches and a single-slot queue force size flushes and inline fallback
    #[rstest]
    #[case("happy_path")]
    #[case("multiple_users")]
    fn test_fixtures_under_queue_pressure(#[case] fixture: &str) {
        let config = LedgerConfig {
            batch: BatchConfig::new(1, Duration::from_millis(10), 2, 1),
            ..LedgerConfig::default()
        };
        run_test_fixture(fixture, ReplayMode::Batched, config);
    }
}
