//! Run report output
//!
//! Prints the colored end-of-run summary and writes the JSON report.

use anyhow::{Context, Result};
use colored::*;
use matrix_core::domain::combination::VersionCombination;
use matrix_core::domain::result::{Outcome, Report, RunResult};
use std::path::Path;

/// Prints the matrix without running it
pub fn print_matrix(matrix: &[VersionCombination]) {
    println!("{}", format!("{} combination(s):", matrix.len()).bold());
    println!();
    for combo in matrix {
        println!("  {} {}", "▸".cyan(), combo.name.bold());
        println!("    Package: {}", combo.source_package.dimmed());
        println!("    Build:   {}", combo.build_image.dimmed());
        println!("    Runtime: {}", combo.runtime_image.dimmed());
    }
}

/// Prints the summary of a finished run
pub fn print_report(report: &Report) {
    println!();
    println!("{}", format!("Results for run {}:", report.run_id).bold());
    println!("{}", "─".repeat(80).dimmed());

    for result in &report.results {
        print_result(result);
    }

    println!("{}", "─".repeat(80).dimmed());
    let summary = format!(
        "{} passed, {} failed, {} skipped",
        report.passed_count(),
        report.failed_count(),
        report.skipped_count()
    );
    if report.passed() {
        println!("{} {}", "✓".green().bold(), summary.green().bold());
    } else {
        println!("{} {}", "✗".red().bold(), summary.red().bold());
    }
}

fn print_result(result: &RunResult) {
    let name = &result.combination.name;
    match &result.outcome {
        Outcome::Passed => {
            println!(
                "  {} {} {}",
                "PASS".green().bold(),
                name,
                format!("({:.1?})", result.elapsed).dimmed()
            );
        }
        Outcome::Failed(failure) => {
            println!(
                "  {} {} {}",
                "FAIL".red().bold(),
                name,
                format!("({:.1?})", result.elapsed).dimmed()
            );
            println!("       Stage: {}", failure.stage.to_string().yellow());
            println!("       Cause: {}", failure.message);
        }
        Outcome::Skipped => {
            println!("  {} {}", "SKIP".yellow().bold(), name);
        }
    }
}

/// Writes the report as pretty-printed JSON
pub fn write_json(report: &Report, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::combination;
    use matrix_core::domain::result::Stage;
    use matrix_core::error::PipelineError;
    use std::time::Duration;

    #[test]
    fn test_write_json_report() {
        let report = Report::new(
            "testrun",
            vec![
                RunResult::passed(
                    combination("host20-python36", "mesh:2.0.14248"),
                    chrono::Utc::now(),
                    Duration::from_secs(42),
                ),
                RunResult::failed(
                    combination("host20-node8", "mesh:2.0.14248"),
                    Stage::BuildComplete,
                    &PipelineError::BuildFailed {
                        deployment: "d1".to_string(),
                        message: "npm install failed".to_string(),
                    },
                    chrono::Utc::now(),
                    Duration::from_secs(7),
                ),
            ],
        );

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        write_json(&report, &path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["run_id"], "testrun");
        assert_eq!(json["results"][0]["outcome"]["outcome"], "passed");
        assert_eq!(json["results"][1]["outcome"]["stage"], "build_complete");
        assert_eq!(json["results"][1]["outcome"]["kind"], "build_failed");
    }

    #[test]
    fn test_write_json_to_missing_directory() {
        let report = Report::new("testrun", vec![]);
        let err = write_json(&report, Path::new("/nonexistent/dir/report.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/dir/report.json"));
    }
}
