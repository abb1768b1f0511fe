//! Verify-indexes command implementation.

use panelstore_core::{Connector, CoreResult, IndexReport, TableSchema};
use serde::Serialize;

/// Verification result for one table.
#[derive(Debug, Serialize)]
pub struct TableVerification {
    /// Table name.
    pub table: &'static str,
    /// Index comparison.
    pub report: IndexReport,
}

/// Runs the verify-indexes command.
pub async fn run(
    connector: &Connector,
    tables: &[&'static TableSchema],
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let results = verify_all(connector, tables).await?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        _ => {
            for result in &results {
                print_result(result);
            }
            println!();
        }
    }

    if results.iter().all(|r| r.report.is_consistent()) {
        if format != "json" {
            println!("✓ Index verification passed");
        }
        Ok(())
    } else {
        if format != "json" {
            println!("✗ Index verification failed, run rebuild-indexes --exact");
        }
        Err("Verification failed".into())
    }
}

/// Verifies every table in turn.
pub async fn verify_all(
    connector: &Connector,
    tables: &[&'static TableSchema],
) -> CoreResult<Vec<TableVerification>> {
    let mut results = Vec::with_capacity(tables.len());
    for schema in tables {
        let report = connector.verify_indexes(schema).await?;
        results.push(TableVerification {
            table: schema.table_name,
            report,
        });
    }
    Ok(results)
}

fn print_result(result: &TableVerification) {
    let report = &result.report;
    println!(
        "{}: {} missing, {} stale",
        result.table,
        report.missing.len(),
        report.stale.len()
    );
    for entry in &report.missing {
        println!("  missing  {} in {}", entry.id, entry.key);
    }
    for entry in &report.stale {
        println!("  stale    {} in {}", entry.id, entry.key);
    }
    for key in &report.unindexed_sets {
        println!("  unknown  {key} (field is not indexed)");
    }
}
