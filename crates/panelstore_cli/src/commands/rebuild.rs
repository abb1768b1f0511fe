//! Rebuild-indexes command implementation.

use panelstore_core::{Connector, CoreResult, RebuildMode, RebuildReport, TableSchema};

/// Runs the rebuild-indexes command.
pub async fn run(
    connector: &Connector,
    tables: &[&'static TableSchema],
    exact: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mode = if exact {
        RebuildMode::Exact
    } else {
        RebuildMode::Additive
    };
    println!("Rebuilding indexes ({mode:?})");
    println!();

    for (table, report) in rebuild_all(connector, tables, mode).await? {
        println!(
            "  {:<12} {:>6} records  {:>6} memberships  {:>6} sets dropped",
            table, report.records, report.memberships, report.dropped_sets
        );
    }

    println!();
    println!("✓ Rebuild complete");
    Ok(())
}

/// Rebuilds every table in turn.
pub async fn rebuild_all(
    connector: &Connector,
    tables: &[&'static TableSchema],
    mode: RebuildMode,
) -> CoreResult<Vec<(&'static str, RebuildReport)>> {
    let mut reports = Vec::with_capacity(tables.len());
    for schema in tables {
        let report = connector.rebuild_indexes(schema, mode).await?;
        reports.push((schema.table_name, report));
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use panelstore_core::models::{self, Node, Profile};
    use panelstore_core::{FieldValue, Store, StoreConfig};
    use panelstore_storage::InMemoryBackend;
    use std::sync::Arc;

    #[tokio::test]
    async fn rebuilds_each_table() {
        let store = Store::with_backend(Arc::new(InMemoryBackend::new()), &StoreConfig::default());
        store
            .table::<Profile>()
            .insert("u1", [("email", FieldValue::from("a@test.com"))])
            .await
            .unwrap();
        store
            .table::<Node>()
            .insert("n1", [("fqdn", FieldValue::from("n1.example.com"))])
            .await
            .unwrap();

        let reports = rebuild_all(store.connector(), &models::all_schemas(), RebuildMode::Exact)
            .await
            .unwrap();

        assert_eq!(reports.len(), 5);
        let by_name: std::collections::HashMap<_, _> = reports.into_iter().collect();
        assert_eq!(by_name["profiles"].memberships, 1);
        assert_eq!(by_name["profiles"].dropped_sets, 1);
        assert_eq!(by_name["nodes"].records, 1);
        assert_eq!(by_name["servers"].records, 0);
    }
}
