//! Inspect command implementation.

use panelstore_core::{Connector, CoreResult, TableSchema};
use serde::Serialize;
use serde_json::{Map, Value as Json};
use std::collections::BTreeMap;

/// Record counts per table.
#[derive(Debug, Serialize)]
pub struct TableStats {
    /// Table name.
    pub table: &'static str,
    /// Number of stored records.
    pub records: usize,
    /// Indexed column names.
    pub indexed: Vec<&'static str>,
}

/// One record as stored and as decoded.
#[derive(Debug, Serialize)]
pub struct RecordView {
    /// Table name.
    pub table: &'static str,
    /// Entity id.
    pub id: String,
    /// Stored strings, possibly encrypted.
    pub raw: BTreeMap<String, String>,
    /// Decoded field values.
    pub decoded: Json,
}

/// Runs the inspect command.
pub async fn run(
    connector: &Connector,
    tables: &[&'static TableSchema],
    id: Option<&str>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    match id {
        Some(id) => {
            let [schema] = tables else {
                return Err("--id requires --table".into());
            };
            let view = record(connector, *schema, id)
                .await?
                .ok_or_else(|| format!("No record {id} in {}", schema.table_name))?;
            match format {
                "json" => println!("{}", serde_json::to_string_pretty(&view)?),
                _ => print_record(&view),
            }
        }
        None => {
            let stats = table_stats(connector, tables).await?;
            match format {
                "json" => println!("{}", serde_json::to_string_pretty(&stats)?),
                _ => print_stats(&stats, connector.is_encrypted()),
            }
        }
    }
    Ok(())
}

/// Counts the records of each table.
pub async fn table_stats(
    connector: &Connector,
    tables: &[&'static TableSchema],
) -> CoreResult<Vec<TableStats>> {
    let mut stats = Vec::with_capacity(tables.len());
    for schema in tables {
        stats.push(TableStats {
            table: schema.table_name,
            records: connector.count(schema).await?,
            indexed: schema.indexed_columns().map(|c| c.name).collect(),
        });
    }
    Ok(stats)
}

/// Loads one record in both stored and decoded form.
pub async fn record(
    connector: &Connector,
    schema: &'static TableSchema,
    id: &str,
) -> CoreResult<Option<RecordView>> {
    let raw = connector.raw_record(schema, id).await?;
    let Some(fields) = connector.find(schema, id).await? else {
        return Ok(None);
    };

    let decoded: Map<String, Json> = fields
        .iter()
        .map(|(field, value)| (field.clone(), value.to_json()))
        .collect();

    Ok(Some(RecordView {
        table: schema.table_name,
        id: id.to_string(),
        raw: raw.into_iter().collect(),
        decoded: Json::Object(decoded),
    }))
}

fn print_stats(stats: &[TableStats], encrypted: bool) {
    println!("Encryption: {}", if encrypted { "enabled" } else { "disabled" });
    println!();
    for table in stats {
        println!(
            "  {:<12} {:>8} records   indexed: {}",
            table.table,
            table.records,
            table.indexed.join(", ")
        );
    }
}

fn print_record(view: &RecordView) {
    println!("{}:{}", view.table, view.id);
    for (field, stored) in &view.raw {
        let decoded = view.decoded.get(field).cloned().unwrap_or(Json::Null);
        println!("  {field:<16} {decoded}");
        if stored != &decoded.to_string() {
            println!("  {:<16} stored as {stored}", "");
        }
    }
}
