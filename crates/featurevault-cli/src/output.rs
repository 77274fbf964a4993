//! Output formatting utilities

use anyhow::Result;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use console::style;
use featurevault_core::schema::FeatureSchema;
use featurevault_core::{FeatureRecord, FeatureValue};
use serde::Serialize;

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    Yaml,
}

impl OutputFormat {
    /// Parse output format from string
    /// Unlike FromStr trait, this never fails - unknown values default to Table
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            "yaml" | "yml" => Self::Yaml,
            _ => Self::Table,
        }
    }
}

/// Print data as JSON or YAML
///
/// Table output is rendered by each command; here it falls back to JSON.
pub fn print_output<T: Serialize>(data: &T, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Yaml => println!("{}", serde_yaml::to_string(data)?),
        OutputFormat::Json | OutputFormat::Table => {
            println!("{}", serde_json::to_string_pretty(data)?)
        }
    }
    Ok(())
}

/// Create a styled table
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// One row per record: entity, timestamp, then the schema's fields in order
pub fn records_table(records: &[FeatureRecord], schema: &FeatureSchema) -> Table {
    let mut table = create_table();

    let mut header = vec![schema.entity_column.clone(), schema.timestamp_column.clone()];
    header.extend(schema.fields.iter().map(|f| f.name.clone()));
    table.set_header(header);

    for record in records {
        let mut row = vec![
            Cell::new(&record.entity_id),
            Cell::new(record.observed_at.format(&schema.timestamp_format)),
        ];
        row.extend(
            schema
                .fields
                .iter()
                .map(|f| format_value(record.get(&f.name))),
        );
        table.add_row(row);
    }
    table
}

/// Feature value cell; nulls are dimmed
pub fn format_value(value: Option<&FeatureValue>) -> Cell {
    match value {
        None | Some(FeatureValue::Null) => Cell::new("-").fg(Color::DarkGrey),
        Some(v) => Cell::new(v),
    }
}

/// Print success message
pub fn print_success(msg: &str) {
    println!("{} {}", style("✓").green().bold(), msg);
}

/// Print error message
pub fn print_error(msg: &str) {
    eprintln!("{} {}", style("✗").red().bold(), msg);
}

/// Print warning message
pub fn print_warning(msg: &str) {
    println!("{} {}", style("⚠").yellow().bold(), msg);
}

/// Print info message
pub fn print_info(msg: &str) {
    println!("{} {}", style("ℹ").blue().bold(), msg);
}

/// Format status with color
pub fn format_status(status: &str) -> Cell {
    match status.to_lowercase().as_str() {
        "accepted" | "alive" => Cell::new(status).fg(Color::Green),
        "stale" | "rejected" | "dropped" => Cell::new(status).fg(Color::Yellow),
        "failed" | "dead" => Cell::new(status).fg(Color::Red),
        _ => Cell::new(status),
    }
}

/// Format a millisecond duration in human-readable form
pub fn format_duration_ms(ms: u128) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{}m {}s", ms / 60_000, (ms % 60_000) / 1000)
    }
}

/// Format count in human-readable form
pub fn format_count(count: usize) -> String {
    if count < 1000 {
        count.to_string()
    } else if count < 1_000_000 {
        format!("{:.1}K", count as f64 / 1000.0)
    } else {
        format!("{:.1}M", count as f64 / 1_000_000.0)
    }
}
