//! Rendering of resource lists for tool results.
//!
//! Objects arrive as JSON values; the formatter is chosen per call from the
//! session's `list_output` setting.

use std::fmt::Write as _;

use kms_mcp::{ListOutput, McpResult};
use serde_json::Value;

/// One table column, read from each object by JSON pointer.
#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub header: &'static str,
    pub pointer: &'static str,
}

impl Column {
    pub const fn new(header: &'static str, pointer: &'static str) -> Self {
        Self { header, pointer }
    }
}

pub trait Formatter: Send + Sync {
    fn format(&self, items: &[Value], columns: &[Column]) -> McpResult<String>;
}

/// Full objects as a YAML sequence, minus server-side bookkeeping fields.
pub struct YamlFormatter;

/// Aligned text table of the requested columns.
pub struct TableFormatter;

static YAML: YamlFormatter = YamlFormatter;
static TABLE: TableFormatter = TableFormatter;

pub fn formatter(mode: ListOutput) -> &'static dyn Formatter {
    match mode {
        ListOutput::Yaml => &YAML,
        ListOutput::Table => &TABLE,
    }
}

impl Formatter for YamlFormatter {
    fn format(&self, items: &[Value], _columns: &[Column]) -> McpResult<String> {
        let cleaned: Vec<Value> = items.iter().cloned().map(strip_managed_fields).collect();
        Ok(serde_yaml::to_string(&cleaned)?)
    }
}

impl Formatter for TableFormatter {
    fn format(&self, items: &[Value], columns: &[Column]) -> McpResult<String> {
        let rows: Vec<Vec<String>> = items
            .iter()
            .map(|item| columns.iter().map(|c| cell(item, c.pointer)).collect())
            .collect();

        let widths: Vec<usize> = columns
            .iter()
            .enumerate()
            .map(|(i, column)| {
                rows.iter()
                    .map(|row| row[i].len())
                    .chain(std::iter::once(column.header.len()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let mut out = String::new();
        let headers: Vec<&str> = columns.iter().map(|c| c.header).collect();
        write_row(&mut out, &headers, &widths);
        for row in &rows {
            let row: Vec<&str> = row.iter().map(String::as_str).collect();
            write_row(&mut out, &row, &widths);
        }
        Ok(out)
    }
}

fn write_row(out: &mut String, cells: &[&str], widths: &[usize]) {
    let last = cells.len().saturating_sub(1);
    for (i, (cell, width)) in cells.iter().zip(widths).enumerate() {
        if i == last {
            let _ = writeln!(out, "{cell}");
        } else {
            let _ = write!(out, "{cell:<width$}   ");
        }
    }
}

fn cell(item: &Value, pointer: &str) -> String {
    match item.pointer(pointer) {
        None | Some(Value::Null) => "<none>".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Drop `metadata.managedFields`, which is noise for a reader.
pub fn strip_managed_fields(mut item: Value) -> Value {
    if let Some(metadata) = item.get_mut("metadata").and_then(Value::as_object_mut) {
        metadata.remove("managedFields");
    }
    item
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const COLUMNS: &[Column] = &[
        Column::new("NAME", "/metadata/name"),
        Column::new("PHASE", "/status/phase"),
    ];

    fn pods() -> Vec<Value> {
        vec![
            json!({"metadata": {"name": "web-1", "managedFields": [{"manager": "kubectl"}]}, "status": {"phase": "Running"}}),
            json!({"metadata": {"name": "db"}}),
        ]
    }

    #[test]
    fn test_table_alignment() {
        let out = formatter(ListOutput::Table).format(&pods(), COLUMNS).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "NAME    PHASE");
        assert_eq!(lines[1], "web-1   Running");
        assert_eq!(lines[2], "db      <none>");
    }

    #[test]
    fn test_yaml_strips_managed_fields() {
        let out = formatter(ListOutput::Yaml).format(&pods(), COLUMNS).unwrap();
        assert!(out.contains("name: web-1"));
        assert!(!out.contains("managedFields"));
    }

    #[test]
    fn test_empty_table_has_header() {
        let out = formatter(ListOutput::Table).format(&[], COLUMNS).unwrap();
        assert_eq!(out, "NAME   PHASE\n");
    }
}
