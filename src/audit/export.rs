//! Audit export renderers

use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use super::{AuditEntry, AuditError};

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Pretty-printed JSON array
    Json,
    /// Header row taken from the first record's keys, in record order
    Csv,
}

impl FromStr for ExportFormat {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(AuditError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Json => f.write_str("json"),
            ExportFormat::Csv => f.write_str("csv"),
        }
    }
}

impl ExportFormat {
    /// Render entries in this format.
    pub fn render(&self, entries: &[AuditEntry]) -> Result<String, AuditError> {
        match self {
            ExportFormat::Json => Ok(serde_json::to_string_pretty(entries)?),
            ExportFormat::Csv => render_csv(entries),
        }
    }
}

fn render_csv(entries: &[AuditEntry]) -> Result<String, AuditError> {
    let rows = entries
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()?;

    let Some(Value::Object(first)) = rows.first() else {
        return Ok(String::new());
    };
    // Record order first, then anything else the first record carries
    let mut header: Vec<String> = AuditEntry::FIELDS
        .iter()
        .filter(|key| first.contains_key(**key))
        .map(|key| key.to_string())
        .collect();
    header.extend(
        first
            .keys()
            .filter(|key| !AuditEntry::FIELDS.contains(&key.as_str()))
            .cloned(),
    );

    let mut out = String::new();
    push_row(&mut out, header.iter().map(String::as_str));
    for row in &rows {
        let cells: Vec<String> = header
            .iter()
            .map(|key| row.get(key).map(cell_text).unwrap_or_default())
            .collect();
        push_row(&mut out, cells.iter().map(String::as_str));
    }
    Ok(out)
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn push_row<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>) {
    let line: Vec<String> = cells.map(escape_cell).collect();
    out.push_str(&line.join(","));
    out.push_str("\r\n");
}

fn escape_cell(cell: &str) -> String {
    if cell.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{actions, operations};

    #[test]
    fn test_parse_formats() {
        assert_eq!("json".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert_eq!("csv".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert!(matches!(
            "xml".parse::<ExportFormat>(),
            Err(AuditError::UnsupportedFormat(f)) if f == "xml"
        ));
        assert!("JSON".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_csv_header_and_escaping() {
        let entries = vec![
            AuditEntry::new(operations::ARTIFACT_LINK, actions::CREATE_RELATIONSHIP)
                .artifact("a-1")
                .detail("note", "x, \"y\""),
            AuditEntry::new(operations::PROCESSING_RUN, actions::END),
        ];
        let csv = ExportFormat::Csv.render(&entries).unwrap();
        let lines: Vec<&str> = csv.split("\r\n").filter(|l| !l.is_empty()).collect();

        assert_eq!(lines.len(), 3);
        let header: Vec<&str> = lines[0].split(',').collect();
        assert_eq!(header, AuditEntry::FIELDS);
        assert!(lines[1].contains("a-1"));
        assert!(lines[1].contains(r#""{""note"":""x, \""y\""""}""#));
    }

    #[test]
    fn test_csv_empty_input() {
        assert_eq!(ExportFormat::Csv.render(&[]).unwrap(), "");
    }

    #[test]
    fn test_json_is_array() {
        let entries = vec![AuditEntry::new(operations::PROCESSING_RUN, actions::START)];
        let json = ExportFormat::Json.render(&entries).unwrap();
        let parsed: Vec<AuditEntry> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, entries);
    }
}
