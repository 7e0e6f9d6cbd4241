//! Rendering of command output.

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Table};
use labeldb_core::{ResultSet, Value};
use serde_json::json;

/// What a command produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// Rows read by a select.
    Rows(ResultSet),
    /// Rows written or removed.
    Affected { count: usize, message: String },
    /// A status line.
    Message(String),
    /// A single-column listing.
    List { header: String, items: Vec<String> },
}

/// Output format selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl OutputFormat {
    /// Render command output in this format.
    pub fn render(self, output: &Output) -> String {
        match self {
            OutputFormat::Table => render_table(output),
            OutputFormat::Json => render_json(output),
            OutputFormat::Csv => render_csv(output),
        }
    }
}

fn new_table(header: impl IntoIterator<Item = impl Into<Cell>>) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED).set_header(header);
    table
}

fn render_table(output: &Output) -> String {
    match output {
        Output::Rows(result) => {
            let mut table = new_table(result.columns.iter().map(Cell::new));
            for row in &result.rows {
                table.add_row(row.iter().map(display_value));
            }
            format!("{}\n{} row(s)", table, result.len())
        }
        Output::Affected { count, message } => format!("{} ({} row(s))", message, count),
        Output::Message(message) => message.clone(),
        Output::List { header, items } if items.is_empty() => format!("no {}", header.to_lowercase()),
        Output::List { header, items } => {
            let mut table = new_table([header.as_str()]);
            for item in items {
                table.add_row([item.as_str()]);
            }
            table.to_string()
        }
    }
}

fn render_json(output: &Output) -> String {
    let document = match output {
        Output::Rows(result) => result
            .rows
            .iter()
            .map(|row| {
                result
                    .columns
                    .iter()
                    .cloned()
                    .zip(row.iter().map(json_value))
                    .collect::<serde_json::Map<_, _>>()
                    .into()
            })
            .collect::<Vec<serde_json::Value>>()
            .into(),
        Output::Affected { count, message } => json!({ "affected": count, "message": message }),
        Output::Message(message) => json!({ "message": message }),
        Output::List { items, .. } => json!(items),
    };
    serde_json::to_string_pretty(&document).unwrap_or_default()
}

fn render_csv(output: &Output) -> String {
    match output {
        Output::Rows(result) => {
            let mut lines = vec![result.columns.iter().map(|c| csv_field(c)).collect::<Vec<_>>().join(",")];
            for row in &result.rows {
                lines.push(row.iter().map(csv_value).collect::<Vec<_>>().join(","));
            }
            lines.join("\n")
        }
        Output::Affected { count, message } => format!("affected,message\n{},{}", count, csv_field(message)),
        Output::Message(message) => message.clone(),
        Output::List { header, items } => std::iter::once(csv_field(header))
            .chain(items.iter().map(|i| csv_field(i)))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Bytes(b) => format!("<{} bytes>", b.len()),
        other => other.to_string(),
    }
}

fn json_value(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => json!(b),
        Value::Int64(i) => json!(i),
        Value::Float64(f) => json!(f),
        Value::String(s) => json!(s),
        Value::Bytes(_) => json!(value.to_string()),
    }
}

/// Null is an empty field; text is always quoted so an empty marking stays
/// distinguishable from null.
fn csv_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => format!("\"{}\"", s.replace('"', "\"\"")),
        other => other.to_string(),
    }
}

fn csv_field(text: &str) -> String {
    if text.contains([',', '"', '\n']) {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Output {
        Output::Rows(ResultSet::new(
            vec!["ID".into(), "BODY".into(), "MARKING".into()],
            vec![
                vec![Value::Int64(1), Value::from("say \"hi\""), Value::from("SECRET/OPS")],
                vec![Value::Int64(2), Value::Null, Value::from("")],
            ],
        ))
    }

    #[test]
    fn test_csv_rows() {
        let output = OutputFormat::Csv.render(&sample());
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], "ID,BODY,MARKING");
        assert_eq!(lines[1], "1,\"say \"\"hi\"\"\",\"SECRET/OPS\"");
        assert_eq!(lines[2], "2,,\"\"");
    }

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(
            OutputFormat::Csv.render(&Output::Affected { count: 2, message: "x".into() }),
            "affected,message\n2,x"
        );
    }

    #[test]
    fn test_json_rows() {
        let output = OutputFormat::Json.render(&sample());
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed[0]["ID"], 1);
        assert_eq!(parsed[0]["MARKING"], "SECRET/OPS");
        assert!(parsed[1]["BODY"].is_null());
        assert_eq!(parsed[1]["MARKING"], "");
    }

    #[test]
    fn test_table_output() {
        let output = OutputFormat::Table.render(&sample());
        assert!(output.contains("MARKING"));
        assert!(output.ends_with("2 row(s)"));

        let empty = Output::List { header: "CREDENTIAL".into(), items: vec![] };
        assert_eq!(OutputFormat::Table.render(&empty), "no credential");
    }

    #[test]
    fn test_bytes_values() {
        assert_eq!(display_value(&Value::Bytes(vec![1, 2])), "<2 bytes>");
        assert_eq!(json_value(&Value::Bytes(vec![0xab])), "0xab");
    }
}
