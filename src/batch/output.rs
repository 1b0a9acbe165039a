//! Record writers for batch reports.
//!
//! A report is a list of flat, ordered records (`serde_json::Map` with
//! `preserve_order`). JSON and YAML keep nested values as structure; XML
//! nests elements; CSV and XLSX flatten nested values to JSON text.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use rust_xlsxwriter::Workbook;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{OpsRampError, Result};

/// One output row.
pub type Record = Map<String, Value>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Serialization formats for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Pretty-printed JSON array.
    Json,
    /// YAML sequence, keys in record order.
    #[default]
    #[serde(alias = "yml")]
    Yaml,
    /// `<root><item>...</item></root>` document.
    Xml,
    /// Header row plus one line per record.
    Csv,
    /// Single-sheet workbook.
    #[serde(alias = "excel")]
    Xlsx,
}

impl OutputFormat {
    /// Conventional file extension.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Yaml => "yaml",
            OutputFormat::Xml => "xml",
            OutputFormat::Csv => "csv",
            OutputFormat::Xlsx => "xlsx",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "yaml" | "yml" => Ok(OutputFormat::Yaml),
            "xml" => Ok(OutputFormat::Xml),
            "csv" => Ok(OutputFormat::Csv),
            "xlsx" | "excel" => Ok(OutputFormat::Xlsx),
            other => Err(format!(
                "unsupported output format '{other}' (expected json, yaml, xml, csv or xlsx)"
            )),
        }
    }
}

/// Text used for a value in tabular formats.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Union of record keys in first-seen order.
pub fn columns(records: &[Record]) -> Vec<String> {
    let mut seen = HashSet::new();
    records
        .iter()
        .flat_map(|r| r.keys())
        .filter(|k| seen.insert(k.as_str()))
        .cloned()
        .collect()
}

/// Renders records in `format`. `xml_root` names the XML document element.
pub fn render(records: &[Record], format: OutputFormat, xml_root: &str) -> Result<Vec<u8>> {
    let rendered: std::result::Result<Vec<u8>, BoxError> = match format {
        OutputFormat::Json => serde_json::to_vec_pretty(records).map_err(Into::into),
        OutputFormat::Yaml => serde_yaml::to_string(records)
            .map(String::into_bytes)
            .map_err(Into::into),
        OutputFormat::Xml => render_xml(records, xml_root),
        OutputFormat::Csv => render_csv(records),
        OutputFormat::Xlsx => render_xlsx(records),
    };
    rendered.map_err(|e| OpsRampError::output(format!("failed to render {format} output"), e))
}

/// Renders and writes records to `path`.
pub fn write_records(
    records: &[Record],
    format: OutputFormat,
    path: &Path,
    xml_root: &str,
) -> Result<()> {
    let bytes = render(records, format, xml_root)?;
    std::fs::write(path, bytes)
        .map_err(|e| OpsRampError::output(format!("failed to write {}", path.display()), e))?;
    log::info!("Data successfully saved to {}.", path.display());
    Ok(())
}

fn render_csv(records: &[Record]) -> std::result::Result<Vec<u8>, BoxError> {
    let headers = columns(records);
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&headers)?;
    for record in records {
        writer.write_record(
            headers
                .iter()
                .map(|h| record.get(h).map(cell_text).unwrap_or_default()),
        )?;
    }
    Ok(writer.into_inner().map_err(|e| e.to_string())?)
}

fn render_xlsx(records: &[Record]) -> std::result::Result<Vec<u8>, BoxError> {
    let headers = columns(records);
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();

    for (col, name) in headers.iter().enumerate() {
        worksheet.write_string(0, col as u16, name)?;
    }
    for (row_idx, record) in records.iter().enumerate() {
        let row = (row_idx + 1) as u32;
        for (col, name) in headers.iter().enumerate() {
            let col = col as u16;
            match record.get(name) {
                None | Some(Value::Null) => {}
                Some(Value::Bool(b)) => {
                    worksheet.write_boolean(row, col, *b)?;
                }
                Some(Value::Number(n)) => match n.as_f64() {
                    Some(f) => {
                        worksheet.write_number(row, col, f)?;
                    }
                    None => {
                        worksheet.write_string(row, col, n.to_string())?;
                    }
                },
                Some(other) => {
                    worksheet.write_string(row, col, cell_text(other))?;
                }
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}

/// XML element name for a record key: characters outside
/// `[A-Za-z0-9_.-]` become `_`, and a leading digit, dot or dash gets a `_`
/// prefix.
pub fn element_name(key: &str) -> String {
    let mut name: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if name
        .chars()
        .next()
        .is_none_or(|c| c.is_ascii_digit() || c == '-' || c == '.')
    {
        name.insert(0, '_');
    }
    name
}

fn render_xml(records: &[Record], root: &str) -> std::result::Result<Vec<u8>, BoxError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    let root = element_name(root);
    writer.write_event(Event::Start(BytesStart::new(root.as_str())))?;
    for record in records {
        write_xml_value(&mut writer, "item", &Value::Object(record.clone()))?;
    }
    writer.write_event(Event::End(BytesEnd::new(root.as_str())))?;
    Ok(writer.into_inner())
}

fn write_xml_value(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    value: &Value,
) -> std::result::Result<(), BoxError> {
    let name = element_name(name);
    match value {
        Value::Null => {
            writer.write_event(Event::Empty(BytesStart::new(name.as_str())))?;
        }
        Value::Object(map) => {
            writer.write_event(Event::Start(BytesStart::new(name.as_str())))?;
            for (key, child) in map {
                write_xml_value(writer, key, child)?;
            }
            writer.write_event(Event::End(BytesEnd::new(name.as_str())))?;
        }
        Value::Array(items) => {
            writer.write_event(Event::Start(BytesStart::new(name.as_str())))?;
            for child in items {
                write_xml_value(writer, "item", child)?;
            }
            writer.write_event(Event::End(BytesEnd::new(name.as_str())))?;
        }
        scalar => {
            let text = cell_text(scalar);
            writer.write_event(Event::Start(BytesStart::new(name.as_str())))?;
            writer.write_event(Event::Text(BytesText::new(&text)))?;
            writer.write_event(Event::End(BytesEnd::new(name.as_str())))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records() -> Vec<Record> {
        let first = json!({
            "server_name": "APPSRV01",
            "ip_address": "10.0.0.5",
            "Tags": {"Env": "Prod"},
            "status": "Server is Unmanaged from OpsRamp"
        });
        let second = json!({
            "server_name": "DB<02>",
            "status": "No resource found",
            "extra": 3
        });
        vec![
            first.as_object().unwrap().clone(),
            second.as_object().unwrap().clone(),
        ]
    }

    #[test]
    fn format_parsing_and_extension() {
        assert_eq!("YML".parse::<OutputFormat>().unwrap(), OutputFormat::Yaml);
        assert_eq!("excel".parse::<OutputFormat>().unwrap(), OutputFormat::Xlsx);
        assert!("pdf".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::Json.extension(), "json");
        assert_eq!(OutputFormat::default(), OutputFormat::Yaml);
    }

    #[test]
    fn columns_are_first_seen_union() {
        assert_eq!(
            columns(&records()),
            vec!["server_name", "ip_address", "Tags", "status", "extra"]
        );
    }

    #[test]
    fn yaml_keeps_record_key_order() {
        let bytes = render(&records(), OutputFormat::Yaml, "root").unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let server = text.find("server_name").unwrap();
        let ip = text.find("ip_address").unwrap();
        let status = text.find("status").unwrap();
        assert!(server < ip && ip < status);
    }

    #[test]
    fn json_round_trips_structure() {
        let bytes = render(&records(), OutputFormat::Json, "root").unwrap();
        let parsed: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed[0]["Tags"]["Env"], "Prod");
        assert_eq!(parsed[1]["extra"], 3);
    }

    #[test]
    fn csv_flattens_nested_values() {
        let bytes = render(&records(), OutputFormat::Csv, "root").unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("server_name,ip_address,Tags,status,extra"));
        assert_eq!(
            lines.next(),
            Some(r#"APPSRV01,10.0.0.5,"{""Env"":""Prod""}",Server is Unmanaged from OpsRamp,"#)
        );
        assert_eq!(lines.next(), Some("DB<02>,,,No resource found,3"));
    }

    #[test]
    fn xml_escapes_text_and_sanitises_names() {
        let text =
            String::from_utf8(render(&records(), OutputFormat::Xml, "UnmanagedServers").unwrap())
                .unwrap();
        assert!(text.contains("<UnmanagedServers>"));
        assert!(text.contains("<Env>Prod</Env>"));
        assert!(text.contains("DB&lt;02&gt;"));
        assert_eq!(element_name("Host Name"), "Host_Name");
        assert_eq!(element_name("1st"), "_1st");
        assert_eq!(element_name(""), "_");
    }

    #[test]
    fn xlsx_renders_a_zip_container() {
        let bytes = render(&records(), OutputFormat::Xlsx, "root").unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn write_records_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        write_records(&records(), OutputFormat::Json, &path, "root").unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("APPSRV01"));
    }
}
