//! Baseline Parsing
//!
//! Recovers the original (pre-governance) table inventory from whatever the
//! user attached: a JSON table list, labelled Chinese text, or raw DDL.
//! Each format has its own extractor; they are tried in order and the first
//! one that recognizes the input wins. Unrecognized input yields an empty
//! baseline, never an error.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// A column of an original table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineColumn {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
}

impl BaselineColumn {
    pub fn new(name: impl Into<String>, data_type: Option<&str>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.map(str::to_string),
        }
    }
}

/// Table name -> columns
pub type Baseline = HashMap<String, Vec<BaselineColumn>>;

type Extractor = fn(&str) -> Option<Baseline>;

/// Extractors in the order they are tried
const EXTRACTORS: &[(&str, Extractor)] = &[
    ("json", from_json),
    ("labelled text", from_labelled_text),
    ("ddl", from_ddl),
];

const TABLE_NAME_KEYS: &[&str] = &["tableName", "name", "TABLE_NAME"];
const COLUMN_NAME_KEYS: &[&str] = &["columnName", "name", "COLUMN_NAME"];
const COLUMN_TYPE_KEYS: &[&str] = &["type", "dataType", "DATA_TYPE"];

static TABLE_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"表名\s*[:：]\s*([^\s,，;；]+)").expect("table label pattern")
});

static CREATE_TABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)CREATE\s+(?:TEMPORARY\s+|TEMP\s+)?TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?(?:(?:`[^`]+`|"[^"]+"|\[[^\]]+\]|[A-Za-z_][\w$]*)\.)?(?:`([^`]+)`|"([^"]+)"|\[([^\]]+)\]|([A-Za-z_][\w$]*))"#,
    )
    .expect("create table pattern")
});

/// Parse baseline metadata text, degrading to an empty baseline
pub fn parse_baseline(text: &str) -> Baseline {
    if text.trim().is_empty() {
        return Baseline::new();
    }

    for (format, extract) in EXTRACTORS {
        if let Some(baseline) = extract(text) {
            debug!("Parsed baseline as {}: {} tables", format, baseline.len());
            return baseline;
        }
    }

    debug!("Baseline metadata not recognized, diffing without baseline");
    Baseline::new()
}

/// JSON array of tables, or an object wrapping one under `tables`
pub fn from_json(text: &str) -> Option<Baseline> {
    let trimmed = text.trim();
    if !(trimmed.starts_with('[') || trimmed.starts_with('{')) {
        return None;
    }

    let value: Value = serde_json::from_str(trimmed).ok()?;
    let tables = match &value {
        Value::Array(tables) => tables,
        Value::Object(map) => map.get("tables")?.as_array()?,
        _ => return None,
    };

    let mut baseline = Baseline::new();
    for table in tables {
        let Some(name) = first_string(table, TABLE_NAME_KEYS) else {
            continue;
        };
        let columns = table
            .get("columns")
            .and_then(Value::as_array)
            .map(|columns| json_columns(columns))
            .unwrap_or_default();
        baseline.insert(name.to_string(), columns);
    }

    (!baseline.is_empty()).then_some(baseline)
}

fn json_columns(columns: &[Value]) -> Vec<BaselineColumn> {
    let mut seen = HashSet::new();
    columns
        .iter()
        .filter_map(|column| {
            let name = first_string(column, COLUMN_NAME_KEYS)?;
            let data_type = first_string(column, COLUMN_TYPE_KEYS);
            Some(BaselineColumn::new(name, data_type))
        })
        .filter(|column| seen.insert(column.name.clone()))
        .collect()
}

fn first_string<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
}

/// `表名: <name>` headers. Columns are not recoverable from this format.
pub fn from_labelled_text(text: &str) -> Option<Baseline> {
    let baseline: Baseline = TABLE_LABEL
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| (m.as_str().to_string(), Vec::new()))
        .collect();

    (!baseline.is_empty()).then_some(baseline)
}

/// `CREATE TABLE` statements. Columns are not recoverable from this format.
pub fn from_ddl(text: &str) -> Option<Baseline> {
    let baseline: Baseline = CREATE_TABLE
        .captures_iter(text)
        .filter_map(|caps| (1..=4).find_map(|i| caps.get(i)))
        .map(|m| (m.as_str().to_string(), Vec::new()))
        .collect();

    (!baseline.is_empty()).then_some(baseline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_json_table_array() {
        let text = r#"[
            {"tableName": "orders", "columns": [
                {"columnName": "id", "type": "int"},
                {"name": "amt", "dataType": "decimal"},
                {"COLUMN_NAME": "status"}
            ]},
            {"name": "customers", "columns": []}
        ]"#;
        let baseline = parse_baseline(text);

        assert_eq!(
            baseline["orders"],
            vec![
                BaselineColumn::new("id", Some("int")),
                BaselineColumn::new("amt", Some("decimal")),
                BaselineColumn::new("status", None),
            ]
        );
        assert!(baseline["customers"].is_empty());
    }

    #[test]
    fn test_json_wrapped_in_tables_key() {
        let text = r#"{"tables": [{"TABLE_NAME": "t1", "columns": [{"name": "a", "DATA_TYPE": "VARCHAR"}]}]}"#;
        let baseline = parse_baseline(text);
        assert_eq!(baseline["t1"], vec![BaselineColumn::new("a", Some("VARCHAR"))]);
    }

    #[test]
    fn test_json_duplicate_columns_keep_first() {
        let text = r#"[{"tableName": "t", "columns": [{"name": "a", "type": "int"}, {"name": "a", "type": "text"}]}]"#;
        assert_eq!(parse_baseline(text)["t"], vec![BaselineColumn::new("a", Some("int"))]);
    }

    #[test]
    fn test_labelled_chinese_text() {
        let text = "表名: orders\n字段: id, amt\n\n表名：customers\n说明: 客户信息";
        let baseline = parse_baseline(text);

        assert_eq!(baseline.len(), 2);
        assert!(baseline["orders"].is_empty());
        assert!(baseline.contains_key("customers"));
    }

    #[test]
    fn test_ddl_quoting_styles() {
        let text = r#"
            CREATE TABLE `orders` (id INT);
            create table if not exists "customers" (id int);
            CREATE TABLE [dbo].[products] (id INT);
            CREATE TABLE public.payments (id bigint);
            CREATE TEMPORARY TABLE staging (x int);
        "#;
        let baseline = parse_baseline(text);

        let mut names: Vec<_> = baseline.keys().cloned().collect();
        names.sort();
        assert_eq!(names, vec!["customers", "orders", "payments", "products", "staging"]);
        assert!(baseline.values().all(|columns| columns.is_empty()));
    }

    #[test]
    fn test_unrecognized_input_is_empty() {
        assert!(parse_baseline("").is_empty());
        assert!(parse_baseline("just some notes about the data").is_empty());
        assert!(parse_baseline("[{broken json").is_empty());
        assert!(parse_baseline("42").is_empty());
        assert!(parse_baseline(r#"[{"columns": []}]"#).is_empty());
    }

    #[test]
    fn test_extractors_are_independent() {
        assert!(from_json("表名: orders").is_none());
        assert!(from_labelled_text("CREATE TABLE t (a int)").is_none());
        assert!(from_ddl(r#"[{"tableName": "t"}]"#).is_none());
    }
}
