//! Schema Diff Engine
//!
//! Classifies every field of each governed object against the original
//! table it was mapped from. This is the "before vs. after governance" view
//! of a single run.

use crate::diff::baseline::{parse_baseline, Baseline, BaselineColumn};
use crate::models::{Attribute, GovernanceResult, OntologyObject};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// Classification of a single field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiffStatus {
    Added,
    Removed,
    Modified,
    Renamed,
    Unchanged,
}

/// One classified field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldChangeDetail {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_type: Option<String>,
    /// Present only on renamed fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    pub status: DiffStatus,
}

/// The four buckets of one object. Renamed fields live in `modified`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectFieldChanges {
    pub added: Vec<FieldChangeDetail>,
    pub removed: Vec<FieldChangeDetail>,
    pub modified: Vec<FieldChangeDetail>,
    pub unchanged: Vec<FieldChangeDetail>,
}

impl ObjectFieldChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.modified.is_empty()
            && self.unchanged.is_empty()
    }

    pub fn has_changes(&self) -> bool {
        !(self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty())
    }

    fn push(&mut self, detail: FieldChangeDetail) {
        match detail.status {
            DiffStatus::Added => self.added.push(detail),
            DiffStatus::Removed => self.removed.push(detail),
            DiffStatus::Modified | DiffStatus::Renamed => self.modified.push(detail),
            DiffStatus::Unchanged => self.unchanged.push(detail),
        }
    }
}

/// Object id -> classified fields
pub type ExtendedFieldChanges = BTreeMap<String, ObjectFieldChanges>;

/// The engine that compares governed objects with their source tables
pub struct SchemaDiffEngine;

impl SchemaDiffEngine {
    /// Diff a governed result against raw baseline metadata text
    pub fn diff_text(baseline: &str, governed: &GovernanceResult) -> ExtendedFieldChanges {
        Self::diff(&parse_baseline(baseline), governed)
    }

    /// Diff a governed result against a parsed baseline.
    ///
    /// Objects without a mapping, or mapped to a table the baseline does
    /// not know, are left out of the result.
    pub fn diff(baseline: &Baseline, governed: &GovernanceResult) -> ExtendedFieldChanges {
        let mut changes = ExtendedFieldChanges::new();
        if baseline.is_empty() {
            return changes;
        }

        for object in &governed.objects {
            let Some(table) = object.source_table() else {
                continue;
            };
            let Some(columns) = baseline.get(table) else {
                debug!("Object {} maps to unknown table {}", object.id, table);
                continue;
            };

            let fields = Self::diff_object(object, columns);
            if !fields.is_empty() {
                changes.insert(object.id.clone(), fields);
            }
        }

        changes
    }

    fn diff_object(object: &OntologyObject, columns: &[BaselineColumn]) -> ObjectFieldChanges {
        let mut fields = ObjectFieldChanges::default();

        let columns_by_name: HashMap<&str, &BaselineColumn> =
            columns.iter().map(|c| (c.name.as_str(), c)).collect();

        // Duplicate attribute names are classified once
        let mut seen: HashSet<&str> = HashSet::new();
        let attributes: Vec<&Attribute> = object
            .attributes
            .iter()
            .filter(|a| seen.insert(a.name.as_str()))
            .collect();
        let governed_names = seen;

        // Baseline columns already accounted for by a governed attribute
        let mut matched: HashSet<&str> = HashSet::new();

        for attr in attributes {
            let governed_type = attr.data_type.clone().unwrap_or_default();

            if let Some(column) = columns_by_name.get(attr.name.as_str()) {
                matched.insert(column.name.as_str());
                let status = if Self::types_differ(column.data_type.as_deref(), attr.data_type.as_deref()) {
                    DiffStatus::Modified
                } else {
                    DiffStatus::Unchanged
                };
                fields.push(FieldChangeDetail {
                    name: attr.name.clone(),
                    data_type: governed_type,
                    original_type: match status {
                        DiffStatus::Modified => column.data_type.clone(),
                        _ => None,
                    },
                    original_name: None,
                    status,
                });
                continue;
            }

            let renamed_from = attr
                .renamed_from
                .as_deref()
                .filter(|old| !governed_names.contains(old) && !matched.contains(old))
                .and_then(|old| columns_by_name.get(old));

            match renamed_from {
                Some(column) => {
                    matched.insert(column.name.as_str());
                    let original_type = if Self::types_differ(column.data_type.as_deref(), attr.data_type.as_deref()) {
                        column.data_type.clone()
                    } else {
                        None
                    };
                    fields.push(FieldChangeDetail {
                        name: attr.name.clone(),
                        data_type: governed_type,
                        original_type,
                        original_name: Some(column.name.clone()),
                        status: DiffStatus::Renamed,
                    });
                }
                None => fields.push(FieldChangeDetail {
                    name: attr.name.clone(),
                    data_type: governed_type,
                    original_type: None,
                    original_name: None,
                    status: DiffStatus::Added,
                }),
            }
        }

        for column in columns {
            if matched.insert(column.name.as_str()) {
                fields.push(FieldChangeDetail {
                    name: column.name.clone(),
                    data_type: column.data_type.clone().unwrap_or_default(),
                    original_type: None,
                    original_name: None,
                    status: DiffStatus::Removed,
                });
            }
        }

        fields
    }

    /// Types differ only when both sides carry one and they disagree
    /// ignoring case
    fn types_differ(original: Option<&str>, governed: Option<&str>) -> bool {
        match (original.map(str::trim), governed.map(str::trim)) {
            (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => a.to_lowercase() != b.to_lowercase(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn attr(name: &str, data_type: Option<&str>) -> Attribute {
        Attribute {
            name: name.to_string(),
            data_type: data_type.map(str::to_string),
            ..Default::default()
        }
    }

    fn object(id: &str, mapping: Option<&str>, attributes: Vec<Attribute>) -> OntologyObject {
        OntologyObject {
            id: id.to_string(),
            attributes,
            mappings: mapping.map(|m| vec![m.to_string()]).unwrap_or_default(),
            ..Default::default()
        }
    }

    fn governed(objects: Vec<OntologyObject>) -> GovernanceResult {
        GovernanceResult {
            objects,
            ..Default::default()
        }
    }

    fn names(details: &[FieldChangeDetail]) -> Vec<&str> {
        details.iter().map(|d| d.name.as_str()).collect()
    }

    fn orders_baseline() -> Baseline {
        Baseline::from([(
            "orders".to_string(),
            vec![
                BaselineColumn::new("id", Some("int")),
                BaselineColumn::new("amt", Some("decimal")),
            ],
        )])
    }

    #[test]
    fn test_orders_scenario() {
        let result = governed(vec![object(
            "order",
            Some("orders.id"),
            vec![attr("id", Some("int")), attr("amt", Some("varchar")), attr("status", Some("varchar"))],
        )]);

        let changes = SchemaDiffEngine::diff(&orders_baseline(), &result);
        let fields = &changes["order"];

        assert_eq!(names(&fields.added), vec!["status"]);
        assert!(fields.removed.is_empty());
        assert_eq!(
            fields.modified,
            vec![FieldChangeDetail {
                name: "amt".to_string(),
                data_type: "varchar".to_string(),
                original_type: Some("decimal".to_string()),
                original_name: None,
                status: DiffStatus::Modified,
            }]
        );
        assert_eq!(names(&fields.unchanged), vec!["id"]);
    }

    #[test]
    fn test_removed_columns() {
        let result = governed(vec![object("order", Some("orders.id"), vec![attr("id", Some("INT"))])]);
        let changes = SchemaDiffEngine::diff(&orders_baseline(), &result);

        assert_eq!(names(&changes["order"].removed), vec!["amt"]);
        assert_eq!(changes["order"].removed[0].data_type, "decimal");
        // Type comparison ignores case
        assert_eq!(names(&changes["order"].unchanged), vec!["id"]);
    }

    #[test]
    fn test_missing_type_counts_as_unchanged() {
        let baseline = Baseline::from([("t".to_string(), vec![BaselineColumn::new("a", None)])]);
        let result = governed(vec![object("o", Some("t.a"), vec![attr("a", Some("text"))])]);

        let changes = SchemaDiffEngine::diff(&baseline, &result);
        assert_eq!(names(&changes["o"].unchanged), vec!["a"]);
    }

    #[test]
    fn test_unmapped_and_unknown_objects_are_skipped() {
        let result = governed(vec![
            object("unmapped", None, vec![attr("id", Some("int"))]),
            object("elsewhere", Some("payments.id"), vec![attr("id", Some("int"))]),
        ]);
        assert!(SchemaDiffEngine::diff(&orders_baseline(), &result).is_empty());
    }

    #[test]
    fn test_objects_with_no_fields_are_omitted() {
        let baseline = Baseline::from([("empty".to_string(), vec![])]);
        let result = governed(vec![object("o", Some("empty.x"), vec![])]);
        assert!(SchemaDiffEngine::diff(&baseline, &result).is_empty());
    }

    #[test]
    fn test_case_sensitive_names() {
        let result = governed(vec![object("order", Some("orders.id"), vec![attr("ID", Some("int")), attr("amt", None)])]);
        let changes = SchemaDiffEngine::diff(&orders_baseline(), &result);

        assert_eq!(names(&changes["order"].added), vec!["ID"]);
        assert_eq!(names(&changes["order"].removed), vec!["id"]);
    }

    #[test]
    fn test_backend_supplied_rename() {
        let mut renamed = attr("order_amount", Some("varchar"));
        renamed.renamed_from = Some("amt".to_string());
        let result = governed(vec![object("order", Some("orders.id"), vec![attr("id", Some("int")), renamed])]);

        let changes = SchemaDiffEngine::diff(&orders_baseline(), &result);
        let fields = &changes["order"];

        assert!(fields.added.is_empty());
        assert!(fields.removed.is_empty());
        assert_eq!(fields.modified.len(), 1);
        assert_eq!(fields.modified[0].status, DiffStatus::Renamed);
        assert_eq!(fields.modified[0].original_name.as_deref(), Some("amt"));
        assert_eq!(fields.modified[0].original_type.as_deref(), Some("decimal"));
    }

    #[test]
    fn test_rename_hint_ignored_when_old_name_still_governed() {
        let mut copy = attr("amount_copy", Some("decimal"));
        copy.renamed_from = Some("amt".to_string());
        let result = governed(vec![object(
            "order",
            Some("orders.id"),
            vec![attr("id", Some("int")), attr("amt", Some("decimal")), copy],
        )]);

        let changes = SchemaDiffEngine::diff(&orders_baseline(), &result);
        assert_eq!(names(&changes["order"].added), vec!["amount_copy"]);
        assert_eq!(names(&changes["order"].unchanged), vec!["id", "amt"]);
    }

    #[test]
    fn test_buckets_partition_fields() {
        let baseline = Baseline::from([(
            "t".to_string(),
            vec![
                BaselineColumn::new("a", Some("int")),
                BaselineColumn::new("b", Some("int")),
                BaselineColumn::new("c", None),
            ],
        )]);
        let result = governed(vec![object(
            "o",
            Some("t.a"),
            vec![attr("a", Some("int")), attr("b", Some("text")), attr("d", None), attr("d", Some("int"))],
        )]);

        let fields = &SchemaDiffEngine::diff(&baseline, &result)["o"];
        let mut all = names(&fields.added);
        all.extend(names(&fields.removed));
        all.extend(names(&fields.modified));
        all.extend(names(&fields.unchanged));
        all.sort();
        assert_eq!(all, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_diff_from_text() {
        let text = r#"[{"tableName": "orders", "columns": [{"columnName": "id", "type": "int"}]}]"#;
        let result = governed(vec![object("order", Some("orders.id"), vec![attr("id", Some("int"))])]);

        let changes = SchemaDiffEngine::diff_text(text, &result);
        assert_eq!(names(&changes["order"].unchanged), vec!["id"]);

        // Unparseable metadata degrades to an empty diff
        assert!(SchemaDiffEngine::diff_text("not metadata", &result).is_empty());
        assert!(SchemaDiffEngine::diff_text(text, &GovernanceResult::default()).is_empty());
    }

    #[test]
    fn test_ddl_baseline_marks_all_added() {
        let result = governed(vec![object("order", Some("orders.id"), vec![attr("id", Some("int"))])]);
        let changes = SchemaDiffEngine::diff_text("CREATE TABLE `orders` (id int);", &result);
        assert_eq!(names(&changes["order"].added), vec!["id"]);
    }
}
