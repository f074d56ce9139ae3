//! Column layouts of the analytical mirror tables.
//!
//! Each entity stored relationally is mirrored into an analytical table with
//! the same columns. Column types use `ClickHouse` type names.

use serde::{Deserialize, Serialize};

/// Name and type of one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: String,
}

impl ColumnDef {
    fn new(name: &str, column_type: &str) -> Self {
        Self {
            name: name.to_string(),
            column_type: column_type.to_string(),
        }
    }
}

/// Table name plus ordered column definitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    /// Renders `col type, col type, ...` for use in DDL.
    #[must_use]
    pub fn column_list(&self) -> String {
        self.columns
            .iter()
            .map(|c| format!("{} {}", c.name, c.column_type))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Mirror of [`Profile`](crate::types::Profile).
    #[must_use]
    pub fn profiles() -> Self {
        Self::with_audit_columns(
            "profiles",
            &[
                ("user_uuid", "String"),
                ("first_name", "String"),
                ("last_name", "String"),
                ("occupation", "Nullable(String)"),
                ("status", "Nullable(String)"),
                ("bio", "Nullable(String)"),
                ("file_uuid", "Nullable(String)"),
            ],
        )
    }

    /// Mirror of [`Post`](crate::types::Post).
    #[must_use]
    pub fn posts() -> Self {
        Self::with_audit_columns(
            "posts",
            &[
                ("header", "String"),
                ("hashtag", "Nullable(String)"),
                ("body", "Nullable(String)"),
                ("likes", "UInt32"),
                ("profile_id", "UUID"),
            ],
        )
    }

    /// Mirror of [`Friend`](crate::types::Friend).
    #[must_use]
    pub fn friends() -> Self {
        Self::with_audit_columns("friends", &[("profile_id", "UUID"), ("friend_id", "UUID")])
    }

    /// Every analytical table, in bootstrap order.
    #[must_use]
    pub fn all() -> Vec<Self> {
        vec![Self::profiles(), Self::posts(), Self::friends()]
    }

    // Every mirrored entity carries the same key and audit timestamps.
    fn with_audit_columns(name: &str, columns: &[(&str, &str)]) -> Self {
        let mut defs = vec![ColumnDef::new("uuid", "UUID")];
        defs.extend(columns.iter().map(|(n, t)| ColumnDef::new(n, t)));
        defs.push(ColumnDef::new("created_at", "DateTime"));
        defs.push(ColumnDef::new("updated_at", "DateTime"));
        Self {
            name: name.to_string(),
            columns: defs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_tables_in_bootstrap_order() {
        let names: Vec<_> = TableSchema::all().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["profiles", "posts", "friends"]);
    }

    #[test]
    fn friends_column_list() {
        assert_eq!(
            TableSchema::friends().column_list(),
            "uuid UUID, profile_id UUID, friend_id UUID, created_at DateTime, updated_at DateTime"
        );
    }

    #[test]
    fn every_table_has_primary_key_first() {
        for table in TableSchema::all() {
            assert_eq!(table.columns[0].name, "uuid");
        }
    }
}
