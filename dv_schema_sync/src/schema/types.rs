//! Type definitions for the parsed SQL schema

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A parsed DDL file: every table keyed case-insensitively by name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SqlSchema {
    tables: BTreeMap<String, SqlTable>,
}

impl SqlSchema {
    /// Build a schema from parsed tables. A later table with the same
    /// (case-insensitive) name replaces an earlier one.
    pub fn new(tables: impl IntoIterator<Item = SqlTable>) -> Self {
        let tables = tables
            .into_iter()
            .map(|table| (table.name.to_lowercase(), table))
            .collect();
        Self { tables }
    }

    /// Look up a table by name, ignoring case
    pub fn table(&self, name: &str) -> Option<&SqlTable> {
        self.tables.get(&name.to_lowercase())
    }

    /// Tables in case-insensitive name order
    pub fn tables(&self) -> impl Iterator<Item = &SqlTable> {
        self.tables.values()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Represents a table declared with CREATE TABLE
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlTable {
    pub name: String,
    pub columns: Vec<SqlColumn>,
    pub primary_key: Option<SqlPrimaryKey>,
    pub unique_keys: Vec<SqlIndex>,
    pub indexes: Vec<SqlIndex>,
    pub foreign_keys: Vec<SqlForeignKey>,
}

impl SqlTable {
    /// Create a new table with the given name
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            columns: Vec::new(),
            primary_key: None,
            unique_keys: Vec::new(),
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    /// Find a column by name, ignoring case
    pub fn column(&self, name: &str) -> Option<&SqlColumn> {
        self.columns
            .iter()
            .find(|column| column.name.eq_ignore_ascii_case(name))
    }

    /// The single primary key column, when the primary key is not composite
    pub fn single_primary_key_column(&self) -> Option<&str> {
        match &self.primary_key {
            Some(pk) if pk.columns.len() == 1 => Some(pk.columns[0].as_str()),
            _ => None,
        }
    }

    /// Add a column to the table
    pub fn add_column(&mut self, column: SqlColumn) {
        self.columns.push(column);
    }

    /// Set the primary key for the table
    pub fn set_primary_key(&mut self, pk: SqlPrimaryKey) {
        self.primary_key = Some(pk);
    }

    /// Add an index, routing unique ones to `unique_keys`
    pub fn add_index(&mut self, index: SqlIndex) {
        if index.is_unique {
            self.unique_keys.push(index);
        } else {
            self.indexes.push(index);
        }
    }

    /// Add a foreign key to the table
    pub fn add_foreign_key(&mut self, fk: SqlForeignKey) {
        self.foreign_keys.push(fk);
    }
}

/// Represents a column definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlColumn {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub auto_increment: bool,
    pub unsigned: bool,
    /// The clause text as it appeared in the DDL
    pub definition: String,
}

impl SqlColumn {
    /// Create a new nullable column with the given name and type
    pub fn new(name: &str, data_type: &str) -> Self {
        Self {
            name: name.to_string(),
            data_type: data_type.to_string(),
            nullable: true,
            default: None,
            auto_increment: false,
            unsigned: false,
            definition: format!("{} {}", name, data_type),
        }
    }

    /// Set whether the column is nullable
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Set a default value for the column
    pub fn default(mut self, default: &str) -> Self {
        self.default = Some(default.to_string());
        self
    }
}

/// Represents a primary key constraint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlPrimaryKey {
    pub name: Option<String>,
    pub columns: Vec<String>,
}

/// Represents a KEY, INDEX or UNIQUE constraint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlIndex {
    pub name: String,
    pub columns: Vec<String>,
    pub is_unique: bool,
    /// `USING BTREE` / `USING HASH`
    pub method: Option<String>,
}

/// Represents a foreign key constraint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlForeignKey {
    pub name: String,
    pub columns: Vec<String>,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
    pub on_delete: Option<String>,
    pub on_update: Option<String>,
}

impl SqlForeignKey {
    /// The FK column when the key is not composite
    pub fn single_column(&self) -> Option<&str> {
        match self.columns.as_slice() {
            [column] => Some(column.as_str()),
            _ => None,
        }
    }
}
