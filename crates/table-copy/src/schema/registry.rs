//! Table specs and the ordered registry.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::validate_identifier;
use crate::error::{CopyError, Result};

/// A column holding the `id` of a row in another (or the same) table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    /// Referencing column in the owning table.
    pub column: String,
    /// Referenced table; its `id` column is the referenced key.
    pub references: String,
}

impl ForeignKeyRef {
    pub fn new(column: impl Into<String>, references: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            references: references.into(),
        }
    }
}

/// One copied table and its foreign keys, in lookup order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    pub name: String,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyRef>,
}

impl TableSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            foreign_keys: Vec::new(),
        }
    }

    /// Add a foreign key, builder style.
    pub fn references(mut self, column: impl Into<String>, table: impl Into<String>) -> Self {
        self.foreign_keys.push(ForeignKeyRef::new(column, table));
        self
    }

    /// Whether any foreign key points back at this table.
    pub fn is_self_referencing(&self) -> bool {
        self.foreign_keys.iter().any(|fk| fk.references == self.name)
    }
}

impl fmt::Display for TableSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.foreign_keys.is_empty() {
            let edges: Vec<String> = self
                .foreign_keys
                .iter()
                .map(|fk| format!("{} -> {}", fk.column, fk.references))
                .collect();
            write!(f, " ({})", edges.join(", "))?;
        }
        Ok(())
    }
}

/// Ordered, validated list of tables to copy.
///
/// Construction guarantees that every table appears after all tables it
/// references (self-references excepted), so processing in list order never
/// writes a child before its parent.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    tables: Vec<TableSpec>,
}

impl SchemaRegistry {
    /// Build a registry, rejecting duplicate names and forward or unknown
    /// references.
    pub fn new(tables: Vec<TableSpec>) -> Result<Self> {
        let mut seen: HashSet<&str> = HashSet::new();

        for table in &tables {
            validate_identifier(&table.name)?;
            if seen.contains(table.name.as_str()) {
                return Err(CopyError::Config(format!(
                    "table '{}' is registered more than once",
                    table.name
                )));
            }

            let mut columns: HashSet<&str> = HashSet::new();
            for fk in &table.foreign_keys {
                validate_identifier(&fk.column)?;
                if !columns.insert(fk.column.as_str()) {
                    return Err(CopyError::Config(format!(
                        "table '{}' declares foreign key column '{}' twice",
                        table.name, fk.column
                    )));
                }
                if fk.references != table.name && !seen.contains(fk.references.as_str()) {
                    return Err(CopyError::Config(format!(
                        "table '{}' references '{}' via '{}', but '{}' is not registered before it",
                        table.name, fk.references, fk.column, fk.references
                    )));
                }
            }

            seen.insert(table.name.as_str());
        }

        Ok(Self { tables })
    }

    /// The built-in catalog.
    pub fn builtin() -> Self {
        Self {
            tables: super::builtin_tables(),
        }
    }

    /// Restrict the registry to `names`, keeping registry order.
    ///
    /// An empty list keeps every table. Unknown names are an error.
    pub fn filtered<S: AsRef<str>>(&self, names: &[S]) -> Result<Self> {
        if names.is_empty() {
            return Ok(self.clone());
        }

        let unknown: Vec<&str> = names
            .iter()
            .map(AsRef::as_ref)
            .filter(|n| self.get(n).is_none())
            .collect();
        if !unknown.is_empty() {
            return Err(CopyError::Config(format!(
                "unknown table(s): {}",
                unknown.join(", ")
            )));
        }

        let wanted: HashSet<&str> = names.iter().map(AsRef::as_ref).collect();
        Ok(Self {
            tables: self
                .tables
                .iter()
                .filter(|t| wanted.contains(t.name.as_str()))
                .cloned()
                .collect(),
        })
    }

    pub fn tables_in_order(&self) -> &[TableSpec] {
        &self.tables
    }

    pub fn get(&self, table: &str) -> Option<&TableSpec> {
        self.tables.iter().find(|t| t.name == table)
    }

    /// Foreign keys of `table`; empty for unknown tables.
    pub fn foreign_keys_of(&self, table: &str) -> &[ForeignKeyRef] {
        self.get(table)
            .map(|t| t.foreign_keys.as_slice())
            .unwrap_or(&[])
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
