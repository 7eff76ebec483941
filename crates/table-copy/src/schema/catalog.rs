//! Built-in table catalog.
//!
//! Hand-ordered so that every table follows the tables it references. The
//! registry re-checks that order in tests.

use super::registry::{ForeignKeyRef, TableSpec};

/// `(table, [(fk column, referenced table)])`, in processing order.
pub const BUILTIN_CATALOG: &[(&str, &[(&str, &str)])] = &[
    ("country", &[]),
    ("state", &[("country_id", "country")]),
    ("city", &[("state_id", "state")]),
    ("gst_rates", &[]),
    ("users", &[]),
    ("client", &[("created_by", "users")]),
    (
        "client_bu",
        &[
            ("client_id", "client"),
            ("state_id", "state"),
            ("city_id", "city"),
        ],
    ),
    ("accounts", &[("client_bu_id", "client_bu")]),
    ("products", &[("gst_rate_id", "gst_rates")]),
    (
        "invoices",
        &[
            ("client_bu_id", "client_bu"),
            ("account_id", "accounts"),
            ("created_by", "users"),
        ],
    ),
    (
        "invoice_items",
        &[
            ("invoice_id", "invoices"),
            ("product_id", "products"),
            ("gst_rate_id", "gst_rates"),
        ],
    ),
    (
        "payments",
        &[("invoice_id", "invoices"), ("account_id", "accounts")],
    ),
];

/// Owned specs for [`BUILTIN_CATALOG`].
pub fn builtin_tables() -> Vec<TableSpec> {
    BUILTIN_CATALOG
        .iter()
        .map(|(name, fks)| TableSpec {
            name: (*name).to_string(),
            foreign_keys: fks
                .iter()
                .map(|(column, table)| ForeignKeyRef::new(*column, *table))
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaRegistry;

    #[test]
    fn test_builtin_catalog_is_valid_order() {
        let registry = SchemaRegistry::new(builtin_tables()).unwrap();
        assert_eq!(registry.len(), BUILTIN_CATALOG.len());
        assert_eq!(registry.tables_in_order()[0].name, "country");
    }

    #[test]
    fn test_builtin_client_bu_keys() {
        let registry = SchemaRegistry::builtin();
        let columns: Vec<&str> = registry
            .foreign_keys_of("client_bu")
            .iter()
            .map(|fk| fk.column.as_str())
            .collect();
        assert_eq!(columns, vec!["client_id", "state_id", "city_id"]);
    }
}
