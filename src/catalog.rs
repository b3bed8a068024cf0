//! Catalog - read-only schema view used during dashboard generation
//!
//! Fields and tables carry the semantic annotations the rule engine matches
//! against. The `Catalog` trait is the seam towards real metadata stores; the
//! `InMemoryCatalog` registry doubles as the per-run snapshot.

use crate::error::{DashboardError, Result};
use crate::types::TypeLattice;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

pub type FieldId = u64;
pub type TableId = u64;
pub type DatabaseId = u64;

/// A column with its semantic annotations
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Stable field identity
    pub id: FieldId,

    /// Owning table
    pub table_id: TableId,

    /// User-facing name
    pub display_name: String,

    /// Internal column name
    pub name: String,

    /// Storage-level semantic type (e.g. "Integer", "DateTime")
    pub base_type: String,

    /// Declared semantic role (e.g. "Category", "FK"), if any
    #[serde(default)]
    pub special_type: Option<String>,

    /// Target field when this column is a foreign key
    #[serde(default)]
    pub fk_target_field_id: Option<FieldId>,
}

impl Field {
    pub fn new(id: FieldId, table_id: TableId, name: &str, base_type: &str) -> Self {
        Self {
            id,
            table_id,
            display_name: name.to_string(),
            name: name.to_string(),
            base_type: base_type.to_string(),
            special_type: None,
            fk_target_field_id: None,
        }
    }

    pub fn with_display_name(mut self, display_name: &str) -> Self {
        self.display_name = display_name.to_string();
        self
    }

    pub fn with_special_type(mut self, special_type: &str) -> Self {
        self.special_type = Some(special_type.to_string());
        self
    }

    pub fn with_fk_target(mut self, target: FieldId) -> Self {
        self.fk_target_field_id = Some(target);
        self
    }

    /// Numeric surrogate keys never make useful dimensions
    ///
    /// A field is a numeric key when its base type is numeric and it is
    /// either marked PK/FK or simply named "id".
    pub fn is_numeric_key(&self, lattice: &TypeLattice) -> bool {
        let keyish = self
            .special_type
            .as_deref()
            .map(|s| lattice.is_a(s, "PK") || lattice.is_a(s, "FK"))
            .unwrap_or(false)
            || self.name.eq_ignore_ascii_case("id");
        lattice.is_a(&self.base_type, "Number") && keyish
    }
}

/// A table with its entity-type annotation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Stable table identity
    pub id: TableId,

    /// Owning database
    pub db_id: DatabaseId,

    /// User-facing name
    pub display_name: String,

    /// Internal table name
    pub name: String,

    /// Entity type in the lattice (e.g. "TransactionTable")
    pub entity_type: String,

    /// Foreign-key field on the root table through which this table was
    /// reached; set only on linked-table entries inside a run
    #[serde(default)]
    pub link: Option<FieldId>,
}

impl Table {
    pub fn new(id: TableId, db_id: DatabaseId, name: &str, entity_type: &str) -> Self {
        Self {
            id,
            db_id,
            display_name: name.to_string(),
            name: name.to_string(),
            entity_type: entity_type.to_string(),
            link: None,
        }
    }

    pub fn with_display_name(mut self, display_name: &str) -> Self {
        self.display_name = display_name.to_string();
        self
    }

    pub fn with_link(mut self, link: FieldId) -> Self {
        self.link = Some(link);
        self
    }
}

/// Read-only schema access
///
/// Failures from the underlying store propagate to the caller unchanged.
pub trait Catalog {
    fn get_table(&self, id: TableId) -> Result<Table>;

    fn get_field(&self, id: FieldId) -> Result<Field>;

    /// All fields of a table, in catalog order
    fn list_fields(&self, table_id: TableId) -> Result<Vec<Field>>;

    /// Tables reachable from `root` through its foreign keys
    ///
    /// Each FK field yields its own annotated entry, so two foreign keys
    /// into the same table produce two distinct entries with different
    /// `link` annotations.
    fn linked_tables(&self, root: &Table) -> Result<Vec<Table>> {
        let mut linked = Vec::new();
        for field in self.list_fields(root.id)? {
            if let Some(target_id) = field.fk_target_field_id {
                let target = self.get_field(target_id)?;
                let mut table = self.get_table(target.table_id)?;
                table.link = Some(field.id);
                linked.push(table);
            }
        }
        Ok(linked)
    }

    /// True when every field of the table is a PK or FK marker
    ///
    /// Fields without a `special_type` count as non-matching. A table with
    /// no fields at all returns true; there is no counterexample row to
    /// find, and callers rely on that outcome for degenerate schemas.
    fn is_link_only(&self, table: &Table, lattice: &TypeLattice) -> Result<bool> {
        Ok(self.list_fields(table.id)?.iter().all(|field| {
            match field.special_type.as_deref() {
                Some(s) => lattice.is_a(s, "PK") || lattice.is_a(s, "FK"),
                None => false,
            }
        }))
    }
}

/// Serialized form of a catalog snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogJson {
    tables: Vec<Table>,
    fields: Vec<Field>,
}

/// In-memory catalog registry
///
/// Serves as the consistent snapshot for one generation run and as the
/// fixture store in tests.
#[derive(Clone, Debug, Default)]
pub struct InMemoryCatalog {
    /// Table ID → Table
    tables: HashMap<TableId, Table>,

    /// Field ID → Field
    fields: HashMap<FieldId, Field>,

    /// Table ID → Field IDs (insertion order)
    table_fields: HashMap<TableId, Vec<FieldId>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a table
    pub fn register_table(&mut self, table: Table) {
        self.table_fields.entry(table.id).or_default();
        self.tables.insert(table.id, table);
    }

    /// Register or replace a field, indexed under its owning table
    pub fn register_field(&mut self, field: Field) {
        let ids = self.table_fields.entry(field.table_id).or_default();
        if !ids.contains(&field.id) {
            ids.push(field.id);
        }
        self.fields.insert(field.id, field);
    }

    /// List all registered table ids
    pub fn list_tables(&self) -> Vec<TableId> {
        let mut ids: Vec<TableId> = self.tables.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Parse a snapshot from its JSON form
    pub fn from_json(json_str: &str) -> Result<Self> {
        let parsed: CatalogJson = serde_json::from_str(json_str)
            .map_err(|e| DashboardError::Catalog(format!("Failed to parse catalog JSON: {}", e)))?;
        let mut catalog = Self::new();
        for table in parsed.tables {
            catalog.register_table(table);
        }
        for field in parsed.fields {
            catalog.register_field(field);
        }
        Ok(catalog)
    }

    /// Load a snapshot from a JSON file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| DashboardError::Catalog(format!("Failed to read catalog file: {}", e)))?;
        Self::from_json(&contents)
    }
}

impl Catalog for InMemoryCatalog {
    fn get_table(&self, id: TableId) -> Result<Table> {
        self.tables
            .get(&id)
            .cloned()
            .ok_or_else(|| DashboardError::Catalog(format!("Table {} not found", id)))
    }

    fn get_field(&self, id: FieldId) -> Result<Field> {
        self.fields
            .get(&id)
            .cloned()
            .ok_or_else(|| DashboardError::Catalog(format!("Field {} not found", id)))
    }

    fn list_fields(&self, table_id: TableId) -> Result<Vec<Field>> {
        let ids = self
            .table_fields
            .get(&table_id)
            .ok_or_else(|| DashboardError::Catalog(format!("Table {} not found", table_id)))?;
        ids.iter().map(|id| self.get_field(*id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lattice() -> TypeLattice {
        TypeLattice::builtin()
    }

    #[test]
    fn test_numeric_key_detection() {
        let l = lattice();

        let pk = Field::new(1, 1, "id", "Integer").with_special_type("PK");
        assert!(pk.is_numeric_key(&l));

        let fk = Field::new(2, 1, "customer_id", "Integer").with_special_type("FK");
        assert!(fk.is_numeric_key(&l));

        // Named "id" is enough even without a special type
        let bare_id = Field::new(3, 1, "ID", "Integer");
        assert!(bare_id.is_numeric_key(&l));

        // Non-numeric keys are not numeric keys
        let text_pk = Field::new(4, 1, "code", "Text").with_special_type("PK");
        assert!(!text_pk.is_numeric_key(&l));

        // Plain measures are fine
        let amount = Field::new(5, 1, "amount", "Decimal");
        assert!(!amount.is_numeric_key(&l));
    }

    #[test]
    fn test_linked_tables_one_entry_per_fk() {
        let mut catalog = InMemoryCatalog::new();
        catalog.register_table(Table::new(1, 1, "orders", "TransactionTable"));
        catalog.register_table(Table::new(2, 1, "users", "UserTable"));
        catalog.register_field(Field::new(10, 2, "id", "Integer").with_special_type("PK"));
        catalog.register_field(
            Field::new(11, 1, "buyer_id", "Integer")
                .with_special_type("FK")
                .with_fk_target(10),
        );
        catalog.register_field(
            Field::new(12, 1, "seller_id", "Integer")
                .with_special_type("FK")
                .with_fk_target(10),
        );

        let root = catalog.get_table(1).unwrap();
        let linked = catalog.linked_tables(&root).unwrap();
        assert_eq!(linked.len(), 2);
        assert_eq!(linked[0].id, 2);
        assert_eq!(linked[0].link, Some(11));
        assert_eq!(linked[1].id, 2);
        assert_eq!(linked[1].link, Some(12));
    }

    #[test]
    fn test_is_link_only() {
        let l = lattice();
        let mut catalog = InMemoryCatalog::new();
        catalog.register_table(Table::new(1, 1, "orders_products", "GenericTable"));
        catalog.register_field(Field::new(10, 1, "order_id", "Integer").with_special_type("FK"));
        catalog.register_field(Field::new(11, 1, "product_id", "Integer").with_special_type("FK"));

        let join_table = catalog.get_table(1).unwrap();
        assert!(catalog.is_link_only(&join_table, &l).unwrap());

        // A field without a special type breaks the link-only property
        catalog.register_field(Field::new(12, 1, "quantity", "Integer"));
        let join_table = catalog.get_table(1).unwrap();
        assert!(!catalog.is_link_only(&join_table, &l).unwrap());
    }

    #[test]
    fn test_is_link_only_empty_table() {
        let l = lattice();
        let mut catalog = InMemoryCatalog::new();
        catalog.register_table(Table::new(1, 1, "empty", "GenericTable"));
        let table = catalog.get_table(1).unwrap();
        assert!(catalog.is_link_only(&table, &l).unwrap());
    }

    #[test]
    fn test_missing_table_error() {
        let catalog = InMemoryCatalog::new();
        assert!(catalog.get_table(99).is_err());
        assert!(catalog.list_fields(99).is_err());
    }

    #[test]
    fn test_catalog_from_json() {
        let json = r#"{
            "tables": [
                {"id": 1, "db_id": 1, "display_name": "Orders", "name": "orders",
                 "entity_type": "TransactionTable"}
            ],
            "fields": [
                {"id": 10, "table_id": 1, "display_name": "Total", "name": "total",
                 "base_type": "Decimal"}
            ]
        }"#;
        let catalog = InMemoryCatalog::from_json(json).unwrap();
        assert_eq!(catalog.get_table(1).unwrap().name, "orders");
        assert_eq!(catalog.list_fields(1).unwrap().len(), 1);
    }
}
