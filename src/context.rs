//! Generation Context - the per-run binding environment
//!
//! Built once by the orchestrator and treated as read-only by everything
//! downstream: the root table, the chosen rule, the reachable tables, and
//! the results of dimension binding and overload resolution.

use crate::binding::DimensionBinding;
use crate::catalog::{DatabaseId, Table};
use crate::rules::{Rule, TemplateDef};
use crate::types::TypeLattice;
use std::collections::BTreeMap;

/// Everything one generation run binds against
#[derive(Clone, Debug)]
pub struct Context {
    pub database: DatabaseId,

    /// Table the dashboard is generated for
    pub root: Table,

    /// Root first, then the tables reached through its foreign keys
    pub tables: Vec<Table>,

    /// The chosen rule, immutable for the run
    pub rule: Rule,

    /// Dimension identifier → binding with candidate fields
    pub dimensions: BTreeMap<String, DimensionBinding>,

    /// Metric identifier → winning definition
    pub metrics: BTreeMap<String, TemplateDef>,

    /// Filter identifier → winning definition
    pub filters: BTreeMap<String, TemplateDef>,
}

impl Context {
    /// Context tables whose entity type matches `table_type`
    pub fn tables_of_type<'a>(
        &'a self,
        table_type: &str,
        lattice: &TypeLattice,
    ) -> Vec<&'a Table> {
        self.tables
            .iter()
            .filter(|table| lattice.is_a(&table.entity_type, table_type))
            .collect()
    }

    /// Tables an entity reference resolves to, in context order
    pub fn resolve_entity_ref<'a>(
        &'a self,
        entity_ref: &EntityRef,
        lattice: &TypeLattice,
    ) -> Vec<&'a Table> {
        match entity_ref {
            EntityRef::This => vec![&self.root],
            EntityRef::TableType(table_type) => self.tables_of_type(table_type, lattice),
        }
    }
}

/// An entity reference appearing in a rule
///
/// `"this"` names the root table; any declared type identifier names the
/// context tables of that entity type.
#[derive(Clone, Debug, PartialEq)]
pub enum EntityRef {
    This,
    TableType(String),
}

/// Parse an identifier as an entity reference, if it is one
pub fn parse_entity_ref(identifier: &str, lattice: &TypeLattice) -> Option<EntityRef> {
    if identifier == "this" {
        Some(EntityRef::This)
    } else if lattice.contains(identifier) {
        Some(EntityRef::TableType(identifier.to_string()))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Rule;

    fn context() -> Context {
        let root = Table::new(1, 1, "orders", "TransactionTable");
        let linked = Table::new(2, 1, "customers", "UserTable").with_link(11);
        Context {
            database: 1,
            root: root.clone(),
            tables: vec![root, linked],
            rule: Rule::new("r", "TransactionTable", "t", 100),
            dimensions: BTreeMap::new(),
            metrics: BTreeMap::new(),
            filters: BTreeMap::new(),
        }
    }

    #[test]
    fn test_tables_of_type_uses_subtyping() {
        let lattice = TypeLattice::builtin();
        let ctx = context();
        assert_eq!(ctx.tables_of_type("GenericTable", &lattice).len(), 2);
        assert_eq!(ctx.tables_of_type("UserTable", &lattice).len(), 1);
        assert!(ctx.tables_of_type("PlaceTable", &lattice).is_empty());
    }

    #[test]
    fn test_parse_entity_ref() {
        let lattice = TypeLattice::builtin();
        assert_eq!(parse_entity_ref("this", &lattice), Some(EntityRef::This));
        assert_eq!(
            parse_entity_ref("UserTable", &lattice),
            Some(EntityRef::TableType("UserTable".to_string()))
        );
        assert_eq!(parse_entity_ref("NotAType", &lattice), None);
    }

    #[test]
    fn test_this_resolves_to_root_only() {
        let lattice = TypeLattice::builtin();
        let ctx = context();
        let tables = ctx.resolve_entity_ref(&EntityRef::This, &lattice);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].name, "orders");
    }
}
