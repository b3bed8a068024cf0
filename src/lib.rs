//! # autodash
//!
//! Rule-driven automatic dashboard generation for database tables.
//!
//! Given a root table, the engine picks the most specific rule from a rule
//! library, binds the rule's symbolic dimensions to concrete fields through
//! a semantic type lattice and the table's foreign-key graph, resolves
//! overloaded metric and filter definitions by score, expands every card
//! specification into the Cartesian product of its candidate bindings and
//! hands the best-scoring card instances to a renderer.

pub mod binding;
pub mod cards;
pub mod catalog;
pub mod context;
pub mod dashboard;
pub mod error;
pub mod loader;
pub mod query;
pub mod reference;
pub mod rules;
pub mod template;
pub mod types;

// Re-export the main types for convenience
pub use binding::{bind_dimensions, resolve_overloads, BoundField, DimensionBinding};
pub use cards::{expand_card, AccessPolicy, AllowAllPolicy, CardInstance, TablePermissionPolicy};
pub use catalog::{Catalog, DatabaseId, Field, FieldId, InMemoryCatalog, Table, TableId};
pub use context::{parse_entity_ref, Context, EntityRef};
pub use dashboard::{generate_dashboard, DashboardId, DashboardMetadata, DashboardRenderer};
pub use error::{DashboardError, Result};
pub use query::{Direction, Expr, FieldReference, Query, StructuredQuery};
pub use reference::{resolve_reference, BoundEntity, Resolved, TemplateKind};
pub use rules::{
    is_ga_dimension, CardSpec, DimensionDef, FieldScope, OrderByEntry, Rule, RuleLibrary,
    TemplateDef,
};
pub use types::TypeLattice;
