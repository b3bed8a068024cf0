//! Reference Resolver - render bound entities for a template target
//!
//! Dispatches on the pair of template kind and entity kind. Structured
//! rendering produces query-tree field references; text rendering produces
//! display names; native rendering produces SQL identifiers. Combinations
//! with no rendering pass through so partially resolved templates survive.

use crate::binding::BoundField;
use crate::catalog::{Catalog, Table};
use crate::error::Result;
use crate::query::{Expr, FieldReference};
use crate::types::TypeLattice;

/// Rendering target of a template
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TemplateKind {
    Structured,
    Text,
    Native,
}

/// An entity a template identifier is bound to
#[derive(Clone, Debug, PartialEq)]
pub enum BoundEntity {
    Field(BoundField),
    Table(Table),
}

/// A rendered reference
#[derive(Clone, Debug, PartialEq)]
pub enum Resolved {
    Expr(Expr),
    Text(String),
}

/// Structured query reference for a bound field
///
/// Fields reached through a foreign key render as fk forms; FK fields on
/// the root render as fk forms to their target; temporal fields wrap in a
/// datetime bucket with the definition's unit, defaulting to "day".
pub fn structured_field_reference(bound: &BoundField, lattice: &TypeLattice) -> FieldReference {
    let base = if let Some(link) = bound.link {
        FieldReference::ForeignKey {
            link,
            field: bound.field.id,
        }
    } else if let Some(target) = bound.field.fk_target_field_id {
        FieldReference::ForeignKey {
            link: bound.field.id,
            field: target,
        }
    } else {
        FieldReference::Field(bound.field.id)
    };
    if lattice.is_a(&bound.field.base_type, "Temporal") {
        FieldReference::Datetime {
            base: Box::new(base),
            unit: bound
                .aggregation
                .clone()
                .unwrap_or_else(|| "day".to_string()),
        }
    } else {
        base
    }
}

/// Render an entity for the requested template kind
///
/// Returns `None` for combinations with no rendering, which callers treat
/// as passthrough.
pub fn resolve_reference(
    kind: TemplateKind,
    entity: &BoundEntity,
    catalog: &dyn Catalog,
    lattice: &TypeLattice,
) -> Result<Option<Resolved>> {
    let resolved = match (kind, entity) {
        (TemplateKind::Structured, BoundEntity::Field(bound)) => Some(Resolved::Expr(Expr::Ref(
            structured_field_reference(bound, lattice),
        ))),
        (TemplateKind::Text, BoundEntity::Field(bound)) => {
            Some(Resolved::Text(bound.field.display_name.clone()))
        }
        (TemplateKind::Text, BoundEntity::Table(table)) => {
            Some(Resolved::Text(table.display_name.clone()))
        }
        (TemplateKind::Native, BoundEntity::Field(bound)) => {
            let table = catalog.get_table(bound.field.table_id)?;
            Some(Resolved::Text(format!("{}.{}", table.name, bound.field.name)))
        }
        (TemplateKind::Native, BoundEntity::Table(table)) => {
            Some(Resolved::Text(table.name.clone()))
        }
        // Tables have no structured reference form
        (TemplateKind::Structured, BoundEntity::Table(_)) => None,
    };
    Ok(resolved)
}
