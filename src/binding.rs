//! Dimension Binder - candidate search and overload resolution
//!
//! Binding turns a rule's symbolic dimensions into sets of concrete fields,
//! then picks one winning definition per overloaded metric and filter
//! identifier. Both steps are pairwise reductions with keep-first tie
//! breaking, so results are deterministic for a given catalog snapshot.

use crate::catalog::{Catalog, Field, FieldId, Table};
use crate::error::{DashboardError, Result};
use crate::rules::{is_ga_dimension, DimensionDef, FieldScope, Rule, TemplateDef};
use crate::types::TypeLattice;
use regex::RegexBuilder;
use std::collections::{BTreeMap, HashSet};

/// A candidate field merged with the definition that matched it
#[derive(Clone, Debug, PartialEq)]
pub struct BoundField {
    pub field: Field,

    /// FK field on the root table this candidate was reached through
    pub link: Option<FieldId>,

    /// Bucketing unit carried over from the dimension definition
    pub aggregation: Option<String>,

    /// Score carried over from the dimension definition
    pub score: u32,
}

/// A dimension definition together with its matching fields
#[derive(Clone, Debug, PartialEq)]
pub struct DimensionBinding {
    pub def: DimensionDef,
    pub matches: Vec<BoundField>,
}

impl DimensionBinding {
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

/// Bind every dimension of the rule against the context tables
///
/// `tables` is the run's table set with the root first; linked entries carry
/// their `link` annotation. Duplicate identifiers in the rule merge
/// pairwise: non-empty beats empty, then the higher score, keeping the
/// earlier binding on ties.
pub fn bind_dimensions(
    rule: &Rule,
    root: &Table,
    tables: &[Table],
    catalog: &dyn Catalog,
    lattice: &TypeLattice,
) -> Result<BTreeMap<String, DimensionBinding>> {
    let mut bound: BTreeMap<String, DimensionBinding> = BTreeMap::new();
    for (identifier, def) in &rule.dimensions {
        let matches = field_candidates(def, root, tables, catalog, lattice)?;
        let binding = DimensionBinding {
            def: def.clone(),
            matches,
        };
        match bound.remove(identifier) {
            Some(existing) => {
                bound.insert(identifier.clone(), merge_bindings(existing, binding));
            }
            None => {
                bound.insert(identifier.clone(), binding);
            }
        }
    }
    Ok(bound)
}

fn merge_bindings(left: DimensionBinding, right: DimensionBinding) -> DimensionBinding {
    if left.is_empty() != right.is_empty() {
        return if left.is_empty() { right } else { left };
    }
    if right.def.score > left.def.score {
        right
    } else {
        left
    }
}

/// Candidate fields for one dimension definition
pub fn field_candidates(
    def: &DimensionDef,
    root: &Table,
    tables: &[Table],
    catalog: &dyn Catalog,
    lattice: &TypeLattice,
) -> Result<Vec<BoundField>> {
    if let Some(links_to) = &def.links_to {
        // Search without the link constraint, then keep only the FK fields
        // through which a table of the required type was reached.
        let unconstrained = DimensionDef {
            links_to: None,
            ..def.clone()
        };
        let mut candidates = field_candidates(&unconstrained, root, tables, catalog, lattice)?;
        let reachable: HashSet<FieldId> = tables
            .iter()
            .filter(|table| lattice.is_a(&table.entity_type, links_to))
            .filter_map(|table| table.link)
            .collect();
        candidates.retain(|candidate| reachable.contains(&candidate.field.id));
        return Ok(candidates);
    }

    let named = compile_named(def.named.as_deref())?;
    let mut candidates = Vec::new();
    match &def.field_type {
        FieldScope::OnLinked {
            table_type,
            fieldspec,
        } => {
            for table in tables
                .iter()
                .filter(|table| lattice.is_a(&table.entity_type, table_type))
            {
                for field in catalog.list_fields(table.id)? {
                    if field_matches(&field, fieldspec, named.as_ref(), lattice) {
                        candidates.push(bound_field(field, table.link, def));
                    }
                }
            }
        }
        FieldScope::OnRoot(fieldspec) => {
            for field in catalog.list_fields(root.id)? {
                if field_matches(&field, fieldspec, named.as_ref(), lattice) {
                    candidates.push(bound_field(field, None, def));
                }
            }
        }
    }
    Ok(candidates)
}

fn bound_field(field: Field, link: Option<FieldId>, def: &DimensionDef) -> BoundField {
    BoundField {
        field,
        link,
        aggregation: def.aggregation.clone(),
        score: def.score,
    }
}

fn compile_named(pattern: Option<&str>) -> Result<Option<regex::Regex>> {
    match pattern {
        Some(pattern) => {
            let regex = RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| {
                    DashboardError::Rules(format!("Invalid name pattern '{}': {}", pattern, e))
                })?;
            Ok(Some(regex))
        }
        None => Ok(None),
    }
}

fn field_matches(
    field: &Field,
    fieldspec: &str,
    named: Option<&regex::Regex>,
    lattice: &TypeLattice,
) -> bool {
    if field.is_numeric_key(lattice) {
        return false;
    }
    let spec_ok = if is_ga_dimension(fieldspec) {
        field.name == fieldspec
    } else {
        field
            .special_type
            .as_deref()
            .map(|s| lattice.is_a(s, fieldspec))
            .unwrap_or(false)
            || lattice.is_a(&field.base_type, fieldspec)
    };
    if !spec_ok {
        return false;
    }
    match named {
        Some(regex) => regex.is_match(&field.name),
        None => true,
    }
}

/// Pick one winning definition per overloaded metric or filter identifier
///
/// A definition is applicable when every dimension it references has a
/// non-empty binding. Applicable beats inapplicable, then the higher score
/// wins, keeping the earlier definition on ties. When nothing is applicable
/// the highest-scoring definition stands in as a fallback; cards that rely
/// on it will fail to enumerate and get dropped downstream.
pub fn resolve_overloads(
    defs: &[(String, TemplateDef)],
    dimensions: &BTreeMap<String, DimensionBinding>,
) -> BTreeMap<String, TemplateDef> {
    let mut winners: BTreeMap<String, (TemplateDef, bool)> = BTreeMap::new();
    for (identifier, def) in defs {
        let applicable = def.referenced_dimensions().iter().all(|dimension| {
            dimensions
                .get(dimension)
                .map(|binding| !binding.is_empty())
                .unwrap_or(false)
        });
        match winners.remove(identifier) {
            Some((winner, winner_applicable)) => {
                let keep_new = (applicable && !winner_applicable)
                    || (applicable == winner_applicable && def.score > winner.score);
                if keep_new {
                    winners.insert(identifier.clone(), (def.clone(), applicable));
                } else {
                    winners.insert(identifier.clone(), (winner, winner_applicable));
                }
            }
            None => {
                winners.insert(identifier.clone(), (def.clone(), applicable));
            }
        }
    }
    winners
        .into_iter()
        .map(|(identifier, (def, _))| (identifier, def))
        .collect()
}
