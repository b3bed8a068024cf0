//! Card Expander - turn card specifications into concrete card instances
//!
//! A card spec references dimensions, metrics and filters by identifier.
//! Expansion enumerates the Cartesian product of every used dimension's
//! candidates, builds one query per combination, filters through the access
//! policy and attaches the card's composite score. Combinations stream
//! through an odometer iterator so large products never materialize.

use crate::catalog::{Catalog, TableId};
use crate::context::{parse_entity_ref, Context};
use crate::error::Result;
use crate::query::{Direction, Expr, Query, StructuredQuery};
use crate::reference::{BoundEntity, TemplateKind};
use crate::rules::CardSpec;
use crate::template::{substitute_expr, substitute_string, tokens, Bindings};
use crate::types::TypeLattice;
use serde_json::{json, Value};
use std::collections::HashSet;
use tracing::debug;

/// Per-candidate permission check
///
/// The current user's permissions are state of the implementation; the
/// policy is threaded explicitly from the orchestrator into expansion and
/// consulted once per candidate query.
pub trait AccessPolicy {
    fn has_permissions(&self, query: &Query) -> bool;
}

/// Grants every candidate query
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAllPolicy;

impl AccessPolicy for AllowAllPolicy {
    fn has_permissions(&self, _query: &Query) -> bool {
        true
    }
}

/// Table-level allow/deny policy for one user
#[derive(Clone, Debug, Default)]
pub struct TablePermissionPolicy {
    pub user_id: Option<String>,

    /// Allowed source tables (empty = all tables)
    pub allowed_tables: HashSet<TableId>,

    /// Denied source tables (explicit deny)
    pub denied_tables: HashSet<TableId>,
}

impl AccessPolicy for TablePermissionPolicy {
    fn has_permissions(&self, query: &Query) -> bool {
        match query.source_table() {
            Some(table) => {
                !self.denied_tables.contains(&table)
                    && (self.allowed_tables.is_empty() || self.allowed_tables.contains(&table))
            }
            // Native queries carry no table reference to check against
            None => true,
        }
    }
}

/// One fully instantiated card
#[derive(Clone, Debug, PartialEq)]
pub struct CardInstance {
    /// Identifier of the card spec this instance came from
    pub identifier: String,

    pub title: String,
    pub description: Option<String>,
    pub visualization: Value,
    pub query: Query,
    pub score: f64,
}

impl CardInstance {
    pub fn to_json(&self) -> Value {
        json!({
            "identifier": self.identifier,
            "title": self.title,
            "description": self.description,
            "visualization": self.visualization,
            "query": self.query.to_json(),
            "score": self.score,
        })
    }
}

/// Expand one card spec against the bound context
///
/// An empty candidate set for any used dimension yields zero instances and
/// the card is silently dropped by the caller.
pub fn expand_card(
    identifier: &str,
    card: &CardSpec,
    ctx: &Context,
    catalog: &dyn Catalog,
    lattice: &TypeLattice,
    policy: &dyn AccessPolicy,
) -> Result<Vec<CardInstance>> {
    let score = card_score(card, ctx);
    let mut axes: Vec<(String, Vec<BoundEntity>)> = Vec::new();
    for dimension in used_dimensions(card, ctx, lattice)? {
        let candidates: Vec<BoundEntity> =
            if let Some(binding) = ctx.dimensions.get(&dimension) {
                binding
                    .matches
                    .iter()
                    .cloned()
                    .map(BoundEntity::Field)
                    .collect()
            } else if let Some(entity_ref) = parse_entity_ref(&dimension, lattice) {
                ctx.resolve_entity_ref(&entity_ref, lattice)
                    .into_iter()
                    .map(|table| BoundEntity::Table(table.clone()))
                    .collect()
            } else {
                Vec::new()
            };
        if candidates.is_empty() {
            debug!(
                "Card '{}' has no candidates for dimension '{}'",
                identifier, dimension
            );
            return Ok(Vec::new());
        }
        axes.push((dimension, candidates));
    }

    let mut instances = Vec::new();
    for bindings in CardCombinations::new(axes) {
        let query = build_query(card, ctx, &bindings, catalog, lattice)?;
        if !policy.has_permissions(&query) {
            debug!("Dropping a candidate of card '{}': permission denied", identifier);
            continue;
        }
        let title = substitute_string(
            &card.title,
            TemplateKind::Text,
            &bindings,
            ctx,
            catalog,
            lattice,
        )?;
        let description = match &card.description {
            Some(description) => Some(substitute_string(
                description,
                TemplateKind::Text,
                &bindings,
                ctx,
                catalog,
                lattice,
            )?),
            None => None,
        };
        instances.push(CardInstance {
            identifier: identifier.to_string(),
            title,
            description,
            visualization: instantiate_visualization(&card.visualization, &bindings),
            query,
            score,
        });
    }
    Ok(instances)
}

/// Composite card score
///
/// Native-query cards keep their declared score. Otherwise the mean of the
/// scores present across the card's dimensions, metrics and filters is
/// scaled by the card's own score relative to the rule ceiling.
fn card_score(card: &CardSpec, ctx: &Context) -> f64 {
    if card.query.is_some() {
        return card.score as f64;
    }
    let mut scores: Vec<u32> = Vec::new();
    for identifier in &card.dimensions {
        if let Some(binding) = ctx.dimensions.get(identifier) {
            scores.push(binding.def.score);
        }
    }
    for identifier in &card.metrics {
        if let Some(def) = ctx.metrics.get(identifier) {
            scores.push(def.score);
        }
    }
    for identifier in &card.filters {
        if let Some(def) = ctx.filters.get(identifier) {
            scores.push(def.score);
        }
    }
    if scores.is_empty() {
        return 0.0;
    }
    let mean = scores.iter().sum::<u32>() as f64 / scores.len() as f64;
    mean * card.score as f64 / ctx.rule.max_score as f64
}

/// Dimension identifiers a card actually uses, in first-seen order
///
/// Drawn from the card's dimension list, its metric and filter templates,
/// and the tokens of a native query template. Identifiers that are neither
/// bound dimensions nor entity references stay out; they render as raw
/// identifiers rather than emptying the product.
fn used_dimensions(card: &CardSpec, ctx: &Context, lattice: &TypeLattice) -> Result<Vec<String>> {
    let mut used: Vec<String> = Vec::new();
    let consider = |identifier: &str, used: &mut Vec<String>| {
        if used.iter().any(|seen| seen == identifier) {
            return;
        }
        if ctx.dimensions.contains_key(identifier)
            || parse_entity_ref(identifier, lattice).is_some()
        {
            used.push(identifier.to_string());
        }
    };
    for identifier in &card.dimensions {
        consider(identifier, &mut used);
    }
    for identifier in &card.metrics {
        if let Some(def) = ctx.metrics.get(identifier) {
            for dimension in def.referenced_dimensions() {
                consider(&dimension, &mut used);
            }
        }
    }
    for identifier in &card.filters {
        if let Some(def) = ctx.filters.get(identifier) {
            for dimension in def.referenced_dimensions() {
                consider(&dimension, &mut used);
            }
        }
    }
    if let Some(native) = &card.query {
        for token in tokens(native)? {
            consider(&token, &mut used);
        }
    }
    Ok(used)
}

fn build_query(
    card: &CardSpec,
    ctx: &Context,
    bindings: &Bindings,
    catalog: &dyn Catalog,
    lattice: &TypeLattice,
) -> Result<Query> {
    if let Some(native) = &card.query {
        let query = substitute_string(
            native,
            TemplateKind::Native,
            bindings,
            ctx,
            catalog,
            lattice,
        )?;
        return Ok(Query::Native {
            database: ctx.database,
            query,
        });
    }

    let mut aggregation = Vec::new();
    for identifier in &card.metrics {
        if let Some(def) = ctx.metrics.get(identifier) {
            aggregation.push(substitute_expr(&def.expr, bindings, catalog, lattice)?);
        }
    }
    let mut breakout = Vec::new();
    for identifier in &card.dimensions {
        let marker = Expr::Dimension(identifier.clone());
        breakout.push(substitute_expr(&marker, bindings, catalog, lattice)?);
    }
    let mut filter_exprs = Vec::new();
    for identifier in &card.filters {
        if let Some(def) = ctx.filters.get(identifier) {
            filter_exprs.push(substitute_expr(&def.expr, bindings, catalog, lattice)?);
        }
    }
    let filter = match filter_exprs.len() {
        0 => None,
        1 => filter_exprs.pop(),
        _ => Some(Expr::Op {
            name: "and".to_string(),
            args: filter_exprs,
        }),
    };
    let mut order_by = Vec::new();
    for (direction, expr) in resolve_order_by(card) {
        order_by.push((direction, substitute_expr(&expr, bindings, catalog, lattice)?));
    }
    Ok(Query::Structured {
        database: ctx.database,
        query: StructuredQuery {
            source_table: ctx.root.id,
            aggregation,
            breakout,
            filter,
            order_by,
            limit: card.limit,
        },
    })
}

/// Map order-by identifiers onto breakouts or aggregation ordinals
fn resolve_order_by(card: &CardSpec) -> Vec<(Direction, Expr)> {
    card.order_by
        .iter()
        .filter_map(|entry| {
            if card.dimensions.iter().any(|d| *d == entry.identifier) {
                Some((entry.direction, Expr::Dimension(entry.identifier.clone())))
            } else {
                card.metrics
                    .iter()
                    .position(|m| *m == entry.identifier)
                    .map(|index| (entry.direction, Expr::AggregateField(index)))
            }
        })
        .collect()
}

/// Rewrite dimension names in visualization settings to bound column names
fn instantiate_visualization(visualization: &Value, bindings: &Bindings) -> Value {
    let mut visualization = visualization.clone();
    if let Value::Object(settings) = &mut visualization {
        for key in ["map.latitude_column", "map.longitude_column"] {
            let column = match settings.get(key) {
                Some(Value::String(identifier)) => match bindings.get(identifier) {
                    Some(BoundEntity::Field(bound)) => Some(bound.field.name.clone()),
                    _ => None,
                },
                _ => None,
            };
            if let Some(column) = column {
                settings.insert(key.to_string(), Value::String(column));
            }
        }
    }
    visualization
}

/// Odometer iterator over the Cartesian product of candidate axes
///
/// Zero axes yield exactly one empty bindings map, so cards without used
/// dimensions still instantiate once.
struct CardCombinations {
    axes: Vec<(String, Vec<BoundEntity>)>,
    indices: Vec<usize>,
    done: bool,
}

impl CardCombinations {
    fn new(axes: Vec<(String, Vec<BoundEntity>)>) -> Self {
        let done = axes.iter().any(|(_, candidates)| candidates.is_empty());
        let indices = vec![0; axes.len()];
        Self { axes, indices, done }
    }
}

impl Iterator for CardCombinations {
    type Item = Bindings;

    fn next(&mut self) -> Option<Bindings> {
        if self.done {
            return None;
        }
        let mut bindings = Bindings::new();
        for ((identifier, candidates), &index) in self.axes.iter().zip(&self.indices) {
            bindings.insert(identifier.clone(), candidates[index].clone());
        }
        let mut position = self.axes.len();
        loop {
            if position == 0 {
                self.done = true;
                break;
            }
            position -= 1;
            self.indices[position] += 1;
            if self.indices[position] < self.axes[position].1.len() {
                break;
            }
            self.indices[position] = 0;
        }
        Some(bindings)
    }
}
