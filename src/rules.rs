//! Rule Model - heuristic dashboard rules and the rule library
//!
//! A rule describes how to build a dashboard for tables of one entity type:
//! symbolic dimensions constrained by semantic types, overloaded metric and
//! filter templates, and card specifications that combine them. Rules are
//! immutable once registered.

use crate::query::{Direction, Expr};
use crate::types::TypeLattice;
use std::collections::HashMap;

/// Field spec strings matched by exact internal name instead of type lineage
///
/// These mirror externally defined analytics dimensions whose names carry
/// all the meaning; subtype reasoning does not apply to them.
pub const GA_DIMENSIONS: &[&str] = &[
    "ga:date",
    "ga:source",
    "ga:medium",
    "ga:country",
    "ga:city",
    "ga:deviceCategory",
    "ga:userType",
];

pub fn is_ga_dimension(spec: &str) -> bool {
    GA_DIMENSIONS.contains(&spec)
}

/// Where a dimension's candidate fields are searched
#[derive(Clone, Debug, PartialEq)]
pub enum FieldScope {
    /// Fields of the root table matching the field spec
    OnRoot(String),

    /// Fields of any context table whose entity type matches `table_type`
    OnLinked {
        table_type: String,
        fieldspec: String,
    },
}

impl FieldScope {
    pub fn fieldspec(&self) -> &str {
        match self {
            FieldScope::OnRoot(spec) => spec,
            FieldScope::OnLinked { fieldspec, .. } => fieldspec,
        }
    }
}

/// A symbolic dimension a rule binds to concrete fields at run time
#[derive(Clone, Debug, PartialEq)]
pub struct DimensionDef {
    /// Candidate search scope
    pub field_type: FieldScope,

    /// Case-insensitive pattern the internal field name must match
    pub named: Option<String>,

    /// Keep only FK fields that link to a table of this entity type
    pub links_to: Option<String>,

    /// Bucketing unit for temporal fields (defaults to "day" downstream)
    pub aggregation: Option<String>,

    /// Relative worth within the rule, in [0, max_score]
    pub score: u32,
}

impl DimensionDef {
    pub fn on_root(fieldspec: &str, score: u32) -> Self {
        Self {
            field_type: FieldScope::OnRoot(fieldspec.to_string()),
            named: None,
            links_to: None,
            aggregation: None,
            score,
        }
    }

    pub fn on_linked(table_type: &str, fieldspec: &str, score: u32) -> Self {
        Self {
            field_type: FieldScope::OnLinked {
                table_type: table_type.to_string(),
                fieldspec: fieldspec.to_string(),
            },
            named: None,
            links_to: None,
            aggregation: None,
            score,
        }
    }

    pub fn with_named(mut self, pattern: &str) -> Self {
        self.named = Some(pattern.to_string());
        self
    }

    pub fn with_links_to(mut self, table_type: &str) -> Self {
        self.links_to = Some(table_type.to_string());
        self
    }

    pub fn with_aggregation(mut self, unit: &str) -> Self {
        self.aggregation = Some(unit.to_string());
        self
    }
}

/// One overload of a metric or filter
///
/// Metrics and filters share a shape: a template expression over dimension
/// markers plus a score used to break overload ties.
#[derive(Clone, Debug, PartialEq)]
pub struct TemplateDef {
    pub expr: Expr,
    pub score: u32,
}

impl TemplateDef {
    pub fn new(expr: Expr, score: u32) -> Self {
        Self { expr, score }
    }

    /// Dimension identifiers this definition depends on
    pub fn referenced_dimensions(&self) -> Vec<String> {
        self.expr.referenced_dimensions()
    }
}

/// Sort instruction on a card
#[derive(Clone, Debug, PartialEq)]
pub struct OrderByEntry {
    pub identifier: String,
    pub direction: Direction,
}

/// Specification of one analytical card
#[derive(Clone, Debug, PartialEq)]
pub struct CardSpec {
    /// Title template; may contain `[[identifier]]` tokens
    pub title: String,

    /// Description template, if any
    pub description: Option<String>,

    /// Dimension identifiers used as breakouts
    pub dimensions: Vec<String>,

    /// Metric identifiers used as aggregations
    pub metrics: Vec<String>,

    /// Filter identifiers applied to the query
    pub filters: Vec<String>,

    /// Literal native query with `[[identifier]]` placeholders
    pub query: Option<String>,

    pub limit: Option<u32>,
    pub order_by: Vec<OrderByEntry>,

    /// Opaque visualization settings passed through to the renderer
    pub visualization: serde_json::Value,

    pub score: u32,
}

impl CardSpec {
    pub fn new(title: &str, score: u32) -> Self {
        Self {
            title: title.to_string(),
            description: None,
            dimensions: Vec::new(),
            metrics: Vec::new(),
            filters: Vec::new(),
            query: None,
            limit: None,
            order_by: Vec::new(),
            visualization: serde_json::Value::Null,
            score,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn with_dimensions(mut self, dimensions: &[&str]) -> Self {
        self.dimensions = dimensions.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn with_metrics(mut self, metrics: &[&str]) -> Self {
        self.metrics = metrics.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn with_filters(mut self, filters: &[&str]) -> Self {
        self.filters = filters.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn with_query(mut self, query: &str) -> Self {
        self.query = Some(query.to_string());
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_order_by(mut self, identifier: &str, direction: Direction) -> Self {
        self.order_by.push(OrderByEntry {
            identifier: identifier.to_string(),
            direction,
        });
        self
    }

    pub fn with_visualization(mut self, visualization: serde_json::Value) -> Self {
        self.visualization = visualization;
        self
    }
}

/// A complete dashboard rule
///
/// Dimension, metric and filter lists are ordered and may repeat an
/// identifier; repeats are overloads resolved during binding.
#[derive(Clone, Debug, PartialEq)]
pub struct Rule {
    /// Rule name, unique within a library
    pub name: String,

    /// Entity type this rule applies to
    pub table_type: String,

    /// Dashboard title template
    pub title: String,

    /// Dashboard description template
    pub description: Option<String>,

    pub dimensions: Vec<(String, DimensionDef)>,
    pub metrics: Vec<(String, TemplateDef)>,
    pub filters: Vec<(String, TemplateDef)>,
    pub cards: Vec<(String, CardSpec)>,

    /// Score ceiling all member scores are relative to
    pub max_score: u32,
}

impl Rule {
    pub fn new(name: &str, table_type: &str, title: &str, max_score: u32) -> Self {
        Self {
            name: name.to_string(),
            table_type: table_type.to_string(),
            title: title.to_string(),
            description: None,
            dimensions: Vec::new(),
            metrics: Vec::new(),
            filters: Vec::new(),
            cards: Vec::new(),
            max_score,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn with_dimension(mut self, identifier: &str, def: DimensionDef) -> Self {
        self.dimensions.push((identifier.to_string(), def));
        self
    }

    pub fn with_metric(mut self, identifier: &str, def: TemplateDef) -> Self {
        self.metrics.push((identifier.to_string(), def));
        self
    }

    pub fn with_filter(mut self, identifier: &str, def: TemplateDef) -> Self {
        self.filters.push((identifier.to_string(), def));
        self
    }

    pub fn with_card(mut self, identifier: &str, card: CardSpec) -> Self {
        self.cards.push((identifier.to_string(), card));
        self
    }
}

/// Rule Library - registry of loaded rules
#[derive(Clone, Debug, Default)]
pub struct RuleLibrary {
    /// Rules in registration order
    rules: Vec<Rule>,

    /// Rule name → index into `rules`
    by_name: HashMap<String, usize>,
}

impl RuleLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule; a rule with the same name replaces the old one
    pub fn register_rule(&mut self, rule: Rule) {
        if let Some(&index) = self.by_name.get(&rule.name) {
            self.rules[index] = rule;
        } else {
            self.by_name.insert(rule.name.clone(), self.rules.len());
            self.rules.push(rule);
        }
    }

    pub fn get_rule(&self, name: &str) -> Option<&Rule> {
        self.by_name.get(name).map(|&index| &self.rules[index])
    }

    pub fn list_rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Most specific rule applicable to the given entity type
    ///
    /// Applicable means the rule's `table_type` is an ancestor (possibly the
    /// type itself) of `entity_type`. Specificity is the length of the
    /// `table_type` ancestor chain; the first registered rule wins ties.
    pub fn best_match(&self, entity_type: &str, lattice: &TypeLattice) -> Option<&Rule> {
        let mut best: Option<(&Rule, usize)> = None;
        for rule in &self.rules {
            if !lattice.is_a(entity_type, &rule.table_type) {
                continue;
            }
            let depth = lattice.ancestor_count(&rule.table_type);
            if best.map_or(true, |(_, best_depth)| depth > best_depth) {
                best = Some((rule, depth));
            }
        }
        best.map(|(rule, _)| rule)
    }
}
