//! Rule Library Loader
//!
//! Loads the rule library from JSON configuration files. Every semantic
//! type a rule references must exist in the lattice; the loader enforces
//! that closed world so malformed rules never reach a generation run.

use crate::error::{DashboardError, Result};
use crate::query::{Direction, Expr};
use crate::rules::{
    is_ga_dimension, CardSpec, DimensionDef, FieldScope, OrderByEntry, Rule, RuleLibrary,
    TemplateDef,
};
use crate::types::TypeLattice;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// JSON representation of a rule library
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleLibraryJson {
    pub rules: Vec<RuleJson>,
}

/// JSON representation of a rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleJson {
    pub rule: String,
    pub table_type: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub max_score: u32,
    #[serde(default)]
    pub dimensions: Vec<DimensionJson>,
    #[serde(default)]
    pub metrics: Vec<TemplateJson>,
    #[serde(default)]
    pub filters: Vec<TemplateJson>,
    #[serde(default)]
    pub cards: Vec<CardJson>,
}

/// JSON representation of a dimension definition
///
/// `field_type` is either `[fieldspec]` for the root table or
/// `[table_type, fieldspec]` for linked tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionJson {
    pub identifier: String,
    pub field_type: Vec<String>,
    #[serde(default)]
    pub named: Option<String>,
    #[serde(default)]
    pub links_to: Option<String>,
    #[serde(default)]
    pub aggregation: Option<String>,
    pub score: u32,
}

/// JSON representation of a metric or filter overload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateJson {
    pub identifier: String,
    pub expression: serde_json::Value,
    pub score: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderByJson {
    pub identifier: String,
    pub direction: String, // "ascending" or "descending"
}

/// JSON representation of a card specification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardJson {
    pub identifier: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub dimensions: Vec<String>,
    #[serde(default)]
    pub metrics: Vec<String>,
    #[serde(default)]
    pub filters: Vec<String>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub order_by: Vec<OrderByJson>,
    #[serde(default)]
    pub visualization: serde_json::Value,
    pub score: u32,
}

/// Load a rule library from JSON
pub fn load_from_json(json_str: &str, lattice: &TypeLattice) -> Result<RuleLibrary> {
    let library_json: RuleLibraryJson = serde_json::from_str(json_str)
        .map_err(|e| DashboardError::Rules(format!("Failed to parse rule library JSON: {}", e)))?;

    let mut library = RuleLibrary::new();
    for rule_json in library_json.rules {
        library.register_rule(convert_rule(rule_json, lattice)?);
    }
    Ok(library)
}

/// Load a rule library from a file
pub fn load_from_file(path: impl AsRef<Path>, lattice: &TypeLattice) -> Result<RuleLibrary> {
    let contents = std::fs::read_to_string(path.as_ref())
        .map_err(|e| DashboardError::Rules(format!("Failed to read rule library file: {}", e)))?;
    load_from_json(&contents, lattice)
}

fn convert_rule(rule_json: RuleJson, lattice: &TypeLattice) -> Result<Rule> {
    let rule_name = rule_json.rule.clone();
    if rule_json.max_score == 0 {
        return Err(DashboardError::Rules(format!(
            "Rule '{}' must declare a positive max_score",
            rule_name
        )));
    }
    require_type(&rule_json.table_type, &rule_name, lattice)?;

    let mut rule = Rule::new(
        &rule_json.rule,
        &rule_json.table_type,
        &rule_json.title,
        rule_json.max_score,
    );
    if let Some(description) = &rule_json.description {
        rule = rule.with_description(description);
    }

    for dimension_json in rule_json.dimensions {
        let identifier = dimension_json.identifier.clone();
        let def = convert_dimension(dimension_json, &rule_name, rule.max_score, lattice)?;
        rule = rule.with_dimension(&identifier, def);
    }
    for metric_json in rule_json.metrics {
        let identifier = metric_json.identifier.clone();
        let def = convert_template(metric_json, &rule_name, rule.max_score)?;
        rule = rule.with_metric(&identifier, def);
    }
    for filter_json in rule_json.filters {
        let identifier = filter_json.identifier.clone();
        let def = convert_template(filter_json, &rule_name, rule.max_score)?;
        rule = rule.with_filter(&identifier, def);
    }
    for card_json in rule_json.cards {
        let identifier = card_json.identifier.clone();
        let card = convert_card(card_json, &rule_name, rule.max_score)?;
        rule = rule.with_card(&identifier, card);
    }
    Ok(rule)
}

fn convert_dimension(
    dimension_json: DimensionJson,
    rule_name: &str,
    max_score: u32,
    lattice: &TypeLattice,
) -> Result<DimensionDef> {
    check_score(dimension_json.score, max_score, rule_name, &dimension_json.identifier)?;
    let field_type = match dimension_json.field_type.as_slice() {
        [fieldspec] => {
            require_fieldspec(fieldspec, rule_name, lattice)?;
            FieldScope::OnRoot(fieldspec.clone())
        }
        [table_type, fieldspec] => {
            require_type(table_type, rule_name, lattice)?;
            require_fieldspec(fieldspec, rule_name, lattice)?;
            FieldScope::OnLinked {
                table_type: table_type.clone(),
                fieldspec: fieldspec.clone(),
            }
        }
        other => {
            return Err(DashboardError::Rules(format!(
                "Rule '{}': field_type takes one or two elements, got {}",
                rule_name,
                other.len()
            )))
        }
    };
    if let Some(links_to) = &dimension_json.links_to {
        require_type(links_to, rule_name, lattice)?;
    }
    Ok(DimensionDef {
        field_type,
        named: dimension_json.named,
        links_to: dimension_json.links_to,
        aggregation: dimension_json.aggregation,
        score: dimension_json.score,
    })
}

fn convert_template(
    template_json: TemplateJson,
    rule_name: &str,
    max_score: u32,
) -> Result<TemplateDef> {
    check_score(template_json.score, max_score, rule_name, &template_json.identifier)?;
    let expr = Expr::from_json(&template_json.expression)?;
    Ok(TemplateDef::new(expr, template_json.score))
}

fn convert_card(card_json: CardJson, rule_name: &str, max_score: u32) -> Result<CardSpec> {
    check_score(card_json.score, max_score, rule_name, &card_json.identifier)?;
    let mut order_by = Vec::new();
    for entry in card_json.order_by {
        order_by.push(OrderByEntry {
            identifier: entry.identifier,
            direction: Direction::parse(&entry.direction)?,
        });
    }
    Ok(CardSpec {
        title: card_json.title,
        description: card_json.description,
        dimensions: card_json.dimensions,
        metrics: card_json.metrics,
        filters: card_json.filters,
        query: card_json.query,
        limit: card_json.limit,
        order_by,
        visualization: card_json.visualization,
        score: card_json.score,
    })
}

fn check_score(score: u32, max_score: u32, rule_name: &str, identifier: &str) -> Result<()> {
    if score > max_score {
        return Err(DashboardError::Rules(format!(
            "Rule '{}': score {} of '{}' exceeds max_score {}",
            rule_name, score, identifier, max_score
        )));
    }
    Ok(())
}

fn require_type(name: &str, rule_name: &str, lattice: &TypeLattice) -> Result<()> {
    if !lattice.contains(name) {
        return Err(DashboardError::Rules(format!(
            "Rule '{}' references unknown semantic type: {}",
            rule_name, name
        )));
    }
    Ok(())
}

fn require_fieldspec(spec: &str, rule_name: &str, lattice: &TypeLattice) -> Result<()> {
    // Analytics dimension specs match by name and bypass the lattice
    if is_ga_dimension(spec) {
        return Ok(());
    }
    require_type(spec, rule_name, lattice)
}
