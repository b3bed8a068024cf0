//! Dashboard Orchestrator - drive one generation run end to end
//!
//! Picks the most specific rule for the root table, binds its dimensions,
//! resolves metric and filter overloads, expands every card, merges card
//! groups that share an identifier and hands the survivors to the renderer.
//! The whole run is a pure function of its inputs apart from read-only
//! catalog and policy calls and the final renderer invocation.

use crate::binding::{bind_dimensions, resolve_overloads};
use crate::cards::{expand_card, AccessPolicy, CardInstance};
use crate::catalog::{Catalog, TableId};
use crate::context::Context;
use crate::error::Result;
use crate::reference::TemplateKind;
use crate::rules::RuleLibrary;
use crate::template::{substitute_string, Bindings};
use crate::types::TypeLattice;
use std::cmp::Ordering;
use tracing::{debug, info};

pub type DashboardId = u64;

/// Title and description handed to the renderer
#[derive(Clone, Debug, PartialEq)]
pub struct DashboardMetadata {
    pub title: String,
    pub description: Option<String>,
}

/// Final rendering collaborator
pub trait DashboardRenderer {
    fn create_dashboard(
        &self,
        metadata: &DashboardMetadata,
        cards: &[CardInstance],
    ) -> Result<DashboardId>;
}

/// Generate a dashboard for one root table
///
/// Returns `Ok(None)` when no rule applies to the root's entity type or
/// when every card yields zero surviving instances; no partial dashboard is
/// emitted.
pub fn generate_dashboard(
    root_table_id: TableId,
    library: &RuleLibrary,
    catalog: &dyn Catalog,
    lattice: &TypeLattice,
    policy: &dyn AccessPolicy,
    renderer: &dyn DashboardRenderer,
) -> Result<Option<DashboardId>> {
    let root = catalog.get_table(root_table_id)?;
    let rule = match library.best_match(&root.entity_type, lattice) {
        Some(rule) => rule.clone(),
        None => {
            info!(
                "No rule applies to table '{}' (entity type '{}')",
                root.display_name, root.entity_type
            );
            return Ok(None);
        }
    };
    info!(
        "Using rule '{}' for table '{}' (entity type '{}')",
        rule.name, root.display_name, root.entity_type
    );
    if catalog.is_link_only(&root, lattice)? {
        debug!("Table '{}' carries only key fields", root.display_name);
    }

    let mut tables = vec![root.clone()];
    tables.extend(catalog.linked_tables(&root)?);

    let dimensions = bind_dimensions(&rule, &root, &tables, catalog, lattice)?;
    info!(
        "Dimension bindings: {}",
        dimensions
            .iter()
            .map(|(identifier, binding)| format!("{} x{}", identifier, binding.matches.len()))
            .collect::<Vec<_>>()
            .join(", ")
    );
    let metrics = resolve_overloads(&rule.metrics, &dimensions);
    let filters = resolve_overloads(&rule.filters, &dimensions);
    info!(
        "Resolved metrics [{}] and filters [{}]",
        metrics.keys().cloned().collect::<Vec<_>>().join(", "),
        filters.keys().cloned().collect::<Vec<_>>().join(", ")
    );

    let ctx = Context {
        database: root.db_id,
        root,
        tables,
        rule,
        dimensions,
        metrics,
        filters,
    };

    let empty = Bindings::new();
    let title = substitute_string(
        &ctx.rule.title,
        TemplateKind::Text,
        &empty,
        &ctx,
        catalog,
        lattice,
    )?;
    let description = match &ctx.rule.description {
        Some(description) => Some(substitute_string(
            description,
            TemplateKind::Text,
            &empty,
            &ctx,
            catalog,
            lattice,
        )?),
        None => None,
    };

    // Card groups keyed by identifier; when two cards share one, the group
    // whose best instance scores higher survives.
    let mut groups: Vec<(String, Vec<CardInstance>)> = Vec::new();
    for (identifier, card) in &ctx.rule.cards {
        let mut instances = expand_card(identifier, card, &ctx, catalog, lattice, policy)?;
        if instances.is_empty() {
            continue;
        }
        instances.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        match groups
            .iter_mut()
            .find(|(existing, _)| existing.as_str() == identifier.as_str())
        {
            Some((_, existing)) => {
                if instances[0].score > existing[0].score {
                    *existing = instances;
                }
            }
            None => groups.push((identifier.clone(), instances)),
        }
    }

    let cards: Vec<CardInstance> = groups
        .into_iter()
        .flat_map(|(_, instances)| instances)
        .collect();
    if cards.is_empty() {
        info!("No cards survived for '{}'", title);
        return Ok(None);
    }

    let metadata = DashboardMetadata { title, description };
    let id = renderer.create_dashboard(&metadata, &cards)?;
    Ok(Some(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::AllowAllPolicy;
    use crate::catalog::{Field, InMemoryCatalog, Table};
    use crate::query::Expr;
    use crate::rules::{CardSpec, DimensionDef, Rule, TemplateDef};
    use std::cell::RefCell;

    /// Captures what the renderer was handed
    struct RecordingRenderer {
        created: RefCell<Option<(DashboardMetadata, Vec<CardInstance>)>>,
    }

    impl RecordingRenderer {
        fn new() -> Self {
            Self {
                created: RefCell::new(None),
            }
        }
    }

    impl DashboardRenderer for RecordingRenderer {
        fn create_dashboard(
            &self,
            metadata: &DashboardMetadata,
            cards: &[CardInstance],
        ) -> Result<DashboardId> {
            *self.created.borrow_mut() = Some((metadata.clone(), cards.to_vec()));
            Ok(42)
        }
    }

    fn count() -> TemplateDef {
        TemplateDef::new(
            Expr::Op {
                name: "count".to_string(),
                args: vec![],
            },
            100,
        )
    }

    #[test]
    fn test_generation_returns_none_without_applicable_rule() {
        let lattice = TypeLattice::builtin();
        let mut catalog = InMemoryCatalog::new();
        catalog.register_table(Table::new(1, 1, "blobs", "Mystery"));
        let mut library = RuleLibrary::new();
        library.register_rule(Rule::new("generic", "GenericTable", "Overview", 100));

        let renderer = RecordingRenderer::new();
        let result = generate_dashboard(1, &library, &catalog, &lattice, &AllowAllPolicy, &renderer)
            .unwrap();
        assert!(result.is_none());
        assert!(renderer.created.borrow().is_none());
    }

    #[test]
    fn test_generation_substitutes_dashboard_title() {
        let lattice = TypeLattice::builtin();
        let mut catalog = InMemoryCatalog::new();
        catalog.register_table(
            Table::new(1, 1, "orders", "TransactionTable").with_display_name("Orders"),
        );
        catalog.register_field(Field::new(10, 1, "total", "Decimal"));
        let mut library = RuleLibrary::new();
        library.register_rule(
            Rule::new("transactions", "TransactionTable", "A look at [[this]]", 100)
                .with_metric("Count", count())
                .with_card(
                    "rowcount",
                    CardSpec::new("Number of [[this]]", 80).with_metrics(&["Count"]),
                ),
        );

        let renderer = RecordingRenderer::new();
        let result = generate_dashboard(1, &library, &catalog, &lattice, &AllowAllPolicy, &renderer)
            .unwrap();
        assert_eq!(result, Some(42));
        let created = renderer.created.borrow();
        let (metadata, cards) = created.as_ref().unwrap();
        assert_eq!(metadata.title, "A look at Orders");
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].title, "Number of Orders");
    }

    #[test]
    fn test_shared_identifier_keeps_higher_scoring_group() {
        let lattice = TypeLattice::builtin();
        let mut catalog = InMemoryCatalog::new();
        catalog.register_table(Table::new(1, 1, "orders", "TransactionTable"));
        catalog.register_field(Field::new(10, 1, "total", "Decimal"));
        let mut library = RuleLibrary::new();
        library.register_rule(
            Rule::new("transactions", "TransactionTable", "Orders", 100)
                .with_dimension("Amount", DimensionDef::on_root("Number", 50))
                .with_metric("Count", count())
                // Two cards share the identifier; the second scores higher
                .with_card(
                    "summary",
                    CardSpec::new("Low", 40).with_metrics(&["Count"]),
                )
                .with_card(
                    "summary",
                    CardSpec::new("High", 90).with_metrics(&["Count"]),
                ),
        );

        let renderer = RecordingRenderer::new();
        generate_dashboard(1, &library, &catalog, &lattice, &AllowAllPolicy, &renderer).unwrap();
        let created = renderer.created.borrow();
        let (_, cards) = created.as_ref().unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].title, "High");
    }

    #[test]
    fn test_instances_sorted_by_descending_score() {
        let lattice = TypeLattice::builtin();
        let mut catalog = InMemoryCatalog::new();
        catalog.register_table(Table::new(1, 1, "orders", "TransactionTable"));
        catalog.register_field(Field::new(10, 1, "total", "Decimal"));
        catalog.register_field(Field::new(11, 1, "created_at", "DateTime"));
        let mut library = RuleLibrary::new();
        library.register_rule(
            Rule::new("transactions", "TransactionTable", "Orders", 100)
                .with_dimension("Amount", DimensionDef::on_root("Number", 100))
                .with_dimension("When", DimensionDef::on_root("Temporal", 60))
                .with_card(
                    "by_amount",
                    CardSpec::new("By amount", 50).with_dimensions(&["Amount"]),
                )
                .with_card(
                    "by_time",
                    CardSpec::new("Over time", 100).with_dimensions(&["When"]),
                ),
        );

        let renderer = RecordingRenderer::new();
        generate_dashboard(1, &library, &catalog, &lattice, &AllowAllPolicy, &renderer).unwrap();
        let created = renderer.created.borrow();
        let (_, cards) = created.as_ref().unwrap();
        assert_eq!(cards.len(), 2);
        // Groups keep card order; scores are attached per group
        assert_eq!(cards[0].title, "By amount");
        assert_eq!(cards[1].title, "Over time");
    }
}
