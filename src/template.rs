//! Template Substitution - placeholder rewriting for strings and query trees
//!
//! String templates carry `[[identifier]]` tokens; structured templates
//! carry dimension marker forms. Both resolve through the bindings map
//! first, then through entity references, and otherwise stay as they are.

use crate::catalog::Catalog;
use crate::context::{parse_entity_ref, Context};
use crate::error::{DashboardError, Result};
use crate::query::Expr;
use crate::reference::{resolve_reference, BoundEntity, Resolved, TemplateKind};
use crate::types::TypeLattice;
use regex::Regex;
use std::collections::BTreeMap;

/// Identifier → bound entity for one card combination
pub type Bindings = BTreeMap<String, BoundEntity>;

const TOKEN_PATTERN: &str = r"\[\[([^\[\]]+)\]\]";

fn token_regex() -> Result<Regex> {
    Regex::new(TOKEN_PATTERN)
        .map_err(|e| DashboardError::Template(format!("Invalid token pattern: {}", e)))
}

/// Identifiers referenced by a string template, in order of appearance
pub fn tokens(template: &str) -> Result<Vec<String>> {
    let regex = token_regex()?;
    let mut out = Vec::new();
    for found in regex.find_iter(template) {
        let identifier = &template[found.start() + 2..found.end() - 2];
        if !out.iter().any(|seen| seen == identifier) {
            out.push(identifier.to_string());
        }
    }
    Ok(out)
}

/// Replace every `[[identifier]]` token in a string template
///
/// Resolution order per token: the bindings map, then an entity reference
/// against the context (first matching table), then the bare identifier
/// itself.
pub fn substitute_string(
    template: &str,
    kind: TemplateKind,
    bindings: &Bindings,
    ctx: &Context,
    catalog: &dyn Catalog,
    lattice: &TypeLattice,
) -> Result<String> {
    let regex = token_regex()?;
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for found in regex.find_iter(template) {
        let identifier = &template[found.start() + 2..found.end() - 2];
        out.push_str(&template[last..found.start()]);
        out.push_str(&render_token(identifier, kind, bindings, ctx, catalog, lattice)?);
        last = found.end();
    }
    out.push_str(&template[last..]);
    Ok(out)
}

fn render_token(
    identifier: &str,
    kind: TemplateKind,
    bindings: &Bindings,
    ctx: &Context,
    catalog: &dyn Catalog,
    lattice: &TypeLattice,
) -> Result<String> {
    let entity = bindings.get(identifier).cloned().or_else(|| {
        parse_entity_ref(identifier, lattice).and_then(|entity_ref| {
            ctx.resolve_entity_ref(&entity_ref, lattice)
                .first()
                .map(|table| BoundEntity::Table((*table).clone()))
        })
    });
    match entity {
        Some(entity) => match resolve_reference(kind, &entity, catalog, lattice)? {
            Some(Resolved::Text(text)) => Ok(text),
            // No text rendering for this combination
            Some(Resolved::Expr(_)) | None => Ok(identifier.to_string()),
        },
        None => Ok(identifier.to_string()),
    }
}

/// Rewrite dimension markers in a query expression
///
/// Post-order walk; markers without a binding stay in place.
pub fn substitute_expr(
    expr: &Expr,
    bindings: &Bindings,
    catalog: &dyn Catalog,
    lattice: &TypeLattice,
) -> Result<Expr> {
    match expr {
        Expr::Op { name, args } => {
            let args = args
                .iter()
                .map(|arg| substitute_expr(arg, bindings, catalog, lattice))
                .collect::<Result<_>>()?;
            Ok(Expr::Op {
                name: name.clone(),
                args,
            })
        }
        Expr::Dimension(identifier) => {
            if let Some(entity) = bindings.get(identifier) {
                if let Some(Resolved::Expr(resolved)) =
                    resolve_reference(TemplateKind::Structured, entity, catalog, lattice)?
                {
                    return Ok(resolved);
                }
            }
            Ok(expr.clone())
        }
        _ => Ok(expr.clone()),
    }
}
