//! Query Model - structured query tree and native query wrapper
//!
//! Produced queries come in two shapes: a structured tree over the source
//! table (aggregations, breakouts, filters) or a native SQL string. Both
//! serialize to the wire form consumed by query execution downstream.

use crate::catalog::{DatabaseId, FieldId, TableId};
use crate::error::{DashboardError, Result};
use serde_json::{json, Value};

/// A fully resolved reference to a concrete field
#[derive(Clone, Debug, PartialEq)]
pub enum FieldReference {
    /// Field on the source table
    Field(FieldId),

    /// Field reached through a foreign key on the source table
    ForeignKey { link: FieldId, field: FieldId },

    /// Temporal field bucketed by a unit such as "day" or "month"
    Datetime {
        base: Box<FieldReference>,
        unit: String,
    },
}

impl FieldReference {
    pub fn to_json(&self) -> Value {
        match self {
            FieldReference::Field(id) => json!(["field-id", id]),
            FieldReference::ForeignKey { link, field } => json!(["fk->", link, field]),
            FieldReference::Datetime { base, unit } => {
                json!(["datetime-field", base.to_json(), unit])
            }
        }
    }
}

/// A node in a query expression tree
///
/// Rule templates are expressions containing `Dimension` markers; card
/// expansion rewrites those markers into `Ref` nodes. Markers that cannot be
/// resolved stay in place so partially resolved templates survive the walk.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// Operator applied to arguments, e.g. sum, count, and, >
    Op { name: String, args: Vec<Expr> },

    /// Unresolved dimension marker
    Dimension(String),

    /// Resolved field reference
    Ref(FieldReference),

    /// Ordinal reference to the i-th aggregation of the enclosing query
    AggregateField(usize),

    Number(f64),
    Str(String),
    Bool(bool),
}

impl Expr {
    /// Parse the JSON array form used by rule files
    ///
    /// `["sum", ["dimension", "Income"]]` becomes an `Op` over a
    /// `Dimension` marker; scalars map to literals.
    pub fn from_json(value: &Value) -> Result<Expr> {
        match value {
            Value::Array(items) => {
                let (head, rest) = items.split_first().ok_or_else(|| {
                    DashboardError::Rules("Empty expression form".to_string())
                })?;
                let name = head.as_str().ok_or_else(|| {
                    DashboardError::Rules(format!(
                        "Expression operator must be a string, got {}",
                        head
                    ))
                })?;
                if name == "dimension" {
                    match rest {
                        [Value::String(id)] => Ok(Expr::Dimension(id.clone())),
                        _ => Err(DashboardError::Rules(format!(
                            "Dimension form takes one string identifier, got {}",
                            value
                        ))),
                    }
                } else {
                    let args = rest.iter().map(Expr::from_json).collect::<Result<_>>()?;
                    Ok(Expr::Op {
                        name: name.to_string(),
                        args,
                    })
                }
            }
            Value::String(s) => Ok(Expr::Str(s.clone())),
            Value::Number(n) => {
                let n = n.as_f64().ok_or_else(|| {
                    DashboardError::Rules(format!("Unrepresentable number: {}", n))
                })?;
                Ok(Expr::Number(n))
            }
            Value::Bool(b) => Ok(Expr::Bool(*b)),
            _ => Err(DashboardError::Rules(format!(
                "Unsupported expression literal: {}",
                value
            ))),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Expr::Op { name, args } => {
                let mut items = vec![json!(name)];
                items.extend(args.iter().map(Expr::to_json));
                Value::Array(items)
            }
            Expr::Dimension(id) => json!(["dimension", id]),
            Expr::Ref(reference) => reference.to_json(),
            Expr::AggregateField(index) => json!(["aggregate-field", index]),
            Expr::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    json!(*n as i64)
                } else {
                    json!(n)
                }
            }
            Expr::Str(s) => json!(s),
            Expr::Bool(b) => json!(b),
        }
    }

    /// Dimension identifiers referenced anywhere in this expression
    pub fn referenced_dimensions(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_dimensions(&mut out);
        out
    }

    fn collect_dimensions(&self, out: &mut Vec<String>) {
        match self {
            Expr::Dimension(id) => {
                if !out.iter().any(|seen| seen == id) {
                    out.push(id.clone());
                }
            }
            Expr::Op { args, .. } => {
                for arg in args {
                    arg.collect_dimensions(out);
                }
            }
            _ => {}
        }
    }
}

/// Sort direction for order-by clauses
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Ascending => "asc",
            Direction::Descending => "desc",
        }
    }

    /// Parse the long form used in rule files
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "ascending" => Ok(Direction::Ascending),
            "descending" => Ok(Direction::Descending),
            _ => Err(DashboardError::Rules(format!(
                "Unknown sort direction: {}",
                s
            ))),
        }
    }
}

/// The structured query tree over one source table
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StructuredQuery {
    pub source_table: TableId,
    pub aggregation: Vec<Expr>,
    pub breakout: Vec<Expr>,
    pub filter: Option<Expr>,
    pub order_by: Vec<(Direction, Expr)>,
    pub limit: Option<u32>,
}

impl StructuredQuery {
    pub fn to_json(&self) -> Value {
        let mut query = serde_json::Map::new();
        query.insert("source_table".to_string(), json!(self.source_table));
        if !self.aggregation.is_empty() {
            let aggs: Vec<Value> = self.aggregation.iter().map(Expr::to_json).collect();
            query.insert("aggregation".to_string(), Value::Array(aggs));
        }
        if !self.breakout.is_empty() {
            let breakouts: Vec<Value> = self.breakout.iter().map(Expr::to_json).collect();
            query.insert("breakout".to_string(), Value::Array(breakouts));
        }
        if let Some(filter) = &self.filter {
            query.insert("filter".to_string(), filter.to_json());
        }
        if !self.order_by.is_empty() {
            let clauses: Vec<Value> = self
                .order_by
                .iter()
                .map(|(direction, expr)| json!([direction.as_str(), expr.to_json()]))
                .collect();
            query.insert("order_by".to_string(), Value::Array(clauses));
        }
        if let Some(limit) = self.limit {
            query.insert("limit".to_string(), json!(limit));
        }
        Value::Object(query)
    }
}

/// A complete candidate query
#[derive(Clone, Debug, PartialEq)]
pub enum Query {
    Structured {
        database: DatabaseId,
        query: StructuredQuery,
    },
    Native {
        database: DatabaseId,
        query: String,
    },
}

impl Query {
    pub fn database(&self) -> DatabaseId {
        match self {
            Query::Structured { database, .. } => *database,
            Query::Native { database, .. } => *database,
        }
    }

    /// Source table for structured queries; native queries carry none
    pub fn source_table(&self) -> Option<TableId> {
        match self {
            Query::Structured { query, .. } => Some(query.source_table),
            Query::Native { .. } => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Query::Structured { database, query } => json!({
                "type": "query",
                "database": database,
                "query": query.to_json(),
            }),
            Query::Native { database, query } => json!({
                "type": "native",
                "database": database,
                "native": { "query": query },
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expr_from_json_roundtrip() {
        let source = json!(["sum", ["dimension", "Income"]]);
        let expr = Expr::from_json(&source).unwrap();
        assert_eq!(
            expr,
            Expr::Op {
                name: "sum".to_string(),
                args: vec![Expr::Dimension("Income".to_string())],
            }
        );
        assert_eq!(expr.to_json(), source);
    }

    #[test]
    fn test_expr_literals() {
        let expr = Expr::from_json(&json!([">", ["dimension", "Total"], 100])).unwrap();
        assert_eq!(
            expr,
            Expr::Op {
                name: ">".to_string(),
                args: vec![Expr::Dimension("Total".to_string()), Expr::Number(100.0)],
            }
        );
        assert_eq!(expr.to_json(), json!([">", ["dimension", "Total"], 100]));
    }

    #[test]
    fn test_expr_rejects_malformed_forms() {
        assert!(Expr::from_json(&json!([])).is_err());
        assert!(Expr::from_json(&json!([42, "x"])).is_err());
        assert!(Expr::from_json(&json!(["dimension", "a", "b"])).is_err());
        assert!(Expr::from_json(&json!(null)).is_err());
    }

    #[test]
    fn test_referenced_dimensions_deduplicated() {
        let expr = Expr::from_json(&json!([
            "+",
            ["dimension", "A"],
            ["sum", ["dimension", "B"]],
            ["dimension", "A"]
        ]))
        .unwrap();
        assert_eq!(expr.referenced_dimensions(), vec!["A", "B"]);
    }

    #[test]
    fn test_field_reference_forms() {
        assert_eq!(FieldReference::Field(7).to_json(), json!(["field-id", 7]));
        assert_eq!(
            FieldReference::ForeignKey { link: 3, field: 9 }.to_json(),
            json!(["fk->", 3, 9])
        );
        let wrapped = FieldReference::Datetime {
            base: Box::new(FieldReference::Field(7)),
            unit: "day".to_string(),
        };
        assert_eq!(
            wrapped.to_json(),
            json!(["datetime-field", ["field-id", 7], "day"])
        );
    }

    #[test]
    fn test_structured_query_wire_form() {
        let query = Query::Structured {
            database: 1,
            query: StructuredQuery {
                source_table: 4,
                aggregation: vec![Expr::Op {
                    name: "count".to_string(),
                    args: vec![],
                }],
                breakout: vec![Expr::Ref(FieldReference::Field(7))],
                filter: None,
                order_by: vec![(Direction::Descending, Expr::AggregateField(0))],
                limit: Some(10),
            },
        };
        assert_eq!(
            query.to_json(),
            json!({
                "type": "query",
                "database": 1,
                "query": {
                    "source_table": 4,
                    "aggregation": [["count"]],
                    "breakout": [["field-id", 7]],
                    "order_by": [["desc", ["aggregate-field", 0]]],
                    "limit": 10,
                },
            })
        );
    }

    #[test]
    fn test_native_query_wire_form() {
        let query = Query::Native {
            database: 2,
            query: "SELECT 1".to_string(),
        };
        assert_eq!(
            query.to_json(),
            json!({
                "type": "native",
                "database": 2,
                "native": { "query": "SELECT 1" },
            })
        );
        assert_eq!(query.source_table(), None);
        assert_eq!(query.database(), 2);
    }
}
