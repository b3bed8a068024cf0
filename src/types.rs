//! Semantic Type Lattice - subtype reasoning over semantic type identifiers
//!
//! Semantic types form a single-inheritance lattice. Field types hang off the
//! roots `Number`, `Temporal`, `Text` and `Boolean`, with `PK` and `FK` as
//! structural markers; table entity types hang off `GenericTable`. Rules are
//! matched against tables and fields through `is_a` queries on this lattice.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Single-inheritance type lattice
///
/// The lattice is closed-world: every semantic type a rule references must be
/// declared here. Identifiers that were never declared behave as isolated
/// leaves (their ancestor chain is just themselves), which makes `is_a`
/// total without making undeclared types match anything.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TypeLattice {
    /// All declared type identifiers
    types: HashSet<String>,

    /// child type → parent type
    parents: HashMap<String, String>,
}

impl TypeLattice {
    pub fn new() -> Self {
        Self {
            types: HashSet::new(),
            parents: HashMap::new(),
        }
    }

    /// The built-in hierarchy used by the stock rule library
    pub fn builtin() -> Self {
        let mut lattice = Self::new();

        // Field type roots
        for root in ["Number", "Temporal", "Text", "Boolean", "PK", "FK"] {
            lattice.declare_root(root);
        }

        for (child, parent) in [
            ("Integer", "Number"),
            ("Float", "Number"),
            ("Decimal", "Number"),
            ("Quantity", "Number"),
            ("Income", "Number"),
            ("Latitude", "Number"),
            ("Longitude", "Number"),
            ("Date", "Temporal"),
            ("DateTime", "Temporal"),
            ("Time", "Temporal"),
            ("CreationTimestamp", "DateTime"),
            ("Category", "Text"),
            ("Name", "Text"),
            ("Title", "Text"),
            ("Description", "Text"),
            ("City", "Text"),
            ("State", "Text"),
            ("Country", "Text"),
            ("URL", "Text"),
            ("Email", "Text"),
        ] {
            lattice.declare_type(child, parent);
        }

        // Table entity types
        lattice.declare_root("GenericTable");
        for child in [
            "TransactionTable",
            "EventTable",
            "UserTable",
            "ProductTable",
            "PlaceTable",
        ] {
            lattice.declare_type(child, "GenericTable");
        }

        lattice
    }

    /// Declare a root type (no parent)
    pub fn declare_root(&mut self, name: &str) {
        self.types.insert(name.to_string());
    }

    /// Declare a type under an existing parent
    ///
    /// Unknown parents are declared implicitly as roots, which keeps the
    /// lattice total when hierarchies are built incrementally.
    pub fn declare_type(&mut self, child: &str, parent: &str) {
        self.types.insert(parent.to_string());
        self.types.insert(child.to_string());
        self.parents.insert(child.to_string(), parent.to_string());
    }

    /// Check whether a type identifier was declared
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains(name)
    }

    /// Reflexive-transitive subtype test
    pub fn is_a(&self, child: &str, ancestor: &str) -> bool {
        let mut current = child;
        loop {
            if current == ancestor {
                return true;
            }
            match self.parents.get(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Ancestor chain ordered from the type itself up to its root
    pub fn ancestor_chain(&self, name: &str) -> Vec<String> {
        let mut chain = vec![name.to_string()];
        let mut current = name;
        while let Some(parent) = self.parents.get(current) {
            chain.push(parent.clone());
            current = parent;
        }
        chain
    }

    /// Length of the ancestor chain (specificity measure)
    pub fn ancestor_count(&self, name: &str) -> usize {
        self.ancestor_chain(name).len()
    }
}

impl Default for TypeLattice {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_a_reflexive() {
        let lattice = TypeLattice::builtin();
        assert!(lattice.is_a("Number", "Number"));
        assert!(lattice.is_a("Date", "Date"));
    }

    #[test]
    fn test_is_a_transitive() {
        let lattice = TypeLattice::builtin();
        assert!(lattice.is_a("CreationTimestamp", "DateTime"));
        assert!(lattice.is_a("CreationTimestamp", "Temporal"));
        assert!(!lattice.is_a("CreationTimestamp", "Number"));
    }

    #[test]
    fn test_is_a_not_symmetric() {
        let lattice = TypeLattice::builtin();
        assert!(lattice.is_a("Integer", "Number"));
        assert!(!lattice.is_a("Number", "Integer"));
    }

    #[test]
    fn test_ancestor_chain() {
        let lattice = TypeLattice::builtin();
        assert_eq!(
            lattice.ancestor_chain("CreationTimestamp"),
            vec!["CreationTimestamp", "DateTime", "Temporal"]
        );
        assert_eq!(lattice.ancestor_count("CreationTimestamp"), 3);
        assert_eq!(lattice.ancestor_count("GenericTable"), 1);
    }

    #[test]
    fn test_undeclared_type_is_isolated_leaf() {
        let lattice = TypeLattice::builtin();
        assert!(!lattice.contains("Mystery"));
        assert!(lattice.is_a("Mystery", "Mystery"));
        assert!(!lattice.is_a("Mystery", "GenericTable"));
        assert_eq!(lattice.ancestor_chain("Mystery"), vec!["Mystery"]);
    }

    #[test]
    fn test_entity_types() {
        let lattice = TypeLattice::builtin();
        assert!(lattice.is_a("TransactionTable", "GenericTable"));
        assert!(!lattice.is_a("GenericTable", "TransactionTable"));
    }
}
