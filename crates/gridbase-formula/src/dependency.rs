//! Dependency tracking between formula fields

use crate::typer::{TypedExpr, TypedExprKind};
use ahash::{AHashMap, AHashSet};
use gridbase_core::FieldId;

/// Every field a typed formula reads: each direct reference plus both the
/// link and target fields of each lookup
pub fn extract_dependencies(typed: &TypedExpr) -> AHashSet<FieldId> {
    let mut deps = AHashSet::new();
    collect(typed, &mut deps);
    deps
}

fn collect(typed: &TypedExpr, deps: &mut AHashSet<FieldId>) {
    match &typed.kind {
        TypedExprKind::FieldRef(id) => {
            deps.insert(*id);
        }
        TypedExprKind::LookupRef { through, target } => {
            deps.insert(*through);
            deps.insert(*target);
        }
        TypedExprKind::Function { args, .. } => {
            for arg in args {
                collect(arg, deps);
            }
        }
        TypedExprKind::BinaryOp { left, right, .. } => {
            collect(left, deps);
            collect(right, deps);
        }
        TypedExprKind::UnaryOp { operand, .. } => collect(operand, deps),
        TypedExprKind::Number(_)
        | TypedExprKind::String(_)
        | TypedExprKind::Boolean(_)
        | TypedExprKind::Invalid => {}
    }
}

/// Dependency graph over fields
///
/// Tracks which fields depend on which other fields, enabling cycle
/// detection and ordered refresh of dependents.
#[derive(Debug, Default)]
pub struct FieldGraph {
    /// Field → fields that depend on it
    dependents: AHashMap<FieldId, AHashSet<FieldId>>,
    /// Field → fields it depends on
    dependencies: AHashMap<FieldId, AHashSet<FieldId>>,
}

impl FieldGraph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a field's dependency set
    ///
    /// A formula re-resolve produces the complete new set, so the old
    /// edges are dropped rather than merged.
    pub fn set_dependencies(&mut self, field: FieldId, deps: impl IntoIterator<Item = FieldId>) {
        self.clear_dependencies(field);
        for dep in deps {
            self.dependents.entry(dep).or_default().insert(field);
            self.dependencies.entry(field).or_default().insert(dep);
        }
    }

    /// Drop a field's outgoing edges, keeping edges pointing at it
    pub fn clear_dependencies(&mut self, field: FieldId) {
        if let Some(deps) = self.dependencies.remove(&field) {
            for dep in deps {
                if let Some(set) = self.dependents.get_mut(&dep) {
                    set.remove(&field);
                }
            }
        }
    }

    /// Remove a field from the graph entirely
    ///
    /// Dependents keep their edge to the removed field id: their formulas
    /// still reference it and must be re-resolved to discover the breakage.
    pub fn remove_field(&mut self, field: FieldId) {
        self.clear_dependencies(field);
        self.dependents.remove(&field);
    }

    /// Fields that directly depend on the given field
    pub fn dependents_of(&self, field: FieldId) -> impl Iterator<Item = FieldId> + '_ {
        self.dependents
            .get(&field)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// Fields the given field directly depends on
    pub fn dependencies_of(&self, field: FieldId) -> impl Iterator<Item = FieldId> + '_ {
        self.dependencies
            .get(&field)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// Whether the field participates in a dependency cycle
    pub fn has_circular_reference(&self, field: FieldId) -> bool {
        let mut visited = AHashSet::new();
        let mut in_stack = AHashSet::new();
        self.detect_cycle(field, &mut visited, &mut in_stack)
    }

    fn detect_cycle(
        &self,
        field: FieldId,
        visited: &mut AHashSet<FieldId>,
        in_stack: &mut AHashSet<FieldId>,
    ) -> bool {
        if in_stack.contains(&field) {
            return true;
        }
        if visited.contains(&field) {
            return false;
        }

        visited.insert(field);
        in_stack.insert(field);

        if let Some(deps) = self.dependencies.get(&field) {
            for &dep in deps {
                if self.detect_cycle(dep, visited, in_stack) {
                    return true;
                }
            }
        }

        in_stack.remove(&field);
        false
    }

    /// Transitive dependents of the changed fields, ordered so every field
    /// appears after everything it depends on
    ///
    /// The changed fields themselves are included. Cycles are skipped here;
    /// they are rejected before edges enter the graph.
    pub fn recalc_order(&self, changed: &[FieldId]) -> Vec<FieldId> {
        let mut result = Vec::new();
        let mut visited = AHashSet::new();
        let mut in_stack = AHashSet::new();

        for &field in changed {
            self.visit_dependents(field, &mut result, &mut visited, &mut in_stack);
        }

        // Post-order put dependents first; refresh wants them last
        result.reverse();
        result
    }

    fn visit_dependents(
        &self,
        field: FieldId,
        result: &mut Vec<FieldId>,
        visited: &mut AHashSet<FieldId>,
        in_stack: &mut AHashSet<FieldId>,
    ) {
        if visited.contains(&field) || in_stack.contains(&field) {
            return;
        }

        in_stack.insert(field);

        if let Some(dependents) = self.dependents.get(&field) {
            for &dependent in dependents {
                self.visit_dependents(dependent, result, visited, in_stack);
            }
        }

        in_stack.remove(&field);
        visited.insert(field);
        result.push(field);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f(n: u64) -> FieldId {
        FieldId(n)
    }

    #[test]
    fn test_set_dependencies_replaces_edges() {
        let mut graph = FieldGraph::new();

        graph.set_dependencies(f(3), [f(1), f(2)]);
        assert!(graph.dependents_of(f(1)).any(|d| d == f(3)));

        graph.set_dependencies(f(3), [f(2)]);
        assert!(!graph.dependents_of(f(1)).any(|d| d == f(3)));
        assert!(graph.dependents_of(f(2)).any(|d| d == f(3)));
    }

    #[test]
    fn test_circular_reference() {
        let mut graph = FieldGraph::new();

        // 1 -> 2 -> 3 -> 1
        graph.set_dependencies(f(2), [f(1)]);
        graph.set_dependencies(f(3), [f(2)]);
        graph.set_dependencies(f(1), [f(3)]);

        assert!(graph.has_circular_reference(f(1)));
        assert!(graph.has_circular_reference(f(2)));
        assert!(graph.has_circular_reference(f(3)));
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let mut graph = FieldGraph::new();
        graph.set_dependencies(f(1), [f(1)]);
        assert!(graph.has_circular_reference(f(1)));
    }

    #[test]
    fn test_no_cycle_in_chain() {
        let mut graph = FieldGraph::new();
        graph.set_dependencies(f(2), [f(1)]);
        graph.set_dependencies(f(3), [f(2)]);
        assert!(!graph.has_circular_reference(f(3)));
    }

    #[test]
    fn test_recalc_order_is_upstream_first() {
        let mut graph = FieldGraph::new();

        // 3 depends on 2 depends on 1; 4 depends on 1 directly
        graph.set_dependencies(f(2), [f(1)]);
        graph.set_dependencies(f(3), [f(2)]);
        graph.set_dependencies(f(4), [f(1)]);

        let order = graph.recalc_order(&[f(1)]);
        let pos = |id: FieldId| order.iter().position(|&x| x == id).unwrap();

        assert_eq!(order.len(), 4);
        assert!(pos(f(1)) < pos(f(2)));
        assert!(pos(f(2)) < pos(f(3)));
        assert!(pos(f(1)) < pos(f(4)));
    }

    #[test]
    fn test_recalc_order_visits_each_field_once() {
        let mut graph = FieldGraph::new();

        // Diamond: 4 depends on 2 and 3, both depend on 1
        graph.set_dependencies(f(2), [f(1)]);
        graph.set_dependencies(f(3), [f(1)]);
        graph.set_dependencies(f(4), [f(2), f(3)]);

        let order = graph.recalc_order(&[f(1)]);
        assert_eq!(order.len(), 4);
        assert_eq!(order[0], f(1));
        assert_eq!(*order.last().unwrap(), f(4));
    }

    #[test]
    fn test_removed_field_keeps_dependent_edges() {
        let mut graph = FieldGraph::new();
        graph.set_dependencies(f(2), [f(1)]);

        graph.remove_field(f(1));

        // Dependent 2 still records its dangling reference
        assert!(graph.dependencies_of(f(2)).any(|d| d == f(1)));
        assert!(!graph.dependents_of(f(1)).any(|d| d == f(2)));
    }
}
