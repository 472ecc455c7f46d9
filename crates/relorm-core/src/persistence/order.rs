//! Dependency ordering of planned writes.

use std::collections::BTreeSet;

use crate::catalog::{DeferrableMode, MetadataRegistry};
use crate::config::EngineConfig;
use crate::dialect::DialectCapabilities;

use super::plan::{WriteAction, WritePlan};

/// Whether a dependency through a foreign key may be ignored when ordering.
///
/// Holds when the constraint is only checked at commit and the referenced
/// row's key is already known, so the referencing row can carry it before
/// the referenced row exists.
pub(crate) fn is_relaxed(
    deferrable: Option<DeferrableMode>,
    identity_known: bool,
    caps: &DialectCapabilities,
    config: &EngineConfig,
) -> bool {
    config.relax_deferred_edges && identity_known && caps.defers_validation(deferrable)
}

/// A planned write waiting on the insert of the row it references.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SaveEdge {
    pub dependent: usize,
    pub dependency: usize,
    /// Position of the assignment in the dependent's assignment list.
    pub assignment: usize,
    /// The reference may be written as null and set once the dependency
    /// has its key.
    pub breakable: bool,
}

/// Writes in execution order, plus the assignments set after all inserts.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct WriteOrder {
    pub order: Vec<usize>,
    /// `(write, assignment)` pairs written as null first.
    pub postponed: Vec<(usize, usize)>,
}

/// Dependency edges between planned writes.
pub(crate) fn save_edges(
    plan: &WritePlan,
    registry: &MetadataRegistry,
    caps: &DialectCapabilities,
    config: &EngineConfig,
) -> Vec<SaveEdge> {
    let mut edges = Vec::new();
    for (index, write) in plan.writes.iter().enumerate() {
        let entity = registry.entity(write.entity);
        for (position, assignment) in plan.assignments_of(write.node).iter().enumerate() {
            let Some(dependency) = assignment.source.and_then(|source| plan.position(source)) else {
                continue;
            };
            let target = &plan.writes[dependency];
            if target.action != WriteAction::Insert {
                continue;
            }
            if dependency == index && target.identity_known {
                continue;
            }
            if is_relaxed(assignment.deferrable, target.identity_known, caps, config) {
                continue;
            }
            let nullable = assignment
                .columns
                .iter()
                .all(|jc| entity.column(&jc.name).is_some_and(|c| c.nullable));
            edges.push(SaveEdge {
                dependent: index,
                dependency,
                assignment: position,
                breakable: nullable && config.relax_deferred_edges && caps.defers_validation(assignment.deferrable),
            });
        }
    }
    edges
}

/// Order `count` writes, breaking cycles through breakable edges.
///
/// Edges are only broken while a cycle remains, one at a time, taking the
/// first breakable edge between two stuck writes. On failure, returns the
/// writes that could not be ordered.
pub(crate) fn order_writes(count: usize, edges: &[SaveEdge]) -> Result<WriteOrder, Vec<usize>> {
    let mut active: Vec<SaveEdge> = edges.to_vec();
    let mut postponed = Vec::new();
    loop {
        let pairs: Vec<(usize, usize)> = active.iter().map(|e| (e.dependent, e.dependency)).collect();
        let stuck = match topological_order(count, &pairs) {
            Ok(order) => return Ok(WriteOrder { order, postponed }),
            Err(stuck) => stuck,
        };
        let Some(position) = active
            .iter()
            .position(|e| e.breakable && stuck.contains(&e.dependent) && stuck.contains(&e.dependency))
        else {
            return Err(stuck);
        };
        let edge = active.remove(position);
        postponed.push((edge.dependent, edge.assignment));
    }
}

/// Kahn's algorithm over `count` items.
///
/// Ready items are taken lowest index first, so independent writes keep
/// their discovery order. On a cycle, returns the items that could not be
/// ordered.
pub(crate) fn topological_order(count: usize, edges: &[(usize, usize)]) -> Result<Vec<usize>, Vec<usize>> {
    let mut indegree = vec![0usize; count];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];
    for &(dependent, dependency) in edges {
        indegree[dependent] += 1;
        dependents[dependency].push(dependent);
    }

    let mut ready: BTreeSet<usize> = (0..count).filter(|i| indegree[*i] == 0).collect();
    let mut order = Vec::with_capacity(count);
    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &dependent in &dependents[next] {
            indegree[dependent] -= 1;
            if indegree[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() == count {
        Ok(order)
    } else {
        Err((0..count).filter(|i| indegree[*i] > 0).collect())
    }
}
