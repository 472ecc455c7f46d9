//! Cascading save and remove.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use tracing::{debug, instrument, warn};

use crate::catalog::{EntityId, EntityMetadata, MetadataRegistry};
use crate::config::{EngineConfig, OrphanAction};
use crate::connection::{Transaction, Value};
use crate::dialect::{render_delete, render_insert, render_select, render_update};
use crate::error::{CascadeOrderError, Error};
use crate::metrics::WriteKind;

use super::graph::{NodeId, ObjectGraph};
use super::order::{is_relaxed, order_writes, save_edges, topological_order};
use super::plan::{
    entity_of, plan_save, primary_key, slot_nodes, Assignment, PlannedWrite, SaveOptions, WriteAction,
    WritePlan,
};

/// Outcome of a save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedGraph {
    /// Node the save started from.
    pub root: NodeId,
    /// Inserted nodes in execution order.
    pub inserted: Vec<NodeId>,
    /// Updated nodes in execution order.
    pub updated: Vec<NodeId>,
    /// References written as null and set after the referenced rows were
    /// inserted, to break a dependency cycle.
    pub deferred_links: usize,
    /// Rows re-pointed without being saved themselves.
    pub relinked: usize,
    /// Children detached from a loaded collection.
    pub orphaned: usize,
    /// Junction rows inserted.
    pub junction_rows_inserted: usize,
    /// Junction rows removed.
    pub junction_rows_removed: usize,
    /// Statements issued, lookups included.
    pub statements: u64,
}

/// Outcome of a remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedGraph {
    /// Deleted nodes in execution order.
    pub removed: Vec<NodeId>,
    /// Junction rows removed.
    pub junction_rows_removed: u64,
    /// Statements issued.
    pub statements: u64,
}

/// Execution state of one save.
struct Execution {
    order: Vec<usize>,
    /// `(node, assignment)` pairs written as null first.
    postponed: HashSet<(NodeId, usize)>,
    /// Generated keys written into the graph so far.
    generated: Vec<(NodeId, String)>,
}

/// Writes object graphs inside a transaction.
///
/// A save walks every relation whose cascade allows it, orders the writes
/// so that no row is written before a row it references (unless the key
/// is checked at commit), and finishes with junction rows. Any failure
/// leaves the transaction to be rolled back by its owner.
pub struct Persister<'r> {
    registry: &'r MetadataRegistry,
    config: &'r EngineConfig,
}

impl<'r> Persister<'r> {
    /// Create a persister over a registry.
    pub fn new(registry: &'r MetadataRegistry, config: &'r EngineConfig) -> Self {
        Self { registry, config }
    }

    /// Save `root` and everything its cascades reach.
    ///
    /// Database-generated keys are written into the graph as rows are
    /// inserted. When the save fails they are reset to null. A rollback
    /// issued after a successful save does not touch the graph, so the
    /// caller must discard or reset it before saving again.
    #[instrument(skip_all, fields(root = root.index()))]
    pub fn save(
        &self,
        graph: &mut ObjectGraph,
        root: NodeId,
        options: &SaveOptions,
        tx: &mut Transaction<'_>,
    ) -> Result<SavedGraph, Error> {
        let start = tx.statement_count();
        let plan = match plan_save(self.registry, self.config, options, graph, root, tx) {
            Ok(plan) => plan,
            Err(e) => return Err(self.order_failure(tx, e)),
        };

        let edges = save_edges(&plan, self.registry, tx.capabilities(), self.config);
        let ordered = order_writes(plan.writes.len(), &edges)
            .map_err(|stuck| self.cycle(tx, stuck.iter().map(|i| plan.writes[*i].entity)))?;
        let mut execution = Execution {
            postponed: ordered
                .postponed
                .iter()
                .map(|&(write, assignment)| (plan.writes[write].node, assignment))
                .collect(),
            order: ordered.order,
            generated: Vec::new(),
        };

        let mut saved = SavedGraph {
            root,
            inserted: Vec::new(),
            updated: Vec::new(),
            deferred_links: 0,
            relinked: 0,
            orphaned: 0,
            junction_rows_inserted: 0,
            junction_rows_removed: 0,
            statements: 0,
        };
        if let Err(e) = self.write_plan(graph, &plan, &mut execution, tx, &mut saved) {
            for (node, column) in execution.generated {
                graph.set_value(node, column, Value::Null)?;
            }
            return Err(e);
        }
        saved.statements = tx.statement_count() - start;

        debug!(
            inserted = saved.inserted.len(),
            updated = saved.updated.len(),
            deferred_links = saved.deferred_links,
            junction_rows = saved.junction_rows_inserted,
            statements = saved.statements,
            "saved graph"
        );
        Ok(saved)
    }

    fn write_plan(
        &self,
        graph: &mut ObjectGraph,
        plan: &WritePlan,
        execution: &mut Execution,
        tx: &mut Transaction<'_>,
        saved: &mut SavedGraph,
    ) -> Result<(), Error> {
        let postponed = &execution.postponed;
        for &index in &execution.order {
            let write = &plan.writes[index];
            match write.action {
                WriteAction::Insert => {
                    self.insert(graph, plan, write, postponed, tx, &mut execution.generated)?;
                    saved.inserted.push(write.node);
                }
                WriteAction::Update => {
                    if self.update(graph, plan, write, postponed, tx)? {
                        saved.updated.push(write.node);
                    }
                }
            }
        }
        saved.deferred_links = self.set_postponed(graph, plan, postponed, tx)?;
        saved.relinked = self.relink(graph, plan, tx)?;
        saved.orphaned = self.detach_orphans(graph, plan, tx)?;
        let (inserted, removed) = self.sync_junctions(graph, plan, tx)?;
        saved.junction_rows_inserted = inserted;
        saved.junction_rows_removed = removed;
        Ok(())
    }

    /// Delete `root` and everything reachable through cascading removes.
    ///
    /// Junction rows go first, then referencing rows before the rows they
    /// reference. Database-generated keys of removed objects are cleared.
    #[instrument(skip_all, fields(root = root.index()))]
    pub fn remove(
        &self,
        graph: &mut ObjectGraph,
        root: NodeId,
        tx: &mut Transaction<'_>,
    ) -> Result<RemovedGraph, Error> {
        let start = tx.statement_count();
        let registry = self.registry;
        let caps = tx.capabilities();

        let mut removed: Vec<(NodeId, &EntityMetadata, Vec<Value>)> = Vec::new();
        let mut seen: HashMap<NodeId, usize> = HashMap::new();
        let mut queue = VecDeque::from([(root, 0usize)]);
        while let Some((node, depth)) = queue.pop_front() {
            if seen.contains_key(&node) {
                continue;
            }
            if depth > self.config.max_cascade_depth {
                let e = CascadeOrderError::MaxDepthExceeded {
                    max_depth: self.config.max_cascade_depth,
                };
                return Err(self.order_failure(tx, e.into()));
            }
            let entity = entity_of(registry, graph, node, None)?;
            let key = primary_key(graph.node(node)?, entity).ok_or_else(|| {
                Error::InvalidGraph(format!("cannot remove a '{}' object without a primary key", entity.name))
            })?;
            seen.insert(node, removed.len());
            removed.push((node, entity, key));

            for relation in registry.relations_of(entity.id) {
                if !relation.cascade.remove {
                    continue;
                }
                if let Some(targets) = slot_nodes(graph.node(node)?, relation)? {
                    let target_entity = registry.entity(relation.target);
                    for target in targets {
                        entity_of(registry, graph, target, Some(target_entity))?;
                        queue.push_back((target, depth + 1));
                    }
                }
            }
        }

        let mut junction_rows_removed = 0;
        for (_, entity, key) in &removed {
            for junction in registry.junctions() {
                let Some(info) = &junction.junction else { continue };
                for (side, columns) in [
                    (info.owner_entity, &info.owner_columns),
                    (info.inverse_entity, &info.inverse_columns),
                ] {
                    if side != entity.id {
                        continue;
                    }
                    let sql = render_delete(&junction.table_name, columns, caps);
                    let rows = tx.execute(&sql, key)?;
                    junction_rows_removed += rows;
                    self.record(tx, &junction.table_name, WriteKind::Delete);
                }
            }
        }

        if junction_rows_removed > 0 {
            if let Some(metrics) = tx.metrics() {
                metrics.record_junction_rows(junction_rows_removed);
            }
        }

        // Referencing rows are deleted before the rows they reference.
        let mut edges = Vec::new();
        for (index, (node, entity, _)) in removed.iter().enumerate() {
            for relation in registry.relations_of(entity.id) {
                let Some(targets) = slot_nodes(graph.node(*node)?, relation)? else {
                    continue;
                };
                let deferrable = registry.foreign_key_for_relation(relation).and_then(|fk| fk.deferrable);
                if is_relaxed(deferrable, true, caps, self.config) {
                    continue;
                }
                for target in targets {
                    let Some(&other) = seen.get(&target) else { continue };
                    if other == index {
                        continue;
                    }
                    if relation.has_join_columns() {
                        edges.push((other, index));
                    } else if relation.is_referenced_by_target() {
                        edges.push((index, other));
                    }
                }
            }
        }
        let order = topological_order(removed.len(), &edges)
            .map_err(|stuck| self.cycle(tx, stuck.iter().map(|i| removed[*i].1.id)))?;

        let mut deleted = Vec::with_capacity(removed.len());
        for index in order {
            let (node, entity, key) = &removed[index];
            let sql = render_delete(&entity.table_name, &entity.primary_column_names(), caps);
            tx.execute(&sql, key)?;
            self.record(tx, &entity.table_name, WriteKind::Delete);
            deleted.push(*node);
        }

        for (node, entity, _) in &removed {
            let object = graph.node_mut(*node)?;
            for column in entity.primary_columns().filter(|c| c.is_database_generated()) {
                object.set(column.name.clone(), Value::Null);
            }
        }

        let statements = tx.statement_count() - start;
        debug!(removed = deleted.len(), junction_rows_removed, statements, "removed graph");
        Ok(RemovedGraph {
            removed: deleted,
            junction_rows_removed,
            statements,
        })
    }

    fn insert(
        &self,
        graph: &mut ObjectGraph,
        plan: &WritePlan,
        write: &PlannedWrite,
        postponed: &HashSet<(NodeId, usize)>,
        tx: &mut Transaction<'_>,
        generated_keys: &mut Vec<(NodeId, String)>,
    ) -> Result<(), Error> {
        let entity = self.registry.entity(write.entity);
        let caps = tx.capabilities();
        let mut row = self.row_values(graph, plan, write.node, entity, postponed)?;

        let mut columns = Vec::new();
        let mut params = Vec::new();
        for column in &entity.columns {
            let Some(value) = row.remove(&column.name) else { continue };
            if column.is_database_generated() && value.is_null() {
                continue;
            }
            columns.push(column.name.clone());
            params.push(value);
        }
        let generated: Vec<String> = entity
            .primary_columns()
            .filter(|c| c.is_database_generated() && !columns.contains(&c.name))
            .map(|c| c.name.clone())
            .collect();

        let sql = render_insert(entity, &columns, &generated, caps);
        if !generated.is_empty() && caps.supports_returning {
            let rows = tx.query(&sql, &params)?;
            let returned = rows.first().ok_or_else(|| {
                Error::Transaction(format!("insert into '{}' returned no row", entity.table_name))
            })?;
            for (i, column) in generated.iter().enumerate() {
                let value = returned
                    .get(column)
                    .or_else(|| returned.get_index(i))
                    .cloned()
                    .unwrap_or_default();
                graph.set_value(write.node, column.clone(), value)?;
                generated_keys.push((write.node, column.clone()));
            }
        } else {
            tx.execute(&sql, &params)?;
            if let Some(column) = generated.first() {
                let id = tx.last_insert_id()?.ok_or_else(|| {
                    Error::Transaction(format!(
                        "no generated identity reported for '{}'",
                        entity.table_name
                    ))
                })?;
                graph.set_value(write.node, column.clone(), id)?;
                generated_keys.push((write.node, column.clone()));
            }
        }
        self.record(tx, &entity.table_name, WriteKind::Insert);
        Ok(())
    }

    /// Returns `false` when there was nothing to write.
    fn update(
        &self,
        graph: &ObjectGraph,
        plan: &WritePlan,
        write: &PlannedWrite,
        postponed: &HashSet<(NodeId, usize)>,
        tx: &mut Transaction<'_>,
    ) -> Result<bool, Error> {
        let entity = self.registry.entity(write.entity);
        let row = self.row_values(graph, plan, write.node, entity, postponed)?;
        self.update_row(graph, write.node, entity, row, tx)
    }

    fn update_row(
        &self,
        graph: &ObjectGraph,
        node: NodeId,
        entity: &EntityMetadata,
        mut row: BTreeMap<String, Value>,
        tx: &mut Transaction<'_>,
    ) -> Result<bool, Error> {
        let primary = entity.primary_column_names();
        let key = primary_key(graph.node(node)?, entity).ok_or_else(|| {
            Error::InvalidGraph(format!("'{}' object has no primary key to update by", entity.name))
        })?;

        let mut columns = Vec::new();
        let mut params = Vec::new();
        for column in entity.columns.iter().filter(|c| !c.primary) {
            if let Some(value) = row.remove(&column.name) {
                columns.push(column.name.clone());
                params.push(value);
            }
        }
        if columns.is_empty() {
            return Ok(false);
        }
        params.extend(key);

        let sql = render_update(&entity.table_name, &columns, &primary, tx.capabilities());
        tx.execute(&sql, &params)?;
        self.record(tx, &entity.table_name, WriteKind::Update);
        Ok(true)
    }

    /// Set references that were written as null, now that every insert ran.
    fn set_postponed(
        &self,
        graph: &ObjectGraph,
        plan: &WritePlan,
        postponed: &HashSet<(NodeId, usize)>,
        tx: &mut Transaction<'_>,
    ) -> Result<usize, Error> {
        let mut pending: Vec<(NodeId, usize)> = postponed.iter().copied().collect();
        pending.sort();
        let mut updated = 0;
        for (node, position) in pending {
            let Some(assignment) = plan.assignments_of(node).get(position) else {
                continue;
            };
            let Some(write) = plan.position(node).map(|i| &plan.writes[i]) else {
                continue;
            };
            let entity = self.registry.entity(write.entity);
            let row = self.assigned_values(graph, assignment)?.into_iter().collect();
            if self.update_row(graph, node, entity, row, tx)? {
                updated += 1;
            }
        }
        Ok(updated)
    }

    /// Point rows that are not saved themselves at their new parent.
    fn relink(&self, graph: &ObjectGraph, plan: &WritePlan, tx: &mut Transaction<'_>) -> Result<usize, Error> {
        let mut relinked = 0;
        for (node, entity, assignments) in plan.relinks() {
            let entity = self.registry.entity(entity);
            let mut row = BTreeMap::new();
            for assignment in assignments {
                row.extend(self.assigned_values(graph, assignment)?);
            }
            if self.update_row(graph, node, entity, row, tx)? {
                relinked += 1;
            }
        }
        Ok(relinked)
    }

    fn detach_orphans(&self, graph: &ObjectGraph, plan: &WritePlan, tx: &mut Transaction<'_>) -> Result<usize, Error> {
        let caps = tx.capabilities();
        let mut orphaned = 0;
        for check in &plan.orphan_checks {
            let relation = self.registry.relation(check.relation);
            let Some(inverse) = relation.inverse.map(|id| self.registry.relation(id)) else {
                continue;
            };
            let child = self.registry.entity(relation.target);
            let anchor = graph.node(check.anchor)?;
            let parent_key = inverse
                .join_columns
                .iter()
                .map(|jc| anchor.get(&jc.referenced_column).cloned().unwrap_or_default())
                .collect::<Vec<_>>();
            let join: Vec<String> = inverse.join_columns.iter().map(|jc| jc.name.clone()).collect();
            let primary = child.primary_column_names();

            let kept: HashSet<Vec<Value>> = check
                .children
                .iter()
                .filter_map(|c| graph.node(*c).ok().and_then(|o| primary_key(o, child)))
                .collect();
            let sql = render_select(&child.table_name, &primary, &join, &primary, caps);
            let current = tx.query(&sql, &parent_key)?;

            for row in current {
                let key = row.values().to_vec();
                if kept.contains(&key) {
                    continue;
                }
                if self.config.orphan_action == OrphanAction::Ignore {
                    continue;
                }
                let nullable = join
                    .iter()
                    .all(|name| child.column(name).is_some_and(|c| c.nullable));
                if !nullable {
                    warn!(
                        entity = %child.name,
                        relation = %relation.property,
                        "orphaned row keeps its reference because the join column is not nullable"
                    );
                    continue;
                }
                let mut params = vec![Value::Null; join.len()];
                params.extend(key);
                let sql = render_update(&child.table_name, &join, &primary, caps);
                tx.execute(&sql, &params)?;
                self.record(tx, &child.table_name, WriteKind::Update);
                orphaned += 1;
            }
        }
        Ok(orphaned)
    }

    /// Bring junction rows in line with loaded many-to-many slots.
    fn sync_junctions(
        &self,
        graph: &ObjectGraph,
        plan: &WritePlan,
        tx: &mut Transaction<'_>,
    ) -> Result<(usize, usize), Error> {
        let caps = tx.capabilities();
        let mut desired: Vec<(EntityId, Vec<Value>)> = Vec::new();
        let mut desired_set: HashSet<(EntityId, Vec<Value>)> = HashSet::new();
        let mut present: HashSet<(EntityId, Vec<Value>)> = HashSet::new();
        let mut stale: Vec<(EntityId, Vec<Value>)> = Vec::new();

        for link in &plan.junction_links {
            let junction = self.registry.entity(link.junction);
            let info = junction.junction.as_ref().ok_or_else(|| {
                Error::InvalidGraph(format!("'{}' is not a junction table", junction.table_name))
            })?;
            let (anchor_columns, target_columns) = if link.anchor_is_owner {
                (&info.owner_columns, &info.inverse_columns)
            } else {
                (&info.inverse_columns, &info.owner_columns)
            };
            let anchor_key = junction_values(graph, junction, link.anchor, anchor_columns)?;

            let mut rows = Vec::with_capacity(link.targets.len());
            for target in &link.targets {
                let target_key = junction_values(graph, junction, *target, target_columns)?;
                let row = if link.anchor_is_owner {
                    [anchor_key.clone(), target_key].concat()
                } else {
                    [target_key, anchor_key.clone()].concat()
                };
                rows.push(row);
            }

            if link.anchor_exists {
                let all: Vec<String> = info.owner_columns.iter().chain(&info.inverse_columns).cloned().collect();
                let sql = render_select(&junction.table_name, &all, anchor_columns, &[], caps);
                for existing in tx.query(&sql, &anchor_key)? {
                    let existing = existing.values().to_vec();
                    if !rows.contains(&existing) {
                        stale.push((junction.id, existing.clone()));
                    }
                    present.insert((junction.id, existing));
                }
            }
            for row in rows {
                if desired_set.insert((junction.id, row.clone())) {
                    desired.push((junction.id, row));
                }
            }
        }

        let mut removed = 0;
        let mut removed_set = HashSet::new();
        for (junction, row) in stale {
            if desired_set.contains(&(junction, row.clone())) || !removed_set.insert((junction, row.clone())) {
                continue;
            }
            let entity = self.registry.entity(junction);
            let sql = render_delete(&entity.table_name, &junction_columns(entity), caps);
            tx.execute(&sql, &row)?;
            self.record(tx, &entity.table_name, WriteKind::Delete);
            removed += 1;
        }

        let mut inserted = 0;
        for (junction, row) in desired {
            if present.contains(&(junction, row.clone())) {
                continue;
            }
            let entity = self.registry.entity(junction);
            let sql = render_insert(entity, &junction_columns(entity), &[], caps);
            tx.execute(&sql, &row)?;
            self.record(tx, &entity.table_name, WriteKind::Insert);
            inserted += 1;
        }
        if inserted + removed > 0 {
            if let Some(metrics) = tx.metrics() {
                metrics.record_junction_rows((inserted + removed) as u64);
            }
        }
        Ok((inserted, removed))
    }

    /// Column values to write for a planned node: its own values plus
    /// assigned join columns.
    fn row_values(
        &self,
        graph: &ObjectGraph,
        plan: &WritePlan,
        node: NodeId,
        entity: &EntityMetadata,
        postponed: &HashSet<(NodeId, usize)>,
    ) -> Result<BTreeMap<String, Value>, Error> {
        let object = graph.node(node)?;
        if let Some(unknown) = object.values.keys().find(|k| entity.column(k).is_none()) {
            return Err(Error::InvalidGraph(format!(
                "'{}' has no column '{}'",
                entity.name, unknown
            )));
        }
        let mut row = object.values.clone();
        for (position, assignment) in plan.assignments_of(node).iter().enumerate() {
            if postponed.contains(&(node, position)) {
                row.extend(assignment.columns.iter().map(|jc| (jc.name.clone(), Value::Null)));
            } else {
                row.extend(self.assigned_values(graph, assignment)?);
            }
        }
        Ok(row)
    }

    fn assigned_values(&self, graph: &ObjectGraph, assignment: &Assignment) -> Result<Vec<(String, Value)>, Error> {
        let Some(source) = assignment.source else {
            return Ok(assignment
                .columns
                .iter()
                .map(|jc| (jc.name.clone(), Value::Null))
                .collect());
        };
        let object = graph.node(source)?;
        assignment
            .columns
            .iter()
            .map(|jc| {
                let value = object
                    .get(&jc.referenced_column)
                    .filter(|v| !v.is_null())
                    .cloned()
                    .ok_or_else(|| {
                        Error::InvalidGraph(format!(
                            "'{}.{}' is not known when a row referencing it is written",
                            object.entity, jc.referenced_column
                        ))
                    })?;
                Ok((jc.name.clone(), value))
            })
            .collect()
    }

    fn record(&self, tx: &Transaction<'_>, table: &str, kind: WriteKind) {
        if let Some(metrics) = tx.metrics() {
            metrics.record_write(table, kind);
        }
    }

    fn cycle(&self, tx: &Transaction<'_>, entities: impl Iterator<Item = EntityId>) -> Error {
        let mut names: Vec<String> = entities.map(|id| self.registry.entity(id).name.clone()).collect();
        names.sort();
        names.dedup();
        warn!(entities = ?names, "cascade writes cannot be ordered");
        self.order_failure(tx, CascadeOrderError::Cycle { entities: names }.into())
    }

    fn order_failure(&self, tx: &Transaction<'_>, error: Error) -> Error {
        if matches!(error, Error::CascadeOrder(_)) {
            if let Some(metrics) = tx.metrics() {
                metrics.record_cascade_order_failure();
            }
        }
        error
    }
}

fn junction_columns(junction: &EntityMetadata) -> Vec<String> {
    junction.columns.iter().map(|c| c.name.clone()).collect()
}

/// Values of a node's key in the order of one junction side's columns.
fn junction_values(
    graph: &ObjectGraph,
    junction: &EntityMetadata,
    node: NodeId,
    columns: &[String],
) -> Result<Vec<Value>, Error> {
    let object = graph.node(node)?;
    columns
        .iter()
        .map(|name| {
            let referenced = junction
                .column(name)
                .and_then(|c| c.references.as_ref())
                .map(|r| r.column.as_str())
                .unwrap_or(name.as_str());
            object
                .get(referenced)
                .filter(|v| !v.is_null())
                .cloned()
                .ok_or_else(|| {
                    Error::InvalidGraph(format!(
                        "'{}' object has no '{}' to link through '{}'",
                        object.entity, referenced, junction.table_name
                    ))
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{
        build_metadata, CascadeSet, ColumnDecl, ColumnType, DeferrableMode, EntityDecl, Generation, RelationDecl,
    };
    use crate::connection::mock::MockConnection;
    use crate::connection::Row;
    use crate::dialect::DialectKind;
    use crate::metrics::new_shared_metrics;
    use crate::persistence::{EntityObject, Related};

    fn authors() -> MetadataRegistry {
        build_metadata(&[
            EntityDecl::new("Author")
                .with_column(ColumnDecl::generated("id", ColumnType::Integer, Generation::Increment))
                .with_column(ColumnDecl::new("name", ColumnType::Text))
                .with_relation(
                    RelationDecl::one_to_many("books", "Book", "author").cascade(CascadeSet::all()),
                ),
            EntityDecl::new("Book")
                .with_column(ColumnDecl::generated("id", ColumnType::Integer, Generation::Increment))
                .with_column(ColumnDecl::new("title", ColumnType::Text))
                .with_relation(RelationDecl::many_to_one("author", "Author").inverse("books")),
        ])
        .unwrap()
    }

    /// Department and Employee reference each other and cascade inserts
    /// both ways.
    fn departments(mode: Option<DeferrableMode>, generated: bool) -> MetadataRegistry {
        let key = |name: &str| {
            if generated {
                ColumnDecl::generated(name, ColumnType::Integer, Generation::Increment)
            } else {
                ColumnDecl::primary(name, ColumnType::Integer)
            }
        };
        let mut manager = RelationDecl::one_to_one("manager", "Employee")
            .owning()
            .cascade(CascadeSet::save());
        let mut department = RelationDecl::many_to_one("department", "Department").cascade(CascadeSet::save());
        if let Some(mode) = mode {
            manager = manager.deferrable(mode);
            department = department.deferrable(mode);
        }
        build_metadata(&[
            EntityDecl::new("Department").with_column(key("id")).with_relation(manager),
            EntityDecl::new("Employee").with_column(key("id")).with_relation(department),
        ])
        .unwrap()
    }

    fn department_graph(with_keys: bool) -> (ObjectGraph, NodeId) {
        let mut graph = ObjectGraph::new();
        let mut department = EntityObject::new("Department");
        let mut employee = EntityObject::new("Employee");
        if with_keys {
            department = department.with_value("id", 10);
            employee = employee.with_value("id", 20);
        }
        let department = graph.add(department);
        let employee = graph.add(employee.with_one("department", Some(department)));
        graph.set_related(department, "manager", Related::One(Some(employee))).unwrap();
        (graph, department)
    }

    #[test]
    fn test_parent_inserted_before_children() {
        let registry = authors();
        let config = EngineConfig::default();
        let mut conn = MockConnection::new(DialectKind::Sqlite);

        let mut graph = ObjectGraph::new();
        let first = graph.add(EntityObject::new("Book").with_value("title", "One"));
        let second = graph.add(EntityObject::new("Book").with_value("title", "Two"));
        let author = graph.add(
            EntityObject::new("Author")
                .with_value("name", "Ann")
                .with_many("books", vec![first, second]),
        );

        let saved = {
            let mut tx = Transaction::begin(&mut conn).unwrap();
            let saved = Persister::new(&registry, &config)
                .save(&mut graph, author, &SaveOptions::new(), &mut tx)
                .unwrap();
            tx.commit().unwrap();
            saved
        };

        assert_eq!(saved.inserted, vec![author, first, second]);
        assert_eq!(
            conn.writes(),
            vec![
                "INSERT INTO \"author\" (\"name\") VALUES (?) RETURNING \"id\"",
                "INSERT INTO \"book\" (\"title\", \"author_id\") VALUES (?, ?) RETURNING \"id\"",
                "INSERT INTO \"book\" (\"title\", \"author_id\") VALUES (?, ?) RETURNING \"id\"",
            ]
        );
        assert_eq!(conn.params(1), &[Value::from("One"), Value::Int(1)]);
        assert_eq!(graph.get(author).unwrap().get("id"), Some(&Value::Int(1)));
        assert_eq!(graph.get(second).unwrap().get("id"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_cycle_without_deferral_is_rejected() {
        let registry = departments(None, true);
        let config = EngineConfig::default();
        let metrics = new_shared_metrics();
        let mut conn = MockConnection::new(DialectKind::MySql);
        let (mut graph, root) = department_graph(false);

        {
            let mut tx = Transaction::begin(&mut conn).unwrap().with_metrics(metrics.clone());
            let err = Persister::new(&registry, &config)
                .save(&mut graph, root, &SaveOptions::new(), &mut tx)
                .unwrap_err();
            match err {
                Error::CascadeOrder(CascadeOrderError::Cycle { entities }) => {
                    assert_eq!(entities, vec!["Department".to_string(), "Employee".to_string()]);
                }
                other => panic!("unexpected error: {other}"),
            }
        }

        assert!(conn.writes().is_empty());
        assert_eq!(conn.control_log(), vec!["BEGIN", "ROLLBACK"]);
        assert_eq!(metrics.snapshot().cascade_order_failures, 1);
    }

    #[test]
    fn test_deferred_keys_break_cycle() {
        let registry = departments(Some(DeferrableMode::InitiallyDeferred), false);
        let config = EngineConfig::default();
        let mut conn = MockConnection::new(DialectKind::Postgres);
        let (mut graph, root) = department_graph(true);

        {
            let mut tx = Transaction::begin(&mut conn).unwrap();
            let saved = Persister::new(&registry, &config)
                .save(&mut graph, root, &SaveOptions::new(), &mut tx)
                .unwrap();
            assert_eq!(saved.inserted.len(), 2);
            tx.commit().unwrap();
        }

        assert_eq!(
            conn.writes(),
            vec![
                "INSERT INTO \"department\" (\"id\", \"manager_id\") VALUES ($1, $2)",
                "INSERT INTO \"employee\" (\"id\", \"department_id\") VALUES ($1, $2)",
            ]
        );
    }

    #[test]
    fn test_strict_ordering_keeps_cycle() {
        let registry = departments(Some(DeferrableMode::InitiallyDeferred), false);
        let config = EngineConfig::default().strict_ordering();
        let mut conn = MockConnection::new(DialectKind::Postgres);
        let (mut graph, root) = department_graph(true);

        let mut tx = Transaction::begin(&mut conn).unwrap();
        let err = Persister::new(&registry, &config)
            .save(&mut graph, root, &SaveOptions::new(), &mut tx)
            .unwrap_err();
        assert!(matches!(err, Error::CascadeOrder(CascadeOrderError::Cycle { .. })));
    }

    #[test]
    fn test_generated_keys_cycle_sets_reference_after_insert() {
        let registry = departments(Some(DeferrableMode::InitiallyDeferred), true);
        let config = EngineConfig::default();
        let mut conn = MockConnection::new(DialectKind::Postgres);
        let (mut graph, department) = department_graph(false);
        let employee = graph.get(department).unwrap().related("manager").unwrap().nodes()[0];

        {
            let mut tx = Transaction::begin(&mut conn).unwrap();
            let saved = Persister::new(&registry, &config)
                .save(&mut graph, department, &SaveOptions::new(), &mut tx)
                .unwrap();
            assert_eq!(saved.inserted, vec![department, employee]);
            assert_eq!(saved.deferred_links, 1);
            tx.commit().unwrap();
        }

        assert_eq!(
            conn.writes(),
            vec![
                "INSERT INTO \"department\" (\"manager_id\") VALUES ($1) RETURNING \"id\"",
                "INSERT INTO \"employee\" (\"department_id\") VALUES ($1) RETURNING \"id\"",
                "UPDATE \"department\" SET \"manager_id\" = $1 WHERE \"id\" = $2",
            ]
        );
        assert_eq!(conn.params(0), &[Value::Null]);
        assert_eq!(conn.params(1), &[Value::Int(1)]);
        assert_eq!(conn.params(2), &[Value::Int(2), Value::Int(1)]);
    }

    #[test]
    fn test_failed_save_clears_generated_keys() {
        let registry = authors();
        let config = EngineConfig::default();
        let mut conn = MockConnection::new(DialectKind::Sqlite);

        let mut graph = ObjectGraph::new();
        let book = graph.add(EntityObject::new("Book").with_value("subtitle", "Two"));
        let author = graph.add(
            EntityObject::new("Author")
                .with_value("name", "Ann")
                .with_many("books", vec![book]),
        );

        let mut tx = Transaction::begin(&mut conn).unwrap();
        let err = Persister::new(&registry, &config)
            .save(&mut graph, author, &SaveOptions::new(), &mut tx)
            .unwrap_err();
        drop(tx);

        assert!(err.to_string().contains("subtitle"));
        assert_eq!(conn.writes().len(), 1);
        assert_eq!(graph.get(author).unwrap().get("id"), Some(&Value::Null));
    }

    #[test]
    fn test_junction_row_for_unsaved_reference() {
        let registry = build_metadata(&[
            EntityDecl::new("Post")
                .with_column(ColumnDecl::primary("id", ColumnType::Integer))
                .with_relation(
                    RelationDecl::many_to_many("categories", "Category")
                        .owning()
                        .deferrable(DeferrableMode::InitiallyDeferred),
                ),
            EntityDecl::new("Category").with_column(ColumnDecl::primary("id", ColumnType::Integer)),
        ])
        .unwrap();
        let config = EngineConfig::default();
        let mut conn = MockConnection::new(DialectKind::Postgres);

        let mut graph = ObjectGraph::new();
        let category = graph.add(EntityObject::new("Category").with_value("id", 100));
        let post = graph.add(
            EntityObject::new("Post")
                .with_value("id", 1)
                .with_many("categories", vec![category, category]),
        );

        let mut tx = Transaction::begin(&mut conn).unwrap();
        let saved = Persister::new(&registry, &config)
            .save(&mut graph, post, &SaveOptions::new(), &mut tx)
            .unwrap();
        tx.commit().unwrap();

        assert_eq!(saved.inserted, vec![post]);
        assert_eq!(saved.junction_rows_inserted, 1);
        assert_eq!(
            conn.writes(),
            vec![
                "INSERT INTO \"post\" (\"id\") VALUES ($1)",
                "INSERT INTO \"category_post\" (\"post_id\", \"category_id\") VALUES ($1, $2)",
            ]
        );
        let last = conn.statements().len() - 1;
        assert_eq!(conn.params(last), &[Value::Int(1), Value::Int(100)]);
    }

    #[test]
    fn test_existing_anchor_diffs_junction_rows() {
        let registry = build_metadata(&[
            EntityDecl::new("Post")
                .with_column(ColumnDecl::primary("id", ColumnType::Integer))
                .with_relation(RelationDecl::many_to_many("categories", "Category").owning()),
            EntityDecl::new("Category").with_column(ColumnDecl::primary("id", ColumnType::Integer)),
        ])
        .unwrap();
        let config = EngineConfig::default();
        let existing_links = vec![
            Row::new(vec!["post_id".into(), "category_id".into()], vec![Value::Int(1), Value::Int(7)]),
            Row::new(vec!["post_id".into(), "category_id".into()], vec![Value::Int(1), Value::Int(8)]),
        ];
        let mut conn = MockConnection::new(DialectKind::Postgres)
            .respond(
                "SELECT \"id\" FROM \"post\"",
                vec![Row::new(vec!["id".into()], vec![Value::Int(1)])],
            )
            .respond("SELECT \"post_id\", \"category_id\" FROM \"category_post\"", existing_links);

        let mut graph = ObjectGraph::new();
        let kept = graph.add(EntityObject::new("Category").with_value("id", 8));
        let added = graph.add(EntityObject::new("Category").with_value("id", 9));
        let post = graph.add(
            EntityObject::new("Post")
                .with_value("id", 1)
                .with_many("categories", vec![kept, added]),
        );

        let mut tx = Transaction::begin(&mut conn).unwrap();
        let saved = Persister::new(&registry, &config)
            .save(&mut graph, post, &SaveOptions::new(), &mut tx)
            .unwrap();
        tx.commit().unwrap();

        assert!(saved.inserted.is_empty());
        assert!(saved.updated.is_empty());
        assert_eq!(saved.junction_rows_removed, 1);
        assert_eq!(saved.junction_rows_inserted, 1);
        assert_eq!(
            conn.writes(),
            vec![
                "DELETE FROM \"category_post\" WHERE \"post_id\" = $1 AND \"category_id\" = $2",
                "INSERT INTO \"category_post\" (\"post_id\", \"category_id\") VALUES ($1, $2)",
            ]
        );
    }

    #[test]
    fn test_max_depth() {
        let registry = authors();
        let config = EngineConfig::default().with_max_cascade_depth(0);
        let mut conn = MockConnection::new(DialectKind::Sqlite);

        let mut graph = ObjectGraph::new();
        let book = graph.add(EntityObject::new("Book").with_value("title", "One"));
        let author = graph.add(EntityObject::new("Author").with_many("books", vec![book]));

        let mut tx = Transaction::begin(&mut conn).unwrap();
        let err = Persister::new(&registry, &config)
            .save(&mut graph, author, &SaveOptions::new(), &mut tx)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::CascadeOrder(CascadeOrderError::MaxDepthExceeded { max_depth: 0 })
        ));
    }

    #[test]
    fn test_reference_without_key_is_rejected() {
        let registry = authors();
        let config = EngineConfig::default();
        let mut conn = MockConnection::new(DialectKind::Sqlite);

        let mut graph = ObjectGraph::new();
        let author = graph.add(EntityObject::new("Author").with_value("name", "Ann"));
        let book = graph.add(EntityObject::new("Book").with_one("author", Some(author)));

        let mut tx = Transaction::begin(&mut conn).unwrap();
        let err = Persister::new(&registry, &config)
            .save(&mut graph, book, &SaveOptions::new(), &mut tx)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidGraph(_)));

        let options = SaveOptions::new().with_cascade(CascadeSet::save());
        let saved = Persister::new(&registry, &config)
            .save(&mut graph, book, &options, &mut tx)
            .unwrap();
        assert_eq!(saved.inserted, vec![author, book]);
    }

    #[test]
    fn test_unknown_column_is_rejected() {
        let registry = authors();
        let config = EngineConfig::default();
        let mut conn = MockConnection::new(DialectKind::Sqlite);

        let mut graph = ObjectGraph::new();
        let author = graph.add(EntityObject::new("Author").with_value("nickname", "A"));

        let mut tx = Transaction::begin(&mut conn).unwrap();
        let err = Persister::new(&registry, &config)
            .save(&mut graph, author, &SaveOptions::new(), &mut tx)
            .unwrap_err();
        assert!(err.to_string().contains("nickname"));
    }

    #[test]
    fn test_remove_children_first() {
        let registry = authors();
        let config = EngineConfig::default();
        let metrics = new_shared_metrics();
        let mut conn = MockConnection::new(DialectKind::Sqlite);

        let mut graph = ObjectGraph::new();
        let book = graph.add(EntityObject::new("Book").with_value("id", 5));
        let author = graph.add(
            EntityObject::new("Author")
                .with_value("id", 2)
                .with_many("books", vec![book]),
        );

        let mut tx = Transaction::begin(&mut conn).unwrap().with_metrics(metrics.clone());
        let removed = Persister::new(&registry, &config)
            .remove(&mut graph, author, &mut tx)
            .unwrap();
        tx.commit().unwrap();

        assert_eq!(removed.removed, vec![book, author]);
        assert_eq!(
            conn.writes(),
            vec!["DELETE FROM \"book\" WHERE \"id\" = ?", "DELETE FROM \"author\" WHERE \"id\" = ?"]
        );
        assert_eq!(graph.get(author).unwrap().get("id"), Some(&Value::Null));
        assert_eq!(metrics.snapshot().deletes, 2);
    }
}
