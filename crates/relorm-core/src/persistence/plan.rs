//! Cascade collection and link planning for a save.

use std::collections::{BTreeMap, HashMap, VecDeque};

use tracing::trace;

use crate::catalog::{
    CascadeSet, DeferrableMode, EntityId, EntityMetadata, Generation, JoinColumn, MetadataRegistry,
    RelationId, RelationMetadata,
};
use crate::config::EngineConfig;
use crate::connection::{Transaction, Value};
use crate::dialect::render_select;
use crate::error::{CascadeOrderError, Error};

use super::graph::{EntityObject, NodeId, ObjectGraph, Related};

/// Options for one save call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveOptions {
    /// Cascade applied to every relation walked, replacing the declared one.
    pub cascade: Option<CascadeSet>,
}

impl SaveOptions {
    /// Use the declared cascades.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the cascade of every relation.
    pub fn with_cascade(mut self, cascade: CascadeSet) -> Self {
        self.cascade = Some(cascade);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteAction {
    Insert,
    Update,
}

#[derive(Debug, Clone)]
pub(crate) struct PlannedWrite {
    pub node: NodeId,
    pub entity: EntityId,
    pub action: WriteAction,
    /// Primary key values were known before the write.
    pub identity_known: bool,
}

/// Join columns of a node taking their values from another node's key.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Assignment {
    pub columns: Vec<JoinColumn>,
    /// `None` writes null.
    pub source: Option<NodeId>,
    pub deferrable: Option<DeferrableMode>,
}

/// Children of a loaded one-to-many slot on an existing row.
#[derive(Debug, Clone)]
pub(crate) struct OrphanCheck {
    pub anchor: NodeId,
    pub relation: RelationId,
    pub children: Vec<NodeId>,
}

/// Loaded many-to-many slot.
#[derive(Debug, Clone)]
pub(crate) struct JunctionLink {
    pub junction: EntityId,
    pub anchor: NodeId,
    pub anchor_is_owner: bool,
    pub anchor_exists: bool,
    pub targets: Vec<NodeId>,
}

/// Everything a save has to write, before ordering.
#[derive(Debug, Default)]
pub(crate) struct WritePlan {
    /// Planned rows in discovery order.
    pub writes: Vec<PlannedWrite>,
    pub assignments: BTreeMap<NodeId, Vec<Assignment>>,
    pub orphan_checks: Vec<OrphanCheck>,
    pub junction_links: Vec<JunctionLink>,
    planned: HashMap<NodeId, usize>,
    references: HashMap<NodeId, EntityId>,
    aliases: HashMap<NodeId, NodeId>,
}

impl WritePlan {
    pub fn position(&self, node: NodeId) -> Option<usize> {
        self.planned.get(&node).copied()
    }

    /// Node standing for the same row as `node`.
    pub fn canonical(&self, node: NodeId) -> NodeId {
        self.aliases.get(&node).copied().unwrap_or(node)
    }

    pub fn assignments_of(&self, node: NodeId) -> &[Assignment] {
        self.assignments.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Assigned nodes that are not written themselves.
    pub fn relinks(&self) -> impl Iterator<Item = (NodeId, EntityId, &[Assignment])> {
        self.assignments.iter().filter_map(move |(node, assignments)| {
            if self.planned.contains_key(node) {
                return None;
            }
            self.references
                .get(node)
                .map(|entity| (*node, *entity, assignments.as_slice()))
        })
    }
}

/// Walk the graph from `root` and build the write plan.
pub(crate) fn plan_save(
    registry: &MetadataRegistry,
    config: &EngineConfig,
    options: &SaveOptions,
    graph: &mut ObjectGraph,
    root: NodeId,
    tx: &mut Transaction<'_>,
) -> Result<WritePlan, Error> {
    let mut collector = Collector {
        registry,
        config,
        options,
        plan: WritePlan::default(),
        identities: HashMap::new(),
        queue: VecDeque::new(),
    };
    collector.collect(graph, root, tx)?;
    collector.link(graph)?;
    Ok(collector.plan)
}

/// Primary key values of an object, if all are set.
pub(crate) fn primary_key(object: &EntityObject, entity: &EntityMetadata) -> Option<Vec<Value>> {
    entity
        .primary_columns()
        .map(|c| object.get(&c.name).filter(|v| !v.is_null()).cloned())
        .collect()
}

/// Resolve a node to its entity, checking it against an expected one.
pub(crate) fn entity_of<'r>(
    registry: &'r MetadataRegistry,
    graph: &ObjectGraph,
    node: NodeId,
    expected: Option<&EntityMetadata>,
) -> Result<&'r EntityMetadata, Error> {
    let object = graph.node(node)?;
    let entity = registry
        .entity_by_name(&object.entity)
        .filter(|e| !e.is_junction())
        .ok_or_else(|| Error::InvalidGraph(format!("unknown entity '{}'", object.entity)))?;
    if let Some(expected) = expected {
        if expected.id != entity.id {
            return Err(Error::InvalidGraph(format!(
                "expected a '{}' object but found '{}'",
                expected.name, entity.name
            )));
        }
    }
    Ok(entity)
}

/// Check a slot's shape against its relation.
pub(crate) fn slot_nodes(
    object: &EntityObject,
    relation: &RelationMetadata,
) -> Result<Option<Vec<NodeId>>, Error> {
    let Some(slot) = object.related(&relation.property) else {
        return Ok(None);
    };
    match (slot, relation.kind.is_to_many()) {
        (Related::Many(_), true) | (Related::One(_), false) => Ok(Some(slot.nodes())),
        _ => Err(Error::InvalidGraph(format!(
            "slot '{}.{}' does not match its {} relation",
            object.entity, relation.property, relation.kind
        ))),
    }
}

struct Collector<'r> {
    registry: &'r MetadataRegistry,
    config: &'r EngineConfig,
    options: &'r SaveOptions,
    plan: WritePlan,
    identities: HashMap<(EntityId, Vec<Value>), NodeId>,
    queue: VecDeque<(NodeId, usize)>,
}

impl<'r> Collector<'r> {
    fn collect(&mut self, graph: &mut ObjectGraph, root: NodeId, tx: &mut Transaction<'_>) -> Result<(), Error> {
        let registry = self.registry;
        let entity = entity_of(registry, graph, root, None)?;
        self.visit(graph, tx, root, entity, None, 0)?;

        while let Some((node, depth)) = self.queue.pop_front() {
            let entity = entity_of(registry, graph, node, None)?;
            for relation in registry.relations_of(entity.id) {
                let Some(targets) = slot_nodes(graph.node(node)?, relation)? else {
                    continue;
                };
                let target_entity = registry.entity(relation.target);
                let cascade = self.options.cascade.unwrap_or(relation.cascade);
                for target in targets {
                    entity_of(registry, graph, target, Some(target_entity))?;
                    self.visit(graph, tx, target, target_entity, Some(cascade), depth + 1)?;
                }
            }
        }
        Ok(())
    }

    /// Classify one node. `cascade` is `None` for the root, which is always
    /// written.
    fn visit(
        &mut self,
        graph: &mut ObjectGraph,
        tx: &mut Transaction<'_>,
        node: NodeId,
        entity: &'r EntityMetadata,
        cascade: Option<CascadeSet>,
        depth: usize,
    ) -> Result<(), Error> {
        let node = self.plan.canonical(node);
        if self.plan.planned.contains_key(&node) {
            return Ok(());
        }

        let key = primary_key(graph.node(node)?, entity);
        if let Some(key) = &key {
            if let Some(&existing) = self.identities.get(&(entity.id, key.clone())) {
                if existing != node {
                    self.plan.aliases.insert(node, existing);
                    return self.visit(graph, tx, existing, entity, cascade, depth);
                }
            }
        }

        let wants_insert = cascade.map_or(true, |c| c.insert);
        let wants_update = cascade.map_or(true, |c| c.update);
        let action = match &key {
            Some(key) if wants_insert || wants_update => {
                if self.exists(tx, entity, key)? {
                    wants_update.then_some(WriteAction::Update)
                } else {
                    wants_insert.then_some(WriteAction::Insert)
                }
            }
            Some(_) => None,
            None if wants_insert => {
                fill_generated_key(graph.node_mut(node)?, entity)?;
                Some(WriteAction::Insert)
            }
            None => {
                return Err(Error::InvalidGraph(format!(
                    "'{}' object without a primary key is referenced through a relation that does not cascade inserts",
                    entity.name
                )))
            }
        };

        let key = primary_key(graph.node(node)?, entity);
        let identity_known = key.is_some();
        if let Some(key) = key {
            self.identities.insert((entity.id, key), node);
        }

        let Some(action) = action else {
            trace!(entity = %entity.name, node = node.index(), "reference");
            self.plan.references.insert(node, entity.id);
            return Ok(());
        };

        if depth > self.config.max_cascade_depth {
            return Err(CascadeOrderError::MaxDepthExceeded {
                max_depth: self.config.max_cascade_depth,
            }
            .into());
        }
        trace!(entity = %entity.name, node = node.index(), ?action, depth, "planned");
        self.plan.references.remove(&node);
        self.plan.planned.insert(node, self.plan.writes.len());
        self.plan.writes.push(PlannedWrite {
            node,
            entity: entity.id,
            action,
            identity_known,
        });
        self.queue.push_back((node, depth));
        Ok(())
    }

    fn exists(&self, tx: &mut Transaction<'_>, entity: &EntityMetadata, key: &[Value]) -> Result<bool, Error> {
        let primary = entity.primary_column_names();
        let sql = render_select(&entity.table_name, &primary, &primary, &[], tx.capabilities());
        Ok(!tx.query(&sql, key)?.is_empty())
    }

    fn link(&mut self, graph: &ObjectGraph) -> Result<(), Error> {
        let registry = self.registry;
        for index in 0..self.plan.writes.len() {
            let PlannedWrite {
                node,
                entity,
                action,
                ..
            } = self.plan.writes[index].clone();

            for relation in registry.relations_of(entity) {
                let Some(targets) = slot_nodes(graph.node(node)?, relation)? else {
                    continue;
                };
                let targets: Vec<NodeId> = targets.into_iter().map(|n| self.plan.canonical(n)).collect();
                let deferrable = registry
                    .foreign_key_for_relation(relation)
                    .and_then(|fk| fk.deferrable);

                if relation.has_join_columns() {
                    let assignment = Assignment {
                        columns: relation.join_columns.clone(),
                        source: targets.first().copied(),
                        deferrable,
                    };
                    self.assign(graph, node, assignment)?;
                } else if relation.is_referenced_by_target() {
                    let inverse = relation.inverse.map(|id| registry.relation(id)).ok_or_else(|| {
                        Error::InvalidGraph(format!("'{}' has no owning side", relation.property))
                    })?;
                    for &child in &targets {
                        let assignment = Assignment {
                            columns: inverse.join_columns.clone(),
                            source: Some(node),
                            deferrable,
                        };
                        self.assign(graph, child, assignment)?;
                    }
                    if action == WriteAction::Update {
                        self.plan.orphan_checks.push(OrphanCheck {
                            anchor: node,
                            relation: relation.id,
                            children: targets,
                        });
                    }
                } else if let Some(junction) = relation.junction {
                    self.plan.junction_links.push(JunctionLink {
                        junction,
                        anchor: node,
                        anchor_is_owner: relation.owning,
                        anchor_exists: action == WriteAction::Update,
                        targets,
                    });
                }
            }
        }
        Ok(())
    }

    fn assign(&mut self, graph: &ObjectGraph, node: NodeId, assignment: Assignment) -> Result<(), Error> {
        let assigned = self.plan.assignments.entry(node).or_default();
        for previous in assigned.iter() {
            let Some(column) = previous
                .columns
                .iter()
                .find(|c| assignment.columns.iter().any(|a| a.name == c.name))
            else {
                continue;
            };
            if previous.source == assignment.source && previous.columns == assignment.columns {
                return Ok(());
            }
            return Err(Error::InvalidGraph(format!(
                "'{}.{}' is linked to two different objects",
                graph.node(node)?.entity,
                column.name
            )));
        }
        assigned.push(assignment);
        Ok(())
    }
}

fn fill_generated_key(object: &mut EntityObject, entity: &EntityMetadata) -> Result<(), Error> {
    for column in entity.primary_columns() {
        if object.get(&column.name).is_some_and(|v| !v.is_null()) {
            continue;
        }
        match column.generation {
            Some(Generation::Uuid) => object.set(column.name.clone(), uuid::Uuid::new_v4().to_string()),
            Some(Generation::Increment) => {}
            None => {
                return Err(Error::InvalidGraph(format!(
                    "'{}' object has no value for primary column '{}'",
                    entity.name, column.name
                )))
            }
        }
    }
    Ok(())
}
