//! In-memory object graphs handed to the persistence engine.

use std::collections::BTreeMap;

use crate::connection::Value;
use crate::error::Error;

/// Handle to an object inside an [`ObjectGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Position in the arena.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Contents of a relation slot.
///
/// A slot that is absent from [`EntityObject::relations`] was never loaded
/// and is left untouched by a save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Related {
    /// Single-valued side; `None` clears the reference.
    One(Option<NodeId>),
    /// Collection side.
    Many(Vec<NodeId>),
}

impl Related {
    /// Nodes referenced by the slot.
    pub fn nodes(&self) -> Vec<NodeId> {
        match self {
            Related::One(node) => node.iter().copied().collect(),
            Related::Many(nodes) => nodes.clone(),
        }
    }
}

/// One entity instance: column values plus loaded relation slots.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntityObject {
    /// Entity name.
    pub entity: String,
    /// Column values by column name.
    pub values: BTreeMap<String, Value>,
    /// Relation slots by property name.
    pub relations: BTreeMap<String, Related>,
}

impl EntityObject {
    /// Create an empty object of an entity type.
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            ..Default::default()
        }
    }

    /// Set a column value.
    pub fn with_value(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(column.into(), value.into());
        self
    }

    /// Set a single-valued relation slot.
    pub fn with_one(mut self, property: impl Into<String>, node: Option<NodeId>) -> Self {
        self.relations.insert(property.into(), Related::One(node));
        self
    }

    /// Set a collection relation slot.
    pub fn with_many(mut self, property: impl Into<String>, nodes: Vec<NodeId>) -> Self {
        self.relations.insert(property.into(), Related::Many(nodes));
        self
    }

    /// Get a column value.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    /// Set a column value.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(column.into(), value.into());
    }

    /// Get a relation slot.
    pub fn related(&self, property: &str) -> Option<&Related> {
        self.relations.get(property)
    }
}

/// Arena of entity objects linked by [`NodeId`].
#[derive(Debug, Clone, Default)]
pub struct ObjectGraph {
    nodes: Vec<EntityObject>,
}

impl ObjectGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an object and return its handle.
    pub fn add(&mut self, object: EntityObject) -> NodeId {
        self.nodes.push(object);
        NodeId(self.nodes.len() - 1)
    }

    /// Get an object.
    pub fn get(&self, id: NodeId) -> Option<&EntityObject> {
        self.nodes.get(id.0)
    }

    /// Get an object mutably.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut EntityObject> {
        self.nodes.get_mut(id.0)
    }

    /// Replace a relation slot.
    pub fn set_related(&mut self, id: NodeId, property: impl Into<String>, related: Related) -> Result<(), Error> {
        self.node_mut(id)?.relations.insert(property.into(), related);
        Ok(())
    }

    /// Append to a collection slot, creating it when absent.
    pub fn push_related(&mut self, id: NodeId, property: impl Into<String>, child: NodeId) -> Result<(), Error> {
        let property = property.into();
        let node = self.node_mut(id)?;
        match node
            .relations
            .entry(property.clone())
            .or_insert_with(|| Related::Many(Vec::new()))
        {
            Related::Many(children) => {
                children.push(child);
                Ok(())
            }
            Related::One(_) => Err(Error::InvalidGraph(format!(
                "'{}.{}' is not a collection",
                node.entity, property
            ))),
        }
    }

    /// Set a column value.
    pub fn set_value(&mut self, id: NodeId, column: impl Into<String>, value: impl Into<Value>) -> Result<(), Error> {
        self.node_mut(id)?.set(column, value);
        Ok(())
    }

    /// Number of objects.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no objects.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) fn node(&self, id: NodeId) -> Result<&EntityObject, Error> {
        self.nodes
            .get(id.0)
            .ok_or_else(|| Error::InvalidGraph(format!("unknown node {}", id.0)))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut EntityObject, Error> {
        self.nodes
            .get_mut(id.0)
            .ok_or_else(|| Error::InvalidGraph(format!("unknown node {}", id.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_graph() {
        let mut graph = ObjectGraph::new();
        let category = graph.add(EntityObject::new("Category").with_value("id", 100).with_value("name", "News"));
        let post = graph.add(
            EntityObject::new("Post")
                .with_value("id", 1)
                .with_many("categories", vec![category]),
        );

        assert_eq!(graph.len(), 2);
        assert_eq!(graph.get(post).unwrap().get("id"), Some(&Value::Int(1)));
        assert_eq!(
            graph.get(post).unwrap().related("categories").unwrap().nodes(),
            vec![category]
        );
        assert!(graph.get(post).unwrap().related("author").is_none());
    }

    #[test]
    fn test_push_related() {
        let mut graph = ObjectGraph::new();
        let author = graph.add(EntityObject::new("Author"));
        let book = graph.add(EntityObject::new("Book").with_one("author", Some(author)));

        graph.push_related(author, "books", book).unwrap();
        assert_eq!(graph.get(author).unwrap().related("books"), Some(&Related::Many(vec![book])));

        let err = graph.push_related(book, "author", author).unwrap_err();
        assert!(matches!(err, Error::InvalidGraph(_)));
        assert!(graph.set_value(NodeId(9), "id", 1).is_err());
    }
}
