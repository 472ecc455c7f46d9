//! Sessions: a connection bound to metadata and configuration.

use std::sync::Arc;

use tracing::{error, info, instrument};

use crate::catalog::MetadataRegistry;
use crate::config::EngineConfig;
use crate::connection::{Connection, Transaction, Value};
use crate::constraint::ConstraintGenerator;
use crate::dialect::{drop_schema_objects, generate_schema_objects};
use crate::error::Error;
use crate::metrics::{new_shared_metrics, SharedMetrics};
use crate::persistence::{
    EntityReader, LoadedEntity, NodeId, ObjectGraph, Persister, RemovedGraph, SaveOptions, SavedGraph,
};

/// A database connection paired with built metadata.
///
/// Every operation runs inside a transaction. [`Session::transaction`]
/// groups several operations into one; the single-operation helpers open
/// and commit their own.
pub struct Session<C: Connection> {
    connection: C,
    registry: Arc<MetadataRegistry>,
    config: EngineConfig,
    metrics: SharedMetrics,
}

impl<C: Connection> Session<C> {
    /// Bind a connection to metadata.
    ///
    /// Fails if the metadata declares constraints the connection's dialect
    /// cannot express.
    pub fn new(connection: C, registry: Arc<MetadataRegistry>) -> Result<Self, Error> {
        ConstraintGenerator::validate(&registry, connection.dialect().capabilities())?;
        Ok(Self {
            connection,
            registry,
            config: EngineConfig::default(),
            metrics: new_shared_metrics(),
        })
    }

    /// Replace the engine configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Share metrics with other sessions.
    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn registry(&self) -> &Arc<MetadataRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    /// Release the underlying connection.
    pub fn into_connection(self) -> C {
        self.connection
    }

    /// Create every table and foreign key of the metadata.
    #[instrument(skip(self), fields(dialect = %self.connection.dialect()))]
    pub fn synchronize(&mut self) -> Result<(), Error> {
        let fragments = generate_schema_objects(&self.registry, self.connection.dialect())?;
        let mut manager = self.begin()?;
        for fragment in &fragments {
            manager.transaction().execute(&fragment.sql, &[])?;
        }
        manager.commit()?;
        info!(statements = fragments.len(), "schema synchronized");
        Ok(())
    }

    /// Drop every table of the metadata.
    #[instrument(skip(self), fields(dialect = %self.connection.dialect()))]
    pub fn drop_schema(&mut self) -> Result<(), Error> {
        let fragments = drop_schema_objects(&self.registry, self.connection.dialect());
        let mut manager = self.begin()?;
        for fragment in &fragments {
            manager.transaction().execute(&fragment.sql, &[])?;
        }
        manager.commit()?;
        info!(statements = fragments.len(), "schema dropped");
        Ok(())
    }

    /// Begin a transaction.
    ///
    /// The returned manager rolls back when dropped without a commit.
    pub fn begin(&mut self) -> Result<EntityManager<'_>, Error> {
        let tx = Transaction::begin(&mut self.connection)?
            .with_metrics(self.metrics.clone())
            .with_statement_logging(self.config.log_statements);
        Ok(EntityManager {
            tx,
            registry: &self.registry,
            config: &self.config,
        })
    }

    /// Run `f` in a transaction.
    ///
    /// Commits when `f` returns `Ok`. On `Err` the transaction is rolled
    /// back and the error from `f` is returned, even if the rollback fails.
    pub fn transaction<T, F>(&mut self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut EntityManager<'_>) -> Result<T, Error>,
    {
        let mut manager = self.begin()?;
        match f(&mut manager) {
            Ok(value) => {
                manager.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = manager.rollback() {
                    error!(error = %rollback, original = %e, "rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Save a graph in its own transaction.
    pub fn save(&mut self, graph: &mut ObjectGraph, root: NodeId) -> Result<SavedGraph, Error> {
        self.transaction(|m| m.save(graph, root))
    }

    /// Remove a graph in its own transaction.
    pub fn remove(&mut self, graph: &mut ObjectGraph, root: NodeId) -> Result<RemovedGraph, Error> {
        self.transaction(|m| m.remove(graph, root))
    }

    /// Load one row with the named relations.
    pub fn find_by_id(
        &mut self,
        entity: &str,
        key: &[Value],
        relations: &[&str],
    ) -> Result<Option<LoadedEntity>, Error> {
        self.transaction(|m| m.find_by_id(entity, key, relations))
    }

    /// Load every row of an entity with the named relations.
    pub fn find_all(&mut self, entity: &str, relations: &[&str]) -> Result<Vec<LoadedEntity>, Error> {
        self.transaction(|m| m.find_all(entity, relations))
    }
}

/// Entity operations on one open transaction.
pub struct EntityManager<'s> {
    tx: Transaction<'s>,
    registry: &'s MetadataRegistry,
    config: &'s EngineConfig,
}

impl<'s> EntityManager<'s> {
    /// Save `root` and everything its cascades reach.
    pub fn save(&mut self, graph: &mut ObjectGraph, root: NodeId) -> Result<SavedGraph, Error> {
        self.save_with(graph, root, &SaveOptions::default())
    }

    /// Save with per-call options.
    pub fn save_with(
        &mut self,
        graph: &mut ObjectGraph,
        root: NodeId,
        options: &SaveOptions,
    ) -> Result<SavedGraph, Error> {
        Persister::new(self.registry, self.config).save(graph, root, options, &mut self.tx)
    }

    /// Remove `root` and everything its remove cascades reach.
    pub fn remove(&mut self, graph: &mut ObjectGraph, root: NodeId) -> Result<RemovedGraph, Error> {
        Persister::new(self.registry, self.config).remove(graph, root, &mut self.tx)
    }

    /// Load one row with the named relations.
    pub fn find_by_id(
        &mut self,
        entity: &str,
        key: &[Value],
        relations: &[&str],
    ) -> Result<Option<LoadedEntity>, Error> {
        EntityReader::new(self.registry).find_by_id(&mut self.tx, entity, key, relations)
    }

    /// Load every row of an entity with the named relations.
    pub fn find_all(&mut self, entity: &str, relations: &[&str]) -> Result<Vec<LoadedEntity>, Error> {
        EntityReader::new(self.registry).find_all(&mut self.tx, entity, relations)
    }

    /// The underlying transaction, for raw statements.
    pub fn transaction(&mut self) -> &mut Transaction<'s> {
        &mut self.tx
    }

    pub fn commit(self) -> Result<(), Error> {
        self.tx.commit()
    }

    pub fn rollback(self) -> Result<(), Error> {
        self.tx.rollback()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{build_metadata, ColumnDecl, ColumnType, DeferrableMode, EntityDecl, Generation, RelationDecl};
    use crate::connection::mock::MockConnection;
    use crate::dialect::DialectKind;
    use crate::persistence::EntityObject;

    fn registry(mode: Option<DeferrableMode>) -> Arc<MetadataRegistry> {
        let mut tags = RelationDecl::many_to_many("tags", "Tag").owning();
        if let Some(mode) = mode {
            tags = tags.deferrable(mode);
        }
        Arc::new(
            build_metadata(&[
                EntityDecl::new("Article")
                    .with_column(ColumnDecl::generated("id", ColumnType::Integer, Generation::Increment))
                    .with_relation(tags),
                EntityDecl::new("Tag").with_column(ColumnDecl::primary("id", ColumnType::Integer)),
            ])
            .unwrap(),
        )
    }

    #[test]
    fn test_unsupported_policy_rejected_at_bind() {
        let conn = MockConnection::new(DialectKind::MySql);
        let result = Session::new(conn, registry(Some(DeferrableMode::InitiallyDeferred)));
        assert!(matches!(result, Err(Error::Constraint(_))));

        let conn = MockConnection::new(DialectKind::MySql);
        assert!(Session::new(conn, registry(None)).is_ok());
    }

    #[test]
    fn test_transaction_commits_on_ok() {
        let conn = MockConnection::new(DialectKind::Postgres);
        let mut session = Session::new(conn, registry(Some(DeferrableMode::InitiallyDeferred))).unwrap();

        let mut graph = ObjectGraph::new();
        let article = graph.add(EntityObject::new("Article"));
        let saved = session.save(&mut graph, article).unwrap();
        assert_eq!(saved.inserted, vec![article]);

        assert_eq!(session.connection().control_log(), vec!["BEGIN", "COMMIT"]);
        assert_eq!(session.metrics().commits(), 1);
    }

    #[test]
    fn test_transaction_rolls_back_and_keeps_error() {
        let conn = MockConnection::new(DialectKind::Postgres);
        let mut session = Session::new(conn, registry(None)).unwrap();

        let result: Result<(), Error> = session.transaction(|m| {
            m.transaction().execute("DELETE FROM \"tag\"", &[])?;
            Err(Error::InvalidGraph("stop".into()))
        });

        match result {
            Err(Error::InvalidGraph(message)) => assert_eq!(message, "stop"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(session.connection().control_log(), vec!["BEGIN", "ROLLBACK"]);
        assert_eq!(session.metrics().rollbacks(), 1);
    }

    #[test]
    fn test_synchronize_runs_ddl_in_one_transaction() {
        let conn = MockConnection::new(DialectKind::Postgres);
        let mut session = Session::new(conn, registry(Some(DeferrableMode::InitiallyDeferred))).unwrap();
        session.synchronize().unwrap();

        let statements = session.connection().statements();
        assert_eq!(statements.len(), 5);
        assert!(statements[0].starts_with("CREATE TABLE \"article\""));
        assert!(statements[3].ends_with("DEFERRABLE INITIALLY DEFERRED"));
        assert!(!statements[4].contains("DEFERRABLE"));
        assert_eq!(session.connection().control_log(), vec!["BEGIN", "COMMIT"]);
    }
}
