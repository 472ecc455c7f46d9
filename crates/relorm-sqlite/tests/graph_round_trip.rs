//! Saved graphs read back unchanged: mutual references and typed columns.

use std::sync::Arc;

use relorm_core::{
    build_metadata, CascadeSet, ColumnDecl, ColumnType, DeferrableMode, EntityDecl, EntityObject, Generation,
    MetadataRegistry, ObjectGraph, Related, RelationDecl, Session, Value,
};
use relorm_sqlite::SqliteConnection;
use serde_json::json;

struct TestContext {
    session: Session<SqliteConnection>,
}

impl TestContext {
    fn new(registry: MetadataRegistry) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let conn = SqliteConnection::open_in_memory().unwrap();
        let mut session = Session::new(conn, Arc::new(registry)).unwrap();
        session.synchronize().unwrap();
        Self { session }
    }
}

/// Department and Employee reference each other through generated keys.
fn company() -> MetadataRegistry {
    build_metadata(&[
        EntityDecl::new("Department")
            .with_column(ColumnDecl::generated("id", ColumnType::Integer, Generation::Increment))
            .with_column(ColumnDecl::new("name", ColumnType::Text))
            .with_relation(
                RelationDecl::one_to_one("manager", "Employee")
                    .owning()
                    .deferrable(DeferrableMode::InitiallyDeferred)
                    .cascade(CascadeSet::save()),
            ),
        EntityDecl::new("Employee")
            .with_column(ColumnDecl::generated("id", ColumnType::Integer, Generation::Increment))
            .with_column(ColumnDecl::new("name", ColumnType::Text))
            .with_relation(
                RelationDecl::many_to_one("department", "Department")
                    .deferrable(DeferrableMode::InitiallyDeferred)
                    .cascade(CascadeSet::save()),
            ),
    ])
    .unwrap()
}

fn settings() -> MetadataRegistry {
    build_metadata(&[EntityDecl::new("Setting")
        .with_column(ColumnDecl::primary("id", ColumnType::Integer))
        .with_column(ColumnDecl::new("enabled", ColumnType::Boolean))
        .with_column(ColumnDecl::new("ratio", ColumnType::Float))
        .with_column(ColumnDecl::new("weight", ColumnType::Float))])
    .unwrap()
}

#[test]
fn test_mutual_generated_keys_with_deferred_constraints() {
    let mut ctx = TestContext::new(company());

    let mut graph = ObjectGraph::new();
    let department = graph.add(EntityObject::new("Department").with_value("name", "Research"));
    let employee = graph.add(
        EntityObject::new("Employee")
            .with_value("name", "Ada")
            .with_one("department", Some(department)),
    );
    graph
        .set_related(department, "manager", Related::One(Some(employee)))
        .unwrap();

    let saved = ctx.session.save(&mut graph, department).unwrap();
    assert_eq!(saved.inserted, vec![department, employee]);
    assert_eq!(saved.deferred_links, 1);

    let loaded = ctx
        .session
        .find_by_id("Department", &[Value::Int(1)], &["manager"])
        .unwrap()
        .unwrap();
    assert_eq!(
        loaded.to_json().unwrap(),
        json!({"id": 1, "name": "Research", "manager": {"id": 1, "name": "Ada"}})
    );

    let loaded = ctx
        .session
        .find_by_id("Employee", &[Value::Int(1)], &["department"])
        .unwrap()
        .unwrap();
    assert_eq!(
        loaded.to_json().unwrap()["department"],
        json!({"id": 1, "name": "Research"})
    );
}

#[test]
fn test_boolean_and_float_columns_read_back_as_saved() {
    let mut ctx = TestContext::new(settings());

    let mut graph = ObjectGraph::new();
    let setting = graph.add(
        EntityObject::new("Setting")
            .with_value("id", 1)
            .with_value("enabled", true)
            .with_value("ratio", 0.25)
            .with_value("weight", 2.0),
    );
    ctx.session.save(&mut graph, setting).unwrap();

    let loaded = ctx
        .session
        .find_by_id("Setting", &[Value::Int(1)], &[])
        .unwrap()
        .unwrap();
    assert_eq!(loaded.get("enabled"), Some(&Value::Bool(true)));
    assert_eq!(loaded.get("ratio"), Some(&Value::Float(0.25)));
    assert_eq!(loaded.get("weight"), Some(&Value::Float(2.0)));
    assert_eq!(
        loaded.to_json().unwrap(),
        json!({"id": 1, "enabled": true, "ratio": 0.25, "weight": 2.0})
    );
}
