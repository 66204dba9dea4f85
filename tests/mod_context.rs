use n1qlite::n1ql::lit;
use n1qlite::store::{MemoryStore, QueryDiagnostic, QueryResponse, StoreError, WriteOp};
use n1qlite::utils::devlog;
use n1qlite::{BucketContext, ContextConfig, Document, Expr, N1qlError, Query};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Beer {
    id: String,
    name: String,
    #[serde(default)]
    abv: f64,
}

impl Document for Beer {
    fn key_field() -> Option<&'static str> {
        Some("id")
    }
}

fn context() -> (Arc<MemoryStore>, BucketContext) {
    let store = Arc::new(MemoryStore::new());
    let ctx = BucketContext::new(store.clone(), ContextConfig { bucket: "beer-sample".into(), ..ContextConfig::default() });
    (store, ctx)
}

#[test]
fn execute_deserializes_rows() {
    let (store, ctx) = context();
    store.push_rows(vec![
        json!({"id": "b1", "name": "Pale", "abv": 5.0}),
        json!({"id": "b2", "name": "Stout", "abv": 8.5}),
    ]);
    let rows: Vec<Beer> = ctx.execute(&Query::of::<Beer>("b").build()).unwrap().to_vec().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].name, "Stout");
    assert_eq!(store.statements(), vec!["SELECT `Extent1`.* FROM `beer-sample` as `Extent1`"]);
}

#[test]
fn scalar_projection_is_unwrapped() {
    let (store, ctx) = context();
    let b = Expr::source("b");
    store.push_rows(vec![json!({"result": "Pale"}), json!({"result": "Stout"})]);
    let names: Vec<String> = ctx
        .execute(&Query::of::<Beer>("b").select(b.field("name")).build())
        .unwrap()
        .to_vec()
        .unwrap();
    assert_eq!(names, ["Pale", "Stout"]);
}

#[test]
fn any_and_all_over_empty_results() {
    let (store, ctx) = context();
    let b = Expr::source("b");
    let any = Query::of::<Beer>("b").filter(b.field("abv").gt(lit(20))).any().build();
    assert_eq!(ctx.execute_scalar::<bool>(&any).unwrap(), Some(false));
    store.push_rows(vec![json!({"result": true})]);
    assert_eq!(ctx.execute_scalar::<bool>(&any).unwrap(), Some(true));

    let all = Query::of::<Beer>("b").all(b.field("abv").gt(lit(0))).build();
    assert_eq!(ctx.execute_scalar::<bool>(&all).unwrap(), Some(true));
    store.push_rows(vec![json!({"result": false})]);
    assert_eq!(ctx.execute_scalar::<bool>(&all).unwrap(), Some(false));
}

#[test]
fn count_and_first() {
    let (store, ctx) = context();
    store.push_rows(vec![json!({"result": 42})]);
    assert_eq!(ctx.execute_scalar::<u64>(&Query::of::<Beer>("b").count().build()).unwrap(), Some(42));

    let first = Query::of::<Beer>("b").first().build();
    assert!(matches!(ctx.execute_scalar::<Beer>(&first), Err(N1qlError::UnexpectedResult(_))));
    let first_or_default = Query::of::<Beer>("b").first_or_default().build();
    assert_eq!(ctx.execute_scalar::<Beer>(&first_or_default).unwrap(), None);
}

#[test]
fn sequence_queries_are_not_scalar() {
    let (store, ctx) = context();
    let err = ctx.execute_scalar::<Beer>(&Query::of::<Beer>("b").build()).unwrap_err();
    assert!(matches!(err, N1qlError::UnexpectedResult(_)));
    assert!(store.statements().is_empty());
}

#[test]
fn query_failures_are_aggregated() {
    let (store, ctx) = context();
    store.push_response(Ok(QueryResponse::failed(vec![
        QueryDiagnostic { code: 3000, message: "syntax error".into() },
        QueryDiagnostic { code: 4100, message: "no index".into() },
    ])));
    match ctx.execute::<Beer>(&Query::of::<Beer>("b").build()) {
        Err(N1qlError::StoreQueryFailed(m)) => assert_eq!(m, "3000: syntax error; 4100: no index"),
        other => panic!("expected query failure, got {other:?}"),
    }

    store.push_response(Err(StoreError::new("connection reset")));
    match ctx.execute::<Beer>(&Query::of::<Beer>("b").build()) {
        Err(N1qlError::Store(e)) => assert_eq!(e.message, "connection reset"),
        other => panic!("expected store error, got {other:?}"),
    }
}

#[test]
fn tracked_query_round_trip() {
    let (store, ctx) = context();
    let row = json!({"id": "b1", "name": "Pale", "abv": 5.0, "__id": "b1"});
    store.push_rows(vec![row.clone()]);
    store.push_rows(vec![row]);
    let model = Query::of::<Beer>("b").build();

    ctx.begin_change_tracking();
    let docs = ctx.execute_tracked(&model).unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].key().as_deref(), Some("b1"));
    assert!(docs[0].get("__id").is_none());
    let again = ctx.execute_tracked(&model).unwrap();
    assert!(again[0].ptr_eq(&docs[0]));
    assert_eq!(
        store.statements()[0],
        "SELECT `Extent1`.*, META(`Extent1`).id as `__id` FROM `beer-sample` as `Extent1`"
    );

    docs[0].set_value("abv", json!(6.5));
    ctx.end_change_tracking();
    ctx.submit_changes().unwrap();
    assert_eq!(store.writes(), vec![WriteOp::Upsert("b1".into())]);
    assert_eq!(store.document("b1").unwrap()["abv"], json!(6.5));
    assert!(!docs[0].is_dirty());
}

#[test]
fn tracked_removal_is_deferred() {
    let (store, ctx) = context();
    store.insert("b1", json!({"id": "b1", "name": "Pale"}));
    ctx.begin_change_tracking();
    let doc = ctx.get_tracked("b1").unwrap().unwrap();
    ctx.remove_tracked(&doc).unwrap();
    assert!(store.document("b1").is_some());
    ctx.end_change_tracking();
    ctx.submit_changes().unwrap();
    assert!(store.document("b1").is_none());
    assert_eq!(store.writes(), vec![WriteOp::Remove("b1".into())]);
}

#[test]
fn unmodified_tracked_documents_are_not_written() {
    let (store, ctx) = context();
    store.push_rows(vec![json!({"id": "b1", "name": "Pale", "__id": "b1"})]);
    ctx.begin_change_tracking();
    let docs = ctx.execute_tracked(&Query::of::<Beer>("b").build()).unwrap();
    assert_eq!(docs.len(), 1);
    ctx.end_change_tracking();
    ctx.submit_changes().unwrap();
    assert!(store.writes().is_empty());
}

#[test]
fn projected_rows_cannot_be_tracked() {
    let (_, ctx) = context();
    let b = Expr::source("b");
    let model = Query::of::<Beer>("b").select(b.field("name")).build();
    assert!(!ctx.wants_proxies(&model));
    assert!(matches!(ctx.execute_tracked(&model), Err(N1qlError::CompilationUnsupported(_))));
}

#[test]
fn dev_sink_captures_statements() {
    let _c = devlog::capture();
    let (_, ctx) = context();
    ctx.execute::<Beer>(&Query::of::<Beer>("b").take(1).build()).unwrap();
    let lines = devlog::take();
    assert!(lines.iter().any(|l| l.contains("\"op\":\"query\"") && l.contains("LIMIT 1")));
}

#[test]
fn typed_get_and_save() {
    let (store, ctx) = context();
    let beer = Beer { id: "b9".into(), name: "Lager".into(), abv: 4.2 };
    ctx.save(&beer).unwrap();
    assert_eq!(ctx.get::<Beer>("b9").unwrap(), Some(beer));
    assert_eq!(ctx.get::<Beer>("nope").unwrap(), None);
    assert_eq!(store.writes(), vec![WriteOp::Upsert("b9".into())]);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Ale {
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    style: Option<String>,
}

impl Document for Ale {
    fn key_field() -> Option<&'static str> {
        Some("id")
    }
}

#[test]
fn tracked_save_replaces_stale_properties() {
    let (store, ctx) = context();
    store.insert("b1", json!({"id": "b1", "style": "IPA"}));
    ctx.begin_change_tracking();
    let tracked = ctx.get_tracked("b1").unwrap().unwrap();
    ctx.save(&Ale { id: "b1".into(), style: None }).unwrap();
    assert!(tracked.get("style").is_none());
    ctx.end_change_tracking();
    ctx.submit_changes().unwrap();
    assert_eq!(store.document("b1").unwrap(), json!({"id": "b1"}));
}
