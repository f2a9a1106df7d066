//! Integration tests for relationship composition.
//!
//! These tests drive full reads through a model and the in-memory store:
//! - belongs-to joins and projection
//! - has-many secondary loading
//! - per-read activation and its reset
//! - relationship filters

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use dyna_query::error::ErrorCode;
use dyna_query::store::StatementKind;
use dyna_query::{conditions, row, ColumnInfo, DynaModel, HookPoint, MemoryStore, OrderBy};

fn library() -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    store.create_table(
        "authors",
        [ColumnInfo::new("id", "int").primary(), ColumnInfo::new("name", "varchar")],
    );
    store.create_table(
        "books",
        [
            ColumnInfo::new("id", "int").primary(),
            ColumnInfo::new("title", "varchar"),
            ColumnInfo::new("author_id", "int").nullable(),
        ],
    );

    for (id, name) in [(2, "N2"), (3, "N3"), (99, "N99")] {
        store
            .insert_row("authors", row([("id", json!(id)), ("name", json!(name))]))
            .unwrap();
    }
    for (id, title, author) in [(5, "X", json!(2)), (6, "A", json!(2)), (7, "B", json!(3)), (8, "Orphan", json!(null))] {
        store
            .insert_row("books", row([("id", json!(id)), ("title", json!(title)), ("author_id", author)]))
            .unwrap();
    }
    Arc::new(store)
}

fn value(result: dyna_query::FindResult) -> Value {
    result.into_value()
}

#[tokio::test]
async fn test_belongs_to_merges_related_columns() {
    let store = library();
    let mut books = DynaModel::new(store.clone(), "books").await.unwrap();
    books.belongs_to("authors", None, None).await.unwrap();

    let book = books.with("authors").unwrap().find(5).await.unwrap();
    assert_eq!(value(book), json!({"id": 5, "title": "X", "author_id": 2, "name": "N2"}));

    let select = store.last_select().unwrap();
    assert_eq!(select.joins, 1);
    assert!(select.sql.contains("LEFT JOIN authors AS authors ON authors.id = books.author_id"));
}

#[tokio::test]
async fn test_belongs_to_without_parent_keeps_row() {
    let store = library();
    let mut books = DynaModel::new(store.clone(), "books").await.unwrap();
    books.belongs_to("authors", None, None).await.unwrap();

    let book = books.with("authors").unwrap().find(8).await.unwrap();
    assert_eq!(value(book), json!({"id": 8, "title": "Orphan", "author_id": null, "name": null}));
}

#[tokio::test]
async fn test_belongs_to_explicit_columns_and_alias() {
    let store = library();
    let mut books = DynaModel::new(store.clone(), "books").await.unwrap();
    books
        .belongs_to("authors", Some("author_id"), Some("writer"))
        .await
        .unwrap();

    let book = books
        .with_columns("writer", ["name AS writer_name"])
        .unwrap()
        .find(7)
        .await
        .unwrap();
    assert_eq!(value(book), json!({"id": 7, "title": "B", "author_id": 3, "writer_name": "N3"}));
    assert!(store.last_select().unwrap().sql.contains("AS writer ON writer.id = books.author_id"));
}

#[tokio::test]
async fn test_belongs_to_empty_column_list_joins_default_columns() {
    let store = library();
    let mut books = DynaModel::new(store.clone(), "books").await.unwrap();
    books.belongs_to("authors", None, None).await.unwrap();

    let book = books
        .with_columns("authors", Vec::<String>::new())
        .unwrap()
        .find(5)
        .await
        .unwrap();
    assert_eq!(value(book), json!({"id": 5, "title": "X", "author_id": 2, "name": "N2"}));
}

#[tokio::test]
async fn test_has_many_attaches_children() {
    let store = library();
    let mut authors = DynaModel::new(store.clone(), "authors").await.unwrap();
    authors
        .has_many("books", None, None, OrderBy::from_pairs([("title", "asc")]).unwrap())
        .await
        .unwrap();

    let author = authors.with("books").unwrap().find(2).await.unwrap();
    assert_eq!(
        value(author),
        json!({
            "id": 2,
            "name": "N2",
            "books": [
                {"id": 6, "title": "A", "author_id": 2},
                {"id": 5, "title": "X", "author_id": 2},
            ],
        })
    );

    let lonely = authors.with("books").unwrap().find(99).await.unwrap();
    assert_eq!(value(lonely), json!({"id": 99, "name": "N99", "books": []}));
}

#[tokio::test]
async fn test_has_many_uses_one_secondary_query() {
    let store = library();
    let mut authors = DynaModel::new(store.clone(), "authors").await.unwrap();
    authors.has_many("books", None, None, OrderBy::none()).await.unwrap();
    store.clear_log();

    let all = authors.with("books").unwrap().find_all(0, 0).await.unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(store.select_count("authors"), 1);
    assert_eq!(store.select_count("books"), 1);

    let counts: Vec<usize> = all
        .into_many()
        .into_iter()
        .map(|record| record.get("books").and_then(Value::as_array).map_or(0, Vec::len))
        .collect();
    assert_eq!(counts, vec![2, 1, 0]);
}

#[tokio::test]
async fn test_empty_primary_result_skips_secondary_query() {
    let store = library();
    let mut authors = DynaModel::new(store.clone(), "authors").await.unwrap();
    authors.has_many("books", None, None, OrderBy::none()).await.unwrap();
    store.clear_log();

    let missing = authors.with("books").unwrap().find(1000).await.unwrap();
    assert!(missing.is_empty());
    assert_eq!(store.select_count("books"), 0);
}

#[tokio::test]
async fn test_activation_applies_to_one_read() {
    let store = library();
    let mut books = DynaModel::new(store.clone(), "books").await.unwrap();
    books.belongs_to("authors", None, None).await.unwrap();

    books.with("authors").unwrap().find(5).await.unwrap();
    assert_eq!(store.last_select().unwrap().joins, 1);

    let plain = books.find(5).await.unwrap();
    assert_eq!(store.last_select().unwrap().joins, 0);
    assert_eq!(value(plain), json!({"id": 5, "title": "X", "author_id": 2}));
    assert!(books.hooks().is_empty());
}

#[tokio::test]
async fn test_activation_is_reset_after_failed_read() {
    let store = library();
    let mut authors = DynaModel::new(store.clone(), "authors").await.unwrap();
    authors.has_many("books", None, None, OrderBy::none()).await.unwrap();

    store.fail_selects_on("books");
    let err = authors.with("books").unwrap().find(2).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::DatabaseError);
    assert!(!authors.relationships().has_active());

    store.clear_failures();
    store.clear_log();
    let plain = authors.find(2).await.unwrap();
    assert_eq!(value(plain), json!({"id": 2, "name": "N2"}));
    assert_eq!(store.select_count("books"), 0);
}

#[tokio::test]
async fn test_repeated_activation_registers_hooks_once() {
    let store = library();
    let mut authors = DynaModel::new(store.clone(), "authors").await.unwrap();
    authors.has_many("books", None, None, OrderBy::none()).await.unwrap();

    authors.with("books").unwrap().with("books").unwrap();
    assert_eq!(authors.hooks().len(HookPoint::BeforeFind), 1);
    assert_eq!(authors.hooks().len(HookPoint::AfterFind), 1);

    store.clear_log();
    authors.find(2).await.unwrap();
    assert_eq!(store.select_count("books"), 1);
}

#[tokio::test]
async fn test_undeclared_alias_fails_fast() {
    let store = library();
    let mut books = DynaModel::new(store.clone(), "books").await.unwrap();
    books.belongs_to("authors", None, None).await.unwrap();

    let err = books.with("publishers").unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidRelation);
    let err = books.where_relation("publishers", conditions([("name", "x")])).unwrap_err();
    assert!(err.is_invalid_relation());
    assert!(!books.relationships().has_active());
}

#[tokio::test]
async fn test_where_relation_filters_join_and_children() {
    let store = library();

    let mut books = DynaModel::new(store.clone(), "books").await.unwrap();
    books.belongs_to("authors", None, None).await.unwrap();
    let by_n3 = books
        .with("authors")
        .unwrap()
        .where_relation("authors", conditions([("name", "N3")]))
        .unwrap()
        .find_all(0, 0)
        .await
        .unwrap();
    assert_eq!(value(by_n3), json!([{"id": 7, "title": "B", "author_id": 3, "name": "N3"}]));

    let mut authors = DynaModel::new(store.clone(), "authors").await.unwrap();
    authors.has_many("books", None, None, OrderBy::none()).await.unwrap();
    let author = authors
        .with("books")
        .unwrap()
        .where_relation("books", conditions([("title", "X")]))
        .unwrap()
        .find(2)
        .await
        .unwrap();
    assert_eq!(
        value(author),
        json!({"id": 2, "name": "N2", "books": [{"id": 5, "title": "X", "author_id": 2}]})
    );
}

#[tokio::test]
async fn test_prefixed_store_reads() {
    let store = MemoryStore::new().with_prefix("app_");
    store.create_table(
        "authors",
        [ColumnInfo::new("id", "int").primary(), ColumnInfo::new("name", "varchar")],
    );
    store.create_table(
        "books",
        [
            ColumnInfo::new("id", "int").primary(),
            ColumnInfo::new("title", "varchar"),
            ColumnInfo::new("author_id", "int"),
        ],
    );
    store.insert_row("authors", row([("id", json!(1)), ("name", json!("N1"))])).unwrap();
    store
        .insert_row("books", row([("id", json!(1)), ("title", json!("T")), ("author_id", json!(1))]))
        .unwrap();
    let store = Arc::new(store);

    let mut books = DynaModel::new(store.clone(), "books").await.unwrap();
    books.belongs_to("authors", None, None).await.unwrap();
    let book = books.with("authors").unwrap().find(1).await.unwrap();
    assert_eq!(value(book), json!({"id": 1, "title": "T", "author_id": 1, "name": "N1"}));

    let sql = store.last_select().unwrap().sql;
    assert!(sql.contains("FROM app_books AS books"));
    assert!(sql.contains("LEFT JOIN app_authors AS authors"));
    assert!(store.statements().iter().all(|s| s.kind == StatementKind::Select));
}
