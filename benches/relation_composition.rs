//! Benchmarks for relationship composition and result assembly.

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use dyna_query::hooks::ReadContext;
use dyna_query::{
    ColumnInfo, MemoryStore, OrderBy, QueryComposer, RelationshipRegistry, ResultAssembler, Row,
    SchemaCatalog, SelectQuery, row,
};
use serde_json::json;
use tokio::runtime::Runtime;

struct Fixture {
    store: Arc<MemoryStore>,
    catalog: SchemaCatalog,
    registry: RelationshipRegistry,
}

impl Fixture {
    fn ctx(&self) -> ReadContext<'_> {
        ReadContext {
            store: self.store.as_ref(),
            schema: self.catalog.field_info(),
            primary_key: "id",
            registry: &self.registry,
        }
    }
}

fn store(authors: usize, books_per_author: usize) -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    store.create_table(
        "authors",
        [
            ColumnInfo::new("id", "int").primary(),
            ColumnInfo::new("name", "varchar"),
            ColumnInfo::new("title", "varchar"),
            ColumnInfo::new("country", "varchar"),
        ],
    );
    store.create_table(
        "books",
        [
            ColumnInfo::new("id", "int").primary(),
            ColumnInfo::new("title", "varchar"),
            ColumnInfo::new("author_id", "int"),
        ],
    );
    for a in 1..=authors {
        let _ = store.insert_row("authors", row([("id", json!(a)), ("name", json!(format!("N{}", a)))]));
        for b in 0..books_per_author {
            let _ = store.insert_row(
                "books",
                row([("title", json!(format!("T{}-{}", a, b))), ("author_id", json!(a))]),
            );
        }
    }
    Arc::new(store)
}

fn belongs_to_fixture(rt: &Runtime) -> Fixture {
    rt.block_on(async {
        let store = store(1, 1);
        let mut catalog = SchemaCatalog::load(store.clone(), "books").await.unwrap();
        let mut registry = RelationshipRegistry::new("books");
        registry.belongs_to(&mut catalog, "authors", None, None).await.unwrap();
        registry.with("authors", None).unwrap();
        Fixture { store, catalog, registry }
    })
}

fn has_many_fixture(rt: &Runtime, authors: usize) -> Fixture {
    rt.block_on(async {
        let store = store(authors, 4);
        let mut catalog = SchemaCatalog::load(store.clone(), "authors").await.unwrap();
        let mut registry = RelationshipRegistry::new("authors");
        registry
            .has_many(&mut catalog, "books", None, None, OrderBy::none())
            .await
            .unwrap();
        registry.with("books", None).unwrap();
        Fixture { store, catalog, registry }
    })
}

fn bench_compose(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let fixture = belongs_to_fixture(&rt);
    let ctx = fixture.ctx();

    c.bench_function("compose_belongs_to", |b| {
        b.iter(|| {
            let mut query = SelectQuery::new("books");
            QueryComposer::compose(&ctx, &mut query);
            black_box(query.to_sql())
        })
    });
}

fn bench_assemble(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("assemble_has_many");

    for authors in [10usize, 100, 1000] {
        let fixture = has_many_fixture(&rt, authors);
        let parents: Vec<Row> = fixture.store.rows("authors");
        group.throughput(Throughput::Elements(authors as u64));
        group.bench_with_input(BenchmarkId::from_parameter(authors), &parents, |b, parents| {
            b.iter(|| {
                fixture.store.clear_log();
                let mut rows = parents.clone();
                rt.block_on(ResultAssembler::assemble(&fixture.ctx(), &mut rows)).unwrap();
                black_box(rows)
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_compose, bench_assemble);
criterion_main!(benches);
