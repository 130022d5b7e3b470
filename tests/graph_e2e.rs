use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use weft::query::TraversalBudget;
use weft::query::paths::find_paths;
use weft::relation::{
    CodeRelationship, Confidence, Entity, EntityKind, FileEdgeKind, FileRelationship,
    RelationKind,
};
use weft::store::SqliteStore;

fn entity(id: &str) -> Entity {
    Entity {
        id: id.to_string(),
        name: id.to_string(),
        kind: EntityKind::Symbol,
    }
}

fn call(source: &str, target: &str) -> CodeRelationship {
    CodeRelationship {
        source: source.to_string(),
        target: target.to_string(),
        kind: RelationKind::Calls,
        source_name: source.to_string(),
        target_name: target.to_string(),
        source_file: "src/hub.py".to_string(),
        line: None,
        confidence: Confidence::Certain,
        metadata: None,
    }
}

#[test]
fn store_survives_reopen_with_edges_intact() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("graph.sqlite");
    let db = db_path.to_string_lossy().into_owned();

    {
        let store = SqliteStore::open(&db).expect("open");
        store
            .register_entities(&[entity("a"), entity("b"), entity("c")])
            .expect("entities");
        store
            .add_relationships_batch(&[call("a", "b"), call("b", "c")])
            .expect("edges");
        store
            .add_file_relationship(&FileRelationship {
                source_file: "src/a.py".to_string(),
                target_file: "src/b.py".to_string(),
                kind: FileEdgeKind::Imports,
                line: Some(1),
                alias: None,
            })
            .expect("file edge");
    }

    let reopened = SqliteStore::open(&db).expect("reopen");
    let stats = reopened.stats().expect("stats");
    assert_eq!(stats.total_code, 2);
    assert_eq!(stats.total_file, 1);

    let paths = find_paths(&reopened, "a", "c", 3, TraversalBudget::unlimited()).expect("paths");
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].len(), 2);
}

/// A reader racing a reindex must observe a file's edge contribution as one
/// complete generation, never a mix of the outgoing and incoming sets.
#[test]
fn concurrent_reader_never_sees_a_half_replaced_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("graph.sqlite");
    let db = db_path.to_string_lossy().into_owned();

    let generation = |tag: &str| -> (Vec<Entity>, Vec<CodeRelationship>) {
        let mut entities = vec![entity("hub")];
        let mut edges = Vec::new();
        for i in 0..5 {
            let target = format!("{tag}{i}");
            entities.push(entity(&target));
            edges.push(call("hub", &target));
        }
        (entities, edges)
    };

    let writer_store = SqliteStore::open(&db).expect("writer open");
    let (entities, edges) = generation("a");
    writer_store
        .replace_file_edges("src/hub.py", &entities, &edges, &[])
        .expect("seed generation");

    let stop = Arc::new(AtomicBool::new(false));
    let reader_stop = Arc::clone(&stop);
    let reader_db = db.clone();
    let reader = thread::spawn(move || {
        let store = SqliteStore::open(&reader_db).expect("reader open");
        let mut observations = 0usize;
        while !reader_stop.load(Ordering::Relaxed) {
            let edges = match store.outgoing_edges("hub") {
                Ok(edges) => edges,
                // SQLITE_BUSY under write pressure is retryable, not a failure.
                Err(err) if err.is_retryable() => continue,
                Err(err) => panic!("reader failed: {err}"),
            };
            assert_eq!(edges.len(), 5, "partial generation visible");
            let tag = &edges[0].target[..1];
            assert!(
                edges.iter().all(|edge| edge.target.starts_with(tag)),
                "mixed generations visible: {:?}",
                edges.iter().map(|e| e.target.clone()).collect::<Vec<_>>()
            );
            observations += 1;
        }
        observations
    });

    for round in 0..40 {
        let tag = if round % 2 == 0 { "b" } else { "a" };
        let (entities, edges) = generation(tag);
        writer_store
            .replace_file_edges("src/hub.py", &entities, &edges, &[])
            .expect("replace generation");
    }

    stop.store(true, Ordering::Relaxed);
    let observations = reader.join().expect("reader thread");
    assert!(observations > 0, "reader never got a consistent snapshot");
}
