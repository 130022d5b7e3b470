use crate::error::Result;
use crate::relation::RelationshipRow;
use crate::store::SqliteStore;

/// Everything the entity depends on: edges with the entity as source, ordered
/// by confidence descending with insertion-order tie-breaks. An unknown
/// entity yields an empty sequence, not an error.
pub fn dependencies_of(store: &SqliteStore, entity: &str) -> Result<Vec<RelationshipRow>> {
    store.outgoing_edges(entity)
}

/// Everything that depends on the entity: edges with the entity as target,
/// same ordering contract as [`dependencies_of`].
pub fn dependents_of(store: &SqliteStore, entity: &str) -> Result<Vec<RelationshipRow>> {
    store.incoming_edges(entity)
}

/// Call edges (CALLS or MAY_CALL) into the named symbol. `limit` trims the
/// confidence-ordered result, never an arbitrary subset.
pub fn find_callers(
    store: &SqliteStore,
    symbol: &str,
    limit: Option<usize>,
) -> Result<Vec<RelationshipRow>> {
    store.call_edges_to_name(symbol, limit)
}

/// Call edges out of the named symbol, same limit contract as
/// [`find_callers`].
pub fn find_callees(
    store: &SqliteStore,
    symbol: &str,
    limit: Option<usize>,
) -> Result<Vec<RelationshipRow>> {
    store.call_edges_from_name(symbol, limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation::{CodeRelationship, Confidence, Entity, EntityKind, RelationKind};

    fn seed(store: &SqliteStore, ids: &[&str]) {
        let entities = ids
            .iter()
            .map(|id| Entity {
                id: id.to_string(),
                name: id.to_string(),
                kind: EntityKind::Symbol,
            })
            .collect::<Vec<_>>();
        store.register_entities(&entities).expect("entities");
    }

    fn edge(
        source: &str,
        target: &str,
        kind: RelationKind,
        confidence: Confidence,
    ) -> CodeRelationship {
        CodeRelationship {
            source: source.to_string(),
            target: target.to_string(),
            kind,
            source_name: source.to_string(),
            target_name: target.to_string(),
            source_file: format!("src/{source}.py"),
            line: None,
            confidence,
            metadata: None,
        }
    }

    #[test]
    fn unknown_entity_yields_empty_not_error() {
        let store = SqliteStore::open_in_memory().expect("store");
        assert!(dependencies_of(&store, "ghost").expect("deps").is_empty());
        assert!(dependents_of(&store, "ghost").expect("rdeps").is_empty());
        assert!(find_callers(&store, "ghost", None).expect("callers").is_empty());
    }

    #[test]
    fn dependencies_and_dependents_are_symmetric_views() {
        let store = SqliteStore::open_in_memory().expect("store");
        seed(&store, &["a", "b"]);
        store
            .add_relationship(&edge("a", "b", RelationKind::Uses, Confidence::Certain))
            .expect("edge");

        let deps = dependencies_of(&store, "a").expect("deps");
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].target, "b");

        let rdeps = dependents_of(&store, "b").expect("rdeps");
        assert_eq!(rdeps.len(), 1);
        assert_eq!(rdeps[0].source, "a");

        assert!(dependents_of(&store, "a").expect("a rdeps").is_empty());
    }

    #[test]
    fn dependents_arrive_in_confidence_order_regardless_of_insertion() {
        let store = SqliteStore::open_in_memory().expect("store");
        seed(&store, &["x", "p", "q", "r"]);
        store
            .add_relationships_batch(&[
                edge("p", "x", RelationKind::Calls, Confidence::Likely),
                edge("q", "x", RelationKind::MayCall, Confidence::Possible),
                edge("r", "x", RelationKind::Calls, Confidence::Certain),
            ])
            .expect("edges");

        let rdeps = dependents_of(&store, "x").expect("rdeps");
        let sources = rdeps.iter().map(|e| e.source.as_str()).collect::<Vec<_>>();
        assert_eq!(sources, vec!["r", "p", "q"]);
    }

    #[test]
    fn callers_cover_both_call_kinds_and_respect_limit() {
        let store = SqliteStore::open_in_memory().expect("store");
        seed(&store, &["f", "g", "h", "i"]);
        store
            .add_relationships_batch(&[
                edge("g", "f", RelationKind::MayCall, Confidence::Possible),
                edge("h", "f", RelationKind::Calls, Confidence::Certain),
                edge("i", "f", RelationKind::References, Confidence::Certain),
            ])
            .expect("edges");

        let all = find_callers(&store, "f", None).expect("callers");
        assert_eq!(all.len(), 2, "REFERENCES must not count as a call");

        let top = find_callers(&store, "f", Some(1)).expect("limited");
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].source, "h");
    }

    #[test]
    fn callees_follow_outgoing_call_edges() {
        let store = SqliteStore::open_in_memory().expect("store");
        seed(&store, &["f", "g", "h"]);
        store
            .add_relationships_batch(&[
                edge("f", "g", RelationKind::Calls, Confidence::Certain),
                edge("f", "h", RelationKind::Uses, Confidence::Certain),
            ])
            .expect("edges");

        let callees = find_callees(&store, "f", None).expect("callees");
        assert_eq!(callees.len(), 1);
        assert_eq!(callees[0].target, "g");
    }
}
