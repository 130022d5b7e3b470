use std::time::Duration;

use chrono::Utc;
use rusqlite::{Connection, Transaction, TransactionBehavior, params};
use tracing::debug;

use crate::error::Result;
use crate::relation::{
    CodeRelationship, Confidence, Entity, EntityKind, FileEdgeKind, FileRelationship,
    RelationKind, RelationshipRow, StoreStats,
};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const ROW_COLUMNS: &str = "id, source_id, target_id, kind, source_name, target_name, \
     source_file, line, confidence, metadata, created_at";

const CONFIDENCE_ORDER: &str =
    "CASE confidence WHEN 'CERTAIN' THEN 0 WHEN 'LIKELY' THEN 1 ELSE 2 END, id";

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = FULL;
            ",
        )?;

        let version: i64 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?;
        match version {
            0 => {
                self.create_schema_v1()?;
                self.conn.execute_batch("PRAGMA user_version = 1;")?;
            }
            1 => self.create_schema_v1()?,
            _ => return Err(rusqlite::Error::InvalidQuery.into()),
        }
        Ok(())
    }

    fn create_schema_v1(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS entities (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                kind TEXT NOT NULL CHECK (kind IN ('symbol', 'file'))
            );

            CREATE TABLE IF NOT EXISTS code_relationships (
                id INTEGER PRIMARY KEY,
                source_id TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
                target_id TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
                kind TEXT NOT NULL CHECK (kind IN (
                    'CALLS', 'MAY_CALL', 'IMPORTS', 'USES',
                    'INHERITS', 'IMPLEMENTS', 'DEFINES', 'REFERENCES'
                )),
                source_name TEXT NOT NULL,
                target_name TEXT NOT NULL,
                source_file TEXT NOT NULL,
                line INTEGER,
                confidence TEXT NOT NULL CHECK (confidence IN ('CERTAIN', 'LIKELY', 'POSSIBLE')),
                metadata TEXT,
                created_at TEXT NOT NULL,
                UNIQUE(source_id, target_id, kind)
            );

            CREATE INDEX IF NOT EXISTS idx_code_rel_source ON code_relationships(source_id);
            CREATE INDEX IF NOT EXISTS idx_code_rel_target ON code_relationships(target_id);
            CREATE INDEX IF NOT EXISTS idx_code_rel_file ON code_relationships(source_file);
            CREATE INDEX IF NOT EXISTS idx_code_rel_source_name ON code_relationships(source_name);
            CREATE INDEX IF NOT EXISTS idx_code_rel_target_name ON code_relationships(target_name);

            CREATE TABLE IF NOT EXISTS file_relationships (
                id INTEGER PRIMARY KEY,
                source_file TEXT NOT NULL,
                target_file TEXT NOT NULL,
                kind TEXT NOT NULL CHECK (kind IN ('IMPORTS', 'INCLUDES', 'REQUIRES')),
                line INTEGER,
                alias TEXT,
                created_at TEXT NOT NULL,
                UNIQUE(source_file, target_file, kind)
            );

            CREATE INDEX IF NOT EXISTS idx_file_rel_source ON file_relationships(source_file);
            ",
        )?;
        Ok(())
    }

    pub fn register_entity(&self, entity: &Entity) -> Result<()> {
        Self::register_entity_on(&self.conn, entity)
    }

    pub fn register_entities(&self, entities: &[Entity]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        for entity in entities {
            Self::register_entity_on(&tx, entity)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn register_entity_on(conn: &Connection, entity: &Entity) -> Result<()> {
        conn.execute(
            "INSERT INTO entities (id, name, kind) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, kind = excluded.kind",
            params![entity.id, entity.name, entity.kind.as_str()],
        )?;
        Ok(())
    }

    pub fn entity(&self, id: &str) -> Result<Option<Entity>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, kind FROM entities WHERE id = ?1")?;
        let mut rows = stmt.query(params![id])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        let kind: String = row.get(2)?;
        Ok(Some(Entity {
            id: row.get(0)?,
            name: row.get(1)?,
            kind: EntityKind::parse(&kind)?,
        }))
    }

    /// Removes an entity and, through the cascade, every edge naming it as
    /// source or target. Removing an unknown entity is a no-op.
    pub fn remove_entity(&self, id: &str) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM entities WHERE id = ?1", params![id])?;
        if removed > 0 {
            debug!(entity = id, "removed entity and cascaded edges");
        }
        Ok(removed > 0)
    }

    /// Inserts one code edge. Identity is `(source, target, kind)`: a
    /// re-insert overwrites names, source_file, line, confidence and metadata
    /// while keeping the original row id, so insertion-order tie-breaks stay
    /// stable. Unknown source or target entities surface as Constraint.
    pub fn add_relationship(&self, edge: &CodeRelationship) -> Result<()> {
        Self::insert_code_edge_on(&self.conn, edge, &now_iso8601())
    }

    /// Inserts many code edges as one transaction: all or nothing.
    pub fn add_relationships_batch(&self, edges: &[CodeRelationship]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let stamp = now_iso8601();
        for edge in edges {
            Self::insert_code_edge_on(&tx, edge, &stamp)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn insert_code_edge_on(conn: &Connection, edge: &CodeRelationship, stamp: &str) -> Result<()> {
        let metadata = edge
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|err| crate::error::EngineError::validation("metadata", err.to_string()))?;
        conn.execute(
            "INSERT INTO code_relationships (
                source_id, target_id, kind, source_name, target_name,
                source_file, line, confidence, metadata, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(source_id, target_id, kind) DO UPDATE SET
                source_name = excluded.source_name,
                target_name = excluded.target_name,
                source_file = excluded.source_file,
                line = excluded.line,
                confidence = excluded.confidence,
                metadata = excluded.metadata",
            params![
                edge.source,
                edge.target,
                edge.kind.as_str(),
                edge.source_name,
                edge.target_name,
                edge.source_file,
                edge.line,
                edge.confidence.as_str(),
                metadata,
                stamp,
            ],
        )?;
        Ok(())
    }

    pub fn add_file_relationship(&self, edge: &FileRelationship) -> Result<()> {
        Self::insert_file_edge_on(&self.conn, edge, &now_iso8601())
    }

    pub fn add_file_relationships_batch(&self, edges: &[FileRelationship]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let stamp = now_iso8601();
        for edge in edges {
            Self::insert_file_edge_on(&tx, edge, &stamp)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn insert_file_edge_on(conn: &Connection, edge: &FileRelationship, stamp: &str) -> Result<()> {
        conn.execute(
            "INSERT INTO file_relationships (
                source_file, target_file, kind, line, alias, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(source_file, target_file, kind) DO UPDATE SET
                line = excluded.line,
                alias = excluded.alias",
            params![
                edge.source_file,
                edge.target_file,
                edge.kind.as_str(),
                edge.line,
                edge.alias,
                stamp,
            ],
        )?;
        Ok(())
    }

    /// The compound re-index operation: erase a file's previous contribution
    /// and insert its replacement edge set in one IMMEDIATE transaction, so a
    /// concurrent reader observes either the old or the new edge set, never a
    /// mix.
    pub fn replace_file_edges(
        &self,
        file: &str,
        entities: &[Entity],
        code: &[CodeRelationship],
        file_edges: &[FileRelationship],
    ) -> Result<()> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        for entity in entities {
            Self::register_entity_on(&tx, entity)?;
        }
        Self::clear_file_on(&tx, file)?;
        let stamp = now_iso8601();
        for edge in code {
            Self::insert_code_edge_on(&tx, edge, &stamp)?;
        }
        for edge in file_edges {
            Self::insert_file_edge_on(&tx, edge, &stamp)?;
        }
        tx.commit()?;
        debug!(
            file,
            code_edges = code.len(),
            file_edges = file_edges.len(),
            "replaced file edge set"
        );
        Ok(())
    }

    /// Idempotent: clearing a file with no recorded edges is a no-op.
    pub fn clear_relationships_for_file(&self, file: &str) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        Self::clear_file_on(&tx, file)?;
        tx.commit()?;
        debug!(file, "cleared relationships for file");
        Ok(())
    }

    fn clear_file_on(conn: &Connection, file: &str) -> Result<()> {
        conn.execute(
            "DELETE FROM code_relationships WHERE source_file = ?1",
            params![file],
        )?;
        conn.execute(
            "DELETE FROM file_relationships WHERE source_file = ?1",
            params![file],
        )?;
        Ok(())
    }

    pub fn outgoing_edges(&self, entity: &str) -> Result<Vec<RelationshipRow>> {
        self.query_rows(
            &format!(
                "SELECT {ROW_COLUMNS} FROM code_relationships
                 WHERE source_id = ?1 ORDER BY {CONFIDENCE_ORDER}"
            ),
            params![entity],
        )
    }

    pub fn incoming_edges(&self, entity: &str) -> Result<Vec<RelationshipRow>> {
        self.query_rows(
            &format!(
                "SELECT {ROW_COLUMNS} FROM code_relationships
                 WHERE target_id = ?1 ORDER BY {CONFIDENCE_ORDER}"
            ),
            params![entity],
        )
    }

    /// Call edges (CALLS or MAY_CALL) whose target display name matches.
    /// The limit is applied after confidence ordering, never before.
    pub fn call_edges_to_name(&self, name: &str, limit: Option<usize>) -> Result<Vec<RelationshipRow>> {
        self.query_rows(
            &format!(
                "SELECT {ROW_COLUMNS} FROM code_relationships
                 WHERE target_name = ?1 AND kind IN ('CALLS', 'MAY_CALL')
                 ORDER BY {CONFIDENCE_ORDER} LIMIT ?2"
            ),
            params![name, sql_limit(limit)],
        )
    }

    pub fn call_edges_from_name(&self, name: &str, limit: Option<usize>) -> Result<Vec<RelationshipRow>> {
        self.query_rows(
            &format!(
                "SELECT {ROW_COLUMNS} FROM code_relationships
                 WHERE source_name = ?1 AND kind IN ('CALLS', 'MAY_CALL')
                 ORDER BY {CONFIDENCE_ORDER} LIMIT ?2"
            ),
            params![name, sql_limit(limit)],
        )
    }

    fn query_rows(&self, sql: &str, args: impl rusqlite::Params) -> Result<Vec<RelationshipRow>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(args)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let kind: String = row.get(3)?;
            let confidence: String = row.get(8)?;
            let metadata: Option<String> = row.get(9)?;
            out.push(RelationshipRow {
                id: row.get(0)?,
                source: row.get(1)?,
                target: row.get(2)?,
                kind: RelationKind::parse(&kind)?,
                source_name: row.get(4)?,
                target_name: row.get(5)?,
                source_file: row.get(6)?,
                line: row.get(7)?,
                confidence: Confidence::parse(&confidence)?,
                metadata: metadata
                    .map(|raw| serde_json::from_str(&raw))
                    .transpose()
                    .map_err(|err| {
                        crate::error::EngineError::validation("metadata", err.to_string())
                    })?,
                created_at: row.get(10)?,
            });
        }
        Ok(out)
    }

    pub fn file_import_edges(&self) -> Result<Vec<FileRelationship>> {
        let mut stmt = self.conn.prepare(
            "SELECT source_file, target_file, kind, line, alias
             FROM file_relationships
             ORDER BY source_file, target_file, kind",
        )?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let kind: String = row.get(2)?;
            out.push(FileRelationship {
                source_file: row.get(0)?,
                target_file: row.get(1)?,
                kind: FileEdgeKind::parse(&kind)?,
                line: row.get(3)?,
                alias: row.get(4)?,
            });
        }
        Ok(out)
    }

    /// Live per-kind counts; no cached values, so the answer always reflects
    /// the current store state.
    pub fn stats(&self) -> Result<StoreStats> {
        let mut stats = StoreStats::default();

        let mut stmt = self.conn.prepare(
            "SELECT kind, COUNT(*) FROM code_relationships GROUP BY kind ORDER BY kind",
        )?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let kind: String = row.get(0)?;
            let count: u64 = row.get(1)?;
            stats.total_code += count;
            stats.code_by_kind.insert(kind, count);
        }

        let mut stmt = self.conn.prepare(
            "SELECT kind, COUNT(*) FROM file_relationships GROUP BY kind ORDER BY kind",
        )?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let kind: String = row.get(0)?;
            let count: u64 = row.get(1)?;
            stats.total_file += count;
            stats.file_by_kind.insert(kind, count);
        }

        Ok(stats)
    }
}

fn sql_limit(limit: Option<usize>) -> i64 {
    match limit {
        Some(value) => value as i64,
        None => -1,
    }
}

fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
