use serde::Deserialize;
use serde_json::Value;

use crate::error::{EngineError, Result};
use crate::relation::{
    CodeRelationship, Confidence, Entity, EntityKind, FileEdgeKind, FileRelationship,
    RelationKind,
};
use crate::store::SqliteStore;

/// One extractor output: the complete edge set for a single source file, as
/// JSONL. The first record must be the `unit` header naming the file; every
/// `edge` and `file_edge` that follows is attributed to it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionUnit {
    pub file: String,
    pub entities: Vec<Entity>,
    pub code: Vec<CodeRelationship>,
    pub file_edges: Vec<FileRelationship>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
enum WireRecord {
    Unit {
        file: String,
    },
    Entity {
        id: String,
        name: Option<String>,
        #[serde(default = "default_entity_kind")]
        kind: String,
    },
    Edge {
        source: String,
        target: String,
        #[serde(rename = "type")]
        kind: String,
        source_name: Option<String>,
        target_name: Option<String>,
        line: Option<u32>,
        #[serde(default = "default_confidence")]
        confidence: String,
        metadata: Option<Value>,
    },
    FileEdge {
        target_file: String,
        #[serde(rename = "type")]
        kind: String,
        line: Option<u32>,
        alias: Option<String>,
    },
}

fn default_entity_kind() -> String {
    "symbol".to_string()
}

fn default_confidence() -> String {
    "CERTAIN".to_string()
}

pub fn parse_extraction_unit(input: &str) -> Result<ExtractionUnit> {
    let mut unit: Option<ExtractionUnit> = None;

    for (idx, line) in input.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: WireRecord = serde_json::from_str(line)
            .map_err(|err| line_error(idx, &err.to_string()))?;

        match record {
            WireRecord::Unit { file } => {
                if unit.is_some() {
                    return Err(line_error(idx, "second unit header in one extraction"));
                }
                unit = Some(ExtractionUnit {
                    file,
                    entities: Vec::new(),
                    code: Vec::new(),
                    file_edges: Vec::new(),
                });
            }
            WireRecord::Entity { id, name, kind } => {
                let unit = unit
                    .as_mut()
                    .ok_or_else(|| line_error(idx, "record before unit header"))?;
                unit.entities.push(Entity {
                    name: name.unwrap_or_else(|| id.clone()),
                    kind: EntityKind::parse(&kind)?,
                    id,
                });
            }
            WireRecord::Edge {
                source,
                target,
                kind,
                source_name,
                target_name,
                line,
                confidence,
                metadata,
            } => {
                let unit = unit
                    .as_mut()
                    .ok_or_else(|| line_error(idx, "record before unit header"))?;
                unit.code.push(CodeRelationship {
                    source_name: source_name.unwrap_or_else(|| source.clone()),
                    target_name: target_name.unwrap_or_else(|| target.clone()),
                    source,
                    target,
                    kind: RelationKind::parse(&kind)?,
                    source_file: unit.file.clone(),
                    line,
                    confidence: Confidence::parse(&confidence)?,
                    metadata,
                });
            }
            WireRecord::FileEdge {
                target_file,
                kind,
                line,
                alias,
            } => {
                let unit = unit
                    .as_mut()
                    .ok_or_else(|| line_error(idx, "record before unit header"))?;
                unit.file_edges.push(FileRelationship {
                    source_file: unit.file.clone(),
                    target_file,
                    kind: FileEdgeKind::parse(&kind)?,
                    line,
                    alias,
                });
            }
        }
    }

    unit.ok_or_else(|| EngineError::validation("extraction", "no unit header"))
}

/// Applies one parsed unit: registers its entities and replaces the file's
/// entire edge contribution in a single transaction (see
/// [`SqliteStore::replace_file_edges`]).
pub fn apply_unit(store: &SqliteStore, unit: &ExtractionUnit) -> Result<()> {
    store.replace_file_edges(&unit.file, &unit.entities, &unit.code, &unit.file_edges)
}

fn line_error(idx: usize, detail: &str) -> EngineError {
    EngineError::validation("record", format!("line {}: {detail}", idx + 1))
}
