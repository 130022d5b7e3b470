use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RelationKind {
    Calls,
    MayCall,
    Imports,
    Uses,
    Inherits,
    Implements,
    Defines,
    References,
}

impl RelationKind {
    pub const ALL: [RelationKind; 8] = [
        RelationKind::Calls,
        RelationKind::MayCall,
        RelationKind::Imports,
        RelationKind::Uses,
        RelationKind::Inherits,
        RelationKind::Implements,
        RelationKind::Defines,
        RelationKind::References,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Calls => "CALLS",
            Self::MayCall => "MAY_CALL",
            Self::Imports => "IMPORTS",
            Self::Uses => "USES",
            Self::Inherits => "INHERITS",
            Self::Implements => "IMPLEMENTS",
            Self::Defines => "DEFINES",
            Self::References => "REFERENCES",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, EngineError> {
        match raw {
            "CALLS" => Ok(Self::Calls),
            "MAY_CALL" => Ok(Self::MayCall),
            "IMPORTS" => Ok(Self::Imports),
            "USES" => Ok(Self::Uses),
            "INHERITS" => Ok(Self::Inherits),
            "IMPLEMENTS" => Ok(Self::Implements),
            "DEFINES" => Ok(Self::Defines),
            "REFERENCES" => Ok(Self::References),
            _ => Err(EngineError::validation("relationship_type", raw)),
        }
    }

    pub fn is_call(self) -> bool {
        matches!(self, Self::Calls | Self::MayCall)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FileEdgeKind {
    Imports,
    Includes,
    Requires,
}

impl FileEdgeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Imports => "IMPORTS",
            Self::Includes => "INCLUDES",
            Self::Requires => "REQUIRES",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, EngineError> {
        match raw {
            "IMPORTS" => Ok(Self::Imports),
            "INCLUDES" => Ok(Self::Includes),
            "REQUIRES" => Ok(Self::Requires),
            _ => Err(EngineError::validation("file_relationship_type", raw)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Confidence {
    Certain,
    Likely,
    Possible,
}

impl Confidence {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Certain => "CERTAIN",
            Self::Likely => "LIKELY",
            Self::Possible => "POSSIBLE",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, EngineError> {
        match raw {
            "CERTAIN" => Ok(Self::Certain),
            "LIKELY" => Ok(Self::Likely),
            "POSSIBLE" => Ok(Self::Possible),
            _ => Err(EngineError::validation("confidence", raw)),
        }
    }

    // Sort key: lower ranks order first, so CERTAIN edges lead result sets.
    pub fn rank(self) -> i64 {
        match self {
            Self::Certain => 0,
            Self::Likely => 1,
            Self::Possible => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Symbol,
    File,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Symbol => "symbol",
            Self::File => "file",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, EngineError> {
        match raw {
            "symbol" => Ok(Self::Symbol),
            "file" => Ok(Self::File),
            _ => Err(EngineError::validation("entity_kind", raw)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub id: String,
    pub name: String,
    pub kind: EntityKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CodeRelationship {
    pub source: String,
    pub target: String,
    pub kind: RelationKind,
    pub source_name: String,
    pub target_name: String,
    pub source_file: String,
    pub line: Option<u32>,
    pub confidence: Confidence,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRelationship {
    pub source_file: String,
    pub target_file: String,
    pub kind: FileEdgeKind,
    pub line: Option<u32>,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipRow {
    pub id: i64,
    pub source: String,
    pub target: String,
    pub kind: RelationKind,
    pub source_name: String,
    pub target_name: String,
    pub source_file: String,
    pub line: Option<u32>,
    pub confidence: Confidence,
    pub metadata: Option<Value>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StoreStats {
    pub code_by_kind: BTreeMap<String, u64>,
    pub file_by_kind: BTreeMap<String, u64>,
    pub total_code: u64,
    pub total_file: u64,
}

impl StoreStats {
    pub fn total(&self) -> u64 {
        self.total_code + self.total_file
    }
}
