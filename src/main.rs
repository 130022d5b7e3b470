use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use glob::glob;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;
use weft::config::{default_repo_config_yaml, expand_tilde, load_effective_config};
use weft::error::EngineError;
use weft::ingest::{apply_unit, parse_extraction_unit};
use weft::query::cycles::find_import_cycles;
use weft::query::deps::{dependencies_of, dependents_of, find_callees, find_callers};
use weft::query::graph::{Direction, call_graph};
use weft::query::impact::{ImpactReport, symbol_impact};
use weft::query::paths::find_paths;
use weft::query::{DEFAULT_CALL_LIMIT, TraversalBudget};
use weft::relation::RelationshipRow;
use weft::store::SqliteStore;

const CURSOR_STATE_FILE: &str = "ingest-state.json";

#[derive(Debug)]
struct CliError {
    code: &'static str,
    message: String,
}

impl CliError {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn io(code: &'static str, err: io::Error) -> Self {
        Self::new(code, err.to_string())
    }
}

impl From<EngineError> for CliError {
    fn from(value: EngineError) -> Self {
        Self::new(value.code(), value.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(value: serde_json::Error) -> Self {
        Self::new("json_error", value.to_string())
    }
}

#[derive(Parser, Debug)]
#[command(name = "weft")]
#[command(about = "A persistent map of who-calls-whom across a codebase")]
struct Cli {
    #[arg(long, global = true)]
    global: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Init,
    Index,
    Deps(EntityArgs),
    Rdeps(EntityArgs),
    Callers(CallArgs),
    Callees(CallArgs),
    Paths(PathsArgs),
    Graph(GraphArgs),
    Impact(ImpactArgs),
    Cycles(BudgetArgs),
    Stats,
    ClearFile(FileArgs),
    RemoveEntity(EntityArgs),
}

#[derive(Args, Debug)]
struct EntityArgs {
    entity: String,
}

#[derive(Args, Debug)]
struct FileArgs {
    file: String,
}

#[derive(Args, Debug)]
struct CallArgs {
    symbol: String,
    #[arg(long, default_value_t = DEFAULT_CALL_LIMIT)]
    limit: usize,
}

#[derive(Args, Debug)]
struct PathsArgs {
    source: String,
    target: String,
    #[arg(long, default_value_t = 5)]
    depth: usize,
    #[arg(long)]
    budget_ms: Option<u64>,
}

#[derive(Args, Debug)]
struct GraphArgs {
    symbol: String,
    #[arg(long, default_value = "callers")]
    direction: String,
    #[arg(long, default_value_t = 3)]
    depth: usize,
    #[arg(long)]
    budget_ms: Option<u64>,
}

#[derive(Args, Debug)]
struct ImpactArgs {
    entity: String,
    #[arg(long, default_value_t = 3)]
    depth: usize,
    #[arg(long)]
    budget_ms: Option<u64>,
}

#[derive(Args, Debug)]
struct BudgetArgs {
    #[arg(long)]
    budget_ms: Option<u64>,
}

#[derive(Debug, Clone)]
struct RepoPaths {
    root: PathBuf,
    store: PathBuf,
    cache_root: PathBuf,
    cursors: PathBuf,
    repo_config: PathBuf,
    user_config: PathBuf,
    mode: StorageMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StorageMode {
    RepoLocal,
    Global,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct IngestState {
    files: HashMap<String, IngestFileState>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IngestFileState {
    input_hash: String,
    unit_file: String,
}

fn main() -> ExitCode {
    init_tracing();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let payload = json!({
                "error": {
                    "code": err.code,
                    "message": err.message,
                }
            });
            eprintln!("{payload}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    let cwd = std::env::current_dir().map_err(|err| CliError::io("cwd_error", err))?;
    let paths = repo_paths(&cwd, cli.global)?;
    match cli.command {
        Command::Init => cmd_init(&paths),
        Command::Index => cmd_index(&cwd, &paths),
        Command::Deps(args) => cmd_deps(&paths, args),
        Command::Rdeps(args) => cmd_rdeps(&paths, args),
        Command::Callers(args) => cmd_callers(&paths, args),
        Command::Callees(args) => cmd_callees(&paths, args),
        Command::Paths(args) => cmd_paths(&cwd, &paths, args),
        Command::Graph(args) => cmd_graph(&cwd, &paths, args),
        Command::Impact(args) => cmd_impact(&cwd, &paths, args),
        Command::Cycles(args) => cmd_cycles(&cwd, &paths, args),
        Command::Stats => cmd_stats(&paths),
        Command::ClearFile(args) => cmd_clear_file(&paths, args),
        Command::RemoveEntity(args) => cmd_remove_entity(&paths, args),
    }
}

fn cmd_init(paths: &RepoPaths) -> Result<(), CliError> {
    fs::create_dir_all(&paths.root).map_err(|err| CliError::io("mkdir_error", err))?;
    fs::create_dir_all(&paths.cursors).map_err(|err| CliError::io("mkdir_error", err))?;
    let _ = SqliteStore::open(&path_string(&paths.store))?;
    write_default_config(paths)?;

    print_json(&json!({
        "status": "ok",
        "weft_dir": paths.root,
        "cache_dir": paths.cache_root,
        "store": paths.store,
        "mode": match paths.mode {
            StorageMode::RepoLocal => "repo",
            StorageMode::Global => "global",
        },
    }))
}

fn cmd_index(cwd: &Path, paths: &RepoPaths) -> Result<(), CliError> {
    require_initialized_paths(paths)?;
    let home = home_dir()?;
    let config = load_effective_config(cwd, Some(&paths.repo_config), Some(&paths.user_config))
        .map_err(|err| CliError::new("config_error", err.to_string()))?;
    if config.sources.is_empty() {
        return Err(CliError::new(
            "missing_sources",
            "no extraction sources configured; add sources in .weft/config.yml or ~/.weft/config.yml",
        ));
    }

    let candidates = resolve_source_files(cwd, &home, &config.sources, &config.exclude)?;
    let mut state = load_ingest_state(paths)?;
    let store = SqliteStore::open(&path_string(&paths.store))?;

    let mut scanned = 0usize;
    let mut indexed = 0usize;
    let mut skipped_unchanged = 0usize;
    let mut failures = Vec::new();

    for candidate in candidates {
        scanned += 1;
        let input = match fs::read_to_string(&candidate) {
            Ok(content) => content,
            Err(err) => {
                failures.push(json!({
                    "path": candidate,
                    "error": err.to_string(),
                }));
                continue;
            }
        };
        let input_hash = sha256_hex(&input);
        let state_key = candidate.to_string_lossy().into_owned();
        if let Some(prev) = state.files.get(&state_key)
            && prev.input_hash == input_hash
        {
            skipped_unchanged += 1;
            continue;
        }

        let unit = match parse_extraction_unit(&input) {
            Ok(unit) => unit,
            Err(err) => {
                failures.push(json!({
                    "path": candidate,
                    "error": err.to_string(),
                }));
                continue;
            }
        };
        if let Err(err) = apply_unit(&store, &unit) {
            failures.push(json!({
                "path": candidate,
                "file": unit.file,
                "error": err.to_string(),
            }));
            continue;
        }

        indexed += 1;
        state.files.insert(
            state_key,
            IngestFileState {
                input_hash,
                unit_file: unit.file,
            },
        );
    }

    save_ingest_state(paths, &state)?;

    print_json(&json!({
        "status": if failures.is_empty() { "ok" } else { "partial" },
        "scanned_inputs": scanned,
        "indexed_files": indexed,
        "skipped_unchanged": skipped_unchanged,
        "failure_count": failures.len(),
        "failures": failures,
    }))
}

fn cmd_deps(paths: &RepoPaths, args: EntityArgs) -> Result<(), CliError> {
    let store = open_store(paths)?;
    let edges = dependencies_of(&store, &args.entity)?;
    print_json(&json!({
        "entity": args.entity,
        "count": edges.len(),
        "dependencies": rows_to_json(&edges),
    }))
}

fn cmd_rdeps(paths: &RepoPaths, args: EntityArgs) -> Result<(), CliError> {
    let store = open_store(paths)?;
    let edges = dependents_of(&store, &args.entity)?;
    print_json(&json!({
        "entity": args.entity,
        "count": edges.len(),
        "dependents": rows_to_json(&edges),
    }))
}

fn cmd_callers(paths: &RepoPaths, args: CallArgs) -> Result<(), CliError> {
    let store = open_store(paths)?;
    let edges = find_callers(&store, &args.symbol, Some(args.limit))?;
    print_json(&json!({
        "symbol": args.symbol,
        "count": edges.len(),
        "callers": rows_to_json(&edges),
    }))
}

fn cmd_callees(paths: &RepoPaths, args: CallArgs) -> Result<(), CliError> {
    let store = open_store(paths)?;
    let edges = find_callees(&store, &args.symbol, Some(args.limit))?;
    print_json(&json!({
        "symbol": args.symbol,
        "count": edges.len(),
        "callees": rows_to_json(&edges),
    }))
}

fn cmd_paths(cwd: &Path, paths: &RepoPaths, args: PathsArgs) -> Result<(), CliError> {
    let store = open_store(paths)?;
    let budget = effective_budget(cwd, paths, args.budget_ms)?;
    let found = find_paths(&store, &args.source, &args.target, args.depth, budget)?;
    let rendered = found
        .iter()
        .map(|path| Value::Array(rows_to_json(path)))
        .collect::<Vec<_>>();
    print_json(&json!({
        "source": args.source,
        "target": args.target,
        "max_depth": args.depth,
        "count": rendered.len(),
        "paths": rendered,
    }))
}

fn cmd_graph(cwd: &Path, paths: &RepoPaths, args: GraphArgs) -> Result<(), CliError> {
    let store = open_store(paths)?;
    let direction = Direction::parse(&args.direction)?;
    let budget = effective_budget(cwd, paths, args.budget_ms)?;
    let nodes = call_graph(&store, &args.symbol, direction, args.depth, budget)?;
    let rendered = nodes
        .iter()
        .map(|node| {
            json!({
                "symbol": node.symbol,
                "file": node.file,
                "line": node.line,
                "depth": node.depth,
                "type": node.kind.as_str(),
                "confidence": node.confidence.as_str(),
            })
        })
        .collect::<Vec<_>>();
    print_json(&json!({
        "symbol": args.symbol,
        "direction": direction.as_str(),
        "max_depth": args.depth,
        "count": rendered.len(),
        "nodes": rendered,
    }))
}

fn cmd_impact(cwd: &Path, paths: &RepoPaths, args: ImpactArgs) -> Result<(), CliError> {
    let store = open_store(paths)?;
    let budget = effective_budget(cwd, paths, args.budget_ms)?;
    let report = symbol_impact(&store, &args.entity, args.depth, budget)?;
    print_json(&impact_to_json(&report, args.depth))
}

fn cmd_cycles(cwd: &Path, paths: &RepoPaths, args: BudgetArgs) -> Result<(), CliError> {
    let store = open_store(paths)?;
    let budget = effective_budget(cwd, paths, args.budget_ms)?;
    let cycles = find_import_cycles(&store, budget)?;
    print_json(&json!({
        "count": cycles.len(),
        "cycles": cycles,
    }))
}

fn cmd_stats(paths: &RepoPaths) -> Result<(), CliError> {
    let store = open_store(paths)?;
    let stats = store.stats()?;
    print_json(&json!({
        "code_by_kind": stats.code_by_kind,
        "file_by_kind": stats.file_by_kind,
        "total_code": stats.total_code,
        "total_file": stats.total_file,
        "total": stats.total(),
    }))
}

fn cmd_clear_file(paths: &RepoPaths, args: FileArgs) -> Result<(), CliError> {
    let store = open_store(paths)?;
    store.clear_relationships_for_file(&args.file)?;
    print_json(&json!({
        "status": "ok",
        "file": args.file,
    }))
}

fn cmd_remove_entity(paths: &RepoPaths, args: EntityArgs) -> Result<(), CliError> {
    let store = open_store(paths)?;
    let removed = store.remove_entity(&args.entity)?;
    print_json(&json!({
        "status": "ok",
        "entity": args.entity,
        "removed": removed,
    }))
}

fn open_store(paths: &RepoPaths) -> Result<SqliteStore, CliError> {
    require_initialized_paths(paths)?;
    Ok(SqliteStore::open(&path_string(&paths.store))?)
}

/// A `--budget-ms` flag beats the config's `budget_ms`; neither means the
/// traversal runs unbounded.
fn effective_budget(
    cwd: &Path,
    paths: &RepoPaths,
    flag: Option<u64>,
) -> Result<TraversalBudget, CliError> {
    let millis = match flag {
        Some(millis) => Some(millis),
        None => load_effective_config(cwd, Some(&paths.repo_config), Some(&paths.user_config))
            .map_err(|err| CliError::new("config_error", err.to_string()))?
            .budget_ms,
    };
    Ok(match millis {
        Some(millis) => TraversalBudget::wall_clock(Duration::from_millis(millis)),
        None => TraversalBudget::unlimited(),
    })
}

fn resolve_source_files(
    cwd: &Path,
    home: &Path,
    sources: &[String],
    exclude_patterns: &[String],
) -> Result<Vec<PathBuf>, CliError> {
    let mut out = Vec::new();
    let excludes = compile_excludes(cwd, home, exclude_patterns)?;

    for source in sources {
        let raw_path = source.trim();
        if raw_path.is_empty() {
            continue;
        }
        let expanded = expand_tilde(raw_path, home);
        let expanded = if expanded.is_absolute() {
            expanded
        } else {
            cwd.join(expanded)
        };
        let source_files = if looks_like_glob(raw_path) {
            glob_paths(&expanded)?
        } else if expanded.is_dir() {
            WalkDir::new(&expanded)
                .into_iter()
                .filter_map(Result::ok)
                .map(|entry| entry.path().to_path_buf())
                .filter(|path| path.is_file())
                .collect::<Vec<_>>()
        } else if expanded.is_file() {
            vec![expanded]
        } else {
            Vec::new()
        };

        for path in source_files {
            if is_excluded(&path, &excludes) {
                continue;
            }
            out.push(path);
        }
    }

    out.sort();
    out.dedup();
    Ok(out)
}

fn looks_like_glob(path: &str) -> bool {
    ['*', '?', '[', ']', '{', '}']
        .iter()
        .any(|ch| path.contains(*ch))
}

fn glob_paths(pattern: &Path) -> Result<Vec<PathBuf>, CliError> {
    let pattern_str = pattern.to_string_lossy();
    let mut out = Vec::new();
    let entries = glob(&pattern_str)
        .map_err(|err| CliError::new("glob_error", format!("{} ({pattern_str})", err.msg)))?;
    for entry in entries {
        match entry {
            Ok(path) if path.is_file() => out.push(path),
            Ok(_) => {}
            Err(err) => {
                return Err(CliError::new("glob_error", err.to_string()));
            }
        }
    }
    Ok(out)
}

fn compile_excludes(
    cwd: &Path,
    home: &Path,
    patterns: &[String],
) -> Result<Vec<glob::Pattern>, CliError> {
    let mut compiled = Vec::new();
    for pattern in patterns {
        let raw = pattern.trim();
        if raw.is_empty() {
            continue;
        }
        let expanded = expand_tilde(raw, home);
        let normalized = if expanded.is_absolute() {
            expanded.to_string_lossy().to_string()
        } else {
            cwd.join(expanded).to_string_lossy().to_string()
        };
        let compiled_pattern = glob::Pattern::new(&normalized)
            .map_err(|err| CliError::new("exclude_glob_error", err.to_string()))?;
        compiled.push(compiled_pattern);
    }
    Ok(compiled)
}

fn is_excluded(path: &Path, excludes: &[glob::Pattern]) -> bool {
    excludes.iter().any(|pattern| pattern.matches_path(path))
}

fn load_ingest_state(paths: &RepoPaths) -> Result<IngestState, CliError> {
    fs::create_dir_all(&paths.cursors).map_err(|err| CliError::io("mkdir_error", err))?;
    let state_path = paths.cursors.join(CURSOR_STATE_FILE);
    if !state_path.exists() {
        return Ok(IngestState::default());
    }
    let content = fs::read_to_string(&state_path).map_err(|err| CliError::io("read_error", err))?;
    serde_json::from_str::<IngestState>(&content)
        .map_err(|err| CliError::new("cursor_state_error", err.to_string()))
}

fn save_ingest_state(paths: &RepoPaths, state: &IngestState) -> Result<(), CliError> {
    fs::create_dir_all(&paths.cursors).map_err(|err| CliError::io("mkdir_error", err))?;
    let state_path = paths.cursors.join(CURSOR_STATE_FILE);
    let content = serde_json::to_string_pretty(state)
        .map_err(|err| CliError::new("cursor_state_error", err.to_string()))?;
    fs::write(state_path, content).map_err(|err| CliError::io("write_error", err))
}

fn rows_to_json(edges: &[RelationshipRow]) -> Vec<Value> {
    edges.iter().map(row_to_json).collect()
}

fn row_to_json(edge: &RelationshipRow) -> Value {
    json!({
        "source": edge.source,
        "target": edge.target,
        "type": edge.kind.as_str(),
        "source_name": edge.source_name,
        "target_name": edge.target_name,
        "source_file": edge.source_file,
        "line": edge.line,
        "confidence": edge.confidence.as_str(),
        "metadata": edge.metadata,
        "created_at": edge.created_at,
    })
}

fn impact_to_json(report: &ImpactReport, max_depth: usize) -> Value {
    let indirect = report
        .indirect
        .iter()
        .map(|node| {
            json!({
                "entity": node.entity,
                "name": node.name,
                "file": node.file,
                "depth": node.depth,
                "type": node.kind.as_str(),
                "confidence": node.confidence.as_str(),
            })
        })
        .collect::<Vec<_>>();

    json!({
        "entity": report.entity,
        "max_depth": max_depth,
        "direct": rows_to_json(&report.direct),
        "indirect": indirect,
        "affected_files": report.affected_files,
        "total_impact": report.total_impact,
    })
}

fn repo_paths(cwd: &Path, global: bool) -> Result<RepoPaths, CliError> {
    let home = home_dir()?;
    let (root, cache_root, mode) = if global {
        (
            home.join(".weft"),
            home.join(".weft-cache"),
            StorageMode::Global,
        )
    } else {
        (
            cwd.join(".weft"),
            cwd.join(".weft-cache"),
            StorageMode::RepoLocal,
        )
    };

    Ok(RepoPaths {
        store: root.join("graph.sqlite"),
        cursors: cache_root.join("cursors"),
        repo_config: cwd.join(".weft").join("config.yml"),
        user_config: home.join(".weft").join("config.yml"),
        root,
        cache_root,
        mode,
    })
}

fn require_initialized_paths(paths: &RepoPaths) -> Result<(), CliError> {
    if !paths.root.exists() || !paths.store.exists() {
        return Err(CliError::new(
            "not_initialized",
            "graph store is not initialized; run `weft init`",
        ));
    }
    Ok(())
}

fn write_default_config(paths: &RepoPaths) -> Result<(), CliError> {
    let config_path = match paths.mode {
        StorageMode::RepoLocal => &paths.repo_config,
        StorageMode::Global => &paths.user_config,
    };
    if config_path.exists() {
        return Ok(());
    }
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(|err| CliError::io("mkdir_error", err))?;
    }
    fs::write(config_path, default_repo_config_yaml())
        .map_err(|err| CliError::io("write_error", err))
}

fn home_dir() -> Result<PathBuf, CliError> {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .ok_or_else(|| CliError::new("home_error", "HOME environment variable is not set"))
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string(value)?;
    println!("{rendered}");
    Ok(())
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{byte:02x}");
    }
    out
}
