use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;

fn run_cli(repo: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_weft"))
        .current_dir(repo)
        .env("HOME", repo.join("home"))
        .args(args)
        .output()
        .expect("command runs")
}

fn run_json(repo: &Path, args: &[&str]) -> Value {
    let output = run_cli(repo, args);
    assert!(
        output.status.success(),
        "command failed: args={args:?}\nstdout={}\nstderr={}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("json stdout")
}

fn run_error(repo: &Path, args: &[&str]) -> Value {
    let output = run_cli(repo, args);
    assert!(
        !output.status.success(),
        "command unexpectedly succeeded: args={args:?}\nstdout={}",
        String::from_utf8_lossy(&output.stdout)
    );
    serde_json::from_slice(&output.stderr).expect("json stderr")
}

const APP_UNIT: &str = concat!(
    r#"{"t":"unit","file":"src/app.py"}"#,
    "\n",
    r#"{"t":"entity","id":"py:app.main","name":"main"}"#,
    "\n",
    r#"{"t":"entity","id":"py:lib.helper","name":"helper"}"#,
    "\n",
    r#"{"t":"edge","source":"py:app.main","target":"py:lib.helper","type":"CALLS","source_name":"main","target_name":"helper","line":12}"#,
    "\n",
    r#"{"t":"file_edge","target_file":"src/lib.py","type":"IMPORTS","line":1}"#,
    "\n"
);

const LIB_UNIT: &str = concat!(
    r#"{"t":"unit","file":"src/lib.py"}"#,
    "\n",
    r#"{"t":"entity","id":"py:lib.helper","name":"helper"}"#,
    "\n",
    r#"{"t":"entity","id":"py:lib.util","name":"util"}"#,
    "\n",
    r#"{"t":"edge","source":"py:lib.helper","target":"py:lib.util","type":"CALLS","source_name":"helper","target_name":"util","line":4}"#,
    "\n",
    r#"{"t":"file_edge","target_file":"src/app.py","type":"IMPORTS","line":2}"#,
    "\n"
);

fn seed_repo(repo: &Path) {
    fs::create_dir_all(repo.join("extract")).expect("extract dir");
    fs::write(repo.join("extract/app.jsonl"), APP_UNIT).expect("app unit");
    fs::write(repo.join("extract/lib.jsonl"), LIB_UNIT).expect("lib unit");
}

#[test]
fn init_index_query_roundtrip() {
    let temp = tempfile::tempdir().expect("tempdir");
    let repo = temp.path();
    seed_repo(repo);

    let init = run_json(repo, &["init"]);
    assert_eq!(init["status"], "ok");
    assert_eq!(init["mode"], "repo");

    let index = run_json(repo, &["index"]);
    assert_eq!(index["status"], "ok");
    assert_eq!(index["scanned_inputs"], 2);
    assert_eq!(index["indexed_files"], 2);
    assert_eq!(index["failure_count"], 0);

    let stats = run_json(repo, &["stats"]);
    assert_eq!(stats["code_by_kind"]["CALLS"], 2);
    assert_eq!(stats["file_by_kind"]["IMPORTS"], 2);
    assert_eq!(stats["total"], 4);

    let callers = run_json(repo, &["callers", "helper"]);
    assert_eq!(callers["count"], 1);
    assert_eq!(callers["callers"][0]["source"], "py:app.main");
    assert_eq!(callers["callers"][0]["line"], 12);

    let deps = run_json(repo, &["deps", "py:app.main"]);
    assert_eq!(deps["count"], 1);
    assert_eq!(deps["dependencies"][0]["target"], "py:lib.helper");

    let rdeps = run_json(repo, &["rdeps", "py:lib.util"]);
    assert_eq!(rdeps["count"], 1);
    assert_eq!(rdeps["dependents"][0]["source"], "py:lib.helper");

    let paths = run_json(repo, &["paths", "py:app.main", "py:lib.util", "--depth", "3"]);
    assert_eq!(paths["count"], 1);
    assert_eq!(paths["paths"][0].as_array().expect("hops").len(), 2);

    let impact = run_json(repo, &["impact", "py:lib.util", "--depth", "3"]);
    assert_eq!(impact["total_impact"], 2);
    assert_eq!(impact["direct"][0]["source"], "py:lib.helper");
    assert_eq!(impact["indirect"][0]["entity"], "py:app.main");
    assert_eq!(impact["indirect"][0]["depth"], 2);

    let graph = run_json(repo, &["graph", "util", "--direction", "callers"]);
    assert_eq!(graph["count"], 2);
    assert_eq!(graph["nodes"][0]["symbol"], "helper");
    assert_eq!(graph["nodes"][0]["depth"], 1);
    assert_eq!(graph["nodes"][1]["symbol"], "main");
    assert_eq!(graph["nodes"][1]["depth"], 2);

    let cycles = run_json(repo, &["cycles"]);
    assert_eq!(cycles["count"], 1);
    assert_eq!(
        cycles["cycles"][0],
        serde_json::json!(["src/app.py", "src/lib.py", "src/app.py"])
    );
}

#[test]
fn reindex_skips_unchanged_and_picks_up_edits() {
    let temp = tempfile::tempdir().expect("tempdir");
    let repo = temp.path();
    seed_repo(repo);
    let _ = run_json(repo, &["init"]);
    let _ = run_json(repo, &["index"]);

    let second = run_json(repo, &["index"]);
    assert_eq!(second["indexed_files"], 0);
    assert_eq!(second["skipped_unchanged"], 2);

    let edited = APP_UNIT.replace("\"CALLS\"", "\"MAY_CALL\"");
    fs::write(repo.join("extract/app.jsonl"), edited).expect("edit app unit");

    let third = run_json(repo, &["index"]);
    assert_eq!(third["indexed_files"], 1);
    assert_eq!(third["skipped_unchanged"], 1);

    let callers = run_json(repo, &["callers", "helper"]);
    assert_eq!(callers["count"], 1);
    assert_eq!(callers["callers"][0]["type"], "MAY_CALL");
}

#[test]
fn clear_file_and_remove_entity_prune_the_graph() {
    let temp = tempfile::tempdir().expect("tempdir");
    let repo = temp.path();
    seed_repo(repo);
    let _ = run_json(repo, &["init"]);
    let _ = run_json(repo, &["index"]);

    let cleared = run_json(repo, &["clear-file", "src/app.py"]);
    assert_eq!(cleared["status"], "ok");
    let callers = run_json(repo, &["callers", "helper"]);
    assert_eq!(callers["count"], 0);

    let removed = run_json(repo, &["remove-entity", "py:lib.util"]);
    assert_eq!(removed["removed"], true);
    let rdeps = run_json(repo, &["rdeps", "py:lib.util"]);
    assert_eq!(rdeps["count"], 0);

    let missing = run_json(repo, &["remove-entity", "py:lib.util"]);
    assert_eq!(missing["removed"], false);
}

#[test]
fn errors_arrive_as_a_json_envelope_on_stderr() {
    let temp = tempfile::tempdir().expect("tempdir");
    let repo = temp.path();

    let uninitialized = run_error(repo, &["stats"]);
    assert_eq!(uninitialized["error"]["code"], "not_initialized");

    let _ = run_json(repo, &["init"]);
    let bad_depth = run_error(repo, &["paths", "a", "b", "--depth", "0"]);
    assert_eq!(bad_depth["error"]["code"], "validation_error");

    let bad_direction = run_error(repo, &["graph", "a", "--direction", "sideways"]);
    assert_eq!(bad_direction["error"]["code"], "validation_error");

    fs::create_dir_all(repo.join("extract")).expect("extract dir");
    fs::write(
        repo.join("extract/broken.jsonl"),
        "{\"t\":\"edge\",\"source\":\"a\",\"target\":\"b\",\"type\":\"CALLS\"}\n",
    )
    .expect("broken unit");
    let index = run_json(repo, &["index"]);
    assert_eq!(index["status"], "partial");
    assert_eq!(index["indexed_files"], 0);
    assert_eq!(index["failure_count"], 1);
}
