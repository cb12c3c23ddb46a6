//! Integration tests for the CLI binary.

use assert_cmd::Command;
use predicates::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

mod common;

use common::{TestResult, input_path, store_spec, write_jsonl};

fn cli() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("series-store"))
}

fn write_cmd(mode: &str, store: &str, key: &str, input: &std::path::Path) -> Command {
    let mut cmd = cli();
    cmd.args([
        mode,
        "--store",
        store,
        "--key",
        key,
        "--input",
        input.to_string_lossy().as_ref(),
    ]);
    cmd
}

/// Output line `"<mode> <key>: version N created at T"` -> T.
fn created_at(stdout: &[u8]) -> String {
    let text = String::from_utf8_lossy(stdout);
    text.trim()
        .rsplit(' ')
        .next()
        .unwrap_or_default()
        .to_string()
}

#[test]
fn write_append_update_and_read_as_of() -> TestResult {
    let tmp = TempDir::new()?;
    let store = store_spec(&tmp, "");

    let initial = input_path(&tmp, "initial.jsonl");
    write_jsonl(&initial, &[("2021-01-04", 1.0, 1.5), ("2021-01-05", 2.0, 2.5)])?;
    let more = input_path(&tmp, "more.jsonl");
    write_jsonl(&more, &[("2021-01-06", 3.0, 3.5), ("2021-01-07", 4.0, 4.5)])?;
    let scaled = input_path(&tmp, "scaled.jsonl");
    write_jsonl(&scaled, &[("2021-01-06", 30.0, 35.0), ("2021-01-07", 40.0, 45.0)])?;

    write_cmd("write", &store, "EURUSD", &initial)
        .assert()
        .success()
        .stdout(contains("version 1"));

    let appended = write_cmd("append", &store, "EURUSD", &more)
        .assert()
        .success()
        .stdout(contains("version 2"));
    let after_append = created_at(&appended.get_output().stdout);

    write_cmd("update", &store, "EURUSD", &scaled)
        .assert()
        .success()
        .stdout(contains("version 3"));

    cli()
        .args(["read", "--store", &store, "--key", "EURUSD"])
        .assert()
        .success()
        .stdout(contains("total_rows: 4"))
        .stdout(contains("40"))
        .stdout(contains("Preview output"));

    cli()
        .args([
            "read",
            "--store",
            &store,
            "--key",
            "EURUSD",
            "--as-of",
            &after_append,
            "--start",
            "2021-01-06",
            "--field",
            "bid",
        ])
        .assert()
        .success()
        .stdout(contains("total_rows: 2"))
        .stdout(contains("│ 4 "))
        .stdout(contains("40").not())
        .stdout(contains("ask").not());

    cli()
        .args(["versions", "--store", &store, "--key", "EURUSD"])
        .assert()
        .success()
        .stdout(contains("1\t").and(contains("\twrite\t")))
        .stdout(contains("\tappend\trows=4"))
        .stdout(contains("\tupdate\trows=4"));

    cli()
        .args(["keys", "--store", &store])
        .assert()
        .success()
        .stdout("EURUSD\n");

    Ok(())
}

#[test]
fn read_writes_csv_and_jsonl_files() -> TestResult {
    let tmp = TempDir::new()?;
    let store = store_spec(&tmp, "library=fx");
    let rows = input_path(&tmp, "rows.jsonl");
    write_jsonl(
        &rows,
        &[("2021-01-04", 1.0, 1.5), ("2021-01-05", 2.0, 2.5), ("2021-01-06", 3.0, 3.5)],
    )?;
    write_cmd("write", &store, "k", &rows).assert().success();

    let csv = tmp.path().join("out.csv");
    cli()
        .args([
            "read",
            "--store",
            &store,
            "--key",
            "k",
            "--filter",
            "bid >= 2",
            "--max-rows",
            "0",
            "--output",
            csv.to_string_lossy().as_ref(),
        ])
        .assert()
        .success()
        .stdout(contains("preview suppressed"))
        .stdout(contains("total_rows: 2"))
        .stdout(contains("wrote:"));
    let text = std::fs::read_to_string(&csv)?;
    assert_eq!(text.lines().count(), 3);
    assert!(text.starts_with("ts,ask,bid"));

    let jsonl = tmp.path().join("out.jsonl");
    cli()
        .args([
            "read",
            "--store",
            &store,
            "--key",
            "k",
            "--output",
            jsonl.to_string_lossy().as_ref(),
            "--format",
            "jsonl",
        ])
        .assert()
        .success();
    assert_eq!(std::fs::read_to_string(&jsonl)?.lines().count(), 3);
    Ok(())
}

#[test]
fn errors_go_to_stderr_with_status_1() -> TestResult {
    let tmp = TempDir::new()?;
    let store = store_spec(&tmp, "");
    let rows = input_path(&tmp, "rows.jsonl");
    write_jsonl(&rows, &[("2021-01-04", 1.0, 1.5)])?;

    write_cmd("append", &store, "missing", &rows)
        .assert()
        .failure()
        .code(1)
        .stderr(contains("not found"));

    write_cmd("write", &store, "k", &rows).assert().success();
    write_cmd("append", &store, "k", &rows)
        .assert()
        .code(1)
        .stderr(contains("not after"));

    cli()
        .args(["read", "--store", &store, "--key", "k", "--field", "mid"])
        .assert()
        .code(1)
        .stderr(contains("Unknown field"));

    cli()
        .args(["read", "--store", &store, "--key", "k", "--filter", "bid >"])
        .assert()
        .code(1)
        .stderr(contains("Invalid --filter"));

    cli()
        .args(["keys", "--store", &format!("{store}?nonsense=1")])
        .assert()
        .code(1)
        .stderr(contains("Invalid configuration"));

    let bad = input_path(&tmp, "bad.jsonl");
    std::fs::write(&bad, "{\"bid\": 1}\n")?;
    write_cmd("write", &store, "k", &bad)
        .assert()
        .code(1)
        .stderr(contains("bad.jsonl:1"));
    Ok(())
}

#[test]
fn prune_flag_keeps_one_version() -> TestResult {
    let tmp = TempDir::new()?;
    let store = store_spec(&tmp, "");
    let first = input_path(&tmp, "first.jsonl");
    write_jsonl(&first, &[("2021-01-04", 1.0, 1.5)])?;
    let second = input_path(&tmp, "second.jsonl");
    write_jsonl(&second, &[("2021-01-05", 2.0, 2.5)])?;

    write_cmd("write", &store, "k", &first).assert().success();
    let mut cmd = write_cmd("append", &store, "k", &second);
    cmd.arg("--prune").assert().success();

    let out = cli()
        .args(["versions", "--store", &store, "--key", "k"])
        .assert()
        .success();
    let text = String::from_utf8_lossy(&out.get_output().stdout).to_string();
    assert_eq!(text.lines().count(), 1);
    assert!(text.starts_with("2\t"));
    Ok(())
}

#[test]
fn store_option_prunes_without_flag() -> TestResult {
    let tmp = TempDir::new()?;
    let store = store_spec(&tmp, "prune_previous_versions=true");
    let first = input_path(&tmp, "first.jsonl");
    write_jsonl(&first, &[("2021-01-04", 1.0, 1.5)])?;
    let second = input_path(&tmp, "second.jsonl");
    write_jsonl(&second, &[("2021-01-05", 2.0, 2.5)])?;

    write_cmd("write", &store, "k", &first).assert().success();
    write_cmd("append", &store, "k", &second).assert().success();

    let out = cli()
        .args(["versions", "--store", &store, "--key", "k"])
        .assert()
        .success();
    let text = String::from_utf8_lossy(&out.get_output().stdout).to_string();
    assert_eq!(text.lines().count(), 1, "{text}");
    assert!(text.starts_with("2\t"));
    assert!(text.trim_end().ends_with("rows=2"));
    Ok(())
}
