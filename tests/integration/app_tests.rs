use clap::Parser;
use maildedup::cli::Cli;
use maildedup::error::ExitCode;
use maildedup::run_app;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

fn mail(subject: &str, hour: u32) -> String {
    format!(
        "Date: Mon, 1 Jan 2024 {hour:02}:00:00 +0000\nFrom: alice@example.com\n\
To: bob@example.com\nSubject: {subject}\nMessage-ID: <{subject}@example.com>\n\nhello\n"
    )
}

fn maildir_fixture() -> (TempDir, PathBuf) {
    let dir = tempdir().unwrap();
    let inbox = dir.path().join("inbox");
    for sub in ["cur", "new", "tmp"] {
        fs::create_dir_all(inbox.join(sub)).unwrap();
    }
    fs::write(inbox.join("cur/1"), mail("dup", 8)).unwrap();
    fs::write(inbox.join("cur/2"), mail("dup", 20)).unwrap();
    fs::write(inbox.join("new/3"), mail("solo", 12)).unwrap();
    (dir, inbox)
}

fn run(args: &[&str]) -> anyhow::Result<ExitCode> {
    let mut argv = vec!["maildedup", "--quiet", "--no-color"];
    argv.extend_from_slice(args);
    run_app(Cli::try_parse_from(argv).unwrap())
}

fn arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn test_dedupe_writes_json_report() {
    let (dir, inbox) = maildir_fixture();
    let report_path = dir.path().join("report.json");

    let code = run(&[
        "dedupe",
        arg(&inbox),
        "--strategy",
        "keep-newest",
        "-o",
        "json",
        "--output-file",
        arg(&report_path),
    ])
    .unwrap();
    assert_eq!(code, ExitCode::Success);

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(json["summary"]["mail"]["found"], 3);
    assert_eq!(json["summary"]["mail"]["discarded"], 1);
    assert_eq!(json["summary"]["sets"]["deduplicated"], 1);
    assert_eq!(json["summary"]["exit_code_name"], "MD000");
    assert!(json["action"].is_null());

    // Nothing was touched without an action.
    assert!(inbox.join("cur/1").exists());
}

#[test]
fn test_dedupe_writes_csv_report() {
    let (dir, inbox) = maildir_fixture();
    let report_path = dir.path().join("report.csv");

    run(&[
        "dedupe",
        arg(&inbox),
        "-s",
        "discard-older",
        "-o",
        "csv",
        "--output-file",
        arg(&report_path),
    ])
    .unwrap();

    let csv = fs::read_to_string(&report_path).unwrap();
    let mut lines = csv.lines();
    assert!(lines.next().unwrap().starts_with("set_id,"));
    let rows: Vec<&str> = lines.collect();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows.iter().filter(|r| r.contains("discarded")).count(), 1);
}

#[test]
fn test_dedupe_text_report_and_delete_action() {
    let (dir, inbox) = maildir_fixture();
    let report_path = dir.path().join("report.txt");

    run(&[
        "dedupe",
        arg(&inbox),
        "-s",
        "keep-newest",
        "-a",
        "delete-discarded",
        "--permanent",
        "--output-file",
        arg(&report_path),
    ])
    .unwrap();

    assert!(!inbox.join("cur/1").exists());
    assert!(inbox.join("cur/2").exists());
    assert!(inbox.join("new/3").exists());

    let text = fs::read_to_string(&report_path).unwrap();
    assert!(text.contains("delete-discarded"));
    assert!(!text.contains('\u{1b}'));
}

#[test]
fn test_move_without_export_is_usage_error() {
    let (_dir, inbox) = maildir_fixture();

    let err = run(&["dedupe", arg(&inbox), "-s", "keep-newest", "-a", "move-discarded"])
        .unwrap_err();
    assert_eq!(ExitCode::for_error(&err), ExitCode::UsageError);
    assert!(inbox.join("cur/1").exists());
}

#[test]
fn test_path_strategy_without_regexp_is_usage_error() {
    let (_dir, inbox) = maildir_fixture();

    let err = run(&["dedupe", arg(&inbox), "-s", "discard-matching-path"]).unwrap_err();
    assert_eq!(ExitCode::for_error(&err), ExitCode::UsageError);
}

#[test]
fn test_missing_config_file_is_usage_error() {
    let (dir, inbox) = maildir_fixture();
    let missing = dir.path().join("nope.toml");

    let err = run(&["--config", arg(&missing), "dedupe", arg(&inbox)]).unwrap_err();
    assert_eq!(ExitCode::for_error(&err), ExitCode::UsageError);
}

#[test]
fn test_config_file_strategy_is_used() {
    let (dir, inbox) = maildir_fixture();
    let config = dir.path().join("config.toml");
    fs::write(&config, "strategy = \"keep-oldest\"\n").unwrap();
    let report_path = dir.path().join("report.json");

    run(&[
        "--config",
        arg(&config),
        "dedupe",
        arg(&inbox),
        "-o",
        "json",
        "--output-file",
        arg(&report_path),
    ])
    .unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&report_path).unwrap()).unwrap();
    let set = json["sets"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["members"].as_array().unwrap().len() == 2)
        .unwrap();
    let kept: Vec<&str> = set["members"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|m| m["disposition"] == "kept")
        .map(|m| m["source_ref"].as_str().unwrap())
        .collect();
    assert_eq!(kept.len(), 1);
    assert!(kept[0].ends_with("cur/1"));
}

#[test]
fn test_unknown_mailbox_is_general_error() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("missing");

    let err = run(&["dedupe", arg(&missing)]).unwrap_err();
    assert_eq!(ExitCode::for_error(&err), ExitCode::GeneralError);
}

#[test]
fn test_hash_subcommand() {
    let dir = tempdir().unwrap();
    let message = dir.path().join("message.eml");
    fs::write(&message, mail("hash-me", 9)).unwrap();

    assert_eq!(
        run(&["hash", arg(&message), "-o", "json"]).unwrap(),
        ExitCode::Success
    );
    assert_eq!(run(&["hash", arg(&message)]).unwrap(), ExitCode::Success);
}

#[test]
fn test_hash_missing_file_fails() {
    let dir = tempdir().unwrap();
    let err = run(&["hash", arg(&dir.path().join("absent.eml"))]).unwrap_err();
    assert_eq!(ExitCode::for_error(&err), ExitCode::GeneralError);
}
