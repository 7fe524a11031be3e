use maildedup::actions::{execute, Action, ActionConfig, ActionError};
use maildedup::config::Config;
use maildedup::duplicates::{DuplicateFinder, FinderConfig, RunReport, Strategy};
use maildedup::mailbox::{open_all, BoxFormat, Mailbox, MboxStore};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

fn mail(subject: &str, hour: u32) -> String {
    format!(
        "Date: Mon, 1 Jan 2024 {hour:02}:00:00 +0000\nFrom: alice@example.com\n\
To: bob@example.com\nSubject: {subject}\nMessage-ID: <{subject}@example.com>\n\nbody of {subject}\n"
    )
}

/// A maildir with two copies of "dup" (08:00 and 20:00) and one "solo".
fn fixture() -> (TempDir, PathBuf) {
    let dir = tempdir().unwrap();
    let inbox = dir.path().join("inbox");
    for sub in ["cur", "new", "tmp"] {
        fs::create_dir_all(inbox.join(sub)).unwrap();
    }
    fs::write(inbox.join("cur/early"), mail("dup", 8)).unwrap();
    fs::write(inbox.join("cur/late"), mail("dup", 20)).unwrap();
    fs::write(inbox.join("cur/solo"), mail("solo", 12)).unwrap();
    (dir, inbox)
}

fn run(inbox: &Path) -> RunReport {
    let config = Config {
        strategy: Some(Strategy::KeepNewest),
        threads: 2,
        ..Config::default()
    };
    let finder = DuplicateFinder::new(FinderConfig::new(config)).unwrap();
    finder
        .find_duplicates(&open_all(&[inbox.to_path_buf()], None).unwrap())
        .unwrap()
}

fn count_messages(path: &Path) -> usize {
    Mailbox::open(path, None).unwrap().messages().unwrap().len()
}

#[test]
fn test_copy_discarded_to_mbox() {
    let (dir, inbox) = fixture();
    let export = dir.path().join("discarded.mbox");

    let report = run(&inbox);
    let result = execute(
        &report,
        &ActionConfig::new(Action::CopyDiscarded).with_export(export.clone(), BoxFormat::Mbox, false),
    )
    .unwrap();

    assert_eq!(result.targeted, 1);
    assert_eq!(result.copied, 1);
    assert_eq!(result.acted(), 1);
    assert!(inbox.join("cur/early").exists());

    let exported = MboxStore::open(&export).unwrap().messages().unwrap();
    assert_eq!(exported.len(), 1);
    let text = String::from_utf8_lossy(&exported[0].bytes);
    assert!(text.contains("08:00:00"));
    assert!(text.contains("Subject: dup"));
}

#[test]
fn test_copy_kept_to_mh() {
    let (dir, inbox) = fixture();
    let export = dir.path().join("kept");

    let report = run(&inbox);
    let result = execute(
        &report,
        &ActionConfig::new(Action::CopyKept).with_export(export.clone(), BoxFormat::Mh, false),
    )
    .unwrap();

    assert_eq!(result.copied, 2);
    assert_eq!(count_messages(&export), 2);
    assert_eq!(count_messages(&inbox), 3);
}

#[test]
fn test_move_discarded_to_maildir() {
    let (dir, inbox) = fixture();
    let export = dir.path().join("trash-box");

    let report = run(&inbox);
    let result = execute(
        &report,
        &ActionConfig::new(Action::MoveDiscarded)
            .with_export(export.clone(), BoxFormat::Maildir, false)
            .with_permanent(true),
    )
    .unwrap();

    assert_eq!(result.moved, 1);
    assert!(result.failures.is_empty());
    assert!(!inbox.join("cur/early").exists());
    assert!(inbox.join("cur/late").exists());
    assert!(inbox.join("cur/solo").exists());
    assert_eq!(count_messages(&export), 1);
}

#[test]
fn test_delete_discarded_from_maildir() {
    let (_dir, inbox) = fixture();

    let report = run(&inbox);
    let result = execute(
        &report,
        &ActionConfig::new(Action::DeleteDiscarded).with_permanent(true),
    )
    .unwrap();

    assert_eq!(result.deleted, 1);
    assert_eq!(count_messages(&inbox), 2);

    let rerun = run(&inbox);
    assert_eq!(rerun.stats.mail.duplicates, 0);
    assert_eq!(rerun.stats.mail.unique, 2);
}

#[test]
fn test_dry_run_touches_nothing() {
    let (dir, inbox) = fixture();
    let export = dir.path().join("out.mbox");

    let report = run(&inbox);
    let result = execute(
        &report,
        &ActionConfig::new(Action::MoveKept)
            .with_export(export.clone(), BoxFormat::Mbox, false)
            .with_dry_run(true),
    )
    .unwrap();

    assert!(result.dry_run);
    assert_eq!(result.targeted, 2);
    assert_eq!(result.moved, 2);
    assert!(!export.exists());
    assert_eq!(count_messages(&inbox), 3);
}

#[test]
fn test_existing_export_requires_append() {
    let (dir, inbox) = fixture();
    let export = dir.path().join("existing.mbox");
    fs::write(&export, b"").unwrap();

    let report = run(&inbox);
    let refused = execute(
        &report,
        &ActionConfig::new(Action::CopyDiscarded).with_export(export.clone(), BoxFormat::Mbox, false),
    );
    assert!(matches!(refused, Err(ActionError::Mailbox(_))));
    assert_eq!(fs::read(&export).unwrap(), b"");

    let appended = execute(
        &report,
        &ActionConfig::new(Action::CopyDiscarded).with_export(export.clone(), BoxFormat::Mbox, true),
    )
    .unwrap();
    assert_eq!(appended.copied, 1);
    assert_eq!(MboxStore::open(&export).unwrap().messages().unwrap().len(), 1);
}

#[test]
fn test_missing_export_is_refused() {
    let (_dir, inbox) = fixture();

    let report = run(&inbox);
    let result = execute(&report, &ActionConfig::new(Action::CopyKept));
    assert!(matches!(
        result,
        Err(ActionError::MissingExport(Action::CopyKept))
    ));
}

#[test]
fn test_undetermined_mails_are_never_targeted() {
    let (_dir, inbox) = fixture();
    let config = Config::default();
    let finder = DuplicateFinder::new(FinderConfig::new(config)).unwrap();
    let report = finder
        .find_duplicates(&open_all(&[inbox.clone()], None).unwrap())
        .unwrap();

    let result = execute(
        &report,
        &ActionConfig::new(Action::DeleteDiscarded).with_permanent(true),
    )
    .unwrap();
    assert_eq!(result.targeted, 0);
    assert_eq!(count_messages(&inbox), 3);
}
