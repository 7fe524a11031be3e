use maildedup::actions::{execute, Action, ActionConfig};
use maildedup::config::Config;
use maildedup::duplicates::{DuplicateFinder, FinderConfig, Strategy};
use maildedup::mailbox::{Location, Mailbox, MailboxError, MboxStore};
use maildedup::message::Disposition;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn entry(subject: &str, hour: u32, body: &str) -> String {
    format!(
        "From sender@example.com Mon Jan  1 {hour:02}:00:00 2024\n\
Date: Mon, 1 Jan 2024 {hour:02}:00:00 +0000\nFrom: alice@example.com\nTo: bob@example.com\n\
Subject: {subject}\nMessage-ID: <{subject}@example.com>\n\n{body}\n\n"
    )
}

fn write_mbox(dir: &Path, name: &str, entries: &[String]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, entries.concat()).unwrap();
    path
}

fn keep_newest(mbox: &Path) -> maildedup::duplicates::RunReport {
    let config = Config {
        strategy: Some(Strategy::KeepNewest),
        threads: 1,
        ..Config::default()
    };
    let finder = DuplicateFinder::new(FinderConfig::new(config)).unwrap();
    let mailbox = Mailbox::open(mbox, None).unwrap();
    finder.find_duplicates(&[mailbox]).unwrap()
}

#[test]
fn test_load_entries_as_spans() {
    let dir = tempdir().unwrap();
    let mbox = write_mbox(
        dir.path(),
        "inbox",
        &[entry("a", 8, "first"), entry("b", 9, "second")],
    );

    let messages = MboxStore::open(&mbox).unwrap().messages().unwrap();
    assert_eq!(messages.len(), 2);
    for message in &messages {
        assert!(matches!(message.source_ref.location(), Location::Span { .. }));
        assert_eq!(message.source_ref.mailbox(), mbox.as_path());
        assert!(message.bytes.starts_with(b"Date: "));
    }
    assert!(messages[1].bytes.ends_with(b"second\n"));
}

#[test]
fn test_source_ref_reloads_entry() {
    let dir = tempdir().unwrap();
    let mbox = write_mbox(
        dir.path(),
        "inbox",
        &[entry("a", 8, "first"), entry("b", 9, "second")],
    );

    let messages = MboxStore::open(&mbox).unwrap().messages().unwrap();
    let reloaded = messages[1].source_ref.load().unwrap();
    assert_eq!(reloaded, messages[1].bytes);
}

#[test]
fn test_directory_is_not_an_mbox() {
    let dir = tempdir().unwrap();
    let err = MboxStore::open(dir.path()).unwrap_err();
    assert!(matches!(err, MailboxError::InvalidLayout { .. }));
}

#[test]
fn test_body_from_lines_do_not_split_entries() {
    let dir = tempdir().unwrap();
    let mbox = write_mbox(
        dir.path(),
        "inbox",
        &[entry("a", 8, "quoted:\n>From the archive")],
    );

    let messages = MboxStore::open(&mbox).unwrap().messages().unwrap();
    assert_eq!(messages.len(), 1);
}

#[test]
fn test_delete_discarded_rewrites_mbox() {
    let dir = tempdir().unwrap();
    let mbox = write_mbox(
        dir.path(),
        "inbox",
        &[
            entry("dup", 8, "same"),
            entry("other", 9, "different"),
            entry("dup", 20, "same"),
        ],
    );

    let report = keep_newest(&mbox);
    assert_eq!(report.members_with(Disposition::Discarded).len(), 1);

    let result = execute(
        &report,
        &ActionConfig::new(Action::DeleteDiscarded).with_permanent(true),
    )
    .unwrap();
    assert_eq!(result.deleted, 1);
    assert!(result.failures.is_empty());

    let content = fs::read_to_string(&mbox).unwrap();
    assert!(!content.contains("08:00:00"));
    assert!(content.contains("Subject: other"));
    assert!(content.contains("20:00:00"));
    assert!(!mbox.with_extension("maildedup-tmp").exists());

    let remaining = MboxStore::open(&mbox).unwrap().messages().unwrap();
    assert_eq!(remaining.len(), 2);
}

#[test]
fn test_locked_mbox_is_left_alone() {
    let dir = tempdir().unwrap();
    let mbox = write_mbox(
        dir.path(),
        "inbox",
        &[entry("dup", 8, "same"), entry("dup", 20, "same")],
    );
    let before = fs::read(&mbox).unwrap();
    let lock = dir.path().join("inbox.lock");
    fs::write(&lock, b"4242\n").unwrap();

    let report = keep_newest(&mbox);
    let result = execute(
        &report,
        &ActionConfig::new(Action::DeleteDiscarded).with_permanent(true),
    )
    .unwrap();

    assert_eq!(result.deleted, 0);
    assert_eq!(result.failures.len(), 1);
    assert!(result.failures[0].error.contains("locked"));
    assert_eq!(fs::read(&mbox).unwrap(), before);
    assert!(lock.exists());
}

#[test]
fn test_force_unlock_removes_stale_lock() {
    let dir = tempdir().unwrap();
    let mbox = write_mbox(
        dir.path(),
        "inbox",
        &[entry("dup", 8, "same"), entry("dup", 20, "same")],
    );
    let lock = dir.path().join("inbox.lock");
    fs::write(&lock, b"4242\n").unwrap();

    let report = keep_newest(&mbox);
    let result = execute(
        &report,
        &ActionConfig::new(Action::DeleteDiscarded)
            .with_permanent(true)
            .with_force_unlock(true),
    )
    .unwrap();

    assert_eq!(result.deleted, 1);
    assert!(!lock.exists());
    assert_eq!(MboxStore::open(&mbox).unwrap().messages().unwrap().len(), 1);
}

#[test]
fn test_changed_mbox_is_not_rewritten() {
    let dir = tempdir().unwrap();
    let mbox = write_mbox(
        dir.path(),
        "inbox",
        &[entry("dup", 8, "same"), entry("dup", 20, "same")],
    );

    let report = keep_newest(&mbox);
    let changed = format!("garbage line\n{}", fs::read_to_string(&mbox).unwrap());
    fs::write(&mbox, &changed).unwrap();

    let result = execute(
        &report,
        &ActionConfig::new(Action::DeleteDiscarded).with_permanent(true),
    )
    .unwrap();

    assert_eq!(result.deleted, 0);
    assert_eq!(result.failures.len(), 1);
    assert_eq!(fs::read_to_string(&mbox).unwrap(), changed);
}
