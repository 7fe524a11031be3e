use maildedup::config::Config;
use maildedup::duplicates::{DuplicateFinder, FinderConfig, SetOutcome, Strategy};
use maildedup::mailbox::{open_all, BoxFormat, Mailbox};
use maildedup::message::Disposition;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

const MORNING: &str = "Mon, 1 Jan 2024 08:00:00 +0000";
const NOON: &str = "Mon, 1 Jan 2024 12:00:00 +0000";
const EVENING: &str = "Mon, 1 Jan 2024 20:00:00 +0000";

fn mail(subject: &str, date: &str, body: &str) -> String {
    format!(
        "Date: {date}\nFrom: Alice <alice@example.com>\nTo: bob@example.com\n\
Subject: {subject}\nMessage-ID: <{subject}@example.com>\n\n{body}\n"
    )
}

fn maildir(root: &Path, name: &str, messages: &[(&str, String)]) -> PathBuf {
    let path = root.join(name);
    for sub in ["cur", "new", "tmp"] {
        fs::create_dir_all(path.join(sub)).unwrap();
    }
    for (file, content) in messages {
        fs::write(path.join("cur").join(file), content).unwrap();
    }
    path
}

fn finder(strategy: Option<Strategy>) -> DuplicateFinder {
    finder_with(Config {
        strategy,
        threads: 2,
        ..Config::default()
    })
}

fn finder_with(config: Config) -> DuplicateFinder {
    DuplicateFinder::new(FinderConfig::new(config)).unwrap()
}

fn open(paths: &[PathBuf]) -> Vec<Mailbox> {
    open_all(paths, None).unwrap()
}

#[test]
fn test_empty_maildir() {
    let dir = tempdir().unwrap();
    let inbox = maildir(dir.path(), "inbox", &[]);

    let report = finder(Some(Strategy::KeepNewest))
        .find_duplicates(&open(&[inbox]))
        .unwrap();

    assert!(report.sets.is_empty());
    assert_eq!(report.stats.mail.found, 0);
    assert!(report.stats.check().is_ok());
}

#[test]
fn test_keep_newest_in_maildir() {
    let dir = tempdir().unwrap();
    let inbox = maildir(
        dir.path(),
        "inbox",
        &[
            ("1:2,S", mail("report", MORNING, "numbers")),
            ("2:2,S", mail("report", EVENING, "numbers")),
            ("3:2,S", mail("lunch", NOON, "see you")),
        ],
    );

    let report = finder(Some(Strategy::KeepNewest))
        .find_duplicates(&open(&[inbox.clone()]))
        .unwrap();

    let discarded = report.members_with(Disposition::Discarded);
    assert_eq!(discarded.len(), 1);
    assert_eq!(
        discarded[0].source_ref.path(),
        inbox.join("cur").join("1:2,S")
    );
    assert_eq!(report.members_with(Disposition::Kept).len(), 2);

    let stats = report.stats;
    assert_eq!(stats.mail.found, 3);
    assert_eq!(stats.mail.unique, 1);
    assert_eq!(stats.mail.duplicates, 2);
    assert_eq!(stats.mail.retained, 1);
    assert_eq!(stats.mail.discarded, 1);
    assert_eq!(stats.sets.total, 2);
    assert_eq!(stats.sets.hashes, 2);
    assert_eq!(stats.sets.deduplicated, 1);
}

#[test]
fn test_mirrored_strategy_names_agree() {
    let dir = tempdir().unwrap();
    let inbox = maildir(
        dir.path(),
        "inbox",
        &[
            ("1", mail("a", MORNING, "x")),
            ("2", mail("a", NOON, "x")),
            ("3", mail("a", EVENING, "x")),
        ],
    );
    let boxes = open(&[inbox]);

    let keep: Strategy = "keep-newest".parse().unwrap();
    let discard: Strategy = "discard-older".parse().unwrap();
    let a = finder(Some(keep)).find_duplicates(&boxes).unwrap();
    let b = finder(Some(discard)).find_duplicates(&boxes).unwrap();
    assert_eq!(a.dispositions(), b.dispositions());
    assert_eq!(a.stats.mail.discarded, 2);
}

#[test]
fn test_without_strategy_nothing_is_decided() {
    let dir = tempdir().unwrap();
    let inbox = maildir(
        dir.path(),
        "inbox",
        &[
            ("1", mail("a", MORNING, "x")),
            ("2", mail("a", EVENING, "x")),
        ],
    );

    let report = finder(None).find_duplicates(&open(&[inbox])).unwrap();

    assert_eq!(report.sets.len(), 1);
    assert_eq!(report.sets[0].outcome, SetOutcome::Ignored);
    assert_eq!(report.stats.sets.ignored, 1);
    assert_eq!(report.stats.mail.skipped, 2);
    assert!(report.members_with(Disposition::Discarded).is_empty());
}

#[test]
fn test_size_threshold_rejects_set() {
    let dir = tempdir().unwrap();
    let inbox = maildir(
        dir.path(),
        "inbox",
        &[
            ("1", mail("a", MORNING, &"x".repeat(100))),
            ("2", mail("a", EVENING, &"x".repeat(700))),
        ],
    );

    let report = finder(Some(Strategy::KeepNewest))
        .find_duplicates(&open(&[inbox]))
        .unwrap();

    assert!(matches!(
        report.sets[0].outcome,
        SetOutcome::RejectedSize {
            difference: 600,
            threshold: 512
        }
    ));
    assert_eq!(report.stats.sets.rejected_size, 1);
    assert!(report
        .sets[0]
        .members
        .iter()
        .all(|m| m.disposition == Disposition::Undetermined));
}

#[test]
fn test_content_threshold_rejects_set() {
    let dir = tempdir().unwrap();
    let first: String = (0..40).map(|i| format!("line {i} of the original\n")).collect();
    let second: String = (0..40).map(|i| format!("line {i} of the rewrite!\n")).collect();
    let inbox = maildir(
        dir.path(),
        "inbox",
        &[("1", mail("a", MORNING, &first)), ("2", mail("a", EVENING, &second))],
    );

    let report = finder_with(Config {
        strategy: Some(Strategy::KeepNewest),
        size_threshold: -1,
        content_threshold: 100,
        ..Config::default()
    })
    .find_duplicates(&open(&[inbox]))
    .unwrap();

    assert!(matches!(
        report.sets[0].outcome,
        SetOutcome::RejectedContent { threshold: 100, .. }
    ));
    assert_eq!(report.stats.sets.rejected_content, 1);
}

#[test]
fn test_disabled_thresholds_accept_different_bodies() {
    let dir = tempdir().unwrap();
    let inbox = maildir(
        dir.path(),
        "inbox",
        &[
            ("1", mail("a", MORNING, "short")),
            ("2", mail("a", EVENING, &"long ".repeat(400))),
        ],
    );

    let report = finder_with(Config {
        strategy: Some(Strategy::KeepSmallest),
        size_threshold: -1,
        content_threshold: -1,
        ..Config::default()
    })
    .find_duplicates(&open(&[inbox.clone()]))
    .unwrap();

    let kept = report.members_with(Disposition::Kept);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].source_ref.path(), inbox.join("cur").join("1"));
}

#[test]
fn test_identical_timestamps_keep_first_source() {
    let dir = tempdir().unwrap();
    let inbox = maildir(
        dir.path(),
        "inbox",
        &[("2", mail("a", NOON, "x")), ("1", mail("a", NOON, "x"))],
    );

    let report = finder(Some(Strategy::KeepNewest))
        .find_duplicates(&open(&[inbox.clone()]))
        .unwrap();

    let kept = report.members_with(Disposition::Kept);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].source_ref.path(), inbox.join("cur").join("1"));
    assert_eq!(report.stats.mail.discarded, 1);
}

#[test]
fn test_keep_one_breaks_ties_by_source() {
    let dir = tempdir().unwrap();
    let inbox = maildir(
        dir.path(),
        "inbox",
        &[
            ("b", mail("a", NOON, "x")),
            ("a", mail("a", NOON, "x")),
            ("c", mail("a", NOON, "x")),
        ],
    );

    let report = finder(Some(Strategy::KeepOne))
        .find_duplicates(&open(&[inbox.clone()]))
        .unwrap();

    let kept = report.members_with(Disposition::Kept);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].source_ref.path(), inbox.join("cur").join("a"));
    assert_eq!(report.stats.mail.discarded, 2);
}

#[test]
fn test_mixed_formats_form_one_set() {
    let dir = tempdir().unwrap();
    let inbox = maildir(dir.path(), "maildir", &[("1", mail("a", MORNING, "x"))]);

    let mh = dir.path().join("mh");
    fs::create_dir(&mh).unwrap();
    fs::write(mh.join("1"), mail("a", NOON, "x")).unwrap();

    let mbox = dir.path().join("archive.mbox");
    fs::write(
        &mbox,
        format!(
            "From alice@example.com Mon Jan  1 20:00:00 2024\n{}\n",
            mail("a", EVENING, "x")
        ),
    )
    .unwrap();

    let boxes = open(&[inbox, mh.clone(), mbox.clone()]);
    let formats: Vec<BoxFormat> = boxes.iter().map(Mailbox::format).collect();
    assert_eq!(
        formats,
        vec![BoxFormat::Maildir, BoxFormat::Mh, BoxFormat::Mbox]
    );

    let report = finder(Some(Strategy::KeepOldest))
        .find_duplicates(&boxes)
        .unwrap();

    assert_eq!(report.sets.len(), 1);
    assert_eq!(report.sets[0].members.len(), 3);
    assert_eq!(report.stats.mail.discarded, 2);
    let discarded: Vec<PathBuf> = report
        .members_with(Disposition::Discarded)
        .iter()
        .map(|m| m.source_ref.path().to_path_buf())
        .collect();
    assert!(discarded.contains(&mh.join("1")));
    assert!(discarded.contains(&mbox));
}

#[test]
fn test_discard_matching_path_uses_regexp() {
    let dir = tempdir().unwrap();
    let inbox = maildir(dir.path(), "inbox", &[("1", mail("a", MORNING, "x"))]);
    let archive = maildir(dir.path(), "archive", &[("1", mail("a", EVENING, "x"))]);

    let report = finder_with(Config {
        strategy: Some(Strategy::DiscardMatchingPath),
        regexp: Some("/archive/".to_string()),
        ..Config::default()
    })
    .find_duplicates(&open(&[inbox.clone(), archive.clone()]))
    .unwrap();

    let discarded = report.members_with(Disposition::Discarded);
    assert_eq!(discarded.len(), 1);
    assert_eq!(discarded[0].source_ref.mailbox(), archive.as_path());
    assert_eq!(
        report.members_with(Disposition::Kept)[0].source_ref.mailbox(),
        inbox.as_path()
    );
}

#[test]
fn test_result_independent_of_mailbox_order() {
    let dir = tempdir().unwrap();
    let a = maildir(
        dir.path(),
        "a",
        &[("1", mail("x", MORNING, "1")), ("2", mail("y", NOON, "2"))],
    );
    let b = maildir(
        dir.path(),
        "b",
        &[("1", mail("x", EVENING, "1")), ("2", mail("y", NOON, "2"))],
    );

    let forward = finder(Some(Strategy::KeepNewest))
        .find_duplicates(&open(&[a.clone(), b.clone()]))
        .unwrap();
    let backward = finder(Some(Strategy::KeepNewest))
        .find_duplicates(&open(&[b, a]))
        .unwrap();

    assert_eq!(forward.dispositions(), backward.dispositions());
    assert_eq!(forward.stats, backward.stats);
}

#[test]
fn test_same_mailbox_given_twice_counts_once() {
    let dir = tempdir().unwrap();
    let inbox = maildir(dir.path(), "inbox", &[("1", mail("a", MORNING, "x"))]);

    let report = finder(Some(Strategy::KeepNewest))
        .find_duplicates(&open(&[inbox.clone(), inbox]))
        .unwrap();

    assert_eq!(report.stats.mail.found, 1);
    assert_eq!(report.stats.sets.unique, 1);
}

#[test]
fn test_mails_with_few_headers_are_rejected() {
    let dir = tempdir().unwrap();
    let inbox = maildir(
        dir.path(),
        "inbox",
        &[
            ("1", "Subject: hi\n\nbody\n".to_string()),
            ("2", mail("a", MORNING, "x")),
        ],
    );

    let report = finder(None).find_duplicates(&open(&[inbox])).unwrap();

    assert_eq!(report.stats.mail.found, 2);
    assert_eq!(report.stats.mail.rejected, 1);
    assert_eq!(report.stats.mail.kept, 1);
    assert_eq!(report.rejected.len(), 1);
    assert!(report.stats.check().is_ok());
}

#[test]
fn test_missing_date_blocks_time_strategy() {
    let dir = tempdir().unwrap();
    let undated = "From: alice@example.com\nTo: bob@example.com\nSubject: a\n\
Message-ID: <a@example.com>\nUser-Agent: test\n\nx\n";
    let inbox = maildir(
        dir.path(),
        "inbox",
        &[("1", undated.to_string()), ("2", undated.to_string())],
    );

    let report = finder(Some(Strategy::KeepNewest))
        .find_duplicates(&open(&[inbox]))
        .unwrap();

    assert_eq!(report.stats.mail.timestamp_errors, 2);
    assert!(matches!(report.sets[0].outcome, SetOutcome::Skipped { .. }));
}

#[test]
fn test_unparsable_date_blocks_keep_oldest() {
    let dir = tempdir().unwrap();
    let inbox = maildir(
        dir.path(),
        "inbox",
        &[
            ("1", mail("a", "not a date", "x")),
            ("2", mail("a", EVENING, "x")),
        ],
    );

    let report = finder_with(Config {
        strategy: Some(Strategy::KeepOldest),
        hash_headers: ["From", "To", "Subject", "Message-ID"].map(String::from).to_vec(),
        minimal_headers: 4,
        ..Config::default()
    })
    .find_duplicates(&open(&[inbox]))
    .unwrap();

    assert_eq!(report.sets.len(), 1);
    assert_eq!(report.stats.mail.timestamp_errors, 1);
    assert!(matches!(report.sets[0].outcome, SetOutcome::Skipped { .. }));
    assert!(report.members_with(Disposition::Discarded).is_empty());
}

#[test]
fn test_last_mbox_entry_matches_maildir_copy() {
    let dir = tempdir().unwrap();
    let inbox = maildir(dir.path(), "maildir", &[("1", mail("a", MORNING, "body line"))]);
    let mbox = dir.path().join("archive.mbox");
    fs::write(
        &mbox,
        format!(
            "From alice@example.com Mon Jan  1 08:00:00 2024\n{}",
            mail("a", MORNING, "body line")
        ),
    )
    .unwrap();

    let report = finder_with(Config {
        strategy: Some(Strategy::KeepOne),
        size_threshold: 0,
        content_threshold: 0,
        ..Config::default()
    })
    .find_duplicates(&open(&[inbox, mbox]))
    .unwrap();

    assert_eq!(report.sets.len(), 1);
    assert_eq!(report.sets[0].outcome, SetOutcome::Deduplicated { discarded: 1 });
}
