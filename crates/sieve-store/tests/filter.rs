//! Filter scenarios across crate boundaries: classification, the shared
//! spam log and the change signal, each against a throwaway container.

use std::fs;
use std::sync::Arc;
#[cfg(unix)]
use std::time::Duration;

use sieve_core::{Category, ClassificationInput, FilterAction, Model, Thresholds};
#[cfg(unix)]
use sieve_store::ChangeObserver;
use sieve_store::{
    AppendMode, DEFAULT_CHANNEL, FilterConfig, FilterExtension, Notifier, SpamLog,
};
use tempfile::TempDir;

const FIXTURE_MODEL: &str = r#"{
    "version": 1,
    "sequence_length": 16,
    "classes": ["ham", "spam"],
    "bias": [0.0, 0.0],
    "vocabulary": {
        "<oov>": 0, "<pad>": 1, "call": 2, "me": 3, "at": 4,
        "win": 5, "free": 6, "prize": 7
    },
    "weights": [
        [0.0, 0.0, 1.0, 1.2, 0.8, 0.0, 0.0, 0.0],
        [0.0, 0.0, 0.0, 0.0, 0.0, 1.5, 1.5, 2.0]
    ]
}"#;

const FLAT_MODEL: &str = r#"{
    "version": 1,
    "sequence_length": 16,
    "classes": ["ham", "spam"],
    "bias": [0.0, 0.0],
    "vocabulary": { "<oov>": 0, "<pad>": 1, "win": 2 },
    "weights": [[0.0, 0.0, 0.0], [0.0, 0.0, 0.0]]
}"#;

fn filter_with(model_json: &str, container: &std::path::Path) -> FilterExtension {
    let model = Arc::new(Model::from_json(model_json).unwrap());
    FilterExtension::new(model, Thresholds::new(0.8, 0.8).unwrap()).with_persistence(
        SpamLog::new(container),
        Notifier::new(container, DEFAULT_CHANNEL),
    )
}

fn msg<'a>(text: &'a str, sender: &'a str) -> ClassificationInput<'a> {
    ClassificationInput::new(Some(text), Some(sender))
}

#[test]
fn spam_is_junked_and_logged_with_sender_and_text() {
    let dir = TempDir::new().unwrap();
    let filter = filter_with(FIXTURE_MODEL, dir.path());

    let out = filter.process(&msg("You win a free prize", "+15550100"));
    assert_eq!(out.verdict.category, Category::Spam);
    assert_eq!(out.verdict.decision.action, FilterAction::Junk);
    assert_eq!(out.logged, Some(1));

    let records = SpamLog::new(dir.path()).load().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].sender, "+15550100");
    assert_eq!(records[0].message, "You win a free prize");
    assert!(records[0].date.ends_with("+0000"));
}

#[test]
fn ham_is_allowed_and_not_logged() {
    let dir = TempDir::new().unwrap();
    let filter = filter_with(FIXTURE_MODEL, dir.path());

    let out = filter.process(&msg("Call me at 5pm", "+15550101"));
    assert_eq!(out.verdict.category, Category::Ham);
    assert_eq!(out.verdict.decision.action, FilterAction::Allow);
    assert_eq!(out.logged, None);
    assert!(SpamLog::new(dir.path()).load().unwrap().is_empty());
}

#[test]
fn even_split_is_unknown_and_not_logged() {
    let dir = TempDir::new().unwrap();
    let filter = filter_with(FLAT_MODEL, dir.path());

    let out = filter.process(&msg("win win win", "+15550102"));
    let r = out.result.as_ref().unwrap();
    assert!((r.spam_probability() - 0.5).abs() < 1e-12);
    assert_eq!(out.verdict.category, Category::Unknown);
    assert_eq!(out.verdict.decision.action, FilterAction::None);
    assert!(SpamLog::new(dir.path()).load().unwrap().is_empty());
}

#[test]
fn empty_and_absent_messages_get_no_action() {
    let dir = TempDir::new().unwrap();
    let filter = filter_with(FIXTURE_MODEL, dir.path());

    for input in [
        ClassificationInput::new(Some(""), Some("x")),
        ClassificationInput::new(None, Some("x")),
        ClassificationInput::new(None, None),
    ] {
        let out = filter.process(&input);
        assert_eq!(out.verdict.category, Category::Unknown);
        assert_eq!(out.verdict.decision.action, FilterAction::None);
        assert_eq!(out.logged, None);
    }
}

#[test]
fn log_grows_by_exactly_one_per_spam_decision() {
    let dir = TempDir::new().unwrap();
    let filter = filter_with(FIXTURE_MODEL, dir.path());
    let log = SpamLog::new(dir.path());

    let texts = ["win a prize", "free prize", "Call me at 5pm", "win free"];
    let mut expected = Vec::new();
    for (i, text) in texts.iter().enumerate() {
        let sender = format!("sender-{i}");
        let out = filter.process(&msg(text, &sender));
        if out.verdict.category == Category::Spam {
            expected.push((sender, text.to_string()));
        }
        let records = log.load().unwrap();
        assert_eq!(records.len(), expected.len());
        for (rec, (sender, text)) in records.iter().zip(&expected) {
            assert_eq!(&rec.sender, sender);
            assert_eq!(&rec.message, text);
        }
    }
    assert_eq!(expected.len(), 3);
}

#[test]
fn unavailable_store_does_not_change_decision() {
    let good = TempDir::new().unwrap();
    let blocked_root = TempDir::new().unwrap();
    let blocked = blocked_root.path().join("container");
    fs::write(&blocked, "not a directory").unwrap();

    let available = filter_with(FIXTURE_MODEL, good.path());
    let unavailable = filter_with(FIXTURE_MODEL, &blocked);

    for text in ["You win a free prize", "Call me at 5pm", ""] {
        let a = available.process(&msg(text, "+15550103"));
        let b = unavailable.process(&msg(text, "+15550103"));
        assert_eq!(a.verdict, b.verdict, "decision diverged for {text:?}");
        assert_eq!(b.logged, None);
    }
}

#[test]
fn serialized_mode_from_config() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join(sieve_store::CONFIG_FILE),
        "[store]\nappend_mode = \"serialized\"\n",
    )
    .unwrap();

    let filter = FilterExtension::open(dir.path());
    assert_eq!(filter.spam_log().unwrap().mode(), AppendMode::Serialized);

    let out = filter.process(&msg("URGENT winner! Claim your free cash prize now", "+15550104"));
    assert_eq!(out.verdict.decision.action, FilterAction::Junk);
    assert_eq!(out.logged, Some(1));
}

#[test]
fn config_thresholds_drive_the_decision() {
    let dir = TempDir::new().unwrap();
    let mut config = FilterConfig::default();
    config.policy = Thresholds::new(1.0, 1.0).unwrap();

    let filter = FilterExtension::from_config(dir.path(), &config);
    let out = filter.process(&msg("URGENT winner! Claim your free cash prize now", "+15550105"));
    assert_eq!(out.verdict.category, Category::Unknown);
    assert_eq!(out.logged, None);
}

#[test]
fn concurrent_invocations_share_one_filter() {
    let dir = TempDir::new().unwrap();
    let filter = Arc::new(filter_with(FIXTURE_MODEL, dir.path()));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let filter = filter.clone();
            std::thread::spawn(move || {
                (0..20)
                    .map(|_| filter.handle(&msg("Call me at 5pm", "+15550106")).action)
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    for h in handles {
        assert!(h.join().unwrap().iter().all(|a| *a == FilterAction::Allow));
    }
}

#[cfg(unix)]
#[test]
fn spam_append_signals_observers() {
    let dir = TempDir::new().unwrap();
    let observer = ChangeObserver::subscribe(dir.path(), DEFAULT_CHANNEL).unwrap();
    let filter = filter_with(FIXTURE_MODEL, dir.path());

    filter.process(&msg("Call me at 5pm", "+15550107"));
    assert!(
        !observer.wait(Duration::from_millis(50)).unwrap(),
        "ham must not signal"
    );

    filter.process(&msg("You win a free prize", "+15550107"));
    assert!(observer.wait(Duration::from_secs(2)).unwrap());

    // The signal carries nothing; the observer re-reads the log.
    let records = SpamLog::new(dir.path()).load().unwrap();
    assert_eq!(records.len(), 1);
}
