mod support;

use anyhow::{bail, Result};
use retone_rs::app::FixStage;
use retone_rs::automation::{CaptureMode, ReplaceOutcome};
use retone_rs::rewrite::Rewriter;
use retone_rs::{fix_text, DelaySettings, FixOutcome};
use std::sync::Mutex;
use std::time::Duration;
use support::{delays, CopyBehavior, FakeDesktop};

#[derive(Default)]
struct ScriptedRewriter {
    reply: Option<String>,
    seen: Mutex<Vec<String>>,
}

impl ScriptedRewriter {
    fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            ..Self::default()
        }
    }

    fn failing() -> Self {
        Self::default()
    }

    fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

impl Rewriter for ScriptedRewriter {
    async fn rewrite(&self, text: &str) -> Result<String> {
        self.seen.lock().unwrap().push(text.to_string());
        match &self.reply {
            Some(reply) => Ok(reply.clone()),
            None => bail!("service unavailable"),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn fixes_the_selection_and_restores_the_clipboard() {
    let desktop = FakeDesktop::with_clipboard("original");
    desktop.copies_after("their going home", 40);
    let mut automation = desktop.automation(delays(250));
    let rewriter = ScriptedRewriter::replying("They're going home.");

    let outcome = fix_text(&mut automation, &rewriter, CaptureMode::Selection)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        FixOutcome::Fixed {
            replace: ReplaceOutcome::Restored,
            changed_words: 4,
        }
    );
    assert_eq!(rewriter.seen(), vec!["their going home".to_string()]);
    assert_eq!(desktop.pasted(), vec!["They're going home.".to_string()]);
    assert_eq!(desktop.select_alls(), 0);
    assert_eq!(desktop.clipboard(), "original");
}

#[tokio::test(start_paused = true)]
async fn field_mode_keeps_the_trailing_newline() {
    let desktop = FakeDesktop::with_clipboard("original");
    desktop.copies_after("helo\n", 40);
    let mut automation = desktop.automation(delays(250));
    let rewriter = ScriptedRewriter::replying("Hello.");

    fix_text(&mut automation, &rewriter, CaptureMode::Field)
        .await
        .unwrap();

    assert_eq!(desktop.select_alls(), 1);
    assert_eq!(desktop.pasted(), vec!["Hello.\n".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn blank_selection_skips_the_rewrite() {
    let desktop = FakeDesktop::with_clipboard("original");
    desktop.copies_after("   ", 40);
    let mut automation = desktop.automation(delays(250));
    let rewriter = ScriptedRewriter::replying("unused");

    let outcome = fix_text(&mut automation, &rewriter, CaptureMode::Selection)
        .await
        .unwrap();

    assert_eq!(outcome, FixOutcome::NoText);
    assert!(rewriter.seen().is_empty());
    assert!(desktop.pasted().is_empty());
    assert_eq!(desktop.clipboard(), "original");
}

#[tokio::test(start_paused = true)]
async fn stalled_copy_counts_as_no_text() {
    let desktop = FakeDesktop::with_clipboard("original");
    desktop.on_copy(CopyBehavior::Stalls);
    let mut automation = desktop.automation(delays(100));
    let rewriter = ScriptedRewriter::replying("unused");

    let outcome = fix_text(&mut automation, &rewriter, CaptureMode::Selection)
        .await
        .unwrap();

    assert_eq!(outcome, FixOutcome::NoText);
    assert!(rewriter.seen().is_empty());
    assert_eq!(desktop.clipboard(), "original");
}

#[tokio::test(start_paused = true)]
async fn identical_rewrite_is_not_pasted() {
    let desktop = FakeDesktop::with_clipboard("original");
    desktop.copies_after("All good.", 40);
    let mut automation = desktop.automation(delays(250));
    let rewriter = ScriptedRewriter::replying("All good.");

    let outcome = fix_text(&mut automation, &rewriter, CaptureMode::Selection)
        .await
        .unwrap();

    assert_eq!(outcome, FixOutcome::Unchanged);
    assert!(desktop.pasted().is_empty());
    assert_eq!(desktop.clipboard(), "original");
}

#[tokio::test(start_paused = true)]
async fn rewrite_failure_restores_the_clipboard() {
    let desktop = FakeDesktop::with_clipboard("original");
    desktop.copies_after("some text", 40);
    let mut automation = desktop.automation(delays(250));
    let rewriter = ScriptedRewriter::failing();

    let err = fix_text(&mut automation, &rewriter, CaptureMode::Selection)
        .await
        .unwrap_err();

    assert_eq!(err.stage, FixStage::Rewrite);
    assert!(err.to_string().contains("service unavailable"));
    assert!(desktop.pasted().is_empty());
    assert_eq!(desktop.clipboard(), "original");
}

#[tokio::test(start_paused = true)]
async fn copy_failure_is_reported_as_a_capture_error() {
    let desktop = FakeDesktop::with_clipboard("original");
    desktop.on_copy(CopyBehavior::Fails);
    let mut automation = desktop.automation(delays(250));
    let rewriter = ScriptedRewriter::replying("unused");

    let err = fix_text(&mut automation, &rewriter, CaptureMode::Selection)
        .await
        .unwrap_err();

    assert_eq!(err.stage, FixStage::Capture);
    assert_eq!(desktop.clipboard(), "original");
}

#[tokio::test(start_paused = true)]
async fn slow_paste_is_restored_by_the_next_fix() {
    let desktop = FakeDesktop::with_clipboard("original");
    desktop.copies_after("teh cat", 40);
    let slow_paste = DelaySettings {
        paste_settle: Duration::from_millis(500),
        ..delays(250)
    };
    let mut automation = desktop.automation(slow_paste);
    let rewriter = ScriptedRewriter::replying("The cat.");

    let outcome = fix_text(&mut automation, &rewriter, CaptureMode::Selection)
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        FixOutcome::Fixed {
            replace: ReplaceOutcome::Deferred,
            ..
        }
    ));
    assert_eq!(desktop.clipboard(), "The cat.");

    desktop.copies_after("The cat.", 40);
    let outcome = fix_text(&mut automation, &rewriter, CaptureMode::Selection)
        .await
        .unwrap();

    assert_eq!(outcome, FixOutcome::Unchanged);
    assert_eq!(desktop.clipboard(), "original");
}
