use anyhow::{Context, Result};
use std::fmt;
use std::future::Future;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::automation::{
    CalibrationOutcome, Calibrator, CaptureMode, Captured, DelaySettings, FocusChannel,
    ReplaceOutcome, TextAutomation,
};
use crate::config::{Config, ConfigManager};
use crate::input::{HotkeyAction, HotkeyEvent, HotkeyListener};
use crate::notify::{NotificationKind, NotificationStore};
use crate::rewrite::{count_word_changes, ChatRewriter, Rewriter};

/// How a fix attempt ended when nothing went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixOutcome {
    Fixed {
        replace: ReplaceOutcome,
        changed_words: usize,
    },
    /// The rewrite came back identical; nothing was pasted.
    Unchanged,
    /// The copy never landed or the captured text was blank.
    NoText,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixStage {
    Capture,
    Rewrite,
    Replace,
}

#[derive(Debug)]
pub struct FixError {
    pub stage: FixStage,
    pub source: anyhow::Error,
}

impl FixError {
    fn capture(source: anyhow::Error) -> Self {
        Self {
            stage: FixStage::Capture,
            source,
        }
    }

    fn rewrite(source: anyhow::Error) -> Self {
        Self {
            stage: FixStage::Rewrite,
            source,
        }
    }

    fn replace(source: anyhow::Error) -> Self {
        Self {
            stage: FixStage::Replace,
            source,
        }
    }

    pub fn notification_kind(&self) -> NotificationKind {
        match self.stage {
            FixStage::Rewrite => NotificationKind::RewriteFailed,
            FixStage::Capture | FixStage::Replace => NotificationKind::CaptureFailed,
        }
    }
}

impl fmt::Display for FixError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self.stage {
            FixStage::Capture => "capture",
            FixStage::Rewrite => "rewrite",
            FixStage::Replace => "replace",
        };
        write!(f, "{stage} failed: {:#}", self.source)
    }
}

impl std::error::Error for FixError {}

/// One capture, rewrite and replace pass under a single clipboard backup.
///
/// The user's clipboard is back in place when this returns, unless the paste
/// was still in flight (see [`ReplaceOutcome::Deferred`]).
pub async fn fix_text<R: Rewriter>(
    automation: &mut TextAutomation,
    rewriter: &R,
    mode: CaptureMode,
) -> std::result::Result<FixOutcome, FixError> {
    if let Err(err) = automation.flush_deferred() {
        warn!("Failed to settle deferred clipboard restore: {err:#}");
    }

    let mut session = automation.begin_session().map_err(FixError::capture)?;
    let captured = session.capture(mode).await.map_err(FixError::capture)?;

    if captured.is_empty() {
        session.finish().map_err(FixError::capture)?;
        return Ok(FixOutcome::NoText);
    }

    let rewritten = rewriter
        .rewrite(&captured.text)
        .await
        .map_err(FixError::rewrite)?;
    if rewritten.trim().is_empty() {
        return Err(FixError::rewrite(anyhow::anyhow!(
            "Rewrite returned no text"
        )));
    }

    let replacement = keep_surrounding_whitespace(&captured.text, &rewritten);
    if replacement == captured.text {
        session.finish().map_err(FixError::capture)?;
        return Ok(FixOutcome::Unchanged);
    }

    let changed_words = count_word_changes(&captured.text, &replacement);
    let replace = session
        .replace(&replacement)
        .await
        .map_err(FixError::replace)?;
    session.finish().map_err(FixError::replace)?;

    Ok(FixOutcome::Fixed {
        replace,
        changed_words,
    })
}

/// Carries leading and trailing whitespace of the captured text over to the
/// rewrite, so fixing a line does not swallow its newline.
fn keep_surrounding_whitespace(original: &str, rewritten: &str) -> String {
    let core = original.trim();
    if core.is_empty() {
        return rewritten.trim().to_string();
    }
    let leading = &original[..original.len() - original.trim_start().len()];
    let trailing = &original[original.trim_end().len()..];
    format!("{leading}{}{trailing}", rewritten.trim())
}

pub struct RetoneApp {
    config_manager: ConfigManager,
    automation: TextAutomation,
    rewriter: Option<ChatRewriter>,
    notifications: NotificationStore,
    hotkey_tx: mpsc::Sender<HotkeyEvent>,
    hotkey_rx: Option<mpsc::Receiver<HotkeyEvent>>,
    hotkey_listener: Option<HotkeyListener>,
    hotkey_bindings: Vec<(HotkeyAction, String)>,
    listening: bool,
    current_config: Config,
    last_fix_finished: Option<Instant>,
    pending_flush: Option<time::Instant>,
}

impl RetoneApp {
    pub fn new(config_manager: ConfigManager) -> Result<Self> {
        let config = config_manager.get();

        let automation = TextAutomation::system(DelaySettings::from_config(&config.automation))
            .context("Failed to initialize clipboard automation")?;
        let rewriter = build_rewriter(&config);
        let notifications = NotificationStore::from_config(&config.notifications)?;
        let (hotkey_tx, hotkey_rx) = mpsc::channel(10);

        Ok(Self {
            config_manager,
            automation,
            rewriter,
            notifications,
            hotkey_tx,
            hotkey_rx: Some(hotkey_rx),
            hotkey_listener: None,
            hotkey_bindings: Vec::new(),
            listening: false,
            current_config: config,
            last_fix_finished: None,
            pending_flush: None,
        })
    }

    pub fn notifications(&self) -> &NotificationStore {
        &self.notifications
    }

    pub fn delays(&self) -> &DelaySettings {
        self.automation.delays()
    }

    /// Listens for hotkeys until `shutdown` resolves or the config watcher
    /// closes.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> Result<()> {
        info!("🚀 retone running!");

        let Some(mut hotkey_rx) = self.hotkey_rx.take() else {
            anyhow::bail!("Hotkey receiver already consumed");
        };
        let config = self.current_config.clone();
        self.listening = true;
        self.ensure_hotkey_listener(&config);

        let mut config_rx = self.config_manager.subscribe();
        tokio::pin!(shutdown);

        loop {
            let flush_at = self.pending_flush;
            tokio::select! {
                event = hotkey_rx.recv() => {
                    match event {
                        Some(event) => self.handle_hotkey(event).await,
                        None => {
                            info!("Hotkey channel closed");
                            break;
                        }
                    }
                }
                result = config_rx.changed() => {
                    match result {
                        Ok(()) => {
                            let updated = config_rx.borrow().clone();
                            self.apply_config_update(updated);
                        }
                        Err(_) => {
                            info!("Configuration watcher closed");
                            break;
                        }
                    }
                }
                _ = sleep_until_flush(flush_at), if flush_at.is_some() => {
                    self.pending_flush = None;
                    self.flush_deferred();
                }
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    async fn handle_hotkey(&mut self, event: HotkeyEvent) {
        if self
            .last_fix_finished
            .is_some_and(|finished| event.triggered_at < finished)
        {
            debug!("Ignoring {} hotkey queued while busy", event.action.label());
            return;
        }

        let mode = match event.action {
            HotkeyAction::FixSelection => CaptureMode::Selection,
            HotkeyAction::FixField => CaptureMode::Field,
        };
        self.fix(mode).await;
    }

    /// Runs a fix and reports the result as a notification.
    pub async fn fix(&mut self, mode: CaptureMode) -> Option<FixOutcome> {
        let started = Instant::now();
        info!("🔧 Fixing {}", mode_label(mode));

        let result = match self.rewriter.as_ref() {
            Some(rewriter) => fix_text(&mut self.automation, rewriter, mode).await,
            None => Err(FixError::rewrite(anyhow::anyhow!(
                "No API key; set {}",
                self.current_config.rewrite.api_key_env
            ))),
        };
        self.last_fix_finished = Some(Instant::now());

        match result {
            Ok(outcome) => {
                let (kind, message) = match outcome {
                    FixOutcome::Fixed {
                        replace,
                        changed_words,
                    } => {
                        if replace == ReplaceOutcome::Deferred {
                            self.pending_flush =
                                Some(time::Instant::now() + self.delays().paste_safety_window);
                        }
                        (
                            NotificationKind::Success,
                            format!("{changed_words} word(s) changed"),
                        )
                    }
                    FixOutcome::Unchanged => (
                        NotificationKind::Success,
                        "Text was already fine".to_string(),
                    ),
                    FixOutcome::NoText => (
                        NotificationKind::NoText,
                        "Select some text first".to_string(),
                    ),
                };
                debug!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    ?outcome,
                    "Fix finished"
                );
                self.notify(kind, &message);
                Some(outcome)
            }
            Err(err) => {
                error!("❌ Fix failed: {err}");
                self.notify(err.notification_kind(), &format!("{:#}", err.source));
                None
            }
        }
    }

    /// Copies without rewriting. The clipboard is restored afterwards.
    pub async fn capture(&mut self, mode: CaptureMode) -> Result<Captured> {
        self.flush_deferred();
        let mut session = self.automation.begin_session()?;
        let captured = session.capture(mode).await?;
        session.finish()?;
        Ok(captured)
    }

    /// Runs calibration and, when asked, persists the recommended delays.
    pub async fn calibrate(
        &mut self,
        focus: &mut FocusChannel,
        expected_text: &str,
        save: bool,
    ) -> CalibrationOutcome {
        self.flush_deferred();
        let outcome = Calibrator::default()
            .run(&mut self.automation, focus, expected_text)
            .await;

        match &outcome {
            CalibrationOutcome::Success { recommended, .. } => {
                if save {
                    match self.config_manager.save_recommended_delays(recommended) {
                        Ok(()) => {
                            let config = self.config_manager.get();
                            self.apply_config_update(config);
                            self.notify(
                                NotificationKind::Calibrated,
                                &format!(
                                    "Clipboard sync delay set to {} ms",
                                    recommended.clipboard_sync_delay_ms
                                ),
                            );
                        }
                        Err(err) => {
                            error!("Failed to save calibrated delays: {err:#}");
                        }
                    }
                }
            }
            CalibrationOutcome::Failure { reason } => {
                self.notify(NotificationKind::CalibrationFailed, reason);
            }
        }

        outcome
    }

    /// Waits out a deferred paste restore so the process can exit with the
    /// user's clipboard back in place.
    pub async fn shutdown(&mut self) {
        if let Some(listener) = self.hotkey_listener.as_mut() {
            listener.stop();
        }
        self.hotkey_listener = None;

        let deferred = self.pending_flush.take().is_some()
            || self.automation.clipboard().has_deferred_restore();
        if deferred {
            time::sleep(self.delays().paste_safety_window).await;
            self.flush_deferred();
        }
    }

    fn flush_deferred(&mut self) {
        if let Err(err) = self.automation.flush_deferred() {
            warn!("Failed to settle deferred clipboard restore: {err:#}");
        }
    }

    fn notify(&self, kind: NotificationKind, message: &str) {
        if let Err(err) = self.notifications.push(kind, message) {
            warn!("Failed to record notification: {err:#}");
        }
    }

    fn ensure_hotkey_listener(&mut self, config: &Config) {
        let bindings = hotkey_bindings(config);
        if self.hotkey_listener.is_some() && bindings == self.hotkey_bindings {
            return;
        }

        if let Some(listener) = self.hotkey_listener.as_mut() {
            listener.stop();
        }
        self.hotkey_listener = None;
        self.hotkey_bindings = bindings.clone();

        if bindings.is_empty() {
            info!("Hotkeys disabled");
            return;
        }

        match HotkeyListener::spawn(bindings, self.hotkey_tx.clone()) {
            Ok(listener) => self.hotkey_listener = Some(listener),
            Err(err) => warn!("Hotkeys unavailable: {err:#}"),
        }
    }

    fn apply_config_update(&mut self, new_config: Config) {
        if new_config == self.current_config {
            debug!("Config unchanged; ignoring update");
            return;
        }

        let delays = DelaySettings::from_config(&new_config.automation);
        if delays != *self.automation.delays() {
            info!(
                "⏱️  Clipboard sync delay: {} ms, selection delay: {} ms",
                delays.clipboard_sync_delay_ms(),
                delays.selection_delay_ms()
            );
            self.automation.set_delays(delays);
        }

        if new_config.rewrite != self.current_config.rewrite {
            self.rewriter = build_rewriter(&new_config);
        }

        if new_config.notifications != self.current_config.notifications {
            match NotificationStore::from_config(&new_config.notifications) {
                Ok(store) => self.notifications = store,
                Err(err) => warn!("Keeping previous notification settings: {err:#}"),
            }
        }

        if self.listening {
            self.ensure_hotkey_listener(&new_config);
        }

        self.current_config = new_config;
        info!("Configuration updated");
    }
}

async fn sleep_until_flush(deadline: Option<time::Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn build_rewriter(config: &Config) -> Option<ChatRewriter> {
    match ChatRewriter::from_config(&config.rewrite) {
        Ok(rewriter) => {
            info!("🧠 Rewrite model: {}", rewriter.model());
            Some(rewriter)
        }
        Err(err) => {
            warn!("Rewriting unavailable: {err:#}");
            None
        }
    }
}

fn hotkey_bindings(config: &Config) -> Vec<(HotkeyAction, String)> {
    [
        (HotkeyAction::FixSelection, config.fix_selection_shortcut()),
        (HotkeyAction::FixField, config.fix_field_shortcut()),
    ]
    .into_iter()
    .filter_map(|(action, shortcut)| shortcut.map(|shortcut| (action, shortcut.to_string())))
    .collect()
}

fn mode_label(mode: CaptureMode) -> &'static str {
    match mode {
        CaptureMode::Selection => "selection",
        CaptureMode::Field => "whole field",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surrounding_whitespace_survives_the_rewrite() {
        assert_eq!(
            keep_surrounding_whitespace("  helo world\n", "Hello, world."),
            "  Hello, world.\n"
        );
        assert_eq!(keep_surrounding_whitespace("fine", " Fine. "), "Fine.");
    }

    #[test]
    fn disabled_shortcuts_produce_no_bindings() {
        let mut config = Config::default();
        config.shortcuts.fix_field = Some("   ".to_string());
        let bindings = hotkey_bindings(&config);
        assert_eq!(
            bindings,
            vec![(HotkeyAction::FixSelection, "SUPER+ALT+G".to_string())]
        );
    }

    #[test]
    fn rewrite_errors_map_to_rewrite_notifications() {
        let err = FixError::rewrite(anyhow::anyhow!("boom"));
        assert_eq!(err.notification_kind(), NotificationKind::RewriteFailed);
        assert_eq!(err.to_string(), "rewrite failed: boom");

        let err = FixError::replace(anyhow::anyhow!("paste"));
        assert_eq!(err.notification_kind(), NotificationKind::CaptureFailed);
    }
}
