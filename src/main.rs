use anyhow::{bail, Context, Result};
use clap::Parser;
use dialoguer::{theme::ColorfulTheme, Confirm};
use owo_colors::OwoColorize;
use retone_rs::automation::{
    focus_channel, CalibrationOutcome, CaptureMode, CopyOutcome, FocusResponder, FocusResponse,
};
use retone_rs::cli::{CalibrateArgs, CaptureArgs, Cli, Command, FixArgs, NotificationsArgs};
use retone_rs::notify::NotificationStore;
use retone_rs::report::CalibrationReport;
use retone_rs::{logging, ConfigManager, RetoneApp};
use std::io::{self, IsTerminal, Write};
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init();

    match cli.command {
        None => run_daemon().await,
        Some(Command::Capture(args)) => run_capture(args).await,
        Some(Command::Fix(args)) => run_fix(args).await,
        Some(Command::Calibrate(args)) => run_calibrate(args).await,
        Some(Command::Notifications(args)) => run_notifications(args),
    }
}

async fn run_daemon() -> Result<()> {
    info!("🚀 retone-rs starting up!");
    info!("{}", "=".repeat(50));

    let config_manager = ConfigManager::load()?;
    config_manager.start_watching();
    let config = config_manager.get();
    info!(
        "✅ Configuration loaded from {}",
        config_manager.path().display()
    );
    info!("   Rewrite model: {}", config.rewrite.model);
    match config.fix_selection_shortcut() {
        Some(shortcut) => info!("   Fix selection shortcut: {}", shortcut),
        None => info!("   Fix selection shortcut: disabled"),
    }
    match config.fix_field_shortcut() {
        Some(shortcut) => info!("   Fix field shortcut: {}", shortcut),
        None => info!("   Fix field shortcut: disabled"),
    }

    let app = RetoneApp::new(config_manager)?;
    info!(
        "   Clipboard sync delay: {} ms",
        app.delays().clipboard_sync_delay_ms()
    );

    app.run(shutdown_signal()).await?;

    info!("🛑 Shutting down retone-rs...");
    info!("✅ Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => info!("Received SIGINT (Ctrl+C)"),
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                }
                return;
            }
            Err(err) => warn!("Failed to set up SIGTERM handler: {}", err),
        }
    }

    if let Err(err) = signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", err);
        std::future::pending::<()>().await;
    }
    info!("Received SIGINT (Ctrl+C)");
}

async fn run_capture(args: CaptureArgs) -> Result<()> {
    let mut app = RetoneApp::new(ConfigManager::load()?)?;
    countdown("Focus the target application", args.delay_secs).await;

    let captured = app.capture(capture_mode(args.field)).await?;
    match captured.outcome {
        CopyOutcome::TimedOut => bail!("Clipboard did not change after copying; nothing captured"),
        CopyOutcome::Unsynchronized => {
            warn!("Clipboard sync delay is 0; the output may be stale clipboard content")
        }
        CopyOutcome::Copied => {}
    }

    println!("{}", captured.text);
    Ok(())
}

async fn run_fix(args: FixArgs) -> Result<()> {
    let mut app = RetoneApp::new(ConfigManager::load()?)?;
    countdown("Focus the target application", args.delay_secs).await;

    let outcome = app.fix(capture_mode(args.field)).await;
    app.shutdown().await;

    match outcome {
        Some(outcome) => {
            info!(?outcome, "Done");
            Ok(())
        }
        None => bail!("Fix failed; see `retone notifications` for details"),
    }
}

async fn run_calibrate(args: CalibrateArgs) -> Result<()> {
    let config_manager = ConfigManager::load()?;
    let mut app = RetoneApp::new(config_manager)?;
    let current = *app.delays();

    println!();
    println!("{}", "━".repeat(70));
    println!("  Clipboard calibration");
    println!("{}", "━".repeat(70));
    println!();
    println!(
        "  Select exactly this text in a text field: {}",
        args.expected.bold()
    );
    println!("  Keep that field focused until calibration finishes.");
    println!();

    if !args.yes && io::stdin().is_terminal() {
        let proceed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt("Start calibration?")
            .default(true)
            .interact()
            .context("Failed to read confirmation")?;
        if !proceed {
            println!("  {} Calibration cancelled", "○".yellow());
            return Ok(());
        }
    }

    let (mut focus, responder) = focus_channel(1);
    let responder_task = tokio::spawn(answer_focus_requests(
        responder,
        Duration::from_secs(args.focus_delay_secs),
    ));

    let outcome = app.calibrate(&mut focus, &args.expected, args.save).await;
    drop(focus);
    if let Err(err) = responder_task.await {
        warn!("Focus responder task failed: {}", err);
    }

    if args.json {
        let json = serde_json::to_string_pretty(&outcome)
            .context("Failed to serialize calibration outcome")?;
        println!("{json}");
    }

    match outcome {
        CalibrationOutcome::Success {
            measured_clipboard_ms,
            recommended,
        } => {
            if !args.json {
                println!(
                    "{}",
                    CalibrationReport::new(&measured_clipboard_ms, &recommended, &current)
                );
                if args.save {
                    println!("{} Saved recommended delays", "✓".green());
                } else {
                    println!("  Re-run with --save to store these delays");
                }
            }
            Ok(())
        }
        CalibrationOutcome::Failure { reason } => bail!(reason),
    }
}

/// Answers focus checks from the terminal. Nothing here can inspect the
/// target control, so the operator is trusted and the copied-text check in
/// the calibrator catches a wrong field.
async fn answer_focus_requests(mut responder: FocusResponder, focus_delay: Duration) {
    let mut first = true;
    while let Some(request) = responder.next_request().await {
        if first {
            countdown("Focus the calibration field", focus_delay.as_secs()).await;
            first = false;
        }
        if responder
            .respond(FocusResponse::confirmed(&request))
            .await
            .is_err()
        {
            break;
        }
    }
}

fn run_notifications(args: NotificationsArgs) -> Result<()> {
    let config_manager = ConfigManager::load()?;
    let store = NotificationStore::from_config(&config_manager.get().notifications)?;

    if args.clear {
        store.clear()?;
        println!("{} Notification history cleared", "✓".green());
        return Ok(());
    }

    let entries = store.list();
    if entries.is_empty() {
        println!("{} No notifications yet", "○".blue());
        return Ok(());
    }

    for entry in entries {
        let marker = if entry.kind.is_error() {
            "✗".red().to_string()
        } else {
            "✓".green().to_string()
        };
        println!(
            "{} {} {}: {}",
            entry.timestamp.dimmed(),
            marker,
            entry.kind.title().bold(),
            entry.message
        );
    }
    Ok(())
}

async fn countdown(prompt: &str, secs: u64) {
    if secs == 0 {
        return;
    }
    eprint!("  {prompt}...");
    for remaining in (1..=secs).rev() {
        eprint!(" {remaining}");
        let _ = io::stderr().flush();
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    eprintln!();
}

fn capture_mode(field: bool) -> CaptureMode {
    if field {
        CaptureMode::Field
    } else {
        CaptureMode::Selection
    }
}
