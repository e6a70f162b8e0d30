use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "retone",
    version,
    about = "Fix the tone and grammar of text in any application through the clipboard"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Copy the focused selection and print it, then restore the clipboard
    Capture(CaptureArgs),
    /// Capture, rewrite and paste back once
    Fix(FixArgs),
    /// Measure clipboard latency against a control holding known text
    Calibrate(CalibrateArgs),
    /// Show recent notifications
    Notifications(NotificationsArgs),
}

#[derive(clap::Args)]
pub struct CaptureArgs {
    /// Select the whole field before copying
    #[arg(long)]
    pub field: bool,

    /// Seconds to wait so you can focus the target application
    #[arg(long, default_value_t = 3)]
    pub delay_secs: u64,
}

#[derive(clap::Args)]
pub struct FixArgs {
    /// Select the whole field before copying
    #[arg(long)]
    pub field: bool,

    /// Seconds to wait so you can focus the target application
    #[arg(long, default_value_t = 3)]
    pub delay_secs: u64,
}

#[derive(clap::Args)]
pub struct CalibrateArgs {
    /// The exact text selected in the calibration field
    #[arg(long)]
    pub expected: String,

    /// Seconds to wait before the first trial
    #[arg(long, default_value_t = 5)]
    pub focus_delay_secs: u64,

    /// Write the recommended delays to the config file
    #[arg(long)]
    pub save: bool,

    /// Print the outcome as JSON instead of a table
    #[arg(long)]
    pub json: bool,

    /// Skip the confirmation prompt
    #[arg(long, short)]
    pub yes: bool,
}

#[derive(clap::Args)]
pub struct NotificationsArgs {
    /// Delete the stored history
    #[arg(long)]
    pub clear: bool,
}
