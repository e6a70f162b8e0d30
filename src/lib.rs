pub mod app;
pub mod automation;
pub mod cli;
pub mod config;
pub mod input;
pub mod logging;
pub mod notify;
pub mod paths;
pub mod report;
pub mod rewrite;

pub use app::{fix_text, FixError, FixOutcome, RetoneApp};
pub use automation::{CaptureMode, DelaySettings, TextAutomation};
pub use config::{Config, ConfigManager};
