//! Bake-off CLI Module
//!
//! Command-line interface for running a bake-off and inspecting saved models.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

use crate::bakeoff::{self, RunSummary};
use crate::config::{AppConfig, DEFAULT_CONFIG_PATH};
use crate::export::ModelStore;

// ─── Styling helpers ───────────────────────────────────────────────────────────

const W: usize = 58; // box inner width

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn line_box_top()    { println!("  {}", dim("┌─────────────────────────────────────────────────────────┐")); }
fn line_box_bottom() { println!("  {}", dim("└─────────────────────────────────────────────────────────┘")); }

fn line_box_center(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let total_pad = if visible_len < W { W - visible_len } else { 0 };
    let left = total_pad / 2;
    let right = total_pad - left;
    println!("  {}  {}{}{} {}", dim("│"), " ".repeat(left), content, " ".repeat(right), dim("│"));
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::new();
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' { in_escape = true; continue; }
        if in_escape { if c == 'm' { in_escape = false; } continue; }
        out.push(c);
    }
    out
}

fn kv(key: &str, val: &str) -> String {
    format!("{} {}", muted(&format!("{:<16}", key)), val.white())
}

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn step_run(msg: &str) {
    println!("  {} {}...", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("  {} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "bakeoff")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Pick the best classifier for a dataset by cross-validated grid search")]
#[command(long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to configs/config.json when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the bake-off (default)
    Run {
        /// CSV file to use instead of the bundled iris data
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Label column of the CSV
        #[arg(short, long)]
        target: Option<String>,

        /// Directory for saved models
        #[arg(short, long)]
        model_dir: Option<PathBuf>,
    },

    /// Show metadata of a saved model, or list the saved models
    Inspect {
        /// Model file name or path, e.g. Decision_Tree_v1.bin
        #[arg(long)]
        model: Option<PathBuf>,

        /// Directory for saved models
        #[arg(short = 'd', long)]
        model_dir: Option<PathBuf>,
    },

    /// Show each enabled model's grid size and number of fits
    Grids,
}

// ─── Logging ───────────────────────────────────────────────────────────────────

/// Handle for swapping the global log filter once the configuration is read
pub type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Level used until the configuration has been loaded
const BOOT_LEVEL: &str = "info";

/// Filter directives: `RUST_LOG` wins, then the configured level
fn filter_directives(rust_log: Option<String>, configured: Option<&str>) -> String {
    rust_log
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| configured.unwrap_or(BOOT_LEVEL).to_string())
}

/// Log filter for the given configured level
pub fn log_filter(configured: Option<&str>) -> EnvFilter {
    EnvFilter::new(filter_directives(std::env::var("RUST_LOG").ok(), configured))
}

/// Install the global subscriber so configuration loading is already logged
pub fn init_tracing() -> FilterHandle {
    let (filter, handle) = reload::Layer::new(log_filter(None));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
    handle
}

// ─── Configuration ─────────────────────────────────────────────────────────────

/// Load the configuration named on the command line
///
/// Without `--config` the default file is used when it exists, otherwise the
/// built-in defaults.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    match path {
        Some(path) => Ok(AppConfig::from_file(path)?),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => Ok(AppConfig::from_file(DEFAULT_CONFIG_PATH)?),
        None => Ok(AppConfig::default()),
    }
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_run(config: &AppConfig) -> anyhow::Result<RunSummary> {
    println!();
    line_box_top();
    line_box_center(&format!(
        "{} {}",
        config.app.app_title.white().bold(),
        muted(&format!("v{}", config.app.app_version))
    ));
    line_box_bottom();

    section("Bake-off");
    let source = match &config.data.path {
        Some(path) => path.display().to_string(),
        None => "bundled iris".to_string(),
    };
    println!("  {}", kv("Data", &source));
    println!("  {}", kv("Test size", &config.split.test_size.to_string()));
    println!("  {}", kv("CV folds", &config.cross_validation.n_splits.to_string()));
    println!("  {}", kv("Model dir", &config.output.model_dir.display().to_string()));
    println!();

    step_run("Running grid searches");
    let start = Instant::now();
    let summary = bakeoff::run(config)?;
    step_done(&format!(
        "{} train / {} test rows in {:.2?}",
        summary.n_train,
        summary.n_test,
        start.elapsed()
    ));

    print_results(&summary);
    Ok(summary)
}

fn print_results(summary: &RunSummary) {
    section("Results");
    println!(
        "  {:<22} {:>9} {:>8} {:>9} {:>6} {:>9}",
        muted("Model"),
        muted("CV score"),
        muted("± std"),
        muted("Test acc"),
        muted("Grid"),
        muted("Time")
    );
    println!("  {}", dim(&"─".repeat(68)));

    for result in summary.results.values() {
        let name = result.model.display_name();
        let name = if summary.best_model == Some(result.model) {
            name.white().bold()
        } else {
            name.normal()
        };
        println!(
            "  {:<22} {:>9.4} {:>8.4} {:>9.4} {:>6} {:>8.2}s",
            name,
            result.best_cv_score,
            result.cv_std,
            result.test_accuracy,
            result.n_candidates,
            result.fit_time_secs
        );
    }
    println!("  {}", dim(&"─".repeat(68)));

    match summary.winner() {
        Some(winner) => {
            println!();
            println!(
                "  {} {} {} {:.4}",
                ok("best"),
                winner.model.display_name().white().bold(),
                muted("CV score:"),
                winner.best_cv_score
            );
            println!("  {}", kv("Parameters", &winner.best_parameters.to_string()));
            println!("  {}", kv("Test accuracy", &format!("{:.4}", winner.test_accuracy)));
            println!("  {}", kv("F1 (macro)", &format!("{:.4}", winner.metrics.f1_macro)));
            for path in &winner.saved_to {
                step_ok(&format!("saved {}", path.display()));
            }
            match summary.reloaded_accuracy {
                Some(acc) => step_ok(&format!("reloaded from disk, test accuracy {:.4}", acc)),
                None => println!("  {} {}", "!".yellow(), muted("best model was not reloaded")),
            }
        }
        None => {
            println!();
            println!("  {}", "No model produced a valid score".yellow());
        }
    }
    println!();
}

pub fn cmd_inspect(model: Option<&Path>, model_dir: &Path) -> anyhow::Result<()> {
    let store = ModelStore::new(model_dir, Vec::new());

    let Some(model) = model else {
        section("Saved models");
        let files = store.list()?;
        if files.is_empty() {
            println!("  {}", muted(&format!("no models in {}", model_dir.display())));
        }
        for file in files {
            println!("  {}", file.display());
        }
        println!();
        return Ok(());
    };

    let (pipeline, metadata) = store.load(model)?;

    section(&format!("Model {}", model.display()));
    println!("  {}", kv("Name", &metadata.model_name));
    println!("  {}", kv("Version", &metadata.version));
    println!("  {}", kv("Trained at", &metadata.trained_at.to_rfc3339()));
    println!("  {}", kv("Fitted", &pipeline.is_fitted().to_string()));
    println!("  {}", kv("Features", &metadata.feature_names.join(", ")));
    println!("  {}", kv("Classes", &metadata.target_names.join(", ")));

    if !metadata.hyperparameters.is_empty() {
        section("Hyperparameters");
        for (name, value) in &metadata.hyperparameters {
            println!("  {}", kv(name, value));
        }
    }
    if !metadata.metrics.is_empty() {
        section("Metrics");
        for (name, value) in &metadata.metrics {
            println!("  {}", kv(name, &format!("{:.4}", value)));
        }
    }
    println!();
    Ok(())
}

pub fn cmd_grids(config: &AppConfig) -> anyhow::Result<()> {
    section("Parameter grids");
    let n_splits = config.cross_validation.n_splits;
    println!(
        "  {:<22} {:>10} {:>6}",
        muted("Model"),
        muted("Candidates"),
        muted("Fits")
    );
    println!("  {}", dim(&"─".repeat(40)));

    let mut total = 0;
    for kind in config.enabled_models()? {
        let grid = config.param_grid(kind)?;
        let n = grid.len();
        total += n * n_splits;
        println!("  {:<22} {:>10} {:>6}", kind.display_name(), n, n * n_splits);
    }
    println!("  {}", dim(&"─".repeat(40)));
    println!(
        "  {} {} {}",
        muted("total fits"),
        total.to_string().white().bold(),
        dim(&format!("({} folds, refits excluded)", n_splits))
    );
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_filter_directives_precedence() {
        assert_eq!(filter_directives(Some("debug".into()), Some("warn")), "debug");
        assert_eq!(filter_directives(None, Some("warn")), "warn");
        assert_eq!(filter_directives(Some("  ".into()), Some("error")), "error");
        assert_eq!(filter_directives(None, None), "info");
    }

    #[test]
    fn test_filter_reload_after_init() {
        // A reloadable filter accepts the configured level after installation
        let (filter, handle) = reload::Layer::new(EnvFilter::new(BOOT_LEVEL));
        let subscriber = tracing_subscriber::registry().with(filter);
        tracing::subscriber::with_default(subscriber, || {
            handle.reload(EnvFilter::new("warn")).unwrap();
            assert_eq!(handle.with_current(|f| f.to_string()).unwrap(), "warn");
        });
    }

    #[test]
    fn test_parse_run_overrides() {
        let cli = Cli::parse_from([
            "bakeoff", "run", "--data", "d.csv", "--target", "label", "--model-dir", "out",
        ]);
        match cli.command {
            Some(Commands::Run { data, target, model_dir }) => {
                assert_eq!(data, Some(PathBuf::from("d.csv")));
                assert_eq!(target.as_deref(), Some("label"));
                assert_eq!(model_dir, Some(PathBuf::from("out")));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_no_subcommand_defaults_to_none() {
        let cli = Cli::parse_from(["bakeoff", "--config", "c.json"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.config, Some(PathBuf::from("c.json")));
    }

    #[test]
    fn test_strip_ansi() {
        let colored = format!("{}", "x".red());
        assert_eq!(strip_ansi(&colored), "x");
    }

    #[test]
    fn test_load_config_explicit_missing_file() {
        assert!(load_config(Some(Path::new("/no/such/config.json"))).is_err());
    }
}
