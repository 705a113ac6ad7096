// SPDX-License-Identifier: MIT OR Apache-2.0
//! `texforge` - headless runner for node graph sessions.
//!
//! Loads a session into an engine backed by the in-memory device, runs a
//! full rebuild and reports what was scheduled and submitted. Also writes a
//! demo session and default settings files.

mod demo;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use texforge_graph::{Engine, EngineSettings, HeadlessDevice};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "texforge")]
#[command(about = "Run procedural texture graph sessions headlessly", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a session and run a full rebuild
    Run {
        /// Session file
        session: PathBuf,

        /// Engine settings file
        #[arg(long)]
        settings: Option<PathBuf>,

        /// Write a RON summary of the rebuild here
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Write a demo session
    Demo {
        /// Output session file
        out: PathBuf,
    },

    /// Write default engine settings
    Settings {
        /// Output settings file
        out: PathBuf,
    },
}

/// What a `run` did, as written by `--report`
#[derive(Debug, Serialize)]
struct RunSummary {
    nodes: usize,
    links: usize,
    submissions: usize,
    order: Vec<String>,
}

fn main() {
    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run {
            session,
            settings,
            report,
        } => run(&session, settings.as_deref(), report.as_deref()),
        Commands::Demo { out } => write_demo(&out),
        Commands::Settings { out } => EngineSettings::default()
            .save(&out)
            .with_context(|| format!("writing settings to {}", out.display())),
    };

    if let Err(e) = result {
        tracing::error!("texforge failed: {e:#}");
        std::process::exit(1);
    }
}

fn load_settings(path: Option<&Path>) -> Result<EngineSettings> {
    match path {
        Some(path) => EngineSettings::load(path)
            .with_context(|| format!("reading settings from {}", path.display())),
        None => Ok(EngineSettings::default()),
    }
}

fn run(session: &Path, settings: Option<&Path>, report_path: Option<&Path>) -> Result<()> {
    let settings = load_settings(settings)?;
    let mut engine = Engine::new(HeadlessDevice::new(), settings)?;
    let report = engine
        .load_session(session)
        .with_context(|| format!("loading session {}", session.display()))?;

    let order: Vec<String> = report
        .order
        .iter()
        .filter_map(|id| engine.graph().node(*id))
        .map(|node| format!("{} ({})", node.label, node.id))
        .collect();
    for (step, label) in order.iter().enumerate() {
        tracing::info!(step, node = %label, "Scheduled");
    }
    tracing::info!(
        nodes = engine.graph().node_count(),
        links = engine.graph().link_count(),
        recomputed = report.recomputed.len(),
        submissions = report.submissions,
        "Rebuild submitted"
    );

    engine.wait_idle()?;

    if let Some(path) = report_path {
        let summary = RunSummary {
            nodes: engine.graph().node_count(),
            links: engine.graph().link_count(),
            submissions: report.submissions,
            order,
        };
        let content = ron::ser::to_string_pretty(&summary, ron::ser::PrettyConfig::default())?;
        std::fs::write(path, content).with_context(|| format!("writing report to {}", path.display()))?;
    }
    Ok(())
}

fn write_demo(out: &Path) -> Result<()> {
    let mut engine = Engine::new(HeadlessDevice::new(), EngineSettings::default())?;
    demo::build(&mut engine)?;
    engine
        .save_session(out)
        .with_context(|| format!("writing session to {}", out.display()))?;
    tracing::info!(path = %out.display(), nodes = engine.graph().node_count(), "Wrote demo session");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_run_options() {
        let cli = Cli::try_parse_from(["texforge", "run", "a.tfs", "--settings", "s.ron"]).unwrap();
        match cli.command {
            Commands::Run {
                session, settings, ..
            } => {
                assert_eq!(session, PathBuf::from("a.tfs"));
                assert_eq!(settings, Some(PathBuf::from("s.ron")));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn run_writes_report() {
        let dir = tempfile::tempdir().unwrap();
        let session = dir.path().join("demo.tfs");
        let report = dir.path().join("report.ron");
        write_demo(&session).unwrap();
        run(&session, None, Some(&report)).unwrap();

        let text = std::fs::read_to_string(&report).unwrap();
        assert!(text.contains("submissions"));
    }

    #[test]
    fn missing_settings_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_settings(Some(&dir.path().join("nope.ron"))).is_err());
    }
}
