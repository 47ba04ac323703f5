#![forbid(unsafe_code)]

//! Render the subtitles settings form, apply edits, print the result.
//!
//! ```text
//! subform-demo --settings settings.json \
//!     --set settings-general-use_embedded_subs=true \
//!     --set settings-general-ignore_pgs_subs=true \
//!     --fail settings-general-ignore_pgs_subs --json
//! ```
//!
//! Commits are settled in-process: every request succeeds unless its key was
//! named with `--fail`.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use subform::prelude::*;
use subform::{ConfigError, DocumentError, KeyPathError, subtitles};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "subform-demo")]
#[command(about = "Render the subtitles settings form and apply edits")]
struct Args {
    /// Backend settings object (JSON). Starts empty when omitted.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Store configuration (TOML).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Edit to apply through the form, as KEY=VALUE. Applied in order.
    #[arg(long = "set", value_name = "KEY=VALUE")]
    edits: Vec<String>,

    /// Reject commits for KEY.
    #[arg(long = "fail", value_name = "KEY")]
    fail: Vec<String>,

    /// Print the committed settings as JSON after settling.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Error)]
enum DemoError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    KeyPath(#[from] KeyPathError),

    #[error(transparent)]
    Form(#[from] FormError),

    #[error("edit '{0}' is not KEY=VALUE")]
    MalformedEdit(String),
}

fn read(path: &Path) -> Result<String, DemoError> {
    std::fs::read_to_string(path).map_err(|source| DemoError::Io {
        path: path.to_owned(),
        source,
    })
}

/// Answer every queued request until none are left.
fn settle(form: &Form, persistence: &RecordingPersistence, fail: &[String]) -> usize {
    let mut settled = 0;
    loop {
        let pending = persistence.take_pending();
        if pending.is_empty() {
            return settled;
        }
        for request in pending {
            let outcome = if fail.iter().any(|k| k == request.key.as_str()) {
                CommitOutcome::Failure("rejected by --fail".to_owned())
            } else {
                CommitOutcome::Success
            };
            tracing::debug!(?request, "settling");
            form.apply_outcome(request.ticket, outcome);
            settled += 1;
        }
    }
}

fn run(args: Args) -> Result<(), DemoError> {
    let config = match &args.config {
        Some(path) => StoreConfig::from_toml_str(&read(path)?)?,
        None => StoreConfig::default(),
    };
    let document = match &args.settings {
        Some(path) => {
            let json: serde_json::Value = serde_json::from_str(&read(path)?)?;
            SettingsDocument::from_json(&config.root_namespace, &json)?
        }
        None => SettingsDocument::new(),
    };
    tracing::info!(leaves = document.len(), mode = ?config.commit_mode, "loaded settings");

    let persistence = RecordingPersistence::new();
    let store = SettingsStore::with_config(config.clone(), persistence.clone());
    store.replace_document(document);
    let form = Form::mount(&store, subtitles::page()).with_registry(subtitles::modifications());

    for edit in &args.edits {
        let (key, value) = edit
            .split_once('=')
            .ok_or_else(|| DemoError::MalformedEdit(edit.clone()))?;
        let key = KeyPath::parse(key.trim())?;
        form.change_text(&key, value)?;
    }
    if config.commit_mode == CommitMode::Deferred {
        form.save();
    }
    let settled = settle(&form, &persistence, &args.fail);
    tracing::info!(settled, "commits settled");

    print!("{}", form.render());
    for notice in form.take_notices() {
        eprintln!("notice: {notice}");
    }
    if args.json {
        let json = store.committed().to_json(&config.root_namespace);
        println!("{json:#}");
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
