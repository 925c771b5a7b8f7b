//! Import progress reporting.
//!
//! Reports observable progress during `eadi import` so users see how many
//! files are queued, how many are done, and which ones failed. Progress is
//! emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;

/// Outcome of one file, as shown in progress lines.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FileOutcome {
    Imported,
    Skipped,
    Failed,
}

impl FileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileOutcome::Imported => "imported",
            FileOutcome::Skipped => "skipped",
            FileOutcome::Failed => "failed",
        }
    }
}

/// A single progress event for an import batch.
#[derive(Clone, Debug)]
pub enum ImportProgressEvent {
    /// Paths were filtered and queued; `workers` tasks will consume them.
    Queued { total: u64, workers: usize },
    /// One more file finished: n files done out of total.
    File {
        path: String,
        outcome: FileOutcome,
        n: u64,
        total: u64,
    },
}

/// Reports import progress. Implementations write to stderr (human or JSON).
pub trait ImportProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the worker tasks.
    fn report(&self, event: ImportProgressEvent);
}

/// Human-friendly progress on stderr: "import  1,234 / 5,000 files  imported  FRAD054_IR_1.xml".
pub struct StderrProgress;

impl ImportProgressReporter for StderrProgress {
    fn report(&self, event: ImportProgressEvent) {
        let line = match &event {
            ImportProgressEvent::Queued { total, workers } => {
                format!(
                    "import  {} files queued on {} worker{}\n",
                    format_number(*total),
                    workers,
                    if *workers == 1 { "" } else { "s" }
                )
            }
            ImportProgressEvent::File {
                path,
                outcome,
                n,
                total,
            } => {
                format!(
                    "import  {} / {} files  {:<8}  {}\n",
                    format_number(*n),
                    format_number(*total),
                    outcome.as_str(),
                    path
                )
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ImportProgressReporter for JsonProgress {
    fn report(&self, event: ImportProgressEvent) {
        let obj = match &event {
            ImportProgressEvent::Queued { total, workers } => serde_json::json!({
                "event": "progress",
                "phase": "queued",
                "total": total,
                "workers": workers
            }),
            ImportProgressEvent::File {
                path,
                outcome,
                n,
                total,
            } => serde_json::json!({
                "event": "progress",
                "phase": "file",
                "path": path,
                "outcome": outcome.as_str(),
                "n": n,
                "total": total
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ImportProgressReporter for NoProgress {
    fn report(&self, _event: ImportProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Build a reporter for this mode. Caller passes it to the batch.
    pub fn reporter(&self) -> std::sync::Arc<dyn ImportProgressReporter> {
        match self {
            ProgressMode::Off => std::sync::Arc::new(NoProgress),
            ProgressMode::Human => std::sync::Arc::new(StderrProgress),
            ProgressMode::Json => std::sync::Arc::new(JsonProgress),
        }
    }
}
