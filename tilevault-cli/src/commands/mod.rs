//! Command implementations and shared plumbing.

pub mod download;
pub mod remove;
pub mod status;

use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use console::style;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};

use tilevault::cache::DiskTileStore;
use tilevault::confirm::{ApprovalRequest, AutoApprove, ConfirmationGate, Decision};
use tilevault::config::VaultConfig;
use tilevault::progress::ProgressSnapshot;
use tilevault::provider::{ReqwestClient, TileSource};
use tilevault::scheduler::{DownloadScheduler, JobHandle};

pub type CommandResult = Result<(), Box<dyn Error>>;

/// Loads the configuration: explicit path, then the platform default
/// location, then built-in defaults.
pub fn load_config(path: Option<&Path>) -> Result<VaultConfig, Box<dyn Error>> {
    match path {
        Some(path) => Ok(VaultConfig::load(path)?),
        None => match VaultConfig::default_path() {
            Some(default) if default.exists() => Ok(VaultConfig::load(&default)?),
            _ => Ok(VaultConfig::default()),
        },
    }
}

/// Opens the disk store configured in `config`.
pub async fn open_store(config: &VaultConfig) -> Result<Arc<DiskTileStore>, Box<dyn Error>> {
    let store =
        DiskTileStore::open_with_budget(&config.cache.directory, config.cache.max_size_bytes)
            .await?;
    Ok(Arc::new(store))
}

/// Assembles a scheduler over the configured source and the given gate.
pub fn build_scheduler(
    config: &VaultConfig,
    store: Arc<DiskTileStore>,
    gate: Arc<dyn ConfirmationGate>,
) -> Result<Arc<DownloadScheduler>, Box<dyn Error>> {
    let client = ReqwestClient::with_timeout(config.source.timeout())?;
    let source = Arc::new(TileSource::new(
        config.source.url_template.clone(),
        config.source.subdomains.clone(),
        client,
    )?);
    Ok(Arc::new(DownloadScheduler::new(
        store,
        source,
        gate,
        config.download.scheduler_config(),
    )))
}

/// Picks the interactive prompt gate, or auto-approval under `--yes`.
pub fn gate_for(assume_yes: bool) -> Arc<dyn ConfirmationGate> {
    if assume_yes {
        Arc::new(AutoApprove)
    } else {
        Arc::new(PromptGate)
    }
}

/// Confirmation gate backed by an interactive terminal prompt.
pub struct PromptGate;

impl ConfirmationGate for PromptGate {
    fn request_approval(&self, request: &ApprovalRequest) -> Decision {
        let approved = Confirm::new()
            .with_prompt(format!("About to {}. Continue?", request))
            .default(false)
            .interact()
            .unwrap_or(false);
        if approved {
            Decision::Approved
        } else {
            Decision::Denied
        }
    }
}

/// Cancels the job on Ctrl-C.
pub fn cancel_on_ctrlc(scheduler: Arc<DownloadScheduler>, handle: JobHandle) {
    let result = ctrlc::set_handler(move || {
        eprintln!("\ninterrupted, stopping after in-flight tiles...");
        scheduler.cancel(&handle);
    });
    if let Err(err) = result {
        tracing::warn!(error = %err, "Could not install Ctrl-C handler");
    }
}

/// Renders the job's progress as a terminal bar and returns the final
/// snapshot.
pub async fn watch_progress(handle: &JobHandle, verb: &str) -> ProgressSnapshot {
    let total = handle.snapshot().total;
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len}")
            .expect("static template is valid")
            .progress_chars("=> "),
    );
    bar.set_message(verb.to_string());

    let mut stream = handle.subscribe();
    let mut last = handle.snapshot();
    while let Some(snapshot) = stream.next().await {
        bar.set_position(snapshot.resolved());
        last = snapshot;
        if snapshot.is_terminal() {
            break;
        }
    }
    bar.finish_and_clear();
    last
}

/// Prints the one-line outcome summary.
pub fn print_outcome(snapshot: &ProgressSnapshot) {
    let state = match snapshot.state {
        tilevault::scheduler::JobState::Completed => style(snapshot.state.to_string()).green(),
        tilevault::scheduler::JobState::Failed => style(snapshot.state.to_string()).red(),
        _ => style(snapshot.state.to_string()).yellow(),
    };
    println!(
        "{}: {} of {} tiles done, {} failed",
        state, snapshot.completed, snapshot.total, snapshot.failed
    );
}

/// Formats a byte count for humans.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[unit])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MiB");
    }

    #[test]
    fn test_load_config_explicit_path() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[download]\nworkers = 9").unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.download.workers, 9);
    }

    #[test]
    fn test_load_config_falls_back_to_defaults() {
        // No explicit path and (almost certainly) no default file in the
        // test environment's config dir.
        let config = load_config(None).unwrap();
        assert!(config.source.url_template.contains("{z}"));
    }
}
