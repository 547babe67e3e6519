//! WebDAV Provisioner
//!
//! Command-line entry point. One positional mode selects what runs:
//!
//! - `reconcile` (default): gather the desired state and converge the host
//! - `fresh`: gather the desired state, remove generated configuration, then
//!   converge from scratch
//! - `reset`: remove generated configuration only
//! - `raid`: build an mdadm array interactively
//!
//! Exit status is 0 on success or when the operator declines, 1 for invalid
//! input or unmet preconditions, 2 when a command or the host fails.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use webdav_provisioner::{
    configure_interactively, load_desired_state, ArrayCommitter, DiskScanner, DriverConfig,
    Prompter, ProcessExecutor, RaidConfig, RaidOutcome, RaidWizard, ReconciliationDriver, Result,
    ScannerConfig, Secret, ServiceConfig, SystemExecutorRef, TerminalPrompter,
};

// =============================================================================
// CLI Arguments
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Gather the desired state and converge the host
    Reconcile,
    /// Remove generated configuration, then reconcile
    Fresh,
    /// Remove generated configuration only
    Reset,
    /// Build an mdadm array
    Raid,
}

/// WebDAV Provisioner - multi-tenant WebDAV host reconciliation
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// What to run
    #[arg(value_enum, default_value_t = Mode::Reconcile)]
    mode: Mode,

    /// Desired-state YAML file; prompts interactively when absent
    #[arg(long, env = "WEBDAV_CONFIG")]
    config: Option<PathBuf>,

    /// Default password for new users; overrides the file and skips the
    /// interactive password prompt
    #[arg(long, env = "WEBDAV_DEFAULT_SECRET", hide_env_values = true)]
    default_secret: Option<String>,

    /// Directory the web server includes routing units from
    #[arg(long, env = "WEBDAV_UNITS_DIR", default_value = "/etc/nginx/conf.d")]
    units_dir: PathBuf,

    /// Credential store (htpasswd file)
    #[arg(long, env = "WEBDAV_CREDENTIAL_FILE", default_value = "/etc/nginx/webdav.htpasswd")]
    credential_file: PathBuf,

    /// Directory for per-location access logs and the shared error log
    #[arg(long, env = "WEBDAV_LOG_DIR", default_value = "/var/log/nginx")]
    log_dir: PathBuf,

    /// systemd unit of the web server
    #[arg(long, env = "WEBDAV_SERVICE", default_value = "nginx")]
    service: String,

    /// User the web server runs as
    #[arg(long, env = "WEBDAV_SERVICE_USER", default_value = "www-data")]
    service_user: String,

    /// Group the web server runs as
    #[arg(long, env = "WEBDAV_SERVICE_GROUP", default_value = "www-data")]
    service_group: String,

    /// md device created by `raid`
    #[arg(long, env = "WEBDAV_RAID_DEVICE", default_value = "/dev/md0")]
    raid_device: PathBuf,

    /// Seconds to wait after array creation before formatting
    #[arg(long, env = "WEBDAV_SETTLE_SECS", default_value = "5")]
    settle_secs: u64,

    /// Mount table the array is persisted to
    #[arg(long, env = "WEBDAV_FSTAB", default_value = "/etc/fstab")]
    fstab: PathBuf,

    /// mdadm configuration the array definition is appended to
    #[arg(long, env = "WEBDAV_MDADM_CONF", default_value = "/etc/mdadm/mdadm.conf")]
    mdadm_conf: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn driver_config(&self) -> DriverConfig {
        let mut config = DriverConfig::default()
            .with_credential_file(&self.credential_file)
            .with_service_identity(&self.service_user, &self.service_group);
        config.router.units_dir = self.units_dir.clone();
        config.router.log_dir = self.log_dir.clone();
        config.service = ServiceConfig {
            name: self.service.clone(),
            ..ServiceConfig::default()
        };
        config
    }

    fn raid_config(&self) -> RaidConfig {
        RaidConfig {
            device: self.raid_device.clone(),
            settle: Duration::from_secs(self.settle_secs),
            fstab: self.fstab.clone(),
            mdadm_conf: self.mdadm_conf.clone(),
            ..RaidConfig::default()
        }
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    info!("Starting WebDAV Provisioner");
    info!("  Version: {}", webdav_provisioner::VERSION);
    info!("  Mode: {:?}", args.mode);

    let code = match run(&args).await {
        Ok(()) => 0,
        Err(e) => {
            error!(category = ?e.category(), "{}", e);
            eprintln!("error: {}", e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

async fn run(args: &Args) -> Result<()> {
    let executor: SystemExecutorRef = Arc::new(ProcessExecutor::new());
    let mut prompter = TerminalPrompter::new();

    match args.mode {
        Mode::Raid => {
            let wizard = RaidWizard::new(
                DiskScanner::new(executor.clone(), ScannerConfig::default()),
                ArrayCommitter::new(executor, args.raid_config()),
            );
            match wizard.run(&mut prompter).await? {
                RaidOutcome::Mounted(array) => info!(
                    "Array {} ({}) ready at {}",
                    array.device.display(),
                    array.level,
                    array.mountpoint.display()
                ),
                RaidOutcome::Cancelled => info!("Array creation cancelled"),
            }
        }

        Mode::Reset => {
            let driver = ReconciliationDriver::new(executor, args.driver_config());
            if !confirm_cleanup(&mut prompter)? {
                return Ok(());
            }
            driver.cleanup().await?;
        }

        Mode::Reconcile | Mode::Fresh => {
            let secret = args.default_secret.clone().map(Secret::new);
            let desired = match &args.config {
                Some(path) => load_desired_state(path, secret).await?,
                None => configure_interactively(&mut prompter, secret)?,
            };

            let driver = ReconciliationDriver::new(executor, args.driver_config());
            let report = if args.mode == Mode::Fresh {
                if !confirm_cleanup(&mut prompter)? {
                    return Ok(());
                }
                let fresh = driver.fresh(&desired, &mut prompter).await?;
                debug!("Cleanup: {}", serde_json::to_string(&fresh.cleanup)?);
                fresh.reconcile
            } else {
                driver.reconcile(&desired, &mut prompter).await?
            };
            debug!("Report: {}", serde_json::to_string(&report)?);
            info!(
                "Done in {} ms",
                (report.finished_at - report.started_at).num_milliseconds()
            );
        }
    }

    Ok(())
}

fn confirm_cleanup(prompter: &mut dyn Prompter) -> Result<bool> {
    prompter.note("This removes every generated routing unit and the credential store.");
    prompter.note("Data under the storage location roots is not touched.");
    let confirmed = prompter.confirm("Continue?", false)?;
    if !confirmed {
        info!("Cleanup declined; nothing changed");
    }
    Ok(confirmed)
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    // Logs go to stderr so prompts and logs share one stream
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
