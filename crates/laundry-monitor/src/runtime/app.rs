use crate::infra::audit::{AuditEventType, AuditLogger};
use crate::replay::{read_trace_file, replay, ReplayError, TIMESTAMP_FORMAT};
use crate::runtime::config::{ConfigError, RuntimeConfig};
use crate::runtime::logging::init_tracing;
use crate::runtime::telemetry;
use laundry_core::{Appliance, MonitorError, ThresholdsConfig, TimeBase};
use laundry_io::bridge::{self, BridgeConfig};
use laundry_io::ChannelSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{atomic::AtomicBool, Arc};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid thresholds: {0}")]
    Thresholds(#[from] MonitorError),
    #[error(transparent)]
    Replay(#[from] ReplayError),
    #[error("audit log {}: {source}", path.display())]
    Audit { path: PathBuf, source: io::Error },
    #[error("bridge failed: {0}")]
    Bridge(io::Error),
    #[error("bridge thread panicked")]
    BridgePanicked,
}

/// Parse argv, run, and return the process exit code.
pub fn run_from_args() -> i32 {
    let config = RuntimeConfig::from_env();
    if config.show_help {
        RuntimeConfig::print_help();
        return 0;
    }
    init_tracing(config.json_logs);
    match run(config) {
        Ok(()) => 0,
        Err(e) => {
            error!(error = %e, "laundry-monitor failed");
            1
        }
    }
}

pub fn run(config: RuntimeConfig) -> Result<(), AppError> {
    let thresholds = config.thresholds()?;
    match &config.replay_path {
        Some(path) => run_replay(&config, path, &thresholds),
        None => run_live(&config, &thresholds),
    }
}

fn run_replay(
    config: &RuntimeConfig,
    path: &Path,
    thresholds: &ThresholdsConfig,
) -> Result<(), AppError> {
    let records = read_trace_file(path)?;
    let mut monitor = Appliance::new(config.appliance, thresholds)?;
    let result = replay(&mut monitor, &records)?;

    if config.trace {
        for step in &result.trace {
            println!("{step}");
        }
    } else {
        for (time, state) in &result.transitions {
            println!("{} {}", time.format(TIMESTAMP_FORMAT), state);
        }
    }
    info!(
        appliance = %config.appliance,
        records = records.len(),
        transitions = result.transitions.len(),
        "Replay complete"
    );
    Ok(())
}

fn run_live(config: &RuntimeConfig, thresholds: &ThresholdsConfig) -> Result<(), AppError> {
    let channels = ChannelSet::new(thresholds)?;

    // Initialize metrics
    telemetry::init();
    let metrics_enabled = config.metrics_addr.is_some();
    let _metrics_handle = telemetry::start_metrics_server(&config.metrics_addr);

    let timebase = TimeBase::new();
    let audit_logger = init_audit_logger(config.audit_path.as_deref())?;

    if let Some(logger) = &audit_logger {
        if let Err(e) = logger.log_event(
            timebase.now(),
            timebase.unix_us(),
            AuditEventType::SystemStart,
            serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "bridge_enabled": config.bridge_enabled,
                "metrics_enabled": metrics_enabled,
                "thresholds": thresholds,
            }),
        ) {
            warn!(error = %e, "Failed to write audit entry");
        }
    }

    let stop = Arc::new(AtomicBool::new(false));

    let bridge_handle = if config.bridge_enabled {
        let bridge_config = BridgeConfig {
            bind_addr: config.bind_addr.clone(),
            ..Default::default()
        };
        let listener = bridge::bind(&bridge_config).map_err(AppError::Bridge)?;
        let stop_bridge = Arc::clone(&stop);
        let audit_bridge = audit_logger.clone();
        info!(addr = %bridge_config.bind_addr, "Starting bridge");
        Some(thread::spawn(move || {
            bridge::serve(
                listener,
                channels,
                timebase,
                bridge_config.poll_interval,
                stop_bridge,
                move |kind, published| {
                    let Some(logger) = &audit_bridge else {
                        return;
                    };
                    if let Err(e) =
                        logger.log_state_change(timebase.now(), timebase.unix_us(), kind, published)
                    {
                        warn!(error = %e, "Failed to write audit entry");
                    }
                },
            )
        }))
    } else {
        info!("Bridge disabled");
        None
    };

    info!("Laundry monitor running. Connect a home-automation host to push sensor events.");

    if let Some(seconds) = config.run_seconds {
        info!(seconds, "Running for limited duration");
        thread::sleep(Duration::from_secs(seconds));
        stop.store(true, std::sync::atomic::Ordering::Relaxed);
    }

    let outcome = match bridge_handle {
        Some(handle) => match handle.join() {
            Ok(result) => result.map_err(AppError::Bridge),
            Err(_) => Err(AppError::BridgePanicked),
        },
        None => Ok(()),
    };

    if let Some(logger) = &audit_logger {
        if let Err(e) = logger.log_event(
            timebase.now(),
            timebase.unix_us(),
            AuditEventType::SystemShutdown,
            serde_json::json!({ "run_seconds": config.run_seconds }),
        ) {
            warn!(error = %e, "Failed to write audit entry");
        }
    }
    info!("Run complete");
    outcome
}

fn init_audit_logger(audit_path: Option<&Path>) -> Result<Option<Arc<AuditLogger>>, AppError> {
    audit_path
        .map(|path| match AuditLogger::new(path) {
            Ok(logger) => {
                info!(path = %path.display(), "Audit logging enabled");
                Ok(Arc::new(logger))
            }
            Err(source) => Err(AppError::Audit {
                path: path.to_path_buf(),
                source,
            }),
        })
        .transpose()
}
