use laundry_core::{ApplianceKind, ThresholdsConfig};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read thresholds file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid thresholds file: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub show_help: bool,
    pub replay_path: Option<PathBuf>,
    pub appliance: ApplianceKind,
    pub trace: bool,
    pub run_seconds: Option<u64>,
    pub bind_addr: String,
    pub bridge_enabled: bool,
    pub json_logs: bool,
    pub metrics_addr: Option<String>,
    pub audit_path: Option<PathBuf>,
    pub thresholds_path: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            show_help: false,
            replay_path: None,
            appliance: ApplianceKind::Washer,
            trace: false,
            run_seconds: None,
            bind_addr: "127.0.0.1:7010".to_string(),
            bridge_enabled: true,
            json_logs: false,
            metrics_addr: None,
            audit_path: None,
            thresholds_path: None,
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self::from_args(&args)
    }

    pub fn from_args(args: &[String]) -> Self {
        let mut cfg = RuntimeConfig::default();
        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--replay" => {
                    if i + 1 < args.len() {
                        cfg.replay_path = Some(PathBuf::from(&args[i + 1]));
                        i += 1;
                    }
                }
                "--appliance" => {
                    if i + 1 < args.len() {
                        match args[i + 1].parse() {
                            Ok(kind) => cfg.appliance = kind,
                            Err(e) => eprintln!("Ignoring --appliance: {e}"),
                        }
                        i += 1;
                    }
                }
                "--trace" => {
                    cfg.trace = true;
                }
                "--run-seconds" => {
                    if i + 1 < args.len() {
                        cfg.run_seconds = args[i + 1].parse::<u64>().ok();
                        i += 1;
                    }
                }
                "--bind" => {
                    if i + 1 < args.len() {
                        cfg.bind_addr = args[i + 1].clone();
                        i += 1;
                    }
                }
                "--no-bridge" => {
                    cfg.bridge_enabled = false;
                }
                "--json-logs" => {
                    cfg.json_logs = true;
                }
                "--metrics-addr" => {
                    if i + 1 < args.len() {
                        cfg.metrics_addr = Some(args[i + 1].clone());
                        i += 1;
                    }
                }
                "--audit-log" => {
                    if i + 1 < args.len() {
                        cfg.audit_path = Some(PathBuf::from(&args[i + 1]));
                        i += 1;
                    }
                }
                "--thresholds" => {
                    if i + 1 < args.len() {
                        cfg.thresholds_path = Some(PathBuf::from(&args[i + 1]));
                        i += 1;
                    }
                }
                "--help" | "-h" => {
                    cfg.show_help = true;
                    break;
                }
                _ => {}
            }
            i += 1;
        }
        cfg
    }

    /// Thresholds from `--thresholds`, or the built-in defaults.
    pub fn thresholds(&self) -> Result<ThresholdsConfig, ConfigError> {
        match &self.thresholds_path {
            Some(path) => load_thresholds(path),
            None => Ok(ThresholdsConfig::default()),
        }
    }

    pub fn print_help() {
        println!(
            r#"laundry-monitor - Washer and dryer state from power readings

USAGE:
    laundry-monitor [OPTIONS]

OPTIONS:
    --replay <PATH|->       Replay a recorded `timestamp,value` CSV trace (- for stdin)
    --appliance <KIND>      Appliance to replay (washer|dryer) [default: washer]
    --trace                 Print every replay step, not only transitions
    --bind <ADDR>           Bridge TCP bind address [default: 127.0.0.1:7010]
    --no-bridge             Disable the TCP bridge
    --run-seconds <SECS>    Run for a fixed duration then exit
    --json-logs             Output logs in JSON format (for log aggregation)
    --metrics-addr <ADDR>   Enable Prometheus metrics server on address (e.g., 0.0.0.0:9090)
    --audit-log <PATH>      Append published states to the specified JSONL file
    --thresholds <PATH>     Load washer/dryer thresholds from a JSON file
    -h, --help              Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log filter (e.g., RUST_LOG=debug,laundry_core=trace)

EXAMPLES:
    # Replay a recorded dryer trace
    laundry-monitor --replay dryer-1.csv --appliance dryer

    # Serve a home-automation host with metrics and an audit trail
    laundry-monitor --metrics-addr 0.0.0.0:9090 --audit-log /var/log/laundry/audit.jsonl
"#
        );
    }
}

pub fn load_thresholds(path: &Path) -> Result<ThresholdsConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}
