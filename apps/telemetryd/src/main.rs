use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::info;
use vesc_telemetry::{
    ChangeSet, ManagerConfig, SimulatorConfig, SourceConfig, TelemetryManager, TelemetrySnapshot,
    ThrottleProfile, VehicleParams,
};

#[derive(Parser)]
#[command(name = "telemetryd", version, about = "Go-kart telemetry daemon: CAN in, snapshots out")]
struct Args {
    /// Frame source to run
    #[arg(long, value_enum, default_value_t = Source::Virtual)]
    source: Source,

    /// CAN interface name for the hardware source
    #[arg(long, default_value = "can0")]
    interface: String,

    /// Simulator broadcast rate in Hz
    #[arg(long, default_value_t = 50.0)]
    rate: f64,

    /// Constant simulator throttle (0.0-1.0)
    #[arg(long, default_value_t = 0.0)]
    sim_throttle: f64,

    /// Drive a repeating accelerate/cruise/brake cycle instead of constant throttle
    #[arg(long, action = ArgAction::SetTrue)]
    drive_cycle: bool,

    /// YAML simulator config; overrides the simulator flags
    #[arg(long)]
    sim_config: Option<PathBuf>,

    /// Receive timeout in milliseconds (also bounds shutdown latency)
    #[arg(long, default_value_t = 100)]
    recv_timeout_ms: u64,

    /// Emit one JSON line per snapshot change instead of log fields
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Source {
    /// In-process simulator, no hardware required
    Virtual,
    /// Physical SocketCAN interface
    Can,
}

/// One line of telemetry output in `--json` mode.
#[derive(Serialize)]
struct TelemetryRecord<'a> {
    ts: String,
    changed: Vec<&'static str>,
    #[serde(flatten)]
    snapshot: &'a TelemetrySnapshot,
    power: f64,
    efficiency: f64,
    speed_kph: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing();
    let args = Args::parse();

    let source = match args.source {
        Source::Virtual => SourceConfig::Virtual(simulator_config(&args)?),
        Source::Can => SourceConfig::Hardware {
            interface: args.interface.clone(),
        },
    };

    let manager_config = ManagerConfig {
        recv_timeout: Duration::from_millis(args.recv_timeout_ms.max(1)),
        ..ManagerConfig::default()
    };
    let mut manager = TelemetryManager::with_config(source, manager_config)
        .map_err(|err| anyhow::anyhow!("manager init failed: {err}"))?;

    let publisher = manager.publisher();
    let params = VehicleParams::default();
    let json = args.json;
    publisher.subscribe(Box::new(
        move |snapshot: &TelemetrySnapshot,
              changed: &ChangeSet|
              -> Result<(), Box<dyn std::error::Error>> {
            if json {
                println!("{}", serde_json::to_string(&record(snapshot, changed, &params)?)?);
            } else {
                info!(
                    changed = ?changed.names(),
                    rpm = snapshot.rpm,
                    voltage = snapshot.voltage,
                    duty = snapshot.duty,
                    speed_kph = snapshot.speed_kph(&params),
                    "telemetry update"
                );
            }
            Ok(())
        },
    ));

    manager.start().map_err(|err| anyhow::anyhow!("start failed: {err}"))?;
    info!("telemetry pipeline running, ctrl-c to stop");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for ctrl-c")?;
    info!("shutdown requested");
    manager
        .stop()
        .map_err(|err| anyhow::anyhow!("stop failed: {err}"))?;

    let metrics = manager.metrics().encode_text();
    for line in metrics.lines().filter(|line| !line.starts_with('#')) {
        info!("{line}");
    }
    info!(
        notify_errors = manager.publisher().notify_error_count(),
        "telemetry pipeline stopped"
    );
    Ok(())
}

fn record<'a>(
    snapshot: &'a TelemetrySnapshot,
    changed: &ChangeSet,
    params: &VehicleParams,
) -> Result<TelemetryRecord<'a>, Box<dyn std::error::Error>> {
    Ok(TelemetryRecord {
        ts: OffsetDateTime::now_utc().format(&Rfc3339)?,
        changed: changed.names(),
        snapshot,
        power: snapshot.power(),
        efficiency: snapshot.efficiency(),
        speed_kph: snapshot.speed_kph(params),
    })
}

fn simulator_config(args: &Args) -> Result<SimulatorConfig> {
    if let Some(path) = &args.sim_config {
        return load_simulator_config(path);
    }
    let throttle = if args.drive_cycle {
        ThrottleProfile::DriveCycle { period_s: 10.0 }
    } else {
        ThrottleProfile::Constant {
            value: args.sim_throttle,
        }
    };
    Ok(SimulatorConfig {
        rate_hz: args.rate,
        throttle,
        ..SimulatorConfig::default()
    })
}

fn load_simulator_config(path: impl AsRef<Path>) -> Result<SimulatorConfig> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading simulator config: {}", path.display()))?;
    serde_yaml::from_str(&raw)
        .with_context(|| format!("parsing simulator config: {}", path.display()))
}

fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn yaml_config_round_trips() {
        let yaml = "rate_hz: 25.0\nseed: 42\nthrottle:\n  drive_cycle:\n    period_s: 8.0\n";
        let config: SimulatorConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.rate_hz, 25.0);
        assert_eq!(config.seed, 42);
        assert!(matches!(
            config.throttle,
            ThrottleProfile::DriveCycle { period_s } if period_s == 8.0
        ));
        // Unlisted keys fall back to defaults.
        assert_eq!(config.pole_pairs, 7);
    }

    #[test]
    fn record_carries_derived_values() {
        let mut snapshot = TelemetrySnapshot::new();
        snapshot.rpm = 3000;
        snapshot.voltage = 48.0;
        let params = VehicleParams::default();
        let record = record(&snapshot, &ChangeSet::default(), &params).unwrap();
        let value: serde_json::Value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["rpm"], 3000);
        assert!(value["speed_kph"].as_f64().unwrap() > 0.0);
        assert!(value["ts"].as_str().unwrap().contains('T'));
    }
}
