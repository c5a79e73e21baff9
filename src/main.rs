use anyhow::{Context, Result};
use clap::Parser;
use std::sync::{Arc, Mutex};
use tokio::time::{interval, Duration};

use thermo_probe_rs::hal::{sim_thermocouple, ConsoleDisplay, SettableMemoryGauge, SystemClock};
use thermo_probe_rs::probe::run_sensor_loop;
use thermo_probe_rs::{Max6675, NetInfo, ProbeConfig, Thermometer};

#[derive(Parser, Debug)]
#[command(name = "thermo_probe")]
#[command(about = "Thermocouple probe firmware against simulated hardware", long_about = None)]
struct Args {
    /// Number of heartbeats to run (0 = continuous)
    #[arg(value_name = "CYCLES", default_value = "0")]
    cycles: u64,

    /// Seconds between sampling cycles
    #[arg(long, default_value = "5")]
    heartbeat: u64,

    /// Store capacity in readings
    #[arg(long, default_value = "24")]
    capacity: usize,

    /// Smoothing factor for the displayed rate, (0, 1]
    #[arg(long, default_value = "0.3")]
    alpha: f64,

    /// HTTP port for the /data and /stream endpoints
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Reported IP address (display metadata)
    #[arg(long, default_value = "192.168.1.40")]
    ip: String,

    /// Reported MAC address (display metadata)
    #[arg(long, default_value = "28:cd:c1:00:00:01")]
    mac: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    println!("Thermo Probe starting");
    println!("  Heartbeat: {}s", args.heartbeat);
    println!("  Capacity:  {} readings", args.capacity);
    println!("  Alpha:     {}", args.alpha);
    println!("  Endpoint:  http://0.0.0.0:{}", args.port);

    let (sck, cs, so, model) = sim_thermocouple();
    let clock = SystemClock::new();
    let sensor = Max6675::new(sck, cs, so, clock);

    let config = ProbeConfig {
        heartbeat_secs: args.heartbeat,
        capacity: args.capacity,
        alpha: args.alpha,
        ..ProbeConfig::default()
    };
    let probe = Thermometer::new(
        sensor,
        clock,
        ConsoleDisplay,
        SettableMemoryGauge::new(192 * 1024),
        NetInfo {
            ip: args.ip,
            mac: args.mac,
        },
        config,
    )
    .context("invalid probe configuration")?;
    let probe = Arc::new(Mutex::new(probe));

    // Drive the simulated converter with a slow thermal waveform so the
    // estimator has something to chase on the workbench.
    let waveform_model = model.clone();
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_millis(500));
        let mut t = 0.0_f64;
        loop {
            ticker.tick().await;
            t += 0.5;
            // Drifts around 21 C with a gentle swing, 0.25 C granularity.
            let celsius = 21.0 + 2.5 * (t / 120.0).sin();
            waveform_model.lock().unwrap().set_code((celsius / 0.25) as u16);
        }
    });

    tokio::spawn(thermo_probe_rs::server::serve(probe.clone(), args.port));

    let cycles = if args.cycles == 0 {
        None
    } else {
        Some(args.cycles)
    };
    run_sensor_loop(probe.clone(), cycles)
        .await
        .context("sensor loop aborted")?;

    let snapshot = probe.lock().unwrap().current_snapshot();
    println!("Final snapshot:");
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    Ok(())
}
