use clap::{App, Arg};
use robolink::{BridgeAgent, BridgeConfig, SerialLink, SimulatedRobot};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, Level};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("robolink")
        .version("0.1.0")
        .author("Robotics Lab Engineering Team")
        .about("Serial command bridge for a differential-drive robot")
        .arg(
            Arg::with_name("device")
                .value_name("DEVICE")
                .help("Serial device the command peer is attached to")
                .index(1),
        )
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("JSON configuration file")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("baud")
                .short("b")
                .long("baud")
                .value_name("N")
                .help("Baud rate")
                .takes_value(true)
                .validator(|v| match v.parse::<u32>() {
                    Ok(n) if n > 0 => Ok(()),
                    _ => Err("Baud rate must be a positive number".into()),
                }),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Log every command"),
        )
        .get_matches();

    let mut config = match matches.value_of("config") {
        Some(path) => BridgeConfig::from_file(path)?,
        None => BridgeConfig::default(),
    };
    if let Some(device) = matches.value_of("device") {
        config.link.device = device.to_string();
    }
    if let Some(baud) = matches.value_of("baud") {
        config.link.baud_rate = baud.parse()?;
    }

    let level = if matches.is_present("verbose") {
        Level::DEBUG
    } else {
        config.log_level.parse().unwrap_or(Level::INFO)
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let link = SerialLink::open(&config.link)?;
    let robot = SimulatedRobot::new(config.simulation.tick_ms);
    let mut agent = BridgeAgent::new(config, link, robot);

    let quit = Arc::new(AtomicBool::new(false));
    let ctrl_c_quit = Arc::clone(&quit);
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested, finishing current command");
            ctrl_c_quit.store(true, Ordering::Relaxed);
        }
    });

    let bridge_quit = Arc::clone(&quit);
    let (result, stats) = tokio::task::spawn_blocking(move || {
        let result = agent.serve(&bridge_quit);
        (result, *agent.stats())
    })
    .await?;

    info!(
        "Bridge stopped: {} commands, {} reactive runs, {} recoveries",
        stats.commands, stats.reactive_runs, stats.recoveries
    );
    if let Err(e) = result {
        error!("Bridge failed: {}", e);
        return Err(e.into());
    }
    Ok(())
}
