use clap::Parser;
use mijia_bridge::app::{Bridge, Options, RunError};
use mijia_bridge::board::{ThermalZone, format_reset_timestamp};
use mijia_bridge::mqtt::MqttBroker;
use mijia_bridge::publish::{BoardTarget, Publisher};
use mijia_bridge::{config, scanner};
use std::panic::{self, PanicHookInfo};
use std::sync::Arc;
use std::time::Duration;
use time::{OffsetDateTime, UtcOffset};

/// Exit codes for the application
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_PANIC: i32 = 2;
/// The broker link is beyond repair; the supervisor should restart us.
const EXIT_RESTART: i32 = 3;

/// How long start-up waits for the first broker connection before carrying on.
const CONNECT_GRACE: Duration = Duration::from_secs(10);

/// How long shutdown waits for queued messages to reach the broker.
const DISCONNECT_GRACE: Duration = Duration::from_secs(5);

fn last_reset_timestamp(utc_offset: i32) -> String {
    let offset = UtcOffset::from_whole_seconds(utc_offset).unwrap_or_else(|e| {
        log::warn!("Invalid UTC offset {}: {}, using UTC", utc_offset, e);
        UtcOffset::UTC
    });
    format_reset_timestamp(OffsetDateTime::now_utc().to_offset(offset))
}

/// Wire the real collaborators and run the bridge.
///
/// This function:
/// 1. Loads the device registry and broker settings
/// 2. Connects to the broker (a failed connection is logged, not fatal)
/// 3. Starts the BLE scanner
/// 4. Runs the bridge loop until it fails, the scanner stops or Ctrl-C arrives
/// 5. Disconnects from the broker so queued messages are delivered
async fn run(options: Options) -> Result<(), RunError> {
    let last_reset_ts = last_reset_timestamp(options.utc_offset);
    let registry = config::load_devices(&options.devices)?;
    let broker_config = config::load_broker(&options.mqtt)?;

    let broker = Arc::new(MqttBroker::connect(&broker_config));
    if !broker.wait_connected(CONNECT_GRACE).await {
        log::error!(
            "No connection to MQTT broker at {}:{}, continuing without telemetry",
            broker_config.host,
            broker_config.port
        );
    }

    let board = broker_config.board_telemetry_topic.map(|topic| BoardTarget {
        topic,
        sensor: Box::new(ThermalZone::new(options.thermal_zone.clone())),
        last_reset_ts,
    });
    let publisher = Publisher::new(broker.clone(), options.retry_policy(), board);
    let mut bridge = Bridge::new(registry, publisher, options.duty_cycle());

    let mut stream = scanner::start_scan(&options.name_prefix).await?;
    log::info!("Listening for {} devices", bridge.registry().len());

    let result = tokio::select! {
        result = bridge.run(&mut stream) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    let outcome = match result {
        Some(Ok(())) => Err(scanner::ScanError::Closed.into()),
        Some(Err(e)) => Err(e),
        None => {
            log::info!("Interrupted, marking devices offline");
            bridge.shutdown().await;
            Ok(())
        }
    };
    broker.shutdown(DISCONNECT_GRACE).await;
    outcome
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Set up panic hook to ensure clean exit codes for process managers
    // (e.g., systemd) that monitor exit status
    panic::set_hook(Box::new(move |info: &PanicHookInfo| {
        eprintln!("Panic! {}", info);
        std::process::exit(EXIT_PANIC);
    }));

    let options = Options::parse();

    let default_level = if options.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    match run(options).await {
        Ok(()) => std::process::exit(EXIT_SUCCESS),
        Err(RunError::RestartRequired { device }) => {
            log::error!(
                "Retry attempts exceeded while publishing {}, restarting",
                device
            );
            std::process::exit(EXIT_RESTART);
        }
        Err(why) => {
            log::error!("{}", why);
            std::process::exit(EXIT_ERROR);
        }
    }
}
