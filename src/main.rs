use anyhow::Context;
use simplelog as sl;
use std::{sync::mpsc, sync::Arc, time::Duration};
use OBC_Harness::{
    command::{ObcClient, ObcControl},
    communication::{self, FrameReader, ResponseRouter},
    config::HarnessConfig,
};

/// Interval in which the monitor checks whether the link is still alive
const LINK_CHECK_INTERVAL: Duration = Duration::from_secs(1);

fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "./config.toml".to_string());
    let config = HarnessConfig::from_file(&config_path)?;

    let _ = sl::CombinedLogger::init(vec![
        sl::TermLogger::new(
            config.log_level()?,
            sl::Config::default(),
            sl::TerminalMode::Mixed,
            sl::ColorChoice::Auto,
        ),
        sl::WriteLogger::new(
            config.log_level()?,
            sl::Config::default(),
            std::fs::OpenOptions::new().create(true).append(true).open(&config.log_path)?,
        ),
    ]);

    log::info!("OBC harness started");
    let decoder = Arc::new(config.beacon_decoder()?);

    let (transport, source) = communication::open_serial(&config.uart, config.baudrate)
        .with_context(|| format!("Could not open {}", config.uart))?;
    log::info!("Opened {} at {} baud", config.uart, config.baudrate);

    let router = ResponseRouter::new(Arc::new(transport));
    router.set_unsolicited_observer(|frame| log::info!("Unsolicited {frame:?}"));

    let (beacon_tx, beacon_rx) = mpsc::channel();
    let reader = FrameReader::spawn(source, router.clone(), decoder, beacon_tx);

    let client = ObcClient::new(router.clone(), config.security_code)
        .with_timeout(config.default_timeout());
    match client.ping() {
        Ok(pong) => log::info!("OBC answered ping with {pong:?}"),
        Err(e) => log::error!("Ping failed: {e}"),
    }

    while !reader.is_finished() {
        match beacon_rx.recv_timeout(LINK_CHECK_INTERVAL) {
            Ok(snapshot) => log::info!("Beacon\n{snapshot}"),
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    log::info!("Link closed, shutting down");
    router.cancel_all();
    reader.stop();
    Ok(())
}
