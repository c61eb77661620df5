use std::path::PathBuf;

use anyhow::Context;
use ardecoder_lib::serial::SerialInterface;
use ardecoder_lib::{logger, EncoderConfig, EncoderSession, SerialConnector};

const DEFAULT_CONFIG_FILE: &str = "ardecoder.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let config = if config_path.exists() {
        EncoderConfig::load(&config_path)
            .with_context(|| format!("loading {}", config_path.display()))?
    } else {
        EncoderConfig::default()
    };

    logger::initialize(config.level_filter()?, None)?;

    match SerialInterface::discover_ports() {
        Ok(ports) => {
            for port in ports {
                log::debug!("Found serial port {} ({:?})", port.port_name, port.product);
            }
        }
        Err(e) => log::warn!("Could not list serial ports: {}", e),
    }

    let (session, mut values) = EncoderSession::start(SerialConnector, &config)?;
    let mut status_rx = session.status_receiver();

    loop {
        tokio::select! {
            delivery = values.next() => {
                match delivery {
                    Some(delivery) => println!(
                        "{:>10} {:>10.4} rev",
                        delivery.value,
                        config.revolutions(delivery.value)
                    ),
                    None => break,
                }
            }
            changed = status_rx.changed() => {
                if changed.is_err() || status_rx.borrow_and_update().state.is_terminal() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted, shutting down");
                break;
            }
        }
    }

    let status = tokio::task::spawn_blocking(move || {
        let mut session = session;
        session.stop()
    })
    .await?;

    match status.last_error {
        Some(error) => anyhow::bail!("encoder session on {} ended: {}", config.device, error),
        None => {
            log::info!(
                "Received {} frames ({} malformed, {} device errors)",
                status.frames_delivered,
                status.malformed_lines,
                status.device_errors
            );
            Ok(())
        }
    }
}
