use log::{error, info, logger, warn, Level};
use pulsenet_core::message::{build_chat_message, build_login_message};
use pulsenet_core::{SendOptions, Session};
use pulsenet_log::PulsenetLogger;
use tokio::time::{Duration, Instant};

pub mod config;
pub mod server;

#[tokio::main]
async fn main() {
    PulsenetLogger::init(Level::Info, 1024).expect("failed to install logger");

    let start_time = Instant::now();

    let config = match config::handle() {
        Ok(config) => config,
        Err(e) => {
            error!("failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    let mode = std::env::args().nth(1).unwrap_or_else(|| "connect".to_string());
    info!("starting in '{mode}' mode, config loaded in {:.3}s", start_time.elapsed().as_secs_f64());

    let result = match mode.as_str() {
        "serve" => server::run(&config.network.address).await.map_err(Into::into),
        "connect" => run_client_demo(config).await,
        other => {
            error!("unknown mode '{other}', expected 'serve' or 'connect'");
            std::process::exit(2);
        }
    };

    if let Err(e) = result {
        error!("exiting with error: {e}");
        logger().flush();
        std::process::exit(1);
    }
    logger().flush();
}

async fn run_client_demo(config: config::Config) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::new(config.session.clone());

    session.register_handler(
        "chat",
        Box::new(|value| {
            info!("chat: {value}");
            Ok(())
        }),
    );
    session.register_handler(
        "*",
        Box::new(|value| {
            info!("unhandled message: {value}");
            Ok(())
        }),
    );

    info!("connecting to {}", config.network.address);
    session.connect(config.network.address.clone()).await?;

    session.send(
        build_login_message(&config.client.display_name, "", "desktop"),
        SendOptions::default(),
    )?;
    session.send(
        build_chat_message("hello from pulsenet", "global"),
        SendOptions::default(),
    )?;

    tokio::time::sleep(Duration::from_secs(2)).await;

    let metrics = session.metrics();
    let quality = session.quality();
    info!(
        "state={:?} packets_sent={} packets_received={} quality_score={}",
        session.state(),
        metrics.packets_sent,
        metrics.packets_received,
        quality.quality_score
    );

    if session.state() != pulsenet_core::ConnectionState::Connected {
        warn!("session left Connected state before shutdown: {:?}", session.state());
    }

    session.disconnect().await;
    Ok(())
}
