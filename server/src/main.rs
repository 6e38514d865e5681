use clap::Parser;
use log::{error, info};
use server::game::Game;
use server::network;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Parses command-line arguments, builds the default world, then runs
/// the simulation scheduler and the TCP listener until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "0.0.0.0")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "9000")]
        port: u16,
        /// Simulation tick interval in milliseconds
        #[clap(short, long, default_value_t = shared::TICK_INTERVAL_MS)]
        tick_ms: u64,
    }

    env_logger::init();
    let args = Args::parse();
    let tick = Duration::from_millis(args.tick_ms);

    let game = Arc::new(Game::default_world());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let address = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&address).await?;
    info!("Server listening on {}", address);

    // Simulation scheduler
    let simulation_handle = {
        let game = Arc::clone(&game);
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            game.run(tick, shutdown).await;
        })
    };

    // Connection accept loop
    let network_handle = {
        let game = Arc::clone(&game);
        let shutdown = shutdown_rx;
        tokio::spawn(async move {
            if let Err(e) = network::serve(game, listener, shutdown).await {
                error!("Network server failed: {}", e);
            }
        })
    };

    tokio::select! {
        result = simulation_handle => {
            if let Err(e) = result {
                error!("Simulation task panicked: {}", e);
            }
        }
        result = network_handle => {
            if let Err(e) = result {
                error!("Network task panicked: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    let _ = shutdown_tx.send(true);
    Ok(())
}
