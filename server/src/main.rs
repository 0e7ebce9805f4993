use clap::Parser;
use log::{error, info};
use server::network::Server;
use shared::{DEFAULT_TICK_RATE, GRID_HEIGHT, GRID_WIDTH};
use tokio::sync::watch;

/// Parses command-line arguments, binds the server, and runs it until
/// Ctrl+C flips the shutdown flag.
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
        #[clap(short, long, default_value = "12345")]
        port: u16,
        /// Tick rate (simulation updates per second)
        #[clap(short, long, default_value_t = DEFAULT_TICK_RATE)]
        tick_rate: u32,
    }

    env_logger::init();
    let args = Args::parse();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let address = format!("{}:{}", args.host, args.port);
    let server = Server::bind(
        &address,
        args.tick_rate,
        GRID_WIDTH,
        GRID_HEIGHT,
        shutdown_rx,
    )
    .await?;

    let mut server_task = tokio::spawn(server.run());

    tokio::select! {
        result = &mut server_task => {
            match result {
                Ok(Err(e)) => error!("Server failed: {}", e),
                Err(e) => error!("Server task panicked: {}", e),
                Ok(Ok(())) => {}
            }
            return Ok(());
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
            let _ = shutdown_tx.send(true);
        }
    }

    // Let the accept loop, game loop, and sessions observe the flag.
    if let Ok(Err(e)) = server_task.await {
        error!("Server failed during shutdown: {}", e);
    }

    Ok(())
}
