//! greet-client: fan out concurrent clients against a greet-server.

use clap::Parser;
use greet_server::client;
use greet_server::config::DEFAULT_PORT;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "greet-client")]
#[command(version = "0.1.0")]
#[command(about = "Send a line to a greet-server and check the reply", long_about = None)]
struct Args {
    /// Server address (host:port). Defaults to 127.0.0.1 on $PORT or 1235.
    #[arg(short, long)]
    addr: Option<String>,

    /// Port used when --addr is not given
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Line to send (a newline is appended)
    #[arg(short, long, default_value = "hello world")]
    message: String,

    /// Number of concurrent clients
    #[arg(short = 'n', long, default_value_t = 1)]
    count: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let addr = args
        .addr
        .unwrap_or_else(|| format!("127.0.0.1:{}", args.port));
    info!(addr = %addr, count = args.count, "Connecting");

    let start = Instant::now();
    let mut clients = JoinSet::new();
    for id in 0..args.count {
        let addr = addr.clone();
        let message = args.message.clone();
        clients.spawn(async move { (id, client::greet(addr.as_str(), &message).await) });
    }

    let mut failed = 0usize;
    while let Some(joined) = clients.join_next().await {
        match joined {
            Ok((id, Ok(()))) => info!(
                client = id,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Got response"
            ),
            Ok((id, Err(e))) => {
                failed += 1;
                error!(client = id, error = %e, "Request failed");
            }
            Err(e) => {
                failed += 1;
                error!(error = %e, "Client task failed");
            }
        }
    }

    info!(
        total = args.count,
        failed,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Finished"
    );

    if failed > 0 {
        return Err(format!("{failed} of {} requests failed", args.count).into());
    }
    Ok(())
}
