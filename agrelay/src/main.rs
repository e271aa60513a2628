mod http;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use agrelay_sfu::{SfuConfig, SfuRegistry};

#[derive(Parser, Debug)]
#[command(name = "agrelay")]
#[command(about = "Many-to-many WebRTC SFU", long_about = None)]
struct Args {
    /// HTTP listen address
    #[arg(long, env = "AGRELAY_ADDR", default_value = "0.0.0.0:9000")]
    addr: String,

    /// Enable the dev token and demo page endpoints
    #[arg(long, env = "AGRELAY_DEV")]
    dev: bool,

    /// Enable verbose logging
    #[arg(long, env = "AGRELAY_VERBOSE")]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "info,agrelay=trace,agrelay_sfu=trace"
    } else {
        "info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    if std::env::var(http::TOKEN_KEY_ENV).is_err() {
        tracing::warn!(
            "{} is not set, every login will be rejected",
            http::TOKEN_KEY_ENV
        );
    }

    let registry = SfuRegistry::new(SfuConfig::default());
    let router = http::create_router(registry, args.dev);

    let listener = tokio::net::TcpListener::bind(&args.addr).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, router).await?;

    Ok(())
}
