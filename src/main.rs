use clap::Parser;
use skillshare::{ServerConfig, Service};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "skillshare", about = "Skill-sharing talk board server")]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(long, env = "SKILLSHARE_CONFIG")]
    config: Option<PathBuf>,

    /// Host to bind to.
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on.
    #[arg(long)]
    port: Option<u16>,

    /// Directory of static files served for non-API paths.
    #[arg(long)]
    public_dir: Option<PathBuf>,

    /// Seconds a long poll waits before answering empty.
    #[arg(long)]
    poll_timeout: Option<u64>,
}

impl Cli {
    fn apply(self, config: &mut ServerConfig) {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(dir) = self.public_dir {
            config.public_dir = dir;
        }
        if let Some(secs) = self.poll_timeout {
            config.poll_timeout_secs = secs;
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match ServerConfig::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };
    cli.apply(&mut config);

    tracing::info!(
        addr = %config.bind_addr(),
        poll_timeout_secs = config.poll_timeout_secs,
        "starting skillshare"
    );

    let service = Service::new(config.service_config());
    let shutdown = CancellationToken::new();

    let mut server = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { skillshare::http::run(&config, service, shutdown).await })
    };

    let result = tokio::select! {
        result = &mut server => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down...");
            shutdown.cancel();
            server.await
        }
    };

    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::error!(error = %e, "server failed");
            std::process::exit(1);
        }
        Err(e) => {
            tracing::error!(error = %e, "server task panicked");
            std::process::exit(1);
        }
    }
}
