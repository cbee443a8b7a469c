//! iris: sensor bridge runtime binary.
//! Runs the broker (calibration, mock pose stream, update notifier, link
//! opener) behind a UDS JSON-RPC server, plus thin CLI clients for it.

use clap::Parser;

mod broker;
mod cli;
mod client;
mod installer;
mod opener;
mod server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    let command = args.command.unwrap_or(cli::Command::Status);
    let socket_path = args.socket_path.unwrap_or_else(cli::default_socket_path);

    match command {
        cli::Command::Daemon(opts) => {
            let filter = std::env::var("IRIS_LOG")
                .or_else(|_| std::env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string());
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
                .init();

            tracing::info!("iris broker starting");
            broker::run_broker(opts, &socket_path).await?;
        }
        cli::Command::Extrinsics => client::cmd_extrinsics(&socket_path).await?,
        cli::Command::Status => client::cmd_status(&socket_path).await?,
        cli::Command::Watch(opts) => client::cmd_watch(&socket_path, opts.count).await?,
        cli::Command::Open(opts) => client::cmd_open(&socket_path, &opts.url).await?,
    }

    Ok(())
}
