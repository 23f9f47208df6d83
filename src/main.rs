use bulletin_digest::cli::{self, Cli, USAGE_EXIT};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() { USAGE_EXIT } else { 0 };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    // RUST_LOG wins; otherwise -v switches our own logs to debug.
    let default_directive = if cli.verbose {
        "info,bulletin_digest=debug"
    } else {
        "warn,bulletin_digest=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("could not initialise logging: {}", e))?;

    let code = cli::run(cli).await;
    std::process::exit(code);
}
