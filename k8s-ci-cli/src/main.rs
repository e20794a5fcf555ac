use clap::Parser;
use k8s_ci_cli::Cli;
use k8s_ci_cli::commands::handle_cluster_command;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: bool) {
    let debug = verbose || std::env::var("DEBUG").is_ok_and(|value| !value.is_empty());
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "info" }));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            std::process::exit(if err.use_stderr() { 1 } else { 0 });
        }
    };
    init_tracing(cli.verbose);

    if let Err(err) = handle_cluster_command(&cli).await {
        error!("{err:#}");
        std::process::exit(1);
    }
}
