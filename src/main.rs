use clap::Parser;

use kube_rollout::cli::Cli;
use kube_rollout::config::Config;

#[tokio::main]
async fn main() -> kube_rollout::errors::TrackResult<()> {
    kube_rollout::logging::init();

    let cli = Cli::parse();
    let config = Config::try_from(cli)?;

    kube_rollout::run(config).await
}
