use anyhow::Context;
use clap::Parser;

use whale_watch::config::{self, CliArgs};
use whale_watch::logger;
use whale_watch::supervisor::Supervisor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    let log_file = args
        .logs_dir
        .as_deref()
        .map(|dir| (dir, "whale-watch.log"));
    logger::init(args.log_level, args.disable_log_color, log_file).context("failed to install logger")?;

    let config = config::load(&args).context("failed to load config")?;
    let supervisor = Supervisor::init(config).await.context("failed to initialize supervisor")?;
    supervisor.run().await
}
