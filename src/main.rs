use clap::Parser;

use imsense::Opts;
use imsense::cli::SubCommandExtend;
use imsense::config::SubCommand;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let opts = Opts::parse();

    match &opts.subcmd {
        SubCommand::Train(config) => config.run(&opts).await,
        SubCommand::Enhance(config) => config.run(&opts).await,
        SubCommand::Status(config) => config.run(&opts).await,
        SubCommand::Server(config) => config.run(&opts).await,
    }
}
