pub mod args;
mod client;
mod serve;
mod setup;

pub use args::AppArgs;

use anyhow::Result;
use args::Command;

pub async fn launch() -> Result<()> {
    launch_with_args(AppArgs::from_cli()).await
}

pub async fn launch_with_args(args: AppArgs) -> Result<()> {
    setup::configure_logging(args.verbose);

    match args.command.unwrap_or_else(|| Command::Serve(Default::default())) {
        Command::Serve(serve_args) => serve::run(setup::prepare(serve_args)?).await,
        Command::Send(send_args) => client::send(send_args).await,
        Command::Query(query_args) => client::query(query_args).await,
    }
}
