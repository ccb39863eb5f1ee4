use clap::Parser;
use planner_companion::{run, Cli};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    if let Err(message) = run(Cli::parse()).await {
        log::error!("{message}");
        std::process::exit(1);
    }
}
