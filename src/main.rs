use clap::Parser;
use growatt_broker::cli::Args;
use growatt_broker::config::Config;

#[tokio::main]
async fn main() {
    env_logger::init();

    let args = Args::parse();
    let config = match Config::from_args(&args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            std::process::exit(2);
        }
    };

    if let Err(err) = growatt_broker::supervisor::run(config).await {
        log::error!("fatal error: {err:#}");
        std::process::exit(1);
    }
}
