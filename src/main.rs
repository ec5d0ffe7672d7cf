use std::env;
use std::error::Error;

use clap::Parser;

use penmount::cli::{find_config, main_cli, Args, Commands};
use penmount::input::manager::Manager;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let log_level = match env::var("LOG_LEVEL") {
        Ok(value) => value,
        Err(_) => "info".to_string(),
    };
    env::set_var("RUST_LOG", log_level);
    env_logger::init();

    let args = Args::parse();
    if !matches!(args.cmd, None | Some(Commands::Run)) {
        return main_cli(args).await;
    }

    const VERSION: &str = env!("CARGO_PKG_VERSION");
    log::info!("Starting PenMount driver v{VERSION}");

    let config = find_config(args.config.as_ref())?;
    let mut manager = Manager::new(config);
    if let Err(e) = manager.run().await {
        log::error!("Error running device: {e}");
        return Err(e);
    }

    log::info!("PenMount driver stopped");

    Ok(())
}
