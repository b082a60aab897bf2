//! `polyws-server` binary: an echo server for every supported dialect.

use std::process::ExitCode;

use polyws_server::cli::{self, Command};
use polyws_server::{Server, ServerConfig, ServerResult};

#[tokio::main]
async fn main() -> ExitCode {
    let command = match cli::parse_args(std::env::args().skip(1)) {
        Ok(command) => command,
        Err(message) => {
            eprintln!("error: {message}\n\n{}", cli::USAGE);
            return ExitCode::from(2);
        }
    };

    match command {
        Command::Help => {
            print!("{}", cli::USAGE);
            ExitCode::SUCCESS
        }
        Command::Version => {
            println!("polyws-server {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        Command::Run { config } => match run(config.as_deref()).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("error: {e}");
                ExitCode::FAILURE
            }
        },
    }
}

async fn run(config_path: Option<&std::path::Path>) -> ServerResult<()> {
    let config = cli::load_config(config_path)?;
    polyws_telemetry::init_telemetry(&cli::telemetry_config(&config))?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_addr = %config.server.bind_addr,
        "starting polyws-server"
    );

    Server::new(ServerConfig::from(&config)).run().await
}
