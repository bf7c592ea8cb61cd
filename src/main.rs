// Entrypoint for the CLI application.
// - Keeps `main` small: load configuration, set up logging and hand the
//   arguments to the UI layer.
// - Exit status 1 means bad usage, 2 means the operation failed.

use std::process::ExitCode;

use sharepoint_client::{config::ClientConfig, logging, ui};

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let config = match ClientConfig::discover() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failure: {}", e);
            return ExitCode::from(2);
        }
    };
    logging::init(&config.log_level);

    match ui::run(&args, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e @ ui::CliError::Usage(_)) => {
            eprintln!("{}", e);
            eprintln!("{}", ui::usage());
            ExitCode::from(e.exit_code())
        }
        Err(e) => {
            eprintln!("Failure: {:#}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
