use bindflow_core::logging::{self, LogLevel};
use bindflow_runner::cli::Cli;
use clap::Parser;
use colored::Colorize;

fn main() {
    let cli = Cli::parse();

    logging::set_log_level(LogLevel::from_verbosity(cli.verbose));
    logging::set_log_level_from_env();

    let logging_config = bindflow_runner::resolve_config(&cli)
        .map(|c| c.logging)
        .unwrap_or_default();
    if let Err(e) = logging::init_session_logger(&logging_config) {
        eprintln!(
            "{}",
            format!("[ERROR] Failed to initialize session logger: {}", e).red()
        );
        logging::init_console_logger();
    }

    if let Err(e) = bindflow_runner::run(cli) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}
