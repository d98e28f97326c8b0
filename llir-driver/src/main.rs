use std::process::ExitCode;

use clap::Parser;
use llir_driver::Opt;
use log::error;
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};
use utils::DiagnosticEmitter;

fn main() -> ExitCode {
    let opts = Opt::parse();

    if let Err(err) = TermLogger::init(
        opts.log_level(),
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    ) {
        eprintln!("Failed to initialize the logger: {err}");
    }

    let contents = match std::fs::read_to_string(&opts.filename) {
        Ok(contents) => contents,
        Err(err) => {
            error!("Failed to read '{}': {err}", opts.filename);
            return ExitCode::from(1);
        }
    };

    let mut diag = DiagnosticEmitter::new(Box::new(std::io::stdout()), Box::new(std::io::stderr()));
    if llir_driver::process_source(&contents, &mut diag, &opts).is_none() {
        return ExitCode::from(1);
    }

    ExitCode::from(0)
}
