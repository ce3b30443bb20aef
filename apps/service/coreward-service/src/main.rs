use coreward_service::args::ServiceArgs;
use coreward_service::logger::initialize as LoggerInitialize;
use coreward_service::run::run;

use std::process::ExitCode;

use clap::Parser;
use log::error;

#[tokio::main]
async fn main() -> ExitCode {
    let args = ServiceArgs::parse();

    if let Err(e) = LoggerInitialize(&args.log_dir()) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
