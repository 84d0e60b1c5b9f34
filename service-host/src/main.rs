// service-host/src/main.rs
// Builds the registry from a config file (first argument, or the
// SERVICE_RUNTIME_CONFIG environment variable), lists what was found and
// starts the main service.

use log::{error, info};
use service_host::Host;
use service_interface::Config;
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::init();

    let config = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => match Config::from_file(&path) {
            Ok(config) => config,
            Err(err) => {
                error!("{}", err);
                return ExitCode::FAILURE;
            }
        },
        None => Config::from_env(),
    };

    let host = Host::new(config);
    print!("{}", host.summary());

    match host.main_service() {
        Ok(Some(service)) => {
            info!("main service `{}` started", service.name());
            ExitCode::SUCCESS
        }
        Ok(None) => {
            info!("no main service configured");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("cannot start main service: {}", err);
            ExitCode::FAILURE
        }
    }
}
