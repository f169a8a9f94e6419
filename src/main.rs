use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use zonewright::auth::Htpasswd;
use zonewright::config::Args;
use zonewright::server;
use zonewright::zone::ZoneManager;

fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(if args.debug {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    let htpasswd = match Htpasswd::from_file(&args.htpasswd) {
        Ok(htpasswd) if !htpasswd.is_empty() => htpasswd,
        Ok(_) => {
            error!("no credentials found in {}", args.htpasswd);
            return ExitCode::FAILURE;
        }
        Err(err) => {
            error!("failed to load {}: {err}", args.htpasswd);
            return ExitCode::FAILURE;
        }
    };

    let zones = match ZoneManager::open(&args.zones) {
        Ok(zones) => zones,
        Err(err) => {
            error!("failed to load zones: {err}");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("couldn't start Tokio: {err}");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(async {
        match server::run(&args, htpasswd, zones).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                error!("server failed: {err}");
                ExitCode::FAILURE
            }
        }
    })
}
