use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use log::info;

use wfskit::cli::Cli;
use wfskit::config::Config;
use wfskit::recrypt;

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(usage_status(&e));
        }
    };

    let (status, message) = outcome(try_main(cli));
    if status == 0 {
        println!("{message}");
    } else {
        eprintln!("{message}");
    }
    ExitCode::from(status)
}

fn try_main(cli: Cli) -> anyhow::Result<()> {
    let config = Config::try_from(cli).context("invalid arguments")?;
    let report = recrypt::run(&config).context("recryption aborted")?;

    if let Some(units) = report.recrypted_units {
        info!("recrypted {units} units");
    }
    if let Some(injection) = report.injection {
        info!(
            "injected {} bytes ({} bytes on disk)",
            injection.written, injection.size_on_disk
        );
    }
    Ok(())
}

/// Help and version requests go to stdout and are not failures.
fn usage_status(err: &clap::Error) -> u8 {
    u8::from(err.use_stderr())
}

/// Exit status and the line to print for a finished run.
fn outcome(result: anyhow::Result<()>) -> (u8, String) {
    match result {
        Ok(()) => (0, "Done!".to_owned()),
        Err(e) => (1, format!("Error: {}", render(&e))),
    }
}

/// Join the error chain, skipping a cause already spelled out by the
/// message before it.
fn render(err: &anyhow::Error) -> String {
    let mut out = String::new();
    for cause in err.chain() {
        let msg = cause.to_string();
        if out.ends_with(&msg) {
            continue;
        }
        if !out.is_empty() {
            out.push_str(": ");
        }
        out.push_str(&msg);
    }
    out
}
