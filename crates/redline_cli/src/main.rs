//! Batch entry point for due-review notification dispatch.
//!
//! # Responsibility
//! - Run one dispatcher pass against a document database and print the
//!   machine-readable report to stdout.
//! - Exit non-zero on fatal dispatch errors so schedulers can alert.
//!
//! Usage: `redline_cli <db-path> [--now <rfc3339>] [--pretty]`
//!
//! Configuration comes from `REDLINE_*` environment variables (see
//! `redline_core::config`); `--now` exists for reproducible dry-runs.

use chrono::{DateTime, Utc};
use redline_core::db::open_db;
use redline_core::{
    default_log_level, init_logging, DispatchConfig, DispatchReport, LogSender,
    NotificationDispatcher, SqliteDocumentStore,
};
use std::process::ExitCode;

struct CliArgs {
    db_path: String,
    now: DateTime<Utc>,
    pretty: bool,
}

fn main() -> ExitCode {
    if let Err(message) = init_logging(default_log_level(), None) {
        eprintln!("logging init failed: {message}");
        return ExitCode::from(2);
    }

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            eprintln!("usage: redline_cli <db-path> [--now <rfc3339>] [--pretty]");
            return ExitCode::from(2);
        }
    };

    match dispatch_once(&args) {
        Ok(report) => {
            print_report(&report, args.pretty);
            ExitCode::SUCCESS
        }
        Err(message) => {
            eprintln!("dispatch failed: {message}");
            ExitCode::FAILURE
        }
    }
}

fn dispatch_once(args: &CliArgs) -> Result<DispatchReport, String> {
    let conn = open_db(&args.db_path).map_err(|err| err.to_string())?;
    let store = SqliteDocumentStore::try_new(&conn).map_err(|err| err.to_string())?;
    let dispatcher = NotificationDispatcher::new(store, LogSender, DispatchConfig::from_env());
    dispatcher.run(args.now).map_err(|err| err.to_string())
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<CliArgs, String> {
    let mut db_path = None;
    let mut now = Utc::now();
    let mut pretty = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--pretty" => pretty = true,
            "--now" => {
                let raw = args.next().ok_or("--now requires an RFC 3339 timestamp")?;
                now = raw
                    .parse::<DateTime<Utc>>()
                    .map_err(|err| format!("invalid --now value `{raw}`: {err}"))?;
            }
            other if other.starts_with("--") => {
                return Err(format!("unknown option `{other}`"));
            }
            _ if db_path.is_none() => db_path = Some(arg),
            other => return Err(format!("unexpected argument `{other}`")),
        }
    }

    Ok(CliArgs {
        db_path: db_path.ok_or("missing required <db-path> argument")?,
        now,
        pretty,
    })
}

fn print_report(report: &DispatchReport, pretty: bool) {
    let rendered = if pretty {
        serde_json::to_string_pretty(report)
    } else {
        serde_json::to_string(report)
    };
    match rendered {
        Ok(json) => println!("{json}"),
        Err(err) => eprintln!("failed to render report: {err}"),
    }
}
