//! A scanning station for the check-in api.
//!
//! Reads codes from the command line or from stdin (one per line, as a
//! keyboard-wedge barcode reader types them), shows who each code belongs to
//! and records the scan.

#![warn(clippy::all, clippy::pedantic)]

use anyhow::{Context, Result};
use checkin_common::client_api::{
    get_event_from_server, lookup_user_on_server, submit_scan_to_server,
};
use checkin_common::events::{EventRecord, code_belongs_to_event};
use checkin_common::{CLIENT_VERSION, ScanBody, UserLookupBody};
use clap::Parser;
use serde_json::Value;
use std::io::BufRead;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// The event to check attendees in to
    #[arg(env = "CHECKIN_EVENT")]
    event_id: String,

    /// The base API URL to connect to
    #[arg(long, default_value = "http://localhost:8000", env = "CHECKIN_API_BASE")]
    api_base: String,

    /// Codes to scan; read from stdin when none are given
    #[arg(short, long, num_args = 1..)]
    codes: Vec<String>,

    /// Give up on a request after this many attempts. A scan is only
    /// repeated when the server could not be reached at all
    #[arg(long, default_value_t = 3, env = "CHECKIN_MAX_RETRIES")]
    max_retries: u32,

    /// Accept codes without the `|<event id>` suffix
    #[arg(long, env = "CHECKIN_ALLOW_FOREIGN_CODES")]
    allow_foreign_codes: bool,

    /// Suppress all output
    #[arg(short, long, env = "CHECKIN_QUIET")]
    quiet: bool,

    /// Show additional output
    #[arg(short, long, env = "CHECKIN_VERBOSE")]
    verbose: bool,
}

/// One-line summary of a lookup result, e.g. `Name: Ada, Mobile Number: 9000 0001`.
fn describe_attendee(value: &Value) -> String {
    match value {
        Value::Array(rows) => rows.iter().map(describe_attendee).collect::<Vec<_>>().join(" / "),
        Value::Object(fields) => fields
            .iter()
            .filter(|(k, _)| k.as_str() != "code")
            .map(|(k, v)| match v {
                Value::String(s) => format!("{k}: {s}"),
                Value::Null => format!("{k}: -"),
                other => format!("{k}: {other}"),
            })
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

fn lookup_body(event: &EventRecord, code: &str) -> UserLookupBody {
    UserLookupBody {
        code: Some(code.to_string()),
        sheet_id: Some(event.spreadsheet_id()),
        sheet_name: Some(event.directory_sheet()),
        scanned_info: Some(event.scanned_info()),
        code_column: Some(event.code_column()),
    }
}

fn scan_body(event: &EventRecord, code: &str) -> ScanBody {
    ScanBody {
        code: Some(code.to_string()),
        sheet_id: Some(event.spreadsheet_id()),
        sheet_name: Some(event.attendance_sheet()),
    }
}

/// Look up and record a single code. A failed lookup does not stop the scan.
fn scan_code(cli: &Cli, event: &EventRecord, code: &str) -> Result<()> {
    let attendee = match lookup_user_on_server(&cli.api_base, &lookup_body(event, code), cli.max_retries) {
        Ok(found) => found,
        Err(e) => {
            log::warn!("Lookup for {code} failed: {e:#}");
            None
        }
    };

    let record = submit_scan_to_server(&cli.api_base, &scan_body(event, code), cli.max_retries)
        .with_context(|| {
            format!("Failed to record scan for {code}; check the attendance sheet before scanning it again")
        })?;

    if !cli.quiet {
        let who = attendee
            .as_ref()
            .map_or_else(|| "attendee not in directory".to_string(), describe_attendee);
        if record.duplicate {
            println!("ALREADY SCANNED {code} ({who})");
        } else {
            println!("SCANNED {code} ({who})");
        }
        if cli.verbose {
            println!("  {} at {}", record.message, record.timestamp);
        }
    }
    Ok(())
}

fn run(cli: &Cli) -> Result<()> {
    let event = get_event_from_server(&cli.api_base, &cli.event_id, cli.max_retries)
        .with_context(|| format!("Could not load event {}", cli.event_id))?;

    if !cli.quiet {
        println!(
            "Checkin Client v{} started for \"{}\" (attendance sheet {}).",
            CLIENT_VERSION,
            event.event_name,
            event.attendance_sheet()
        );
    }
    if event.spreadsheet_id().is_empty() {
        anyhow::bail!("Event {} has no spreadsheet link", event.id);
    }

    let handle = |code: &str| {
        let code = code.trim();
        if code.is_empty() {
            return;
        }
        if !cli.allow_foreign_codes && !code_belongs_to_event(code, &event.id) {
            eprintln!("Invalid QR code for this event: {code}");
            return;
        }
        if let Err(e) = scan_code(cli, &event, code) {
            eprintln!("Scan failed: {e:#}");
        }
    };

    if cli.codes.is_empty() {
        if !cli.quiet {
            println!("Waiting for codes on stdin...");
        }
        for line in std::io::stdin().lock().lines() {
            handle(&line.context("Failed to read from stdin")?);
        }
    } else {
        cli.codes.iter().for_each(|code| handle(code.as_str()));
    }
    Ok(())
}

fn main() {
    // Parse command line arguments
    let cli = Cli::parse();

    // Set up logger
    env_logger::init();

    if let Err(e) = run(&cli) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
