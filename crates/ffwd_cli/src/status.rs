//! `ffwd status` — evaluate a reactor and report what can be fast-forwarded.
//!
//! Prints one line per module with its verdict and, for dirty modules, the
//! first reason found. Outputs restored from the archive are reported too,
//! since evaluation restores them as a side effect.

use std::fmt::Write as _;

use ffwd_cache::{ExecutionVerdict, ReactorReport};

use crate::session::open_session;
use crate::{GlobalArgs, ReportFormat, StatusArgs};

/// Runs the `ffwd status` command. Always exits 0 once the reactor loads.
pub fn run(args: &StatusArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let mut session = open_session(&args.reactor, global)?;
    let report = session.evaluate();

    match args.format {
        ReportFormat::Json => {
            let json = serde_json::to_string_pretty(&report)?;
            println!("{json}");
        }
        ReportFormat::Text => {
            if !global.quiet {
                print!("{}", render_text(&report, global.verbose));
            }
        }
    }
    Ok(0)
}

/// Renders a report for the terminal.
fn render_text(report: &ReactorReport, verbose: bool) -> String {
    let mut out = String::new();
    for verdict in &report.modules {
        let _ = write!(out, "{:>8} {}", verdict.status.to_string(), verdict.module);
        if let Some(ref reason) = verdict.reason {
            let _ = write!(out, ": {reason}");
        }
        if verdict.restored > 0 {
            let _ = write!(out, " ({} output(s) restored)", verdict.restored);
        }
        out.push('\n');
        if verbose {
            for decision in &verdict.executions {
                let action = match decision.verdict {
                    ExecutionVerdict::Skip => "skip",
                    ExecutionVerdict::Run => "run",
                };
                let _ = writeln!(out, "           {action:<4} {}", decision.key);
            }
        }
    }
    let _ = writeln!(
        out,
        "{} fast-forwarded, {} to build; {} unit(s) skipped, {} to run",
        report.fast_forwarded, report.dirty, report.executions_skipped, report.executions_run
    );
    out
}
