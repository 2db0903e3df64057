//! `ffwd record` — record modules after the host build ran them.
//!
//! Evaluates the reactor first so modules that were fast-forwarded keep
//! their archive entries, records the requested modules (all of them by
//! default), and rewrites the archive.

use ffwd_common::ModuleId;

use crate::session::open_session;
use crate::{GlobalArgs, RecordArgs};

/// Runs the `ffwd record` command.
pub fn run(args: &RecordArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let mut session = open_session(&args.reactor, global)?;
    session.evaluate();

    let targets: Vec<ModuleId> = if args.modules.is_empty() {
        session.reactor().modules().map(|m| m.id.clone()).collect()
    } else {
        args.modules
            .iter()
            .map(|m| m.parse::<ModuleId>())
            .collect::<Result<_, _>>()?
    };

    for module in &targets {
        session.record_build(module)?;
        if !global.quiet {
            eprintln!("   Recorded {module}");
        }
    }

    if let Some(summary) = session.save_archive()? {
        if !global.quiet {
            eprintln!(
                "   Archived {} module(s), {} file(s) to {}",
                summary.modules,
                summary.files,
                session.archive().path().display()
            );
        }
    }
    Ok(0)
}
