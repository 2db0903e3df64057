//! `ffwd clean` — forget every recorded module and the archive.

use crate::session::open_session;
use crate::{GlobalArgs, ReactorArgs};

/// Runs the `ffwd clean` command.
pub fn run(args: &ReactorArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let mut session = open_session(&args.reactor, global)?;
    let summary = session.clean()?;
    if !global.quiet {
        eprintln!(
            "   Removed {} state file(s){}",
            summary.states,
            if summary.archive { " and the archive" } else { "" }
        );
    }
    Ok(0)
}
