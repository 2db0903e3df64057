//! `ffwd archive` — rewrite the output archive from the current reactor.

use crate::session::open_session;
use crate::{GlobalArgs, ReactorArgs};

/// Runs the `ffwd archive` command.
///
/// Only modules that evaluate as valid are archived. Exits 1 when archive
/// saving is switched off in the configuration.
pub fn run(args: &ReactorArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let mut session = open_session(&args.reactor, global)?;
    let report = session.evaluate();

    match session.save_archive()? {
        Some(summary) => {
            if !global.quiet {
                eprintln!(
                    "   Archived {} of {} module(s), {} file(s) to {}",
                    summary.modules,
                    report.modules.len(),
                    summary.files,
                    session.archive().path().display()
                );
            }
            Ok(0)
        }
        None => {
            eprintln!("error: archive saving is disabled (archive.save = false)");
            Ok(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::fixture;
    use crate::RecordArgs;
    use tempfile::TempDir;

    #[test]
    fn archive_after_record() {
        let tmp = TempDir::new().unwrap();
        let reactor = fixture::project(tmp.path());
        let record = RecordArgs {
            reactor: reactor.clone(),
            modules: vec![],
        };
        crate::record::run(&record, &fixture::quiet()).unwrap();
        std::fs::remove_file(tmp.path().join(".ffwd/cache.tar.gz")).unwrap();

        let code = run(&ReactorArgs { reactor: reactor.clone() }, &fixture::quiet()).unwrap();
        assert_eq!(code, 0);

        let session = open_session(&reactor, &fixture::quiet()).unwrap();
        let entries = session.archive().entries().unwrap();
        assert!(entries.contains(&"com.acme/core/root/core/target/core.jar".to_string()));
        assert!(entries.contains(&"com.acme/app/root/app/src/App.java".to_string()));
    }

    #[test]
    fn nothing_recorded_writes_empty_archive() {
        let tmp = TempDir::new().unwrap();
        let reactor = fixture::project(tmp.path());
        run(&ReactorArgs { reactor: reactor.clone() }, &fixture::quiet()).unwrap();
        let session = open_session(&reactor, &fixture::quiet()).unwrap();
        assert!(session.archive().entries().unwrap().is_empty());
    }

    #[test]
    fn disabled_saving_exits_nonzero() {
        let tmp = TempDir::new().unwrap();
        let reactor = fixture::project(tmp.path());
        std::fs::write(tmp.path().join("ffwd.toml"), "[archive]\nsave = false\n").unwrap();
        let global = GlobalArgs {
            quiet: true,
            verbose: false,
            config: None,
        };
        assert_eq!(run(&ReactorArgs { reactor }, &global).unwrap(), 1);
        assert!(!tmp.path().join(".ffwd/cache.tar.gz").exists());
    }
}
