//! Single-file archive of cached build outputs.
//!
//! The archive is a gzip-compressed tar. Every entry lives under the owning
//! module's prefix `group/artifact/`, followed by `root/<path>` for files
//! under the build root or `external/<absolute path>` for anything else.
//! External entries are stored but cannot be restored on another machine.
//!
//! Saves hold one writer lock for the whole pass and write to a temporary file
//! that replaces the previous archive on success. Restores open their own
//! read-only handle.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use ffwd_common::{ContentHash, ModuleId};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::CacheError;
use crate::hasher::{millis_to_filetime, FileDescriptor};
use crate::state::ProjectState;

/// Entry segment for root-relative files.
const ROOT_SEGMENT: &str = "root";

/// Entry segment for files outside the build root.
const EXTERNAL_SEGMENT: &str = "external";

/// Outcome of one save pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// Modules written to the archive.
    pub modules: usize,
    /// Files written to the archive.
    pub files: usize,
    /// Modules left out because a recorded file was missing or had changed.
    pub skipped: Vec<ModuleId>,
}

/// The archive file of one build root.
#[derive(Debug)]
pub struct ArchiveStore {
    path: PathBuf,
    root: PathBuf,
    writer: Mutex<()>,
}

impl ArchiveStore {
    /// Creates a store for the archive at `path`, holding files under `root`.
    pub fn new(path: impl Into<PathBuf>, root: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            root: root.into(),
            writer: Mutex::new(()),
        }
    }

    /// Location of the archive file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `true` if an archive has been written.
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Archive entry name for a recorded file of `module`.
    pub fn entry_name(module: &ModuleId, file: &FileDescriptor) -> String {
        if file.portable {
            format!("{}/{ROOT_SEGMENT}/{}", module.archive_prefix(), file.path)
        } else {
            format!(
                "{}/{EXTERNAL_SEGMENT}/{}",
                module.archive_prefix(),
                file.path.trim_start_matches('/')
            )
        }
    }

    /// Writes every given module's recorded files into a fresh archive.
    ///
    /// A module is left out entirely when one of its files is missing or no
    /// longer matches its recorded checksum.
    pub fn save(&self, states: &[&ProjectState]) -> Result<ArchiveSummary, CacheError> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;
        }
        let tmp = self.tmp_path();
        let summary = match self.write_archive(&tmp, states) {
            Ok(summary) => summary,
            Err(e) => {
                if let Err(cleanup) = std::fs::remove_file(&tmp) {
                    if cleanup.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!("could not remove {}: {cleanup}", tmp.display());
                    }
                }
                return Err(e);
            }
        };

        tracing::info!(
            "archived {} file(s) from {} module(s) to {}",
            summary.files,
            summary.modules,
            self.path.display()
        );
        Ok(summary)
    }

    /// Writes the archive to `tmp` and moves it into place.
    fn write_archive(
        &self,
        tmp: &Path,
        states: &[&ProjectState],
    ) -> Result<ArchiveSummary, CacheError> {
        let file = File::create(tmp).map_err(|e| CacheError::io(tmp, e))?;
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));

        let mut summary = ArchiveSummary::default();
        for state in states {
            let entries = match self.collect_module(state) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!("{}: not archived: {e}", state.module);
                    summary.skipped.push(state.module.clone());
                    continue;
                }
            };
            for (name, descriptor, data) in &entries {
                let mut header = tar::Header::new_gnu();
                header.set_size(data.len() as u64);
                header.set_mode(0o644);
                header.set_mtime(descriptor.last_modified.max(0) as u64 / 1000);
                header.set_cksum();
                builder
                    .append_data(&mut header, name, data.as_slice())
                    .map_err(|e| CacheError::io(tmp, e))?;
            }
            summary.modules += 1;
            summary.files += entries.len();
        }

        let encoder = builder.into_inner().map_err(|e| CacheError::io(tmp, e))?;
        let file = encoder.finish().map_err(|e| CacheError::io(tmp, e))?;
        file.sync_all().map_err(|e| CacheError::io(tmp, e))?;
        drop(file);
        std::fs::rename(tmp, &self.path).map_err(|e| CacheError::io(&self.path, e))?;
        Ok(summary)
    }

    fn collect_module<'a>(
        &self,
        state: &'a ProjectState,
    ) -> Result<Vec<(String, &'a FileDescriptor, Vec<u8>)>, CacheError> {
        let mut entries = Vec::new();
        for descriptor in state.files() {
            if !descriptor.portable {
                tracing::warn!(
                    "{}: {} is outside the build root and will not restore elsewhere",
                    state.module,
                    descriptor.path
                );
            }
            let path = descriptor.resolve(&self.root);
            let data = std::fs::read(&path).map_err(|e| CacheError::io(&path, e))?;
            if let Some(recorded) = descriptor.checksum {
                if ContentHash::from_bytes(&data) != recorded {
                    return Err(CacheError::FileChanged {
                        path: descriptor.path.clone(),
                    });
                }
            }
            entries.push((Self::entry_name(&state.module, descriptor), descriptor, data));
        }
        Ok(entries)
    }

    /// Restores `files` of `module` from the archive.
    ///
    /// Every entry is read and verified before anything is written, so a
    /// missing or corrupt entry leaves the working tree untouched. Restored
    /// files get their recorded modification time. Returns the number of files
    /// written.
    pub fn restore(&self, module: &ModuleId, files: &[&FileDescriptor]) -> Result<usize, CacheError> {
        if files.is_empty() {
            return Ok(0);
        }
        let wanted: HashMap<String, &FileDescriptor> = files
            .iter()
            .map(|d| (Self::entry_name(module, d), *d))
            .collect();

        let mut found: HashMap<String, Vec<u8>> = HashMap::with_capacity(wanted.len());
        let file = File::open(&self.path).map_err(|e| CacheError::io(&self.path, e))?;
        let mut archive = tar::Archive::new(GzDecoder::new(file));
        let entries = archive.entries().map_err(|e| CacheError::io(&self.path, e))?;
        for entry in entries {
            let mut entry = entry.map_err(|e| CacheError::io(&self.path, e))?;
            let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
            if !wanted.contains_key(&name) || found.contains_key(&name) {
                continue;
            }
            let mut data = Vec::new();
            entry
                .read_to_end(&mut data)
                .map_err(|e| CacheError::io(&self.path, e))?;
            found.insert(name, data);
        }

        for (name, descriptor) in &wanted {
            let data = found.get(name).ok_or_else(|| CacheError::ArchiveIncomplete {
                module: module.clone(),
                entry: name.clone(),
            })?;
            if let Some(recorded) = descriptor.checksum {
                if ContentHash::from_bytes(data) != recorded {
                    return Err(CacheError::ArchiveIncomplete {
                        module: module.clone(),
                        entry: name.clone(),
                    });
                }
            }
        }

        let mut written = 0;
        for (name, descriptor) in &wanted {
            let Some(data) = found.get(name) else {
                continue;
            };
            let target = descriptor.resolve(&self.root);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;
            }
            std::fs::write(&target, data).map_err(|e| CacheError::io(&target, e))?;
            filetime::set_file_mtime(&target, millis_to_filetime(descriptor.last_modified))
                .map_err(|e| CacheError::io(&target, e))?;
            tracing::debug!("{module}: restored {}", descriptor.path);
            written += 1;
        }
        Ok(written)
    }

    /// Names of all entries in the archive, in archive order.
    pub fn entries(&self) -> Result<Vec<String>, CacheError> {
        let file = File::open(&self.path).map_err(|e| CacheError::io(&self.path, e))?;
        let mut archive = tar::Archive::new(GzDecoder::new(file));
        let mut names = Vec::new();
        let mut seen = HashSet::new();
        for entry in archive.entries().map_err(|e| CacheError::io(&self.path, e))? {
            let entry = entry.map_err(|e| CacheError::io(&self.path, e))?;
            let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
            if seen.insert(name.clone()) {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Deletes the archive. Returns `true` if one existed.
    pub fn remove(&self) -> Result<bool, CacheError> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::io(&self.path, e)),
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
