//! Classification of input paths and the batch driver that patches them.

use std::fs::File;
use std::io::{Cursor, Seek};
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use memmap2::Mmap;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::archive::{CLASS_SUFFIX, restream};
use crate::error::{PatchError, PatchResult};
use crate::header::patch_class;
use crate::scratch::{Scratch, replace_atomically};
use crate::version::VersionPair;

pub const ARCHIVE_SUFFIXES: [&str; 2] = [".zip", ".jar"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PathKind {
    Class,
    Directory,
    Archive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathEntry {
    pub path: PathBuf,
    pub kind: PathKind,
}

impl PathEntry {
    /// Classifies `path` by file system type and file name. Anything that is
    /// not a directory, a `.class` file or a `.zip`/`.jar` file is invalid.
    pub fn classify(path: &Path) -> PatchResult<Self> {
        let kind =
            classify_kind(path).ok_or_else(|| PatchError::InvalidPath(path.to_path_buf()))?;
        Ok(Self {
            path: path.to_path_buf(),
            kind,
        })
    }
}

fn classify_kind(path: &Path) -> Option<PathKind> {
    let meta = std::fs::metadata(path).ok()?;
    if meta.is_dir() {
        return Some(PathKind::Directory);
    }
    if !meta.is_file() {
        return None;
    }
    file_kind(path)
}

fn file_kind(path: &Path) -> Option<PathKind> {
    // Suffixes are ASCII, so matching works for names in any encoding.
    let name = path.file_name()?.as_encoded_bytes();
    if name.ends_with(CLASS_SUFFIX.as_bytes()) {
        Some(PathKind::Class)
    } else if ARCHIVE_SUFFIXES
        .iter()
        .any(|suffix| name.ends_with(suffix.as_bytes()))
    {
        Some(PathKind::Archive)
    } else {
        None
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PathOutcome {
    pub path: String,
    pub kind: PathKind,
    pub class_files: usize,
    pub changed: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub paths: Vec<PathOutcome>,
}

impl BatchReport {
    pub fn class_files(&self) -> usize {
        self.paths.iter().map(|p| p.class_files).sum()
    }

    pub fn changed(&self) -> usize {
        self.paths.iter().map(|p| p.changed).sum()
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Counts {
    class_files: usize,
    changed: usize,
}

impl Counts {
    fn add(&mut self, other: Counts) {
        self.class_files += other.class_files;
        self.changed += other.changed;
    }
}

/// Patches paths in order with one version rule and one set of scratch
/// resources. Dropping the patcher releases the scratch file.
pub struct Patcher<F> {
    rule: F,
    allow_directories: bool,
    scratch: Scratch,
}

impl<F> Patcher<F>
where
    F: Fn(VersionPair) -> VersionPair,
{
    pub fn new(rule: F, allow_directories: bool) -> Self {
        Self {
            rule,
            allow_directories,
            scratch: Scratch::new(),
        }
    }

    /// Classifies every path up front. Nothing is written if any path is
    /// invalid or is a directory while directories are not allowed.
    pub fn validate(&self, paths: &[PathBuf]) -> PatchResult<Vec<PathEntry>> {
        let mut entries = Vec::with_capacity(paths.len());
        for path in paths {
            let entry = PathEntry::classify(path)?;
            if entry.kind == PathKind::Directory && !self.allow_directories {
                return Err(PatchError::RejectedDirectory(entry.path));
            }
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Patches `entries` in order and stops at the first failure. Paths
    /// replaced before the failure stay replaced.
    pub fn patch_all(&mut self, entries: &[PathEntry]) -> PatchResult<BatchReport> {
        let mut report = BatchReport::default();
        for entry in entries {
            let counts = self.patch_entry(entry)?;
            report.paths.push(PathOutcome {
                path: entry.path.to_string_lossy().to_string(),
                kind: entry.kind,
                class_files: counts.class_files,
                changed: counts.changed,
            });
        }
        Ok(report)
    }

    fn patch_entry(&mut self, entry: &PathEntry) -> PatchResult<Counts> {
        match entry.kind {
            PathKind::Class => self.patch_class_file(&entry.path),
            PathKind::Archive => self.patch_archive(&entry.path),
            PathKind::Directory => self.patch_directory(&entry.path),
        }
    }

    fn patch_class_file(&self, path: &Path) -> PatchResult<Counts> {
        self.rewrite_class_file(path).map_err(|err| err.at(path))
    }

    fn rewrite_class_file(&self, path: &Path) -> PatchResult<Counts> {
        let bytes = std::fs::read(path)?;
        let mut patched = patch_class(&bytes[..], &self.rule)?;
        let changed = patched.is_changed();
        if changed {
            replace_atomically(path, &mut patched)?;
            info!(path = %path.display(), from = %patched.original, to = %patched.patched, "patched class file");
        } else {
            debug!(path = %path.display(), version = %patched.original, "class file left unchanged");
        }
        Ok(Counts {
            class_files: 1,
            changed: usize::from(changed),
        })
    }

    fn patch_archive(&mut self, path: &Path) -> PatchResult<Counts> {
        self.rewrite_archive(path).map_err(|err| err.at(path))
    }

    fn rewrite_archive(&mut self, path: &Path) -> PatchResult<Counts> {
        let (sink, buf) = self.scratch.reset()?;
        let report = {
            let file = File::open(path)?;
            // SAFETY: The file is opened read-only and the map is dropped
            // before the path is replaced.
            let mmap = unsafe { Mmap::map(&file) }?;
            let (_, report) = restream(Cursor::new(&mmap[..]), &mut *sink, &self.rule, buf)?;
            report
        };

        sink.rewind()?;
        replace_atomically(path, sink)?;
        info!(
            path = %path.display(),
            entries = report.entries.len(),
            class_files = report.class_files(),
            changed = report.changed_class_files(),
            "patched archive"
        );
        Ok(Counts {
            class_files: report.class_files(),
            changed: report.changed_class_files(),
        })
    }

    /// Walks `dir` and patches every class file and archive below it.
    fn patch_directory(&mut self, dir: &Path) -> PatchResult<Counts> {
        let walker = WalkBuilder::new(dir)
            .standard_filters(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();

        let mut counts = Counts::default();
        for entry in walker {
            let entry = entry.map_err(|err| PatchError::from(err).at(dir))?;
            match entry.file_type() {
                Some(t) if t.is_file() => {}
                Some(t) if t.is_dir() => continue,
                _ => {
                    warn!(path = %entry.path().display(), "skipping entry that is not a regular file");
                    continue;
                }
            }
            let path = entry.path();
            match file_kind(path) {
                Some(PathKind::Class) => counts.add(self.patch_class_file(path)?),
                Some(PathKind::Archive) => counts.add(self.patch_archive(path)?),
                _ => warn!(path = %path.display(), "skipping file that is not a class or an archive"),
            }
        }
        Ok(counts)
    }
}
