//! Batch-scoped scratch resources and atomic file replacement.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use tempfile::NamedTempFile;

const INITIAL_BUFFER_LEN: usize = 16 * 1024;

/// Scratch state owned by one batch run: the entry buffer reused by every
/// archive entry and the scratch file every archive is restreamed into.
///
/// The scratch file is created on first use and removed when this value is
/// dropped, on success and failure alike.
pub struct Scratch {
    file: Option<File>,
    buf: Vec<u8>,
}

impl Scratch {
    pub fn new() -> Self {
        Self {
            file: None,
            buf: Vec::with_capacity(INITIAL_BUFFER_LEN),
        }
    }

    /// Empties the scratch file and the entry buffer for the next archive.
    pub fn reset(&mut self) -> io::Result<(&mut File, &mut Vec<u8>)> {
        let file = match self.file.take() {
            Some(file) => file,
            None => tempfile::tempfile()?,
        };
        let file = self.file.insert(file);
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        self.buf.clear();
        Ok((file, &mut self.buf))
    }
}

impl Default for Scratch {
    fn default() -> Self {
        Self::new()
    }
}

/// Replaces `target` with the bytes of `content`.
///
/// The bytes go to a sibling temporary file that is renamed over `target`
/// once complete, so `target` is either the old file or the new one. The
/// original permissions are carried over.
pub fn replace_atomically<R: Read>(target: &Path, content: &mut R) -> io::Result<u64> {
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let permissions = fs::metadata(target).ok().map(|m| m.permissions());

    let mut tmp = NamedTempFile::new_in(dir)?;
    let written = io::copy(content, tmp.as_file_mut())?;
    tmp.as_file_mut().flush()?;
    tmp.as_file().sync_all()?;
    if let Some(permissions) = permissions {
        fs::set_permissions(tmp.path(), permissions)?;
    }
    tmp.persist(target).map_err(|err| err.error)?;
    Ok(written)
}
