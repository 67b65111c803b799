//! Entry-by-entry copy of a zip/jar with class-file prologues rewritten.
//!
//! Entries are visited in stored order. Directories are copied as records only,
//! `.class` entries go through [`patch_class`] and everything else is passed
//! through untouched. Extra fields (such as the `0xCAFE` executable-jar
//! marker) are carried over. Every file entry is written with a freshly computed CRC-32
//! and size: the writer is never told the old compressed size, it measures the
//! new one while writing.

use std::io::{Read, Seek, SeekFrom, Write};

use serde::Serialize;
use tracing::debug;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{PatchError, PatchResult};
use crate::header::patch_class;
use crate::version::VersionPair;

pub const CLASS_SUFFIX: &str = ".class";

const ZIP64_EXTRA_ID: u16 = 0x0001;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassVersionChange {
    pub from: VersionPair,
    pub to: VersionPair,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveEntryRecord {
    pub name: String,
    pub is_dir: bool,
    pub source_crc32: u32,
    pub crc32: u32,
    pub size: u64,
    /// Unknown until the entry has been written.
    pub compressed_size: Option<u64>,
    pub class_version: Option<ClassVersionChange>,
}

impl ArchiveEntryRecord {
    pub fn is_class(&self) -> bool {
        self.class_version.is_some()
    }

    pub fn is_changed(&self) -> bool {
        self.class_version
            .as_ref()
            .is_some_and(|change| change.from != change.to)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RestreamReport {
    pub entries: Vec<ArchiveEntryRecord>,
}

impl RestreamReport {
    pub fn class_files(&self) -> usize {
        self.entries.iter().filter(|e| e.is_class()).count()
    }

    pub fn changed_class_files(&self) -> usize {
        self.entries.iter().filter(|e| e.is_changed()).count()
    }
}

/// Copies every entry of `source` into `sink`, rewriting class-file versions
/// with `rule`. `buf` holds one entry's content at a time and is reused across
/// entries (and across calls) so it only ever grows to the largest entry seen.
pub fn restream<R, W, F>(
    source: R,
    sink: W,
    rule: &F,
    buf: &mut Vec<u8>,
) -> PatchResult<(W, RestreamReport)>
where
    R: Read + Seek,
    W: Read + Write + Seek,
    F: Fn(VersionPair) -> VersionPair + ?Sized,
{
    let mut archive = ZipArchive::new(source)?;
    let mut writer = ZipWriter::new(sink);
    let mut report = RestreamReport::default();

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let name = entry.name().to_string();
        let mut options = FileOptions::default()
            .compression_method(writable_method(entry.compression()))
            .last_modified_time(entry.last_modified());
        if let Some(mode) = entry.unix_mode() {
            options = options.unix_permissions(mode);
        }

        let extra = carried_extra_fields(&name, entry.extra_data());

        if entry.is_dir() {
            start_entry(&mut writer, &name, options, &extra, true)?;
            debug!(entry = %name, "copied directory entry");
            report.entries.push(ArchiveEntryRecord {
                name,
                is_dir: true,
                source_crc32: entry.crc32(),
                crc32: 0,
                size: 0,
                compressed_size: Some(0),
                class_version: None,
            });
            continue;
        }

        let source_crc32 = entry.crc32();
        buf.clear();
        let class_version = if name.ends_with(CLASS_SUFFIX) {
            let mut patched = patch_class(&mut entry, rule).map_err(|err| err.in_entry(&name))?;
            patched
                .read_to_end(buf)
                .map_err(|err| PatchError::from(err).in_entry(&name))?;
            Some(ClassVersionChange {
                from: patched.original,
                to: patched.patched,
            })
        } else {
            entry
                .read_to_end(buf)
                .map_err(|err| PatchError::from(err).in_entry(&name))?;
            None
        };
        drop(entry);

        let record = ArchiveEntryRecord {
            name,
            is_dir: false,
            source_crc32,
            crc32: crc32fast::hash(buf),
            size: buf.len() as u64,
            compressed_size: None,
            class_version,
        };

        let options = options.large_file(record.size >= u64::from(u32::MAX));
        start_entry(&mut writer, &record.name, options, &extra, false)?;
        writer.write_all(buf)?;

        match &record.class_version {
            Some(change) if change.from != change.to => {
                debug!(entry = %record.name, from = %change.from, to = %change.to, "rewrote class version")
            }
            _ => debug!(entry = %record.name, size = record.size, "copied entry"),
        }
        report.entries.push(record);
    }

    let mut sink = writer.finish()?;
    record_written_sizes(&mut sink, &mut report)?;
    Ok((sink, report))
}

/// Starts `name` in `writer`, carrying `extra` into both the local and the
/// central header when it is non-empty.
fn start_entry<W: Write + Seek>(
    writer: &mut ZipWriter<W>,
    name: &str,
    options: FileOptions,
    extra: &[u8],
    is_dir: bool,
) -> PatchResult<()> {
    if extra.is_empty() {
        if is_dir {
            writer.add_directory(name, options)?;
        } else {
            writer.start_file(name, options)?;
        }
        return Ok(());
    }

    // The writer has no directory variant taking extra data; the trailing
    // slash keeps such entries directories, the unix mode becomes regular.
    let options = if is_dir {
        options.compression_method(CompressionMethod::Stored)
    } else {
        options
    };
    writer.start_file_with_extra_data(name, options)?;
    writer.write_all(extra)?;
    writer.end_extra_data()?;
    Ok(())
}

/// Extra field records to copy from a source entry. Zip64 records are left
/// out since the writer emits its own; a malformed field is dropped whole.
fn carried_extra_fields(name: &str, extra: &[u8]) -> Vec<u8> {
    let mut kept = Vec::with_capacity(extra.len());
    let mut rest = extra;
    while !rest.is_empty() {
        let record = rest.get(..4).and_then(|header| {
            let size = usize::from(u16::from_le_bytes([header[2], header[3]]));
            rest.get(..4 + size)
        });
        let Some(record) = record else {
            debug!(entry = %name, len = extra.len(), "dropping malformed extra field");
            return Vec::new();
        };
        if u16::from_le_bytes([record[0], record[1]]) != ZIP64_EXTRA_ID {
            kept.extend_from_slice(record);
        }
        rest = &rest[record.len()..];
    }
    kept
}

fn writable_method(method: CompressionMethod) -> CompressionMethod {
    match method {
        CompressionMethod::Stored => CompressionMethod::Stored,
        _ => CompressionMethod::Deflated,
    }
}

/// Reads the central directory back from the finished sink to learn the
/// compressed sizes the writer settled on.
fn record_written_sizes<W: Read + Seek>(
    sink: &mut W,
    report: &mut RestreamReport,
) -> PatchResult<()> {
    sink.rewind()?;
    let mut written = ZipArchive::new(&mut *sink)?;
    if written.len() != report.entries.len() {
        return Err(PatchError::Zip(zip::result::ZipError::InvalidArchive(
            "restreamed archive entry count differs from source",
        )));
    }
    for (index, record) in report.entries.iter_mut().enumerate() {
        let entry = written.by_index(index)?;
        if entry.crc32() != record.crc32 {
            return Err(PatchError::from(zip::result::ZipError::InvalidArchive(
                "restreamed entry checksum mismatch",
            ))
            .in_entry(&record.name));
        }
        if !record.is_dir {
            record.compressed_size = Some(entry.compressed_size());
        }
    }
    drop(written);
    sink.seek(SeekFrom::End(0))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::class_bytes;
    use crate::version::{identity, remap_major};
    use std::io::Cursor;

    fn write_archive(entries: &[(&str, Option<&[u8]>)], method: CompressionMethod) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(method);
        for (name, content) in entries {
            match content {
                Some(content) => {
                    zip.start_file(*name, options).unwrap();
                    zip.write_all(content).unwrap();
                }
                None => zip.add_directory(*name, options).unwrap(),
            }
        }
        zip.finish().unwrap().into_inner()
    }

    fn read_archive(bytes: &[u8]) -> Vec<(String, u32, Vec<u8>)> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        (0..archive.len())
            .map(|i| {
                let mut file = archive.by_index(i).unwrap();
                let mut content = Vec::new();
                file.read_to_end(&mut content).unwrap();
                (file.name().to_string(), file.crc32(), content)
            })
            .collect()
    }

    fn run(
        input: &[u8],
        rule: &dyn Fn(VersionPair) -> VersionPair,
    ) -> PatchResult<(Vec<u8>, RestreamReport)> {
        let mut buf = Vec::new();
        let (sink, report) = restream(Cursor::new(input), Cursor::new(Vec::new()), rule, &mut buf)?;
        Ok((sink.into_inner(), report))
    }

    #[test]
    fn identity_restream_keeps_names_order_and_content() -> PatchResult<()> {
        let a = class_bytes(52, 0, b"class body a");
        let input = write_archive(
            &[
                ("META-INF/", None),
                ("META-INF/MANIFEST.MF", Some(&b"Manifest-Version: 1.0\n"[..])),
                ("org/example/A.class", Some(&a[..])),
                ("org/example/data.bin", Some(&[0u8, 1, 2, 3][..])),
            ],
            CompressionMethod::Deflated,
        );

        let (output, report) = run(&input, &identity())?;
        assert_eq!(read_archive(&output), read_archive(&input));
        assert_eq!(report.entries.len(), 4);
        assert_eq!(report.class_files(), 1);
        assert_eq!(report.changed_class_files(), 0);
        for record in report.entries.iter().filter(|r| !r.is_dir) {
            assert_eq!(record.crc32, record.source_crc32, "{}", record.name);
            assert!(record.compressed_size.is_some());
        }
        Ok(())
    }

    fn stamp_of(modified: zip::DateTime) -> (u16, u8, u8, u8, u8, u8) {
        (
            modified.year(),
            modified.month(),
            modified.day(),
            modified.hour(),
            modified.minute(),
            modified.second(),
        )
    }

    #[test]
    fn entry_metadata_and_extra_fields_survive() -> PatchResult<()> {
        let stamp = zip::DateTime::from_date_and_time(2019, 4, 5, 6, 7, 8).unwrap();
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(stamp)
            .unix_permissions(0o750);
        let jar_marker: [u8; 4] = [0xFE, 0xCA, 0x00, 0x00];
        let mut marker_and_timestamp = jar_marker.to_vec();
        marker_and_timestamp.extend_from_slice(&[0x55, 0x54, 0x05, 0x00, 0x01]);
        marker_and_timestamp.extend_from_slice(&1_554_444_428u32.to_le_bytes());

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file_with_extra_data("META-INF/", options)?;
        zip.write_all(&jar_marker)?;
        zip.end_extra_data()?;
        zip.start_file_with_extra_data("app/Main.class", options)?;
        zip.write_all(&marker_and_timestamp)?;
        zip.end_extra_data()?;
        zip.write_all(&class_bytes(52, 0, b"main"))?;
        zip.start_file("app/plain.txt", options)?;
        zip.write_all(b"no extras")?;
        let input = zip.finish()?.into_inner();

        let (output, report) = run(&input, &remap_major(52, 61))?;
        assert!(report.entries[0].is_dir);
        assert!(report.entries[1].is_changed());

        let mut archive = ZipArchive::new(Cursor::new(&output[..]))?;
        let expected_extra: [&[u8]; 3] = [&jar_marker, &marker_and_timestamp, &[]];
        for (index, extra) in expected_extra.iter().enumerate() {
            let entry = archive.by_index(index)?;
            assert_eq!(entry.extra_data(), *extra, "{}", entry.name());
            assert_eq!(stamp_of(entry.last_modified()), (2019, 4, 5, 6, 7, 8));
            assert_eq!(entry.unix_mode().map(|mode| mode & 0o777), Some(0o750));
        }
        assert!(archive.by_index(0)?.is_dir());
        Ok(())
    }

    #[test]
    fn zip64_and_malformed_extra_fields_are_not_carried() {
        let mut extra = vec![0x01, 0x00, 0x08, 0x00];
        extra.extend_from_slice(&42u64.to_le_bytes());
        extra.extend_from_slice(&[0xFE, 0xCA, 0x00, 0x00]);
        assert_eq!(carried_extra_fields("A.class", &extra), vec![0xFE, 0xCA, 0x00, 0x00]);

        assert!(carried_extra_fields("A.class", &[0xFE, 0xCA, 0x05, 0x00, 0x01]).is_empty());
        assert!(carried_extra_fields("A.class", &[0xFE, 0xCA, 0x00]).is_empty());
        assert!(carried_extra_fields("A.class", &[]).is_empty());
    }

    #[test]
    fn only_class_entries_are_rewritten() -> PatchResult<()> {
        let a = class_bytes(52, 0, b"aaaa");
        let b = class_bytes(55, 0, b"bbbb");
        let not_a_class = class_bytes(52, 0, b"resource that looks like a class");
        let input = write_archive(
            &[
                ("pkg/", None),
                ("pkg/A.class", Some(&a[..])),
                ("pkg/B.class", Some(&b[..])),
                ("pkg/A.class.bak", Some(&not_a_class[..])),
            ],
            CompressionMethod::Stored,
        );

        let (output, report) = run(&input, &remap_major(52, 61))?;
        let entries = read_archive(&output);

        assert_eq!(entries[0].0, "pkg/");
        assert_eq!(entries[1].2, class_bytes(61, 0, b"aaaa"));
        assert_eq!(entries[2].2, b);
        assert_eq!(entries[3].2, not_a_class);

        assert!(report.entries[0].is_dir);
        assert!(report.entries[1].is_changed());
        assert_ne!(report.entries[1].crc32, report.entries[1].source_crc32);
        assert_eq!(report.entries[1].crc32, crc32fast::hash(&entries[1].2));
        assert_eq!(report.entries[1].crc32, entries[1].1);
        assert!(!report.entries[2].is_changed());
        assert_eq!(report.entries[2].crc32, report.entries[2].source_crc32);
        assert!(!report.entries[3].is_class());
        Ok(())
    }

    #[test]
    fn compression_method_is_kept() -> PatchResult<()> {
        let a = class_bytes(52, 0, &[7u8; 4096]);
        let input = write_archive(&[("A.class", Some(&a[..]))], CompressionMethod::Stored);
        let (output, _) = run(&input, &remap_major(52, 53))?;

        let mut archive = ZipArchive::new(Cursor::new(&output[..]))?;
        let entry = archive.by_index(0)?;
        assert_eq!(entry.compression(), CompressionMethod::Stored);
        assert_eq!(entry.compressed_size(), entry.size());
        Ok(())
    }

    #[test]
    fn bad_class_entry_fails_with_entry_name() {
        let input = write_archive(
            &[("ok.txt", Some(&b"fine"[..])), ("broken/X.class", Some(&b"not a class"[..]))],
            CompressionMethod::Deflated,
        );
        let err = run(&input, &identity()).unwrap_err();
        assert!(err.is_format_error());
        match err {
            PatchError::Entry { name, .. } => assert_eq!(name, "broken/X.class"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn buffer_is_reused_across_entries() -> PatchResult<()> {
        let big = vec![1u8; 64 * 1024];
        let input = write_archive(
            &[("big.bin", Some(&big[..])), ("small.bin", Some(&b"xy"[..]))],
            CompressionMethod::Deflated,
        );
        let mut buf = Vec::new();
        let (sink, report) = restream(
            Cursor::new(&input[..]),
            Cursor::new(Vec::new()),
            &identity(),
            &mut buf,
        )?;
        assert!(buf.capacity() >= big.len());
        assert_eq!(report.entries[1].size, 2);
        assert_eq!(read_archive(&sink.into_inner())[1].2, b"xy");
        Ok(())
    }

    #[test]
    fn empty_archive_restreams_to_empty_archive() -> PatchResult<()> {
        let input = write_archive(&[], CompressionMethod::Deflated);
        let (output, report) = run(&input, &identity())?;
        assert!(report.entries.is_empty());
        assert!(read_archive(&output).is_empty());
        Ok(())
    }

    #[test]
    fn non_archive_input_is_a_zip_error() {
        let err = run(b"definitely not a zip file", &identity()).unwrap_err();
        assert!(matches!(err, PatchError::Zip(_)));
    }
}
