//! Rewriting of the 8-byte class-file prologue.
//!
//! ```text
//! offset 0  u4 magic          0xCAFEBABE
//! offset 4  u2 minor_version
//! offset 6  u2 major_version
//! ```
//!
//! Only the prologue is read eagerly. Everything after it stays in the
//! wrapped reader and is pulled through on demand.

use std::io::{self, Chain, Cursor, Read};

use crate::error::{PatchError, PatchResult};
use crate::version::VersionPair;

pub const CLASS_MAGIC: u32 = 0xCAFE_BABE;
pub const PROLOGUE_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassFilePrologue {
    pub version: VersionPair,
}

impl ClassFilePrologue {
    pub fn read_from<R: Read>(reader: &mut R) -> PatchResult<Self> {
        let mut magic = [0u8; 4];
        read_header_bytes(reader, &mut magic)?;
        let found = u32::from_be_bytes(magic);
        if found != CLASS_MAGIC {
            return Err(PatchError::InvalidMagic { found });
        }

        let mut version = [0u8; 4];
        read_header_bytes(reader, &mut version)?;
        let minor = u16::from_be_bytes([version[0], version[1]]);
        let major = u16::from_be_bytes([version[2], version[3]]);
        Ok(Self {
            version: VersionPair::new(major, minor),
        })
    }

    pub fn to_bytes(self) -> [u8; PROLOGUE_LEN] {
        let mut out = [0u8; PROLOGUE_LEN];
        out[..4].copy_from_slice(&CLASS_MAGIC.to_be_bytes());
        out[4..6].copy_from_slice(&self.version.minor.to_be_bytes());
        out[6..].copy_from_slice(&self.version.major.to_be_bytes());
        out
    }
}

fn read_header_bytes<R: Read>(reader: &mut R, buf: &mut [u8]) -> PatchResult<()> {
    reader.read_exact(buf).map_err(|err| match err.kind() {
        io::ErrorKind::UnexpectedEof => PatchError::TruncatedHeader,
        _ => PatchError::Io(err),
    })
}

/// A class-file stream whose prologue has been rewritten.
#[derive(Debug)]
pub struct PatchedClass<R> {
    pub original: VersionPair,
    pub patched: VersionPair,
    reader: Chain<Cursor<[u8; PROLOGUE_LEN]>, R>,
}

impl<R> PatchedClass<R> {
    pub fn is_changed(&self) -> bool {
        self.original != self.patched
    }
}

impl<R: Read> Read for PatchedClass<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

/// Consumes the prologue of `reader`, applies `rule` and returns the rewritten
/// stream. Fails before producing any output if the magic does not match.
pub fn patch_class<R, F>(mut reader: R, rule: &F) -> PatchResult<PatchedClass<R>>
where
    R: Read,
    F: Fn(VersionPair) -> VersionPair + ?Sized,
{
    let prologue = ClassFilePrologue::read_from(&mut reader)?;
    let patched = rule(prologue.version);
    let header = ClassFilePrologue { version: patched }.to_bytes();

    Ok(PatchedClass {
        original: prologue.version,
        patched,
        reader: Cursor::new(header).chain(reader),
    })
}

#[cfg(test)]
pub(crate) fn class_bytes(major: u16, minor: u16, body: &[u8]) -> Vec<u8> {
    let mut out = ClassFilePrologue {
        version: VersionPair::new(major, minor),
    }
    .to_bytes()
    .to_vec();
    out.extend_from_slice(body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::{identity, remap_major};

    fn patch_all(input: &[u8], rule: &dyn Fn(VersionPair) -> VersionPair) -> PatchResult<Vec<u8>> {
        let mut patched = patch_class(input, rule)?;
        let mut out = Vec::new();
        patched.read_to_end(&mut out)?;
        Ok(out)
    }

    #[test]
    fn rewrites_major_and_keeps_body() -> PatchResult<()> {
        let body: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        let input = class_bytes(52, 0, &body);

        let out = patch_all(&input, &remap_major(52, 61))?;
        assert_eq!(&out[..4], &[0xCA, 0xFE, 0xBA, 0xBE]);
        assert_eq!(&out[4..6], &[0, 0]);
        assert_eq!(&out[6..8], &[0, 61]);
        assert_eq!(&out[8..], &body[..]);

        let reread = ClassFilePrologue::read_from(&mut &out[..])?;
        assert_eq!(reread.version, VersionPair::new(61, 0));
        Ok(())
    }

    #[test]
    fn minor_precedes_major_in_stream() -> PatchResult<()> {
        let input = [0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x03, 0x00, 0x2D];
        let prologue = ClassFilePrologue::read_from(&mut &input[..])?;
        assert_eq!(prologue.version, VersionPair::new(45, 3));
        assert_eq!(prologue.to_bytes(), input);
        Ok(())
    }

    #[test]
    fn rule_receives_original_version() -> PatchResult<()> {
        let input = class_bytes(55, 7, b"rest");
        let seen = std::cell::Cell::new(None);
        let rule = |v: VersionPair| {
            seen.set(Some(v));
            VersionPair::new(v.major + 1, 0)
        };
        let patched = patch_class(&input[..], &rule)?;
        assert_eq!(seen.get(), Some(VersionPair::new(55, 7)));
        assert_eq!(patched.original, VersionPair::new(55, 7));
        assert_eq!(patched.patched, VersionPair::new(56, 0));
        assert!(patched.is_changed());
        Ok(())
    }

    #[test]
    fn identity_is_byte_exact() -> PatchResult<()> {
        let input = class_bytes(61, 65535, b"\x00\x01\x02");
        let out = patch_all(&input, &identity())?;
        assert_eq!(out, input);
        Ok(())
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let input = b"PK\x03\x04\x00\x00\x00\x34rest";
        let err = patch_all(input, &identity()).unwrap_err();
        assert!(matches!(err, PatchError::InvalidMagic { found: 0x504B_0304 }));
        assert!(err.is_format_error());
    }

    #[test]
    fn short_streams_are_truncated_headers() {
        let err = patch_all(&[0xCA, 0xFE], &identity()).unwrap_err();
        assert!(matches!(err, PatchError::TruncatedHeader));

        let err = patch_all(&[0xCA, 0xFE, 0xBA, 0xBE, 0x00], &identity()).unwrap_err();
        assert!(matches!(err, PatchError::TruncatedHeader));
    }

    #[test]
    fn only_prologue_is_consumed_eagerly() -> PatchResult<()> {
        let input = class_bytes(52, 0, b"tail");
        let mut cursor = Cursor::new(input);
        let patched = patch_class(&mut cursor, &identity())?;
        drop(patched);
        assert_eq!(cursor.position(), PROLOGUE_LEN as u64);
        Ok(())
    }
}
