//! File and section walks inside the first firmware volume.
//!
//! Both walks are first-match: the first SEC core file ends the file walk
//! and the first TE section ends the section walk, whatever their outcome.

use thiserror::Error;

use crate::cursor::{ByteCursor, CursorError};
use crate::headers::*;

/// FFS files are 8-byte aligned within a volume.
pub const FILE_ALIGN: usize = 8;

/// Sections are 4-byte aligned within a file.
pub const SECTION_ALIGN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error(transparent)]
    OutOfBounds(#[from] CursorError),
    #[error(transparent)]
    Header(#[from] HeaderError),
    #[error(
        "volume header length {header_len:#x} exceeds volume length \
         {volume_len:#x}"
    )]
    HeaderExceedsVolume { header_len: u16, volume_len: u64 },
    #[error("{what} at {offset:#x} has size 0")]
    ZeroSize { what: &'static str, offset: usize },
    #[error("no SEC core file in firmware volume")]
    NoSecurityCore,
    #[error("no TE section in SEC core file at {file_offset:#x}")]
    NoTeSection { file_offset: usize },
    #[error("bad TE signature {found:#x} at {offset:#x}")]
    BadTeSignature { offset: usize, found: u16 },
}

/// Location and header of the SEC core TE image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecImage {
    /// Offset of the SEC core file header within the image.
    pub file_offset: usize,
    /// Offset of the TE section header within the image.
    pub section_offset: usize,
    pub te: TeHeader,
}

impl SecImage {
    #[inline]
    pub fn entry_point(&self) -> u32 {
        self.te.entry_point
    }
}

/// Decode the masked size of a file or section. A zero size would stall
/// the walk; any other size advances it, even one shorter than the header.
fn entry_size(
    what: &'static str,
    offset: usize,
    size: [u8; 3],
) -> Result<usize, ScanError> {
    let raw = packed_size_raw(size);
    let masked = packed_size(size);
    if raw != masked {
        log::warn!(
            target: "efi",
            "{what} at {offset:#x}: size {raw:#x} truncated to {masked:#x}"
        );
    }
    if masked == 0 {
        return Err(ScanError::ZeroSize { what, offset });
    }
    Ok(masked as usize)
}

/// Walk the sections of the file whose header starts at `file_offset`
/// and decode the first TE section found.
///
/// The walk covers `[align4(header_end), header_end + file_size)`.
pub fn find_te_section(
    image: &[u8],
    file_offset: usize,
    file: &FileHeader,
) -> Result<SecImage, ScanError> {
    let header_end = file_offset.saturating_add(FileHeader::SIZE);
    let end = header_end.saturating_add(file.size() as usize);

    let mut c = ByteCursor::at(image, header_end);
    c.advance_to_alignment(SECTION_ALIGN);
    while c.position() < end {
        let offset = c.position();
        let sect = SectionHeader::from_bytes(c.peek(SectionHeader::SIZE)?)?;
        if sect.section_type != SECTION_TE {
            let size = entry_size("section", offset, sect.size)?;
            c.advance(size);
            c.advance_to_alignment(SECTION_ALIGN);
            continue;
        }

        c.advance(SectionHeader::SIZE);
        let te = TeHeader::from_bytes(c.peek(TeHeader::SIZE)?)?;
        if !te.has_valid_signature() {
            return Err(ScanError::BadTeSignature {
                offset: c.position(),
                found: te.signature,
            });
        }
        log::debug!(target: "efi", "TE section at {offset:#x}\n{te}");
        return Ok(SecImage {
            file_offset,
            section_offset: offset,
            te,
        });
    }

    Err(ScanError::NoTeSection { file_offset })
}

/// Walk the files of the volume described by `volume` and resolve the
/// TE image of the first SEC core file.
///
/// The walk starts at `align8(header_len)` and covers `volume_len` bytes
/// from `header_len`.
pub fn find_sec_core(
    image: &[u8],
    volume: &VolumeHeader,
) -> Result<SecImage, ScanError> {
    if volume.header_len as u64 > volume.volume_len {
        return Err(ScanError::HeaderExceedsVolume {
            header_len: volume.header_len,
            volume_len: volume.volume_len,
        });
    }
    let start = volume.header_len as usize;
    let len = usize::try_from(volume.volume_len).unwrap_or(usize::MAX);
    let end = start.saturating_add(len);

    let mut c = ByteCursor::at(image, start);
    c.advance_to_alignment(FILE_ALIGN);
    while c.position() < end {
        let offset = c.position();
        let file = FileHeader::from_bytes(c.peek(FileHeader::SIZE)?)?;
        if file.file_type == FV_FILETYPE_SECURITY_CORE {
            return find_te_section(image, offset, &file);
        }
        let size = entry_size("file", offset, file.size)?;
        c.advance(size);
        c.advance_to_alignment(FILE_ALIGN);
    }

    Err(ScanError::NoSecurityCore)
}
