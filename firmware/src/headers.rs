//! Fixed-layout PI firmware headers.
//!
//! Every header is decoded field by field from little-endian bytes; none
//! of these types is ever overlaid on the image buffer.

use std::fmt;

use thiserror::Error;

use crate::cursor::{ByteCursor, CursorError};

// Signatures
pub const FV_SIGNATURE: [u8; 4] = *b"_FVH";
pub const TE_SIGNATURE: [u8; 2] = *b"VZ";

// FFS file types
pub const FV_FILETYPE_SECURITY_CORE: u8 = 0x03;

// Section types
pub const SECTION_TE: u8 = 0x12;

pub const RESET_VECTOR_SIZE: usize = 16;

/// Mask applied to the packed 24-bit size fields of files and sections.
///
/// Only the low 12 bits survive. Firmware built with entries larger than
/// 4 KiB will be walked with truncated sizes.
pub const PACKED_SIZE_MASK: u32 = 0x0fff;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HeaderError {
    #[error("{what} header truncated: need {need} bytes, have {have}")]
    Truncated {
        what: &'static str,
        need: usize,
        have: usize,
    },
}

fn truncated(what: &'static str, need: usize, have: usize) -> HeaderError {
    HeaderError::Truncated { what, need, have }
}

/// Raw 24-bit value of a packed size field.
#[inline]
pub fn packed_size_raw(size: [u8; 3]) -> u32 {
    size[0] as u32 | (size[1] as u32) << 8 | (size[2] as u32) << 16
}

/// Decode a packed size field, keeping only [`PACKED_SIZE_MASK`] bits.
#[inline]
pub fn packed_size(size: [u8; 3]) -> u32 {
    packed_size_raw(size) & PACKED_SIZE_MASK
}

/// EFI_FIRMWARE_VOLUME_HEADER, up to and including `header_length`.
/// The checksum, revision and block map that follow are not decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeHeader {
    pub reset_vector: [u8; RESET_VECTOR_SIZE],
    pub guid: [u8; 16],
    /// Total volume length, including this header.
    pub volume_len: u64,
    pub signature: u32,
    pub attributes: u32,
    /// Offset of the first file entry.
    pub header_len: u16,
}

impl VolumeHeader {
    pub const SIZE: usize = 50;

    pub fn from_bytes(data: &[u8]) -> Result<Self, HeaderError> {
        if data.len() < Self::SIZE {
            return Err(truncated("volume", Self::SIZE, data.len()));
        }
        Self::read(&mut ByteCursor::new(data))
            .map_err(|_| truncated("volume", Self::SIZE, data.len()))
    }

    fn read(c: &mut ByteCursor<'_>) -> Result<Self, CursorError> {
        Ok(Self {
            reset_vector: c.read_array()?,
            guid: c.read_array()?,
            volume_len: c.read_u64()?,
            signature: c.read_u32()?,
            attributes: c.read_u32()?,
            header_len: c.read_u16()?,
        })
    }

    pub fn expected_signature() -> u32 {
        u32::from_le_bytes(FV_SIGNATURE)
    }

    pub fn has_valid_signature(&self) -> bool {
        self.signature == Self::expected_signature()
    }

    /// An all-zero reset vector means the volume has no reset code of
    /// its own and the SEC entry point must be located.
    pub fn reset_vector_empty(&self) -> bool {
        self.reset_vector.iter().all(|&b| b == 0)
    }
}

/// EFI_FFS_FILE_HEADER.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub guid: [u8; 16],
    pub integrity: u16,
    pub file_type: u8,
    pub attributes: u8,
    pub size: [u8; 3],
    pub state: u8,
}

impl FileHeader {
    pub const SIZE: usize = 24;

    pub fn from_bytes(data: &[u8]) -> Result<Self, HeaderError> {
        if data.len() < Self::SIZE {
            return Err(truncated("file", Self::SIZE, data.len()));
        }
        Self::read(&mut ByteCursor::new(data))
            .map_err(|_| truncated("file", Self::SIZE, data.len()))
    }

    fn read(c: &mut ByteCursor<'_>) -> Result<Self, CursorError> {
        Ok(Self {
            guid: c.read_array()?,
            integrity: c.read_u16()?,
            file_type: c.read_u8()?,
            attributes: c.read_u8()?,
            size: c.read_array()?,
            state: c.read_u8()?,
        })
    }

    /// Total file size including this header, masked.
    pub fn size(&self) -> u32 {
        packed_size(self.size)
    }
}

/// EFI_COMMON_SECTION_HEADER.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionHeader {
    pub size: [u8; 3],
    pub section_type: u8,
}

impl SectionHeader {
    pub const SIZE: usize = 4;

    pub fn from_bytes(data: &[u8]) -> Result<Self, HeaderError> {
        match data {
            [s0, s1, s2, ty, ..] => Ok(Self {
                size: [*s0, *s1, *s2],
                section_type: *ty,
            }),
            _ => Err(truncated("section", Self::SIZE, data.len())),
        }
    }

    /// Total section size including this header, masked.
    pub fn size(&self) -> u32 {
        packed_size(self.size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataDirectory {
    pub virt_addr: u32,
    pub size: u32,
}

/// EFI_TE_IMAGE_HEADER with its first data directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeHeader {
    pub signature: u16,
    pub machine: u16,
    pub sections_num: u8,
    pub subsystem: u8,
    pub stripped_size: u16,
    /// Entry point offset handed back to the caller.
    pub entry_point: u32,
    pub code_base: u32,
    pub image_base: u64,
    pub data_dir: DataDirectory,
}

impl TeHeader {
    pub const SIZE: usize = 32;

    pub fn from_bytes(data: &[u8]) -> Result<Self, HeaderError> {
        if data.len() < Self::SIZE {
            return Err(truncated("TE", Self::SIZE, data.len()));
        }
        Self::read(&mut ByteCursor::new(data))
            .map_err(|_| truncated("TE", Self::SIZE, data.len()))
    }

    fn read(c: &mut ByteCursor<'_>) -> Result<Self, CursorError> {
        Ok(Self {
            signature: c.read_u16()?,
            machine: c.read_u16()?,
            sections_num: c.read_u8()?,
            subsystem: c.read_u8()?,
            stripped_size: c.read_u16()?,
            entry_point: c.read_u32()?,
            code_base: c.read_u32()?,
            image_base: c.read_u64()?,
            data_dir: DataDirectory {
                virt_addr: c.read_u32()?,
                size: c.read_u32()?,
            },
        })
    }

    pub fn expected_signature() -> u16 {
        u16::from_le_bytes(TE_SIGNATURE)
    }

    pub fn has_valid_signature(&self) -> bool {
        self.signature == Self::expected_signature()
    }
}

impl fmt::Display for TeHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "TE header")?;
        writeln!(f, "---------------------+-------------")?;
        writeln!(f, "  machine            | {:#06x}", self.machine)?;
        writeln!(f, "  sections_num       | {:#04x}", self.sections_num)?;
        writeln!(f, "  subsystem          | {:#04x}", self.subsystem)?;
        writeln!(f, "  stripped_size      | {:#06x}", self.stripped_size)?;
        writeln!(f, "  entry_point        | {:#010x}", self.entry_point)?;
        writeln!(f, "  code_base          | {:#010x}", self.code_base)?;
        writeln!(f, "  image_base         | {:#x}", self.image_base)?;
        let dd = &self.data_dir;
        writeln!(f, "  data_dir.virt_addr | {:#010x}", dd.virt_addr)?;
        writeln!(f, "  data_dir.size      | {:#010x}", dd.size)?;
        write!(f, "---------------------+-------------")
    }
}
