use std::fs::File;
use std::io::{self, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::headers::{HeaderError, VolumeHeader};
use crate::loader::{load_blob, read_fully};
use crate::rom::RomSink;
use crate::scan::{find_sec_core, ScanError, SecImage};

/// Returned by [`probe_firmware`] when no usable entry point was found.
pub const EFI_INVALID_ENTRY_POINT: u32 = 0xffff_ffff;

/// ROM blob name used for the firmware image.
pub const DEFAULT_ROM_NAME: &str = "uefi";

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to open '{}': {source}", .path.display())]
    Open { path: PathBuf, source: io::Error },
    #[error("I/O: {0}")]
    Io(#[from] io::Error),
    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },
    #[error("failed to allocate {size} bytes")]
    Alloc { size: u64 },
    #[error(transparent)]
    Header(#[from] HeaderError),
    #[error(transparent)]
    Scan(#[from] ScanError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Name the blob is registered under in the ROM sink.
    pub rom_name: String,
    /// Guest address the whole file is loaded at.
    pub load_addr: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            rom_name: DEFAULT_ROM_NAME.to_string(),
            load_addr: 0,
        }
    }
}

impl ProbeConfig {
    pub fn with_rom_name(mut self, name: impl Into<String>) -> Self {
        self.rom_name = name.into();
        self
    }

    pub fn with_load_addr(mut self, addr: u64) -> Self {
        self.load_addr = addr;
        self
    }
}

/// Why a volume was left alone without being loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// First four signature bytes are not `_FVH`.
    BadSignature { found: u32 },
    /// The volume carries its own reset code.
    ResetVectorInUse,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Skipped(SkipReason),
    Loaded {
        volume: VolumeHeader,
        file_size: u64,
        sec: SecImage,
    },
}

impl ProbeOutcome {
    /// Collapse to the 32-bit entry point contract. Skipped volumes
    /// report 0.
    pub fn entry_point(&self) -> u32 {
        match self {
            Self::Skipped(_) => 0,
            Self::Loaded { sec, .. } => sec.entry_point(),
        }
    }
}

/// Probe the firmware image at `path`.
///
/// When the first volume is valid and has an empty reset vector the
/// whole file is handed to `sink` before the volume is walked, so the
/// sink receives it whether or not the SEC entry point is found.
pub fn probe(
    path: &Path,
    config: &ProbeConfig,
    sink: &mut dyn RomSink,
) -> Result<ProbeOutcome, ProbeError> {
    log::info!(target: "efi", "Open '{}'", path.display());

    let mut file = File::open(path).map_err(|source| ProbeError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let mut raw = [0u8; VolumeHeader::SIZE];
    let got = read_fully(&mut file, &mut raw)?;
    if got != raw.len() {
        return Err(ProbeError::ShortRead {
            expected: raw.len(),
            actual: got,
        });
    }
    let volume = VolumeHeader::from_bytes(&raw)?;

    if !volume.has_valid_signature() {
        log::error!(
            target: "efi",
            "Bad FV signature {:#x} != {:#x}",
            volume.signature,
            VolumeHeader::expected_signature()
        );
        return Ok(ProbeOutcome::Skipped(SkipReason::BadSignature {
            found: volume.signature,
        }));
    }
    if !volume.reset_vector_empty() {
        log::info!(target: "efi", "FV reset vector is not empty, will use it");
        return Ok(ProbeOutcome::Skipped(SkipReason::ResetVectorInUse));
    }

    // Only the first volume is walked, but the whole file is loaded so
    // that later volumes (PEI and beyond) are resident too.
    let file_size = file.seek(SeekFrom::End(0))?;
    let blob = load_blob(&mut file, file_size)?;
    if file_size != volume.volume_len {
        log::info!(
            target: "efi",
            "First FV size {}, file size {}",
            volume.volume_len,
            file_size
        );
    }

    sink.add_blob(&config.rom_name, &blob, config.load_addr);
    let sec = find_sec_core(&blob, &volume)?;
    log::info!(target: "efi", "SEC entry point {:#x}", sec.entry_point());

    Ok(ProbeOutcome::Loaded {
        volume,
        file_size,
        sec,
    })
}

/// Find the SEC entry point of the firmware image at `path`, loading the
/// image into `sink` on the way.
///
/// Returns the entry point offset, 0 when the volume was skipped (bad
/// signature or reset vector in use), or [`EFI_INVALID_ENTRY_POINT`] on
/// any failure. Neither 0 nor the sentinel is a usable jump target.
pub fn probe_firmware(path: &Path, sink: &mut dyn RomSink) -> u32 {
    probe_firmware_with(path, &ProbeConfig::default(), sink)
}

pub fn probe_firmware_with(
    path: &Path,
    config: &ProbeConfig,
    sink: &mut dyn RomSink,
) -> u32 {
    match probe(path, config, sink) {
        Ok(outcome) => outcome.entry_point(),
        Err(e) => {
            log::error!(target: "efi", "{e}");
            EFI_INVALID_ENTRY_POINT
        }
    }
}

/// Like [`probe_firmware`], for callers whose firmware path is optional.
pub fn probe_firmware_opt(path: Option<&Path>, sink: &mut dyn RomSink) -> u32 {
    match path {
        Some(path) => probe_firmware(path, sink),
        None => EFI_INVALID_ENTRY_POINT,
    }
}
