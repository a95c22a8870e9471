//! UEFI PI firmware volume probing.
//!
//! Locates the SEC core entry point in a flat firmware image so the
//! guest can start executing firmware directly, and loads the image into
//! guest ROM.

pub mod cursor;
pub mod headers;
pub mod loader;
pub mod probe;
pub mod rom;
pub mod scan;

pub use cursor::{align_up, ByteCursor, CursorError};
pub use headers::{
    packed_size, DataDirectory, FileHeader, HeaderError, SectionHeader,
    TeHeader, VolumeHeader, FV_FILETYPE_SECURITY_CORE, SECTION_TE,
};
pub use probe::{
    probe, probe_firmware, probe_firmware_opt, probe_firmware_with,
    ProbeConfig, ProbeError, ProbeOutcome, SkipReason, DEFAULT_ROM_NAME,
    EFI_INVALID_ENTRY_POINT,
};
pub use rom::{GuestRom, RomBlob, RomSink, DEFAULT_ROM_SIZE};
pub use scan::{find_sec_core, find_te_section, ScanError, SecImage};
