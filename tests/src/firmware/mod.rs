
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use tcg_firmware::{
    FileHeader, RomSink, SectionHeader, TeHeader, VolumeHeader,
    FV_FILETYPE_SECURITY_CORE, SECTION_TE,
};

pub const FV_FILETYPE_RAW: u8 = 0x01;
pub const FV_FILETYPE_PEI_CORE: u8 = 0x04;
pub const SECTION_PE32: u8 = 0x10;
pub const SECTION_RAW: u8 = 0x19;

/// Header length of a volume with a two-entry block map.
pub const FV_HEADER_LEN: u16 = 0x48;

static COUNTER: AtomicU32 = AtomicU32::new(0);

fn pad_to(buf: &mut Vec<u8>, align: usize, fill: u8) {
    while buf.len() % align != 0 {
        buf.push(fill);
    }
}

fn put_size(buf: &mut Vec<u8>, size: usize) {
    buf.extend_from_slice(&(size as u32).to_le_bytes()[..3]);
}

/// TE header bytes with the given signature and entry point.
pub fn te_header(sign: [u8; 2], entry: u32) -> Vec<u8> {
    let mut h = Vec::with_capacity(TeHeader::SIZE);
    h.extend_from_slice(&sign);
    h.extend_from_slice(&0x8664u16.to_le_bytes()); // machine
    h.push(4); // sections_num
    h.push(0x0b); // subsystem
    h.extend_from_slice(&0x0218u16.to_le_bytes()); // stripped_size
    h.extend_from_slice(&entry.to_le_bytes());
    h.extend_from_slice(&0x0260u32.to_le_bytes()); // code_base
    h.extend_from_slice(&0xfffc_0000u64.to_le_bytes()); // image_base
    h.extend_from_slice(&0x1000u32.to_le_bytes()); // data_dir.virt_addr
    h.extend_from_slice(&0x40u32.to_le_bytes()); // data_dir.size
    h
}

/// Section with a common header followed by `body`.
pub fn section(section_type: u8, body: &[u8]) -> Vec<u8> {
    let mut s = Vec::new();
    put_size(&mut s, SectionHeader::SIZE + body.len());
    s.push(section_type);
    s.extend_from_slice(body);
    s
}

/// TE section holding a minimal image with `entry` as entry point.
pub fn te_section(entry: u32) -> Vec<u8> {
    let mut body = te_header(*b"VZ", entry);
    body.extend_from_slice(&[0x90; 16]);
    section(SECTION_TE, &body)
}

/// FFS file of `file_type` whose payload is `sections`, each 4-byte
/// aligned relative to the file start.
pub fn ffs_file(file_type: u8, sections: &[Vec<u8>]) -> Vec<u8> {
    let mut payload = Vec::new();
    for s in sections {
        pad_to(&mut payload, 4, 0);
        payload.extend_from_slice(s);
    }
    raw_file(file_type, FileHeader::SIZE + payload.len(), &payload)
}

/// FFS file with an explicit size field.
pub fn raw_file(file_type: u8, size: usize, payload: &[u8]) -> Vec<u8> {
    let mut f = Vec::new();
    f.extend_from_slice(&[0x11; 16]); // name GUID
    f.extend_from_slice(&0xaa55u16.to_le_bytes()); // integrity
    f.push(file_type);
    f.push(0); // attributes
    put_size(&mut f, size);
    f.push(0xf8); // state
    f.extend_from_slice(payload);
    f
}

/// Synthetic firmware volume image.
pub struct FvBuilder {
    reset_vector: [u8; 16],
    signature: [u8; 4],
    header_len: u16,
    volume_len: Option<u64>,
    files: Vec<Vec<u8>>,
    trailer: Vec<u8>,
}

impl FvBuilder {
    pub fn new() -> Self {
        Self {
            reset_vector: [0; 16],
            signature: *b"_FVH",
            header_len: FV_HEADER_LEN,
            volume_len: None,
            files: Vec::new(),
            trailer: Vec::new(),
        }
    }

    pub fn reset_vector(mut self, rv: [u8; 16]) -> Self {
        self.reset_vector = rv;
        self
    }

    pub fn signature(mut self, sign: [u8; 4]) -> Self {
        self.signature = sign;
        self
    }

    pub fn header_len(mut self, len: u16) -> Self {
        self.header_len = len;
        self
    }

    /// Override the declared volume length (defaults to the image size
    /// without trailer).
    pub fn volume_len(mut self, len: u64) -> Self {
        self.volume_len = Some(len);
        self
    }

    pub fn file(mut self, file: Vec<u8>) -> Self {
        self.files.push(file);
        self
    }

    /// Bytes appended after the volume, e.g. further volumes.
    pub fn trailer(mut self, bytes: &[u8]) -> Self {
        self.trailer.extend_from_slice(bytes);
        self
    }

    /// Offset of file `idx` in the built image.
    pub fn file_offset(&self, idx: usize) -> usize {
        let mut off = self.header_len as usize;
        for (i, f) in self.files.iter().enumerate() {
            off = (off + 7) & !7;
            if i == idx {
                return off;
            }
            off += f.len();
        }
        panic!("no file {idx}");
    }

    pub fn build(&self) -> Vec<u8> {
        let mut img = Vec::new();
        img.extend_from_slice(&self.reset_vector);
        img.extend_from_slice(&[0x8c; 16]); // file system GUID
        img.extend_from_slice(&0u64.to_le_bytes()); // patched below
        img.extend_from_slice(&self.signature);
        img.extend_from_slice(&0x0004_feffu32.to_le_bytes()); // attributes
        img.extend_from_slice(&self.header_len.to_le_bytes());
        assert_eq!(img.len(), VolumeHeader::SIZE);
        img.resize((self.header_len as usize).max(img.len()), 0);

        for f in &self.files {
            pad_to(&mut img, 8, 0xff);
            img.extend_from_slice(f);
        }
        let len = self.volume_len.unwrap_or(img.len() as u64);
        img[32..40].copy_from_slice(&len.to_le_bytes());
        img.extend_from_slice(&self.trailer);
        img
    }
}

/// A volume with a raw file, a PEI core file and the SEC core file,
/// whose TE entry point is `entry`.
pub fn typical_volume(entry: u32) -> FvBuilder {
    FvBuilder::new()
        .file(ffs_file(FV_FILETYPE_RAW, &[section(SECTION_RAW, &[7; 13])]))
        .file(ffs_file(
            FV_FILETYPE_SECURITY_CORE,
            &[section(SECTION_RAW, &[1, 2, 3]), te_section(entry)],
        ))
        .file(ffs_file(FV_FILETYPE_PEI_CORE, &[te_section(0xdead)]))
}

/// ROM sink that keeps a copy of everything it is given.
#[derive(Default)]
pub struct RecordingSink {
    pub blobs: Vec<(String, Vec<u8>, u64)>,
}

impl RomSink for RecordingSink {
    fn add_blob(&mut self, name: &str, data: &[u8], addr: u64) {
        self.blobs.push((name.to_string(), data.to_vec(), addr));
    }
}

/// Simple temp file helper.
pub struct TempFile {
    path: PathBuf,
}

impl TempFile {
    pub fn with_contents(data: &[u8]) -> std::io::Result<Self> {
        let pid = std::process::id();
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir()
            .join(format!("tcg_test_fv_{pid}_{n}.fd"));
        let mut file = fs::File::create(&path)?;
        file.write_all(data)?;
        file.flush()?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
