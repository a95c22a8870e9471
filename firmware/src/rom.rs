use std::io;
use std::ptr;

/// Default guest ROM size: 16 MiB.
pub const DEFAULT_ROM_SIZE: usize = 16 * 1024 * 1024;

/// Destination for a loaded firmware blob.
///
/// The sink copies `data`; the caller keeps ownership of its buffer.
/// There is no failure path visible to the caller.
pub trait RomSink {
    fn add_blob(&mut self, name: &str, data: &[u8], addr: u64);
}

/// Record of a blob placed into a [`GuestRom`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomBlob {
    pub name: String,
    pub addr: u64,
    /// Bytes actually copied, after clipping to the region.
    pub len: usize,
}

/// mmap-backed guest ROM region.
///
/// Guest physical addresses are offsets from the start of the mapping.
pub struct GuestRom {
    base: *mut u8,
    size: usize,
    blobs: Vec<RomBlob>,
}

// SAFETY: GuestRom owns its mmap'd memory exclusively.
unsafe impl Send for GuestRom {}

impl GuestRom {
    /// Map a zero-filled ROM region of `size` bytes.
    pub fn new(size: usize) -> io::Result<Self> {
        if size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "empty ROM region",
            ));
        }
        // SAFETY: anonymous private mapping, no file backing.
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            base: ptr as *mut u8,
            size,
            blobs: Vec::new(),
        })
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Blobs added so far, in order.
    pub fn blobs(&self) -> &[RomBlob] {
        &self.blobs
    }

    /// Borrow `len` bytes at guest address `addr`, if mapped.
    pub fn read(&self, addr: u64, len: usize) -> Option<&[u8]> {
        let start = usize::try_from(addr).ok()?;
        let end = start.checked_add(len)?;
        if end > self.size {
            return None;
        }
        // SAFETY: [start, end) lies within the mapping, which lives as
        // long as self and is only written through &mut self.
        Some(unsafe { std::slice::from_raw_parts(self.base.add(start), len) })
    }
}

impl RomSink for GuestRom {
    fn add_blob(&mut self, name: &str, data: &[u8], addr: u64) {
        let start = usize::try_from(addr).unwrap_or(usize::MAX);
        let room = self.size.saturating_sub(start);
        let len = data.len().min(room);
        if len < data.len() {
            log::warn!(
                target: "efi",
                "ROM '{name}': {:#x} bytes at {addr:#x} clipped to {len:#x}",
                data.len()
            );
        }
        if len > 0 {
            // SAFETY: start + len <= size, source and mapping are disjoint.
            unsafe {
                ptr::copy_nonoverlapping(
                    data.as_ptr(),
                    self.base.add(start),
                    len,
                );
            }
        }
        self.blobs.push(RomBlob {
            name: name.to_string(),
            addr,
            len,
        });
    }
}

impl Drop for GuestRom {
    fn drop(&mut self) {
        if !self.base.is_null() {
            unsafe {
                libc::munmap(self.base as *mut libc::c_void, self.size);
            }
        }
    }
}
