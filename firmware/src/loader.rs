use std::io::{self, Read, Seek, SeekFrom};

use crate::probe::ProbeError;

/// Read into `buf` until it is full or the source hits end of file.
/// Returns the number of bytes read.
pub fn read_fully<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut done = 0;
    while done < buf.len() {
        match r.read(&mut buf[done..]) {
            Ok(0) => break,
            Ok(n) => done += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(done)
}

/// Read the whole source, `size` bytes from offset 0, into an owned
/// buffer. A short read is an error.
pub fn load_blob<R: Read + Seek>(
    r: &mut R,
    size: u64,
) -> Result<Vec<u8>, ProbeError> {
    let len = usize::try_from(size).map_err(|_| ProbeError::Alloc { size })?;
    let mut blob = Vec::new();
    blob.try_reserve_exact(len)
        .map_err(|_| ProbeError::Alloc { size })?;
    blob.resize(len, 0);

    r.seek(SeekFrom::Start(0))?;
    let got = read_fully(r, &mut blob)?;
    if got != len {
        return Err(ProbeError::ShortRead {
            expected: len,
            actual: got,
        });
    }
    Ok(blob)
}
