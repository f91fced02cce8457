//! Positional file primitives shared by the header, WAL, and store layers.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::Result;

/// Reads up to `buf.len()` bytes at `offset`, returning the byte count.
pub fn read_at(file: &mut File, offset: u64, buf: &mut [u8]) -> Result<usize> {
    file.seek(SeekFrom::Start(offset))?;
    let mut total = 0;
    while total < buf.len() {
        match file.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(total)
}

/// Reads exactly `buf.len()` bytes at `offset`.
pub fn read_exact_at(file: &mut File, offset: u64, buf: &mut [u8]) -> Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(buf)?;
    Ok(())
}

/// Writes all of `bytes` at `offset`, extending the file as needed.
pub fn write_all_at(file: &mut File, offset: u64, bytes: &[u8]) -> Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(bytes)?;
    Ok(())
}

/// Commits file data and metadata to stable storage.
pub fn sync(file: &File) -> Result<()> {
    file.sync_all()?;
    Ok(())
}

/// Truncates (or extends with zeros) the file to `len` bytes.
pub fn truncate(file: &File, len: u64) -> Result<()> {
    file.set_len(len)?;
    Ok(())
}

/// Current file length in bytes.
pub fn file_len(file: &File) -> Result<u64> {
    Ok(file.metadata()?.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempfile;

    #[test]
    fn write_extends_and_read_exact_roundtrips() {
        let mut file = tempfile().expect("tempfile");
        write_all_at(&mut file, 100, b"payload").unwrap();
        assert_eq!(file_len(&file).unwrap(), 107);

        let mut buf = [0u8; 7];
        read_exact_at(&mut file, 100, &mut buf).unwrap();
        assert_eq!(&buf, b"payload");

        // The gap before the write reads back as zeros.
        let mut gap = [0xFFu8; 4];
        read_exact_at(&mut file, 0, &mut gap).unwrap();
        assert_eq!(gap, [0u8; 4]);
    }

    #[test]
    fn short_read_reports_partial_count() {
        let mut file = tempfile().expect("tempfile");
        write_all_at(&mut file, 0, b"abc").unwrap();

        let mut buf = [0u8; 8];
        let read = read_at(&mut file, 1, &mut buf).unwrap();
        assert_eq!(read, 2);
        assert_eq!(&buf[..2], b"bc");

        let err = read_exact_at(&mut file, 1, &mut buf).expect_err("short file");
        assert!(matches!(err, crate::StoreError::Io { .. }));
    }
}
