//! Positioned-read abstraction over store bytes.
//!
//! A reader only ever issues absolute-offset reads (footer, block index,
//! whole blocks), so the one seam it needs is `read_at`. Files and
//! memory-mapped regions both support concurrent positioned reads, which is
//! what lets a `Reader` be shared across threads.

use std::fs::File;
use std::io;

/// A source of bytes addressable by absolute offset.
pub trait ReadAt {
    /// Fill `buf` with the bytes at `offset`, failing with `UnexpectedEof`
    /// if the source is too short.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()>;
}

impl ReadAt for [u8] {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        let start = usize::try_from(offset)
            .map_err(|_| io::Error::from(io::ErrorKind::UnexpectedEof))?;
        let end = start
            .checked_add(buf.len())
            .filter(|&end| end <= self.len())
            .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))?;
        buf.copy_from_slice(&self[start..end]);
        Ok(())
    }
}

impl ReadAt for Vec<u8> {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        self.as_slice().read_at(buf, offset)
    }
}

impl ReadAt for File {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        use std::os::unix::fs::FileExt;
        self.read_exact_at(buf, offset)
    }
}

impl ReadAt for memmap2::Mmap {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        self[..].read_at(buf, offset)
    }
}

impl<T: ReadAt + ?Sized> ReadAt for &T {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        (**self).read_at(buf, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn slice_reads() {
        let data: &[u8] = &[1, 2, 3, 4, 5];
        let mut buf = [0u8; 3];
        data.read_at(&mut buf, 1).unwrap();
        assert_eq!(buf, [2, 3, 4]);

        data.read_at(&mut buf, 2).unwrap();
        assert_eq!(buf, [3, 4, 5]);

        let err = data.read_at(&mut buf, 3).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        let err = data.read_at(&mut buf, u64::MAX).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn file_and_mmap_reads() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"positioned").unwrap();
        tmp.flush().unwrap();

        let file = tmp.reopen().unwrap();
        let mut buf = [0u8; 6];
        file.read_at(&mut buf, 2).unwrap();
        assert_eq!(&buf, b"sition");

        let mmap = unsafe { memmap2::Mmap::map(&file).unwrap() };
        mmap.read_at(&mut buf, 4).unwrap();
        assert_eq!(&buf, b"tioned");
        assert!(mmap.read_at(&mut buf, 5).is_err());
    }
}
