//! Binary layout constants and footer I/O.
//!
//! All fixed-width numeric fields are little-endian.
//!
//! Store layout:
//! ```text
//! +---------+-----+---------+-------------+------------------+
//! | block 1 | ... | block n | block index | footer (16 bytes)|
//! +---------+-----+---------+-------------+------------------+
//!
//! block index := (uvarint(max_cell_id delta), uvarint(offset delta))*
//!                ; the first pair is absolute, the rest delta-encoded
//! footer      := u64 LE index offset, 8 magic bytes
//! ```
//!
//! Block layout:
//! ```text
//! +-----------+-----+-----------+---------------+-------------------+
//! | section 1 | ... | section n | section index | marker (1 byte)   |
//! +-----------+-----+-----------+---------------+-------------------+
//!
//! section index := u32 LE offsets for sections 2..n, u32 LE section count
//!                  ; section 1 always starts at offset 0
//! marker        := 0x00 plain | 0x01 Snappy (applies to everything
//!                  before it, section index included)
//! ```
//!
//! Section layout:
//! ```text
//! entry := uvarint(cell_id delta) uvarint(value len) value bytes
//!          ; the first entry of a section stores its cell ID in full
//! ```

use crate::error::{Error, Result};

/// Magic bytes closing every store file.
pub const MAGIC: [u8; 8] = [0xa0, 0x44, 0x95, 0x97, 0x9a, 0x3c, 0x38, 0x9d];

/// Footer size in bytes (fixed).
pub const FOOTER_LEN: usize = 16;

/// Block marker: payload is stored as-is.
pub const BLOCK_PLAIN: u8 = 0x00;

/// Block marker: payload is Snappy-compressed.
pub const BLOCK_SNAPPY: u8 = 0x01;

/// One block index record: the largest cell ID stored in a block and the
/// block's starting byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockInfo {
    pub max_cell_id: u64,
    pub offset: u64,
}

/// 16-byte fixed footer.
#[derive(Debug, Clone, Copy)]
pub struct Footer {
    /// Byte offset of the block index, equal to the total size of all blocks.
    pub index_offset: u64,
}

impl Footer {
    /// Write the footer into the first 16 bytes of `buf`.
    pub fn write_to(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= FOOTER_LEN);
        buf[0..8].copy_from_slice(&self.index_offset.to_le_bytes());
        buf[8..16].copy_from_slice(&MAGIC);
    }

    /// Read the footer from the first 16 bytes of `buf`.
    pub fn read_from(buf: &[u8]) -> Result<Self> {
        if buf.len() < FOOTER_LEN {
            return Err(Error::Corrupt("store too short for footer"));
        }
        if buf[8..16] != MAGIC {
            return Err(Error::BadMagic);
        }
        let index_offset = u64::from_le_bytes(buf[0..8].try_into().unwrap());
        Ok(Self { index_offset })
    }
}

/// Read a little-endian u32 from the first 4 bytes of `buf`.
pub fn read_u32_le(buf: &[u8]) -> u32 {
    u32::from_le_bytes(buf[0..4].try_into().unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn footer_round_trip() {
        let footer = Footer { index_offset: 12_084 };
        let mut buf = [0u8; FOOTER_LEN];
        footer.write_to(&mut buf);

        let parsed = Footer::read_from(&buf).unwrap();
        assert_eq!(parsed.index_offset, 12_084);
        assert_eq!(&buf[8..], &MAGIC);
    }

    #[test]
    fn footer_bad_magic() {
        let mut buf = [0u8; FOOTER_LEN];
        Footer { index_offset: 0 }.write_to(&mut buf);
        buf[15] ^= 0xff;
        assert!(matches!(Footer::read_from(&buf), Err(Error::BadMagic)));
    }

    #[test]
    fn footer_too_short() {
        assert!(matches!(
            Footer::read_from(&[0u8; 8]),
            Err(Error::Corrupt(_))
        ));
    }
}
