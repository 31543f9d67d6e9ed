//! Store reader: footer and block-index parsing, block lookup and loading.

use s2::cellid::CellID;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::format::{BlockInfo, Footer, BLOCK_PLAIN, BLOCK_SNAPPY, FOOTER_LEN};
use crate::iter::Iter;
use crate::pool;
use crate::source::ReadAt;

/// Read-only handle on a finished store.
///
/// Opening parses the footer and keeps the whole block index in memory;
/// blocks are fetched on demand. A reader may be shared by concurrent
/// callers as long as the source supports concurrent positioned reads;
/// every caller owns its own iterators.
pub struct Reader<R> {
    source: R,
    pub(crate) index: Vec<BlockInfo>,
    index_offset: u64,
}

impl<R: ReadAt> Reader<R> {
    /// Open a store of `size` bytes backed by `source`.
    pub fn open(source: R, size: u64) -> Result<Self> {
        if size < FOOTER_LEN as u64 {
            return Err(Error::Corrupt("store too short for footer"));
        }
        let footer_offset = size - FOOTER_LEN as u64;
        let mut footer_buf = [0u8; FOOTER_LEN];
        source.read_at(&mut footer_buf, footer_offset)?;
        let footer = Footer::read_from(&footer_buf)?;
        if footer.index_offset > footer_offset {
            return Err(Error::Corrupt("block index offset beyond footer"));
        }

        let index = Self::read_index(&source, footer.index_offset, footer_offset)?;
        debug!(blocks = index.len(), bytes = size, "store opened");

        Ok(Self {
            source,
            index,
            index_offset: footer.index_offset,
        })
    }

    fn read_index(source: &R, index_offset: u64, footer_offset: u64) -> Result<Vec<BlockInfo>> {
        let index_len = (footer_offset - index_offset) as usize;
        if index_len == 0 {
            return Ok(Vec::new());
        }

        let mut raw = pool::fetch_buffer(index_len);
        if let Err(e) = source.read_at(&mut raw, index_offset) {
            pool::release_buffer(raw);
            return Err(e.into());
        }

        let parsed = Self::parse_index(&raw, index_offset);
        pool::release_buffer(raw);
        parsed
    }

    /// Reconstruct absolute `(max cell ID, offset)` records by prefix-summing
    /// the delta-encoded varint pairs.
    fn parse_index(raw: &[u8], index_offset: u64) -> Result<Vec<BlockInfo>> {
        let mut index = Vec::new();
        let mut max_cell_id = 0u64;
        let mut offset = 0u64;
        let mut pos = 0usize;
        while pos < raw.len() {
            let Some((cell_delta, n)) = crate::varint::uvarint(&raw[pos..]) else {
                return Err(Error::Corrupt("truncated block index entry"));
            };
            pos += n;
            let Some((offset_delta, n)) = crate::varint::uvarint(&raw[pos..]) else {
                return Err(Error::Corrupt("truncated block index entry"));
            };
            pos += n;

            if index.is_empty() {
                if offset_delta != 0 {
                    return Err(Error::Corrupt("first block offset is not zero"));
                }
            } else if cell_delta == 0 || offset_delta == 0 {
                return Err(Error::Corrupt("block index records do not increase"));
            }
            max_cell_id = max_cell_id
                .checked_add(cell_delta)
                .ok_or(Error::Corrupt("block index cell ID overflow"))?;
            offset = offset
                .checked_add(offset_delta)
                .ok_or(Error::Corrupt("block index offset overflow"))?;
            if offset >= index_offset {
                return Err(Error::Corrupt("block offset beyond block index"));
            }
            index.push(BlockInfo {
                max_cell_id,
                offset,
            });
        }
        Ok(index)
    }

    /// Number of stored blocks.
    pub fn num_blocks(&self) -> usize {
        self.index.len()
    }

    /// Return an iterator positioned at the start of the block covering
    /// `cell`, i.e. the first block whose largest cell ID is `>= cell`.
    ///
    /// An empty store, or a cell beyond every stored one, yields an empty
    /// iterator rather than an error.
    pub fn find_block(&self, cell: CellID) -> Result<Iter<'_, R>> {
        if !cell.is_valid() {
            return Err(Error::InvalidCellId(cell.0));
        }
        if self.index.is_empty() {
            return Ok(Iter::empty(self));
        }
        let pos = self.index.partition_point(|b| b.max_cell_id < cell.0);
        if pos == self.index.len() {
            return Ok(Iter::empty(self));
        }
        self.read_block(pos)
    }

    /// Index of the block covering `cell_id`, clamped to the last block.
    pub(crate) fn clamped_block(&self, cell_id: u64) -> usize {
        let pos = self.index.partition_point(|b| b.max_cell_id < cell_id);
        pos.min(self.index.len() - 1)
    }

    /// Byte range `[start, end)` of block `pos`.
    fn block_range(&self, pos: usize) -> (u64, u64) {
        let start = self.index[pos].offset;
        let end = if pos + 1 < self.index.len() {
            self.index[pos + 1].offset
        } else {
            self.index_offset
        };
        (start, end)
    }

    /// Materialise block `pos` into a fresh iterator.
    pub(crate) fn read_block(&self, pos: usize) -> Result<Iter<'_, R>> {
        let (start, end) = self.block_range(pos);
        if end <= start {
            return Err(Error::Corrupt("block byte range is empty"));
        }
        let raw_len = (end - start) as usize;
        let mut raw = pool::fetch_buffer(raw_len);
        if let Err(e) = self.source.read_at(&mut raw, start) {
            pool::release_buffer(raw);
            return Err(e.into());
        }

        let marker = raw[raw_len - 1];
        let payload = match marker {
            BLOCK_PLAIN => {
                raw.truncate(raw_len - 1);
                raw
            }
            BLOCK_SNAPPY => {
                let decoded = Self::decompress(&raw[..raw_len - 1]);
                pool::release_buffer(raw);
                decoded?
            }
            other => {
                pool::release_buffer(raw);
                return Err(Error::InvalidCompression(other));
            }
        };
        trace!(block = pos, bytes = payload.len(), "block loaded");
        Iter::new(self, pos, payload)
    }

    fn decompress(body: &[u8]) -> Result<Vec<u8>> {
        let len = snap::raw::decompress_len(body)
            .map_err(|_| Error::Corrupt("bad snappy block header"))?;
        let mut decoded = pool::fetch_buffer(len);
        match snap::raw::Decoder::new().decompress(body, &mut decoded) {
            Ok(n) => {
                decoded.truncate(n);
                Ok(decoded)
            }
            Err(_) => {
                pool::release_buffer(decoded);
                Err(Error::Corrupt("snappy block decompression failed"))
            }
        }
    }
}
