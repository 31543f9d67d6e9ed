//! Streaming store writer.

use std::io::{self, Write};

use s2::cellid::CellID;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::format::{BlockInfo, Footer, BLOCK_PLAIN, BLOCK_SNAPPY, FOOTER_LEN};
use crate::options::{Compression, Options};
use crate::varint;

/// Streams strictly-increasing `(cell ID, value)` pairs into a sink.
///
/// Entries accumulate in an in-memory block buffer; when appending an entry
/// would push the buffer past the target block size the block is finalised
/// (section index, optional Snappy, marker byte) and written out. `close`
/// flushes the last block and appends the block index and footer. Writers
/// are single-use: every call after `close` fails with [`Error::Closed`].
pub struct Writer<W> {
    sink: W,
    opts: Options,

    /// Current block payload.
    buf: Vec<u8>,
    /// Snappy scratch, reused across blocks.
    snappy_buf: Vec<u8>,
    encoder: snap::raw::Encoder,

    /// Section start offsets within the current block.
    section_offsets: Vec<u32>,
    /// Entries in the current block.
    block_entries: usize,
    /// Largest appended cell ID, which doubles as the delta anchor.
    max_cell_id: u64,

    /// Bytes written to the sink so far.
    offset: u64,
    pub(crate) index: Vec<BlockInfo>,
    closed: bool,
}

impl<W: Write> Writer<W> {
    /// Wrap `sink` with the given options.
    pub fn new(sink: W, opts: Options) -> Self {
        Self {
            sink,
            opts: opts.normalized(),
            buf: Vec::new(),
            snappy_buf: Vec::new(),
            encoder: snap::raw::Encoder::new(),
            section_offsets: Vec::new(),
            block_entries: 0,
            max_cell_id: 0,
            offset: 0,
            index: Vec::new(),
            closed: false,
        }
    }

    /// Append an entry. The cell ID must be valid and strictly greater than
    /// every previously appended one; values may be empty.
    pub fn append(&mut self, cell: CellID, value: &[u8]) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        if !cell.is_valid() {
            return Err(Error::InvalidCellId(cell.0));
        }
        if cell.0 <= self.max_cell_id {
            return Err(Error::OutOfOrder {
                got: cell.0,
                max: self.max_cell_id,
            });
        }

        if !self.buf.is_empty()
            && self.buf.len() + value.len() + 2 * varint::MAX_LEN > self.opts.block_size
        {
            self.flush_block()?;
        }

        if self.block_entries % self.opts.section_size == 0 {
            // New section: record its start and store the cell ID in full.
            self.section_offsets.push(self.buf.len() as u32);
            varint::append_uvarint(&mut self.buf, cell.0);
        } else {
            varint::append_uvarint(&mut self.buf, cell.0 - self.max_cell_id);
        }
        varint::append_uvarint(&mut self.buf, value.len() as u64);
        self.buf.extend_from_slice(value);

        self.block_entries += 1;
        self.max_cell_id = cell.0;
        Ok(())
    }

    /// Flush the final block and write the block index and footer.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        self.flush_block()?;

        let index_offset = self.offset;
        self.write_index()?;
        self.write_footer(index_offset)?;
        self.closed = true;

        debug!(
            blocks = self.index.len(),
            bytes = self.offset,
            "store written"
        );
        Ok(())
    }

    fn flush_block(&mut self) -> Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }

        // Section index: offsets for every section after the first, then the
        // section count.
        for &off in &self.section_offsets {
            if off > 0 {
                self.buf.extend_from_slice(&off.to_le_bytes());
            }
        }
        self.buf
            .extend_from_slice(&(self.section_offsets.len() as u32).to_le_bytes());

        self.index.push(BlockInfo {
            max_cell_id: self.max_cell_id,
            offset: self.offset,
        });

        let plain_len = self.buf.len();
        let compressed_len = match self.opts.compression {
            Compression::Snappy => {
                self.snappy_buf
                    .resize(snap::raw::max_compress_len(plain_len), 0);
                let n = self
                    .encoder
                    .compress(&self.buf, &mut self.snappy_buf)
                    .map_err(io::Error::other)?;
                // Keep the compressed form only when it saves more than a
                // quarter of the plain size.
                (n < plain_len - plain_len / 4).then_some(n)
            }
            Compression::None => None,
        };

        let stored_len = match compressed_len {
            Some(n) => {
                self.snappy_buf.truncate(n);
                self.snappy_buf.push(BLOCK_SNAPPY);
                self.sink.write_all(&self.snappy_buf)?;
                self.offset += self.snappy_buf.len() as u64;
                n + 1
            }
            None => {
                self.buf.push(BLOCK_PLAIN);
                self.sink.write_all(&self.buf)?;
                self.offset += self.buf.len() as u64;
                plain_len + 1
            }
        };
        trace!(
            entries = self.block_entries,
            sections = self.section_offsets.len(),
            plain = plain_len,
            stored = stored_len,
            "block flushed"
        );

        self.buf.clear();
        self.section_offsets.clear();
        self.block_entries = 0;
        Ok(())
    }

    fn write_index(&mut self) -> Result<()> {
        let mut buf = Vec::with_capacity(self.index.len() * 2 * varint::MAX_LEN);
        let mut prev = BlockInfo {
            max_cell_id: 0,
            offset: 0,
        };
        for info in &self.index {
            // Delta-encode against the previous record; the first record's
            // deltas equal its absolute values.
            varint::append_uvarint(&mut buf, info.max_cell_id - prev.max_cell_id);
            varint::append_uvarint(&mut buf, info.offset - prev.offset);
            prev = *info;
        }
        self.sink.write_all(&buf)?;
        self.offset += buf.len() as u64;
        Ok(())
    }

    fn write_footer(&mut self, index_offset: u64) -> Result<()> {
        let mut buf = [0u8; FOOTER_LEN];
        Footer { index_offset }.write_to(&mut buf);
        self.sink.write_all(&buf)?;
        self.offset += FOOTER_LEN as u64;
        Ok(())
    }
}
