//! Block iterator: entry decoding, section seeks, block navigation.

use s2::cellid::CellID;

use crate::error::{Error, Result};
use crate::format;
use crate::pool;
use crate::reader::Reader;
use crate::source::ReadAt;
use crate::varint;

/// Cursor over the entries of one materialised block.
///
/// The iterator owns pooled buffers for exactly one block at a time;
/// navigating to an adjacent block releases the previous one. Values
/// returned by [`value`](Iter::value) borrow from the decode buffer and are
/// only live until the next state-changing call.
///
/// The first error hit while navigating blocks is latched: subsequent
/// `next`/`next_block`/`prev_block` calls return `false` and the error is
/// reported by [`err`](Iter::err).
pub struct Iter<'r, R> {
    reader: &'r Reader<R>,
    block_num: usize,
    section_num: usize,
    /// Section start offsets; `sections[0]` is always 0.
    sections: Vec<u32>,
    /// Block payload: entry stream followed by the encoded section index.
    buf: Vec<u8>,
    /// End of the entry stream within `buf`.
    entries_end: usize,
    /// Decode cursor within the entry stream.
    off: usize,
    /// Current cell ID, which doubles as the delta anchor. Reset to 0 at
    /// section boundaries.
    cell_id: u64,
    /// Current value as a `buf` range.
    value: (usize, usize),
    err: Option<Error>,
}

impl<'r, R: ReadAt> Iter<'r, R> {
    /// An iterator over nothing, used for lookups past the stored keyspace.
    pub(crate) fn empty(reader: &'r Reader<R>) -> Self {
        Self {
            reader,
            block_num: 0,
            section_num: 0,
            sections: Vec::new(),
            buf: Vec::new(),
            entries_end: 0,
            off: 0,
            cell_id: 0,
            value: (0, 0),
            err: None,
        }
    }

    /// Build an iterator over a decompressed block payload, decoding and
    /// validating the trailing section index.
    pub(crate) fn new(reader: &'r Reader<R>, block_num: usize, payload: Vec<u8>) -> Result<Self> {
        match Self::parse_sections(&payload) {
            Ok((sections, entries_end)) => Ok(Self {
                reader,
                block_num,
                section_num: 0,
                sections,
                buf: payload,
                entries_end,
                off: 0,
                cell_id: 0,
                value: (0, 0),
                err: None,
            }),
            Err(e) => {
                pool::release_buffer(payload);
                Err(e)
            }
        }
    }

    fn parse_sections(payload: &[u8]) -> Result<(Vec<u32>, usize)> {
        if payload.len() < 4 {
            return Err(Error::Corrupt("block too short for section count"));
        }
        let count = format::read_u32_le(&payload[payload.len() - 4..]) as usize;
        if count == 0 {
            return Err(Error::Corrupt("block with zero sections"));
        }
        let index_bytes = count
            .checked_mul(4)
            .filter(|&b| b <= payload.len())
            .ok_or(Error::Corrupt("section index overruns block payload"))?;
        let entries_end = payload.len() - index_bytes;
        if entries_end == 0 {
            return Err(Error::Corrupt("block without entries"));
        }

        // The first section implicitly starts at 0; only the rest are stored.
        let mut sections = pool::fetch_offsets(count);
        sections.push(0);
        let mut prev = 0u32;
        for i in 0..count - 1 {
            let at = entries_end + i * 4;
            let off = format::read_u32_le(&payload[at..at + 4]);
            if off <= prev || off as usize >= entries_end {
                pool::release_offsets(sections);
                return Err(Error::Corrupt("section offsets do not increase"));
            }
            sections.push(off);
            prev = off;
        }
        Ok((sections, entries_end))
    }

    /// Advance to the next entry. Returns `false` once the block is
    /// exhausted or an error is latched; it never crosses block boundaries
    /// on its own (see [`next_block`](Iter::next_block)).
    pub fn next(&mut self) -> bool {
        if self.err.is_some() || self.off >= self.entries_end {
            return false;
        }

        // A section boundary re-anchors delta decoding; it is detected by
        // the next section starting exactly at the cursor.
        let next_section = self.section_num + 1;
        if next_section < self.sections.len() && self.sections[next_section] as usize == self.off {
            self.cell_id = 0;
            self.section_num = next_section;
        }

        let Some((delta, n)) = varint::uvarint(&self.buf[self.off..self.entries_end]) else {
            return false;
        };
        self.off += n;
        self.cell_id = self.cell_id.wrapping_add(delta);

        let Some((value_len, n)) = varint::uvarint(&self.buf[self.off..self.entries_end]) else {
            return false;
        };
        self.off += n;
        let value_len = value_len as usize;
        if value_len > self.entries_end - self.off {
            return false;
        }
        self.value = (self.off, self.off + value_len);
        self.off += value_len;
        true
    }

    /// Position the cursor at the start of the last section whose first
    /// cell ID is `<= cell` (the first section if none is). No entry is
    /// consumed; the following [`next`](Iter::next) yields that section's
    /// first entry.
    pub fn seek_section(&mut self, cell: CellID) -> bool {
        if self.err.is_some() || self.sections.is_empty() {
            return false;
        }
        let pos = self.sections.partition_point(|&off| {
            match varint::uvarint(&self.buf[off as usize..self.entries_end]) {
                Some((first, _)) => first <= cell.0,
                None => false,
            }
        });
        self.advance_section(pos.saturating_sub(1))
    }

    /// Advance to the first entry with a cell ID `>= cell` within this
    /// block. On success the accessors describe the matched entry; `false`
    /// means the block holds no such entry.
    pub fn seek(&mut self, cell: CellID) -> bool {
        if !self.seek_section(cell) {
            return false;
        }
        while self.next() {
            if self.cell_id >= cell.0 {
                return true;
            }
        }
        false
    }

    /// Move to the start of the next block. Returns `false` on the last
    /// block without latching an error.
    pub fn next_block(&mut self) -> bool {
        if self.err.is_some() {
            return false;
        }
        self.jump_to(self.block_num + 1)
    }

    /// Move to the start of the previous block. Returns `false` on block 0
    /// without latching an error.
    pub fn prev_block(&mut self) -> bool {
        if self.err.is_some() || self.block_num == 0 {
            return false;
        }
        self.jump_to(self.block_num - 1)
    }

    /// Materialise block `pos` and take its place, releasing the current
    /// block's buffers. I/O and decode failures latch.
    pub(crate) fn jump_to(&mut self, pos: usize) -> bool {
        let reader = self.reader;
        if pos >= reader.num_blocks() {
            return false;
        }
        match reader.read_block(pos) {
            Ok(replacement) => {
                *self = replacement;
                true
            }
            Err(e) => {
                self.err = Some(e);
                false
            }
        }
    }

    /// Reset the cursor to the start of section `num`.
    pub(crate) fn advance_section(&mut self, num: usize) -> bool {
        if num >= self.sections.len() {
            return false;
        }
        self.section_num = num;
        self.off = self.sections[num] as usize;
        self.cell_id = 0;
        self.value = (0, 0);
        true
    }

    /// Decode only the value of the entry at byte offset `off`, adopting
    /// `cell_id` as the current cell. Used to replay previously visited
    /// entries without re-establishing the delta anchor.
    pub(crate) fn decode_entry_at(&mut self, off: usize, cell_id: u64) -> bool {
        if self.err.is_some() || off >= self.entries_end {
            return false;
        }
        self.off = off;
        let Some((_, n)) = varint::uvarint(&self.buf[self.off..self.entries_end]) else {
            return false;
        };
        self.off += n;
        let Some((value_len, n)) = varint::uvarint(&self.buf[self.off..self.entries_end]) else {
            return false;
        };
        self.off += n;
        let value_len = value_len as usize;
        if value_len > self.entries_end - self.off {
            return false;
        }
        self.value = (self.off, self.off + value_len);
        self.off += value_len;
        self.cell_id = cell_id;
        true
    }

    /// Call `walk` for every remaining entry, chaining across blocks. The
    /// callback receives the cell ID, block number and entry byte offset,
    /// and returns whether to keep going.
    pub(crate) fn walk_forward<F>(&mut self, mut walk: F)
    where
        F: FnMut(u64, usize, usize) -> bool,
    {
        loop {
            let entry_off = self.off;
            if !self.next() {
                if !self.next_block() {
                    return;
                }
                continue;
            }
            if !walk(self.cell_id, self.block_num, entry_off) {
                return;
            }
        }
    }

    /// Call `walk` for every entry before the current section, visiting
    /// sections in descending order (and blocks before that). Entries within
    /// a section are reported in their physical front-to-back order, since
    /// delta decoding only runs forwards; the callback's final argument
    /// marks the last entry of each visited section, the only points where
    /// stopping keeps the anchor state coherent.
    pub(crate) fn walk_reverse<F>(&mut self, mut walk: F)
    where
        F: FnMut(u64, usize, usize, bool) -> bool,
    {
        if self.sections.is_empty() {
            return;
        }
        let mut stop = self.sections[self.section_num] as usize;
        loop {
            if self.section_num == 0 {
                if self.block_num == 0 || !self.prev_block() {
                    return;
                }
                let last = self.sections.len() - 1;
                self.advance_section(last);
                stop = self.entries_end;
            } else {
                let prev = self.section_num - 1;
                self.advance_section(prev);
            }

            while self.off < stop {
                let entry_off = self.off;
                if !self.next() {
                    return;
                }
                let last_in_section = self.off >= stop;
                if !walk(self.cell_id, self.block_num, entry_off, last_in_section) {
                    return;
                }
            }
            stop = self.sections[self.section_num] as usize;
        }
    }

    /// Cell ID of the current entry.
    pub fn cell_id(&self) -> CellID {
        CellID(self.cell_id)
    }

    /// Value of the current entry. The slice borrows from the iterator's
    /// decode buffer; copy it to retain it past the next cursor move.
    pub fn value(&self) -> &[u8] {
        &self.buf[self.value.0..self.value.1]
    }

    /// Number of sections in the current block.
    pub fn num_sections(&self) -> usize {
        self.sections.len()
    }

    /// The latched error, if any.
    pub fn err(&self) -> Option<&Error> {
        self.err.as_ref()
    }

    pub(crate) fn take_err(&mut self) -> Option<Error> {
        self.err.take()
    }

    pub(crate) fn block_num(&self) -> usize {
        self.block_num
    }

    pub(crate) fn section_num(&self) -> usize {
        self.section_num
    }

    /// Return the iterator's buffers to the shared pools. Dropping does the
    /// same; `release` just makes the hand-back explicit at call sites.
    pub fn release(self) {}
}

impl<R> Drop for Iter<'_, R> {
    fn drop(&mut self) {
        pool::release_buffer(std::mem::take(&mut self.buf));
        pool::release_offsets(std::mem::take(&mut self.sections));
    }
}
