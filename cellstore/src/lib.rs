//! Write-once, read-many proximity store for S2-keyed point data.
//!
//! A producer streams strictly-increasing `(cell ID, value)` pairs through a
//! [`Writer`] into a compact self-describing file; a [`Reader`] answers two
//! questions about it: which entries share the block covering a cell
//! ([`Reader::find_block`]) and which stored entries lie closest to a cell
//! on the sphere ([`Reader::nearby`]). Values are opaque byte strings.
//!
//! # Layout
//!
//! ```text
//! store:   +---------+-----+---------+-------------+--------+
//!          | block 1 | ... | block n | block index | footer |
//!          +---------+-----+---------+-------------+--------+
//!
//! block:   +-----------+-----+-----------+---------------+--------+
//!          | section 1 | ... | section n | section index | marker |
//!          +-----------+-----+-----------+---------------+--------+
//!
//! section: +---------------+--------------+-------+-----+
//!          | cell (varint) | len (varint) | value | ... |
//!          +---------------+--------------+-------+-----+
//! ```
//!
//! Blocks are the unit of I/O and optional Snappy compression; sections
//! bound the range over which delta-encoded cell IDs must be decoded from
//! scratch, making random access within a block cheap. The block index maps
//! each block's largest cell ID to its byte offset, and the fixed 16-byte
//! footer locates the index. See [`format`] for the bit-level details.
//!
//! # Example
//!
//! ```
//! use cellstore::{CellID, Options, Reader, Writer};
//!
//! # fn main() -> cellstore::Result<()> {
//! let mut buf = Vec::new();
//! let mut writer = Writer::new(&mut buf, Options::default());
//! writer.append(CellID(1317624576600000001), b"first")?;
//! writer.append(CellID(1317624576600000003), b"second")?;
//! writer.close()?;
//! drop(writer);
//!
//! let size = buf.len() as u64;
//! let reader = Reader::open(buf, size)?;
//! let mut iter = reader.find_block(CellID(1317624576600000003))?;
//! while iter.next() {
//!     println!("{} {:?}", iter.cell_id().0, iter.value());
//! }
//! iter.release();
//! # Ok(())
//! # }
//! ```

mod cell;
mod error;
pub mod format;
mod iter;
mod nearby;
mod options;
mod pool;
mod reader;
mod source;
mod varint;
mod writer;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::{Error, Result};
pub use format::MAGIC;
pub use iter::Iter;
pub use nearby::NearbyIter;
pub use options::{
    Compression, Options, DEFAULT_BLOCK_SIZE, DEFAULT_SECTION_SIZE, KIB, MIB,
};
pub use reader::Reader;
pub use source::ReadAt;
pub use writer::Writer;

pub use s2::cellid::CellID;
