//! Seeded store builders shared by the unit tests.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use s2::cellid::CellID;

use crate::options::{Compression, Options, KIB};
use crate::reader::Reader;
use crate::writer::Writer;

/// First cell ID of every seeded store; a level-30 leaf cell.
pub(crate) const SEED_CELL_ID: u64 = 1_317_624_576_600_000_001;

/// Write `num_records` entries with cell IDs `SEED_CELL_ID + 8·i` and
/// 128-byte pseudo-random values, using small blocks and sections so that
/// modest stores still span several of each.
pub(crate) fn seed_store(num_records: usize) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut writer = Writer::new(
        &mut buf,
        Options {
            block_size: 2 * KIB,
            section_size: 4,
            compression: Compression::Snappy,
        },
    );
    let mut rng = StdRng::seed_from_u64(1);
    let mut value = [0u8; 128];
    for i in 0..num_records as u64 {
        rng.fill_bytes(&mut value);
        writer
            .append(CellID(SEED_CELL_ID + 8 * i), &value)
            .expect("seed append");
    }
    writer.close().expect("seed close");
    drop(writer);
    buf
}

pub(crate) fn seed_reader(num_records: usize) -> Reader<Vec<u8>> {
    let data = seed_store(num_records);
    let size = data.len() as u64;
    Reader::open(data, size).expect("seed open")
}
