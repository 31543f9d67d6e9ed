//! K-nearest-neighbour lookups over the cell-ordered store.
//!
//! Cell IDs follow a space-filling curve, so entries close on the curve are
//! usually, but not always, close on the sphere. The engine therefore
//! widens the candidate window a little beyond the requested limit on both
//! sides of the origin, scores every candidate by angular distance, and
//! keeps the best.

use s2::cellid::CellID;

use crate::cell;
use crate::error::{Error, Result};
use crate::iter::Iter;
use crate::reader::Reader;
use crate::source::ReadAt;

/// Extra candidates gathered on each side of the origin, hedging against
/// curve discontinuities.
const WIDENING: usize = 4;

/// A scored entry position recorded during the sweeps.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    cell_id: u64,
    distance: f64,
    block_num: usize,
    offset: usize,
}

impl<R: ReadAt> Reader<R> {
    /// Return up to `limit` entries closest to `cell` by angle between cell
    /// centres, in ascending cell ID order.
    ///
    /// The result is exact over the examined window (`limit + 4` entries on
    /// either side of the origin in curve order), which matches the global
    /// nearest set whenever coverage around the origin is locally dense.
    pub fn nearby(&self, cell: CellID, limit: usize) -> Result<NearbyIter<'_, R>> {
        if !cell.is_valid() {
            return Err(Error::InvalidCellId(cell.0));
        }
        if self.num_blocks() == 0 || limit == 0 {
            return Ok(NearbyIter::empty());
        }
        let origin = cell.0;
        let origin_point = cell::center(cell);
        let budget = limit + WIDENING;

        // Pivot on the section covering the origin; lookups beyond the
        // stored keyspace pivot on the very last block.
        let pivot_block = self.clamped_block(origin);
        let mut it = self.read_block(pivot_block)?;
        it.seek_section(cell);
        let pivot_section = it.section_num();

        let mut candidates: Vec<Candidate> = Vec::with_capacity(2 * budget);
        let mut right = 0usize;
        it.walk_forward(|cell_id, block_num, offset| {
            candidates.push(Candidate {
                cell_id,
                distance: cell::distance_to(&origin_point, cell_id),
                block_num,
                offset,
            });
            if cell_id >= origin {
                right += 1;
            }
            right < budget
        });
        if let Some(e) = it.take_err() {
            return Err(e);
        }

        // Rewind to the pivot and sweep the other way. The reverse walk only
        // evaluates the stop condition on section boundaries, where the
        // decode anchor is in a known state.
        if !it.jump_to(pivot_block) {
            return Err(it
                .take_err()
                .unwrap_or(Error::Corrupt("pivot block unavailable")));
        }
        it.advance_section(pivot_section);
        let mut left = 0usize;
        it.walk_reverse(|cell_id, block_num, offset, last_in_section| {
            candidates.push(Candidate {
                cell_id,
                distance: cell::distance_to(&origin_point, cell_id),
                block_num,
                offset,
            });
            if cell_id < origin {
                left += 1;
            }
            !(last_in_section && left >= budget)
        });
        if let Some(e) = it.take_err() {
            return Err(e);
        }

        candidates.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        candidates.truncate(limit);
        candidates.sort_by_key(|c| c.cell_id);

        Ok(NearbyIter {
            it: Some(it),
            entries: candidates,
            pos: 0,
            current: None,
            err: None,
        })
    }
}

/// Replays the selected nearest entries from the underlying store.
///
/// Entries are revisited by re-materialising their blocks and decoding at
/// the recorded byte offsets; in the common case all of them live in one or
/// two blocks. Values borrow from the replay buffer, exactly like block
/// iterator values.
pub struct NearbyIter<'r, R> {
    it: Option<Iter<'r, R>>,
    entries: Vec<Candidate>,
    pos: usize,
    current: Option<(u64, f64)>,
    err: Option<Error>,
}

impl<'r, R: ReadAt> NearbyIter<'r, R> {
    fn empty() -> Self {
        Self {
            it: None,
            entries: Vec::new(),
            pos: 0,
            current: None,
            err: None,
        }
    }

    /// Advance to the next entry, ascending by cell ID.
    pub fn next(&mut self) -> bool {
        if self.err.is_some() || self.pos >= self.entries.len() {
            return false;
        }
        let candidate = self.entries[self.pos];
        let Some(it) = self.it.as_mut() else {
            return false;
        };
        if it.block_num() != candidate.block_num && !it.jump_to(candidate.block_num) {
            self.err = Some(
                it.take_err()
                    .unwrap_or(Error::Corrupt("replay block unavailable")),
            );
            return false;
        }
        if !it.decode_entry_at(candidate.offset, candidate.cell_id) {
            self.err = Some(Error::Corrupt("replay entry offset invalid"));
            return false;
        }
        self.current = Some((candidate.cell_id, candidate.distance));
        self.pos += 1;
        true
    }

    /// Cell ID of the current entry.
    pub fn cell_id(&self) -> CellID {
        CellID(self.current.map_or(0, |(cell_id, _)| cell_id))
    }

    /// Angular distance in radians between the origin and the current entry.
    pub fn distance(&self) -> f64 {
        self.current.map_or(0.0, |(_, distance)| distance)
    }

    /// Value of the current entry, borrowed until the next cursor move.
    pub fn value(&self) -> &[u8] {
        self.it.as_ref().map_or(&[], |it| it.value())
    }

    /// The first replay error, if any.
    pub fn err(&self) -> Option<&Error> {
        self.err.as_ref()
    }

    /// Return the replay buffers to the shared pools.
    pub fn release(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{seed_reader, SEED_CELL_ID};

    fn cell(offset: u64) -> CellID {
        CellID(SEED_CELL_ID + offset)
    }

    fn nearby_cells(r: &Reader<Vec<u8>>, target: CellID, limit: usize) -> Vec<u64> {
        let mut it = r.nearby(target, limit).unwrap();
        let mut cells = Vec::new();
        while it.next() {
            assert_eq!(it.value().len(), 128);
            assert!(it.distance() >= 0.0);
            cells.push(it.cell_id().0 - SEED_CELL_ID);
        }
        assert!(it.err().is_none(), "latched: {:?}", it.err());
        cells
    }

    #[test]
    fn widens_around_the_origin() {
        let r = seed_reader(100);

        assert_eq!(nearby_cells(&r, cell(280), 3), vec![272, 280, 288]);
        assert_eq!(nearby_cells(&r, cell(280), 4), vec![272, 280, 288, 304]);
        assert_eq!(
            nearby_cells(&r, cell(280), 5),
            vec![272, 280, 288, 304, 312]
        );
        assert_eq!(
            nearby_cells(&r, cell(280), 6),
            vec![256, 272, 280, 288, 304, 312]
        );

        assert_eq!(
            nearby_cells(&r, cell(320), 7),
            vec![272, 304, 312, 320, 328, 336, 344]
        );
    }

    #[test]
    fn distance_to_the_origin_itself_is_zero() {
        let r = seed_reader(100);
        let mut it = r.nearby(cell(280), 3).unwrap();
        let mut self_distance = f64::MAX;
        while it.next() {
            assert!(it.distance() > 0.0 || it.cell_id() == cell(280));
            if it.cell_id() == cell(280) {
                self_distance = it.distance();
            }
        }
        assert!(self_distance < 1e-12);
    }

    #[test]
    fn caps_the_result_at_the_store_size() {
        let r = seed_reader(10);
        let cells = nearby_cells(&r, cell(40), 64);
        let expected: Vec<u64> = (0..10).map(|i| i * 8).collect();
        assert_eq!(cells, expected);
    }

    #[test]
    fn works_at_the_edges_of_the_keyspace() {
        let r = seed_reader(100);

        // Below the smallest stored cell: candidates come from the head.
        let low = nearby_cells(&r, CellID(1_317_624_576_599_999_999), 3);
        assert_eq!(low.len(), 3);
        assert!(low.iter().all(|&offset| offset <= 48));

        // Beyond the largest stored cell: pivots on the last block.
        let high = nearby_cells(&r, cell(800), 3);
        assert_eq!(high.len(), 3);
        assert!(high.iter().all(|&offset| (720..=792).contains(&offset)));
    }

    #[test]
    fn zero_limit_and_empty_store_yield_nothing() {
        let r = seed_reader(100);
        let mut it = r.nearby(cell(280), 0).unwrap();
        assert!(!it.next());
        assert!(it.err().is_none());

        let empty = seed_reader(0);
        let mut it = empty.nearby(cell(280), 3).unwrap();
        assert!(!it.next());
        assert!(it.err().is_none());
    }

    #[test]
    fn rejects_invalid_origins() {
        let r = seed_reader(100);
        assert!(matches!(
            r.nearby(cell(1), 3),
            Err(Error::InvalidCellId(_))
        ));
    }
}
