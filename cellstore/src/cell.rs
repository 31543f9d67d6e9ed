//! S2 cell helpers: centre points and the angular distance metric.

use s2::cellid::CellID;
use s2::latlng::LatLng;
use s2::point::Point;

/// Centre of a cell as a unit vector on the sphere.
pub(crate) fn center(cell: CellID) -> Point {
    Point::from(LatLng::from(cell))
}

/// Angle in radians between `origin` and the centre of `cell_id`.
pub(crate) fn distance_to(origin: &Point, cell_id: u64) -> f64 {
    let p = center(CellID(cell_id));
    origin.0.angle(&p.0).rad()
}
