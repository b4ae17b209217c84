//! Tile address space.
//!
//! Converts geographic regions into sets of slippy-map tile addresses.
//! The projection is standard Web Mercator: at zoom `z` the world is a
//! `2^z × 2^z` grid, `x` grows eastward and `y` grows southward.
//!
//! Everything in this module is pure and deterministic: identical inputs
//! always produce the identical tile set. Callers must not assume any
//! ordering of the returned set.

mod types;

pub use types::{
    BoundingBox, RegionError, TileId, ZoomRange, MAX_LAT, MAX_LON, MAX_ZOOM, MIN_LAT, MIN_LON,
    MIN_ZOOM,
};

use std::collections::BTreeSet;
use std::f64::consts::PI;

/// Converts geographic coordinates to the tile containing them.
///
/// # Errors
///
/// Returns [`RegionError::InvalidRegion`] for non-finite or out-of-range
/// coordinates and [`RegionError::ZoomOutOfRange`] for a zoom outside the
/// slippy-map limits.
pub fn tile_for(lat: f64, lon: f64, zoom: u8) -> Result<TileId, RegionError> {
    if !lat.is_finite() || !(MIN_LAT..=MAX_LAT).contains(&lat) {
        return Err(RegionError::InvalidRegion(format!(
            "latitude {} outside Web Mercator range",
            lat
        )));
    }
    if !lon.is_finite() || !(MIN_LON..=MAX_LON).contains(&lon) {
        return Err(RegionError::InvalidRegion(format!(
            "longitude {} outside valid range",
            lon
        )));
    }
    if zoom > MAX_ZOOM {
        return Err(RegionError::ZoomOutOfRange {
            zoom,
            min: MIN_ZOOM,
            max: MAX_ZOOM,
        });
    }

    Ok(TileId::new(zoom, column_for(lon, zoom), row_for(lat, zoom)))
}

/// Computes the deduplicated set of tiles covering `bbox` at every zoom in
/// `zooms`.
///
/// Every requested zoom is validated against `range` before any tile is
/// enumerated, so a single out-of-range zoom rejects the whole request. An
/// empty zoom set yields an empty tile set; a zero-area box yields the
/// single tile containing the point at each zoom.
///
/// # Errors
///
/// Returns [`RegionError::ZoomOutOfRange`] when any requested zoom falls
/// outside `range`.
pub fn tiles_for_region(
    bbox: &BoundingBox,
    zooms: &BTreeSet<u8>,
    range: ZoomRange,
) -> Result<BTreeSet<TileId>, RegionError> {
    for &zoom in zooms {
        range.check(zoom)?;
    }

    let mut tiles = BTreeSet::new();
    for &zoom in zooms {
        // North edge maps to the smallest row, south to the largest.
        let x_min = column_for(bbox.west(), zoom);
        let x_max = column_for(bbox.east(), zoom);
        let y_min = row_for(bbox.north(), zoom);
        let y_max = row_for(bbox.south(), zoom);

        for x in x_min..=x_max {
            for y in y_min..=y_max {
                tiles.insert(TileId::new(zoom, x, y));
            }
        }
    }
    Ok(tiles)
}

/// Returns the latitude/longitude of a tile's northwest corner.
pub fn tile_origin(tile: &TileId) -> (f64, f64) {
    let n = 2.0_f64.powi(i32::from(tile.zoom));
    let lon = f64::from(tile.x) / n * 360.0 - 180.0;
    let y = f64::from(tile.y) / n;
    let lat = (PI * (1.0 - 2.0 * y)).sinh().atan().to_degrees();
    (lat, lon)
}

/// Projects a longitude to a tile column, clamped into the grid.
fn column_for(lon: f64, zoom: u8) -> u32 {
    let n = 2.0_f64.powi(i32::from(zoom));
    let col = ((lon + 180.0) / 360.0 * n).floor();
    clamp_to_grid(col, zoom)
}

/// Projects a latitude to a tile row, clamped into the grid.
fn row_for(lat: f64, zoom: u8) -> u32 {
    let n = 2.0_f64.powi(i32::from(zoom));
    let lat_rad = lat.to_radians();
    let row = ((1.0 - lat_rad.tan().asinh() / PI) / 2.0 * n).floor();
    clamp_to_grid(row, zoom)
}

/// The 180th meridian and the Mercator latitude limits project exactly
/// onto the grid edge; clamp them back into the last tile.
fn clamp_to_grid(value: f64, zoom: u8) -> u32 {
    let max = (1u64 << zoom) - 1;
    if value < 0.0 {
        0
    } else if value as u64 > max {
        max as u32
    } else {
        value as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zooms(levels: &[u8]) -> BTreeSet<u8> {
        levels.iter().copied().collect()
    }

    #[test]
    fn test_greenwich_at_zoom_13() {
        // Greenwich observatory: 51.4769°N, 0.0005°W
        let tile = tile_for(51.4769, -0.0005, 13).unwrap();
        assert_eq!(tile.zoom, 13);
        assert_eq!(tile.x, 4095);
        assert_eq!(tile.y, 2725);
    }

    #[test]
    fn test_tile_for_rejects_bad_latitude() {
        assert!(matches!(
            tile_for(90.0, 0.0, 10),
            Err(RegionError::InvalidRegion(_))
        ));
    }

    #[test]
    fn test_tile_for_rejects_zoom_beyond_scheme() {
        assert!(matches!(
            tile_for(0.0, 0.0, 20),
            Err(RegionError::ZoomOutOfRange { zoom: 20, .. })
        ));
    }

    #[test]
    fn test_single_point_yields_one_tile_per_zoom() {
        let bbox = BoundingBox::new(51.5, -0.1, 51.5, -0.1).unwrap();
        let tiles = tiles_for_region(&bbox, &zooms(&[13]), ZoomRange::default()).unwrap();
        assert_eq!(tiles.len(), 1);
    }

    #[test]
    fn test_box_within_one_tile_at_zoom_13() {
        // Both corners project into tile 13/4095/2725.
        let bbox = BoundingBox::new(51.47, -0.01, 51.48, -0.001).unwrap();
        let tiles = tiles_for_region(&bbox, &zooms(&[13]), ZoomRange::default()).unwrap();
        assert_eq!(tiles.len(), 1);
        let tile = tiles.iter().next().unwrap();
        assert_eq!((tile.zoom, tile.x, tile.y), (13, 4095, 2725));
    }

    #[test]
    fn test_box_spanning_tile_corner_yields_four_tiles() {
        // A small box straddling the northwest corner of 13/4095/2725
        // touches that tile and its three neighbours.
        let (corner_lat, corner_lon) = tile_origin(&TileId::new(13, 4095, 2725));
        let bbox = BoundingBox::new(
            corner_lat - 0.001,
            corner_lon - 0.001,
            corner_lat + 0.001,
            corner_lon + 0.001,
        )
        .unwrap();
        let tiles = tiles_for_region(&bbox, &zooms(&[13]), ZoomRange::default()).unwrap();
        assert_eq!(tiles.len(), 4);
    }

    #[test]
    fn test_multiple_zooms_accumulate() {
        let bbox = BoundingBox::new(51.5, -0.1, 51.5, -0.1).unwrap();
        let tiles = tiles_for_region(&bbox, &zooms(&[10, 11, 12]), ZoomRange::default()).unwrap();
        assert_eq!(tiles.len(), 3);
        let seen: BTreeSet<u8> = tiles.iter().map(|t| t.zoom).collect();
        assert_eq!(seen, zooms(&[10, 11, 12]));
    }

    #[test]
    fn test_empty_zoom_set_yields_empty_tile_set() {
        let bbox = BoundingBox::new(51.0, -0.5, 51.7, 0.3).unwrap();
        let tiles = tiles_for_region(&bbox, &zooms(&[]), ZoomRange::default()).unwrap();
        assert!(tiles.is_empty());
    }

    #[test]
    fn test_out_of_range_zoom_rejects_whole_request() {
        let bbox = BoundingBox::new(51.0, -0.5, 51.7, 0.3).unwrap();
        let result = tiles_for_region(&bbox, &zooms(&[8, 15]), ZoomRange::new(0, 12));
        assert_eq!(
            result,
            Err(RegionError::ZoomOutOfRange {
                zoom: 15,
                min: 0,
                max: 12
            })
        );
    }

    #[test]
    fn test_deterministic_across_runs() {
        let bbox = BoundingBox::new(40.70, -74.02, 40.72, -73.99).unwrap();
        let levels = zooms(&[12, 13, 14]);
        let first = tiles_for_region(&bbox, &levels, ZoomRange::default()).unwrap();
        let second = tiles_for_region(&bbox, &levels, ZoomRange::default()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_antimeridian_edge_clamps_into_grid() {
        let tile = tile_for(0.0, 180.0, 5).unwrap();
        assert_eq!(tile.x, 31);
        assert!(tile.is_in_grid());
    }

    #[test]
    fn test_mercator_floor_clamps_into_grid() {
        let tile = tile_for(MIN_LAT, 0.0, 5).unwrap();
        assert_eq!(tile.y, 31);
        assert!(tile.is_in_grid());
    }

    #[test]
    fn test_whole_world_at_zoom_one() {
        let bbox = BoundingBox::new(MIN_LAT, MIN_LON, MAX_LAT, MAX_LON).unwrap();
        let tiles = tiles_for_region(&bbox, &zooms(&[1]), ZoomRange::default()).unwrap();
        assert_eq!(tiles.len(), 4);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_tiles_stay_in_grid(
                lat in MIN_LAT..MAX_LAT,
                lon in MIN_LON..MAX_LON,
                zoom in 0u8..=19
            ) {
                let tile = tile_for(lat, lon, zoom)?;
                let max = 1u64 << zoom;
                prop_assert!(u64::from(tile.x) < max);
                prop_assert!(u64::from(tile.y) < max);
                prop_assert_eq!(tile.zoom, zoom);
            }

            #[test]
            fn test_region_tiles_stay_in_grid(
                south in MIN_LAT..84.0,
                west in MIN_LON..179.0,
                zoom in 0u8..=12
            ) {
                let bbox = BoundingBox::new(south, west, south + 0.5, west + 0.5)
                    .expect("constructed box is valid");
                let levels: BTreeSet<u8> = [zoom].into_iter().collect();
                let tiles = tiles_for_region(&bbox, &levels, ZoomRange::default())
                    .expect("zoom is in range");
                let max = 1u64 << zoom;
                for tile in &tiles {
                    prop_assert!(u64::from(tile.x) < max);
                    prop_assert!(u64::from(tile.y) < max);
                }
            }

            #[test]
            fn test_region_computation_idempotent(
                south in MIN_LAT..84.0,
                west in MIN_LON..179.0,
                zoom in 0u8..=12
            ) {
                let bbox = BoundingBox::new(south, west, south + 0.5, west + 0.5)
                    .expect("constructed box is valid");
                let levels: BTreeSet<u8> = [zoom].into_iter().collect();
                let first = tiles_for_region(&bbox, &levels, ZoomRange::default()).unwrap();
                let second = tiles_for_region(&bbox, &levels, ZoomRange::default()).unwrap();
                prop_assert_eq!(first, second);
            }

            #[test]
            fn test_roundtrip_through_origin(
                lat in -84.0..84.0_f64,
                lon in -179.0..179.0_f64,
                zoom in 0u8..=19
            ) {
                let tile = tile_for(lat, lon, zoom)?;
                let (origin_lat, origin_lon) = tile_origin(&tile);

                // The origin is the northwest corner; the point must lie
                // within one tile span of it.
                let tile_span = 360.0 / 2.0_f64.powi(i32::from(zoom));
                prop_assert!((origin_lon - lon).abs() <= tile_span);
                prop_assert!((origin_lat - lat).abs() <= tile_span);
            }

            #[test]
            fn test_longitude_monotonic(
                lat in 0.0..1.0_f64,
                lon1 in -180.0..-90.0_f64,
                lon2 in -90.0..0.0_f64,
                zoom in 10u8..=15
            ) {
                let t1 = tile_for(lat, lon1, zoom)?;
                let t2 = tile_for(lat, lon2, zoom)?;
                prop_assert!(t1.x < t2.x);
            }
        }
    }
}
