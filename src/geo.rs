//! Great-circle math behind the nearby search.
//!
//! Candidates are first narrowed with an index-friendly bounding box,
//! then ranked by exact Haversine distance. The spherical-Earth
//! approximation is accurate enough for the sub-1000 km radii the API
//! accepts.

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// One degree of latitude in kilometers; longitude shrinks by cos(lat).
const KM_PER_DEGREE: f64 = 111.0;

/// Above this absolute latitude the cos term degenerates and the
/// longitude delta is widened to the full span instead.
const MAX_BBOX_LATITUDE: f64 = 89.9;

/// Great-circle distance in kilometers between two points given in
/// degrees. Inputs are not validated here; callers check ranges.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();

    let a = (dlat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (dlon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

/// Axis-aligned pre-filter box around a center point. Guaranteed to
/// contain every point within `radius_km` of the center.
pub fn bounding_box(lat: f64, lon: f64, radius_km: f64) -> BoundingBox {
    let lat_delta = radius_km / KM_PER_DEGREE;

    let lon_delta = if lat.abs() > MAX_BBOX_LATITUDE {
        180.0
    } else {
        (radius_km / (KM_PER_DEGREE * lat.to_radians().cos().abs())).min(180.0)
    };

    BoundingBox {
        min_lat: lat - lat_delta,
        max_lat: lat + lat_delta,
        min_lon: lon - lon_delta,
        max_lon: lon + lon_delta,
    }
}

/// Exact-distance pass over bounding-box survivors: keeps items within
/// the radius, pairs each with its distance and sorts nearest-first.
/// The sort is stable, so equal distances preserve input order.
pub fn within_radius<T, F>(
    center_lat: f64,
    center_lon: f64,
    radius_km: f64,
    items: Vec<T>,
    coords: F,
) -> Vec<(T, f64)>
where
    F: Fn(&T) -> (f64, f64),
{
    let mut matches: Vec<(T, f64)> = items
        .into_iter()
        .filter_map(|item| {
            let (lat, lon) = coords(&item);
            let distance = haversine_distance(center_lat, center_lon, lat, lon);
            (distance <= radius_km).then_some((item, distance))
        })
        .collect();

    matches.sort_by(|a, b| a.1.total_cmp(&b.1));
    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARIS: (f64, f64) = (48.8566, 2.3522);
    const LYON: (f64, f64) = (45.7640, 4.8357);

    #[test]
    fn test_identity() {
        assert_eq!(haversine_distance(PARIS.0, PARIS.1, PARIS.0, PARIS.1), 0.0);
        assert_eq!(haversine_distance(0.0, 0.0, 0.0, 0.0), 0.0);
    }

    #[test]
    fn test_symmetry() {
        let points = [PARIS, LYON, (0.0, 0.0), (-33.8688, 151.2093), (90.0, 0.0)];
        for a in points {
            for b in points {
                let ab = haversine_distance(a.0, a.1, b.0, b.1);
                let ba = haversine_distance(b.0, b.1, a.0, a.1);
                assert!((ab - ba).abs() < 1e-9, "distance({a:?},{b:?}) asymmetric");
            }
        }
    }

    #[test]
    fn test_paris_lyon() {
        let d = haversine_distance(PARIS.0, PARIS.1, LYON.0, LYON.1);
        assert!((d - 392.0).abs() < 5.0, "Paris-Lyon was {d} km");
    }

    #[test]
    fn test_antipodal() {
        let d = haversine_distance(0.0, 0.0, 0.0, 180.0);
        assert!((d - 20015.0).abs() < 5.0, "antipodal was {d} km");
    }

    #[test]
    fn test_bounding_box_is_superset() {
        // Every point within the radius must fall inside the box.
        let (center_lat, center_lon) = PARIS;
        let radius = 50.0;
        let bbox = bounding_box(center_lat, center_lon, radius);

        let mut lat = center_lat - 1.0;
        while lat <= center_lat + 1.0 {
            let mut lon = center_lon - 1.5;
            while lon <= center_lon + 1.5 {
                let d = haversine_distance(center_lat, center_lon, lat, lon);
                if d <= radius {
                    assert!(
                        lat >= bbox.min_lat
                            && lat <= bbox.max_lat
                            && lon >= bbox.min_lon
                            && lon <= bbox.max_lon,
                        "({lat},{lon}) at {d} km escaped the box"
                    );
                }
                lon += 0.05;
            }
            lat += 0.05;
        }
    }

    #[test]
    fn test_bounding_box_widens_at_high_latitude() {
        // At 60°N one longitude degree covers half the equatorial span.
        let equator = bounding_box(0.0, 0.0, 50.0);
        let north = bounding_box(60.0, 0.0, 50.0);
        let eq_span = equator.max_lon - equator.min_lon;
        let north_span = north.max_lon - north.min_lon;
        assert!((north_span / eq_span - 2.0).abs() < 0.01);
    }

    #[test]
    fn test_bounding_box_polar_clamp() {
        let bbox = bounding_box(90.0, 0.0, 50.0);
        assert_eq!(bbox.min_lon, -180.0);
        assert_eq!(bbox.max_lon, 180.0);
        assert!(bbox.min_lon.is_finite() && bbox.max_lon.is_finite());
    }

    #[test]
    fn test_within_radius_filters_and_sorts() {
        let candidates = vec![
            ("lyon", LYON.0, LYON.1),
            ("paris", PARIS.0, PARIS.1),
            ("versailles", 48.8049, 2.1204),
        ];

        let result = within_radius(PARIS.0, PARIS.1, 50.0, candidates, |c| (c.1, c.2));

        let names: Vec<&str> = result.iter().map(|(c, _)| c.0).collect();
        assert_eq!(names, vec!["paris", "versailles"]);
        assert_eq!(result[0].1, 0.0);
        for pair in result.windows(2) {
            assert!(pair[0].1 <= pair[1].1, "result not sorted by distance");
        }
    }

    #[test]
    fn test_within_radius_stable_on_ties() {
        let candidates = vec![("a", 1.0, 1.0), ("b", 1.0, 1.0), ("c", 1.0, 1.0)];
        let result = within_radius(1.0, 1.0, 10.0, candidates, |c| (c.1, c.2));
        let names: Vec<&str> = result.iter().map(|(c, _)| c.0).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
