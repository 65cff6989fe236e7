//! Great-circle distance between geographic points.

use geo::{HaversineDistance, Point};

/// Haversine distance in kilometers between two `(lon, lat)` points.
#[inline]
pub fn great_circle_km(a: Point<f64>, b: Point<f64>) -> f64 {
    a.haversine_distance(&b) / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo::point;

    #[test]
    fn test_zero_distance() {
        let p = point!(x: 13.1, y: 11.8);
        assert_eq!(great_circle_km(p, p), 0.0);
    }

    #[test]
    fn test_one_degree_of_latitude() {
        let a = point!(x: 0.0, y: 0.0);
        let b = point!(x: 0.0, y: 1.0);
        assert_relative_eq!(great_circle_km(a, b), 111.19, epsilon = 0.05);
    }

    #[test]
    fn test_symmetric() {
        let maiduguri = point!(x: 13.16, y: 11.85);
        let abuja = point!(x: 7.49, y: 9.06);
        assert_relative_eq!(
            great_circle_km(maiduguri, abuja),
            great_circle_km(abuja, maiduguri),
            epsilon = 1e-9
        );
        // roughly 690 km apart
        let d = great_circle_km(maiduguri, abuja);
        assert!(d > 650.0 && d < 730.0, "distance {d}");
    }
}
