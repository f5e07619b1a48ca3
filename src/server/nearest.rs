use crate::{catalog::stop::StopRecord, session::LatLng};

const EARTH_RADIUS_KM: f64 = 6_371.0;

/// Great-circle distance in kilometres.
pub fn haversine_distance(from: LatLng, to: LatLng) -> f64 {
    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let delta_lat = (to.lat - from.lat).to_radians();
    let delta_lng = (to.lng - from.lng).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_KM * c
}

/// The stop closest to `at`; the first one in catalog order on ties.
pub fn find_nearest_stop(at: LatLng, stops: &[StopRecord]) -> Option<&StopRecord> {
    stops
        .iter()
        .map(|s| (s, haversine_distance(at, LatLng::new(s.lat, s.lon))))
        .min_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(s, _)| s)
}
