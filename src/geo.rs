//! Bounding-box math for the sensor search area.
//!
//! The search box is derived from two radial projections off the configured
//! center (northwest at -45°, southeast at +135°) on a spherical Earth, which
//! keeps the box consistent at every latitude.

use crate::error::GeometryError;
use crate::fields::RequestParams;
use std::f64::consts::PI;
use std::fmt;

const KM_PER_NM: f64 = 1.852;
const NW_BEARING_DEG: f64 = -45.0;
const SE_BEARING_DEG: f64 = 135.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    lat: f64,
    lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Result<Self, GeometryError> {
        if !lat_valid(lat) {
            return Err(GeometryError::LatitudeOutOfRange(lat));
        }
        if !lng_valid(lng) {
            return Err(GeometryError::LongitudeOutOfRange(lng));
        }
        Ok(Self { lat, lng })
    }

    pub fn latitude(&self) -> f64 {
        self.lat
    }

    pub fn longitude(&self) -> f64 {
        self.lng
    }
}

/// Axis-aligned (lat/lng) search rectangle described by its northwest and
/// southeast corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    nwlng: f64,
    nwlat: f64,
    selng: f64,
    selat: f64,
}

impl Bounds {
    pub fn new(nwlng: f64, nwlat: f64, selng: f64, selat: f64) -> Result<Self, GeometryError> {
        if !lng_valid(nwlng) {
            return Err(GeometryError::NwLngOutOfBounds(nwlng));
        }
        if !lat_valid(nwlat) {
            return Err(GeometryError::NwLatOutOfBounds(nwlat));
        }
        if !lng_valid(selng) {
            return Err(GeometryError::SeLngOutOfBounds(selng));
        }
        if !lat_valid(selat) {
            return Err(GeometryError::SeLatOutOfBounds(selat));
        }
        if nwlat < selat {
            return Err(GeometryError::LatitudeInverted { nwlat, selat });
        }
        if selng < nwlng {
            return Err(GeometryError::LongitudeInverted { nwlng, selng });
        }
        Ok(Self {
            nwlng,
            nwlat,
            selng,
            selat,
        })
    }

    pub fn nwlng(&self) -> f64 {
        self.nwlng
    }

    pub fn nwlat(&self) -> f64 {
        self.nwlat
    }

    pub fn selng(&self) -> f64 {
        self.selng
    }

    pub fn selat(&self) -> f64 {
        self.selat
    }

    pub fn append_params(&self, params: &mut RequestParams) {
        for (key, value) in [
            ("nwlng", self.nwlng),
            ("nwlat", self.nwlat),
            ("selng", self.selng),
            ("selat", self.selat),
        ] {
            params.insert(key.to_string(), format!("{value:.6}"));
        }
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "nwlng={:.5}&nwlat={:.5}&selng={:.5}&selat={:.5}",
            self.nwlng, self.nwlat, self.selng, self.selat
        )
    }
}

fn lat_valid(lat: f64) -> bool {
    (-90.0..=90.0).contains(&lat)
}

fn lng_valid(lng: f64) -> bool {
    (-180.0..=180.0).contains(&lng)
}

pub fn radians(degrees: f64) -> f64 {
    degrees * PI / 180.0
}

pub fn degrees(radians: f64) -> f64 {
    radians * 180.0 / PI
}

pub fn km_to_nm(km: f64) -> f64 {
    km / KM_PER_NM
}

pub fn nm_to_km(nm: f64) -> f64 {
    nm * KM_PER_NM
}

// One nautical mile is one minute of great-circle arc.
fn distance_km_to_radians(distance_km: f64) -> f64 {
    (PI / (180.0 * 60.0)) * km_to_nm(distance_km)
}

fn normalize_longitude_rad(lng: f64) -> f64 {
    let wrapped = (lng + PI).rem_euclid(2.0 * PI) - PI;
    if wrapped <= -PI {
        wrapped + 2.0 * PI
    } else {
        wrapped
    }
}

/// Point `distance_km` away from `origin` along `bearing_rad`
/// (0 = true north, clockwise positive), on a spherical Earth.
///
/// The returned longitude lies in (-180°, 180°].
pub fn point_from_radial(origin: GeoPoint, distance_km: f64, bearing_rad: f64) -> GeoPoint {
    let lat1 = radians(origin.lat);
    let lng1 = radians(origin.lng);
    let d = distance_km_to_radians(distance_km);

    let lat = (lat1.sin() * d.cos() + lat1.cos() * d.sin() * bearing_rad.cos()).asin();
    let dlng = (bearing_rad.sin() * d.sin() * lat1.cos()).atan2(d.cos() - lat1.sin() * lat.sin());
    let lng = normalize_longitude_rad(lng1 + dlng);

    GeoPoint {
        lat: degrees(lat).clamp(-90.0, 90.0),
        lng: degrees(lng).clamp(-180.0, 180.0),
    }
}

/// Search box around `center` whose corners sit `radius_km` out on the
/// northwest and southeast diagonals.
pub fn compute_bounds(center: GeoPoint, radius_km: f64) -> Result<Bounds, GeometryError> {
    if !radius_km.is_finite() || radius_km < 0.0 {
        return Err(GeometryError::InvalidRadius(radius_km));
    }
    let nw = point_from_radial(center, radius_km, radians(NW_BEARING_DEG));
    let se = point_from_radial(center, radius_km, radians(SE_BEARING_DEG));
    Bounds::new(nw.lng, nw.lat, se.lng, se.lat)
}
