use serde::Deserialize;

/// Observer location on the WGS-84 ellipsoid.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct GroundStation {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    #[serde(default)]
    pub altitude_m: f64,
}

impl GroundStation {
    pub fn lat_rad(&self) -> f64 {
        self.latitude_deg.to_radians()
    }

    pub fn lon_rad(&self) -> f64 {
        self.longitude_deg.to_radians()
    }

    pub fn position_ecef_km(&self) -> [f64; 3] {
        // WGS-84 constants
        let a = 6378.137;
        let e2 = 0.00669437999014;
        let lat = self.lat_rad();
        let lon = self.lon_rad();
        let sin_lat = lat.sin();
        let cos_lat = lat.cos();
        let n = a / (1.0 - e2 * sin_lat * sin_lat).sqrt();
        let alt_km = self.altitude_m / 1000.0;
        [
            (n + alt_km) * cos_lat * lon.cos(),
            (n + alt_km) * cos_lat * lon.sin(),
            (n * (1.0 - e2) + alt_km) * sin_lat,
        ]
    }

    /// East/north/up components of an ECEF offset seen from this station.
    pub fn enu(&self, dr: [f64; 3]) -> (f64, f64, f64) {
        let sin_lat = self.lat_rad().sin();
        let cos_lat = self.lat_rad().cos();
        let sin_lon = self.lon_rad().sin();
        let cos_lon = self.lon_rad().cos();

        let east = -sin_lon * dr[0] + cos_lon * dr[1];
        let north = -sin_lat * cos_lon * dr[0] - sin_lat * sin_lon * dr[1] + cos_lat * dr[2];
        let up = cos_lat * cos_lon * dr[0] + cos_lat * sin_lon * dr[1] + sin_lat * dr[2];
        (east, north, up)
    }
}
