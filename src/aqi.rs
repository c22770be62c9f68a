//! PM2.5 concentration to US EPA air quality index.

struct Breakpoint {
    /// Concentrations below this value (µg/m³, exclusive) fall in the segment.
    upper: f64,
    c_lo: f64,
    c_hi: f64,
    i_lo: f64,
    i_hi: f64,
}

const fn bp(upper: f64, c_lo: f64, c_hi: f64, i_lo: f64, i_hi: f64) -> Breakpoint {
    Breakpoint {
        upper,
        c_lo,
        c_hi,
        i_lo,
        i_hi,
    }
}

const PM25_BREAKPOINTS: [Breakpoint; 7] = [
    bp(12.1, 0.0, 12.0, 0.0, 50.0),
    bp(35.5, 12.1, 35.4, 51.0, 100.0),
    bp(55.5, 35.5, 55.4, 101.0, 150.0),
    bp(150.5, 55.5, 150.4, 151.0, 200.0),
    bp(250.5, 150.5, 250.4, 201.0, 300.0),
    bp(350.5, 250.5, 350.4, 301.0, 400.0),
    bp(500.5, 350.5, 500.4, 401.0, 500.0),
];

pub const AQI_MAX: u16 = 500;

fn lerp(i_lo: f64, i_hi: f64, c_lo: f64, c_hi: f64, c: f64) -> f64 {
    ((c - c_lo) / (c_hi - c_lo)) * (i_hi - i_lo) + i_lo
}

/// AQI for a PM2.5 reading. The concentration is truncated to one decimal
/// before the segment lookup; anything at or past 500.5 reports 500.
pub fn pm25_to_aqi(pm25: f64) -> u16 {
    if pm25.is_nan() {
        return 0;
    }
    let c = (10.0 * pm25).floor() / 10.0;
    if c < 0.0 {
        return 0;
    }
    let Some(segment) = PM25_BREAKPOINTS.iter().find(|segment| c < segment.upper) else {
        return AQI_MAX;
    };
    let aqi = lerp(segment.i_lo, segment.i_hi, segment.c_lo, segment.c_hi, c).round();
    aqi.clamp(0.0, f64::from(AQI_MAX)) as u16
}
