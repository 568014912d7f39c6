pub mod error;
pub mod footprint;
pub mod gpxxml;

pub use error::{Error, ErrorKind, Result};

use footprint::LineEnding;
use time::OffsetDateTime;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct TrackPoint {
    pub lat: f64,
    pub lon: f64,
    pub time: OffsetDateTime,
    pub elevation: Option<f64>,
    pub speed: Option<f64>,
    /// Attribute text as written in the document. Recorded rows echo it verbatim.
    pub lat_text: String,
    pub lon_text: String,
}

impl TrackPoint {
    pub fn new(lat: f64, lon: f64, time: OffsetDateTime) -> Self {
        TrackPoint {
            lat,
            lon,
            time,
            elevation: None,
            speed: None,
            lat_text: lat.to_string(),
            lon_text: lon.to_string(),
        }
    }

    pub fn with_elevation(mut self, elevation: f64) -> Self {
        self.elevation = Some(elevation);
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    /// Seconds since the Unix epoch, to millisecond precision.
    pub fn epoch_seconds(&self) -> f64 {
        self.time.unix_timestamp() as f64 + f64::from(self.time.millisecond()) / 1000.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mode {
    /// One row per track point.
    Plain,
    /// Insert interpolated rows wherever consecutive points are more than
    /// `max_distance_m` meters apart.
    Compensated { max_distance_m: f64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversion {
    pub csv: Vec<u8>,
    pub points_before: usize,
    pub points_after: usize,
}

/// Calculates the great circle distance in meters between two GPS coordinates
/// using the haversine formula on a sphere of radius 6 371 000 m.
///
/// Out-of-range or non-finite input is not rejected: the result is simply
/// `NaN`, which callers can test for.
///
/// References:
/// - R.W. Sinnott, "Virtues of the Haversine", Sky and Telescope, vol. 68, no. 2, 1984, p. 159
/// - https://en.wikipedia.org/wiki/Haversine_formula
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS: f64 = 6371000.0;

    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    // a = sin²(Δφ/2) + cos φ1 ⋅ cos φ2 ⋅ sin²(Δλ/2)
    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS * c
}

/// Checks a user-supplied compensation threshold. The pipeline itself accepts
/// any value; this is the check front ends run before calling it.
///
/// Very small positive thresholds pass. A gap they would split into more than
/// [`footprint::MAX_STEPS_PER_GAP`] steps fails later in
/// [`footprint::compensated_rows`].
pub fn validate_max_distance(max_distance_m: f64) -> Result<f64> {
    if max_distance_m.is_finite() && max_distance_m > 0.0 {
        Ok(max_distance_m)
    } else {
        Err(Error::InvalidMaxDistance(max_distance_m))
    }
}

/// Runs the whole pipeline: parse the GPX document, build footprint rows for
/// `mode`, and serialize them. Nothing is returned unless every step succeeds.
pub fn convert(input: &[u8], mode: Mode) -> Result<Conversion> {
    let points = gpxxml::parse_track(input)?;
    debug!(points = points.len(), ?mode, "parsed track");

    let (rows, ending) = match mode {
        Mode::Plain => (footprint::plain_rows(&points), LineEnding::EveryRow),
        Mode::Compensated { max_distance_m } => (
            footprint::compensated_rows(&points, max_distance_m)?,
            LineEnding::BetweenRows,
        ),
    };

    let interpolated = rows
        .iter()
        .filter(|row| row.kind == footprint::RowKind::Interpolated)
        .count();
    info!(
        before = points.len(),
        after = rows.len(),
        interpolated,
        "converted track"
    );

    Ok(Conversion {
        csv: footprint::serialize(&rows, ending),
        points_before: points.len(),
        points_after: rows.len(),
    })
}

/// Suggested file name for a finished export, `导出轨迹_<epoch-millis>.gpx`.
/// The `.gpx` extension is kept even though the content is CSV.
pub fn export_file_name(at: OffsetDateTime) -> String {
    let millis = at.unix_timestamp_nanos() / 1_000_000;
    format!("导出轨迹_{millis}.gpx")
}
