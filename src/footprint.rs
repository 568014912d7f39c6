//! Footprint CSV rows: building them from a parsed track and writing them out.
//!
//! Field values are numbers or fixed tokens, so rows are joined with commas
//! as-is. No quoting or escaping is ever applied.

use crate::error::{Error, Result};
use crate::{TrackPoint, haversine_distance};
use std::fmt;
use tracing::trace;

pub const HEADER: &str = "dataTime,locType,longitude,latitude,heading,accuracy,speed,distance,isBackForeground,stepType,altitude";

const LOC_TYPE: &str = "1";
const HEADING: &str = "0.000000";
const ACCURACY: &str = "0.000000";
const RECORDED_DISTANCE: &str = "0.000000";
const IS_BACK_FOREGROUND: &str = "0";
const STEP_TYPE: &str = "0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    Recorded,
    Interpolated,
}

/// One line of the footprint CSV. Only the columns that vary are stored;
/// the placeholders are filled in by the `Display` impl.
#[derive(Debug, Clone, PartialEq)]
pub struct FootprintRow {
    pub kind: RowKind,
    pub data_time: String,
    pub longitude: String,
    pub latitude: String,
    pub speed: String,
    pub distance: String,
    pub altitude: String,
}

impl FootprintRow {
    pub fn recorded(point: &TrackPoint) -> Self {
        FootprintRow {
            kind: RowKind::Recorded,
            data_time: point.epoch_seconds().to_string(),
            longitude: point.lon_text.clone(),
            latitude: point.lat_text.clone(),
            speed: fixed_or_zero(point.speed),
            distance: RECORDED_DISTANCE.to_string(),
            altitude: fixed_or_zero(point.elevation),
        }
    }

    /// A synthetic row at `ratio` (strictly between 0 and 1) of the way from
    /// `from` to `to`. `distance` is the length of the whole gap and is written
    /// unformatted.
    pub fn interpolated(from: &TrackPoint, to: &TrackPoint, ratio: f64, distance: f64) -> Self {
        let time = lerp(from.epoch_seconds(), to.epoch_seconds(), ratio);
        let elevation = lerp(
            from.elevation.unwrap_or(0.0),
            to.elevation.unwrap_or(0.0),
            ratio,
        );
        let speed = lerp(from.speed.unwrap_or(0.0), to.speed.unwrap_or(0.0), ratio);

        FootprintRow {
            kind: RowKind::Interpolated,
            data_time: round_half_up(time).to_string(),
            longitude: fixed(lerp(from.lon, to.lon, ratio)),
            latitude: fixed(lerp(from.lat, to.lat, ratio)),
            speed: fixed(speed),
            distance: distance.to_string(),
            altitude: fixed(elevation),
        }
    }
}

impl fmt::Display for FootprintRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{},{},{},{},{},{},{}",
            self.data_time,
            LOC_TYPE,
            self.longitude,
            self.latitude,
            HEADING,
            ACCURACY,
            self.speed,
            self.distance,
            IS_BACK_FOREGROUND,
            STEP_TYPE,
            self.altitude
        )
    }
}

pub fn plain_rows(points: &[TrackPoint]) -> Vec<FootprintRow> {
    points.iter().map(FootprintRow::recorded).collect()
}

/// Upper bound on the steps a single gap may be split into.
pub const MAX_STEPS_PER_GAP: f64 = 1_000_000.0;

/// Builds rows for a track, inserting interpolated rows across every gap
/// longer than `max_distance_m`.
///
/// Iteration covers points `0..n-1`: the gap ending at point `i` is examined
/// before point `i` is written, starting from `i = 1`. The final point is
/// never written and the final gap is never examined.
///
/// Thresholds are not validated here. A negative or `NaN` threshold inserts
/// nothing. A gap that would need more than [`MAX_STEPS_PER_GAP`] steps,
/// including any non-empty gap against a zero threshold, is reported as
/// [`Error::UnboundedInterpolation`].
pub fn compensated_rows(points: &[TrackPoint], max_distance_m: f64) -> Result<Vec<FootprintRow>> {
    let Some(last) = points.len().checked_sub(1) else {
        return Ok(Vec::new());
    };

    let mut rows = Vec::with_capacity(points.len());
    for i in 0..last {
        let curr = &points[i];

        if i >= 1 {
            let prev = &points[i - 1];
            let distance = haversine_distance(prev.lat, prev.lon, curr.lat, curr.lon);

            if distance > max_distance_m {
                let steps = (distance / max_distance_m).ceil();
                if steps > MAX_STEPS_PER_GAP {
                    return Err(Error::UnboundedInterpolation {
                        distance,
                        max_distance: max_distance_m,
                    });
                }

                let steps = steps as u64;
                trace!(index = i, distance, steps, "filling gap");
                for step in 1..steps {
                    let ratio = step as f64 / steps as f64;
                    rows.push(FootprintRow::interpolated(prev, curr, ratio, distance));
                }
            }
        }

        rows.push(FootprintRow::recorded(curr));
    }

    Ok(rows)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnding {
    /// Every row, the last included, ends with `\n`.
    EveryRow,
    /// Rows are separated by `\n`; the last one has no terminator.
    BetweenRows,
}

/// Writes the header line followed by `rows`.
pub fn serialize(rows: &[FootprintRow], ending: LineEnding) -> Vec<u8> {
    let mut out = String::with_capacity(HEADER.len() + 1 + rows.len() * 96);
    out.push_str(HEADER);
    out.push('\n');

    for (i, row) in rows.iter().enumerate() {
        if ending == LineEnding::BetweenRows && i > 0 {
            out.push('\n');
        }
        out.push_str(&row.to_string());
        if ending == LineEnding::EveryRow {
            out.push('\n');
        }
    }

    out.into_bytes()
}

fn lerp(from: f64, to: f64, ratio: f64) -> f64 {
    from + ratio * (to - from)
}

// Ties go toward positive infinity.
fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

// Six decimals with exact ties rounded away from zero. `{:.6}` alone sends
// ties to even. A tie is only representable when `|value| * 128` is odd.
fn fixed(value: f64) -> String {
    let magnitude = value.abs();
    let scaled = magnitude * 128.0;
    let digits = if scaled.fract() == 0.0 && scaled % 2.0 == 1.0 {
        drop_tie_digit(&format!("{magnitude:.7}"))
    } else {
        format!("{magnitude:.6}")
    };

    if value < 0.0 {
        format!("-{digits}")
    } else {
        digits
    }
}

// Drops the trailing `5` and carries one into the remaining digits.
fn drop_tie_digit(digits: &str) -> String {
    let mut bytes = digits.as_bytes().to_vec();
    bytes.pop();
    for byte in bytes.iter_mut().rev() {
        match *byte {
            b'.' => continue,
            b'9' => *byte = b'0',
            _ => {
                *byte += 1;
                return bytes.into_iter().map(char::from).collect();
            }
        }
    }
    std::iter::once('1')
        .chain(bytes.into_iter().map(char::from))
        .collect()
}

fn fixed_or_zero(value: Option<f64>) -> String {
    value.map(fixed).unwrap_or_else(|| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn make_track_point(lat: f64, lon: f64, time_str: &str) -> TrackPoint {
        TrackPoint::new(
            lat,
            lon,
            OffsetDateTime::parse(
                time_str,
                &time::format_description::well_known::Iso8601::DEFAULT,
            )
            .unwrap(),
        )
    }

    fn equator_track() -> Vec<TrackPoint> {
        vec![
            make_track_point(0.0, 0.0, "2023-01-01T10:00:00Z")
                .with_elevation(10.0)
                .with_speed(2.0),
            make_track_point(0.0, 0.001, "2023-01-01T10:00:30Z")
                .with_elevation(40.0)
                .with_speed(4.0),
            make_track_point(0.0, 0.002, "2023-01-01T10:01:00Z"),
        ]
    }

    fn interpolated_count(rows: &[FootprintRow]) -> usize {
        rows.iter()
            .filter(|row| row.kind == RowKind::Interpolated)
            .count()
    }

    #[test]
    fn test_recorded_row_format() {
        let point = make_track_point(37.7749, -122.4194, "2023-01-01T10:00:00Z").with_elevation(100.0);
        assert_eq!(
            FootprintRow::recorded(&point).to_string(),
            "1672567200,1,-122.4194,37.7749,0.000000,0.000000,0,0.000000,0,0,100.000000"
        );

        let point = point.with_speed(0.0);
        assert_eq!(
            FootprintRow::recorded(&point).to_string(),
            "1672567200,1,-122.4194,37.7749,0.000000,0.000000,0.000000,0.000000,0,0,100.000000"
        );
    }

    #[test]
    fn test_recorded_row_echoes_coordinate_text() {
        let mut point = make_track_point(31.23, 121.47, "2023-01-01T10:00:00Z");
        point.lat_text = "31.2300".to_string();
        point.lon_text = "121.4700".to_string();

        let row = FootprintRow::recorded(&point);
        assert_eq!(row.latitude, "31.2300");
        assert_eq!(row.longitude, "121.4700");
    }

    #[test]
    fn test_plain_rows_one_per_point() {
        let points = equator_track();
        let rows = plain_rows(&points);
        assert_eq!(rows.len(), points.len());
        assert_eq!(interpolated_count(&rows), 0);
        assert!(plain_rows(&[]).is_empty());
    }

    #[test]
    fn test_compensated_rows_fill_gap() {
        let rows = compensated_rows(&equator_track(), 50.0).unwrap();

        // ~111m gap with a 50m limit: ceil(111.19 / 50) - 1 = 2 inserted rows
        let lines: Vec<String> = rows.iter().map(ToString::to_string).collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(
            lines[0],
            "1672567200,1,0,0,0.000000,0.000000,2.000000,0.000000,0,0,10.000000"
        );
        assert!(lines[1].starts_with(
            "1672567210,1,0.000333,0.000000,0.000000,0.000000,2.666667,111.19"
        ));
        assert!(lines[1].ends_with(",0,0,20.000000"));
        assert!(lines[2].starts_with(
            "1672567220,1,0.000667,0.000000,0.000000,0.000000,3.333333,111.19"
        ));
        assert!(lines[2].ends_with(",0,0,30.000000"));
        assert_eq!(
            lines[3],
            "1672567230,1,0.001,0,0.000000,0.000000,4.000000,0.000000,0,0,40.000000"
        );
    }

    #[test]
    fn test_compensated_rows_distance_is_unformatted() {
        let points = equator_track();
        let rows = compensated_rows(&points, 50.0).unwrap();
        let expected = haversine_distance(0.0, 0.0, 0.0, 0.001);
        assert_eq!(rows[1].distance, expected.to_string());
        assert_eq!(rows[1].distance.parse::<f64>().unwrap(), expected);
    }

    #[test]
    fn test_compensated_rows_drop_last_point() {
        let points = equator_track();
        let rows = compensated_rows(&points, 1000.0).unwrap();
        assert_eq!(rows.len(), points.len() - 1);
        assert!(rows.iter().all(|row| row.longitude != "0.002"));
    }

    #[test]
    fn test_compensated_rows_short_tracks() {
        let points = equator_track();
        assert!(compensated_rows(&[], 50.0).unwrap().is_empty());
        assert!(compensated_rows(&points[..1], 50.0).unwrap().is_empty());

        // Two points: only the first is written and the gap is never examined
        let rows = compensated_rows(&points[..2], 50.0).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kind, RowKind::Recorded);
    }

    #[test]
    fn test_compensated_rows_gap_within_limit() {
        let rows = compensated_rows(&equator_track(), 200.0).unwrap();
        assert_eq!(interpolated_count(&rows), 0);

        // Exactly at the limit is not a gap
        let distance = haversine_distance(0.0, 0.0, 0.0, 0.001);
        let rows = compensated_rows(&equator_track(), distance).unwrap();
        assert_eq!(interpolated_count(&rows), 0);
    }

    #[test]
    fn test_compensated_rows_insert_count() {
        let points = equator_track();
        let distance = haversine_distance(0.0, 0.0, 0.0, 0.001);
        for max in [10.0, 25.0, 37.0, 60.0, 111.0] {
            let rows = compensated_rows(&points, max).unwrap();
            let expected = (distance / max).ceil() as usize - 1;
            assert_eq!(interpolated_count(&rows), expected, "max distance {max}");
        }
    }

    #[test]
    fn test_compensated_rows_are_ordered() {
        let rows = compensated_rows(&equator_track(), 7.5).unwrap();
        let times: Vec<i64> = rows.iter().map(|r| r.data_time.parse().unwrap()).collect();
        let lons: Vec<f64> = rows.iter().map(|r| r.longitude.parse().unwrap()).collect();
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
        assert!(lons.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(rows.first().unwrap().kind, RowKind::Recorded);
        assert_eq!(rows.last().unwrap().kind, RowKind::Recorded);
    }

    #[test]
    fn test_interpolated_midpoint_is_mean() {
        let points = vec![
            make_track_point(10.0, 20.0, "2023-01-01T10:00:00Z")
                .with_elevation(100.0)
                .with_speed(1.5),
            make_track_point(10.0006, 20.0006, "2023-01-01T10:00:21Z")
                .with_elevation(107.0)
                .with_speed(4.5),
            make_track_point(10.0012, 20.0012, "2023-01-01T10:00:42Z"),
        ];

        // ~93m gap with a 60m limit: one row at ratio 0.5
        let rows = compensated_rows(&points, 60.0).unwrap();
        assert_eq!(rows.len(), 3);
        let mid = &rows[1];
        assert_eq!(mid.kind, RowKind::Interpolated);

        let value = |s: &str| s.parse::<f64>().unwrap();
        assert!((value(&mid.latitude) - 10.0003).abs() < 1e-6);
        assert!((value(&mid.longitude) - 20.0003).abs() < 1e-6);
        assert!((value(&mid.altitude) - 103.5).abs() < 1e-6);
        assert!((value(&mid.speed) - 3.0).abs() < 1e-6);
        // 10.5s rounds up
        assert_eq!(mid.data_time, "1672567211");
    }

    #[test]
    fn test_interpolation_defaults_missing_values_to_zero() {
        let from = make_track_point(0.0, 0.0, "2023-01-01T10:00:00Z");
        let to = make_track_point(0.0, 0.001, "2023-01-01T10:00:10Z").with_elevation(8.0);

        let row = FootprintRow::interpolated(&from, &to, 0.25, 111.0);
        assert_eq!(row.altitude, "2.000000");
        assert_eq!(row.speed, "0.000000");
        assert_eq!(row.distance, "111");
    }

    #[test]
    fn test_compensated_rows_non_positive_threshold() {
        let points = equator_track();

        let rows = compensated_rows(&points, -10.0).unwrap();
        assert_eq!(interpolated_count(&rows), 0);
        assert_eq!(rows.len(), 2);

        let rows = compensated_rows(&points, f64::NAN).unwrap();
        assert_eq!(interpolated_count(&rows), 0);

        let err = compensated_rows(&points, 0.0).unwrap_err();
        assert!(matches!(err, Error::UnboundedInterpolation { .. }));
    }

    #[test]
    fn test_compensated_rows_tiny_threshold_is_bounded() {
        // ~111 m gap at 1e-5 m would need ~1.1e7 steps
        let err = compensated_rows(&equator_track(), 1e-5).unwrap_err();
        assert!(matches!(err, Error::UnboundedInterpolation { .. }));
        assert_eq!(err.kind(), crate::ErrorKind::Validation);

        // ~111 m gap at 1e-3 m stays under the limit
        let rows = compensated_rows(&equator_track(), 1e-3).unwrap();
        assert_eq!(rows.len(), 111_195 + 1);
    }

    #[test]
    fn test_compensated_rows_zero_threshold_without_gap() {
        let points = vec![
            make_track_point(1.0, 1.0, "2023-01-01T10:00:00Z"),
            make_track_point(1.0, 1.0, "2023-01-01T10:00:05Z"),
            make_track_point(1.0, 1.0, "2023-01-01T10:00:10Z"),
        ];
        let rows = compensated_rows(&points, 0.0).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_serialize_every_row() {
        let rows = plain_rows(&equator_track());
        let csv = String::from_utf8(serialize(&rows, LineEnding::EveryRow)).unwrap();

        let mut expected = format!("{HEADER}\n");
        for row in &rows {
            expected.push_str(&format!("{row}\n"));
        }
        assert_eq!(csv, expected);
    }

    #[test]
    fn test_serialize_between_rows() {
        let rows = plain_rows(&equator_track());
        let csv = String::from_utf8(serialize(&rows, LineEnding::BetweenRows)).unwrap();

        let body: Vec<String> = rows.iter().map(ToString::to_string).collect();
        assert_eq!(csv, format!("{HEADER}\n{}", body.join("\n")));
    }

    #[test]
    fn test_serialize_empty() {
        for ending in [LineEnding::EveryRow, LineEnding::BetweenRows] {
            assert_eq!(serialize(&[], ending), format!("{HEADER}\n").into_bytes());
        }
    }

    #[test]
    fn test_fixed_rounds_ties_away_from_zero() {
        assert_eq!(fixed(1.0078125), "1.007813");
        assert_eq!(fixed(0.0078125), "0.007813");
        assert_eq!(fixed(-1.0078125), "-1.007813");
        assert_eq!(fixed(127.9921875), "127.992188");
        assert_eq!(fixed(2.5), "2.500000");
        assert_eq!(fixed(0.1), "0.100000");
        assert_eq!(fixed(-3.25), "-3.250000");
        assert_eq!(fixed(0.0), "0.000000");
    }

    #[test]
    fn test_recorded_row_altitude_tie() {
        let point = make_track_point(0.0, 0.0, "2023-01-01T10:00:00Z").with_elevation(1.0078125);
        let row = FootprintRow::recorded(&point);
        assert_eq!(row.altitude, "1.007813");
    }

    #[test]
    fn test_round_half_up() {
        assert_eq!(round_half_up(10.5), 11);
        assert_eq!(round_half_up(10.49), 10);
        assert_eq!(round_half_up(-0.5), 0);
        assert_eq!(round_half_up(-1.5), -1);
    }
}
