use crate::TrackPoint;
use crate::error::{Error, Result};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use time::format_description::well_known::Iso8601;
use time::{OffsetDateTime, PrimitiveDateTime};
use tracing::{debug, warn};

/// Reads the points of the first `trkseg` of the first `trk` in a GPX document.
///
/// The document must have a `gpx` root containing at least one `trk` with at
/// least one `trkseg`. An empty segment is not an error. Element names are
/// compared by local name, so namespace prefixes are ignored.
pub fn parse_track(input: &[u8]) -> Result<Vec<TrackPoint>> {
    let mut reader = Reader::from_reader(input);
    let mut buf = Vec::new();
    let mut track = TrackReader::default();

    loop {
        let position = reader.buffer_position() as u64;
        match reader.read_event_into(&mut buf) {
            Err(e) => {
                return Err(Error::Xml {
                    position: reader.buffer_position() as u64,
                    message: e.to_string(),
                });
            }
            Ok(Event::Eof) => break,
            Ok(Event::Start(ref e)) => track.open(e, position)?,
            Ok(Event::Empty(ref e)) => {
                track.open(e, position)?;
                track.close(position)?;
            }
            Ok(Event::End(_)) => track.close(position)?,
            Ok(Event::Text(ref e)) => track.text(e, position)?,
            Ok(Event::CData(ref e)) => track.text(e, position)?,
            Ok(_) => {}
        }

        buf.clear();
    }

    track.finish(reader.buffer_position() as u64)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Time,
    Elevation,
    Speed,
}

impl Field {
    fn from_name(name: &[u8]) -> Option<Field> {
        match name {
            b"time" => Some(Field::Time),
            b"ele" => Some(Field::Elevation),
            b"speed" => Some(Field::Speed),
            _ => None,
        }
    }
}

/// Raw text collected for one `trkpt` before it is validated.
#[derive(Debug, Default)]
struct PointBuilder {
    lat: Option<String>,
    lon: Option<String>,
    time: Option<String>,
    elevation: Option<String>,
    speed: Option<String>,
}

impl PointBuilder {
    fn from_attributes(start: &BytesStart, position: u64) -> Result<Self> {
        let mut builder = PointBuilder::default();

        for attr in start.attributes() {
            let attr = attr.map_err(|e| Error::Xml {
                position,
                message: e.to_string(),
            })?;
            let slot = match attr.key.local_name().as_ref() {
                b"lat" => &mut builder.lat,
                b"lon" => &mut builder.lon,
                _ => continue,
            };
            let value = std::str::from_utf8(&attr.value).map_err(|e| Error::Xml {
                position,
                message: e.to_string(),
            })?;
            *slot = Some(value.trim().to_string());
        }

        Ok(builder)
    }

    fn field_mut(&mut self, field: Field) -> &mut Option<String> {
        match field {
            Field::Time => &mut self.time,
            Field::Elevation => &mut self.elevation,
            Field::Speed => &mut self.speed,
        }
    }

    fn build(self, index: usize) -> Result<TrackPoint> {
        let lat_text = self.lat.ok_or(Error::MissingAttribute {
            index,
            attribute: "lat",
        })?;
        let lon_text = self.lon.ok_or(Error::MissingAttribute {
            index,
            attribute: "lon",
        })?;
        let lat = parse_number(index, "lat", &lat_text)?;
        let lon = parse_number(index, "lon", &lon_text)?;

        let time_text = non_empty(self.time).ok_or(Error::MissingTime { index })?;
        let time = parse_time(&time_text).ok_or(Error::InvalidTime {
            index,
            value: time_text,
        })?;

        let elevation = non_empty(self.elevation)
            .map(|text| parse_number(index, "ele", &text))
            .transpose()?;
        let speed = non_empty(self.speed)
            .map(|text| parse_number(index, "speed", &text))
            .transpose()?;

        Ok(TrackPoint {
            lat,
            lon,
            time,
            elevation,
            speed,
            lat_text,
            lon_text,
        })
    }
}

/// Event-driven state for [`parse_track`]. `stack` holds the local names of
/// the currently open elements, so `stack.len()` is the nesting depth.
#[derive(Debug, Default)]
struct TrackReader {
    stack: Vec<Vec<u8>>,
    root_seen: bool,
    tracks: usize,
    segments: usize,
    in_first_segment: bool,
    current: Option<PointBuilder>,
    field: Option<Field>,
    points: Vec<TrackPoint>,
}

impl TrackReader {
    fn open(&mut self, start: &BytesStart, position: u64) -> Result<()> {
        let name = start.local_name().as_ref().to_vec();

        match self.stack.len() {
            0 => {
                if self.root_seen {
                    return Err(Error::Xml {
                        position,
                        message: "more than one root element".to_string(),
                    });
                }
                if name != b"gpx" {
                    return Err(Error::MissingElement("gpx"));
                }
                self.root_seen = true;
            }
            1 if name == b"trk" => self.tracks += 1,
            2 if name == b"trkseg" && self.stack[1] == b"trk" => {
                if self.tracks == 1 {
                    self.segments += 1;
                    self.in_first_segment = self.segments == 1;
                }
            }
            3 if name == b"trkpt" && self.in_first_segment && self.stack[2] == b"trkseg" => {
                self.current = Some(PointBuilder::from_attributes(start, position)?);
            }
            4 if self.current.is_some() && self.stack[3] == b"trkpt" => {
                self.field = Field::from_name(&name);
                if let (Some(field), Some(point)) = (self.field, self.current.as_mut()) {
                    // A repeated child element replaces the earlier value.
                    *point.field_mut(field) = Some(String::new());
                }
            }
            _ => {}
        }

        self.stack.push(name);
        Ok(())
    }

    fn close(&mut self, position: u64) -> Result<()> {
        let Some(name) = self.stack.pop() else {
            return Err(Error::Xml {
                position,
                message: "closing tag without a matching opening tag".to_string(),
            });
        };

        match self.stack.len() {
            4 => self.field = None,
            3 if name == b"trkpt" => {
                if let Some(builder) = self.current.take() {
                    let point = builder.build(self.points.len())?;
                    self.points.push(point);
                }
            }
            2 if name == b"trkseg" => self.in_first_segment = false,
            _ => {}
        }

        Ok(())
    }

    fn text(&mut self, bytes: &[u8], position: u64) -> Result<()> {
        if self.stack.len() != 5 {
            return Ok(());
        }
        let (Some(field), Some(point)) = (self.field, self.current.as_mut()) else {
            return Ok(());
        };

        let text = std::str::from_utf8(bytes).map_err(|e| Error::Xml {
            position,
            message: e.to_string(),
        })?;
        point
            .field_mut(field)
            .get_or_insert_with(String::new)
            .push_str(text);
        Ok(())
    }

    fn finish(self, position: u64) -> Result<Vec<TrackPoint>> {
        if let Some(open) = self.stack.last() {
            return Err(Error::Xml {
                position,
                message: format!(
                    "unexpected end of document, <{}> is not closed",
                    String::from_utf8_lossy(open)
                ),
            });
        }
        if !self.root_seen {
            return Err(Error::MissingElement("gpx"));
        }
        if self.tracks == 0 {
            return Err(Error::MissingElement("trk"));
        }
        if self.segments == 0 {
            return Err(Error::MissingElement("trkseg"));
        }

        if self.tracks > 1 {
            warn!(tracks = self.tracks, "only the first track is converted");
        }
        if self.segments > 1 {
            warn!(
                segments = self.segments,
                "only the first segment of the track is converted"
            );
        }
        debug!(points = self.points.len(), "read track segment");

        Ok(self.points)
    }
}

fn non_empty(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

// `f64::from_str` also takes `NaN` and `inf`, which are not GPX decimals.
fn parse_number(index: usize, field: &'static str, text: &str) -> Result<f64> {
    text.parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| Error::InvalidNumber {
            index,
            field,
            value: text.to_string(),
        })
}

/// ISO-8601, with timestamps lacking an offset taken as UTC.
fn parse_time(text: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(text, &Iso8601::DEFAULT)
        .or_else(|_| PrimitiveDateTime::parse(text, &Iso8601::DEFAULT).map(|t| t.assume_utc()))
        .ok()
}
