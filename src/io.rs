/// Reading and writing of PEM text files
use std::path::Path;

use ndarray::Array1;

use crate::channels::ChannelTimeTable;
use crate::data::{Component, PemData, Reading};
use crate::error::{PemError, Result};
use crate::geometry::{GpsPoint, HoleGeometry, LineGps, LoopGps, Segment, StationGps};
use crate::pem::{Header, PemFile, SurveyType, Tag};
use crate::rad::RadTool;
use crate::station;

const BOUNDARIES_PER_LINE: usize = 6;
const VALUES_PER_LINE: usize = 7;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// A line together with its (1-based) line number
type NumberedLine<'a> = (usize, &'a str);

pub fn load_pem(filepath: &Path) -> Result<PemFile> {
    let content = std::fs::read_to_string(filepath)?;
    parse_pem(&content)
}

pub fn save_pem(pem: &PemFile, filepath: &Path) -> Result<()> {
    std::fs::write(filepath, serialize_pem(pem))?;
    Ok(())
}

fn parse_number<T: std::str::FromStr>(token: &str, name: &str, line: usize) -> Result<T> {
    token
        .trim()
        .parse::<T>()
        .map_err(|_| PemError::at_line(line, &format!("Could not parse {name}: {token:?}")))
}

fn parse_numbers(tokens: &[&str], name: &str, line: usize) -> Result<Vec<f64>> {
    tokens.iter().map(|t| parse_number::<f64>(t, name, line)).collect()
}

/// Split a "<TAG> value" line into its tag and value
fn split_tag(line: &str) -> Option<(&str, &str)> {
    let rest = line.trim().strip_prefix('<')?;
    let (tag, value) = rest.split_once('>')?;
    Some((tag.trim(), value.trim()))
}

/// Whether a tag is a GPS tag of the given letter followed by digits, e.g. "L00" or "P12"
fn is_gps_tag(tag: &str, letter: char) -> bool {
    tag.strip_prefix(letter)
        .map(|digits| !digits.is_empty() & digits.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}

fn parse_gps_point(tokens: &[&str], line: usize) -> Result<GpsPoint> {
    if tokens.len() < 4 {
        return Err(PemError::at_line(
            line,
            &format!("Expected easting, northing, elevation and units, got {} values", tokens.len()),
        ));
    }
    Ok(GpsPoint {
        easting: parse_number(tokens[0], "easting", line)?,
        northing: parse_number(tokens[1], "northing", line)?,
        elevation: parse_number(tokens[2], "elevation", line)?,
        units: parse_number(tokens[3], "units", line)?,
    })
}

fn parse_segment(tokens: &[&str], line: usize) -> Result<Segment> {
    if tokens.len() < 5 {
        return Err(PemError::at_line(
            line,
            &format!("Expected azimuth, dip, length, units and depth, got {} values", tokens.len()),
        ));
    }
    Ok(Segment {
        azimuth: parse_number(tokens[0], "azimuth", line)?,
        dip: parse_number(tokens[1], "dip", line)?,
        length: parse_number(tokens[2], "segment length", line)?,
        units: parse_number(tokens[3], "units", line)?,
        depth: parse_number(tokens[4], "depth", line)?,
    })
}

/// Sort the "<Pxx>" lines into a surface line or a borehole collar and segments
fn parse_p_lines(lines: &[NumberedLine], borehole: bool) -> Result<(LineGps, HoleGeometry)> {
    let mut line_gps = LineGps::default();
    let mut hole = HoleGeometry::default();

    for (i, (line_number, value)) in lines.iter().enumerate() {
        let tokens = value.split_whitespace().collect::<Vec<&str>>();
        if tokens.is_empty() {
            continue;
        }
        match (borehole, i) {
            (true, 0) => hole.collar = Some(parse_gps_point(&tokens, *line_number)?),
            (true, _) => hole.segments.push(parse_segment(&tokens, *line_number)?),
            (false, _) => {
                let label = tokens
                    .get(4)
                    .ok_or_else(|| PemError::at_line(*line_number, "Line GPS point without a station"))?;
                line_gps.points.push(StationGps {
                    point: parse_gps_point(&tokens, *line_number)?,
                    station: label.to_string(),
                    station_number: station::convert(label)
                        .map_err(|e| PemError::at_line(*line_number, &e.to_string()))?,
                });
            }
        };
    }
    Ok((line_gps, hole))
}

fn parse_header(lines: &[NumberedLine], tilde_line: usize) -> Result<Header> {
    let line = |i: usize| {
        lines
            .get(i)
            .copied()
            .ok_or_else(|| PemError::at_line(tilde_line + i + 1, "Missing header line"))
    };
    let text = |i: usize| line(i).map(|(_, text)| text.trim().to_string());

    let (survey_number, survey_line) = line(5)?;
    let survey = survey_line.split_whitespace().collect::<Vec<&str>>();
    if survey.len() < 7 {
        return Err(PemError::at_line(
            survey_number,
            &format!("Expected 7 survey parameters, got {}", survey.len()),
        ));
    }

    let (receiver_number, receiver_line) = line(6)?;
    let receiver = receiver_line.split_whitespace().collect::<Vec<&str>>();
    if receiver.len() < 7 {
        return Err(PemError::at_line(
            receiver_number,
            &format!("Expected at least 7 receiver parameters, got {}", receiver.len()),
        ));
    }

    Ok(Header {
        client: text(0)?,
        grid: text(1)?,
        line_name: text(2)?,
        loop_name: text(3)?,
        date: text(4)?,
        survey_code: survey[0].to_string(),
        units: survey[1].to_string(),
        sync: survey[2].to_string(),
        timebase: parse_number(survey[3], "timebase", survey_number)?,
        ramp: parse_number(survey[4], "ramp", survey_number)?,
        number_of_channels: parse_number(survey[5], "number of channels", survey_number)?,
        number_of_readings: parse_number(survey[6], "number of readings", survey_number)?,
        receiver_number: receiver[0].to_string(),
        software_version: receiver[1].to_string(),
        software_date: receiver[2].to_string(),
        file_name: receiver[3].to_string(),
        normalized: receiver[4].to_string(),
        primary_field_value: receiver[5].to_string(),
        coil_area: parse_number(receiver[6], "coil area", receiver_number)?,
        loop_polarity: receiver.get(7).map(|p| p.to_string()),
    })
}

/// Parse one reading block: the reading header, the RAD tool line and the values
fn parse_reading(block: &[NumberedLine], table: &ChannelTimeTable) -> Result<Reading> {
    let (header_number, header_line) = block[0];
    let tokens = header_line.split_whitespace().collect::<Vec<&str>>();
    if tokens.len() < 10 {
        return Err(PemError::at_line(
            header_number,
            &format!("Expected at least 10 reading header values, got {}", tokens.len()),
        ));
    }

    let station_number =
        station::convert(tokens[0]).map_err(|e| PemError::at_line(header_number, &e.to_string()))?;
    let component = tokens[1]
        .parse::<Component>()
        .map_err(|e| PemError::at_line(header_number, &e.to_string()))?;
    let reading_index = tokens[2]
        .strip_prefix(|c: char| c.eq_ignore_ascii_case(&'R'))
        .ok_or_else(|| PemError::at_line(header_number, &format!("Invalid reading index: {:?}", tokens[2])))
        .and_then(|index| parse_number::<u32>(index, "reading index", header_number))?;
    let timestamp = match tokens.get(10) {
        Some(token) => Some(
            chrono::NaiveDateTime::parse_from_str(token, TIMESTAMP_FORMAT)
                .map_err(|e| PemError::at_line(header_number, &format!("Invalid timestamp {token:?}: {e}")))?,
        ),
        None => None,
    };

    let (rad_number, rad_line) = block
        .get(1)
        .copied()
        .ok_or_else(|| PemError::at_line(header_number, "Reading without a RAD tool line"))?;
    let rad = RadTool::from_line(rad_line).map_err(|e| PemError::at_line(rad_number, &e.to_string()))?;

    let mut values: Vec<f64> = Vec::new();
    for (line_number, line) in &block[2..] {
        values.extend(parse_numbers(
            &line.split_whitespace().collect::<Vec<&str>>(),
            "reading value",
            *line_number,
        )?);
    }
    if values.len() != table.len() {
        return Err(PemError::at_line(
            header_number,
            &format!(
                "Reading at station {} ({}) has {} values but there are {} channels",
                tokens[0],
                component,
                values.len(),
                table.len()
            ),
        ));
    }

    Ok(Reading {
        station: tokens[0].to_string(),
        station_number,
        component,
        reading_index,
        gain: parse_number(tokens[3], "gain", header_number)?,
        rx_type: tokens[4].to_string(),
        zts: parse_number(tokens[5], "ZTS", header_number)?,
        coil_delay: parse_number(tokens[6], "coil delay", header_number)?,
        stacks: parse_number(tokens[7], "number of stacks", header_number)?,
        readings_per_set: parse_number(tokens[8], "readings per set", header_number)?,
        reading_number: parse_number(tokens[9], "reading number", header_number)?,
        rad,
        deleted: false,
        overload: false,
        timestamp,
        values: Array1::from_vec(values),
    })
}

/// Parse the text of a PEM file
///
/// The file consists of a tag section, a "~" line, seven header lines, the channel boundaries,
/// a "$" line and the reading blocks separated by blank lines. Any structural error aborts the
/// whole parse.
pub fn parse_pem(text: &str) -> Result<PemFile> {
    let lines = text
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim_end()))
        .collect::<Vec<NumberedLine>>();

    let tilde = lines
        .iter()
        .position(|(_, line)| line.trim() == "~")
        .ok_or_else(|| PemError::Parse("No '~' line after the tag section".into()))?;

    let mut tags: Vec<Tag> = Vec::new();
    let mut notes: Vec<String> = Vec::new();
    let mut loop_gps = LoopGps::default();
    let mut p_lines: Vec<NumberedLine> = Vec::new();

    for (line_number, line) in &lines[..tilde] {
        if line.trim().is_empty() {
            continue;
        }
        match split_tag(line) {
            Some((tag, value)) if is_gps_tag(tag, 'L') => loop_gps.points.push(parse_gps_point(
                &value.split_whitespace().collect::<Vec<&str>>(),
                *line_number,
            )?),
            Some((tag, value)) if is_gps_tag(tag, 'P') => p_lines.push((*line_number, value)),
            Some((tag, _)) if (tag == "GEN") | tag.starts_with("HE") => notes.push(line.trim().to_string()),
            Some((tag, value)) => tags.push(Tag {
                name: tag.to_string(),
                value: value.to_string(),
            }),
            None => notes.push(line.trim().to_string()),
        };
    }

    let tilde_line = lines[tilde].0;
    let header = parse_header(&lines[tilde + 1..], tilde_line)?;
    let survey_type = SurveyType::from_code(&header.survey_code);
    let (line_gps, hole) = parse_p_lines(&p_lines, survey_type.is_borehole())?;

    // The channel boundaries run from the line after the header to the "$" line.
    let body = &lines[(tilde + 8).min(lines.len())..];
    let dollar = body
        .iter()
        .position(|(_, line)| line.trim() == "$")
        .ok_or_else(|| PemError::Parse("No '$' line after the channel times".into()))?;

    let mut boundaries: Vec<f64> = Vec::new();
    for (line_number, line) in &body[..dollar] {
        boundaries.extend(parse_numbers(
            &line.split_whitespace().collect::<Vec<&str>>(),
            "channel time",
            *line_number,
        )?);
    }
    let table = match boundaries.is_empty() {
        true => ChannelTimeTable::synthesize(header.timebase, header.number_of_channels, header.ramp)?,
        false => ChannelTimeTable::from_boundaries(&boundaries)?,
    };
    if table.len() != header.number_of_channels + 1 {
        return Err(PemError::Parse(format!(
            "The header gives {} channels but the channel times give {}",
            header.number_of_channels,
            table.len().saturating_sub(1)
        )));
    }

    let mut readings: Vec<Reading> = Vec::new();
    let mut block: Vec<NumberedLine> = Vec::new();
    for numbered in body[dollar + 1..].iter().chain([(0, "")].iter()) {
        if numbered.1.trim().is_empty() {
            if !block.is_empty() {
                readings.push(parse_reading(&block, &table)?);
                block.clear();
            }
            continue;
        }
        block.push(*numbered);
    }

    let split = table.count_removable() == 0;
    Ok(PemFile {
        header,
        tags,
        notes,
        loop_gps,
        line_gps,
        hole,
        table,
        data: PemData::new(readings, split),
        log: Vec::new(),
    })
}

/// Format a channel value as "d.dddddE+xx"
pub fn format_value(value: f64) -> String {
    let formatted = format!("{value:.5e}");
    match formatted.split_once('e') {
        Some((mantissa, exponent)) => match exponent.parse::<i32>() {
            Ok(exponent) => format!("{mantissa}E{exponent:+03}"),
            Err(_) => formatted,
        },
        None => formatted,
    }
}

fn reading_lines(reading: &Reading) -> Vec<String> {
    let mut header = format!(
        "{} {} R{} {} {} {} {} {} {} {}",
        reading.station,
        reading.component,
        reading.reading_index,
        reading.gain,
        reading.rx_type,
        reading.zts,
        reading.coil_delay,
        reading.stacks,
        reading.readings_per_set,
        reading.reading_number
    );
    if let Some(timestamp) = reading.timestamp {
        header.push_str(&format!(" {}", timestamp.format(TIMESTAMP_FORMAT)));
    }

    let mut lines = vec![header, reading.rad.to_line()];
    let values = reading.values.iter().map(|v| format_value(*v)).collect::<Vec<String>>();
    lines.extend(values.chunks(VALUES_PER_LINE).map(|chunk| chunk.join(" ")));
    lines
}

/// Write a file in the canonical layout. Deleted readings are left out.
pub fn serialize_pem(pem: &PemFile) -> String {
    let mut lines: Vec<String> = Vec::new();

    for tag in &pem.tags {
        lines.push(match tag.value.is_empty() {
            true => format!("<{}>", tag.name),
            false => format!("<{}> {}", tag.name, tag.value),
        });
    }
    for (i, p) in pem.loop_gps.points.iter().enumerate() {
        lines.push(format!(
            "<L{i:02}> {:.2} {:.2} {:.2} {}",
            p.easting, p.northing, p.elevation, p.units
        ));
    }
    for (i, p) in pem.line_gps.points.iter().enumerate() {
        lines.push(format!(
            "<P{i:02}> {:.2} {:.2} {:.2} {} {}",
            p.point.easting, p.point.northing, p.point.elevation, p.point.units, p.station
        ));
    }
    if let Some(collar) = &pem.hole.collar {
        lines.push(format!(
            "<P00> {:.2} {:.2} {:.2} {}",
            collar.easting, collar.northing, collar.elevation, collar.units
        ));
    }
    for (i, s) in pem.hole.segments.iter().enumerate() {
        lines.push(format!(
            "<P{:02}> {:.2} {:.2} {:.2} {} {:.2}",
            i + 1,
            s.azimuth,
            s.dip,
            s.length,
            s.units,
            s.depth
        ));
    }
    lines.extend(pem.notes.iter().cloned());

    let h = &pem.header;
    lines.push("~".to_string());
    lines.extend([&h.client, &h.grid, &h.line_name, &h.loop_name, &h.date].iter().map(|s| s.to_string()));
    lines.push(format!(
        "{} {} {} {} {} {} {}",
        h.survey_code,
        h.units,
        h.sync,
        h.timebase,
        h.ramp,
        h.number_of_channels,
        pem.data.active().count()
    ));
    let mut receiver = format!(
        "{} {} {} {} {} {} {}",
        h.receiver_number,
        h.software_version,
        h.software_date,
        h.file_name,
        h.normalized,
        h.primary_field_value,
        h.coil_area
    );
    if let Some(polarity) = &h.loop_polarity {
        receiver.push_str(&format!(" {polarity}"));
    }
    lines.push(receiver);

    let boundaries = pem
        .table
        .boundaries()
        .iter()
        .map(|b| format!("{b:.6}"))
        .collect::<Vec<String>>();
    lines.extend(boundaries.chunks(BOUNDARIES_PER_LINE).map(|chunk| chunk.join(" ")));
    lines.push("$".to_string());

    for reading in pem.data.active() {
        lines.extend(reading_lines(reading));
        lines.push(String::new());
    }

    let mut text = lines.join("\n");
    text.push('\n');
    text
}

/// Export the active readings with their coordinates as a whitespace separated table
///
/// Surface stations are placed along the line GPS and borehole stations along the hole, with
/// the station number as the depth.
pub fn export_xyz(pem: &PemFile) -> Result<String> {
    let n_channels = pem.table.len();
    let mut lines = vec![format!(
        "easting northing elevation station component {}",
        (0..n_channels).map(|i| format!("ch{i}")).collect::<Vec<String>>().join(" ")
    )];

    for reading in pem.data.active() {
        let [easting, northing, elevation] = match pem.is_borehole() {
            true => pem.hole.position_at(reading.station_number as f64)?,
            false => pem.line_gps.coord_at_station(reading.station_number).ok_or_else(|| {
                PemError::MissingGeometry(format!("No line GPS to place station {}", reading.station))
            })?,
        };
        lines.push(format!(
            "{easting:.2} {northing:.2} {elevation:.2} {} {} {}",
            reading.station_number,
            reading.component,
            reading.values.iter().map(|v| format_value(*v)).collect::<Vec<String>>().join(" ")
        ));
    }
    Ok(lines.join("\n") + "\n")
}

#[cfg(test)]
pub(crate) mod tests {
    use ndarray::arr1;

    use super::{export_xyz, format_value, load_pem, parse_pem, save_pem, serialize_pem};
    use crate::data::Component;
    use crate::error::PemError;
    use crate::pem::SurveyType;
    use crate::rad::RadValues;
    use crate::rotation::{RotationMethod, RotationOptions};

    pub const SURFACE: &str = "<FMT> 230
<UNI> nanoTesla/sec
<OPR> Operator
<CUR> 20.5
<TXS> 400 400
<L00> 599000.00 4800000.00 250.00 0
<L01> 599400.00 4800000.00 250.00 0
<L02> 599400.00 4800400.00 250.00 0
<L03> 599000.00 4800400.00 250.00 0
<P00> 599100.00 4799900.00 250.00 0 100S
<P01> 599100.00 4800100.00 251.00 0 100N
<GEN> Survey notes
~
Client
Grid
Line 1
Loop A
June 05, 2021
S-Coil nanoTesla/sec Crystal-Master 50.00000 1500 4 3
#123 7.10 2021-05-20 line1.PEM 0 0 1000
-1.500000 -0.500000 0.000000 1.000000 2.000000 4.000000
$
100S Z R1 0 A 0 1600 64 16 1
D4 0 0 0 0 0 0 0
1.00000E+02 5.00000E+01 2.00000E+01 1.00000E+01 5.00000E+00

100S Z R1 0 A 0 1600 64 16 2
D4 0 0 0 0 0 0 0
3.00000E+02 7.00000E+01 4.00000E+01 2.00000E+01 -5.00000E+00

0 Z R1 0 A 0 1600 64 16 1
D4 0 0 0 0 0 0 0
1.23456E-03 -2.00000E+00
3.00000E+00 4.00000E+00
5.00000E+00
";

    pub const BOREHOLE: &str = "<FMT> 230
<CUR> 10
<L00> -100.00 -100.00 0.00 0
<L01> 100.00 -100.00 0.00 0
<L02> 100.00 100.00 0.00 0
<L03> -100.00 100.00 0.00 0
<P00> 150.00 20.00 0.00 0
<P01> 0.00 -90.00 500.00 0 500.00
~
Client
Grid
DDH-1
Loop B
June 06, 2021
Borehole nanoTesla/sec Crystal-Master 50 1500 2 2
#7 7.10 2021-05-20 ddh1.PEM 0 0 500 0
-1.500000 0.000000 1.000000 2.000000
$
100 X R1 0 A 0 1600 64 16 1 2021-06-06T10:15:00
D7 1.0 0.5 0.0 0.0 0.1 -0.9 21.0
5.00000E+01 2.00000E+01 1.00000E+01

100 Y R1 0 A 0 1600 64 16 1 2021-06-06T10:15:00
D7 1.0 0.5 0.0 0.0 0.1 -0.9 21.0
2.50000E+01 1.00000E+01 5.00000E+00
";

    #[test]
    fn test_parse_surface() {
        let pem = parse_pem(SURFACE).unwrap();

        assert_eq!(pem.survey_type(), SurveyType::SurfaceInduction);
        assert_eq!(pem.header.client, "Client");
        assert_eq!(pem.header.line_name, "Line 1");
        assert_eq!(pem.header.timebase, 50.);
        assert_eq!(pem.header.coil_area, 1000.);
        assert_eq!(pem.header.loop_polarity, None);
        assert_eq!(pem.current(), Some(20.5));
        assert_eq!(pem.tag("TXS"), Some("400 400"));
        assert_eq!(pem.notes, vec!["<GEN> Survey notes"]);

        assert_eq!(pem.loop_gps.points.len(), 4);
        assert_eq!(pem.line_gps.points.len(), 2);
        assert_eq!(pem.line_gps.points[0].station_number, -100);
        assert!(pem.hole.collar.is_none());

        assert_eq!(pem.table.len(), 5);
        assert_eq!(pem.table.count_removable(), 1);
        assert!(!pem.is_split());
        assert!(!pem.is_averaged());

        assert_eq!(pem.data.len(), 3);
        let last = &pem.data.readings()[2];
        assert_eq!(last.station_number, 0);
        assert_eq!(last.component, Component::Z);
        assert_eq!(last.stacks, 64);
        assert_eq!(last.values, arr1(&[1.23456e-3, -2.0, 3.0, 4.0, 5.0]));
    }

    #[test]
    fn test_parse_borehole() {
        let pem = parse_pem(BOREHOLE).unwrap();

        assert!(pem.is_borehole());
        assert!(pem.is_averaged());
        assert!(pem.is_split());
        assert_eq!(pem.header.loop_polarity, Some("0".to_string()));
        assert_eq!(pem.hole.collar.unwrap().easting, 150.);
        assert_eq!(pem.hole.segments.len(), 1);
        assert_eq!(pem.hole.segments[0].dip, -90.);
        assert!(pem.line_gps.points.is_empty());

        let x = &pem.data.readings()[0];
        assert_eq!(x.timestamp.unwrap().to_string(), "2021-06-06 10:15:00");
        assert!(matches!(x.rad.values, RadValues::Sensor { .. }));
        assert!(x.rad.has_mag_values());
    }

    #[test]
    fn test_double_round_trip() {
        for text in [SURFACE, BOREHOLE] {
            let once = serialize_pem(&parse_pem(text).unwrap());
            let twice = serialize_pem(&parse_pem(&once).unwrap());
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_rotated_round_trip() {
        let pem = parse_pem(BOREHOLE).unwrap();
        let options = RotationOptions {
            soa: 30.,
            ..RotationOptions::new(RotationMethod::Accelerometer)
        };
        let rotated = pem.rotate(&options).unwrap().file;

        let text = serialize_pem(&rotated);
        assert!(text.contains(" R1 30.000000\n"));
        assert!(text.contains("<GEN> XY de-rotated"));

        let reparsed = parse_pem(&text).unwrap();
        assert!(reparsed.is_rotated());
        assert_eq!(serialize_pem(&reparsed), text);
        assert!(matches!(reparsed.rotate(&options), Err(PemError::AlreadyRotated)));

        // Re-rotating without the offset undoes the first rotation
        let rerotated = reparsed
            .rotate(&RotationOptions {
                allow_rerotation: true,
                ..RotationOptions::new(RotationMethod::Accelerometer)
            })
            .unwrap()
            .file;
        assert!(rerotated.is_rotated());
        for (before, after) in pem.data.readings().iter().zip(rerotated.data.readings()) {
            for (b, a) in before.values.iter().zip(after.values.iter()) {
                assert!((a - b).abs() < 1e-3 * b.abs(), "{a} != {b}");
            }
        }
        let notes = rerotated.notes.iter().filter(|n| n.starts_with("<GEN> XY de-rotated")).count();
        assert_eq!(notes, 1);
    }

    #[test]
    fn test_serialize_layout() {
        let text = serialize_pem(&parse_pem(SURFACE).unwrap());
        let lines = text.lines().collect::<Vec<&str>>();

        assert_eq!(lines[0], "<FMT> 230");
        assert!(lines.contains(&"<P00> 599100.00 4799900.00 250.00 0 100S"));
        assert!(lines.contains(&"S-Coil nanoTesla/sec Crystal-Master 50 1500 4 3"));
        assert!(lines.contains(&"-1.500000 -0.500000 0.000000 1.000000 2.000000 4.000000"));
        assert!(lines.contains(&"1.23456E-03 -2.00000E+00 3.00000E+00 4.00000E+00 5.00000E+00"));
        assert!(text.ends_with("\n"));
    }

    #[test]
    fn test_deleted_readings_are_not_written() {
        let pem = parse_pem(SURFACE).unwrap();
        let mut edited = pem.clone();
        edited.data = pem.data.set_deleted(0, true).unwrap();

        let reparsed = parse_pem(&serialize_pem(&edited)).unwrap();
        assert_eq!(reparsed.data.len(), 2);
        assert_eq!(reparsed.header.number_of_readings, 2);
        assert!(reparsed.is_averaged());
    }

    #[test]
    fn test_processed_round_trip() {
        let pem = parse_pem(SURFACE).unwrap();
        let processed = pem.average().0.split().unwrap();

        let reparsed = parse_pem(&serialize_pem(&processed)).unwrap();
        assert!(reparsed.is_averaged());
        assert!(reparsed.is_split());
        assert_eq!(reparsed.header.number_of_channels, 3);
        assert_eq!(reparsed.data.readings()[0].values, arr1(&[2.0e2, 3.0e1, 1.5e1, 0.0]));
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(0.0), "0.00000E+00");
        assert_eq!(format_value(123456.0), "1.23456E+05");
        assert_eq!(format_value(-0.000123), "-1.23000E-04");
        assert_eq!(format_value(1e120), "1.00000E+120");
    }

    #[test]
    fn test_parse_errors() {
        let cases = [
            (SURFACE.replace("~\n", ""), "'~'"),
            (SURFACE.replace("$\n", ""), "'$'"),
            (SURFACE.replace("S-Coil nanoTesla/sec Crystal-Master 50.00000", "S-Coil nanoTesla/sec Crystal-Master fifty"), "line 19"),
            (SURFACE.replace("0 Z R1", "0 Q R1"), "line 31"),
            (SURFACE.replace("100S Z R1 0 A 0 1600 64 16 2", "S Z R1 0 A 0 1600 64 16 2"), "line 27"),
            (SURFACE.replace("4.00000E+00\n5.00000E+00\n", "4.00000E+00\n"), "line 31"),
            (SURFACE.replace("-1.500000 -0.500000", "-1.500000"), "channels"),
        ];
        for (text, expected) in cases {
            match parse_pem(&text) {
                Err(PemError::Parse(message)) => assert!(message.contains(expected), "{message}"),
                other => panic!("Expected a parse error containing {expected:?}, got {other:?}"),
            }
        }

        // An unknown survey code is not an error
        let unknown = parse_pem(&SURFACE.replace("S-Coil", "X-Coil")).unwrap();
        assert_eq!(unknown.survey_type(), SurveyType::Undefined);
    }

    #[test]
    fn test_synthesized_channel_times() {
        let text = SURFACE.replace("-1.500000 -0.500000 0.000000 1.000000 2.000000 4.000000\n", "");
        let pem = parse_pem(&text).unwrap();

        assert_eq!(pem.table.len(), 5);
        assert!(pem.is_split());
        assert_eq!(pem.table.count_offtime(), 4);
    }

    #[test]
    fn test_export_xyz() {
        let pem = parse_pem(SURFACE).unwrap();
        let xyz = export_xyz(&pem).unwrap();
        let lines = xyz.lines().collect::<Vec<&str>>();

        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "easting northing elevation station component ch0 ch1 ch2 ch3 ch4");
        assert!(lines[1].starts_with("599100.00 4799900.00 250.00 -100 Z 1.00000E+02"));
        assert!(lines[3].starts_with("599100.00 4800000.00 250.50 0 Z"));

        let borehole = parse_pem(BOREHOLE).unwrap();
        let xyz = export_xyz(&borehole).unwrap();
        assert!(xyz.lines().nth(1).unwrap().starts_with("150.00 20.00 -100.00 100 X"));

        let mut no_gps = pem.clone();
        no_gps.line_gps.points.clear();
        assert!(matches!(export_xyz(&no_gps), Err(PemError::MissingGeometry(_))));
    }

    #[test]
    fn test_load_save() {
        let temp_dir = tempfile::tempdir().unwrap();
        let filepath = temp_dir.path().join("line1.PEM");

        let pem = parse_pem(BOREHOLE).unwrap();
        save_pem(&pem, &filepath).unwrap();
        let loaded = load_pem(&filepath).unwrap();

        assert_eq!(loaded.data, pem.data);
        assert_eq!(loaded.header, pem.header);

        assert!(matches!(load_pem(&temp_dir.path().join("missing.PEM")), Err(PemError::Io(_))));
    }
}
