//! Reading NSRDB downloads and reading/writing cache files.
//!
//! Both layouts share a two-line location preamble followed by a header row and
//! hourly data. The NSRDB preamble carries many more fields than the cache file;
//! only `Latitude`, `Longitude`, `Time Zone` and `Elevation` are used.

use crate::types::coordinate::Coordinate;
use crate::types::weather_record::{HourlyWeather, LocationMetadata, WeatherRecord};
use crate::weather::error::FormatError;
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use polars::prelude::*;
use std::io::{Cursor, Write};

const METADATA_FIELDS: [&str; 4] = ["Latitude", "Longitude", "Time Zone", "Elevation"];

const YEAR: &str = "Year";
const MONTH: &str = "Month";
const DAY: &str = "Day";
const HOUR: &str = "Hour";
const MINUTE: &str = "Minute";
const GHI: &str = "GHI";
const DNI: &str = "DNI";
const DHI: &str = "DHI";
const TEMPERATURE: &str = "Temperature";
const WIND_SPEED: &str = "Wind Speed";
const SURFACE_ALBEDO: &str = "Surface Albedo";
const PRECIPITATION: &str = "Precipitation";

const REQUIRED_COLUMNS: [&str; 11] = [
    YEAR,
    MONTH,
    DAY,
    HOUR,
    MINUTE,
    GHI,
    DNI,
    DHI,
    TEMPERATURE,
    WIND_SPEED,
    SURFACE_ALBEDO,
];

/// Parses an NSRDB PSM CSV download.
///
/// Location fields missing from the preamble fall back to `coordinate` with a
/// zero time zone and elevation. The precipitation of every row is zero.
pub fn parse_nsrdb_csv(payload: &str, coordinate: Coordinate) -> Result<WeatherRecord, FormatError> {
    let (names, values, body) = split_preamble(payload)?;
    let fallback = LocationMetadata {
        latitude: coordinate.latitude(),
        longitude: coordinate.longitude(),
        time_zone: 0.0,
        elevation: 0.0,
    };
    let metadata = read_metadata(names, values, Some(fallback))?;
    let df = read_body(body)?;
    let rows = extract_rows(&df, false)?;
    Ok(WeatherRecord { metadata, rows })
}

/// Parses a cache file written by [`write_weather_file`].
pub fn read_weather_file(contents: &str) -> Result<WeatherRecord, FormatError> {
    let (names, values, body) = split_preamble(contents)?;
    let metadata = read_metadata(names, values, None)?;
    let df = read_body(body)?;
    let rows = extract_rows(&df, true)?;
    Ok(WeatherRecord { metadata, rows })
}

/// Writes `record` in the cache layout: location header, location values, then
/// one CSV row per hour including a `Precipitation` column.
pub fn write_weather_file<W: Write>(
    writer: &mut W,
    record: &WeatherRecord,
) -> Result<(), FormatError> {
    let m = &record.metadata;
    writeln!(writer, "{}", METADATA_FIELDS.join(","))?;
    writeln!(
        writer,
        "{},{},{},{}",
        m.latitude, m.longitude, m.time_zone, m.elevation
    )?;

    let mut df = rows_to_frame(&record.rows)?;
    CsvWriter::new(writer).include_header(true).finish(&mut df)?;
    Ok(())
}

fn split_preamble(text: &str) -> Result<(&str, &str, &str), FormatError> {
    let mut parts = text.splitn(3, '\n');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(names), Some(values), Some(body)) => Ok((
            names.trim_end_matches('\r'),
            values.trim_end_matches('\r'),
            body,
        )),
        _ => Err(FormatError::MissingPreamble),
    }
}

fn read_metadata(
    names: &str,
    values: &str,
    fallback: Option<LocationMetadata>,
) -> Result<LocationMetadata, FormatError> {
    let names: Vec<&str> = names.split(',').map(str::trim).collect();
    let values: Vec<&str> = values.split(',').map(str::trim).collect();

    let field = |field: &str, default: Option<f64>| -> Result<f64, FormatError> {
        let raw = names
            .iter()
            .position(|name| *name == field)
            .and_then(|index| values.get(index).copied());
        match (raw, default) {
            (Some(raw), _) => raw.parse().map_err(|_| FormatError::InvalidMetadata {
                field: field.to_string(),
                value: raw.to_string(),
            }),
            (None, Some(default)) => Ok(default),
            (None, None) => Err(FormatError::InvalidMetadata {
                field: field.to_string(),
                value: String::new(),
            }),
        }
    };

    Ok(LocationMetadata {
        latitude: field("Latitude", fallback.map(|m| m.latitude))?,
        longitude: field("Longitude", fallback.map(|m| m.longitude))?,
        time_zone: field("Time Zone", fallback.map(|m| m.time_zone))?,
        elevation: field("Elevation", fallback.map(|m| m.elevation))?,
    })
}

fn read_body(body: &str) -> Result<DataFrame, FormatError> {
    if body.trim().is_empty() {
        return Err(FormatError::Empty);
    }
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .into_reader_with_file_handle(Cursor::new(body.as_bytes().to_vec()))
        .finish()?;
    Ok(df)
}

fn extract_rows(df: &DataFrame, with_precipitation: bool) -> Result<Vec<HourlyWeather>, FormatError> {
    let mut missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|name| df.column(name).is_err())
        .map(|name| name.to_string())
        .collect();
    if with_precipitation && df.column(PRECIPITATION).is_err() {
        missing.push(PRECIPITATION.to_string());
    }
    if !missing.is_empty() {
        return Err(FormatError::MissingColumns(missing));
    }
    if df.height() == 0 {
        return Err(FormatError::Empty);
    }

    let years = int_values(df, YEAR)?;
    let months = int_values(df, MONTH)?;
    let days = int_values(df, DAY)?;
    let hours = int_values(df, HOUR)?;
    let minutes = int_values(df, MINUTE)?;
    let ghi = float_values(df, GHI)?;
    let dni = float_values(df, DNI)?;
    let dhi = float_values(df, DHI)?;
    let temperature = float_values(df, TEMPERATURE)?;
    let wind_speed = float_values(df, WIND_SPEED)?;
    let albedo = float_values(df, SURFACE_ALBEDO)?;
    let precipitation = if with_precipitation {
        float_values(df, PRECIPITATION)?
    } else {
        vec![0.0; df.height()]
    };

    (0..df.height())
        .map(|row| {
            let timestamp = timestamp(years[row], months[row], days[row], hours[row], minutes[row])
                .ok_or(FormatError::InvalidTimestamp { row })?;
            Ok(HourlyWeather {
                timestamp,
                ghi: ghi[row],
                dni: dni[row],
                dhi: dhi[row],
                temperature: temperature[row],
                wind_speed: wind_speed[row],
                surface_albedo: albedo[row],
                precipitation: precipitation[row],
            })
        })
        .collect()
}

fn timestamp(year: i64, month: i64, day: i64, hour: i64, minute: i64) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(
        i32::try_from(year).ok()?,
        u32::try_from(month).ok()?,
        u32::try_from(day).ok()?,
    )?
    .and_hms_opt(u32::try_from(hour).ok()?, u32::try_from(minute).ok()?, 0)
}

fn int_values(df: &DataFrame, name: &str) -> Result<Vec<i64>, FormatError> {
    let column = df.column(name)?.cast(&DataType::Int64)?;
    let values = column.i64()?;
    values
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            value.ok_or_else(|| FormatError::MissingValue {
                column: name.to_string(),
                row,
            })
        })
        .collect()
}

fn float_values(df: &DataFrame, name: &str) -> Result<Vec<f64>, FormatError> {
    let column = df.column(name)?.cast(&DataType::Float64)?;
    let values = column.f64()?;
    values
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            value.ok_or_else(|| FormatError::MissingValue {
                column: name.to_string(),
                row,
            })
        })
        .collect()
}

fn rows_to_frame(rows: &[HourlyWeather]) -> PolarsResult<DataFrame> {
    let int_column = |name: &str, get: fn(&NaiveDateTime) -> i64| -> Column {
        let values: Vec<i64> = rows.iter().map(|row| get(&row.timestamp)).collect();
        Series::new(name.into(), values).into()
    };
    let float_column = |name: &str, get: fn(&HourlyWeather) -> f64| -> Column {
        let values: Vec<f64> = rows.iter().map(get).collect();
        Series::new(name.into(), values).into()
    };

    DataFrame::new(vec![
        int_column(YEAR, |t| i64::from(t.year())),
        int_column(MONTH, |t| i64::from(t.month())),
        int_column(DAY, |t| i64::from(t.day())),
        int_column(HOUR, |t| i64::from(t.hour())),
        int_column(MINUTE, |t| i64::from(t.minute())),
        float_column(GHI, |r| r.ghi),
        float_column(DNI, |r| r.dni),
        float_column(DHI, |r| r.dhi),
        float_column(TEMPERATURE, |r| r.temperature),
        float_column(WIND_SPEED, |r| r.wind_speed),
        float_column(SURFACE_ALBEDO, |r| r.surface_albedo),
        float_column(PRECIPITATION, |r| r.precipitation),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_NSRDB_CSV: &str = "\
Source,Location ID,City,State,Country,Latitude,Longitude,Time Zone,Elevation
NSRDB,123456,Phoenix,AZ,United States,33.45,-111.98,-7,337
Year,Month,Day,Hour,Minute,GHI,DNI,DHI,Temperature,Wind Speed,Surface Albedo
2024,1,1,0,0,0,0,0,8.5,2.1,0.18
2024,1,1,1,0,0,0,0,7.9,1.8,0.18
2024,1,1,2,0,0,0,0,7.2,1.5,0.18
2024,1,1,7,0,120,350,45,12.3,3.2,0.19
2024,1,1,12,0,650,800,120,18.7,4.1,0.20
";

    const INCOMPLETE_CSV: &str = "\
Source,Location ID,City
NSRDB,123456,Phoenix
Year,Month,Day,Hour,Minute,GHI,DNI
2024,1,1,0,0,0,0
";

    fn phoenix() -> Coordinate {
        Coordinate::new(33.45, -111.98).unwrap()
    }

    #[test]
    fn test_parse_nsrdb_sample() {
        let record = parse_nsrdb_csv(SAMPLE_NSRDB_CSV, phoenix()).unwrap();
        assert_eq!(record.rows.len(), 5);
        assert_eq!(
            record.metadata,
            LocationMetadata {
                latitude: 33.45,
                longitude: -111.98,
                time_zone: -7.0,
                elevation: 337.0,
            }
        );

        let noon = record.rows[4];
        assert_eq!(
            noon.timestamp,
            NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap()
        );
        assert_eq!(noon.ghi, 650.0);
        assert_eq!(noon.dni, 800.0);
        assert_eq!(noon.temperature, 18.7);
        assert_eq!(noon.surface_albedo, 0.2);
        assert!(record.rows.iter().all(|row| row.precipitation == 0.0));
    }

    #[test]
    fn test_missing_columns_are_named() {
        match parse_nsrdb_csv(INCOMPLETE_CSV, phoenix()) {
            Err(FormatError::MissingColumns(missing)) => assert_eq!(
                missing,
                vec!["DHI", "Temperature", "Wind Speed", "Surface Albedo"]
            ),
            other => panic!("expected missing columns, got {other:?}"),
        }
    }

    #[test]
    fn test_preamble_without_location_uses_coordinate() {
        let payload = "\
Source,Location ID
NSRDB,1
Year,Month,Day,Hour,Minute,GHI,DNI,DHI,Temperature,Wind Speed,Surface Albedo
2023,6,1,12,30,900,850,100,35.5,3.0,0.21
";
        let record = parse_nsrdb_csv(payload, phoenix()).unwrap();
        assert_eq!(record.metadata.latitude, 33.45);
        assert_eq!(record.metadata.longitude, -111.98);
        assert_eq!(record.metadata.time_zone, 0.0);
        assert_eq!(record.rows[0].timestamp.minute(), 30);
    }

    #[test]
    fn test_rejects_short_or_empty_payloads() {
        assert!(matches!(
            parse_nsrdb_csv("Source,Latitude\n", phoenix()),
            Err(FormatError::MissingPreamble)
        ));
        assert!(matches!(
            parse_nsrdb_csv("Source\nNSRDB\n\n", phoenix()),
            Err(FormatError::Empty)
        ));
    }

    #[test]
    fn test_invalid_date_is_reported() {
        let payload = "\
Source
NSRDB
Year,Month,Day,Hour,Minute,GHI,DNI,DHI,Temperature,Wind Speed,Surface Albedo
2023,2,30,0,0,0,0,0,1,1,0.2
";
        assert!(matches!(
            parse_nsrdb_csv(payload, phoenix()),
            Err(FormatError::InvalidTimestamp { row: 0 })
        ));
    }

    #[test]
    fn test_cache_file_layout() {
        let mut record = parse_nsrdb_csv(SAMPLE_NSRDB_CSV, phoenix()).unwrap();
        record.rows[3].precipitation = 1.25;

        let mut buffer = Vec::new();
        write_weather_file(&mut buffer, &record).unwrap();
        let text = String::from_utf8(buffer).unwrap();

        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("Latitude,Longitude,Time Zone,Elevation"));
        assert_eq!(lines.next(), Some("33.45,-111.98,-7,337"));
        assert_eq!(
            lines.next(),
            Some("Year,Month,Day,Hour,Minute,GHI,DNI,DHI,Temperature,Wind Speed,Surface Albedo,Precipitation")
        );
        assert_eq!(lines.count(), 5);

        assert_eq!(read_weather_file(&text).unwrap(), record);
    }

    #[test]
    fn test_cache_file_requires_location_and_precipitation() {
        let no_location = "\
Source
NSRDB
Year,Month,Day,Hour,Minute,GHI,DNI,DHI,Temperature,Wind Speed,Surface Albedo,Precipitation
2023,1,1,0,0,0,0,0,1,1,0.2,0
";
        assert!(matches!(
            read_weather_file(no_location),
            Err(FormatError::InvalidMetadata { .. })
        ));

        let no_precipitation = "\
Latitude,Longitude,Time Zone,Elevation
33.45,-111.98,-7,337
Year,Month,Day,Hour,Minute,GHI,DNI,DHI,Temperature,Wind Speed,Surface Albedo
2023,1,1,0,0,0,0,0,1,1,0.2
";
        match read_weather_file(no_precipitation) {
            Err(FormatError::MissingColumns(missing)) => assert_eq!(missing, vec!["Precipitation"]),
            other => panic!("expected missing precipitation, got {other:?}"),
        }
    }
}
