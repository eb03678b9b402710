// meteotrentino_exporter - Prometheus metrics exporter for MeteoTrentino weather stations
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Deserialize;
use std::error;
use std::fmt;
use std::str;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const ROOT_ELEMENT: &str = "datiOggi";

#[derive(Debug)]
pub enum ParseError {
    Encoding(str::Utf8Error),
    Document(quick_xml::DeError),
    UnrecognizedRoot(Option<String>),
    Timestamp(String, chrono::ParseError),
    NonexistentTime(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encoding(e) => write!(f, "document is not valid UTF-8: {}", e),
            Self::Document(e) => write!(f, "malformed station document: {}", e),
            Self::UnrecognizedRoot(Some(r)) => write!(f, "unrecognized station document root '{}'", r),
            Self::UnrecognizedRoot(None) => write!(f, "station document has no root element"),
            Self::Timestamp(s, e) => write!(f, "invalid sample timestamp '{}': {}", s, e),
            Self::NonexistentTime(s) => write!(f, "sample timestamp '{}' does not exist locally", s),
        }
    }
}

impl error::Error for ParseError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Encoding(e) => Some(e),
            Self::Document(e) => Some(e),
            Self::Timestamp(_, e) => Some(e),
            Self::UnrecognizedRoot(_) | Self::NonexistentTime(_) => None,
        }
    }
}

/// How the local civil time reported by the station is turned into an absolute time.
///
/// The station service reports local time without an offset. Stations always use
/// CET (UTC+1), even while daylight saving time is in effect elsewhere, so the
/// default policy applies that constant offset and never consults a calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalTimePolicy {
    offset: FixedOffset,
}

impl LocalTimePolicy {
    const CET_OFFSET_SECS: i32 = 3600;

    pub fn fixed(offset: FixedOffset) -> Self {
        LocalTimePolicy { offset }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn resolve(&self, raw: &str) -> Result<DateTime<FixedOffset>, ParseError> {
        let trimmed = raw.trim();
        let naive = NaiveDateTime::parse_from_str(trimmed, TIMESTAMP_FORMAT)
            .map_err(|e| ParseError::Timestamp(trimmed.to_owned(), e))?;

        self.offset
            .from_local_datetime(&naive)
            .single()
            .ok_or_else(|| ParseError::NonexistentTime(trimmed.to_owned()))
    }
}

impl Default for LocalTimePolicy {
    fn default() -> Self {
        let offset = FixedOffset::east_opt(Self::CET_OFFSET_SECS).expect("UTC+1 must be a valid offset");
        LocalTimePolicy { offset }
    }
}

/// One timestamped reading of a series.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub timestamp: DateTime<FixedOffset>,
    pub value: f64,
    pub unit: Option<String>,
}

/// Latest readings of a station: three independent series in the order delivered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StationSnapshot {
    pub temperature: Vec<Sample>,
    pub rain: Vec<Sample>,
    pub humidity: Vec<Sample>,
}

#[derive(Debug, Clone)]
pub struct SnapshotParser {
    policy: LocalTimePolicy,
}

impl SnapshotParser {
    pub fn new(policy: LocalTimePolicy) -> Self {
        SnapshotParser { policy }
    }

    pub fn parse(&self, body: &[u8]) -> Result<StationSnapshot, ParseError> {
        let text = str::from_utf8(body).map_err(ParseError::Encoding)?;
        Self::check_root(text)?;
        let doc: DatiOggi = quick_xml::de::from_str(text).map_err(ParseError::Document)?;

        let temperature = doc
            .temperature
            .samples
            .into_iter()
            .map(|s| self.sample(&s.data, s.temperatura, s.unit))
            .collect::<Result<Vec<_>, _>>()?;

        let rain = doc
            .precipitazioni
            .samples
            .into_iter()
            .map(|s| self.sample(&s.data, s.pioggia, s.unit))
            .collect::<Result<Vec<_>, _>>()?;

        let humidity = doc
            .umidita
            .samples
            .into_iter()
            .map(|s| self.sample(&s.data, s.rh, Some("%".to_owned())))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(StationSnapshot {
            temperature,
            rain,
            humidity,
        })
    }

    /// Make sure the document is a station readings document and not some other
    /// well-formed markup, like an HTML error page served with a 200 status.
    fn check_root(text: &str) -> Result<(), ParseError> {
        let mut reader = Reader::from_str(text);

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                    let name = e.local_name();
                    return if name.as_ref() == ROOT_ELEMENT.as_bytes() {
                        Ok(())
                    } else {
                        let root = String::from_utf8_lossy(name.as_ref()).into_owned();
                        Err(ParseError::UnrecognizedRoot(Some(root)))
                    };
                }
                Ok(Event::Eof) => return Err(ParseError::UnrecognizedRoot(None)),
                Ok(_) => {}
                Err(e) => return Err(ParseError::Document(e.into())),
            }
        }
    }

    fn sample(&self, data: &str, value: f64, unit: Option<String>) -> Result<Sample, ParseError> {
        Ok(Sample {
            timestamp: self.policy.resolve(data)?,
            value,
            unit,
        })
    }
}

impl Default for SnapshotParser {
    fn default() -> Self {
        Self::new(LocalTimePolicy::default())
    }
}

#[derive(Deserialize, Debug, Default)]
struct DatiOggi {
    #[serde(rename = "temperature", default)]
    temperature: Temperature,
    #[serde(rename = "precipitazioni", default)]
    precipitazioni: Precipitazioni,
    #[serde(rename = "umidita_relativa", default)]
    umidita: UmiditaList,
}

#[derive(Deserialize, Debug, Default)]
struct Temperature {
    #[serde(rename = "temperatura_aria", default)]
    samples: Vec<TemperaturaAria>,
}

#[derive(Deserialize, Debug)]
struct TemperaturaAria {
    data: String,
    temperatura: f64,
    #[serde(rename = "@UM", default)]
    unit: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct Precipitazioni {
    #[serde(rename = "precipitazione", default)]
    samples: Vec<Precipitazione>,
}

#[derive(Deserialize, Debug)]
struct Precipitazione {
    data: String,
    pioggia: f64,
    #[serde(rename = "@UM", default)]
    unit: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct UmiditaList {
    #[serde(rename = "umidita_relativa", default)]
    samples: Vec<UmiditaRelativa>,
}

#[derive(Deserialize, Debug)]
struct UmiditaRelativa {
    data: String,
    rh: f64,
}
