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

use crate::parser::Sample;
use chrono::{DateTime, Duration, FixedOffset, Utc};
use std::fmt;

/// Samples at or older than this, relative to the time of evaluation, are rejected.
pub const STALENESS_WINDOW_MINS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Temperature,
    Rain,
    Humidity,
}

impl MetricKind {
    pub const ALL: [MetricKind; 3] = [MetricKind::Temperature, MetricKind::Rain, MetricKind::Humidity];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Rain => "rain",
            Self::Humidity => "humidity",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    /// Turned off by configuration. Expected, never logged.
    Disabled,
    Empty,
    Stale {
        timestamp: DateTime<FixedOffset>,
        now: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Accepted(f64),
    Rejected(Rejection),
}

/// Decide if the last sample of a series is recent enough to be published.
///
/// Only the last sample is considered, the series is assumed to be in ascending
/// time order as delivered by the station service.
pub fn evaluate(series: &[Sample], enabled: bool, now: DateTime<Utc>) -> Outcome {
    if !enabled {
        return Outcome::Rejected(Rejection::Disabled);
    }

    let last = match series.last() {
        Some(s) => s,
        None => return Outcome::Rejected(Rejection::Empty),
    };

    let oldest_acceptable = now - Duration::minutes(STALENESS_WINDOW_MINS);
    if last.timestamp > oldest_acceptable {
        Outcome::Accepted(last.value)
    } else {
        Outcome::Rejected(Rejection::Stale {
            timestamp: last.timestamp,
            now,
        })
    }
}
