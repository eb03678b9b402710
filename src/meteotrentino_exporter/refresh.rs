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

use crate::client::{ClientError, StationClient};
use crate::freshness::{self, MetricKind, Outcome};
use crate::metrics::{self, GaugeStore, StationLabels};
use crate::parser::{ParseError, SnapshotParser, StationSnapshot};
use chrono::{DateTime, Utc};
use std::error;
use std::fmt;

#[derive(Debug)]
pub enum RefreshError {
    Fetch(ClientError),
    Parse(ParseError),
}

impl fmt::Display for RefreshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch(e) => write!(f, "unable to fetch station readings: {}", e),
            Self::Parse(e) => write!(f, "unable to parse station readings: {}", e),
        }
    }
}

impl error::Error for RefreshError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Fetch(e) => Some(e),
            Self::Parse(e) => Some(e),
        }
    }
}

impl From<ClientError> for RefreshError {
    fn from(e: ClientError) -> Self {
        Self::Fetch(e)
    }
}

impl From<ParseError> for RefreshError {
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}

/// Which kinds of readings are published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricToggles {
    pub temperature: bool,
    pub rain: bool,
    pub humidity: bool,
}

impl MetricToggles {
    pub fn enabled(&self, kind: MetricKind) -> bool {
        match kind {
            MetricKind::Temperature => self.temperature,
            MetricKind::Rain => self.rain,
            MetricKind::Humidity => self.humidity,
        }
    }

    pub fn any(&self) -> bool {
        self.temperature || self.rain || self.humidity
    }
}

impl Default for MetricToggles {
    fn default() -> Self {
        MetricToggles {
            temperature: true,
            rain: true,
            humidity: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RefreshConfig {
    pub labels: StationLabels,
    pub toggles: MetricToggles,
}

/// Fetches, validates, and publishes the latest readings of one station.
#[derive(Debug)]
pub struct StationRefresher<S> {
    client: StationClient,
    parser: SnapshotParser,
    config: RefreshConfig,
    store: S,
}

impl<S> StationRefresher<S>
where
    S: GaugeStore,
{
    pub fn new(client: StationClient, parser: SnapshotParser, config: RefreshConfig, store: S) -> Self {
        StationRefresher {
            client,
            parser,
            config,
            store,
        }
    }

    /// Run a single fetch, parse, and publish cycle, returning station health.
    pub async fn refresh(&self) -> bool {
        let res = self.snapshot().await;
        self.apply(res, Utc::now())
    }

    async fn snapshot(&self) -> Result<StationSnapshot, RefreshError> {
        let body = self.client.latest().await?;
        let snapshot = self.parser.parse(&body)?;

        tracing::debug!(
            message = "received and parsed station readings",
            temperature_samples = snapshot.temperature.len(),
            rain_samples = snapshot.rain.len(),
            humidity_samples = snapshot.humidity.len(),
        );

        Ok(snapshot)
    }

    /// Publish the result of fetching and parsing station readings as of `now`.
    ///
    /// A failed fetch or parse removes every value published for the station. Otherwise
    /// each kind is validated and published independently of the others.
    pub fn apply(&self, res: Result<StationSnapshot, RefreshError>, now: DateTime<Utc>) -> bool {
        let labels = &self.config.labels;
        let snapshot = match res {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(
                    message = "failed to refresh station",
                    station = %labels.station_code,
                    error = %e,
                );
                metrics::evict(&self.store, labels);
                return false;
            }
        };

        let toggles = &self.config.toggles;
        let outcomes: Vec<(MetricKind, Outcome)> = [
            (MetricKind::Temperature, &snapshot.temperature),
            (MetricKind::Rain, &snapshot.rain),
            (MetricKind::Humidity, &snapshot.humidity),
        ]
        .into_iter()
        .map(|(kind, series)| (kind, freshness::evaluate(series, toggles.enabled(kind), now)))
        .collect();

        metrics::publish(&self.store, labels, &outcomes)
    }
}
