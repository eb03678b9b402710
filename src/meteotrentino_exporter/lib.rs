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

//! Prometheus metrics exporter for MeteoTrentino weather stations
//!
//! ## Features
//!
//! `meteotrentino_exporter` periodically fetches the latest readings of a single
//! [MeteoTrentino] weather station and emits them as Prometheus metrics. Only readings
//! taken within the last 30 minutes are exported: if a station stops reporting, its
//! metrics disappear instead of showing stale values. The following metrics are emitted.
//!
//! * `temperature_celsius{station_code=$CODE, place=$PLACE}` - Outside temperature, in degrees celsius.
//! * `rain_mm{station_code=$CODE, place=$PLACE}` - Rain in the last period, in millimeters.
//! * `humidity_percent{station_code=$CODE, place=$PLACE}` - Relative humidity (0-100).
//! * `stations_up` - `1` if any reading was exported by the last refresh, `0` otherwise.
//!
//! Each kind of reading can be turned off with `--temperature false`, `--rain false`,
//! or `--humidity false`.
//!
//! [MeteoTrentino]: https://www.meteotrentino.it/
//!
//! ## Build
//!
//! `meteotrentino_exporter` is a Rust program and must be built from source using a
//! [Rust toolchain](https://rustup.rs/).
//!
//! ```text
//! cargo build --release
//! ```
//!
//! ## Usage
//!
//! ### Picking a station
//!
//! Station codes are listed by the MeteoTrentino API itself.
//!
//! ```text
//! curl -sS 'http://dati.meteotrentino.it/service.asmx/listaStazioni' | less
//! ```
//!
//! Run `meteotrentino_exporter` for a station, along with the name of the place it is in.
//!
//! ```text
//! ./meteotrentino_exporter --station T0147 --place Rovereto
//! ```
//!
//! ### Prometheus
//!
//! Prometheus metrics are exposed on port `8089` at `/metrics`. Readings are updated at
//! the source every 15 minutes so there is no benefit to scraping more often than that.
//!
//! ```yaml
//! scrape_configs:
//! - job_name: meteotrentino_exporter
//!   static_configs:
//!   - targets: ['example:8089']
//! ```
//!

pub mod client;
pub mod freshness;
pub mod http;
pub mod metrics;
pub mod parser;
pub mod refresh;
pub mod scheduler;
