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

use clap::{ArgAction, Parser};
use meteotrentino_exporter::client::{StationClient, UrlSchema};
use meteotrentino_exporter::http::RequestContext;
use meteotrentino_exporter::metrics::{StationLabels, StationMetrics};
use meteotrentino_exporter::parser::SnapshotParser;
use meteotrentino_exporter::refresh::{MetricToggles, RefreshConfig, StationRefresher};
use meteotrentino_exporter::scheduler;
use prometheus_client::registry::Registry;
use reqwest::Client;
use std::error::Error;
use std::io;
use std::net::SocketAddr;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{self, SignalKind};
use tracing::{Instrument, Level};

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 8089);
const DEFAULT_REFRESH_SECS: u64 = 60;
const DEFAULT_TIMEOUT_MILLIS: u64 = 5000;
const DEFAULT_API_HOST: &str = "dati.meteotrentino.it";
const DEFAULT_STATION: &str = "T0147";
const DEFAULT_PLACE: &str = "Rovereto";

#[derive(Debug, Parser)]
#[clap(name = "meteotrentino_exporter", version = clap::crate_version!())]
struct MeteoTrentinoExporterApplication {
    /// Station code to fetch readings for. See http://dati.meteotrentino.it/service.asmx/listaStazioni
    #[clap(long, default_value_t = DEFAULT_STATION.into())]
    station: String,

    /// Name of the place the station is in, used as the `place` label
    #[clap(long, default_value_t = DEFAULT_PLACE.into())]
    place: String,

    /// Host of the MeteoTrentino data service
    #[clap(long, default_value_t = DEFAULT_API_HOST.into())]
    api_host: String,

    /// URL schema used to reach the data service. Allowed values are 'http' and 'https'
    #[clap(long, default_value_t = UrlSchema::Https)]
    url_schema: UrlSchema,

    /// Export temperature readings
    #[clap(long, default_value_t = true, action = ArgAction::Set)]
    temperature: bool,

    /// Export rain readings
    #[clap(long, default_value_t = true, action = ArgAction::Set)]
    rain: bool,

    /// Export relative humidity readings
    #[clap(long, default_value_t = true, action = ArgAction::Set)]
    humidity: bool,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[clap(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,

    /// Fetch station readings at this interval, in seconds. Readings are updated at the
    /// source every 15 minutes. Must be at least 1.
    #[clap(
        long,
        default_value_t = DEFAULT_REFRESH_SECS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    refresh_secs: u64,

    /// Timeout for fetching station readings, in milliseconds.
    #[clap(long, default_value_t = DEFAULT_TIMEOUT_MILLIS)]
    timeout_millis: u64,

    /// Address to bind to. By default, meteotrentino_exporter will bind to public address
    /// since the purpose is to expose metrics to an external system (Prometheus or another
    /// agent for ingestion)
    #[clap(long, default_value_t = DEFAULT_BIND_ADDR.into())]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let opts = MeteoTrentinoExporterApplication::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.log_level)
            .finish(),
    )
    .expect("failed to set tracing subscriber");

    let toggles = MetricToggles {
        temperature: opts.temperature,
        rain: opts.rain,
        humidity: opts.humidity,
    };

    if !toggles.any() {
        tracing::info!("no metrics enabled, exiting");
        return Ok(());
    }

    let timeout = Duration::from_millis(opts.timeout_millis);
    let http_client = Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
        tracing::error!(message = "unable to initialize HTTP client", error = %e);
        process::exit(1)
    });

    let client = StationClient::new(http_client, opts.url_schema, &opts.api_host, &opts.station)
        .unwrap_or_else(|e| {
            tracing::error!(message = "unable to build station URL", error = %e);
            process::exit(1)
        });

    tracing::info!(message = "getting station readings", url = %client.url());

    let mut registry = Registry::default();
    let metrics = StationMetrics::new(&mut registry);
    let config = RefreshConfig {
        labels: StationLabels::new(opts.station.clone(), opts.place.clone()),
        toggles,
    };

    let refresher = StationRefresher::new(client, SnapshotParser::default(), config, metrics);
    let interval = Duration::from_secs(opts.refresh_secs);
    let station = opts.station.clone();

    tokio::spawn(async move {
        tracing::info!(
            message = "station polling started",
            station = %station,
            interval_secs = interval.as_secs(),
        );

        let refresher = &refresher;
        scheduler::run(interval, move || async move {
            refresher
                .refresh()
                .instrument(tracing::span!(Level::DEBUG, "station_refresh"))
                .await;
        })
        .await
    });

    let context = Arc::new(RequestContext::new(registry));
    let app = meteotrentino_exporter::http::app(context);
    let server = axum::Server::try_bind(&opts.bind)
        .unwrap_or_else(|e| {
            tracing::error!(message = "error binding to address", address = %opts.bind, error = %e);
            process::exit(1)
        })
        .serve(app.into_make_service());

    tracing::info!(message = "server started", address = %server.local_addr());

    server
        .with_graceful_shutdown(async {
            // Wait for either SIGTERM or SIGINT to shutdown
            tokio::select! {
                _ = sigterm() => {}
                _ = sigint() => {}
            }
        })
        .await?;

    tracing::info!("server shutdown");
    Ok(())
}

/// Return after the first SIGTERM signal received by this process
async fn sigterm() -> io::Result<()> {
    unix::signal(SignalKind::terminate())?.recv().await;
    Ok(())
}

/// Return after the first SIGINT signal received by this process
async fn sigint() -> io::Result<()> {
    unix::signal(SignalKind::interrupt())?.recv().await;
    Ok(())
}
