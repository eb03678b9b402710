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

use crate::freshness::{MetricKind, Outcome, Rejection};
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

/// Labels identifying the gauges owned by a single station.
#[derive(Debug, Clone, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct StationLabels {
    pub station_code: String,
    pub place: String,
}

impl StationLabels {
    pub fn new<S1: Into<String>, S2: Into<String>>(station_code: S1, place: S2) -> Self {
        StationLabels {
            station_code: station_code.into(),
            place: place.into(),
        }
    }
}

/// Storage for published station values.
///
/// Implementations must be safe to call concurrently with reads done while
/// serving scrapes.
pub trait GaugeStore {
    fn set(&self, kind: MetricKind, labels: &StationLabels, value: f64);

    fn delete(&self, kind: MetricKind, labels: &StationLabels);

    fn set_up(&self, up: bool);
}

impl<T> GaugeStore for Arc<T>
where
    T: GaugeStore + ?Sized,
{
    fn set(&self, kind: MetricKind, labels: &StationLabels, value: f64) {
        (**self).set(kind, labels, value)
    }

    fn delete(&self, kind: MetricKind, labels: &StationLabels) {
        (**self).delete(kind, labels)
    }

    fn set_up(&self, up: bool) {
        (**self).set_up(up)
    }
}

/// Gauges for each kind of reading plus station health, registered with a
/// `prometheus_client` registry upon call to `StationMetrics::new()`.
#[derive(Debug, Clone)]
pub struct StationMetrics {
    temperature: Family<StationLabels, Gauge<f64, AtomicU64>>,
    rain: Family<StationLabels, Gauge<f64, AtomicU64>>,
    humidity: Family<StationLabels, Gauge<f64, AtomicU64>>,
    stations_up: Gauge,
}

impl StationMetrics {
    pub fn new(reg: &mut Registry) -> Self {
        let temperature = Family::<StationLabels, Gauge<f64, AtomicU64>>::default();
        let rain = Family::<StationLabels, Gauge<f64, AtomicU64>>::default();
        let humidity = Family::<StationLabels, Gauge<f64, AtomicU64>>::default();
        let stations_up = Gauge::default();

        reg.register(
            "temperature_celsius",
            "Current outside temperature in degrees Celsius",
            temperature.clone(),
        );
        reg.register("rain_mm", "Amount of rain in the last period in mm", rain.clone());
        reg.register(
            "humidity_percent",
            "Relative humidity in percentage",
            humidity.clone(),
        );
        reg.register(
            "stations_up",
            "Number of stations successfully queried",
            stations_up.clone(),
        );

        Self {
            temperature,
            rain,
            humidity,
            stations_up,
        }
    }

    fn family(&self, kind: MetricKind) -> &Family<StationLabels, Gauge<f64, AtomicU64>> {
        match kind {
            MetricKind::Temperature => &self.temperature,
            MetricKind::Rain => &self.rain,
            MetricKind::Humidity => &self.humidity,
        }
    }
}

impl GaugeStore for StationMetrics {
    fn set(&self, kind: MetricKind, labels: &StationLabels, value: f64) {
        self.family(kind).get_or_create(labels).set(value);
    }

    fn delete(&self, kind: MetricKind, labels: &StationLabels) {
        self.family(kind).remove(labels);
    }

    fn set_up(&self, up: bool) {
        self.stations_up.set(if up { 1 } else { 0 });
    }
}

/// Publish the outcome of each kind of reading and set station health.
///
/// Accepted values are set, every rejection removes the value previously published
/// for the station. Empty and stale rejections are logged, disabled kinds are not.
/// Returns `true` if at least one kind was published.
pub fn publish<S>(store: &S, labels: &StationLabels, outcomes: &[(MetricKind, Outcome)]) -> bool
where
    S: GaugeStore + ?Sized,
{
    let mut updated = false;

    for (kind, outcome) in outcomes {
        match outcome {
            Outcome::Accepted(v) => {
                store.set(*kind, labels, *v);
                updated = true;
            }
            Outcome::Rejected(reason) => {
                match reason {
                    Rejection::Disabled => {}
                    Rejection::Empty => {
                        tracing::warn!(
                            message = "no samples in series",
                            kind = %kind,
                            station = %labels.station_code,
                        );
                    }
                    Rejection::Stale { timestamp, now } => {
                        tracing::warn!(
                            message = "rejected stale sample",
                            kind = %kind,
                            station = %labels.station_code,
                            timestamp = %timestamp.to_rfc3339(),
                            current_time = %now.to_rfc3339(),
                        );
                    }
                }

                store.delete(*kind, labels);
            }
        }
    }

    store.set_up(updated);
    updated
}

/// Remove every published value for the station and mark it as down.
pub fn evict<S>(store: &S, labels: &StationLabels)
where
    S: GaugeStore + ?Sized,
{
    for kind in MetricKind::ALL {
        store.delete(kind, labels);
    }

    store.set_up(false);
}

#[cfg(test)]
pub(crate) mod test {
    use super::{evict, publish, GaugeStore, StationLabels, StationMetrics};
    use crate::freshness::{MetricKind, Outcome, Rejection};
    use chrono::{FixedOffset, TimeZone, Utc};
    use prometheus_client::encoding::text::encode;
    use prometheus_client::registry::Registry;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory store that records current state, for checking what a cycle left behind.
    #[derive(Debug, Default)]
    pub(crate) struct MemoryStore {
        values: Mutex<HashMap<(MetricKind, StationLabels), f64>>,
        up: Mutex<Option<bool>>,
    }

    impl MemoryStore {
        pub(crate) fn get(&self, kind: MetricKind, labels: &StationLabels) -> Option<f64> {
            self.values.lock().unwrap().get(&(kind, labels.clone())).copied()
        }

        pub(crate) fn up(&self) -> Option<bool> {
            *self.up.lock().unwrap()
        }
    }

    impl GaugeStore for MemoryStore {
        fn set(&self, kind: MetricKind, labels: &StationLabels, value: f64) {
            self.values.lock().unwrap().insert((kind, labels.clone()), value);
        }

        fn delete(&self, kind: MetricKind, labels: &StationLabels) {
            self.values.lock().unwrap().remove(&(kind, labels.clone()));
        }

        fn set_up(&self, up: bool) {
            *self.up.lock().unwrap() = Some(up);
        }
    }

    fn labels() -> StationLabels {
        StationLabels::new("T0147", "Rovereto")
    }

    fn stale() -> Rejection {
        let now = Utc.with_ymd_and_hms(2023, 7, 14, 9, 30, 0).unwrap();
        let cet = FixedOffset::east_opt(3600).unwrap();
        Rejection::Stale {
            timestamp: Utc.with_ymd_and_hms(2023, 7, 14, 8, 45, 0).unwrap().with_timezone(&cet),
            now,
        }
    }

    #[test]
    fn test_publish_mixed_outcomes() {
        let store = MemoryStore::default();
        store.set(MetricKind::Rain, &labels(), 4.0);
        store.set(MetricKind::Humidity, &labels(), 80.0);

        let up = publish(
            &store,
            &labels(),
            &[
                (MetricKind::Temperature, Outcome::Accepted(12.3)),
                (MetricKind::Rain, Outcome::Rejected(Rejection::Empty)),
                (MetricKind::Humidity, Outcome::Rejected(Rejection::Disabled)),
            ],
        );

        assert!(up);
        assert_eq!(Some(true), store.up());
        assert_eq!(Some(12.3), store.get(MetricKind::Temperature, &labels()));
        assert_eq!(None, store.get(MetricKind::Rain, &labels()));
        assert_eq!(None, store.get(MetricKind::Humidity, &labels()));
    }

    #[test]
    fn test_publish_all_rejected() {
        let store = MemoryStore::default();
        for kind in MetricKind::ALL {
            store.set(kind, &labels(), 1.0);
        }

        let up = publish(
            &store,
            &labels(),
            &[
                (MetricKind::Temperature, Outcome::Rejected(stale())),
                (MetricKind::Rain, Outcome::Rejected(stale())),
                (MetricKind::Humidity, Outcome::Rejected(stale())),
            ],
        );

        assert!(!up);
        assert_eq!(Some(false), store.up());
        for kind in MetricKind::ALL {
            assert_eq!(None, store.get(kind, &labels()));
        }
    }

    #[test]
    fn test_publish_leaves_other_stations() {
        let store = MemoryStore::default();
        let other = StationLabels::new("T0129", "Trento");
        store.set(MetricKind::Temperature, &other, 20.0);

        publish(
            &store,
            &labels(),
            &[(MetricKind::Temperature, Outcome::Rejected(Rejection::Empty))],
        );

        assert_eq!(Some(20.0), store.get(MetricKind::Temperature, &other));
    }

    #[test]
    fn test_evict() {
        let store = MemoryStore::default();
        for kind in MetricKind::ALL {
            store.set(kind, &labels(), 1.0);
        }
        store.set_up(true);

        evict(&store, &labels());

        assert_eq!(Some(false), store.up());
        for kind in MetricKind::ALL {
            assert_eq!(None, store.get(kind, &labels()));
        }
    }

    #[test]
    fn test_station_metrics_exposition() {
        let mut registry = Registry::default();
        let metrics = StationMetrics::new(&mut registry);

        metrics.set(MetricKind::Temperature, &labels(), 12.5);
        metrics.set(MetricKind::Humidity, &labels(), 64.0);
        metrics.set_up(true);

        let mut buf = String::new();
        encode(&mut buf, &registry).unwrap();

        assert!(buf.contains(r#"temperature_celsius{station_code="T0147",place="Rovereto"} 12.5"#));
        assert!(buf.contains(r#"humidity_percent{station_code="T0147",place="Rovereto"} 64"#));
        assert!(!buf.contains("rain_mm{"));
        assert!(buf.contains("stations_up 1"));
    }

    #[test]
    fn test_station_metrics_delete() {
        let mut registry = Registry::default();
        let metrics = StationMetrics::new(&mut registry);

        metrics.set(MetricKind::Rain, &labels(), 0.4);
        metrics.delete(MetricKind::Rain, &labels());
        metrics.set_up(false);

        let mut buf = String::new();
        encode(&mut buf, &registry).unwrap();

        assert!(!buf.contains("rain_mm{"));
        assert!(buf.contains("stations_up 0"));
    }
}
