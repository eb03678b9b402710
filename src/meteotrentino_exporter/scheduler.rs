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

use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Run `cycle` immediately and then once every `period`, forever.
///
/// Only one cycle runs at a time. The next tick is awaited after the current cycle
/// completes, so a cycle that takes longer than `period` delays the following one
/// instead of running alongside it. Ticks missed during a slow cycle are collapsed
/// into a single one.
///
/// # Panics
///
/// If `period` is zero.
pub async fn run<F, Fut>(period: Duration, mut cycle: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let _ = interval.tick().await;
        cycle().await;
    }
}
