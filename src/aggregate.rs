//! Fleet aggregation
//!
//! Reduces one cycle's Sensor set into the published [`AggregateSnapshot`]:
//! per-metric averages, connection counts, the 24-bucket chart series, and
//! per-sensor history statistics for detail views.
//!
//! Everything here is a pure function of its input. Disconnected and
//! errored sensors never contribute a value, and a metric with no connected
//! sensors has no average at all rather than a misleading zero.

use std::collections::BTreeMap;

use chrono::Utc;

use crate::models::{
    AggregateSnapshot, ChartPoint, HistoryStats, MetricType, MoistureRisk, Sensor,
};

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Reduce a Sensor set into the fleet snapshot for this cycle.
///
/// The input map is keyed by device address, so iteration order (and with
/// it the choice of representative chart sensor) is deterministic and
/// independent of poll completion order.
pub fn aggregate(sensors: &BTreeMap<String, Sensor>, window: usize) -> AggregateSnapshot {
    let mut sums: BTreeMap<MetricType, (f64, usize)> = BTreeMap::new();

    for sensor in sensors.values() {
        if !sensor.is_connected() {
            continue;
        }
        let (Some(metric), Some(reading)) = (sensor.metric_type, &sensor.latest_reading) else {
            continue;
        };
        let entry = sums.entry(metric).or_insert((0.0, 0));
        entry.0 += reading.value;
        entry.1 += 1;
    }

    let averages: BTreeMap<MetricType, f64> = sums
        .into_iter()
        .map(|(metric, (sum, count))| (metric, round1(sum / count as f64)))
        .collect();

    let connected_count = sensors.values().filter(|s| s.is_connected()).count();
    let moisture_risk = averages
        .get(&MetricType::SoilMoisture)
        .copied()
        .map(MoistureRisk::from_moisture);

    AggregateSnapshot {
        generated_at: Utc::now(),
        chart: chart_series(sensors, window),
        averages,
        connected_count,
        total_count: sensors.len(),
        moisture_risk,
    }
}

/// Build the time-bucketed chart series.
///
/// For each metric type the representative is the first connected sensor in
/// address order; bucket `i` carries that sensor's `historical_data[i]`.
/// A missing sensor or index leaves the bucket without an entry for that
/// metric; absence is the "no data" marker.
fn chart_series(sensors: &BTreeMap<String, Sensor>, window: usize) -> Vec<ChartPoint> {
    let mut representatives: BTreeMap<MetricType, &Sensor> = BTreeMap::new();
    for sensor in sensors.values() {
        if let (true, Some(metric)) = (sensor.is_connected(), sensor.metric_type) {
            representatives.entry(metric).or_insert(sensor);
        }
    }

    (0..window)
        .map(|i| {
            let mut values = BTreeMap::new();
            for (metric, sensor) in &representatives {
                if let Some(point) = sensor.historical_data.get(i) {
                    values.insert(*metric, point.value);
                }
            }
            ChartPoint {
                time: format!("{i:02}:00"),
                values,
            }
        })
        .collect()
}

/// Min/avg/max over one sensor's historical window.
///
/// `None` when the window is empty (disconnected or errored sensor).
pub fn history_stats(sensor: &Sensor) -> Option<HistoryStats> {
    if sensor.historical_data.is_empty() {
        return None;
    }

    let mut min = f64::MAX;
    let mut max = f64::MIN;
    let mut sum = 0.0;
    for point in &sensor.historical_data {
        min = min.min(point.value);
        max = max.max(point.value);
        sum += point.value;
    }

    Some(HistoryStats {
        min,
        avg: round1(sum / sensor.historical_data.len() as f64),
        max,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::models::{
        ConnectionStatus, HistoryPoint, HistorySource, Reading, StatusTag,
    };

    fn connected(address: &str, metric: MetricType, value: f64) -> Sensor {
        let now = Utc::now();
        let historical_data = (0..24)
            .map(|i| HistoryPoint {
                timestamp: now - Duration::hours(23 - i),
                value: value + i as f64,
                unit: "%".to_string(),
            })
            .collect();

        Sensor {
            id: format!("dev_{address}"),
            name: format!("Device ({address})"),
            address: address.to_string(),
            metric_type: Some(metric),
            location: None,
            status: StatusTag::Normal,
            connection_status: ConnectionStatus::Connected,
            latest_reading: Some(Reading {
                value,
                unit: "%".to_string(),
                timestamp: now,
                raw: None,
            }),
            historical_data,
            history_source: HistorySource::Synthesized,
            device_info: None,
            last_updated: now,
        }
    }

    fn fleet(sensors: Vec<Sensor>) -> BTreeMap<String, Sensor> {
        sensors
            .into_iter()
            .map(|s| (s.address.clone(), s))
            .collect()
    }

    #[test]
    fn test_empty_fleet() {
        let snapshot = aggregate(&BTreeMap::new(), 24);

        assert_eq!(snapshot.connected_count, 0);
        assert_eq!(snapshot.total_count, 0);
        assert!(snapshot.averages.is_empty());
        assert!(snapshot.moisture_risk.is_none());
        assert_eq!(snapshot.chart.len(), 24);
        assert!(snapshot.chart.iter().all(|p| p.values.is_empty()));
    }

    #[test]
    fn test_average_over_connected_only() {
        let sensors = fleet(vec![
            connected("10.0.0.5", MetricType::SoilMoisture, 40.0),
            connected("10.0.0.6", MetricType::SoilMoisture, 44.0),
            Sensor::unavailable("10.0.0.7", ConnectionStatus::Disconnected),
        ]);

        let snapshot = aggregate(&sensors, 24);

        assert_eq!(snapshot.average(MetricType::SoilMoisture), Some(42.0));
        assert_eq!(snapshot.connected_count, 2);
        assert_eq!(snapshot.total_count, 3);
    }

    #[test]
    fn test_metric_with_no_connected_sensor_has_no_average() {
        let sensors = fleet(vec![
            connected("10.0.0.5", MetricType::Temperature, 21.0),
            Sensor::unavailable("10.0.0.6", ConnectionStatus::Error),
        ]);

        let snapshot = aggregate(&sensors, 24);

        // No soil moisture data: absent, not zero, and no risk band either.
        assert_eq!(snapshot.average(MetricType::SoilMoisture), None);
        assert!(snapshot.moisture_risk.is_none());
        assert_eq!(snapshot.average(MetricType::Temperature), Some(21.0));
        assert!(snapshot
            .averages
            .values()
            .all(|v| v.is_finite()));
    }

    #[test]
    fn test_order_independent_reduction() {
        let forward = fleet(vec![
            connected("10.0.0.5", MetricType::SoilMoisture, 35.0),
            connected("10.0.0.6", MetricType::SoilMoisture, 55.0),
            connected("10.0.0.7", MetricType::Temperature, 18.5),
        ]);
        let mut reversed: Vec<Sensor> = forward.values().cloned().collect();
        reversed.reverse();
        let reversed = fleet(reversed);

        let a = aggregate(&forward, 24);
        let b = aggregate(&reversed, 24);

        assert_eq!(a.averages, b.averages);
        assert_eq!(a.connected_count, b.connected_count);
        assert_eq!(
            a.chart.iter().map(|p| &p.values).collect::<Vec<_>>(),
            b.chart.iter().map(|p| &p.values).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_moisture_risk_follows_average() {
        let dry = fleet(vec![connected("10.0.0.5", MetricType::SoilMoisture, 20.0)]);
        assert_eq!(
            aggregate(&dry, 24).moisture_risk,
            Some(MoistureRisk::Critical)
        );

        let wet = fleet(vec![connected("10.0.0.5", MetricType::SoilMoisture, 80.0)]);
        assert_eq!(aggregate(&wet, 24).moisture_risk, Some(MoistureRisk::Low));
    }

    #[test]
    fn test_chart_uses_first_connected_representative() {
        let sensors = fleet(vec![
            connected("10.0.0.5", MetricType::SoilMoisture, 30.0),
            connected("10.0.0.6", MetricType::SoilMoisture, 90.0),
        ]);

        let snapshot = aggregate(&sensors, 24);

        assert_eq!(snapshot.chart.len(), 24);
        assert_eq!(snapshot.chart[0].time, "00:00");
        assert_eq!(snapshot.chart[23].time, "23:00");
        // Representative is 10.0.0.5 (first in address order): bucket i
        // carries 30.0 + i.
        assert_eq!(
            snapshot.chart[0].values.get(&MetricType::SoilMoisture),
            Some(&30.0)
        );
        assert_eq!(
            snapshot.chart[23].values.get(&MetricType::SoilMoisture),
            Some(&53.0)
        );
    }

    #[test]
    fn test_chart_bucket_beyond_history_is_empty() {
        let mut short = connected("10.0.0.5", MetricType::Temperature, 20.0);
        short.historical_data.truncate(6);
        let sensors = fleet(vec![short]);

        let snapshot = aggregate(&sensors, 24);

        assert!(snapshot.chart[5]
            .values
            .contains_key(&MetricType::Temperature));
        assert!(snapshot.chart[6].values.is_empty());
    }

    #[test]
    fn test_history_stats() {
        let sensor = connected("10.0.0.5", MetricType::SoilMoisture, 10.0);
        // Window values are 10..=33.
        let stats = history_stats(&sensor).unwrap();

        assert_eq!(stats.min, 10.0);
        assert_eq!(stats.max, 33.0);
        assert_eq!(stats.avg, 21.5);
    }

    #[test]
    fn test_history_stats_empty_window() {
        let sensor = Sensor::unavailable("10.0.0.5", ConnectionStatus::Disconnected);
        assert!(history_stats(&sensor).is_none());
    }

    #[test]
    fn test_input_not_mutated() {
        let sensors = fleet(vec![connected("10.0.0.5", MetricType::SoilMoisture, 42.0)]);
        let before: Vec<String> = sensors.keys().cloned().collect();

        let _ = aggregate(&sensors, 24);

        let after: Vec<String> = sensors.keys().cloned().collect();
        assert_eq!(before, after);
        assert_eq!(sensors["10.0.0.5"].historical_data.len(), 24);
    }
}
