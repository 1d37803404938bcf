//! Normalization of decoded feeds into the adapter's route/alert model.
//!
//! Trip updates become [`NormalizedRoute`]s with a next-arrival estimate and
//! a status derived from it; alerts become [`NormalizedAlert`]s. When an
//! [`EnrichmentSource`] is available, routes whose trip is known to the
//! static schedule also get a destination and next-stop name.

use serde::Serialize;
use tracing::debug;

use crate::gtfs_rt::{Alert, FeedEntity, FeedMessage, StopTimeUpdate, TripUpdate};
use crate::schedule::EnrichmentSource;

/// Minutes beyond which a route is reported as delayed.
///
/// This only measures how far away the next arrival is; it is not a
/// schedule deviation.
pub const DELAYED_AFTER_MINS: i64 = 5;

/// Message used for alerts without header text.
pub const DEFAULT_ALERT_MESSAGE: &str = "Service alert";

/// How many upcoming stops are looked up for `nextStopName`.
const NEXT_STOP_COUNT: usize = 1;

/// Route status shown to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RouteStatus {
    Unknown,
    OnTime,
    Delayed,
}

impl RouteStatus {
    /// Derive the status from the minutes until the next arrival.
    pub fn from_next_arrival(next_arrival: Option<i64>) -> Self {
        match next_arrival {
            None => RouteStatus::Unknown,
            Some(mins) if mins > DELAYED_AFTER_MINS => RouteStatus::Delayed,
            Some(_) => RouteStatus::OnTime,
        }
    }
}

/// Alert severity. Feeds do not drive this; every alert is `low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
}

/// A route with its next predicted arrival.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedRoute {
    pub id: String,
    pub name: String,
    pub system_id: String,
    pub status: RouteStatus,
    /// Whole minutes until the next arrival, `null` when none is predicted.
    pub next_arrival: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_stop_name: Option<String>,
}

impl NormalizedRoute {
    pub fn is_enriched(&self) -> bool {
        self.destination.is_some() || self.next_stop_name.is_some()
    }
}

/// A service alert.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedAlert {
    pub id: String,
    pub system_id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub message: String,
    pub severity: AlertSeverity,
    pub affected_routes: Vec<String>,
}

/// Routes and alerts of one feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NormalizedFeed {
    pub routes: Vec<NormalizedRoute>,
    pub alerts: Vec<NormalizedAlert>,
}

impl NormalizedFeed {
    /// Number of routes carrying a destination or next-stop name.
    pub fn enriched_count(&self) -> usize {
        self.routes.iter().filter(|r| r.is_enriched()).count()
    }
}

/// Minutes until the first predicted arrival strictly after `now`.
///
/// Stop time updates are scanned in feed order. Returns `None` when no
/// update predicts a future arrival.
pub fn next_arrival_minutes(updates: &[StopTimeUpdate], now: i64) -> Option<i64> {
    updates
        .iter()
        .filter_map(|stu| stu.arrival.as_ref()?.time)
        .find(|&time| time != 0 && time > now)
        .map(|time| ((time - now).div_euclid(60)).max(0))
}

/// Normalize a decoded feed for `system_id` as of `now` (epoch seconds).
///
/// Enrichment failures leave the affected fields unset and never fail the
/// batch.
pub async fn normalize(
    feed: &FeedMessage,
    system_id: &str,
    enrichment: Option<&dyn EnrichmentSource>,
    now: i64,
) -> NormalizedFeed {
    let mut out = NormalizedFeed::default();

    for (index, entity) in feed.entity.iter().enumerate() {
        if let Some(tu) = &entity.trip_update {
            let mut route = normalize_trip_update(entity, tu, index, system_id, now);
            if let (Some(source), Some(trip_id)) = (enrichment, non_empty(&tu.trip.trip_id)) {
                enrich(&mut route, source, trip_id).await;
            }
            out.routes.push(route);
        }

        if let Some(alert) = &entity.alert {
            out.alerts.push(normalize_alert(entity, alert, index, system_id));
        }
    }

    out
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn normalize_trip_update(
    entity: &FeedEntity,
    tu: &TripUpdate,
    index: usize,
    system_id: &str,
    now: i64,
) -> NormalizedRoute {
    // Fall back to the trip carried by the entity's vehicle position.
    let route_id = non_empty(&tu.trip.route_id).or_else(|| {
        entity
            .vehicle
            .as_ref()
            .and_then(|v| v.trip.as_ref())
            .and_then(|t| non_empty(&t.route_id))
    });

    let local_id = non_empty(&tu.trip.trip_id)
        .map(str::to_string)
        .or_else(|| (!entity.id.is_empty()).then(|| entity.id.clone()))
        .unwrap_or_else(|| index.to_string());

    let next_arrival = next_arrival_minutes(&tu.stop_time_update, now);

    NormalizedRoute {
        id: format!("{system_id}-{local_id}"),
        name: route_id.unwrap_or("unknown").to_string(),
        system_id: system_id.to_string(),
        status: RouteStatus::from_next_arrival(next_arrival),
        next_arrival,
        destination: None,
        next_stop_name: None,
    }
}

fn normalize_alert(
    entity: &FeedEntity,
    alert: &Alert,
    index: usize,
    system_id: &str,
) -> NormalizedAlert {
    let message = alert
        .header_text
        .as_ref()
        .and_then(|h| h.translation.first())
        .map(|t| t.text.clone())
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| DEFAULT_ALERT_MESSAGE.to_string());

    let affected_routes = alert
        .informed_entity
        .iter()
        .filter_map(|sel| non_empty(&sel.route_id))
        .map(str::to_string)
        .collect();

    NormalizedAlert {
        id: if entity.id.is_empty() {
            format!("alert-{index}")
        } else {
            entity.id.clone()
        },
        system_id: system_id.to_string(),
        kind: "alert",
        message,
        severity: AlertSeverity::Low,
        affected_routes,
    }
}

/// Fill destination and next stop from the static schedule, best effort.
async fn enrich(route: &mut NormalizedRoute, source: &dyn EnrichmentSource, trip_id: &str) {
    match source.trip_headsign(trip_id).await {
        Ok(headsign) => {
            route.destination = headsign.filter(|h| !h.trim().is_empty());
        }
        Err(e) => debug!(trip_id, error = %e, "no destination for trip"),
    }

    match source.next_stop_names(trip_id, NEXT_STOP_COUNT).await {
        Ok(names) => {
            route.next_stop_name = names.into_iter().find(|n| !n.trim().is_empty());
        }
        Err(e) => debug!(trip_id, error = %e, "no next stop for trip"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gtfs_rt::{
        EntitySelector, FeedHeader, StopTimeEvent, TranslatedString, TripDescriptor,
        VehiclePosition, translated_string::Translation,
    };
    use crate::schedule::EnrichmentError;
    use async_trait::async_trait;
    use proptest::prelude::*;

    const NOW: i64 = 1_700_000_000;

    fn arrival(time: i64) -> StopTimeUpdate {
        StopTimeUpdate {
            arrival: Some(StopTimeEvent {
                time: Some(time),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn trip_entity(
        id: &str,
        trip_id: Option<&str>,
        route_id: Option<&str>,
        arrivals: &[i64],
    ) -> FeedEntity {
        FeedEntity {
            id: id.to_string(),
            trip_update: Some(TripUpdate {
                trip: TripDescriptor {
                    trip_id: trip_id.map(str::to_string),
                    route_id: route_id.map(str::to_string),
                    ..Default::default()
                },
                stop_time_update: arrivals.iter().map(|&t| arrival(t)).collect(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn alert_entity(id: &str, header: Option<&str>, routes: &[&str]) -> FeedEntity {
        FeedEntity {
            id: id.to_string(),
            alert: Some(Alert {
                header_text: header.map(|text| TranslatedString {
                    translation: vec![Translation {
                        text: text.to_string(),
                        language: Some("en".to_string()),
                    }],
                }),
                informed_entity: routes
                    .iter()
                    .map(|r| EntitySelector {
                        route_id: Some(r.to_string()),
                        ..Default::default()
                    })
                    .collect(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn feed(entity: Vec<FeedEntity>) -> FeedMessage {
        FeedMessage {
            header: FeedHeader {
                gtfs_realtime_version: "2.0".to_string(),
                timestamp: None,
            },
            entity,
        }
    }

    async fn normalize_plain(feed: &FeedMessage) -> NormalizedFeed {
        normalize(feed, "mta-subway", None, NOW).await
    }

    #[tokio::test]
    async fn no_future_arrival_is_unknown() {
        let feed = feed(vec![
            trip_entity("e1", Some("T1"), Some("A"), &[NOW - 120, NOW]),
            trip_entity("e2", Some("T2"), Some("C"), &[]),
        ]);
        let out = normalize_plain(&feed).await;

        for route in &out.routes {
            assert_eq!(route.status, RouteStatus::Unknown);
            assert_eq!(route.next_arrival, None);
        }
    }

    #[tokio::test]
    async fn three_minutes_is_on_time_twelve_is_delayed() {
        let feed = feed(vec![
            trip_entity("e1", Some("T1"), Some("A"), &[NOW + 3 * 60]),
            trip_entity("e2", Some("T2"), Some("C"), &[NOW + 12 * 60]),
        ]);
        let out = normalize_plain(&feed).await;

        assert_eq!(out.routes[0].status, RouteStatus::OnTime);
        assert_eq!(out.routes[0].next_arrival, Some(3));
        assert_eq!(out.routes[1].status, RouteStatus::Delayed);
        assert_eq!(out.routes[1].next_arrival, Some(12));
    }

    #[tokio::test]
    async fn first_future_arrival_in_feed_order_wins() {
        let feed = feed(vec![trip_entity(
            "e1",
            Some("T1"),
            Some("A"),
            &[NOW - 30, NOW + 9 * 60, NOW + 2 * 60],
        )]);
        let out = normalize_plain(&feed).await;
        assert_eq!(out.routes[0].next_arrival, Some(9));
    }

    #[tokio::test]
    async fn route_ids_and_names() {
        let mut vehicle_fallback = trip_entity("e2", None, None, &[]);
        vehicle_fallback.vehicle = Some(VehiclePosition {
            trip: Some(TripDescriptor {
                route_id: Some("Q".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        });

        let feed = feed(vec![
            trip_entity("e1", Some("T1"), Some("A"), &[]),
            vehicle_fallback,
            trip_entity("", None, None, &[]),
        ]);
        let out = normalize_plain(&feed).await;

        assert_eq!(out.routes[0].id, "mta-subway-T1");
        assert_eq!(out.routes[0].name, "A");
        assert_eq!(out.routes[1].id, "mta-subway-e2");
        assert_eq!(out.routes[1].name, "Q");
        assert_eq!(out.routes[2].id, "mta-subway-2");
        assert_eq!(out.routes[2].name, "unknown");
        assert!(out.routes.iter().all(|r| r.system_id == "mta-subway"));
    }

    #[tokio::test]
    async fn alert_defaults_and_route_filtering() {
        let feed = feed(vec![
            alert_entity("a1", None, &["A", "", "C"]),
            alert_entity("a2", Some("Trains delayed"), &[]),
        ]);
        let out = normalize_plain(&feed).await;

        let first = &out.alerts[0];
        assert_eq!(first.message, DEFAULT_ALERT_MESSAGE);
        assert_eq!(first.severity, AlertSeverity::Low);
        assert_eq!(first.kind, "alert");
        assert_eq!(first.affected_routes, vec!["A", "C"]);

        assert_eq!(out.alerts[1].message, "Trains delayed");
        assert!(out.alerts[1].affected_routes.is_empty());
    }

    #[test]
    fn json_shape() {
        let route = NormalizedRoute {
            id: "mta-subway-T1".to_string(),
            name: "A".to_string(),
            system_id: "mta-subway".to_string(),
            status: RouteStatus::OnTime,
            next_arrival: None,
            destination: None,
            next_stop_name: Some("Inwood".to_string()),
        };
        let json = serde_json::to_value(&route).unwrap();
        assert_eq!(json["systemId"], "mta-subway");
        assert_eq!(json["status"], "on-time");
        assert!(json["nextArrival"].is_null());
        assert_eq!(json["nextStopName"], "Inwood");
        assert!(json.get("destination").is_none());

        let alert = NormalizedAlert {
            id: "a1".to_string(),
            system_id: "mta-subway".to_string(),
            kind: "alert",
            message: DEFAULT_ALERT_MESSAGE.to_string(),
            severity: AlertSeverity::Low,
            affected_routes: vec!["A".to_string()],
        };
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["type"], "alert");
        assert_eq!(json["severity"], "low");
        assert_eq!(json["affectedRoutes"][0], "A");
    }

    /// Schedule that knows one trip and fails for everything else.
    struct OneTrip;

    #[async_trait]
    impl EnrichmentSource for OneTrip {
        async fn trip_headsign(&self, trip_id: &str) -> Result<Option<String>, EnrichmentError> {
            match trip_id {
                "T1" => Ok(Some("Far Rockaway".to_string())),
                "T3" => Ok(Some(String::new())),
                _ => Err(EnrichmentError::UnknownTrip(trip_id.to_string())),
            }
        }

        async fn next_stop_names(
            &self,
            trip_id: &str,
            count: usize,
        ) -> Result<Vec<String>, EnrichmentError> {
            assert_eq!(count, 1);
            match trip_id {
                "T1" => Ok(vec!["Inwood".to_string()]),
                "T3" => Ok(vec![]),
                _ => Err(EnrichmentError::UnknownTrip(trip_id.to_string())),
            }
        }
    }

    #[tokio::test]
    async fn enrichment_is_best_effort_per_route() {
        let feed = feed(vec![
            trip_entity("e1", Some("T1"), Some("A"), &[NOW + 60]),
            trip_entity("e2", Some("T2"), Some("C"), &[NOW + 60]),
            trip_entity("e3", Some("T3"), Some("E"), &[NOW + 60]),
            trip_entity("e4", None, Some("F"), &[NOW + 60]),
        ]);
        let source: &dyn EnrichmentSource = &OneTrip;
        let out = normalize(&feed, "mta-subway", Some(source), NOW).await;

        assert_eq!(out.routes.len(), 4);
        assert_eq!(out.routes[0].destination.as_deref(), Some("Far Rockaway"));
        assert_eq!(out.routes[0].next_stop_name.as_deref(), Some("Inwood"));
        for route in &out.routes[1..] {
            assert_eq!(route.destination, None);
            assert_eq!(route.next_stop_name, None);
        }
        assert_eq!(out.enriched_count(), 1);
    }

    proptest! {
        #[test]
        fn status_follows_next_arrival(mins in proptest::option::of(0i64..10_000)) {
            let status = RouteStatus::from_next_arrival(mins);
            match mins {
                None => prop_assert_eq!(status, RouteStatus::Unknown),
                Some(m) if m > DELAYED_AFTER_MINS => prop_assert_eq!(status, RouteStatus::Delayed),
                Some(_) => prop_assert_eq!(status, RouteStatus::OnTime),
            }
        }

        #[test]
        fn next_arrival_is_floored_minutes(offset in 1i64..100_000) {
            let updates = vec![arrival(NOW + offset)];
            prop_assert_eq!(next_arrival_minutes(&updates, NOW), Some(offset / 60));
        }

        #[test]
        fn past_arrivals_never_count(offset in 0i64..100_000) {
            let updates = vec![arrival(NOW - offset)];
            prop_assert_eq!(next_arrival_minutes(&updates, NOW), None);
        }
    }
}
