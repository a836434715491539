use std::sync::atomic::{AtomicUsize, Ordering};

use ride_api::Location;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::{
    debounce::Debouncer,
    error::{ClientError, ClientResult},
    http::{decode, ensure_success, join_path},
    view::{Loadable, ViewState},
};

/// Shorter queries never reach the geocoder.
pub const MIN_QUERY_CHARS: usize = 3;
const MAX_RESULTS: &str = "5";

#[derive(Deserialize)]
struct GeocodeHit {
    display_name: String,
    lat: String,
    lon: String,
}

#[derive(Deserialize)]
struct RouteResponse {
    code: String,
    #[serde(default)]
    routes: Vec<RouteLeg>,
}

#[derive(Deserialize)]
struct RouteLeg {
    distance: f64,
    duration: f64,
}

/// Driving distance and time between two points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteSummary {
    pub distance_m: f64,
    pub duration_s: f64,
}

impl RouteSummary {
    pub fn distance_km(&self) -> f64 {
        self.distance_m / 1000.0
    }

    pub fn duration_min(&self) -> f64 {
        self.duration_s / 60.0
    }
}

/// Free-text place lookup. Hits with unreadable coordinates are skipped.
/// Queries under [`MIN_QUERY_CHARS`] are refused without a request.
pub async fn geocode(http: &reqwest::Client, base: &Url, query: &str) -> ClientResult<Vec<Location>> {
    let query = query.trim();
    if query.chars().count() < MIN_QUERY_CHARS {
        return Err(ClientError::validation(format!(
            "Type at least {MIN_QUERY_CHARS} characters to search places"
        )));
    }
    let url = join_path(base, "/search")?;
    let resp = http
        .get(url)
        .query(&[("format", "json"), ("limit", MAX_RESULTS), ("q", query)])
        .send()
        .await?;
    let hits: Vec<GeocodeHit> = decode(ensure_success(resp).await?).await?;
    Ok(hits
        .into_iter()
        .filter_map(|h| {
            Some(Location {
                lat: h.lat.parse().ok()?,
                lng: h.lon.parse().ok()?,
                name: h.display_name,
            })
        })
        .collect())
}

/// Driving route between two locations. `None` when no route exists.
pub async fn route(
    http: &reqwest::Client,
    base: &Url,
    from: &Location,
    to: &Location,
) -> ClientResult<Option<RouteSummary>> {
    let url = join_path(
        base,
        &format!(
            "/route/v1/driving/{},{};{},{}",
            from.lng, from.lat, to.lng, to.lat
        ),
    )?;
    let resp = http
        .get(url)
        .query(&[("overview", "false")])
        .send()
        .await?;
    let body: RouteResponse = decode(ensure_success(resp).await?).await?;
    if body.code != "Ok" {
        debug!(code = %body.code, "no route");
        return Ok(None);
    }
    Ok(body.routes.first().map(|r| RouteSummary {
        distance_m: r.distance,
        duration_s: r.duration,
    }))
}

/// Location autocomplete behind the pickup/dropoff inputs.
pub struct PlaceSearch {
    http: reqwest::Client,
    base: Url,
    debouncer: Debouncer,
    results: ViewState<Vec<Location>>,
    lookups: AtomicUsize,
}

impl PlaceSearch {
    pub fn new(http: reqwest::Client, base: Url, debounce: std::time::Duration) -> Self {
        Self {
            http,
            base,
            debouncer: Debouncer::new(debounce),
            results: ViewState::new(),
            lookups: AtomicUsize::new(0),
        }
    }

    /// Feed one keystroke's worth of input. Returns false when a newer input
    /// superseded this one, before its lookup ran or while it was in flight.
    pub async fn input(&self, query: &str) -> bool {
        let query = query.trim();
        if query.chars().count() < MIN_QUERY_CHARS {
            self.debouncer.cancel();
            self.results.set(Loadable::Ready(Vec::new()));
            return true;
        }
        let Some(generation) = self.debouncer.settle().await else {
            return false;
        };
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.results
            .load_if_current(
                || geocode(&self.http, &self.base, query),
                || self.debouncer.is_current(generation),
            )
            .await
    }

    pub fn results(&self) -> Loadable<Vec<Location>> {
        self.results.snapshot()
    }

    /// Number of geocoder requests issued so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn short_query_stays_local() {
        // unroutable address: any request would fail the test via lookups()
        let search = PlaceSearch::new(
            reqwest::Client::new(),
            Url::parse("http://127.0.0.1:9").unwrap(),
            Duration::from_millis(5),
        );
        assert!(search.input("ab").await);
        assert!(search.input("  ab  ").await);
        assert_eq!(search.lookups(), 0);
        assert_eq!(search.results(), Loadable::Ready(Vec::new()));
    }

    #[tokio::test]
    async fn short_query_is_refused_before_sending() {
        let err = geocode(
            &reqwest::Client::new(),
            &Url::parse("http://127.0.0.1:9").unwrap(),
            " ab ",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
    }

    #[test]
    fn route_summary_units() {
        let r = RouteSummary {
            distance_m: 2500.0,
            duration_s: 300.0,
        };
        assert_eq!(r.distance_km(), 2.5);
        assert_eq!(r.duration_min(), 5.0);
    }
}
