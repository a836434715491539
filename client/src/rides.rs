use ride_api::{FareUpdate, Location, NewRide, RidePost};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::info;

use crate::{
    error::{ClientError, ClientResult},
    http::{ApiClient, Auth},
    view::{Loadable, ViewState},
};

pub const MAX_SEATS: u32 = 8;

pub async fn create_ride(api: &ApiClient, ride: &NewRide) -> ClientResult<RidePost> {
    api.post("/rides", ride, Auth::Bearer).await
}

pub async fn list_rides(api: &ApiClient) -> ClientResult<Vec<RidePost>> {
    api.get("/rides", Auth::Bearer).await
}

pub async fn get_ride(api: &ApiClient, id: &str) -> ClientResult<RidePost> {
    api.get(&format!("/rides/{id}"), Auth::Bearer).await
}

pub async fn accept_ride(api: &ApiClient, id: &str) -> ClientResult<RidePost> {
    api.post(&format!("/rides/{id}/accept"), &serde_json::json!({}), Auth::Bearer)
        .await
}

pub async fn cancel_ride(api: &ApiClient, id: &str) -> ClientResult<RidePost> {
    api.post(&format!("/rides/{id}/cancel"), &serde_json::json!({}), Auth::Bearer)
        .await
}

pub async fn update_fare(api: &ApiClient, id: &str, cost: f64) -> ClientResult<RidePost> {
    api.patch(&format!("/rides/{id}/fare"), &FareUpdate { cost }, Auth::Bearer)
        .await
}

fn parse_cost(raw: &str) -> ClientResult<f64> {
    let cost: f64 = raw
        .trim()
        .parse()
        .map_err(|_| ClientError::validation("Cost must be a number"))?;
    if !cost.is_finite() || cost < 0.0 {
        return Err(ClientError::validation("Cost cannot be negative"));
    }
    Ok(cost)
}

/// Raw inputs of the "post a ride" page.
#[derive(Debug, Clone, Default)]
pub struct RideForm {
    pub pickup: Option<Location>,
    pub dropoff: Option<Location>,
    pub cost: String,
    pub seats: String,
    /// RFC 3339 timestamp.
    pub departure: String,
}

impl RideForm {
    pub fn validate(&self, now: OffsetDateTime) -> ClientResult<NewRide> {
        let pickup = self
            .pickup
            .clone()
            .ok_or_else(|| ClientError::validation("Pickup location is required"))?;
        let dropoff = self
            .dropoff
            .clone()
            .ok_or_else(|| ClientError::validation("Dropoff location is required"))?;
        if pickup.lat == dropoff.lat && pickup.lng == dropoff.lng {
            return Err(ClientError::validation(
                "Pickup and dropoff must be different places",
            ));
        }
        if self.cost.trim().is_empty() {
            return Err(ClientError::validation("Cost is required"));
        }
        let cost = parse_cost(&self.cost)?;
        let seats: u32 = self
            .seats
            .trim()
            .parse()
            .map_err(|_| ClientError::validation("Seats must be a whole number"))?;
        if !(1..=MAX_SEATS).contains(&seats) {
            return Err(ClientError::validation(format!(
                "Seats must be between 1 and {MAX_SEATS}"
            )));
        }
        let departure_time = OffsetDateTime::parse(self.departure.trim(), &Rfc3339)
            .map_err(|_| ClientError::validation("Departure time is required"))?;
        if departure_time <= now {
            return Err(ClientError::validation("Departure time must be in the future"));
        }
        Ok(NewRide {
            pickup,
            dropoff,
            cost,
            seats,
            departure_time,
        })
    }

    pub async fn submit(&self, api: &ApiClient) -> ClientResult<RidePost> {
        let ride = self.validate(OffsetDateTime::now_utc())?;
        let post = create_ride(api, &ride).await?;
        info!(ride = %post.id, "ride posted");
        Ok(post)
    }
}

/// Dashboard list of ride posts.
pub struct RideBoard {
    state: ViewState<Vec<RidePost>>,
}

impl Default for RideBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl RideBoard {
    pub fn new() -> Self {
        Self {
            state: ViewState::new(),
        }
    }

    pub async fn reload(&self, api: &ApiClient) {
        self.state.load(|| list_rides(api)).await;
    }

    pub fn snapshot(&self) -> Loadable<Vec<RidePost>> {
        self.state.snapshot()
    }

    /// Posts still waiting for someone, excluding the viewer's own.
    pub fn open_for(&self, me: &str) -> Vec<RidePost> {
        self.state
            .snapshot()
            .ready()
            .map(|l| {
                l.iter()
                    .filter(|r| !r.accepted && r.poster.id != me)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn posted_by(&self, me: &str) -> Vec<RidePost> {
        self.state
            .snapshot()
            .ready()
            .map(|l| l.iter().filter(|r| r.poster.id == me).cloned().collect())
            .unwrap_or_default()
    }

    /// Swap in a post returned by a mutation elsewhere.
    pub fn replace(&self, post: RidePost) {
        self.state.update(|list| {
            if let Some(slot) = list.iter_mut().find(|r| r.id == post.id) {
                *slot = post;
            }
        });
    }
}

/// Single ride page. Mutations only change local state once the backend
/// has confirmed them.
pub struct RideDetail {
    ride_id: String,
    state: ViewState<RidePost>,
}

impl RideDetail {
    pub fn new(ride_id: impl Into<String>) -> Self {
        Self {
            ride_id: ride_id.into(),
            state: ViewState::new(),
        }
    }

    pub async fn load(&self, api: &ApiClient) {
        self.state.load(|| get_ride(api, &self.ride_id)).await;
    }

    pub fn snapshot(&self) -> Loadable<RidePost> {
        self.state.snapshot()
    }

    pub fn is_accepted(&self) -> bool {
        self.state.snapshot().ready().map(|r| r.accepted).unwrap_or(false)
    }

    fn current(&self) -> ClientResult<RidePost> {
        self.state
            .snapshot()
            .ready()
            .cloned()
            .ok_or_else(|| ClientError::validation("Ride is not loaded yet"))
    }

    pub async fn accept(&self, api: &ApiClient, me: &str) -> ClientResult<RidePost> {
        let ride = self.current()?;
        if ride.poster.id == me {
            return Err(ClientError::validation("You cannot accept your own ride"));
        }
        if ride.accepted {
            return Err(ClientError::validation("Ride already accepted"));
        }
        let updated = accept_ride(api, &self.ride_id).await?;
        info!(ride = %self.ride_id, "ride accepted");
        self.state.set(Loadable::Ready(updated.clone()));
        Ok(updated)
    }

    pub async fn cancel(&self, api: &ApiClient) -> ClientResult<RidePost> {
        let updated = cancel_ride(api, &self.ride_id).await?;
        info!(ride = %self.ride_id, "ride cancelled");
        self.state.set(Loadable::Ready(updated.clone()));
        Ok(updated)
    }

    pub async fn update_fare(&self, api: &ApiClient, cost: &str) -> ClientResult<RidePost> {
        let cost = parse_cost(cost)?;
        let updated = update_fare(api, &self.ride_id, cost).await?;
        self.state.set(Loadable::Ready(updated.clone()));
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn loc(name: &str, lat: f64) -> Location {
        Location {
            name: name.into(),
            lat,
            lng: 12.5,
        }
    }

    fn form() -> RideForm {
        RideForm {
            pickup: Some(loc("Library", 41.9)),
            dropoff: Some(loc("Station", 41.8)),
            cost: "4.50".into(),
            seats: "3".into(),
            departure: "2030-05-01T08:30:00Z".into(),
        }
    }

    #[test]
    fn valid_form_builds_request() {
        let ride = form().validate(OffsetDateTime::now_utc()).unwrap();
        assert_eq!(ride.seats, 3);
        assert_eq!(ride.cost, 4.5);
    }

    #[test]
    fn form_rejects_bad_inputs() {
        let now = OffsetDateTime::now_utc();
        let mut f = form();
        f.pickup = None;
        assert_eq!(f.validate(now).unwrap_err().to_string(), "Pickup location is required");

        let mut f = form();
        f.dropoff = f.pickup.clone();
        assert!(f.validate(now).is_err());

        let mut f = form();
        f.seats = "0".into();
        assert!(f.validate(now).is_err());

        let mut f = form();
        f.cost = "-1".into();
        assert_eq!(f.validate(now).unwrap_err().to_string(), "Cost cannot be negative");

        let f = form();
        let later = OffsetDateTime::parse("2030-05-01T08:30:00Z", &Rfc3339).unwrap() + Duration::minutes(1);
        assert!(f.validate(later).is_err());
    }

    #[tokio::test]
    async fn accept_needs_loaded_ride() {
        let api = ApiClient::new(
            url::Url::parse("http://127.0.0.1:9/api").unwrap(),
            std::time::Duration::from_secs(1),
        )
        .unwrap();
        let detail = RideDetail::new("r1");
        assert!(detail.accept(&api, "me").await.is_err());
        assert!(!detail.is_accepted());
    }
}
