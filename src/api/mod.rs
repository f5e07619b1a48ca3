//! Wire contract between the session and the backend service.
//!
//! Field names follow what goes over the wire, not the internal model: a
//! nearest-stop answer carries `lng`, while a [`SelectedStop`] carries `lon`.

pub mod http;

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    catalog::stop::{StopId, StopRecord},
    session::{LatLng, SelectedStop},
};

/// Script the processing endpoint runs for a search.
pub const SCRIPT_NAME: &str = "algorithm.py";

/// Response of `POST /get-nearest-stop`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearestStop {
    pub id: StopId,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
}

impl NearestStop {
    pub fn position(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }
}

impl From<&StopRecord> for NearestStop {
    fn from(stop: &StopRecord) -> Self {
        Self {
            id: stop.id.clone(),
            name: stop.name.clone(),
            lat: stop.lat,
            lng: stop.lon,
        }
    }
}

impl From<NearestStop> for SelectedStop {
    fn from(stop: NearestStop) -> Self {
        SelectedStop::new(stop.id, stop.name, stop.lat, stop.lng)
    }
}

/// Body of `POST /run-script`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub script_name: String,
    #[serde(rename = "startStop")]
    pub start_stop: SelectedStop,
    /// ISO-8601 UTC timestamp with milliseconds.
    #[serde(rename = "dateTime")]
    pub date_time: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("HTTP error! status: {0}")]
    Status(u16),
    #[error("invalid response body: {0}")]
    Decode(String),
}

/// The calls a session makes to the outside world.
pub trait Backend: Clone + Send + Sync + 'static {
    fn fetch_text(&self, url: &str) -> impl Future<Output = Result<String, ApiError>> + Send;

    fn nearest_stop(
        &self,
        at: LatLng,
    ) -> impl Future<Output = Result<NearestStop, ApiError>> + Send;

    fn submit_search(
        &self,
        request: &SearchRequest,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;
}
