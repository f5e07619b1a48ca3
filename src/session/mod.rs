pub mod driver;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::stop::{StopId, StopRecord};

/// Path of the generated heatmap, relative to the service root.
pub const HEATMAP_PATH: &str = "/heatmap.svg";

/// A map coordinate as it travels over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// The start stop of the next search.
///
/// Serialized as `{ id, name, lat, lon }`, which is also the shape of
/// `startStop` in a search submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedStop {
    pub id: StopId,
    pub name: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

impl SelectedStop {
    pub fn new(id: StopId, name: String, lat: f64, lon: f64) -> Self {
        Self {
            id,
            name,
            lat: Some(lat),
            lon: Some(lon),
        }
    }

    pub fn position(&self) -> Option<LatLng> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some(LatLng::new(lat, lon)),
            _ => None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        *self == Self::default()
    }
}

impl Default for SelectedStop {
    fn default() -> Self {
        Self {
            id: StopId::new("0"),
            name: "Startpoint".to_owned(),
            lat: None,
            lon: None,
        }
    }
}

impl From<&StopRecord> for SelectedStop {
    fn from(stop: &StopRecord) -> Self {
        Self::new(stop.id.clone(), stop.name.clone(), stop.lat, stop.lon)
    }
}

/// URL of the overlay raster. Every refresh gets a strictly newer
/// `timestamp` query parameter so the image is never served from cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeatmapOverlayRef {
    path: String,
    timestamp: Option<i64>,
}

impl HeatmapOverlayRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            timestamp: None,
        }
    }

    pub fn refreshed(&self, now: DateTime<Utc>) -> Self {
        let millis = now.timestamp_millis();
        let timestamp = match self.timestamp {
            Some(prev) if millis <= prev => prev + 1,
            _ => millis,
        };

        Self {
            path: self.path.clone(),
            timestamp: Some(timestamp),
        }
    }

    pub fn url(&self) -> String {
        match self.timestamp {
            Some(t) => format!("{}?timestamp={t}", self.path),
            None => self.path.clone(),
        }
    }
}

impl Default for HeatmapOverlayRef {
    fn default() -> Self {
        Self::new(HEATMAP_PATH)
    }
}

impl fmt::Display for HeatmapOverlayRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    SelectStop(SelectedStop),
    SetDateTime(DateTime<Utc>),
    ReplaceOverlay(HeatmapOverlayRef),
}

/// Page-level session state. Never mutated in place: every [`Update`]
/// produces a new value.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub selected_stop: SelectedStop,
    pub selected_date_time: DateTime<Utc>,
    pub overlay: HeatmapOverlayRef,
}

impl SessionState {
    pub fn mount(now: DateTime<Utc>) -> Self {
        Self {
            selected_stop: SelectedStop::default(),
            selected_date_time: now,
            overlay: HeatmapOverlayRef::default(),
        }
    }

    #[must_use]
    pub fn apply(&self, update: Update) -> Self {
        match update {
            Update::SelectStop(selected_stop) => Self {
                selected_stop,
                ..self.clone()
            },
            Update::SetDateTime(selected_date_time) => Self {
                selected_date_time,
                ..self.clone()
            },
            Update::ReplaceOverlay(overlay) => Self {
                overlay,
                ..self.clone()
            },
        }
    }
}

/// Hands out request sequence numbers. Only the most recently issued number
/// is current; completions carrying an older one are stale.
#[derive(Debug, Default)]
pub struct Sequencer {
    issued: u64,
}

impl Sequencer {
    pub fn issue(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    pub fn is_current(&self, seq: u64) -> bool {
        seq == self.issued
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(millis).unwrap()
    }

    #[test]
    fn mounts_with_placeholder() {
        let state = SessionState::mount(at(1_000));

        assert!(state.selected_stop.is_placeholder());
        assert_eq!(state.selected_stop.name, "Startpoint");
        assert_eq!(state.selected_stop.position(), None);
        assert_eq!(state.selected_date_time, at(1_000));
        assert_eq!(state.overlay.url(), "/heatmap.svg");
    }

    #[test]
    fn apply_replaces_one_field() {
        let state = SessionState::mount(at(0));
        let stop = SelectedStop::new(StopId::new("7"), "Test Stop".to_owned(), 54.36, 18.65);

        let next = state.apply(Update::SelectStop(stop.clone()));

        assert_eq!(next.selected_stop, stop);
        assert_eq!(next.selected_date_time, state.selected_date_time);
        assert_eq!(next.overlay, state.overlay);
        assert!(state.selected_stop.is_placeholder());
    }

    #[test]
    fn refreshed_overlay_always_changes() {
        let overlay = HeatmapOverlayRef::default();

        let first = overlay.refreshed(at(5_000));
        let second = first.refreshed(at(5_000));
        let third = second.refreshed(at(4_000));

        assert_eq!(first.url(), "/heatmap.svg?timestamp=5000");
        assert_eq!(second.url(), "/heatmap.svg?timestamp=5001");
        assert_eq!(third.url(), "/heatmap.svg?timestamp=5002");
        assert!([&first, &second, &third]
            .iter()
            .all(|o| o.path == HEATMAP_PATH));
    }

    #[test]
    fn placeholder_serializes_with_null_coordinates() {
        let json = serde_json::to_value(SelectedStop::default()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"id": "0", "name": "Startpoint", "lat": null, "lon": null})
        );
    }

    #[test]
    fn sequencer_tracks_latest() {
        let mut seq = Sequencer::default();
        let first = seq.issue();
        let second = seq.issue();

        assert!(!seq.is_current(first));
        assert!(seq.is_current(second));
    }
}
