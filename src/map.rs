use geo_types::{Coord, Point, Rect};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject};
use serde_json::json;
use tracing::{debug, warn};

use crate::{
    api::{ApiError, NearestStop},
    session::{HeatmapOverlayRef, LatLng, SelectedStop, Sequencer, SessionState},
};

pub const MAP_CENTER: LatLng = LatLng {
    lat: 54.3564194,
    lng: 18.6530101,
};
pub const MAP_ZOOM: u8 = 11;

pub const TILE_URL: &str = "https://{s}.basemaps.cartocdn.com/light_all/{z}/{x}/{y}{r}.png";
pub const TILE_ATTRIBUTION: &str = "&copy; <a href=\"https://www.openstreetmap.org/copyright\">OpenStreetMap</a> contributors &copy; <a href=\"https://carto.com/attributions\">CARTO</a>";

/// South-west and north-east corners the heatmap is stretched over.
pub const OVERLAY_SOUTH_WEST: LatLng = LatLng {
    lat: 54.229,
    lng: 18.11024,
};
pub const OVERLAY_NORTH_EAST: LatLng = LatLng {
    lat: 54.64288,
    lng: 19.165,
};
pub const OVERLAY_OPACITY: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerIcons {
    pub icon_url: String,
    pub icon_retina_url: String,
    pub shadow_url: String,
}

impl Default for MarkerIcons {
    fn default() -> Self {
        Self {
            icon_url: "/marker-icon.png".to_owned(),
            icon_retina_url: "/marker-icon-2x.png".to_owned(),
            shadow_url: "/marker-shadow.png".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClickPhase {
    Idle,
    AwaitingResolution { seq: u64, at: LatLng },
}

pub fn overlay_bounds() -> Rect {
    Rect::new(
        Coord {
            x: OVERLAY_SOUTH_WEST.lng,
            y: OVERLAY_SOUTH_WEST.lat,
        },
        Coord {
            x: OVERLAY_NORTH_EAST.lng,
            y: OVERLAY_NORTH_EAST.lat,
        },
    )
}

/// Owns the single marker and the click round trip.
#[derive(Debug)]
pub struct MapController {
    icons: MarkerIcons,
    marker: Option<LatLng>,
    phase: ClickPhase,
    clicks: Sequencer,
}

impl MapController {
    pub fn new(icons: MarkerIcons) -> Self {
        Self {
            icons,
            marker: None,
            phase: ClickPhase::Idle,
            clicks: Sequencer::default(),
        }
    }

    pub fn marker(&self) -> Option<LatLng> {
        self.marker
    }

    /// Moves the marker to the selected stop, if it has coordinates.
    pub fn sync_with(&mut self, stop: &SelectedStop) {
        if let Some(position) = stop.position() {
            self.marker = Some(position);
        }
    }

    /// Starts a nearest-stop lookup and returns its sequence number.
    pub fn begin_click(&mut self, at: LatLng) -> u64 {
        let seq = self.clicks.issue();
        debug!(seq, lat = at.lat, lng = at.lng, "Map clicked");
        self.phase = ClickPhase::AwaitingResolution { seq, at };
        seq
    }

    /// Drops any lookup still in flight, so its answer is treated as stale.
    pub fn cancel_click(&mut self) {
        if let ClickPhase::AwaitingResolution { seq, .. } = self.phase {
            debug!(seq, "Cancelling nearest-stop lookup");
        }
        self.phase = ClickPhase::Idle;
    }

    /// Applies a lookup result. Only the latest click counts; failures and
    /// stale answers leave the marker where it was.
    pub fn finish_click(
        &mut self,
        seq: u64,
        result: Result<NearestStop, ApiError>,
    ) -> Option<SelectedStop> {
        let at = match self.phase {
            ClickPhase::AwaitingResolution { seq: current, at } if current == seq => at,
            _ => {
                debug!(seq, "Discarding stale nearest-stop response");
                return None;
            }
        };
        self.phase = ClickPhase::Idle;

        match result {
            Ok(stop) => {
                self.marker = Some(stop.position());
                Some(stop.into())
            }
            Err(err) => {
                warn!(lat = at.lat, lng = at.lng, "Error fetching nearest stop: {err}");
                None
            }
        }
    }

    /// Describes the map as GeoJSON: the overlay rectangle, the marker if
    /// any, and the base layer settings as foreign members.
    pub fn render(&self, state: &SessionState) -> FeatureCollection {
        let mut features = vec![overlay_feature(&state.overlay)];
        if let Some(marker) = self.marker {
            features.push(marker_feature(marker, &self.icons, &state.selected_stop));
        }

        let mut view = JsonObject::new();
        view.insert("center".to_owned(), json!([MAP_CENTER.lat, MAP_CENTER.lng]));
        view.insert("zoom".to_owned(), json!(MAP_ZOOM));
        view.insert(
            "tiles".to_owned(),
            json!({ "url": TILE_URL, "attribution": TILE_ATTRIBUTION }),
        );

        FeatureCollection {
            bbox: None,
            features,
            foreign_members: Some(view),
        }
    }
}

fn feature(geometry: geojson::Value, properties: serde_json::Value) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(geometry)),
        id: None,
        properties: properties.as_object().cloned(),
        foreign_members: None,
    }
}

fn overlay_feature(overlay: &HeatmapOverlayRef) -> Feature {
    feature(
        geojson::Value::from(&overlay_bounds().to_polygon()),
        json!({
            "kind": "overlay",
            "url": overlay.url(),
            "opacity": OVERLAY_OPACITY,
        }),
    )
}

fn marker_feature(at: LatLng, icons: &MarkerIcons, stop: &SelectedStop) -> Feature {
    feature(
        geojson::Value::from(&Point::new(at.lng, at.lat)),
        json!({
            "kind": "marker",
            "stop_id": stop.id,
            "stop_name": stop.name,
            "icon_url": icons.icon_url,
            "icon_retina_url": icons.icon_retina_url,
            "shadow_url": icons.shadow_url,
        }),
    )
}
