use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, info, warn};

use crate::{
    api::{ApiError, SearchRequest, SCRIPT_NAME},
    session::{HeatmapOverlayRef, Sequencer, SessionState},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchStatus {
    #[default]
    Idle,
    Pending,
    Completed,
    Failed,
}

/// Formats a timestamp the way the processing endpoint expects it,
/// e.g. `2024-05-01T08:30:00.000Z`.
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn build_request(state: &SessionState) -> SearchRequest {
    SearchRequest {
        script_name: SCRIPT_NAME.to_owned(),
        start_stop: state.selected_stop.clone(),
        date_time: iso_timestamp(state.selected_date_time),
    }
}

/// Submits searches and decides when the overlay gets swapped.
#[derive(Debug, Default)]
pub struct SearchTrigger {
    status: SearchStatus,
    searches: Sequencer,
}

impl SearchTrigger {
    pub fn status(&self) -> SearchStatus {
        self.status
    }

    pub fn begin(&mut self, state: &SessionState) -> (u64, SearchRequest) {
        let seq = self.searches.issue();
        self.status = SearchStatus::Pending;

        let request = build_request(state);
        if request.start_stop.is_placeholder() {
            warn!("Submitting search without a selected start stop");
        }
        debug!(
            seq,
            stop = %request.start_stop.id,
            date_time = %request.date_time,
            "Submitting search"
        );
        (seq, request)
    }

    /// Returns the overlay to show once the latest search has completed.
    pub fn finish(
        &mut self,
        seq: u64,
        result: Result<(), ApiError>,
        overlay: &HeatmapOverlayRef,
        now: DateTime<Utc>,
    ) -> Option<HeatmapOverlayRef> {
        if !self.searches.is_current(seq) {
            debug!(seq, "Discarding stale search completion");
            return None;
        }

        match result {
            Ok(()) => {
                self.status = SearchStatus::Completed;
                let next = overlay.refreshed(now);
                info!(url = %next, "new heatmap");
                Some(next)
            }
            Err(err) => {
                self.status = SearchStatus::Failed;
                warn!("Error fetching search results: {err}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::{
        catalog::stop::StopId,
        session::{SelectedStop, Update},
    };

    fn state() -> SessionState {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();
        SessionState::mount(at).apply(Update::SelectStop(SelectedStop::new(
            StopId::new("001"),
            "Gdańsk Główny".to_owned(),
            54.355,
            18.646,
        )))
    }

    #[test]
    fn request_carries_stop_and_time() {
        let request = build_request(&state());

        assert_eq!(request.script_name, "algorithm.py");
        assert_eq!(request.start_stop.id, StopId::new("001"));
        assert_eq!(request.date_time, "2024-05-01T08:30:00.000Z");
    }

    #[test]
    fn completion_refreshes_overlay() {
        let mut trigger = SearchTrigger::default();
        let state = state();

        let (seq, _) = trigger.begin(&state);
        assert_eq!(trigger.status(), SearchStatus::Pending);

        let next = trigger
            .finish(seq, Ok(()), &state.overlay, Utc::now())
            .unwrap();

        assert_eq!(trigger.status(), SearchStatus::Completed);
        assert_ne!(next, state.overlay);
        assert!(next.url().starts_with("/heatmap.svg?timestamp="));
    }

    #[test]
    fn failure_keeps_overlay() {
        let mut trigger = SearchTrigger::default();
        let state = state();

        let (seq, _) = trigger.begin(&state);
        let next = trigger.finish(
            seq,
            Err(ApiError::Transport("connection refused".to_owned())),
            &state.overlay,
            Utc::now(),
        );

        assert_eq!(next, None);
        assert_eq!(trigger.status(), SearchStatus::Failed);
    }

    #[test]
    fn stale_completion_is_ignored() {
        let mut trigger = SearchTrigger::default();
        let state = state();

        let (first, _) = trigger.begin(&state);
        let (_second, _) = trigger.begin(&state);

        assert_eq!(trigger.finish(first, Ok(()), &state.overlay, Utc::now()), None);
        assert_eq!(trigger.status(), SearchStatus::Pending);
    }
}
