//! The page event loop.
//!
//! A [`Page`] is the only thing that touches session state. Network calls run
//! as spawned tasks and report back as [`Event`]s on a channel; the page
//! applies them one at a time, so no locking is needed.

use std::future::Future;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::info;

use crate::{
    api::{ApiError, Backend, NearestStop},
    catalog::{Catalog, CatalogSource},
    map::{MapController, MarkerIcons},
    search::{SearchStatus, SearchTrigger},
    selector::{Dropdown, StopSelector},
    session::{LatLng, SessionState, Update},
};

#[derive(Debug)]
pub enum Event {
    CatalogLoaded(Catalog),
    ToggleDropdown(Dropdown),
    SelectStop(usize),
    SetDateTime(DateTime<Utc>),
    MapClicked(LatLng),
    NearestStopResolved {
        seq: u64,
        result: Result<NearestStop, ApiError>,
    },
    SearchRequested,
    SearchFinished {
        seq: u64,
        result: Result<(), ApiError>,
    },
}

pub struct Page<B> {
    backend: B,
    catalog: Catalog,
    state: SessionState,
    selector: StopSelector,
    map: MapController,
    search: SearchTrigger,
    tx: mpsc::UnboundedSender<Event>,
    rx: mpsc::UnboundedReceiver<Event>,
    in_flight: usize,
}

impl<B: Backend> Page<B> {
    pub fn new(backend: B, now: DateTime<Utc>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        Self {
            backend,
            catalog: Catalog::default(),
            state: SessionState::mount(now),
            selector: StopSelector::default(),
            map: MapController::new(MarkerIcons::default()),
            search: SearchTrigger::default(),
            tx,
            rx,
            in_flight: 0,
        }
    }

    /// Starts loading the stop catalog in the background.
    pub fn mount(&mut self, source: CatalogSource) {
        let backend = self.backend.clone();
        self.spawn(async move { Event::CatalogLoaded(Catalog::load(&source, &backend).await) });
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn selector(&self) -> &StopSelector {
        &self.selector
    }

    pub fn map(&self) -> &MapController {
        &self.map
    }

    pub fn search_status(&self) -> SearchStatus {
        self.search.status()
    }

    pub fn dispatch(&mut self, event: Event) {
        match event {
            Event::CatalogLoaded(catalog) => {
                self.catalog = catalog;
            }
            Event::ToggleDropdown(dropdown) => self.selector.toggle(dropdown),
            Event::SelectStop(index) => {
                if let Some(stop) = self.selector.select(&self.catalog, index) {
                    info!(id = %stop.id, name = %stop.name, "Selected start stop");
                    self.map.cancel_click();
                    self.commit(Update::SelectStop(stop));
                }
            }
            Event::SetDateTime(at) => self.commit(Update::SetDateTime(at)),
            Event::MapClicked(at) => {
                let seq = self.map.begin_click(at);
                let backend = self.backend.clone();
                self.spawn(async move {
                    let result = backend.nearest_stop(at).await;
                    Event::NearestStopResolved { seq, result }
                });
            }
            Event::NearestStopResolved { seq, result } => {
                if let Some(stop) = self.map.finish_click(seq, result) {
                    info!(id = %stop.id, name = %stop.name, "Resolved nearest stop");
                    self.commit(Update::SelectStop(stop));
                }
            }
            Event::SearchRequested => {
                let (seq, request) = self.search.begin(&self.state);
                let backend = self.backend.clone();
                self.spawn(async move {
                    let result = backend.submit_search(&request).await;
                    Event::SearchFinished { seq, result }
                });
            }
            Event::SearchFinished { seq, result } => {
                let now = Utc::now();
                if let Some(overlay) = self.search.finish(seq, result, &self.state.overlay, now) {
                    self.commit(Update::ReplaceOverlay(overlay));
                }
            }
        }
    }

    /// Applies completions until no spawned task is outstanding.
    pub async fn settle(&mut self) {
        while self.in_flight > 0 {
            let Some(event) = self.rx.recv().await else {
                break;
            };
            self.in_flight -= 1;
            self.dispatch(event);
        }
    }

    fn commit(&mut self, update: Update) {
        self.state = self.state.apply(update);
        self.map.sync_with(&self.state.selected_stop);
    }

    fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = Event> + Send + 'static,
    {
        let tx = self.tx.clone();
        self.in_flight += 1;
        tokio::spawn(async move {
            // The page owns the receiver for its whole life.
            let _ = tx.send(task.await);
        });
    }
}
