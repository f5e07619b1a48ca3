use crate::{catalog::Catalog, session::SelectedStop};

/// Shown in place of the list when the catalog is empty.
pub const EMPTY_MESSAGE: &str = "No available endpoints";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dropdown {
    Startpoint,
}

/// What the selector currently draws.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListView {
    Closed,
    Empty(&'static str),
    Entries(Vec<String>),
}

/// At most one dropdown is open at a time.
#[derive(Debug, Default)]
pub struct StopSelector {
    active_dropdown: Option<Dropdown>,
}

impl StopSelector {
    pub fn toggle(&mut self, dropdown: Dropdown) {
        self.active_dropdown = if self.active_dropdown == Some(dropdown) {
            None
        } else {
            Some(dropdown)
        };
    }

    /// Picks entry `index` of the open list and closes it.
    ///
    /// Returns `None` without closing anything if no list is open or there
    /// is no such entry.
    pub fn select(&mut self, catalog: &Catalog, index: usize) -> Option<SelectedStop> {
        self.active_dropdown?;
        let stop = catalog.get(index)?;
        self.active_dropdown = None;

        Some(SelectedStop::from(stop))
    }

    pub fn button_label<'a>(&self, selected: &'a SelectedStop) -> &'a str {
        &selected.name
    }

    pub fn view(&self, dropdown: Dropdown, catalog: &Catalog) -> ListView {
        if self.active_dropdown != Some(dropdown) {
            ListView::Closed
        } else if catalog.is_empty() {
            ListView::Empty(EMPTY_MESSAGE)
        } else {
            ListView::Entries(catalog.stops().iter().map(|s| s.label()).collect())
        }
    }
}
