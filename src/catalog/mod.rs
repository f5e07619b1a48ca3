pub mod stop;

use std::{
    convert::Infallible,
    fs::File,
    io::Read,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::{
    api::Backend,
    catalog::stop::{StopId, StopRecord},
};

/// File name of the stop catalog, both on disk and under the service root.
pub const CATALOG_FILE: &str = "unified_stops.csv";

/// Where the catalog text comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogSource {
    Url(String),
    Path(PathBuf),
}

impl FromStr for CatalogSource {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with("http://") || s.starts_with("https://") {
            Ok(Self::Url(s.to_owned()))
        } else {
            Ok(Self::Path(PathBuf::from(s)))
        }
    }
}

/// Stops in the order they appear in the catalog file.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    stops: Vec<StopRecord>,
}

impl Catalog {
    pub fn new(stops: Vec<StopRecord>) -> Self {
        Self { stops }
    }

    /// Parses catalog text with the columns `name, code, lat, lon, type`.
    ///
    /// The first line is a header and is skipped. Rows without a name or a
    /// mode are dropped, as are rows whose coordinates are not numbers.
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_bytes());

        let mut stops = vec![];
        for (i, record) in rdr.records().enumerate() {
            // +2: one for the header, one for 1-based line numbers
            let record = record.with_context(|| format!("Malformed catalog row {}", i + 2))?;

            if let Some(stop) = parse_row(&record) {
                stops.push(stop);
            }
        }

        Ok(Self::new(stops))
    }

    pub fn read<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let mut text = String::new();
        File::open(path)
            .and_then(|mut f| f.read_to_string(&mut text))
            .with_context(|| format!("Failed to read stop catalog {}", path.display()))?;

        Self::parse(&text)
    }

    pub async fn fetch<B: Backend>(source: &CatalogSource, backend: &B) -> anyhow::Result<Self> {
        match source {
            CatalogSource::Path(path) => Self::read(path),
            CatalogSource::Url(url) => {
                let text = backend
                    .fetch_text(url)
                    .await
                    .with_context(|| format!("Failed to fetch stop catalog from {url}"))?;
                Self::parse(&text)
            }
        }
    }

    /// Like [`Catalog::fetch`], but a failure leaves an empty catalog behind.
    pub async fn load<B: Backend>(source: &CatalogSource, backend: &B) -> Self {
        match Self::fetch(source, backend).await {
            Ok(catalog) => {
                info!(stops = catalog.len(), "Parsed stop catalog");
                catalog
            }
            Err(err) => {
                warn!("Error fetching stops: {err:#}");
                Self::default()
            }
        }
    }

    pub fn stops(&self) -> &[StopRecord] {
        &self.stops
    }

    pub fn get(&self, index: usize) -> Option<&StopRecord> {
        self.stops.get(index)
    }

    /// Index of the first stop called exactly `name`.
    pub fn position_by_name(&self, name: &str) -> Option<usize> {
        self.stops.iter().position(|s| s.name == name)
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }
}

fn parse_row(record: &csv::StringRecord) -> Option<StopRecord> {
    let field = |i: usize| record.get(i).filter(|f| !f.is_empty());

    let name = field(0)?;
    let mode = field(4)?;
    let code = record.get(1).unwrap_or_default();

    let lat = field(2).and_then(|f| f.trim().parse::<f64>().ok());
    let lon = field(3).and_then(|f| f.trim().parse::<f64>().ok());

    match (lat, lon) {
        (Some(lat), Some(lon)) => Some(StopRecord::new(
            StopId::new(code),
            name.to_owned(),
            lat,
            lon,
            mode.to_owned(),
        )),
        _ => {
            debug!(name, code, "Skipping stop without numeric coordinates");
            None
        }
    }
}
