use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct StopId(String);

impl StopId {
    pub fn new(str: &str) -> Self {
        Self(str.to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Stop codes arrive as strings, but the placeholder selection is sent as a bare number.
impl<'de> Deserialize<'de> for StopId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(i64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => Self(s),
            Raw::Number(n) => Self(n.to_string()),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StopRecord {
    pub id: StopId,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    /// Transit mode tag, e.g. `rail` or `tram`.
    pub mode: String,
}

impl StopRecord {
    pub fn new(id: StopId, name: String, lat: f64, lon: f64, mode: String) -> Self {
        Self {
            id,
            name,
            lat,
            lon,
            mode,
        }
    }

    /// Text shown for this stop in the selector list.
    pub fn label(&self) -> String {
        format!("{} {}", self.name, self.mode.to_uppercase())
    }
}
