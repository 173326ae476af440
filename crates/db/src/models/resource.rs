use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

/// A dashboard listing backed by one table in the store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Resource {
    Hotels,
    Places,
    Festivals,
}

impl Resource {
    /// Table name in the store; also the collection key in listing envelopes.
    pub fn table(&self) -> &'static str {
        match self {
            Self::Hotels => "hotels",
            Self::Places => "places",
            Self::Festivals => "festivals",
        }
    }

    /// Key used for a single row in envelopes (`hotel`, `place`, `festival`).
    pub fn singular(&self) -> &'static str {
        match self {
            Self::Hotels => "hotel",
            Self::Places => "place",
            Self::Festivals => "festival",
        }
    }

    /// Column matched by the listing search box.
    pub fn search_column(&self) -> &'static str {
        "name"
    }
}
