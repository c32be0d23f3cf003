use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ── Data Model ──────────────────────────────────────────────────────────────

/// Status the nearby-search query must report for a seed to be usable.
pub const SUCCESS_STATUS: &str = "OK";

/// Written to both link fields when the operator rejects a candidate.
pub const UNUSABLE: &str = "NA";

pub const DEFAULT_VIEWER_HOST: &str = "www.instantstreetview.com";

/// The whole store: seeds in file order.
pub type Collection = Vec<Seed>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Seed {
    #[serde(rename = "nearbyStations")]
    pub nearby: NearbyQuery,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NearbyQuery {
    pub status: String,
    #[serde(default)]
    pub results: Vec<Candidate>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub geometry: Geometry,
    #[serde(rename = "gmapsLink", default, skip_serializing_if = "Option::is_none")]
    pub captured_image_ref: Option<String>,
    #[serde(rename = "isvLink", default, skip_serializing_if = "Option::is_none")]
    pub source_view_ref: Option<String>,
    #[serde(rename = "imageLink", default, skip_serializing_if = "Option::is_none")]
    pub extracted_image_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub location: Location,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Location {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self {
            lat,
            lng,
            extra: Map::new(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Unannotated,
    Captured,
    MarkedBad,
}

impl Seed {
    pub fn candidates(&self) -> &[Candidate] {
        &self.nearby.results
    }

    /// A seed takes part in navigation and progress only if its query
    /// succeeded and returned at least one candidate.
    pub fn is_eligible(&self) -> bool {
        self.nearby.status == SUCCESS_STATUS && !self.nearby.results.is_empty()
    }

    /// True when no candidate of this seed has been processed yet.
    pub fn is_untouched(&self) -> bool {
        self.nearby.results.iter().all(|c| !c.is_annotated())
    }
}

impl Candidate {
    pub fn new(location: Location) -> Self {
        Self {
            geometry: Geometry {
                location,
                extra: Map::new(),
            },
            captured_image_ref: None,
            source_view_ref: None,
            extracted_image_url: None,
            extra: Map::new(),
        }
    }

    pub fn location(&self) -> &Location {
        &self.geometry.location
    }

    /// Captured and marked-bad candidates both count as processed.
    pub fn is_annotated(&self) -> bool {
        self.captured_image_ref
            .as_deref()
            .is_some_and(|link| !link.is_empty())
    }

    /// A share link without a recorded viewer url still counts as captured:
    /// only the pair of `NA` sentinels marks a candidate bad.
    pub fn outcome(&self) -> Outcome {
        if !self.is_annotated() {
            return Outcome::Unannotated;
        }
        let bad = self.captured_image_ref.as_deref() == Some(UNUSABLE)
            && self.source_view_ref.as_deref() == Some(UNUSABLE);
        if bad {
            Outcome::MarkedBad
        } else {
            Outcome::Captured
        }
    }

    pub fn mark_bad(&mut self) {
        self.captured_image_ref = Some(UNUSABLE.to_string());
        self.source_view_ref = Some(UNUSABLE.to_string());
    }
}

/// Position of the displayed `(seed, candidate)` pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Cursor {
    pub seed: usize,
    pub candidate: usize,
}

impl Cursor {
    pub fn new(seed: usize, candidate: usize) -> Self {
        Self { seed, candidate }
    }
}

pub fn viewer_url(host: &str, location: &Location) -> String {
    format!(
        "https://{host}/@{},{},0h,0p,0z",
        location.lat, location.lng
    )
}
