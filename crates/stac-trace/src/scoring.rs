//! Heuristic significance score for map features near a hotspot.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Free-form feature tags (`key -> value`).
pub type Tags = BTreeMap<String, String>;

/// Name used for features without `name` or `operator`.
pub const UNNAMED: &str = "Unnamed";

/// Structural granularity of a map feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Node,
    Way,
    Relation,
}

impl ElementKind {
    /// Parse an Overpass element `type` (`"point"` is accepted for nodes).
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "node" | "point" => Some(ElementKind::Node),
            "way" => Some(ElementKind::Way),
            "relation" => Some(ElementKind::Relation),
            _ => None,
        }
    }

    fn weight(self) -> u32 {
        match self {
            ElementKind::Relation => 15,
            ElementKind::Way => 10,
            ElementKind::Node => 5,
        }
    }
}

fn tag<'a>(tags: &'a Tags, key: &str) -> Option<&'a str> {
    tags.get(key).map(String::as_str)
}

/// Tag present with a non-empty value.
fn has(tags: &Tags, key: &str) -> bool {
    tags.get(key).is_some_and(|v| !v.is_empty())
}

fn is(tags: &Tags, key: &str, value: &str) -> bool {
    tag(tags, key) == Some(value)
}

/// Non-negative integer tag; anything else contributes nothing.
fn count(tags: &Tags, key: &str) -> Option<u32> {
    tag(tags, key).and_then(|v| v.trim().parse::<u32>().ok())
}

/// Additive significance score. Every applicable bonus accumulates.
///
/// `kind` is `None` for elements of unknown type, which get no structural
/// bonus.
/// Bonuses accumulate in `u64`; the result is clamped to `u32::MAX`.
pub fn significance_score(kind: Option<ElementKind>, tags: &Tags) -> u32 {
    let mut score = u64::from(kind.map(ElementKind::weight).unwrap_or(0));

    if has(tags, "name") && !is(tags, "name", UNNAMED) {
        score += 20;
    }
    if has(tags, "wikipedia") || has(tags, "wikidata") {
        score += 30;
    }
    if has(tags, "operator") {
        score += 10;
    }

    if tags.contains_key("military") {
        score += 100;
    }
    if is(tags, "aeroway", "aerodrome") {
        score += 80;
    }
    if is(tags, "power", "plant") {
        score += 70;
    }
    if is(tags, "amenity", "embassy") {
        score += 60;
    }
    if is(tags, "amenity", "government") {
        score += 50;
    }
    if is(tags, "amenity", "university") {
        score += 40;
    }
    if is(tags, "amenity", "hospital") {
        score += 35;
        if let Some(beds) = count(tags, "beds") {
            score += u64::from((beds / 10).min(30));
        }
    }
    if is(tags, "telecom", "data_center") || is(tags, "building", "data_center") {
        score += 45;
    }
    if is(tags, "railway", "station") {
        score += 35;
    }
    if is(tags, "landuse", "industrial") && has(tags, "name") {
        score += 30;
    }

    if let Some(levels) = count(tags, "building:levels") {
        if levels > 10 {
            score += u64::from(levels) * 2;
        }
    }
    if let Some(capacity) = count(tags, "capacity") {
        score += u64::from((capacity / 100).min(20));
    }

    match tag(tags, "importance") {
        Some("international") => score += 40,
        Some("national") => score += 30,
        Some("regional") => score += 20,
        _ => {}
    }

    u32::try_from(score).unwrap_or(u32::MAX)
}
