//! Monitored venue areas.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProtoError;

/// The physical role an area plays in the venue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AreaType {
    /// Where visitors enter the venue.
    Entrance,
    /// Where visitors leave the venue.
    Exit,
    /// A passage connecting other areas.
    Corridor,
    /// A hall, courtyard or other space where crowds collect.
    GatheringSpace,
    /// Anything else.
    #[default]
    Other,
}

impl AreaType {
    /// Returns the area type as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Entrance => "entrance",
            Self::Exit => "exit",
            Self::Corridor => "corridor",
            Self::GatheringSpace => "gathering_space",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for AreaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AreaType {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "entrance" => Ok(Self::Entrance),
            "exit" => Ok(Self::Exit),
            "corridor" => Ok(Self::Corridor),
            "gathering_space" | "gathering-space" => Ok(Self::GatheringSpace),
            "other" => Ok(Self::Other),
            _ => Err(ProtoError::UnknownVariant {
                kind: "area type",
                value: s.to_string(),
            }),
        }
    }
}

/// A monitored area of the venue.
///
/// Areas are immutable once the venue configuration is loaded. Adjacency is
/// expressed by area id; the graph layer is responsible for checking that
/// every reference resolves and that edges are symmetric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredArea {
    /// Unique area identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Free-form location description shown to responders.
    #[serde(default)]
    pub location: String,
    /// Maximum safe occupancy, in people.
    pub capacity: u32,
    /// Ids of physically connected areas.
    #[serde(default)]
    pub adjacent_areas: Vec<String>,
    /// The role this area plays.
    #[serde(default, rename = "type")]
    pub area_type: AreaType,
}

impl MonitoredArea {
    /// Creates an area with no neighbours and an unspecified type.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, capacity: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            location: String::new(),
            capacity,
            adjacent_areas: Vec::new(),
            area_type: AreaType::Other,
        }
    }

    /// Sets the location description.
    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Adds an adjacent area.
    #[must_use]
    pub fn with_adjacent(mut self, area_id: impl Into<String>) -> Self {
        let area_id = area_id.into();
        if !self.adjacent_areas.contains(&area_id) {
            self.adjacent_areas.push(area_id);
        }
        self
    }

    /// Sets the area type.
    #[must_use]
    pub const fn with_type(mut self, area_type: AreaType) -> Self {
        self.area_type = area_type;
        self
    }

    /// Returns true if `area_id` is listed as a neighbour.
    #[must_use]
    pub fn is_adjacent_to(&self, area_id: &str) -> bool {
        self.adjacent_areas.iter().any(|a| a == area_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn builder_sets_fields() {
        let area = MonitoredArea::new("gate", "Main Gate", 500)
            .with_location("North side")
            .with_adjacent("hall")
            .with_type(AreaType::Entrance);

        assert_eq!(area.id, "gate");
        assert_eq!(area.capacity, 500);
        assert_eq!(area.location, "North side");
        assert!(area.is_adjacent_to("hall"));
        assert!(!area.is_adjacent_to("exit"));
        assert_eq!(area.area_type, AreaType::Entrance);
    }

    #[test]
    fn duplicate_neighbours_are_ignored() {
        let area = MonitoredArea::new("gate", "Gate", 10)
            .with_adjacent("hall")
            .with_adjacent("hall");
        assert_eq!(area.adjacent_areas, vec!["hall".to_string()]);
    }

    #[test_case("entrance", AreaType::Entrance ; "entrance")]
    #[test_case("EXIT", AreaType::Exit ; "uppercase exit")]
    #[test_case("gathering-space", AreaType::GatheringSpace ; "dashed gathering space")]
    #[test_case("corridor", AreaType::Corridor ; "corridor")]
    fn area_type_parses(input: &str, expected: AreaType) {
        assert_eq!(input.parse::<AreaType>().unwrap(), expected);
    }

    #[test]
    fn area_type_rejects_unknown() {
        assert!("balcony".parse::<AreaType>().is_err());
    }

    #[test]
    fn serde_uses_type_key() {
        let area = MonitoredArea::new("exit", "Exit", 200).with_type(AreaType::Exit);
        let json = serde_json::to_string(&area).unwrap();
        assert!(json.contains("\"type\":\"exit\""));

        let back: MonitoredArea = serde_json::from_str(&json).unwrap();
        assert_eq!(back, area);
    }
}
