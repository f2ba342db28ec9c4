//! Static venue topology.
//!
//! The [`AreaGraph`] holds every monitored area and the undirected adjacency
//! between them. It is validated once at load time and immutable afterwards.

use std::collections::{HashMap, HashSet};

use crowd_proto::MonitoredArea;

use crate::error::{DensityError, Result};

/// Validated, symmetric area topology.
#[derive(Debug, Clone, Default)]
pub struct AreaGraph {
    areas: HashMap<String, MonitoredArea>,
    /// Area ids in declaration order.
    order: Vec<String>,
}

impl AreaGraph {
    /// Builds a graph from a list of areas.
    ///
    /// Adjacency declared on only one side is mirrored onto the other, so the
    /// resulting graph is always symmetric. Repeated neighbour entries are
    /// collapsed, keeping the first occurrence.
    ///
    /// # Errors
    ///
    /// Returns `DensityError::Configuration` if:
    /// - an area id is empty or duplicated
    /// - a capacity is zero
    /// - an adjacency entry references an unknown area or the area itself
    pub fn new(mut areas: Vec<MonitoredArea>) -> Result<Self> {
        let mut order = Vec::with_capacity(areas.len());
        let mut seen = HashSet::new();

        for area in &areas {
            if area.id.trim().is_empty() {
                return Err(DensityError::config("area id cannot be empty"));
            }
            if !seen.insert(area.id.clone()) {
                return Err(DensityError::config(format!(
                    "duplicate area id '{}'",
                    area.id
                )));
            }
            if area.capacity == 0 {
                return Err(DensityError::config(format!(
                    "area '{}' must have a positive capacity",
                    area.id
                )));
            }
            order.push(area.id.clone());
        }

        for area in &areas {
            for neighbour in &area.adjacent_areas {
                if neighbour == &area.id {
                    return Err(DensityError::config(format!(
                        "area '{}' cannot be adjacent to itself",
                        area.id
                    )));
                }
                if !seen.contains(neighbour) {
                    return Err(DensityError::config(format!(
                        "area '{}' references unknown neighbour '{neighbour}'",
                        area.id
                    )));
                }
            }
        }

        for area in &mut areas {
            let mut unique = HashSet::with_capacity(area.adjacent_areas.len());
            area.adjacent_areas.retain(|n| unique.insert(n.clone()));
        }

        let mut by_id: HashMap<String, MonitoredArea> =
            areas.into_iter().map(|a| (a.id.clone(), a)).collect();

        // Mirror one-sided edges.
        let edges: Vec<(String, String)> = order
            .iter()
            .filter_map(|id| by_id.get(id))
            .flat_map(|a| a.adjacent_areas.iter().map(|n| (a.id.clone(), n.clone())))
            .collect();
        for (from, to) in edges {
            if let Some(target) = by_id.get_mut(&to) {
                if !target.is_adjacent_to(&from) {
                    target.adjacent_areas.push(from);
                }
            }
        }

        Ok(Self {
            areas: by_id,
            order,
        })
    }

    /// Returns the area with the given id.
    #[must_use]
    pub fn area(&self, id: &str) -> Option<&MonitoredArea> {
        self.areas.get(id)
    }

    /// Returns the area or an `UnknownArea` error.
    ///
    /// # Errors
    ///
    /// Returns `DensityError::UnknownArea` if the id is not registered.
    pub fn require(&self, id: &str) -> Result<&MonitoredArea> {
        self.area(id).ok_or_else(|| DensityError::UnknownArea { id: id.to_string() })
    }

    /// Returns true if the area is registered.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.areas.contains_key(id)
    }

    /// Returns all areas in declaration order.
    pub fn areas(&self) -> impl Iterator<Item = &MonitoredArea> {
        self.order.iter().filter_map(|id| self.areas.get(id))
    }

    /// Returns all area ids in declaration order.
    #[must_use]
    pub fn area_ids(&self) -> &[String] {
        &self.order
    }

    /// Returns the direct neighbours of an area.
    ///
    /// # Errors
    ///
    /// Returns `DensityError::UnknownArea` if the id is not registered.
    pub fn neighbors(&self, id: &str) -> Result<&[String]> {
        Ok(&self.require(id)?.adjacent_areas)
    }

    /// Returns the trigger area followed by its one-hop neighbours.
    ///
    /// Never walks further than one hop.
    ///
    /// # Errors
    ///
    /// Returns `DensityError::UnknownArea` if the trigger is not registered.
    pub fn affected_areas(&self, trigger_id: &str) -> Result<Vec<String>> {
        let trigger = self.require(trigger_id)?;
        let mut affected = Vec::with_capacity(trigger.adjacent_areas.len() + 1);
        affected.push(trigger.id.clone());
        affected.extend(trigger.adjacent_areas.iter().cloned());
        Ok(affected)
    }

    /// Returns the number of areas.
    #[must_use]
    pub fn len(&self) -> usize {
        self.areas.len()
    }

    /// Returns true if there are no areas.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }
}
