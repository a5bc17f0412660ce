//! Last known position of every observed commander.
//!
//! Entries are never removed: the live map drops inactive commanders itself,
//! so a stale entry just stops moving.

use std::collections::HashMap;

use super::client::CommanderMapEntry;
use super::coordinates::Coordinates;

/// Outcome of observing one listing entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Observation {
    /// First sighting of this user.
    Registered,
    /// Coordinates differ from the stored ones.
    Moved { last_position: Coordinates },
    Unchanged,
}

#[derive(Debug, Clone, Default)]
pub struct PeerRegistry {
    entries: HashMap<String, CommanderMapEntry>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `entry`, replacing any previous entry for the same user.
    ///
    /// Movement uses exact coordinate equality. EDSM already rounds
    /// positions, so re-sent data compares equal.
    pub fn observe(&mut self, entry: CommanderMapEntry) -> Observation {
        let coordinates = entry.coordinates;
        match self.entries.insert(entry.user.clone(), entry) {
            None => Observation::Registered,
            Some(previous) if previous.coordinates != coordinates => Observation::Moved {
                last_position: previous.coordinates,
            },
            Some(_) => Observation::Unchanged,
        }
    }

    pub fn get(&self, user: &str) -> Option<&CommanderMapEntry> {
        self.entries.get(user)
    }

    /// Fill in a resolved system name, as long as the user has not moved
    /// away from `at` in the meantime.
    pub fn set_system_name(&mut self, user: &str, at: Coordinates, name: String) -> bool {
        match self.entries.get_mut(user) {
            Some(entry) if entry.coordinates == at => {
                entry.system_name = Some(name);
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommanderMapEntry> {
        self.entries.values()
    }

    /// The entry closest to `point`, with its distance.
    pub fn find_closest(&self, point: &Coordinates) -> Option<(&CommanderMapEntry, f64)> {
        self.entries
            .values()
            .map(|e| (e, e.coordinates.distance_squared(point)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(e, d2)| (e, d2.sqrt()))
    }

    /// Every entry within `radius` of `point` (inclusive), unsorted.
    pub fn find_in_sphere(&self, point: &Coordinates, radius: f64) -> Vec<(&CommanderMapEntry, f64)> {
        self.entries
            .values()
            .map(|e| (e, e.coordinates.distance(point)))
            .filter(|(_, d)| *d <= radius)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(user: &str, x: f64, y: f64, z: f64) -> CommanderMapEntry {
        CommanderMapEntry {
            user: user.to_string(),
            coordinates: Coordinates::new(x, y, z),
            cmdr_name: Some(format!("CMDR {}", user)),
            system_name: None,
            cmdr_url: None,
        }
    }

    #[test]
    fn test_register_then_unchanged_then_moved() {
        let mut registry = PeerRegistry::new();
        assert_eq!(registry.observe(entry("a", 0.0, 0.0, 0.0)), Observation::Registered);
        assert_eq!(registry.observe(entry("a", 0.0, 0.0, 0.0)), Observation::Unchanged);

        let third = entry("a", 1.0, 0.0, 0.0);
        assert_eq!(
            registry.observe(third.clone()),
            Observation::Moved {
                last_position: Coordinates::new(0.0, 0.0, 0.0)
            }
        );
        assert_eq!(registry.get("a"), Some(&third));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unchanged_still_replaces_metadata() {
        let mut registry = PeerRegistry::new();
        registry.observe(entry("a", 1.0, 1.0, 1.0));
        let mut renamed = entry("a", 1.0, 1.0, 1.0);
        renamed.system_name = Some("Sol".to_string());
        registry.observe(renamed);
        assert_eq!(registry.get("a").unwrap().system_name.as_deref(), Some("Sol"));
    }

    #[test]
    fn test_find_closest() {
        let mut registry = PeerRegistry::new();
        assert!(registry.find_closest(&Coordinates::default()).is_none());

        registry.observe(entry("far", 100.0, 0.0, 0.0));
        registry.observe(entry("near", 3.0, 4.0, 0.0));
        registry.observe(entry("mid", 0.0, 50.0, 0.0));

        let (closest, distance) = registry.find_closest(&Coordinates::default()).unwrap();
        assert_eq!(closest.user, "near");
        assert_eq!(distance, 5.0);
    }

    #[test]
    fn test_find_in_sphere_is_inclusive() {
        let mut registry = PeerRegistry::new();
        registry.observe(entry("edge", 10.0, 0.0, 0.0));
        registry.observe(entry("inside", 1.0, 0.0, 0.0));
        registry.observe(entry("outside", 10.5, 0.0, 0.0));

        let mut users: Vec<&str> = registry
            .find_in_sphere(&Coordinates::default(), 10.0)
            .into_iter()
            .map(|(e, _)| e.user.as_str())
            .collect();
        users.sort();
        assert_eq!(users, vec!["edge", "inside"]);
    }

    #[test]
    fn test_set_system_name_requires_same_position() {
        let mut registry = PeerRegistry::new();
        registry.observe(entry("a", 1.0, 2.0, 3.0));

        assert!(!registry.set_system_name("a", Coordinates::new(0.0, 0.0, 0.0), "Sol".into()));
        assert!(registry.set_system_name("a", Coordinates::new(1.0, 2.0, 3.0), "Lave".into()));
        assert_eq!(registry.get("a").unwrap().system_name.as_deref(), Some("Lave"));
        assert!(!registry.set_system_name("b", Coordinates::default(), "Sol".into()));
    }
}
