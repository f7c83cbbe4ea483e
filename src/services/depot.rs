use crate::domain::Location;

/// First location flagged as a depot, if any.
pub fn first_depot(locations: &[Location]) -> Option<&Location> {
    locations.iter().find(|loc| loc.is_depot)
}

/// Index of the depot within the location list; defaults to 0 when no
/// location is flagged.
pub fn find_depot_index(locations: &[Location]) -> usize {
    locations
        .iter()
        .position(|loc| loc.is_depot)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_first_flagged_depot() {
        let locations = vec![
            Location::new("a", 0.0, 0.0),
            Location::depot("b", 1.0, 1.0),
            Location::depot("c", 2.0, 2.0),
        ];
        assert_eq!(find_depot_index(&locations), 1);
        assert_eq!(first_depot(&locations).unwrap().id, "b");
    }

    #[test]
    fn defaults_to_first_location() {
        let locations = vec![Location::new("a", 0.0, 0.0), Location::new("b", 1.0, 1.0)];
        assert_eq!(find_depot_index(&locations), 0);
        assert!(first_depot(&locations).is_none());
    }
}
