// Utility functions to generate consistent object identifiers across the application.

/// Identity of one polygon part of one source footprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FootprintId {
    /// Position of the feature in the footprint layer.
    pub source_index: usize,
    /// Polygon index inside a multi-polygon feature (0 for plain polygons).
    pub part: usize,
}

impl FootprintId {
    pub fn new(source_index: usize, part: usize) -> Self {
        Self { source_index, part }
    }
}

impl std::fmt::Display for FootprintId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}/{}", self.source_index, self.part)
    }
}

/// Generate a building key: "prefix_sourceIndex_part".
pub fn make_building_key(prefix: &str, id: FootprintId) -> String {
    format!("{}_{}_{}", prefix, id.source_index, id.part)
}

/// Generate a vegetation key: "prefix_counter".
/// Uniqueness relies on the caller handing out each counter value once.
pub fn make_vegetation_key(prefix: &str, counter: usize) -> String {
    format!("{}_{}", prefix, counter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_follow_the_kind_index_layout() {
        assert_eq!(make_building_key("Bat", FootprintId::new(12, 0)), "Bat_12_0");
        assert_eq!(make_building_key("Bat", FootprintId::new(12, 3)), "Bat_12_3");
        assert_eq!(make_vegetation_key("Veg", 0), "Veg_0");
        assert_eq!(make_vegetation_key("Tree", 41), "Tree_41");
    }
}
