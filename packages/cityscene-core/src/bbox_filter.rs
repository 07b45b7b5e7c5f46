// Study-area filtering of footprints.
use geo::{BoundingRect, Intersects, Polygon, Rect};

/// Study area in the target CRS, with its bounding box kept for quick rejection.
#[derive(Debug, Clone)]
pub struct StudyArea {
    pub polygon: Polygon<f64>,
    pub bbox: Rect<f64>,
}

impl StudyArea {
    /// `None` for a polygon without coordinates.
    pub fn new(polygon: Polygon<f64>) -> Option<Self> {
        let bbox = polygon.bounding_rect()?;
        Some(Self { polygon, bbox })
    }

    /// Does `polygon` touch the study area at all?
    pub fn intersects(&self, polygon: &Polygon<f64>) -> bool {
        // Quick rejection when the bounding boxes don't overlap
        match polygon.bounding_rect() {
            Some(rect) if rect.intersects(&self.bbox) => self.polygon.intersects(polygon),
            _ => false,
        }
    }
}
