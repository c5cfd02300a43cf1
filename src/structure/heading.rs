//! Heading levels from relative box height.
//!
//! Best effort: a title's box height stands in for its font size, so taller
//! titles and headers get lower (more prominent) levels. Section numbering in
//! the recognized text, when present, refines this at export time.

use crate::domain::{ClassLabel, OrderedRegion, RegionId};
use std::collections::HashMap;

/// Heading level for every title and header region of a page.
///
/// `level = 1 + floor(taller_share * max_level)`, where `taller_share` is the
/// fraction of the page's titles and headers whose box is strictly taller.
/// The tallest heading is always level 1; levels never exceed `max_level`.
pub fn assign_heading_levels(ordered: &[OrderedRegion], max_level: u8) -> HashMap<RegionId, u8> {
    let max_level = max_level.max(1);
    let headings: Vec<(&RegionId, f32)> = ordered
        .iter()
        .filter(|o| matches!(o.region.class_label, ClassLabel::Title | ClassLabel::Header))
        .map(|o| (o.id(), o.region.bbox.height()))
        .collect();

    let n = headings.len() as f32;
    headings
        .iter()
        .map(|(id, height)| {
            let taller = headings.iter().filter(|(_, h)| h > height).count() as f32;
            let level = 1 + ((taller / n) * max_level as f32).floor() as u8;
            ((*id).clone(), level.min(max_level))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Detection, Region};
    use crate::processors::BoundingBox;

    fn title(id: &str, height: f32, reading_order: usize) -> OrderedRegion {
        OrderedRegion {
            region: Region::from_detection(Detection::new(
                id,
                BoundingBox::from_coords(0.0, 0.0, 100.0, height),
                ClassLabel::Title,
                0.9,
                "m",
                0,
            )),
            reading_order,
            parent_id: None,
            column_index: None,
        }
    }

    #[test]
    fn test_tallest_is_level_one() {
        let ordered = vec![title("a", 40.0, 0), title("b", 20.0, 1), title("c", 20.0, 2)];
        let levels = assign_heading_levels(&ordered, 3);
        assert_eq!(levels[&RegionId::new("a")], 1);
        assert_eq!(levels[&RegionId::new("b")], 2);
        assert_eq!(levels[&RegionId::new("c")], 2);
    }

    #[test]
    fn test_levels_capped() {
        let ordered: Vec<OrderedRegion> = (0..6)
            .map(|i| title(&format!("t{i}"), 60.0 - 10.0 * i as f32, i))
            .collect();
        let levels = assign_heading_levels(&ordered, 2);
        assert_eq!(levels[&RegionId::new("t0")], 1);
        assert!(levels.values().all(|&l| (1..=2).contains(&l)));
        assert_eq!(levels[&RegionId::new("t5")], 2);
    }

    #[test]
    fn test_single_title() {
        let levels = assign_heading_levels(&[title("only", 12.0, 0)], 3);
        assert_eq!(levels[&RegionId::new("only")], 1);
    }
}
