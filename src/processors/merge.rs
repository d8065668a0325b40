//! Reconciliation of primary and auxiliary detector boxes.

use crate::domain::OrientedBox;
use tracing::info;

/// An auxiliary box replaces a primary one it contains when its area is at least this multiple.
pub const REPLACE_AREA_RATIO: f32 = 2.0;

/// Merges `primary` boxes with `auxiliary` boxes.
///
/// For each auxiliary box, in order:
/// - no primary box overlaps it: it is added;
/// - it contains an overlapping primary box and is at least
///   [`REPLACE_AREA_RATIO`] times its area: that primary box is removed and
///   the auxiliary box kept, even if it also overlaps other primary boxes;
/// - it overlaps only without replacing: it is dropped.
///
/// The result is the surviving primary boxes followed by the surviving auxiliary ones.
pub fn merge_detection_boxes(
    primary: Vec<OrientedBox>,
    auxiliary: Vec<OrientedBox>,
) -> Vec<OrientedBox> {
    if primary.is_empty() {
        return auxiliary;
    }
    if auxiliary.is_empty() {
        return primary;
    }

    let primary_aabbs: Vec<_> = primary.iter().map(|b| (b.aabb(), b.area())).collect();
    let mut primary_removed = vec![false; primary.len()];
    let mut aux_keep = vec![false; auxiliary.len()];
    let (mut replaced, mut added, mut dropped) = (0usize, 0usize, 0usize);

    for (ai, aux) in auxiliary.iter().enumerate() {
        let aux_aabb = aux.aabb();
        let aux_area = aux.area();
        let mut any_overlap = false;
        let mut can_replace = false;

        for (pi, (p_aabb, p_area)) in primary_aabbs.iter().enumerate() {
            if !aux_aabb.overlaps(p_aabb) {
                continue;
            }
            any_overlap = true;
            let ratio = if *p_area > 0.0 { aux_area / p_area } else { 0.0 };
            if aux_aabb.contains(p_aabb) && ratio >= REPLACE_AREA_RATIO {
                if !primary_removed[pi] {
                    replaced += 1;
                }
                primary_removed[pi] = true;
                can_replace = true;
            }
        }

        if can_replace {
            aux_keep[ai] = true;
        } else if any_overlap {
            dropped += 1;
        } else {
            aux_keep[ai] = true;
            added += 1;
        }
    }

    info!(
        "hybrid merge: {} primary replaced, {} auxiliary added, {} auxiliary dropped",
        replaced, added, dropped
    );

    primary
        .into_iter()
        .zip(primary_removed)
        .filter_map(|(b, removed)| (!removed).then_some(b))
        .chain(
            auxiliary
                .into_iter()
                .zip(aux_keep)
                .filter_map(|(b, keep)| keep.then_some(b)),
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Aabb;

    fn boxed(x0: f32, y0: f32, x1: f32, y1: f32) -> OrientedBox {
        OrientedBox::from_aabb(Aabb::new(x0, y0, x1, y1), 0.8)
    }

    #[test]
    fn test_containing_aux_box_replaces_primary() {
        let primary = vec![boxed(10.0, 10.0, 60.0, 60.0)];
        let aux = vec![boxed(0.0, 0.0, 100.0, 100.0).with_text("balloon")];
        let merged = merge_detection_boxes(primary, aux);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].text(), Some("balloon"));
    }

    #[test]
    fn test_small_ratio_aux_box_is_dropped() {
        // 60x60 vs 55x55 is roughly 1.2x.
        let primary = vec![boxed(10.0, 10.0, 65.0, 65.0)];
        let aux = vec![boxed(5.0, 5.0, 65.0, 65.0).with_text("balloon")];
        let merged = merge_detection_boxes(primary.clone(), aux);
        assert_eq!(merged, primary);
    }

    #[test]
    fn test_disjoint_boxes_are_all_kept_unchanged() {
        let primary = vec![boxed(0.0, 0.0, 10.0, 10.0), boxed(50.0, 50.0, 70.0, 70.0)];
        let aux = vec![boxed(200.0, 200.0, 260.0, 230.0)];
        let merged = merge_detection_boxes(primary.clone(), aux.clone());
        assert_eq!(merged.len(), 3);
        assert_eq!(&merged[..2], &primary[..]);
        assert_eq!(merged[2], aux[0]);
    }

    #[test]
    fn test_replacement_keeps_aux_despite_other_partial_overlap() {
        let primary = vec![boxed(10.0, 10.0, 30.0, 30.0), boxed(90.0, 40.0, 200.0, 60.0)];
        let aux = vec![boxed(0.0, 0.0, 100.0, 100.0)];
        let merged = merge_detection_boxes(primary.clone(), aux.clone());
        assert_eq!(merged, vec![primary[1].clone(), aux[0].clone()]);
    }

    #[test]
    fn test_empty_inputs_pass_through() {
        let boxes = vec![boxed(0.0, 0.0, 10.0, 10.0)];
        assert_eq!(merge_detection_boxes(Vec::new(), boxes.clone()), boxes);
        assert_eq!(merge_detection_boxes(boxes.clone(), Vec::new()), boxes);
    }

    #[test]
    fn test_touching_edges_count_as_overlap() {
        let primary = vec![boxed(0.0, 0.0, 50.0, 50.0)];
        let aux = vec![boxed(50.0, 0.0, 80.0, 50.0)];
        assert_eq!(merge_detection_boxes(primary.clone(), aux), primary);
    }
}
