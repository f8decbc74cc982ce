//! # Position Sequencer
//!
//! Pure functions that keep section positions dense and zero-based. Every
//! function returns a new list whose `position` fields equal their index.
//! Out-of-range indices clamp instead of failing.

use storefront_common::Section;

/// Reassign positions from the current list order
pub fn resequence(mut sections: Vec<Section>) -> Vec<Section> {
    for (index, section) in sections.iter_mut().enumerate() {
        section.position = index;
    }
    sections
}

/// Order a freshly loaded list by its stored positions, then make it dense.
///
/// The sort is stable so duplicate positions keep their load order.
pub fn normalize(mut sections: Vec<Section>) -> Vec<Section> {
    sections.sort_by_key(|section| section.position);
    resequence(sections)
}

/// Clamp an insertion index to `[0, len]`
pub fn clamp_index(index: usize, len: usize) -> usize {
    index.min(len)
}

/// Insert `section` at `index` (append when `None`).
///
/// The inserted section takes the requested slot and later sections shift by one.
pub fn insert_at(sections: &[Section], section: Section, index: Option<usize>) -> Vec<Section> {
    let index = clamp_index(index.unwrap_or(sections.len()), sections.len());
    let mut next = sections.to_vec();
    next.insert(index, section);
    resequence(next)
}

/// Remove the section with `id`; unknown ids leave the order untouched
pub fn remove(sections: &[Section], id: &str) -> Vec<Section> {
    let next = sections
        .iter()
        .filter(|section| section.id != id)
        .cloned()
        .collect();
    resequence(next)
}

/// Move the section with `id` so that it ends at `new_index`
pub fn move_to(sections: &[Section], id: &str, new_index: usize) -> Vec<Section> {
    let mut next = sections.to_vec();
    let Some(from) = next.iter().position(|section| section.id == id) else {
        return resequence(next);
    };
    let moved = next.remove(from);
    let to = clamp_index(new_index, next.len());
    next.insert(to, moved);
    resequence(next)
}

/// Whether positions are exactly `0..len` in list order
pub fn is_dense(sections: &[Section]) -> bool {
    sections
        .iter()
        .enumerate()
        .all(|(index, section)| section.position == index)
}

/// `(id, position)` pairs whose position differs between `before` and `after`,
/// in increasing target position. Sections missing from `before` are skipped.
pub fn changed_positions(before: &[Section], after: &[Section]) -> Vec<(String, usize)> {
    after
        .iter()
        .filter(|section| {
            before
                .iter()
                .find(|old| old.id == section.id)
                .is_some_and(|old| old.position != section.position)
        })
        .map(|section| (section.id.clone(), section.position))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sections(ids: &[&str]) -> Vec<Section> {
        resequence(
            ids.iter()
                .map(|id| Section::new(*id, "text", id.to_uppercase()))
                .collect(),
        )
    }

    fn order(sections: &[Section]) -> Vec<(&str, usize)> {
        sections
            .iter()
            .map(|section| (section.id.as_str(), section.position))
            .collect()
    }

    #[test]
    fn test_move_first_to_last() {
        let moved = move_to(&sections(&["a", "b", "c"]), "a", 2);
        assert_eq!(order(&moved), vec![("b", 0), ("c", 1), ("a", 2)]);
    }

    #[test]
    fn test_move_last_to_first() {
        let moved = move_to(&sections(&["a", "b", "c"]), "c", 0);
        assert_eq!(order(&moved), vec![("c", 0), ("a", 1), ("b", 2)]);
    }

    #[test]
    fn test_move_clamps_out_of_range_index() {
        let moved = move_to(&sections(&["a", "b", "c"]), "a", 99);
        assert_eq!(order(&moved), vec![("b", 0), ("c", 1), ("a", 2)]);
    }

    #[test]
    fn test_move_unknown_id_keeps_order() {
        let moved = move_to(&sections(&["a", "b"]), "zzz", 0);
        assert_eq!(order(&moved), vec![("a", 0), ("b", 1)]);
    }

    #[test]
    fn test_insert_takes_requested_slot_and_shifts_later() {
        let inserted = insert_at(&sections(&["a", "b"]), Section::new("x", "hero", "X"), Some(1));
        assert_eq!(order(&inserted), vec![("a", 0), ("x", 1), ("b", 2)]);
    }

    #[test]
    fn test_insert_defaults_to_append_and_clamps() {
        let appended = insert_at(&sections(&["a"]), Section::new("x", "hero", "X"), None);
        assert_eq!(order(&appended), vec![("a", 0), ("x", 1)]);

        let clamped = insert_at(&sections(&["a"]), Section::new("y", "hero", "Y"), Some(40));
        assert_eq!(order(&clamped), vec![("a", 0), ("y", 1)]);
    }

    #[test]
    fn test_remove_closes_gap() {
        let removed = remove(&sections(&["a", "b", "c"]), "b");
        assert_eq!(order(&removed), vec![("a", 0), ("c", 1)]);
        assert!(is_dense(&removed));
    }

    #[test]
    fn test_normalize_sorts_by_stored_position() {
        let mut loaded = sections(&["a", "b", "c"]);
        loaded[0].position = 7;
        loaded[1].position = 3;
        loaded[2].position = 3;

        let normalized = normalize(loaded);
        assert_eq!(order(&normalized), vec![("b", 0), ("c", 1), ("a", 2)]);
    }

    #[test]
    fn test_changed_positions_in_target_order() {
        let before = sections(&["a", "b", "c"]);
        let after = move_to(&before, "a", 2);

        assert_eq!(
            changed_positions(&before, &after),
            vec![("b".to_string(), 0), ("c".to_string(), 1), ("a".to_string(), 2)]
        );
    }

    #[test]
    fn test_density_holds_over_mixed_operations() {
        let mut current = sections(&["a", "b", "c", "d"]);
        current = move_to(&current, "d", 1);
        current = insert_at(&current, Section::new("e", "hero", "E"), Some(0));
        current = remove(&current, "b");
        current = move_to(&current, "e", 3);

        assert!(is_dense(&current));
        assert_eq!(current.len(), 4);
    }
}
