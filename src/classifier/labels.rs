//! Bijection between external class labels and internal class indices.

use std::collections::BTreeMap;

/// Immutable label ↔ index lookup tables.
///
/// Internal indices are assigned in the order labels are first encountered,
/// so `inverse_map[class_map[label]] == label` for every trained label and
/// `class_map[inverse_map[i]] == i` for every index.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LabelMap {
    class_map: BTreeMap<i32, usize>,
    inverse_map: Vec<i32>,
}

impl LabelMap {
    /// Build both tables in one pass; repeated labels keep their first index.
    pub fn from_encounter_order<I>(labels: I) -> Self
    where
        I: IntoIterator<Item = i32>,
    {
        let mut class_map = BTreeMap::new();
        let mut inverse_map = Vec::new();
        for label in labels {
            class_map.entry(label).or_insert_with(|| {
                inverse_map.push(label);
                inverse_map.len() - 1
            });
        }
        Self {
            class_map,
            inverse_map,
        }
    }

    /// Internal index of `label`.
    pub fn index_of(&self, label: i32) -> Option<usize> {
        self.class_map.get(&label).copied()
    }

    /// External label at internal index `index`.
    pub fn label_of(&self, index: usize) -> Option<i32> {
        self.inverse_map.get(index).copied()
    }

    /// Number of distinct labels.
    pub fn len(&self) -> usize {
        self.inverse_map.len()
    }

    /// True when no labels were seen.
    pub fn is_empty(&self) -> bool {
        self.inverse_map.is_empty()
    }

    /// Label → index table.
    pub fn class_map(&self) -> &BTreeMap<i32, usize> {
        &self.class_map
    }

    /// Index → label table.
    pub fn inverse_map(&self) -> &[i32] {
        &self.inverse_map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encounter_order() {
        let map = LabelMap::from_encounter_order([9, 2, 9, 7, 2]);
        assert_eq!(map.inverse_map(), &[9, 2, 7]);
        assert_eq!(map.index_of(9), Some(0));
        assert_eq!(map.index_of(2), Some(1));
        assert_eq!(map.index_of(7), Some(2));
        assert_eq!(map.index_of(3), None);
        assert_eq!(map.label_of(3), None);
    }

    #[test]
    fn test_tables_are_mutual_inverses() {
        let map = LabelMap::from_encounter_order([-4, 100, 0, 5]);
        assert_eq!(map.len(), 4);
        for (i, &label) in map.inverse_map().iter().enumerate() {
            assert_eq!(map.index_of(label), Some(i));
        }
        for (&label, &i) in map.class_map() {
            assert_eq!(map.label_of(i), Some(label));
        }
    }

    #[test]
    fn test_empty() {
        let map = LabelMap::from_encounter_order(std::iter::empty());
        assert!(map.is_empty());
        assert_eq!(map.len(), 0);
    }
}
