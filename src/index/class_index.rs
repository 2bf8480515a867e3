//! In-memory catalog index: class id -> reference descriptor sets.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::features::DescriptorSet;

/// One catalog class and the descriptors of its usable reference images.
///
/// `descriptor_sets[i]` was extracted from `images[i]`. Never constructed
/// with zero sets; see [`ClassEntry::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassEntry {
    pub class_id: String,
    descriptor_sets: Vec<DescriptorSet>,
    images: Vec<String>,
}

impl ClassEntry {
    /// Returns `None` when no reference image survived extraction, or when
    /// the two lists disagree in length.
    pub fn new(
        class_id: String,
        descriptor_sets: Vec<DescriptorSet>,
        images: Vec<String>,
    ) -> Option<Self> {
        if descriptor_sets.is_empty() || descriptor_sets.len() != images.len() {
            return None;
        }
        Some(Self {
            class_id,
            descriptor_sets,
            images,
        })
    }

    pub fn descriptor_sets(&self) -> &[DescriptorSet] {
        &self.descriptor_sets
    }

    pub fn images(&self) -> &[String] {
        &self.images
    }

    /// Number of reference images (always >= 1).
    pub fn reference_count(&self) -> usize {
        self.descriptor_sets.len()
    }

    /// First indexed image, used as the catalog thumbnail.
    pub fn representative_image(&self) -> &str {
        &self.images[0]
    }
}

/// Searchable index of every catalog class.
///
/// Classes are kept in id order so scoring iterates deterministically.
/// An index is built once and then only read; a rebuild produces a new one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Index {
    classes: BTreeMap<String, ClassEntry>,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from entries; a later entry with the same id replaces an earlier one.
    pub fn from_entries<I: IntoIterator<Item = ClassEntry>>(entries: I) -> Self {
        let classes = entries
            .into_iter()
            .map(|e| (e.class_id.clone(), e))
            .collect();
        Self { classes }
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn get(&self, class_id: &str) -> Option<&ClassEntry> {
        self.classes.get(class_id)
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassEntry> {
        self.classes.values()
    }

    pub fn class_ids(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }

    /// Re-checks the invariants of [`ClassEntry::new`] on data that bypassed
    /// it, such as a deserialized cache artifact.
    pub(crate) fn check_invariants(&self) -> std::result::Result<(), String> {
        for (id, entry) in &self.classes {
            if *id != entry.class_id {
                return Err(format!("class key {:?} holds entry {:?}", id, entry.class_id));
            }
            if entry.descriptor_sets.is_empty() {
                return Err(format!("class {:?} has no descriptor sets", id));
            }
            if entry.descriptor_sets.len() != entry.images.len() {
                return Err(format!(
                    "class {:?} has {} descriptor sets but {} images",
                    id,
                    entry.descriptor_sets.len(),
                    entry.images.len()
                ));
            }
        }
        Ok(())
    }

    /// Total number of descriptor sets across all classes.
    pub fn num_descriptor_sets(&self) -> usize {
        self.classes.values().map(|c| c.reference_count()).sum()
    }
}

/// Summary row for catalog listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassSummary {
    pub class_id: String,
    pub representative_image: String,
    pub image_count: usize,
}

impl From<&ClassEntry> for ClassSummary {
    fn from(entry: &ClassEntry) -> Self {
        Self {
            class_id: entry.class_id.clone(),
            representative_image: entry.representative_image().to_string(),
            image_count: entry.reference_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(n: usize) -> DescriptorSet {
        DescriptorSet::from_rows(n, 32, vec![0xAB; n * 32]).unwrap()
    }

    #[test]
    fn test_class_entry_requires_descriptor_sets() {
        assert!(ClassEntry::new("A".into(), vec![], vec![]).is_none());
        assert!(ClassEntry::new("A".into(), vec![set(1)], vec![]).is_none());

        let entry = ClassEntry::new("A".into(), vec![set(3), set(2)], vec!["a.jpg".into(), "b.jpg".into()])
            .unwrap();
        assert_eq!(entry.reference_count(), 2);
        assert_eq!(entry.representative_image(), "a.jpg");
    }

    #[test]
    fn test_index_iterates_in_id_order() {
        let index = Index::from_entries(vec![
            ClassEntry::new("B200".into(), vec![set(1)], vec!["b".into()]).unwrap(),
            ClassEntry::new("A100".into(), vec![set(1), set(1)], vec!["a1".into(), "a2".into()]).unwrap(),
        ]);
        let ids: Vec<&str> = index.class_ids().collect();
        assert_eq!(ids, vec!["A100", "B200"]);
        assert_eq!(index.num_descriptor_sets(), 3);
        assert_eq!(index.get("A100").unwrap().reference_count(), 2);
    }

    #[test]
    fn test_summary_from_entry() {
        let entry = ClassEntry::new("V1".into(), vec![set(1), set(1)], vec!["x.png".into(), "y.png".into()])
            .unwrap();
        let summary = ClassSummary::from(&entry);
        assert_eq!(summary.class_id, "V1");
        assert_eq!(summary.representative_image, "x.png");
        assert_eq!(summary.image_count, 2);
    }
}
