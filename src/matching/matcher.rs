//! Per-class scoring of a query against the catalog index.

use opencv::core::{DMatch, Mat, Vector, NORM_HAMMING};
use opencv::features2d::BFMatcher;
use opencv::prelude::*;
use tracing::{debug, warn};

use crate::error::Result;
use crate::features::DescriptorSet;
use crate::index::{ClassEntry, Index};

/// Lowe ratio threshold (best/second_best).
pub const NN_RATIO: f32 = 0.75;

/// Raw match statistics of one class against a query.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassScore {
    pub class_id: String,
    /// Good matches summed over all reference images of the class.
    pub total_good: usize,
    /// `total_good` divided by the number of reference images.
    pub avg_good: f64,
    /// `avg_good` divided by the query keypoint count.
    pub ratio: f64,
}

/// Brute-force Hamming k=2 matcher with a ratio test.
pub struct ClassMatcher {
    matcher: BFMatcher,
    ratio_threshold: f32,
}

impl ClassMatcher {
    pub fn new(ratio_threshold: f32) -> Result<Self> {
        let matcher = BFMatcher::new(NORM_HAMMING, false)?;
        Ok(Self {
            matcher,
            ratio_threshold,
        })
    }

    /// Score every class of `index`. An empty query scores nothing.
    pub fn score_all(&self, query: &DescriptorSet, index: &Index) -> Result<Vec<ClassScore>> {
        if query.is_empty() || index.is_empty() {
            return Ok(Vec::new());
        }
        let query_mat = query.to_mat()?;
        Ok(index
            .classes()
            .map(|entry| self.score_class(query, &query_mat, entry))
            .collect())
    }

    /// Aggregate good matches over a class's reference images.
    ///
    /// `query_mat` must be `query.to_mat()`; it is passed in so the conversion
    /// happens once per query rather than once per class.
    pub fn score_class(&self, query: &DescriptorSet, query_mat: &Mat, entry: &ClassEntry) -> ClassScore {
        let total_good: usize = entry
            .descriptor_sets()
            .iter()
            .zip(entry.images())
            .map(|(reference, image)| {
                self.count_good_matches(query, query_mat, reference)
                    .unwrap_or_else(|e| {
                        warn!(
                            "Matching against {} ({}) failed, counting 0 good matches: {}",
                            image, entry.class_id, e
                        );
                        0
                    })
            })
            .sum();

        let avg_good = total_good as f64 / entry.reference_count().max(1) as f64;
        let ratio = avg_good / query.keypoint_count.max(1) as f64;

        debug!(
            "class {}: total_good={} avg_good={:.1} ratio={:.3}",
            entry.class_id, total_good, avg_good, ratio
        );

        ClassScore {
            class_id: entry.class_id.clone(),
            total_good,
            avg_good,
            ratio,
        }
    }

    /// Number of query descriptors whose nearest reference descriptor passes
    /// the ratio test. Descriptors with fewer than two neighbours are skipped.
    pub fn count_good_matches(
        &self,
        query: &DescriptorSet,
        query_mat: &Mat,
        reference: &DescriptorSet,
    ) -> Result<usize> {
        if query.is_empty() || reference.is_empty() {
            return Ok(0);
        }
        if query.width() != reference.width() {
            warn!(
                "Descriptor width mismatch (query {} bytes, reference {} bytes)",
                query.width(),
                reference.width()
            );
            return Ok(0);
        }

        let train = reference.to_mat()?;
        let mut knn = Vector::<Vector<DMatch>>::new();
        self.matcher
            .knn_train_match(query_mat, &train, &mut knn, 2, &Mat::default(), false)?;

        let good = knn
            .iter()
            .filter(|pair| {
                if pair.len() < 2 {
                    return false;
                }
                match (pair.get(0), pair.get(1)) {
                    (Ok(best), Ok(second)) => {
                        best.distance < self.ratio_threshold * second.distance
                    }
                    _ => false,
                }
            })
            .count();
        Ok(good)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::hamming_distance;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_set(seed: u64, n: usize) -> DescriptorSet {
        let mut rng = StdRng::seed_from_u64(seed);
        let data: Vec<u8> = (0..n * 32).map(|_| rng.gen()).collect();
        DescriptorSet::from_rows(n, 32, data).unwrap()
    }

    /// Flip `bits` random bits in every row.
    fn perturbed(set: &DescriptorSet, seed: u64, bits: usize) -> DescriptorSet {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut data = Vec::new();
        for row in set.rows() {
            let mut row = row.to_vec();
            for _ in 0..bits {
                let bit = rng.gen_range(0..256usize);
                row[bit / 8] ^= 1 << (bit % 8);
            }
            data.extend(row);
        }
        DescriptorSet::from_rows(set.keypoint_count, set.width(), data).unwrap()
    }

    /// Straightforward ratio-test count used to cross-check the OpenCV path.
    fn brute_force_good(query: &DescriptorSet, reference: &DescriptorSet, ratio: f32) -> usize {
        if reference.len() < 2 {
            return 0;
        }
        query
            .rows()
            .filter(|q| {
                let mut d: Vec<u32> = reference.rows().map(|r| hamming_distance(q, r)).collect();
                d.sort_unstable();
                (d[0] as f32) < ratio * d[1] as f32
            })
            .count()
    }

    fn entry(id: &str, sets: Vec<DescriptorSet>) -> ClassEntry {
        let images = (0..sets.len()).map(|i| format!("{}/{}.png", id, i)).collect();
        ClassEntry::new(id.to_string(), sets, images).unwrap()
    }

    #[test]
    fn test_identical_sets_match_everything() {
        let m = ClassMatcher::new(NN_RATIO).unwrap();
        let set = random_set(1, 100);
        let good = m.count_good_matches(&set, &set.to_mat().unwrap(), &set).unwrap();
        assert_eq!(good, 100);
    }

    #[test]
    fn test_opencv_count_agrees_with_brute_force() {
        let m = ClassMatcher::new(NN_RATIO).unwrap();
        let reference = random_set(2, 120);
        let query = perturbed(&reference, 3, 40);

        let good = m
            .count_good_matches(&query, &query.to_mat().unwrap(), &reference)
            .unwrap();
        assert_eq!(good, brute_force_good(&query, &reference, NN_RATIO));
        assert!(good > 60, "only {} good matches", good);
    }

    #[test]
    fn test_single_reference_descriptor_is_skipped() {
        let m = ClassMatcher::new(NN_RATIO).unwrap();
        let query = random_set(4, 10);
        let reference = random_set(5, 1);
        let good = m
            .count_good_matches(&query, &query.to_mat().unwrap(), &reference)
            .unwrap();
        assert_eq!(good, 0);
    }

    #[test]
    fn test_width_mismatch_counts_zero() {
        let m = ClassMatcher::new(NN_RATIO).unwrap();
        let query = random_set(6, 10);
        let narrow = DescriptorSet::from_rows(10, 16, vec![7u8; 160]).unwrap();
        let good = m
            .count_good_matches(&query, &query.to_mat().unwrap(), &narrow)
            .unwrap();
        assert_eq!(good, 0);
    }

    #[test]
    fn test_width_mismatch_does_not_abort_class() {
        let m = ClassMatcher::new(NN_RATIO).unwrap();
        let query = random_set(7, 50);
        let narrow = DescriptorSet::from_rows(10, 16, vec![7u8; 160]).unwrap();
        let class = entry("A100", vec![narrow, query.clone()]);

        let score = m.score_class(&query, &query.to_mat().unwrap(), &class);
        assert_eq!(score.total_good, 50);
        assert!((score.avg_good - 25.0).abs() < 1e-9);
        assert!((score.ratio - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_score_is_averaged_per_reference_image() {
        let m = ClassMatcher::new(NN_RATIO).unwrap();
        let query = random_set(8, 80);
        let unrelated = random_set(9, 80);
        let index = Index::from_entries(vec![
            entry("A100", vec![query.clone(), query.clone()]),
            entry("B200", vec![unrelated]),
        ]);

        let scores = m.score_all(&query, &index).unwrap();
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].class_id, "A100");
        assert_eq!(scores[0].total_good, 160);
        assert!((scores[0].avg_good - 80.0).abs() < 1e-9);
        assert!((scores[0].ratio - 1.0).abs() < 1e-9);
        assert!(scores[1].avg_good < scores[0].avg_good);
    }

    #[test]
    fn test_empty_query_or_index_scores_nothing() {
        let m = ClassMatcher::new(NN_RATIO).unwrap();
        let index = Index::from_entries(vec![entry("A100", vec![random_set(10, 20)])]);
        assert!(m.score_all(&DescriptorSet::empty(), &index).unwrap().is_empty());
        assert!(m.score_all(&random_set(11, 20), &Index::new()).unwrap().is_empty());
    }
}
