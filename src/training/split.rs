//! Seeded stratified splitting and minority oversampling

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

/// Split positions `0..labels.len()` into (train, test), preserving class proportions.
///
/// Each class contributes `round(n * test_fraction)` test rows, at least one when it
/// has two or more members. Both halves come back sorted.
pub fn stratified_split(labels: &[String], test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();

    for (_, mut members) in group_by_label(labels) {
        members.shuffle(&mut rng);
        let n = members.len();
        let mut n_test = (n as f64 * test_fraction).round() as usize;
        if n >= 2 {
            n_test = n_test.clamp(1, n - 1);
        } else {
            n_test = 0;
        }
        test.extend_from_slice(&members[..n_test]);
        train.extend_from_slice(&members[n_test..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    (train, test)
}

/// Duplicate random members of smaller classes until every class matches the largest.
///
/// `positions` index into `labels`; the result is the original positions followed by the
/// drawn duplicates.
pub fn oversample_minority(positions: &[usize], labels: &[String], seed: u64) -> Vec<usize> {
    let mut rng = StdRng::seed_from_u64(seed);
    let subset: Vec<String> = positions.iter().map(|&i| labels[i].clone()).collect();
    let groups = group_by_label(&subset);
    let largest = groups.values().map(Vec::len).max().unwrap_or(0);

    let mut out = positions.to_vec();
    for members in groups.values() {
        for _ in members.len()..largest {
            let pick = members[rng.gen_range(0..members.len())];
            out.push(positions[pick]);
        }
    }
    out
}

fn group_by_label(labels: &[String]) -> BTreeMap<&str, Vec<usize>> {
    let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, label) in labels.iter().enumerate() {
        groups.entry(label.as_str()).or_default().push(i);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(spec: &[(&str, usize)]) -> Vec<String> {
        spec.iter()
            .flat_map(|(l, n)| std::iter::repeat(l.to_string()).take(*n))
            .collect()
    }

    #[test]
    fn test_split_is_stratified_and_disjoint() {
        let y = labels(&[("a", 50), ("b", 10)]);
        let (train, test) = stratified_split(&y, 0.2, 42);
        assert_eq!(train.len() + test.len(), 60);
        assert_eq!(test.iter().filter(|&&i| y[i] == "a").count(), 10);
        assert_eq!(test.iter().filter(|&&i| y[i] == "b").count(), 2);
        assert!(train.iter().all(|i| !test.contains(i)));
    }

    #[test]
    fn test_split_is_seeded() {
        let y = labels(&[("a", 30), ("b", 30)]);
        assert_eq!(stratified_split(&y, 0.3, 7), stratified_split(&y, 0.3, 7));
        assert_ne!(stratified_split(&y, 0.3, 7).1, stratified_split(&y, 0.3, 8).1);
    }

    #[test]
    fn test_singleton_class_stays_in_train() {
        let y = labels(&[("a", 5), ("b", 1)]);
        let (train, test) = stratified_split(&y, 0.5, 1);
        assert!(train.contains(&5));
        assert!(!test.contains(&5));
    }

    #[test]
    fn test_oversample_balances() {
        let y = labels(&[("a", 8), ("b", 2)]);
        let positions: Vec<usize> = (0..10).collect();
        let out = oversample_minority(&positions, &y, 42);
        assert_eq!(out.len(), 16);
        assert_eq!(out.iter().filter(|&&i| y[i] == "b").count(), 8);
    }
}
