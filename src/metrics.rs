/*
 * Recloop
 * Copyright (C) 2020 The recloop developers
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program. If not, see <http://www.gnu.org/licenses/>.
 */

//! Metrics accumulated over the sequence of recommendations, cheap enough
//! to be evaluated after every single iteration.

use fnv::FnvHashMap;

use crate::preferences::Preferences;

/// A metric fed one (user, item) recommendation at a time.
pub trait CumulativeMetric {

    /// Accounts for one recommendation of item `iidx` to user `uidx`.
    fn update(&mut self, uidx: u32, iidx: u32);

    /// Current value of the metric.
    fn compute(&self) -> f64;

    /// Forgets everything seen so far.
    fn reset(&mut self);
}

/// Fraction of the relevant (user, item) pairs discovered so far.
///
/// The denominator is fixed up front, so the metric is comparable across
/// algorithms no matter how many iterations each of them survives.
pub struct CumulativeRecall<'a> {
    ground_truth: &'a Preferences,
    num_relevant: u64,
    threshold: f64,
    discovered: u64,
}

impl<'a> CumulativeRecall<'a> {

    pub fn new(ground_truth: &'a Preferences, num_relevant: u64, threshold: f64) -> Self {
        CumulativeRecall {
            ground_truth,
            num_relevant,
            threshold,
            discovered: 0,
        }
    }
}

impl CumulativeMetric for CumulativeRecall<'_> {

    fn update(&mut self, uidx: u32, iidx: u32) {
        if let Some(value) = self.ground_truth.get(uidx, iidx) {
            if value >= self.threshold {
                self.discovered += 1;
            }
        }
    }

    fn compute(&self) -> f64 {
        if self.num_relevant == 0 {
            0.0
        } else {
            self.discovered as f64 / self.num_relevant as f64
        }
    }

    fn reset(&mut self) {
        self.discovered = 0;
    }
}

/// Gini index over how evenly the recommendations spread across the item
/// catalog. 0 means perfectly even, 1 means all exposure went to one item.
///
/// Recomputing the index from scratch costs a sort per iteration, so this
/// maintains the numerator incrementally. Think of the items as sorted by
/// frequency: `mins` and `maxs` give, for every occurring frequency, the
/// first and last rank of its block in that order. A single update moves
/// one item from the end of its block to the start of the next, which
/// changes the numerator by a closed-form amount.
pub struct CumulativeGini {
    num_items: usize,
    frequencies: Vec<u64>,
    mins: FnvHashMap<u64, i64>,
    maxs: FnvHashMap<u64, i64>,
    freq_sum: u64,
    num_sum: f64,
}

impl CumulativeGini {

    pub fn new(num_items: usize) -> Self {
        let mut gini = CumulativeGini {
            num_items,
            frequencies: vec![0; num_items],
            mins: FnvHashMap::default(),
            maxs: FnvHashMap::default(),
            freq_sum: 0,
            num_sum: 0.0,
        };
        gini.reset();
        gini
    }
}

impl CumulativeMetric for CumulativeGini {

    fn update(&mut self, _uidx: u32, iidx: u32) {

        if iidx as usize >= self.num_items {
            return;
        }

        self.freq_sum += 1;
        let freq = self.frequencies[iidx as usize];
        self.frequencies[iidx as usize] = freq + 1;

        // Ranks of the block of items that share the old frequency, and the
        // first rank of the block above. A missing block above means the
        // item starts a new one right where it sits.
        let min_freq = *self.mins.get(&freq).unwrap_or(&0);
        let max_freq = *self.maxs.get(&freq).unwrap_or(&0);
        let min_new_freq = *self.mins.get(&(freq + 1)).unwrap_or(&max_freq);

        let n = self.num_items as i64;
        let mut increment = ((n + 1 - 2 * max_freq) * freq as i64) as f64;
        if min_new_freq == max_freq {
            increment += ((2 * max_freq - n - 1) * (freq as i64 + 1)) as f64;
        } else {
            increment += ((2 * min_new_freq - n - 3) * (freq as i64 + 1)) as f64;
        }
        self.num_sum += increment;

        // The item leaves its old block...
        if min_freq == max_freq {
            self.mins.remove(&freq);
            self.maxs.remove(&freq);
        } else {
            self.maxs.insert(freq, max_freq - 1);
        }

        // ...and joins (or founds) the block of the new frequency.
        if min_new_freq == max_freq {
            self.mins.insert(freq + 1, max_freq);
            self.maxs.insert(freq + 1, max_freq);
        } else {
            self.mins.insert(freq + 1, min_new_freq - 1);
        }
    }

    fn compute(&self) -> f64 {
        if self.num_items <= 1 || self.freq_sum == 0 {
            f64::NAN
        } else {
            self.num_sum / ((self.num_items as f64 - 1.0) * self.freq_sum as f64)
        }
    }

    fn reset(&mut self) {
        self.mins.clear();
        self.maxs.clear();

        self.mins.insert(0, 1);
        self.maxs.insert(0, self.num_items as i64);

        self.frequencies.iter_mut().for_each(|freq| *freq = 0);
        self.freq_sum = 0;
        self.num_sum = 0.0;
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn gini_from_scratch(frequencies: &[u64]) -> f64 {
        let n = frequencies.len();
        let mut sorted = frequencies.to_vec();
        sorted.sort_unstable();

        let total: u64 = sorted.iter().sum();
        let numerator: f64 = sorted
            .iter()
            .enumerate()
            .map(|(rank, &freq)| (2.0 * (rank as f64 + 1.0) - n as f64 - 1.0) * freq as f64)
            .sum();

        numerator / ((n as f64 - 1.0) * total as f64)
    }

    #[test]
    fn gini_of_a_hand_computed_sequence() {
        let mut gini = CumulativeGini::new(3);

        assert!(gini.compute().is_nan());

        gini.update(0, 0);
        assert!((gini.compute() - 1.0).abs() < 1e-12);

        // both recommendations on one item, exposure stays maximally skewed
        gini.update(0, 0);
        assert!((gini.compute() - 1.0).abs() < 1e-12);

        gini.update(1, 1);
        assert!((gini.compute() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn gini_matches_recomputation_from_scratch() {
        let mut rng = ChaCha8Rng::seed_from_u64(13);
        let num_items = 10;
        let mut gini = CumulativeGini::new(num_items);

        for _ in 0..500 {
            // Skewed picks so some items stay rare and some untouched
            let item = (rng.gen::<f64>() * rng.gen::<f64>() * num_items as f64) as u32;
            gini.update(0, item.min(num_items as u32 - 1));

            let expected = gini_from_scratch(&gini.frequencies);
            assert!(
                (gini.compute() - expected).abs() < 1e-9,
                "incremental {} vs from scratch {}",
                gini.compute(),
                expected
            );
        }
    }

    #[test]
    fn gini_is_undefined_for_degenerate_catalogs() {
        let mut single = CumulativeGini::new(1);
        single.update(0, 0);
        assert!(single.compute().is_nan());
    }

    #[test]
    fn gini_reset_restores_the_initial_state() {
        let mut gini = CumulativeGini::new(4);
        gini.update(0, 0);
        gini.update(0, 1);
        gini.update(0, 1);

        gini.reset();
        assert!(gini.compute().is_nan());

        gini.update(0, 2);
        assert!((gini.compute() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn recall_counts_pairs_at_or_above_the_threshold() {
        let ground_truth = Preferences::load(
            2,
            3,
            &[(0, 0, 1.0), (0, 1, 0.0), (1, 0, 1.0), (1, 2, 1.0)],
        );
        let mut recall = CumulativeRecall::new(&ground_truth, 3, 0.5);

        assert_eq!(recall.compute(), 0.0);

        recall.update(0, 0);
        assert!((recall.compute() - 1.0 / 3.0).abs() < 1e-12);

        // an irrelevant and an unknown pair leave the numerator alone
        recall.update(0, 1);
        recall.update(0, 2);
        assert!((recall.compute() - 1.0 / 3.0).abs() < 1e-12);

        recall.update(1, 0);
        recall.update(1, 2);
        assert!((recall.compute() - 1.0).abs() < 1e-12);

        recall.reset();
        assert_eq!(recall.compute(), 0.0);
    }

    #[test]
    fn recall_without_relevant_pairs_stays_zero() {
        let ground_truth = Preferences::load(1, 2, &[(0, 0, 0.0)]);
        let mut recall = CumulativeRecall::new(&ground_truth, 0, 0.5);

        recall.update(0, 0);
        assert_eq!(recall.compute(), 0.0);
    }
}
