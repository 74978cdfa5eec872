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

//! Implicit-feedback matrix factorization and its interactive wrapper.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::distributions::{sample_normal, EPSILON};
use crate::preferences::Preferences;
use crate::recommenders::{InteractiveRecommender, RecommenderCore};
use crate::types::Entry;

/// Positive ratings absorbed between two recomputations of the model.
const REFACTOR_LIMIT: u32 = 100;

/// Latent user and item vectors, both stored row-major.
pub struct Factorization {
    user_factors: Vec<f64>,
    item_factors: Vec<f64>,
    k: usize,
}

impl Factorization {

    pub fn user_vector(&self, uidx: u32) -> &[f64] {
        let offset = uidx as usize * self.k;
        &self.user_factors[offset..offset + self.k]
    }

    pub fn item_vector(&self, iidx: u32) -> &[f64] {
        let offset = iidx as usize * self.k;
        &self.item_factors[offset..offset + self.k]
    }

    pub fn score(&self, uidx: u32, iidx: u32) -> f64 {
        self.user_vector(uidx)
            .iter()
            .zip(self.item_vector(iidx))
            .map(|(pu, qi)| pu * qi)
            .sum()
    }
}

/// Alternating least squares over implicit feedback: every observed rating
/// becomes a binary preference of one held with confidence
/// `1 + alpha * value`, unobserved pairs a preference of zero with
/// confidence one.
pub struct AlsFactorizer {
    alpha: f64,
    lambda: f64,
    num_iter: usize,
}

impl AlsFactorizer {

    pub fn new(alpha: f64, lambda: f64, num_iter: usize) -> Self {
        AlsFactorizer { alpha, lambda, num_iter }
    }

    pub fn factorize(&self, k: usize, train: &Preferences, seed: u64) -> Factorization {
        let num_users = train.num_users();
        let num_items = train.num_items();

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut user_factors = vec![0.0; num_users * k];
        let mut item_factors: Vec<f64> = (0..num_items * k)
            .map(|_| sample_normal(&mut rng) * 0.01)
            .collect();

        for _ in 0..self.num_iter {
            let gram = gram_matrix(&item_factors, k);
            for uidx in 0..num_users {
                self.solve_factors(
                    &gram,
                    &item_factors,
                    train.user_prefs(uidx as u32),
                    k,
                    &mut user_factors[uidx * k..(uidx + 1) * k],
                );
            }

            let gram = gram_matrix(&user_factors, k);
            for iidx in 0..num_items {
                self.solve_factors(
                    &gram,
                    &user_factors,
                    train.item_prefs(iidx as u32),
                    k,
                    &mut item_factors[iidx * k..(iidx + 1) * k],
                );
            }
        }

        Factorization { user_factors, item_factors, k }
    }

    /// Least squares for one row: minimizes over x the confidence-weighted
    /// error against the binary preferences, which reduces to
    /// `(FᵀF + λI + Σ (c-1) f fᵀ) x = Σ c f` over the observed rows f.
    fn solve_factors(
        &self,
        gram: &[f64],
        fixed: &[f64],
        observed: &[Entry],
        k: usize,
        out: &mut [f64],
    ) {
        let mut a = gram.to_vec();
        for d in 0..k {
            a[d * k + d] += self.lambda;
        }

        let mut b = vec![0.0; k];
        for entry in observed {
            let offset = entry.idx as usize * k;
            let f = &fixed[offset..offset + k];
            let confidence = 1.0 + self.alpha * entry.value;
            for i in 0..k {
                b[i] += confidence * f[i];
                for j in 0..k {
                    a[i * k + j] += (confidence - 1.0) * f[i] * f[j];
                }
            }
        }

        let l = cholesky_decompose(&a, k);
        let x = cholesky_solve(&l, &b, k);
        out.copy_from_slice(&x);
    }
}

fn gram_matrix(factors: &[f64], k: usize) -> Vec<f64> {
    let mut gram = vec![0.0; k * k];
    for row in factors.chunks_exact(k) {
        for i in 0..k {
            for j in 0..k {
                gram[i * k + j] += row[i] * row[j];
            }
        }
    }
    gram
}

/// Lower-triangular L with `L Lᵀ = A` for a symmetric positive definite A,
/// with a floor on degenerate pivots.
fn cholesky_decompose(a: &[f64], d: usize) -> Vec<f64> {
    let mut l = vec![0.0; d * d];

    for i in 0..d {
        for j in 0..=i {
            let mut sum = a[i * d + j];
            for m in 0..j {
                sum -= l[i * d + m] * l[j * d + m];
            }

            if i == j {
                l[i * d + i] = if sum <= 0.0 { EPSILON.sqrt() } else { sum.sqrt() };
            } else {
                let diag = l[j * d + j];
                l[i * d + j] = if diag.abs() > EPSILON { sum / diag } else { 0.0 };
            }
        }
    }

    l
}

/// Solves `L Lᵀ x = b` by forward and backward substitution.
fn cholesky_solve(l: &[f64], b: &[f64], d: usize) -> Vec<f64> {
    let mut y = vec![0.0; d];
    for i in 0..d {
        let mut sum = b[i];
        for j in 0..i {
            sum -= l[i * d + j] * y[j];
        }
        let diag = l[i * d + i];
        y[i] = if diag.abs() > EPSILON { sum / diag } else { 0.0 };
    }

    let mut x = vec![0.0; d];
    for i in (0..d).rev() {
        let mut sum = y[i];
        for j in i + 1..d {
            sum -= l[j * d + i] * x[j];
        }
        let diag = l[i * d + i];
        x[i] = if diag.abs() > EPSILON { sum / diag } else { 0.0 };
    }

    x
}

/// Recommends by inner product of the latent vectors, refactorizing after
/// every hundredth positive rating and on every batch update.
pub struct MfRecommender<'a> {
    core: RecommenderCore<'a>,
    factorizer: AlsFactorizer,
    factorization: Factorization,
    k: usize,
    factor_rng: ChaCha8Rng,
    positive_counter: u32,
}

impl<'a> MfRecommender<'a> {

    /// A non-positive `k` falls back to one factor per user.
    pub fn new(
        core: RecommenderCore<'a>,
        k: usize,
        factorizer: AlsFactorizer,
        factor_seed: u64,
    ) -> Self {
        let k = if k > 0 { k } else { core.num_users() };
        let mut factor_rng = ChaCha8Rng::seed_from_u64(factor_seed);
        let factorization = factorizer.factorize(k, core.train(), factor_rng.gen());
        MfRecommender {
            core,
            factorizer,
            factorization,
            k,
            factor_rng,
            positive_counter: 0,
        }
    }
}

impl<'a> InteractiveRecommender<'a> for MfRecommender<'a> {

    fn core(&self) -> &RecommenderCore<'a> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RecommenderCore<'a> {
        &mut self.core
    }

    fn next(&mut self, uidx: u32) -> Option<u32> {
        let factorization = &self.factorization;
        self.core.argmax_available(uidx, |iidx| {
            let val = factorization.score(uidx, iidx);
            if val.is_nan() {
                f64::NEG_INFINITY
            } else {
                val
            }
        })
    }

    fn absorb(&mut self, _uidx: u32, _iidx: u32, value: f64) {
        if value > 0.0 {
            self.positive_counter += 1;
        }
        if self.positive_counter >= REFACTOR_LIMIT {
            self.positive_counter = 0;
            debug!(num_prefs = self.core.train().num_preferences(), "periodic refactorization");
            self.factorization =
                self.factorizer
                    .factorize(self.k, self.core.train(), self.factor_rng.gen());
        }
    }

    fn absorb_batch(&mut self, _tuples: &[(u32, u32, f64)]) {
        self.positive_counter = 0;
        debug!(num_prefs = self.core.train().num_preferences(), "batch refactorization");
        self.factorization =
            self.factorizer
                .factorize(self.k, self.core.train(), self.factor_rng.gen());
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn cholesky_of_the_identity_is_the_identity() {
        let a = vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        let l = cholesky_decompose(&a, 3);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!(approx_eq(l[i * 3 + j], expected));
            }
        }
    }

    #[test]
    fn cholesky_solves_a_small_system() {
        let a = vec![4.0, 2.0, 2.0, 3.0];
        let b = vec![4.0, 5.0];
        let l = cholesky_decompose(&a, 2);
        let x = cholesky_solve(&l, &b, 2);
        assert!(approx_eq(x[0], 0.25));
        assert!(approx_eq(x[1], 1.5));
    }

    #[test]
    fn factorization_separates_disjoint_tastes() {
        let train = Preferences::load(2, 2, &[(0, 0, 1.0), (1, 1, 1.0)]);
        let factorizer = AlsFactorizer::new(2.0, 0.1, 20);
        let factorization = factorizer.factorize(2, &train, 7);

        assert!(factorization.score(0, 0) > factorization.score(0, 1));
        assert!(factorization.score(1, 1) > factorization.score(1, 0));
    }

    #[test]
    fn factorization_is_reproducible_for_a_seed() {
        let train = Preferences::load(2, 3, &[(0, 0, 1.0), (1, 2, 1.0)]);
        let factorizer = AlsFactorizer::new(2.0, 0.1, 5);

        let first = factorizer.factorize(2, &train, 11);
        let second = factorizer.factorize(2, &train, 11);

        assert_eq!(first.user_factors, second.user_factors);
        assert_eq!(first.item_factors, second.item_factors);
    }

    #[test]
    fn refactorizes_after_a_hundred_positive_ratings() {
        let gt = Preferences::load(1, 2, &[(0, 0, 1.0), (0, 1, 1.0)]);
        let core = RecommenderCore::new(&gt, false, 42);
        let mut rec = MfRecommender::new(core, 2, AlsFactorizer::new(2.0, 0.1, 2), 7);

        for _ in 0..5 {
            rec.absorb(0, 0, 0.0);
        }
        assert_eq!(rec.positive_counter, 0);

        for _ in 0..99 {
            rec.absorb(0, 0, 1.0);
        }
        assert_eq!(rec.positive_counter, 99);

        rec.absorb(0, 0, 1.0);
        assert_eq!(rec.positive_counter, 0);
    }

    #[test]
    fn batch_updates_reset_the_counter_and_the_model() {
        let gt = Preferences::load(2, 2, &[(0, 0, 1.0), (1, 1, 1.0)]);
        let core = RecommenderCore::new(&gt, false, 42);
        let mut rec = MfRecommender::new(core, 2, AlsFactorizer::new(2.0, 0.1, 2), 7);

        rec.absorb(0, 0, 1.0);
        assert_eq!(rec.positive_counter, 1);

        rec.update_batch(&[(0, 0), (1, 1)]);
        assert_eq!(rec.positive_counter, 0);
        assert_eq!(rec.core().train().num_preferences(), 2);
    }

    #[test]
    fn recommends_through_the_whole_availability() {
        let gt = Preferences::load(2, 3, &[(0, 0, 1.0), (1, 1, 1.0)]);
        let core = RecommenderCore::new(&gt, false, 42);
        let mut rec = MfRecommender::new(core, 2, AlsFactorizer::new(2.0, 0.1, 2), 7);

        let mut count = 0;
        while let Some(iidx) = rec.next(0) {
            rec.update(0, iidx);
            count += 1;
        }
        assert_eq!(count, 3);
    }
}
