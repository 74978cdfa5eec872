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

//! User-user similarities maintained under a stream of revealed ratings.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::distributions::Beta;
use crate::preferences::Preferences;

/// A user-user similarity that can be adjusted while ratings arrive one at
/// a time, and rebuilt from the training data wholesale. `Send` because
/// recommenders owning one are handed to worker threads.
pub trait UpdateableSimilarity: Send {

    /// Accounts for user `uidx` rating item `iidx` with `uval` while user
    /// `vidx` already rated the same item with `vval`. Called once per
    /// existing co-rater.
    fn update(&mut self, uidx: u32, vidx: u32, iidx: u32, uval: f64, vval: f64);

    /// Rebuilds all state from the given training data.
    fn update_bulk(&mut self, train: &Preferences);

    /// Similarity between two users. Takes `&mut self` because stochastic
    /// implementations draw a fresh sample per evaluation.
    fn similarity(&mut self, uidx: u32, vidx: u32) -> f64;

    /// All other users with positive similarity to `uidx`.
    fn similar_elems(&mut self, uidx: u32) -> Vec<(u32, f64)> {
        let num_users = self.num_users() as u32;
        (0..num_users)
            .filter(|&vidx| vidx != uidx)
            .map(|vidx| (vidx, self.similarity(uidx, vidx)))
            .filter(|&(_, sim)| sim > 0.0)
            .collect()
    }

    fn num_users(&self) -> usize;
}

/// Plain cosine over the training vectors, kept incremental: the pairwise
/// dot products and the squared norms are adjusted as ratings arrive.
pub struct CosineSimilarity {
    dots: Vec<Vec<f64>>,
    norms: Vec<f64>,
    // guards the norm against multiple increments for the same rating,
    // update() fires once per co-rater of one (user, item) event
    cursor: Option<(u32, u32)>,
}

impl CosineSimilarity {

    pub fn new(num_users: usize) -> Self {
        CosineSimilarity {
            dots: vec![vec![0.0; num_users]; num_users],
            norms: vec![0.0; num_users],
            cursor: None,
        }
    }
}

impl UpdateableSimilarity for CosineSimilarity {

    fn update(&mut self, uidx: u32, vidx: u32, iidx: u32, uval: f64, vval: f64) {
        self.dots[uidx as usize][vidx as usize] += uval * vval;
        self.dots[vidx as usize][uidx as usize] += uval * vval;

        if self.cursor != Some((uidx, iidx)) {
            self.norms[uidx as usize] += uval * uval;
            self.cursor = Some((uidx, iidx));
        }
    }

    // Rows are independent, one rayon task rebuilds one user.
    fn update_bulk(&mut self, train: &Preferences) {
        self.dots
            .par_iter_mut()
            .zip(self.norms.par_iter_mut())
            .enumerate()
            .for_each(|(uidx, (dots, norm))| {
                dots.iter_mut().for_each(|dot| *dot = 0.0);
                *norm = train
                    .user_prefs(uidx as u32)
                    .iter()
                    .map(|pref| {
                        for co_rater in train.item_prefs(pref.idx) {
                            dots[co_rater.idx as usize] += pref.value * co_rater.value;
                        }
                        pref.value * pref.value
                    })
                    .sum();
            });
    }

    fn similarity(&mut self, uidx: u32, vidx: u32) -> f64 {
        let denominator =
            self.norms[uidx as usize].sqrt() * self.norms[vidx as usize].sqrt();
        if denominator == 0.0 {
            0.0
        } else {
            self.dots[uidx as usize][vidx as usize] / denominator
        }
    }

    fn num_users(&self) -> usize {
        self.norms.len()
    }
}

/// Similarity as a per-pair Beta posterior over "both users like the same
/// items". Evidence counts positive co-ratings, and every evaluation draws
/// a fresh sample from the posterior, so neighborhoods are explored rather
/// than fixed.
pub struct BetaStochasticSimilarity {
    evidence: Vec<Vec<f64>>,
    usercount: Vec<f64>,
    alpha: f64,
    beta: f64,
    cursor: Option<(u32, u32)>,
    rng: ChaCha8Rng,
}

impl BetaStochasticSimilarity {

    pub fn new(num_users: usize, alpha: f64, beta: f64, seed: u64) -> Self {
        BetaStochasticSimilarity {
            evidence: vec![vec![0.0; num_users]; num_users],
            usercount: vec![0.0; num_users],
            alpha,
            beta,
            cursor: None,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Posterior mean instead of a sample, for inspection and tests.
    pub fn exact_similarity(&self, uidx: u32, vidx: u32) -> f64 {
        (self.evidence[uidx as usize][vidx as usize] + self.alpha)
            / (self.usercount[vidx as usize] + self.beta)
    }
}

impl UpdateableSimilarity for BetaStochasticSimilarity {

    fn update(&mut self, uidx: u32, vidx: u32, iidx: u32, uval: f64, vval: f64) {
        if !vval.is_nan() && uval * vval > 0.0 {
            self.evidence[uidx as usize][vidx as usize] += 1.0;
            self.evidence[vidx as usize][uidx as usize] += 1.0;
        }

        if self.cursor != Some((uidx, iidx)) {
            self.cursor = Some((uidx, iidx));
            if uval > 0.0 {
                self.usercount[uidx as usize] += 1.0;
            }
        }
    }

    fn update_bulk(&mut self, train: &Preferences) {
        self.evidence
            .par_iter_mut()
            .zip(self.usercount.par_iter_mut())
            .enumerate()
            .for_each(|(uidx, (evidence, count))| {
                evidence.iter_mut().for_each(|e| *e = 0.0);
                *count = train
                    .user_prefs(uidx as u32)
                    .iter()
                    .map(|pref| {
                        for co_rater in train.item_prefs(pref.idx) {
                            evidence[co_rater.idx as usize] += 1.0;
                        }
                        1.0
                    })
                    .sum();
            });
    }

    fn similarity(&mut self, uidx: u32, vidx: u32) -> f64 {
        let successes = self.evidence[uidx as usize][vidx as usize];
        let failures = self.usercount[vidx as usize] - successes;
        Beta::new(successes + self.alpha, failures + self.beta).sample(&mut self.rng)
    }

    fn num_users(&self) -> usize {
        self.usercount.len()
    }
}
