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

//! The recommendation loop: pick a user at random, let the algorithm pick
//! an item, reveal the rating, track metrics. Users leave the loop once
//! they have nothing left to be recommended.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::metrics::CumulativeMetric;
use crate::preferences::Preferences;
use crate::recommenders::InteractiveRecommender;

pub struct RecommendationLoop<'a> {
    recommender: Box<dyn InteractiveRecommender<'a> + 'a>,
    metrics: Vec<(String, Box<dyn CumulativeMetric + 'a>)>,
    user_pool: Vec<u32>,
    rng: ChaCha8Rng,
    iteration: u32,
    n_iter: u32,
}

impl<'a> RecommendationLoop<'a> {

    /// `n_iter` bounds the loop length, zero meaning run until no user can
    /// be recommended anything. Metrics are reported in name order.
    pub fn new(
        ground_truth: &Preferences,
        recommender: Box<dyn InteractiveRecommender<'a> + 'a>,
        metrics: Vec<(String, Box<dyn CumulativeMetric + 'a>)>,
        n_iter: u32,
        seed: u64,
    ) -> Self {
        let user_pool = (0..ground_truth.num_users() as u32)
            .filter(|&uidx| ground_truth.num_prefs_of_user(uidx) > 0)
            .collect();

        let mut metrics = metrics;
        metrics.sort_by(|a, b| a.0.cmp(&b.0));

        RecommendationLoop {
            recommender,
            metrics,
            user_pool,
            rng: ChaCha8Rng::seed_from_u64(seed),
            iteration: 0,
            n_iter,
        }
    }

    pub fn has_ended(&self) -> bool {
        if self.user_pool.is_empty() {
            return true;
        }
        self.n_iter > 0 && self.iteration >= self.n_iter
    }

    pub fn current_iteration(&self) -> u32 {
        self.iteration
    }

    /// Runs one iteration and returns the recommended pair, or `None` once
    /// every user has left the pool. Users whose availability is exhausted
    /// are dropped here and the draw is repeated.
    pub fn next_iteration(&mut self) -> Option<(u32, u32)> {
        loop {
            if self.user_pool.is_empty() {
                return None;
            }

            let pos = self.rng.gen_range(0..self.user_pool.len());
            let uidx = self.user_pool[pos];

            match self.recommender.next(uidx) {
                Some(iidx) => {
                    self.recommender.update(uidx, iidx);
                    for (_, metric) in self.metrics.iter_mut() {
                        metric.update(uidx, iidx);
                    }
                    self.iteration += 1;
                    return Some((uidx, iidx));
                }
                None => {
                    self.user_pool.remove(pos);
                }
            }
        }
    }

    /// Replays one previously logged iteration: the pair is taken as given
    /// instead of being selected, but the user draw and the recommender's
    /// choice still happen so that every random stream stays aligned with
    /// the run that produced the log.
    pub fn update(&mut self, uidx: u32, iidx: u32) {
        if !self.user_pool.is_empty() {
            let _ = self.rng.gen_range(0..self.user_pool.len());
        }
        let _ = self.recommender.next(uidx);

        self.recommender.update(uidx, iidx);
        for (_, metric) in self.metrics.iter_mut() {
            metric.update(uidx, iidx);
        }
        self.iteration += 1;
    }

    pub fn metric_names(&self) -> Vec<&str> {
        self.metrics.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn metric_values(&self) -> Vec<f64> {
        self.metrics.iter().map(|(_, metric)| metric.compute()).collect()
    }
}
