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

//! Multi-armed bandits over the item catalog. Arms are items, a pull is a
//! recommendation, and the reward is the revealed rating.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::distributions::Beta;
use crate::types::Seeds;

/// Hook to reshape an arm's score before the argmax, e.g. for contextual
/// weighting. The plain simulation always passes [identity_value].
pub type ValueFunction = fn(uidx: u32, iidx: u32, value: f64, num_times: f64) -> f64;

pub fn identity_value(_uidx: u32, _iidx: u32, value: f64, _num_times: f64) -> f64 {
    value
}

/// How an arm's value estimate folds in a new reward.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UpdateFunction {
    /// Running mean over the pulls of the arm.
    Stationary,
    /// Exponential smoothing with the given weight on the new reward.
    NonStationary(f64),
    /// Weights the old value by the total value mass of all arms.
    UseAll,
    /// Plain accumulation.
    Count,
}

impl UpdateFunction {

    pub fn apply(
        &self,
        old_value: f64,
        reward: f64,
        old_sum: f64,
        increment: f64,
        num_times: f64,
    ) -> f64 {
        match *self {
            UpdateFunction::Stationary => {
                if num_times == 0.0 {
                    reward
                } else {
                    old_value + (reward - old_value) / num_times
                }
            }
            UpdateFunction::NonStationary(alpha) => old_value + alpha * (reward - old_value),
            UpdateFunction::UseAll => (old_value * old_sum + reward) / (old_sum + increment),
            UpdateFunction::Count => old_value + reward,
        }
    }
}

/// An item bandit: picks the next arm among the available ones and learns
/// from the reward of every pull.
pub trait ItemBandit: Send {

    /// Picks an arm for the user, or `None` when nothing is available.
    fn next(&mut self, uidx: u32, available: &[u32], value_fn: ValueFunction) -> Option<u32>;

    /// Feeds back the reward of pulling arm `iidx`.
    fn update(&mut self, iidx: u32, value: f64);
}

/// Argmax with uniform tie-breaking. The generator is only consumed when
/// there actually is a tie, which keeps the untie stream aligned across
/// runs that differ in exploration only.
fn argmax_with_ties(
    available: &[u32],
    untie: &mut ChaCha8Rng,
    mut score: impl FnMut(u32) -> f64,
) -> u32 {
    let mut max = f64::NEG_INFINITY;
    let mut top: Vec<u32> = Vec::new();

    for &iidx in available {
        let val = score(iidx);
        if val > max {
            max = val;
            top.clear();
            top.push(iidx);
        } else if val == max {
            top.push(iidx);
        }
    }

    match top.len() {
        // every score was NaN, nothing comparable to a maximum
        0 => available[0],
        1 => top[0],
        len => top[untie.gen_range(0..len)],
    }
}

/// Epsilon-greedy with a fixed exploration rate.
pub struct EpsilonGreedy {
    epsilon: f64,
    values: Vec<f64>,
    num_times: Vec<f64>,
    sum_values: f64,
    update_fn: UpdateFunction,
    untie: ChaCha8Rng,
    explore: ChaCha8Rng,
}

impl EpsilonGreedy {

    pub fn new(num_items: usize, epsilon: f64, update_fn: UpdateFunction, seeds: Seeds) -> Self {
        EpsilonGreedy {
            epsilon,
            values: vec![0.0; num_items],
            num_times: vec![0.0; num_items],
            sum_values: 0.0,
            update_fn,
            untie: ChaCha8Rng::seed_from_u64(seeds.untie),
            explore: ChaCha8Rng::seed_from_u64(seeds.explore),
        }
    }
}

impl ItemBandit for EpsilonGreedy {

    fn next(&mut self, uidx: u32, available: &[u32], value_fn: ValueFunction) -> Option<u32> {
        if available.is_empty() {
            None
        } else if available.len() == 1 {
            Some(available[0])
        } else if self.explore.gen::<f64>() < self.epsilon {
            Some(available[self.untie.gen_range(0..available.len())])
        } else {
            let values = &self.values;
            let num_times = &self.num_times;
            Some(argmax_with_ties(available, &mut self.untie, |iidx| {
                value_fn(uidx, iidx, values[iidx as usize], num_times[iidx as usize])
            }))
        }
    }

    fn update(&mut self, iidx: u32, value: f64) {
        let old_sum = self.sum_values;
        let increment = value;
        let n_times = self.num_times[iidx as usize] + 1.0;
        let old_value = self.values[iidx as usize];

        self.num_times[iidx as usize] += 1.0;
        let new_value = self.update_fn.apply(old_value, value, old_sum, increment, n_times);
        self.values[iidx as usize] = new_value;
        self.sum_values += new_value - old_value;
    }
}

/// Epsilon-greedy whose exploration rate decays over the iterations:
/// epsilon_t = min(1, slope * numItems / t).
pub struct EpsilonTGreedy {
    slope: f64,
    num_items: usize,
    num_iter: f64,
    values: Vec<f64>,
    num_times: Vec<f64>,
    sum_values: f64,
    update_fn: UpdateFunction,
    untie: ChaCha8Rng,
    explore: ChaCha8Rng,
}

impl EpsilonTGreedy {

    pub fn new(num_items: usize, slope: f64, update_fn: UpdateFunction, seeds: Seeds) -> Self {
        EpsilonTGreedy {
            slope,
            num_items,
            num_iter: 1.0,
            values: vec![0.0; num_items],
            num_times: vec![0.0; num_items],
            sum_values: 0.0,
            update_fn,
            untie: ChaCha8Rng::seed_from_u64(seeds.untie),
            explore: ChaCha8Rng::seed_from_u64(seeds.explore),
        }
    }
}

impl ItemBandit for EpsilonTGreedy {

    fn next(&mut self, uidx: u32, available: &[u32], value_fn: ValueFunction) -> Option<u32> {
        if available.is_empty() {
            None
        } else if available.len() == 1 {
            Some(available[0])
        } else {
            let epsilon = (self.slope * self.num_items as f64 / self.num_iter).min(1.0);
            if self.explore.gen::<f64>() < epsilon {
                Some(available[self.untie.gen_range(0..available.len())])
            } else {
                let values = &self.values;
                let num_times = &self.num_times;
                Some(argmax_with_ties(available, &mut self.untie, |iidx| {
                    value_fn(uidx, iidx, values[iidx as usize], num_times[iidx as usize])
                }))
            }
        }
    }

    fn update(&mut self, iidx: u32, value: f64) {
        let old_sum = self.sum_values;
        let increment = value;
        let n_times = self.num_times[iidx as usize] + 1.0;
        let old_value = self.values[iidx as usize];

        self.num_times[iidx as usize] += 1.0;
        self.num_iter += 1.0;
        let new_value = self.update_fn.apply(old_value, value, old_sum, increment, n_times);
        self.values[iidx as usize] = new_value;
        self.sum_values += new_value - old_value;
    }
}

/// The UCB1 index policy: mean reward plus a confidence radius that shrinks
/// with the number of pulls. Arms never pulled score infinity, so every arm
/// gets tried before any is repeated.
pub struct Ucb1 {
    values: Vec<f64>,
    num_times: Vec<f64>,
    num_iter: u64,
    untie: ChaCha8Rng,
}

impl Ucb1 {

    pub fn new(num_items: usize, seeds: Seeds) -> Self {
        Ucb1 {
            values: vec![0.0; num_items],
            num_times: vec![0.0; num_items],
            num_iter: 0,
            untie: ChaCha8Rng::seed_from_u64(seeds.untie),
        }
    }
}

impl ItemBandit for Ucb1 {

    fn next(&mut self, uidx: u32, available: &[u32], value_fn: ValueFunction) -> Option<u32> {
        if available.is_empty() {
            None
        } else if available.len() == 1 {
            Some(available[0])
        } else {
            let values = &self.values;
            let num_times = &self.num_times;
            let log_t = ((self.num_iter + 1) as f64).ln();
            Some(argmax_with_ties(available, &mut self.untie, |iidx| {
                let pulls = num_times[iidx as usize];
                if pulls == 0.0 {
                    f64::INFINITY
                } else {
                    let bound = values[iidx as usize] + (2.0 * log_t / pulls).sqrt();
                    value_fn(uidx, iidx, bound, pulls)
                }
            }))
        }
    }

    fn update(&mut self, iidx: u32, value: f64) {
        self.num_times[iidx as usize] += 1.0;
        self.num_iter += 1;
        let pulls = self.num_times[iidx as usize];
        self.values[iidx as usize] += (value - self.values[iidx as usize]) / pulls;
    }
}

/// UCB1-Tuned: like [Ucb1] but the confidence radius also tracks the
/// empirical variance of each arm, capped at 1/4 (the variance of a
/// Bernoulli reward).
pub struct Ucb1Tuned {
    values: Vec<f64>,
    squared: Vec<f64>,
    num_times: Vec<f64>,
    num_iter: u64,
    untie: ChaCha8Rng,
}

impl Ucb1Tuned {

    pub fn new(num_items: usize, seeds: Seeds) -> Self {
        Ucb1Tuned {
            values: vec![0.0; num_items],
            squared: vec![0.0; num_items],
            num_times: vec![0.0; num_items],
            num_iter: 0,
            untie: ChaCha8Rng::seed_from_u64(seeds.untie),
        }
    }
}

impl ItemBandit for Ucb1Tuned {

    fn next(&mut self, uidx: u32, available: &[u32], value_fn: ValueFunction) -> Option<u32> {
        if available.is_empty() {
            None
        } else if available.len() == 1 {
            Some(available[0])
        } else {
            let values = &self.values;
            let squared = &self.squared;
            let num_times = &self.num_times;
            let log_t = ((self.num_iter + 1) as f64).ln();
            Some(argmax_with_ties(available, &mut self.untie, |iidx| {
                let pulls = num_times[iidx as usize];
                if pulls == 0.0 {
                    f64::INFINITY
                } else {
                    let mean = values[iidx as usize];
                    let variance = squared[iidx as usize] / pulls - mean * mean;
                    let spread = variance + (2.0 * log_t / pulls).sqrt();
                    let bound = mean + (log_t / pulls * spread.min(0.25)).sqrt();
                    value_fn(uidx, iidx, bound, pulls)
                }
            }))
        }
    }

    fn update(&mut self, iidx: u32, value: f64) {
        self.num_times[iidx as usize] += 1.0;
        self.num_iter += 1;
        let pulls = self.num_times[iidx as usize];
        self.values[iidx as usize] += (value - self.values[iidx as usize]) / pulls;
        self.squared[iidx as usize] += value * value;
    }
}

/// Thompson sampling: a Beta posterior per arm, and every pick draws one
/// sample per available arm and takes the argmax.
pub struct ThompsonSampling {
    betas: Vec<Beta>,
    untie: ChaCha8Rng,
    explore: ChaCha8Rng,
}

impl ThompsonSampling {

    pub fn new(num_items: usize, seeds: Seeds) -> Self {
        Self::with_prior(num_items, 1.0, 1.0, seeds)
    }

    pub fn with_prior(num_items: usize, alpha: f64, beta: f64, seeds: Seeds) -> Self {
        ThompsonSampling {
            betas: vec![Beta::new(alpha, beta); num_items],
            untie: ChaCha8Rng::seed_from_u64(seeds.untie),
            explore: ChaCha8Rng::seed_from_u64(seeds.explore),
        }
    }

    pub fn with_priors(alphas: &[f64], betas: &[f64], seeds: Seeds) -> Self {
        ThompsonSampling {
            betas: alphas
                .iter()
                .zip(betas.iter())
                .map(|(&alpha, &beta)| Beta::new(alpha, beta))
                .collect(),
            untie: ChaCha8Rng::seed_from_u64(seeds.untie),
            explore: ChaCha8Rng::seed_from_u64(seeds.explore),
        }
    }
}

impl ItemBandit for ThompsonSampling {

    fn next(&mut self, uidx: u32, available: &[u32], value_fn: ValueFunction) -> Option<u32> {
        if available.is_empty() {
            None
        } else if available.len() == 1 {
            Some(available[0])
        } else {
            let betas = &self.betas;
            let explore = &mut self.explore;
            Some(argmax_with_ties(available, &mut self.untie, |iidx| {
                value_fn(uidx, iidx, betas[iidx as usize].sample(explore), 0.0)
            }))
        }
    }

    fn update(&mut self, iidx: u32, value: f64) {
        self.betas[iidx as usize].observe(value, 1.0 - value);
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    fn seeds() -> Seeds {
        Seeds::derive(42)
    }

    #[test]
    fn update_functions_follow_their_formulas() {
        let stationary = UpdateFunction::Stationary;
        assert_eq!(stationary.apply(0.0, 1.0, 0.0, 1.0, 1.0), 1.0);
        assert_eq!(stationary.apply(1.0, 0.0, 0.0, 0.0, 2.0), 0.5);

        let smoothed = UpdateFunction::NonStationary(0.1);
        assert!((smoothed.apply(0.5, 1.0, 0.0, 0.0, 9.0) - 0.55).abs() < 1e-12);

        let use_all = UpdateFunction::UseAll;
        assert!((use_all.apply(0.5, 1.0, 2.0, 1.0, 3.0) - (0.5 * 2.0 + 1.0) / 3.0).abs() < 1e-12);

        let count = UpdateFunction::Count;
        assert_eq!(count.apply(2.0, 1.0, 0.0, 0.0, 5.0), 3.0);
    }

    #[test]
    fn empty_and_singleton_availability_short_circuit() {
        let mut bandit = Ucb1::new(3, seeds());

        assert_eq!(bandit.next(0, &[], identity_value), None);
        assert_eq!(bandit.next(0, &[2], identity_value), Some(2));
    }

    #[test]
    fn ucb1_tries_every_arm_before_repeating_any() {
        let mut bandit = Ucb1::new(3, seeds());
        let mut seen = Vec::new();

        for _ in 0..3 {
            let arm = bandit.next(0, &[0, 1, 2], identity_value).unwrap();
            assert!(!seen.contains(&arm));
            seen.push(arm);
            bandit.update(arm, 0.0);
        }
    }

    #[test]
    fn ucb1_tracks_the_running_mean() {
        let mut bandit = Ucb1::new(2, seeds());

        bandit.update(0, 1.0);
        bandit.update(0, 0.0);
        bandit.update(0, 1.0);

        assert!((bandit.values[0] - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(bandit.num_times[0], 3.0);
        assert_eq!(bandit.num_iter, 3);
    }

    #[test]
    fn ucb1_favors_the_better_arm_in_the_long_run() {
        let mut bandit = Ucb1::new(2, seeds());
        let mut pulls = [0u32; 2];

        for _ in 0..200 {
            let arm = bandit.next(0, &[0, 1], identity_value).unwrap();
            pulls[arm as usize] += 1;
            let reward = if arm == 0 { 1.0 } else { 0.0 };
            bandit.update(arm, reward);
        }

        assert!(pulls[0] > 150, "good arm pulled only {} times", pulls[0]);
    }

    #[test]
    fn ucb1_tuned_caps_the_variance_term() {
        let mut bandit = Ucb1Tuned::new(2, seeds());

        // an arm with maximally spread rewards
        for _ in 0..10 {
            bandit.update(0, 1.0);
            bandit.update(0, 0.0);
        }
        bandit.update(1, 1.0);

        let arm = bandit.next(0, &[0, 1], identity_value).unwrap();
        // the single-pull arm keeps the larger confidence radius
        assert_eq!(arm, 1);
    }

    #[test]
    fn greedy_without_exploration_exploits_the_best_value() {
        let mut bandit = EpsilonGreedy::new(3, 0.0, UpdateFunction::Stationary, seeds());

        bandit.update(0, 0.2);
        bandit.update(1, 0.9);
        bandit.update(2, 0.4);

        for _ in 0..10 {
            assert_eq!(bandit.next(0, &[0, 1, 2], identity_value), Some(1));
        }
    }

    #[test]
    fn the_running_mean_decides_between_competing_arms() {
        let mut bandit = EpsilonGreedy::new(3, 0.0, UpdateFunction::Stationary, seeds());

        // arm 0 averages down to 0.5, arm 1 stays at 1.0
        bandit.update(0, 1.0);
        bandit.update(0, 0.0);
        bandit.update(1, 1.0);

        assert_eq!(bandit.next(0, &[0, 1, 2], identity_value), Some(1));
    }

    #[test]
    fn full_exploration_is_reproducible_per_seed() {
        let mut first = EpsilonGreedy::new(4, 1.0, UpdateFunction::Stationary, seeds());
        let mut second = EpsilonGreedy::new(4, 1.0, UpdateFunction::Stationary, seeds());

        for _ in 0..20 {
            assert_eq!(
                first.next(0, &[0, 1, 2, 3], identity_value),
                second.next(0, &[0, 1, 2, 3], identity_value)
            );
        }
    }

    #[test]
    fn decaying_epsilon_shrinks_with_the_iterations() {
        let mut bandit = EpsilonTGreedy::new(2, 0.05, UpdateFunction::Stationary, seeds());

        // establish a clear winner
        bandit.update(1, 1.0);
        for _ in 0..2000 {
            bandit.update(0, 0.0);
        }

        // epsilon is now 0.05 * 2 / 2001, exploitation dominates
        let picks: Vec<_> = (0..100)
            .map(|_| bandit.next(0, &[0, 1], identity_value).unwrap())
            .collect();
        let exploitations = picks.iter().filter(|&&arm| arm == 1).count();
        assert!(exploitations > 90, "exploited only {} times", exploitations);
    }

    #[test]
    fn thompson_concentrates_on_the_rewarded_arm() {
        let mut bandit = ThompsonSampling::new(2, seeds());

        for _ in 0..50 {
            bandit.update(0, 1.0);
            bandit.update(1, 0.0);
        }

        let wins = (0..100)
            .filter(|_| bandit.next(0, &[0, 1], identity_value) == Some(0))
            .count();
        assert!(wins > 90, "rewarded arm won only {} draws", wins);
    }

    #[test]
    fn thompson_priors_bias_the_first_draws() {
        let mut bandit =
            ThompsonSampling::with_priors(&[50.0, 1.0], &[1.0, 50.0], seeds());

        let wins = (0..100)
            .filter(|_| bandit.next(0, &[0, 1], identity_value) == Some(0))
            .count();
        assert!(wins > 90, "favored prior won only {} draws", wins);
    }
}
