use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::availability::Availability;
use crate::bandits::{ItemBandit, ValueFunction};
use crate::preferences::Preferences;

/// A forward rating above this value marks a reciprocated link in contact
/// networks, and only then is the reverse rating revealed as well.
pub const RECIPROCAL_LINK_THRESHOLD: f64 = 1.0;

/// State shared by every interactive recommender: the hidden ground truth,
/// the training data accumulated from revealed ratings, what is still
/// recommendable per user, and the tie-breaking generator.
pub struct RecommenderCore<'a> {
    ground_truth: &'a Preferences,
    train: Preferences,
    availability: Availability,
    untie: ChaCha8Rng,
    ignore_unknown: bool,
    not_reciprocal: bool,
}

impl<'a> RecommenderCore<'a> {

    pub fn new(ground_truth: &'a Preferences, ignore_unknown: bool, untie_seed: u64) -> Self {
        RecommenderCore {
            ground_truth,
            train: Preferences::new(ground_truth.num_users(), ground_truth.num_items()),
            availability: Availability::from_ground_truth(ground_truth, false),
            untie: ChaCha8Rng::seed_from_u64(untie_seed),
            ignore_unknown,
            not_reciprocal: false,
        }
    }

    /// Core for contact networks: items are the users themselves, so a user
    /// is never recommended to themselves, and reciprocated links can be
    /// folded back when `not_reciprocal` is set.
    pub fn for_contacts(
        ground_truth: &'a Preferences,
        ignore_unknown: bool,
        not_reciprocal: bool,
        untie_seed: u64,
    ) -> Self {
        RecommenderCore {
            ground_truth,
            train: Preferences::new(ground_truth.num_users(), ground_truth.num_items()),
            availability: Availability::from_ground_truth(ground_truth, true),
            untie: ChaCha8Rng::seed_from_u64(untie_seed),
            ignore_unknown,
            not_reciprocal,
        }
    }

    pub fn ground_truth(&self) -> &'a Preferences {
        self.ground_truth
    }

    pub fn train(&self) -> &Preferences {
        &self.train
    }

    pub fn train_mut(&mut self) -> &mut Preferences {
        &mut self.train
    }

    pub fn availability(&self) -> &Availability {
        &self.availability
    }

    pub fn availability_mut(&mut self) -> &mut Availability {
        &mut self.availability
    }

    pub fn untie_mut(&mut self) -> &mut ChaCha8Rng {
        &mut self.untie
    }

    pub fn num_users(&self) -> usize {
        self.ground_truth.num_users()
    }

    pub fn num_items(&self) -> usize {
        self.ground_truth.num_items()
    }

    pub fn ignore_unknown(&self) -> bool {
        self.ignore_unknown
    }

    pub fn not_reciprocal(&self) -> bool {
        self.not_reciprocal
    }

    /// Looks up the hidden rating: the value (0.0 when unknown) and whether
    /// the pair exists in the ground truth.
    pub fn reveal(&self, uidx: u32, iidx: u32) -> (f64, bool) {
        match self.ground_truth.get(uidx, iidx) {
            Some(value) => (value, true),
            None => (0.0, false),
        }
    }

    /// Uniform pick among the user's available items.
    pub fn random_available(&mut self, uidx: u32) -> Option<u32> {
        let len = self.availability.len_of(uidx);
        if len == 0 {
            return None;
        }
        let pos = self.untie.gen_range(0..len);
        Some(self.availability.items(uidx)[pos])
    }

    /// Argmax of `score` over the user's available items, breaking ties
    /// uniformly. The generator is only consumed when there is a tie.
    pub fn argmax_available(
        &mut self,
        uidx: u32,
        mut score: impl FnMut(u32) -> f64,
    ) -> Option<u32> {
        let available = self.availability.items(uidx);
        if available.is_empty() {
            return None;
        }

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

        Some(match top.len() {
            // every score was NaN, nothing comparable to a maximum
            0 => available[0],
            1 => top[0],
            len => top[self.untie.gen_range(0..len)],
        })
    }
}

/// An algorithm living inside the simulation loop: proposes the next item
/// for a user and learns from every revealed rating.
///
/// The reveal-then-learn plumbing is shared here; implementations only
/// provide [next](InteractiveRecommender::next) and the
/// [absorb](InteractiveRecommender::absorb) hook. Note that `absorb` runs
/// before the rating is written to the training data, so hooks looking at
/// the training state see the world without the incoming rating.
pub trait InteractiveRecommender<'a>: Send {

    fn core(&self) -> &RecommenderCore<'a>;

    fn core_mut(&mut self) -> &mut RecommenderCore<'a>;

    /// Proposes an item for the user, or `None` when the user has nothing
    /// left.
    fn next(&mut self, uidx: u32) -> Option<u32>;

    /// Model-specific reaction to one revealed rating.
    fn absorb(&mut self, uidx: u32, iidx: u32, value: f64);

    /// Model-specific reaction to a batch of revealed ratings, by default
    /// one [absorb](InteractiveRecommender::absorb) per tuple.
    fn absorb_batch(&mut self, tuples: &[(u32, u32, f64)]) {
        for &(uidx, iidx, value) in tuples {
            self.absorb(uidx, iidx, value);
        }
    }

    /// Reveals the rating for a recommended pair and feeds it to the model
    /// and the training data. The item leaves the user's availability no
    /// matter what was revealed.
    fn update(&mut self, uidx: u32, iidx: u32) {
        let (value, known) = self.core().reveal(uidx, iidx);
        if !self.core().ignore_unknown() || known {
            self.absorb(uidx, iidx, value);
            self.core_mut().train_mut().update(uidx, iidx, value);
        }
        self.core_mut().availability_mut().remove(uidx, iidx);

        if self.core().not_reciprocal() && value > RECIPROCAL_LINK_THRESHOLD {
            if self.core().ground_truth().num_prefs_of_user(iidx) > 0 {
                let (back, known_back) = self.core().reveal(iidx, uidx);
                if !self.core().ignore_unknown() || known_back {
                    self.absorb(iidx, uidx, back);
                    self.core_mut().train_mut().update(iidx, uidx, back);
                }
            }
            self.core_mut().availability_mut().remove(iidx, uidx);
        }
    }

    /// Batch form of [update](InteractiveRecommender::update): training
    /// data and availability are maintained per pair, but the model sees
    /// all revealed tuples in one [absorb_batch] call at the end.
    ///
    /// [absorb_batch]: InteractiveRecommender::absorb_batch
    fn update_batch(&mut self, pairs: &[(u32, u32)]) {
        let mut tuples: Vec<(u32, u32, f64)> = Vec::new();

        for &(uidx, iidx) in pairs {
            let (value, known) = self.core().reveal(uidx, iidx);
            if !self.core().ignore_unknown() || known {
                tuples.push((uidx, iidx, value));
                self.core_mut().train_mut().update(uidx, iidx, value);
            }
            self.core_mut().availability_mut().remove(uidx, iidx);

            if self.core().not_reciprocal() && value > RECIPROCAL_LINK_THRESHOLD {
                if self.core().ground_truth().num_prefs_of_user(iidx) > 0 {
                    let (back, known_back) = self.core().reveal(iidx, uidx);
                    if !self.core().ignore_unknown() || known_back {
                        tuples.push((iidx, uidx, back));
                        self.core_mut().train_mut().update(iidx, uidx, back);
                    }
                }
                self.core_mut().availability_mut().remove(iidx, uidx);
            }
        }

        self.absorb_batch(&tuples);
    }
}

/// Uniform random recommendations, the exploration-only baseline.
pub struct RandomRecommender<'a> {
    core: RecommenderCore<'a>,
}

impl<'a> RandomRecommender<'a> {
    pub fn new(core: RecommenderCore<'a>) -> Self {
        RandomRecommender { core }
    }
}

impl<'a> InteractiveRecommender<'a> for RandomRecommender<'a> {

    fn core(&self) -> &RecommenderCore<'a> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RecommenderCore<'a> {
        &mut self.core
    }

    fn next(&mut self, uidx: u32) -> Option<u32> {
        self.core.random_available(uidx)
    }

    fn absorb(&mut self, _uidx: u32, _iidx: u32, _value: f64) {}
}

/// Recommends the item with the highest mean revealed rating, user
/// independent. The exploitation-only baseline.
pub struct AvgRecommender<'a> {
    core: RecommenderCore<'a>,
    values: Vec<f64>,
    num_times: Vec<f64>,
}

impl<'a> AvgRecommender<'a> {
    pub fn new(core: RecommenderCore<'a>) -> Self {
        let num_items = core.num_items();
        AvgRecommender {
            core,
            values: vec![0.0; num_items],
            num_times: vec![0.0; num_items],
        }
    }
}

impl<'a> InteractiveRecommender<'a> for AvgRecommender<'a> {

    fn core(&self) -> &RecommenderCore<'a> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RecommenderCore<'a> {
        &mut self.core
    }

    fn next(&mut self, uidx: u32) -> Option<u32> {
        let values = &self.values;
        self.core.argmax_available(uidx, |iidx| values[iidx as usize])
    }

    fn absorb(&mut self, _uidx: u32, iidx: u32, value: f64) {
        let old_value = self.values[iidx as usize];
        if self.num_times[iidx as usize] <= 0.0 {
            self.values[iidx as usize] = value;
        } else {
            self.values[iidx as usize] =
                old_value + (value - old_value) / (self.num_times[iidx as usize] + 1.0);
        }
        self.num_times[iidx as usize] += 1.0;
    }
}

/// Recommends the item found relevant by the most users so far.
pub struct PopularityRecommender<'a> {
    core: RecommenderCore<'a>,
    values: Vec<f64>,
    threshold: f64,
}

impl<'a> PopularityRecommender<'a> {
    pub fn new(core: RecommenderCore<'a>, threshold: f64) -> Self {
        let num_items = core.num_items();
        PopularityRecommender {
            core,
            values: vec![0.0; num_items],
            threshold,
        }
    }
}

impl<'a> InteractiveRecommender<'a> for PopularityRecommender<'a> {

    fn core(&self) -> &RecommenderCore<'a> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RecommenderCore<'a> {
        &mut self.core
    }

    fn next(&mut self, uidx: u32) -> Option<u32> {
        let values = &self.values;
        self.core.argmax_available(uidx, |iidx| values[iidx as usize])
    }

    fn absorb(&mut self, _uidx: u32, iidx: u32, value: f64) {
        if value >= self.threshold {
            self.values[iidx as usize] += 1.0;
        }
    }
}

/// Bridges an [ItemBandit] into the loop: the bandit picks among the
/// user's available items and receives the revealed rating as reward.
pub struct ItemBanditRecommender<'a> {
    core: RecommenderCore<'a>,
    bandit: Box<dyn ItemBandit>,
    value_fn: ValueFunction,
}

impl<'a> ItemBanditRecommender<'a> {
    pub fn new(core: RecommenderCore<'a>, bandit: Box<dyn ItemBandit>, value_fn: ValueFunction) -> Self {
        ItemBanditRecommender { core, bandit, value_fn }
    }
}

impl<'a> InteractiveRecommender<'a> for ItemBanditRecommender<'a> {

    fn core(&self) -> &RecommenderCore<'a> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RecommenderCore<'a> {
        &mut self.core
    }

    fn next(&mut self, uidx: u32) -> Option<u32> {
        let available = self.core.availability().items(uidx);
        self.bandit.next(uidx, available, self.value_fn)
    }

    fn absorb(&mut self, _uidx: u32, iidx: u32, value: f64) {
        self.bandit.update(iidx, value);
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    use crate::bandits::{identity_value, UpdateFunction};

    fn ground_truth() -> Preferences {
        Preferences::load(
            2,
            3,
            &[(0, 0, 1.0), (0, 2, 1.0), (1, 1, 1.0)],
        )
    }

    #[test]
    fn update_reveals_trains_and_consumes_availability() {
        let gt = ground_truth();
        let core = RecommenderCore::new(&gt, false, 42);
        let mut rec = AvgRecommender::new(core);

        rec.update(0, 0);

        assert_eq!(rec.core().train().get(0, 0), Some(1.0));
        assert!(!rec.core().availability().contains(0, 0));
        assert_eq!(rec.values[0], 1.0);

        // unknown pair revealed as 0.0, still trained and consumed
        rec.update(0, 1);
        assert_eq!(rec.core().train().get(0, 1), Some(0.0));
        assert!(!rec.core().availability().contains(0, 1));
    }

    #[test]
    fn ignoring_unknown_pairs_skips_training_but_not_availability() {
        let gt = ground_truth();
        let core = RecommenderCore::new(&gt, true, 42);
        let mut rec = AvgRecommender::new(core);

        rec.update(0, 1);

        assert_eq!(rec.core().train().get(0, 1), None);
        assert_eq!(rec.values[1], 0.0);
        assert!(!rec.core().availability().contains(0, 1));
    }

    #[test]
    fn strong_contact_links_reveal_the_reverse_direction() {
        // 0 and 1 follow each other (reciprocated, weight 2), 2 follows 0
        let gt = Preferences::load(
            3,
            3,
            &[(0, 1, 2.0), (1, 0, 2.0), (2, 0, 1.0)],
        );
        let core = RecommenderCore::for_contacts(&gt, false, true, 42);
        let mut rec = AvgRecommender::new(core);

        rec.update(0, 1);

        assert_eq!(rec.core().train().get(0, 1), Some(2.0));
        assert_eq!(rec.core().train().get(1, 0), Some(2.0));
        assert!(!rec.core().availability().contains(0, 1));
        assert!(!rec.core().availability().contains(1, 0));

        // a one-way link reveals nothing about the reverse
        rec.update(2, 0);
        assert_eq!(rec.core().train().get(2, 0), Some(1.0));
        assert_eq!(rec.core().train().get(0, 2), None);
        assert!(rec.core().availability().contains(0, 2));
    }

    #[test]
    fn batch_updates_match_a_sequence_of_single_updates() {
        let gt = ground_truth();
        let pairs = [(0, 0), (1, 1), (0, 1)];

        let mut batched = AvgRecommender::new(RecommenderCore::new(&gt, false, 42));
        batched.update_batch(&pairs);

        let mut sequential = AvgRecommender::new(RecommenderCore::new(&gt, false, 42));
        for &(uidx, iidx) in &pairs {
            sequential.update(uidx, iidx);
        }

        assert_eq!(batched.values, sequential.values);
        assert_eq!(
            batched.core().train().num_preferences(),
            sequential.core().train().num_preferences()
        );
        for &(uidx, iidx) in &pairs {
            assert_eq!(
                batched.core().availability().contains(uidx, iidx),
                sequential.core().availability().contains(uidx, iidx)
            );
        }
    }

    #[test]
    fn random_recommender_exhausts_availability() {
        let gt = ground_truth();
        let core = RecommenderCore::new(&gt, false, 42);
        let mut rec = RandomRecommender::new(core);

        let mut seen = Vec::new();
        for _ in 0..3 {
            let iidx = rec.next(0).unwrap();
            assert!(!seen.contains(&iidx));
            seen.push(iidx);
            rec.update(0, iidx);
        }

        assert_eq!(rec.next(0), None);
    }

    #[test]
    fn average_recommender_follows_the_best_mean() {
        let gt = Preferences::load(
            2,
            2,
            &[(0, 0, 5.0), (0, 1, 1.0), (1, 0, 3.0), (1, 1, 1.0)],
        );
        let core = RecommenderCore::new(&gt, false, 42);
        let mut rec = AvgRecommender::new(core);

        rec.update(0, 0);
        rec.update(0, 1);

        // user 1 has not consumed anything yet, item 0 has the better mean
        assert_eq!(rec.next(1), Some(0));
    }

    #[test]
    fn popularity_counts_users_at_or_above_the_threshold() {
        let gt = Preferences::load(
            3,
            2,
            &[(0, 1, 1.0), (1, 1, 1.0), (2, 0, 1.0), (0, 0, 0.0)],
        );
        let core = RecommenderCore::new(&gt, false, 42);
        let mut rec = PopularityRecommender::new(core, 0.5);

        rec.update(0, 1);
        rec.update(1, 1);
        rec.update(0, 0);

        assert_eq!(rec.values[1], 2.0);
        assert_eq!(rec.values[0], 0.0);
        assert_eq!(rec.next(2), Some(1));
    }

    #[test]
    fn bandit_recommender_wires_rewards_through() {
        let gt = Preferences::load(1, 3, &[(0, 1, 1.0), (0, 0, 1.0), (0, 2, 1.0)]);
        let core = RecommenderCore::new(&gt, false, 42);
        let bandit = Box::new(crate::bandits::EpsilonGreedy::new(
            3,
            0.0,
            UpdateFunction::Stationary,
            crate::types::Seeds::derive(42),
        ));
        let mut rec = ItemBanditRecommender::new(core, bandit, identity_value);

        let first = rec.next(0).unwrap();
        rec.update(0, first);

        // the consumed item is gone from the availability the bandit sees
        let second = rec.next(0).unwrap();
        assert_ne!(first, second);
    }
}
