use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use fnv::FnvHashMap;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::recommenders::{InteractiveRecommender, RecommenderCore};
use crate::similarity::UpdateableSimilarity;

/// Candidate neighbor. Equal similarities are ordered by position in the
/// freshly shuffled user list, so ties among neighbors break randomly.
struct Neighbor {
    vidx: u32,
    sim: f64,
    pos: usize,
}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.sim.partial_cmp(&other.sim) {
            Some(Ordering::Equal) | None => self.pos.cmp(&other.pos),
            Some(ordering) => ordering,
        }
    }
}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Neighbor {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Neighbor {}

/// User-based k-nearest-neighbor recommendations on top of an updateable
/// similarity. Scores every item rated by the user's top-k most similar
/// users with the similarity-weighted sum of their ratings, and falls
/// back to a random pick while no neighbors exist yet.
pub struct UserKnnRecommender<'a> {
    core: RecommenderCore<'a>,
    sim: Box<dyn UpdateableSimilarity>,
    k: usize,
    ignore_zeros: bool,
    user_list: Vec<u32>,
    neighbor_untie: ChaCha8Rng,
}

impl<'a> UserKnnRecommender<'a> {

    /// A non-positive `k` means all users are eligible as neighbors.
    pub fn new(
        core: RecommenderCore<'a>,
        sim: Box<dyn UpdateableSimilarity>,
        k: usize,
        ignore_zeros: bool,
        neighbor_seed: u64,
    ) -> Self {
        let num_users = core.num_users();
        UserKnnRecommender {
            core,
            sim,
            k: if k > 0 { k } else { num_users },
            ignore_zeros,
            user_list: (0..num_users as u32).collect(),
            neighbor_untie: ChaCha8Rng::seed_from_u64(neighbor_seed),
        }
    }
}

impl<'a> InteractiveRecommender<'a> for UserKnnRecommender<'a> {

    fn core(&self) -> &RecommenderCore<'a> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RecommenderCore<'a> {
        &mut self.core
    }

    fn next(&mut self, uidx: u32) -> Option<u32> {
        if self.core.availability().is_empty(uidx) {
            return None;
        }

        self.user_list.shuffle(&mut self.neighbor_untie);
        let mut position = vec![0; self.user_list.len()];
        for (pos, &vidx) in self.user_list.iter().enumerate() {
            position[vidx as usize] = pos;
        }

        // Top-k neighbors through a min-heap over (similarity, position).
        let mut heap: BinaryHeap<Reverse<Neighbor>> = BinaryHeap::with_capacity(self.k);
        for (vidx, s) in self.sim.similar_elems(uidx) {
            let candidate = Neighbor { vidx, sim: s, pos: position[vidx as usize] };
            if heap.len() < self.k {
                heap.push(Reverse(candidate));
            } else if heap.peek().map_or(false, |Reverse(weakest)| weakest.sim <= s) {
                heap.pop();
                heap.push(Reverse(candidate));
            }
        }

        if heap.is_empty() {
            return self.core.random_available(uidx);
        }

        let mut item_scores: FnvHashMap<u32, f64> = FnvHashMap::default();
        while let Some(Reverse(neighbor)) = heap.pop() {
            for pref in self.core.train().user_prefs(neighbor.vidx) {
                let score = neighbor.sim * pref.value;
                if !self.ignore_zeros || score > 0.0 {
                    *item_scores.entry(pref.idx).or_insert(0.0) += score;
                }
            }
        }

        // Argmax over the available items that received a score at all.
        let mut max = f64::NEG_INFINITY;
        let mut top: Vec<u32> = Vec::new();
        for (&iidx, &score) in &item_scores {
            if !self.core.availability().contains(uidx, iidx) {
                continue;
            }
            if top.is_empty() || score > max {
                max = score;
                top.clear();
                top.push(iidx);
            } else if score == max {
                top.push(iidx);
            }
        }

        match top.len() {
            0 => self.core.random_available(uidx),
            1 => Some(top[0]),
            len => {
                let pos = self.core.untie_mut().gen_range(0..len);
                Some(top[pos])
            }
        }
    }

    /// Runs before the rating reaches the training data, so the item's
    /// raters here are exactly the co-raters of `uidx`.
    fn absorb(&mut self, uidx: u32, iidx: u32, value: f64) {
        for pref in self.core.train().item_prefs(iidx) {
            self.sim.update(uidx, pref.idx, iidx, value, pref.value);
        }
    }

    fn absorb_batch(&mut self, _tuples: &[(u32, u32, f64)]) {
        self.sim.update_bulk(self.core.train());
    }
}
