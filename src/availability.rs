use crate::preferences::Preferences;

/// Per-user lists of the items that may still be recommended. A user starts
/// with every item (minus themselves in contact networks) and loses one per
/// recommendation, so no item is ever shown to the same user twice.
///
/// Removal preserves the order of the remaining items. Uniform random picks
/// index into these lists, reordering them would change which item a given
/// draw selects.
pub struct Availability {
    items: Vec<Vec<u32>>,
}

impl Availability {

    /// Builds the lists over the ground truth: users with at least one
    /// preference get the full item range, users without any stay empty and
    /// never receive a recommendation.
    pub fn from_ground_truth(ground_truth: &Preferences, exclude_self: bool) -> Self {

        let num_items = ground_truth.num_items() as u32;

        let items = (0..ground_truth.num_users() as u32)
            .map(|user| {
                if ground_truth.num_prefs_of_user(user) == 0 {
                    Vec::new()
                } else {
                    (0..num_items).filter(|&item| !exclude_self || item != user).collect()
                }
            })
            .collect();

        Availability { items }
    }

    pub fn items(&self, user: u32) -> &[u32] {
        self.items.get(user as usize).map(|row| row.as_slice()).unwrap_or(&[])
    }

    pub fn len_of(&self, user: u32) -> usize {
        self.items(user).len()
    }

    pub fn is_empty(&self, user: u32) -> bool {
        self.items(user).is_empty()
    }

    pub fn contains(&self, user: u32, item: u32) -> bool {
        self.items(user).contains(&item)
    }

    /// Removes one item from a user's list. Tolerates absent items and
    /// out-of-range users, repeated removals of the same pair are no-ops.
    pub fn remove(&mut self, user: u32, item: u32) -> bool {
        match self.items.get_mut(user as usize) {
            Some(row) => match row.iter().position(|&candidate| candidate == item) {
                Some(pos) => {
                    row.remove(pos);
                    true
                }
                None => false,
            },
            None => false,
        }
    }
}
