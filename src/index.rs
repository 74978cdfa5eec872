use fnv::FnvHashMap;

/// Maps external user and item names to contiguous indexes, in order of
/// first appearance in the input.
pub struct Dictionary {
    user_dict: FnvHashMap<String, u32>,
    item_dict: FnvHashMap<String, u32>,
}

impl Dictionary {
    pub fn new() -> Self {
        Dictionary {
            user_dict: FnvHashMap::with_capacity_and_hasher(100, Default::default()),
            item_dict: FnvHashMap::with_capacity_and_hasher(100, Default::default()),
        }
    }

    pub fn num_users(&self) -> usize {
        self.user_dict.len()
    }

    pub fn num_items(&self) -> usize {
        self.item_dict.len()
    }

    /// Returns the index of the user, assigning the next free one on first
    /// sight.
    pub fn intern_user(&mut self, name: &str) -> u32 {
        let next_index = self.user_dict.len() as u32;
        match self.user_dict.get(name) {
            Some(&index) => index,
            None => {
                self.user_dict.insert(name.to_owned(), next_index);
                next_index
            }
        }
    }

    pub fn intern_item(&mut self, name: &str) -> u32 {
        let next_index = self.item_dict.len() as u32;
        match self.item_dict.get(name) {
            Some(&index) => index,
            None => {
                self.item_dict.insert(name.to_owned(), next_index);
                next_index
            }
        }
    }

    pub fn user_index(&self, name: &str) -> Option<u32> {
        self.user_dict.get(name).copied()
    }

    pub fn item_index(&self, name: &str) -> Option<u32> {
        self.item_dict.get(name).copied()
    }
}

impl Default for Dictionary {
    fn default() -> Self {
        Dictionary::new()
    }
}

/// Reverse mapping from indexes back to the original names, for writing
/// human readable outputs.
pub struct Renaming {
    user_names: FnvHashMap<u32, String>,
    item_names: FnvHashMap<u32, String>,
}

impl Renaming {

    pub fn user_name(&self, user_index: u32) -> &str {
        &self.user_names[&user_index]
    }

    pub fn item_name(&self, item_index: u32) -> &str {
        &self.item_names[&item_index]
    }
}

impl From<&Dictionary> for Renaming {

    fn from(dict: &Dictionary) -> Self {

        let mut user_names: FnvHashMap<u32, String> =
            FnvHashMap::with_capacity_and_hasher(dict.num_users(), Default::default());

        let mut item_names: FnvHashMap<u32, String> =
            FnvHashMap::with_capacity_and_hasher(dict.num_items(), Default::default());

        for (user, user_id) in dict.user_dict.iter() {
            user_names.insert(*user_id, user.clone());
        }

        for (item, item_id) in dict.item_dict.iter() {
            item_names.insert(*item_id, item.clone());
        }

        Renaming { user_names, item_names }
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn indexes_follow_first_appearance() {
        let mut dict = Dictionary::new();

        assert_eq!(dict.intern_user("alice"), 0);
        assert_eq!(dict.intern_user("bob"), 1);
        assert_eq!(dict.intern_user("alice"), 0);
        assert_eq!(dict.intern_item("i1"), 0);
        assert_eq!(dict.intern_item("i2"), 1);

        assert_eq!(dict.num_users(), 2);
        assert_eq!(dict.num_items(), 2);
        assert_eq!(dict.user_index("bob"), Some(1));
        assert_eq!(dict.user_index("carol"), None);
    }

    #[test]
    fn renaming_inverts_the_dictionary() {
        let mut dict = Dictionary::new();
        dict.intern_user("alice");
        dict.intern_user("bob");
        dict.intern_item("i1");

        let renaming = Renaming::from(&dict);

        assert_eq!(renaming.user_name(0), "alice");
        assert_eq!(renaming.user_name(1), "bob");
        assert_eq!(renaming.item_name(0), "i1");
    }
}
