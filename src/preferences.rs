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

use crate::types::Entry;

/// Rating matrix with fast access to both views: per-user rows and per-item
/// columns. Both views hold the same preferences, each sorted by the index
/// of the partner dimension, so lookups are binary searches and inserts
/// shift a suffix of a small vector.
///
/// All operations on indexes outside the configured dimensions are no-ops,
/// a rating can be revealed for a (user, item) pair that a malformed log
/// line names but the dataset never defined.
pub struct Preferences {
    rows: Vec<Vec<Entry>>,
    cols: Vec<Vec<Entry>>,
    num_preferences: u64,
}

impl Preferences {

    pub fn new(num_users: usize, num_items: usize) -> Self {
        Preferences {
            rows: vec![Vec::new(); num_users],
            cols: vec![Vec::new(); num_items],
            num_preferences: 0,
        }
    }

    /// Bulk load: bucket the tuples into both views, then sort each row and
    /// column once. Assumes at most one tuple per (user, item) pair.
    pub fn load(num_users: usize, num_items: usize, tuples: &[(u32, u32, f64)]) -> Self {

        let mut rows: Vec<Vec<Entry>> = vec![Vec::new(); num_users];
        let mut cols: Vec<Vec<Entry>> = vec![Vec::new(); num_items];
        let mut num_preferences: u64 = 0;

        for &(user, item, value) in tuples {
            if (user as usize) < num_users && (item as usize) < num_items {
                rows[user as usize].push(Entry::new(item, value));
                cols[item as usize].push(Entry::new(user, value));
                num_preferences += 1;
            }
        }

        for row in rows.iter_mut() {
            row.sort_unstable_by_key(|entry| entry.idx);
        }
        for col in cols.iter_mut() {
            col.sort_unstable_by_key(|entry| entry.idx);
        }

        Preferences { rows, cols, num_preferences }
    }

    pub fn num_users(&self) -> usize {
        self.rows.len()
    }

    pub fn num_items(&self) -> usize {
        self.cols.len()
    }

    pub fn num_preferences(&self) -> u64 {
        self.num_preferences
    }

    /// Preferences of a user, sorted by item index. Empty for out-of-range
    /// users.
    pub fn user_prefs(&self, user: u32) -> &[Entry] {
        self.rows.get(user as usize).map(|row| row.as_slice()).unwrap_or(&[])
    }

    /// Preferences on an item, sorted by user index. Empty for out-of-range
    /// items.
    pub fn item_prefs(&self, item: u32) -> &[Entry] {
        self.cols.get(item as usize).map(|col| col.as_slice()).unwrap_or(&[])
    }

    pub fn num_prefs_of_user(&self, user: u32) -> usize {
        self.user_prefs(user).len()
    }

    pub fn num_prefs_of_item(&self, item: u32) -> usize {
        self.item_prefs(item).len()
    }

    pub fn get(&self, user: u32, item: u32) -> Option<f64> {
        let row = self.user_prefs(user);
        row.binary_search_by_key(&item, |entry| entry.idx)
            .ok()
            .map(|pos| row[pos].value)
    }

    /// Inserts or overwrites a rating. Returns true if the pair was new.
    pub fn update(&mut self, user: u32, item: u32, value: f64) -> bool {

        if user as usize >= self.rows.len() || item as usize >= self.cols.len() {
            return false;
        }

        let row = &mut self.rows[user as usize];
        let new_pair = match row.binary_search_by_key(&item, |entry| entry.idx) {
            Ok(pos) => {
                row[pos].value = value;
                false
            }
            Err(pos) => {
                row.insert(pos, Entry::new(item, value));
                true
            }
        };

        let col = &mut self.cols[item as usize];
        match col.binary_search_by_key(&user, |entry| entry.idx) {
            Ok(pos) => col[pos].value = value,
            Err(pos) => col.insert(pos, Entry::new(user, value)),
        }

        if new_pair {
            self.num_preferences += 1;
        }

        new_pair
    }

    /// Removes a rating if present. Returns true if the pair existed.
    pub fn delete(&mut self, user: u32, item: u32) -> bool {

        if user as usize >= self.rows.len() || item as usize >= self.cols.len() {
            return false;
        }

        let row = &mut self.rows[user as usize];
        match row.binary_search_by_key(&item, |entry| entry.idx) {
            Ok(pos) => {
                row.remove(pos);
            }
            Err(_) => return false,
        }

        let col = &mut self.cols[item as usize];
        if let Ok(pos) = col.binary_search_by_key(&user, |entry| entry.idx) {
            col.remove(pos);
        }

        self.num_preferences -= 1;
        true
    }

    /// Grows the user dimension by one and returns the new index.
    pub fn add_user(&mut self) -> u32 {
        self.rows.push(Vec::new());
        (self.rows.len() - 1) as u32
    }

    /// Grows the item dimension by one and returns the new index.
    pub fn add_item(&mut self) -> u32 {
        self.cols.push(Vec::new());
        (self.cols.len() - 1) as u32
    }
}
