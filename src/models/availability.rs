use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Open slots of one restaurant on one date: the catalog minus every slot
/// held by an active booking, sorted lexicographically by label.
///
/// Labels are compared as plain strings, so "10:00 PM" sorts before
/// "7:00 PM".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Availability {
    pub restaurant_id: i64,
    pub date: NaiveDate,
    pub slots: Vec<String>,
}

impl Availability {
    pub fn derive(restaurant_id: i64, date: NaiveDate, catalog: &[String], booked: &[String]) -> Self {
        let booked: HashSet<&str> = booked.iter().map(String::as_str).collect();

        let mut slots: Vec<String> = catalog
            .iter()
            .filter(|slot| !booked.contains(slot.as_str()))
            .cloned()
            .collect();
        slots.sort();
        slots.dedup();

        Self {
            restaurant_id,
            date,
            slots,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Looks up a slot by its 1-based position in the presented list.
    pub fn by_choice(&self, choice: usize) -> Option<&str> {
        choice
            .checked_sub(1)
            .and_then(|i| self.slots.get(i))
            .map(String::as_str)
    }
}
