//! Insertion-ordered pending-order books.
//!
//! Matching walks orders in the order the strategy issued them, entries
//! before exits. Replacing an existing key keeps its slot; removal shifts
//! later entries up. The matching loop detaches an order before filling it
//! (the ledger cannot be mutated while the book aliases the order) and
//! restores it to its slot when it should persist.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::order::Order;

/// A pending-order book keyed by id, preserving insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PendingOrders {
    orders: IndexMap<String, Order>,
}

impl PendingOrders {
    /// Insert or replace; an existing key keeps its position.
    pub fn insert(&mut self, id: impl Into<String>, order: Order) {
        self.orders.insert(id.into(), order);
    }

    /// Remove by id, shifting later entries up.
    pub fn remove(&mut self, id: &str) -> Option<Order> {
        self.orders.shift_remove(id)
    }

    /// Detach an order for processing, remembering its slot.
    pub fn take(&mut self, id: &str) -> Option<(usize, Order)> {
        let index = self.orders.get_index_of(id)?;
        let order = self.orders.shift_remove(id)?;
        Some((index, order))
    }

    /// Put a detached order back at (or near) its original slot.
    pub fn restore(&mut self, index: usize, id: String, order: Order) {
        let index = index.min(self.orders.len());
        self.orders.shift_insert(index, id, order);
    }

    pub fn get(&self, id: &str) -> Option<&Order> {
        self.orders.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.orders.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn clear(&mut self) {
        self.orders.clear();
    }

    /// Snapshot of the ids in book order.
    pub fn ids(&self) -> Vec<String> {
        self.orders.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Order)> {
        self.orders.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::OrderKind;

    fn mk_order(size: f64) -> Order {
        Order::new(Some("id".into()), size, OrderKind::Entry)
    }

    #[test]
    fn replace_keeps_slot() {
        let mut book = PendingOrders::default();
        book.insert("a", mk_order(1.0));
        book.insert("b", mk_order(2.0));
        book.insert("a", mk_order(3.0));
        assert_eq!(book.ids(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(book.get("a").unwrap().size, 3.0);
    }

    #[test]
    fn take_and_restore_round_trip() {
        let mut book = PendingOrders::default();
        book.insert("a", mk_order(1.0));
        book.insert("b", mk_order(2.0));
        book.insert("c", mk_order(3.0));

        let (index, order) = book.take("b").unwrap();
        assert_eq!(index, 1);
        assert_eq!(book.len(), 2);

        book.restore(index, "b".into(), order);
        assert_eq!(book.ids(), vec!["a".to_string(), "b".to_string(), "c".to_string()]);
    }

    #[test]
    fn restore_clamps_to_len() {
        let mut book = PendingOrders::default();
        book.insert("a", mk_order(1.0));
        let (index, order) = book.take("a").unwrap();
        book.clear();
        book.restore(index, "a".into(), order);
        assert_eq!(book.len(), 1);
    }
}
