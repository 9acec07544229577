use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::order::OrderItem;
use super::product::Sku;

/// One cart line. The unit price is frozen at the time the product was
/// first added so later catalog edits do not reprice a pending cart.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub quantity: u32,
    pub unit_price: Decimal,
}

impl CartLine {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// The per-chat shopping cart. There is no stored total; it is always
/// recomputed from the lines.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    lines: BTreeMap<Sku, CartLine>,
}

impl Cart {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn get(&self, sku: &Sku) -> Option<&CartLine> {
        self.lines.get(sku)
    }

    /// Iterates lines in stable SKU order, which is also the presentation
    /// order of the cart view.
    pub fn lines(&self) -> impl Iterator<Item = (&Sku, &CartLine)> {
        self.lines.iter()
    }

    /// Adds `quantity` units, merging with an existing line. The unit
    /// price of an existing line is kept; `unit_price` only applies to a
    /// fresh line.
    pub fn add(&mut self, sku: Sku, quantity: u32, unit_price: Decimal) {
        if quantity == 0 {
            return;
        }
        self.lines
            .entry(sku)
            .and_modify(|line| line.quantity = line.quantity.saturating_add(quantity))
            .or_insert(CartLine { quantity, unit_price });
    }

    /// Sets a line to exactly `quantity`; zero removes the line. Setting a
    /// quantity on an absent SKU is a no-op because there is no price to
    /// freeze.
    pub fn set_quantity(&mut self, sku: &Sku, quantity: u32) -> bool {
        if quantity == 0 {
            return self.remove(sku);
        }
        match self.lines.get_mut(sku) {
            Some(line) => {
                line.quantity = quantity;
                true
            }
            None => false,
        }
    }

    /// Removes a line. Returns false when the SKU was absent.
    pub fn remove(&mut self, sku: &Sku) -> bool {
        self.lines.remove(sku).is_some()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn total(&self) -> Decimal {
        self.lines.values().map(CartLine::line_total).sum()
    }

    /// Snapshot used by the checkout commit; prices are the frozen
    /// at-add prices.
    pub fn to_order_items(&self) -> Vec<OrderItem> {
        self.lines
            .iter()
            .map(|(sku, line)| OrderItem {
                product_sku: sku.clone(),
                quantity: line.quantity,
                unit_price: line.unit_price,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rust_decimal::Decimal;

    use super::Cart;
    use crate::domain::product::Sku;

    fn price(cents: i64) -> Decimal {
        Decimal::new(cents, 2)
    }

    #[test]
    fn add_merges_quantities_and_keeps_first_price() {
        let mut cart = Cart::default();
        cart.add(Sku::new("SKU00010"), 2, price(4500));
        cart.add(Sku::new("SKU00010"), 3, price(9900));

        let line = cart.get(&Sku::new("SKU00010")).expect("line present");
        assert_eq!(line.quantity, 5);
        assert_eq!(line.unit_price, price(4500));
    }

    #[test]
    fn set_quantity_zero_removes_line() {
        let mut cart = Cart::default();
        cart.add(Sku::new("SKU00010"), 2, price(4500));

        assert!(cart.set_quantity(&Sku::new("SKU00010"), 0));
        assert!(cart.is_empty());
    }

    #[test]
    fn set_quantity_on_absent_sku_is_noop() {
        let mut cart = Cart::default();
        assert!(!cart.set_quantity(&Sku::new("SKU00099"), 3));
        assert!(cart.is_empty());
    }

    #[test]
    fn remove_is_noop_when_absent() {
        let mut cart = Cart::default();
        assert!(!cart.remove(&Sku::new("SKU00099")));
    }

    /// Any sequence of add/update/remove applied to the cart must match
    /// the same sequence applied to a plain reference map, and the total
    /// must always equal the sum of quantity times unit price.
    #[test]
    fn cart_matches_reference_map_for_operation_sequences() {
        #[derive(Clone)]
        enum Op {
            Add(&'static str, u32, i64),
            Set(&'static str, u32),
            Remove(&'static str),
        }

        let sequences: Vec<Vec<Op>> = vec![
            vec![
                Op::Add("SKU00010", 2, 4500),
                Op::Add("SKU00011", 1, 1200),
                Op::Add("SKU00010", 1, 4500),
                Op::Set("SKU00011", 4),
                Op::Remove("SKU00012"),
            ],
            vec![
                Op::Add("SKU00001", 1, 999),
                Op::Set("SKU00001", 0),
                Op::Add("SKU00001", 3, 1999),
            ],
            vec![
                Op::Add("SKU00020", 5, 250),
                Op::Remove("SKU00020"),
                Op::Remove("SKU00020"),
                Op::Set("SKU00020", 7),
            ],
        ];

        for ops in sequences {
            let mut cart = Cart::default();
            let mut reference: HashMap<String, (u32, Decimal)> = HashMap::new();

            for op in ops {
                match op {
                    Op::Add(sku, qty, cents) => {
                        cart.add(Sku::new(sku), qty, price(cents));
                        let entry = reference.entry(sku.to_string()).or_insert((0, price(cents)));
                        entry.0 += qty;
                    }
                    Op::Set(sku, qty) => {
                        cart.set_quantity(&Sku::new(sku), qty);
                        if qty == 0 {
                            reference.remove(sku);
                        } else if let Some(entry) = reference.get_mut(sku) {
                            entry.0 = qty;
                        }
                    }
                    Op::Remove(sku) => {
                        cart.remove(&Sku::new(sku));
                        reference.remove(sku);
                    }
                }

                let expected_total: Decimal = reference
                    .values()
                    .map(|(qty, unit)| *unit * Decimal::from(*qty))
                    .sum();
                assert_eq!(cart.total(), expected_total);
                assert_eq!(cart.len(), reference.len());
                for (sku, (qty, unit)) in &reference {
                    let line = cart.get(&Sku::new(sku)).expect("line tracked by reference");
                    assert_eq!(line.quantity, *qty);
                    assert_eq!(line.unit_price, *unit);
                }
            }
        }
    }

    #[test]
    fn order_items_carry_frozen_prices() {
        let mut cart = Cart::default();
        cart.add(Sku::new("SKU00010"), 2, price(4500));
        cart.add(Sku::new("SKU00042"), 1, price(1250));

        let items = cart.to_order_items();
        assert_eq!(items.len(), 2);
        let total: Decimal = items.iter().map(|item| item.line_total()).sum();
        assert_eq!(total, cart.total());
    }
}
