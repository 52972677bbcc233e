//! One terminal's in-progress order.
//!
//! Totals are derived from the line items on every read and never stored,
//! so they cannot drift from the items.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PosError, PosResult};
use crate::models::{MenuItem, OrderItem};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
pub enum ItemId {
    Menu(i64),
    /// Ad hoc item priced at the till. Each one gets a fresh id so two custom
    /// entries never merge.
    Custom(Uuid),
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemId::Menu(id) => write!(f, "{id}"),
            ItemId::Custom(id) => write!(f, "custom-{id}"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CartItem {
    pub id: ItemId,
    pub name: String,
    pub price: f64,
    pub category: String,
    pub quantity: u32,
    pub is_custom: bool,
}

impl CartItem {
    pub fn subtotal(&self) -> f64 {
        self.price * self.quantity as f64
    }

    /// Copy into an order line, detached from the cart.
    pub fn to_order_item(&self) -> OrderItem {
        OrderItem {
            menu_item_id: match self.id {
                ItemId::Menu(id) => Some(id),
                ItemId::Custom(_) => None,
            },
            name: self.name.clone(),
            category: self.category.clone(),
            price: self.price,
            quantity: self.quantity,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct Cart {
    items: Vec<CartItem>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.items.iter().map(CartItem::subtotal).sum()
    }

    /// Units across all lines. Widened so lines at `u32::MAX` still add up.
    pub fn item_count(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.quantity)).sum()
    }

    pub fn quantity_of(&self, id: &ItemId) -> u32 {
        self.position(id).map_or(0, |i| self.items[i].quantity)
    }

    fn position(&self, id: &ItemId) -> Option<usize> {
        self.items.iter().position(|item| &item.id == id)
    }

    /// Add one unit of a menu item, merging with an existing line.
    /// Name and price are captured now; later menu edits do not touch the cart.
    pub fn add_item(&mut self, item: &MenuItem) {
        let id = ItemId::Menu(item.id);
        match self.position(&id) {
            Some(i) => self.items[i].quantity = self.items[i].quantity.saturating_add(1),
            None => self.items.push(CartItem {
                id,
                name: item.name.clone(),
                price: item.price,
                category: item.category.clone(),
                quantity: 1,
                is_custom: false,
            }),
        }
    }

    pub fn add_custom_item(&mut self, name: &str, price: f64, category: &str) -> PosResult<ItemId> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PosError::Validation("Custom item needs a name".into()));
        }
        if !price.is_finite() || price <= 0.0 {
            return Err(PosError::Validation(
                "Custom item needs a price above zero".into(),
            ));
        }

        let id = ItemId::Custom(Uuid::new_v4());
        let category = match category.trim() {
            "" => "Other",
            category => category,
        };
        self.items.push(CartItem {
            id: id.clone(),
            name: name.to_string(),
            price,
            category: category.to_string(),
            quantity: 1,
            is_custom: true,
        });
        Ok(id)
    }

    /// Set the quantity exactly. Zero or below removes the line.
    pub fn update_quantity(&mut self, id: &ItemId, quantity: i64) {
        if quantity <= 0 {
            self.remove_item(id);
            return;
        }
        let quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
        if let Some(i) = self.position(id) {
            self.items[i].quantity = quantity;
        }
    }

    pub fn remove_item(&mut self, id: &ItemId) {
        self.items.retain(|item| &item.id != id);
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Deep copy of the lines for an order.
    pub fn snapshot(&self) -> Vec<OrderItem> {
        self.items.iter().map(CartItem::to_order_item).collect()
    }
}
