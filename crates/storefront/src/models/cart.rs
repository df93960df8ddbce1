//! Server-side cart.

use serde::Serialize;

use kafsh_core::{CartItemId, Price, ProductId, SizeId};

/// One cart line with current catalog data.
#[derive(Debug, Clone, Serialize)]
pub struct CartLine {
    pub id: CartItemId,
    pub size_id: SizeId,
    pub quantity: u32,
    pub product_id: ProductId,
    pub slug: String,
    pub product_name: String,
    pub brand: String,
    pub color_name: String,
    pub size_label: String,
    /// Current effective price; never taken from the client.
    pub unit_price: Price,
    pub stock: i32,
    /// Product, variant active and the size in stock.
    pub available: bool,
    pub image_url: Option<String>,
}

impl CartLine {
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.unit_price
            .checked_mul(self.quantity)
            .unwrap_or(self.unit_price)
    }
}

/// The caller's cart.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Cart {
    pub lines: Vec<CartLine>,
}

impl Cart {
    /// Sum of available lines.
    #[must_use]
    pub fn subtotal(&self) -> Price {
        self.lines
            .iter()
            .filter(|line| line.available)
            .map(CartLine::line_total)
            .sum()
    }

    /// Number of pairs in the cart.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.lines.iter().map(|line| line.quantity).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
