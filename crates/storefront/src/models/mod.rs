//! Domain models for the storefront.
//!
//! These are the shapes handlers and services work with. Database row types
//! stay private to `crate::db` and are converted into these on read.

pub mod cart;
pub mod order;
pub mod product;
pub mod session;
pub mod user;

pub use cart::{Cart, CartLine};
pub use order::{
    LineRequest, ORDERS_PAGE_SIZE, Order, OrderItem, OrderQuote, OrderStats, OrderSummary,
    OrderTracking, PricedLine, ShippingInfo, StatusChange,
};
pub use product::{
    Image, Page, Product, ProductDetail, ProductFilter, ProductInput, ProductInputError,
    ProductSort, ProductSummary, Size, Variant, effective_price, is_valid_slug,
};
pub use session::CurrentUser;
pub use user::User;
