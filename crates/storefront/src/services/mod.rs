//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `auth` - Telegram sign-in (initData verification, user upsert, session issue)
//! - `catalog` - Cached product listing and detail reads
//! - `checkout` - Order validation, pricing and placement
//! - `notifications` - Best-effort Telegram order messages
//! - `session` - Signed session tokens and the session cookie

pub mod auth;
pub mod catalog;
pub mod checkout;
pub mod notifications;
pub mod session;

pub use auth::{AuthError, AuthService, SignIn};
pub use catalog::{CatalogError, CatalogService};
pub use checkout::{CheckoutError, CheckoutService};
pub use notifications::Notifier;
pub use session::{SESSION_COOKIE, SessionClaims, SessionError, SessionSigner};
