//! Kafsh Core - Shared domain types.
//!
//! This crate provides the types used across all Kafsh components:
//! - `storefront` - Telegram Mini App storefront and admin panel
//! - `cli` - Command-line tools for migrations, seeding and admin management
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP clients. This keeps it lightweight and allows it to be used
//! anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, prices, phone numbers, tracking codes and statuses
//! - [`locale`] - Persian digits, number grouping and Jalali dates

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod locale;
pub mod types;

pub use types::*;
