//! Core types for Kafsh.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod id;
pub mod phone;
pub mod price;
pub mod status;
pub mod tracking;

pub use id::*;
pub use phone::{PhoneError, PhoneNumber, PostalCode};
pub use price::{Price, PriceError};
pub use status::*;
pub use tracking::{TrackingCode, TrackingCodeError};
