//! Downstream service catalogue.
//!
//! # Data Flow
//! ```text
//! Compile-time defaults (address_book.rs)
//!     → <SERVICE>_ADDR overrides (config loader)
//!     → AddressBook (read-only)
//!     → rpc::registry opens one channel per entry
//! ```
//!
//! # Design Decisions
//! - The set of services is closed; adding one is a code change
//! - Lookups by name fail loudly instead of returning an empty endpoint
//! - No discovery: the table is fixed once the process has started

pub mod address_book;

pub use address_book::{AddressBook, AddressError, ServiceName};
