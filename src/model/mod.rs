//! Data types and storage.
//!
//! - [`db`] holds the stored records and the rules that govern them.
//! - [`api`] holds their client-facing representations and request guards.
//! - [`store`] is how the rest of the crate reaches the records.

pub mod api;
pub mod db;
pub mod mongodb;
pub mod store;
