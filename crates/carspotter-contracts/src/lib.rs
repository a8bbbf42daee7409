pub mod cards;
pub mod error;
pub mod events;
pub mod records;
pub mod store;
