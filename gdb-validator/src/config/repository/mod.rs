//! Repository layer for database operations

pub mod messages;
pub mod runs;
pub mod validators;
pub mod versions;
