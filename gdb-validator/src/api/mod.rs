//! Boundary web service access

pub mod client;
pub mod models;

pub use client::{BoundaryClient, BoundaryService};
pub use models::{BoundaryError, parse_boundary_response};
