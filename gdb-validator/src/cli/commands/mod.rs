pub mod model;
pub mod report;
pub mod runs;
pub mod validate;
