pub mod aggregate;
pub mod clean;
pub mod persist;
