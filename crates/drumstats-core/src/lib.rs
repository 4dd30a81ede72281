// Shared foundation for the drumstats ETL: configuration, error taxonomy,
// result reporting, the domain model and the SQLite store.

pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod result;
pub mod score;
