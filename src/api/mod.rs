pub mod error;
pub mod rest;

pub use error::QueryError;
pub use rest::router;
