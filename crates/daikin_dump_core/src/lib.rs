pub mod config;
pub mod consumption;
pub mod entities;
pub mod error;
pub mod login_strategy;
pub mod ports;
pub mod schema;
pub mod use_cases;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{AuthError, Error};
