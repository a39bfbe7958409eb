mod database {
    pub mod actions;
    pub mod error;
    pub mod form;
    pub mod pagination;
    pub mod repository;
    pub mod schema;
    pub mod seed;
    pub mod store;
    pub mod views;
}
mod authentication {
    pub mod cryptography;
    pub mod jwt;
    pub mod middleware;
    pub mod permissions;
}
mod config;
mod constants;
mod error;
mod logging;

pub use authentication::*;
pub use config::*;
pub use constants::*;
pub use database::*;
pub use database::error::{QueryError, TypeError};
pub use error::*;
pub use logging::*;
