//! ClipsCommerce API core: brand assimilation, content generation, catalog
//! scraping, and the job system that runs them asynchronously.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::Config;
