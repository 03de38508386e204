pub mod jobs;
pub mod models;

pub use jobs::{scrape_brand, ScrapeBrandJob};
pub use models::{Product, ScrapingJob};
