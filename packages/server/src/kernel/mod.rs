//! Infrastructure shared by every domain: dependency container, job queue,
//! scraping, video rendering, and test doubles.

pub mod deps;
pub mod jobs;
pub mod scraper;
pub mod testing;
pub mod video;

pub use deps::ServerDeps;

/// Model for long-form generation (outlines, production guides).
pub const GPT_4O: &str = "gpt-4o";

/// Cheaper model for short structured extractions (ideas, SEO).
pub const GPT_4O_MINI: &str = "gpt-4o-mini";
