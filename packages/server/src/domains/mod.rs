pub mod brands;
pub mod content;
pub mod pipeline;
pub mod scraping;
