pub mod jobs;
pub mod models;

pub use jobs::{assimilate_brand, AssimilateBrandJob};
pub use models::{Asset, Brand, BrandKit, BrandKitUpdate};
