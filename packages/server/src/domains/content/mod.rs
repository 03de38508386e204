pub mod generate;
pub mod jobs;
pub mod types;

pub use jobs::{generate_ideas, generate_video, GenerateIdeasJob, GenerateVideoJob};
pub use types::{ContentIdea, IdeaBatch, ProductionGuide, Scene, SeoPackage, Shot, VideoOutline};
