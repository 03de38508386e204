pub mod actions;
pub mod jobs;

pub use actions::{run_full_pipeline, PipelineError, PipelineOutput};
pub use jobs::{run_pipeline, RunPipelineJob};
