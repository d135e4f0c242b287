// Frame-sampled pose extraction: sampler -> detector -> frame records

pub mod assembler;
pub mod extract;
pub mod orchestrator;
pub mod types;

pub use assembler::{assemble, AssemblerConfig, Assembly};
pub use orchestrator::{run_pipeline, spawn_pipeline, PipelineRequest};
pub use types::{FrameImage, FrameRecord, ProcessingState};
