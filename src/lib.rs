pub mod batch;
pub mod config;
pub mod naming;

// Re-export vision types for convenience
pub use idcrop_vision::{
    plan_crop, CropConfig, CropError, CropOutcome, CropPlan, CropRectangle, CropWarning, FaceBox,
    OutputFormat, Pipeline,
};
