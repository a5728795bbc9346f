pub mod bounds;
pub mod detector;
pub mod error;
pub mod executor;
pub mod face;
pub mod geometry;
pub mod hair;
pub mod model;
pub mod overlay;
pub mod pipeline;
pub mod validate;
pub mod yunet;

// Re-export commonly used types
pub use bounds::CropWarning;
pub use detector::{FaceDetector, YuNetDetector};
pub use error::CropError;
pub use executor::OutputFormat;
pub use face::FaceBox;
pub use geometry::{CropConfig, CropRectangle};
pub use hair::{HairRatio, HairThresholds};
pub use pipeline::{plan_crop, CropOutcome, CropPlan, Pipeline};
pub use validate::{FaceSelector, Plausibility};
