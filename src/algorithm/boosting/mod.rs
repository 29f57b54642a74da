//! Histogram-based gradient boosted decision trees
//!
//! The engine behind every model family: features are quantized once per fit,
//! trees are grown from gradient histograms with one of three growth policies,
//! and the additive model is scored with binary logloss.

pub mod booster;
pub mod grower;
pub mod histogram;
pub mod matrix;
pub mod quantize;
pub mod split;
pub mod tree;

pub use booster::{BoosterParams, GradientBooster, RowSampling, logloss, sigmoid};
pub use grower::{GrowPolicy, TreeParams};
pub use matrix::FeatureMatrix;
pub use split::SplitParams;
