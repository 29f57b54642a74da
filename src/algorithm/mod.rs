//! Algorithm implementations of the lesion scoring pipeline
//!
//! Stages run in order: feature derivation and patient normalization
//! ([`features`]), outlier scoring ([`outlier`]), auxiliary score merging
//! ([`auxiliary`]) and the boosted-tree committee ([`ensemble`]) built on the
//! in-crate engine in [`boosting`]. The model input columns travel between
//! stages as a [`FeatureSet`].

pub mod auxiliary;
pub mod boosting;
pub mod ensemble;
pub mod feature_set;
pub mod features;
pub mod outlier;

pub use feature_set::FeatureSet;
