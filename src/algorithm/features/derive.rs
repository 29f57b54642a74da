//! Derived lesion features
//!
//! Each derived feature is a fixed arithmetic function of the raw TBP
//! measurements of a single lesion. Quotients whose denominator comes from the
//! data add [`EPSILON`] to it; missing inputs propagate as NaN.

use std::f64::consts::PI;

use log::debug;
use rayon::prelude::*;

use crate::algorithm::feature_set::FeatureSet;
use crate::error::Result;
use crate::table::LesionTable;

/// Guard added to data-dependent denominators
pub const EPSILON: f64 = 1e-5;

/// Number of derived features
pub const NUM_DERIVED_FEATURES: usize = 42;

/// Derived feature names in output order
pub const DERIVED_FEATURE_NAMES: [&str; NUM_DERIVED_FEATURES] = [
    "lesion_size_ratio",
    "lesion_shape_index",
    "hue_contrast",
    "luminance_contrast",
    "lesion_color_difference",
    "border_complexity",
    "color_uniformity",
    "position_distance_3d",
    "perimeter_to_area_ratio",
    "area_to_perimeter_ratio",
    "lesion_visibility_score",
    "symmetry_border_consistency",
    "consistency_symmetry_border",
    "color_consistency",
    "consistency_color",
    "size_age_interaction",
    "hue_color_std_interaction",
    "lesion_severity_index",
    "shape_complexity_index",
    "color_contrast_index",
    "log_lesion_area",
    "normalized_lesion_size",
    "mean_hue_difference",
    "std_dev_contrast",
    "color_shape_composite_index",
    "lesion_orientation_3d",
    "overall_color_difference",
    "symmetry_perimeter_interaction",
    "comprehensive_lesion_index",
    "color_variance_ratio",
    "border_color_interaction",
    "border_color_interaction_2",
    "size_color_contrast_ratio",
    "age_normalized_nevi_confidence",
    "age_normalized_nevi_confidence_2",
    "color_asymmetry_index",
    "volume_approximation_3d",
    "color_range",
    "shape_color_consistency",
    "border_length_ratio",
    "age_size_symmetry_index",
    "index_age_size_symmetry",
];

/// Raw measurements of one lesion used by the derivations
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawLesion {
    pub age: f64,
    pub clin_size: f64,
    pub a: f64,
    pub a_ext: f64,
    pub b: f64,
    pub b_ext: f64,
    pub h: f64,
    pub h_ext: f64,
    pub l: f64,
    pub l_ext: f64,
    pub area: f64,
    pub area_perim_ratio: f64,
    pub color_std_mean: f64,
    pub delta_a: f64,
    pub delta_b: f64,
    pub delta_l: f64,
    pub delta_lb_norm: f64,
    pub eccentricity: f64,
    pub minor_axis: f64,
    pub nevi_confidence: f64,
    pub norm_border: f64,
    pub norm_color: f64,
    pub perimeter: f64,
    pub radial_color_std_max: f64,
    pub std_l: f64,
    pub std_l_ext: f64,
    pub symm_2axis: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Source column of every `RawLesion` field, in field order
const RAW_INPUTS: [&str; 30] = [
    "age_approx",
    "clin_size_long_diam_mm",
    "tbp_lv_A",
    "tbp_lv_Aext",
    "tbp_lv_B",
    "tbp_lv_Bext",
    "tbp_lv_H",
    "tbp_lv_Hext",
    "tbp_lv_L",
    "tbp_lv_Lext",
    "tbp_lv_areaMM2",
    "tbp_lv_area_perim_ratio",
    "tbp_lv_color_std_mean",
    "tbp_lv_deltaA",
    "tbp_lv_deltaB",
    "tbp_lv_deltaL",
    "tbp_lv_deltaLBnorm",
    "tbp_lv_eccentricity",
    "tbp_lv_minorAxisMM",
    "tbp_lv_nevi_confidence",
    "tbp_lv_norm_border",
    "tbp_lv_norm_color",
    "tbp_lv_perimeterMM",
    "tbp_lv_radial_color_std_max",
    "tbp_lv_stdL",
    "tbp_lv_stdLExt",
    "tbp_lv_symm_2axis",
    "tbp_lv_x",
    "tbp_lv_y",
    "tbp_lv_z",
];

impl RawLesion {
    fn from_inputs(v: &[f64; 30]) -> Self {
        Self {
            age: v[0],
            clin_size: v[1],
            a: v[2],
            a_ext: v[3],
            b: v[4],
            b_ext: v[5],
            h: v[6],
            h_ext: v[7],
            l: v[8],
            l_ext: v[9],
            area: v[10],
            area_perim_ratio: v[11],
            color_std_mean: v[12],
            delta_a: v[13],
            delta_b: v[14],
            delta_l: v[15],
            delta_lb_norm: v[16],
            eccentricity: v[17],
            minor_axis: v[18],
            nevi_confidence: v[19],
            norm_border: v[20],
            norm_color: v[21],
            perimeter: v[22],
            radial_color_std_max: v[23],
            std_l: v[24],
            std_l_ext: v[25],
            symm_2axis: v[26],
            x: v[27],
            y: v[28],
            z: v[29],
        }
    }
}

fn guarded(numerator: f64, denominator: f64) -> f64 {
    numerator / (denominator + EPSILON)
}

/// Compute every derived feature of one lesion, ordered as
/// [`DERIVED_FEATURE_NAMES`]
#[must_use]
pub fn derive_lesion(r: &RawLesion) -> [f64; NUM_DERIVED_FEATURES] {
    let lesion_shape_index = guarded(r.area, r.perimeter.powi(2));
    let border_complexity = r.norm_border + r.symm_2axis;
    let delta_sq = r.delta_a.powi(2) + r.delta_b.powi(2) + r.delta_l.powi(2);
    let distance_3d = (r.x.powi(2) + r.y.powi(2) + r.z.powi(2)).sqrt();
    [
        guarded(r.minor_axis, r.clin_size),
        lesion_shape_index,
        (r.h - r.h_ext).abs(),
        (r.l - r.l_ext).abs(),
        delta_sq.sqrt(),
        border_complexity,
        guarded(r.color_std_mean, r.radial_color_std_max),
        distance_3d,
        guarded(r.perimeter, r.area),
        guarded(r.area, r.perimeter),
        r.delta_lb_norm + r.norm_color,
        r.symm_2axis * r.norm_border,
        guarded(r.symm_2axis * r.norm_border, r.symm_2axis + r.norm_border),
        guarded(r.std_l, r.l_ext),
        guarded(r.std_l * r.l_ext, r.std_l + r.l_ext),
        r.clin_size * r.age,
        r.h * r.color_std_mean,
        (r.norm_border + r.norm_color + r.eccentricity) / 3.0,
        border_complexity + lesion_shape_index,
        r.delta_a + r.delta_b + r.delta_l + r.delta_lb_norm,
        (r.area + 1.0).ln(),
        guarded(r.clin_size, r.age),
        (r.h + r.h_ext) / 2.0,
        (delta_sq / 3.0).sqrt(),
        (r.color_std_mean + r.area_perim_ratio + r.symm_2axis) / 3.0,
        r.y.atan2(r.x),
        (r.delta_a + r.delta_b + r.delta_l) / 3.0,
        r.symm_2axis * r.perimeter,
        (r.area_perim_ratio + r.eccentricity + r.norm_color + r.symm_2axis) / 4.0,
        guarded(r.color_std_mean, r.std_l_ext),
        r.norm_border * r.norm_color,
        guarded(r.norm_border * r.norm_color, r.norm_border + r.norm_color),
        guarded(r.clin_size, r.delta_lb_norm),
        guarded(r.nevi_confidence, r.age),
        (r.clin_size.powi(2) + r.age.powi(2)).sqrt(),
        r.radial_color_std_max * r.symm_2axis,
        r.area * distance_3d,
        (r.l - r.l_ext).abs() + (r.a - r.a_ext).abs() + (r.b - r.b_ext).abs(),
        r.eccentricity * r.color_std_mean,
        guarded(r.perimeter, 2.0 * PI * (r.area / PI).sqrt()),
        r.age * r.clin_size * r.symm_2axis,
        r.age * r.area * r.symm_2axis,
    ]
}

/// Add every derived feature to a table
///
/// # Arguments
/// * `table` - Table holding the raw measurements, receives the new columns
/// * `features` - Current model input columns
///
/// # Returns
/// The feature set extended with the derived columns
///
/// # Errors
/// Returns an error if a raw measurement column is missing
pub fn derive_features(table: &mut LesionTable, features: FeatureSet) -> Result<FeatureSet> {
    let inputs = RAW_INPUTS
        .iter()
        .map(|name| table.numeric(name))
        .collect::<Result<Vec<&[f64]>>>()?;

    let rows: Vec<[f64; NUM_DERIVED_FEATURES]> = (0..table.num_rows())
        .into_par_iter()
        .map(|row| {
            let mut values = [0.0; 30];
            for (slot, column) in values.iter_mut().zip(&inputs) {
                *slot = column[row];
            }
            derive_lesion(&RawLesion::from_inputs(&values))
        })
        .collect();

    for (k, name) in DERIVED_FEATURE_NAMES.iter().enumerate() {
        table.set_numeric(*name, rows.iter().map(|r| r[k]).collect())?;
    }
    debug!(
        "Derived {} features for {} lesions in table '{}'",
        NUM_DERIVED_FEATURES,
        table.num_rows(),
        table.name()
    );
    Ok(features.with_columns(DERIVED_FEATURE_NAMES))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lesion() -> RawLesion {
        RawLesion {
            age: 60.0,
            clin_size: 4.0,
            a: 20.0,
            a_ext: 15.0,
            b: 30.0,
            b_ext: 26.0,
            h: 55.0,
            h_ext: 60.0,
            l: 40.0,
            l_ext: 52.0,
            area: 9.0,
            area_perim_ratio: 20.0,
            color_std_mean: 1.5,
            delta_a: 3.0,
            delta_b: 4.0,
            delta_l: 12.0,
            delta_lb_norm: 7.0,
            eccentricity: 0.7,
            minor_axis: 3.0,
            nevi_confidence: 90.0,
            norm_border: 4.0,
            norm_color: 2.0,
            perimeter: 12.0,
            radial_color_std_max: 0.5,
            std_l: 2.0,
            std_l_ext: 3.0,
            symm_2axis: 0.3,
            x: 3.0,
            y: 4.0,
            z: 12.0,
        }
    }

    fn feature(values: &[f64; NUM_DERIVED_FEATURES], name: &str) -> f64 {
        let idx = DERIVED_FEATURE_NAMES.iter().position(|n| *n == name).unwrap();
        values[idx]
    }

    #[test]
    fn test_derivation_is_pure() {
        let a = derive_lesion(&lesion());
        let b = derive_lesion(&lesion());
        assert_eq!(a.map(f64::to_bits), b.map(f64::to_bits));
    }

    #[test]
    fn test_euclidean_and_plain_combinations() {
        let v = derive_lesion(&lesion());
        assert_eq!(feature(&v, "lesion_color_difference"), 13.0);
        assert_eq!(feature(&v, "position_distance_3d"), 13.0);
        assert_eq!(feature(&v, "volume_approximation_3d"), 9.0 * 13.0);
        assert_eq!(feature(&v, "color_contrast_index"), 3.0 + 4.0 + 12.0 + 7.0);
        assert_eq!(feature(&v, "color_range"), 12.0 + 5.0 + 4.0);
        assert_eq!(feature(&v, "hue_contrast"), 5.0);
        assert_eq!(
            feature(&v, "age_normalized_nevi_confidence_2"),
            (16.0f64 + 3600.0).sqrt()
        );
    }

    #[test]
    fn test_ratios_use_guarded_denominators() {
        let v = derive_lesion(&lesion());
        assert_eq!(feature(&v, "color_uniformity"), 1.5 / (0.5 + EPSILON));
        assert_eq!(feature(&v, "lesion_size_ratio"), 3.0 / (4.0 + EPSILON));
        assert_eq!(feature(&v, "lesion_shape_index"), 9.0 / (144.0 + EPSILON));

        let zero = RawLesion::default();
        let v = derive_lesion(&zero);
        assert!(v.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn test_missing_inputs_propagate() {
        let mut raw = lesion();
        raw.age = f64::NAN;
        let v = derive_lesion(&raw);
        assert!(feature(&v, "size_age_interaction").is_nan());
        assert!(feature(&v, "age_normalized_nevi_confidence").is_nan());
        assert!(feature(&v, "hue_contrast").is_finite());
    }

    #[test]
    fn test_border_length_ratio_of_circle() {
        let mut raw = lesion();
        raw.area = PI;
        raw.perimeter = 2.0 * PI;
        let v = derive_lesion(&raw);
        assert!((feature(&v, "border_length_ratio") - 1.0).abs() < 1e-4);
    }
}
