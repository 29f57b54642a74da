//! Tests for feature derivation and patient normalization

use crate::common::{PATIENT_SIZES, synthetic_table};
use lesion_scorer::FeatureSet;
use lesion_scorer::algorithm::features::{
    AREA_PER_BODY_PART, AREA_PER_PATIENT, COUNT_PER_PATIENT, DERIVED_FEATURE_NAMES,
    add_cohort_aggregates, derive_features, normalize_patients, patient_norm_name,
};

#[test]
fn test_derivation_is_bit_identical_on_recompute() {
    let mut first = synthetic_table("train", 7, true);
    let mut second = synthetic_table("train", 7, true);
    derive_features(&mut first, FeatureSet::new()).unwrap();
    derive_features(&mut second, FeatureSet::new()).unwrap();

    for name in DERIVED_FEATURE_NAMES {
        let a = first.numeric(name).unwrap();
        let b = second.numeric(name).unwrap();
        assert!(
            a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits()),
            "{name} differs between runs"
        );
    }
}

#[test]
fn test_derived_names_extend_feature_set() {
    let mut table = synthetic_table("train", 1, true);
    let features = derive_features(&mut table, FeatureSet::from_columns(["age_approx"])).unwrap();
    assert_eq!(features.len(), DERIVED_FEATURE_NAMES.len() + 1);
    assert_eq!(features.columns()[0], "age_approx");
    assert!(features.contains("age_normalized_nevi_confidence"));
    assert!(features.contains("age_normalized_nevi_confidence_2"));
}

#[test]
fn test_constant_patient_columns_normalize_to_zero() {
    let mut table = synthetic_table("train", 3, true);
    let n = table.num_rows();
    table.set_numeric("constant", vec![4.2; n]).unwrap();
    let features =
        normalize_patients(&mut table, FeatureSet::new(), &["constant".to_string()]).unwrap();

    let name = patient_norm_name("constant");
    assert_eq!(features.columns(), [name.as_str()]);
    assert!(table.numeric(&name).unwrap().iter().all(|&v| v == 0.0));
}

#[test]
fn test_cohort_aggregates_count_patient_lesions() {
    let mut table = synthetic_table("train", 5, true);
    let features = add_cohort_aggregates(&mut table, FeatureSet::new()).unwrap();
    assert_eq!(features.len(), 3);

    let counts = table.numeric(COUNT_PER_PATIENT).unwrap();
    let mut row = 0;
    for &size in &PATIENT_SIZES {
        assert!(counts[row..row + size].iter().all(|&c| c == size as f64));
        row += size;
    }

    let areas = table.numeric("tbp_lv_areaMM2").unwrap();
    let patient_area = table.numeric(AREA_PER_PATIENT).unwrap();
    let site_area = table.numeric(AREA_PER_BODY_PART).unwrap();
    // singleton patient
    assert_eq!(patient_area[0], areas[0]);
    assert_eq!(site_area[0], areas[0]);
    assert!(site_area.iter().zip(patient_area).all(|(s, p)| s <= &(p + 1e-9)));
}
