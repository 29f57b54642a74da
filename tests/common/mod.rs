//! Synthetic lesion tables shared by the integration tests

use lesion_scorer::algorithm::ensemble::ModelFamily;
use lesion_scorer::config::{AuxiliaryFamilyConfig, PipelineConfig};
use lesion_scorer::pipeline::{FamilyScores, PipelineInputs};
use lesion_scorer::schema::{ANATOMICAL_SITE_COLUMN, RAW_NUMERIC_COLUMNS};
use lesion_scorer::{Column, LesionTable, ScoreTable};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Lesions per patient, 100 in total
pub const PATIENT_SIZES: [usize; 10] = [1, 3, 5, 7, 9, 11, 13, 15, 17, 19];

/// Categorical columns carried by the synthetic tables
pub const CATEGORICAL: [&str; 2] = ["sex", ANATOMICAL_SITE_COLUMN];

const SITES: [&str; 4] = ["head/neck", "upper extremity", "lower extremity", "posterior torso"];

fn raw_value(rng: &mut StdRng, column: &str) -> f64 {
    match column {
        "age_approx" => f64::from(rng.random_range(6u32..17)) * 5.0,
        "tbp_lv_nevi_confidence" => rng.random_range(0.0..100.0),
        "tbp_lv_H" | "tbp_lv_Hext" => rng.random_range(30.0..80.0),
        "tbp_lv_L" | "tbp_lv_Lext" => rng.random_range(20.0..75.0),
        "tbp_lv_x" | "tbp_lv_y" | "tbp_lv_z" => rng.random_range(-200.0..200.0),
        "tbp_lv_symm_2axis_angle" => rng.random_range(0.0..180.0),
        "tbp_lv_eccentricity" | "tbp_lv_symm_2axis" => rng.random_range(0.05..0.95),
        "tbp_lv_norm_border" | "tbp_lv_norm_color" => rng.random_range(0.0..10.0),
        "tbp_lv_areaMM2" => rng.random_range(2.0..40.0),
        "tbp_lv_perimeterMM" => rng.random_range(5.0..30.0),
        _ => rng.random_range(0.5..15.0),
    }
}

/// Build a lesion table of 100 lesions over 10 patients
///
/// Every third lesion of a patient, starting with the second, is malignant,
/// so each patient except the singleton holds both classes. A few ages are
/// missing. The held-out variant carries no target column.
pub fn synthetic_table(name: &str, seed: u64, with_target: bool) -> LesionTable {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut lesion_ids = Vec::new();
    let mut patient_ids = Vec::new();
    let mut target = Vec::new();
    for (patient, &size) in PATIENT_SIZES.iter().enumerate() {
        for lesion in 0..size {
            lesion_ids.push(format!("ISIC_{name}_{:04}", lesion_ids.len()));
            patient_ids.push(format!("IP_{patient:03}"));
            target.push(u8::from(lesion % 3 == 1));
        }
    }
    let n = lesion_ids.len();

    let mut table = LesionTable::new(
        name,
        lesion_ids,
        patient_ids,
        with_target.then_some(target.clone()),
    )
    .unwrap();
    for column in RAW_NUMERIC_COLUMNS {
        let mut values: Vec<f64> = (0..n).map(|_| raw_value(&mut rng, column)).collect();
        if column == "clin_size_long_diam_mm" {
            // malignant lesions run larger
            for (value, &label) in values.iter_mut().zip(&target) {
                *value += 6.0 * f64::from(label);
            }
        }
        if column == "age_approx" {
            for row in (7..n).step_by(23) {
                values[row] = f64::NAN;
            }
        }
        table.set_column(column, Column::Numeric(values)).unwrap();
    }

    let sexes = (0..n)
        .map(|row| match row % 7 {
            0 => None,
            r if r % 2 == 0 => Some("female".to_string()),
            _ => Some("male".to_string()),
        })
        .collect();
    let sites = (0..n)
        .map(|_| Some(SITES[rng.random_range(0..SITES.len())].to_string()))
        .collect();
    table.set_column(CATEGORICAL[0], Column::Categorical(sexes)).unwrap();
    table.set_column(CATEGORICAL[1], Column::Categorical(sites)).unwrap();
    table
}

/// A small configuration that trains every family in seconds
pub fn small_config() -> PipelineConfig {
    let mut config = PipelineConfig::builder()
        .n_repetitions(1)
        .n_splits(3)
        .boosting_rounds(12)
        .search_trials(3)
        .families(ModelFamily::ALL.to_vec())
        .build()
        .unwrap();
    config.schema.categorical_columns = CATEGORICAL.iter().map(ToString::to_string).collect();
    config.ensemble.lightgbm.min_data_in_leaf = 5;
    config.ensemble.lightgbm.num_leaves = 8;
    config.ensemble.catboost.min_data_in_leaf = 5;
    config.ensemble.catboost.depth = 3;
    config.ensemble.xgboost.max_depth = 3;
    config.search.n_startup_trials = 2;
    config
}

/// Legacy scores for every lesion of a table
pub fn legacy_scores(table: &LesionTable, columns: &[String], seed: u64) -> ScoreTable {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut scores = ScoreTable::new("legacy", table.lesion_ids().to_vec(), None).unwrap();
    for column in columns {
        let values = (0..table.num_rows()).map(|_| rng.random_range(0.0..1.0)).collect();
        scores.set_column(column.clone(), values).unwrap();
    }
    scores
}

/// Out-of-fold record and held-out submodel outputs of one family
pub fn family_scores(
    train: &LesionTable,
    test: &LesionTable,
    family: &AuxiliaryFamilyConfig,
    seed: u64,
) -> (ScoreTable, ScoreTable) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut oof = ScoreTable::new(
        "oof",
        train.lesion_ids().to_vec(),
        Some(train.patient_ids().to_vec()),
    )
    .unwrap();
    let n = train.num_rows();
    let folds = (0..n).map(|row| (row % 5) as f64).collect();
    let raw: Vec<f64> = (0..n).map(|_| rng.random_range(0.0..1.0)).collect();
    let ranks = raw.iter().map(|v| v * 0.9 + 0.05).collect();
    oof.set_column(family.fold_column.clone(), folds).unwrap();
    oof.set_column(family.score_column.clone(), raw).unwrap();
    oof.set_column(family.rank_column.clone(), ranks).unwrap();

    let mut held_out = ScoreTable::new(
        "held_out",
        test.lesion_ids().to_vec(),
        Some(test.patient_ids().to_vec()),
    )
    .unwrap();
    for column in family.submodel_columns() {
        let values = (0..test.num_rows()).map(|_| rng.random_range(0.0..1.0)).collect();
        held_out.set_column(column, values).unwrap();
    }
    (oof, held_out)
}

/// Train and test tables with legacy scores and the `eva` and `edg` families
pub fn inputs_with_scores(train_seed: u64, test_seed: u64) -> PipelineInputs {
    let config = small_config();
    let train = synthetic_table("train", train_seed, true);
    let test = synthetic_table("test", test_seed, false);
    let mut inputs = PipelineInputs::new(train.clone(), test.clone());

    let legacy = &config.auxiliary.legacy_columns;
    inputs.legacy_train = Some(legacy_scores(&train, legacy, 1));
    inputs.legacy_test = Some(legacy_scores(&test, legacy, 2));
    for name in ["eva", "edg"] {
        let family = AuxiliaryFamilyConfig::new(name);
        let (oof, held_out) = family_scores(&train, &test, &family, 3);
        inputs.families.push(FamilyScores {
            config: family,
            oof,
            held_out,
        });
    }
    inputs
}
