//! Column names of lesion metadata tables.
//!
//! This module names every raw column the pipeline reads and provides the
//! required-column check that runs before any feature is derived.

use crate::error::{PipelineError, Result};

/// Default lesion identifier column
pub const ID_COLUMN: &str = "isic_id";

/// Default patient identifier column
pub const PATIENT_COLUMN: &str = "patient_id";

/// Default binary label column
pub const TARGET_COLUMN: &str = "target";

/// Anatomical site column used by the body-part area aggregate
pub const ANATOMICAL_SITE_COLUMN: &str = "anatom_site_general";

/// Raw numeric lesion measurements
pub const RAW_NUMERIC_COLUMNS: [&str; 34] = [
    "age_approx",                  // approximate age of patient at imaging
    "clin_size_long_diam_mm",      // maximum lesion diameter (mm)
    "tbp_lv_A",                    // A inside lesion
    "tbp_lv_Aext",                 // A outside lesion
    "tbp_lv_B",                    // B inside lesion
    "tbp_lv_Bext",                 // B outside lesion
    "tbp_lv_C",                    // chroma inside lesion
    "tbp_lv_Cext",                 // chroma outside lesion
    "tbp_lv_H",                    // hue inside lesion
    "tbp_lv_Hext",                 // hue outside lesion
    "tbp_lv_L",                    // L inside lesion
    "tbp_lv_Lext",                 // L outside lesion
    "tbp_lv_areaMM2",              // lesion area (mm^2)
    "tbp_lv_area_perim_ratio",     // border jaggedness
    "tbp_lv_color_std_mean",       // color irregularity
    "tbp_lv_deltaA",               // average A contrast
    "tbp_lv_deltaB",               // average B contrast
    "tbp_lv_deltaL",               // average L contrast
    "tbp_lv_deltaLB",
    "tbp_lv_deltaLBnorm",          // contrast against surrounding skin
    "tbp_lv_eccentricity",
    "tbp_lv_minorAxisMM",          // smallest lesion diameter (mm)
    "tbp_lv_nevi_confidence",      // nevus classifier confidence (0-100)
    "tbp_lv_norm_border",          // border irregularity (0-10)
    "tbp_lv_norm_color",           // color variation (0-10)
    "tbp_lv_perimeterMM",
    "tbp_lv_radial_color_std_max", // color asymmetry
    "tbp_lv_stdL",
    "tbp_lv_stdLExt",
    "tbp_lv_symm_2axis",           // border asymmetry
    "tbp_lv_symm_2axis_angle",
    "tbp_lv_x",
    "tbp_lv_y",
    "tbp_lv_z",
];

/// Raw categorical lesion attributes
pub const CATEGORICAL_COLUMNS: [&str; 6] = [
    "sex",
    "anatom_site_general",
    "tbp_tile_type",
    "tbp_lv_location",
    "tbp_lv_location_simple",
    "attribution",
];

/// Names of the identity and label columns of a lesion table
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TableSchema {
    /// Lesion identifier column
    pub id_column: String,
    /// Patient identifier column
    pub patient_column: String,
    /// Binary label column (present only in training data)
    pub target_column: String,
    /// Numeric columns every input table must carry
    pub numeric_columns: Vec<String>,
    /// Categorical columns every input table must carry
    pub categorical_columns: Vec<String>,
}

impl Default for TableSchema {
    fn default() -> Self {
        Self {
            id_column: ID_COLUMN.to_string(),
            patient_column: PATIENT_COLUMN.to_string(),
            target_column: TARGET_COLUMN.to_string(),
            numeric_columns: RAW_NUMERIC_COLUMNS.iter().map(ToString::to_string).collect(),
            categorical_columns: CATEGORICAL_COLUMNS.iter().map(ToString::to_string).collect(),
        }
    }
}

impl TableSchema {
    /// Whether a column is declared numeric
    #[must_use]
    pub fn is_numeric(&self, column: &str) -> bool {
        self.numeric_columns.iter().any(|c| c == column)
    }

    /// Whether a column is declared categorical
    #[must_use]
    pub fn is_categorical(&self, column: &str) -> bool {
        self.categorical_columns.iter().any(|c| c == column)
    }

    /// Check that every required raw column is present
    ///
    /// # Arguments
    /// * `available` - Column names present in the table
    /// * `table` - Table name used in the error message
    ///
    /// # Errors
    /// Returns `MissingColumn` for the first required column that is absent
    pub fn validate<'a, I>(&self, available: I, table: &str) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let available: rustc_hash::FxHashSet<&str> = available.into_iter().collect();
        let required = [self.id_column.as_str(), self.patient_column.as_str()]
            .into_iter()
            .chain(self.numeric_columns.iter().map(String::as_str))
            .chain(self.categorical_columns.iter().map(String::as_str));

        for column in required {
            if !available.contains(column) {
                return Err(PipelineError::missing_column(column, table));
            }
        }
        Ok(())
    }
}
