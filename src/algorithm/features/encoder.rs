//! One-hot encoding of categorical columns
//!
//! The vocabulary is fit once on the training table and applied unchanged to
//! every other table, so all tables get the same indicator columns in the same
//! order. Categories unseen at fit time encode as an all-zero block.

use log::debug;

use crate::algorithm::feature_set::FeatureSet;
use crate::error::Result;
use crate::table::{Column, LesionTable};

/// Prefix of generated indicator columns
pub const ONEHOT_PREFIX: &str = "onehot_";

/// Known categories of every encoded column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoricalVocabulary {
    columns: Vec<(String, Vec<Option<String>>)>,
}

impl CategoricalVocabulary {
    /// Fit the vocabulary on a table
    ///
    /// Categories of each column are sorted; a missing value counts as its own
    /// category and sorts last.
    ///
    /// # Errors
    /// Returns an error if a column is missing or not categorical
    pub fn fit(table: &LesionTable, columns: &[String]) -> Result<Self> {
        let columns = columns
            .iter()
            .map(|name| {
                let mut categories: Vec<Option<String>> = table.categorical(name)?.to_vec();
                categories.sort_by(|a, b| match (a, b) {
                    (Some(a), Some(b)) => a.cmp(b),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                });
                categories.dedup();
                Ok((name.clone(), categories))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { columns })
    }

    /// Source columns in encoding order
    pub fn source_columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    /// Categories of a source column
    #[must_use]
    pub fn categories(&self, column: &str) -> Option<&[Option<String>]> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, c)| c.as_slice())
    }

    /// Total number of indicator columns
    #[must_use]
    pub fn num_indicators(&self) -> usize {
        self.columns.iter().map(|(_, c)| c.len()).sum()
    }

    /// Indicator column names, `onehot_0 .. onehot_{n-1}`
    #[must_use]
    pub fn indicator_names(&self) -> Vec<String> {
        (0..self.num_indicators())
            .map(|i| format!("{ONEHOT_PREFIX}{i}"))
            .collect()
    }

    /// Encode a table with this vocabulary
    ///
    /// # Arguments
    /// * `table` - Table receiving the indicator columns
    /// * `features` - Current model input columns
    ///
    /// # Returns
    /// The feature set with the source columns replaced by the indicators,
    /// which are flagged as native categoricals
    ///
    /// # Errors
    /// Returns an error if a source column is missing or not categorical
    pub fn apply(&self, table: &mut LesionTable, features: FeatureSet) -> Result<FeatureSet> {
        let names = self.indicator_names();
        let mut indicators: Vec<Vec<u8>> = Vec::with_capacity(names.len());
        for (column, categories) in &self.columns {
            let values = table.categorical(column)?;
            for category in categories {
                indicators.push(values.iter().map(|v| u8::from(v == category)).collect());
            }
        }
        for (name, values) in names.iter().zip(indicators) {
            table.set_column(name.clone(), Column::Indicator(values))?;
        }

        let sources: Vec<String> = self.columns.iter().map(|(n, _)| n.clone()).collect();
        debug!(
            "Encoded {} categorical columns into {} indicators in table '{}'",
            sources.len(),
            names.len(),
            table.name()
        );
        Ok(features.without(&sources).with_categorical_columns(names))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(sites: &[Option<&str>], sexes: &[Option<&str>]) -> LesionTable {
        let n = sites.len();
        let mut table = LesionTable::new(
            "t",
            (0..n).map(|i| format!("l{i}")).collect(),
            vec!["p".to_string(); n],
            None,
        )
        .unwrap();
        let to_column =
            |v: &[Option<&str>]| Column::Categorical(v.iter().map(|s| s.map(String::from)).collect());
        table.set_column("site", to_column(sites)).unwrap();
        table.set_column("sex", to_column(sexes)).unwrap();
        table
    }

    fn columns() -> Vec<String> {
        vec!["site".to_string(), "sex".to_string()]
    }

    #[test]
    fn test_fit_sorts_categories_with_missing_last() {
        let train = table(
            &[Some("torso"), None, Some("head"), Some("torso")],
            &[Some("male"), Some("female"), Some("male"), Some("male")],
        );
        let vocab = CategoricalVocabulary::fit(&train, &columns()).unwrap();
        assert_eq!(
            vocab.categories("site").unwrap(),
            &[Some("head".to_string()), Some("torso".to_string()), None]
        );
        assert_eq!(vocab.num_indicators(), 5);
    }

    #[test]
    fn test_one_indicator_per_source_column() {
        let mut train = table(
            &[Some("torso"), None, Some("head")],
            &[Some("male"), Some("female"), None],
        );
        let vocab = CategoricalVocabulary::fit(&train, &columns()).unwrap();
        let features = FeatureSet::from_columns(["x", "site", "sex"]);
        let encoded = vocab.apply(&mut train, features).unwrap();

        assert!(!encoded.contains("site") && !encoded.contains("sex"));
        assert_eq!(encoded.len(), 1 + vocab.num_indicators());
        assert_eq!(encoded.num_categorical(), vocab.num_indicators());

        let site_width = vocab.categories("site").unwrap().len();
        let names = vocab.indicator_names();
        for row in 0..train.num_rows() {
            let values: Vec<u8> = names
                .iter()
                .map(|n| match train.column(n) {
                    Some(Column::Indicator(v)) => v[row],
                    _ => panic!("indicator missing"),
                })
                .collect();
            assert_eq!(values[..site_width].iter().sum::<u8>(), 1);
            assert_eq!(values[site_width..].iter().sum::<u8>(), 1);
        }
    }

    #[test]
    fn test_unseen_category_encodes_as_zeros() {
        let train = table(&[Some("torso"), Some("head")], &[Some("male"), Some("female")]);
        let vocab = CategoricalVocabulary::fit(&train, &columns()).unwrap();

        let mut test = table(&[Some("palms")], &[Some("male")]);
        let features = vocab.apply(&mut test, FeatureSet::new()).unwrap();
        assert_eq!(features.len(), vocab.num_indicators());
        let site_flags: Vec<u8> = vocab.indicator_names()[..2]
            .iter()
            .map(|n| match test.column(n) {
                Some(Column::Indicator(v)) => v[0],
                _ => panic!("indicator missing"),
            })
            .collect();
        assert_eq!(site_flags, vec![0, 0]);
    }
}
