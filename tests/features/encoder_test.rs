//! Tests for one-hot category encoding

use crate::common::{CATEGORICAL, synthetic_table};
use lesion_scorer::algorithm::features::CategoricalVocabulary;
use lesion_scorer::{Column, FeatureSet};

fn categorical() -> Vec<String> {
    CATEGORICAL.iter().map(ToString::to_string).collect()
}

#[test]
fn test_one_indicator_per_source_column_per_row() {
    let mut table = synthetic_table("train", 11, true);
    let vocabulary = CategoricalVocabulary::fit(&table, &categorical()).unwrap();
    let features = vocabulary.apply(&mut table, FeatureSet::new()).unwrap();
    assert_eq!(features.num_categorical(), vocabulary.num_indicators());

    for source in CATEGORICAL {
        let width = vocabulary.categories(source).unwrap().len();
        let start = vocabulary
            .source_columns()
            .take_while(|c| *c != source)
            .map(|c| vocabulary.categories(c).unwrap().len())
            .sum::<usize>();
        let names = &vocabulary.indicator_names()[start..start + width];
        for row in 0..table.num_rows() {
            let hot = names
                .iter()
                .filter(|name| table.column(name).unwrap().value_f64(row) == 1.0)
                .count();
            assert_eq!(hot, 1, "row {row} of {source}");
        }
    }
}

#[test]
fn test_unseen_category_yields_zero_block() {
    let train = synthetic_table("train", 11, true);
    let vocabulary = CategoricalVocabulary::fit(&train, &categorical()).unwrap();

    let mut test = synthetic_table("test", 12, false);
    let n = test.num_rows();
    test.set_column("sex", Column::Categorical(vec![Some("unknown".to_string()); n]))
        .unwrap();
    vocabulary.apply(&mut test, FeatureSet::new()).unwrap();

    let width = vocabulary.categories("sex").unwrap().len();
    let sex_first = vocabulary.source_columns().next() == Some("sex");
    let names = vocabulary.indicator_names();
    let block = if sex_first {
        &names[..width]
    } else {
        &names[names.len() - width..]
    };
    for name in block {
        let Some(Column::Indicator(values)) = test.column(name) else {
            panic!("{name} is not an indicator column");
        };
        assert!(values.iter().all(|&v| v == 0));
    }
}
