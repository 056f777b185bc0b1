//! Seeded train/test partitioning of the raw table.

use polars::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::error::{PipelineError, Result};

/// Name of the row-position column written in front of both partitions.
pub const INDEX_COLUMN: &str = "Unnamed: 0";

/// Row positions of a split, in shuffled order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Number of test rows for `n_rows` rows and `train_ratio`: `ceil(n * (1 - r))`.
pub fn test_size(n_rows: usize, train_ratio: f64) -> usize {
    let size = (n_rows as f64 * (1.0 - train_ratio)).ceil() as usize;
    size.min(n_rows)
}

/// Shuffle `0..n_rows` with a generator seeded by `seed`; the first
/// [`test_size`] positions form the test partition and the rest the train
/// partition.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `train_ratio` is not strictly
/// between 0 and 1, and [`PipelineError::DataFormat`] if either partition
/// would be empty.
pub fn shuffle_split(n_rows: usize, train_ratio: f64, seed: u64) -> Result<SplitIndices> {
    if !(train_ratio > 0.0 && train_ratio < 1.0) {
        return Err(PipelineError::InvalidConfig(format!(
            "train_ratio must be strictly between 0 and 1, got {}",
            train_ratio
        )));
    }
    let n_test = test_size(n_rows, train_ratio);
    if n_test == 0 || n_test == n_rows {
        return Err(PipelineError::DataFormat(format!(
            "cannot split {} rows with train_ratio {}",
            n_rows, train_ratio
        )));
    }

    let mut positions: Vec<usize> = (0..n_rows).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    positions.shuffle(&mut rng);

    let train = positions.split_off(n_test);
    Ok(SplitIndices {
        train,
        test: positions,
    })
}

/// Split `raw` into `(train, test)` tables.
///
/// Each partition starts with [`INDEX_COLUMN`] holding the row's position in
/// `raw`; an existing column of that name is replaced.
pub fn split_frame(raw: &DataFrame, train_ratio: f64, seed: u64) -> Result<(DataFrame, DataFrame)> {
    let indices = shuffle_split(raw.height(), train_ratio, seed)?;
    let raw = if raw.column(INDEX_COLUMN).is_ok() {
        raw.drop(INDEX_COLUMN)?
    } else {
        raw.clone()
    };
    Ok((take_rows(&raw, &indices.train)?, take_rows(&raw, &indices.test)?))
}

fn take_rows(df: &DataFrame, rows: &[usize]) -> Result<DataFrame> {
    let idx = IdxCa::from_vec(
        PlSmallStr::EMPTY,
        rows.iter().map(|&r| r as IdxSize).collect(),
    );
    let mut part = df.take(&idx)?;
    let positions = Series::new(
        INDEX_COLUMN.into(),
        rows.iter().map(|&r| r as i64).collect::<Vec<i64>>(),
    );
    part.insert_column(0, positions)?;
    Ok(part)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::column_names;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    #[test]
    fn test_test_size_rounds_up() {
        assert_eq!(test_size(1000, 0.8), 200);
        assert_eq!(test_size(10, 0.75), 3);
        assert_eq!(test_size(7, 0.5), 4);
    }

    #[test]
    fn test_partitions_are_disjoint_and_complete() {
        for (n, ratio) in [(1000, 0.8), (37, 0.7), (2, 0.5), (101, 0.99)] {
            let split = shuffle_split(n, ratio, 42).unwrap();
            assert_eq!(split.train.len() + split.test.len(), n);

            let train: BTreeSet<_> = split.train.iter().copied().collect();
            let test: BTreeSet<_> = split.test.iter().copied().collect();
            assert!(train.is_disjoint(&test));
            assert_eq!(train.union(&test).count(), n);
        }
    }

    #[test]
    fn test_same_seed_same_split() {
        let a = shuffle_split(500, 0.8, 42).unwrap();
        let b = shuffle_split(500, 0.8, 42).unwrap();
        let c = shuffle_split(500, 0.8, 7).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_degenerate_splits_rejected() {
        assert!(shuffle_split(10, 1.0, 42).is_err());
        assert!(shuffle_split(10, 0.0, 42).is_err());
        assert!(shuffle_split(1, 0.8, 42).is_err());
        assert!(shuffle_split(0, 0.8, 42).is_err());
    }

    #[test]
    fn test_split_frame_prepends_positions() {
        let raw = df! {
            "Booking_ID" => ["INN1", "INN2", "INN3", "INN4", "INN5", "INN6"],
            "lead_time" => [10i64, 20, 30, 40, 50, 60],
        }
        .unwrap();

        let (train, test) = split_frame(&raw, 0.5, 42).unwrap();
        assert_eq!(train.height(), 3);
        assert_eq!(test.height(), 3);
        assert_eq!(
            column_names(&train),
            vec![INDEX_COLUMN, "Booking_ID", "lead_time"]
        );

        // Positions point back at the raw rows.
        let positions = train.column(INDEX_COLUMN).unwrap().i64().unwrap();
        let lead = train.column("lead_time").unwrap().i64().unwrap();
        for (pos, value) in positions.into_iter().zip(lead.into_iter()) {
            assert_eq!(value.unwrap(), (pos.unwrap() + 1) * 10);
        }
    }

    #[test]
    fn test_split_frame_replaces_existing_index() {
        let raw = df! {
            INDEX_COLUMN => [9i64, 9, 9, 9],
            "lead_time" => [1i64, 2, 3, 4],
        }
        .unwrap();
        let (train, _) = split_frame(&raw, 0.5, 1).unwrap();
        assert_eq!(train.width(), 2);
        let positions = train.column(INDEX_COLUMN).unwrap().i64().unwrap();
        assert!(positions.into_iter().all(|p| p.unwrap() < 4));
    }
}
