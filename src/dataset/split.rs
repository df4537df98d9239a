//! Train/val/test partitioning.

use std::str::FromStr;

use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};

use super::{Dataset, ImageId};
use crate::error::LabelsetError;

/// Allowed slack when checking that the ratios sum to one.
pub const RATIO_EPSILON: f64 = 1e-6;

/// Split proportions, plus an optional seed for a reproducible shuffle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SplitRatios {
    pub train: f64,
    pub val: f64,
    pub test: f64,
    pub seed: Option<u64>,
}

impl SplitRatios {
    pub fn new(train: f64, val: f64, test: f64) -> Self {
        Self {
            train,
            val,
            test,
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Checks that every ratio is finite and non-negative and that they sum
    /// to one within [`RATIO_EPSILON`].
    pub fn validate(&self) -> Result<(), LabelsetError> {
        for (name, value) in [("train", self.train), ("val", self.val), ("test", self.test)] {
            if !value.is_finite() || value < 0.0 {
                return Err(LabelsetError::InvalidRatio {
                    message: format!("{name} ratio {value} must be a finite non-negative number"),
                });
            }
        }

        let sum = self.train + self.val + self.test;
        if (sum - 1.0).abs() > RATIO_EPSILON {
            return Err(LabelsetError::InvalidRatio {
                message: format!("ratios must sum to 1, got {sum}"),
            });
        }
        Ok(())
    }

    /// Group sizes for `total` images: train and val are floored, test takes
    /// the remainder so the three always add up to `total`.
    pub fn partition_sizes(&self, total: usize) -> (usize, usize, usize) {
        // Absorbs float noise such as 10 * 0.7 = 7.000000000000001 or
        // 10 * 0.3 = 2.9999999999999996.
        let floor = |ratio: f64| ((total as f64 * ratio) + 1e-9).floor() as usize;
        let train = floor(self.train).min(total);
        let val = floor(self.val).min(total - train);
        (train, val, total - train - val)
    }
}

impl FromStr for SplitRatios {
    type Err = LabelsetError;

    /// Parses `"train,val,test"`, e.g. `"0.7,0.2,0.1"`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let values: Vec<f64> = raw
            .split(',')
            .map(|part| {
                part.trim()
                    .parse::<f64>()
                    .map_err(|_| LabelsetError::InvalidRatio {
                        message: format!("'{}' is not a number", part.trim()),
                    })
            })
            .collect::<Result<_, _>>()?;

        match values.as_slice() {
            [train, val, test] => Ok(Self::new(*train, *val, *test)),
            _ => Err(LabelsetError::InvalidRatio {
                message: format!("expected three comma-separated ratios, got {}", values.len()),
            }),
        }
    }
}

/// The three datasets produced by [`Dataset::split_dataset`].
#[derive(Clone, Debug)]
pub struct DatasetSplit {
    pub train: Dataset,
    pub val: Dataset,
    pub test: Dataset,
}

impl Dataset {
    /// Partitions the images into disjoint train/val/test datasets.
    ///
    /// Image ids are shuffled (deterministically when `ratios.seed` is set)
    /// and cut according to [`SplitRatios::partition_sizes`]. Each part is a
    /// new dataset sharing this dataset's taxonomy and data path and holding
    /// only its own images and their annotations. The source is not
    /// modified. Annotations owned by unregistered images belong to no
    /// part.
    ///
    /// # Errors
    /// `InvalidRatio` if the ratios are negative or do not sum to one.
    pub fn split_dataset(&self, ratios: SplitRatios) -> Result<DatasetSplit, LabelsetError> {
        ratios.validate()?;

        let mut ids: Vec<ImageId> = self.image_ids().collect();
        if let Some(seed) = ratios.seed {
            let mut rng = StdRng::seed_from_u64(seed);
            ids.shuffle(&mut rng);
        } else {
            let mut rng = rand::rng();
            ids.shuffle(&mut rng);
        }

        let (n_train, n_val, n_test) = ratios.partition_sizes(ids.len());
        let (train_ids, rest) = ids.split_at(n_train);
        let (val_ids, test_ids) = rest.split_at(n_val);

        tracing::info!(
            train = n_train,
            val = n_val,
            test = n_test,
            seed = ?ratios.seed,
            "split dataset"
        );

        Ok(DatasetSplit {
            train: self.subset(train_ids)?,
            val: self.subset(val_ids)?,
            test: self.subset(test_ids)?,
        })
    }
}
