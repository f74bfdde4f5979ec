//! Series data and the model inputs built from it.

use serde::{Deserialize, Serialize};

use crate::config::RunConfig;
use crate::errors::InputError;
use crate::model::InputShape;

/// Preprocessed series, one vector per column.
///
/// Column 0 is always the predicted column; the others are exogenous
/// columns that may be folded into the feature rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesData {
    columns: Vec<Vec<f64>>,
}

impl SeriesData {
    pub fn new(columns: Vec<Vec<f64>>) -> Result<Self, InputError> {
        let expected = columns.first().map(Vec::len).ok_or(InputError::EmptyData)?;
        if expected == 0 {
            return Err(InputError::EmptyData);
        }
        for (column, values) in columns.iter().enumerate() {
            if values.len() != expected {
                return Err(InputError::RaggedColumns {
                    column,
                    expected,
                    got: values.len(),
                });
            }
        }
        Ok(Self { columns })
    }

    pub fn univariate(values: Vec<f64>) -> Result<Self, InputError> {
        Self::new(vec![values])
    }

    pub fn len(&self) -> usize {
        self.columns[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_multicolumn(&self) -> bool {
        self.columns.len() > 1
    }

    pub fn predicted(&self) -> &[f64] {
        &self.columns[0]
    }

    pub fn columns(&self) -> &[Vec<f64>] {
        &self.columns
    }

    /// Copy with `column` moved to the front as the predicted column; the
    /// other columns keep their order behind it.
    pub fn with_predicted(&self, column: usize) -> Result<SeriesData, InputError> {
        if column >= self.columns.len() {
            return Err(InputError::InvalidParameter(format!(
                "column {} out of range for {} columns",
                column,
                self.columns.len()
            )));
        }
        let mut columns = self.columns.clone();
        let predicted = columns.remove(column);
        columns.insert(0, predicted);
        Ok(SeriesData { columns })
    }

    /// Split off the last `n` rows. Returns the shortened series and the
    /// removed tail of the predicted column.
    pub fn split_tail(&self, n: usize) -> Result<(SeriesData, Vec<f64>), InputError> {
        if n >= self.len() {
            return Err(InputError::InsufficientData {
                needed: n.saturating_add(1),
                got: self.len(),
            });
        }
        let cut = self.len() - n;
        let head = self
            .columns
            .iter()
            .map(|column| column[..cut].to_vec())
            .collect();
        let tail = self.columns[0][cut..].to_vec();
        Ok((SeriesData { columns: head }, tail))
    }
}

/// Supervised training pairs; one feature row per target row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingSet {
    pub features: Vec<Vec<f64>>,
    pub targets: Vec<Vec<f64>>,
}

impl TrainingSet {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn feature_width(&self) -> usize {
        self.features.first().map_or(0, Vec::len)
    }

    pub fn target_width(&self) -> usize {
        self.targets.first().map_or(0, Vec::len)
    }
}

/// Everything a task needs to train one model and evaluate it.
///
/// Feature rows are laid out as the last `lags` values of the predicted
/// column (oldest first), then the windows of the other columns, then a
/// trailing constant `1.0` for [`InputShape::OneStepConstant`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInputs {
    pub shape: InputShape,
    pub lags: usize,
    pub train: TrainingSet,
    /// Feature row ending at the latest observation (reality forecast).
    pub predict_input: Vec<f64>,
    /// One feature row per repetition.
    pub test_inputs: Vec<Vec<f64>>,
    /// Held-out actual values per repetition, each of length horizon.
    pub test_outputs: Vec<Vec<f64>>,
}

impl ModelInputs {
    pub fn repetitions(&self) -> usize {
        self.test_inputs.len()
    }
}

/// Collaborator that turns a series into inputs for one input shape.
pub trait InputConstructor: Send + Sync {
    fn construct(
        &self,
        shape: InputShape,
        data: &SeriesData,
        config: &RunConfig,
    ) -> Result<ModelInputs, InputError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn series_rejects_ragged_and_empty() {
        assert_eq!(SeriesData::new(vec![]), Err(InputError::EmptyData));
        assert_eq!(SeriesData::univariate(vec![]), Err(InputError::EmptyData));
        assert_eq!(
            SeriesData::new(vec![vec![1.0, 2.0], vec![1.0]]),
            Err(InputError::RaggedColumns {
                column: 1,
                expected: 2,
                got: 1
            })
        );
    }

    #[test]
    fn split_tail_keeps_columns_aligned() {
        let data = SeriesData::new(vec![vec![1.0, 2.0, 3.0, 4.0], vec![5.0, 6.0, 7.0, 8.0]]).unwrap();
        let (head, tail) = data.split_tail(2).unwrap();
        assert_eq!(head.len(), 2);
        assert_eq!(head.columns()[1], vec![5.0, 6.0]);
        assert_eq!(tail, vec![3.0, 4.0]);
        assert!(data.split_tail(4).is_err());
    }

    #[test]
    fn with_predicted_moves_column_to_front() {
        let data = SeriesData::new(vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]]).unwrap();
        let moved = data.with_predicted(2).unwrap();
        assert_eq!(moved.predicted(), &[5.0, 6.0]);
        assert_eq!(moved.columns()[1], vec![1.0, 2.0]);
        assert_eq!(moved.columns()[2], vec![3.0, 4.0]);
        assert_eq!(data.with_predicted(0).unwrap(), data);
        assert!(matches!(data.with_predicted(3), Err(InputError::InvalidParameter(_))));
    }
}
