//! Per-task detail table.

use serde::{Deserialize, Serialize};

use ps_types::{DetailedSort, ParameterValue, TaskResult};

/// Label shown for a task that produced no result.
pub const MODEL_CRASHED: &str = "Model crashed";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedRow {
    pub model_id: String,
    pub optimization_value: ParameterValue,
    pub repetition_index: usize,
    /// Infinite for failed tasks so they sort after every real error.
    pub error: f64,
    pub wall_time: f64,
    /// `MODEL_CRASHED` plus the failure diagnostic for failed tasks.
    pub note: Option<String>,
}

/// One row per task result, ordered as requested.
pub fn detailed_table(results: &[TaskResult], sort: DetailedSort) -> Vec<DetailedRow> {
    let mut rows: Vec<DetailedRow> = results
        .iter()
        .map(|result| {
            let (error, note) = match (&result.failure, result.scalar_error) {
                (None, Some(error)) => (error, None),
                (Some(failure), _) => (f64::INFINITY, Some(format!("{MODEL_CRASHED}: {failure}"))),
                (None, None) => (f64::INFINITY, Some(MODEL_CRASHED.to_string())),
            };
            DetailedRow {
                model_id: result.model_id.clone(),
                optimization_value: result.optimization_value.clone(),
                repetition_index: result.repetition_index,
                error,
                wall_time: result.wall_time,
                note,
            }
        })
        .collect();

    match sort {
        DetailedSort::Unsorted => {}
        DetailedSort::Name => rows.sort_by(|a, b| a.model_id.cmp(&b.model_id)),
        DetailedSort::Error => rows.sort_by(|a, b| a.error.total_cmp(&b.error)),
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use ps_types::{TaskFailure, TaskKey};

    fn key(model: &str, r: usize) -> TaskKey {
        TaskKey {
            model_id: model.to_string(),
            optimization_index: 0,
            optimization_value: ParameterValue::not_optimized(),
            repetition_index: r,
        }
    }

    fn results() -> Vec<TaskResult> {
        vec![
            TaskResult::success(key("window_average", 0), vec![1.0], 4.0, 0.2),
            TaskResult::failed(key("linear_batch", 0), TaskFailure::execution("singular"), 0.1),
            TaskResult::success(key("last_value", 0), vec![1.0], 2.5, 0.3),
        ]
    }

    #[test]
    fn crashed_rows_are_labelled() {
        let rows = detailed_table(&results(), DetailedSort::Unsorted);
        assert_eq!(rows.len(), 3);
        assert!(rows[1].error.is_infinite());
        assert_eq!(
            rows[1].note.as_deref(),
            Some("Model crashed: ExecutionError: singular")
        );
        assert!(rows[0].note.is_none());
    }

    #[test]
    fn sorting_by_name_and_error() {
        let by_name = detailed_table(&results(), DetailedSort::Name);
        let names: Vec<&str> = by_name.iter().map(|r| r.model_id.as_str()).collect();
        assert_eq!(names, vec!["last_value", "linear_batch", "window_average"]);

        let by_error = detailed_table(&results(), DetailedSort::Error);
        let errors: Vec<f64> = by_error.iter().map(|r| r.error).collect();
        assert_eq!(errors, vec![2.5, 4.0, f64::INFINITY]);
    }
}
