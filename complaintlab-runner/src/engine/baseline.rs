//! Reference engine.
//!
//! Feature pipeline: day difference between the two date columns, mean
//! imputation and standard scaling of numeric features, frequency imputation
//! and frequency-ordered indexing of categorical features.
//!
//! Classifier: naive Bayes with Laplace-smoothed categorical likelihoods for
//! indexed features and gaussian likelihoods for numeric ones.

use super::model::{PipelineModel, PipelineStage};
use super::{ClassifierColumns, EngineError, MlEngine};
use crate::schema::ComplaintSchema;
use crate::table::{f64_values, has_column, index_values, string_values};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Fill value for a categorical column that is missing everywhere in train.
const UNKNOWN_CATEGORY: &str = "unknown";

/// Floor added to every gaussian variance.
const VARIANCE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, Default)]
pub struct BaselineEngine;

impl MlEngine for BaselineEngine {
    fn name(&self) -> &str {
        "baseline"
    }

    fn fit_feature_pipeline(
        &self,
        train: &DataFrame,
        schema: &ComplaintSchema,
    ) -> Result<PipelineModel, EngineError> {
        for column in schema.required_columns() {
            if !has_column(train, &column) {
                return Err(EngineError::MissingColumn(column));
            }
        }

        // Each stage is fitted on the output of the ones before it.
        let mut frame = train.clone();
        let mut stages = Vec::new();
        let mut push = |stage: PipelineStage, frame: &mut DataFrame| -> Result<(), EngineError> {
            stage.transform(frame)?;
            stages.push(stage);
            Ok(())
        };

        let (start, end) = &schema.derived_input_features;
        push(
            PipelineStage::DateDiff {
                start_col: start.clone(),
                end_col: end.clone(),
                output_col: schema.derived_output_feature.clone(),
            },
            &mut frame,
        )?;

        for column in schema.numerical_features() {
            let mean = mean(&f64_values(&frame, &column)?).unwrap_or(0.0);
            push(
                PipelineStage::MeanImputer {
                    output_col: ComplaintSchema::imputed(&column),
                    input_col: column,
                    mean,
                },
                &mut frame,
            )?;
        }

        for column in &schema.categorical_features {
            let values = string_values(&frame, column)?;
            let most_frequent = frequency_order(values.iter().flatten().map(String::as_str))
                .into_iter()
                .next()
                .unwrap_or_else(|| UNKNOWN_CATEGORY.to_string());
            let imputed = ComplaintSchema::imputed(column);
            push(
                PipelineStage::FrequencyImputer {
                    input_col: column.clone(),
                    output_col: imputed.clone(),
                    most_frequent,
                },
                &mut frame,
            )?;

            let imputed_values = string_values(&frame, &imputed)?;
            push(
                PipelineStage::StringIndexer {
                    output_col: ComplaintSchema::indexed(&imputed),
                    input_col: imputed,
                    labels: frequency_order(imputed_values.iter().flatten().map(String::as_str)),
                },
                &mut frame,
            )?;
        }

        for column in schema.numerical_features() {
            let imputed = ComplaintSchema::imputed(&column);
            let values = f64_values(&frame, &imputed)?;
            let mean = mean(&values).unwrap_or(0.0);
            let std = std_dev(&values, mean).unwrap_or(1.0);
            push(
                PipelineStage::StandardScaler {
                    output_col: ComplaintSchema::scaled(&imputed),
                    input_col: imputed,
                    mean,
                    std,
                },
                &mut frame,
            )?;
        }

        tracing::debug!(stages = stages.len(), "fitted feature pipeline");
        Ok(PipelineModel::new(stages))
    }

    fn fit_label_indexer(
        &self,
        train: &DataFrame,
        input_col: &str,
        output_col: &str,
    ) -> Result<PipelineStage, EngineError> {
        if !has_column(train, input_col) {
            return Err(EngineError::MissingColumn(input_col.to_string()));
        }
        let values = string_values(train, input_col)?;
        let labels = frequency_order(values.iter().flatten().map(String::as_str));
        if labels.is_empty() {
            return Err(EngineError::Fit {
                what: "label indexer".into(),
                reason: format!("column '{input_col}' has no values"),
            });
        }
        Ok(PipelineStage::StringIndexer {
            input_col: input_col.to_string(),
            output_col: output_col.to_string(),
            labels,
        })
    }

    fn fit_classifier(
        &self,
        train: &DataFrame,
        columns: &ClassifierColumns,
    ) -> Result<PipelineStage, EngineError> {
        Ok(PipelineStage::NaiveBayes(NaiveBayesModel::fit(train, columns)?))
    }
}

/// Fitted naive Bayes classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NaiveBayesModel {
    pub categorical_cols: Vec<String>,
    pub numeric_cols: Vec<String>,
    pub prediction_col: String,
    pub class_log_prior: Vec<f64>,
    /// `[feature][class][category]`; the extra last slot scores categories
    /// never seen in training.
    pub category_log_prob: Vec<Vec<Vec<f64>>>,
    /// `[feature][class]` as `(mean, variance)`.
    pub gaussian: Vec<Vec<(f64, f64)>>,
}

impl NaiveBayesModel {
    pub fn fit(train: &DataFrame, columns: &ClassifierColumns) -> Result<Self, EngineError> {
        let labels = index_values(train, &columns.label)?;
        let rows: Vec<(usize, usize)> = labels
            .iter()
            .enumerate()
            .filter_map(|(row, l)| l.map(|l| (row, l as usize)))
            .collect();
        if rows.is_empty() {
            return Err(EngineError::Fit {
                what: "naive bayes".into(),
                reason: "no labelled rows".into(),
            });
        }

        let num_classes = rows.iter().map(|&(_, c)| c).max().map_or(0, |m| m + 1);
        let mut class_counts = vec![0usize; num_classes];
        for &(_, class) in &rows {
            class_counts[class] += 1;
        }
        let total = rows.len() as f64;
        let class_log_prior = class_counts
            .iter()
            .map(|&n| ((n as f64 + 1.0) / (total + num_classes as f64)).ln())
            .collect();

        let mut category_log_prob = Vec::with_capacity(columns.categorical.len());
        for column in &columns.categorical {
            let values = index_values(train, column)?;
            let cardinality = values.iter().flatten().max().map_or(0, |&m| m as usize + 1);
            // One extra slot for unseen categories.
            let slots = cardinality + 1;

            let mut counts = vec![vec![0usize; slots]; num_classes];
            let mut per_class = vec![0usize; num_classes];
            for &(row, class) in &rows {
                if let Some(v) = values[row] {
                    counts[class][v as usize] += 1;
                    per_class[class] += 1;
                }
            }
            let table = counts
                .iter()
                .zip(&per_class)
                .map(|(row, &n)| {
                    row.iter()
                        .map(|&k| ((k as f64 + 1.0) / (n as f64 + slots as f64)).ln())
                        .collect()
                })
                .collect();
            category_log_prob.push(table);
        }

        let mut gaussian = Vec::with_capacity(columns.numeric.len());
        for column in &columns.numeric {
            let values = f64_values(train, column)?;
            let mut per_class: Vec<Vec<f64>> = vec![Vec::new(); num_classes];
            for &(row, class) in &rows {
                if let Some(v) = values[row].filter(|v| v.is_finite()) {
                    per_class[class].push(v);
                }
            }
            let params = per_class
                .iter()
                .map(|xs| {
                    let some: Vec<Option<f64>> = xs.iter().copied().map(Some).collect();
                    match mean(&some) {
                        Some(m) => {
                            let var = std_dev(&some, m).map_or(0.0, |s| s * s);
                            (m, var + VARIANCE_EPSILON)
                        }
                        None => (0.0, 1.0),
                    }
                })
                .collect();
            gaussian.push(params);
        }

        tracing::debug!(
            classes = num_classes,
            rows = rows.len(),
            "fitted naive bayes"
        );
        Ok(Self {
            categorical_cols: columns.categorical.clone(),
            numeric_cols: columns.numeric.clone(),
            prediction_col: columns.prediction.clone(),
            class_log_prior,
            category_log_prob,
            gaussian,
        })
    }

    pub fn num_classes(&self) -> usize {
        self.class_log_prior.len()
    }

    /// Most likely class index per row; ties go to the lower index.
    pub fn predict(&self, df: &DataFrame) -> Result<Vec<Option<u32>>, EngineError> {
        let mut categorical = Vec::with_capacity(self.categorical_cols.len());
        for column in &self.categorical_cols {
            if !has_column(df, column) {
                return Err(EngineError::MissingColumn(column.clone()));
            }
            categorical.push(index_values(df, column)?);
        }
        let mut numeric = Vec::with_capacity(self.numeric_cols.len());
        for column in &self.numeric_cols {
            if !has_column(df, column) {
                return Err(EngineError::MissingColumn(column.clone()));
            }
            numeric.push(f64_values(df, column)?);
        }

        let mut predictions = Vec::with_capacity(df.height());
        let mut scores = vec![0.0; self.num_classes()];
        for row in 0..df.height() {
            scores.copy_from_slice(&self.class_log_prior);

            for (f, values) in categorical.iter().enumerate() {
                let Some(v) = values[row] else { continue };
                for (class, score) in scores.iter_mut().enumerate() {
                    let table = &self.category_log_prob[f][class];
                    let slot = (v as usize).min(table.len() - 1);
                    *score += table[slot];
                }
            }

            for (g, values) in numeric.iter().enumerate() {
                let Some(x) = values[row].filter(|x| x.is_finite()) else { continue };
                for (class, score) in scores.iter_mut().enumerate() {
                    let (mu, var) = self.gaussian[g][class];
                    *score += -0.5 * ((2.0 * std::f64::consts::PI * var).ln() + (x - mu).powi(2) / var);
                }
            }

            let best = scores
                .iter()
                .enumerate()
                .fold(None, |best: Option<(usize, f64)>, (i, &s)| match best {
                    Some((_, b)) if b >= s => best,
                    _ => Some((i, s)),
                })
                .map(|(i, _)| i as u32);
            predictions.push(best);
        }
        Ok(predictions)
    }
}

/// Distinct values, most frequent first, ties broken alphabetically.
pub fn frequency_order<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for v in values {
        *counts.entry(v).or_default() += 1;
    }
    let mut ordered: Vec<(&str, usize)> = counts.into_iter().collect();
    ordered.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ordered.into_iter().map(|(v, _)| v.to_string()).collect()
}

fn mean(values: &[Option<f64>]) -> Option<f64> {
    let (sum, n) = values
        .iter()
        .flatten()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Population standard deviation around `mean`.
fn std_dev(values: &[Option<f64>], mean: f64) -> Option<f64> {
    let (sum_sq, n) = values
        .iter()
        .flatten()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, n), v| (s + (v - mean).powi(2), n + 1));
    (n > 0).then(|| (sum_sq / n as f64).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn complaints() -> DataFrame {
        DataFrame::new(vec![
            Column::new(
                "company_response".into(),
                vec![Some("Closed"), Some("Closed"), None, Some("Relief"), Some("Relief"), Some("Closed")],
            ),
            Column::new(
                "consumer_consent_provided".into(),
                vec![Some("Yes"), Some("Yes"), Some("No"), Some("No"), Some("No"), Some("Yes")],
            ),
            Column::new(
                "submitted_via".into(),
                vec![Some("Web"), Some("Web"), Some("Phone"), Some("Phone"), Some("Phone"), Some("Web")],
            ),
            Column::new(
                "issue".into(),
                vec![Some("Fees"), Some("Fees"), Some("Late"), Some("Late"), Some("Late"), Some("Fees")],
            ),
            Column::new(
                "date_received".into(),
                vec!["2022-07-01", "2022-07-01", "2022-07-01", "2022-07-01", "2022-07-01", "2022-07-01"],
            ),
            Column::new(
                "date_sent_to_company".into(),
                vec![Some("2022-07-01"), Some("2022-07-02"), Some("2022-07-11"), Some("2022-07-12"), None, Some("2022-07-01")],
            ),
            Column::new(
                "consumer_disputed".into(),
                vec![Some("No"), Some("No"), Some("Yes"), Some("Yes"), Some("Yes"), Some("No")],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn frequency_order_breaks_ties_alphabetically() {
        let order = frequency_order(["b", "a", "c", "c", "a"].into_iter());
        assert_eq!(order, vec!["a", "c", "b"]);
    }

    #[test]
    fn feature_pipeline_produces_model_columns() {
        let schema = ComplaintSchema::default();
        let df = complaints();
        let pipeline = BaselineEngine.fit_feature_pipeline(&df, &schema).unwrap();

        // date diff + mean imputer + 4 x (imputer + indexer) + scaler
        assert_eq!(pipeline.len(), 11);

        let out = pipeline.transform(&df).unwrap();
        for column in schema.transformed_columns() {
            assert!(has_column(&out, &column), "missing {column}");
        }
        // The null response is imputed with the most frequent value.
        assert_eq!(
            string_values(&out, "im_company_response").unwrap()[2].as_deref(),
            Some("Closed")
        );
        let scaled = f64_values(&out, "scaled_im_diff_in_days").unwrap();
        assert!(scaled.iter().all(|v| v.is_some_and(f64::is_finite)));
    }

    #[test]
    fn feature_pipeline_requires_schema_columns() {
        let df = complaints().drop("issue").unwrap();
        let err = BaselineEngine
            .fit_feature_pipeline(&df, &ComplaintSchema::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::MissingColumn(c) if c == "issue"));
    }

    #[test]
    fn naive_bayes_separates_obvious_classes() {
        let schema = ComplaintSchema::default();
        let df = complaints();
        let features = BaselineEngine.fit_feature_pipeline(&df, &schema).unwrap();
        let label = BaselineEngine
            .fit_label_indexer(&df, &schema.target_column, &schema.target_indexed_label())
            .unwrap();
        assert_eq!(label.labels().unwrap(), ["No".to_string(), "Yes".to_string()]);

        let mut train = features.transform(&df).unwrap();
        label.transform(&mut train).unwrap();

        let columns = ClassifierColumns {
            categorical: schema.indexed_features(),
            numeric: schema.scaled_features(),
            label: schema.target_indexed_label(),
            prediction: "prediction".into(),
        };
        let model = NaiveBayesModel::fit(&train, &columns).unwrap();
        assert_eq!(model.num_classes(), 2);

        let predictions = model.predict(&train).unwrap();
        let truth = index_values(&train, &schema.target_indexed_label()).unwrap();
        assert_eq!(predictions, truth);
    }

    #[test]
    fn label_indexer_on_empty_column_fails() {
        let df = DataFrame::new(vec![Column::new(
            "consumer_disputed".into(),
            vec![None::<&str>, None],
        )])
        .unwrap();
        let err = BaselineEngine
            .fit_label_indexer(&df, "consumer_disputed", "label")
            .unwrap_err();
        assert!(matches!(err, EngineError::Fit { .. }));
    }

    #[test]
    fn model_survives_json() {
        let schema = ComplaintSchema::default();
        let df = complaints();
        let mut train = BaselineEngine
            .fit_feature_pipeline(&df, &schema)
            .unwrap()
            .transform(&df)
            .unwrap();
        BaselineEngine
            .fit_label_indexer(&df, &schema.target_column, &schema.target_indexed_label())
            .unwrap()
            .transform(&mut train)
            .unwrap();
        let stage = BaselineEngine
            .fit_classifier(
                &train,
                &ClassifierColumns {
                    categorical: schema.indexed_features(),
                    numeric: schema.scaled_features(),
                    label: schema.target_indexed_label(),
                    prediction: "prediction".into(),
                },
            )
            .unwrap();

        let json = serde_json::to_string(&stage).unwrap();
        let back: PipelineStage = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind(), "naive_bayes");
    }
}
