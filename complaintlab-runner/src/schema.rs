//! Column roles of the complaints dataset.
//!
//! Every derived column name used by the feature pipeline is computed here so
//! stages never spell them out on their own.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplaintSchema {
    pub target_column: String,
    /// Low-cardinality string features: frequency-imputed then indexed.
    pub categorical_features: Vec<String>,
    /// `(start, end)` date columns turned into a day difference.
    pub derived_input_features: (String, String),
    pub derived_output_feature: String,
    /// Dropped during validation regardless of their content.
    pub unwanted_columns: Vec<String>,
}

impl Default for ComplaintSchema {
    fn default() -> Self {
        Self {
            target_column: "consumer_disputed".into(),
            categorical_features: vec![
                "company_response".into(),
                "consumer_consent_provided".into(),
                "submitted_via".into(),
                "issue".into(),
            ],
            derived_input_features: ("date_received".into(), "date_sent_to_company".into()),
            derived_output_feature: "diff_in_days".into(),
            unwanted_columns: vec![
                "complaint_id".into(),
                "sub_product".into(),
                "complaint_what_happened".into(),
            ],
        }
    }
}

impl ComplaintSchema {
    /// Columns that must survive validation.
    pub fn required_columns(&self) -> Vec<String> {
        let mut cols = self.categorical_features.clone();
        cols.push(self.derived_input_features.0.clone());
        cols.push(self.derived_input_features.1.clone());
        cols.push(self.target_column.clone());
        cols
    }

    pub fn numerical_features(&self) -> Vec<String> {
        vec![self.derived_output_feature.clone()]
    }

    pub fn imputed(column: &str) -> String {
        format!("im_{column}")
    }

    pub fn indexed(column: &str) -> String {
        format!("idx_{column}")
    }

    pub fn scaled(column: &str) -> String {
        format!("scaled_{column}")
    }

    /// Indexed categorical columns fed to the classifier.
    pub fn indexed_features(&self) -> Vec<String> {
        self.categorical_features
            .iter()
            .map(|c| Self::indexed(&Self::imputed(c)))
            .collect()
    }

    /// Scaled numerical columns fed to the classifier.
    pub fn scaled_features(&self) -> Vec<String> {
        self.numerical_features()
            .iter()
            .map(|c| Self::scaled(&Self::imputed(c)))
            .collect()
    }

    /// Columns kept in the transformed train/test tables.
    pub fn transformed_columns(&self) -> Vec<String> {
        let mut cols = self.indexed_features();
        cols.extend(self.scaled_features());
        cols.push(self.target_column.clone());
        cols
    }

    /// Target after label indexing.
    pub fn target_indexed_label(&self) -> String {
        format!("indexed_{}", self.target_column)
    }

    pub fn prediction_column(&self) -> &'static str {
        "prediction"
    }

    /// Predicted label as a string, e.g. `prediction_consumer_disputed`.
    pub fn prediction_label_column(&self) -> String {
        format!("{}_{}", self.prediction_column(), self.target_column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_columns_cover_features_and_target() {
        let schema = ComplaintSchema::default();
        let required = schema.required_columns();
        assert_eq!(required.len(), 7);
        assert!(required.contains(&"issue".to_string()));
        assert!(required.contains(&"date_sent_to_company".to_string()));
        assert_eq!(required.last().unwrap(), "consumer_disputed");
    }

    #[test]
    fn derived_names() {
        let schema = ComplaintSchema::default();
        assert_eq!(schema.indexed_features()[0], "idx_im_company_response");
        assert_eq!(schema.scaled_features(), vec!["scaled_im_diff_in_days"]);
        assert_eq!(schema.prediction_label_column(), "prediction_consumer_disputed");
        assert_eq!(schema.transformed_columns().len(), 6);
    }
}
