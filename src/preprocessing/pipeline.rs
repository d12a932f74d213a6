//! Session feature transformer
//!
//! One [`FeatureTransformer`] is fitted per training session on the training
//! rows only and then shared, unchanged, by every model, every prediction and
//! every explanation of that session.

use std::sync::Arc;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::encoder::{LabelEncoder, OneHotEncoder};
use super::imputer::{median, most_frequent, ImputeStrategy};
use super::scaler::StandardScaler;
use super::split::train_test_split;
use crate::data::{CellValue, ColumnKind, Dataset};
use crate::error::{PipelineError, Result};
use crate::training::{ProblemType, TrainingConfig};

/// Fitted preprocessing for one input column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ColumnStep {
    Numeric {
        name: String,
        impute: ImputeStrategy,
        fill: f64,
        scaler: StandardScaler,
    },
    Categorical {
        name: String,
        impute: ImputeStrategy,
        fill: String,
        encoder: OneHotEncoder,
    },
}

impl ColumnStep {
    pub fn name(&self) -> &str {
        match self {
            ColumnStep::Numeric { name, .. } | ColumnStep::Categorical { name, .. } => name,
        }
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            ColumnStep::Numeric { .. } => ColumnKind::Numeric,
            ColumnStep::Categorical { .. } => ColumnKind::Categorical,
        }
    }

    fn width(&self) -> usize {
        match self {
            ColumnStep::Numeric { .. } => 1,
            ColumnStep::Categorical { encoder, .. } => encoder.width(),
        }
    }

    /// Missing and unparseable cells take the fitted fill value
    fn encode_into(&self, cell: &CellValue, out: &mut [f64]) {
        match self {
            ColumnStep::Numeric { fill, scaler, .. } => {
                out[0] = scaler.transform(cell.as_f64().unwrap_or(*fill));
            }
            ColumnStep::Categorical { fill, encoder, .. } => {
                let category = cell.as_category();
                encoder.encode_into(category.as_deref().unwrap_or(fill), out);
            }
        }
    }
}

/// How the target column is represented to the estimators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "encoder", rename_all = "snake_case")]
pub enum TargetEncoding {
    /// Clustering: no target
    None,
    /// Regression: raw numeric values
    Numeric,
    /// Classification: sorted labels mapped to `0..n_classes`
    Labels(LabelEncoder),
}

/// One entry of the input schema captured at training time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    pub dtype: String,
    pub example: CellValue,
}

/// Imputation, scaling and one-hot encoding fitted on a session's training rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTransformer {
    steps: Vec<ColumnStep>,
    target_column: Option<String>,
    target: TargetEncoding,
    schema: Vec<SchemaField>,
}

impl FeatureTransformer {
    /// Fit on `train`. Column kinds come from the caller so they can be
    /// detected on the full dataset.
    pub fn fit(
        train: &Dataset,
        features: &[(String, ColumnKind)],
        target_column: Option<&str>,
        target: TargetEncoding,
    ) -> Result<Self> {
        let mut steps = Vec::with_capacity(features.len());
        let mut schema = Vec::with_capacity(features.len());

        for (name, kind) in features {
            let column = train.column(name)?;
            let step = match kind {
                ColumnKind::Numeric => {
                    let observed: Vec<f64> = column.values.iter().filter_map(CellValue::as_f64).collect();
                    let fill = median(&observed);
                    let imputed: Vec<f64> = column
                        .values
                        .iter()
                        .map(|v| v.as_f64().unwrap_or(fill))
                        .collect();
                    ColumnStep::Numeric {
                        name: name.clone(),
                        impute: ImputeStrategy::Median,
                        fill,
                        scaler: StandardScaler::fit(&imputed),
                    }
                }
                ColumnKind::Categorical => {
                    let observed: Vec<String> = column.values.iter().filter_map(CellValue::as_category).collect();
                    let fill = most_frequent(observed.iter().map(String::as_str)).unwrap_or_default();
                    let encoder = OneHotEncoder::fit(
                        observed.iter().map(String::as_str).chain(std::iter::once(fill.as_str())),
                    );
                    ColumnStep::Categorical {
                        name: name.clone(),
                        impute: ImputeStrategy::MostFrequent,
                        fill,
                        encoder,
                    }
                }
            };
            schema.push(SchemaField {
                name: name.clone(),
                dtype: kind.dtype_name().to_string(),
                example: column.first_present(),
            });
            steps.push(step);
        }

        let transformer = Self {
            steps,
            target_column: target_column.map(str::to_string),
            target,
            schema,
        };
        debug!(
            n_inputs = transformer.steps.len(),
            n_features = transformer.n_features(),
            "Fitted feature transformer"
        );
        Ok(transformer)
    }

    /// Width of the transformed matrix
    pub fn n_features(&self) -> usize {
        self.steps.iter().map(ColumnStep::width).sum()
    }

    pub fn steps(&self) -> &[ColumnStep] {
        &self.steps
    }

    /// `col` for numeric inputs, `col=value` for every one-hot slot
    pub fn feature_names(&self) -> Vec<String> {
        self.steps
            .iter()
            .flat_map(|step| match step {
                ColumnStep::Numeric { name, .. } => vec![name.clone()],
                ColumnStep::Categorical { name, encoder, .. } => encoder.feature_names(name),
            })
            .collect()
    }

    pub fn input_schema(&self) -> &[SchemaField] {
        &self.schema
    }

    pub fn target_column(&self) -> Option<&str> {
        self.target_column.as_deref()
    }

    /// Class labels, for classification sessions
    pub fn classes(&self) -> Option<&[String]> {
        match &self.target {
            TargetEncoding::Labels(enc) => Some(&enc.classes),
            _ => None,
        }
    }

    fn encode_row<'a>(&self, mut cell: impl FnMut(usize) -> &'a CellValue, out: &mut [f64]) {
        let mut offset = 0;
        for (i, step) in self.steps.iter().enumerate() {
            let width = step.width();
            step.encode_into(cell(i), &mut out[offset..offset + width]);
            offset += width;
        }
    }

    pub fn transform(&self, data: &Dataset) -> Result<Array2<f64>> {
        let columns = self
            .steps
            .iter()
            .map(|s| data.column(s.name()))
            .collect::<Result<Vec<_>>>()?;
        let mut x = Array2::<f64>::zeros((data.n_rows(), self.n_features()));
        for (row, mut out) in x.rows_mut().into_iter().enumerate() {
            let slice = out
                .as_slice_mut()
                .ok_or_else(|| PipelineError::PreprocessingError("non-contiguous output row".to_string()))?;
            self.encode_row(|i| &columns[i].values[row], slice);
        }
        Ok(x)
    }

    /// Transform a single JSON record. Returns the one-row matrix and the input
    /// columns that were absent, null or blank.
    pub fn transform_record(
        &self,
        record: &serde_json::Map<String, serde_json::Value>,
    ) -> (Array2<f64>, Vec<String>) {
        let mut missing = Vec::new();
        let cells: Vec<CellValue> = self
            .steps
            .iter()
            .map(|step| {
                let cell = record
                    .get(step.name())
                    .map(CellValue::from_json)
                    .unwrap_or(CellValue::Null);
                if cell.is_missing() {
                    missing.push(step.name().to_string());
                }
                cell
            })
            .collect();

        let mut x = Array2::<f64>::zeros((1, self.n_features()));
        if let Some(slice) = x.as_slice_mut() {
            self.encode_row(|i| &cells[i], slice);
        }
        (x, missing)
    }

    /// Encoded target of every row; the target must have no missing cells
    pub fn encode_target(&self, data: &Dataset) -> Result<Array1<f64>> {
        let Some(target) = &self.target_column else {
            return Ok(Array1::zeros(data.n_rows()));
        };
        let column = data.column(target)?;
        column
            .values
            .iter()
            .map(|cell| match &self.target {
                TargetEncoding::None => Ok(0.0),
                TargetEncoding::Numeric => cell.as_f64().ok_or_else(|| {
                    PipelineError::DataError(format!(
                        "Target column '{}' must be numeric for regression (found {:?})",
                        target, cell
                    ))
                }),
                TargetEncoding::Labels(enc) => cell
                    .as_category()
                    .ok_or_else(|| PipelineError::DataError(format!("Missing label in '{}'", target)))
                    .and_then(|label| enc.encode(&label)),
            })
            .collect::<Result<Vec<f64>>>()
            .map(Array1::from_vec)
    }

    /// Map a raw estimator output back to the user's label space
    pub fn decode_prediction(&self, value: f64) -> Result<CellValue> {
        match &self.target {
            TargetEncoding::Labels(enc) => {
                let label = enc.decode(value)?;
                Ok(match label.parse::<f64>() {
                    Ok(v) if !v.is_nan() => CellValue::Number(v),
                    _ => CellValue::Text(label.to_string()),
                })
            }
            TargetEncoding::Numeric => Ok(CellValue::Number(value)),
            // Cluster index
            TargetEncoding::None => Ok(CellValue::Number(value.round())),
        }
    }
}

/// Everything the trainers need for one session
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub transformer: Arc<FeatureTransformer>,
    pub problem_type: ProblemType,
    pub x_train: Array2<f64>,
    pub y_train: Array1<f64>,
    pub x_test: Array2<f64>,
    pub y_test: Array1<f64>,
    /// Distinct target classes; 0 unless classification
    pub n_classes: usize,
    pub cv_folds: usize,
    pub random_state: u64,
}

impl PreparedData {
    pub fn feature_names(&self) -> Vec<String> {
        self.transformer.feature_names()
    }
}

/// Split `data`, fit the session transformer on the training rows and
/// transform both sides. `config` must already be resolved against `data`.
///
/// Rows with a missing target are dropped. Clustering uses every row for both
/// sides.
pub fn prepare_session_data(data: &Dataset, config: &TrainingConfig) -> Result<PreparedData> {
    let target = config.target_column.as_deref();
    let kinds: Vec<(String, ColumnKind)> = config
        .features
        .iter()
        .map(|f| Ok((f.clone(), data.column(f)?.kind())))
        .collect::<Result<_>>()?;

    let rows: Vec<usize> = match target {
        Some(t) => {
            let column = data.column(t)?;
            (0..data.n_rows()).filter(|&i| !column.values[i].is_missing()).collect()
        }
        None => (0..data.n_rows()).collect(),
    };
    if rows.is_empty() {
        return Err(PipelineError::DataError("No rows with a target value to train on".to_string()));
    }
    let data = data.select_rows(&rows);

    let encoding = match config.problem_type {
        ProblemType::Clustering => TargetEncoding::None,
        ProblemType::Regression => TargetEncoding::Numeric,
        ProblemType::Classification => {
            let t = target.ok_or_else(|| PipelineError::ValidationError("target_column is required".to_string()))?;
            let labels: Vec<String> = data.column(t)?.values.iter().filter_map(CellValue::as_category).collect();
            let encoder = LabelEncoder::fit(labels.iter().map(String::as_str));
            if encoder.n_classes() < 2 {
                return Err(PipelineError::DataError(format!(
                    "Target column '{}' needs at least two classes",
                    t
                )));
            }
            TargetEncoding::Labels(encoder)
        }
    };
    let n_classes = match &encoding {
        TargetEncoding::Labels(enc) => enc.n_classes(),
        _ => 0,
    };

    if config.problem_type == ProblemType::Clustering {
        if data.n_rows() < 2 {
            return Err(PipelineError::DataError(format!(
                "Clustering needs at least 2 rows, found {}",
                data.n_rows()
            )));
        }
        let transformer = FeatureTransformer::fit(&data, &kinds, None, encoding)?;
        let x = transformer.transform(&data)?;
        let y = Array1::zeros(x.nrows());
        return Ok(PreparedData {
            transformer: Arc::new(transformer),
            problem_type: config.problem_type,
            x_train: x.clone(),
            y_train: y.clone(),
            x_test: x,
            y_test: y,
            n_classes,
            cv_folds: config.cv_folds,
            random_state: config.random_state,
        });
    }

    // Labels are encoded on all rows before the split so stratification
    // sees every class
    let target_only = FeatureTransformer {
        steps: Vec::new(),
        target_column: target.map(str::to_string),
        target: encoding.clone(),
        schema: Vec::new(),
    };
    let y_all = target_only.encode_target(&data)?;
    let strata: Option<Vec<usize>> = (config.problem_type == ProblemType::Classification)
        .then(|| y_all.iter().map(|&v| v as usize).collect());

    let split = train_test_split(data.n_rows(), config.test_size, config.random_state, strata.as_deref())?;
    if split.train.len() < config.cv_folds {
        return Err(PipelineError::DataError(format!(
            "Training split has {} rows, fewer than cv_folds ({})",
            split.train.len(),
            config.cv_folds
        )));
    }

    let train = data.select_rows(&split.train);
    let test = data.select_rows(&split.test);
    let transformer = FeatureTransformer::fit(&train, &kinds, target, encoding)?;

    Ok(PreparedData {
        x_train: transformer.transform(&train)?,
        x_test: transformer.transform(&test)?,
        y_train: y_all.select(ndarray::Axis(0), &split.train),
        y_test: y_all.select(ndarray::Axis(0), &split.test),
        transformer: Arc::new(transformer),
        problem_type: config.problem_type,
        n_classes,
        cv_folds: config.cv_folds,
        random_state: config.random_state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Column;
    use crate::training::Algorithm;
    use serde_json::json;

    fn sample() -> Dataset {
        Dataset::new(vec![
            Column::new(
                "age",
                vec![
                    CellValue::Number(20.0),
                    CellValue::Number(30.0),
                    CellValue::Null,
                    CellValue::Number(40.0),
                ],
            ),
            Column::new(
                "city",
                vec![
                    CellValue::Text("b".into()),
                    CellValue::Text("a".into()),
                    CellValue::Text("b".into()),
                    CellValue::Text(" ".into()),
                ],
            ),
        ])
        .unwrap()
    }

    fn kinds() -> Vec<(String, ColumnKind)> {
        vec![
            ("age".to_string(), ColumnKind::Numeric),
            ("city".to_string(), ColumnKind::Categorical),
        ]
    }

    #[test]
    fn test_fit_imputes_scales_and_encodes() {
        let t = FeatureTransformer::fit(&sample(), &kinds(), None, TargetEncoding::None).unwrap();
        assert_eq!(t.feature_names(), vec!["age", "city=a", "city=b"]);
        let x = t.transform(&sample()).unwrap();
        assert_eq!(x.dim(), (4, 3));
        // age median 30 fills row 2, which scales to 0
        assert!(x[[2, 0]].abs() < 1e-12);
        // blank city takes the most frequent value
        assert_eq!(x.row(3).to_vec()[1..], [0.0, 1.0]);
    }

    #[test]
    fn test_transform_record_reports_missing_inputs() {
        let t = FeatureTransformer::fit(&sample(), &kinds(), None, TargetEncoding::None).unwrap();
        let record = json!({"age": "  ", "extra": 1}).as_object().cloned().unwrap();
        let (x, missing) = t.transform_record(&record);
        assert_eq!(missing, vec!["age", "city"]);
        assert_eq!(x.dim(), (1, 3));

        let record = json!({"age": "35", "city": "zzz"}).as_object().cloned().unwrap();
        let (x, missing) = t.transform_record(&record);
        assert!(missing.is_empty());
        // unknown category encodes as all zeros
        assert_eq!(x.row(0).to_vec()[1..], [0.0, 0.0]);
    }

    #[test]
    fn test_serialization_is_stable() {
        let t = FeatureTransformer::fit(&sample(), &kinds(), None, TargetEncoding::None).unwrap();
        let a = serde_json::to_vec(&t).unwrap();
        let back: FeatureTransformer = serde_json::from_slice(&a).unwrap();
        assert_eq!(a, serde_json::to_vec(&back).unwrap());
    }

    fn labelled(n: usize) -> Dataset {
        let x: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let labels: Vec<&str> = (0..n).map(|i| if i % 2 == 0 { "yes" } else { "no" }).collect();
        Dataset::new(vec![Column::numeric("x", &x), Column::text("label", &labels)]).unwrap()
    }

    #[test]
    fn test_prepare_classification_split() {
        let data = labelled(20);
        let config = TrainingConfig::new("f", ProblemType::Classification)
            .with_target("label")
            .with_algorithms([Algorithm::GaussianNB])
            .resolve(&data)
            .unwrap();
        let prepared = prepare_session_data(&data, &config).unwrap();
        assert_eq!(prepared.x_test.nrows(), 4);
        assert_eq!(prepared.x_train.nrows(), 16);
        assert_eq!(prepared.n_classes, 2);
        assert_eq!(prepared.transformer.classes().unwrap(), ["no", "yes"]);
        let decoded = prepared.transformer.decode_prediction(1.0).unwrap();
        assert_eq!(decoded, CellValue::Text("yes".into()));
    }

    #[test]
    fn test_prepare_rejects_tiny_training_split() {
        let data = labelled(4);
        let config = TrainingConfig::new("f", ProblemType::Classification)
            .with_target("label")
            .with_algorithms([Algorithm::GaussianNB])
            .resolve(&data)
            .unwrap();
        assert!(prepare_session_data(&data, &config).is_err());
    }
}
