//! Data preprocessing module
//!
//! Turns a [`Dataset`](crate::data::Dataset) into fit-ready matrices:
//! - Missing value imputation (median / most frequent)
//! - Standard scaling of numeric columns
//! - One-hot encoding of categorical columns, unknown categories ignored
//! - Label encoding of classification targets
//! - Seeded, optionally stratified train/test splitting

mod encoder;
mod imputer;
mod pipeline;
mod scaler;
mod split;

pub use encoder::{LabelEncoder, OneHotEncoder};
pub use imputer::{median, most_frequent, ImputeStrategy};
pub use pipeline::{prepare_session_data, ColumnStep, FeatureTransformer, PreparedData, SchemaField, TargetEncoding};
pub use scaler::StandardScaler;
pub use split::{train_test_split, TrainTestSplit};
