//! Data pipeline: sheet reading, block extraction, datasets, and splits.

pub mod dataset;
pub mod extract;
pub mod schema;
pub mod sheet;
pub mod split;

pub use dataset::{Dataset, DatasetSummary, FeatureColumn, FeatureMatrix, Sample, Season};
pub use extract::{Extraction, ExtractionReport, Extractor};
pub use schema::{BlockDescriptor, SheetSchema};
pub use sheet::{Cell, Sheet};
pub use split::{TrainTestSplit, train_test_split};
