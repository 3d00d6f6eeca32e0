//! Feature transforms applied between the dataset and the models.

pub mod scaler;

pub use scaler::StandardScaler;
