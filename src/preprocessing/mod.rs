//! Data preprocessing module

mod scaler;

pub use scaler::StandardScaler;
