//! Feature engineering module
//!
//! Provides the categorical one-hot encoder, the z-score scaler and the
//! event encoder that combines them into the detector's feature matrix.

mod encoder;
mod one_hot;
mod scaler;

pub use encoder::*;
pub use one_hot::*;
pub use scaler::*;
