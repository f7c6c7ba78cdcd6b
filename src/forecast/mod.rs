//! Future-risk forecasting module
//!
//! - Ordinary least squares regression with a rank check
//! - The profile-attribute regressor producing future risk tiers

mod future_risk;
mod regression;

pub use future_risk::*;
pub use regression::*;
