//! Future-Risk Regressor
//!
//! Regresses the standardized anomaly count of each user on the one-hot
//! encoded static profile attributes and maps the destandardized prediction
//! onto the anomaly-count tier table.

use super::regression::LinearRegression;
use crate::data::{ProfileAttributes, UserId};
use crate::error::RiskError;
use crate::features::{OneHotEncoder, StandardScaler};
use crate::risk::RiskTier;
use crate::utils::ForecastSettings;
use ndarray::{Array1, Array2, ArrayView1};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Attribute names in encoder column order
pub const PROFILE_FIELDS: [&str; 3] = [
    "habitual_area",
    "typical_device",
    "password_change_frequency",
];

/// One training row: a user with events and a complete profile
#[derive(Debug, Clone)]
pub struct ForecastInput {
    pub user_id: UserId,
    pub attributes: ProfileAttributes,
    pub anomaly_count: usize,
}

/// Forecast for one user
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Forecast {
    /// Destandardized anomaly-count-equivalent score
    pub predicted_anomalies: f64,
    pub tier: RiskTier,
}

/// Per-user outcome of a regressor run
#[derive(Debug, Default)]
pub struct ForecastSet {
    pub forecasts: BTreeMap<UserId, Forecast>,
    pub failures: BTreeMap<UserId, RiskError>,
}

impl ForecastSet {
    pub fn tier(&self, user_id: &UserId) -> Option<RiskTier> {
        self.forecasts.get(user_id).map(|f| f.tier)
    }

    fn fail_all<'a>(&mut self, users: impl Iterator<Item = &'a UserId>, reason: &str) {
        for user_id in users {
            self.failures
                .insert(user_id.clone(), RiskError::ModelFit(reason.to_string()));
        }
    }
}

/// Linear model over profile attributes, fitted once per batch
#[derive(Debug, Clone)]
pub struct FutureRiskRegressor {
    settings: ForecastSettings,
}

impl FutureRiskRegressor {
    pub fn new(settings: ForecastSettings) -> Self {
        Self { settings }
    }

    /// Fit on all inputs and forecast each of them
    ///
    /// Users holding a category shared by fewer than `min_category_support`
    /// users cannot be estimated and fail individually. If the remaining
    /// design is still rank-deficient every remaining user fails. Neither
    /// case aborts the batch.
    pub fn fit_predict(&self, inputs: &[ForecastInput]) -> ForecastSet {
        let mut set = ForecastSet::default();
        let rows = self.supported_rows(inputs, &mut set);

        if rows.is_empty() {
            info!(
                failed = set.failures.len(),
                "No users left to fit the future-risk model on"
            );
            return set;
        }

        let encoders: Vec<OneHotEncoder> = (0..PROFILE_FIELDS.len())
            .map(|field| {
                OneHotEncoder::fit_drop_first(rows.iter().map(|r| r.attributes.values()[field]))
            })
            .collect();
        let width: usize = encoders.iter().map(OneHotEncoder::width).sum();

        let mut x = Array2::<f64>::zeros((rows.len(), width));
        let mut cells = vec![0.0; width];
        for (i, row) in rows.iter().enumerate() {
            cells.fill(0.0);
            let mut offset = 0;
            for (encoder, value) in encoders.iter().zip(row.attributes.values()) {
                encoder.encode_into(value, &mut cells[offset..offset + encoder.width()]);
                offset += encoder.width();
            }
            x.row_mut(i).assign(&ArrayView1::from(&cells[..]));
        }

        let counts: Vec<f64> = rows.iter().map(|r| r.anomaly_count as f64).collect();
        let scaler = match StandardScaler::fit(&counts) {
            Ok(scaler) => scaler,
            Err(e) => {
                set.fail_all(rows.iter().map(|r| &r.user_id), &e.to_string());
                return set;
            }
        };
        let y = Array1::from(scaler.transform_all(&counts));

        let mut model = LinearRegression::new(true);
        if let Err(e) = model.fit(&x, &y) {
            warn!(users = rows.len(), error = %e, "Future-risk model could not be fitted");
            set.fail_all(rows.iter().map(|r| &r.user_id), &e.to_string());
            return set;
        }

        let predictions = match model.predict(&x) {
            Ok(p) => p,
            Err(e) => {
                set.fail_all(rows.iter().map(|r| &r.user_id), &e.to_string());
                return set;
            }
        };

        for (row, &scaled) in rows.iter().zip(predictions.iter()) {
            let predicted = scaler.inverse_transform(scaled);
            if !predicted.is_finite() {
                set.failures.insert(
                    row.user_id.clone(),
                    RiskError::ModelFit(format!("non-finite forecast {}", predicted)),
                );
                continue;
            }
            set.forecasts.insert(
                row.user_id.clone(),
                Forecast {
                    predicted_anomalies: predicted,
                    tier: RiskTier::from_score(predicted),
                },
            );
        }

        info!(
            users = rows.len(),
            features = width,
            r_squared = ?model.r_squared,
            failed = set.failures.len(),
            "Future-risk model fitted"
        );

        set
    }

    /// Drops users whose categories are too rare, repeating until stable
    fn supported_rows<'a>(
        &self,
        inputs: &'a [ForecastInput],
        set: &mut ForecastSet,
    ) -> Vec<&'a ForecastInput> {
        let min_support = self.settings.min_category_support;
        let mut rows: Vec<&ForecastInput> = inputs.iter().collect();

        loop {
            let mut support: BTreeMap<(usize, &str), BTreeSet<&UserId>> = BTreeMap::new();
            for &row in &rows {
                for (field, value) in row.attributes.values().into_iter().enumerate() {
                    support.entry((field, value)).or_default().insert(&row.user_id);
                }
            }

            let before = rows.len();
            rows.retain(|row| {
                let rare = row
                    .attributes
                    .values()
                    .into_iter()
                    .enumerate()
                    .find(|&(field, value)| support[&(field, value)].len() < min_support);

                match rare {
                    Some((field, value)) => {
                        let users = support[&(field, value)].len();
                        debug!(
                            user_id = %row.user_id,
                            field = PROFILE_FIELDS[field],
                            value,
                            users,
                            "Category too rare to estimate"
                        );
                        set.failures.insert(
                            row.user_id.clone(),
                            RiskError::ModelFit(format!(
                                "{} '{}' is shared by {} user(s), at least {} required",
                                PROFILE_FIELDS[field], value, users, min_support
                            )),
                        );
                        false
                    }
                    None => true,
                }
            });

            if rows.len() == before {
                return rows;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(id: &str, area: &str, device: &str, freq: &str, count: usize) -> ForecastInput {
        ForecastInput {
            user_id: UserId::from(id),
            attributes: ProfileAttributes {
                habitual_area: area.to_string(),
                typical_device: device.to_string(),
                password_change_frequency: freq.to_string(),
            },
            anomaly_count: count,
        }
    }

    fn full_rank_inputs() -> Vec<ForecastInput> {
        vec![
            input("u1", "coyoacan", "laptop", "mensual", 0),
            input("u2", "coyoacan", "smartphone", "nunca", 3),
            input("u3", "tlalpan", "laptop", "nunca", 2),
            input("u4", "tlalpan", "smartphone", "mensual", 1),
            input("u5", "coyoacan", "laptop", "nunca", 1),
            input("u6", "tlalpan", "smartphone", "nunca", 4),
        ]
    }

    #[test]
    fn test_forecasts_for_every_supported_user() {
        let regressor = FutureRiskRegressor::new(ForecastSettings::default());
        let set = regressor.fit_predict(&full_rank_inputs());

        assert!(set.failures.is_empty());
        assert_eq!(set.forecasts.len(), 6);
        for forecast in set.forecasts.values() {
            assert!(forecast.predicted_anomalies.is_finite());
            assert_eq!(forecast.tier, RiskTier::from_score(forecast.predicted_anomalies));
        }
    }

    #[test]
    fn test_unique_category_fails_only_that_user() {
        let mut inputs = full_rank_inputs();
        inputs.push(input("u7", "milpa_alta", "laptop", "mensual", 5));

        let regressor = FutureRiskRegressor::new(ForecastSettings::default());
        let set = regressor.fit_predict(&inputs);

        let failure = &set.failures[&UserId::from("u7")];
        assert!(matches!(failure, RiskError::ModelFit(msg) if msg.contains("milpa_alta")));
        assert!(set.tier(&UserId::from("u7")).is_none());
        assert_eq!(set.forecasts.len(), 6);
    }

    #[test]
    fn test_rank_deficient_design_fails_all() {
        // device and frequency always move together
        let inputs = vec![
            input("a", "x", "laptop", "mensual", 0),
            input("b", "x", "laptop", "mensual", 1),
            input("c", "x", "tablet", "nunca", 2),
            input("d", "x", "tablet", "nunca", 3),
        ];

        let regressor = FutureRiskRegressor::new(ForecastSettings::default());
        let set = regressor.fit_predict(&inputs);

        assert!(set.forecasts.is_empty());
        assert_eq!(set.failures.len(), 4);
    }

    #[test]
    fn test_constant_profile_predicts_mean() {
        let inputs = vec![
            input("a", "x", "laptop", "mensual", 1),
            input("b", "x", "laptop", "mensual", 3),
        ];

        let regressor = FutureRiskRegressor::new(ForecastSettings::default());
        let set = regressor.fit_predict(&inputs);

        let forecast = set.forecasts[&UserId::from("a")];
        approx::assert_relative_eq!(forecast.predicted_anomalies, 2.0, epsilon = 1e-9);
        assert_eq!(forecast.tier, RiskTier::Medium);
    }

    #[test]
    fn test_no_inputs() {
        let regressor = FutureRiskRegressor::new(ForecastSettings::default());
        let set = regressor.fit_predict(&[]);
        assert!(set.forecasts.is_empty() && set.failures.is_empty());
    }
}
