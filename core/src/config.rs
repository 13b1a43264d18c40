use crate::error::{KpiError, KpiResult};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PRICE_PER_MEAL: f64 = 6.0;
pub const DEFAULT_STDDEV_EPSILON: f64 = 1e-9;
pub const DEFAULT_MOVING_AVERAGE_WINDOW: usize = 3;

/// How per-subscriber revenue is derived for ARPU.
///
/// Weekly revenue uses `n_people * n_meals`; the order-based variant uses
/// `n_orders * n_meals`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RevenueModel {
    /// people × meals × price, one delivery week.
    #[default]
    PeopleMeals,
    /// orders × meals × price.
    OrdersMeals,
}

impl RevenueModel {
    /// SQL expression for the per-subscription unit count, `s` aliasing `subscription`.
    pub(crate) fn unit_sql(&self) -> &'static str {
        match self {
            RevenueModel::PeopleMeals => "s.n_people * s.n_meals",
            RevenueModel::OrdersMeals => "s.n_orders * s.n_meals",
        }
    }
}

/// How a subscription referenced by several events of one campaign is counted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AttributionPolicy {
    /// Each subscription contributes at most once per campaign.
    #[default]
    DistinctSubscription,
    /// One contribution per matching event row (raw join multiplicity).
    PerEvent,
}

/// What report computation does with integrity violations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ValidationPolicy {
    /// Violations travel alongside the KPIs as diagnostics.
    #[default]
    Report,
    /// Any violation refuses the whole report.
    Gate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KpiConfig {
    pub price_per_meal: f64,
    pub revenue_model: RevenueModel,
    pub attribution: AttributionPolicy,
    pub validation_policy: ValidationPolicy,
    pub stddev_epsilon: f64,
    pub moving_average_window: usize,
}

/// On-disk shape. Every key but `price_per_meal` may be omitted.
#[derive(Debug, Clone, Deserialize)]
struct KpiConfigFile {
    price_per_meal: Option<f64>,
    #[serde(default)]
    revenue_model: RevenueModel,
    #[serde(default)]
    attribution: AttributionPolicy,
    #[serde(default)]
    validation_policy: ValidationPolicy,
    #[serde(default = "default_epsilon")]
    stddev_epsilon: f64,
    #[serde(default = "default_window")]
    moving_average_window: usize,
}

fn default_epsilon() -> f64 {
    DEFAULT_STDDEV_EPSILON
}

fn default_window() -> usize {
    DEFAULT_MOVING_AVERAGE_WINDOW
}

impl Default for KpiConfig {
    fn default() -> Self {
        Self {
            price_per_meal: DEFAULT_PRICE_PER_MEAL,
            revenue_model: RevenueModel::default(),
            attribution: AttributionPolicy::default(),
            validation_policy: ValidationPolicy::default(),
            stddev_epsilon: DEFAULT_STDDEV_EPSILON,
            moving_average_window: DEFAULT_MOVING_AVERAGE_WINDOW,
        }
    }
}

impl KpiConfig {
    /// Load from a JSON file. The result is validated before it is returned.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config = Self::from_json(&content)
            .map_err(|e| anyhow::anyhow!("Invalid config {path}: {e}"))?;
        Ok(config)
    }

    pub fn from_json(content: &str) -> KpiResult<Self> {
        let file: KpiConfigFile = serde_json::from_str(content)?;
        let config = Self {
            price_per_meal: file.price_per_meal.ok_or(KpiError::MissingPricePerMeal)?,
            revenue_model: file.revenue_model,
            attribution: file.attribution,
            validation_policy: file.validation_policy,
            stddev_epsilon: file.stddev_epsilon,
            moving_average_window: file.moving_average_window,
        };
        config.validate()?;
        Ok(config)
    }

    /// Override the price, e.g. from a command-line flag.
    pub fn with_price_per_meal(mut self, price_per_meal: f64) -> Self {
        self.price_per_meal = price_per_meal;
        self
    }

    /// Reject configurations no KPI can be computed under.
    pub fn validate(&self) -> KpiResult<()> {
        if !self.price_per_meal.is_finite() || self.price_per_meal <= 0.0 {
            return Err(KpiError::InvalidPricePerMeal {
                value: self.price_per_meal,
            });
        }
        if !self.stddev_epsilon.is_finite() || self.stddev_epsilon < 0.0 {
            return Err(KpiError::InvalidStddevEpsilon {
                value: self.stddev_epsilon,
            });
        }
        if self.moving_average_window == 0 {
            return Err(KpiError::InvalidMovingAverageWindow);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_six_per_meal() {
        let config = KpiConfig::default();
        assert_eq!(config.price_per_meal, 6.0);
        assert_eq!(config.revenue_model, RevenueModel::PeopleMeals);
        assert_eq!(config.attribution, AttributionPolicy::DistinctSubscription);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let config = KpiConfig::from_json(
            r#"{ "price_per_meal": 7.5, "revenue_model": "orders_meals" }"#,
        )
        .unwrap();
        assert_eq!(config.price_per_meal, 7.5);
        assert_eq!(config.revenue_model, RevenueModel::OrdersMeals);
        assert_eq!(config.validation_policy, ValidationPolicy::Report);
        assert_eq!(config.moving_average_window, DEFAULT_MOVING_AVERAGE_WINDOW);
    }

    #[test]
    fn missing_price_is_rejected() {
        let err = KpiConfig::from_json(r#"{ "attribution": "per_event" }"#).unwrap_err();
        assert!(matches!(err, KpiError::MissingPricePerMeal));
    }

    #[test]
    fn non_positive_price_is_rejected() {
        for bad in [0.0, -6.0, f64::NAN, f64::INFINITY] {
            let config = KpiConfig::default().with_price_per_meal(bad);
            assert!(
                matches!(config.validate(), Err(KpiError::InvalidPricePerMeal { .. })),
                "price {bad} should be rejected"
            );
        }
    }

    #[test]
    fn negative_or_nan_epsilon_is_rejected() {
        for bad in [-1e-9, f64::NAN, f64::INFINITY] {
            let config = KpiConfig {
                stddev_epsilon: bad,
                ..KpiConfig::default()
            };
            assert!(
                matches!(config.validate(), Err(KpiError::InvalidStddevEpsilon { .. })),
                "epsilon {bad} should be rejected"
            );
        }
        let exact = KpiConfig {
            stddev_epsilon: 0.0,
            ..KpiConfig::default()
        };
        assert!(exact.validate().is_ok());
    }

    #[test]
    fn zero_window_is_rejected() {
        let err = KpiConfig::from_json(r#"{ "price_per_meal": 6, "moving_average_window": 0 }"#)
            .unwrap_err();
        assert!(matches!(err, KpiError::InvalidMovingAverageWindow));
    }
}
