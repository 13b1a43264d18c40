use thiserror::Error;

#[derive(Error, Debug)]
pub enum KpiError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("price_per_meal must be a positive finite number, got {value}")]
    InvalidPricePerMeal { value: f64 },

    #[error("price_per_meal is missing from configuration")]
    MissingPricePerMeal,

    #[error("stddev_epsilon must be a finite number >= 0, got {value}")]
    InvalidStddevEpsilon { value: f64 },

    #[error("moving_average_window must be at least 1")]
    InvalidMovingAverageWindow,

    #[error("Invalid as-of date '{value}': expected YYYY-MM-DD")]
    InvalidAsOf { value: String },

    #[error("No committed snapshot: load campaigns, events and subscriptions first")]
    SnapshotNotLoaded,

    #[error("Integrity gate refused computation: {violations} violation(s)")]
    IntegrityGate { violations: i64 },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type KpiResult<T> = Result<T, KpiError>;
