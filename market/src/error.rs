use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForecastError {
    #[error("insufficient data: need {required} points, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("model failed to converge: {0}")]
    ModelConvergence(String),

    #[error("invalid price {price} at index {index}")]
    InvalidPrice { index: usize, price: f64 },
}
