use thiserror::Error;

#[derive(Debug, Error)]
pub enum PredictorError {
    #[error("{field} = {value} is outside {min}..={max}")]
    InvalidInput {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("scale bounds: {0}")]
    Bounds(String),
    #[error("model meta: {0}")]
    Meta(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("model returned {got} values, expected 1")]
    OutputShape { got: usize },
}

impl PredictorError {
    /// Caller-side mistakes as opposed to model or setup failures.
    pub fn is_input(&self) -> bool {
        matches!(self, Self::InvalidInput { .. })
    }
}
