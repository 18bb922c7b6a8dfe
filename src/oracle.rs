// Optional predictive augmentation

use anyhow::Result;
use serde::Serialize;

/// One predicted consequence: an effect key in `file:<path>` form and the
/// strength of the prediction.
#[derive(Debug, Clone)]
pub struct Prediction {
    pub effect_key: String,
    pub strength: f64,
}

/// Capability seam for an external predictive collaborator.
///
/// Subjects use the `file:<path>` convention. The engine validates every
/// predicted effect against the indexed file set before using it, and any
/// failure degrades the impact query to graph-only results.
pub trait ConsequenceOracle {
    fn predict_consequence(&self, subject_key: &str) -> Result<Vec<Prediction>>;
}

/// Default oracle: predicts nothing, never fails
pub struct NoopOracle;

impl ConsequenceOracle for NoopOracle {
    fn predict_consequence(&self, _subject_key: &str) -> Result<Vec<Prediction>> {
        Ok(Vec::new())
    }
}

/// How the oracle participated in one impact query
#[derive(Debug, Clone, Serialize)]
pub struct OracleSummary {
    pub enabled: bool,
    pub error: Option<String>,
    pub predicted_files: Vec<String>,
}

impl OracleSummary {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            error: None,
            predicted_files: Vec::new(),
        }
    }
}
