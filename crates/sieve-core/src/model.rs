//! Bag-of-features linear classifier over token ids.
//!
//! A model is a vocabulary plus one bias and one weight row per output class.
//! Scoring sums the weight of every non-padding token for each class and
//! softmax-normalizes the sums. Nothing in a `Model` changes after load, so a
//! single instance is shared read-only by every concurrent caller.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_SEQUENCE_LENGTH, HAM_CLASS, MAX_SEQUENCE_LENGTH, SPAM_CLASS};
use crate::error::{CoreError, Result};
use crate::vocab::{TokenId, TokenVector, Vocabulary};

pub const MODEL_FORMAT_VERSION: u32 = 1;

static BUNDLED_JSON: &str = include_str!("../assets/model.json");

static BUNDLED: LazyLock<Option<Arc<Model>>> = LazyLock::new(|| match Model::from_json(BUNDLED_JSON) {
    Ok(model) => {
        tracing::info!(
            "loaded bundled model: {} classes, {} vocabulary entries",
            model.classes.len(),
            model.vocabulary.len()
        );
        Some(Arc::new(model))
    }
    Err(e) => {
        tracing::warn!("bundled model failed to load: {e}");
        None
    }
});

fn default_sequence_length() -> usize {
    DEFAULT_SEQUENCE_LENGTH
}

/// On-disk model bundle.
#[derive(Serialize, Deserialize, Debug)]
pub struct ModelBundle {
    pub version: u32,
    #[serde(default = "default_sequence_length")]
    pub sequence_length: usize,
    pub classes: Vec<String>,
    pub bias: Vec<f64>,
    pub vocabulary: HashMap<String, TokenId>,
    /// `weights[class][token_id]`
    pub weights: Vec<Vec<f64>>,
}

/// Output of scoring one token vector.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassificationResult {
    /// One probability per model class, in `Model::classes()` order.
    pub probabilities: Vec<f64>,
    pub spam_index: usize,
    pub ham_index: usize,
    /// Number of non-padding tokens that contributed to the scores.
    pub evidence: usize,
}

impl ClassificationResult {
    pub fn spam_probability(&self) -> f64 {
        self.probabilities.get(self.spam_index).copied().unwrap_or(0.0)
    }

    pub fn ham_probability(&self) -> f64 {
        self.probabilities.get(self.ham_index).copied().unwrap_or(0.0)
    }

    /// Index of the most probable class; ties go to the lower index.
    pub fn top_index(&self) -> usize {
        let mut best = 0;
        for (i, p) in self.probabilities.iter().enumerate() {
            if *p > self.probabilities[best] {
                best = i;
            }
        }
        best
    }
}

#[derive(Debug)]
pub struct Model {
    vocabulary: Vocabulary,
    sequence_length: usize,
    classes: Vec<String>,
    bias: Vec<f64>,
    weights: Vec<Vec<f64>>,
    spam_index: usize,
    ham_index: usize,
}

impl Model {
    /// The model compiled into the binary, parsed once per process.
    /// `None` if the embedded asset is unusable.
    pub fn bundled() -> Option<Arc<Model>> {
        BUNDLED.clone()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let bundle: ModelBundle = serde_json::from_str(json)?;
        Self::from_bundle(bundle)
    }

    pub fn from_bundle(bundle: ModelBundle) -> Result<Self> {
        if bundle.version != MODEL_FORMAT_VERSION {
            return Err(CoreError::InvalidModel(format!(
                "unsupported model version {} (expected {MODEL_FORMAT_VERSION})",
                bundle.version
            )));
        }
        if !(1..=MAX_SEQUENCE_LENGTH).contains(&bundle.sequence_length) {
            return Err(CoreError::InvalidModel(format!(
                "sequence_length {} outside 1..={MAX_SEQUENCE_LENGTH}",
                bundle.sequence_length
            )));
        }

        let class_index = |label: &str| {
            bundle
                .classes
                .iter()
                .position(|c| c == label)
                .ok_or_else(|| CoreError::InvalidModel(format!("missing class '{label}'")))
        };
        let spam_index = class_index(SPAM_CLASS)?;
        let ham_index = class_index(HAM_CLASS)?;

        let vocabulary = Vocabulary::new(bundle.vocabulary)?;
        let width = vocabulary.max_id() as usize + 1;

        if bundle.bias.len() != bundle.classes.len() {
            return Err(CoreError::InvalidModel(format!(
                "bias has {} entries for {} classes",
                bundle.bias.len(),
                bundle.classes.len()
            )));
        }
        if bundle.weights.len() != bundle.classes.len() {
            return Err(CoreError::InvalidModel(format!(
                "weights has {} rows for {} classes",
                bundle.weights.len(),
                bundle.classes.len()
            )));
        }
        for (class, row) in bundle.classes.iter().zip(&bundle.weights) {
            if row.len() != width {
                return Err(CoreError::InvalidModel(format!(
                    "weight row '{class}' has {} columns, vocabulary needs {width}",
                    row.len()
                )));
            }
        }
        let all_finite = bundle
            .bias
            .iter()
            .chain(bundle.weights.iter().flatten())
            .all(|w| w.is_finite());
        if !all_finite {
            return Err(CoreError::InvalidModel("non-finite weight".into()));
        }
        // Largest score magnitude any token vector can reach.
        for ((class, bias), row) in bundle.classes.iter().zip(&bundle.bias).zip(&bundle.weights) {
            let widest = row.iter().fold(0.0f64, |m, w| m.max(w.abs()));
            let bound = bias.abs() + bundle.sequence_length as f64 * widest;
            if !bound.is_finite() {
                return Err(CoreError::InvalidModel(format!(
                    "class '{class}' score can overflow over {} tokens",
                    bundle.sequence_length
                )));
            }
        }

        Ok(Self {
            vocabulary,
            sequence_length: bundle.sequence_length,
            classes: bundle.classes,
            bias: bundle.bias,
            weights: bundle.weights,
            spam_index,
            ham_index,
        })
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn sequence_length(&self) -> usize {
        self.sequence_length
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Vectorize `text` to this model's sequence length.
    pub fn tokenize(&self, text: &str) -> TokenVector {
        self.vocabulary.vectorize(text, self.sequence_length)
    }

    /// Score a token vector into a probability distribution over `classes()`.
    ///
    /// Padding ids are skipped. Ids outside the weight matrix (a vector built
    /// against a different vocabulary) score as OOV.
    pub fn classify(&self, tokens: &TokenVector) -> ClassificationResult {
        let pad = self.vocabulary.pad_id();
        let oov = self.vocabulary.oov_id() as usize;
        let mut scores = self.bias.clone();
        let mut evidence = 0;

        for &id in tokens.ids() {
            if id == pad {
                continue;
            }
            evidence += 1;
            for (score, row) in scores.iter_mut().zip(&self.weights) {
                *score += row.get(id as usize).copied().unwrap_or(row[oov]);
            }
        }

        ClassificationResult {
            probabilities: softmax(&scores),
            spam_index: self.spam_index,
            ham_index: self.ham_index,
            evidence,
        }
    }
}

/// Numerically stable softmax. An empty input yields an empty output.
///
/// Infinite scores are clamped to the finite range and NaN ranks lowest, so
/// the output is always a distribution.
pub fn softmax(scores: &[f64]) -> Vec<f64> {
    let finite: Vec<f64> = scores
        .iter()
        .map(|&s| if s.is_nan() { f64::MIN } else { s.clamp(f64::MIN, f64::MAX) })
        .collect();
    let max = finite.iter().copied().fold(f64::MIN, f64::max);
    let exps: Vec<f64> = finite.iter().map(|s| (s - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
