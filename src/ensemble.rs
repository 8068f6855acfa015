//! Tree-ensemble classifiers loaded from JSON model files.
//!
//! Two ensemble kinds share one file format:
//!
//! - `random_forest`: every leaf holds the positive-class fraction of its training
//!   samples; the probability is the mean over trees.
//! - `gradient_boosting`: every leaf holds a log-odds increment; the probability is
//!   `sigmoid(base_score + sum(leaves))`.
//!
//! ```json
//! {
//!   "kind": "gradient_boosting",
//!   "feature_names": ["amount","oldbalanceOrg","newbalanceOrig","oldbalanceDest","newbalanceDest"],
//!   "split": "lt",
//!   "base_score": -0.5,
//!   "trees": [
//!     { "nodes": [
//!         {"feature": 2, "threshold": 1.0, "left": 1, "right": 2, "cover": 1000.0},
//!         {"leaf": 2.2, "cover": 400.0},
//!         {"leaf": -1.8, "cover": 600.0}
//!     ] }
//!   ]
//! }
//! ```
//!
//! Node 0 is the root and children always sit at a higher index than their parent,
//! so a validated tree cannot loop.

use crate::models::{FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Probability at or above which a transaction is labelled fraud.
pub const DECISION_THRESHOLD: f64 = 0.5;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to read model file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse model JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid model: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnsembleKind {
    RandomForest,
    GradientBoosting,
}

/// Comparison used at split nodes to send a row to the left child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitRule {
    /// `x <= threshold` goes left
    #[default]
    Le,
    /// `x < threshold` goes left
    Lt,
}

impl SplitRule {
    pub fn goes_left(&self, value: f64, threshold: f64) -> bool {
        match self {
            SplitRule::Le => value <= threshold,
            SplitRule::Lt => value < threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        #[serde(default)]
        cover: f64,
    },
    Leaf {
        leaf: f64,
        #[serde(default)]
        cover: f64,
    },
}

impl Node {
    pub fn cover(&self) -> f64 {
        match self {
            Node::Split { cover, .. } | Node::Leaf { cover, .. } => *cover,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    /// Walk from the root to the leaf this row lands in.
    pub fn leaf_value(&self, x: &FeatureVector, split: SplitRule) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { leaf, .. } => return *leaf,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    idx = if split.goes_left(x[*feature], *threshold) {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    fn validate(&self, tree_idx: usize) -> Result<(), ModelError> {
        if self.nodes.is_empty() {
            return Err(ModelError::Invalid(format!("tree {} has no nodes", tree_idx)));
        }
        for (i, node) in self.nodes.iter().enumerate() {
            if let Node::Split {
                feature,
                left,
                right,
                threshold,
                ..
            } = node
            {
                if *feature >= FEATURE_COUNT {
                    return Err(ModelError::Invalid(format!(
                        "tree {} node {}: feature index {} out of range",
                        tree_idx, i, feature
                    )));
                }
                if !threshold.is_finite() {
                    return Err(ModelError::Invalid(format!(
                        "tree {} node {}: non-finite threshold",
                        tree_idx, i
                    )));
                }
                for child in [*left, *right] {
                    if child <= i || child >= self.nodes.len() {
                        return Err(ModelError::Invalid(format!(
                            "tree {} node {}: bad child index {}",
                            tree_idx, i, child
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// A validated tree ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEnsemble {
    pub kind: EnsembleKind,
    pub feature_names: Vec<String>,
    #[serde(default)]
    pub split: SplitRule,
    #[serde(default)]
    pub base_score: f64,
    pub trees: Vec<Tree>,
}

impl TreeEnsemble {
    pub fn from_json(text: &str) -> Result<Self, ModelError> {
        let model: TreeEnsemble = serde_json::from_str(text)?;
        model.validate()?;
        Ok(model)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let model = Self::from_json(&text)?;
        info!(
            path = %path.display(),
            kind = ?model.kind,
            trees = model.trees.len(),
            "Model loaded"
        );
        Ok(model)
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.feature_names.len() != FEATURE_COUNT
            || self
                .feature_names
                .iter()
                .zip(FEATURE_NAMES.iter())
                .any(|(got, want)| got != want)
        {
            return Err(ModelError::Invalid(format!(
                "feature_names must be {:?}, got {:?}",
                FEATURE_NAMES, self.feature_names
            )));
        }
        if self.trees.is_empty() {
            return Err(ModelError::Invalid("model has no trees".to_string()));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(i)?;
        }
        Ok(())
    }

    /// Raw model output: mean leaf fraction for forests, log-odds for boosting.
    pub fn margin(&self, x: &FeatureVector) -> f64 {
        let sum: f64 = self.trees.iter().map(|t| t.leaf_value(x, self.split)).sum();
        match self.kind {
            EnsembleKind::RandomForest => sum / self.trees.len() as f64,
            EnsembleKind::GradientBoosting => self.base_score + sum,
        }
    }

    /// Positive-class probability in [0, 1].
    pub fn predict_proba(&self, x: &FeatureVector) -> f64 {
        let m = self.margin(x);
        match self.kind {
            EnsembleKind::RandomForest => m.clamp(0.0, 1.0),
            EnsembleKind::GradientBoosting => sigmoid(m),
        }
    }

    /// Returns `(label, probability)`.
    pub fn classify(&self, x: &FeatureVector) -> (u8, f64) {
        let p = self.predict_proba(x);
        (label_for(p), p)
    }
}

pub fn label_for(probability: f64) -> u8 {
    u8::from(probability >= DECISION_THRESHOLD)
}

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}
