//! Per-feature attribution for the boosted model.
//!
//! Exact path-dependent TreeSHAP (Lundberg et al., Algorithm 2) computed over every
//! tree, using node covers as the background distribution. Values are in the same
//! log-odds space as [`TreeEnsemble::margin`], so for any row
//! `expected_value() + sum(shap_values(x)) == margin(x)`.

use crate::ensemble::{Node, SplitRule, Tree, TreeEnsemble};
use crate::models::{FeatureImpact, FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
struct PathElement {
    feature: Option<usize>,
    zero_fraction: f64,
    one_fraction: f64,
    weight: f64,
}

pub struct TreeExplainer {
    model: Arc<TreeEnsemble>,
    expected_value: f64,
}

impl TreeExplainer {
    pub fn new(model: Arc<TreeEnsemble>) -> Self {
        let expected_value =
            model.base_score + model.trees.iter().map(tree_expected_value).sum::<f64>();
        Self {
            model,
            expected_value,
        }
    }

    /// Baseline margin the attributions are measured against.
    pub fn expected_value(&self) -> f64 {
        self.expected_value
    }

    pub fn shap_values(&self, x: &FeatureVector) -> FeatureVector {
        let mut phi = [0.0; FEATURE_COUNT];
        for tree in &self.model.trees {
            recurse(tree, self.model.split, x, 0, &[], 1.0, 1.0, None, &mut phi);
        }
        phi
    }

    /// Attributions paired with feature names, largest magnitude first.
    pub fn explain(&self, x: &FeatureVector) -> Vec<FeatureImpact> {
        rank(self.shap_values(x))
    }
}

pub fn rank(phi: FeatureVector) -> Vec<FeatureImpact> {
    let mut ranked: Vec<FeatureImpact> = FEATURE_NAMES
        .iter()
        .zip(phi)
        .map(|(name, impact)| FeatureImpact {
            feature: name.to_string(),
            impact,
        })
        .collect();
    ranked.sort_by(|a, b| b.impact.abs().total_cmp(&a.impact.abs()));
    ranked
}

fn tree_expected_value(tree: &Tree) -> f64 {
    let root_cover = tree.nodes[0].cover();
    if root_cover <= 0.0 {
        return 0.0;
    }
    tree.nodes
        .iter()
        .filter_map(|n| match n {
            Node::Leaf { leaf, cover } => Some(leaf * cover / root_cover),
            Node::Split { .. } => None,
        })
        .sum()
}

#[allow(clippy::too_many_arguments)]
fn recurse(
    tree: &Tree,
    split: SplitRule,
    x: &FeatureVector,
    node_idx: usize,
    parent_path: &[PathElement],
    zero_fraction: f64,
    one_fraction: f64,
    feature: Option<usize>,
    phi: &mut FeatureVector,
) {
    let path = extend(parent_path, zero_fraction, one_fraction, feature);

    match &tree.nodes[node_idx] {
        Node::Leaf { leaf, .. } => {
            for i in 1..path.len() {
                let w: f64 = unwind(&path, i).iter().map(|e| e.weight).sum();
                let el = &path[i];
                if let Some(d) = el.feature {
                    phi[d] += w * (el.one_fraction - el.zero_fraction) * leaf;
                }
            }
        }
        Node::Split {
            feature: d,
            threshold,
            left,
            right,
            cover,
        } => {
            let (hot, cold) = if split.goes_left(x[*d], *threshold) {
                (*left, *right)
            } else {
                (*right, *left)
            };

            let mut path = path;
            let mut incoming_zero = 1.0;
            let mut incoming_one = 1.0;
            if let Some(k) = path.iter().position(|e| e.feature == Some(*d)) {
                incoming_zero = path[k].zero_fraction;
                incoming_one = path[k].one_fraction;
                path = unwind(&path, k);
            }

            let hot_ratio = cover_ratio(tree.nodes[hot].cover(), *cover);
            let cold_ratio = cover_ratio(tree.nodes[cold].cover(), *cover);

            recurse(
                tree,
                split,
                x,
                hot,
                &path,
                incoming_zero * hot_ratio,
                incoming_one,
                Some(*d),
                phi,
            );
            // An empty cold branch carries zero weight on every path below it.
            if incoming_zero * cold_ratio > 0.0 {
                recurse(
                    tree,
                    split,
                    x,
                    cold,
                    &path,
                    incoming_zero * cold_ratio,
                    0.0,
                    Some(*d),
                    phi,
                );
            }
        }
    }
}

fn cover_ratio(child: f64, parent: f64) -> f64 {
    if parent > 0.0 {
        child / parent
    } else {
        0.0
    }
}

fn extend(
    parent: &[PathElement],
    zero_fraction: f64,
    one_fraction: f64,
    feature: Option<usize>,
) -> Vec<PathElement> {
    let l = parent.len();
    let mut path = Vec::with_capacity(l + 1);
    path.extend_from_slice(parent);
    path.push(PathElement {
        feature,
        zero_fraction,
        one_fraction,
        weight: if l == 0 { 1.0 } else { 0.0 },
    });

    let denom = (l + 1) as f64;
    for i in (0..l).rev() {
        path[i + 1].weight += one_fraction * path[i].weight * (i + 1) as f64 / denom;
        path[i].weight = zero_fraction * path[i].weight * (l - i) as f64 / denom;
    }
    path
}

/// Undo the extension of element `i`, returning a path one element shorter.
fn unwind(path: &[PathElement], i: usize) -> Vec<PathElement> {
    let l = path.len();
    let target = path[i];
    let mut out: Vec<PathElement> = path[..l - 1].to_vec();
    let mut next = path[l - 1].weight;
    let lf = l as f64;

    for j in (0..l - 1).rev() {
        let j1 = (j + 1) as f64;
        if target.one_fraction != 0.0 {
            let tmp = out[j].weight;
            out[j].weight = next * lf / (j1 * target.one_fraction);
            next = tmp - out[j].weight * target.zero_fraction * (lf - j1) / lf;
        } else {
            out[j].weight = out[j].weight * lf / (target.zero_fraction * (lf - j1));
        }
    }

    for j in i..l - 1 {
        out[j].feature = path[j + 1].feature;
        out[j].zero_fraction = path[j + 1].zero_fraction;
        out[j].one_fraction = path[j + 1].one_fraction;
    }
    out
}
