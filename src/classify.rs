// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Classifier contract and folder assignment
//!
//! The classifier itself is an opaque scoring service behind the
//! [`TaggingService`] trait; everything here that makes organizational
//! decisions (category buckets, folder names) is deterministic.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::Path;

use crate::Result;

/// One ranked prediction from the classifier
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredLabel {
    pub label: String,
    /// Confidence in [0, 1]
    pub confidence: f64,
}

impl ScoredLabel {
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// External classifier: given an image, returns labels ordered by
/// descending confidence, possibly empty. Implementations must not
/// block indefinitely; the HTTP adapter bounds its requests with a
/// timeout.
#[async_trait]
pub trait TaggingService: Send + Sync {
    async fn classify(&self, path: &Path, threshold: f64) -> Result<Vec<ScoredLabel>>;
}

/// Keyword table mapping fine-grained labels to the coarse categories
/// preferred as folder names. Categories are tried in order; a label
/// belongs to the first one with a matching keyword.
#[derive(Debug, Clone)]
pub struct CategoryMap {
    categories: Vec<(String, Vec<String>)>,
}

impl CategoryMap {
    pub fn new(categories: Vec<(String, Vec<String>)>) -> Self {
        Self { categories }
    }

    /// The coarse bucket a label belongs to, if any. A label equal to
    /// a category name counts as a direct hit.
    pub fn categorize(&self, label: &str) -> Option<&str> {
        let label = label.to_lowercase();
        if let Some((cat, _)) = self
            .categories
            .iter()
            .find(|(cat, _)| cat.eq_ignore_ascii_case(&label))
        {
            return Some(cat);
        }
        self.categories
            .iter()
            .find(|(_, terms)| terms.iter().any(|t| label.contains(t.as_str())))
            .map(|(cat, _)| cat.as_str())
    }

    /// Pick the destination folder for labels ordered by descending
    /// confidence: the first label that maps to a priority category
    /// wins; otherwise the top label itself, title-cased; otherwise
    /// "Uncategorized" when nothing cleared the threshold.
    pub fn assign_folder(&self, labels: &[ScoredLabel]) -> String {
        for scored in labels {
            if let Some(category) = self.categorize(&scored.label) {
                return category.to_string();
            }
        }
        match labels.first() {
            Some(top) => title_case(&top.label),
            None => "Uncategorized".to_string(),
        }
    }

    /// Flatten predictions into tags: every label, plus the coarse
    /// category of labels confident enough to trust the bucket
    pub fn labels_to_tags(&self, labels: &[ScoredLabel]) -> BTreeSet<String> {
        let mut tags = BTreeSet::new();
        for scored in labels {
            tags.insert(scored.label.clone());
            if scored.confidence > CATEGORY_TAG_CONFIDENCE {
                if let Some(category) = self.categorize(&scored.label) {
                    tags.insert(category.to_string());
                }
            }
        }
        tags
    }
}

/// Confidence above which a label's coarse category is added as an
/// extra tag alongside the label itself
const CATEGORY_TAG_CONFIDENCE: f64 = 0.05;

impl Default for CategoryMap {
    fn default() -> Self {
        let table: &[(&str, &[&str])] = &[
            (
                "Military",
                &[
                    "tank", "cannon", "artillery", "missile", "projectile", "weapon", "rifle",
                    "gun", "firearm", "soldier", "uniform", "camouflage", "mortar", "howitzer",
                    "rocket", "grenade", "warplane", "fighter", "bomber", "aircraft",
                    "helicopter", "carrier", "submarine", "warship", "battleship", "destroyer",
                    "frigate", "jeep", "humvee", "armored", "radar", "antenna", "radio",
                    "satellite",
                ],
            ),
            (
                "Electronics",
                &[
                    "screen", "monitor", "computer", "keyboard", "mouse", "laptop", "server",
                    "circuit", "chip", "processor", "robot", "drone", "sensor", "camera", "lens",
                    "cable", "wire", "battery", "charger", "plug", "socket", "switch", "console",
                ],
            ),
            (
                "Vehicles",
                &[
                    "car", "truck", "bus", "train", "bicycle", "motorcycle", "boat", "ship",
                    "liner", "yacht", "vehicle", "wheel", "tire", "engine", "motor",
                ],
            ),
            (
                "Construction",
                &[
                    "crane", "drill", "hammer", "tool", "wrench", "screwdriver", "pliers",
                    "helmet", "vest", "ladder", "scaffold", "concrete", "brick", "building",
                ],
            ),
            (
                "Nature",
                &[
                    "mountain", "beach", "forest", "tree", "flower", "grass", "sky", "cloud",
                    "sunset", "sunrise", "river", "lake", "ocean", "sea", "water", "sand",
                ],
            ),
            (
                "Animals",
                &[
                    "dog", "cat", "bird", "horse", "cow", "sheep", "wildlife", "pet", "animal",
                    "fish", "insect", "reptile", "amphibian",
                ],
            ),
            (
                "People",
                &[
                    "person", "man", "woman", "child", "girl", "boy", "face", "portrait",
                    "crowd", "group", "people", "human",
                ],
            ),
        ];
        Self::new(
            table
                .iter()
                .map(|(cat, terms)| {
                    (
                        cat.to_string(),
                        terms.iter().map(|t| t.to_string()).collect(),
                    )
                })
                .collect(),
        )
    }
}

/// Title-case a label for use as a folder name ("fire engine" ->
/// "Fire Engine")
pub fn title_case(label: &str) -> String {
    label
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
