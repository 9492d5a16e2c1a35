use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::warn;

use crate::error::{FakelensError, Result};

/// Output class of the binary classifier.
///
/// The model emits the probability of `Positive` (index 1). Without a label
/// map on disk, `Negative` is named "fake" and `Positive` "real".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryClass {
    Negative,
    Positive,
}

impl BinaryClass {
    pub fn index(&self) -> u8 {
        match self {
            BinaryClass::Negative => 0,
            BinaryClass::Positive => 1,
        }
    }

    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(BinaryClass::Negative),
            1 => Some(BinaryClass::Positive),
            _ => None,
        }
    }

    /// Pick the class for a positive-class probability. Ties go positive.
    pub fn from_probability(probability: f64, threshold: f64) -> Self {
        if probability >= threshold {
            BinaryClass::Positive
        } else {
            BinaryClass::Negative
        }
    }

    /// Probability mass the model assigned to this class.
    pub fn confidence(&self, probability: f64) -> f64 {
        match self {
            BinaryClass::Positive => probability,
            BinaryClass::Negative => 1.0 - probability,
        }
    }

    fn default_label(&self) -> &'static str {
        match self {
            BinaryClass::Negative => "fake",
            BinaryClass::Positive => "real",
        }
    }
}

impl fmt::Display for BinaryClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

/// Human-readable names for the two classes, fixed at training time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMap {
    negative: String,
    positive: String,
}

impl Default for LabelMap {
    fn default() -> Self {
        Self {
            negative: BinaryClass::Negative.default_label().to_string(),
            positive: BinaryClass::Positive.default_label().to_string(),
        }
    }
}

impl LabelMap {
    pub fn new(negative: impl Into<String>, positive: impl Into<String>) -> Self {
        Self {
            negative: negative.into(),
            positive: positive.into(),
        }
    }

    pub fn label(&self, class: BinaryClass) -> &str {
        match class {
            BinaryClass::Negative => &self.negative,
            BinaryClass::Positive => &self.positive,
        }
    }

    /// Build from the on-disk `{"0": "...", "1": "..."}` form.
    ///
    /// A missing index keeps its default label; any other key is rejected.
    pub fn from_json_map(raw: &BTreeMap<String, String>) -> Result<Self> {
        let mut map = Self::default();
        for (key, label) in raw {
            let class = key
                .trim()
                .parse::<u8>()
                .ok()
                .and_then(BinaryClass::from_index)
                .ok_or_else(|| {
                    FakelensError::Validation(format!(
                        "label map key {key:?} is not a binary class index (0 or 1)"
                    ))
                })?;
            match class {
                BinaryClass::Negative => map.negative = label.clone(),
                BinaryClass::Positive => map.positive = label.clone(),
            }
        }
        Ok(map)
    }

    pub fn to_json_map(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("0".to_string(), self.negative.clone()),
            ("1".to_string(), self.positive.clone()),
        ])
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        let raw: BTreeMap<String, String> = serde_json::from_str(&content)?;
        Self::from_json_map(&raw)
    }

    /// Load the label map, falling back to the defaults when the file is absent.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(
                "Label map {} not found, using defaults {{0: fake, 1: real}}",
                path.display()
            );
            return Ok(Self::default());
        }
        Self::from_file(path)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let payload = serde_json::to_string_pretty(&self.to_json_map())?;
        std::fs::write(path, payload)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir()
            .join(format!("fakelens-labels-{}", uuid::Uuid::new_v4()))
            .join(name)
    }

    #[test]
    fn test_threshold_boundary() {
        assert_eq!(BinaryClass::from_probability(0.5, 0.5), BinaryClass::Positive);
        assert_eq!(BinaryClass::from_probability(0.4999, 0.5), BinaryClass::Negative);
        assert_eq!(BinaryClass::from_probability(1.0, 0.5), BinaryClass::Positive);
        assert_eq!(BinaryClass::from_probability(0.0, 0.5), BinaryClass::Negative);
    }

    #[test]
    fn test_confidence_is_mass_of_chosen_class() {
        for p in [0.0, 0.1, 0.3, 0.4999, 0.5, 0.51, 0.83, 1.0] {
            let class = BinaryClass::from_probability(p, 0.5);
            let confidence = class.confidence(p);
            assert!(confidence >= 0.5, "p={p} gave confidence {confidence}");
        }
        assert!((BinaryClass::Negative.confidence(0.17) - 0.83).abs() < 1e-12);
    }

    #[test]
    fn test_default_labels() {
        let map = LabelMap::default();
        assert_eq!(map.label(BinaryClass::Negative), "fake");
        assert_eq!(map.label(BinaryClass::Positive), "real");
    }

    #[test]
    fn test_save_then_load_reproduces_mapping() {
        let path = temp_path("classes.json");
        let map = LabelMap::new("ai_generated", "photo");
        map.save(&path).unwrap();

        let loaded = LabelMap::load_or_default(&path).unwrap();
        assert_eq!(loaded, map);
        assert_eq!(loaded.label(BinaryClass::Positive), "photo");

        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let map = LabelMap::load_or_default(temp_path("absent.json")).unwrap();
        assert_eq!(map, LabelMap::default());
    }

    #[test]
    fn test_partial_map_keeps_default_for_missing_index() {
        let raw = BTreeMap::from([("1".to_string(), "genuine".to_string())]);
        let map = LabelMap::from_json_map(&raw).unwrap();
        assert_eq!(map.label(BinaryClass::Negative), "fake");
        assert_eq!(map.label(BinaryClass::Positive), "genuine");
    }

    #[test]
    fn test_extra_index_rejected() {
        let raw = BTreeMap::from([
            ("0".to_string(), "fake".to_string()),
            ("1".to_string(), "real".to_string()),
            ("2".to_string(), "unknown".to_string()),
        ]);
        assert!(LabelMap::from_json_map(&raw).is_err());
    }

    #[test]
    fn test_json_keys_are_string_indices() {
        let json = serde_json::to_string(&LabelMap::default().to_json_map()).unwrap();
        assert_eq!(json, r#"{"0":"fake","1":"real"}"#);
    }
}
