//! Acoustic feature registry and training settings
//!
//! Feature names follow the analyzer's low-level descriptor naming. Every
//! name has a fixed dimensionality; vectors of any other length are rejected
//! at training time.

/// (name, dimension count) for every recognized feature
pub const FEATURE_DEFS: &[(&str, usize)] = &[
    ("spectral_energyband_high.mean", 1),
    ("spectral_energyband_low.mean", 1),
    ("spectral_rolloff.median", 1),
    ("spectral_centroid.mean", 1),
    ("spectral_contrast_valleys.var", 6),
    ("erbbands.mean", 40),
    ("barkbands.mean", 27),
    ("gfcc.mean", 13),
    ("mfcc.mean", 13),
    ("average_loudness", 1),
];

/// Dimensionality of a registered feature, `None` for unknown names
pub fn feature_dimension(name: &str) -> Option<usize> {
    FEATURE_DEFS
        .iter()
        .find(|(def_name, _)| *def_name == name)
        .map(|(_, dimensions)| *dimensions)
}

/// Whether a feature name is in the registry
pub fn is_registered_feature(name: &str) -> bool {
    feature_dimension(name).is_some()
}

/// Per-feature training weight
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureSettings {
    pub weight: f64,
}

/// Ordered feature selection; iteration order defines the layout of the
/// concatenated input vectors
pub type FeatureSettingsMap = Vec<(String, FeatureSettings)>;

/// Knobs of a training run
#[derive(Debug, Clone)]
pub struct TrainSettings {
    pub iteration_count: usize,
    pub samples_per_neuron: usize,
    pub feature_settings: FeatureSettingsMap,
}

impl Default for TrainSettings {
    fn default() -> Self {
        Self {
            iteration_count: 10,
            samples_per_neuron: 4,
            feature_settings: default_feature_settings(),
        }
    }
}

impl TrainSettings {
    /// Total dimension of the concatenated input vectors
    pub fn total_dimensions(&self) -> usize {
        self.feature_settings
            .iter()
            .filter_map(|(name, _)| feature_dimension(name))
            .sum()
    }
}

fn default_feature_settings() -> FeatureSettingsMap {
    [
        "spectral_energyband_high.mean",
        "spectral_rolloff.median",
        "spectral_contrast_valleys.var",
        "erbbands.mean",
        "gfcc.mean",
    ]
    .iter()
    .map(|name| (name.to_string(), FeatureSettings { weight: 1.0 }))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lookup() {
        assert_eq!(feature_dimension("erbbands.mean"), Some(40));
        assert_eq!(feature_dimension("gfcc.mean"), Some(13));
        assert_eq!(feature_dimension("no_such_feature"), None);
        assert!(is_registered_feature("average_loudness"));
    }

    #[test]
    fn test_default_train_settings() {
        let settings = TrainSettings::default();
        assert_eq!(settings.iteration_count, 10);
        assert_eq!(settings.samples_per_neuron, 4);
        assert_eq!(settings.feature_settings.len(), 5);
        // 1 + 1 + 6 + 40 + 13
        assert_eq!(settings.total_dimensions(), 61);
    }
}
