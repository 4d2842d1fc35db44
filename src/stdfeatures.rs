//! The standard feature set, built from configuration.

use crate::error::{FlmError, Result};
use crate::feature::baseformatting::{self, BaseFormattingFeature};
use crate::feature::citations::{self, CitationProvider, CitationsFeature};
use crate::feature::defterm::{self, DefTermFeature};
use crate::feature::endnotes::{self, EndnotesFeature};
use crate::feature::enumeration::{self, EnumerationFeature};
use crate::feature::floats::{self, FloatsFeature};
use crate::feature::headings::{self, HeadingsFeature};
use crate::feature::math::{self, MathFeature};
use crate::feature::refs::{self, RefResolver, RefsFeature};
use crate::feature::theorems::{self, TheoremsFeature};
use crate::feature::Feature;
use flm_config::FlmConfig;
use std::sync::Arc;

pub const STANDARD_FEATURE_NAMES: [&str; 10] = [
    baseformatting::FEATURE_NAME,
    headings::FEATURE_NAME,
    refs::FEATURE_NAME,
    endnotes::FEATURE_NAME,
    citations::FEATURE_NAME,
    floats::FEATURE_NAME,
    enumeration::FEATURE_NAME,
    math::FEATURE_NAME,
    defterm::FEATURE_NAME,
    theorems::FEATURE_NAME,
];

/// Standard features enabled in `config`, without citation providers or external
/// reference resolvers.
pub fn standard_features(config: &FlmConfig) -> Result<Vec<Arc<dyn Feature>>> {
    standard_features_with(config, Vec::new(), Vec::new())
}

pub fn standard_features_with(
    config: &FlmConfig,
    citation_providers: Vec<Arc<dyn CitationProvider>>,
    ref_resolvers: Vec<Arc<dyn RefResolver>>,
) -> Result<Vec<Arc<dyn Feature>>> {
    let mut features: Vec<Arc<dyn Feature>> = Vec::with_capacity(config.features.enabled.len());
    for name in &config.features.enabled {
        let feature: Arc<dyn Feature> = match name.as_str() {
            baseformatting::FEATURE_NAME => Arc::new(BaseFormattingFeature::new()),
            headings::FEATURE_NAME => Arc::new(HeadingsFeature::from_config(&config.headings)),
            refs::FEATURE_NAME => {
                let mut feature = RefsFeature::new();
                for resolver in &ref_resolvers {
                    feature = feature.with_resolver(resolver.clone());
                }
                Arc::new(feature)
            }
            endnotes::FEATURE_NAME => Arc::new(EndnotesFeature::from_config(&config.endnotes)?),
            citations::FEATURE_NAME => Arc::new(CitationsFeature::from_config(
                &config.citations,
                citation_providers.clone(),
            )?),
            floats::FEATURE_NAME => Arc::new(FloatsFeature::from_config(&config.floats)?),
            enumeration::FEATURE_NAME => {
                Arc::new(EnumerationFeature::from_config(&config.enumeration)?)
            }
            math::FEATURE_NAME => Arc::new(MathFeature::from_config(&config.math)?),
            defterm::FEATURE_NAME => Arc::new(DefTermFeature::from_config(&config.defterm)),
            theorems::FEATURE_NAME => Arc::new(TheoremsFeature::from_config(&config.theorems)?),
            other => {
                return Err(FlmError::configuration(format!(
                    "Unknown standard feature ‘{}’; expected one of {}",
                    other,
                    STANDARD_FEATURE_NAMES.join(", ")
                )))
            }
        };
        log::debug!("standard feature ‘{}’ enabled", name);
        features.push(feature);
    }
    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_all_defaults_enabled() {
        let config = flm_config::load_defaults().unwrap();
        let features = standard_features(&config).unwrap();
        let names: Vec<&str> = features.iter().map(|f| f.name()).collect();
        assert_eq!(names, STANDARD_FEATURE_NAMES.to_vec());
    }

    #[test]
    fn test_subset_and_unknown() {
        let mut config = flm_config::load_defaults().unwrap();
        config.features.enabled = vec!["math".to_string(), "refs".to_string()];
        let features = standard_features(&config).unwrap();
        assert_eq!(features.len(), 2);

        config.features.enabled.push("axioms".to_string());
        let err = standard_features(&config).unwrap_err();
        assert!(err.to_string().starts_with("Unknown standard feature ‘axioms’"));
    }
}
