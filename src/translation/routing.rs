/*!
 * Static routing of target languages to providers.
 *
 * A language may be pinned to one provider; every other language goes to the
 * primary provider. The fallback list follows in configured order, and the
 * primary provider always closes the chain when it was displaced by a pin.
 */

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::app_config::{TranslationConfig, TranslationProvider};
use crate::language_utils;
use crate::providers::{create_backend, TranslationBackend};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingTable {
    primary: TranslationProvider,
    fallbacks: Vec<TranslationProvider>,
    pinned: BTreeMap<String, TranslationProvider>,
}

impl RoutingTable {
    pub fn new(
        primary: TranslationProvider,
        fallbacks: Vec<TranslationProvider>,
        pinned: BTreeMap<String, TranslationProvider>,
    ) -> Self {
        Self {
            primary,
            fallbacks,
            pinned,
        }
    }

    pub fn from_config(config: &TranslationConfig) -> Self {
        Self::new(
            config.provider,
            config.fallback_providers.clone(),
            config.routing.clone(),
        )
    }

    /// Provider pinned to a language, if any
    pub fn pinned_provider(&self, target_language: &str) -> Option<TranslationProvider> {
        self.pinned
            .iter()
            .find(|(language, _)| {
                language.eq_ignore_ascii_case(target_language)
                    || language_utils::language_codes_match(language, target_language)
            })
            .map(|(_, provider)| *provider)
    }

    /// Ordered, de-duplicated provider chain for a target language
    pub fn chain(&self, target_language: &str) -> Vec<TranslationProvider> {
        let first = self.pinned_provider(target_language).unwrap_or(self.primary);

        let mut chain = vec![first];
        for provider in self.fallbacks.iter().chain(std::iter::once(&self.primary)) {
            if !chain.contains(provider) {
                chain.push(*provider);
            }
        }
        chain
    }

    /// Instantiate the backend chain for a target language
    pub fn backends(
        &self,
        target_language: &str,
        config: &TranslationConfig,
        source_language: &str,
    ) -> Vec<Arc<dyn TranslationBackend>> {
        self.chain(target_language)
            .into_iter()
            .map(|provider| create_backend(provider, config, source_language))
            .collect()
    }
}
