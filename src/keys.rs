//! API-key bookkeeping.
//!
//! Keys are read through an injectable lookup (the process environment in
//! production) so tests never touch real variables. Missing keys are
//! reported together, before any network call is made.

use crate::error::{ErrorKind, PortalError, Result};
use std::collections::BTreeMap;
use tracing::info;

const MASK_PREFIX: usize = 6;

/// Holds the API keys the portal may need.
#[derive(Clone, Default)]
pub struct ApiKeyManager {
    keys: BTreeMap<String, String>,
}

impl std::fmt::Debug for ApiKeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.keys.iter().map(|(k, v)| (k, mask(v))))
            .finish()
    }
}

impl ApiKeyManager {
    /// Read every variable in `names` through `lookup`; absent or empty ones are skipped.
    pub fn load<'a>(
        names: impl IntoIterator<Item = &'a str>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let mut keys = BTreeMap::new();
        for name in names {
            if let Some(value) = lookup(name).filter(|v| !v.trim().is_empty()) {
                keys.insert(name.to_string(), value);
            }
        }
        let manager = Self { keys };
        for (name, masked) in manager.masked() {
            info!("API key loaded: {}={}", name, masked);
        }
        manager
    }

    /// Fail with every name in `names` that has no key.
    pub fn require(&self, names: &[&str]) -> Result<()> {
        let mut missing: Vec<String> = names
            .iter()
            .filter(|n| !self.keys.contains_key(**n))
            .map(|n| n.to_string())
            .collect();
        missing.dedup();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PortalError::new(ErrorKind::MissingApiKeys { keys: missing }))
        }
    }

    pub fn get(&self, name: &str) -> Result<&str> {
        self.keys.get(name).map(String::as_str).ok_or_else(|| {
            ErrorKind::MissingApiKeys {
                keys: vec![name.to_string()],
            }
            .into()
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.keys.contains_key(name)
    }

    /// `(name, masked value)` pairs, safe to log.
    pub fn masked(&self) -> Vec<(String, String)> {
        self.keys
            .iter()
            .map(|(k, v)| (k.clone(), mask(v)))
            .collect()
    }
}

fn mask(value: &str) -> String {
    let prefix: String = value.chars().take(MASK_PREFIX).collect();
    format!("{prefix}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(k: &str) -> Option<String> {
        match k {
            "GEMINI_API_KEY" => Some("AIzaSyExampleSecret".into()),
            "EMPTY_KEY" => Some("   ".into()),
            _ => None,
        }
    }

    #[test]
    fn require_lists_every_missing_key() {
        let keys = ApiKeyManager::load(["GEMINI_API_KEY", "GROQ_API_KEY", "EMPTY_KEY"], lookup);
        assert!(keys.require(&["GEMINI_API_KEY"]).is_ok());
        let err = keys.require(&["GEMINI_API_KEY", "GROQ_API_KEY", "EMPTY_KEY"]).unwrap_err();
        match err.kind() {
            ErrorKind::MissingApiKeys { keys } => {
                assert_eq!(keys, &vec!["GROQ_API_KEY".to_string(), "EMPTY_KEY".to_string()])
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn values_are_masked() {
        let keys = ApiKeyManager::load(["GEMINI_API_KEY"], lookup);
        assert_eq!(
            keys.masked(),
            vec![("GEMINI_API_KEY".to_string(), "AIzaSy...".to_string())]
        );
        assert!(!format!("{keys:?}").contains("Secret"));
        assert_eq!(keys.get("GEMINI_API_KEY").unwrap(), "AIzaSyExampleSecret");
        assert!(keys.get("GROQ_API_KEY").is_err());
    }
}
