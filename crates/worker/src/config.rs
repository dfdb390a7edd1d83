//! Per-version worker configuration.

use piggybank_client::{canonicalize, resolve_path};
use piggybank_core::{AppConfig, Error};
use url::{Origin, Url};

/// Policy switches that distinguish the deployed worker versions.
///
/// | version | fast_activation | navigation_cache_refresh |
/// |---------|-----------------|--------------------------|
/// | v1, v2  | false           | false                    |
/// | v3      | true            | false                    |
/// | v4, v5  | true            | true                     |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPolicy {
    /// Skip waiting once installed, and claim open clients on activation.
    pub fast_activation: bool,
    /// Fetch navigations with `CacheMode::NoStore` and keep the result as
    /// the offline document.
    pub navigation_cache_refresh: bool,
}

impl Default for WorkerPolicy {
    fn default() -> Self {
        Self { fast_activation: true, navigation_cache_refresh: true }
    }
}

/// Everything one worker version needs to know, resolved against its origin.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    origin: Url,
    store_name: String,
    manifest: Vec<Url>,
    api_prefix: String,
    document: Url,
    policy: WorkerPolicy,
}

impl WorkerConfig {
    /// Config for `origin` with the default manifest, API prefix and document key.
    pub fn new(origin: &str, store_name: impl Into<String>) -> Result<Self, Error> {
        let defaults = AppConfig::default();
        let origin = canonicalize(origin).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let document = resolve(&origin, &defaults.document_key)?;

        let config = Self {
            origin,
            store_name: store_name.into(),
            manifest: Vec::new(),
            api_prefix: defaults.api_prefix,
            document,
            policy: WorkerPolicy::default(),
        };
        config.with_manifest(&defaults.static_assets)
    }

    /// Build from loaded application configuration.
    pub fn from_app(config: &AppConfig) -> Result<Self, Error> {
        Self::new(&config.origin, config.store_name())?
            .with_manifest(&config.static_assets)?
            .with_api_prefix(&config.api_prefix)?
            .with_document_key(&config.document_key)
            .map(|c| {
                c.with_policy(WorkerPolicy {
                    fast_activation: config.fast_activation,
                    navigation_cache_refresh: config.navigation_cache_refresh,
                })
            })
    }

    pub fn with_manifest<I, S>(mut self, paths: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.manifest = paths
            .into_iter()
            .map(|p| resolve(&self.origin, p.as_ref()))
            .collect::<Result<_, _>>()?;
        Ok(self)
    }

    pub fn with_api_prefix(mut self, prefix: &str) -> Result<Self, Error> {
        if !prefix.starts_with('/') {
            return Err(Error::InvalidInput(format!("api prefix {prefix:?} must start with '/'")));
        }
        self.api_prefix = prefix.to_string();
        Ok(self)
    }

    pub fn with_document_key(mut self, path: &str) -> Result<Self, Error> {
        self.document = resolve(&self.origin, path)?;
        Ok(self)
    }

    pub fn with_policy(mut self, policy: WorkerPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn origin(&self) -> Origin {
        self.origin.origin()
    }

    pub fn origin_url(&self) -> &Url {
        &self.origin
    }

    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    /// Manifest entries in install order.
    pub fn manifest(&self) -> &[Url] {
        &self.manifest
    }

    pub fn api_prefix(&self) -> &str {
        &self.api_prefix
    }

    /// URL under which the navigation document is stored.
    pub fn document(&self) -> &Url {
        &self.document
    }

    pub fn policy(&self) -> WorkerPolicy {
        self.policy
    }
}

fn resolve(origin: &Url, path: &str) -> Result<Url, Error> {
    resolve_path(origin, path).map_err(|e| Error::InvalidInput(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_uses_default_manifest() {
        let config = WorkerConfig::new("http://localhost:5173", "piggybank-v4").unwrap();
        let paths: Vec<&str> = config.manifest().iter().map(|u| u.path()).collect();
        assert_eq!(paths, vec!["/", "/index.html", "/manifest.json", "/icon-192.png", "/icon-512.png"]);
        assert_eq!(config.document().as_str(), "http://localhost:5173/index.html");
        assert_eq!(config.api_prefix(), "/api/");
        assert_eq!(config.policy(), WorkerPolicy::default());
    }

    #[test]
    fn test_from_app_config() {
        let app = AppConfig {
            origin: "https://piggy.example.com".into(),
            version: "v2".into(),
            static_assets: vec!["/".into(), "/index.html".into()],
            fast_activation: false,
            navigation_cache_refresh: false,
            ..Default::default()
        };
        let config = WorkerConfig::from_app(&app).unwrap();
        assert_eq!(config.store_name(), "piggybank-v2");
        assert_eq!(config.manifest().len(), 2);
        assert_eq!(config.manifest()[1].as_str(), "https://piggy.example.com/index.html");
        assert!(!config.policy().fast_activation);
        assert!(!config.policy().navigation_cache_refresh);
    }

    #[test]
    fn test_relative_manifest_rejected() {
        let result = WorkerConfig::new("http://localhost:5173", "piggybank-v4")
            .unwrap()
            .with_manifest(["icon-192.png"]);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_manifest_on_other_host_rejected() {
        let base = WorkerConfig::new("http://localhost:5173", "piggybank-v4").unwrap();
        assert!(matches!(base.clone().with_manifest(["/", "//cdn.example.com/x.js"]), Err(Error::InvalidInput(_))));
        assert!(matches!(base.with_document_key("//cdn.example.com/index.html"), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_bad_api_prefix_rejected() {
        let result = WorkerConfig::new("http://localhost:5173", "piggybank-v4")
            .unwrap()
            .with_api_prefix("api");
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_unsupported_origin_rejected() {
        let result = WorkerConfig::new("ftp://localhost", "piggybank-v4");
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
    }
}
