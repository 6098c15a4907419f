//! Name-based plugin instantiation.
//!
//! World descriptions list plugins by name. A [`SystemLoader`] maps those
//! names to factories that build a [`SystemRecord`] from the plugin's
//! parameters. Unknown names are reported, not fatal: the world still loads
//! without that system.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::LoadError;
use crate::record::SystemRecord;

/// A plugin reference from a world description.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PluginDescription {
    /// Registered factory name.
    pub name: String,
    /// Free-form string parameters.
    pub params: BTreeMap<String, String>,
}

impl PluginDescription {
    /// A plugin reference with no parameters.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
        }
    }

    /// Add a parameter (builder style).
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Parse parameter `key`, `Ok(None)` if absent.
    pub fn param<T>(&self, key: &str) -> Result<Option<T>, LoadError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let Some(raw) = self.params.get(key) else {
            return Ok(None);
        };
        raw.parse::<T>()
            .map(Some)
            .map_err(|e| LoadError::InvalidParameter {
                plugin: self.name.clone(),
                param: key.to_owned(),
                reason: e.to_string(),
            })
    }
}

/// Builds a system record from a plugin description.
pub type SystemFactory =
    Arc<dyn Fn(&PluginDescription) -> Result<SystemRecord, LoadError> + Send + Sync>;

/// Registry of plugin factories.
#[derive(Clone, Default)]
pub struct SystemLoader {
    factories: IndexMap<String, SystemFactory>,
}

impl SystemLoader {
    /// Create a loader with no factories.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` under `name`, replacing any previous one.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&PluginDescription) -> Result<SystemRecord, LoadError> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    /// Whether a factory is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Instantiate the plugin described by `desc`.
    pub fn load(&self, desc: &PluginDescription) -> Result<SystemRecord, LoadError> {
        let Some(factory) = self.factories.get(&desc.name) else {
            tracing::error!(plugin = %desc.name, "unknown plugin");
            return Err(LoadError::UnknownPlugin(desc.name.clone()));
        };
        factory(desc).inspect_err(|err| {
            tracing::error!(plugin = %desc.name, error = %err, "plugin failed to load");
        })
    }
}

impl fmt::Debug for SystemLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemLoader")
            .field("plugins", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::System;

    struct Named(String);

    impl System for Named {
        fn name(&self) -> &str {
            &self.0
        }
    }

    fn loader() -> SystemLoader {
        let mut loader = SystemLoader::new();
        loader.register("named", |desc| {
            let label: String = desc.param("label")?.unwrap_or_else(|| "anon".into());
            Ok(SystemRecord::new(Named(label)).build())
        });
        loader.register("gain", |desc| {
            let gain: f64 = desc.param("gain")?.unwrap_or(1.0);
            Ok(SystemRecord::new(Named(format!("gain-{gain}"))).build())
        });
        loader
    }

    #[test]
    fn loads_registered_plugin_with_params() {
        let loader = loader();
        let record = loader
            .load(&PluginDescription::new("named").with_param("label", "ctrl"))
            .unwrap();
        assert_eq!(record.name(), "ctrl");
        assert_eq!(loader.names().collect::<Vec<_>>(), vec!["named", "gain"]);
    }

    #[test]
    fn unknown_plugin_is_an_error_value() {
        let err = loader().load(&PluginDescription::new("missing")).unwrap_err();
        assert_eq!(err, LoadError::UnknownPlugin("missing".into()));
    }

    #[test]
    fn bad_parameter_is_reported() {
        let err = loader()
            .load(&PluginDescription::new("gain").with_param("gain", "fast"))
            .unwrap_err();
        assert!(matches!(err, LoadError::InvalidParameter { ref param, .. } if param == "gain"));
    }
}
