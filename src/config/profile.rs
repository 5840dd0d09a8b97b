//! Agent profiles
//!
//! A profile is a named recipe for building a session's agent engine:
//! prompt, model settings and (optionally) its own permission schema.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::permissions::PermissionSchema;

/// Name of the profile every lookup falls back to
pub const DEFAULT_PROFILE: &str = "default";

/// Which agent loop drives the profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Anthropic Messages API
    #[default]
    Anthropic,
    /// Offline loop that echoes input back
    Echo,
}

/// One named agent configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Filled from the map key when omitted
    #[serde(default)]
    pub name: String,

    /// Inline system prompt; wins over context files
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Files concatenated into the system prompt
    #[serde(default)]
    pub context_files: Vec<String>,

    #[serde(default)]
    pub provider: Provider,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub temperature: Option<f32>,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Overrides the relay-wide permission schema
    #[serde(default)]
    pub permissions: Option<PermissionSchema>,
}

fn default_model() -> String {
    "claude-haiku-4-5".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

impl Profile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system_prompt: None,
            context_files: Vec::new(),
            provider: Provider::default(),
            model: default_model(),
            temperature: None,
            max_tokens: default_max_tokens(),
            permissions: None,
        }
    }

    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_permissions(mut self, schema: PermissionSchema) -> Self {
        self.permissions = Some(schema);
        self
    }
}

/// All known profiles; always contains [`DEFAULT_PROFILE`]
#[derive(Debug, Clone)]
pub struct ProfileSet {
    profiles: HashMap<String, Profile>,
}

impl ProfileSet {
    /// Build from configured profiles, naming each by its key
    pub fn new(profiles: HashMap<String, Profile>) -> Self {
        let mut profiles: HashMap<String, Profile> = profiles
            .into_iter()
            .map(|(key, mut profile)| {
                if profile.name.is_empty() {
                    profile.name = key.clone();
                }
                (key, profile)
            })
            .collect();

        profiles
            .entry(DEFAULT_PROFILE.to_string())
            .or_insert_with(|| Profile::new(DEFAULT_PROFILE));

        Self { profiles }
    }

    /// Look up a profile, falling back to the default one
    pub fn get(&self, name: &str) -> &Profile {
        match self.profiles.get(name) {
            Some(profile) => profile,
            None => {
                tracing::warn!(profile = %name, "Unknown profile, using default");
                &self.profiles[DEFAULT_PROFILE]
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.profiles.contains_key(name)
    }

    /// Profile names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.profiles.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ProfileSet {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_always_present() {
        let set = ProfileSet::default();
        assert_eq!(set.names(), vec!["default"]);
        assert_eq!(set.get("default").name, "default");
    }

    #[test]
    fn test_unknown_falls_back_to_default() {
        let mut profiles = HashMap::new();
        profiles.insert(
            "default".to_string(),
            Profile::new("default").with_provider(Provider::Echo),
        );
        let set = ProfileSet::new(profiles);

        assert_eq!(set.get("nope").provider, Provider::Echo);
    }

    #[test]
    fn test_name_filled_from_key() {
        let profiles: HashMap<String, Profile> =
            serde_json::from_str(r#"{"coder": {"provider": "echo", "max_tokens": 100}}"#).unwrap();
        let set = ProfileSet::new(profiles);

        let coder = set.get("coder");
        assert_eq!(coder.name, "coder");
        assert_eq!(coder.provider, Provider::Echo);
        assert_eq!(coder.max_tokens, 100);
        assert_eq!(coder.model, "claude-haiku-4-5");
        assert_eq!(set.names(), vec!["coder", "default"]);
    }
}
