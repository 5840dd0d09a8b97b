//! Engine construction
//!
//! The registry asks an [`EngineFactory`] for a fresh engine whenever a
//! session is first seen. The production factory resolves the profile,
//! picks the permission schema and builds the matching agent loop.

use std::sync::Arc;

use async_trait::async_trait;

use super::agent_loop::AgentLoop;
use super::engine::AgentEngine;
use super::prompt;
use crate::config::{ProfileSet, Provider, RelayConfig};
use crate::core::EventEmitter;
use crate::llm::{AnthropicLoop, EchoLoop};
use crate::permissions::Authorizer;
use crate::tools::ToolRegistry;

/// Builds per-session engines
#[async_trait]
pub trait EngineFactory: Send + Sync {
    /// Build an engine for `profile_name`, sending approval requests to
    /// `emitter`. Unknown profiles fall back to the default profile.
    async fn build(
        &self,
        profile_name: &str,
        emitter: Arc<dyn EventEmitter>,
    ) -> anyhow::Result<Arc<AgentEngine>>;

    /// Names of the configured profiles
    fn profile_names(&self) -> Vec<String>;
}

/// Factory driven by [`RelayConfig`]
pub struct ProfileEngineFactory {
    config: RelayConfig,
    profiles: ProfileSet,
    base_tools: ToolRegistry,
    loop_override: Option<Arc<dyn AgentLoop>>,
}

impl ProfileEngineFactory {
    pub fn new(config: RelayConfig, base_tools: ToolRegistry) -> Self {
        let profiles = config.profile_set();
        Self {
            config,
            profiles,
            base_tools,
            loop_override: None,
        }
    }

    /// Use `agent_loop` for every profile regardless of its provider
    pub fn with_agent_loop(mut self, agent_loop: Arc<dyn AgentLoop>) -> Self {
        self.loop_override = Some(agent_loop);
        self
    }

    pub fn profiles(&self) -> &ProfileSet {
        &self.profiles
    }
}

#[async_trait]
impl EngineFactory for ProfileEngineFactory {
    async fn build(
        &self,
        profile_name: &str,
        emitter: Arc<dyn EventEmitter>,
    ) -> anyhow::Result<Arc<AgentEngine>> {
        let profile = self.profiles.get(profile_name).clone();

        let agent_loop: Arc<dyn AgentLoop> = match (&self.loop_override, profile.provider) {
            (Some(agent_loop), _) => agent_loop.clone(),
            (None, Provider::Anthropic) => Arc::new(AnthropicLoop::from_profile(&profile)?),
            (None, Provider::Echo) => Arc::new(EchoLoop::new()),
        };

        let schema = self.config.schema_for(&profile);
        let authorizer = Arc::new(
            Authorizer::new(schema, emitter).with_approval_timeout(self.config.approval_timeout()),
        );
        let system_prompt = prompt::system_prompt_for(&profile).await;

        tracing::info!(
            profile = %profile.name,
            agent_loop = agent_loop.name(),
            schema = %authorizer.schema().name,
            "[Factory] Engine built"
        );

        Ok(Arc::new(AgentEngine::new(
            profile,
            system_prompt,
            authorizer,
            &self.base_tools,
            agent_loop,
        )))
    }

    fn profile_names(&self) -> Vec<String> {
        self.profiles.names()
    }
}
