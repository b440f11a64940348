//! Built-in agent definitions and lookup.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use super::errors::AgentError;
use crate::inference::config::models;
use crate::inference::types::{ChatCompletionRequest, ChatMessage};

/// Embedded persona document.
const BUILTIN_PERSONAS: &str = include_str!("personas.yaml");

// ─── Keys ────────────────────────────────────────────────────────────────────

/// The fixed set of agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentKey {
    DungeonMaster,
    InnKeeper,
    TavernMaster,
    GenericNpc,
    MobAgent,
    FactionJarlLeader,
    MerchantTrader,
    BlacksmithCrafter,
    SeerOracle,
    ShipCaptainNavigator,
    HealerPriest,
    GuardSentinel,
    ScholarLibrarian,
    AssassinSpy,
    EventHerald,
    BeastmasterCompanionHandler,
}

impl AgentKey {
    pub const ALL: [AgentKey; 16] = [
        AgentKey::DungeonMaster,
        AgentKey::InnKeeper,
        AgentKey::TavernMaster,
        AgentKey::GenericNpc,
        AgentKey::MobAgent,
        AgentKey::FactionJarlLeader,
        AgentKey::MerchantTrader,
        AgentKey::BlacksmithCrafter,
        AgentKey::SeerOracle,
        AgentKey::ShipCaptainNavigator,
        AgentKey::HealerPriest,
        AgentKey::GuardSentinel,
        AgentKey::ScholarLibrarian,
        AgentKey::AssassinSpy,
        AgentKey::EventHerald,
        AgentKey::BeastmasterCompanionHandler,
    ];

    /// Stable camelCase identifier, e.g. `dungeonMaster`.
    pub fn slug(self) -> &'static str {
        match self {
            AgentKey::DungeonMaster => "dungeonMaster",
            AgentKey::InnKeeper => "innKeeper",
            AgentKey::TavernMaster => "tavernMaster",
            AgentKey::GenericNpc => "genericNpc",
            AgentKey::MobAgent => "mob",
            AgentKey::FactionJarlLeader => "factionJarlLeader",
            AgentKey::MerchantTrader => "merchantTrader",
            AgentKey::BlacksmithCrafter => "blacksmithCrafter",
            AgentKey::SeerOracle => "seerOracle",
            AgentKey::ShipCaptainNavigator => "shipCaptainNavigator",
            AgentKey::HealerPriest => "healerPriest",
            AgentKey::GuardSentinel => "guardSentinel",
            AgentKey::ScholarLibrarian => "scholarLibrarian",
            AgentKey::AssassinSpy => "assassinSpy",
            AgentKey::EventHerald => "eventHerald",
            AgentKey::BeastmasterCompanionHandler => "beastmasterCompanionHandler",
        }
    }
}

impl fmt::Display for AgentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for AgentKey {
    type Err = AgentError;

    /// Accepts the camelCase slug (case-insensitive) or the SCREAMING_SNAKE key.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        AgentKey::ALL
            .into_iter()
            .find(|k| {
                k.slug().eq_ignore_ascii_case(wanted)
                    || format!("{k:?}").eq_ignore_ascii_case(&wanted.replace('_', ""))
            })
            .ok_or_else(|| AgentError::UnknownAgent {
                name: s.to_string(),
            })
    }
}

// ─── Definitions ─────────────────────────────────────────────────────────────

/// One agent: persona text plus the settings the orchestrator binds it to.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AgentDefinition {
    pub key: AgentKey,
    pub name: String,
    /// System prompt seeded into every conversation with this agent.
    pub instructions: String,
    pub purpose: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    /// Maximum reasoning/tool steps per turn.
    pub max_steps: u32,
    pub max_retries: u32,
    #[serde(default)]
    pub tools: Vec<String>,
}

fn default_chat_model() -> String {
    models::UNCENSORED.to_string()
}
fn default_embedding_model() -> String {
    models::EMBEDDING_SMALL.to_string()
}

impl AgentDefinition {
    /// Build a request for this agent's model with its instructions as the
    /// system message, followed by `history` in order.
    pub fn completion_request(&self, history: Vec<ChatMessage>) -> ChatCompletionRequest {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage::system(self.instructions.clone()));
        messages.extend(history);
        ChatCompletionRequest::new(self.chat_model.clone(), messages)
    }

    fn validate(&self) -> Result<(), AgentError> {
        let invalid = |reason: &str| AgentError::InvalidAgent {
            key: self.key,
            reason: reason.to_string(),
        };
        if self.name.trim().is_empty() {
            return Err(invalid("name is blank"));
        }
        if self.instructions.trim().is_empty() {
            return Err(invalid("instructions are blank"));
        }
        if self.chat_model.trim().is_empty() {
            return Err(invalid("chat_model is blank"));
        }
        if self.max_steps == 0 {
            return Err(invalid("max_steps must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct RegistryDocument {
    agents: Vec<AgentDefinition>,
}

// ─── Registry ────────────────────────────────────────────────────────────────

/// Read-only mapping from every [`AgentKey`] to its definition.
#[derive(Debug, Clone)]
pub struct AgentRegistry {
    agents: HashMap<AgentKey, AgentDefinition>,
}

impl AgentRegistry {
    /// Parse the personas embedded in the binary.
    pub fn load_builtin() -> Result<Self, AgentError> {
        Self::from_yaml_str(BUILTIN_PERSONAS)
    }

    /// Parse and validate a persona document. Every key must appear exactly once.
    pub fn from_yaml_str(raw: &str) -> Result<Self, AgentError> {
        let document: RegistryDocument = serde_yaml::from_str(raw)?;

        let mut agents = HashMap::with_capacity(document.agents.len());
        for agent in document.agents {
            agent.validate()?;
            let key = agent.key;
            if agents.insert(key, agent).is_some() {
                return Err(AgentError::DuplicateAgent { key });
            }
        }

        if let Some(key) = AgentKey::ALL.into_iter().find(|k| !agents.contains_key(k)) {
            return Err(AgentError::MissingAgent { key });
        }

        tracing::debug!(agent_count = agents.len(), "loaded agent registry");
        Ok(Self { agents })
    }

    /// Definition for `key`. Always present once the registry has loaded.
    pub fn get(&self, key: AgentKey) -> Option<&AgentDefinition> {
        self.agents.get(&key)
    }

    /// Look up by slug or key name, e.g. `"seerOracle"` or `"SEER_ORACLE"`.
    pub fn find(&self, name: &str) -> Result<&AgentDefinition, AgentError> {
        let key: AgentKey = name.parse()?;
        self.get(key).ok_or_else(|| AgentError::UnknownAgent {
            name: name.to_string(),
        })
    }

    /// All definitions in the fixed key order.
    pub fn iter(&self) -> impl Iterator<Item = &AgentDefinition> {
        AgentKey::ALL
            .into_iter()
            .filter_map(move |k| self.agents.get(&k))
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
