//! Agent catalog and per-agent runtime status.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::api::AgentDescriptor;

/// Progress assumed when an `agent_progress` event carries no number.
pub const DEFAULT_PROGRESS: u8 = 50;

const FALLBACK_AVATAR: &str = "🤖";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub avatar: String,
}

impl AgentInfo {
    fn new(id: &str, name: &str, description: &str, avatar: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            avatar: avatar.to_string(),
        }
    }
}

impl From<AgentDescriptor> for AgentInfo {
    fn from(agent: AgentDescriptor) -> Self {
        let avatar = default_catalog()
            .into_iter()
            .find(|known| known.id == agent.id)
            .map(|known| known.avatar)
            .unwrap_or_else(|| FALLBACK_AVATAR.to_string());
        Self {
            id: agent.id,
            name: agent.name,
            description: agent.description,
            avatar,
        }
    }
}

/// The four agents the content service ships with.
pub fn default_catalog() -> Vec<AgentInfo> {
    vec![
        AgentInfo::new(
            "curriculum_planner",
            "Curriculum Planner",
            "Designs learning objectives and course structure",
            "🎯",
        ),
        AgentInfo::new(
            "content_creator",
            "Content Creator",
            "Generates lesson content and materials",
            "✍️",
        ),
        AgentInfo::new(
            "assessment_creator",
            "Assessment Designer",
            "Creates quizzes, tests and evaluation rubrics",
            "📊",
        ),
        AgentInfo::new(
            "material_adapter",
            "Material Adapter",
            "Adapts materials for different learning needs",
            "🔧",
        ),
    ]
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    #[default]
    Idle,
    Starting,
    Working,
    Completed,
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentState::Idle => "idle",
            AgentState::Starting => "starting",
            AgentState::Working => "working",
            AgentState::Completed => "completed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub status: AgentState,
    /// 0-100; meaningful while working, 100 once completed.
    pub progress: u8,
    pub current_task: Option<String>,
}

pub fn clamp_progress(raw: Option<i64>) -> u8 {
    match raw {
        Some(value) => value.clamp(0, 100) as u8,
        None => DEFAULT_PROGRESS,
    }
}

/// Catalog plus the live status of every agent mentioned in the current run.
#[derive(Debug, Clone)]
pub struct AgentRegistry {
    catalog: Vec<AgentInfo>,
    order: Vec<String>,
    statuses: HashMap<String, AgentStatus>,
    active: Vec<String>,
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new(default_catalog())
    }
}

impl AgentRegistry {
    pub fn new(catalog: Vec<AgentInfo>) -> Self {
        let mut registry = Self {
            catalog,
            order: Vec::new(),
            statuses: HashMap::new(),
            active: Vec::new(),
        };
        registry.reset();
        registry
    }

    pub fn catalog(&self) -> &[AgentInfo] {
        &self.catalog
    }

    pub fn replace_catalog(&mut self, catalog: Vec<AgentInfo>) {
        self.catalog = catalog;
        self.reset();
    }

    /// Every catalog agent back to idle; agents first seen during the last
    /// run are forgotten.
    pub fn reset(&mut self) {
        self.order = self.catalog.iter().map(|a| a.id.clone()).collect();
        self.statuses = self
            .order
            .iter()
            .map(|id| (id.clone(), AgentStatus::default()))
            .collect();
        self.active.clear();
    }

    pub fn status(&self, agent_id: &str) -> Option<&AgentStatus> {
        self.statuses.get(agent_id)
    }

    /// Statuses in catalog order, then unlisted agents in order of first mention.
    pub fn statuses(&self) -> impl Iterator<Item = (&str, &AgentStatus)> {
        self.order
            .iter()
            .filter_map(|id| self.statuses.get(id).map(|status| (id.as_str(), status)))
    }

    /// Agents that reported `agent_started` during this run.
    pub fn active(&self) -> &[String] {
        &self.active
    }

    pub fn info(&self, agent_id: &str) -> Option<&AgentInfo> {
        self.catalog.iter().find(|a| a.id == agent_id)
    }

    /// Name from the event if it sent one, else the catalog name, else the id.
    pub fn display_name(&self, agent_id: &str, reported: Option<&str>) -> String {
        reported
            .map(str::to_string)
            .or_else(|| self.info(agent_id).map(|a| a.name.clone()))
            .unwrap_or_else(|| agent_id.to_string())
    }

    fn entry(&mut self, agent_id: &str) -> &mut AgentStatus {
        if !self.statuses.contains_key(agent_id) {
            self.order.push(agent_id.to_string());
        }
        self.statuses.entry(agent_id.to_string()).or_default()
    }

    pub fn mark_started(&mut self, agent_id: &str, task: Option<String>) -> AgentStatus {
        if !self.active.iter().any(|id| id == agent_id) {
            self.active.push(agent_id.to_string());
        }
        let status = self.entry(agent_id);
        status.status = AgentState::Starting;
        status.progress = 0;
        status.current_task = task;
        status.clone()
    }

    pub fn mark_progress(
        &mut self,
        agent_id: &str,
        progress: Option<i64>,
        task: Option<String>,
    ) -> AgentStatus {
        let status = self.entry(agent_id);
        status.status = AgentState::Working;
        status.progress = clamp_progress(progress);
        status.current_task = task;
        status.clone()
    }

    pub fn mark_completed(&mut self, agent_id: &str) -> AgentStatus {
        let status = self.entry(agent_id);
        status.status = AgentState::Completed;
        status.progress = 100;
        status.clone()
    }
}
