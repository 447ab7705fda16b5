//! Project model and request bodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A project owned by exactly one manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub scope: String,
    pub deadline: DateTime<Utc>,
    pub manager_id: String,
    pub developer_ids: Vec<String>,
    pub functional_requirements: Vec<String>,
    pub non_functional_requirements: Vec<String>,
    /// Manager overrides of the generated requirements
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_functional_requirements: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_non_functional_requirements: Option<Vec<String>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn is_managed_by(&self, user_id: &str) -> bool {
        self.manager_id == user_id
    }

    pub fn has_developer(&self, user_id: &str) -> bool {
        self.developer_ids.iter().any(|id| id == user_id)
    }
}

/// Request body for creating a new project.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub scope: String,
    pub deadline: DateTime<Utc>,
}

/// Request body for updating an existing project.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateProjectRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
}

/// Request body for saving edited requirement lists.
#[derive(Debug, Clone, Deserialize)]
pub struct EditRequirementsRequest {
    #[serde(default)]
    pub functional_requirements: Option<Vec<String>>,
    #[serde(default)]
    pub non_functional_requirements: Option<Vec<String>>,
}

/// Request body naming developers to add to or remove from a project or task.
#[derive(Debug, Clone, Deserialize)]
pub struct DeveloperIdsRequest {
    pub developer_ids: Vec<String>,
}
