use chrono::Utc;

use super::repository::{
    ensure_developers, fetch_project, project_from_row, to_json_array, user_from_row, Repository,
    PROJECT_COLUMNS,
};
use crate::auth::Actor;
use crate::errors::AppError;
use crate::models::{
    CreateProjectRequest, EditRequirementsRequest, Project, Role, UpdateProjectRequest, User,
};
use crate::requirements::GeneratedRequirements;

impl Repository {
    // ==================== PROJECT OPERATIONS ====================

    /// List the projects the actor manages, or is assigned to as a developer.
    pub async fn list_projects(&self, actor: &Actor) -> Result<Vec<Project>, AppError> {
        let sql = match actor.role {
            Role::Manager => format!(
                "SELECT {} FROM projects p WHERE p.manager_id = ? ORDER BY p.created_at",
                PROJECT_COLUMNS
            ),
            Role::Developer => format!(
                "SELECT {} FROM projects p WHERE p.id IN (SELECT project_id FROM project_developers WHERE developer_id = ?) ORDER BY p.created_at",
                PROJECT_COLUMNS
            ),
        };

        let rows = sqlx::query(&sql)
            .bind(&actor.user_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(project_from_row).collect())
    }

    /// Create a project owned by the actor.
    pub async fn create_project(
        &self,
        actor: &Actor,
        request: &CreateProjectRequest,
        generated: &GeneratedRequirements,
    ) -> Result<Project, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO projects (id, name, scope, deadline, manager_id, functional_requirements, non_functional_requirements, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
        )
        .bind(&id)
        .bind(request.name.trim())
        .bind(&request.scope)
        .bind(request.deadline)
        .bind(&actor.user_id)
        .bind(to_json_array(&generated.functional)?)
        .bind(to_json_array(&generated.non_functional)?)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        tracing::info!(project_id = %id, manager_id = %actor.user_id, "project created");

        Ok(Project {
            id,
            name: request.name.trim().to_string(),
            scope: request.scope.clone(),
            deadline: request.deadline,
            manager_id: actor.user_id.clone(),
            developer_ids: Vec::new(),
            functional_requirements: generated.functional.clone(),
            non_functional_requirements: generated.non_functional.clone(),
            edited_functional_requirements: None,
            edited_non_functional_requirements: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Update name, scope or deadline of an owned project.
    pub async fn update_project(
        &self,
        actor: &Actor,
        id: &str,
        request: &UpdateProjectRequest,
    ) -> Result<Project, AppError> {
        let mut tx = self.pool.begin().await?;
        let existing = self.owned_project_on(&mut tx, actor, id).await?;

        let name = request
            .name
            .as_deref()
            .map(str::trim)
            .unwrap_or(&existing.name)
            .to_string();
        let scope = request.scope.clone().unwrap_or(existing.scope.clone());
        let deadline = request.deadline.unwrap_or(existing.deadline);
        let now = Utc::now();

        sqlx::query("UPDATE projects SET name = ?, scope = ?, deadline = ?, updated_at = ? WHERE id = ?")
            .bind(&name)
            .bind(&scope)
            .bind(deadline)
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(Project {
            name,
            scope,
            deadline,
            updated_at: now,
            ..existing
        })
    }

    /// Delete an owned project together with its tasks.
    pub async fn delete_project(&self, actor: &Actor, id: &str) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        self.owned_project_on(&mut tx, actor, id).await?;

        sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(project_id = id, "project deleted");
        Ok(())
    }

    /// Developers assigned to a project the actor can see.
    pub async fn list_project_developers(
        &self,
        actor: &Actor,
        id: &str,
    ) -> Result<Vec<User>, AppError> {
        self.visible_project(actor, id).await?;

        let rows = sqlx::query(
            "SELECT u.id, u.email, u.first_name, u.last_name, u.role, u.is_active, u.created_at FROM users u JOIN project_developers pd ON pd.developer_id = u.id WHERE pd.project_id = ? ORDER BY u.email",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(user_from_row).collect())
    }

    /// Assign developers to an owned project.
    ///
    /// Returns the updated project and the ids that were not already assigned.
    pub async fn add_project_developers(
        &self,
        actor: &Actor,
        id: &str,
        developer_ids: &[String],
    ) -> Result<(Project, Vec<String>), AppError> {
        let mut tx = self.pool.begin().await?;
        self.owned_project_on(&mut tx, actor, id).await?;
        ensure_developers(&mut tx, developer_ids).await?;

        let mut added = Vec::new();
        for developer_id in developer_ids {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO project_developers (project_id, developer_id) VALUES (?, ?)",
            )
            .bind(id)
            .bind(developer_id)
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() > 0 {
                added.push(developer_id.clone());
            }
        }

        touch_project(&mut tx, id).await?;
        let project = fetch_project(&mut tx, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Project {} not found", id)))?;
        tx.commit().await?;

        Ok((project, added))
    }

    /// Remove one developer from an owned project. Task assignments are kept.
    pub async fn remove_project_developer(
        &self,
        actor: &Actor,
        id: &str,
        developer_id: &str,
    ) -> Result<Project, AppError> {
        let mut tx = self.pool.begin().await?;
        self.owned_project_on(&mut tx, actor, id).await?;

        let result =
            sqlx::query("DELETE FROM project_developers WHERE project_id = ? AND developer_id = ?")
                .bind(id)
                .bind(developer_id)
                .execute(&mut *tx)
                .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Developer {} is not assigned to project {}",
                developer_id, id
            )));
        }

        touch_project(&mut tx, id).await?;
        let project = fetch_project(&mut tx, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Project {} not found", id)))?;
        tx.commit().await?;

        Ok(project)
    }

    /// Save manager-edited requirement lists. Absent lists stay as they are.
    pub async fn edit_requirements(
        &self,
        actor: &Actor,
        id: &str,
        request: &EditRequirementsRequest,
    ) -> Result<Project, AppError> {
        let mut tx = self.pool.begin().await?;
        let existing = self.owned_project_on(&mut tx, actor, id).await?;

        let functional = request
            .functional_requirements
            .clone()
            .or(existing.edited_functional_requirements.clone());
        let non_functional = request
            .non_functional_requirements
            .clone()
            .or(existing.edited_non_functional_requirements.clone());

        let project =
            store_edited_requirements(&mut tx, existing, functional, non_functional).await?;
        tx.commit().await?;
        Ok(project)
    }

    /// Adopt the generated requirements as the project's edited lists.
    pub async fn accept_requirements(&self, actor: &Actor, id: &str) -> Result<Project, AppError> {
        let mut tx = self.pool.begin().await?;
        let existing = self.owned_project_on(&mut tx, actor, id).await?;
        let functional = Some(existing.functional_requirements.clone());
        let non_functional = Some(existing.non_functional_requirements.clone());

        let project =
            store_edited_requirements(&mut tx, existing, functional, non_functional).await?;
        tx.commit().await?;
        Ok(project)
    }
}

async fn store_edited_requirements(
    conn: &mut sqlx::SqliteConnection,
    existing: Project,
    functional: Option<Vec<String>>,
    non_functional: Option<Vec<String>>,
) -> Result<Project, AppError> {
    let now = Utc::now();
    let functional_json = functional.as_deref().map(to_json_array).transpose()?;
    let non_functional_json = non_functional.as_deref().map(to_json_array).transpose()?;

    sqlx::query(
        "UPDATE projects SET edited_functional_requirements = ?, edited_non_functional_requirements = ?, updated_at = ? WHERE id = ?",
    )
    .bind(functional_json)
    .bind(non_functional_json)
    .bind(now)
    .bind(&existing.id)
    .execute(&mut *conn)
    .await?;

    Ok(Project {
        edited_functional_requirements: functional,
        edited_non_functional_requirements: non_functional,
        updated_at: now,
        ..existing
    })
}

async fn touch_project(conn: &mut sqlx::SqliteConnection, id: &str) -> Result<(), AppError> {
    sqlx::query("UPDATE projects SET updated_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
