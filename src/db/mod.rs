//! Database module for SQLite persistence.
//!
//! SQLite is the source of truth for accounts, projects, tasks, metrics and to-dos.

mod metrics;
mod projects;
mod repository;
mod tasks;
mod todos;
mod users;

pub use repository::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run database migrations.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL COLLATE NOCASE UNIQUE,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            role TEXT NOT NULL CHECK (role IN ('manager', 'developer')),
            is_active INTEGER NOT NULL DEFAULT 0,
            password_hash TEXT NOT NULL,
            verification_code TEXT,
            verification_code_expiry TEXT,
            reset_code TEXT,
            created_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            scope TEXT NOT NULL,
            deadline TEXT NOT NULL,
            manager_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            functional_requirements TEXT NOT NULL DEFAULT '[]',
            non_functional_requirements TEXT NOT NULL DEFAULT '[]',
            edited_functional_requirements TEXT,
            edited_non_functional_requirements TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS project_developers (
            project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            developer_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            PRIMARY KEY (project_id, developer_id)
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            title TEXT NOT NULL,
            description TEXT,
            status TEXT NOT NULL DEFAULT 'not_started'
                CHECK (status IN ('not_started', 'in_progress', 'completed')),
            start_time TEXT,
            end_time TEXT,
            manager_start_time TEXT,
            manager_end_time TEXT,
            restart_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS task_developers (
            task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
            developer_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            PRIMARY KEY (task_id, developer_id)
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS developer_metrics (
            developer_id TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
            tasks_completed INTEGER NOT NULL DEFAULT 0,
            tasks_reassigned INTEGER NOT NULL DEFAULT 0,
            average_completion_time REAL NOT NULL DEFAULT 0,
            total_delivery_time INTEGER NOT NULL DEFAULT 0,
            total_allocated_time INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS todos (
            id TEXT PRIMARY KEY,
            developer_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            title TEXT NOT NULL,
            completed INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for common queries
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_projects_manager ON projects(manager_id);
        CREATE INDEX IF NOT EXISTS idx_project_developers_developer ON project_developers(developer_id);
        CREATE INDEX IF NOT EXISTS idx_tasks_project ON tasks(project_id);
        CREATE INDEX IF NOT EXISTS idx_task_developers_developer ON task_developers(developer_id);
        CREATE INDEX IF NOT EXISTS idx_todos_developer ON todos(developer_id);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
