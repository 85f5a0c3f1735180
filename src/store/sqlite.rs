//! SQLite implementation of [`TaskStore`]
//!
//! A single connection is guarded by a mutex and every query runs on the
//! blocking pool. Writes that touch several rows go through an explicit
//! transaction; `bulk_change` is the only multi-entity transactional path.

use super::error::{StoreError, StoreResult};
use super::models::*;
use super::traits::TaskStore;
use crate::canvas::validation::find_cycle;
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    email         TEXT NOT NULL UNIQUE,
    name          TEXT NOT NULL,
    password_hash TEXT NOT NULL,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sessions (
    token_hash TEXT PRIMARY KEY,
    user_id    INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    expires_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS projects (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    name       TEXT NOT NULL,
    owner_id   INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tasks (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    title      TEXT NOT NULL,
    x          REAL NOT NULL DEFAULT 0,
    y          REAL NOT NULL DEFAULT 0,
    completed  INTEGER NOT NULL DEFAULT 0,
    color      TEXT,
    locked     INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- No cascade from tasks: incident dependencies are removed by the store
-- before the task row itself.
CREATE TABLE IF NOT EXISTS dependencies (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    from_task  INTEGER NOT NULL REFERENCES tasks(id),
    to_task    INTEGER NOT NULL REFERENCES tasks(id),
    UNIQUE (project_id, from_task, to_task)
);

CREATE INDEX IF NOT EXISTS idx_tasks_project ON tasks(project_id);
CREATE INDEX IF NOT EXISTS idx_dependencies_project ON dependencies(project_id);
CREATE INDEX IF NOT EXISTS idx_projects_owner ON projects(owner_id);
"#;

/// SQLite-backed store
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    reject_cycles: bool,
}

impl SqliteStore {
    /// Open (or create) a database file and apply the schema
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        info!("Opened task database at {}", path.display());
        Self::from_connection(conn)
    }

    /// Private in-memory database (tests, `check` dry runs)
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> anyhow::Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")
            .context("Failed to enable foreign keys")?;
        conn.execute_batch(SCHEMA)
            .context("Failed to initialize schema")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            reject_cycles: false,
        })
    }

    /// Reject dependency writes that would close a cycle
    pub fn with_cycle_rejection(mut self, reject: bool) -> Self {
        self.reject_cycles = reject;
        self
    }

    async fn with_conn<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Worker("connection mutex poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Worker(e.to_string()))?
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn ts(value: DateTime<Utc>) -> String {
    value.to_rfc3339()
}

fn parse_ts(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn user_from_row(row: &Row) -> rusqlite::Result<UserNode> {
    Ok(UserNode {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        password_hash: row.get(3)?,
        created_at: parse_ts(4, row.get(4)?)?,
    })
}

fn project_from_row(row: &Row) -> rusqlite::Result<ProjectNode> {
    Ok(ProjectNode {
        id: row.get(0)?,
        name: row.get(1)?,
        owner_id: row.get(2)?,
        created_at: parse_ts(3, row.get(3)?)?,
    })
}

const TASK_COLUMNS: &str =
    "id, project_id, title, x, y, completed, color, locked, created_at, updated_at";

fn task_from_row(row: &Row) -> rusqlite::Result<TaskNode> {
    Ok(TaskNode {
        id: row.get(0)?,
        project_id: row.get(1)?,
        title: row.get(2)?,
        x: row.get(3)?,
        y: row.get(4)?,
        completed: row.get(5)?,
        color: row.get(6)?,
        locked: row.get(7)?,
        created_at: parse_ts(8, row.get(8)?)?,
        updated_at: parse_ts(9, row.get(9)?)?,
    })
}

fn dependency_from_row(row: &Row) -> rusqlite::Result<DependencyNode> {
    Ok(DependencyNode {
        id: row.get(0)?,
        project_id: row.get(1)?,
        from_task: row.get(2)?,
        to_task: row.get(3)?,
    })
}

// ============================================================================
// Statement helpers shared by single-entity calls and bulk_change
// ============================================================================

fn load_task(conn: &Connection, project_id: i64, task_id: i64) -> StoreResult<TaskNode> {
    conn.query_row(
        &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1 AND project_id = ?2"),
        params![task_id, project_id],
        task_from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("task {task_id}")))
}

fn check_title(title: &str) -> StoreResult<()> {
    if title.trim().is_empty() {
        return Err(StoreError::Validation("task title cannot be empty".to_string()));
    }
    Ok(())
}

fn insert_task(conn: &Connection, project_id: i64, req: &CreateTaskRequest) -> StoreResult<TaskNode> {
    check_title(&req.title)?;
    let now = Utc::now();
    conn.execute(
        "INSERT INTO tasks (project_id, title, x, y, completed, color, locked, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
        params![
            project_id,
            req.title,
            req.x,
            req.y,
            req.completed,
            req.color,
            req.locked,
            ts(now),
        ],
    )?;
    Ok(TaskNode {
        id: conn.last_insert_rowid(),
        project_id,
        title: req.title.clone(),
        x: req.x,
        y: req.y,
        completed: req.completed,
        color: req.color.clone(),
        locked: req.locked,
        created_at: now,
        updated_at: now,
    })
}

fn apply_task_update(
    conn: &Connection,
    project_id: i64,
    task_id: i64,
    req: &UpdateTaskRequest,
) -> StoreResult<TaskNode> {
    if let Some(title) = &req.title {
        check_title(title)?;
    }
    let mut task = load_task(conn, project_id, task_id)?;
    if req.is_empty() {
        return Ok(task);
    }
    req.apply_to(&mut task);
    task.updated_at = Utc::now();
    conn.execute(
        "UPDATE tasks SET title = ?1, x = ?2, y = ?3, completed = ?4, color = ?5, locked = ?6,
                          updated_at = ?7
         WHERE id = ?8 AND project_id = ?9",
        params![
            task.title,
            task.x,
            task.y,
            task.completed,
            task.color,
            task.locked,
            ts(task.updated_at),
            task_id,
            project_id,
        ],
    )?;
    Ok(task)
}

fn remove_task(conn: &Connection, project_id: i64, task_id: i64) -> StoreResult<()> {
    // Referential constraint: incident dependencies go first
    let removed_deps = conn.execute(
        "DELETE FROM dependencies WHERE project_id = ?1 AND (from_task = ?2 OR to_task = ?2)",
        params![project_id, task_id],
    )?;
    let removed = conn.execute(
        "DELETE FROM tasks WHERE id = ?1 AND project_id = ?2",
        params![task_id, project_id],
    )?;
    if removed == 0 {
        return Err(StoreError::NotFound(format!("task {task_id}")));
    }
    debug!(task_id, removed_deps, "Deleted task");
    Ok(())
}

fn check_endpoints(conn: &Connection, project_id: i64, from_task: i64, to_task: i64) -> StoreResult<()> {
    if from_task == to_task {
        return Err(StoreError::Validation(format!(
            "task {from_task} cannot depend on itself"
        )));
    }
    let found: i64 = conn.query_row(
        "SELECT COUNT(*) FROM tasks WHERE project_id = ?1 AND id IN (?2, ?3)",
        params![project_id, from_task, to_task],
        |row| row.get(0),
    )?;
    if found != 2 {
        return Err(StoreError::Validation(format!(
            "dependency {from_task} -> {to_task} references a task outside project {project_id}"
        )));
    }
    Ok(())
}

fn insert_dependency(
    conn: &Connection,
    project_id: i64,
    from_task: i64,
    to_task: i64,
) -> StoreResult<DependencyNode> {
    check_endpoints(conn, project_id, from_task, to_task)?;
    conn.execute(
        "INSERT INTO dependencies (project_id, from_task, to_task) VALUES (?1, ?2, ?3)",
        params![project_id, from_task, to_task],
    )?;
    Ok(DependencyNode {
        id: conn.last_insert_rowid(),
        project_id,
        from_task,
        to_task,
    })
}

fn load_dependency(conn: &Connection, project_id: i64, dependency_id: i64) -> StoreResult<DependencyNode> {
    conn.query_row(
        "SELECT id, project_id, from_task, to_task FROM dependencies WHERE id = ?1 AND project_id = ?2",
        params![dependency_id, project_id],
        dependency_from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("dependency {dependency_id}")))
}

fn select_tasks(conn: &Connection, project_id: i64) -> StoreResult<Vec<TaskNode>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE project_id = ?1 ORDER BY id"
    ))?;
    let rows = stmt.query_map(params![project_id], task_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn select_dependencies(conn: &Connection, project_id: i64) -> StoreResult<Vec<DependencyNode>> {
    let mut stmt = conn.prepare(
        "SELECT id, project_id, from_task, to_task FROM dependencies WHERE project_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![project_id], dependency_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn ensure_acyclic(conn: &Connection, project_id: i64) -> StoreResult<()> {
    let edges: Vec<(i64, i64)> = select_dependencies(conn, project_id)?
        .into_iter()
        .map(|d| (d.from_task, d.to_task))
        .collect();
    if let Some(cycle) = find_cycle(&edges) {
        return Err(StoreError::Validation(format!(
            "dependencies would form a cycle through tasks {cycle:?}"
        )));
    }
    Ok(())
}

fn apply_bulk(
    tx: &Transaction,
    project_id: i64,
    req: &BulkChangeRequest,
    reject_cycles: bool,
) -> StoreResult<BulkChangeResponse> {
    let mut task_ids: HashMap<String, i64> = HashMap::new();
    let mut dependency_ids: HashMap<String, i64> = HashMap::new();

    // 1. Created tasks, capturing temp -> authoritative ids
    for created in &req.created_tasks {
        if task_ids.contains_key(&created.temp_id) {
            return Err(StoreError::Validation(format!(
                "duplicate temporary task id {}",
                created.temp_id
            )));
        }
        let task = insert_task(tx, project_id, &created.task)?;
        task_ids.insert(created.temp_id.clone(), task.id);
    }

    // 2. Task updates
    for updated in &req.updated_tasks {
        apply_task_update(tx, project_id, updated.id, &updated.changes)?;
    }

    // 3. Task deletions (incident dependencies first)
    for task_id in &req.deleted_task_ids {
        remove_task(tx, project_id, *task_id)?;
    }

    let resolve = |task: &TaskRef| -> StoreResult<i64> {
        match task {
            TaskRef::Id(id) => Ok(*id),
            TaskRef::Temp(temp) => task_ids.get(temp).copied().ok_or_else(|| {
                StoreError::Validation(format!("unknown temporary task id {temp}"))
            }),
        }
    };

    // 4. Created dependencies, endpoints translated through the id map
    for created in &req.created_dependencies {
        if dependency_ids.contains_key(&created.temp_id) {
            return Err(StoreError::Validation(format!(
                "duplicate temporary dependency id {}",
                created.temp_id
            )));
        }
        let from_task = resolve(&created.from_task)?;
        let to_task = resolve(&created.to_task)?;
        let dep = insert_dependency(tx, project_id, from_task, to_task)?;
        dependency_ids.insert(created.temp_id.clone(), dep.id);
    }

    // 5. Dependency updates
    for updated in &req.updated_dependencies {
        let current = load_dependency(tx, project_id, updated.id)?;
        let from_task = match updated.from_task {
            Some(ref r) => resolve(r)?,
            None => current.from_task,
        };
        let to_task = match updated.to_task {
            Some(ref r) => resolve(r)?,
            None => current.to_task,
        };
        check_endpoints(tx, project_id, from_task, to_task)?;
        tx.execute(
            "UPDATE dependencies SET from_task = ?1, to_task = ?2 WHERE id = ?3 AND project_id = ?4",
            params![from_task, to_task, updated.id, project_id],
        )?;
    }

    // 6. Dependency deletions. Rows already removed by a task deletion above
    //    are not an error.
    for dependency_id in &req.deleted_dependency_ids {
        tx.execute(
            "DELETE FROM dependencies WHERE id = ?1 AND project_id = ?2",
            params![dependency_id, project_id],
        )?;
    }

    if reject_cycles {
        ensure_acyclic(tx, project_id)?;
    }

    Ok(BulkChangeResponse {
        task_ids,
        dependency_ids,
    })
}

#[async_trait]
impl TaskStore for SqliteStore {
    async fn health_check(&self) -> StoreResult<bool> {
        self.with_conn(|conn| {
            let one: i64 = conn.query_row("SELECT 1", [], |row| row.get(0))?;
            Ok(one == 1)
        })
        .await
    }

    // ========================================================================
    // Users & sessions
    // ========================================================================

    async fn create_user(
        &self,
        email: &str,
        name: &str,
        password_hash: &str,
    ) -> StoreResult<UserNode> {
        let (email, name, password_hash) =
            (email.to_string(), name.to_string(), password_hash.to_string());
        self.with_conn(move |conn| {
            let now = Utc::now();
            conn.execute(
                "INSERT INTO users (email, name, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![email, name, password_hash, ts(now)],
            )?;
            Ok(UserNode {
                id: conn.last_insert_rowid(),
                email,
                name,
                password_hash,
                created_at: now,
            })
        })
        .await
    }

    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<UserNode>> {
        let email = email.to_string();
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT id, email, name, password_hash, created_at FROM users WHERE email = ?1",
                    params![email],
                    user_from_row,
                )
                .optional()?)
        })
        .await
    }

    async fn get_user(&self, id: i64) -> StoreResult<Option<UserNode>> {
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT id, email, name, password_hash, created_at FROM users WHERE id = ?1",
                    params![id],
                    user_from_row,
                )
                .optional()?)
        })
        .await
    }

    async fn create_session(
        &self,
        token_hash: &str,
        user_id: i64,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let token_hash = token_hash.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO sessions (token_hash, user_id, expires_at) VALUES (?1, ?2, ?3)",
                params![token_hash, user_id, ts(expires_at)],
            )?;
            Ok(())
        })
        .await
    }

    async fn validate_session(&self, token_hash: &str) -> StoreResult<Option<SessionNode>> {
        let token_hash = token_hash.to_string();
        self.with_conn(move |conn| {
            let session = conn
                .query_row(
                    "SELECT token_hash, user_id, expires_at FROM sessions WHERE token_hash = ?1",
                    params![token_hash],
                    |row| {
                        Ok(SessionNode {
                            token_hash: row.get(0)?,
                            user_id: row.get(1)?,
                            expires_at: parse_ts(2, row.get(2)?)?,
                        })
                    },
                )
                .optional()?;
            Ok(session.filter(|s| s.expires_at > Utc::now()))
        })
        .await
    }

    async fn delete_session(&self, token_hash: &str) -> StoreResult<()> {
        let token_hash = token_hash.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM sessions WHERE token_hash = ?1",
                params![token_hash],
            )?;
            Ok(())
        })
        .await
    }

    // ========================================================================
    // Projects
    // ========================================================================

    async fn create_project(&self, owner_id: i64, name: &str) -> StoreResult<ProjectNode> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            let now = Utc::now();
            conn.execute(
                "INSERT INTO projects (name, owner_id, created_at) VALUES (?1, ?2, ?3)",
                params![name, owner_id, ts(now)],
            )?;
            Ok(ProjectNode {
                id: conn.last_insert_rowid(),
                name,
                owner_id,
                created_at: now,
            })
        })
        .await
    }

    async fn get_project(&self, id: i64) -> StoreResult<Option<ProjectNode>> {
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT id, name, owner_id, created_at FROM projects WHERE id = ?1",
                    params![id],
                    project_from_row,
                )
                .optional()?)
        })
        .await
    }

    async fn list_projects(&self, owner_id: i64) -> StoreResult<Vec<ProjectNode>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, owner_id, created_at FROM projects WHERE owner_id = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![owner_id], project_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    async fn delete_project(&self, id: i64) -> StoreResult<()> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM dependencies WHERE project_id = ?1", params![id])?;
            let removed = tx.execute("DELETE FROM projects WHERE id = ?1", params![id])?;
            if removed == 0 {
                return Err(StoreError::NotFound(format!("project {id}")));
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    // ========================================================================
    // Tasks
    // ========================================================================

    async fn list_tasks(&self, project_id: i64) -> StoreResult<Vec<TaskNode>> {
        self.with_conn(move |conn| select_tasks(conn, project_id)).await
    }

    async fn create_task(&self, project_id: i64, req: &CreateTaskRequest) -> StoreResult<TaskNode> {
        let req = req.clone();
        self.with_conn(move |conn| insert_task(conn, project_id, &req))
            .await
    }

    async fn update_task(
        &self,
        project_id: i64,
        task_id: i64,
        req: &UpdateTaskRequest,
    ) -> StoreResult<TaskNode> {
        let req = req.clone();
        self.with_conn(move |conn| apply_task_update(conn, project_id, task_id, &req))
            .await
    }

    async fn delete_task(&self, project_id: i64, task_id: i64) -> StoreResult<()> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            remove_task(&tx, project_id, task_id)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    // ========================================================================
    // Dependencies
    // ========================================================================

    async fn list_dependencies(&self, project_id: i64) -> StoreResult<Vec<DependencyNode>> {
        self.with_conn(move |conn| select_dependencies(conn, project_id))
            .await
    }

    async fn create_dependency(
        &self,
        project_id: i64,
        from_task: i64,
        to_task: i64,
    ) -> StoreResult<DependencyNode> {
        let reject_cycles = self.reject_cycles;
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let dep = insert_dependency(&tx, project_id, from_task, to_task)?;
            if reject_cycles {
                ensure_acyclic(&tx, project_id)?;
            }
            tx.commit()?;
            Ok(dep)
        })
        .await
    }

    async fn delete_dependency(&self, project_id: i64, dependency_id: i64) -> StoreResult<()> {
        self.with_conn(move |conn| {
            let removed = conn.execute(
                "DELETE FROM dependencies WHERE id = ?1 AND project_id = ?2",
                params![dependency_id, project_id],
            )?;
            if removed == 0 {
                return Err(StoreError::NotFound(format!("dependency {dependency_id}")));
            }
            Ok(())
        })
        .await
    }

    // ========================================================================
    // Bulk
    // ========================================================================

    async fn bulk_change(
        &self,
        project_id: i64,
        req: &BulkChangeRequest,
    ) -> StoreResult<BulkChangeResponse> {
        let req = req.clone();
        let reject_cycles = self.reject_cycles;
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            // Dropping `tx` on the error path rolls everything back
            let response = apply_bulk(&tx, project_id, &req, reject_cycles)?;
            tx.commit()?;
            debug!(
                project_id,
                created_tasks = response.task_ids.len(),
                created_dependencies = response.dependency_ids.len(),
                "Bulk change committed"
            );
            Ok(response)
        })
        .await
    }

    async fn get_project_graph(&self, project_id: i64) -> StoreResult<ProjectGraph> {
        self.with_conn(move |conn| {
            Ok(ProjectGraph {
                project_id,
                tasks: select_tasks(conn, project_id)?,
                dependencies: select_dependencies(conn, project_id)?,
            })
        })
        .await
    }
}
