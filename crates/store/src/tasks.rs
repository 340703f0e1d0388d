//! Scheduled tasks and their run records.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use envoy_domain::error::Result;

use crate::model::{RunStatus, ScheduledTaskRow, TaskRunRow};
use crate::{db_err, Store};

fn parse_ts(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<ScheduledTaskRow> {
    Ok(ScheduledTaskRow {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        cron: row.get(3)?,
        enabled: row.get::<_, i64>(4)? != 0,
        created_at: parse_ts(row.get(5)?),
        updated_at: parse_ts(row.get(6)?),
    })
}

const TASK_COLS: &str = "id, name, description, cron, enabled, created_at, updated_at";

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<TaskRunRow> {
    let status_raw: String = row.get(2)?;
    Ok(TaskRunRow {
        id: row.get(0)?,
        task_id: row.get(1)?,
        status: RunStatus::parse(&status_raw).unwrap_or(RunStatus::Error),
        result: row.get(3)?,
        output: row.get(4)?,
        started_at: parse_ts(row.get(5)?),
        finished_at: row.get::<_, Option<String>>(6)?.map(parse_ts),
    })
}

const RUN_COLS: &str = "id, task_id, status, result, output, started_at, finished_at";

impl Store {
    // ── Tasks ─────────────────────────────────────────────────────────

    pub async fn create_task(
        &self,
        name: &str,
        description: &str,
        cron: &str,
    ) -> Result<ScheduledTaskRow> {
        let now = Utc::now();
        let row = ScheduledTaskRow {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: description.to_string(),
            cron: cron.to_string(),
            enabled: true,
            created_at: now,
            updated_at: now,
        };
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO scheduled_tasks (id, name, description, cron, enabled, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6)",
            params![row.id, row.name, row.description, row.cron, now.to_rfc3339(), now.to_rfc3339()],
        )
        .map_err(db_err)?;
        Ok(row)
    }

    pub async fn update_task(&self, row: &ScheduledTaskRow) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE scheduled_tasks
             SET description = ?2, cron = ?3, enabled = ?4, updated_at = ?5
             WHERE id = ?1",
            params![
                row.id,
                row.description,
                row.cron,
                row.enabled as i64,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn get_task(&self, id: &str) -> Result<Option<ScheduledTaskRow>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            &format!("SELECT {TASK_COLS} FROM scheduled_tasks WHERE id = ?1"),
            params![id],
            task_from_row,
        )
        .optional()
        .map_err(db_err)
    }

    pub async fn get_task_by_name(&self, name: &str) -> Result<Option<ScheduledTaskRow>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            &format!("SELECT {TASK_COLS} FROM scheduled_tasks WHERE name = ?1"),
            params![name],
            task_from_row,
        )
        .optional()
        .map_err(db_err)
    }

    pub async fn list_tasks(&self) -> Result<Vec<ScheduledTaskRow>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(&format!("SELECT {TASK_COLS} FROM scheduled_tasks ORDER BY name ASC"))
            .map_err(db_err)?;
        let rows = stmt.query_map([], task_from_row).map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// Delete a task (runs cascade). Returns the removed row so the
    /// caller can unschedule its live job.
    pub async fn delete_task_by_name(&self, name: &str) -> Result<Option<ScheduledTaskRow>> {
        let existing = self.get_task_by_name(name).await?;
        if let Some(ref task) = existing {
            let conn = self.conn.lock().await;
            conn.execute("DELETE FROM scheduled_tasks WHERE id = ?1", params![task.id])
                .map_err(db_err)?;
        }
        Ok(existing)
    }

    // ── Runs ──────────────────────────────────────────────────────────

    /// Record the start of a run (status `running`).
    pub async fn insert_run(&self, task_id: &str) -> Result<TaskRunRow> {
        let now = Utc::now();
        let row = TaskRunRow {
            id: uuid::Uuid::new_v4().to_string(),
            task_id: task_id.to_string(),
            status: RunStatus::Running,
            result: None,
            output: None,
            started_at: now,
            finished_at: None,
        };
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO task_runs (id, task_id, status, started_at) VALUES (?1, ?2, 'running', ?3)",
            params![row.id, row.task_id, now.to_rfc3339()],
        )
        .map_err(db_err)?;
        Ok(row)
    }

    pub async fn complete_run(
        &self,
        run_id: &str,
        status: RunStatus,
        result: Option<&str>,
        output: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE task_runs SET status = ?2, result = ?3, output = ?4, finished_at = ?5
             WHERE id = ?1",
            params![run_id, status.as_str(), result, output, Utc::now().to_rfc3339()],
        )
        .map_err(db_err)?;
        Ok(())
    }

    /// Concurrency guard: is any run of this task still in flight?
    pub async fn has_running_run(&self, task_id: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM task_runs WHERE task_id = ?1 AND status = 'running'",
                params![task_id],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(count > 0)
    }

    pub async fn list_runs(&self, task_id: &str, limit: usize) -> Result<Vec<TaskRunRow>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {RUN_COLS} FROM task_runs WHERE task_id = ?1
                 ORDER BY started_at DESC LIMIT ?2"
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![task_id, limit as i64], run_from_row)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    pub async fn latest_run(&self, task_id: &str) -> Result<Option<TaskRunRow>> {
        Ok(self.list_runs(task_id, 1).await?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn task_create_delete_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        store.create_task("digest", "summarize the news", "0 9 * * *").await.unwrap();
        assert_eq!(store.list_tasks().await.unwrap().len(), 1);

        let removed = store.delete_task_by_name("digest").await.unwrap();
        assert!(removed.is_some());
        assert!(store.list_tasks().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn at_most_one_running_run() {
        let store = Store::open_in_memory().unwrap();
        let task = store.create_task("t", "d", "* * * * *").await.unwrap();

        assert!(!store.has_running_run(&task.id).await.unwrap());
        let run = store.insert_run(&task.id).await.unwrap();
        assert!(store.has_running_run(&task.id).await.unwrap());

        store
            .complete_run(&run.id, RunStatus::Success, Some("done"), Some("[]"))
            .await
            .unwrap();
        assert!(!store.has_running_run(&task.id).await.unwrap());

        let latest = store.latest_run(&task.id).await.unwrap().unwrap();
        assert_eq!(latest.status, RunStatus::Success);
        assert_eq!(latest.result.as_deref(), Some("done"));
        assert!(latest.finished_at.is_some());
    }

    #[tokio::test]
    async fn deleting_task_cascades_runs() {
        let store = Store::open_in_memory().unwrap();
        let task = store.create_task("t", "d", "* * * * *").await.unwrap();
        store.insert_run(&task.id).await.unwrap();

        store.delete_task_by_name("t").await.unwrap();
        assert!(store.list_runs(&task.id, 10).await.unwrap().is_empty());
    }
}
