//! Custom tools and integrations — the dynamic half of the tool catalog.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use envoy_domain::error::Result;

use crate::model::{ConfigKey, CustomToolRow, IntegrationRow};
use crate::{db_err, Store};

fn parse_ts(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn tool_from_row(row: &Row<'_>) -> rusqlite::Result<CustomToolRow> {
    Ok(CustomToolRow {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        input_schema: row.get(3)?,
        code: row.get(4)?,
        enabled: row.get::<_, i64>(5)? != 0,
        integration_id: row.get(6)?,
        created_at: parse_ts(row.get(7)?),
        updated_at: parse_ts(row.get(8)?),
    })
}

const TOOL_COLS: &str =
    "id, name, description, input_schema, code, enabled, integration_id, created_at, updated_at";

fn integration_from_row(row: &Row<'_>) -> rusqlite::Result<IntegrationRow> {
    let schema_raw: String = row.get(3)?;
    let config_schema: Vec<ConfigKey> = serde_json::from_str(&schema_raw).unwrap_or_default();
    Ok(IntegrationRow {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        config_schema,
        enabled: row.get::<_, i64>(4)? != 0,
        created_at: parse_ts(row.get(5)?),
        updated_at: parse_ts(row.get(6)?),
    })
}

const INTEGRATION_COLS: &str =
    "id, name, description, config_schema, enabled, created_at, updated_at";

impl Store {
    // ── Custom tools ──────────────────────────────────────────────────

    /// Insert a tool. `integration_id = None` makes it standalone.
    pub async fn create_custom_tool(
        &self,
        name: &str,
        description: &str,
        input_schema: &str,
        code: &str,
        integration_id: Option<&str>,
    ) -> Result<CustomToolRow> {
        let now = Utc::now();
        let row = CustomToolRow {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: description.to_string(),
            input_schema: input_schema.to_string(),
            code: code.to_string(),
            enabled: true,
            integration_id: integration_id.map(String::from),
            created_at: now,
            updated_at: now,
        };
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO custom_tools
                 (id, name, description, input_schema, code, enabled, integration_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?7, ?8)",
            params![
                row.id,
                row.name,
                row.description,
                row.input_schema,
                row.code,
                row.integration_id,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )
        .map_err(db_err)?;
        Ok(row)
    }

    /// Overwrite the mutable fields of a tool (matched by id).
    pub async fn update_custom_tool(&self, row: &CustomToolRow) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE custom_tools
             SET description = ?2, input_schema = ?3, code = ?4, enabled = ?5, updated_at = ?6
             WHERE id = ?1",
            params![
                row.id,
                row.description,
                row.input_schema,
                row.code,
                row.enabled as i64,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn get_tool_by_name(&self, name: &str) -> Result<Option<CustomToolRow>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            &format!("SELECT {TOOL_COLS} FROM custom_tools WHERE name = ?1"),
            params![name],
            tool_from_row,
        )
        .optional()
        .map_err(db_err)
    }

    pub async fn tool_name_exists(&self, name: &str) -> Result<bool> {
        Ok(self.get_tool_by_name(name).await?.is_some())
    }

    pub async fn list_custom_tools(&self) -> Result<Vec<CustomToolRow>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(&format!("SELECT {TOOL_COLS} FROM custom_tools ORDER BY name ASC"))
            .map_err(db_err)?;
        let rows = stmt.query_map([], tool_from_row).map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// Enabled tools that belong to no integration.
    pub async fn list_enabled_standalone_tools(&self) -> Result<Vec<CustomToolRow>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {TOOL_COLS} FROM custom_tools
                 WHERE enabled = 1 AND integration_id IS NULL ORDER BY name ASC"
            ))
            .map_err(db_err)?;
        let rows = stmt.query_map([], tool_from_row).map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// Enabled tools of enabled integrations, paired with the owning
    /// integration name.
    pub async fn list_enabled_integration_tools(&self) -> Result<Vec<(String, CustomToolRow)>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT i.name,
                        t.id, t.name, t.description, t.input_schema, t.code, t.enabled,
                        t.integration_id, t.created_at, t.updated_at
                 FROM custom_tools t
                 JOIN integrations i ON i.id = t.integration_id
                 WHERE t.enabled = 1 AND i.enabled = 1
                 ORDER BY i.name ASC, t.name ASC",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| {
                let integration: String = row.get(0)?;
                let tool = CustomToolRow {
                    id: row.get(1)?,
                    name: row.get(2)?,
                    description: row.get(3)?,
                    input_schema: row.get(4)?,
                    code: row.get(5)?,
                    enabled: row.get::<_, i64>(6)? != 0,
                    integration_id: row.get(7)?,
                    created_at: parse_ts(row.get(8)?),
                    updated_at: parse_ts(row.get(9)?),
                };
                Ok((integration, tool))
            })
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    pub async fn list_tools_for_integration(
        &self,
        integration_id: &str,
    ) -> Result<Vec<CustomToolRow>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {TOOL_COLS} FROM custom_tools WHERE integration_id = ?1 ORDER BY name ASC"
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![integration_id], tool_from_row)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    pub async fn delete_tool_by_name(&self, name: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        let n = conn
            .execute("DELETE FROM custom_tools WHERE name = ?1", params![name])
            .map_err(db_err)?;
        Ok(n > 0)
    }

    // ── Integrations ──────────────────────────────────────────────────

    pub async fn create_integration(
        &self,
        name: &str,
        description: &str,
        config_schema: &[ConfigKey],
    ) -> Result<IntegrationRow> {
        let now = Utc::now();
        let row = IntegrationRow {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: description.to_string(),
            config_schema: config_schema.to_vec(),
            enabled: true,
            created_at: now,
            updated_at: now,
        };
        let schema_json = serde_json::to_string(&row.config_schema)?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO integrations (id, name, description, config_schema, enabled, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6)",
            params![row.id, row.name, row.description, schema_json, now.to_rfc3339(), now.to_rfc3339()],
        )
        .map_err(db_err)?;
        Ok(row)
    }

    pub async fn get_integration_by_name(&self, name: &str) -> Result<Option<IntegrationRow>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            &format!("SELECT {INTEGRATION_COLS} FROM integrations WHERE name = ?1"),
            params![name],
            integration_from_row,
        )
        .optional()
        .map_err(db_err)
    }

    pub async fn integration_name_exists(&self, name: &str) -> Result<bool> {
        Ok(self.get_integration_by_name(name).await?.is_some())
    }

    pub async fn list_integrations(&self) -> Result<Vec<IntegrationRow>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {INTEGRATION_COLS} FROM integrations ORDER BY name ASC"
            ))
            .map_err(db_err)?;
        let rows = stmt.query_map([], integration_from_row).map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// Delete an integration; its tools cascade.
    pub async fn delete_integration_by_name(&self, name: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        let n = conn
            .execute("DELETE FROM integrations WHERE name = ?1", params![name])
            .map_err(db_err)?;
        Ok(n > 0)
    }
}
