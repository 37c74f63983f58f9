//! Campaign database operations

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::{CampaignStore, PgStore, StoreError, StoreResult};
use crate::models::{AgentDetails, BusinessInformation, Campaign, CampaignStatus, Client};

#[derive(sqlx::FromRow)]
struct CampaignRow {
    id: Uuid,
    user_id: String,
    name: String,
    status: String,
    business_information: Json<serde_json::Value>,
    clients: Json<serde_json::Value>,
    message_taking: Json<serde_json::Value>,
    agent_details: Json<serde_json::Value>,
    assistant_id: Option<String>,
    phone_number_id: Option<String>,
    version: i64,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<CampaignRow> for Campaign {
    type Error = StoreError;

    fn try_from(row: CampaignRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<CampaignStatus>()
            .map_err(|e| StoreError::InvalidRow(format!("campaign {}: {}", row.id, e)))?;

        let clients = match row.clients.0 {
            serde_json::Value::Null => Vec::new(),
            value => serde_json::from_value::<Vec<Client>>(value)
                .map_err(|e| StoreError::InvalidRow(format!("campaign {} clients: {}", row.id, e)))?,
        };

        let business_information = if row.business_information.0.is_null() {
            BusinessInformation::default()
        } else {
            serde_json::from_value(row.business_information.0).unwrap_or_else(|e| {
                tracing::warn!(campaign_id = %row.id, "Unreadable business information: {}", e);
                BusinessInformation::default()
            })
        };

        let agent_details = if row.agent_details.0.is_null() {
            AgentDetails::default()
        } else {
            serde_json::from_value(row.agent_details.0).unwrap_or_else(|e| {
                tracing::warn!(campaign_id = %row.id, "Unreadable agent details: {}", e);
                AgentDetails::default()
            })
        };

        Ok(Campaign {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            status,
            business_information,
            clients,
            message_taking: row.message_taking.0,
            agent_details,
            assistant_id: row.assistant_id,
            phone_number_id: row.phone_number_id,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub async fn get_all(pool: &PgPool) -> StoreResult<Vec<Campaign>> {
    let rows = sqlx::query_as::<_, CampaignRow>(
        r#"
        SELECT id, user_id, name, status, business_information, clients,
               message_taking, agent_details, assistant_id, phone_number_id,
               version, created_at, updated_at
        FROM campaigns
        ORDER BY created_at ASC
        "#
    )
    .fetch_all(pool)
    .await?;

    // Unreadable rows are skipped, not fatal.
    let mut campaigns = Vec::with_capacity(rows.len());
    for row in rows {
        let id = row.id;
        match Campaign::try_from(row) {
            Ok(campaign) => campaigns.push(campaign),
            Err(e) => tracing::error!(campaign_id = %id, "Skipping campaign: {}", e),
        }
    }
    Ok(campaigns)
}

pub async fn get_by_id(pool: &PgPool, id: Uuid) -> StoreResult<Option<Campaign>> {
    sqlx::query_as::<_, CampaignRow>(
        r#"
        SELECT id, user_id, name, status, business_information, clients,
               message_taking, agent_details, assistant_id, phone_number_id,
               version, created_at, updated_at
        FROM campaigns
        WHERE id = $1
        "#
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .map(Campaign::try_from)
    .transpose()
}

pub async fn update_clients(
    pool: &PgPool,
    id: Uuid,
    clients: &[Client],
    expected_version: i64,
) -> StoreResult<i64> {
    let document = serde_json::to_value(clients)
        .map_err(|e| StoreError::InvalidRow(format!("campaign {} clients: {}", id, e)))?;

    let updated: Option<(i64,)> = sqlx::query_as(
        r#"
        UPDATE campaigns
        SET clients = $2, version = version + 1, updated_at = NOW()
        WHERE id = $1 AND version = $3
        RETURNING version
        "#
    )
    .bind(id)
    .bind(Json(document))
    .bind(expected_version)
    .fetch_optional(pool)
    .await?;

    if let Some((version,)) = updated {
        return Ok(version);
    }

    let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM campaigns WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    match exists {
        Some(_) => Err(StoreError::VersionConflict { id, expected: expected_version }),
        None => Err(StoreError::CampaignNotFound(id)),
    }
}

pub async fn update_status(pool: &PgPool, id: Uuid, status: CampaignStatus) -> StoreResult<()> {
    let result = sqlx::query("UPDATE campaigns SET status = $2, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .bind(status.as_str())
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::CampaignNotFound(id));
    }
    Ok(())
}

#[async_trait::async_trait]
impl CampaignStore for PgStore {
    async fn list_campaigns(&self) -> StoreResult<Vec<Campaign>> {
        get_all(&self.pool).await
    }

    async fn get_campaign(&self, id: Uuid) -> StoreResult<Option<Campaign>> {
        get_by_id(&self.pool, id).await
    }

    async fn update_campaign_clients(
        &self,
        id: Uuid,
        clients: &[Client],
        expected_version: i64,
    ) -> StoreResult<i64> {
        update_clients(&self.pool, id, clients, expected_version).await
    }

    async fn update_campaign_status(&self, id: Uuid, status: CampaignStatus) -> StoreResult<()> {
        update_status(&self.pool, id, status).await
    }
}
