//! Persistence for `contacts` (spec.md §4.6 step 6, §6.4).

use sqlx::Row;
use uuid::Uuid;

use crate::domain::{CallId, Contact, ContactId, TenantId};
use crate::error::Result;

use super::DatabaseManager;

impl DatabaseManager {
    pub async fn contact_by_tenant_phone(
        &self,
        tenant_id: TenantId,
        phone: &str,
    ) -> Result<Option<Contact>> {
        let row = sqlx::query(
            "SELECT id, tenant_id, phone, name, email, company, tags,
                    is_auto_created, auto_creation_source, auto_created_from_call_id, created_at
             FROM contacts WHERE tenant_id = $1 AND phone = $2",
        )
        .bind(tenant_id)
        .bind(phone)
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(row_to_contact).transpose()
    }

    /// spec.md §4.6 step 6: "must be idempotent on (tenant, phone)" —
    /// `on conflict do nothing` per §5, then a re-select for the caller
    /// since the conflicting insert returns no row.
    pub async fn auto_create_contact(
        &self,
        tenant_id: TenantId,
        phone: &str,
        name: Option<&str>,
        email: Option<&str>,
        company: Option<&str>,
        from_call_id: CallId,
    ) -> Result<Contact> {
        let id = Uuid::new_v4();
        let inserted = sqlx::query(
            "INSERT INTO contacts
                (id, tenant_id, phone, name, email, company, tags, is_auto_created,
                 auto_creation_source, auto_created_from_call_id, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, '{}', true, 'webhook', $7, now())
             ON CONFLICT (tenant_id, phone) DO NOTHING
             RETURNING id, tenant_id, phone, name, email, company, tags,
                       is_auto_created, auto_creation_source, auto_created_from_call_id, created_at",
        )
        .bind(id)
        .bind(tenant_id)
        .bind(phone)
        .bind(name)
        .bind(email)
        .bind(company)
        .bind(from_call_id)
        .fetch_optional(self.pool())
        .await?;

        match inserted {
            Some(row) => row_to_contact(&row),
            None => self
                .contact_by_tenant_phone(tenant_id, phone)
                .await?
                .ok_or_else(|| {
                    crate::error::CallCoreError::internal(
                        "auto_create_contact: conflict but no existing row found",
                    )
                }),
        }
    }

    pub async fn create_contact(
        &self,
        tenant_id: TenantId,
        phone: &str,
        name: Option<&str>,
        email: Option<&str>,
        company: Option<&str>,
        tags: &[String],
    ) -> Result<Contact> {
        let id = Uuid::new_v4();
        let row = sqlx::query(
            "INSERT INTO contacts
                (id, tenant_id, phone, name, email, company, tags, is_auto_created,
                 auto_creation_source, auto_created_from_call_id, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, false, NULL, NULL, now())
             RETURNING id, tenant_id, phone, name, email, company, tags,
                       is_auto_created, auto_creation_source, auto_created_from_call_id, created_at",
        )
        .bind(id)
        .bind(tenant_id)
        .bind(phone)
        .bind(name)
        .bind(email)
        .bind(company)
        .bind(tags)
        .fetch_one(self.pool())
        .await?;

        row_to_contact(&row)
    }

    pub async fn tag_contact_dnc(&self, contact_id: ContactId) -> Result<()> {
        sqlx::query(
            "UPDATE contacts SET tags = array_append(tags, 'DNC')
             WHERE id = $1 AND NOT ('DNC' = ANY(tags))",
        )
        .bind(contact_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}

fn row_to_contact(row: &sqlx::postgres::PgRow) -> Result<Contact> {
    Ok(Contact {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        phone: row.try_get("phone")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        company: row.try_get("company")?,
        tags: row.try_get("tags")?,
        is_auto_created: row.try_get("is_auto_created")?,
        auto_creation_source: row.try_get("auto_creation_source")?,
        auto_created_from_call_id: row.try_get("auto_created_from_call_id")?,
        created_at: row.try_get("created_at")?,
    })
}
