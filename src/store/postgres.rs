use anyhow::{Context, Result};
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    PgPool, Row,
};

use crate::model::{
    ApiKey, Certificate, Course, CreditTransaction, Enrollment, Id, Invitation, Member,
    Organization, RateLimitConfig, Subscription, Theme, Timestamp, UsageCounter,
};
use crate::store::traits::{
    ApiKeyStore, BillingStore, CertificateStore, CourseStore, EnrollmentStore, InvitationStore,
    MemberStore, OrganizationStore, RateLimitStore, Store, ThemeStore,
};

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store with the given database URL
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to create PostgreSQL connection pool")?;

        Ok(Self { pool })
    }

    /// Run the embedded migrations in `migrations/`
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

const ORGANIZATION_COLUMNS: &str = "id, name, slug, owner_id, created_at, updated_at";
const MEMBER_COLUMNS: &str = "organization_id, user_id, email, role, joined_at";
const INVITATION_COLUMNS: &str = "id, organization_id, email, role, token_hash, invited_by, status, expires_at, created_at, accepted_at";
const API_KEY_COLUMNS: &str = "id, organization_id, name, prefix, key_hash, created_by, created_at, last_used_at, revoked_at";
const COURSE_COLUMNS: &str = "id, organization_id, slug, title, description, status, credit_cost, created_by, created_at, updated_at";
const ENROLLMENT_COLUMNS: &str = "id, course_id, organization_id, user_id, status, progress, enrolled_at, completed_at";
const CERTIFICATE_COLUMNS: &str = "id, enrollment_id, course_id, user_id, verification_code, issued_at";
const SUBSCRIPTION_COLUMNS: &str = "organization_id, plan, status, provider_customer_id, provider_subscription_id, current_period_end, updated_at";
const THEME_COLUMNS: &str = "id, organization_id, name, settings, is_active, created_at";

fn organization_from_row(row: &PgRow) -> Result<Organization> {
    Ok(Organization {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        slug: row.try_get("slug")?,
        owner_id: row.try_get("owner_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn member_from_row(row: &PgRow) -> Result<Member> {
    Ok(Member {
        organization_id: row.try_get("organization_id")?,
        user_id: row.try_get("user_id")?,
        email: row.try_get("email")?,
        role: row.try_get::<String, _>("role")?.parse()?,
        joined_at: row.try_get("joined_at")?,
    })
}

fn invitation_from_row(row: &PgRow) -> Result<Invitation> {
    Ok(Invitation {
        id: row.try_get("id")?,
        organization_id: row.try_get("organization_id")?,
        email: row.try_get("email")?,
        role: row.try_get::<String, _>("role")?.parse()?,
        token_hash: row.try_get("token_hash")?,
        invited_by: row.try_get("invited_by")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        expires_at: row.try_get("expires_at")?,
        created_at: row.try_get("created_at")?,
        accepted_at: row.try_get("accepted_at")?,
    })
}

fn api_key_from_row(row: &PgRow) -> Result<ApiKey> {
    Ok(ApiKey {
        id: row.try_get("id")?,
        organization_id: row.try_get("organization_id")?,
        name: row.try_get("name")?,
        prefix: row.try_get("prefix")?,
        key_hash: row.try_get("key_hash")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        last_used_at: row.try_get("last_used_at")?,
        revoked_at: row.try_get("revoked_at")?,
    })
}

fn course_from_row(row: &PgRow) -> Result<Course> {
    Ok(Course {
        id: row.try_get("id")?,
        organization_id: row.try_get("organization_id")?,
        slug: row.try_get("slug")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        credit_cost: row.try_get("credit_cost")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn enrollment_from_row(row: &PgRow) -> Result<Enrollment> {
    Ok(Enrollment {
        id: row.try_get("id")?,
        course_id: row.try_get("course_id")?,
        organization_id: row.try_get("organization_id")?,
        user_id: row.try_get("user_id")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        progress: row.try_get("progress")?,
        enrolled_at: row.try_get("enrolled_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

fn certificate_from_row(row: &PgRow) -> Result<Certificate> {
    Ok(Certificate {
        id: row.try_get("id")?,
        enrollment_id: row.try_get("enrollment_id")?,
        course_id: row.try_get("course_id")?,
        user_id: row.try_get("user_id")?,
        verification_code: row.try_get("verification_code")?,
        issued_at: row.try_get("issued_at")?,
    })
}

fn subscription_from_row(row: &PgRow) -> Result<Subscription> {
    Ok(Subscription {
        organization_id: row.try_get("organization_id")?,
        plan: row.try_get::<String, _>("plan")?.parse()?,
        status: row.try_get::<String, _>("status")?.parse()?,
        provider_customer_id: row.try_get("provider_customer_id")?,
        provider_subscription_id: row.try_get("provider_subscription_id")?,
        current_period_end: row.try_get("current_period_end")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn credit_transaction_from_row(row: &PgRow) -> Result<CreditTransaction> {
    Ok(CreditTransaction {
        id: row.try_get("id")?,
        organization_id: row.try_get("organization_id")?,
        amount: row.try_get("amount")?,
        reason: row.try_get("reason")?,
        reference: row.try_get("reference")?,
        created_at: row.try_get("created_at")?,
    })
}

fn theme_from_row(row: &PgRow) -> Result<Theme> {
    Ok(Theme {
        id: row.try_get("id")?,
        organization_id: row.try_get("organization_id")?,
        name: row.try_get("name")?,
        settings: row.try_get("settings")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
    })
}

fn collect<T>(rows: Vec<PgRow>, map: fn(&PgRow) -> Result<T>) -> Result<Vec<T>> {
    rows.iter().map(map).collect()
}

#[async_trait::async_trait]
impl OrganizationStore for PostgresStore {
    async fn get_organization(&self, id: &Id) -> Result<Option<Organization>> {
        let row = sqlx::query(&format!(
            "SELECT {ORGANIZATION_COLUMNS} FROM organizations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch organization")?;

        row.as_ref().map(organization_from_row).transpose()
    }

    async fn get_organization_by_slug(&self, slug: &str) -> Result<Option<Organization>> {
        let row = sqlx::query(&format!(
            "SELECT {ORGANIZATION_COLUMNS} FROM organizations WHERE slug = $1"
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch organization by slug")?;

        row.as_ref().map(organization_from_row).transpose()
    }

    async fn list_organizations_for_user(&self, user_id: &str) -> Result<Vec<Organization>> {
        let rows = sqlx::query(
            r#"
            SELECT o.id, o.name, o.slug, o.owner_id, o.created_at, o.updated_at
            FROM organizations o
            JOIN organization_members m ON m.organization_id = o.id
            WHERE m.user_id = $1
            ORDER BY o.created_at
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list organizations")?;

        collect(rows, organization_from_row)
    }

    async fn upsert_organization(&self, organization: Organization) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO organizations (id, name, slug, owner_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                slug = EXCLUDED.slug,
                owner_id = EXCLUDED.owner_id,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&organization.id)
        .bind(&organization.name)
        .bind(&organization.slug)
        .bind(&organization.owner_id)
        .bind(organization.created_at)
        .bind(organization.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to upsert organization")?;

        Ok(())
    }

    async fn delete_organization(&self, id: &Id) -> Result<bool> {
        // Child tables cascade
        let result = sqlx::query("DELETE FROM organizations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete organization")?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait::async_trait]
impl MemberStore for PostgresStore {
    async fn get_member(&self, organization_id: &Id, user_id: &str) -> Result<Option<Member>> {
        let row = sqlx::query(&format!(
            "SELECT {MEMBER_COLUMNS} FROM organization_members WHERE organization_id = $1 AND user_id = $2"
        ))
        .bind(organization_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch member")?;

        row.as_ref().map(member_from_row).transpose()
    }

    async fn list_members(&self, organization_id: &Id) -> Result<Vec<Member>> {
        let rows = sqlx::query(&format!(
            "SELECT {MEMBER_COLUMNS} FROM organization_members WHERE organization_id = $1 ORDER BY joined_at"
        ))
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list members")?;

        collect(rows, member_from_row)
    }

    async fn upsert_member(&self, member: Member) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO organization_members (organization_id, user_id, email, role, joined_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (organization_id, user_id) DO UPDATE SET
                email = EXCLUDED.email,
                role = EXCLUDED.role
            "#,
        )
        .bind(&member.organization_id)
        .bind(&member.user_id)
        .bind(&member.email)
        .bind(member.role.as_str())
        .bind(member.joined_at)
        .execute(&self.pool)
        .await
        .context("Failed to upsert member")?;

        Ok(())
    }

    async fn delete_member(&self, organization_id: &Id, user_id: &str) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM organization_members WHERE organization_id = $1 AND user_id = $2")
                .bind(organization_id)
                .bind(user_id)
                .execute(&self.pool)
                .await
                .context("Failed to delete member")?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait::async_trait]
impl InvitationStore for PostgresStore {
    async fn get_invitation(&self, id: &Id) -> Result<Option<Invitation>> {
        let row = sqlx::query(&format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch invitation")?;

        row.as_ref().map(invitation_from_row).transpose()
    }

    async fn get_invitation_by_token_hash(&self, token_hash: &str) -> Result<Option<Invitation>> {
        let row = sqlx::query(&format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations WHERE token_hash = $1"
        ))
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch invitation by token")?;

        row.as_ref().map(invitation_from_row).transpose()
    }

    async fn list_invitations(&self, organization_id: &Id) -> Result<Vec<Invitation>> {
        let rows = sqlx::query(&format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations WHERE organization_id = $1 ORDER BY created_at"
        ))
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list invitations")?;

        collect(rows, invitation_from_row)
    }

    async fn upsert_invitation(&self, invitation: Invitation) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO invitations (id, organization_id, email, role, token_hash, invited_by, status, expires_at, created_at, accepted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                accepted_at = EXCLUDED.accepted_at
            "#,
        )
        .bind(&invitation.id)
        .bind(&invitation.organization_id)
        .bind(&invitation.email)
        .bind(invitation.role.as_str())
        .bind(&invitation.token_hash)
        .bind(&invitation.invited_by)
        .bind(invitation.status.as_str())
        .bind(invitation.expires_at)
        .bind(invitation.created_at)
        .bind(invitation.accepted_at)
        .execute(&self.pool)
        .await
        .context("Failed to upsert invitation")?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl ApiKeyStore for PostgresStore {
    async fn get_api_key(&self, id: &Id) -> Result<Option<ApiKey>> {
        let row = sqlx::query(&format!("SELECT {API_KEY_COLUMNS} FROM api_keys WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch API key")?;

        row.as_ref().map(api_key_from_row).transpose()
    }

    async fn get_api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>> {
        let row = sqlx::query(&format!(
            "SELECT {API_KEY_COLUMNS} FROM api_keys WHERE key_hash = $1"
        ))
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch API key by hash")?;

        row.as_ref().map(api_key_from_row).transpose()
    }

    async fn list_api_keys(&self, organization_id: &Id) -> Result<Vec<ApiKey>> {
        let rows = sqlx::query(&format!(
            "SELECT {API_KEY_COLUMNS} FROM api_keys WHERE organization_id = $1 ORDER BY created_at"
        ))
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list API keys")?;

        collect(rows, api_key_from_row)
    }

    async fn upsert_api_key(&self, api_key: ApiKey) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO api_keys (id, organization_id, name, prefix, key_hash, created_by, created_at, last_used_at, revoked_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                last_used_at = EXCLUDED.last_used_at,
                revoked_at = EXCLUDED.revoked_at
            "#,
        )
        .bind(&api_key.id)
        .bind(&api_key.organization_id)
        .bind(&api_key.name)
        .bind(&api_key.prefix)
        .bind(&api_key.key_hash)
        .bind(&api_key.created_by)
        .bind(api_key.created_at)
        .bind(api_key.last_used_at)
        .bind(api_key.revoked_at)
        .execute(&self.pool)
        .await
        .context("Failed to upsert API key")?;

        Ok(())
    }

    async fn touch_api_key(&self, id: &Id, used_at: Timestamp) -> Result<()> {
        sqlx::query("UPDATE api_keys SET last_used_at = $2 WHERE id = $1")
            .bind(id)
            .bind(used_at)
            .execute(&self.pool)
            .await
            .context("Failed to update API key usage time")?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl RateLimitStore for PostgresStore {
    async fn get_rate_limit_config(&self, organization_id: &Id) -> Result<Option<RateLimitConfig>> {
        let row = sqlx::query(
            "SELECT organization_id, requests_per_minute, requests_per_day, updated_at FROM rate_limit_configs WHERE organization_id = $1",
        )
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch rate limit config")?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(RateLimitConfig {
            organization_id: row.try_get("organization_id")?,
            requests_per_minute: row.try_get("requests_per_minute")?,
            requests_per_day: row.try_get("requests_per_day")?,
            updated_at: row.try_get("updated_at")?,
        }))
    }

    async fn upsert_rate_limit_config(&self, config: RateLimitConfig) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO rate_limit_configs (organization_id, requests_per_minute, requests_per_day, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (organization_id) DO UPDATE SET
                requests_per_minute = EXCLUDED.requests_per_minute,
                requests_per_day = EXCLUDED.requests_per_day,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&config.organization_id)
        .bind(config.requests_per_minute)
        .bind(config.requests_per_day)
        .bind(config.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to upsert rate limit config")?;

        Ok(())
    }

    async fn delete_rate_limit_config(&self, organization_id: &Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM rate_limit_configs WHERE organization_id = $1")
            .bind(organization_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete rate limit config")?;

        Ok(result.rows_affected() > 0)
    }

    async fn increment_usage(
        &self,
        organization_id: &Id,
        api_key_id: &Id,
        window_start: Timestamp,
    ) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO api_usage_counters (organization_id, api_key_id, window_start, count)
            VALUES ($1, $2, $3, 1)
            ON CONFLICT (organization_id, api_key_id, window_start)
            DO UPDATE SET count = api_usage_counters.count + 1
            RETURNING count
            "#,
        )
        .bind(organization_id)
        .bind(api_key_id)
        .bind(window_start)
        .fetch_one(&self.pool)
        .await
        .context("Failed to increment usage counter")?;

        Ok(row.try_get("count")?)
    }

    async fn list_usage(&self, organization_id: &Id, since: Timestamp) -> Result<Vec<UsageCounter>> {
        let rows = sqlx::query(
            r#"
            SELECT organization_id, api_key_id, window_start, count
            FROM api_usage_counters
            WHERE organization_id = $1 AND window_start >= $2
            ORDER BY window_start
            "#,
        )
        .bind(organization_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list usage counters")?;

        rows.iter()
            .map(|row| {
                Ok(UsageCounter {
                    organization_id: row.try_get("organization_id")?,
                    api_key_id: row.try_get("api_key_id")?,
                    window_start: row.try_get("window_start")?,
                    count: row.try_get("count")?,
                })
            })
            .collect()
    }
    async fn sum_usage(&self, organization_id: &Id, since: Timestamp) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(count), 0)::BIGINT AS total FROM api_usage_counters WHERE organization_id = $1 AND window_start >= $2",
        )
        .bind(organization_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .context("Failed to sum usage counters")?;

        Ok(row.try_get("total")?)
    }

    async fn prune_usage(&self, organization_id: &Id, before: Timestamp) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM api_usage_counters WHERE organization_id = $1 AND window_start < $2",
        )
        .bind(organization_id)
        .bind(before)
        .execute(&self.pool)
        .await
        .context("Failed to prune usage counters")?;

        Ok(result.rows_affected())
    }
}

#[async_trait::async_trait]
impl CourseStore for PostgresStore {
    async fn get_course(&self, id: &Id) -> Result<Option<Course>> {
        let row = sqlx::query(&format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch course")?;

        row.as_ref().map(course_from_row).transpose()
    }

    async fn get_course_by_slug(&self, organization_id: &Id, slug: &str) -> Result<Option<Course>> {
        let row = sqlx::query(&format!(
            "SELECT {COURSE_COLUMNS} FROM courses WHERE organization_id = $1 AND slug = $2"
        ))
        .bind(organization_id)
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch course by slug")?;

        row.as_ref().map(course_from_row).transpose()
    }

    async fn list_courses(&self, organization_id: &Id) -> Result<Vec<Course>> {
        let rows = sqlx::query(&format!(
            "SELECT {COURSE_COLUMNS} FROM courses WHERE organization_id = $1 ORDER BY created_at"
        ))
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list courses")?;

        collect(rows, course_from_row)
    }

    async fn upsert_course(&self, course: Course) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO courses (id, organization_id, slug, title, description, status, credit_cost, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE SET
                slug = EXCLUDED.slug,
                title = EXCLUDED.title,
                description = EXCLUDED.description,
                status = EXCLUDED.status,
                credit_cost = EXCLUDED.credit_cost,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&course.id)
        .bind(&course.organization_id)
        .bind(&course.slug)
        .bind(&course.title)
        .bind(&course.description)
        .bind(course.status.as_str())
        .bind(course.credit_cost)
        .bind(&course.created_by)
        .bind(course.created_at)
        .bind(course.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to upsert course")?;

        Ok(())
    }

    async fn delete_course(&self, id: &Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM courses WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete course")?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait::async_trait]
impl EnrollmentStore for PostgresStore {
    async fn get_enrollment(&self, id: &Id) -> Result<Option<Enrollment>> {
        let row = sqlx::query(&format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch enrollment")?;

        row.as_ref().map(enrollment_from_row).transpose()
    }

    async fn find_enrollment(&self, course_id: &Id, user_id: &str) -> Result<Option<Enrollment>> {
        let row = sqlx::query(&format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE course_id = $1 AND user_id = $2"
        ))
        .bind(course_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to find enrollment")?;

        row.as_ref().map(enrollment_from_row).transpose()
    }

    async fn list_enrollments_for_course(&self, course_id: &Id) -> Result<Vec<Enrollment>> {
        let rows = sqlx::query(&format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE course_id = $1 ORDER BY enrolled_at"
        ))
        .bind(course_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list course enrollments")?;

        collect(rows, enrollment_from_row)
    }

    async fn list_enrollments_for_user(&self, user_id: &str) -> Result<Vec<Enrollment>> {
        let rows = sqlx::query(&format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE user_id = $1 ORDER BY enrolled_at"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list user enrollments")?;

        collect(rows, enrollment_from_row)
    }

    async fn upsert_enrollment(&self, enrollment: Enrollment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO enrollments (id, course_id, organization_id, user_id, status, progress, enrolled_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                progress = EXCLUDED.progress,
                completed_at = EXCLUDED.completed_at
            "#,
        )
        .bind(&enrollment.id)
        .bind(&enrollment.course_id)
        .bind(&enrollment.organization_id)
        .bind(&enrollment.user_id)
        .bind(enrollment.status.as_str())
        .bind(enrollment.progress)
        .bind(enrollment.enrolled_at)
        .bind(enrollment.completed_at)
        .execute(&self.pool)
        .await
        .context("Failed to upsert enrollment")?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl CertificateStore for PostgresStore {
    async fn get_certificate_for_enrollment(&self, enrollment_id: &Id) -> Result<Option<Certificate>> {
        let row = sqlx::query(&format!(
            "SELECT {CERTIFICATE_COLUMNS} FROM certificates WHERE enrollment_id = $1"
        ))
        .bind(enrollment_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch certificate")?;

        row.as_ref().map(certificate_from_row).transpose()
    }

    async fn get_certificate_by_code(&self, code: &str) -> Result<Option<Certificate>> {
        let row = sqlx::query(&format!(
            "SELECT {CERTIFICATE_COLUMNS} FROM certificates WHERE verification_code = $1"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch certificate by code")?;

        row.as_ref().map(certificate_from_row).transpose()
    }

    async fn list_certificates_for_user(&self, user_id: &str) -> Result<Vec<Certificate>> {
        let rows = sqlx::query(&format!(
            "SELECT {CERTIFICATE_COLUMNS} FROM certificates WHERE user_id = $1 ORDER BY issued_at"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list certificates")?;

        collect(rows, certificate_from_row)
    }

    async fn insert_certificate(&self, certificate: Certificate) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO certificates (id, enrollment_id, course_id, user_id, verification_code, issued_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&certificate.id)
        .bind(&certificate.enrollment_id)
        .bind(&certificate.course_id)
        .bind(&certificate.user_id)
        .bind(&certificate.verification_code)
        .bind(certificate.issued_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert certificate")?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl BillingStore for PostgresStore {
    async fn get_subscription(&self, organization_id: &Id) -> Result<Option<Subscription>> {
        let row = sqlx::query(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE organization_id = $1"
        ))
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch subscription")?;

        row.as_ref().map(subscription_from_row).transpose()
    }

    async fn get_subscription_by_provider_id(
        &self,
        provider_subscription_id: &str,
    ) -> Result<Option<Subscription>> {
        let row = sqlx::query(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE provider_subscription_id = $1"
        ))
        .bind(provider_subscription_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch subscription by provider id")?;

        row.as_ref().map(subscription_from_row).transpose()
    }

    async fn upsert_subscription(&self, subscription: Subscription) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (organization_id, plan, status, provider_customer_id, provider_subscription_id, current_period_end, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (organization_id) DO UPDATE SET
                plan = EXCLUDED.plan,
                status = EXCLUDED.status,
                provider_customer_id = EXCLUDED.provider_customer_id,
                provider_subscription_id = EXCLUDED.provider_subscription_id,
                current_period_end = EXCLUDED.current_period_end,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&subscription.organization_id)
        .bind(subscription.plan.as_str())
        .bind(subscription.status.as_str())
        .bind(&subscription.provider_customer_id)
        .bind(&subscription.provider_subscription_id)
        .bind(subscription.current_period_end)
        .bind(subscription.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to upsert subscription")?;

        Ok(())
    }

    async fn get_credit_balance(&self, organization_id: &Id) -> Result<i64> {
        let row = sqlx::query("SELECT balance FROM credit_balances WHERE organization_id = $1")
            .bind(organization_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch credit balance")?;

        match row {
            Some(row) => Ok(row.try_get("balance")?),
            None => Ok(0),
        }
    }

    async fn apply_credit_transaction(&self, transaction: CreditTransaction) -> Result<Option<i64>> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query(
            "INSERT INTO credit_balances (organization_id, balance) VALUES ($1, 0) ON CONFLICT (organization_id) DO NOTHING",
        )
        .bind(&transaction.organization_id)
        .execute(&mut *tx)
        .await
        .context("Failed to initialise credit balance")?;

        let current: i64 = sqlx::query(
            "SELECT balance FROM credit_balances WHERE organization_id = $1 FOR UPDATE",
        )
        .bind(&transaction.organization_id)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to lock credit balance")?
        .try_get("balance")?;

        let Some(next) = current.checked_add(transaction.amount) else {
            tx.rollback().await.context("Failed to roll back")?;
            anyhow::bail!("Credit balance overflow for {}", transaction.organization_id);
        };
        if next < 0 {
            tx.rollback().await.context("Failed to roll back")?;
            return Ok(None);
        }

        sqlx::query("UPDATE credit_balances SET balance = $2 WHERE organization_id = $1")
            .bind(&transaction.organization_id)
            .bind(next)
            .execute(&mut *tx)
            .await
            .context("Failed to update credit balance")?;

        sqlx::query(
            r#"
            INSERT INTO credit_transactions (id, organization_id, amount, reason, reference, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&transaction.id)
        .bind(&transaction.organization_id)
        .bind(transaction.amount)
        .bind(&transaction.reason)
        .bind(&transaction.reference)
        .bind(transaction.created_at)
        .execute(&mut *tx)
        .await
        .context("Failed to record credit transaction")?;

        tx.commit().await.context("Failed to commit credit transaction")?;
        Ok(Some(next))
    }

    async fn list_credit_transactions(
        &self,
        organization_id: &Id,
        limit: i64,
    ) -> Result<Vec<CreditTransaction>> {
        let rows = sqlx::query(
            r#"
            SELECT id, organization_id, amount, reason, reference, created_at
            FROM credit_transactions
            WHERE organization_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(organization_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list credit transactions")?;

        collect(rows, credit_transaction_from_row)
    }

    async fn record_webhook_event(&self, event_id: &str, event_type: &str) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO webhook_events (event_id, event_type) VALUES ($1, $2) ON CONFLICT (event_id) DO NOTHING",
        )
        .bind(event_id)
        .bind(event_type)
        .execute(&self.pool)
        .await
        .context("Failed to record webhook event")?;

        Ok(result.rows_affected() == 1)
    }

    async fn forget_webhook_event(&self, event_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM webhook_events WHERE event_id = $1")
            .bind(event_id)
            .execute(&self.pool)
            .await
            .context("Failed to forget webhook event")?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ThemeStore for PostgresStore {
    async fn get_theme(&self, id: &Id) -> Result<Option<Theme>> {
        let row = sqlx::query(&format!("SELECT {THEME_COLUMNS} FROM themes WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch theme")?;

        row.as_ref().map(theme_from_row).transpose()
    }

    async fn list_themes(&self, organization_id: &Id) -> Result<Vec<Theme>> {
        let rows = sqlx::query(&format!(
            "SELECT {THEME_COLUMNS} FROM themes WHERE organization_id = $1 ORDER BY created_at"
        ))
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list themes")?;

        collect(rows, theme_from_row)
    }

    async fn upsert_theme(&self, theme: Theme) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO themes (id, organization_id, name, settings, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                settings = EXCLUDED.settings
            "#,
        )
        .bind(&theme.id)
        .bind(&theme.organization_id)
        .bind(&theme.name)
        .bind(&theme.settings)
        .bind(theme.is_active)
        .bind(theme.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to upsert theme")?;

        Ok(())
    }

    async fn activate_theme(&self, organization_id: &Id, theme_id: &Id) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        // Deactivate first; the partial unique index allows one active row
        sqlx::query("UPDATE themes SET is_active = FALSE WHERE organization_id = $1 AND id <> $2")
            .bind(organization_id)
            .bind(theme_id)
            .execute(&mut *tx)
            .await
            .context("Failed to deactivate themes")?;

        let result =
            sqlx::query("UPDATE themes SET is_active = TRUE WHERE organization_id = $1 AND id = $2")
                .bind(organization_id)
                .bind(theme_id)
                .execute(&mut *tx)
                .await
                .context("Failed to activate theme")?;

        if result.rows_affected() == 0 {
            tx.rollback().await.context("Failed to roll back")?;
            return Ok(false);
        }

        tx.commit().await.context("Failed to commit theme activation")?;
        Ok(true)
    }

    async fn delete_theme(&self, id: &Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM themes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete theme")?;

        Ok(result.rows_affected() > 0)
    }
}

impl Store for PostgresStore {}
