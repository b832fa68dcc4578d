use crate::model::{
    ApiKey, Certificate, Course, CreditTransaction, Enrollment, Id, Invitation, Member,
    Organization, RateLimitConfig, Subscription, Theme, Timestamp, UsageCounter,
};
use anyhow::Result;

#[async_trait::async_trait]
pub trait OrganizationStore: Send + Sync {
    async fn get_organization(&self, id: &Id) -> Result<Option<Organization>>;
    async fn get_organization_by_slug(&self, slug: &str) -> Result<Option<Organization>>;
    /// Organizations the user is a member of
    async fn list_organizations_for_user(&self, user_id: &str) -> Result<Vec<Organization>>;
    async fn upsert_organization(&self, organization: Organization) -> Result<()>;
    /// Deletes the organization together with everything it owns
    async fn delete_organization(&self, id: &Id) -> Result<bool>;
}

#[async_trait::async_trait]
pub trait MemberStore: Send + Sync {
    async fn get_member(&self, organization_id: &Id, user_id: &str) -> Result<Option<Member>>;
    async fn list_members(&self, organization_id: &Id) -> Result<Vec<Member>>;
    async fn upsert_member(&self, member: Member) -> Result<()>;
    async fn delete_member(&self, organization_id: &Id, user_id: &str) -> Result<bool>;
}

#[async_trait::async_trait]
pub trait InvitationStore: Send + Sync {
    async fn get_invitation(&self, id: &Id) -> Result<Option<Invitation>>;
    async fn get_invitation_by_token_hash(&self, token_hash: &str) -> Result<Option<Invitation>>;
    async fn list_invitations(&self, organization_id: &Id) -> Result<Vec<Invitation>>;
    async fn upsert_invitation(&self, invitation: Invitation) -> Result<()>;
}

#[async_trait::async_trait]
pub trait ApiKeyStore: Send + Sync {
    async fn get_api_key(&self, id: &Id) -> Result<Option<ApiKey>>;
    async fn get_api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>>;
    async fn list_api_keys(&self, organization_id: &Id) -> Result<Vec<ApiKey>>;
    async fn upsert_api_key(&self, api_key: ApiKey) -> Result<()>;
    async fn touch_api_key(&self, id: &Id, used_at: Timestamp) -> Result<()>;
}

#[async_trait::async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn get_rate_limit_config(&self, organization_id: &Id) -> Result<Option<RateLimitConfig>>;
    async fn upsert_rate_limit_config(&self, config: RateLimitConfig) -> Result<()>;
    async fn delete_rate_limit_config(&self, organization_id: &Id) -> Result<bool>;
    /// Adds one request to the key's counter for `window_start` and returns the new count
    async fn increment_usage(
        &self,
        organization_id: &Id,
        api_key_id: &Id,
        window_start: Timestamp,
    ) -> Result<i64>;
    /// Counters with `window_start >= since`
    async fn list_usage(&self, organization_id: &Id, since: Timestamp) -> Result<Vec<UsageCounter>>;
    /// Total requests of the organization across all keys with `window_start >= since`
    async fn sum_usage(&self, organization_id: &Id, since: Timestamp) -> Result<i64>;
    /// Drops the organization's counters with `window_start < before`
    async fn prune_usage(&self, organization_id: &Id, before: Timestamp) -> Result<u64>;
}

#[async_trait::async_trait]
pub trait CourseStore: Send + Sync {
    async fn get_course(&self, id: &Id) -> Result<Option<Course>>;
    async fn get_course_by_slug(&self, organization_id: &Id, slug: &str) -> Result<Option<Course>>;
    async fn list_courses(&self, organization_id: &Id) -> Result<Vec<Course>>;
    async fn upsert_course(&self, course: Course) -> Result<()>;
    async fn delete_course(&self, id: &Id) -> Result<bool>;
}

#[async_trait::async_trait]
pub trait EnrollmentStore: Send + Sync {
    async fn get_enrollment(&self, id: &Id) -> Result<Option<Enrollment>>;
    async fn find_enrollment(&self, course_id: &Id, user_id: &str) -> Result<Option<Enrollment>>;
    async fn list_enrollments_for_course(&self, course_id: &Id) -> Result<Vec<Enrollment>>;
    async fn list_enrollments_for_user(&self, user_id: &str) -> Result<Vec<Enrollment>>;
    async fn upsert_enrollment(&self, enrollment: Enrollment) -> Result<()>;
}

#[async_trait::async_trait]
pub trait CertificateStore: Send + Sync {
    async fn get_certificate_for_enrollment(&self, enrollment_id: &Id) -> Result<Option<Certificate>>;
    async fn get_certificate_by_code(&self, code: &str) -> Result<Option<Certificate>>;
    async fn list_certificates_for_user(&self, user_id: &str) -> Result<Vec<Certificate>>;
    async fn insert_certificate(&self, certificate: Certificate) -> Result<()>;
}

#[async_trait::async_trait]
pub trait BillingStore: Send + Sync {
    async fn get_subscription(&self, organization_id: &Id) -> Result<Option<Subscription>>;
    async fn get_subscription_by_provider_id(
        &self,
        provider_subscription_id: &str,
    ) -> Result<Option<Subscription>>;
    async fn upsert_subscription(&self, subscription: Subscription) -> Result<()>;
    async fn get_credit_balance(&self, organization_id: &Id) -> Result<i64>;
    /// Applies the transaction atomically. Returns the new balance, or `None`
    /// (and writes nothing) when the balance would drop below zero.
    async fn apply_credit_transaction(&self, transaction: CreditTransaction) -> Result<Option<i64>>;
    /// Most recent first
    async fn list_credit_transactions(
        &self,
        organization_id: &Id,
        limit: i64,
    ) -> Result<Vec<CreditTransaction>>;
    /// Returns false when the event id was already recorded
    async fn record_webhook_event(&self, event_id: &str, event_type: &str) -> Result<bool>;
    /// Removes a recorded event id so a redelivery is processed again
    async fn forget_webhook_event(&self, event_id: &str) -> Result<()>;
}

#[async_trait::async_trait]
pub trait ThemeStore: Send + Sync {
    async fn get_theme(&self, id: &Id) -> Result<Option<Theme>>;
    async fn list_themes(&self, organization_id: &Id) -> Result<Vec<Theme>>;
    async fn upsert_theme(&self, theme: Theme) -> Result<()>;
    /// Marks the theme active and every other theme of the organization inactive
    async fn activate_theme(&self, organization_id: &Id, theme_id: &Id) -> Result<bool>;
    async fn delete_theme(&self, id: &Id) -> Result<bool>;
}

pub trait Store:
    OrganizationStore
    + MemberStore
    + InvitationStore
    + ApiKeyStore
    + RateLimitStore
    + CourseStore
    + EnrollmentStore
    + CertificateStore
    + BillingStore
    + ThemeStore
    + Send
    + Sync
{
}
