use anyhow::Result;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

use crate::model::{
    ApiKey, Certificate, Course, CreditTransaction, Enrollment, Id, Invitation, Member,
    Organization, RateLimitConfig, Subscription, Theme, Timestamp, UsageCounter,
};
use crate::store::traits::{
    ApiKeyStore, BillingStore, CertificateStore, CourseStore, EnrollmentStore, InvitationStore,
    MemberStore, OrganizationStore, RateLimitStore, Store, ThemeStore,
};

#[derive(Debug, Default)]
struct MemoryState {
    organizations: HashMap<Id, Organization>,
    members: HashMap<(Id, String), Member>,
    invitations: HashMap<Id, Invitation>,
    api_keys: HashMap<Id, ApiKey>,
    rate_limits: HashMap<Id, RateLimitConfig>,
    usage: HashMap<(Id, Id, Timestamp), UsageCounter>,
    courses: HashMap<Id, Course>,
    enrollments: HashMap<Id, Enrollment>,
    certificates: HashMap<Id, Certificate>,
    subscriptions: HashMap<Id, Subscription>,
    credit_balances: HashMap<Id, i64>,
    credit_transactions: Vec<CreditTransaction>,
    webhook_events: HashSet<String>,
    themes: HashMap<Id, Theme>,
}

/// Process-local store used by tests and `LMS_DATABASE__STORE=memory`.
///
/// A single lock guards all tables, so every trait method is atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    #[cfg(test)]
    fail_enrollment_writes: std::sync::atomic::AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later `upsert_enrollment` fail
    #[cfg(test)]
    pub(crate) fn fail_enrollment_writes(&self) {
        self.fail_enrollment_writes
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }

    #[cfg(test)]
    fn check_enrollment_write(&self) -> Result<()> {
        if self
            .fail_enrollment_writes
            .load(std::sync::atomic::Ordering::SeqCst)
        {
            anyhow::bail!("enrollment writes are disabled");
        }
        Ok(())
    }

    #[cfg(not(test))]
    fn check_enrollment_write(&self) -> Result<()> {
        Ok(())
    }
}

fn sorted_by<T, K: Ord>(mut items: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    items.sort_by_key(|item| key(item));
    items
}

#[async_trait::async_trait]
impl OrganizationStore for MemoryStore {
    async fn get_organization(&self, id: &Id) -> Result<Option<Organization>> {
        Ok(self.state.read().organizations.get(id).cloned())
    }

    async fn get_organization_by_slug(&self, slug: &str) -> Result<Option<Organization>> {
        Ok(self
            .state
            .read()
            .organizations
            .values()
            .find(|org| org.slug == slug)
            .cloned())
    }

    async fn list_organizations_for_user(&self, user_id: &str) -> Result<Vec<Organization>> {
        let state = self.state.read();
        let organizations = state
            .members
            .values()
            .filter(|member| member.user_id == user_id)
            .filter_map(|member| state.organizations.get(&member.organization_id).cloned())
            .collect();
        Ok(sorted_by(organizations, |org: &Organization| org.created_at))
    }

    async fn upsert_organization(&self, organization: Organization) -> Result<()> {
        self.state
            .write()
            .organizations
            .insert(organization.id.clone(), organization);
        Ok(())
    }

    async fn delete_organization(&self, id: &Id) -> Result<bool> {
        let mut state = self.state.write();
        if state.organizations.remove(id).is_none() {
            return Ok(false);
        }

        state.members.retain(|(org_id, _), _| org_id != id);
        state.invitations.retain(|_, inv| &inv.organization_id != id);
        state.api_keys.retain(|_, key| &key.organization_id != id);
        state.rate_limits.remove(id);
        state.usage.retain(|(org_id, _, _), _| org_id != id);

        let course_ids: HashSet<Id> = state
            .courses
            .values()
            .filter(|course| &course.organization_id == id)
            .map(|course| course.id.clone())
            .collect();
        state.courses.retain(|course_id, _| !course_ids.contains(course_id));
        state.enrollments.retain(|_, e| &e.organization_id != id);
        state
            .certificates
            .retain(|_, cert| !course_ids.contains(&cert.course_id));

        state.subscriptions.remove(id);
        state.credit_balances.remove(id);
        state.credit_transactions.retain(|tx| &tx.organization_id != id);
        state.themes.retain(|_, theme| &theme.organization_id != id);

        Ok(true)
    }
}

#[async_trait::async_trait]
impl MemberStore for MemoryStore {
    async fn get_member(&self, organization_id: &Id, user_id: &str) -> Result<Option<Member>> {
        let key = (organization_id.clone(), user_id.to_string());
        Ok(self.state.read().members.get(&key).cloned())
    }

    async fn list_members(&self, organization_id: &Id) -> Result<Vec<Member>> {
        let members = self
            .state
            .read()
            .members
            .values()
            .filter(|member| &member.organization_id == organization_id)
            .cloned()
            .collect();
        Ok(sorted_by(members, |m: &Member| m.joined_at))
    }

    async fn upsert_member(&self, member: Member) -> Result<()> {
        let key = (member.organization_id.clone(), member.user_id.clone());
        self.state.write().members.insert(key, member);
        Ok(())
    }

    async fn delete_member(&self, organization_id: &Id, user_id: &str) -> Result<bool> {
        let key = (organization_id.clone(), user_id.to_string());
        Ok(self.state.write().members.remove(&key).is_some())
    }
}

#[async_trait::async_trait]
impl InvitationStore for MemoryStore {
    async fn get_invitation(&self, id: &Id) -> Result<Option<Invitation>> {
        Ok(self.state.read().invitations.get(id).cloned())
    }

    async fn get_invitation_by_token_hash(&self, token_hash: &str) -> Result<Option<Invitation>> {
        Ok(self
            .state
            .read()
            .invitations
            .values()
            .find(|inv| inv.token_hash == token_hash)
            .cloned())
    }

    async fn list_invitations(&self, organization_id: &Id) -> Result<Vec<Invitation>> {
        let invitations = self
            .state
            .read()
            .invitations
            .values()
            .filter(|inv| &inv.organization_id == organization_id)
            .cloned()
            .collect();
        Ok(sorted_by(invitations, |inv: &Invitation| inv.created_at))
    }

    async fn upsert_invitation(&self, invitation: Invitation) -> Result<()> {
        self.state
            .write()
            .invitations
            .insert(invitation.id.clone(), invitation);
        Ok(())
    }
}

#[async_trait::async_trait]
impl ApiKeyStore for MemoryStore {
    async fn get_api_key(&self, id: &Id) -> Result<Option<ApiKey>> {
        Ok(self.state.read().api_keys.get(id).cloned())
    }

    async fn get_api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>> {
        Ok(self
            .state
            .read()
            .api_keys
            .values()
            .find(|key| key.key_hash == key_hash)
            .cloned())
    }

    async fn list_api_keys(&self, organization_id: &Id) -> Result<Vec<ApiKey>> {
        let keys = self
            .state
            .read()
            .api_keys
            .values()
            .filter(|key| &key.organization_id == organization_id)
            .cloned()
            .collect();
        Ok(sorted_by(keys, |key: &ApiKey| key.created_at))
    }

    async fn upsert_api_key(&self, api_key: ApiKey) -> Result<()> {
        self.state.write().api_keys.insert(api_key.id.clone(), api_key);
        Ok(())
    }

    async fn touch_api_key(&self, id: &Id, used_at: Timestamp) -> Result<()> {
        if let Some(key) = self.state.write().api_keys.get_mut(id) {
            key.last_used_at = Some(used_at);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl RateLimitStore for MemoryStore {
    async fn get_rate_limit_config(&self, organization_id: &Id) -> Result<Option<RateLimitConfig>> {
        Ok(self.state.read().rate_limits.get(organization_id).cloned())
    }

    async fn upsert_rate_limit_config(&self, config: RateLimitConfig) -> Result<()> {
        self.state
            .write()
            .rate_limits
            .insert(config.organization_id.clone(), config);
        Ok(())
    }

    async fn delete_rate_limit_config(&self, organization_id: &Id) -> Result<bool> {
        Ok(self.state.write().rate_limits.remove(organization_id).is_some())
    }

    async fn increment_usage(
        &self,
        organization_id: &Id,
        api_key_id: &Id,
        window_start: Timestamp,
    ) -> Result<i64> {
        let mut state = self.state.write();
        let counter = state
            .usage
            .entry((organization_id.clone(), api_key_id.clone(), window_start))
            .or_insert_with(|| UsageCounter {
                organization_id: organization_id.clone(),
                api_key_id: api_key_id.clone(),
                window_start,
                count: 0,
            });
        counter.count += 1;
        Ok(counter.count)
    }

    async fn list_usage(&self, organization_id: &Id, since: Timestamp) -> Result<Vec<UsageCounter>> {
        let counters = self
            .state
            .read()
            .usage
            .values()
            .filter(|c| &c.organization_id == organization_id && c.window_start >= since)
            .cloned()
            .collect();
        Ok(sorted_by(counters, |c: &UsageCounter| c.window_start))
    }

    async fn sum_usage(&self, organization_id: &Id, since: Timestamp) -> Result<i64> {
        Ok(self
            .state
            .read()
            .usage
            .values()
            .filter(|c| &c.organization_id == organization_id && c.window_start >= since)
            .map(|c| c.count)
            .sum())
    }

    async fn prune_usage(&self, organization_id: &Id, before: Timestamp) -> Result<u64> {
        let mut state = self.state.write();
        let len = state.usage.len();
        state.usage.retain(|(org_id, _, window_start), _| {
            org_id != organization_id || *window_start >= before
        });
        Ok((len - state.usage.len()) as u64)
    }
}

#[async_trait::async_trait]
impl CourseStore for MemoryStore {
    async fn get_course(&self, id: &Id) -> Result<Option<Course>> {
        Ok(self.state.read().courses.get(id).cloned())
    }

    async fn get_course_by_slug(&self, organization_id: &Id, slug: &str) -> Result<Option<Course>> {
        Ok(self
            .state
            .read()
            .courses
            .values()
            .find(|c| &c.organization_id == organization_id && c.slug == slug)
            .cloned())
    }

    async fn list_courses(&self, organization_id: &Id) -> Result<Vec<Course>> {
        let courses = self
            .state
            .read()
            .courses
            .values()
            .filter(|c| &c.organization_id == organization_id)
            .cloned()
            .collect();
        Ok(sorted_by(courses, |c: &Course| c.created_at))
    }

    async fn upsert_course(&self, course: Course) -> Result<()> {
        self.state.write().courses.insert(course.id.clone(), course);
        Ok(())
    }

    async fn delete_course(&self, id: &Id) -> Result<bool> {
        Ok(self.state.write().courses.remove(id).is_some())
    }
}

#[async_trait::async_trait]
impl EnrollmentStore for MemoryStore {
    async fn get_enrollment(&self, id: &Id) -> Result<Option<Enrollment>> {
        Ok(self.state.read().enrollments.get(id).cloned())
    }

    async fn find_enrollment(&self, course_id: &Id, user_id: &str) -> Result<Option<Enrollment>> {
        Ok(self
            .state
            .read()
            .enrollments
            .values()
            .find(|e| &e.course_id == course_id && e.user_id == user_id)
            .cloned())
    }

    async fn list_enrollments_for_course(&self, course_id: &Id) -> Result<Vec<Enrollment>> {
        let enrollments = self
            .state
            .read()
            .enrollments
            .values()
            .filter(|e| &e.course_id == course_id)
            .cloned()
            .collect();
        Ok(sorted_by(enrollments, |e: &Enrollment| e.enrolled_at))
    }

    async fn list_enrollments_for_user(&self, user_id: &str) -> Result<Vec<Enrollment>> {
        let enrollments = self
            .state
            .read()
            .enrollments
            .values()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        Ok(sorted_by(enrollments, |e: &Enrollment| e.enrolled_at))
    }

    async fn upsert_enrollment(&self, enrollment: Enrollment) -> Result<()> {
        self.check_enrollment_write()?;
        self.state
            .write()
            .enrollments
            .insert(enrollment.id.clone(), enrollment);
        Ok(())
    }
}

#[async_trait::async_trait]
impl CertificateStore for MemoryStore {
    async fn get_certificate_for_enrollment(&self, enrollment_id: &Id) -> Result<Option<Certificate>> {
        Ok(self
            .state
            .read()
            .certificates
            .values()
            .find(|c| &c.enrollment_id == enrollment_id)
            .cloned())
    }

    async fn get_certificate_by_code(&self, code: &str) -> Result<Option<Certificate>> {
        Ok(self
            .state
            .read()
            .certificates
            .values()
            .find(|c| c.verification_code == code)
            .cloned())
    }

    async fn list_certificates_for_user(&self, user_id: &str) -> Result<Vec<Certificate>> {
        let certificates = self
            .state
            .read()
            .certificates
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        Ok(sorted_by(certificates, |c: &Certificate| c.issued_at))
    }

    async fn insert_certificate(&self, certificate: Certificate) -> Result<()> {
        let mut state = self.state.write();
        if state
            .certificates
            .values()
            .any(|c| c.enrollment_id == certificate.enrollment_id)
        {
            anyhow::bail!(
                "certificate for enrollment {} already exists",
                certificate.enrollment_id
            );
        }
        state
            .certificates
            .insert(certificate.id.clone(), certificate);
        Ok(())
    }
}

#[async_trait::async_trait]
impl BillingStore for MemoryStore {
    async fn get_subscription(&self, organization_id: &Id) -> Result<Option<Subscription>> {
        Ok(self.state.read().subscriptions.get(organization_id).cloned())
    }

    async fn get_subscription_by_provider_id(
        &self,
        provider_subscription_id: &str,
    ) -> Result<Option<Subscription>> {
        Ok(self
            .state
            .read()
            .subscriptions
            .values()
            .find(|s| s.provider_subscription_id.as_deref() == Some(provider_subscription_id))
            .cloned())
    }

    async fn upsert_subscription(&self, subscription: Subscription) -> Result<()> {
        self.state
            .write()
            .subscriptions
            .insert(subscription.organization_id.clone(), subscription);
        Ok(())
    }

    async fn get_credit_balance(&self, organization_id: &Id) -> Result<i64> {
        Ok(self
            .state
            .read()
            .credit_balances
            .get(organization_id)
            .copied()
            .unwrap_or(0))
    }

    async fn apply_credit_transaction(&self, transaction: CreditTransaction) -> Result<Option<i64>> {
        let mut state = self.state.write();
        let current = state
            .credit_balances
            .get(&transaction.organization_id)
            .copied()
            .unwrap_or(0);
        let next = current.checked_add(transaction.amount).ok_or_else(|| {
            anyhow::anyhow!("Credit balance overflow for {}", transaction.organization_id)
        })?;
        if next < 0 {
            return Ok(None);
        }

        state
            .credit_balances
            .insert(transaction.organization_id.clone(), next);
        state.credit_transactions.push(transaction);
        Ok(Some(next))
    }

    async fn list_credit_transactions(
        &self,
        organization_id: &Id,
        limit: i64,
    ) -> Result<Vec<CreditTransaction>> {
        let state = self.state.read();
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        Ok(state
            .credit_transactions
            .iter()
            .rev()
            .filter(|tx| &tx.organization_id == organization_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn record_webhook_event(&self, event_id: &str, _event_type: &str) -> Result<bool> {
        Ok(self.state.write().webhook_events.insert(event_id.to_string()))
    }

    async fn forget_webhook_event(&self, event_id: &str) -> Result<()> {
        self.state.write().webhook_events.remove(event_id);
        Ok(())
    }
}

#[async_trait::async_trait]
impl ThemeStore for MemoryStore {
    async fn get_theme(&self, id: &Id) -> Result<Option<Theme>> {
        Ok(self.state.read().themes.get(id).cloned())
    }

    async fn list_themes(&self, organization_id: &Id) -> Result<Vec<Theme>> {
        let themes = self
            .state
            .read()
            .themes
            .values()
            .filter(|t| &t.organization_id == organization_id)
            .cloned()
            .collect();
        Ok(sorted_by(themes, |t: &Theme| t.created_at))
    }

    async fn upsert_theme(&self, theme: Theme) -> Result<()> {
        self.state.write().themes.insert(theme.id.clone(), theme);
        Ok(())
    }

    async fn activate_theme(&self, organization_id: &Id, theme_id: &Id) -> Result<bool> {
        let mut state = self.state.write();
        let exists = state
            .themes
            .get(theme_id)
            .is_some_and(|t| &t.organization_id == organization_id);
        if !exists {
            return Ok(false);
        }

        for theme in state.themes.values_mut() {
            if &theme.organization_id == organization_id {
                theme.is_active = &theme.id == theme_id;
            }
        }
        Ok(true)
    }

    async fn delete_theme(&self, id: &Id) -> Result<bool> {
        Ok(self.state.write().themes.remove(id).is_some())
    }
}

impl Store for MemoryStore {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Theme;

    #[tokio::test]
    async fn test_credit_balance_never_negative() {
        let store = MemoryStore::new();
        let org = "org-1".to_string();

        let granted = store
            .apply_credit_transaction(CreditTransaction::new(org.clone(), 10, "grant", None))
            .await
            .unwrap();
        assert_eq!(granted, Some(10));

        let refused = store
            .apply_credit_transaction(CreditTransaction::new(org.clone(), -11, "consume", None))
            .await
            .unwrap();
        assert_eq!(refused, None);
        assert_eq!(store.get_credit_balance(&org).await.unwrap(), 10);
        assert_eq!(store.list_credit_transactions(&org, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_single_active_theme() {
        let store = MemoryStore::new();
        let org = "org-1".to_string();
        let a = Theme::new(org.clone(), "Light".into(), serde_json::json!({}));
        let b = Theme::new(org.clone(), "Dark".into(), serde_json::json!({}));
        store.upsert_theme(a.clone()).await.unwrap();
        store.upsert_theme(b.clone()).await.unwrap();

        assert!(store.activate_theme(&org, &a.id).await.unwrap());
        assert!(store.activate_theme(&org, &b.id).await.unwrap());

        let active: Vec<_> = store
            .list_themes(&org)
            .await
            .unwrap()
            .into_iter()
            .filter(|t| t.is_active)
            .collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, b.id);

        assert!(!store.activate_theme(&"other".to_string(), &a.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_webhook_event_recorded_once() {
        let store = MemoryStore::new();
        assert!(store.record_webhook_event("evt_1", "invoice.paid").await.unwrap());
        assert!(!store.record_webhook_event("evt_1", "invoice.paid").await.unwrap());

        store.forget_webhook_event("evt_1").await.unwrap();
        assert!(store.record_webhook_event("evt_1", "invoice.paid").await.unwrap());
    }

    #[tokio::test]
    async fn test_credit_balance_overflow_is_an_error() {
        let store = MemoryStore::new();
        let org = "org-1".to_string();
        store
            .apply_credit_transaction(CreditTransaction::new(org.clone(), i64::MAX, "grant", None))
            .await
            .unwrap();
        assert!(store
            .apply_credit_transaction(CreditTransaction::new(org.clone(), 1, "grant", None))
            .await
            .is_err());
        assert_eq!(store.get_credit_balance(&org).await.unwrap(), i64::MAX);
    }
}
