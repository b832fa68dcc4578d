use crate::error::{AppError, AppResult};
use crate::logic::permissions::{
    check_member_removal, check_role_change, count_owners, require_member, require_permission,
    Permission,
};
use crate::model::{
    derive_slug, is_valid_slug, Id, Member, NewOrganization, Organization, OrganizationUpdate, Role,
    Subscription, UserContext,
};
use crate::store::traits::Store;

pub struct OrganizationOperations;

impl OrganizationOperations {
    /// Create an organization; the caller becomes its owner and it starts on the free plan
    pub async fn create<S: Store>(
        store: &S,
        user: &UserContext,
        input: NewOrganization,
    ) -> AppResult<Organization> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::bad_request("Organization name is required"));
        }

        let slug = match input.slug {
            Some(slug) => slug.trim().to_string(),
            None => derive_slug(&name, "org"),
        };
        if !is_valid_slug(&slug) {
            return Err(AppError::bad_request(format!(
                "Invalid slug '{}': use 3-48 lowercase letters, digits or dashes",
                slug
            )));
        }
        if store.get_organization_by_slug(&slug).await?.is_some() {
            return Err(AppError::conflict(format!("Slug '{}' is already taken", slug)));
        }

        let organization = Organization::new(name, slug, user.user_id.clone());
        store.upsert_organization(organization.clone()).await?;

        let owner = Member::new(
            organization.id.clone(),
            user.user_id.clone(),
            user.user_email.clone(),
            Role::Owner,
        );
        store.upsert_member(owner).await?;
        store
            .upsert_subscription(Subscription::free(organization.id.clone()))
            .await?;

        log::info!(
            "Organization '{}' ({}) created by {}",
            organization.slug,
            organization.id,
            user.user_id
        );
        Ok(organization)
    }

    pub async fn get<S: Store>(
        store: &S,
        user: &UserContext,
        organization_id: &Id,
    ) -> AppResult<Organization> {
        require_member(store, organization_id, &user.user_id).await?;
        store
            .get_organization(organization_id)
            .await?
            .ok_or_else(|| AppError::not_found("Organization not found"))
    }

    pub async fn list_for_user<S: Store>(
        store: &S,
        user: &UserContext,
    ) -> AppResult<Vec<Organization>> {
        Ok(store.list_organizations_for_user(&user.user_id).await?)
    }

    pub async fn update<S: Store>(
        store: &S,
        user: &UserContext,
        organization_id: &Id,
        update: OrganizationUpdate,
    ) -> AppResult<Organization> {
        require_permission(
            store,
            organization_id,
            &user.user_id,
            Permission::ManageOrganization,
        )
        .await?;

        let mut organization = store
            .get_organization(organization_id)
            .await?
            .ok_or_else(|| AppError::not_found("Organization not found"))?;

        if let Some(name) = update.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(AppError::bad_request("Organization name cannot be empty"));
            }
            organization.name = name;
        }

        if let Some(slug) = update.slug {
            let slug = slug.trim().to_string();
            if !is_valid_slug(&slug) {
                return Err(AppError::bad_request(format!("Invalid slug '{}'", slug)));
            }
            if slug != organization.slug {
                if store.get_organization_by_slug(&slug).await?.is_some() {
                    return Err(AppError::conflict(format!("Slug '{}' is already taken", slug)));
                }
                organization.slug = slug;
            }
        }

        organization.updated_at = chrono::Utc::now();
        store.upsert_organization(organization.clone()).await?;
        Ok(organization)
    }

    pub async fn delete<S: Store>(
        store: &S,
        user: &UserContext,
        organization_id: &Id,
    ) -> AppResult<()> {
        require_permission(
            store,
            organization_id,
            &user.user_id,
            Permission::ManageOrganization,
        )
        .await?;

        if !store.delete_organization(organization_id).await? {
            return Err(AppError::not_found("Organization not found"));
        }
        log::info!("Organization {} deleted by {}", organization_id, user.user_id);
        Ok(())
    }

    pub async fn list_members<S: Store>(
        store: &S,
        user: &UserContext,
        organization_id: &Id,
    ) -> AppResult<Vec<Member>> {
        require_member(store, organization_id, &user.user_id).await?;
        Ok(store.list_members(organization_id).await?)
    }

    pub async fn change_role<S: Store>(
        store: &S,
        user: &UserContext,
        organization_id: &Id,
        target_user_id: &str,
        new_role: Role,
    ) -> AppResult<Member> {
        let actor = require_member(store, organization_id, &user.user_id).await?;
        let members = store.list_members(organization_id).await?;
        let mut target = members
            .iter()
            .find(|m| m.user_id == target_user_id)
            .cloned()
            .ok_or_else(|| AppError::not_found("Member not found"))?;

        check_role_change(&actor, &target, new_role, count_owners(&members))?;

        if target.role != new_role {
            log::info!(
                "Member {} of {} changed from {} to {} by {}",
                target.user_id,
                organization_id,
                target.role,
                new_role,
                user.user_id
            );
            target.role = new_role;
            store.upsert_member(target.clone()).await?;
        }
        Ok(target)
    }

    pub async fn remove_member<S: Store>(
        store: &S,
        user: &UserContext,
        organization_id: &Id,
        target_user_id: &str,
    ) -> AppResult<()> {
        let actor = require_member(store, organization_id, &user.user_id).await?;
        let members = store.list_members(organization_id).await?;
        let target = members
            .iter()
            .find(|m| m.user_id == target_user_id)
            .ok_or_else(|| AppError::not_found("Member not found"))?;

        check_member_removal(&actor, target, count_owners(&members))?;

        store.delete_member(organization_id, target_user_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::store::traits::{BillingStore, MemberStore};

    fn user(id: &str) -> UserContext {
        UserContext::with_details(id.to_string(), Some(format!("{}@example.com", id)), None)
    }

    fn new_org(name: &str) -> NewOrganization {
        NewOrganization {
            name: name.to_string(),
            slug: None,
        }
    }

    #[tokio::test]
    async fn test_create_makes_caller_owner_on_free_plan() {
        let store = MemoryStore::new();
        let org = OrganizationOperations::create(&store, &user("ada"), new_org("Acme Learning"))
            .await
            .unwrap();

        assert_eq!(org.slug, "acme-learning");
        let member = store.get_member(&org.id, "ada").await.unwrap().unwrap();
        assert_eq!(member.role, Role::Owner);
        let subscription = store.get_subscription(&org.id).await.unwrap().unwrap();
        assert_eq!(subscription.plan, crate::model::Plan::Free);
    }

    #[tokio::test]
    async fn test_duplicate_slug_conflicts() {
        let store = MemoryStore::new();
        OrganizationOperations::create(&store, &user("ada"), new_org("Acme"))
            .await
            .unwrap();
        let err = OrganizationOperations::create(&store, &user("bob"), new_org("acme"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_non_member_sees_not_found() {
        let store = MemoryStore::new();
        let org = OrganizationOperations::create(&store, &user("ada"), new_org("Acme"))
            .await
            .unwrap();
        let err = OrganizationOperations::get(&store, &user("eve"), &org.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_owner_transfer_then_leave() {
        let store = MemoryStore::new();
        let ada = user("ada");
        let org = OrganizationOperations::create(&store, &ada, new_org("Acme"))
            .await
            .unwrap();
        store
            .upsert_member(Member::new(org.id.clone(), "bob".into(), None, Role::Member))
            .await
            .unwrap();

        // Last owner cannot leave yet
        let err = OrganizationOperations::remove_member(&store, &ada, &org.id, "ada")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        OrganizationOperations::change_role(&store, &ada, &org.id, "bob", Role::Owner)
            .await
            .unwrap();
        OrganizationOperations::remove_member(&store, &ada, &org.id, "ada")
            .await
            .unwrap();

        let members = OrganizationOperations::list_members(&store, &user("bob"), &org.id)
            .await
            .unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].role, Role::Owner);
    }

    #[tokio::test]
    async fn test_only_owner_deletes() {
        let store = MemoryStore::new();
        let org = OrganizationOperations::create(&store, &user("ada"), new_org("Acme"))
            .await
            .unwrap();
        store
            .upsert_member(Member::new(org.id.clone(), "adm".into(), None, Role::Admin))
            .await
            .unwrap();

        let err = OrganizationOperations::delete(&store, &user("adm"), &org.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        OrganizationOperations::delete(&store, &user("ada"), &org.id)
            .await
            .unwrap();
        assert!(store.get_member(&org.id, "adm").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_short_and_non_latin_names_get_a_slug() {
        let store = MemoryStore::new();
        let go = OrganizationOperations::create(&store, &user("ada"), new_org("Go"))
            .await
            .unwrap();
        assert!(go.slug.starts_with("go-"), "{}", go.slug);

        let school = OrganizationOperations::create(&store, &user("ada"), new_org("日本語学校"))
            .await
            .unwrap();
        assert!(school.slug.starts_with("org-"), "{}", school.slug);

        // Slugs the caller chose are still validated as given
        let err = OrganizationOperations::create(
            &store,
            &user("ada"),
            NewOrganization {
                name: "Go".into(),
                slug: Some("go".into()),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_only_owner_updates_settings() {
        let store = MemoryStore::new();
        let org = OrganizationOperations::create(&store, &user("ada"), new_org("Acme"))
            .await
            .unwrap();
        store
            .upsert_member(Member::new(org.id.clone(), "adm".into(), None, Role::Admin))
            .await
            .unwrap();
        let rename = || OrganizationUpdate {
            name: Some("Acme Academy".into()),
            slug: Some("acme-academy".into()),
        };

        let err = OrganizationOperations::update(&store, &user("adm"), &org.id, rename())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let updated = OrganizationOperations::update(&store, &user("ada"), &org.id, rename())
            .await
            .unwrap();
        assert_eq!(updated.name, "Acme Academy");
        assert_eq!(updated.slug, "acme-academy");
    }
}
