use crate::error::{AppError, AppResult};
use crate::logic::permissions::{require_permission, Permission};
use crate::logic::tokens::{generate_api_key, hash_secret, API_KEY_DISPLAY_LEN, API_KEY_PREFIX};
use crate::model::{ApiKey, CreatedApiKey, Id, NewApiKey, UserContext};
use crate::store::traits::Store;

pub struct ApiKeyOperations;

impl ApiKeyOperations {
    pub async fn create<S: Store>(
        store: &S,
        user: &UserContext,
        organization_id: &Id,
        input: NewApiKey,
    ) -> AppResult<CreatedApiKey> {
        require_permission(store, organization_id, &user.user_id, Permission::ManageApiKeys)
            .await?;

        let name = input.name.trim().to_string();
        if name.is_empty() || name.len() > 100 {
            return Err(AppError::bad_request(
                "API key name must be between 1 and 100 characters",
            ));
        }

        let key = generate_api_key();
        let api_key = ApiKey::new(
            organization_id.clone(),
            name,
            key[..API_KEY_DISPLAY_LEN].to_string(),
            hash_secret(&key),
            user.user_id.clone(),
        );
        store.upsert_api_key(api_key.clone()).await?;

        log::info!(
            "API key {} ({}) created for {} by {}",
            api_key.id,
            api_key.prefix,
            organization_id,
            user.user_id
        );
        Ok(CreatedApiKey { api_key, key })
    }

    pub async fn list<S: Store>(
        store: &S,
        user: &UserContext,
        organization_id: &Id,
    ) -> AppResult<Vec<ApiKey>> {
        require_permission(store, organization_id, &user.user_id, Permission::ManageApiKeys)
            .await?;
        Ok(store.list_api_keys(organization_id).await?)
    }

    pub async fn revoke<S: Store>(
        store: &S,
        user: &UserContext,
        organization_id: &Id,
        key_id: &Id,
    ) -> AppResult<ApiKey> {
        require_permission(store, organization_id, &user.user_id, Permission::ManageApiKeys)
            .await?;

        let mut api_key = store
            .get_api_key(key_id)
            .await?
            .filter(|key| &key.organization_id == organization_id)
            .ok_or_else(|| AppError::not_found("API key not found"))?;

        if api_key.is_revoked() {
            return Err(AppError::conflict("API key is already revoked"));
        }

        api_key.revoked_at = Some(chrono::Utc::now());
        store.upsert_api_key(api_key.clone()).await?;
        log::info!("API key {} revoked by {}", api_key.id, user.user_id);
        Ok(api_key)
    }

    /// Resolve a presented plaintext key to its active record
    pub async fn authenticate<S: Store>(store: &S, presented: &str) -> AppResult<ApiKey> {
        let presented = presented.trim();
        if !presented.starts_with(API_KEY_PREFIX) {
            return Err(AppError::unauthorized("Malformed API key"));
        }

        let api_key = store
            .get_api_key_by_hash(&hash_secret(presented))
            .await?
            .ok_or_else(|| AppError::unauthorized("Invalid API key"))?;

        if api_key.is_revoked() {
            return Err(AppError::unauthorized("API key has been revoked"));
        }

        store.touch_api_key(&api_key.id, chrono::Utc::now()).await?;
        Ok(api_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::OrganizationOperations;
    use crate::model::{Member, NewOrganization, Role};
    use crate::store::traits::{ApiKeyStore, MemberStore};
    use crate::store::MemoryStore;

    async fn setup() -> (MemoryStore, Id, UserContext) {
        let store = MemoryStore::new();
        let owner = UserContext::new("ada".to_string());
        let org = OrganizationOperations::create(
            &store,
            &owner,
            NewOrganization {
                name: "Acme".into(),
                slug: None,
            },
        )
        .await
        .unwrap();
        (store, org.id, owner)
    }

    #[tokio::test]
    async fn test_plaintext_key_is_not_stored() {
        let (store, org_id, owner) = setup().await;
        let created = ApiKeyOperations::create(&store, &owner, &org_id, NewApiKey { name: "ci".into() })
            .await
            .unwrap();

        let stored = store.get_api_key(&created.api_key.id).await.unwrap().unwrap();
        assert_ne!(stored.key_hash, created.key);
        assert!(created.key.starts_with(&stored.prefix));

        let json = serde_json::to_value(&stored).unwrap();
        assert!(json.get("key_hash").is_none());
    }

    #[tokio::test]
    async fn test_authenticate_and_revoke() {
        let (store, org_id, owner) = setup().await;
        let created = ApiKeyOperations::create(&store, &owner, &org_id, NewApiKey { name: "ci".into() })
            .await
            .unwrap();

        let authed = ApiKeyOperations::authenticate(&store, &created.key).await.unwrap();
        assert_eq!(authed.organization_id, org_id);
        let touched = store.get_api_key(&authed.id).await.unwrap().unwrap();
        assert!(touched.last_used_at.is_some());

        ApiKeyOperations::revoke(&store, &owner, &org_id, &created.api_key.id)
            .await
            .unwrap();
        let err = ApiKeyOperations::authenticate(&store, &created.key).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));

        let err = ApiKeyOperations::revoke(&store, &owner, &org_id, &created.api_key.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_member_cannot_create_keys() {
        let (store, org_id, _owner) = setup().await;
        store
            .upsert_member(Member::new(org_id.clone(), "bob".into(), None, Role::Member))
            .await
            .unwrap();
        let err = ApiKeyOperations::create(
            &store,
            &UserContext::new("bob".into()),
            &org_id,
            NewApiKey { name: "ci".into() },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_unknown_key_rejected() {
        let (store, _org_id, _owner) = setup().await;
        let err = ApiKeyOperations::authenticate(&store, "lk_nope").await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
        let err = ApiKeyOperations::authenticate(&store, "sk_nope").await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }
}
