use crate::error::{AppError, AppResult};
use crate::logic::permissions::{require_member, require_permission, Permission};
use crate::model::{Id, NewTheme, Theme, UserContext};
use crate::store::traits::Store;

pub struct ThemeOperations;

impl ThemeOperations {
    pub async fn create<S: Store>(
        store: &S,
        user: &UserContext,
        organization_id: &Id,
        input: NewTheme,
    ) -> AppResult<Theme> {
        require_permission(store, organization_id, &user.user_id, Permission::ManageThemes)
            .await?;

        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::bad_request("Theme name is required"));
        }
        let settings = match input.settings {
            serde_json::Value::Null => serde_json::json!({}),
            value @ serde_json::Value::Object(_) => value,
            _ => return Err(AppError::bad_request("Theme settings must be a JSON object")),
        };

        let theme = Theme::new(organization_id.clone(), name, settings);
        store.upsert_theme(theme.clone()).await?;
        Ok(theme)
    }

    pub async fn list<S: Store>(
        store: &S,
        user: &UserContext,
        organization_id: &Id,
    ) -> AppResult<Vec<Theme>> {
        require_member(store, organization_id, &user.user_id).await?;
        Ok(store.list_themes(organization_id).await?)
    }

    /// Make this the organization's only active theme
    pub async fn activate<S: Store>(
        store: &S,
        user: &UserContext,
        organization_id: &Id,
        theme_id: &Id,
    ) -> AppResult<Theme> {
        require_permission(store, organization_id, &user.user_id, Permission::ManageThemes)
            .await?;
        let theme = Self::load(store, organization_id, theme_id).await?;

        if !store.activate_theme(organization_id, &theme.id).await? {
            return Err(AppError::not_found("Theme not found"));
        }
        log::info!("Theme {} activated for {}", theme.id, organization_id);
        Ok(Theme {
            is_active: true,
            ..theme
        })
    }

    pub async fn delete<S: Store>(
        store: &S,
        user: &UserContext,
        organization_id: &Id,
        theme_id: &Id,
    ) -> AppResult<()> {
        require_permission(store, organization_id, &user.user_id, Permission::ManageThemes)
            .await?;
        let theme = Self::load(store, organization_id, theme_id).await?;
        if theme.is_active {
            return Err(AppError::conflict(
                "The active theme cannot be deleted; activate another first",
            ));
        }
        store.delete_theme(&theme.id).await?;
        Ok(())
    }

    async fn load<S: Store>(store: &S, organization_id: &Id, theme_id: &Id) -> AppResult<Theme> {
        store
            .get_theme(theme_id)
            .await?
            .filter(|t| &t.organization_id == organization_id)
            .ok_or_else(|| AppError::not_found("Theme not found"))
    }
}
