use crate::{
    db::DbPool,
    entities::user::{self, Column as UserColumn, Entity as User, UserRole},
    errors::ServiceError,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateUserRequest {
    #[validate(length(min = 1, max = 64))]
    pub username: String,
    #[validate(length(min = 1, max = 120))]
    pub display_name: String,
    #[serde(default)]
    pub role: UserRole,
    #[validate(length(min = 1, max = 64))]
    pub employee_id: Option<String>,
}

/// Partial update. An empty `employee_id` clears the link to the auth proxy.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateUserRequest {
    #[validate(length(min = 1, max = 120))]
    pub display_name: Option<String>,
    pub role: Option<UserRole>,
    #[validate(length(max = 64))]
    pub employee_id: Option<String>,
    pub is_active: Option<bool>,
}

/// Local user records. Passwords live with the external auth proxy.
#[derive(Clone)]
pub struct UserService {
    db_pool: Arc<DbPool>,
}

impl UserService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    #[instrument(skip(self))]
    pub async fn list_users(&self, include_inactive: bool) -> Result<Vec<user::Model>, ServiceError> {
        let mut query = User::find();
        if !include_inactive {
            query = query.filter(UserColumn::IsActive.eq(true));
        }
        Ok(query
            .order_by_asc(UserColumn::Username)
            .all(&*self.db_pool)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn get_user(&self, id: Uuid) -> Result<user::Model, ServiceError> {
        User::find_by_id(id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", id)))
    }

    /// Resolves the local user behind a proxy login: by employee id first,
    /// then by username.
    #[instrument(skip(self))]
    pub async fn find_for_login(
        &self,
        employee_id: Option<&str>,
        username: &str,
    ) -> Result<Option<user::Model>, ServiceError> {
        let db = &*self.db_pool;
        if let Some(employee_id) = employee_id.filter(|e| !e.is_empty()) {
            if let Some(found) = User::find()
                .filter(UserColumn::EmployeeId.eq(employee_id))
                .one(db)
                .await?
            {
                return Ok(Some(found));
            }
        }
        Ok(User::find()
            .filter(UserColumn::Username.eq(username))
            .one(db)
            .await?)
    }

    async fn ensure_unique(
        &self,
        username: Option<&str>,
        employee_id: Option<&str>,
        except: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        let mut any = Condition::any();
        if let Some(username) = username {
            any = any.add(UserColumn::Username.eq(username));
        }
        if let Some(employee_id) = employee_id {
            any = any.add(UserColumn::EmployeeId.eq(employee_id));
        }
        if any.is_empty() {
            return Ok(());
        }

        let mut query = User::find().filter(any);
        if let Some(id) = except {
            query = query.filter(UserColumn::Id.ne(id));
        }
        if let Some(clash) = query.one(&*self.db_pool).await? {
            return Err(ServiceError::Conflict(format!(
                "User {} already uses that username or employee id",
                clash.username
            )));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn create_user(&self, request: CreateUserRequest) -> Result<user::Model, ServiceError> {
        request.validate()?;
        let username = request.username.trim().to_string();
        let employee_id = request
            .employee_id
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());
        self.ensure_unique(Some(&username), employee_id.as_deref(), None)
            .await?;

        let created = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            username: Set(username),
            display_name: Set(request.display_name.trim().to_string()),
            role: Set(request.role),
            employee_id: Set(employee_id),
            is_active: Set(true),
            ..Default::default()
        }
        .insert(&*self.db_pool)
        .await?;

        info!(user_id = %created.id, role = %created.role, "User created");
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn update_user(
        &self,
        id: Uuid,
        request: UpdateUserRequest,
    ) -> Result<user::Model, ServiceError> {
        request.validate()?;
        let existing = self.get_user(id).await?;

        let employee_id = request.employee_id.map(|e| e.trim().to_string());
        if let Some(e) = employee_id.as_deref().filter(|e| !e.is_empty()) {
            self.ensure_unique(None, Some(e), Some(id)).await?;
        }

        let mut active = existing.into_active_model();
        if let Some(display_name) = request.display_name {
            active.display_name = Set(display_name.trim().to_string());
        }
        if let Some(role) = request.role {
            active.role = Set(role);
        }
        if let Some(employee_id) = employee_id {
            active.employee_id = Set(Some(employee_id).filter(|e| !e.is_empty()));
        }
        if let Some(is_active) = request.is_active {
            active.is_active = Set(is_active);
        }
        Ok(active.update(&*self.db_pool).await?)
    }

    /// Soft delete; the record stays for audit references.
    #[instrument(skip(self))]
    pub async fn deactivate_user(&self, id: Uuid) -> Result<user::Model, ServiceError> {
        let existing = self.get_user(id).await?;
        let mut active = existing.into_active_model();
        active.is_active = Set(false);
        let updated = active.update(&*self.db_pool).await?;
        info!(user_id = %id, "User deactivated");
        Ok(updated)
    }
}
