use crate::entities::*;
use chrono::{DateTime, NaiveDateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::*;
use std::fmt;

pub mod api;
pub mod form;
pub mod web;

pub use form::{FieldError, FormErrors, TodoForm, TodoPayload};

/// Number of todos shown per list page unless configured otherwise.
pub const DEFAULT_PAGE_SIZE: u64 = 10;

#[derive(Debug, PartialEq, Clone, Eq)]
pub struct Todo {
    id: i32,
    title: String,
    description: String,
    due_date: Option<NaiveDateTime>,
    resolved: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Todo {
    pub fn new(
        id: i32,
        title: String,
        description: String,
        due_date: Option<NaiveDateTime>,
        resolved: bool,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            title,
            description,
            due_date,
            resolved,
            created_at,
            updated_at,
        }
    }

    /// Returns the ID of the todo.
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Returns the title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Returns the description, empty when none was given.
    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn due_date(&self) -> Option<NaiveDateTime> {
        self.due_date
    }

    pub fn resolved(&self) -> bool {
        self.resolved
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns the URL of the detail page for this todo.
    pub fn absolute_url(&self) -> String {
        format!("/todo/{}/", self.id)
    }

    /// An unresolved todo whose due date lies in the past.
    pub fn is_overdue(&self) -> bool {
        self.is_overdue_at(Utc::now().naive_utc())
    }

    pub fn is_overdue_at(&self, now: NaiveDateTime) -> bool {
        !self.resolved && self.due_date.is_some_and(|due| due < now)
    }

    /// Due date formatted for display, empty when unset.
    pub fn due_date_display(&self) -> String {
        self.due_date
            .map(|due| due.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default()
    }

    pub fn created_at_display(&self) -> String {
        self.created_at.format("%Y-%m-%d %H:%M").to_string()
    }

    pub fn updated_at_display(&self) -> String {
        self.updated_at.format("%Y-%m-%d %H:%M").to_string()
    }
}

impl fmt::Display for Todo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.title)
    }
}

impl From<todo::Model> for Todo {
    fn from(model: todo::Model) -> Self {
        Todo::new(
            model.id,
            model.title,
            model.description,
            model.due_date,
            model.resolved,
            model.created_at.with_timezone(&Utc),
            model.updated_at.with_timezone(&Utc),
        )
    }
}

/// One page of todos, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoPage {
    pub todos: Vec<Todo>,
    /// 1-based page number that was requested.
    pub page: u64,
    pub num_pages: u64,
}

impl TodoPage {
    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.num_pages
    }

    pub fn previous_page(&self) -> u64 {
        self.page.saturating_sub(1).max(1)
    }

    pub fn next_page(&self) -> u64 {
        self.page + 1
    }
}

/// Error type for TodoService operations.
#[derive(Debug, thiserror::Error)]
pub enum TodoServiceError {
    /// Represents a database error.
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    /// Represents a todo not found error.
    #[error("Todo with ID {0} not found")]
    TodoNotFound(i32),
}

/// Gateway for every read and write of the `todo` table.
pub struct TodoService<'a> {
    db: &'a sea_orm::DatabaseConnection,
}

impl TodoService<'_> {
    pub fn new(db: &sea_orm::DatabaseConnection) -> TodoService<'_> {
        TodoService { db }
    }

    /// Creates a new todo from a validated payload.
    ///
    /// `created_at` and `updated_at` are both set to the same instant.
    ///
    /// # Returns
    ///
    /// A `Result` containing the created `Todo` if successful, or an error otherwise.
    #[tracing::instrument(skip(self))]
    pub async fn create_todo(&self, payload: TodoPayload) -> Result<Todo, TodoServiceError> {
        let now = Utc::now().fixed_offset();
        let active_model = todo::ActiveModel {
            title: ActiveValue::Set(payload.title),
            description: ActiveValue::Set(payload.description),
            due_date: ActiveValue::Set(payload.due_date),
            resolved: ActiveValue::Set(payload.resolved),
            created_at: ActiveValue::Set(now),
            updated_at: ActiveValue::Set(now),
            ..Default::default()
        };
        let created_model = active_model.insert(self.db).await?;
        tracing::info!("Created todo {}", created_model.id);
        Ok(Todo::from(created_model))
    }

    /// Retrieves a todo by its ID.
    ///
    /// # Arguments
    ///
    /// * `id` - The ID of the todo to retrieve.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Todo` if found, or `TodoNotFound` otherwise.
    #[tracing::instrument(skip(self))]
    pub async fn get_todo_by_id(&self, id: i32) -> Result<Todo, TodoServiceError> {
        let todo_model = todo::Entity::find_by_id(id)
            .one(self.db)
            .await?
            .ok_or(TodoServiceError::TodoNotFound(id))?;
        Ok(Todo::from(todo_model))
    }

    /// Lists todos newest first, one page at a time.
    ///
    /// # Arguments
    ///
    /// * `page` - 1-based page number. Page 0 is treated as page 1.
    /// * `page_size` - Maximum number of todos per page.
    ///
    /// # Returns
    ///
    /// A `Result` containing the requested `TodoPage`. Pages past the last one are empty.
    #[tracing::instrument(skip(self))]
    pub async fn list_todos(&self, page: u64, page_size: u64) -> Result<TodoPage, TodoServiceError> {
        let page = page.max(1);
        let paginator = todo::Entity::find()
            .order_by_desc(todo::Column::CreatedAt)
            .order_by_desc(todo::Column::Id)
            .paginate(self.db, page_size.max(1));

        let num_pages = paginator.num_pages().await?;
        // Past the last page; also keeps `fetch_page` from overflowing its offset.
        if page > num_pages {
            return Ok(TodoPage {
                todos: Vec::new(),
                page,
                num_pages,
            });
        }

        let todos = paginator
            .fetch_page(page - 1)
            .await?
            .into_iter()
            .map(Todo::from)
            .collect();

        Ok(TodoPage {
            todos,
            page,
            num_pages,
        })
    }

    /// Overwrites the editable fields of a todo and refreshes `updated_at`.
    ///
    /// # Arguments
    ///
    /// * `id` - The ID of the todo to update.
    /// * `payload` - The validated new field values.
    ///
    /// # Returns
    ///
    /// A `Result` containing the updated `Todo` if successful, or an error otherwise.
    #[tracing::instrument(skip(self))]
    pub async fn update_todo_by_id(
        &self,
        id: i32,
        payload: TodoPayload,
    ) -> Result<Todo, TodoServiceError> {
        let txn = self.db.begin().await?;
        let todo_to_update = todo::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or(TodoServiceError::TodoNotFound(id))?;

        let mut active_model: todo::ActiveModel = todo_to_update.into();
        active_model.title = ActiveValue::Set(payload.title);
        active_model.description = ActiveValue::Set(payload.description);
        active_model.due_date = ActiveValue::Set(payload.due_date);
        active_model.resolved = ActiveValue::Set(payload.resolved);
        active_model.updated_at = ActiveValue::Set(Utc::now().fixed_offset());
        let updated_model = active_model.update(&txn).await?;
        txn.commit().await?;

        Ok(Todo::from(updated_model))
    }

    /// Flips the `resolved` flag of a todo and refreshes `updated_at`.
    ///
    /// The flip happens in a single `UPDATE` so concurrent toggles never read a stale value.
    #[tracing::instrument(skip(self))]
    pub async fn toggle_resolved_by_id(&self, id: i32) -> Result<Todo, TodoServiceError> {
        let txn = self.db.begin().await?;
        let result = todo::Entity::update_many()
            .col_expr(
                todo::Column::Resolved,
                Expr::col(todo::Column::Resolved).eq(false),
            )
            .col_expr(
                todo::Column::UpdatedAt,
                Expr::value(Utc::now().fixed_offset()),
            )
            .filter(todo::Column::Id.eq(id))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(TodoServiceError::TodoNotFound(id));
        }

        let toggled_model = todo::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or(TodoServiceError::TodoNotFound(id))?;
        txn.commit().await?;

        tracing::info!("Todo {} resolved = {}", id, toggled_model.resolved);
        Ok(Todo::from(toggled_model))
    }

    /// Deletes a todo by its ID.
    ///
    /// # Returns
    ///
    /// A `Result` containing the deleted `Todo` if successful, or an error otherwise.
    #[tracing::instrument(skip(self))]
    pub async fn delete_todo_by_id(&self, id: i32) -> Result<Todo, TodoServiceError> {
        let txn = self.db.begin().await?;
        let todo_to_delete = todo::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or(TodoServiceError::TodoNotFound(id))?;

        let todo_copy = Todo::from(todo_to_delete);
        todo::Entity::delete_by_id(id).exec(&txn).await?;
        txn.commit().await?;
        Ok(todo_copy)
    }
}
