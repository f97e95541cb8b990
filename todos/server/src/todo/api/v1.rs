use crate::todo::web::TodoState;
use crate::todo::{Todo, TodoService, TodoServiceError};
use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{OpenApi, ToSchema};

/// JSON representation of a Todo for API responses.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TodoJson {
    /// Unique identifier for the todo
    pub id: i32,
    pub title: String,
    pub description: String,
    /// Optional due date without timezone
    pub due_date: Option<NaiveDateTime>,
    pub resolved: bool,
    /// Whether the todo is unresolved and past its due date
    pub is_overdue: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Link to the HTML detail page
    pub url: String,
}

impl From<Todo> for TodoJson {
    fn from(todo: Todo) -> Self {
        Self {
            id: todo.id(),
            title: todo.title().to_string(),
            description: todo.description().to_string(),
            due_date: todo.due_date(),
            resolved: todo.resolved(),
            is_overdue: todo.is_overdue(),
            created_at: todo.created_at(),
            updated_at: todo.updated_at(),
            url: todo.absolute_url(),
        }
    }
}

/// API response for one page of todos.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TodosResponse {
    /// Todos on this page, newest first
    pub todos: Vec<TodoJson>,
    pub page: u64,
    pub num_pages: u64,
}

/// Error body returned by the API.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}

impl ErrorResponse {
    pub fn new(message: String) -> Self {
        Self { message }
    }
}

/// Query parameters for paging through todos.
#[derive(Debug, Deserialize, ToSchema)]
pub struct TodosQuery {
    /// 1-based page number
    #[serde(default)]
    page: Option<u64>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(err: TodoServiceError) -> ApiError {
    match err {
        TodoServiceError::TodoNotFound(_) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(err.to_string())),
        ),
        TodoServiceError::Database(_) => {
            tracing::error!("Todo API request failed: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Failed to retrieve todos".to_string())),
            )
        }
    }
}

/// Handler for GET /api/v1/todos - Returns one page of todos in JSON format.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/api/v1/todos",
    params(
        ("page" = Option<u64>, Query, description = "1-based page number, defaults to 1")
    ),
    responses(
        (status = 200, description = "Successfully retrieved todos", body = TodosResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Todos"
)]
pub async fn list_todos_handler(
    State(state): State<Arc<TodoState>>,
    Query(query): Query<TodosQuery>,
) -> Result<Json<TodosResponse>, ApiError> {
    let service = TodoService::new(&state.db);
    let page = service
        .list_todos(query.page.unwrap_or(1), state.page_size)
        .await
        .map_err(api_error)?;

    Ok(Json(TodosResponse {
        todos: page.todos.into_iter().map(TodoJson::from).collect(),
        page: page.page,
        num_pages: page.num_pages,
    }))
}

/// Handler for GET /api/v1/todos/{id} - Returns a single todo.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/api/v1/todos/{id}",
    params(
        ("id" = i32, Path, description = "Todo ID")
    ),
    responses(
        (status = 200, description = "Successfully retrieved todo", body = TodoJson),
        (status = 404, description = "Todo not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Todos"
)]
pub async fn get_todo_handler(
    State(state): State<Arc<TodoState>>,
    Path(raw_id): Path<String>,
) -> Result<Json<TodoJson>, ApiError> {
    let id: i32 = raw_id.parse().map_err(|_| {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(format!("Todo with ID {raw_id} not found"))),
        )
    })?;
    let service = TodoService::new(&state.db);
    let todo = service.get_todo_by_id(id).await.map_err(api_error)?;
    Ok(Json(TodoJson::from(todo)))
}

#[derive(OpenApi)]
#[openapi(
    paths(list_todos_handler, get_todo_handler),
    components(schemas(TodoJson, TodosResponse, ErrorResponse)),
    tags((name = "Todos", description = "Read-only access to todos"))
)]
pub struct ApiDoc;

/// Handler for GET /api/v1/openapi.json.
#[tracing::instrument]
pub async fn openapi_handler() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Creates and returns the todos API router.
pub fn create_api_router(state: Arc<TodoState>) -> Router {
    Router::new()
        .route("/todos", get(list_todos_handler))
        .route("/todos/{id}", get(get_todo_handler))
        .route("/openapi.json", get(openapi_handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_document_lists_todo_paths() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/v1/todos"));
        assert!(doc.paths.paths.contains_key("/api/v1/todos/{id}"));
    }

    #[test]
    fn not_found_maps_to_404() {
        let (status, Json(body)) = api_error(TodoServiceError::TodoNotFound(9));
        assert_eq!(status, StatusCode::NOT_FOUND);
        insta::assert_snapshot!(body.message, @"Todo with ID 9 not found");
    }
}
