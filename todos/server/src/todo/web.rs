use askama::Template;
use axum::{
    Form, Router,
    extract::{FromRequestParts, Path, Query, State},
    http::{HeaderMap, Method, StatusCode, Uri, header, request::Parts},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{any, get},
};
use serde::Deserialize;
use std::sync::Arc;

use crate::todo::{
    DEFAULT_PAGE_SIZE, FormErrors, Todo, TodoForm, TodoPage, TodoService, TodoServiceError,
};

#[derive(Clone, Debug)]
pub struct TodoState {
    pub db: Arc<sea_orm::DatabaseConnection>,
    pub page_size: u64,
}

impl TodoState {
    pub fn new(db: sea_orm::DatabaseConnection) -> Self {
        Self {
            db: Arc::new(db),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    page: Option<String>,
}

impl ListQuery {
    /// Requested page, falling back to the first page for missing or garbled input.
    fn page(&self) -> u64 {
        self.page
            .as_deref()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(1)
    }
}

/// Todo id taken from the URL. Anything that is not a valid id is answered with the
/// not-found page, the same as an id with no stored todo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TodoId(pub i32);

impl<S> FromRequestParts<S> for TodoId
where
    S: Send + Sync,
{
    type Rejection = TodoResponse;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw_id) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|_| TodoResponse::NotFound)?;
        raw_id
            .parse()
            .map(TodoId)
            .map_err(|_| TodoResponse::NotFound)
    }
}

/// Outcome of a todo request handler.
#[derive(Debug)]
pub enum TodoResponse {
    /// Navigate to another page (303 See Other).
    Redirect(String),
    /// Show a rendered page with the given status.
    Render(StatusCode, Html<String>),
    NotFound,
    /// A read-style request tried to reach a mutate-only endpoint.
    MethodNotAllowed,
}

impl TodoResponse {
    fn ok(html: String) -> Self {
        TodoResponse::Render(StatusCode::OK, Html(html))
    }
}

impl IntoResponse for TodoResponse {
    fn into_response(self) -> Response {
        match self {
            TodoResponse::Redirect(location) => Redirect::to(&location).into_response(),
            TodoResponse::Render(status_code, html) => (status_code, html).into_response(),
            TodoResponse::NotFound => {
                let Ok(rendered) = NotFoundTemplate.render() else {
                    return StatusCode::NOT_FOUND.into_response();
                };
                (StatusCode::NOT_FOUND, Html(rendered)).into_response()
            }
            TodoResponse::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                [(header::ALLOW, "POST")],
                Html("<h1>Method Not Allowed</h1><p>This action only accepts form submissions.</p>"),
            )
                .into_response(),
        }
    }
}

/// Custom error type for todo handler operations.
#[derive(Debug, thiserror::Error)]
pub enum TodoError {
    /// Represents an error during template rendering.
    #[error("Template rendering failed")]
    Template(#[from] askama::Error),
    /// Represents a todo service error.
    #[error("Todo service error")]
    Service(#[from] TodoServiceError),
}

impl IntoResponse for TodoError {
    fn into_response(self) -> Response {
        if let TodoError::Service(TodoServiceError::TodoNotFound(_)) = self {
            return TodoResponse::NotFound.into_response();
        }

        tracing::error!("Todo request failed: {:?}", self);
        let user_facing_error_message =
            "An unexpected error occurred while processing your request. Please try again later.";
        let error_template = ErrorMessageTemplate::new(user_facing_error_message.to_string());
        let Ok(rendered) = error_template.render() else {
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Html(rendered)).into_response()
    }
}

#[derive(Template)]
#[template(path = "todos/list.html")]
struct TodoListTemplate {
    page: TodoPage,
}

#[derive(Template)]
#[template(path = "todos/detail.html")]
struct TodoDetailTemplate {
    todo: Todo,
}

#[derive(Template)]
#[template(path = "todos/form.html")]
struct TodoFormTemplate {
    heading: &'static str,
    action: String,
    cancel_url: String,
    form: TodoForm,
    errors: FormErrors,
}

impl TodoFormTemplate {
    fn for_create(form: TodoForm, errors: FormErrors) -> Self {
        Self {
            heading: "New todo",
            action: "/todo/add/".to_string(),
            cancel_url: "/".to_string(),
            form,
            errors,
        }
    }

    fn for_update(id: i32, form: TodoForm, errors: FormErrors) -> Self {
        Self {
            heading: "Edit todo",
            action: format!("/todo/{id}/edit/"),
            cancel_url: format!("/todo/{id}/"),
            form,
            errors,
        }
    }
}

#[derive(Template)]
#[template(path = "todos/confirm_delete.html")]
struct TodoConfirmDeleteTemplate {
    todo: Todo,
}

#[derive(Template)]
#[template(path = "not_found.html")]
struct NotFoundTemplate;

#[derive(Template)]
#[template(path = "error_message.html")]
struct ErrorMessageTemplate {
    message: String,
}

impl ErrorMessageTemplate {
    pub fn new(message: String) -> Self {
        Self { message }
    }
}

/// Handler for GET / that lists todos newest first.
#[tracing::instrument(skip(state))]
async fn list_handler(
    State(state): State<Arc<TodoState>>,
    Query(query): Query<ListQuery>,
) -> Result<TodoResponse, TodoError> {
    let todo_service = TodoService::new(&state.db);
    let page = todo_service
        .list_todos(query.page(), state.page_size)
        .await?;
    let template = TodoListTemplate { page };
    Ok(TodoResponse::ok(template.render()?))
}

/// Handler for GET /todo/{id}/.
#[tracing::instrument(skip(state))]
async fn detail_handler(
    State(state): State<Arc<TodoState>>,
    TodoId(id): TodoId,
) -> Result<TodoResponse, TodoError> {
    let todo_service = TodoService::new(&state.db);
    let todo = todo_service.get_todo_by_id(id).await?;
    let template = TodoDetailTemplate { todo };
    Ok(TodoResponse::ok(template.render()?))
}

/// Handler for serving the empty add form.
#[tracing::instrument]
async fn add_form_handler() -> Result<TodoResponse, TodoError> {
    let template = TodoFormTemplate::for_create(TodoForm::default(), FormErrors::new());
    Ok(TodoResponse::ok(template.render()?))
}

/// Handler for POST /todo/add/. Redirects to the new todo or re-displays the form with errors.
#[tracing::instrument(skip(state))]
async fn create_handler(
    State(state): State<Arc<TodoState>>,
    Form(form): Form<TodoForm>,
) -> Result<TodoResponse, TodoError> {
    let payload = match form.validate() {
        Ok(payload) => payload,
        Err(errors) => {
            tracing::info!("Rejected todo submission: {}", errors);
            let template = TodoFormTemplate::for_create(form, errors);
            return Ok(TodoResponse::Render(
                StatusCode::UNPROCESSABLE_ENTITY,
                Html(template.render()?),
            ));
        }
    };

    let todo_service = TodoService::new(&state.db);
    let todo = todo_service.create_todo(payload).await?;
    Ok(TodoResponse::Redirect(todo.absolute_url()))
}

/// Handler for serving the edit form pre-filled with the stored values.
#[tracing::instrument(skip(state))]
async fn edit_form_handler(
    State(state): State<Arc<TodoState>>,
    TodoId(id): TodoId,
) -> Result<TodoResponse, TodoError> {
    let todo_service = TodoService::new(&state.db);
    let todo = todo_service.get_todo_by_id(id).await?;
    let template = TodoFormTemplate::for_update(id, TodoForm::from(&todo), FormErrors::new());
    Ok(TodoResponse::ok(template.render()?))
}

/// Handler for POST /todo/{id}/edit/.
#[tracing::instrument(skip(state))]
async fn update_handler(
    State(state): State<Arc<TodoState>>,
    TodoId(id): TodoId,
    Form(form): Form<TodoForm>,
) -> Result<TodoResponse, TodoError> {
    let todo_service = TodoService::new(&state.db);
    // Unknown ids are reported as not found even when the submission is invalid.
    todo_service.get_todo_by_id(id).await?;

    let payload = match form.validate() {
        Ok(payload) => payload,
        Err(errors) => {
            tracing::info!("Rejected update of todo {}: {}", id, errors);
            let template = TodoFormTemplate::for_update(id, form, errors);
            return Ok(TodoResponse::Render(
                StatusCode::UNPROCESSABLE_ENTITY,
                Html(template.render()?),
            ));
        }
    };

    let todo = todo_service.update_todo_by_id(id, payload).await?;
    Ok(TodoResponse::Redirect(todo.absolute_url()))
}

/// Handler for GET /todo/{id}/delete/ that asks for confirmation without deleting anything.
#[tracing::instrument(skip(state))]
async fn delete_confirm_handler(
    State(state): State<Arc<TodoState>>,
    TodoId(id): TodoId,
) -> Result<TodoResponse, TodoError> {
    let todo_service = TodoService::new(&state.db);
    let todo = todo_service.get_todo_by_id(id).await?;
    let template = TodoConfirmDeleteTemplate { todo };
    Ok(TodoResponse::ok(template.render()?))
}

/// Handler for POST /todo/{id}/delete/.
#[tracing::instrument(skip(state))]
async fn delete_handler(
    State(state): State<Arc<TodoState>>,
    TodoId(id): TodoId,
) -> Result<TodoResponse, TodoError> {
    let todo_service = TodoService::new(&state.db);
    todo_service.delete_todo_by_id(id).await?;
    Ok(TodoResponse::Redirect("/".to_string()))
}

/// Handler for /todo/{id}/toggle-resolved/. Every method is routed here so the guard
/// below decides; only POST may flip the flag.
#[tracing::instrument(skip(state))]
async fn toggle_resolved_handler(
    method: Method,
    State(state): State<Arc<TodoState>>,
    TodoId(id): TodoId,
    headers: HeaderMap,
) -> Result<TodoResponse, TodoError> {
    if method != Method::POST {
        tracing::warn!("Refused {} request to toggle todo {}", method, id);
        return Ok(TodoResponse::MethodNotAllowed);
    }

    let todo_service = TodoService::new(&state.db);
    let todo = todo_service.toggle_resolved_by_id(id).await?;
    let location = referer_location(&headers).unwrap_or_else(|| todo.absolute_url());
    Ok(TodoResponse::Redirect(location))
}

/// Path and query of the `Referer` header. The host is dropped so the redirect stays on this site.
fn referer_location(headers: &HeaderMap) -> Option<String> {
    let referer = headers.get(header::REFERER)?.to_str().ok()?;
    let uri: Uri = referer.parse().ok()?;
    let path_and_query = uri.path_and_query()?.as_str();
    if !path_and_query.starts_with('/') || path_and_query.starts_with("//") {
        return None;
    }
    Some(path_and_query.to_string())
}

/// Creates and returns the todo router with all page routes.
pub fn create_todo_router(state: Arc<TodoState>) -> Router {
    Router::new()
        .route("/", get(list_handler))
        .route("/todo/add/", get(add_form_handler).post(create_handler))
        .route("/todo/{id}/", get(detail_handler))
        .route("/todo/{id}/edit/", get(edit_form_handler).post(update_handler))
        .route(
            "/todo/{id}/delete/",
            get(delete_confirm_handler).post(delete_handler),
        )
        .route(
            "/todo/{id}/toggle-resolved/",
            any(toggle_resolved_handler),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with_referer(referer: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::REFERER, HeaderValue::from_str(referer).unwrap());
        headers
    }

    #[test]
    fn referer_keeps_only_path_and_query() {
        let headers = headers_with_referer("http://localhost:8080/?page=2");
        insta::assert_snapshot!(referer_location(&headers).unwrap(), @"/?page=2");
    }

    #[test]
    fn accepts_relative_referer() {
        let headers = headers_with_referer("/todo/3/");
        assert_eq!(referer_location(&headers), Some("/todo/3/".to_string()));
    }

    #[test]
    fn ignores_missing_or_unusable_referer() {
        assert_eq!(referer_location(&HeaderMap::new()), None);
        assert_eq!(referer_location(&headers_with_referer("not a uri")), None);
    }

    #[test]
    fn garbled_page_falls_back_to_first_page() {
        let query = ListQuery {
            page: Some("last".to_string()),
        };
        assert_eq!(query.page(), 1);
        let query = ListQuery {
            page: Some("3".to_string()),
        };
        assert_eq!(query.page(), 3);
        assert_eq!(ListQuery { page: None }.page(), 1);
    }

    #[tokio::test]
    async fn method_not_allowed_advertises_post() {
        let response = TodoResponse::MethodNotAllowed.into_response();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            response.headers().get(header::ALLOW),
            Some(&HeaderValue::from_static("POST"))
        );
    }

    #[tokio::test]
    async fn not_found_service_error_renders_not_found_page() {
        let error = TodoError::Service(TodoServiceError::TodoNotFound(42));
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn template_error_renders_internal_server_error() {
        let template_error = askama::Error::Custom("Simulated template rendering failure".into());
        let response = TodoError::Template(template_error).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
