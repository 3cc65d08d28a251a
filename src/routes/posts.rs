//! The JSON API over blog posts. Every route sits behind the session gate.

use super::gate::require_session;
use crate::entity::post;
use crate::error::{FieldError, HttpError};
use crate::store::{ListQuery, NewPost, PostChanges, Sort, SortField, DEFAULT_COUNT, MAX_COUNT};
use crate::ServerState;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Json},
    routing::{get, Router},
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

const VALIDATION_ERROR: &str = "Validation error";

pub fn routes() -> Router<ServerState> {
    Router::new()
        .route("/posts", get(list_handler).post(create_handler))
        .route(
            "/posts/:id",
            get(get_handler)
                .put(update_handler)
                .patch(update_handler)
                .delete(delete_handler),
        )
        .route_layer(middleware::from_fn(require_session))
}

#[derive(Deserialize, Debug, Default)]
struct ListParams {
    offset: Option<u64>,
    count: Option<u64>,
    q: Option<String>,
    title: Option<String>,
    content: Option<String>,
    sort: Option<String>,
}

impl TryFrom<ListParams> for ListQuery {
    type Error = HttpError;

    fn try_from(params: ListParams) -> Result<Self, Self::Error> {
        let sort = match &params.sort {
            Some(sort) => parse_sort(sort)?,
            None => Vec::new(),
        };

        Ok(ListQuery {
            offset: params.offset.unwrap_or(0),
            count: params.count.unwrap_or(DEFAULT_COUNT).min(MAX_COUNT),
            search: params.q.filter(|q| !q.is_empty()),
            title: params.title,
            content: params.content,
            sort,
        })
    }
}

/// Parse a list like `title,-createdAt`, where a leading `-` sorts
/// descending.
fn parse_sort(sort: &str) -> Result<Vec<Sort>, HttpError> {
    let mut unknown = Vec::new();

    let terms: Vec<Sort> = sort
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .filter_map(|term| {
            let (name, descending) = match term.strip_prefix('-') {
                Some(name) => (name, true),
                None => (term, false),
            };

            match SortField::from_attribute(name) {
                Some(field) => Some(Sort { field, descending }),
                None => {
                    unknown.push(FieldError::new("sort", format!("cannot sort by {}", name)));
                    None
                }
            }
        })
        .collect();

    if unknown.is_empty() {
        Ok(terms)
    } else {
        Err(HttpError::Validation(
            "Sorting not allowed on given attributes",
            unknown,
        ))
    }
}

/// The body of a create or update request.
#[derive(Deserialize, Debug)]
struct PostInput {
    title: Option<String>,
    content: Option<String>,
}

fn body_error(rejection: JsonRejection) -> HttpError {
    debug!("rejected post body: {}", rejection.body_text());
    HttpError::Validation(
        VALIDATION_ERROR,
        vec![FieldError::new("body", rejection.body_text())],
    )
}

/// Non-numeric ids can never name a post.
fn parse_id(id: &str) -> Result<i32, HttpError> {
    id.parse().map_err(|_| HttpError::NotFound)
}

#[axum::debug_handler(state = ServerState)]
async fn list_handler(
    State(state): State<ServerState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<impl IntoResponse, HttpError> {
    let Query(params) = params.map_err(|rejection| {
        HttpError::Validation(
            VALIDATION_ERROR,
            vec![FieldError::new("query", rejection.body_text())],
        )
    })?;
    let query = ListQuery::try_from(params)?;

    let page = state.posts.list(&query).await?;

    Ok((
        [(header::CONTENT_RANGE, page.content_range())],
        Json(page.items),
    ))
}

#[axum::debug_handler(state = ServerState)]
async fn create_handler(
    State(state): State<ServerState>,
    body: Result<Json<PostInput>, JsonRejection>,
) -> Result<(StatusCode, Json<post::Model>), HttpError> {
    let Json(input) = body.map_err(body_error)?;

    let new = match (input.title, input.content) {
        (Some(title), Some(content)) => NewPost { title, content },
        (title, content) => {
            let missing = [("title", title.is_none()), ("content", content.is_none())]
                .into_iter()
                .filter(|(_, missing)| *missing)
                .map(|(field, _)| FieldError::new(field, format!("{} is required", field)))
                .collect();
            return Err(HttpError::Validation(VALIDATION_ERROR, missing));
        }
    };

    let created = state.posts.create(new).await?;
    info!("created post {}", created.id);

    Ok((StatusCode::CREATED, Json(created)))
}

#[axum::debug_handler(state = ServerState)]
async fn get_handler(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Result<Json<post::Model>, HttpError> {
    let post = state.posts.get(parse_id(&id)?).await?;

    Ok(Json(post))
}

/// Serves both PUT and PATCH: only the fields present in the body change.
#[axum::debug_handler(state = ServerState)]
async fn update_handler(
    State(state): State<ServerState>,
    Path(id): Path<String>,
    body: Result<Json<PostInput>, JsonRejection>,
) -> Result<Json<post::Model>, HttpError> {
    let id = parse_id(&id)?;
    let Json(input) = body.map_err(body_error)?;

    let changes = PostChanges {
        title: input.title,
        content: input.content,
    };
    let updated = state.posts.update(id, changes).await?;
    info!("updated post {}", updated.id);

    Ok(Json(updated))
}

#[axum::debug_handler(state = ServerState)]
async fn delete_handler(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, HttpError> {
    let id = parse_id(&id)?;

    state.posts.delete(id).await?;
    info!("deleted post {}", id);

    Ok(Json(json!({})))
}
