//! `/items` endpoints: whole-item and per-field CRUD, similarity search and
//! text lookup.
//!
//! Creation and full replacement take `multipart/form-data` (text fields plus
//! an optional `image` file part); single text fields and embeddings take
//! url-encoded forms. Embeddings always travel as base64 of the raw
//! little-endian `f32` bytes.

use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;
use artdeco::embedding::decode_base64;
use artdeco::{
    Embedding, Image, Item, ItemInput, ItemRepository, MatchMode, RepositoryResult, SearchHit,
    TextField, ValidationError,
};
use axum::extract::{Form, Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Body of `DELETE /items/{id}`
#[derive(Debug, Serialize, Deserialize)]
pub struct DeletedResponse {
    pub id: String,
}

/// Form of `POST /items/search`
#[derive(Debug, Deserialize)]
pub struct SearchForm {
    /// Base64 query embedding
    pub embedding: String,

    /// Number of results; the configured default when absent
    #[serde(default)]
    pub k: Option<usize>,
}

/// Query parameters of `GET /items/find`
#[derive(Debug, Deserialize)]
pub struct FindQuery {
    pub field: TextField,
    pub q: String,
    #[serde(default)]
    pub mode: MatchMode,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Fields collected from a multipart item body.
#[derive(Debug, Default)]
struct ItemForm {
    title: Option<String>,
    author: Option<String>,
    description: Option<String>,
    embedding: Option<String>,
    image: Option<Image>,
}

impl ItemForm {
    async fn read(mut multipart: Multipart) -> ServerResult<Self> {
        let mut form = ItemForm::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "title" => form.title = Some(field.text().await?),
                "author" => form.author = Some(field.text().await?),
                "description" => form.description = Some(field.text().await?),
                "embedding" => form.embedding = Some(field.text().await?),
                "image" => {
                    let content_type = field.content_type().unwrap_or_default().to_string();
                    let bytes = field.bytes().await?;
                    form.image = Some(Image::new(bytes.to_vec(), content_type));
                }
                other => tracing::debug!(field = other, "ignoring unknown multipart field"),
            }
        }
        Ok(form)
    }

    fn into_input(self) -> ServerResult<ItemInput> {
        let embedding = self
            .embedding
            .ok_or(ValidationError::MissingField("embedding"))?;
        let input = ItemInput::new(
            self.title.ok_or(ValidationError::MissingField("title"))?,
            self.author.ok_or(ValidationError::MissingField("author"))?,
            self.description.unwrap_or_default(),
            decode_base64(&embedding)?,
        );

        // Browsers send an empty file part when no file was picked.
        Ok(match self.image {
            Some(image) if !image.bytes.is_empty() => input.with_image(image),
            _ => input,
        })
    }
}

/// Run a repository call on the blocking pool.
async fn run<T, F>(state: &ServerState, f: F) -> ServerResult<T>
where
    T: Send + 'static,
    F: FnOnce(&ItemRepository) -> RepositoryResult<T> + Send + 'static,
{
    let repository = state.repository.clone();
    tokio::task::spawn_blocking(move || f(&repository))
        .await
        .map_err(|e| ServerError::Internal(format!("repository task failed: {e}")))?
        .map_err(ServerError::from)
}

fn found<T>(value: Option<T>, id: String) -> ServerResult<T> {
    value.ok_or(ServerError::NotFound(id))
}

fn text_body(field: TextField, value: String) -> Json<serde_json::Map<String, serde_json::Value>> {
    let mut body = serde_json::Map::new();
    body.insert(field.as_str().to_string(), serde_json::Value::String(value));
    Json(body)
}

fn image_response(image: Image) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, image.content_type)], image.bytes)
}

/// Create an item
pub async fn create_item(
    State(state): State<Arc<ServerState>>,
    multipart: Multipart,
) -> ServerResult<impl IntoResponse> {
    let input = ItemForm::read(multipart).await?.into_input()?;
    let item = run(&state, move |repo| repo.add(input)).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// Get an item without its embedding or image
pub async fn get_item(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> ServerResult<Json<Item>> {
    let key = id.clone();
    let item = run(&state, move |repo| repo.get(&key)).await?;
    Ok(Json(found(item, id)?))
}

async fn get_text(
    state: &ServerState,
    id: String,
    field: TextField,
) -> ServerResult<impl IntoResponse> {
    let key = id.clone();
    let value = run(state, move |repo| repo.get_text(&key, field)).await?;
    Ok(text_body(field, found(value, id)?))
}

async fn put_text(
    state: &ServerState,
    id: String,
    field: TextField,
    mut form: HashMap<String, String>,
) -> ServerResult<impl IntoResponse> {
    let value = form
        .remove(field.as_str())
        .ok_or(ValidationError::MissingField(field.as_str()))?;
    let key = id.clone();
    let updated = run(state, move |repo| repo.update_text(&key, field, &value)).await?;
    Ok(text_body(field, found(updated, id)?))
}

pub async fn get_title(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> ServerResult<impl IntoResponse> {
    get_text(&state, id, TextField::Title).await
}

pub async fn get_author(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> ServerResult<impl IntoResponse> {
    get_text(&state, id, TextField::Author).await
}

pub async fn get_description(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> ServerResult<impl IntoResponse> {
    get_text(&state, id, TextField::Description).await
}

pub async fn put_title(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    Form(form): Form<HashMap<String, String>>,
) -> ServerResult<impl IntoResponse> {
    put_text(&state, id, TextField::Title, form).await
}

pub async fn put_author(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    Form(form): Form<HashMap<String, String>>,
) -> ServerResult<impl IntoResponse> {
    put_text(&state, id, TextField::Author, form).await
}

pub async fn put_description(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    Form(form): Form<HashMap<String, String>>,
) -> ServerResult<impl IntoResponse> {
    put_text(&state, id, TextField::Description, form).await
}

/// Get the embedding as a base64 JSON string
pub async fn get_embedding(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> ServerResult<Json<Embedding>> {
    let key = id.clone();
    let embedding = run(&state, move |repo| repo.get_embedding(&key)).await?;
    Ok(Json(found(embedding, id)?))
}

/// Replace the embedding; form field `embedding` holds base64 bytes
pub async fn put_embedding(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    Form(mut form): Form<HashMap<String, String>>,
) -> ServerResult<Json<Embedding>> {
    let encoded = form
        .remove("embedding")
        .ok_or(ValidationError::MissingField("embedding"))?;
    let bytes = decode_base64(&encoded)?;
    let key = id.clone();
    let updated = run(&state, move |repo| repo.update_embedding(&key, &bytes)).await?;
    Ok(Json(found(updated, id)?))
}

/// Get the raw image bytes under their stored content type
pub async fn get_image(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> ServerResult<impl IntoResponse> {
    let key = id.clone();
    let image = run(&state, move |repo| repo.get_image(&key)).await?;
    Ok(image_response(found(image, id)?))
}

/// Replace the image; echoes the stored bytes back
pub async fn put_image(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> ServerResult<impl IntoResponse> {
    let image = ItemForm::read(multipart)
        .await?
        .image
        .ok_or(ValidationError::MissingField("image"))?;
    let key = id.clone();
    let updated = run(&state, move |repo| repo.update_image(&key, image)).await?;
    Ok(image_response(found(updated, id)?))
}

/// Replace every field of an existing item
pub async fn update_item(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> ServerResult<Json<Item>> {
    let input = ItemForm::read(multipart).await?.into_input()?;
    let key = id.clone();
    let item = run(&state, move |repo| repo.update(&key, input)).await?;
    Ok(Json(found(item, id)?))
}

pub async fn delete_item(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> ServerResult<Json<DeletedResponse>> {
    let key = id.clone();
    let deleted = run(&state, move |repo| repo.delete(&key)).await?;
    Ok(Json(DeletedResponse {
        id: found(deleted, id)?,
    }))
}

/// Nearest items to the posted embedding, most similar first
pub async fn search_items(
    State(state): State<Arc<ServerState>>,
    Form(form): Form<SearchForm>,
) -> ServerResult<Json<Vec<SearchHit>>> {
    let bytes = decode_base64(&form.embedding)?;
    let hits = run(&state, move |repo| match form.k {
        Some(k) => repo.search(&bytes, k),
        None => repo.search_default(&bytes),
    })
    .await?;
    Ok(Json(hits))
}

/// Items whose text field matches `q`, oldest first
pub async fn find_items(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<FindQuery>,
) -> ServerResult<Json<Vec<Item>>> {
    let items = run(&state, move |repo| {
        let limit = query.limit.unwrap_or(repo.config().max_k);
        repo.find(query.field, &query.q, query.mode, limit)
    })
    .await?;
    Ok(Json(items))
}
