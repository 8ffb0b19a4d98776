use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    Extension, Form, Json,
};
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    authentication::{AuthUser, TokenIssuer},
    data_formats::{
        CommentQueryParams, CommentResponse, CommentThreadResponse, CreateCommentRequest,
        LoginForm, MessageResponse, PinRequest, PostQueryParams, PostRequest, PostResponse,
        RegisterRequest, TokenResponse, UpdateCommentRequest, UserDetail, UserSummary,
    },
    db_helpers::{
        authenticate_user_in_db, build_comment_tree, create_comment_in_db, create_post_in_db,
        delete_comment_in_db, delete_post_in_db, get_comment_thread_in_db, get_user_detail_in_db,
        list_comments_for_post_in_db, list_posts_in_db, register_user_in_db,
        set_post_pinned_in_db, update_comment_in_db, update_post_in_db, view_post_in_db,
    },
    errors::RequestError,
    JsonResponse,
};

type JsonResult<T> = Result<JsonResponse<T>, RequestError>;

// ----------------- Helper Handlers -----------------
pub async fn root() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "Forum API".to_owned(),
    })
}

pub async fn alive() -> &'static str {
    "alive"
}

pub async fn not_found(uri: Uri) -> Result<(), (StatusCode, String)> {
    Err((
        StatusCode::NOT_FOUND,
        format!("URL {} provided was not found", uri),
    ))
}

// ----------------- User Handlers -----------------
pub async fn register_user(
    Extension(pool): Extension<Arc<SqlitePool>>,
    Json(request): Json<RegisterRequest>,
) -> JsonResult<UserSummary> {
    request.validate()?;
    let user = register_user_in_db(&pool, request).await?;
    Ok((StatusCode::CREATED, Json(UserSummary::from(&user))))
}

pub async fn login_user(
    Extension(pool): Extension<Arc<SqlitePool>>,
    Extension(issuer): Extension<Arc<TokenIssuer>>,
    Form(LoginForm { username, password }): Form<LoginForm>,
) -> JsonResult<TokenResponse> {
    let user = authenticate_user_in_db(&pool, &username, password).await?;
    let token = issuer.issue(&user).map_err(|e| {
        tracing::error!(error = %e, "could not sign access token");
        RequestError::ServerError
    })?;
    tracing::info!(user_id = user.id, "user logged in");
    Ok((StatusCode::OK, Json(TokenResponse::bearer(token))))
}

pub async fn get_current_user(
    Extension(pool): Extension<Arc<SqlitePool>>,
    AuthUser(user): AuthUser,
) -> JsonResult<UserDetail> {
    let (user, posts) = get_user_detail_in_db(&pool, user.id).await?;
    Ok((StatusCode::OK, Json(UserDetail::new(&user, posts))))
}

pub async fn get_user(
    Extension(pool): Extension<Arc<SqlitePool>>,
    Path(id): Path<i64>,
) -> JsonResult<UserDetail> {
    let (user, posts) = get_user_detail_in_db(&pool, id).await?;
    Ok((StatusCode::OK, Json(UserDetail::new(&user, posts))))
}
// ----------------- End User Handlers -----------------

// ----------------- Post Handlers -----------------
pub async fn create_post(
    Extension(pool): Extension<Arc<SqlitePool>>,
    auth: AuthUser,
    Json(request): Json<PostRequest>,
) -> JsonResult<PostResponse> {
    request.validate()?;
    let post = create_post_in_db(&pool, auth.0.id, request).await?;
    Ok((StatusCode::CREATED, Json(PostResponse::from(post))))
}

pub async fn list_posts(
    Extension(pool): Extension<Arc<SqlitePool>>,
    Query(params): Query<PostQueryParams>,
) -> JsonResult<Vec<PostResponse>> {
    let posts = list_posts_in_db(&pool, params.page()).await?;
    let posts = posts.into_iter().map(PostResponse::from).collect();
    Ok((StatusCode::OK, Json(posts)))
}

pub async fn get_post(
    Extension(pool): Extension<Arc<SqlitePool>>,
    Path(id): Path<i64>,
) -> JsonResult<PostResponse> {
    let post = view_post_in_db(&pool, id).await?;
    Ok((StatusCode::OK, Json(PostResponse::from(post))))
}

pub async fn update_post(
    Extension(pool): Extension<Arc<SqlitePool>>,
    auth: AuthUser,
    Path(id): Path<i64>,
    Json(request): Json<PostRequest>,
) -> JsonResult<PostResponse> {
    let post = update_post_in_db(&pool, id, &auth.actor(), request).await?;
    Ok((StatusCode::OK, Json(PostResponse::from(post))))
}

pub async fn delete_post(
    Extension(pool): Extension<Arc<SqlitePool>>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, RequestError> {
    delete_post_in_db(&pool, id, &auth.actor()).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn pin_post(
    Extension(pool): Extension<Arc<SqlitePool>>,
    auth: AuthUser,
    Path(id): Path<i64>,
    Json(PinRequest { pinned }): Json<PinRequest>,
) -> JsonResult<PostResponse> {
    let post = set_post_pinned_in_db(&pool, id, &auth.actor(), pinned).await?;
    Ok((StatusCode::OK, Json(PostResponse::from(post))))
}
// ----------------- End Post Handlers -----------------

// ----------------- Comment Handlers -----------------
pub async fn create_comment(
    Extension(pool): Extension<Arc<SqlitePool>>,
    auth: AuthUser,
    Path(post_id): Path<i64>,
    Json(request): Json<CreateCommentRequest>,
) -> JsonResult<CommentResponse> {
    let comment = create_comment_in_db(&pool, auth.0.id, post_id, request).await?;
    Ok((StatusCode::CREATED, Json(CommentResponse::from(comment))))
}

pub async fn list_comments(
    Extension(pool): Extension<Arc<SqlitePool>>,
    Path(post_id): Path<i64>,
    Query(params): Query<CommentQueryParams>,
) -> Result<Response, RequestError> {
    let comments = list_comments_for_post_in_db(&pool, post_id, params.page()).await?;
    let response = if params.threaded {
        let threads: Vec<CommentThreadResponse> = build_comment_tree(comments)
            .into_iter()
            .map(CommentThreadResponse::from)
            .collect();
        Json(threads).into_response()
    } else {
        let comments: Vec<CommentResponse> =
            comments.into_iter().map(CommentResponse::from).collect();
        Json(comments).into_response()
    };
    Ok(response)
}

pub async fn get_comment(
    Extension(pool): Extension<Arc<SqlitePool>>,
    Path(id): Path<i64>,
) -> JsonResult<CommentThreadResponse> {
    let thread = get_comment_thread_in_db(&pool, id).await?;
    Ok((StatusCode::OK, Json(CommentThreadResponse::from(thread))))
}

pub async fn update_comment(
    Extension(pool): Extension<Arc<SqlitePool>>,
    auth: AuthUser,
    Path(id): Path<i64>,
    Json(request): Json<UpdateCommentRequest>,
) -> JsonResult<CommentResponse> {
    let comment = update_comment_in_db(&pool, id, &auth.actor(), request).await?;
    Ok((StatusCode::OK, Json(CommentResponse::from(comment))))
}

pub async fn delete_comment(
    Extension(pool): Extension<Arc<SqlitePool>>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, RequestError> {
    delete_comment_in_db(&pool, id, &auth.actor()).await?;
    Ok(StatusCode::NO_CONTENT)
}
// ----------------- End Comment Handlers -----------------
