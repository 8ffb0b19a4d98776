use sqlx::{SqliteConnection, SqlitePool};
use validator::Validate;

use crate::data_formats::{Page, PostRequest};
use crate::errors::RequestError;
use crate::models::{Actor, Post};
use crate::policy::{ensure_can_moderate, ensure_can_mutate};

use super::AUTHOR_COLUMNS;

fn post_query(filter: &str) -> String {
    format!(
        r#"
        SELECT posts.id         AS id,
               posts.title      AS title,
               posts.content    AS content,
               posts.author_id  AS author_id,
               posts.created_at AS created_at,
               posts.updated_at AS updated_at,
               posts.view_count AS view_count,
               posts.is_pinned  AS is_pinned,
               {AUTHOR_COLUMNS}
        FROM   posts
               JOIN users
                 ON users.id = posts.author_id
        {filter}
        "#
    )
}

async fn fetch_post(conn: &mut SqliteConnection, id: i64) -> Result<Option<Post>, sqlx::Error> {
    sqlx::query_as::<_, Post>(&post_query("WHERE posts.id = $1"))
        .bind(id)
        .fetch_optional(conn)
        .await
}

async fn fetch_existing_post(conn: &mut SqliteConnection, id: i64) -> Result<Post, RequestError> {
    fetch_post(conn, id)
        .await?
        .ok_or(RequestError::NotFound("Post not found"))
}

/// Atomically bumps the view counter. Returns false when the post is absent.
pub async fn increment_view_count(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE posts SET view_count = view_count + 1 WHERE id = $1")
        .bind(id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn create_post_in_db(
    pool: &SqlitePool,
    author_id: i64,
    PostRequest { title, content }: PostRequest,
) -> Result<Post, RequestError> {
    let mut tx = pool.begin().await?;
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO posts (title, content, author_id)
        VALUES ($1, $2, $3)
        RETURNING id
        "#,
    )
    .bind(title)
    .bind(content)
    .bind(author_id)
    .fetch_one(&mut tx)
    .await?;
    let post = fetch_existing_post(&mut tx, id).await?;
    tx.commit().await?;
    tracing::info!(post_id = post.id, author_id, "created post");
    Ok(post)
}

/// Reading a post by id counts as a view, so this is a write.
pub async fn view_post_in_db(pool: &SqlitePool, id: i64) -> Result<Post, RequestError> {
    let mut tx = pool.begin().await?;
    if !increment_view_count(&mut tx, id).await? {
        return Err(RequestError::NotFound("Post not found"));
    }
    let post = fetch_existing_post(&mut tx, id).await?;
    tx.commit().await?;
    Ok(post)
}

pub async fn update_post_in_db(
    pool: &SqlitePool,
    id: i64,
    actor: &Actor,
    request: PostRequest,
) -> Result<Post, RequestError> {
    let mut tx = pool.begin().await?;
    let post = fetch_existing_post(&mut tx, id).await?;
    ensure_can_mutate(actor, post.author_id)?;
    request.validate()?;
    let PostRequest { title, content } = request;

    sqlx::query(
        r#"
        UPDATE posts
        SET    title = $1, content = $2, updated_at = CURRENT_TIMESTAMP
        WHERE  id = $3
        "#,
    )
    .bind(title)
    .bind(content)
    .bind(id)
    .execute(&mut tx)
    .await?;

    let post = fetch_existing_post(&mut tx, id).await?;
    tx.commit().await?;
    Ok(post)
}

pub async fn delete_post_in_db(
    pool: &SqlitePool,
    id: i64,
    actor: &Actor,
) -> Result<(), RequestError> {
    let mut tx = pool.begin().await?;
    let post = fetch_existing_post(&mut tx, id).await?;
    ensure_can_mutate(actor, post.author_id)?;

    let comments = sqlx::query("DELETE FROM comments WHERE post_id = $1")
        .bind(id)
        .execute(&mut tx)
        .await?;
    sqlx::query("DELETE FROM posts WHERE id = $1")
        .bind(id)
        .execute(&mut tx)
        .await?;
    tx.commit().await?;
    tracing::info!(
        post_id = id,
        actor_id = actor.id,
        comments_removed = comments.rows_affected(),
        "deleted post"
    );
    Ok(())
}

pub async fn set_post_pinned_in_db(
    pool: &SqlitePool,
    id: i64,
    actor: &Actor,
    pinned: bool,
) -> Result<Post, RequestError> {
    let mut tx = pool.begin().await?;
    fetch_existing_post(&mut tx, id).await?;
    ensure_can_moderate(actor)?;

    sqlx::query("UPDATE posts SET is_pinned = $1 WHERE id = $2")
        .bind(pinned)
        .bind(id)
        .execute(&mut tx)
        .await?;

    let post = fetch_existing_post(&mut tx, id).await?;
    tx.commit().await?;
    Ok(post)
}

/// Pinned posts first, then in insertion order.
pub async fn list_posts_in_db(pool: &SqlitePool, page: Page) -> Result<Vec<Post>, RequestError> {
    let query = post_query("ORDER BY posts.is_pinned DESC, posts.id ASC LIMIT $1 OFFSET $2");
    let posts = sqlx::query_as::<_, Post>(&query)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(pool)
        .await?;
    Ok(posts)
}

pub async fn list_posts_by_author_in_db(
    pool: &SqlitePool,
    author_id: i64,
) -> Result<Vec<Post>, RequestError> {
    let query = post_query("WHERE posts.author_id = $1 ORDER BY posts.id ASC");
    let posts = sqlx::query_as::<_, Post>(&query)
        .bind(author_id)
        .fetch_all(pool)
        .await?;
    Ok(posts)
}
