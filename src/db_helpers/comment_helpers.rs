use std::collections::{HashMap, HashSet};

use sqlx::{SqliteConnection, SqlitePool};
use validator::Validate;

use crate::{
    data_formats::{CreateCommentRequest, Page, UpdateCommentRequest},
    errors::RequestError,
    models::{Actor, Comment, CommentNode},
    policy::ensure_can_mutate,
};

use super::{post_exists, AUTHOR_COLUMNS};

// Ids of a comment and every reply beneath it.
const SUBTREE_CTE: &str = r#"
        WITH RECURSIVE subtree(id) AS (
            SELECT id FROM comments WHERE id = $1
            UNION ALL
            SELECT comments.id
            FROM   comments
                   JOIN subtree
                     ON comments.parent_id = subtree.id
        )
"#;

fn comment_query(filter: &str) -> String {
    format!(
        r#"
        SELECT comments.id         AS id,
               comments.content    AS content,
               comments.post_id    AS post_id,
               comments.author_id  AS author_id,
               comments.parent_id  AS parent_id,
               comments.created_at AS created_at,
               comments.updated_at AS updated_at,
               {AUTHOR_COLUMNS}
        FROM   comments
               JOIN users
                 ON users.id = comments.author_id
        {filter}
        "#
    )
}

async fn fetch_existing_comment(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Comment, RequestError> {
    sqlx::query_as::<_, Comment>(&comment_query("WHERE comments.id = $1"))
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or(RequestError::NotFound("Comment not found"))
}

/// Groups a flat list of comments into reply trees by `parent_id`.
///
/// A comment whose parent is not part of `comments` becomes a root, so a
/// page cut out of a longer listing still yields every comment exactly once.
/// Siblings keep the relative order they had in the input.
pub fn build_comment_tree(comments: Vec<Comment>) -> Vec<CommentNode> {
    let present: HashSet<i64> = comments.iter().map(|comment| comment.id).collect();
    let mut roots = Vec::new();
    let mut children: HashMap<i64, Vec<Comment>> = HashMap::new();
    for comment in comments {
        match comment.parent_id {
            Some(parent_id) if present.contains(&parent_id) => {
                children.entry(parent_id).or_default().push(comment);
            }
            _ => roots.push(comment),
        }
    }
    roots
        .into_iter()
        .map(|root| attach_replies(root, &mut children))
        .collect()
}

fn attach_replies(comment: Comment, children: &mut HashMap<i64, Vec<Comment>>) -> CommentNode {
    let replies = children
        .remove(&comment.id)
        .unwrap_or_default()
        .into_iter()
        .map(|reply| attach_replies(reply, children))
        .collect();
    CommentNode { comment, replies }
}

pub async fn create_comment_in_db(
    pool: &SqlitePool,
    author_id: i64,
    post_id: i64,
    request: CreateCommentRequest,
) -> Result<Comment, RequestError> {
    let mut tx = pool.begin().await?;
    if !post_exists(&mut tx, post_id).await? {
        return Err(RequestError::NotFound("Post not found"));
    }

    if let Some(parent_id) = request.parent_id {
        // Outer None: no such comment in this post. Inner Some: parent is itself a reply.
        let grandparent: Option<Option<i64>> =
            sqlx::query_scalar("SELECT parent_id FROM comments WHERE id = $1 AND post_id = $2")
                .bind(parent_id)
                .bind(post_id)
                .fetch_optional(&mut tx)
                .await?;
        match grandparent {
            None => {
                return Err(RequestError::NotFound(
                    "Parent comment not found in this post",
                ))
            }
            Some(Some(_)) => {
                return Err(RequestError::Validation(
                    "Replies can only be made to top-level comments".to_owned(),
                ))
            }
            Some(None) => {}
        }
    }
    request.validate()?;
    let CreateCommentRequest { content, parent_id } = request;

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO comments (content, post_id, author_id, parent_id)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(content)
    .bind(post_id)
    .bind(author_id)
    .bind(parent_id)
    .fetch_one(&mut tx)
    .await?;

    let comment = fetch_existing_comment(&mut tx, id).await?;
    tx.commit().await?;
    Ok(comment)
}

/// The comment with its whole reply subtree attached.
pub async fn get_comment_thread_in_db(
    pool: &SqlitePool,
    id: i64,
) -> Result<CommentNode, RequestError> {
    let mut tx = pool.begin().await?;
    let comment = fetch_existing_comment(&mut tx, id).await?;
    let filter =
        "WHERE comments.id IN (SELECT id FROM subtree WHERE id != $1) ORDER BY comments.id ASC";
    let query = format!("{SUBTREE_CTE} {}", comment_query(filter));
    let descendants = sqlx::query_as::<_, Comment>(&query)
        .bind(id)
        .fetch_all(&mut tx)
        .await?;
    tx.commit().await?;

    let replies = build_comment_tree(descendants);
    Ok(CommentNode { comment, replies })
}

pub async fn update_comment_in_db(
    pool: &SqlitePool,
    id: i64,
    actor: &Actor,
    request: UpdateCommentRequest,
) -> Result<Comment, RequestError> {
    let mut tx = pool.begin().await?;
    let comment = fetch_existing_comment(&mut tx, id).await?;
    ensure_can_mutate(actor, comment.author_id)?;
    request.validate()?;

    sqlx::query(
        "UPDATE comments SET content = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2",
    )
    .bind(request.content)
    .bind(id)
    .execute(&mut tx)
    .await?;

    let comment = fetch_existing_comment(&mut tx, id).await?;
    tx.commit().await?;
    Ok(comment)
}

/// Deletes the comment together with every reply beneath it.
pub async fn delete_comment_in_db(
    pool: &SqlitePool,
    id: i64,
    actor: &Actor,
) -> Result<(), RequestError> {
    let mut tx = pool.begin().await?;
    let comment = fetch_existing_comment(&mut tx, id).await?;
    ensure_can_mutate(actor, comment.author_id)?;

    let query = format!("{SUBTREE_CTE} DELETE FROM comments WHERE id IN (SELECT id FROM subtree)");
    let result = sqlx::query(&query).bind(id).execute(&mut tx).await?;
    tx.commit().await?;
    tracing::info!(
        comment_id = id,
        actor_id = actor.id,
        removed = result.rows_affected(),
        "deleted comment"
    );
    Ok(())
}

pub async fn list_comments_for_post_in_db(
    pool: &SqlitePool,
    post_id: i64,
    page: Page,
) -> Result<Vec<Comment>, RequestError> {
    let mut tx = pool.begin().await?;
    if !post_exists(&mut tx, post_id).await? {
        return Err(RequestError::NotFound("Post not found"));
    }
    let query = comment_query(
        "WHERE comments.post_id = $1 ORDER BY comments.id ASC LIMIT $2 OFFSET $3",
    );
    let comments = sqlx::query_as::<_, Comment>(&query)
        .bind(post_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&mut tx)
        .await?;
    tx.commit().await?;
    Ok(comments)
}
