use sqlx::{SqliteConnection, SqlitePool};

use crate::{errors::RequestError, models::User};

mod comment_helpers;
mod post_helpers;
mod user_helpers;

pub use comment_helpers::*;
pub use post_helpers::*;
pub use user_helpers::*;

const USER_COLUMNS: &str = r#"
        id, username, email, password_hash, is_active, is_admin, created_at, last_login
"#;

// Author columns shared by the post and comment read models.
const AUTHOR_COLUMNS: &str = r#"
        users.username   AS author_username,
        users.email      AS author_email,
        users.is_active  AS author_is_active,
        users.is_admin   AS author_is_admin,
        users.created_at AS author_created_at
"#;

// ----------------- Helper Functions -----------------

pub async fn get_user_by_id(pool: &SqlitePool, id: i64) -> Result<Option<User>, RequestError> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
    let result = sqlx::query_as::<_, User>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(result)
}

async fn post_exists(conn: &mut SqliteConnection, post_id: i64) -> Result<bool, sqlx::Error> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM posts WHERE id = $1")
        .bind(post_id)
        .fetch_optional(conn)
        .await?;
    Ok(found.is_some())
}
