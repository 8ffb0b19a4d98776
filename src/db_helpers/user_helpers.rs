use sqlx::{SqliteConnection, SqlitePool};

use crate::{
    authentication::{hash_password_argon2, verify_password_argon2},
    data_formats::RegisterRequest,
    errors::RequestError,
    models::{Post, User},
};

use super::{get_user_by_id, list_posts_by_author_in_db, USER_COLUMNS};

async fn find_user_by_identifier(
    conn: &mut SqliteConnection,
    identifier: &str,
) -> Result<Option<User>, sqlx::Error> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1 OR email = $1");
    sqlx::query_as::<_, User>(&query)
        .bind(identifier)
        .fetch_optional(conn)
        .await
}

pub async fn register_user_in_db(
    pool: &SqlitePool,
    RegisterRequest {
        username,
        email,
        password,
    }: RegisterRequest,
) -> Result<User, RequestError> {
    let password_hash = hash_password_argon2(password)
        .await
        .map_err(|_| RequestError::ServerError)?;

    let mut tx = pool.begin().await?;
    let taken = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM users WHERE username = $1 OR email = $2",
    )
    .bind(&username)
    .bind(&email)
    .fetch_one(&mut tx)
    .await?;
    if taken > 0 {
        return Err(RequestError::Conflict("Username or email already exists"));
    }

    let query = format!(
        r#"
        INSERT INTO users (username, email, password_hash)
        VALUES ($1, $2, $3)
        RETURNING {USER_COLUMNS}
        "#
    );
    let user = sqlx::query_as::<_, User>(&query)
        .bind(&username)
        .bind(&email)
        .bind(&password_hash)
        .fetch_one(&mut tx)
        .await
        .map_err(|e| {
            let e = RequestError::from(e);
            // Lost a race with a concurrent registration.
            if e.is_unique_violation() {
                RequestError::Conflict("Username or email already exists")
            } else {
                e
            }
        })?;
    tx.commit().await?;
    tracing::info!(user_id = user.id, username = %user.username, "registered user");
    Ok(user)
}

pub async fn authenticate_user_in_db(
    pool: &SqlitePool,
    identifier: &str,
    password: String,
) -> Result<User, RequestError> {
    let mut tx = pool.begin().await?;
    let user = find_user_by_identifier(&mut tx, identifier)
        .await?
        .ok_or(RequestError::NotAuthorized("Invalid credentials"))?;

    let is_password_correct = verify_password_argon2(password, &user.password_hash)
        .await
        .map_err(|_| RequestError::ServerError)?;
    if !is_password_correct {
        return Err(RequestError::NotAuthorized("Invalid credentials"));
    }
    if !user.is_active {
        return Err(RequestError::Forbidden("User account is disabled"));
    }

    let query = format!(
        "UPDATE users SET last_login = CURRENT_TIMESTAMP WHERE id = $1 RETURNING {USER_COLUMNS}"
    );
    let user = sqlx::query_as::<_, User>(&query)
        .bind(user.id)
        .fetch_one(&mut tx)
        .await?;
    tx.commit().await?;
    Ok(user)
}

async fn set_user_flag(
    pool: &SqlitePool,
    identifier: &str,
    column: &'static str,
    value: bool,
) -> Result<User, RequestError> {
    let mut tx = pool.begin().await?;
    let user = find_user_by_identifier(&mut tx, identifier)
        .await?
        .ok_or(RequestError::NotFound("User not found"))?;
    let query = format!("UPDATE users SET {column} = $1 WHERE id = $2 RETURNING {USER_COLUMNS}");
    let user = sqlx::query_as::<_, User>(&query)
        .bind(value)
        .bind(user.id)
        .fetch_one(&mut tx)
        .await?;
    tx.commit().await?;
    Ok(user)
}

pub async fn set_user_admin_in_db(
    pool: &SqlitePool,
    identifier: &str,
    is_admin: bool,
) -> Result<User, RequestError> {
    set_user_flag(pool, identifier, "is_admin", is_admin).await
}

pub async fn set_user_active_in_db(
    pool: &SqlitePool,
    identifier: &str,
    is_active: bool,
) -> Result<User, RequestError> {
    set_user_flag(pool, identifier, "is_active", is_active).await
}

pub async fn get_user_detail_in_db(
    pool: &SqlitePool,
    id: i64,
) -> Result<(User, Vec<Post>), RequestError> {
    let user = get_user_by_id(pool, id)
        .await?
        .ok_or(RequestError::NotFound("User not found"))?;
    let posts = list_posts_by_author_in_db(pool, user.id).await?;
    Ok((user, posts))
}
