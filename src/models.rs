use chrono::NaiveDateTime;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub is_active: bool,
    pub is_admin: bool,
    pub created_at: NaiveDateTime,
    pub last_login: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub author_id: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
    pub view_count: i64,
    pub is_pinned: bool,
    pub author_username: String,
    pub author_email: String,
    pub author_is_active: bool,
    pub author_is_admin: bool,
    pub author_created_at: NaiveDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Comment {
    pub id: i64,
    pub content: String,
    pub post_id: i64,
    pub author_id: i64,
    pub parent_id: Option<i64>,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
    pub author_username: String,
    pub author_email: String,
    pub author_is_active: bool,
    pub author_is_admin: bool,
    pub author_created_at: NaiveDateTime,
}

/// A comment together with the replies grouped under it.
#[derive(Debug, Clone)]
pub struct CommentNode {
    pub comment: Comment,
    pub replies: Vec<CommentNode>,
}

/// The authenticated user performing a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: i64,
    pub is_admin: bool,
}

impl From<&User> for Actor {
    fn from(user: &User) -> Self {
        Actor {
            id: user.id,
            is_admin: user.is_admin,
        }
    }
}
