use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::models::{Comment, CommentNode, Post, User};

/// Author representation embedded in posts and comments. Never carries posts.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub is_active: bool,
    pub is_admin: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct UserDetail {
    #[serde(flatten)]
    pub user: UserSummary,
    pub last_login: Option<NaiveDateTime>,
    pub posts: Vec<PostResponse>,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct PostResponse {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub author_id: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
    pub view_count: i64,
    pub is_pinned: bool,
    pub author: UserSummary,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct CommentResponse {
    pub id: i64,
    pub content: String,
    pub post_id: i64,
    pub author_id: i64,
    pub parent_id: Option<i64>,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
    pub author: UserSummary,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct CommentThreadResponse {
    #[serde(flatten)]
    pub comment: CommentResponse,
    pub replies: Vec<CommentThreadResponse>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        UserSummary {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            is_active: user.is_active,
            is_admin: user.is_admin,
            created_at: user.created_at,
        }
    }
}

impl UserDetail {
    pub fn new(user: &User, posts: Vec<Post>) -> Self {
        UserDetail {
            user: UserSummary::from(user),
            last_login: user.last_login,
            posts: posts.into_iter().map(PostResponse::from).collect(),
        }
    }
}

impl TokenResponse {
    pub fn bearer(access_token: String) -> Self {
        TokenResponse {
            access_token,
            token_type: "bearer".to_owned(),
        }
    }
}

impl From<Post> for PostResponse {
    fn from(
        Post {
            id,
            title,
            content,
            author_id,
            created_at,
            updated_at,
            view_count,
            is_pinned,
            author_username,
            author_email,
            author_is_active,
            author_is_admin,
            author_created_at,
        }: Post,
    ) -> Self {
        PostResponse {
            id,
            title,
            content,
            author_id,
            created_at,
            updated_at,
            view_count,
            is_pinned,
            author: UserSummary {
                id: author_id,
                username: author_username,
                email: author_email,
                is_active: author_is_active,
                is_admin: author_is_admin,
                created_at: author_created_at,
            },
        }
    }
}

impl From<Comment> for CommentResponse {
    fn from(
        Comment {
            id,
            content,
            post_id,
            author_id,
            parent_id,
            created_at,
            updated_at,
            author_username,
            author_email,
            author_is_active,
            author_is_admin,
            author_created_at,
        }: Comment,
    ) -> Self {
        CommentResponse {
            id,
            content,
            post_id,
            author_id,
            parent_id,
            created_at,
            updated_at,
            author: UserSummary {
                id: author_id,
                username: author_username,
                email: author_email,
                is_active: author_is_active,
                is_admin: author_is_admin,
                created_at: author_created_at,
            },
        }
    }
}

impl From<CommentNode> for CommentThreadResponse {
    fn from(CommentNode { comment, replies }: CommentNode) -> Self {
        CommentThreadResponse {
            comment: CommentResponse::from(comment),
            replies: replies.into_iter().map(Self::from).collect(),
        }
    }
}
