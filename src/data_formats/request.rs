use serde::{Deserialize, Serialize};
use validator::Validate;

// ----------------- User Request -----------------
#[derive(Deserialize, Serialize, Debug, Clone, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 50, message = "username must be 3 to 50 characters"))]
    pub username: String,
    #[validate(email(message = "email must be a valid address"))]
    pub email: String,
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub password: String,
}

/// OAuth2 password-flow form. `username` may also hold an email address.
#[derive(Deserialize, Serialize, Debug)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

// ----------------- Post Request -----------------
#[derive(Deserialize, Serialize, Debug, Validate)]
pub struct PostRequest {
    #[validate(length(min = 1, max = 100, message = "title must be 1 to 100 characters"))]
    pub title: String,
    #[validate(length(min = 1, message = "content must not be empty"))]
    pub content: String,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct PinRequest {
    pub pinned: bool,
}

// ----------------- Comment Request -----------------
#[derive(Deserialize, Serialize, Debug, Validate)]
pub struct CreateCommentRequest {
    #[validate(length(min = 1, message = "content must not be empty"))]
    pub content: String,
    #[serde(default)]
    pub parent_id: Option<i64>,
}

#[derive(Deserialize, Serialize, Debug, Validate)]
pub struct UpdateCommentRequest {
    #[validate(length(min = 1, message = "content must not be empty"))]
    pub content: String,
}
