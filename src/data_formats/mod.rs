mod request;
mod response;

pub use request::*;
pub use response::*;

use serde::{Deserialize, Serialize};

pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Deserialize, Serialize, Debug)]
pub struct PostQueryParams {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "get_default_post_limit")]
    pub limit: i64,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct CommentQueryParams {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "get_default_comment_limit")]
    pub limit: i64,
    /// Group the returned page into reply trees.
    #[serde(default)]
    pub threaded: bool,
}

fn get_default_post_limit() -> i64 {
    10
}

fn get_default_comment_limit() -> i64 {
    100
}

/// A window over an ordered listing, already clamped to sane bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: i64,
    pub limit: i64,
}

impl Page {
    pub fn clamped(skip: i64, limit: i64) -> Self {
        Page {
            offset: skip.max(0),
            limit: limit.clamp(1, MAX_PAGE_SIZE),
        }
    }
}

impl PostQueryParams {
    pub fn page(&self) -> Page {
        Page::clamped(self.skip, self.limit)
    }
}

impl CommentQueryParams {
    pub fn page(&self) -> Page {
        Page::clamped(self.skip, self.limit)
    }
}
