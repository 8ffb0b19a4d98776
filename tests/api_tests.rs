use std::time::Duration;

use forum::{get_random_free_port, init_db, serve, set_user_active_in_db, set_user_admin_in_db, Config};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use sqlx::SqlitePool;

struct TestApp {
    address: String,
    pool: SqlitePool,
    client: Client,
}

async fn spawn_app() -> TestApp {
    let db_path = std::env::temp_dir().join(format!("forum-test-{}.db", rand::random::<u64>()));
    let config = Config {
        database_url: format!("sqlite://{}?mode=rwc", db_path.display()),
        jwt_secret: "test-secret".to_owned(),
        token_lifetime: time::Duration::minutes(30),
        bind_address: "127.0.0.1:0".parse().unwrap(),
        pool_size: 5,
        pool_recycle: Duration::from_secs(1800),
        cors_origins: vec!["http://localhost:5173".to_owned()],
    };
    let pool = init_db(&config).await.expect("Failed to set up database");
    let (port, listener) = get_random_free_port().unwrap();
    let server_pool = pool.clone();
    tokio::spawn(async move { serve(listener, server_pool, &config).await });

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        pool,
        client: Client::new(),
    }
}

impl TestApp {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    async fn register(&self, username: &str, email: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.url("/register"))
            .json(&json!({ "username": username, "email": email, "password": password }))
            .send()
            .await
            .unwrap()
    }

    async fn login(&self, identifier: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.url("/login"))
            .form(&[("username", identifier), ("password", password)])
            .send()
            .await
            .unwrap()
    }

    /// Registers the account and returns a bearer token for it.
    async fn user_token(&self, username: &str) -> String {
        let email = format!("{username}@x.com");
        let response = self.register(username, &email, "password123").await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body: Value = self.login(username, "password123").await.json().await.unwrap();
        body["access_token"].as_str().unwrap().to_owned()
    }

    async fn admin_token(&self, username: &str) -> String {
        let token = self.user_token(username).await;
        set_user_admin_in_db(&self.pool, username, true).await.unwrap();
        token
    }

    async fn create_post(&self, token: &str, title: &str) -> Value {
        let response = self
            .client
            .post(self.url("/posts/"))
            .bearer_auth(token)
            .json(&json!({ "title": title, "content": "some content" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        response.json().await.unwrap()
    }

    async fn create_comment(
        &self,
        token: &str,
        post_id: i64,
        parent_id: Option<i64>,
    ) -> reqwest::Response {
        self.client
            .post(self.url(&format!("/posts/{post_id}/comments")))
            .bearer_auth(token)
            .json(&json!({ "content": "a comment", "parent_id": parent_id }))
            .send()
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn registration_and_login() {
    let app = spawn_app().await;

    let response = app.register("alice", "alice@x.com", "password123").await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["username"], "alice");
    assert_eq!(body["is_active"], true);
    assert_eq!(body["is_admin"], false);
    assert!(body.get("password_hash").is_none());

    let response = app.register("alice", "other@x.com", "password123").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let response = app.register("alice2", "alice@x.com", "password123").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app.login("alice", "password123").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["token_type"], "bearer");
    assert!(body["access_token"].as_str().unwrap().len() > 10);

    let response = app.login("alice@x.com", "password123").await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.login("alice", "wrong").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()["www-authenticate"], "Bearer");

    let response = app.login("nobody", "password123").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn invalid_registration_is_rejected() {
    let app = spawn_app().await;
    let response = app.register("al", "alice@x.com", "password123").await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let response = app.register("alice", "not-an-email", "password123").await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let response = app.register("alice", "alice@x.com", "short").await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn inactive_accounts_are_forbidden() {
    let app = spawn_app().await;
    let token = app.user_token("carol").await;
    set_user_active_in_db(&app.pool, "carol", false).await.unwrap();

    let response = app.login("carol", "password123").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    // A wrong password stays a plain 401 even for a disabled account.
    let response = app.login("carol", "wrong-password").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .client
        .post(app.url("/posts/"))
        .bearer_auth(&token)
        .json(&json!({ "title": "hi", "content": "there" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn bad_tokens_are_unauthorized() {
    let app = spawn_app().await;
    let post = json!({ "title": "hi", "content": "there" });

    let response = app
        .client
        .post(app.url("/posts/"))
        .json(&post)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .client
        .post(app.url("/posts/"))
        .bearer_auth("garbage")
        .json(&post)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.client.get(app.url("/user")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn only_owner_or_admin_can_change_a_post() {
    let app = spawn_app().await;
    let alice = app.user_token("alice").await;
    let bob = app.user_token("bob").await;
    let admin = app.admin_token("dave").await;
    let post = app.create_post(&alice, "P1").await;
    let id = post["id"].as_i64().unwrap();
    assert_eq!(post["author"]["username"], "alice");
    assert_eq!(post["view_count"], 0);
    assert_eq!(post["is_pinned"], false);

    let update = json!({ "title": "edited", "content": "edited content" });
    let response = app
        .client
        .put(app.url(&format!("/posts/{id}")))
        .bearer_auth(&bob)
        .json(&update)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .client
        .put(app.url(&format!("/posts/{id}")))
        .bearer_auth(&admin)
        .json(&update)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["title"], "edited");
    assert_eq!(body["author"]["username"], "alice");
    assert!(!body["updated_at"].is_null());

    let response = app
        .client
        .put(app.url("/posts/9999"))
        .bearer_auth(&bob)
        .json(&update)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .client
        .delete(app.url(&format!("/posts/{id}")))
        .bearer_auth(&bob)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .client
        .delete(app.url(&format!("/posts/{id}")))
        .bearer_auth(&alice)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .client
        .get(app.url(&format!("/posts/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn reading_a_post_counts_a_view() {
    let app = spawn_app().await;
    let alice = app.user_token("alice").await;
    let id = app.create_post(&alice, "popular").await["id"].as_i64().unwrap();

    for expected in 1..=3 {
        let body: Value = app
            .client
            .get(app.url(&format!("/posts/{id}")))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["view_count"], expected);
    }
}

#[tokio::test]
async fn listing_clamps_paging_and_puts_pinned_first() {
    let app = spawn_app().await;
    let alice = app.user_token("alice").await;
    let admin = app.admin_token("dave").await;
    let mut ids = Vec::new();
    for title in ["one", "two", "three"] {
        ids.push(app.create_post(&alice, title).await["id"].as_i64().unwrap());
    }

    let posts: Vec<Value> = app
        .client
        .get(app.url("/posts/?skip=-5&limit=500"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let listed: Vec<i64> = posts.iter().map(|p| p["id"].as_i64().unwrap()).collect();
    assert_eq!(listed, ids);

    let posts: Vec<Value> = app
        .client
        .get(app.url("/posts?limit=0"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(posts.len(), 1);

    let response = app
        .client
        .put(app.url(&format!("/posts/{}/pin", ids[2])))
        .bearer_auth(&alice)
        .json(&json!({ "pinned": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .client
        .put(app.url(&format!("/posts/{}/pin", ids[2])))
        .bearer_auth(&admin)
        .json(&json!({ "pinned": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let posts: Vec<Value> = app
        .client
        .get(app.url("/posts/"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let listed: Vec<i64> = posts.iter().map(|p| p["id"].as_i64().unwrap()).collect();
    assert_eq!(listed, vec![ids[2], ids[0], ids[1]]);
    assert_eq!(posts[0]["is_pinned"], true);
}

#[tokio::test]
async fn replies_must_stay_within_their_post() {
    let app = spawn_app().await;
    let alice = app.user_token("alice").await;
    let bob = app.user_token("bob").await;
    let first = app.create_post(&alice, "first").await["id"].as_i64().unwrap();
    let second = app.create_post(&alice, "second").await["id"].as_i64().unwrap();

    let response = app.create_comment(&bob, first, None).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let parent: Value = response.json().await.unwrap();
    let parent_id = parent["id"].as_i64().unwrap();
    assert_eq!(parent["author"]["username"], "bob");
    assert!(parent["parent_id"].is_null());

    let response = app.create_comment(&alice, first, Some(parent_id)).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let reply: Value = response.json().await.unwrap();
    assert_eq!(reply["parent_id"], parent_id);

    let response = app.create_comment(&alice, second, Some(parent_id)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let response = app.create_comment(&alice, first, Some(9999)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let response = app.create_comment(&alice, 9999, None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let comments: Vec<Value> = app
        .client
        .get(app.url(&format!("/posts/{first}/comments")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(comments.len(), 2);

    let threads: Vec<Value> = app
        .client
        .get(app.url(&format!("/posts/{first}/comments?threaded=true")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(threads.len(), 1);
    assert_eq!(threads[0]["replies"][0]["id"], reply["id"]);

    let thread: Value = app
        .client
        .get(app.url(&format!("/comments/{parent_id}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(thread["id"], parent_id);
    assert_eq!(thread["replies"].as_array().unwrap().len(), 1);

    let response = app
        .client
        .get(app.url("/posts/9999/comments"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn replies_nest_only_one_level() {
    let app = spawn_app().await;
    let alice = app.user_token("alice").await;
    let post = app.create_post(&alice, "post").await;
    let author_id = post["author"]["id"].as_i64().unwrap();
    let post = post["id"].as_i64().unwrap();
    let root: Value = app.create_comment(&alice, post, None).await.json().await.unwrap();
    let root_id = root["id"].as_i64().unwrap();
    let response = app.create_comment(&alice, post, Some(root_id)).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let reply: Value = response.json().await.unwrap();
    let reply_id = reply["id"].as_i64().unwrap();

    let response = app.create_comment(&alice, post, Some(reply_id)).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    // The schema refuses the same shape when the API is bypassed.
    let inserted = sqlx::query(
        "INSERT INTO comments (content, post_id, author_id, parent_id) VALUES ('deep', $1, $2, $3)",
    )
    .bind(post)
    .bind(author_id)
    .bind(reply_id)
    .execute(&app.pool)
    .await;
    assert!(inserted.is_err());
    let reparented = sqlx::query("UPDATE comments SET parent_id = $1 WHERE id = $2")
        .bind(reply_id)
        .bind(root_id)
        .execute(&app.pool)
        .await;
    assert!(reparented.is_err());

    let thread: Value = app
        .client
        .get(app.url(&format!("/comments/{root_id}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let replies = thread["replies"].as_array().unwrap();
    assert_eq!(replies.len(), 1);
    assert!(replies[0]["replies"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn missing_and_forbidden_win_over_invalid_bodies() {
    let app = spawn_app().await;
    let alice = app.user_token("alice").await;
    let bob = app.user_token("bob").await;
    let post = app.create_post(&alice, "post").await["id"].as_i64().unwrap();
    let comment: Value = app.create_comment(&alice, post, None).await.json().await.unwrap();
    let comment_id = comment["id"].as_i64().unwrap();
    let empty_post = json!({ "title": "", "content": "" });
    let empty_comment = json!({ "content": "" });

    let response = app
        .client
        .put(app.url("/posts/9999"))
        .bearer_auth(&alice)
        .json(&empty_post)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .client
        .put(app.url(&format!("/posts/{post}")))
        .bearer_auth(&bob)
        .json(&empty_post)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .client
        .put(app.url(&format!("/posts/{post}")))
        .bearer_auth(&alice)
        .json(&empty_post)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app
        .client
        .post(app.url("/posts/9999/comments"))
        .bearer_auth(&alice)
        .json(&empty_comment)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .client
        .put(app.url(&format!("/comments/{comment_id}")))
        .bearer_auth(&bob)
        .json(&empty_comment)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .client
        .put(app.url(&format!("/comments/{comment_id}")))
        .bearer_auth(&alice)
        .json(&empty_comment)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn comment_mutation_follows_ownership() {
    let app = spawn_app().await;
    let alice = app.user_token("alice").await;
    let bob = app.user_token("bob").await;
    let admin = app.admin_token("dave").await;
    let post = app.create_post(&alice, "post").await["id"].as_i64().unwrap();
    let comment: Value = app.create_comment(&bob, post, None).await.json().await.unwrap();
    let id = comment["id"].as_i64().unwrap();

    let edit = json!({ "content": "edited" });
    let response = app
        .client
        .put(app.url(&format!("/comments/{id}")))
        .bearer_auth(&alice)
        .json(&edit)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .client
        .put(app.url(&format!("/comments/{id}")))
        .bearer_auth(&bob)
        .json(&edit)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["content"], "edited");

    let response = app
        .client
        .delete(app.url(&format!("/comments/{id}")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .client
        .get(app.url(&format!("/comments/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleting_a_comment_removes_its_replies() {
    let app = spawn_app().await;
    let alice = app.user_token("alice").await;
    let post = app.create_post(&alice, "post").await["id"].as_i64().unwrap();
    let root: Value = app.create_comment(&alice, post, None).await.json().await.unwrap();
    let root_id = root["id"].as_i64().unwrap();
    let reply: Value = app
        .create_comment(&alice, post, Some(root_id))
        .await
        .json()
        .await
        .unwrap();
    let reply_id = reply["id"].as_i64().unwrap();
    let second_reply: Value = app
        .create_comment(&alice, post, Some(root_id))
        .await
        .json()
        .await
        .unwrap();
    let sibling: Value = app.create_comment(&alice, post, None).await.json().await.unwrap();

    let response = app
        .client
        .delete(app.url(&format!("/comments/{root_id}")))
        .bearer_auth(&alice)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    for gone in [reply_id, second_reply["id"].as_i64().unwrap()] {
        let response = app
            .client
            .get(app.url(&format!("/comments/{gone}")))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
    let response = app
        .client
        .get(app.url(&format!("/comments/{}", sibling["id"])))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn deleting_a_post_removes_its_comments() {
    let app = spawn_app().await;
    let alice = app.user_token("alice").await;
    let bob = app.user_token("bob").await;
    let post = app.create_post(&alice, "doomed").await["id"].as_i64().unwrap();
    let comment: Value = app.create_comment(&bob, post, None).await.json().await.unwrap();
    app.create_comment(&alice, post, comment["id"].as_i64()).await;

    let response = app
        .client
        .delete(app.url(&format!("/posts/{post}")))
        .bearer_auth(&alice)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE post_id = $1")
        .bind(post)
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(remaining, 0);

    let response = app
        .client
        .get(app.url(&format!("/posts/{post}/comments")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn user_detail_lists_posts_without_recursion() {
    let app = spawn_app().await;
    let alice = app.user_token("alice").await;
    app.create_post(&alice, "mine").await;

    let me: Value = app
        .client
        .get(app.url("/user"))
        .bearer_auth(&alice)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(me["username"], "alice");
    assert!(!me["last_login"].is_null());
    assert_eq!(me["posts"][0]["title"], "mine");
    assert!(me["posts"][0]["author"].get("posts").is_none());

    let id = me["id"].as_i64().unwrap();
    let response = app
        .client
        .get(app.url(&format!("/users/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.client.get(app.url("/users/9999")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_routes_are_not_found() {
    let app = spawn_app().await;
    let response = app.client.get(app.url("/nope")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body: Value = app
        .client
        .get(app.url("/"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["message"], "Forum API");
}
