//! Minimal tyrion app: a token check chained in front of JSON handlers.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:8080/hello
//!   curl -H 'authorization: t0ken' http://localhost:8080/users
//!   curl -X POST -d 'name=alice' http://localhost:8080/users
//!   curl 'http://localhost:8080/search?q=rust'

use serde::Serialize;
use tracing_subscriber::EnvFilter;
use tyrion::{Context, Options, Server, StatusCode};

#[derive(Serialize)]
struct User<'a> {
    id: u32,
    name: &'a str,
}

#[tokio::main]
async fn main() -> Result<(), tyrion::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let opts = Options { ignore_path_last_slash: true, ..Options::default() };

    Server::new(opts)?
        .get("/hello", hello)
        .get("/users", (timing, require_token, list_users))
        .post("/users", create_user)
        .get("/search", search)
        .run()
        .await
}

fn hello(c: &mut Context) {
    c.string(StatusCode::OK, "hello");
}

// Wraps the rest of the chain.
fn timing(c: &mut Context) {
    let start = std::time::Instant::now();
    c.next();
    tracing::info!(path = c.path(), elapsed_us = start.elapsed().as_micros() as u64, "chain done");
}

fn require_token(c: &mut Context) {
    if c.get_header("authorization").is_none() {
        c.string(StatusCode::UNAUTHORIZED, "missing token");
        c.abort();
    }
}

fn list_users(c: &mut Context) {
    let users = [User { id: 1, name: "alice" }, User { id: 2, name: "bob" }];
    c.json(StatusCode::OK, &users);
}

fn create_user(c: &mut Context) {
    match c.post("name") {
        Some(name) => c.json(StatusCode::CREATED, &User { id: 99, name: &name }),
        None => c.string(StatusCode::BAD_REQUEST, "name is required"),
    }
}

fn search(c: &mut Context) {
    let q = c.get("q").unwrap_or_default();
    c.string(StatusCode::OK, format!("results for {q}"));
}
