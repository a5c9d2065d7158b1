/// Pagination tests
///
/// Tests for ordering, cursor positioning, take/skip windows and
/// distinct, the deterministic slicing behind findMany.
/// Run with: cargo test --test pagination_tests
use foliodb::query::FindManyArgs;
use foliodb::{Client, DbError, Filter, OrderBy, Record, UniqueWhere, data};

async fn seed_labels() -> Client {
    let client = Client::connect("foliodb://localhost/portfolio").unwrap();
    for slug in ["a", "b", "c", "d"] {
        client
            .label()
            .create(data! { "slug" => slug, "name" => slug.to_uppercase() })
            .await
            .unwrap();
    }
    client
}

async fn seed_skills() -> Client {
    let client = Client::connect("foliodb://localhost/portfolio").unwrap();
    let user = client
        .user()
        .create(data! { "email" => "dev@example.com", "password" => "pw" })
        .await
        .unwrap();
    let user_id = user.value("id").unwrap().to_string();
    for (name, category, level) in [
        ("Rust", "backend", 9),
        ("Axum", "backend", 7),
        ("React", "frontend", 6),
        ("Vue", "frontend", 8),
        ("Figma", "tools", 4),
    ] {
        client
            .skill()
            .create(data! {
                "userId" => user_id.clone(),
                "name" => name,
                "category" => category,
                "level" => level,
            })
            .await
            .unwrap();
    }
    client
}

fn slugs(rows: &[Record]) -> Vec<&str> {
    rows.iter()
        .map(|r| r.value("slug").unwrap().as_str().unwrap())
        .collect()
}

fn names(rows: &[Record]) -> Vec<&str> {
    rows.iter()
        .map(|r| r.value("name").unwrap().as_str().unwrap())
        .collect()
}

#[tokio::test]
async fn test_multi_key_ordering() {
    let client = seed_skills().await;

    let rows = client
        .skill()
        .find_many(
            FindManyArgs::new()
                .order_by(OrderBy::asc("category"))
                .order_by(OrderBy::desc("level")),
        )
        .await
        .unwrap();

    assert_eq!(names(&rows), vec!["Rust", "Axum", "Vue", "React", "Figma"]);
}

#[tokio::test]
async fn test_take_and_skip_windows_are_stable() {
    let client = seed_labels().await;
    let window = FindManyArgs::new()
        .order_by(OrderBy::asc("slug"))
        .skip(1)
        .take(2);

    let first = client.label().find_many(window.clone()).await.unwrap();
    let second = client.label().find_many(window).await.unwrap();

    assert_eq!(slugs(&first), vec!["b", "c"]);
    assert_eq!(slugs(&first), slugs(&second));
}

#[tokio::test]
async fn test_cursor_is_inclusive() {
    let client = seed_labels().await;

    let rows = client
        .label()
        .find_many(
            FindManyArgs::new()
                .order_by(OrderBy::asc("slug"))
                .cursor(UniqueWhere::new("slug", "b"))
                .take(2),
        )
        .await
        .unwrap();

    // The row the cursor names is part of the page.
    assert_eq!(slugs(&rows), vec!["b", "c"]);
}

#[tokio::test]
async fn test_missing_cursor_yields_no_rows() {
    let client = seed_labels().await;

    let rows = client
        .label()
        .find_many(
            FindManyArgs::new()
                .order_by(OrderBy::asc("slug"))
                .cursor(UniqueWhere::new("slug", "zz")),
        )
        .await
        .unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn test_negative_take_returns_tail() {
    let client = seed_labels().await;

    let rows = client
        .label()
        .find_many(FindManyArgs::new().order_by(OrderBy::asc("slug")).take(-2))
        .await
        .unwrap();

    // Order within the tail is preserved.
    assert_eq!(slugs(&rows), vec!["c", "d"]);
}

#[tokio::test]
async fn test_distinct_keeps_first_row_per_key() {
    let client = seed_skills().await;

    let rows = client
        .skill()
        .find_many(
            FindManyArgs::new()
                .order_by(OrderBy::desc("level"))
                .distinct(["category"]),
        )
        .await
        .unwrap();

    // Highest level per category survives because distinct runs after
    // the sort.
    assert_eq!(names(&rows), vec!["Rust", "Vue", "Figma"]);
}

#[tokio::test]
async fn test_window_edges() {
    let client = seed_labels().await;

    let rows = client
        .label()
        .find_many(FindManyArgs::new().order_by(OrderBy::asc("slug")).skip(10))
        .await
        .unwrap();
    assert!(rows.is_empty());

    let rows = client
        .label()
        .find_many(FindManyArgs::new().take(0))
        .await
        .unwrap();
    assert!(rows.is_empty());

    let rows = client
        .label()
        .find_many(
            FindManyArgs::new()
                .filter(Filter::not_equals("slug", "a"))
                .order_by(OrderBy::desc("slug"))
                .skip(1)
                .take(1),
        )
        .await
        .unwrap();
    assert_eq!(slugs(&rows), vec!["c"]);
}

#[tokio::test]
async fn test_cursor_requires_unique_field() {
    let client = seed_skills().await;

    let err = client
        .skill()
        .find_many(
            FindManyArgs::new()
                .order_by(OrderBy::asc("name"))
                .cursor(UniqueWhere::new("name", "Rust")),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Validation(msg) if msg.contains("is not unique")));
}
