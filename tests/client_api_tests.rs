/// Client API tests
///
/// Tests for the connection surface: datasource URLs, client options,
/// pool bounds and error rendering.
/// Run with: cargo test --test client_api_tests
use std::time::Duration;

use foliodb::query::FindUniqueArgs;
use foliodb::select::SelectSpec;
use foliodb::{
    Client, ClientOptions, DbError, ErrorFormat, IsolationLevel, LogLevel, Selection, UniqueWhere,
    data,
};

#[tokio::test]
async fn test_connect_from_url() {
    let client = Client::connect("foliodb://localhost/portfolio").unwrap();

    let stats = client.pool_stats();
    assert!(stats.total_connections >= 1);
    assert_eq!(stats.active_connections, 0);
    assert_eq!(client.options().database(), "portfolio");
}

#[tokio::test]
async fn test_connect_with_options_preopens_min_connections() {
    let options = ClientOptions::new().max_connections(5).min_connections(2);
    let client = Client::connect_with_options(options).unwrap();

    let stats = client.pool_stats();
    assert_eq!(stats.total_connections, 2); // min_connections
    assert_eq!(stats.max_connections, 5);
}

#[tokio::test]
async fn test_url_options_shape_the_client() {
    let client = Client::connect(
        "foliodb://localhost/resume?max_connections=5&log=query,error&isolation=Serializable",
    )
    .unwrap();

    let options = client.options();
    assert_eq!(options.database(), "resume");
    assert_eq!(options.max_connections, 5);
    assert!(options.logs(LogLevel::Query));
    assert!(!options.logs(LogLevel::Warn));
    assert_eq!(
        options.transaction.isolation_level,
        IsolationLevel::Serializable
    );
}

#[tokio::test]
async fn test_bad_urls_are_rejected() {
    assert!(Client::connect("postgres://localhost/portfolio").is_err());
    assert!(Client::connect("foliodb://localhost").is_err());
    assert!(Client::connect("foliodb://localhost/db?bogus=1").is_err());

    let err = Client::connect("foliodb://localhost/db?max_connections=lots").unwrap_err();
    assert!(matches!(err, DbError::Initialization(_)));
}

#[tokio::test]
async fn test_invalid_pool_bounds_fail_at_connect() {
    let options = ClientOptions::new().max_connections(0);
    assert!(Client::connect_with_options(options).is_err());

    let options = ClientOptions::new().min_connections(8).max_connections(4);
    assert!(Client::connect_with_options(options).is_err());
}

#[tokio::test]
async fn test_pool_returns_connections_after_operations() {
    let options = ClientOptions::new()
        .max_connections(2)
        .acquire_timeout(Duration::from_millis(200));
    let client = Client::connect_with_options(options).unwrap();

    for i in 0..10 {
        client
            .label()
            .create(data! { "slug" => format!("l{i}"), "name" => "Label" })
            .await
            .unwrap();
    }

    // Every guard went back; nothing is still checked out.
    let stats = client.pool_stats();
    assert_eq!(stats.active_connections, 0);
    assert!(stats.total_connections <= 2);
    assert_eq!(client.label().count(None).await.unwrap(), 10);
}

#[tokio::test]
async fn test_entity_lookup_by_name() {
    let client = Client::connect("foliodb://localhost/portfolio").unwrap();

    assert_eq!(client.entity("TimeLine").unwrap().entity_name(), "TimeLine");
    let err = client.entity("Ghost").unwrap_err();
    assert!(matches!(err, DbError::UnknownEntity(name) if name == "Ghost"));
}

#[tokio::test]
async fn test_global_omit_applies_to_every_default_projection() {
    let options = ClientOptions::new().omit("User", ["password"]);
    let client = Client::connect_with_options(options).unwrap();

    let created = client
        .user()
        .create(data! { "email" => "ada@example.com", "password" => "hunter2" })
        .await
        .unwrap();
    assert!(created.value("password").is_none());
    assert!(created.value("email").is_some());

    let found = client
        .user()
        .find_unique(UniqueWhere::new("email", "ada@example.com"))
        .await
        .unwrap()
        .unwrap();
    assert!(found.value("password").is_none());

    // An explicit select wins over the global omit.
    let selected = client
        .user()
        .find_unique(
            FindUniqueArgs::new(UniqueWhere::new("email", "ada@example.com"))
                .selection(Selection::select(SelectSpec::fields(["email", "password"]))),
        )
        .await
        .unwrap()
        .unwrap();
    assert!(selected.value("password").is_some());
}

#[tokio::test]
async fn test_format_error_honors_configured_format() {
    let err = DbError::UnknownEntity("Ghost".to_string());

    let minimal =
        Client::connect_with_options(ClientOptions::new().error_format(ErrorFormat::Minimal))
            .unwrap();
    assert_eq!(
        minimal.format_error(&err),
        "Entity 'Ghost' is not part of the schema"
    );

    let colorless =
        Client::connect_with_options(ClientOptions::new().error_format(ErrorFormat::Colorless))
            .unwrap();
    assert!(
        colorless
            .format_error(&err)
            .starts_with("ValidationError: ")
    );

    let pretty =
        Client::connect_with_options(ClientOptions::new().error_format(ErrorFormat::Pretty))
            .unwrap();
    assert!(pretty.format_error(&err).contains("\x1b[1;31m"));
}

#[tokio::test]
async fn test_separate_clients_have_separate_stores() {
    let first = Client::connect("foliodb://localhost/portfolio").unwrap();
    let second = Client::connect("foliodb://localhost/portfolio").unwrap();

    first
        .label()
        .create(data! { "slug" => "rust", "name" => "Rust" })
        .await
        .unwrap();

    assert_eq!(first.label().count(None).await.unwrap(), 1);
    assert_eq!(second.label().count(None).await.unwrap(), 0);
}
