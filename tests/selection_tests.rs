/// Selection tests
///
/// Tests for select/include/omit projections, nested relation shapes,
/// relation-level query arguments and `_count`.
/// Run with: cargo test --test selection_tests
use foliodb::query::FindManyArgs;
use foliodb::select::{CountSelection, RelationArgs, RelationSelection};
use foliodb::{
    Client, DbError, Filter, IncludeSpec, OrderBy, Payload, SelectSpec, Selection, Value, data,
};

async fn seed_portfolio() -> Client {
    let client = Client::connect("foliodb://localhost/portfolio").unwrap();

    let alice = client
        .user()
        .create(data! {
            "email" => "alice@dev.io",
            "password" => "pw",
            "name" => "Alice",
        })
        .await
        .unwrap();
    let alice_id = alice.value("id").unwrap().to_string();
    client
        .user()
        .create(data! { "email" => "bob@example.com", "password" => "pw", "name" => "Bob" })
        .await
        .unwrap();

    for (title, status, featured) in [
        ("Axum API", "published", true),
        ("Blog engine", "published", false),
        ("CLI toolkit", "draft", false),
    ] {
        client
            .project()
            .create(data! {
                "userId" => alice_id.clone(),
                "title" => title,
                "description" => "demo",
                "status" => status,
                "featured" => featured,
            })
            .await
            .unwrap();
    }
    client
        .skill()
        .create(data! {
            "userId" => alice_id.clone(),
            "name" => "Rust",
            "category" => "backend",
            "level" => 9,
        })
        .await
        .unwrap();

    let category = client
        .category()
        .create(data! { "slug" => "langs", "name" => "Languages" })
        .await
        .unwrap();
    client
        .technology()
        .create(data! {
            "categoryId" => category.value("id").unwrap().to_string(),
            "slug" => "rust",
            "name" => "Rust",
        })
        .await
        .unwrap();

    client
}

fn alice_args() -> FindManyArgs {
    FindManyArgs::new().filter(Filter::equals("email", "alice@dev.io"))
}

#[tokio::test]
async fn test_select_names_exact_fields() {
    let client = seed_portfolio().await;

    let rows = client
        .user()
        .find_many(
            FindManyArgs::new()
                .order_by(OrderBy::asc("email"))
                .selection(Selection::select(SelectSpec::fields(["email", "name"]))),
        )
        .await
        .unwrap();

    assert_eq!(rows.len(), 2);
    for row in &rows {
        assert_eq!(row.len(), 2);
        assert_eq!(row.field_names(), vec!["email", "name"]);
        assert!(row.value("id").is_none());
    }
    assert_eq!(rows[0].value("email").unwrap().as_str(), Some("alice@dev.io"));
}

#[tokio::test]
async fn test_select_with_nested_relation_shape() {
    let client = seed_portfolio().await;

    let spec = SelectSpec::fields(["title"]).relation(
        "user",
        RelationSelection::new().shape(Selection::select(SelectSpec::fields(["email"]))),
    );
    let rows = client
        .project()
        .find_many(
            FindManyArgs::new()
                .filter(Filter::equals("title", "Axum API"))
                .selection(Selection::select(spec)),
        )
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].field_names(), vec!["title", "user"]);
    let owner = rows[0].record("user").unwrap();
    assert_eq!(owner.field_names(), vec!["email"]);
    assert_eq!(owner.value("email").unwrap().as_str(), Some("alice@dev.io"));
}

#[tokio::test]
async fn test_include_to_one_relation() {
    let client = seed_portfolio().await;

    let tech = client
        .technology()
        .find_first(
            FindManyArgs::new().selection(Selection::include(
                IncludeSpec::new().relation("category", RelationSelection::new()),
            )),
        )
        .await
        .unwrap()
        .unwrap();

    // Scalars stay, the parent record rides along.
    assert_eq!(tech.value("slug").unwrap().as_str(), Some("rust"));
    let category = tech.record("category").unwrap();
    assert_eq!(category.value("name").unwrap().as_str(), Some("Languages"));
}

#[tokio::test]
async fn test_include_null_to_one_yields_null_payload() {
    let client = seed_portfolio().await;

    // The seeded category has no owner.
    let category = client
        .category()
        .find_first(
            FindManyArgs::new().selection(Selection::include(
                IncludeSpec::new().relation("user", RelationSelection::new()),
            )),
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(category.get("user"), Some(&Payload::Value(Value::Null)));
    assert!(category.record("user").is_none());
}

#[tokio::test]
async fn test_include_to_many_with_relation_args() {
    let client = seed_portfolio().await;

    let rel = RelationSelection::new()
        .args(
            RelationArgs::new()
                .filter(Filter::equals("status", "published"))
                .order_by(OrderBy::asc("title"))
                .take(2),
        )
        .shape(Selection::select(SelectSpec::fields(["title"])));
    let alice = client
        .user()
        .find_first(
            alice_args().selection(Selection::include(
                IncludeSpec::new().relation("projects", rel),
            )),
        )
        .await
        .unwrap()
        .unwrap();

    let projects = alice.list("projects").unwrap();
    assert_eq!(projects.len(), 2);
    assert_eq!(projects[0].value("title").unwrap().as_str(), Some("Axum API"));
    assert_eq!(
        projects[1].value("title").unwrap().as_str(),
        Some("Blog engine")
    );
    assert_eq!(projects[0].len(), 1);
}

#[tokio::test]
async fn test_count_selection_allows_filtered_duplicates() {
    let client = seed_portfolio().await;

    let spec = SelectSpec::fields(["email"]).count(
        CountSelection::new()
            .relation("projects")
            .relation_where("projects", Filter::equals("featured", true)),
    );
    let alice = client
        .user()
        .find_first(alice_args().selection(Selection::select(spec)))
        .await
        .unwrap()
        .unwrap();

    let counts = alice.record("_count").unwrap();
    assert_eq!(counts.field_names(), vec!["projects", "projects"]);
    assert_eq!(
        counts.entries()[0].1.as_value(),
        Some(&Value::Integer(3))
    );
    assert_eq!(counts.entries()[1].1.as_value(), Some(&Value::Integer(1)));
}

#[tokio::test]
async fn test_include_count_over_multiple_relations() {
    let client = seed_portfolio().await;

    let alice = client
        .user()
        .find_first(
            alice_args().selection(Selection::include(IncludeSpec::new().count(
                CountSelection::new().relation("projects").relation("skills"),
            ))),
        )
        .await
        .unwrap()
        .unwrap();

    assert!(alice.value("email").is_some());
    let counts = alice.record("_count").unwrap();
    assert_eq!(counts.value("projects"), Some(&Value::Integer(3)));
    assert_eq!(counts.value("skills"), Some(&Value::Integer(1)));
}

#[tokio::test]
async fn test_omit_drops_named_fields() {
    let client = seed_portfolio().await;

    let rows = client
        .user()
        .find_many(FindManyArgs::new().selection(Selection::omit(["password", "name"])))
        .await
        .unwrap();

    for row in &rows {
        assert!(row.value("password").is_none());
        assert!(row.value("name").is_none());
        assert!(row.value("email").is_some());
        assert!(row.value("id").is_some());
    }
}

#[tokio::test]
async fn test_selection_validation_errors() {
    let client = seed_portfolio().await;

    let err = client
        .user()
        .find_many(FindManyArgs::new().selection(Selection::select(
            SelectSpec::fields(["email"]).relation("ghosts", RelationSelection::new()),
        )))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DbError::UnknownRelation { entity, relation } if entity == "User" && relation == "ghosts"
    ));

    let err = client
        .user()
        .find_many(
            FindManyArgs::new()
                .selection(Selection::select(SelectSpec::fields(Vec::<String>::new()))),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Validation(msg) if msg.contains("at least one field")));

    // Query arguments only make sense on to-many relations.
    let err = client
        .project()
        .find_many(FindManyArgs::new().selection(Selection::select(
            SelectSpec::fields(["title"]).relation(
                "user",
                RelationSelection::new().args(RelationArgs::new().take(1)),
            ),
        )))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Validation(msg) if msg.contains("no query arguments")));

    let err = client
        .project()
        .find_many(
            FindManyArgs::new().selection(Selection::include(
                IncludeSpec::new().count(CountSelection::new().relation("user")),
            )),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Validation(msg) if msg.contains("to-many")));

    let err = client
        .label()
        .find_many(FindManyArgs::new().selection(Selection::omit([
            "id",
            "slug",
            "name",
            "description",
            "icon",
            "createdAt",
            "updatedAt",
        ])))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Validation(msg) if msg.contains("every field")));
}
