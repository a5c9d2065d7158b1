/// Transaction tests
///
/// Tests for interactive transactions (commit, rollback, timeouts,
/// writer contention) and all-or-nothing batches.
/// Run with: cargo test --test transaction_tests
use std::time::Duration;

use foliodb::{
    BatchOperation, Client, DbError, DeleteManyArgs, Filter, Sql, TransactionOptions, UniqueWhere,
    data,
};

fn client() -> Client {
    Client::connect("foliodb://localhost/portfolio").unwrap()
}

#[tokio::test]
async fn test_commit_publishes_atomically() {
    let client = client();
    let outside = client.clone();

    let total = client
        .transaction(|tx| {
            Box::pin(async move {
                tx.label()
                    .create(data! { "slug" => "rust", "name" => "Rust" })
                    .await?;
                tx.label()
                    .create(data! { "slug" => "serde", "name" => "Serde" })
                    .await?;
                // Uncommitted writes stay invisible to direct readers.
                assert_eq!(outside.label().count(None).await?, 0);
                tx.label().count(None).await
            })
        })
        .await
        .unwrap();

    assert_eq!(total, 2);
    assert_eq!(client.label().count(None).await.unwrap(), 2);
}

#[tokio::test]
async fn test_error_rolls_back_every_write() {
    let client = client();

    let result: foliodb::Result<()> = client
        .transaction(|tx| {
            Box::pin(async move {
                tx.label()
                    .create(data! { "slug" => "rust", "name" => "Rust" })
                    .await?;
                tx.label()
                    .create(data! { "slug" => "serde", "name" => "Serde" })
                    .await?;
                Err(DbError::Execution("boom".to_string()))
            })
        })
        .await;

    assert!(result.is_err());
    assert_eq!(client.label().count(None).await.unwrap(), 0);
}

#[tokio::test]
async fn test_transaction_timeout_discards_work() {
    let client = client();

    let options = TransactionOptions::new().timeout(Duration::from_millis(50));
    let result: foliodb::Result<()> = client
        .transaction_with(options, |tx| {
            Box::pin(async move {
                tx.label()
                    .create(data! { "slug" => "slow", "name" => "Slow" })
                    .await?;
                tokio::time::sleep(Duration::from_millis(300)).await;
                Ok(())
            })
        })
        .await;

    let err = result.unwrap_err();
    assert!(matches!(&err, DbError::Transaction(msg) if msg.contains("timed out")));
    assert_eq!(client.label().count(None).await.unwrap(), 0);
}

#[tokio::test]
async fn test_writer_contention_respects_max_wait() {
    let client = client();
    let holder = client.clone();

    let handle = tokio::spawn(async move {
        holder
            .transaction(|tx| {
                Box::pin(async move {
                    tx.label()
                        .create(data! { "slug" => "held", "name" => "Held" })
                        .await?;
                    tokio::time::sleep(Duration::from_millis(400)).await;
                    Ok(())
                })
            })
            .await
    });
    // Let the spawned transaction claim the writer slot.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let options = TransactionOptions::new().max_wait(Duration::from_millis(50));
    let blocked: foliodb::Result<()> = client
        .transaction_with(options, |_tx| Box::pin(async move { Ok(()) }))
        .await;
    let err = blocked.unwrap_err();
    assert!(matches!(&err, DbError::Transaction(msg) if msg.contains("timed out")));

    handle.await.unwrap().unwrap();
    assert_eq!(client.label().count(None).await.unwrap(), 1);
}

#[tokio::test]
async fn test_escaped_handle_is_refused() {
    let client = client();

    let escaped = client
        .transaction(|tx| Box::pin(async move { Ok(tx.clone()) }))
        .await;

    assert!(matches!(
        escaped,
        Err(DbError::Transaction(msg)) if msg.contains("escaped")
    ));
}

#[tokio::test]
async fn test_nested_transactions_rejected() {
    let client = client();

    let result: foliodb::Result<()> = client
        .transaction(|tx| {
            Box::pin(async move {
                tx.transaction(|_inner| Box::pin(async move { Ok(()) }))
                    .await
            })
        })
        .await;

    assert!(matches!(
        result,
        Err(DbError::Transaction(msg)) if msg.contains("nested")
    ));
}

#[tokio::test]
async fn test_batch_applies_in_order() {
    let client = client();

    let results = client
        .batch(vec![
            BatchOperation::Create {
                entity: "Label".to_string(),
                data: data! { "slug" => "rust", "name" => "Rust" },
            },
            BatchOperation::CreateMany {
                entity: "Label".to_string(),
                data: vec![
                    data! { "slug" => "serde", "name" => "Serde" },
                    data! { "slug" => "tokio", "name" => "Tokio" },
                ],
                skip_duplicates: false,
            },
            BatchOperation::Update {
                entity: "Label".to_string(),
                by: UniqueWhere::new("slug", "rust"),
                data: data! { "name" => "Rust Lang" },
            },
            BatchOperation::DeleteMany {
                entity: "Label".to_string(),
                args: DeleteManyArgs::new().filter(Filter::equals("slug", "tokio")),
            },
        ])
        .await
        .unwrap();

    assert_eq!(results.len(), 4);
    assert_eq!(
        results[0].as_record().unwrap().value("slug").unwrap().as_str(),
        Some("rust")
    );
    assert_eq!(results[1].as_count(), Some(2));
    assert_eq!(
        results[2].as_record().unwrap().value("name").unwrap().as_str(),
        Some("Rust Lang")
    );
    assert_eq!(results[3].as_count(), Some(1));
    assert_eq!(client.label().count(None).await.unwrap(), 2);
}

#[tokio::test]
async fn test_batch_rolls_back_midway() {
    let client = client();

    let err = client
        .batch(vec![
            BatchOperation::Create {
                entity: "Label".to_string(),
                data: data! { "slug" => "dup", "name" => "First" },
            },
            BatchOperation::Create {
                entity: "Label".to_string(),
                data: data! { "slug" => "dup", "name" => "Second" },
            },
        ])
        .await
        .unwrap_err();

    assert!(matches!(err, DbError::UniqueViolation { .. }));
    assert_eq!(client.label().count(None).await.unwrap(), 0);

    let err = client
        .batch(vec![BatchOperation::Delete {
            entity: "Ghost".to_string(),
            by: UniqueWhere::id("x"),
        }])
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::UnknownEntity(_)));
}

#[tokio::test]
async fn test_batch_rejected_inside_transaction() {
    let client = client();

    let result = client
        .transaction(|tx| Box::pin(async move { tx.batch(vec![]).await }))
        .await;

    assert!(matches!(
        result,
        Err(DbError::Transaction(msg)) if msg.contains("batch")
    ));
}

#[tokio::test]
async fn test_raw_sql_joins_the_transaction() {
    let client = client();

    client
        .transaction(|tx| {
            Box::pin(async move {
                tx.execute_raw(Sql::new(
                    "INSERT INTO Label (id, slug, name) VALUES ('l1', 'rust', 'Rust')",
                ))
                .await?;
                let seen = tx.query_raw(Sql::new("SELECT slug FROM Label")).await?;
                assert_eq!(seen.row_count(), 1);
                Ok(())
            })
        })
        .await
        .unwrap();

    assert_eq!(client.label().count(None).await.unwrap(), 1);
}
