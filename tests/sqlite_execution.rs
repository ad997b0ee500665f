use queriums::gate::{PolicyDecision, QueryGate, RawModelOutput};
use queriums::ingest::{import_csv_file, import_csv_str};
use queriums::{Database, ExplorerError, FinalStatement, QueryExecutor, SchemaDescriptor};
use std::time::{Duration, Instant};
use tempfile::TempDir;

const ORDERS_CSV: &str = "id,customer,amount,paid\n\
1,alice,10.5,true\n\
2,bob,20,false\n\
3,\"carol, jr\",7.25,true\n\
4,dave,,false\n";

async fn orders_db(dir: &TempDir) -> Database {
    let db = Database::create(dir.path().join("shop.db")).unwrap();
    import_csv_str(&db, "orders", ORDERS_CSV.to_string()).await.unwrap();
    db
}

fn accept(sql: &str) -> FinalStatement {
    match QueryGate::default().check(&RawModelOutput::from(sql), None).decision {
        PolicyDecision::Accept(stmt) => stmt,
        PolicyDecision::Reject(rejection) => panic!("rejected: {}", rejection),
    }
}

#[tokio::test]
async fn test_accepted_select_runs() {
    let dir = tempfile::tempdir().unwrap();
    let db = orders_db(&dir).await;

    let rs = db
        .run(&accept("SELECT id, customer, amount FROM orders WHERE paid = 1 ORDER BY id"))
        .await
        .unwrap();
    assert_eq!(rs.columns, vec!["id", "customer", "amount"]);
    assert_eq!(rs.row_count(), 2);
    assert_eq!(rs.get(1, "customer"), Some(&serde_json::json!("carol, jr")));
    assert_eq!(rs.get(0, "amount"), Some(&serde_json::json!(10.5)));
    assert!(!rs.truncated);
}

#[tokio::test]
async fn test_empty_cells_become_null() {
    let dir = tempfile::tempdir().unwrap();
    let db = orders_db(&dir).await;

    let rs = db.run(&accept("SELECT amount FROM orders WHERE id = 4")).await.unwrap();
    assert_eq!(rs.get(0, "amount"), Some(&serde_json::Value::Null));
}

#[tokio::test]
async fn test_missing_table_is_an_execution_error() {
    let dir = tempfile::tempdir().unwrap();
    let db = orders_db(&dir).await;

    let err = db.run(&accept("SELECT * FROM refunds")).await.unwrap_err();
    assert!(!err.is_blocked());
    match err {
        ExplorerError::Execution(message) => assert!(message.contains("no such table")),
        other => panic!("expected an execution error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_row_cap_marks_truncation() {
    let dir = tempfile::tempdir().unwrap();
    let db = orders_db(&dir).await.with_max_rows(3);

    let rs = db.run(&accept("SELECT id FROM orders ORDER BY id")).await.unwrap();
    assert_eq!(rs.row_count(), 3);
    assert!(rs.truncated);
}

async fn numbers_db(dir: &TempDir, count: usize) -> Database {
    let db = Database::create(dir.path().join("numbers.db")).unwrap();
    let mut csv = String::from("n\n");
    for i in 0..count {
        csv.push_str(&format!("{}\n", i));
    }
    import_csv_str(&db, "numbers", csv).await.unwrap();
    db
}

#[tokio::test]
async fn test_long_query_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let db = numbers_db(&dir, 2000)
        .await
        .with_timeout(Duration::from_millis(200));
    let err = db
        .run(&accept("SELECT COUNT(*) FROM numbers a, numbers b, numbers c"))
        .await
        .unwrap_err();
    assert!(matches!(err, ExplorerError::Timeout(_)));
    assert!(err.to_string().starts_with("query failed"));
}

#[tokio::test]
async fn test_csv_export_of_results() {
    let dir = tempfile::tempdir().unwrap();
    let db = orders_db(&dir).await;

    let rs = db
        .run(&accept("SELECT id, customer FROM orders WHERE id IN (2, 3) ORDER BY id"))
        .await
        .unwrap();
    assert_eq!(rs.to_csv().unwrap(), "id,customer\r\n2,bob\r\n3,\"carol, jr\"\r\n");
}

#[tokio::test]
async fn test_import_file_and_introspect() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("orders.csv");
    std::fs::write(&csv_path, ORDERS_CSV).unwrap();
    let db = Database::create(dir.path().join("shop.db")).unwrap();

    let summary = import_csv_file(&db, "orders", &csv_path).await.unwrap();
    assert_eq!(summary.rows, 4);

    let schema = SchemaDescriptor::introspect(&db).await.unwrap();
    assert_eq!(
        schema.to_prompt_text(),
        "orders: id (INTEGER), customer (TEXT), amount (REAL), paid (BOOLEAN)"
    );

    // importing again replaces the table
    import_csv_str(&db, "orders", "id\n1\n".to_string()).await.unwrap();
    let rs = db.run(&accept("SELECT COUNT(*) AS n FROM orders")).await.unwrap();
    assert_eq!(rs.get(0, "n"), Some(&serde_json::json!(1)));
}

#[tokio::test]
async fn test_short_query_not_blocked_by_long_one() {
    let dir = tempfile::tempdir().unwrap();
    let db = numbers_db(&dir, 2000)
        .await
        .with_timeout(Duration::from_secs(3));

    let long = accept("SELECT COUNT(*) FROM numbers a, numbers b, numbers c");
    let short = accept("SELECT n FROM numbers WHERE n < 3 ORDER BY n");

    let started = Instant::now();
    let (long_result, (short_result, short_elapsed)) = tokio::join!(db.run(&long), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let result = db.run(&short).await;
        (result, started.elapsed())
    });

    assert!(matches!(long_result, Err(ExplorerError::Timeout(_))));
    assert_eq!(short_result.unwrap().row_count(), 3);
    assert!(short_elapsed < Duration::from_secs(1), "short query took {:?}", short_elapsed);
}

#[tokio::test]
async fn test_appended_limit_bounds_rows() {
    let dir = tempfile::tempdir().unwrap();
    let db = numbers_db(&dir, 150).await;

    let rs = db.run(&accept("SELECT n FROM numbers -- every row")).await.unwrap();
    assert_eq!(rs.row_count(), 100);

    let verdict = QueryGate::default().check(&RawModelOutput::from("SELECT n FROM numbers /* every row"), None);
    assert!(!verdict.decision.is_accept());
}
