//! Integration tests for the store handle: pool capacity, connection loss, SQLSTATE checks.
//!
//! These tests require PostgreSQL: set TEST_DATABASE_URL or have Docker available.

mod common;

use cashdesk::connection::connect;
use cashdesk::error::CoreError;
use cashdesk::http::{ApiRequest, Method, Router};
use cashdesk::model::Role;
use cashdesk::{Executor, StoreError};
use common::{client, create_user, login_request, TestDatabase, PASSWORD};
use std::time::{Duration, Instant};

#[test]
#[ignore = "requires PostgreSQL: set TEST_DATABASE_URL or run with Docker"]
fn test_exhausted_pool_fails_fast_with_capacity_error() {
    let db = TestDatabase::start();
    let migrated = db.services();
    let user = create_user(&migrated, "capacity", Role::User);

    let mut config = db.config();
    config.database.max_connections = 1;
    config.database.pool_timeout_seconds = 1;
    let services = db.services_on_migrated(&config);
    let token = services
        .auth
        .login(&login_request(&user.username, PASSWORD), &client())
        .unwrap()
        .token;

    let held = services.pool.acquire().unwrap();

    let start = Instant::now();
    let err = services.pool.acquire().unwrap_err();
    let waited = start.elapsed();
    assert!(matches!(err, StoreError::PoolExhausted { .. }));
    assert!(waited >= Duration::from_millis(900), "gave up after {waited:?}");
    assert!(waited < Duration::from_secs(3), "waited {waited:?}");
    assert_eq!(CoreError::from(err).status(), 503);

    let router = Router::new(services.clone());
    let rsp = router.handle(
        ApiRequest::new(Method::Get, "/api/operations")
            .with_header("Authorization", format!("Bearer {token}")),
    );
    assert_eq!(rsp.status, 503);
    assert_eq!(rsp.body_json().unwrap()["message"], "Service temporarily unavailable");

    drop(held);
    assert!(services.pool.acquire().is_ok());
    assert_eq!(services.pool.open_connections(), 1);
}

#[test]
#[ignore = "requires PostgreSQL: set TEST_DATABASE_URL or run with Docker"]
fn test_pool_recovers_after_server_side_disconnect() {
    let db = TestDatabase::start();
    db.services();

    let mut config = db.config();
    config.database.max_connections = 2;
    let services = db.services_on_migrated(&config);

    let pids: Vec<i32> = {
        let first = services.pool.acquire().unwrap();
        let second = services.pool.acquire().unwrap();
        [&first, &second]
            .iter()
            .map(|conn| {
                conn.query_one("SELECT pg_backend_pid() AS pid", &[])
                    .unwrap()
                    .get("pid")
            })
            .collect()
    };
    assert_eq!(services.pool.open_connections(), 2);

    let outside = connect(&db.url).unwrap();
    for pid in &pids {
        outside
            .execute("SELECT pg_terminate_backend($1)", &[pid])
            .unwrap();
    }
    std::thread::sleep(Duration::from_millis(200));

    // The dead clients are discarded and replaced instead of being handed out forever
    assert!(services.pool.ping().unwrap());
    assert_eq!(services.operations.count_active(i64::MAX).unwrap(), 0);
    assert!(services.pool.open_connections() <= 2);

    let fresh: Vec<i32> = (0..2)
        .map(|_| {
            services
                .pool
                .acquire()
                .unwrap()
                .query_one("SELECT pg_backend_pid() AS pid", &[])
                .unwrap()
                .get("pid")
        })
        .collect();
    assert!(fresh.iter().all(|pid| !pids.contains(pid)));
}

#[test]
#[ignore = "requires PostgreSQL: set TEST_DATABASE_URL or run with Docker"]
fn test_database_errors_are_classified_by_sqlstate() {
    let db = TestDatabase::start();
    let services = db.services();

    let duplicate: Result<(), StoreError> = services.pool.in_transaction(|tx| {
        tx.execute("CREATE TEMP TABLE dedupe (k INT PRIMARY KEY) ON COMMIT DROP", &[])?;
        tx.execute("INSERT INTO dedupe VALUES (1)", &[])?;
        tx.execute("INSERT INTO dedupe VALUES (1)", &[])?;
        Ok(())
    });
    let err = duplicate.unwrap_err();
    assert!(err.is_unique_violation());
    assert!(!err.is_connection_failure());

    let null: Result<(), StoreError> = services.pool.in_transaction(|tx| {
        tx.execute("CREATE TEMP TABLE required (k INT NOT NULL) ON COMMIT DROP", &[])?;
        tx.execute("INSERT INTO required VALUES (NULL)", &[])?;
        Ok(())
    });
    let err = null.unwrap_err();
    assert!(!err.is_unique_violation());
    assert!(!err.is_connection_failure());

    // Statement errors leave the connection in the pool
    let opened = services.pool.open_connections();
    assert!(services.pool.ping().unwrap());
    assert_eq!(services.pool.open_connections(), opened);
}

#[test]
#[ignore = "requires PostgreSQL: set TEST_DATABASE_URL or run with Docker"]
fn test_duplicate_username_is_a_conflict() {
    let db = TestDatabase::start();
    let services = db.services();
    let first = create_user(&services, "twin", Role::User);

    let err = services
        .users
        .create(
            None,
            &cashdesk::model::NewUser {
                username: first.username.clone(),
                password: PASSWORD.to_string(),
                name: "Twin".to_string(),
                role: Role::User,
            },
            &client(),
        )
        .unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));
    assert_eq!(err.status(), 409);
}
