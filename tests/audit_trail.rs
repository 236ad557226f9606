//! Integration tests for the audit trail, account administration and migrations.
//!
//! These tests require PostgreSQL: set TEST_DATABASE_URL or have Docker available.

mod common;

use cashdesk::error::{CoreError, CoreResult};
use cashdesk::model::{AuditAction, AuditEntry, NewUser, Role};
use cashdesk::store::Page;
use cashdesk::{migrations, Executor};
use chrono::{TimeZone, Utc};
use common::{client, create_user, login_request, TestDatabase, PASSWORD};

#[test]
#[ignore = "requires PostgreSQL: set TEST_DATABASE_URL or run with Docker"]
fn test_append_rolls_back_with_its_transaction() {
    let db = TestDatabase::start();
    let services = db.services();
    let user = create_user(&services, "rollback", Role::User);

    let result: CoreResult<()> = services.pool.in_transaction(|tx| {
        services.audit.append(
            tx,
            &AuditEntry::new(AuditAction::Logout, "user", user.id.to_string()).actor(user.id),
        )?;
        Err(CoreError::validation("abandon the unit of work"))
    });
    assert!(result.is_err());
    assert_eq!(services.audit.count(Some(user.id)).unwrap(), 0);

    services
        .audit
        .record(&AuditEntry::new(AuditAction::Logout, "user", user.id.to_string()).actor(user.id))
        .unwrap();
    assert_eq!(services.audit.count(Some(user.id)).unwrap(), 1);
}

#[test]
#[ignore = "requires PostgreSQL: set TEST_DATABASE_URL or run with Docker"]
fn test_query_is_newest_first_filtered_and_paginated() {
    let db = TestDatabase::start();
    let services = db.services();
    let user = create_user(&services, "reader", Role::User);
    let other = create_user(&services, "other", Role::User);

    for action in [AuditAction::Login, AuditAction::Logout, AuditAction::Login] {
        services
            .audit
            .record(&AuditEntry::new(action, "user", user.id.to_string()).actor(user.id))
            .unwrap();
    }
    services
        .audit
        .record(&AuditEntry::new(AuditAction::Login, "user", other.id.to_string()).actor(other.id))
        .unwrap();

    let records = services.audit.query(Some(user.id), Page::default()).unwrap();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|record| record.user_id == Some(user.id)));
    assert!(records
        .windows(2)
        .all(|pair| (pair[0].created_at, pair[0].id) > (pair[1].created_at, pair[1].id)));
    assert_eq!(records[0].username.as_deref(), Some(user.username.as_str()));

    let page = services
        .audit
        .query(Some(user.id), Page::new(Some(2), Some(2)).unwrap())
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].id, records[2].id);
    assert_eq!(services.audit.count(Some(user.id)).unwrap(), 3);
    assert!(services.audit.count(None).unwrap() >= 4);
}

#[test]
#[ignore = "requires PostgreSQL: set TEST_DATABASE_URL or run with Docker"]
fn test_login_and_logout_are_recorded_with_context() {
    let db = TestDatabase::start();
    let services = db.services();
    let user = create_user(&services, "session", Role::User);

    let success = services
        .auth
        .login(&login_request(&user.username, PASSWORD), &client())
        .unwrap();
    let identity = services.auth.verify_token(&success.token).unwrap();
    services.auth.logout(&identity, &client()).unwrap();

    let records = services.audit.query(Some(user.id), Page::default()).unwrap();
    let actions: Vec<_> = records.iter().map(|record| record.action).collect();
    assert_eq!(actions, vec![AuditAction::Logout, AuditAction::Login]);
    assert_eq!(records[1].ip_address.as_deref(), Some("192.0.2.10"));
    assert_eq!(records[1].user_agent.as_deref(), Some("integration-test"));
}

#[test]
#[ignore = "requires PostgreSQL: set TEST_DATABASE_URL or run with Docker"]
fn test_sweep_purges_old_records_and_audits_itself() {
    let db = TestDatabase::start();
    let services = db.services();
    let user = create_user(&services, "purge", Role::User);

    let id = services
        .audit
        .record(&AuditEntry::new(AuditAction::Login, "user", user.id.to_string()).actor(user.id))
        .unwrap();
    let ancient = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
    services
        .pool
        .acquire()
        .unwrap()
        .execute("UPDATE audit_log SET created_at = $2 WHERE id = $1", &[&id, &ancient])
        .unwrap();

    // A clock in 2010 purges only records older than 2009
    let now = Utc.with_ymd_and_hms(2010, 7, 1, 0, 0, 0).unwrap();
    let report = services.maintenance.run_once(now).unwrap();
    assert!(report.purged_audit_records >= 1);
    assert_eq!(services.audit.count(Some(user.id)).unwrap(), 0);

    let system = services.audit.query(None, Page::new(Some(500), None).unwrap()).unwrap();
    assert!(system
        .iter()
        .any(|record| record.action == AuditAction::PurgeAuditLog && record.user_id.is_none()));
}

#[test]
#[ignore = "requires PostgreSQL: set TEST_DATABASE_URL or run with Docker"]
fn test_account_administration_is_audited() {
    let db = TestDatabase::start();
    let services = db.services();
    let admin = create_user(&services, "boss", Role::Admin);

    let created = services
        .users
        .create(
            Some(admin.id),
            &NewUser {
                username: common::unique("hired"),
                password: PASSWORD.to_string(),
                name: "New Hire".to_string(),
                role: Role::User,
            },
            &client(),
        )
        .unwrap();
    assert!(created.active);

    let duplicate = services
        .users
        .create(
            Some(admin.id),
            &NewUser {
                username: created.username.clone(),
                password: PASSWORD.to_string(),
                name: "Again".to_string(),
                role: Role::User,
            },
            &client(),
        )
        .unwrap_err();
    assert!(matches!(duplicate, CoreError::Conflict(_)));

    let updated = services
        .users
        .set_active(admin.id, created.id, false, &client())
        .unwrap();
    assert!(!updated.active);

    let self_lockout = services
        .users
        .set_active(admin.id, admin.id, false, &client())
        .unwrap_err();
    assert_eq!(self_lockout.status(), 400);

    let missing = services
        .users
        .set_active(admin.id, i64::MAX, true, &client())
        .unwrap_err();
    assert!(matches!(missing, CoreError::NotFound(_)));

    let records = services.audit.query(Some(admin.id), Page::default()).unwrap();
    assert_eq!(records[0].action, AuditAction::UpdateUserStatus);
    assert_eq!(records[0].old_value, Some(serde_json::json!({ "active": true })));
    assert_eq!(records[0].new_value, Some(serde_json::json!({ "active": false })));
    assert_eq!(records[1].action, AuditAction::AddUser);
    assert_eq!(records[1].entity_id.as_deref(), Some(created.id.to_string().as_str()));
}

#[test]
#[ignore = "requires PostgreSQL: set TEST_DATABASE_URL or run with Docker"]
fn test_migrations_are_idempotent() {
    let db = TestDatabase::start();
    let services = db.services();

    let migrator = migrations::migrator().unwrap();
    assert_eq!(migrator.up(&services.pool).unwrap(), 0);

    let status = migrator.status(&services.pool.acquire().unwrap()).unwrap();
    assert!(status.is_up_to_date());
    assert_eq!(status.applied.len(), migrations::all().len());
    assert!(status.applied.iter().all(|record| record.success));
}
