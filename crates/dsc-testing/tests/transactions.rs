//! Transaction gating tests.
//!
//! Exercise begin/commit/rollback on connections backed by the mock driver,
//! for dialects with and without transaction support.
//!
//! ```bash
//! cargo test -p dsc-testing --test transactions
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)]

use dsc_core::{Connection, DialectRegistry, Driver, Error, HandleKind, NativeHandle};
use dsc_testing::MockDriver;
use proptest::prelude::*;

async fn open(driver: &MockDriver, driver_name: &str) -> Connection {
    let db = driver.open("mock://local").await.expect("open");
    let dialect = DialectRegistry::with_builtin().resolve(driver_name);
    Connection::new(db, dialect)
}

// =============================================================================
// Transactional dialect
// =============================================================================

#[tokio::test]
async fn test_pg_begin_commit_then_commit_again() {
    let driver = MockDriver::new();
    let mut conn = open(&driver, "pg").await;
    assert!(conn.supports_transactions());

    conn.begin().await.expect("begin");
    conn.commit().await.expect("commit");

    let err = conn.commit().await.unwrap_err();
    assert!(matches!(err, Error::NoActiveTransaction));
    assert_eq!(err.to_string(), "no active transaction");
    assert_eq!(driver.begins(), 1);
    assert_eq!(driver.commits(), 1);
}

#[tokio::test]
async fn test_pg_commit_and_rollback_without_begin() {
    let driver = MockDriver::new();
    let mut conn = open(&driver, "pg").await;

    assert!(matches!(conn.commit().await, Err(Error::NoActiveTransaction)));
    assert!(matches!(conn.rollback().await, Err(Error::NoActiveTransaction)));
    assert!(conn.transaction().is_none());
    assert_eq!(driver.commits(), 0);
    assert_eq!(driver.rollbacks(), 0);
}

#[tokio::test]
async fn test_pg_failed_commit_clears_transaction() {
    let driver = MockDriver::new();
    let mut conn = open(&driver, "pg").await;
    driver.fail_commits(true);

    conn.begin().await.expect("begin");
    let err = conn.commit().await.unwrap_err();
    assert!(matches!(err, Error::Driver(_)));
    assert!(!conn.in_transaction());

    driver.fail_commits(false);
    assert!(matches!(conn.commit().await, Err(Error::NoActiveTransaction)));
    assert_eq!(driver.commits(), 1);
}

#[tokio::test]
async fn test_pg_failed_rollback_clears_transaction() {
    let driver = MockDriver::new();
    let mut conn = open(&driver, "pg").await;
    driver.fail_rollbacks(true);

    conn.begin().await.expect("begin");
    assert!(conn.rollback().await.is_err());
    assert!(matches!(conn.rollback().await, Err(Error::NoActiveTransaction)));
}

#[tokio::test]
async fn test_pg_begin_failure_leaves_no_transaction() {
    let driver = MockDriver::new();
    let mut conn = open(&driver, "pg").await;
    driver.fail_begins(true);

    let err = conn.begin().await.unwrap_err();
    assert_eq!(err.to_string(), "cannot begin transaction");
    assert!(!conn.in_transaction());
    assert!(matches!(conn.commit().await, Err(Error::NoActiveTransaction)));
}

#[tokio::test]
async fn test_pg_begin_while_active_is_rejected() {
    let driver = MockDriver::new();
    let mut conn = open(&driver, "pg").await;

    conn.begin().await.expect("begin");
    let err = conn.begin().await.unwrap_err();
    assert!(matches!(err, Error::TransactionAlreadyActive));
    assert!(err.is_transaction_state());

    // The first transaction is still usable.
    conn.execute("INSERT INTO t VALUES (1)").await.expect("execute");
    conn.commit().await.expect("commit");
    assert_eq!(driver.begins(), 1);
    assert_eq!(driver.commits(), 1);
}

#[tokio::test]
async fn test_pg_transaction_handle_lifecycle() {
    let driver = MockDriver::new();
    let mut conn = open(&driver, "pg").await;

    assert!(matches!(
        conn.native(HandleKind::Transaction),
        NativeHandle::Transaction(None)
    ));
    conn.begin().await.expect("begin");
    assert!(matches!(
        conn.native(HandleKind::Transaction),
        NativeHandle::Transaction(Some(_))
    ));
    conn.rollback().await.expect("rollback");
    assert!(conn.transaction().is_none());
    assert!(matches!(
        conn.native(HandleKind::Database),
        NativeHandle::Database(_)
    ));
}

// =============================================================================
// Non-transactional dialect
// =============================================================================

#[tokio::test]
async fn test_csv_transaction_calls_are_noops() {
    let driver = MockDriver::new();
    let mut conn = open(&driver, "csv").await;
    assert!(!conn.supports_transactions());

    conn.commit().await.expect("commit");
    conn.rollback().await.expect("rollback");
    conn.begin().await.expect("begin");
    conn.begin().await.expect("begin twice");
    conn.commit().await.expect("commit");
    conn.commit().await.expect("commit again");

    assert!(conn.transaction().is_none());
    assert_eq!(driver.begins(), 0);
    assert_eq!(driver.commits(), 0);
    assert_eq!(driver.rollbacks(), 0);
}

#[tokio::test]
async fn test_csv_ignores_driver_faults() {
    let driver = MockDriver::new();
    let mut conn = open(&driver, "csv").await;
    driver.fail_begins(true);
    driver.fail_commits(true);

    conn.begin().await.expect("begin");
    conn.commit().await.expect("commit");
}

// =============================================================================
// Any call order
// =============================================================================

#[derive(Debug, Clone, Copy)]
enum Op {
    Begin,
    Commit,
    Rollback,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![Just(Op::Begin), Just(Op::Commit), Just(Op::Rollback)]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime")
}

proptest! {
    #[test]
    fn prop_non_transactional_always_succeeds(ops in prop::collection::vec(op(), 0..24)) {
        runtime().block_on(async {
            let driver = MockDriver::new();
            let mut conn = open(&driver, "csv").await;
            for op in ops {
                let result = match op {
                    Op::Begin => conn.begin().await,
                    Op::Commit => conn.commit().await,
                    Op::Rollback => conn.rollback().await,
                };
                assert!(result.is_ok());
                assert!(conn.transaction().is_none());
            }
            assert_eq!(driver.begins(), 0);
        });
    }

    #[test]
    fn prop_transactional_follows_state_machine(ops in prop::collection::vec(op(), 0..24)) {
        runtime().block_on(async {
            let driver = MockDriver::new();
            let mut conn = open(&driver, "pg").await;
            let mut active = false;
            for op in ops {
                match op {
                    Op::Begin => {
                        let result = conn.begin().await;
                        if active {
                            assert!(matches!(result, Err(Error::TransactionAlreadyActive)));
                        } else {
                            assert!(result.is_ok());
                        }
                        active = true;
                    }
                    Op::Commit | Op::Rollback => {
                        let result = match op {
                            Op::Commit => conn.commit().await,
                            _ => conn.rollback().await,
                        };
                        if active {
                            assert!(result.is_ok());
                        } else {
                            assert!(matches!(result, Err(Error::NoActiveTransaction)));
                        }
                        active = false;
                    }
                }
                assert_eq!(conn.in_transaction(), active);
            }
        });
    }
}
