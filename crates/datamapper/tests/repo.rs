//! Repository operations against the in-memory executor.

mod common;

use asupersync::runtime::RuntimeBuilder;
use common::{MemoryExecutor, MemoryState, expect_err, registry, unwrap_outcome};
use datamapper::prelude::*;
use datamapper::{CardinalityError, PlanErrorKind};
use std::sync::Mutex;

fn seeded() -> Arc<Mutex<MemoryState>> {
    let mut state = MemoryState::default();
    for (id, name, age) in [(1, "Ada", 36), (2, "Bob", 25), (3, "Cy", 17)] {
        state.insert_row(
            "users",
            &["id", "name", "age"],
            vec![Value::BigInt(id), Value::from(name), Value::Int(age)],
        );
    }
    state.next_id = 3;
    Arc::new(Mutex::new(state))
}

fn setup() -> (Arc<Mutex<MemoryState>>, Repo<MemoryExecutor>, Arc<Schema>) {
    let state = seeded();
    let repo = Repo::new(MemoryExecutor::new(Arc::clone(&state)));
    let user = registry().schema("User").expect("User");
    (state, repo, user)
}

fn last_executed(state: &Arc<Mutex<MemoryState>>) -> (String, Vec<Value>) {
    state
        .lock()
        .expect("lock poisoned")
        .executed
        .last()
        .cloned()
        .expect("a statement was executed")
}

#[test]
fn all_and_first() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let (state, repo, user) = setup();

    rt.block_on(async {
        let everyone = unwrap_outcome(repo.all(&cx, Arc::clone(&user)).await);
        assert_eq!(everyone.len(), 3);
        assert_eq!(everyone[2].get_as::<i32>("age").expect("age"), 17);

        let some = unwrap_outcome(
            repo.all(&cx, Query::new(Arc::clone(&user)).filter("id__in", vec![1_i64, 3]))
                .await,
        );
        assert_eq!(some.len(), 2);

        let first = unwrap_outcome(repo.first(&cx, Query::new(Arc::clone(&user)).order_by("name")).await);
        assert_eq!(
            first.expect("a user").get("name").expect("name"),
            &Value::from("Ada")
        );
        let guard = state.lock().expect("lock poisoned");
        let (sql, _) = guard.queries.last().expect("first query");
        assert!(sql.ends_with("ORDER BY \"users\".\"name\" ASC LIMIT 1"));
    });

    rt.block_on(async {
        let nobody = unwrap_outcome(
            repo.first(&cx, Query::new(Arc::clone(&user)).filter("name", "Zed"))
                .await,
        );
        assert!(nobody.is_none());
    });
}

#[test]
fn one_get_and_get_by() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let (_state, repo, user) = setup();

    rt.block_on(async {
        let bob = unwrap_outcome(repo.get(&cx, &user, 2_i64).await);
        assert_eq!(bob.get("name").expect("name"), &Value::from("Bob"));

        let cy = unwrap_outcome(repo.get_by(&cx, Arc::clone(&user), [("name", "Cy")]).await);
        assert_eq!(cy.get("id").expect("id"), &Value::BigInt(3));

        let err = expect_err(repo.get(&cx, &user, 42_i64).await);
        assert!(matches!(
            err,
            Error::Cardinality(CardinalityError::NoResults)
        ));
        assert_eq!(err.to_string(), "expected at least one result but got none");

        let err = expect_err(repo.one(&cx, Arc::clone(&user)).await);
        assert!(matches!(
            err,
            Error::Cardinality(CardinalityError::MultipleResults(3))
        ));
        assert_eq!(err.to_string(), "expected at most one result but got 3");
    });
}

#[test]
fn count_wraps_the_query() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let (state, repo, user) = setup();

    rt.block_on(async {
        assert_eq!(unwrap_outcome(repo.count(&cx, Arc::clone(&user)).await), 3);

        let query = Query::new(Arc::clone(&user)).filter("id__in", vec![1_i64, 2]);
        assert_eq!(unwrap_outcome(repo.count(&cx, query).await), 2);

        let guard = state.lock().expect("lock poisoned");
        let (sql, params) = guard.queries.last().expect("count query");
        assert!(sql.starts_with("SELECT COUNT(*) AS \"count\" FROM (SELECT "));
        assert!(sql.ends_with(") AS \"subquery_for_count\""));
        assert_eq!(params, &vec![Value::BigInt(1), Value::BigInt(2)]);
    });
}

#[test]
fn insert_assigns_the_new_id() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let (state, repo, user) = setup();

    rt.block_on(async {
        let record = Record::from_pairs(
            Arc::clone(&user),
            [("name", Value::from("Dee")), ("age", Value::Int(50))],
        )
        .expect("record");
        let inserted = unwrap_outcome(repo.insert(&cx, record).await);
        assert_eq!(inserted.get("id").expect("id"), &Value::BigInt(4));

        let (sql, params) = last_executed(&state);
        assert_eq!(sql, "INSERT INTO \"users\" (\"name\", \"age\") VALUES ($1, $2)");
        assert_eq!(params, vec![Value::from("Dee"), Value::Int(50)]);

        let fetched = unwrap_outcome(repo.get(&cx, &user, 4_i64).await);
        assert_eq!(fetched.get("name").expect("name"), &Value::from("Dee"));
    });
}

#[test]
fn update_and_delete_single_records() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let (state, repo, user) = setup();

    rt.block_on(async {
        let ada = unwrap_outcome(repo.get(&cx, &user, 1_i64).await);
        let ada = unwrap_outcome(repo.update(&cx, ada, [("name", "Ada L.")]).await);
        assert_eq!(ada.get("name").expect("name"), &Value::from("Ada L."));

        let (sql, params) = last_executed(&state);
        assert_eq!(
            sql,
            "UPDATE \"users\" SET \"name\" = $1 WHERE \"users\".\"id\" = $2"
        );
        assert_eq!(params, vec![Value::from("Ada L."), Value::BigInt(1)]);

        let reloaded = unwrap_outcome(repo.get(&cx, &user, 1_i64).await);
        assert_eq!(reloaded.get("name").expect("name"), &Value::from("Ada L."));

        let deleted = unwrap_outcome(repo.delete(&cx, reloaded).await);
        assert_eq!(deleted.get("id").expect("id"), &Value::BigInt(1));
        assert_eq!(unwrap_outcome(repo.count(&cx, Arc::clone(&user)).await), 2);
    });
}

#[test]
fn bulk_update_and_delete() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let (state, repo, user) = setup();

    rt.block_on(async {
        let adults = Query::new(Arc::clone(&user)).filter("id__in", vec![1_i64, 2]);
        let affected = unwrap_outcome(repo.update_all(&cx, &adults, [("age", 40)]).await);
        assert_eq!(affected, 2);
        let bob = unwrap_outcome(repo.get(&cx, &user, 2_i64).await);
        assert_eq!(bob.get_as::<i32>("age").expect("age"), 40);

        let removed = unwrap_outcome(
            repo.delete_all(&cx, Query::new(Arc::clone(&user)).filter("name", "Cy"))
                .await,
        );
        assert_eq!(removed, 1);
        assert_eq!(unwrap_outcome(repo.count(&cx, Arc::clone(&user)).await), 2);

        let removed = unwrap_outcome(repo.delete_all(&cx, Arc::clone(&user)).await);
        assert_eq!(removed, 2);
        assert_eq!(last_executed(&state).0, "DELETE FROM \"users\"");
    });
}

#[test]
fn filter_only_statements_reject_other_clauses() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let (state, repo, user) = setup();

    rt.block_on(async {
        let joined = Query::new(Arc::clone(&user)).join("pets");
        let err = expect_err(repo.update_all(&cx, &joined, [("age", 1)]).await);
        assert_eq!(err.plan_kind(), Some(PlanErrorKind::UnsupportedClause));

        let limited = Query::new(Arc::clone(&user)).limit(1);
        let err = expect_err(repo.delete_all(&cx, limited).await);
        assert_eq!(err.to_string(), "LIMIT is not supported in DELETE statements");
    });

    assert!(state.lock().expect("lock poisoned").executed.is_empty());
}

#[test]
fn projections_come_back_shaped() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let (_state, repo, user) = setup();

    let rows = rt.block_on(async {
        unwrap_outcome(
            repo.all(
                &cx,
                Query::new(user)
                    .filter("id", 2_i64)
                    .select(Projection::map([("id", "id"), ("name", "name")])),
            )
            .await,
        )
    });

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("name").and_then(Shaped::as_value), Some(&Value::from("Bob")));
}

#[test]
fn config_overrides_the_dialect() {
    let state = seeded();
    let repo = Repo::with_config(
        MemoryExecutor::new(state),
        RepoConfig::new().dialect(Dialect::Sqlite).log_sql(true),
    );
    assert_eq!(repo.dialect(), Dialect::Sqlite);
    assert!(repo.config().log_sql);

    let default = Repo::new(MemoryExecutor::new(seeded()));
    assert_eq!(default.dialect(), Dialect::Postgres);
}

fn assert_send<T: Send>(_: &T) {}

#[test]
fn repository_futures_are_send() {
    let cx = Cx::for_testing();
    let (_state, repo, user) = setup();
    let mut records: Vec<Record> = Vec::new();

    assert_send(&repo.all(&cx, Query::new(Arc::clone(&user)).preload("pets.owner")));
    assert_send(&repo.first(&cx, Arc::clone(&user)));
    assert_send(&repo.get(&cx, &user, 1_i64));
    assert_send(&repo.count(&cx, Arc::clone(&user)));
    assert_send(&repo.preload(&cx, &mut records, ["pets", "home"]));
}
