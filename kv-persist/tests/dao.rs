mod common;

use common::{Customer, FailingStore, Flag, Note, Person, Unlisted, init_logger};
use kv_persist::{
    Dao, DataAccess, Db, Entity, Error, Params, SaveOutcome, SessionState, TransientStore, Value,
};

fn person_dao(store: &TransientStore) -> (Db<TransientStore>, Dao<Person, TransientStore>) {
    let db = Db::new(store.clone());
    let dao = Dao::new(&db);
    (db, dao)
}

async fn seed(store: &TransientStore, people: Vec<Person>) {
    let (db, dao) = person_dao(store);
    for mut person in people {
        assert!(dao.save(&mut person).await.unwrap());
    }
    db.close().await.unwrap();
}

fn ids(people: &[Person]) -> Vec<&str> {
    let mut ids = people.iter().map(|p| p.id.as_str()).collect::<Vec<_>>();
    ids.sort();
    ids
}

#[tokio::test]
async fn fetch_of_unknown_id_is_none() {
    init_logger();
    let (_db, dao) = person_dao(&TransientStore::new());
    assert_eq!(dao.fetch("nobody").await.unwrap(), None);
}

#[tokio::test]
async fn save_then_fetch_round_trips() {
    init_logger();
    let store = TransientStore::new();
    let (db, dao) = person_dao(&store);

    let mut ann = Person::new("p1", "Ann", 31).in_city("Leipzig");
    assert!(dao.save(&mut ann).await.unwrap());
    assert_eq!(ann.version, 1);

    // visible inside the same transaction
    assert_eq!(dao.fetch("p1").await.unwrap(), Some(ann.clone()));

    db.commit().await.unwrap();
    let (_other, reader) = person_dao(&store);
    assert_eq!(reader.fetch("p1").await.unwrap(), Some(ann));
}

#[tokio::test]
async fn save_updates_in_place() {
    let store = TransientStore::new();
    let (_db, dao) = person_dao(&store);

    let mut ann = Person::new("p1", "Ann", 31);
    dao.save(&mut ann).await.unwrap();
    ann.age = 32;
    assert!(dao.save(&mut ann).await.unwrap());
    assert_eq!(ann.version, 2);

    let all = dao.fetch_all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].age, 32);
}

#[tokio::test]
async fn delete_all_empties_only_the_bound_type() {
    init_logger();
    let store = TransientStore::new();
    seed(
        &store,
        (0..300)
            .map(|i| Person::new(&format!("p{:03}", i), "x", i))
            .collect(),
    )
    .await;

    let db = Db::with_page_size(store.clone(), 7);
    let people = Dao::<Person, _>::new(&db);
    let notes = Dao::<Note, _>::new(&db);
    let mut note = Note {
        id: 1,
        text: "keep".into(),
    };
    notes.save(&mut note).await.unwrap();

    assert_eq!(people.fetch_all().await.unwrap().len(), 300);
    assert_eq!(people.delete_all().await.unwrap(), 300);
    assert!(people.fetch_all().await.unwrap().is_empty());
    assert_eq!(notes.fetch_all().await.unwrap(), vec![note]);

    db.close().await.unwrap();
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn delete_removes_by_identity() {
    let store = TransientStore::new();
    seed(
        &store,
        vec![Person::new("a", "Ann", 1), Person::new("b", "Bob", 2)],
    )
    .await;

    let (_db, dao) = person_dao(&store);
    dao.delete(&Person::new("a", "", 0)).await.unwrap();
    assert_eq!(ids(&dao.fetch_all().await.unwrap()), vec!["b"]);
}

#[tokio::test]
async fn find_by_example_matches_text_by_substring() {
    init_logger();
    let store = TransientStore::new();
    seed(
        &store,
        vec![
            Person::new("1", "abcdef", 20),
            Person::new("2", "xabcx", 30),
            Person::new("3", "ab-c", 20),
            Person::new("4", "ABC", 20),
        ],
    )
    .await;
    let (_db, dao) = person_dao(&store);

    let sample = Person::new("", "abc", 0);
    assert_eq!(
        ids(&dao.find_by_example(&sample, &[]).await.unwrap()),
        vec!["1", "2"]
    );

    let sample = Person::new("", "abc", 20);
    assert_eq!(
        ids(&dao.find_by_example(&sample, &[]).await.unwrap()),
        vec!["1"]
    );
}

#[tokio::test]
async fn zero_numbers_do_not_constrain() {
    let store = TransientStore::new();
    seed(
        &store,
        vec![Person::new("1", "Ann", 20), Person::new("2", "Ann", 44)],
    )
    .await;
    let (_db, dao) = person_dao(&store);

    let outcome = dao
        .query_by_example(&Person::new("", "Ann", 0), &[])
        .await
        .unwrap();
    assert_eq!(ids(&outcome.matches), vec!["1", "2"]);
    assert_eq!(outcome.filter.predicates().len(), 1);
    assert!(outcome.diagnostics.is_empty());
}

#[tokio::test]
async fn excluded_attributes_never_constrain() {
    let store = TransientStore::new();
    seed(
        &store,
        vec![Person::new("1", "Ann", 20), Person::new("2", "Bob", 20)],
    )
    .await;
    let (_db, dao) = person_dao(&store);

    let sample = Person::new("", "zzz", 20);
    assert!(dao.find_by_example(&sample, &[]).await.unwrap().is_empty());

    let outcome = dao
        .query_by_example(&sample, &["name"])
        .await
        .unwrap();
    assert!(
        outcome
            .filter
            .predicates()
            .iter()
            .all(|p| p.attribute().name != "name")
    );
    assert_eq!(ids(&outcome.matches), vec!["1", "2"]);
}

#[tokio::test]
async fn find_by_example_reaches_inherited_attributes() {
    let store = TransientStore::new();
    seed(
        &store,
        vec![
            Person::new("1", "Ann", 20).in_city("Leipzig"),
            Person::new("2", "Bob", 30).in_city("Dresden"),
            Person::new("3", "Cid", 40),
        ],
    )
    .await;
    let (_db, dao) = person_dao(&store);

    let sample = Person::default().in_city("zig");
    assert_eq!(
        ids(&dao.find_by_example(&sample, &[]).await.unwrap()),
        vec!["1"]
    );

    let sample = Person::new("", "o", 0).in_city("en");
    assert_eq!(
        ids(&dao.find_by_example(&sample, &[]).await.unwrap()),
        vec!["2"]
    );
    assert_eq!(
        ids(&dao.find_by_example(&sample, &["city"]).await.unwrap()),
        vec!["2"]
    );
    assert_eq!(
        ids(&dao.find_by_example(&sample, &["name"]).await.unwrap()),
        vec!["2"]
    );
    assert_eq!(
        ids(&dao.find_by_example(&sample, &["name", "city"]).await.unwrap()),
        vec!["1", "2", "3"]
    );
}

#[tokio::test]
async fn find_by_example_reads_getters() {
    let db = Db::new(TransientStore::new());
    let dao = Dao::<Customer, _>::new(&db);
    for (id, spend) in [("c1", 50), ("c2", 1500), ("c3", 2500), ("c4", 0)] {
        dao.save(&mut Customer {
            id: id.to_string(),
            spend,
        })
        .await
        .unwrap();
    }

    let gold = Customer {
        id: String::new(),
        spend: 1200,
    };
    let outcome = dao.query_by_example(&gold, &["spend"]).await.unwrap();
    assert_eq!(outcome.filter.to_string(), "tier contains \"gold\"");
    let mut found = outcome
        .matches
        .iter()
        .map(|c| c.id.as_str())
        .collect::<Vec<_>>();
    found.sort();
    assert_eq!(found, vec!["c2", "c3"]);

    assert_eq!(
        dao.find_by_example(&Customer::default(), &[])
            .await
            .unwrap()
            .len(),
        4
    );
}

#[tokio::test]
async fn find_by_example_constrains_on_false() {
    let db = Db::new(TransientStore::new());
    let dao = Dao::<Flag, _>::new(&db);
    for (id, active) in [("on", Some(true)), ("off", Some(false)), ("unset", None)] {
        dao.save(&mut Flag {
            id: id.to_string(),
            active,
        })
        .await
        .unwrap();
    }

    let found = |flags: Vec<Flag>| {
        let mut ids = flags.into_iter().map(|f| f.id).collect::<Vec<_>>();
        ids.sort();
        ids
    };
    let inactive = Flag {
        id: String::new(),
        active: Some(false),
    };
    assert_eq!(
        found(dao.find_by_example(&inactive, &[]).await.unwrap()),
        vec!["off"]
    );
    let active = Flag {
        id: String::new(),
        active: Some(true),
    };
    assert_eq!(
        found(dao.find_by_example(&active, &[]).await.unwrap()),
        vec!["on"]
    );
    assert_eq!(
        found(dao.find_by_example(&Flag::default(), &[]).await.unwrap()),
        vec!["off", "on", "unset"]
    );
}

#[tokio::test]
async fn find_by_example_without_metadata_ends_the_unit_of_work() {
    let store = TransientStore::new();
    let (db, people) = person_dao(&store);
    people
        .save(&mut Person::new("p1", "Ann", 30))
        .await
        .unwrap();

    let unlisted = Dao::<Unlisted, _>::new(&db);
    let err = unlisted
        .find_by_example(&Unlisted::default(), &[])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Introspection(_)));
    assert_eq!(db.state().await, SessionState::Closed);

    // the pending save was rolled back
    assert!(store.is_empty());
    assert_eq!(people.fetch("p1").await.unwrap(), None);
}

#[tokio::test]
async fn array_attributes_are_ignored() {
    let store = TransientStore::new();
    let mut tagged = Person::new("1", "Ann", 20);
    tagged.aliases = vec!["annie".into()];
    seed(&store, vec![tagged, Person::new("2", "Ann", 20)]).await;
    let (_db, dao) = person_dao(&store);

    let mut sample = Person::new("", "Ann", 0);
    sample.aliases = vec!["nobody".into()];
    assert_eq!(
        ids(&dao.find_by_example(&sample, &[]).await.unwrap()),
        vec!["1", "2"]
    );
}

#[tokio::test]
async fn stale_save_returns_false_and_refreshes() {
    init_logger();
    let store = TransientStore::new();
    seed(&store, vec![Person::new("p1", "Ann", 30)]).await;

    let (db_a, dao_a) = person_dao(&store);
    let (db_b, dao_b) = person_dao(&store);

    let mut copy_a = dao_a.fetch("p1").await.unwrap().unwrap();
    let mut copy_b = dao_b.fetch("p1").await.unwrap().unwrap();
    assert_eq!(copy_a.version, 1);

    copy_a.name = "Anna".into();
    assert!(dao_a.save(&mut copy_a).await.unwrap());
    db_a.close().await.unwrap();

    copy_b.age = 99;
    assert!(!dao_b.save(&mut copy_b).await.unwrap());
    assert_eq!(copy_b, copy_a);
    assert_eq!(db_b.state().await, SessionState::OpenTxn);

    // a fresh transaction may save the refreshed copy
    db_b.rollback().await.unwrap();
    copy_b.age = 99;
    assert!(dao_b.save(&mut copy_b).await.unwrap());
    db_b.close().await.unwrap();

    let (_db, reader) = person_dao(&store);
    let stored = reader.fetch("p1").await.unwrap().unwrap();
    assert_eq!((stored.name.as_str(), stored.age, stored.version), ("Anna", 99, 3));
}

#[tokio::test]
async fn try_save_reports_conflict_without_touching_the_input() {
    let store = TransientStore::new();
    seed(&store, vec![Person::new("p1", "Ann", 30)]).await;
    let (_db, dao) = person_dao(&store);

    let stale = Person::new("p1", "Old", 30);
    match dao.try_save(&stale).await.unwrap() {
        SaveOutcome::Conflict(current) => {
            assert_eq!(current.name, "Ann");
            assert_eq!(current.version, 1);
        }
        other => panic!("expected conflict, got {:?}", other),
    }
    assert_eq!(stale.name, "Old");
}

#[tokio::test]
async fn concurrent_commit_is_stale() {
    let store = TransientStore::new();
    let (db_a, dao_a) = person_dao(&store);
    let (db_b, dao_b) = person_dao(&store);

    let mut from_a = Note {
        id: 7,
        text: "a".into(),
    };
    let mut from_b = Note {
        id: 7,
        text: "b".into(),
    };
    let notes_a = Dao::<Note, _>::new(&db_a);
    let notes_b = Dao::<Note, _>::new(&db_b);
    // both transactions are open before either writes
    dao_a.fetch("x").await.unwrap();
    dao_b.fetch("x").await.unwrap();

    notes_a.save(&mut from_a).await.unwrap();
    notes_b.save(&mut from_b).await.unwrap();
    db_a.commit().await.unwrap();

    assert!(matches!(db_b.commit().await, Err(Error::StaleObject(_))));
    assert_eq!(db_b.state().await, SessionState::Closed);
    assert_eq!(notes_b.fetch("7").await.unwrap().unwrap().text, "a");
}

#[tokio::test]
async fn close_without_commit_persists_and_reopens() {
    init_logger();
    let store = TransientStore::new();
    let (db, dao) = person_dao(&store);

    let mut ann = Person::new("p1", "Ann", 30);
    dao.save(&mut ann).await.unwrap();
    let first = db.session_id().await;
    db.close().await.unwrap();
    assert_eq!(db.state().await, SessionState::Closed);
    assert_eq!(store.len(), 1);

    assert_eq!(dao.fetch("p1").await.unwrap(), Some(ann));
    assert_eq!(db.state().await, SessionState::OpenTxn);
    assert_ne!(db.session_id().await, first);
}

#[tokio::test]
async fn daos_on_one_db_share_the_transaction() {
    let store = TransientStore::new();
    let db = Db::new(store.clone());
    let people = Dao::<Person, _>::new(&db);
    let notes = Dao::<Note, _>::new(&db);

    people
        .save(&mut Person::new("p1", "Ann", 30))
        .await
        .unwrap();
    notes
        .save(&mut Note {
            id: 1,
            text: "hi".into(),
        })
        .await
        .unwrap();
    notes.rollback().await.unwrap();

    assert_eq!(people.fetch("p1").await.unwrap(), None);
    assert_eq!(notes.fetch("1").await.unwrap(), None);

    people
        .save(&mut Person::new("p2", "Bob", 30))
        .await
        .unwrap();
    notes.commit().await.unwrap();
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn failed_save_rolls_back_and_closes() {
    init_logger();
    let store = FailingStore::default();
    let db = Db::new(store.clone());
    let dao = Dao::<Person, _>::new(&db);

    dao.save(&mut Person::new("ok", "Ann", 1)).await.unwrap();
    let err = dao
        .save(&mut Person::new("poison", "Bob", 2))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Transaction(_)));
    assert_eq!(db.state().await, SessionState::Closed);

    // the earlier write went down with the transaction
    assert!(store.inner.is_empty());
    assert_eq!(dao.fetch("ok").await.unwrap(), None);
}

#[tokio::test]
async fn find_runs_native_key_queries() {
    let store = TransientStore::new();
    seed(
        &store,
        vec![
            Person::new("a1", "Ann", 1),
            Person::new("a2", "Abe", 2),
            Person::new("b1", "Bob", 3),
        ],
    )
    .await;
    let (_db, dao) = person_dao(&store);
    let prefix = format!("entity/{}/", Person::type_path());

    let rows = dao.find(&format!("{}a", prefix)).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].decode::<Person>().unwrap().name, "Ann");

    let rows = dao
        .find(&format!("{}a2..{}c", prefix, prefix))
        .await
        .unwrap();
    assert_eq!(
        rows.iter().map(|r| r.key.as_str()).collect::<Vec<_>>(),
        vec![format!("{}a2", prefix), format!("{}b1", prefix)]
    );

    let params = Params::from([("id".to_string(), Value::from("b1"))]);
    let rows = dao
        .find_with(&format!("{}:id", prefix), &params)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].decode::<Person>().unwrap().name, "Bob");

    // a parameter value stays inside its bound
    let params = Params::from([("id".to_string(), Value::from("a..zzzz"))]);
    let rows = dao
        .find_with(&format!("{}:id", prefix), &params)
        .await
        .unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn malformed_query_closes_the_session() {
    let store = TransientStore::new();
    let (db, dao) = person_dao(&store);
    dao.save(&mut Person::new("p1", "Ann", 1)).await.unwrap();

    let err = dao.find_with("entity/:missing", &Params::new()).await.unwrap_err();
    assert!(matches!(err, Error::QueryExecution(_)));
    assert_eq!(db.state().await, SessionState::Closed);
    assert!(store.is_empty());

    assert!(matches!(
        dao.find("..").await,
        Err(Error::QueryExecution(_))
    ));
}

#[tokio::test]
async fn display_names_type_and_session() {
    let (_db, dao) = person_dao(&TransientStore::new());
    assert_eq!(
        dao.to_string(),
        format!(
            "(accessed_type: {})(backend: transient)(session: closed)",
            Person::type_path()
        )
    );
    dao.fetch("x").await.unwrap();
    assert!(dao.to_string().ends_with("OpenTxn)"));
}
