//! Scalar CRUD behavior against a live store.

use chrono::{TimeZone, Utc};
use rowstash::prelude::*;

record! {
    struct User {
        table = "user";
        unique = [email];
        email: Field<String>,
        name: Field<String>,
        age: Field<i64>,
        active: Field<bool>,
    }
}

record! {
    struct Event {
        table = "event";
        unique = [[kind, at]];
        kind: Field<String>,
        at: Field<DateTime<Utc>>,
        weight: Field<f64>,
    }
}

async fn store() -> Database {
    Database::in_memory().await.unwrap()
}

fn user(email: &str, name: &str, age: i64) -> User {
    User {
        email: email.into(),
        name: name.into(),
        age: age.into(),
        active: true.into(),
    }
}

#[tokio::test]
async fn create_is_idempotent_and_visible_through_exists() {
    let db = store().await;
    let table = db.table::<User>();

    assert!(!table.exists().await.unwrap());
    table.create().await.unwrap();
    assert!(table.exists().await.unwrap());
    // A second create is a no-op, not an error.
    table.create().await.unwrap();
}

#[tokio::test]
async fn put_on_a_unique_key_updates_instead_of_duplicating() {
    let db = store().await;
    db.create::<User>().await.unwrap();

    db.put(&user("a@example.com", "Alice", 30)).await.unwrap();
    db.put(&user("a@example.com", "Alice Smith", 31)).await.unwrap();

    assert_eq!(db.count(&User::default()).await.unwrap(), 1);
    let stored = db
        .one(&User {
            email: "a@example.com".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(stored.name.value(), Some(&"Alice Smith".to_string()));
    assert_eq!(stored.age.value(), Some(&31));
}

#[tokio::test]
async fn repeated_identical_put_is_idempotent() {
    let db = store().await;
    db.create::<User>().await.unwrap();

    let alice = user("a@example.com", "Alice", 30);
    let first = db.put(&alice).await.unwrap();
    let second = db.put(&alice).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(db.count(&User::default()).await.unwrap(), 1);
}

#[tokio::test]
async fn get_distinguishes_none_one_and_many() {
    let db = store().await;
    db.create::<User>().await.unwrap();
    db.put(&user("a@example.com", "Ada", 30)).await.unwrap();
    db.put(&user("b@example.com", "Ada", 41)).await.unwrap();

    let nobody = User {
        email: "nobody@example.com".into(),
        ..Default::default()
    };
    assert!(db.get(&nobody).await.unwrap().is_none());
    assert!(matches!(
        db.one(&nobody).await,
        Err(Error::NotFound { .. })
    ));

    let both_adas = User {
        name: "Ada".into(),
        ..Default::default()
    };
    assert!(matches!(
        db.get(&both_adas).await,
        Err(Error::MultipleResults { .. })
    ));
    assert_eq!(db.all(&both_adas).await.unwrap().len(), 2);
}

#[tokio::test]
async fn set_touches_only_set_fields() {
    let db = store().await;
    db.create::<User>().await.unwrap();
    db.put(&user("a@example.com", "Alice", 30)).await.unwrap();
    db.put(&user("b@example.com", "Bob", 30)).await.unwrap();

    let matched = db
        .set(
            &User {
                age: 30.into(),
                ..Default::default()
            },
            &User {
                age: 31.into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(matched, 2);

    let alice = db
        .one(&User {
            email: "a@example.com".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    // Name was unset in the update and must survive untouched.
    assert_eq!(alice.name.value(), Some(&"Alice".to_string()));
    assert_eq!(alice.age.value(), Some(&31));
}

#[tokio::test]
async fn explicit_null_writes_and_filters_as_null() {
    let db = store().await;
    db.create::<User>().await.unwrap();
    db.put(&user("a@example.com", "Alice", 30)).await.unwrap();

    db.set(
        &User {
            email: "a@example.com".into(),
            ..Default::default()
        },
        &User {
            age: Field::Null,
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let ageless = db
        .one(&User {
            age: Field::Null,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(ageless.email.value(), Some(&"a@example.com".to_string()));
    assert_eq!(ageless.age, Field::Null);
}

#[tokio::test]
async fn delete_and_count_respect_the_filter() {
    let db = store().await;
    db.create::<User>().await.unwrap();
    db.put(&user("a@example.com", "Alice", 30)).await.unwrap();
    db.put(&user("b@example.com", "Bob", 40)).await.unwrap();
    db.put(&user("c@example.com", "Carol", 40)).await.unwrap();

    let forties = User {
        age: 40.into(),
        ..Default::default()
    };
    assert_eq!(db.count(&forties).await.unwrap(), 2);
    assert_eq!(db.delete(&forties).await.unwrap(), 2);
    assert_eq!(db.count(&User::default()).await.unwrap(), 1);
    // Deleting again matches nothing.
    assert_eq!(db.delete(&forties).await.unwrap(), 0);
}

#[tokio::test]
async fn chained_ordering_and_raw_fragments() {
    let db = store().await;
    db.create::<User>().await.unwrap();
    db.put(&user("a@example.com", "Alice", 30)).await.unwrap();
    db.put(&user("b@example.com", "Bob", 40)).await.unwrap();
    db.put(&user("c@example.com", "Carol", 35)).await.unwrap();

    let by_age_desc = db
        .table::<User>()
        .order_by("age", SortOrder::Desc)
        .all()
        .await
        .unwrap();
    let names: Vec<_> = by_age_desc
        .iter()
        .map(|u| u.name.value().unwrap().as_str())
        .collect();
    assert_eq!(names, ["Bob", "Carol", "Alice"]);

    let older = db
        .table::<User>()
        .filter_raw("age >= 35")
        .order_by_raw("age ASC")
        .all()
        .await
        .unwrap();
    let names: Vec<_> = older
        .iter()
        .map(|u| u.name.value().unwrap().as_str())
        .collect();
    assert_eq!(names, ["Carol", "Bob"]);

    // Chaining never mutates the handle it was called on.
    let base = db.table::<User>();
    let _narrowed = base.filter_raw("age >= 35");
    assert_eq!(base.count().await.unwrap(), 3);
}

#[tokio::test]
async fn compound_unique_key_upserts_on_the_full_key() {
    let db = store().await;
    db.create::<Event>().await.unwrap();

    let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    db.put(&Event {
        kind: "login".into(),
        at: at.into(),
        weight: 1.0.into(),
    })
    .await
    .unwrap();
    db.put(&Event {
        kind: "login".into(),
        at: at.into(),
        weight: 2.0.into(),
    })
    .await
    .unwrap();
    // Same kind, different timestamp: a different key.
    db.put(&Event {
        kind: "login".into(),
        at: Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap().into(),
        weight: 1.0.into(),
    })
    .await
    .unwrap();

    assert_eq!(db.count(&Event::default()).await.unwrap(), 2);
    let updated = db
        .one(&Event {
            at: at.into(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(updated.weight.value(), Some(&2.0));
    assert_eq!(updated.at.value(), Some(&at));
}

#[tokio::test]
async fn create_with_unique_overrides_the_declared_keys() {
    record! {
        struct Color {
            table = "color";
            name: Field<String>,
            hex: Field<String>,
        }
    }

    let db = store().await;
    db.table::<Color>()
        .create_with_unique(&[&["name"]])
        .await
        .unwrap();

    db.put(&Color {
        name: "red".into(),
        hex: "#f00".into(),
    })
    .await
    .unwrap();
    db.put(&Color {
        name: "red".into(),
        hex: "#ff0000".into(),
    })
    .await
    .unwrap();

    assert_eq!(db.count(&Color::default()).await.unwrap(), 1);
}

#[tokio::test]
async fn create_with_unique_rejects_unknown_columns() {
    let db = store().await;
    let err = db
        .table::<User>()
        .create_with_unique(&[&["no_such_column"]])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Schema(_)));
}

#[tokio::test]
async fn conflicting_column_types_on_a_shared_table_are_rejected() {
    record! {
        struct AgeAsText {
            table = "user";
            age: Field<String>,
        }
    }

    let db = store().await;
    db.create::<User>().await.unwrap();
    let err = db.create::<AgeAsText>().await.unwrap_err();
    assert!(matches!(err, Error::Schema(_)));
}

#[tokio::test]
async fn a_second_type_bound_to_the_same_table_extends_its_columns() {
    record! {
        struct UserNote {
            table = "user";
            email: Field<String>,
            note: Field<String>,
        }
    }

    let db = store().await;
    db.create::<User>().await.unwrap();
    db.create::<UserNote>().await.unwrap();

    db.put(&user("a@example.com", "Alice", 30)).await.unwrap();
    db.table_named::<UserNote>("user")
        .filter(&UserNote {
            email: "a@example.com".into(),
            ..Default::default()
        })
        .set(&UserNote {
            note: "prefers tea".into(),
            ..Default::default()
        })
        .await
        .unwrap();

    let view = db
        .one(&UserNote {
            email: "a@example.com".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(view.note.value(), Some(&"prefers tea".to_string()));
}

#[tokio::test]
async fn create_drop_discards_existing_rows() {
    let db = store().await;
    db.create::<User>().await.unwrap();
    db.put(&user("a@example.com", "Alice", 30)).await.unwrap();

    db.table::<User>().create_drop().await.unwrap();
    assert_eq!(db.count(&User::default()).await.unwrap(), 0);
}

#[tokio::test]
async fn rows_survive_reopening_a_file_backed_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("crud.db");

    {
        let db = Database::connect(&path).await.unwrap();
        db.create::<User>().await.unwrap();
        db.put(&user("a@example.com", "Alice", 30)).await.unwrap();
    }

    let db = Database::connect(&path).await.unwrap();
    db.create::<User>().await.unwrap();
    let alice = db
        .one(&User {
            email: "a@example.com".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(alice.name.value(), Some(&"Alice".to_string()));
}
