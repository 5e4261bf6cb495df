//! Nested and list-valued fields: shared authors across books, reference
//! counting, and a record mixing single and list relations.
//!
//! Run with: cargo run --example books

use rowstash::prelude::*;
use sqlx::Row;

record! {
    pub struct Author {
        table = "author";
        unique = [name];
        name: Field<String>,
    }
}

record! {
    pub struct Book {
        table = "book";
        unique = [title];
        title: Field<String>,
        authors: Many<Author>,
    }
}

record! {
    pub struct Team {
        table = "team";
        unique = [name];
        name: Field<String>,
    }
}

record! {
    pub struct Matchup {
        table = "matchup";
        home: Nested<Team>,
        away: Nested<Team>,
        alternates: Many<Team>,
    }
}

fn author(name: &str) -> Author {
    Author { name: name.into() }
}

fn team(name: &str) -> Team {
    Team { name: name.into() }
}

async fn dump(db: &Database, sql: &str) -> anyhow::Result<()> {
    for row in sqlx::query(sql).fetch_all(db.pool()).await? {
        let cells: Vec<String> = (0..row.len())
            .map(|i| row.try_get::<String, _>(i).unwrap_or_else(|_| "?".into()))
            .collect();
        println!("  {}", cells.join(" | "));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let db = Database::in_memory().await?;

    println!("---- create (referenced tables come along)");
    db.create::<Book>().await?;
    println!("author exists: {}", db.table::<Author>().exists().await?);

    println!("---- put books with shared authors");
    db.put(&Book {
        title: "Book 1".into(),
        authors: vec![author("Alice"), author("Bob")].into(),
    })
    .await?;
    db.put(&Book {
        title: "Book 2".into(),
        authors: vec![author("Bob"), author("Charlie")].into(),
    })
    .await?;

    println!("author rows (Bob is stored once):");
    dump(&db, "SELECT name FROM author ORDER BY name").await?;
    println!("link rows:");
    dump(
        &db,
        "SELECT parent_table, parent_key, field_name, child_key FROM _links \
         WHERE parent_table = 'book' ORDER BY parent_key, seq",
    )
    .await?;

    println!("---- hydrate");
    for book in db.table::<Book>().order_by("title", SortOrder::Asc).all().await? {
        let names: Vec<_> = book
            .authors
            .items()
            .unwrap_or_default()
            .iter()
            .filter_map(|a| a.name.value())
            .collect();
        println!("{:?} by {names:?}", book.title.value());
    }

    println!("---- replace Bob with David on Book 1");
    db.put(&Book {
        title: "Book 1".into(),
        authors: vec![author("Alice"), author("David")].into(),
    })
    .await?;
    println!("author rows (Bob survives through Book 2):");
    dump(&db, "SELECT name FROM author ORDER BY name").await?;

    println!("---- delete Book 2 (its last-referenced authors go too)");
    db.delete(&Book {
        title: "Book 2".into(),
        ..Default::default()
    })
    .await?;
    dump(&db, "SELECT name FROM author ORDER BY name").await?;

    println!("---- mixed single and list relations");
    db.create::<Matchup>().await?;
    db.put(&Matchup {
        home: team("Falcons").into(),
        away: team("Wolves").into(),
        alternates: vec![team("Owls"), team("Bulls")].into(),
    })
    .await?;
    let saved = db.one(&Matchup::default()).await?;
    println!("home: {:?}", saved.home.value().and_then(|t| t.name.value()));
    println!("away: {:?}", saved.away.value().and_then(|t| t.name.value()));
    println!(
        "alternates: {:?}",
        saved
            .alternates
            .items()
            .unwrap_or_default()
            .iter()
            .filter_map(|t| t.name.value())
            .collect::<Vec<_>>()
    );

    Ok(())
}
