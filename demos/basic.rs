//! Scalar CRUD walkthrough: tables, upserts, query-by-example, ordering.
//!
//! Run with: cargo run --example basic

use rowstash::prelude::*;

record! {
    pub struct Measurement {
        table = "measurement";
        unique = [probe];
        probe: Field<String>,
        reading: Field<f64>,
        label: Field<String>,
    }
}

// A second view over the same table, carrying only the columns it cares
// about.
record! {
    pub struct ProbeLabel {
        table = "measurement";
        probe: Field<String>,
        label: Field<String>,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let db = Database::in_memory().await?;

    println!("---- create table");
    let table = db.table::<Measurement>();
    table.create().await?;
    println!("exists: {}", table.exists().await?);

    println!("---- put (second write on the same probe replaces the first)");
    db.put(&Measurement {
        probe: "p-1".into(),
        reading: 3.2.into(),
        label: "good".into(),
    })
    .await?;
    db.put(&Measurement {
        probe: "p-2".into(),
        reading: 1.4.into(),
        label: "better".into(),
    })
    .await?;
    db.put(&Measurement {
        probe: "p-1".into(),
        reading: 9.9.into(),
        label: "replaced".into(),
    })
    .await?;
    for m in db.all(&Measurement::default()).await? {
        println!("{m:?}");
    }

    println!("---- query by example");
    let replaced = db
        .get(&Measurement {
            label: "replaced".into(),
            ..Default::default()
        })
        .await?;
    println!("{replaced:?}");

    println!("---- ordering and raw filters");
    for m in table.order_by("reading", SortOrder::Desc).all().await? {
        println!("{m:?}");
    }
    for m in table.filter_raw("label LIKE 'b%'").all().await? {
        println!("{m:?}");
    }

    println!("---- update only what is set");
    let matched = db
        .set(
            &Measurement {
                probe: "p-2".into(),
                ..Default::default()
            },
            &Measurement {
                label: "recalibrated".into(),
                ..Default::default()
            },
        )
        .await?;
    println!("matched {matched} row(s)");

    println!("---- a second record type bound to the same table");
    for view in db.all(&ProbeLabel::default()).await? {
        println!("{view:?}");
    }

    println!("---- delete");
    let removed = db
        .delete(&Measurement {
            probe: "p-1".into(),
            ..Default::default()
        })
        .await?;
    println!(
        "removed {removed}, remaining {}",
        db.count(&Measurement::default()).await?
    );

    Ok(())
}
