#![cfg(feature = "sqlite")]

use std::collections::HashMap;

use easy_sql::prelude::*;
use futures_util::TryStreamExt;
use serde::Deserialize;
use tokio::runtime::Runtime;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

async fn seeded() -> Result<Connection, EasySqlError> {
    let mut conn = Connection::connect(":memory:").await?;
    conn.run(
        "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT NOT NULL, score REAL)",
        (),
    )
    .await?;
    for (id, name, score) in [(1, "ann", 1.5), (2, "bob", 2.5), (3, "cyd", 3.5)] {
        conn.run("INSERT INTO t VALUES (?, ?, ?)", (id, name, score))
            .await?;
    }
    Ok(conn)
}

#[test]
fn single_column_rows_unwrap_to_scalars() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let rt = Runtime::new()?;
    rt.block_on(async {
        let mut conn = seeded().await?;

        let id = conn.one("SELECT id FROM t WHERE id = ?", 1).await?;
        assert_eq!(id, Some(TupleRow::Scalar(SqlValue::Int(1))));

        let record = conn
            .one_record("SELECT id FROM t WHERE id = ?", 1)
            .await?
            .expect("one row");
        assert_eq!(record.len(), 1);
        assert_eq!(record.attr("id")?, &SqlValue::Int(1));
        assert_eq!(record["id"], SqlValue::Int(1));

        let names = conn.all("SELECT name FROM t ORDER BY id", ()).await?;
        let names: Vec<_> = names.into_iter().filter_map(TupleRow::into_scalar).collect();
        assert_eq!(
            names,
            vec![
                SqlValue::Text("ann".into()),
                SqlValue::Text("bob".into()),
                SqlValue::Text("cyd".into())
            ]
        );

        conn.close().await?;
        Ok(())
    })
}

#[test]
fn multi_column_rows_stay_tuples() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let mut conn = Connection::connect(":memory:").await?;
        conn.run("CREATE TABLE pair (a INTEGER, b INTEGER)", ()).await?;

        let inserted = conn
            .one("INSERT INTO pair (a, b) VALUES (?, ?) RETURNING a, b", (1, 2))
            .await?;
        assert_eq!(
            inserted,
            Some(TupleRow::Tuple(vec![SqlValue::Int(1), SqlValue::Int(2)]))
        );

        let rows = conn.all_records("SELECT a, b FROM pair", ()).await?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].keys().collect::<Vec<_>>(), vec!["a", "b"]);

        conn.close().await?;
        Ok(())
    })
}

#[test]
fn one_is_none_unless_exactly_one_row() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let mut conn = seeded().await?;
        assert_eq!(conn.one("SELECT id FROM t WHERE id > 99", ()).await?, None);
        assert_eq!(conn.one("SELECT id FROM t", ()).await?, None);
        assert!(conn.one_record("SELECT id FROM t", ()).await?.is_none());
        assert_eq!(conn.one("UPDATE t SET score = 0 WHERE id = 1", ()).await?, None);
        assert!(conn.all("SELECT id FROM t WHERE id > 99", ()).await?.is_empty());
        conn.close().await?;
        Ok(())
    })
}

#[test]
fn iteration_is_lazy_ordered_and_fused() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let mut conn = seeded().await?;

        let mut iter = conn.iter("SELECT id, name FROM t ORDER BY id DESC", ()).await?;
        assert_eq!(iter.columns().as_slice(), ["id", "name"]);
        let mut ids = Vec::new();
        while let Some(row) = iter.try_next().await? {
            ids.push(row.as_tuple().expect("two columns")[0].clone());
        }
        assert_eq!(ids, vec![SqlValue::Int(3), SqlValue::Int(2), SqlValue::Int(1)]);
        assert!(iter.is_exhausted());
        assert!(iter.try_next().await?.is_none());
        drop(iter);

        let records: Vec<Record> = conn
            .iter_records("SELECT name FROM t WHERE id < ? ORDER BY id", 3)
            .await?
            .into_stream()
            .try_collect()
            .await?;
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].attr("name")?.as_text(), Some("bob"));

        // the connection is usable again once the iterator is gone
        conn.run("DELETE FROM t", ()).await?;
        conn.close().await?;
        Ok(())
    })
}

#[test]
fn every_call_style_binds() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let mut conn = seeded().await?;

        // f(1, 3)
        let rows = conn
            .all("SELECT id FROM t WHERE id IN (?, ?) ORDER BY id", args![1, 3])
            .await?;
        assert_eq!(rows.len(), 2);

        // f([1, 3])
        let rows = conn
            .all("SELECT id FROM t WHERE id IN (?, ?) ORDER BY id", vec![1, 3])
            .await?;
        assert_eq!(rows.len(), 2);

        // f({"name": "bob"})
        let mut map = HashMap::new();
        map.insert("name", "bob");
        let id = conn.one("SELECT id FROM t WHERE name = :name", map).await?;
        assert_eq!(id, Some(TupleRow::Scalar(SqlValue::Int(2))));

        // f(lo=1, hi=2)
        let rows = conn
            .all("SELECT id FROM t WHERE id BETWEEN :lo AND @hi", args![lo = 1, hi = 2])
            .await?;
        assert_eq!(rows.len(), 2);

        // f(1, hi=3)
        let pair = conn.one("SELECT ?1, $hi", args![1, hi = 3]).await?;
        assert_eq!(
            pair,
            Some(TupleRow::Tuple(vec![SqlValue::Int(1), SqlValue::Int(3)]))
        );

        // builder form with an explicit NULL
        let null = conn
            .one("SELECT ? IS NULL", Args::new().arg(None::<i64>))
            .await?;
        assert_eq!(null, Some(TupleRow::Scalar(SqlValue::Int(1))));

        conn.close().await?;
        Ok(())
    })
}

#[test]
fn argument_errors_surface_before_execution() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let mut conn = seeded().await?;

        let err = conn
            .one("SELECT ?", args![vec![1, 2], 3])
            .await
            .unwrap_err();
        assert!(matches!(err, EasySqlError::ParameterError(_)));

        let err = conn.one("SELECT ?, ?", 1).await.unwrap_err();
        assert!(err.is_driver_error());

        let err = conn
            .one("SELECT :a, :b", args![a = 1])
            .await
            .unwrap_err();
        assert!(matches!(err, EasySqlError::ParameterError(_)));

        conn.close().await?;
        Ok(())
    })
}

#[test]
fn driver_errors_propagate_unchanged() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let mut conn = seeded().await?;
        let err = conn
            .run("INSERT INTO t (id, name) VALUES (?, ?)", (1, "dup"))
            .await
            .unwrap_err();
        match err {
            EasySqlError::SqliteError(rusqlite::Error::SqliteFailure(e, _)) => {
                assert_eq!(e.code, rusqlite::ErrorCode::ConstraintViolation);
            }
            other => panic!("expected a constraint violation, got {other:?}"),
        }

        let err = conn.run("SELEC 1", ()).await.unwrap_err();
        assert!(matches!(err, EasySqlError::SqliteError(_)));

        conn.close().await?;
        Ok(())
    })
}

#[test]
fn values_round_trip_through_sqlite_storage() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let mut conn = Connection::connect(":memory:").await?;
        conn.run(
            "CREATE TABLE v (flag BOOLEAN, at TEXT, doc TEXT, raw BLOB, missing TEXT)",
            (),
        )
        .await?;

        let at = chrono::NaiveDate::from_ymd_opt(2024, 5, 6)
            .and_then(|d| d.and_hms_opt(7, 8, 9))
            .expect("valid timestamp");
        conn.run(
            "INSERT INTO v VALUES (?, ?, ?, ?, ?)",
            (
                true,
                at,
                serde_json::json!({"k": [1, 2]}),
                SqlValue::Blob(vec![0, 255]),
                None::<String>,
            ),
        )
        .await?;

        let row = conn
            .one_record("SELECT flag, at, doc, raw, missing FROM v", ())
            .await?
            .expect("one row");
        assert_eq!(row.attr("flag")?.as_bool(), Some(&true));
        assert_eq!(row.attr("at")?.as_timestamp(), Some(at));
        assert_eq!(row.attr("doc")?.as_text(), Some(r#"{"k":[1,2]}"#));
        assert_eq!(row.attr("raw")?.as_blob(), Some(&[0_u8, 255][..]));
        assert!(row.attr("missing")?.is_null());

        conn.close().await?;
        Ok(())
    })
}

#[derive(Debug, Deserialize, PartialEq)]
struct Player {
    id: i64,
    name: String,
    score: f64,
}

#[test]
fn records_deserialize_into_structs() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let mut conn = seeded().await?;
        let players: Vec<Player> = conn
            .all_records("SELECT id, name, score FROM t ORDER BY id", ())
            .await?
            .iter()
            .map(Record::deserialize)
            .collect::<Result<_, _>>()?;
        assert_eq!(
            players[1],
            Player {
                id: 2,
                name: "bob".into(),
                score: 2.5
            }
        );
        conn.close().await?;
        Ok(())
    })
}

#[test]
fn raw_cursor_reports_rows_affected() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let mut conn = seeded().await?;
        {
            let mut cursor = conn.cursor("UPDATE t SET score = 0 WHERE id >= ?", 2).await?;
            assert_eq!(cursor.rows_affected(), Some(2));
            assert!(cursor.columns().is_empty());
            assert!(cursor.next_row().await?.is_none());
        }

        let fetched = conn
            .execute::<AsRecord>("SELECT count(*) AS n FROM t WHERE score = 0", FetchMode::All, ())
            .await?;
        let rows = fetched.into_all();
        assert_eq!(rows[0].attr("n")?, &SqlValue::Int(2));

        assert!(
            conn.execute::<AsTuple>("SELECT 1", FetchMode::None, ())
                .await?
                .is_none()
        );
        conn.close().await?;
        Ok(())
    })
}

const FAILS_ON_THIRD_ROW: &str =
    "SELECT CASE WHEN id = 3 THEN abs(-9223372036854775808) ELSE id END FROM t ORDER BY id";

#[test]
fn iteration_steps_the_statement_row_by_row() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let mut conn = seeded().await?;

        let mut iter = conn.iter(FAILS_ON_THIRD_ROW, ()).await?;
        assert_eq!(iter.try_next().await?, Some(TupleRow::Scalar(SqlValue::Int(1))));
        assert_eq!(iter.try_next().await?, Some(TupleRow::Scalar(SqlValue::Int(2))));
        let err = iter.try_next().await.unwrap_err();
        assert!(matches!(err, EasySqlError::SqliteError(_)));
        assert!(iter.is_exhausted());
        assert!(iter.try_next().await?.is_none());
        drop(iter);

        // fetching one row never reaches the failing one
        let first = conn
            .iter(FAILS_ON_THIRD_ROW, ())
            .await?
            .try_next()
            .await?;
        assert_eq!(first, Some(TupleRow::Scalar(SqlValue::Int(1))));

        // running it to the end still reports the error
        let err = conn.run(FAILS_ON_THIRD_ROW, ()).await.unwrap_err();
        assert!(err.is_driver_error());

        conn.close().await?;
        Ok(())
    })
}

#[test]
fn abandoned_iterator_releases_the_connection() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let mut conn = seeded().await?;
        {
            let mut iter = conn.iter_records("SELECT id, name FROM t ORDER BY id", ()).await?;
            let first = iter.try_next().await?.expect("first row");
            assert_eq!(first.attr("name")?.as_text(), Some("ann"));
        }

        let mut cursor = conn.cursor("UPDATE t SET score = ?", 0.0).await?;
        assert_eq!(cursor.rows_affected(), Some(3));
        cursor.drain().await?;
        drop(cursor);

        let mut cursor = conn
            .cursor("UPDATE t SET score = 1 WHERE id < 3 RETURNING id", ())
            .await?;
        assert_eq!(cursor.columns().as_slice(), ["id"]);
        cursor.drain().await?;
        assert_eq!(cursor.rows_affected(), Some(2));
        drop(cursor);

        conn.close().await?;
        Ok(())
    })
}
