//! End-to-end load tests against PostgreSQL
//!
//! Require Docker. Run with:
//! ```bash
//! cargo test -p jrdb-ingest --test load_tests -- --ignored
//! ```

mod common;

use anyhow::Result;
use chrono::NaiveDate;
use common::{
    ingest, ingest_with, init_tracing, kyi_line, ukc_line, write_file, SedLine, TestPostgres,
};
use jrdb_ingest::config::LoadConfig;
use jrdb_ingest::entity::EntityKind;
use jrdb_ingest::loader::{EntityLoadOutcome, LoadStatus};
use jrdb_ingest::pipeline::FileOutcome;
use sqlx::PgPool;
use uuid::Uuid;

fn sed_lines(race: u32, horses: &[&str]) -> Vec<Vec<u8>> {
    horses
        .iter()
        .enumerate()
        .map(|(i, pedigree)| {
            SedLine {
                race,
                contender: i as u32 + 1,
                pedigree,
                ..Default::default()
            }
            .build()
        })
        .collect()
}

fn entity(outcome: &FileOutcome, kind: EntityKind) -> &EntityLoadOutcome {
    outcome
        .load
        .entities
        .iter()
        .find(|o| o.entity == kind)
        .unwrap()
}

fn fast_retry(attempts: u32) -> LoadConfig {
    LoadConfig {
        upsert_max_attempts: attempts,
        retry_backoff_ms: 1,
        ..LoadConfig::default()
    }
}

/// Make inserts into `horses` fail with a serialization failure. The
/// sequence survives savepoint rollbacks, so `failures` counts attempts.
async fn fail_horse_inserts(pool: &PgPool, failures: Option<i64>) -> Result<()> {
    let condition = match failures {
        Some(n) => format!("nextval('horse_conflicts') <= {}", n),
        None => "nextval('horse_conflicts') > 0".to_string(),
    };
    sqlx::raw_sql(&format!(
        "CREATE SEQUENCE horse_conflicts;
         CREATE FUNCTION raise_horse_conflict() RETURNS trigger AS $$
         BEGIN
             IF {} THEN
                 RAISE EXCEPTION 'simulated serialization failure' USING ERRCODE = '40001';
             END IF;
             RETURN NULL;
         END;
         $$ LANGUAGE plpgsql;
         CREATE TRIGGER horses_conflict BEFORE INSERT ON horses
             FOR EACH STATEMENT EXECUTE FUNCTION raise_horse_conflict();",
        condition
    ))
    .execute(pool)
    .await?;
    Ok(())
}

async fn conflict_attempts(pool: &PgPool) -> Result<i64> {
    let value: i64 = sqlx::query_scalar("SELECT last_value FROM horse_conflicts")
        .fetch_one(pool)
        .await?;
    Ok(value)
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_results_file_builds_the_race_hierarchy() -> Result<()> {
    init_tracing();
    let pg = TestPostgres::start().await?;
    let dir = tempfile::tempdir()?;

    let path = write_file(dir.path(), "SED080126.txt", &sed_lines(1, &["00101001", "00101002"]))?;
    let outcome = ingest(pg.pool(), &path).await?;

    assert!(outcome.is_success());
    assert_eq!(pg.count("programs").await?, 1);
    assert_eq!(pg.count("races").await?, 1);
    assert_eq!(pg.count("horses").await?, 2);
    assert_eq!(pg.count("contenders").await?, 2);

    let (venue, held_on): (String, Option<NaiveDate>) = sqlx::query_as(
        "SELECT v.code, p.held_on FROM programs p JOIN venues v ON v.id = p.venue_id",
    )
    .fetch_one(pg.pool())
    .await?;
    assert_eq!(venue, "01");
    assert_eq!(held_on, NaiveDate::from_ymd_opt(2008, 1, 26));

    let linked: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM contenders c
         JOIN races r ON r.id = c.race_id
         JOIN horses h ON h.id = c.horse_id
         WHERE r.num = 1 AND c.finish_time = 94.5",
    )
    .fetch_one(pg.pool())
    .await?;
    assert_eq!(linked, 2);

    Ok(())
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_reloading_a_file_changes_nothing() -> Result<()> {
    init_tracing();
    let pg = TestPostgres::start().await?;
    let dir = tempfile::tempdir()?;
    let path = write_file(dir.path(), "SED080126.txt", &sed_lines(1, &["00101001", "00101002"]))?;

    ingest(pg.pool(), &path).await?;
    let before: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM contenders ORDER BY num")
        .fetch_all(pg.pool())
        .await?;

    let outcome = ingest(pg.pool(), &path).await?;
    let after: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM contenders ORDER BY num")
        .fetch_all(pg.pool())
        .await?;

    assert!(outcome.is_success());
    assert_eq!(before, after);
    assert_eq!(pg.count("programs").await?, 1);
    assert_eq!(pg.count("races").await?, 1);
    assert_eq!(pg.count("horses").await?, 2);

    Ok(())
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_older_horse_data_never_overwrites_newer() -> Result<()> {
    init_tracing();
    let pg = TestPostgres::start().await?;
    let dir = tempfile::tempdir()?;

    let newer = write_file(
        dir.path(),
        "UKC080201.txt",
        &[ukc_line("00101001", "Newer", "20080201")],
    )?;
    let older = write_file(
        dir.path(),
        "UKC080101.txt",
        &[ukc_line("00101001", "Older", "20080101")],
    )?;
    let undated = write_file(
        dir.path(),
        "UKC000000.txt",
        &[ukc_line("00101001", "Undated", "        ")],
    )?;

    ingest(pg.pool(), &newer).await?;
    ingest(pg.pool(), &older).await?;
    ingest(pg.pool(), &undated).await?;

    let (name, as_of): (String, NaiveDate) =
        sqlx::query_as("SELECT name, data_as_of FROM horses WHERE pedigree_reg_num = '00101001'")
            .fetch_one(pg.pool())
            .await?;
    assert_eq!(name, "Newer");
    assert_eq!(as_of, NaiveDate::from_ymd_opt(2008, 2, 1).unwrap());

    let latest = write_file(
        dir.path(),
        "UKC080301.txt",
        &[ukc_line("00101001", "Latest", "20080301")],
    )?;
    ingest(pg.pool(), &latest).await?;
    let name: String = sqlx::query_scalar("SELECT name FROM horses")
        .fetch_one(pg.pool())
        .await?;
    assert_eq!(name, "Latest");

    Ok(())
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_duplicate_keys_in_one_file_keep_the_last_line() -> Result<()> {
    init_tracing();
    let pg = TestPostgres::start().await?;
    let dir = tempfile::tempdir()?;

    let path = write_file(
        dir.path(),
        "UKC080126.txt",
        &[
            ukc_line("00101001", "First", "20080126"),
            ukc_line("00101002", "Other", "20080126"),
            ukc_line("00101001", "Second", "20080126"),
        ],
    )?;
    let outcome = ingest(pg.pool(), &path).await?;

    let horses = outcome
        .load
        .entities
        .iter()
        .find(|o| o.entity == EntityKind::Horse)
        .unwrap();
    assert_eq!(horses.duplicates_dropped, 1);
    assert_eq!(horses.written, 2);

    let name: String =
        sqlx::query_scalar("SELECT name FROM horses WHERE pedigree_reg_num = '00101001'")
            .fetch_one(pg.pool())
            .await?;
    assert_eq!(name, "Second");

    Ok(())
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_rows_without_a_parent_are_skipped() -> Result<()> {
    init_tracing();
    let pg = TestPostgres::start().await?;
    let dir = tempfile::tempdir()?;

    // Venue 99 is not a known venue, so its program cannot be keyed
    let mut lines = sed_lines(1, &["00101001"]);
    lines.push(
        SedLine {
            venue: "99",
            race: 2,
            pedigree: "00101002",
            ..Default::default()
        }
        .build(),
    );
    let path = write_file(dir.path(), "SED080126.txt", &lines)?;
    let outcome = ingest(pg.pool(), &path).await?;

    assert!(outcome.is_success());
    assert_eq!(outcome.transform.unresolved_references, 1);

    let races = outcome
        .load
        .entities
        .iter()
        .find(|o| o.entity == EntityKind::Race)
        .unwrap();
    assert_eq!(races.skipped_missing_parent, 1);
    assert_eq!(races.status, LoadStatus::Loaded);

    assert_eq!(pg.count("races").await?, 1);
    assert_eq!(pg.count("contenders").await?, 1);
    // The horse has no parent and is still recorded
    assert_eq!(pg.count("horses").await?, 2);

    let orphans: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM contenders c
         LEFT JOIN races r ON r.id = c.race_id
         WHERE r.id IS NULL",
    )
    .fetch_one(pg.pool())
    .await?;
    assert_eq!(orphans, 0);

    Ok(())
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_optional_links_survive_files_that_lack_them() -> Result<()> {
    init_tracing();
    let pg = TestPostgres::start().await?;
    let dir = tempfile::tempdir()?;

    let kyi = write_file(
        dir.path(),
        "KYI080126.txt",
        &[kyi_line(1, 1, "00101001", "01001", "10001")],
    )?;
    let outcome = ingest(pg.pool(), &kyi).await?;
    assert!(outcome.is_success());
    assert_eq!(pg.count("jockeys").await?, 1);
    assert_eq!(pg.count("trainers").await?, 1);

    // Results carry no jockey or trainer columns
    let sed = write_file(dir.path(), "SED080126.txt", &sed_lines(1, &["00101001"]))?;
    ingest(pg.pool(), &sed).await?;

    let (jockey, trainer, finish): (Option<String>, Option<String>, Option<i64>) = sqlx::query_as(
        "SELECT j.code, t.code, c.finish_position FROM contenders c
         LEFT JOIN jockeys j ON j.id = c.jockey_id
         LEFT JOIN trainers t ON t.id = c.trainer_id",
    )
    .fetch_one(pg.pool())
    .await?;
    assert_eq!(jockey.as_deref(), Some("01001"));
    assert_eq!(trainer.as_deref(), Some("10001"));
    assert_eq!(finish, Some(1));

    Ok(())
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_concurrent_files_sharing_rows_both_load() -> Result<()> {
    init_tracing();
    let pg = TestPostgres::start().await?;
    let dir = tempfile::tempdir()?;

    // Same program, horses, jockeys and trainers, different races
    let first: Vec<Vec<u8>> = (1..=8)
        .map(|n| kyi_line(1, n, &format!("001010{:02}", n), "01001", "10001"))
        .collect();
    let second: Vec<Vec<u8>> = (1..=8)
        .map(|n| kyi_line(2, n, &format!("001010{:02}", 9 - n), "01001", "10001"))
        .collect();
    let a = write_file(dir.path(), "KYI080126.txt", &first)?;
    let b = write_file(dir.path(), "KYI080127.txt", &second)?;

    let (left, right) = tokio::join!(ingest(pg.pool(), &a), ingest(pg.pool(), &b));
    assert!(left?.is_success());
    assert!(right?.is_success());

    assert_eq!(pg.count("programs").await?, 1);
    assert_eq!(pg.count("races").await?, 2);
    assert_eq!(pg.count("horses").await?, 8);
    assert_eq!(pg.count("jockeys").await?, 1);
    assert_eq!(pg.count("contenders").await?, 16);

    Ok(())
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_odds_are_stored_as_arrays() -> Result<()> {
    init_tracing();
    let pg = TestPostgres::start().await?;
    let dir = tempfile::tempdir()?;

    let bac = common::LineBuilder::new(85)
        .put(1, &common::race_key("01", 8, 1, "1", 11))
        .put(9, "20080126")
        .put(85, "1")
        .build();
    let oz = common::LineBuilder::new(190)
        .put(1, &common::race_key("01", 8, 1, "1", 11))
        .put(9, "02")
        .put(11, "0001500230")
        .put(101, "0001100120")
        .build();

    ingest(pg.pool(), &write_file(dir.path(), "BAC080126.txt", &[bac])?).await?;
    let outcome = ingest(pg.pool(), &write_file(dir.path(), "OZ080126.txt", &[oz])?).await?;
    assert!(outcome.is_success());

    let (win, place): (Vec<Option<f64>>, Vec<Option<f64>>) =
        sqlx::query_as("SELECT win_odds, place_odds FROM races WHERE num = 11")
            .fetch_one(pg.pool())
            .await?;
    assert_eq!(win.len(), 18);
    assert_eq!(&win[..3], &[Some(1.5), Some(23.0), None]);
    assert_eq!(&place[..3], &[Some(1.1), Some(1.2), None]);

    Ok(())
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_persistent_conflict_fails_only_that_batch() -> Result<()> {
    init_tracing();
    let pg = TestPostgres::start().await?;
    let dir = tempfile::tempdir()?;
    fail_horse_inserts(pg.pool(), None).await?;

    let path = write_file(dir.path(), "SED080126.txt", &sed_lines(1, &["00101001", "00101002"]))?;
    let outcome = ingest_with(pg.pool(), &path, &fast_retry(3)).await?;

    assert!(!outcome.is_success());
    let horses = entity(&outcome, EntityKind::Horse);
    assert_eq!(horses.status, LoadStatus::Failed);
    assert_eq!(horses.attempts, 3);
    assert!(horses.error.as_deref().unwrap().contains("after 3 attempts"));
    assert_eq!(conflict_attempts(pg.pool()).await?, 3);

    // Earlier batches committed, contenders lost their parent
    assert_eq!(entity(&outcome, EntityKind::Program).status, LoadStatus::Loaded);
    assert_eq!(entity(&outcome, EntityKind::Race).status, LoadStatus::Loaded);
    let contenders = entity(&outcome, EntityKind::Contender);
    assert_eq!(contenders.skipped_missing_parent, 2);
    assert_eq!(contenders.status, LoadStatus::Empty);

    assert_eq!(pg.count("programs").await?, 1);
    assert_eq!(pg.count("races").await?, 1);
    assert_eq!(pg.count("horses").await?, 0);
    assert_eq!(pg.count("contenders").await?, 0);

    Ok(())
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_transient_conflict_succeeds_on_retry() -> Result<()> {
    init_tracing();
    let pg = TestPostgres::start().await?;
    let dir = tempfile::tempdir()?;
    fail_horse_inserts(pg.pool(), Some(1)).await?;

    let path = write_file(dir.path(), "SED080126.txt", &sed_lines(1, &["00101001", "00101002"]))?;
    let outcome = ingest_with(pg.pool(), &path, &fast_retry(3)).await?;

    assert!(outcome.is_success());
    let horses = entity(&outcome, EntityKind::Horse);
    assert_eq!(horses.status, LoadStatus::Loaded);
    assert_eq!(horses.attempts, 2);
    assert_eq!(entity(&outcome, EntityKind::Program).attempts, 1);

    assert_eq!(pg.count("horses").await?, 2);
    assert_eq!(pg.count("contenders").await?, 2);

    Ok(())
}
