//! Bootstrap against a real Postgres database.
//!
//! Each test works in its own throwaway schema. Run with
//! `TEST_DATABASE_URL=... cargo test --features database -- --ignored`.

#[cfg(feature = "database")]
mod pg_tests {
    use std::str::FromStr;

    use anyhow::Result;
    use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
    use sqlx::PgPool;

    use scms_bootstrap::database::{DatabaseConfig, DatabaseManager, PgBootstrapStore};
    use scms_bootstrap::ports::{ProgramStore, SchemaStore, UserStore};
    use scms_bootstrap::seed::{SeedOutcome, SkipReason};
    use scms_bootstrap::{Bootstrap, BootstrapConfig};

    struct TestDb {
        admin: PgPool,
        pool: PgPool,
        schema: String,
    }

    impl TestDb {
        async fn new() -> Result<Self> {
            let url = test_url();
            let schema = format!(
                "scms_test_{}_{}",
                std::process::id(),
                chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
            );

            let admin = PgPool::connect(&url).await?;
            sqlx::query(&format!("CREATE SCHEMA \"{schema}\""))
                .execute(&admin)
                .await?;

            let options =
                PgConnectOptions::from_str(&url)?.options([("search_path", schema.as_str())]);
            let pool = PgPoolOptions::new()
                .max_connections(2)
                .connect_with(options)
                .await?;

            Ok(Self {
                admin,
                pool,
                schema,
            })
        }

        fn store(&self) -> PgBootstrapStore {
            PgBootstrapStore::new(self.pool.clone())
        }

        async fn cleanup(self) -> Result<()> {
            self.pool.close().await;
            sqlx::query(&format!("DROP SCHEMA \"{}\" CASCADE", self.schema))
                .execute(&self.admin)
                .await?;
            Ok(())
        }
    }

    fn test_url() -> String {
        std::env::var("TEST_DATABASE_URL")
            .or_else(|_| std::env::var("DATABASE_URL"))
            .unwrap_or_else(|_| "postgresql://localhost:5432/scms_test".into())
    }

    fn config() -> BootstrapConfig {
        BootstrapConfig {
            bcrypt_cost: 4,
            ..Default::default()
        }
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL"]
    async fn fresh_database_then_noop() -> Result<()> {
        let db = TestDb::new().await?;
        let store = db.store();
        let plan = Bootstrap::standard(&config())?;

        let first = plan.run(&store).await;
        assert!(first.is_clean(), "{first:#?}");
        assert_eq!(first.rows_inserted(), 9 + 50 + 11 + 3);
        assert_eq!(
            store.inspect_column("programs", "program_end_date").await?,
            Some(scms_bootstrap::ports::ColumnState { nullable: false })
        );

        let second = plan.run(&store).await;
        assert!(second.evolution.is_noop());
        assert_eq!(second.rows_inserted(), 0);

        db.cleanup().await
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL"]
    async fn stale_catalog_is_truncated_with_identity_reset() -> Result<()> {
        let db = TestDb::new().await?;
        let store = db.store();
        store.ensure_baseline().await?;
        for i in 0..50 {
            sqlx::query(
                "INSERT INTO programs (title, status, application_start_date, application_end_date) \
                 VALUES ($1, 'OPEN', '2024-02-01', '2024-02-15')",
            )
            .bind(format!("Legacy {i}"))
            .execute(&db.pool)
            .await?;
        }

        let run = Bootstrap::standard(&config())?.run(&store).await;

        assert_eq!(
            run.step("programs").map(|s| s.outcome.clone()),
            Some(SeedOutcome::Applied {
                inserted: 50,
                failed: 0,
                replaced: Some(50)
            })
        );
        let (min_id,) = sqlx::query_as::<_, (i64,)>("SELECT MIN(program_id) FROM programs")
            .fetch_one(&db.pool)
            .await?;
        assert_eq!(min_id, 1);
        assert!(
            store
                .has_program_marker(scms_bootstrap::model::ProgramStatus::Open, 2025)
                .await?
        );

        db.cleanup().await
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL"]
    async fn non_empty_users_table_is_left_alone() -> Result<()> {
        let db = TestDb::new().await?;
        let store = db.store();
        store.ensure_baseline().await?;
        sqlx::query(
            "INSERT INTO users (student_num, name, email, password, role) \
             VALUES (2023002, 'Existing', 'existing@scms.ac.kr', 'x', 'STUDENT')",
        )
        .execute(&db.pool)
        .await?;
        let run = Bootstrap::standard(&config())?.run(&store).await;
        assert_eq!(
            run.step("users").map(|s| s.outcome.clone()),
            Some(SeedOutcome::Skipped(SkipReason::AlreadySeeded { rows: 1 }))
        );
        assert_eq!(store.count_users().await?, 1);

        db.cleanup().await
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL"]
    async fn manager_checks_connectivity_on_startup() -> Result<()> {
        let config = BootstrapConfig {
            database_url: test_url(),
            ..config()
        };
        let db = DatabaseManager::new(DatabaseConfig::from(&config)).await?;
        db.test_connection().await?;
        db.close().await;
        Ok(())
    }
}
