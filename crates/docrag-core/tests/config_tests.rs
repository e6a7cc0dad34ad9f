use figment::Jail;

use docrag_core::config::{Config, ContentType, Provider, RankingMode};
use docrag_core::types::SearchMode;

fn settings(config: &Config) -> Result<docrag_core::config::Settings, figment::Error> {
    config.settings().map_err(|e| figment::Error::from(e.to_string()))
}

#[test]
fn files_and_env_are_layered() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r#"
                provider = "managed"
                top_k = 3
                ranking_mode = "similarity"

                [managed]
                project_id = "acme"
                access_token = "from-file"
            "#,
        )?;
        jail.create_file("config.test.toml", "top_k = 4\n")?;
        jail.set_env("APP_MANAGED__ACCESS_TOKEN", "from-env");
        jail.set_env("APP_USE_FAKE_EMBEDDINGS", "1");

        let s = settings(&Config::for_env("test"))?;
        assert_eq!(s.provider, Provider::Managed);
        assert_eq!(s.top_k, 4);
        assert_eq!(s.ranking_mode, RankingMode::Similarity);
        assert_eq!(s.search_mode(), SearchMode::Similarity);
        assert_eq!(s.managed.project_id.as_deref(), Some("acme"));
        assert_eq!(s.managed.access_token.as_deref(), Some("from-env"));
        assert!(s.use_fake_embeddings);
        // untouched keys keep their defaults
        assert_eq!(s.chunk_size, 1000);
        assert_eq!(s.chunk_overlap, 200);
        Ok(())
    });
}

#[test]
fn remote_search_is_enabled_by_data_store() {
    Jail::expect_with(|jail| {
        jail.set_env("APP_REMOTE_SEARCH__DATA_STORE_ID", "handbook-store");
        jail.set_env("APP_REMOTE_SEARCH__CONTENT_TYPE", "website");

        let s = settings(&Config::for_env("dev"))?;
        assert!(s.remote_search.is_enabled());
        assert_eq!(s.remote_search.content_type, ContentType::Website);
        assert_eq!(s.remote_search.location, "global");
        Ok(())
    });
}

#[test]
fn invalid_chunking_is_rejected() {
    Jail::expect_with(|jail| {
        jail.create_file("config.toml", "chunk_size = 100\nchunk_overlap = 150\n")?;
        let err = Config::for_env("prod").settings().unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
        Ok(())
    });
}

#[test]
fn relative_paths_resolve_against_working_dir() {
    Jail::expect_with(|jail| {
        jail.set_env("APP_PERSIST_LOCATION", "store/index");
        let s = settings(&Config::for_env("dev"))?;
        let expected = std::env::current_dir().unwrap().join("store/index");
        assert_eq!(s.persist_path(), expected);
        Ok(())
    });
}
