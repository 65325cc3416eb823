use std::env;
use std::path::PathBuf;

pub struct Config {
    pub database_url: String,
    pub start_url: Option<String>,
    pub data_dir: PathBuf,
}

impl Config {
    /// Connection parts and crawl settings come from the environment.
    /// Credentials are required; host and port default to a local instance.
    pub fn from_env() -> anyhow::Result<Self> {
        let user = env::var("PG_LOC_DB_USER")?;
        let password = env::var("PG_LOC_DB_PASS")?;
        let database = env::var("PG_LOC_DB_NAME")?;
        let host = env::var("PG_LOC_DB_HOST").unwrap_or_else(|_| "localhost".to_string());
        let port = env::var("PG_LOC_DB_PORT").unwrap_or_else(|_| "5432".to_string());

        Ok(Self {
            database_url: format!("postgres://{user}:{password}@{host}:{port}/{database}"),
            start_url: env::var("KV_START_URL").ok(),
            data_dir: env::var("KV_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data")),
        })
    }
}
