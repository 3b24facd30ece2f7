use std::path::Path;

use ::config as config_rs;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

/// Loads a flat settings struct straight from the process environment.
///
/// Keys are matched case-insensitively against field names, so `JWT_SECRET`
/// fills `jwt_secret`. Variables that match no field are ignored.
pub trait EnvConfig: Sized + DeserializeOwned {
    fn load_dotenv() {
        // Load .env from crate root (falls back to current dir if missing)
        let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
        let _ = dotenvy::from_filename(manifest_dir.join(".env")).or_else(|_| dotenvy::dotenv());
    }

    fn from_env() -> Result<Self> {
        Self::load_dotenv();
        Self::from_source(config_rs::Environment::default().try_parsing(true))
    }

    fn from_source<S>(source: S) -> Result<Self>
    where
        S: config_rs::Source + Send + Sync + 'static,
    {
        let settings = config_rs::Config::builder()
            .add_source(source)
            .build()
            .context("failed to read environment variables for config")?;

        settings
            .try_deserialize::<Self>()
            .context("failed to deserialize environment into config")
    }
}
