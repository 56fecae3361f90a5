use std::{fmt, path::PathBuf};

use anyhow::Context;
use base64::{engine::general_purpose::STANDARD, Engine};

use crate::common::ImportError;

/// Which TDS deployment to talk to. Each reads its own `TDS_<SITE>_*` settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Site {
    Live,
    Test,
}

impl Site {
    pub fn from_flag(live_site: bool) -> Self {
        if live_site {
            Site::Live
        } else {
            Site::Test
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            Site::Live => "TDS_LIVE",
            Site::Test => "TDS_TEST",
        }
    }
}

#[derive(Clone)]
pub struct SiteCredentials {
    pub base_url: String,
    pub username: String,
    pub password: String,
}

impl SiteCredentials {
    /// Reads the three settings for `site` through `lookup`.
    pub fn resolve<F>(site: Site, lookup: F) -> Result<Self, ImportError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |suffix: &str| {
            let key = format!("{}_{}", site.prefix(), suffix);
            lookup(key.as_str()).ok_or(ImportError::MissingSetting(key))
        };
        Ok(SiteCredentials {
            base_url: get("BASE_URL")?,
            username: get("ACCESS_USERNAME")?,
            password: get("ACCESS_PASSWORD")?,
        })
    }

    pub fn from_env(site: Site) -> Result<Self, ImportError> {
        Self::resolve(site, |key| std::env::var(key).ok())
    }

    /// Value for the `Authorization` header.
    pub fn authorization(&self) -> String {
        format!("Basic {}", basic_auth_credential(&self.username, &self.password))
    }
}

// never print the password
impl fmt::Debug for SiteCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SiteCredentials")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Loads `.env` from the working directory or its parents. A missing file is
/// fine; one that can't be read or parsed is an error.
pub fn load_env_file() -> anyhow::Result<Option<PathBuf>> {
    env_file_outcome(dotenvy::dotenv())
}

fn env_file_outcome(result: dotenvy::Result<PathBuf>) -> anyhow::Result<Option<PathBuf>> {
    match result {
        Ok(path) => Ok(Some(path)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(e).context("failed to load .env"),
    }
}

/// Base64 of `username:password` with the last two characters replaced by `==`.
///
/// TDS expects exactly this, whatever the real padding would have been.
pub fn basic_auth_credential(username: &str, password: &str) -> String {
    let encoded = STANDARD.encode(format!("{username}:{password}"));
    // ":" alone encodes to 4 characters, so there are always at least two to cut
    format!("{}==", &encoded[..encoded.len() - 2])
}
