use std::path::{Path, PathBuf};

use async_trait::async_trait;
use daikin_dump_core::entities::TokenSet;
use daikin_dump_core::ports::TokenStore;
use daikin_dump_core::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

pub const TOKEN_FILE_NAME: &str = "tokenset.json";

/// Token set stored as JSON in the working directory
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(TOKEN_FILE_NAME),
        }
    }

    fn persistence_error(&self, reason: impl ToString) -> Error {
        Error::TokenPersistence {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }

    async fn write(&self, content: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);

        // Owner read/write only
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&self.path).await?;
        file.write_all(content).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    #[instrument(skip(self, token_set), fields(path = %self.path.display()))]
    async fn save(&self, token_set: &TokenSet) -> Result<(), Error> {
        let content = serde_json::to_vec(token_set).map_err(|e| self.persistence_error(e))?;

        self.write(&content)
            .await
            .map_err(|e| self.persistence_error(e))?;

        debug!(bytes = content.len(), "token set written");
        Ok(())
    }

    fn path(&self) -> &Path {
        &self.path
    }
}
