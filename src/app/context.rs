//! Shared state built once from CLI arguments and the config file.

use anyhow::{Context, Result};
use reqwest::Client;
use timeshift_core::{Endpoints, FileSessionStore, NicoClient, Notifier, build_http_client};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::app_config::{AppConfig, load_file_config};
use crate::cli::Args;

pub(crate) struct RunContext {
    pub(crate) config: AppConfig,
    pub(crate) http: Client,
    pub(crate) notifier: Notifier,
    pub(crate) cancel: CancellationToken,
}

impl RunContext {
    pub(crate) fn build(args: &Args, cancel: CancellationToken) -> Result<Self> {
        let file_config = load_file_config(args.config.as_deref())?;
        let config = AppConfig::resolve(file_config, args.data_dir.clone())?;
        debug!(
            data_dir = %config.data_dir.display(),
            recorder = %config.recorder_path.display(),
            notifications = config.webhook_url.is_some(),
            "Configuration resolved"
        );

        std::fs::create_dir_all(&config.data_dir).with_context(|| {
            format!(
                "Failed to create data directory '{}'",
                config.data_dir.display()
            )
        })?;

        let http = build_http_client(config.timeouts)?;
        let notifier = match &config.webhook_url {
            Some(url) => Notifier::webhook(url.clone(), http.clone()),
            None => Notifier::disabled(),
        };

        Ok(Self {
            config,
            http,
            notifier,
            cancel,
        })
    }

    /// Client with no session bound yet.
    pub(crate) fn client(&self) -> NicoClient {
        NicoClient::new(self.http.clone(), Endpoints::default())
    }

    pub(crate) fn session_store(&self) -> FileSessionStore {
        FileSessionStore::new(self.config.session_file())
    }

    /// Logs in (or reuses the cached session) and binds it to a client.
    pub(crate) async fn authenticated_client(&self) -> Result<NicoClient> {
        let client = self.client();
        let session = client
            .open_session(&self.session_store(), &self.config.credentials)
            .await?;
        Ok(client.with_session(session))
    }
}
