use std::{path::PathBuf, sync::Arc, time::Duration};

use {
    batchcast_channels::{Allowlist, ChannelTransport},
    batchcast_config::{BatchcastConfig, RateLimitPolicy},
};

use crate::{acquire::Fetcher, publish::Publisher};

/// Settings every session reads; derived once from the loaded config.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub allowlist: Allowlist,
    pub attribution: String,
    pub default_label: String,
    pub prompt_timeout: Duration,
    pub work_dir: PathBuf,
    pub rate_limit_policy: RateLimitPolicy,
    pub remove_abandoned_artifacts: bool,
    pub thumbnail: Option<PathBuf>,
}

impl PipelineSettings {
    pub fn from_config(config: &BatchcastConfig) -> Self {
        Self {
            allowlist: Allowlist::new(config.telegram.allowlist.iter().cloned()),
            attribution: config.batch.attribution.clone(),
            default_label: config.batch.default_label.clone(),
            prompt_timeout: Duration::from_secs(config.batch.prompt_timeout_secs),
            work_dir: config.fetcher.work_dir.clone(),
            rate_limit_policy: config.batch.rate_limit_policy,
            remove_abandoned_artifacts: config.batch.remove_abandoned_artifacts,
            thumbnail: config.batch.thumbnail.clone(),
        }
    }
}

/// Everything a session needs, passed explicitly instead of living in a global.
#[derive(Clone)]
pub struct PipelineContext {
    pub transport: Arc<dyn ChannelTransport>,
    pub fetcher: Arc<dyn Fetcher>,
    pub settings: Arc<PipelineSettings>,
}

impl PipelineContext {
    pub fn new(
        transport: Arc<dyn ChannelTransport>,
        fetcher: Arc<dyn Fetcher>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            transport,
            fetcher,
            settings: Arc::new(settings),
        }
    }

    pub fn publisher(&self) -> Publisher {
        Publisher {
            policy: self.settings.rate_limit_policy,
            remove_abandoned: self.settings.remove_abandoned_artifacts,
            thumbnail: self.settings.thumbnail.clone(),
        }
    }
}
