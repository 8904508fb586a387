//! Command-line configuration.
//!
//! Every flag has an `ICF_*` environment fallback so a `.env` file can hold
//! a whole run's settings.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use icf_extraction::{ConfigError, EngineConfig, OrchestratorConfig, Provider};

#[derive(Debug, Parser)]
#[command(name = "icf")]
#[command(about = "Draft an informed consent form from a clinical trial protocol")]
pub struct Args {
    /// Protocol as .txt, .pdf or .docx
    #[arg(long, env = "ICF_PROTOCOL")]
    pub protocol: PathBuf,

    /// Section registry CSV
    #[arg(long, visible_alias = "csv", env = "ICF_REGISTRY")]
    pub registry: PathBuf,

    #[arg(long, env = "ICF_OUTPUT_DIR", default_value = "output")]
    pub output_dir: PathBuf,

    #[arg(long, env = "ICF_MODEL", default_value = "gpt-5.1")]
    pub model: String,

    /// openai or openrouter
    #[arg(long, env = "ICF_BACKEND", default_value = "openai")]
    pub backend: String,

    /// Override the backend's API base URL
    #[arg(long, env = "ICF_BASE_URL")]
    pub base_url: Option<String>,

    /// Cap on every per-variable iteration budget
    #[arg(long, env = "ICF_MAX_ITERATIONS", default_value_t = 20)]
    pub max_iterations: usize,

    /// Variables extracted concurrently
    #[arg(long, env = "ICF_WORKERS", default_value_t = 4)]
    pub workers: usize,

    /// Per-query timeout in seconds
    #[arg(long, env = "ICF_TIMEOUT_SECS", default_value_t = 120)]
    pub timeout_secs: u64,

    #[arg(long, env = "ICF_REQUESTS_PER_MINUTE", default_value_t = 60)]
    pub requests_per_minute: u32,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Only process these section ids
    #[arg(long, num_args = 1.., value_name = "ID")]
    pub sections: Vec<String>,
}

impl Args {
    pub fn provider(&self) -> Result<Provider, ConfigError> {
        self.backend.parse()
    }

    pub fn engine_config(&self) -> Result<EngineConfig, ConfigError> {
        if self.max_iterations == 0 {
            return Err(ConfigError::Invalid {
                name: "max-iterations",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "timeout-secs",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(EngineConfig::new()
            .with_max_iterations(self.max_iterations)
            .with_query_timeout(Duration::from_secs(self.timeout_secs)))
    }

    pub fn orchestrator_config(&self) -> Result<OrchestratorConfig, ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid {
                name: "workers",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(OrchestratorConfig::new()
            .with_workers(self.workers)
            .with_sections(self.sections.iter().cloned()))
    }

    /// `RUST_LOG`-style default when the environment sets none.
    pub fn default_log_filter(&self) -> &'static str {
        if self.verbose {
            "debug,icf_extraction=debug,hyper=info,reqwest=info"
        } else {
            "info,icf_extraction=info"
        }
    }
}
