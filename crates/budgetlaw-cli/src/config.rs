//! Command-line and environment configuration.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use budgetlaw_ai::{ConsensusConfig, ConsensusMode, OpenAiClient, RetryPolicy};
use budgetlaw_core::Taxonomy;
use budgetlaw_store::BatchUploader;
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::pipeline::PipelineConfig;

#[derive(Debug, Parser)]
#[command(name = "budgetlaw", version)]
#[command(about = "Extract structured budget proposals from committee review documents")]
pub struct Cli {
    #[command(flatten)]
    pub openai: OpenAiArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Extract proposals from the input tree into JSON snapshots
    Extract(ExtractArgs),

    /// Embed every snapshot record and replace the vector store contents
    Sync(SyncArgs),

    /// Extract, then sync
    Run {
        #[command(flatten)]
        extract: ExtractArgs,
        #[command(flatten)]
        store: StoreArgs,
    },

    /// Find the proposals most similar to a query
    Search(SearchArgs),
}

#[derive(Debug, Clone, Args)]
pub struct OpenAiArgs {
    #[arg(long, env = "OPENAI_API_KEY", global = true, hide_env_values = true)]
    pub api_key: Option<String>,

    #[arg(long, env = "OPENAI_BASE_URL", global = true)]
    pub openai_base_url: Option<String>,

    /// HTTP request timeout in seconds
    #[arg(long, default_value_t = 120, global = true)]
    pub timeout_secs: u64,
}

impl OpenAiArgs {
    pub fn client(&self) -> Result<OpenAiClient> {
        let key = self
            .api_key
            .as_deref()
            .context("OPENAI_API_KEY is not set (use --api-key or the environment)")?;
        let client = OpenAiClient::new(key, Duration::from_secs(self.timeout_secs))?;
        Ok(match &self.openai_base_url {
            Some(url) => client.with_base_url(url.as_str()),
            None => client,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConsensusArg {
    /// Several extractions per segment, majority vote on amounts and action
    Vote,
    /// One extraction per round
    Retry,
}

#[derive(Debug, Clone, Args)]
pub struct ExtractArgs {
    /// Input root: one directory per committee
    #[arg(long, env = "BUDGETLAW_INPUT", default_value = "markdown")]
    pub input: PathBuf,

    /// Output root for JSON snapshots
    #[arg(long, env = "BUDGETLAW_OUTPUT", default_value = "result")]
    pub output: PathBuf,

    /// Checkpoint file [default: <output>/.checkpoint.json]
    #[arg(long)]
    pub checkpoint: Option<PathBuf>,

    /// Ignore and reset the checkpoint
    #[arg(long)]
    pub fresh: bool,

    /// File name (or committee/file) to leave out; repeatable
    #[arg(long = "skip", value_name = "FILE")]
    pub skip: Vec<String>,

    /// JSON array of category names replacing the built-in taxonomy
    #[arg(long)]
    pub taxonomy: Option<PathBuf>,

    #[arg(long, env = "BUDGETLAW_MODEL", default_value = "gpt-4o")]
    pub model: String,

    #[arg(long, default_value_t = 0.0)]
    pub temperature: f32,

    #[arg(long, value_enum, default_value_t = ConsensusArg::Vote)]
    pub consensus: ConsensusArg,

    /// Extractions per segment in vote mode
    #[arg(long, default_value_t = 3)]
    pub attempts: usize,

    #[arg(long, default_value_t = 1)]
    pub doc_concurrency: usize,

    #[arg(long, default_value_t = 3)]
    pub segment_concurrency: usize,

    #[arg(long, default_value_t = 3)]
    pub attempt_concurrency: usize,

    /// Write a snapshot after this many completed segments (0 = only at document end)
    #[arg(long, default_value_t = 20)]
    pub snapshot_every: usize,

    #[arg(long, default_value_t = 5)]
    pub oracle_retries: usize,

    #[arg(long, default_value_t = 500)]
    pub oracle_delay_ms: u64,

    #[arg(long, default_value_t = 2)]
    pub validation_retries: usize,

    /// Tool-call turns allowed per oracle call
    #[arg(long, default_value_t = 8)]
    pub max_turns: usize,
}

impl ExtractArgs {
    pub fn taxonomy(&self) -> Result<Taxonomy> {
        match &self.taxonomy {
            Some(path) => Taxonomy::from_json_file(path)
                .with_context(|| format!("loading taxonomy from {}", path.display())),
            None => Ok(Taxonomy::builtin()),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.oracle_retries,
            Duration::from_millis(self.oracle_delay_ms),
        )
    }

    pub fn consensus(&self) -> ConsensusConfig {
        let mode = match self.consensus {
            ConsensusArg::Vote => ConsensusMode::FrequencyVote {
                attempts: self.attempts,
            },
            ConsensusArg::Retry => ConsensusMode::SingleWithRetry,
        };
        ConsensusConfig {
            mode,
            attempt_concurrency: self.attempt_concurrency,
            validation_retries: self.validation_retries,
        }
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            input: self.input.clone(),
            output: self.output.clone(),
            checkpoint: self
                .checkpoint
                .clone()
                .unwrap_or_else(|| self.output.join(".checkpoint.json")),
            fresh: self.fresh,
            skip: self.skip.iter().cloned().collect::<HashSet<_>>(),
            doc_concurrency: self.doc_concurrency,
            segment_concurrency: self.segment_concurrency,
            snapshot_every: self.snapshot_every,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct StoreArgs {
    /// LanceDB directory
    #[arg(long, env = "BUDGETLAW_DB", default_value = "data/lancedb")]
    pub db: PathBuf,

    #[arg(long, default_value = "proposals")]
    pub table: String,

    #[arg(long, env = "BUDGETLAW_EMBED_MODEL", default_value = "text-embedding-3-small")]
    pub embed_model: String,

    #[arg(long, default_value_t = 1536)]
    pub embed_dim: usize,

    #[arg(long, default_value_t = 8)]
    pub embed_concurrency: usize,

    #[arg(long, default_value_t = 100)]
    pub chunk_size: usize,

    #[arg(long, default_value_t = 3)]
    pub upload_retries: usize,

    #[arg(long, default_value_t = 1000)]
    pub upload_delay_ms: u64,
}

impl StoreArgs {
    pub fn uploader(&self) -> BatchUploader {
        BatchUploader::new(
            self.chunk_size,
            self.upload_retries,
            Duration::from_millis(self.upload_delay_ms),
        )
    }
}

#[derive(Debug, Clone, Args)]
pub struct SyncArgs {
    /// Snapshot root to read records from
    #[arg(long, env = "BUDGETLAW_OUTPUT", default_value = "result")]
    pub output: PathBuf,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Debug, Clone, Args)]
pub struct SearchArgs {
    pub query: String,

    #[arg(long, short = 'n', default_value_t = 5)]
    pub limit: usize,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn extract_defaults() {
        let cli = Cli::try_parse_from(["budgetlaw", "extract"]).unwrap();
        let Command::Extract(args) = cli.command else {
            panic!("expected extract");
        };
        let pipeline = args.pipeline();
        assert_eq!(pipeline.checkpoint, PathBuf::from("result/.checkpoint.json"));
        assert_eq!(pipeline.segment_concurrency, 3);
        assert_eq!(pipeline.snapshot_every, 20);
        assert_eq!(args.consensus(), ConsensusConfig::default());
        assert_eq!(args.retry_policy().max_retries, 5);
    }

    #[test]
    fn retry_mode_and_skips() {
        let cli = Cli::try_parse_from([
            "budgetlaw",
            "extract",
            "--consensus",
            "retry",
            "--skip",
            "a.md",
            "--skip",
            "內政/b.md",
            "--fresh",
        ])
        .unwrap();
        let Command::Extract(args) = cli.command else {
            panic!("expected extract");
        };
        assert_eq!(args.consensus().mode, ConsensusMode::SingleWithRetry);
        let pipeline = args.pipeline();
        assert!(pipeline.fresh);
        assert!(pipeline.skip.contains("內政/b.md"));
        assert_eq!(pipeline.skip.len(), 2);
    }

    #[test]
    fn run_takes_extract_and_store_flags() {
        let cli = Cli::try_parse_from([
            "budgetlaw",
            "run",
            "--output",
            "out",
            "--chunk-size",
            "50",
            "--api-key",
            "sk-test",
        ])
        .unwrap();
        assert_eq!(cli.openai.api_key.as_deref(), Some("sk-test"));
        let Command::Run { extract, store } = cli.command else {
            panic!("expected run");
        };
        assert_eq!(extract.output, PathBuf::from("out"));
        assert_eq!(store.uploader().chunk_size(), 50);
        assert_eq!(store.db, PathBuf::from("data/lancedb"));
    }
}
