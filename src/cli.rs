use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::commands::assign::DEFAULT_MAX_CANDIDATES;
use crate::matching::DedupPolicy;
use crate::matching::config::{
    DEFAULT_DEDUP_MARGIN, DEFAULT_MAX_QUERY_TERMS, DEFAULT_MIN_SCORE, DEFAULT_RANK_THRESHOLD,
    DEFAULT_TOP_K,
};
use crate::semantic::DEFAULT_MODEL_ID;

#[derive(Parser, Debug)]
#[command(
    name = "figmatch",
    version,
    about = "Semantic image matching and deduplication for text units"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Embed(EmbedArgs),
    Assign(AssignArgs),
    Dedup(DedupArgs),
    Status(StatusArgs),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum EmbedRefreshMode {
    Full,
    Missing,
}

impl EmbedRefreshMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Missing => "missing",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct EmbedArgs {
    #[arg(long, default_value = ".cache/figmatch")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long)]
    pub catalog: PathBuf,

    #[arg(long, default_value = DEFAULT_MODEL_ID)]
    pub model_id: String,

    #[arg(long, value_enum, default_value_t = EmbedRefreshMode::Missing)]
    pub refresh_mode: EmbedRefreshMode,

    #[arg(long, default_value_t = 64)]
    pub batch_size: usize,

    #[arg(long)]
    pub semantic_model_lock_path: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum DedupMode {
    Off,
    Strict,
    Margin,
}

impl From<DedupMode> for DedupPolicy {
    fn from(mode: DedupMode) -> Self {
        match mode {
            DedupMode::Off => Self::Off,
            DedupMode::Strict => Self::Strict,
            DedupMode::Margin => Self::Margin,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct AssignArgs {
    #[arg(long, default_value = ".cache/figmatch")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long)]
    pub units: PathBuf,

    #[arg(long)]
    pub catalog: PathBuf,

    #[arg(long)]
    pub output: Option<PathBuf>,

    #[arg(long, default_value = DEFAULT_MODEL_ID)]
    pub model_id: String,

    #[arg(long, default_value_t = DEFAULT_MIN_SCORE)]
    pub min_score: f64,

    #[arg(long, default_value_t = DEFAULT_TOP_K)]
    pub top_k: usize,

    #[arg(long, default_value_t = DEFAULT_DEDUP_MARGIN)]
    pub dedup_margin: f64,

    #[arg(long, value_enum, default_value_t = DedupMode::Margin)]
    pub dedup_policy: DedupMode,

    #[arg(long, default_value_t = 0.0)]
    pub lexical_weight: f64,

    #[arg(long, default_value_t = DEFAULT_MAX_QUERY_TERMS)]
    pub max_query_terms: usize,

    #[arg(long, default_value_t = DEFAULT_MAX_CANDIDATES)]
    pub max_candidates: usize,

    #[arg(long, default_value_t = false)]
    pub full_pool: bool,

    #[arg(long, default_value_t = false)]
    pub no_embedding_cache: bool,

    #[arg(long)]
    pub seed_assignments: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub posthoc: bool,

    #[arg(long, default_value_t = DEFAULT_RANK_THRESHOLD)]
    pub rank_threshold: usize,
}

#[derive(Args, Debug, Clone)]
pub struct DedupArgs {
    #[arg(long, default_value = ".cache/figmatch")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub input: PathBuf,

    #[arg(long)]
    pub output: Option<PathBuf>,

    #[arg(long, default_value_t = DEFAULT_RANK_THRESHOLD)]
    pub rank_threshold: usize,

    #[arg(long, default_value_t = false)]
    pub no_dedup: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = ".cache/figmatch")]
    pub cache_root: PathBuf,
}
