use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "contract-extract",
    version,
    about = "Contract field extraction with grounding verification"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Extract(ExtractArgs),
    Fields(FieldsArgs),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum TierArg {
    Essential,
    Professional,
    Enterprise,
}

impl TierArg {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Essential => "essential",
            Self::Professional => "professional",
            Self::Enterprise => "enterprise",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    /// Path to the contract PDF
    pub pdf_path: PathBuf,

    #[arg(long, value_enum, default_value_t = TierArg::Essential)]
    pub tier: TierArg,

    /// Specific fields to extract instead of a tier (repeatable, max 25)
    #[arg(long = "field")]
    pub fields: Vec<String>,

    /// Write the run report here instead of stdout
    #[arg(long)]
    pub output: Option<PathBuf>,

    #[arg(long, default_value = "claude-sonnet-4-20250514")]
    pub model: String,

    #[arg(long, default_value = "https://api.anthropic.com/v1")]
    pub api_base: String,

    #[arg(long, default_value_t = 60_000)]
    pub timeout_ms: u64,

    /// Token budget per chunk for long documents
    #[arg(long, default_value_t = 40_000)]
    pub max_chunk_tokens: usize,

    /// Page count above which section-aware chunking engages
    #[arg(long, default_value_t = 50)]
    pub chunk_page_threshold: usize,

    #[arg(long)]
    pub max_pages: Option<usize>,

    /// Skip the gap-fill pass
    #[arg(long, default_value_t = false)]
    pub skip_recheck: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum MenuArg {
    Essential,
    Professional,
    Enterprise,
    Full,
}

impl MenuArg {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Essential => "essential",
            Self::Professional => "professional",
            Self::Enterprise => "enterprise",
            Self::Full => "full",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct FieldsArgs {
    #[arg(long, value_enum, default_value_t = MenuArg::Full)]
    pub tier: MenuArg,

    /// Quote the credit cost for selecting this many custom fields
    #[arg(long)]
    pub quote: Option<usize>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}
