use std::ffi::OsStr;
use std::path::PathBuf;

use clap::Parser;
use codetorch_config::{InferenceProviderKind, StorageBackendKind};
use codetorch_infer::ProviderOverrides;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Json => "json",
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "invalid log format '{other}', expected one of: human, json"
            )),
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(author, version, about = "CodeTorch annotation daemon")]
pub struct Cli {
    #[arg(long, default_value = ".", help = "Workspace root holding .codetorch/")]
    pub workspace: PathBuf,

    #[arg(long, help = "Run as stdio LSP server")]
    pub lsp: bool,

    #[arg(
        long,
        value_name = "FILE",
        conflicts_with_all = ["lsp", "annotate", "print_records"],
        help = "Print the functions detected in FILE and exit"
    )]
    pub list_functions: Option<PathBuf>,

    #[arg(
        long,
        value_name = "FILE",
        conflicts_with_all = ["lsp", "list_functions", "print_records"],
        help = "Summarize FILE as if it was just saved, print its annotations and exit"
    )]
    pub annotate: Option<PathBuf>,

    #[arg(
        long,
        value_name = "FILE",
        conflicts_with_all = ["lsp", "list_functions", "annotate"],
        help = "Print the cached annotation records for FILE as JSON and exit"
    )]
    pub print_records: Option<PathBuf>,

    #[arg(
        long,
        default_value = "human",
        value_parser = parse_log_format,
        help = "Log format: human or json"
    )]
    pub log_format: LogFormat,

    #[arg(long, value_parser = parse_storage_backend, help = "Record store override: json or sqlite")]
    pub storage: Option<StorageBackendKind>,

    #[arg(long, value_parser = parse_inference_provider)]
    pub inference_provider: Option<InferenceProviderKind>,

    #[arg(long)]
    pub inference_model: Option<String>,

    #[arg(long)]
    pub inference_endpoint: Option<String>,

    #[arg(long)]
    pub inference_api_key_env: Option<String>,
}

impl Cli {
    pub fn provider_overrides(&self) -> ProviderOverrides {
        ProviderOverrides {
            provider: self.inference_provider,
            model: self.inference_model.clone(),
            endpoint: self.inference_endpoint.clone(),
            api_key_env: self.inference_api_key_env.clone(),
        }
    }
}

pub fn parse_cli() -> Cli {
    let mut args: Vec<_> = std::env::args_os().collect();
    if args.get(1).is_some_and(|arg| arg == OsStr::new("--")) {
        args.remove(1);
    }

    Cli::parse_from(args)
}

fn parse_inference_provider(value: &str) -> Result<InferenceProviderKind, String> {
    value.parse()
}

fn parse_storage_backend(value: &str) -> Result<StorageBackendKind, String> {
    value.parse()
}

fn parse_log_format(value: &str) -> Result<LogFormat, String> {
    value.parse()
}
