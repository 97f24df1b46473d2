use anyhow::{Context, Result};
use codetorch_config::{config_path, ensure_workspace_config, validate_config};
use codetorchd::cli::{Cli, parse_cli};
use codetorchd::commands::{run_annotate, run_list_functions, run_print_records};
use codetorchd::logging::init_tracing;

fn main() -> Result<()> {
    let cli = parse_cli();
    init_tracing(cli.log_format)?;
    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    let workspace = cli.workspace.canonicalize().with_context(|| {
        format!(
            "failed to resolve workspace path {}",
            cli.workspace.display()
        )
    })?;

    if let Some(file) = cli.list_functions.as_deref() {
        let mut out = std::io::stdout();
        return run_list_functions(&workspace, file, &mut out);
    }

    let mut config = ensure_workspace_config(&workspace).with_context(|| {
        format!(
            "failed to load or create workspace config at {}",
            config_path(&workspace).display()
        )
    })?;
    for warning in validate_config(&config) {
        tracing::warn!(code = warning.code, "{}", warning.message);
    }
    if let Some(backend) = cli.storage {
        config.storage.backend = backend;
    }
    let overrides = cli.provider_overrides();

    if let Some(file) = cli.print_records.as_deref() {
        let mut out = std::io::stdout();
        return run_print_records(&workspace, &config, file, &mut out);
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    if let Some(file) = cli.annotate.as_deref() {
        let mut out = std::io::stdout();
        return runtime.block_on(run_annotate(&workspace, &config, overrides, file, &mut out));
    }

    if !cli.lsp {
        anyhow::bail!(
            "nothing to do: pass --lsp, --annotate <FILE>, --list-functions <FILE> or --print-records <FILE>"
        );
    }

    tracing::info!(workspace = %workspace.display(), "starting CodeTorch LSP on stdio");
    runtime
        .block_on(codetorch_lsp::run_stdio(workspace, config, overrides))
        .context("LSP server exited with error")
}
