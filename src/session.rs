use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tracing::{info, warn};
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use codepad_config::{load_config, load_file, Config};
use codepad_core::logging;
use codepad_core::Document;
use codepad_lsp::{
    ClientOptions, CompletionRequest, EditorDiagnostic, FormattingOptions, LanguageServerClient,
    LanguageServerPlugin, PluginConfig, StdioTransport,
};

use crate::cli::Cli;

/// Load config, start the server, run the requested queries, print
/// diagnostics and shut the server down.
pub(crate) fn run_session(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => load_file(path)
            .with_context(|| format!("failed to load config: {}", path.display()))?,
        None => {
            let config_dir = config_dir();
            let project_dir = std::env::current_dir().ok();
            load_config(&config_dir, project_dir.as_deref()).unwrap_or_else(|e| {
                eprintln!("codepad: using default configuration: {e}");
                Config::default()
            })
        }
    };

    init_logging(&config, cli.log_file.as_deref());

    let path = std::fs::canonicalize(&cli.file)
        .with_context(|| format!("failed to open: {}", cli.file.display()))?;
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read: {}", path.display()))?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    let configured = config.lsp.server_for_extension(extension);
    let (command, args) = match (&cli.server, configured) {
        (Some(command), _) => (command.clone(), cli.args.clone()),
        (None, Some((_, entry))) => (entry.command.clone(), entry.args.clone()),
        (None, None) => bail!(
            "no language server for '.{extension}' files; pass --server or configure [lsp.servers]"
        ),
    };
    let language_id = cli
        .language
        .clone()
        .or_else(|| configured.map(|(name, _)| name.to_string()))
        .unwrap_or_else(|| language_id_for_extension(extension).to_string());

    let root = match &cli.root {
        Some(root) => std::fs::canonicalize(root)
            .with_context(|| format!("bad workspace root: {}", root.display()))?,
        None => std::env::current_dir().context("no current directory")?,
    };

    let options = ClientOptions::new(path_to_uri(&path)?, language_id)
        .with_root(path_to_uri(&root)?)
        .with_request_timeout(config.session.request_timeout())
        .with_auto_close(config.session.auto_close);

    info!(
        file = %path.display(),
        %command,
        language = %options.language_id,
        "codepad starting"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    runtime.block_on(drive(&cli, &config, options, &command, &args, &text))
}

async fn drive(
    cli: &Cli,
    config: &Config,
    options: ClientOptions,
    command: &str,
    args: &[String],
    text: &str,
) -> Result<()> {
    let transport = StdioTransport::spawn(command, args)
        .with_context(|| format!("failed to start language server '{command}'"))?;
    let client = LanguageServerClient::connect(options, Arc::new(transport));
    client
        .wait_ready()
        .await
        .context("language server failed to initialize")?;

    let plugin_config = PluginConfig::from_options(client.options())
        .with_debounce(config.sync.debounce())
        .with_formatting(FormattingOptions {
            tab_size: u32::from(config.formatting.tab_size),
            insert_spaces: config.formatting.insert_spaces,
        });
    let latest: Arc<Mutex<Vec<EditorDiagnostic>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = latest.clone();
    let plugin = LanguageServerPlugin::new(
        client.clone(),
        plugin_config,
        text,
        move |batch: Vec<EditorDiagnostic>| {
            if let Ok(mut latest) = sink.lock() {
                *latest = batch;
            }
        },
    );
    if !plugin.wait_open().await {
        bail!("could not open the document on the language server");
    }

    let result = run_queries(cli, &plugin).await;

    tokio::time::sleep(Duration::from_millis(cli.wait_ms)).await;
    let diagnostics = latest.lock().map(|d| d.clone()).unwrap_or_default();
    let document = Document::from_text(text);
    for diagnostic in &diagnostics {
        println!("{}", describe(&cli.file, &document, diagnostic));
    }
    info!(count = diagnostics.len(), "diagnostics reported");

    plugin.destroy();
    if let Err(e) = client.exit().await {
        warn!("language server did not shut down cleanly: {e}");
    }
    result
}

async fn run_queries(cli: &Cli, plugin: &LanguageServerPlugin) -> Result<()> {
    if let Some(offset) = cli.hover {
        match plugin.hover(offset).await.context("hover failed")? {
            Some(tooltip) => {
                let end = tooltip.to.map(|to| to.to_string()).unwrap_or_default();
                println!("hover {}..{end}:\n{}", tooltip.from, tooltip.contents);
            }
            None => println!("hover: nothing at {offset}"),
        }
    }

    if let Some(offset) = cli.complete {
        let request = CompletionRequest::explicit(offset);
        match plugin.completion(request).await.context("completion failed")? {
            Some(result) => {
                println!("completion from {}:", result.from);
                for option in &result.options {
                    match &option.detail {
                        Some(detail) => println!("  {}  {detail}", option.label),
                        None => println!("  {}", option.label),
                    }
                }
            }
            None => println!("completion: nothing at {offset}"),
        }
    }

    if cli.format {
        match plugin.format().await.context("formatting failed")? {
            Some(changes) => {
                let mut document = Document::from_text(&plugin.text());
                document
                    .apply_changes(&changes)
                    .context("server returned overlapping edits")?;
                print!("{}", document.text());
            }
            None => println!("format: not supported by the server"),
        }
    }
    Ok(())
}

/// `file:line:col: severity: message`, one-based like compilers print.
fn describe(file: &Path, document: &Document, diagnostic: &EditorDiagnostic) -> String {
    let (line, column) = document
        .offset_to_position(diagnostic.from)
        .map(|p| (p.line + 1, p.character + 1))
        .unwrap_or((0, 0));
    let mut out = format!(
        "{}:{line}:{column}: {}: {}",
        file.display(),
        diagnostic.severity,
        diagnostic.message
    );
    if let Some(source) = &diagnostic.source {
        out.push_str(&format!(" [{source}]"));
    }
    out
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("codepad")
}

fn init_logging(config: &Config, cli_log_file: Option<&Path>) {
    let log_path = cli_log_file
        .map(Path::to_path_buf)
        .or_else(|| config.log.file.clone())
        .unwrap_or_else(|| logging::default_log_file_path(dirs::data_local_dir().as_deref()));

    if let Err(e) = logging::prepare_log_file(
        &log_path,
        logging::DEFAULT_MAX_LOG_SIZE,
        logging::DEFAULT_KEEP_LOG_FILES,
    ) {
        eprintln!("codepad: cannot rotate {}: {e}", log_path.display());
    }

    let writer = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => BoxMakeWriter::new(Mutex::new(file)),
        Err(e) => {
            eprintln!("codepad: logging to stderr, cannot open {}: {e}", log_path.display());
            BoxMakeWriter::new(std::io::stderr)
        }
    };

    let level = logging::level_filter(config.log.level.as_str());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_ansi(false)
        .with_env_filter(env_filter)
        .init();
}

/// `file://` URI for an absolute path.
pub(crate) fn path_to_uri(path: &Path) -> Result<String> {
    url::Url::from_file_path(path)
        .map(String::from)
        .map_err(|()| anyhow!("not an absolute path: {}", path.display()))
}

/// Best-effort LSP language identifier for a file extension.
pub(crate) fn language_id_for_extension(extension: &str) -> &'static str {
    match extension {
        "c" | "h" => "c",
        "cc" | "cpp" | "cxx" | "hpp" | "hh" => "cpp",
        "rs" => "rust",
        "py" => "python",
        "go" => "go",
        "js" | "mjs" | "cjs" => "javascript",
        "ts" => "typescript",
        "java" => "java",
        "json" => "json",
        "toml" => "toml",
        "md" => "markdown",
        _ => "plaintext",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codepad_lsp::Severity;

    #[cfg(unix)]
    #[test]
    fn uri_for_plain_path() {
        assert_eq!(
            path_to_uri(Path::new("/work/src/main.c")).unwrap(),
            "file:///work/src/main.c"
        );
    }

    #[cfg(unix)]
    #[test]
    fn uri_escapes_spaces_and_unicode() {
        assert_eq!(
            path_to_uri(Path::new("/my work/é.c")).unwrap(),
            "file:///my%20work/%C3%A9.c"
        );
        assert_eq!(
            path_to_uri(Path::new("/src/a#b?.c")).unwrap(),
            "file:///src/a%23b%3F.c"
        );
    }

    #[cfg(unix)]
    #[test]
    fn relative_path_has_no_uri() {
        assert!(path_to_uri(Path::new("src/main.c")).is_err());
    }

    #[test]
    fn language_ids() {
        assert_eq!(language_id_for_extension("h"), "c");
        assert_eq!(language_id_for_extension("hpp"), "cpp");
        assert_eq!(language_id_for_extension("rs"), "rust");
        assert_eq!(language_id_for_extension("xyz"), "plaintext");
    }

    #[test]
    fn describe_is_one_based() {
        let document = Document::from_text("int x = 1\nint y;");
        let diagnostic = EditorDiagnostic {
            from: 9,
            to: 9,
            severity: Severity::Error,
            message: "expected ';' after top level declarator".into(),
            source: Some("clang".into()),
        };
        assert_eq!(
            describe(Path::new("main.c"), &document, &diagnostic),
            "main.c:1:10: error: expected ';' after top level declarator [clang]"
        );
    }
}
