use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "codepad")]
#[command(about = "Drive a language server for one source file")]
#[command(version)]
pub struct Cli {
    /// Source file to open
    pub file: PathBuf,

    /// Language server command (defaults to the configured server for the
    /// file's extension)
    #[arg(long)]
    pub server: Option<String>,

    /// Argument passed to the server; repeatable
    #[arg(long = "arg", value_name = "ARG", allow_hyphen_values = true)]
    pub args: Vec<String>,

    /// Language identifier sent in didOpen
    #[arg(long)]
    pub language: Option<String>,

    /// Workspace root (defaults to the current directory)
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Request hover at this char offset
    #[arg(long, value_name = "OFFSET")]
    pub hover: Option<usize>,

    /// Request completion at this char offset
    #[arg(long, value_name = "OFFSET")]
    pub complete: Option<usize>,

    /// Print the file formatted by the server
    #[arg(long)]
    pub format: bool,

    /// How long to collect diagnostics before exiting
    #[arg(long, value_name = "N", default_value_t = 1000)]
    pub wait_ms: u64,

    /// Configuration file to use instead of the global/project ones
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log file path
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_full_invocation() {
        let cli = Cli::try_parse_from([
            "codepad",
            "main.c",
            "--server",
            "clangd",
            "--arg",
            "--log=error",
            "--arg",
            "-j=2",
            "--hover",
            "4",
            "--format",
            "--wait-ms",
            "200",
        ])
        .unwrap();
        assert_eq!(cli.file, PathBuf::from("main.c"));
        assert_eq!(cli.server.as_deref(), Some("clangd"));
        assert_eq!(cli.args, ["--log=error", "-j=2"]);
        assert_eq!(cli.hover, Some(4));
        assert!(cli.format);
        assert_eq!(cli.wait_ms, 200);
        assert!(cli.complete.is_none());
    }

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["codepad", "lib.rs"]).unwrap();
        assert!(cli.server.is_none());
        assert!(cli.args.is_empty());
        assert_eq!(cli.wait_ms, 1000);
        assert!(!cli.format);
    }

    #[test]
    fn file_is_required() {
        assert!(Cli::try_parse_from(["codepad"]).is_err());
    }
}
