use clap::{Parser, Subcommand, ValueEnum};
use docs_rag::Result;
use docs_rag::commands::{
    ask, delete_document, index_dir, index_files, optimize, search, show_config, show_status,
    write_config,
};
use docs_rag::router::QueryStrategy;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "docs-rag")]
#[command(about = "Index text documents and answer questions about them with a language model")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the configuration file, or show the current settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Index (or re-index) text files
    Index {
        /// Files to index; each is stored under its file name
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Index every .txt file in a directory
    IndexDir {
        /// Directory containing the text files
        dir: PathBuf,
    },
    /// Delete an indexed document
    Delete {
        /// File name the document was indexed under
        filename: String,
    },
    /// Show the stored chunks most similar to a query
    Search {
        query: String,
        /// Number of chunks to show
        #[arg(long, default_value_t = 5)]
        top_k: usize,
    },
    /// Answer a question using the indexed documents
    Ask {
        query: String,
        /// How much context to give the model
        #[arg(long, value_enum, default_value_t = StrategyArg::Auto)]
        strategy: StrategyArg,
    },
    /// Show embedding server and index status
    Status,
    /// Compact the vector table and build its index
    Optimize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StrategyArg {
    /// Let the model pick per question
    Auto,
    /// Most similar chunks only
    Targeted,
    /// Every chunk up to the configured limit
    FullContext,
}

impl StrategyArg {
    fn forced(self) -> Option<QueryStrategy> {
        match self {
            Self::Auto => None,
            Self::Targeted => Some(QueryStrategy::Targeted),
            Self::FullContext => Some(QueryStrategy::FullContext),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                write_config()?;
            }
        }
        Commands::Index { files } => {
            index_files(&files).await?;
        }
        Commands::IndexDir { dir } => {
            index_dir(&dir).await?;
        }
        Commands::Delete { filename } => {
            delete_document(&filename).await?;
        }
        Commands::Search { query, top_k } => {
            search(&query, top_k).await?;
        }
        Commands::Ask { query, strategy } => {
            ask(&query, strategy.forced()).await?;
        }
        Commands::Status => {
            show_status().await?;
        }
        Commands::Optimize => {
            optimize().await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["docs-rag", "status"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::Status));
        }
    }

    #[test]
    fn index_command_with_files() {
        let cli = Cli::try_parse_from(["docs-rag", "index", "a.txt", "notes/b.txt"])
            .expect("should parse");

        if let Commands::Index { files } = cli.command {
            assert_eq!(
                files,
                vec![PathBuf::from("a.txt"), PathBuf::from("notes/b.txt")]
            );
        } else {
            panic!("expected index command");
        }
    }

    #[test]
    fn index_command_requires_files() {
        let cli = Cli::try_parse_from(["docs-rag", "index"]);
        assert!(cli.is_err());
    }

    #[test]
    fn index_dir_command() {
        let cli = Cli::try_parse_from(["docs-rag", "index-dir", "docs"]).expect("should parse");
        assert!(matches!(cli.command, Commands::IndexDir { dir } if dir == PathBuf::from("docs")));
    }

    #[test]
    fn search_command_defaults() {
        let cli = Cli::try_parse_from(["docs-rag", "search", "privacy clause"])
            .expect("should parse");

        if let Commands::Search { query, top_k } = cli.command {
            assert_eq!(query, "privacy clause");
            assert_eq!(top_k, 5);
        } else {
            panic!("expected search command");
        }
    }

    #[test]
    fn search_command_with_top_k() {
        let cli = Cli::try_parse_from(["docs-rag", "search", "q", "--top-k", "20"])
            .expect("should parse");
        assert!(matches!(cli.command, Commands::Search { top_k: 20, .. }));
    }

    #[test]
    fn ask_command_strategies() {
        let cli = Cli::try_parse_from(["docs-rag", "ask", "Tell me something cool"])
            .expect("should parse");
        if let Commands::Ask { strategy, .. } = cli.command {
            assert_eq!(strategy, StrategyArg::Auto);
            assert_eq!(strategy.forced(), None);
        } else {
            panic!("expected ask command");
        }

        let cli = Cli::try_parse_from(["docs-rag", "ask", "q", "--strategy", "full-context"])
            .expect("should parse");
        if let Commands::Ask { strategy, .. } = cli.command {
            assert_eq!(strategy.forced(), Some(QueryStrategy::FullContext));
        } else {
            panic!("expected ask command");
        }

        let cli = Cli::try_parse_from(["docs-rag", "ask", "q", "--strategy", "sideways"]);
        assert!(cli.is_err());
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["docs-rag", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Config { show } = parsed.command {
                assert!(show);
            }
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["docs-rag", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["docs-rag", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
