use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pdf_rag::commands::{ask, chat, clear, ingest, list_documents, search, show_status};
use pdf_rag::config::{Config, get_config_dir, run_interactive_config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pdf-rag")]
#[command(about = "Ask questions about your PDF documents using a local language model")]
#[command(version)]
struct Cli {
    /// Directory holding configuration and indexes (default: ~/.pdf-rag)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection and pipeline settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Extract, chunk and embed PDF or text files
    Ingest {
        /// Files, or directories whose PDF and text files should be ingested
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Ask a question about the ingested documents
    Ask {
        question: String,
        /// Number of chunks to retrieve
        #[arg(short, long)]
        k: Option<usize>,
        /// Maximum context size in characters
        #[arg(long)]
        max_context: Option<usize>,
        /// Print the context sent to the model
        #[arg(long)]
        show_context: bool,
    },
    /// Ask questions interactively until 'exit'
    Chat {
        /// Number of chunks to retrieve
        #[arg(short, long)]
        k: Option<usize>,
        /// Maximum context size in characters
        #[arg(long)]
        max_context: Option<usize>,
    },
    /// Show the passages retrieved for a question without generating an answer
    Search {
        question: String,
        /// Number of chunks to retrieve
        #[arg(short, long)]
        k: Option<usize>,
    },
    /// List ingested documents
    List,
    /// Remove all documents and embeddings
    Clear {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Show Ollama connectivity and corpus statistics
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => get_config_dir()?,
    };

    if let Commands::Config { show } = cli.command {
        return if show {
            show_config(&data_dir)
        } else {
            run_interactive_config(&data_dir)
        };
    }

    let mut config = Config::load(&data_dir).context("Failed to load configuration")?;
    config
        .apply_env_overrides()
        .context("Invalid Ollama setting in environment")?;

    match cli.command {
        Commands::Config { .. } => {}
        Commands::Ingest { paths } => {
            ingest(config, &paths).await?;
        }
        Commands::Ask {
            question,
            k,
            max_context,
            show_context,
        } => {
            ask(config, &question, k, max_context, show_context).await?;
        }
        Commands::Chat { k, max_context } => {
            chat(config, k, max_context).await?;
        }
        Commands::Search { question, k } => {
            search(config, &question, k).await?;
        }
        Commands::List => {
            list_documents(config).await?;
        }
        Commands::Clear { yes } => {
            clear(config, yes).await?;
        }
        Commands::Status => {
            show_status(config).await?;
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
        let cli = Cli::try_parse_from(["pdf-rag", "list"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::List));
            assert_eq!(parsed.data_dir, None);
        }
    }

    #[test]
    fn ingest_command_with_paths() {
        let cli = Cli::try_parse_from(["pdf-rag", "ingest", "a.pdf", "docs/"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Ingest { paths } = parsed.command {
                assert_eq!(paths, vec![PathBuf::from("a.pdf"), PathBuf::from("docs/")]);
            } else {
                panic!("expected ingest command");
            }
        }
    }

    #[test]
    fn ingest_requires_a_path() {
        let cli = Cli::try_parse_from(["pdf-rag", "ingest"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        }
    }

    #[test]
    fn ask_command_with_options() {
        let cli = Cli::try_parse_from([
            "pdf-rag",
            "ask",
            "What color is the sky?",
            "-k",
            "5",
            "--max-context",
            "2000",
            "--show-context",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Ask {
                question,
                k,
                max_context,
                show_context,
            } = parsed.command
            {
                assert_eq!(question, "What color is the sky?");
                assert_eq!(k, Some(5));
                assert_eq!(max_context, Some(2000));
                assert!(show_context);
            } else {
                panic!("expected ask command");
            }
        }
    }

    #[test]
    fn chat_command_with_options() {
        let cli = Cli::try_parse_from(["pdf-rag", "chat", "-k", "2"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Chat { k, max_context } = parsed.command {
                assert_eq!(k, Some(2));
                assert_eq!(max_context, None);
            } else {
                panic!("expected chat command");
            }
        }
    }

    #[test]
    fn data_dir_is_global() {
        let cli = Cli::try_parse_from(["pdf-rag", "status", "--data-dir", "/tmp/corpus"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::Status));
            assert_eq!(parsed.data_dir, Some(PathBuf::from("/tmp/corpus")));
        }
    }

    #[test]
    fn clear_yes_flag() {
        let cli = Cli::try_parse_from(["pdf-rag", "clear", "--yes"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Clear { yes } = parsed.command {
                assert!(yes);
            }
        }
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["pdf-rag", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Config { show } = parsed.command {
                assert!(show);
            }
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["pdf-rag", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["pdf-rag", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
