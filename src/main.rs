use clap::{CommandFactory, Parser};
use sentence_gen::sink::{DEFAULT_OUTPUT, FileSink, SentenceSink, stdout_sink};
use sentence_gen::{ExpansionConfig, Grammar, GrammarError, Outcome};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Enumerate every sentence a BNF-style grammar produces from a root symbol
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the grammar file (`.json` files are read as production tables)
    #[arg(help = "Path to the grammar file")]
    grammar_file: Option<PathBuf>,

    /// The root non-terminal, e.g. "<main>"
    #[arg(help = "Root symbol to expand, usually \"<main>\"")]
    root: Option<String>,

    /// Output file for the sorted sentences
    #[arg(short, long, default_value = DEFAULT_OUTPUT)]
    output: PathBuf,

    /// Write sentences to stdout instead of the output file
    #[arg(long)]
    stdout: bool,

    /// JSON file with expansion limits; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Stop once more than this many sentences were found
    #[arg(long)]
    cutoff: Option<usize>,

    /// Stop after this many substitution rounds
    #[arg(long)]
    max_rounds: Option<usize>,

    /// Stop once sentences and frontier hold roughly this many bytes
    #[arg(long)]
    max_bytes: Option<usize>,

    /// Stop after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Print a JSON report of the expansion to stdout
    #[arg(long, conflicts_with = "stdout")]
    report: bool,
}

impl Cli {
    fn expansion_config(&self) -> Result<ExpansionConfig, GrammarError> {
        let mut config = match &self.config {
            Some(path) => ExpansionConfig::from_json(&fs::read_to_string(path)?)?,
            None => ExpansionConfig::default(),
        };
        if let Some(cutoff) = self.cutoff {
            config = config.with_cutoff(cutoff);
        }
        if let Some(max_rounds) = self.max_rounds {
            config = config.with_max_rounds(max_rounds);
        }
        if let Some(max_bytes) = self.max_bytes {
            config = config.with_max_bytes(max_bytes);
        }
        if let Some(secs) = self.timeout_secs {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        Ok(config)
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), GrammarError> {
    let (grammar_file, root) = match (&cli.grammar_file, &cli.root) {
        (Some(grammar_file), Some(root)) => (grammar_file.clone(), root.clone()),
        (grammar_file, _) => {
            let missing = if grammar_file.is_none() {
                GrammarError::MissingGrammarFile
            } else {
                GrammarError::MissingRoot
            };
            eprintln!("{}\n", missing);
            Cli::command().print_help()?;
            return Ok(());
        }
    };

    let config = cli.expansion_config()?;
    tracing::debug!(?config, grammar = %grammar_file.display(), %root, "loading grammar");

    let mut grammar = Grammar::from_file(&grammar_file, &root)?;
    grammar.set_config(config);

    let expansion = grammar.expand()?;

    let mut sink: Box<dyn SentenceSink> = if cli.stdout {
        Box::new(stdout_sink())
    } else {
        Box::new(FileSink::new(&cli.output))
    };
    sink.write_sentences(&expansion.sentences)?;

    if cli.report {
        println!("{}", serde_json::to_string_pretty(&expansion.report())?);
    }

    match expansion.outcome {
        Outcome::Exhausted => eprintln!(
            "Done: exhausted the grammar, {} sentences.",
            expansion.len()
        ),
        Outcome::Cutoff(reason) => eprintln!(
            "Done: stopped early ({}), {} sentences; the output is partial.",
            reason,
            expansion.len()
        ),
    }
    if !expansion.unresolved.is_empty() {
        let symbols = expansion.unresolved.iter().cloned().collect::<Vec<_>>();
        eprintln!("Unresolved symbols (dropped): {}", symbols.join(", "));
    }
    if !cli.stdout {
        eprintln!("Sentences written to {}", cli.output.display());
    }

    Ok(())
}
