use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use viwiki::clean::Cleaner;
use viwiki::dashboard::{self, Dashboard, Page};
use viwiki::dump::extract;
use viwiki::index::{Dataset, Indexer};
use viwiki::lexicon::Keywords;
use viwiki::mapper::*;
use viwiki::misc::open_input;
use viwiki::reducer::run_reducer;
use viwiki::source::DataSource;
use viwiki::token::Tokenizer;
use viwiki::{Config, EsClient, MemoryBackend, SearchBackend, SourceMode};

/// Vietnamese Wikipedia processing pipeline
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file (default: ./viwiki.json when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Elasticsearch url, overrides the config file
    #[arg(long, global = true)]
    es_url: Option<String>,

    /// Keyword list used by the trend and category jobs
    #[arg(long = "keywords", global = true)]
    keyword_file: Option<PathBuf>,

    /// Stop-word list used by the mappers
    #[arg(long = "stopwords", global = true)]
    stopword_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// MediaWiki XML dump (.xml or .xml.bz2) to raw page JSON lines on stdout
    Extract {
        #[arg(default_value = "-")]
        input: PathBuf,
    },
    /// Raw page JSON lines on stdin to cleaned documents on stdout
    Clean,
    /// Streaming mapper over cleaned documents
    Map {
        #[arg(value_enum)]
        job: Job,
    },
    /// Sum key-grouped `key<TAB>count` lines
    Reduce,
    /// Recreate indices and load job output into them
    Index {
        #[arg(value_enum)]
        target: IndexTarget,
        /// Read job output from local directories instead of HDFS
        #[arg(long)]
        local: bool,
        /// Documents per bulk request
        #[arg(long)]
        chunk: Option<usize>,
        /// Index into memory and only report counts
        #[arg(long)]
        dry_run: bool,
    },
    /// Dashboard pages; without a page an interactive prompt starts
    Dash {
        #[command(subcommand)]
        page: Option<Page>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Job {
    Wordcount,
    Trend,
    CatKwlist,
    CatDocs,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum IndexTarget {
    Docs,
    Wordcount,
    Trend,
    CatKwlist,
    CatDocs,
    All,
}

impl IndexTarget {
    /// `None` for `all`.
    fn dataset(self) -> Option<Dataset> {
        match self {
            IndexTarget::Docs => Some(Dataset::Docs),
            IndexTarget::Wordcount => Some(Dataset::WordCount),
            IndexTarget::Trend => Some(Dataset::Trend),
            IndexTarget::CatKwlist => Some(Dataset::CatKwlist),
            IndexTarget::CatDocs => Some(Dataset::CatDocs),
            IndexTarget::All => None,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(url) = cli.es_url {
        config.es_url = url;
    }
    if let Some(path) = cli.keyword_file {
        config.keywords_path = path;
    }
    if let Some(path) = cli.stopword_file {
        config.stopwords_path = path;
    }
    config.validate()?;

    let stdout = io::stdout();
    let mut out = BufWriter::with_capacity(1 << 16, stdout.lock());

    match cli.command {
        Command::Extract { input } => {
            let stats = extract(open_input(&input)?, &mut out)?;
            info!("{} pages, {} kept, {} redirects, {} outside main namespace",
                stats.pages, stats.kept, stats.redirects, stats.other_ns);
        }
        Command::Clean => {
            Cleaner::new().run(io::stdin().lock(), &mut out)?;
        }
        Command::Map { job } => {
            let tokenizer = Tokenizer::load(&config.stopwords_path);
            let keywords = Keywords::load(&config.keywords_path);
            let input = io::stdin().lock();
            match job {
                Job::Wordcount => run_mapper(&WordCount { tokenizer: &tokenizer }, input, &mut out)?,
                Job::Trend => run_mapper(&Trend { tokenizer: &tokenizer, keywords: &keywords }, input, &mut out)?,
                Job::CatKwlist => {
                    run_mapper(&CategoryKeywords { tokenizer: &tokenizer, keywords: &keywords }, input, &mut out)?
                }
                Job::CatDocs => run_mapper(&CategoryDocs, input, &mut out)?,
            };
        }
        Command::Reduce => {
            run_reducer(io::stdin().lock(), &mut out)?;
        }
        Command::Index { target, local, chunk, dry_run } => {
            if local {
                config.source = SourceMode::Local;
            }
            if let Some(chunk) = chunk {
                config.bulk_chunk = chunk.max(1);
            }
            if dry_run {
                index(&MemoryBackend::new(), &config, target, &mut out)?;
            } else {
                index(&EsClient::new(&config.es_url, config.timeout())?, &config, target, &mut out)?;
            }
        }
        Command::Dash { page } => {
            let client = EsClient::new(&config.es_url, config.timeout())?;
            let mut dash = Dashboard::new(&client, config.cache_ttl());
            match page {
                Some(page) => write!(out, "{}", dash.render(&page))?,
                None => {
                    drop(out);
                    return dashboard::interactive(&mut dash);
                }
            }
        }
    }
    out.flush()?;
    Ok(())
}

fn index<B: SearchBackend, W: Write>(backend: &B, config: &Config, target: IndexTarget, out: &mut W) -> Result<()> {
    let keywords = Keywords::load(&config.keywords_path);
    let source = DataSource::new(config.source);
    let indexer = Indexer::new(backend, &source, &keywords, config);
    let reports = match target.dataset() {
        Some(dataset) => vec![indexer.run(dataset)?],
        None => indexer.run_all()?,
    };
    for report in reports {
        writeln!(out, "{report}")?;
    }
    Ok(())
}
