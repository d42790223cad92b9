use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use wikicite::cache::Cache;
use wikicite::collector::{save_bundle, BundleFormat, ResearchCollector};
use wikicite::entities::{
    build_timeline, extract_entities, extract_relationships, generate_knowledge_graph,
    resolve_entity_urls,
};
use wikicite::extract::{extract_article, extract_citations, Depth};
use wikicite::report::Reliability;
use wikicite::wiki::WikipediaClient;
use wikicite::{ResearchConfig, SourceVerifier};

#[derive(Parser, Debug)]
#[command(name = "wikicite")]
#[command(version)]
#[command(about = "Extract Wikipedia citations, map them to claims, and verify their sources", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Wikipedia language edition
    #[arg(long, global = true, default_value = "en")]
    language: String,

    /// Disable caching of API responses
    #[arg(long, global = true)]
    no_cache: bool,

    /// Network timeout in seconds
    #[arg(long, global = true, default_value_t = 10)]
    timeout: u64,

    /// Citations verified concurrently
    #[arg(long, global = true, default_value_t = 8)]
    concurrency: usize,

    /// Verbose output
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(flatten)]
    Research(ResearchCommand),
    /// Delete cached API responses
    ClearCache,
}

/// Commands that talk to Wikipedia
#[derive(Subcommand, Debug)]
enum ResearchCommand {
    /// Extract sections, claims and citations from an article
    Article {
        title: String,
        /// Write JSON here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Extract only the citations of an article (CSL-JSON)
    Citations {
        title: String,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Search a topic and research the top articles
    Topic {
        query: String,
        #[arg(long, default_value_t = 5)]
        max_articles: usize,
        /// Headings and metadata only
        #[arg(long)]
        summary: bool,
        /// Top up with linked articles when the search comes up short
        #[arg(long)]
        follow_links: bool,
        #[arg(long, short)]
        output: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = Format::Json)]
        format: Format,
    },
    /// Verify every citation of an article
    Verify {
        title: String,
        /// Skip URL reachability checks
        #[arg(long)]
        no_urls: bool,
        /// Skip DOI resolution
        #[arg(long)]
        no_doi: bool,
        /// Skip PubMed lookups
        #[arg(long)]
        no_pmid: bool,
        /// Skip Wayback Machine lookups
        #[arg(long)]
        no_archive: bool,
        /// Strict mode: exit with error code when reliability is low
        #[arg(long, short)]
        strict: bool,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Look for support for a claim in the given articles
    Claim {
        claim: String,
        #[arg(long = "article", short, required = true)]
        articles: Vec<String>,
    },
    /// Build an entity graph and timeline for an article
    Graph {
        title: String,
        /// Look up Wikipedia articles for people found in the text
        #[arg(long)]
        resolve_urls: bool,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Find linked articles that cite the same sources
    Related {
        title: String,
        #[arg(long, default_value_t = 2)]
        min_shared: usize,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Format {
    Json,
    Jsonl,
}

impl From<Format> for BundleFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Json => BundleFormat::Json,
            Format::Jsonl => BundleFormat::Jsonl,
        }
    }
}

fn fail(message: impl std::fmt::Display) -> ExitCode {
    eprintln!("{} {}", "Error:".red().bold(), message);
    ExitCode::FAILURE
}

/// Print JSON to stdout, or write it to `output`
fn emit<T: Serialize>(value: &T, output: Option<&Path>) -> Result<(), String> {
    let json = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
            }
            std::fs::write(path, json).map_err(|e| format!("{}: {}", path.display(), e))?;
            eprintln!("Saved to {}", path.display().to_string().cyan());
        }
        None => println!("{}", json),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    let filter = if args.verbose {
        EnvFilter::new("wikicite=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("wikicite=warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = ResearchConfig {
        language: args.language.clone(),
        cache_enabled: !args.no_cache,
        timeout: Duration::from_secs(args.timeout),
        concurrency: args.concurrency,
        ..ResearchConfig::default()
    };

    if let Command::Research(ResearchCommand::Verify {
        no_urls,
        no_doi,
        no_pmid,
        no_archive,
        ..
    }) = &args.command
    {
        config.check_urls = !no_urls;
        config.check_doi = !no_doi;
        config.check_pmid = !no_pmid;
        config.check_archive = !no_archive;
    }

    match args.command {
        Command::ClearCache => clear_cache(&config),
        Command::Research(command) => {
            let client = match WikipediaClient::new(&config) {
                Ok(client) => client,
                Err(e) => return fail(format!("Failed to initialize Wikipedia client: {}", e)),
            };
            run(command, client, &config).await
        }
    }
}

fn clear_cache(config: &ResearchConfig) -> ExitCode {
    let cache = match Cache::new(false, config.cache_ttl) {
        Ok(cache) => cache,
        Err(e) => return fail(e),
    };
    match cache.clear() {
        Ok(removed) => {
            println!("Removed {} cached responses from {}", removed, cache.dir().display());
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}

async fn run(command: ResearchCommand, client: WikipediaClient, config: &ResearchConfig) -> ExitCode {
    match command {
        ResearchCommand::Article { title, output } => match extract_article(&client, &title).await {
            Ok(research) => {
                eprintln!(
                    "{}: {} citations, {} sections, {} claims",
                    research.article.title.bold(),
                    research.metadata.total_citations,
                    research.metadata.total_sections,
                    research.metadata.total_claims
                );
                finish(emit(&research, output.as_deref()))
            }
            Err(e) => fail(e),
        },

        ResearchCommand::Citations { title, output } => match extract_citations(&client, &title).await {
            Ok(citations) => finish(emit(&citations, output.as_deref())),
            Err(e) => fail(e),
        },

        ResearchCommand::Topic {
            query,
            max_articles,
            summary,
            follow_links,
            output,
            format,
        } => {
            let depth = if summary { Depth::Summary } else { Depth::Comprehensive };
            let collector = ResearchCollector::new(client);
            let bundle = match collector
                .research_topic(&query, max_articles, depth, follow_links)
                .await
            {
                Ok(bundle) => bundle,
                Err(e) => return fail(e),
            };

            eprintln!(
                "Analyzed {} articles: {} citations, {} claims, source quality {}",
                bundle.summary.articles_analyzed,
                bundle.summary.total_citations,
                bundle.summary.total_claims_extracted,
                bundle.summary.source_quality.rating.to_string().bold()
            );

            match output {
                Some(path) => match save_bundle(&bundle, &path, format.into()) {
                    Ok(()) => {
                        eprintln!("Saved to {}", path.display().to_string().cyan());
                        ExitCode::SUCCESS
                    }
                    Err(e) => fail(e),
                },
                None => finish(emit(&bundle, None)),
            }
        }

        ResearchCommand::Verify {
            title,
            strict,
            output,
            ..
        } => {
            let research = match extract_article(&client, &title).await {
                Ok(research) => research,
                Err(e) => return fail(e),
            };

            let verifier = match SourceVerifier::new(config) {
                Ok(verifier) => verifier,
                Err(e) => return fail(format!("Failed to initialize verifier: {}", e)),
            };

            println!(
                "Verifying {} citations from {}...",
                research.citations.len(),
                research.article.title.cyan()
            );
            let report = verifier.verify_article(&research).await;
            report.print(&research.article.title);

            if let Some(path) = output.as_deref() {
                if let Err(e) = emit(&report, Some(path)) {
                    return fail(e);
                }
            }

            if strict && report.reliability() == Reliability::Low {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }

        ResearchCommand::Claim { claim, articles } => {
            let collector = ResearchCollector::new(client);
            let result = collector.verify_claim(&claim, &articles).await;
            eprintln!(
                "Claim support: {:?} (score {:.2}, {} supporting, {} related)",
                result.status,
                result.verification_score,
                result.supporting_evidence.len(),
                result.related_content.len()
            );
            finish(emit(&result, None))
        }

        ResearchCommand::Graph {
            title,
            resolve_urls,
            output,
        } => {
            let research = match extract_article(&client, &title).await {
                Ok(research) => research,
                Err(e) => return fail(e),
            };

            let subject = &research.article.title;
            let mut entities = extract_entities(&research.sections);
            if resolve_urls {
                resolve_entity_urls(&client, &mut entities).await;
            }
            let relationships = extract_relationships(&research.sections, &entities, subject);
            let timeline = build_timeline(&research.sections, &entities);
            let graph = generate_knowledge_graph(subject, &entities, &relationships, &timeline);

            eprintln!(
                "{}: {} entities, {} relationships, {} timeline events",
                subject.bold(),
                graph.statistics.total_entities,
                graph.statistics.total_relationships,
                graph.statistics.timeline_events
            );
            finish(emit(&graph, output.as_deref()))
        }

        ResearchCommand::Related { title, min_shared } => {
            let collector = ResearchCollector::new(client);
            match collector.find_related_by_citations(&title, min_shared).await {
                Ok(related) => {
                    if related.is_empty() {
                        println!("{}", "No related articles found.".yellow());
                    }
                    for article in &related {
                        println!(
                            "  {} {} shared citations",
                            article.title.bold(),
                            article.shared_citations.to_string().green()
                        );
                    }
                    ExitCode::SUCCESS
                }
                Err(e) => fail(e),
            }
        }
    }
}

fn finish(result: Result<(), String>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail(e),
    }
}
