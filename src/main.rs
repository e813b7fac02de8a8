use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};

use vacancy_aggregator::config::Settings;
use vacancy_aggregator::db::{self, ConnectionProvider, Database};
use vacancy_aggregator::model::parse_batch;
use vacancy_aggregator::registry::{builtin_companies, Registry};
use vacancy_aggregator::sources::{self, HhClient, SjClient};
use vacancy_aggregator::{FilterPipeline, Vacancy};

#[derive(Parser)]
#[command(name = "vacancies", about = "Vacancy aggregator for HeadHunter and SuperJob")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the schema and seed target companies
    Init,
    /// List target companies
    Companies,
    /// Fetch vacancies of every target company, filter and save them
    Fetch {
        /// Search text passed to the job boards
        #[arg(short, long)]
        query: Option<String>,
    },
    /// Filter vacancies from a JSON file
    Import {
        file: PathBuf,
        /// Save the filtered vacancies
        #[arg(long)]
        save: bool,
    },
    /// Show all saved vacancies
    List {
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// Vacancies per target company
    Stats,
    /// Search saved vacancies by title keyword
    Search {
        keyword: String,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// Average salary and vacancies above it, or a salary range / top-N listing
    Salary {
        /// Lowest acceptable salary
        #[arg(long)]
        min: Option<i64>,
        /// Highest acceptable salary
        #[arg(long)]
        max: Option<i64>,
        /// Show only the N best paid vacancies
        #[arg(long)]
        top: Option<usize>,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// Delete saved vacancies: all of them, by title keyword or by id
    Clear {
        #[arg(short, long, conflicts_with = "id")]
        keyword: Option<String>,
        #[arg(long)]
        id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load().context("Failed to load settings")?;

    let result = match cli.command {
        Commands::Init => {
            let store = open(&settings)?;
            let mut companies = builtin_companies();
            companies.extend(settings.companies.iter().cloned());
            let seeded = store.with_connection(|conn| db::seed_companies(conn, &companies))?;
            println!("Seeded {} target companies into {}", seeded, settings.db_path.display());
            Ok(())
        }
        Commands::Companies => {
            let store = open(&settings)?;
            let companies = store.with_connection(|conn| db::fetch_companies(conn))?;
            if companies.is_empty() {
                println!("No target companies. Run 'init' first.");
                return Ok(());
            }
            println!("{:>3} | {:<24} | {:>10} | {:>10}", "#", "Company", "HH id", "SJ id");
            println!("{}", "-".repeat(56));
            for (i, c) in companies.iter().enumerate() {
                println!(
                    "{:>3} | {:<24} | {:>10} | {:>10}",
                    i + 1,
                    truncate(&c.name, 24),
                    c.hh_id.as_deref().unwrap_or("-"),
                    c.sj_id.as_deref().unwrap_or("-"),
                );
            }
            Ok(())
        }
        Commands::Fetch { query } => {
            let store = open(&settings)?;
            let registry = Arc::new(Registry::load(&store).context("Failed to load target companies")?);
            if registry.is_empty() {
                println!("No target companies. Run 'init' first.");
                return Ok(());
            }
            let hh = HhClient::new(&settings.hh)?;
            let sj = if settings.sj_enabled() {
                Some(SjClient::new(&settings.sj)?)
            } else {
                println!("SuperJob API key not set, fetching HeadHunter only.");
                None
            };

            let t_fetch = Instant::now();
            let fetched = sources::fetch_for_registry(&registry, &hh, sj.as_ref(), query.as_deref()).await;
            println!(
                "Fetched {} vacancies in {:.1}s",
                fetched.len(),
                t_fetch.elapsed().as_secs_f64()
            );

            let pipeline = FilterPipeline::new(&store, registry);
            let kept = pipeline.filter_and_deduplicate(&fetched);
            let saved = store.with_connection(|conn| db::save_vacancies(conn, &kept))?;
            println!("Kept {} after filtering, saved {}.", kept.len(), saved);
            Ok(())
        }
        Commands::Import { file, save } => {
            let store = open(&settings)?;
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let vacancies = parse_batch(&raw)
                .with_context(|| format!("Failed to parse {}", file.display()))?;
            let registry = Arc::new(Registry::load(&store).context("Failed to load target companies")?);

            let pipeline = FilterPipeline::new(&store, registry);
            let kept = pipeline.filter_and_deduplicate(&vacancies);
            print_vacancies(&kept, kept.len());
            println!("\n{} of {} vacancies kept", kept.len(), vacancies.len());
            if save {
                let saved = store.with_connection(|conn| db::save_vacancies(conn, &kept))?;
                println!("Saved {}.", saved);
            }
            Ok(())
        }
        Commands::List { limit } => {
            let store = open(&settings)?;
            let all = store.with_connection(|conn| db::fetch_all(conn))?;
            if all.is_empty() {
                println!("No saved vacancies.");
                return Ok(());
            }
            print_vacancies(&all, limit);
            println!("\n{} vacancies saved", all.len());
            Ok(())
        }
        Commands::Stats => {
            let store = open(&settings)?;
            let registry = Arc::new(Registry::load(&store).context("Failed to load target companies")?);
            let total = store.with_connection(|conn| db::count_vacancies(conn))?;
            let counts = FilterPipeline::new(&store, registry).get_companies_vacancy_count();
            if counts.is_empty() {
                println!("No statistics available.");
                return Ok(());
            }
            println!("{:>3} | {:<24} | {:>9}", "#", "Company", "Vacancies");
            println!("{}", "-".repeat(42));
            for (i, c) in counts.iter().enumerate() {
                println!("{:>3} | {:<24} | {:>9}", i + 1, truncate(&c.name, 24), c.count);
            }
            println!("\n{} vacancies saved", total);
            Ok(())
        }
        Commands::Search { keyword, limit } => {
            let store = open(&settings)?;
            let found = store.with_connection(|conn| db::search_by_keyword(conn, &keyword))?;
            if found.is_empty() {
                println!("Nothing found for '{}'.", keyword);
                return Ok(());
            }
            print_vacancies(&found, limit);
            println!("\n{} vacancies match '{}'", found.len(), keyword);
            Ok(())
        }
        Commands::Salary { min, max, top, limit } => {
            let store = open(&settings)?;
            if min.is_some() || max.is_some() || top.is_some() {
                let found = store.with_connection(|conn| db::fetch_by_salary(conn, min, max, top))?;
                if found.is_empty() {
                    println!("No vacancies in that salary range.");
                    return Ok(());
                }
                print_vacancies(&found, limit);
                println!("\n{} vacancies by salary", found.len());
                return Ok(());
            }
            let Some(avg) = store.with_connection(|conn| db::average_salary(conn))? else {
                println!("No vacancies with a ruble salary.");
                return Ok(());
            };
            println!("Average salary: {:.0} RUR\n", avg);
            let above = store.with_connection(|conn| db::vacancies_above_average(conn))?;
            print_vacancies(&above, limit);
            println!("\n{} vacancies above average", above.len());
            Ok(())
        }
        Commands::Clear { keyword, id } => {
            let store = open(&settings)?;
            let deleted = store.with_connection(|conn| match (&keyword, &id) {
                (Some(keyword), _) => db::delete_by_keyword(conn, keyword),
                (_, Some(id)) => db::delete_by_id(conn, id),
                _ => db::delete_all(conn),
            })?;
            println!("Deleted {} vacancies.", deleted);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn open(settings: &Settings) -> anyhow::Result<Database> {
    let store = Database::open(&settings.db_path)
        .with_context(|| format!("Failed to open {}", settings.db_path.display()))?;
    store.with_connection(|conn| db::init_schema(conn))?;
    Ok(store)
}

fn print_vacancies(rows: &[Vacancy], limit: usize) {
    if rows.is_empty() {
        return;
    }
    println!(
        "{:>3} | {:<36} | {:<20} | {:<22} | {:<14}",
        "#", "Title", "Employer", "Salary", "Area"
    );
    println!("{}", "-".repeat(107));
    for (i, v) in rows.iter().take(limit).enumerate() {
        let salary = v
            .salary
            .as_ref()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "{:>3} | {:<36} | {:<20} | {:<22} | {:<14}",
            i + 1,
            truncate(&v.title, 36),
            truncate(v.employer.display_name(), 20),
            truncate(&salary, 22),
            truncate(v.area.as_deref().unwrap_or("-"), 14),
        );
    }
    if rows.len() > limit {
        println!("... {} more", rows.len() - limit);
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
