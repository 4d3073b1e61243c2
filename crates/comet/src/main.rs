use anyhow::{bail, Context, Result};
use clap::Parser;
use comet_core::{
    execute, load_plugins, AppsProvider, Config, ExecutablesProvider, History, ModuleLoader,
    Provider, SearchEngine, SearchResults,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "comet")]
#[command(version, about = "Keyboard-driven launcher with native extension modules", long_about = None)]
struct Args {
    /// The query, e.g. `fire`, `:calc 2+2` or `:help`
    query: Option<String>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// Launch the N-th result (1-based) and record it in history
    #[arg(long, value_name = "N")]
    select: Option<usize>,

    /// List loaded providers and their triggers
    #[arg(long)]
    list: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "comet=info,comet_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = Config::load();
    let mut engine = build_engine(&config);

    if args.list {
        return print_providers(&engine, args.json);
    }

    let Some(query) = args.query else {
        bail!("no query given (try `comet :help`)");
    };

    let results = engine.search(&query);
    tracing::debug!(
        "{} results for {:?} from {}",
        results.len(),
        query,
        results.provider.as_deref().unwrap_or("no provider")
    );

    if let Some(n) = args.select {
        let entry = n
            .checked_sub(1)
            .and_then(|i| results.entries.get(i))
            .cloned()
            .with_context(|| format!("no result #{} for '{}'", n, query))?;
        if let Err(e) = execute(&entry) {
            tracing::error!("Failed to launch {}: {}", entry.name, e);
            return Err(e.into());
        }
        engine.record_selection(&results, &entry);
        tracing::info!(
            "Launched {} (history score {})",
            entry.name,
            engine.history().score(&entry.command)
        );
        return Ok(());
    }

    print_results(&query, &results, args.json)
}

fn build_engine(config: &Config) -> SearchEngine {
    let max_results = config.general.max_results as usize;

    let apps = match config.app_dirs() {
        dirs if dirs.is_empty() => AppsProvider::new(max_results),
        dirs => AppsProvider::with_dirs(dirs, max_results),
    };
    let mut builtins: Vec<Box<dyn Provider>> = vec![Box::new(apps)];
    if config.executables.enabled {
        builtins.push(Box::new(ExecutablesProvider::new(max_results)));
    }

    let loader = ModuleLoader::from_config(config);
    let plugins = load_plugins(config, &loader)
        .into_iter()
        .map(|p| Box::new(p) as Box<dyn Provider>)
        .collect();

    SearchEngine::new(builtins, plugins, History::from_config(config)).with_max_results(max_results)
}

fn print_providers(engine: &SearchEngine, json: bool) -> Result<()> {
    let providers = engine.providers();
    if json {
        println!("{}", serde_json::to_string_pretty(&providers)?);
        return Ok(());
    }

    for provider in providers {
        let kind = if provider.builtin { "built-in" } else { "module" };
        println!("{:<16} {:<9} {}", provider.name, kind, provider.triggers.join(" "));
    }
    Ok(())
}

fn print_results(query: &str, results: &SearchResults, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No results found for '{}'", query);
        return Ok(());
    }

    for (i, entry) in results.entries.iter().enumerate() {
        if entry.comment.is_empty() {
            println!("{:>2}. {}", i + 1, entry.name);
        } else {
            println!("{:>2}. {}  ({})", i + 1, entry.name, entry.comment);
        }
    }
    Ok(())
}
