use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use spelltool_core::SpellId;
use spelltool_core::blizzard::{BlizzardConfig, BlizzardSource};
use spelltool_core::cache::{load_cache, save_cache};
use spelltool_core::config::{ToolConfig, load_config};
use spelltool_core::credentials::{
    CachedTokenProvider, FileTokenStore, OAuthExchange, TokenProvider, resolve_credentials,
};
use spelltool_core::fetch::{AbilitySource, FallbackSource, RefreshPolicy, refresh_cache};
use spelltool_core::http::{HttpClient, HttpClientConfig};
use spelltool_core::keybinds::{KeybindsDocument, load_keybinds, save_keybinds};
use spelltool_core::merge::merge_files;
use spelltool_core::probe::{probe_endpoints, render_probe_report};
use spelltool_core::prompt::{Prompt, StdinPrompt, confirm};
use spelltool_core::reconcile::{
    IdUpdate, SpellSearch, apply_suggestions, collect_suggestions, import_csv, missing_ids,
    render_csv_template, render_search_list, review_suggestions_interactive, seed_known_ids,
    set_spell_id,
};
use spelltool_core::runtime::{
    PathOverrides, ResolutionContext, ResolvedPaths, init_layout, normalize_for_display,
    resolve_paths,
};
use spelltool_core::wowhead::{WowheadSearch, WowheadSource, clean_ability_name, spell_page_url};

#[derive(Debug, Parser)]
#[command(
    name = "spelltool",
    version,
    about = "Spell metadata fetch, cache and keybind reconciliation"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    project_root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(short, long, global = true)]
    verbose: bool,
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    project_root: Option<PathBuf>,
    config: Option<PathBuf>,
    verbose: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            project_root: cli.project_root.clone(),
            config: cli.config.clone(),
            verbose: cli.verbose,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Initialize the .spelltool state directory and default config
    Init(InitArgs),
    /// Show resolved runtime paths
    Paths,
    /// List abilities without a spell id
    #[command(name = "list-missing")]
    ListMissing,
    /// Set the spell id of one ability
    #[command(name = "set-id")]
    SetId(SetIdArgs),
    /// Fill unset ids from the built-in table of known spells
    Seed,
    /// Apply ids from a class,key,spell_id,ability_name CSV file
    #[command(name = "import-csv")]
    ImportCsv(ImportCsvArgs),
    /// Write a CSV of every ability for manual editing
    #[command(name = "csv-template")]
    CsvTemplate(OutputArgs),
    /// Look up spell ids by ability name
    Search(SearchArgs),
    /// Search every missing ability and review the hits
    #[command(name = "search-all")]
    SearchAll(SearchAllArgs),
    /// Refresh the ability cache from a remote source
    Fetch(FetchArgs),
    /// Copy cached icons and tooltips into the keybinds document
    Merge,
    /// Write a markdown worklist of missing abilities
    #[command(name = "search-list")]
    SearchList(OutputArgs),
    /// Report what each scrape endpoint returns for one spell
    Probe(ProbeArgs),
}

#[derive(Debug, Args)]
struct InitArgs {
    /// Overwrite an existing config.toml
    #[arg(long)]
    force: bool,
}

#[derive(Debug, Args)]
struct SetIdArgs {
    class: String,
    key: String,
    spell_id: SpellId,
}

#[derive(Debug, Args)]
struct ImportCsvArgs {
    #[arg(value_name = "PATH")]
    path: PathBuf,
}

#[derive(Debug, Args)]
struct OutputArgs {
    /// Write to this file instead of stdout
    #[arg(long, short, value_name = "PATH")]
    output: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct SearchArgs {
    /// Ability name; omit to enter names interactively
    name: Vec<String>,
}

#[derive(Debug, Args)]
struct SearchAllArgs {
    /// Collect every suggestion first, then confirm them all at once
    #[arg(long)]
    batch: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SourceKind {
    Blizzard,
    Wowhead,
    /// Official API first, scrape when it has nothing
    Auto,
}

#[derive(Debug, Args)]
struct FetchArgs {
    #[arg(long, value_enum, default_value_t = SourceKind::Blizzard)]
    source: SourceKind,
    /// Refetch records that are still fresh
    #[arg(long)]
    force: bool,
}

#[derive(Debug, Args)]
struct ProbeArgs {
    spell_id: SpellId,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let runtime = RuntimeOptions::from_cli(&cli);
    match cli.command {
        Some(Commands::Init(args)) => run_init(&runtime, args),
        Some(Commands::Paths) => run_paths(&runtime),
        Some(Commands::ListMissing) => run_list_missing(&runtime),
        Some(Commands::SetId(args)) => run_set_id(&runtime, args),
        Some(Commands::Seed) => run_seed(&runtime),
        Some(Commands::ImportCsv(args)) => run_import_csv(&runtime, args),
        Some(Commands::CsvTemplate(args)) => run_csv_template(&runtime, args),
        Some(Commands::Search(args)) => run_search(&runtime, args),
        Some(Commands::SearchAll(args)) => run_search_all(&runtime, args),
        Some(Commands::Fetch(args)) => run_fetch(&runtime, args),
        Some(Commands::Merge) => run_merge(&runtime),
        Some(Commands::SearchList(args)) => run_search_list(&runtime, args),
        Some(Commands::Probe(args)) => run_probe(&runtime, args),
        None => {
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}

struct Workspace {
    paths: ResolvedPaths,
    config: ToolConfig,
}

fn resolve_workspace(runtime: &RuntimeOptions) -> Result<Workspace> {
    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        project_root: runtime.project_root.clone(),
        config: runtime.config.clone(),
    };
    let paths = resolve_paths(&context, &overrides)?;
    let config = load_config(&paths.config_path)?;
    let paths = paths.with_config(&config);
    if runtime.verbose {
        log::debug!("[diagnostics]\n{}", paths.diagnostics());
    }
    Ok(Workspace { paths, config })
}

fn run_init(runtime: &RuntimeOptions, args: InitArgs) -> Result<()> {
    let workspace = resolve_workspace(runtime)?;
    let report = init_layout(&workspace.paths, args.force)?;
    println!("project_root: {}", normalize_path(&workspace.paths.project_root));
    for dir in &report.created_dirs {
        println!("created: {}", normalize_path(dir));
    }
    println!(
        "config: {} ({})",
        normalize_path(&workspace.paths.config_path),
        if report.wrote_config { "written" } else { "kept" }
    );
    Ok(())
}

fn run_paths(runtime: &RuntimeOptions) -> Result<()> {
    let workspace = resolve_workspace(runtime)?;
    let paths = &workspace.paths;
    println!("{}", paths.diagnostics());
    println!("keybinds exists: {}", format_flag(paths.keybinds_path.exists()));
    println!("cache exists: {}", format_flag(paths.cache_path.exists()));
    println!("config exists: {}", format_flag(paths.config_path.exists()));
    Ok(())
}

fn run_list_missing(runtime: &RuntimeOptions) -> Result<()> {
    let workspace = resolve_workspace(runtime)?;
    let document = load_keybinds(&workspace.paths.keybinds_path)?;

    let mut count = 0usize;
    let mut current_class = None;
    for entry in missing_ids(&document) {
        if current_class != Some(entry.class_key) {
            println!("\n{}:", entry.class_name);
            current_class = Some(entry.class_key);
        }
        println!("  {}: {}", entry.keybind, entry.ability_name);
        count += 1;
    }
    if count == 0 {
        println!("All abilities have spell ids.");
    } else {
        println!("\nmissing: {count} of {}", document.ability_count());
    }
    Ok(())
}

fn run_set_id(runtime: &RuntimeOptions, args: SetIdArgs) -> Result<()> {
    let workspace = resolve_workspace(runtime)?;
    let path = &workspace.paths.keybinds_path;
    let mut document = load_keybinds(path)?;

    let update = set_spell_id(
        &mut document,
        &args.class.trim().to_ascii_lowercase(),
        &args.key.trim().to_ascii_lowercase(),
        args.spell_id,
    )?;
    save_keybinds(path, &document)?;
    print_update(&update);
    println!("saved: {}", normalize_path(path));
    Ok(())
}

fn run_seed(runtime: &RuntimeOptions) -> Result<()> {
    let workspace = resolve_workspace(runtime)?;
    let path = &workspace.paths.keybinds_path;
    let mut document = load_keybinds(path)?;

    let updates = seed_known_ids(&mut document);
    if updates.is_empty() {
        println!("No updates needed.");
        return Ok(());
    }
    for update in &updates {
        print_update(update);
    }
    save_keybinds(path, &document)?;
    println!("updated: {}", updates.len());
    println!("saved: {}", normalize_path(path));
    Ok(())
}

fn run_import_csv(runtime: &RuntimeOptions, args: ImportCsvArgs) -> Result<()> {
    let workspace = resolve_workspace(runtime)?;
    let path = &workspace.paths.keybinds_path;
    let mut document = load_keybinds(path)?;
    let content = fs::read_to_string(&args.path)
        .with_context(|| format!("failed to read {}", args.path.display()))?;

    let report = import_csv(&mut document, &content)?;
    for update in &report.updates {
        print_update(update);
    }
    for error in &report.errors {
        println!("error: {error}");
    }
    println!("updated: {}", report.updates.len());
    println!("blank: {}", report.blank);
    println!("errors: {}", report.errors.len());

    if report.updates.is_empty() {
        println!("Nothing to save.");
        return Ok(());
    }
    save_after_confirmation(&mut StdinPrompt, path, &document)
}

fn run_csv_template(runtime: &RuntimeOptions, args: OutputArgs) -> Result<()> {
    let workspace = resolve_workspace(runtime)?;
    let document = load_keybinds(&workspace.paths.keybinds_path)?;
    write_output(args.output.as_deref(), &render_csv_template(&document))
}

fn run_search(runtime: &RuntimeOptions, args: SearchArgs) -> Result<()> {
    let workspace = resolve_workspace(runtime)?;
    let http = HttpClient::new(HttpClientConfig::wowhead(&workspace.config))?;
    let mut search = WowheadSearch::new(http);

    if !args.name.is_empty() {
        return print_search(&mut search, &args.name.join(" "));
    }

    let mut prompt = StdinPrompt;
    println!("Enter ability names to look up ('quit' or 'exit' to stop).");
    while let Some(line) = prompt.ask("ability name")? {
        let name = line.trim();
        if matches!(name.to_ascii_lowercase().as_str(), "quit" | "exit") {
            break;
        }
        if name.is_empty() {
            continue;
        }
        if let Err(error) = print_search(&mut search, name) {
            log::warn!("{error:#}");
        }
    }
    Ok(())
}

fn print_search<S: SpellSearch>(search: &mut S, name: &str) -> Result<()> {
    let candidates = search.search(name)?;
    let Some(first) = candidates.first().copied() else {
        println!("{}: no spell id found", clean_ability_name(name));
        return Ok(());
    };
    println!("{}: {first} ({})", clean_ability_name(name), spell_page_url(first));
    if candidates.len() > 1 {
        let others = candidates[1..]
            .iter()
            .take(4)
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        println!("  other candidates: {}", others.join(", "));
    }
    Ok(())
}

fn run_search_all(runtime: &RuntimeOptions, args: SearchAllArgs) -> Result<()> {
    let workspace = resolve_workspace(runtime)?;
    let path = &workspace.paths.keybinds_path;
    let mut document = load_keybinds(path)?;
    let http = HttpClient::new(HttpClientConfig::wowhead(&workspace.config))?;
    let mut search = WowheadSearch::new(http);
    let mut prompt = StdinPrompt;

    let applied = if args.batch {
        let report = collect_suggestions(&document, &mut search);
        for suggestion in &report.suggestions {
            println!("{} -> {}", suggestion.target.label, suggestion.id);
        }
        for target in &report.not_found {
            println!("{}: no spell id found", target.label);
        }
        println!("found: {}", report.suggestions.len());
        println!("not_found: {}", report.not_found.len());
        if report.suggestions.is_empty() {
            return Ok(());
        }
        if !confirm(&mut prompt, "Apply all suggestions?")? {
            println!("No changes applied.");
            return Ok(());
        }
        apply_suggestions(&mut document, &report.suggestions)?.len()
    } else {
        let report = review_suggestions_interactive(&mut document, &mut search, &mut prompt)?;
        println!("accepted: {}", report.accepted.len());
        println!("skipped: {}", report.skipped);
        println!("not_found: {}", report.not_found);
        if report.quit_early {
            println!("Stopped early.");
        }
        report.accepted.len()
    };

    if applied == 0 {
        println!("Nothing to save.");
        return Ok(());
    }
    save_after_confirmation(&mut prompt, path, &document)
}

fn run_fetch(runtime: &RuntimeOptions, args: FetchArgs) -> Result<()> {
    let workspace = resolve_workspace(runtime)?;
    let config = &workspace.config;
    let paths = &workspace.paths;
    let document = load_keybinds(&paths.keybinds_path)?;
    let cache = load_cache(&paths.cache_path)?;

    let mut source: Box<dyn AbilitySource> = match args.source {
        SourceKind::Blizzard => Box::new(blizzard_source(paths, config)?),
        SourceKind::Wowhead => Box::new(wowhead_source(config)?),
        SourceKind::Auto => Box::new(FallbackSource::new(
            blizzard_source(paths, config)?,
            wowhead_source(config)?,
        )),
    };
    log::info!("fetching from {}", source.source_name());

    let policy = RefreshPolicy::new(config.stale_after_days(), args.force);
    let (cache, report) = refresh_cache(&document, cache, source.as_mut(), policy, Utc::now());
    save_cache(&paths.cache_path, &cache)?;

    println!("total: {}", report.total);
    println!("new: {}", report.new);
    println!("updated: {}", report.updated);
    println!("skipped: {}", report.skipped);
    println!("not_found: {}", report.not_found);
    println!("failed: {}", report.failed);
    println!("cache entries: {}", cache.len());
    println!("saved: {}", normalize_path(&paths.cache_path));
    Ok(())
}

fn blizzard_source(paths: &ResolvedPaths, config: &ToolConfig) -> Result<BlizzardSource<HttpClient>> {
    let credentials = resolve_credentials(&paths.env_path)?;
    let exchange = OAuthExchange::new(
        HttpClient::new(HttpClientConfig::blizzard(config))?,
        config.oauth_url(),
    );
    let store = FileTokenStore::new(paths.token_path.clone());
    let token = CachedTokenProvider::new(credentials, exchange, store).access_token(false)?;
    Ok(BlizzardSource::new(
        HttpClient::new(HttpClientConfig::blizzard(config))?,
        token.access_token,
        BlizzardConfig::from_config(config),
    ))
}

fn wowhead_source(config: &ToolConfig) -> Result<WowheadSource<HttpClient>> {
    Ok(WowheadSource::new(HttpClient::new(
        HttpClientConfig::wowhead(config),
    )?))
}

fn run_merge(runtime: &RuntimeOptions) -> Result<()> {
    let workspace = resolve_workspace(runtime)?;
    let paths = &workspace.paths;
    let report = merge_files(&paths.keybinds_path, &paths.cache_path)?;
    println!("merged: {}", report.merged);
    println!("missing_from_cache: {}", report.missing);
    println!("without_id: {}", report.without_id);
    println!("saved: {}", normalize_path(&paths.keybinds_path));
    Ok(())
}

fn run_search_list(runtime: &RuntimeOptions, args: OutputArgs) -> Result<()> {
    let workspace = resolve_workspace(runtime)?;
    let document = load_keybinds(&workspace.paths.keybinds_path)?;
    write_output(args.output.as_deref(), &render_search_list(&document)?)
}

fn run_probe(runtime: &RuntimeOptions, args: ProbeArgs) -> Result<()> {
    let workspace = resolve_workspace(runtime)?;
    let mut http = HttpClient::new(HttpClientConfig::wowhead(&workspace.config))?;
    let results = probe_endpoints(&mut http, args.spell_id);
    println!("{}", render_probe_report(&results));
    Ok(())
}

fn print_update(update: &IdUpdate) {
    println!(
        "{} - {}: {} ({} -> {})",
        update.class_name,
        update.key_id.to_ascii_uppercase(),
        update.ability_name,
        update.previous_label(),
        update.new
    );
}

fn save_after_confirmation<P: Prompt>(
    prompt: &mut P,
    path: &Path,
    document: &KeybindsDocument,
) -> Result<()> {
    if !confirm(prompt, &format!("Save changes to {}?", normalize_path(path)))? {
        println!("Changes discarded.");
        return Ok(());
    }
    save_keybinds(path, document)?;
    println!("saved: {}", normalize_path(path));
    Ok(())
}

fn write_output(output: Option<&Path>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            fs::write(path, content)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("wrote: {}", normalize_path(path));
        }
        None => print!("{content}"),
    }
    Ok(())
}

fn normalize_path(path: &Path) -> String {
    normalize_for_display(path)
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
