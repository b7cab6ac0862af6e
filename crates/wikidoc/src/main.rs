use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use wikidoc_core::assembler::{Assembler, AssemblerOptions, PageFailure, PageSummary};
use wikidoc_core::config::{DocsConfig, load_config};
use wikidoc_core::filesystem::{ScanStats, WikiSources, read_optional_text, scan_wiki_sources};
use wikidoc_core::index::{StoredIndexStats, load_index_stats};
use wikidoc_core::package::{DocsetLayout, write_docset, write_single_page};
use wikidoc_core::render::{CommandRenderer, find_renderer};
use wikidoc_core::runtime::{
    InitOptions, PathOverrides, ResolutionContext, ResolvedPaths, ensure_wiki_ready, init_layout,
    inspect_runtime, resolve_paths,
};
use wikidoc_core::sidebar::{PageOrderOptions, PageRef, resolve_page_order};

#[derive(Debug, Parser)]
#[command(
    name = "wikidoc",
    version,
    about = "Assemble wiki markdown pages into a single HTML file or an offline docset"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    project_root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH", help = "Wiki checkout holding *.md pages")]
    wiki_dir: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    output_dir: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[arg(short, long, global = true, help = "Log progress at info level")]
    verbose: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    project_root: Option<PathBuf>,
    wiki_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    config: Option<PathBuf>,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            project_root: cli.project_root.clone(),
            wiki_dir: cli.wiki_dir.clone(),
            output_dir: cli.output_dir.clone(),
            config: cli.config.clone(),
            diagnostics: cli.diagnostics,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Create .wikidoc/config.toml and the wiki directory")]
    Init(InitArgs),
    #[command(about = "Show resolved paths, renderer and warnings")]
    Status,
    #[command(about = "Print the resolved page order")]
    Pages(PagesArgs),
    #[command(about = "Generate one self-contained HTML file")]
    Single(SingleArgs),
    #[command(about = "Generate a docset bundle with a search index")]
    Docset(DocsetArgs),
    #[command(about = "Render one page and print its heading outline as JSON")]
    Outline(OutlineArgs),
    Index(IndexArgs),
}

#[derive(Debug, Args)]
struct InitArgs {
    #[arg(long, help = "Overwrite an existing config file")]
    force: bool,
}

#[derive(Debug, Args)]
struct PagesArgs {
    #[arg(long, help = "Append pages the sidebar does not list")]
    all: bool,
}

#[derive(Debug, Args)]
struct SingleArgs {
    #[arg(long, value_name = "FILE", help = "Output file name inside the output directory")]
    output: Option<String>,
}

#[derive(Debug, Args)]
struct DocsetArgs {
    #[arg(long, help = "Only convert home and the pages listed in the sidebar")]
    sidebar_only: bool,
}

#[derive(Debug, Args)]
struct OutlineArgs {
    page: String,
}

#[derive(Debug, Args)]
struct IndexArgs {
    #[command(subcommand)]
    command: IndexSubcommand,
}

#[derive(Debug, Subcommand)]
enum IndexSubcommand {
    #[command(about = "Count stored search index rows by type")]
    Stats {
        #[arg(value_name = "DSIDX")]
        path: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Init(args)) => run_init(&runtime, args),
        Some(Commands::Status) => run_status(&runtime),
        Some(Commands::Pages(args)) => run_pages(&runtime, args),
        Some(Commands::Single(args)) => run_single(&runtime, args),
        Some(Commands::Docset(args)) => run_docset(&runtime, args),
        Some(Commands::Outline(OutlineArgs { page })) => run_outline(&runtime, &page),
        Some(Commands::Index(IndexArgs { command })) => match command {
            IndexSubcommand::Stats { path } => run_index_stats(&runtime, path),
        },
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    // --verbose enables INFO, otherwise RUST_LOG or WARN
    let filter = if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_init(runtime: &RuntimeOptions, args: InitArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let report = init_layout(&paths, &InitOptions { force: args.force })?;

    println!("Initialized wikidoc layout");
    println!("project_root: {}", normalize_path(&paths.project_root));
    println!("wiki_dir: {}", normalize_path(&paths.wiki_dir));
    println!("output_dir: {}", normalize_path(&paths.output_dir));
    println!("config_path: {}", normalize_path(&paths.config_path));
    println!("created_dirs: {}", report.created_dirs.len());
    println!("wrote_config: {}", report.wrote_config);
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_status(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let status = inspect_runtime(&paths);
    let config = load_config(&paths.config_path)?;

    println!("runtime status");
    println!("project_root: {}", normalize_path(&paths.project_root));
    println!("project_root_exists: {}", format_flag(status.project_root_exists));
    println!("wiki_dir: {}", normalize_path(&paths.wiki_dir));
    println!("wiki_dir_exists: {}", format_flag(status.wiki_dir_exists));
    println!("sidebar_exists: {}", format_flag(status.sidebar_exists));
    println!("footer_exists: {}", format_flag(status.footer_exists));
    println!("output_dir: {}", normalize_path(&paths.output_dir));
    println!("output_dir_exists: {}", format_flag(status.output_dir_exists));
    println!("config_exists: {}", format_flag(status.config_exists));
    println!("renderer.command: {}", config.renderer_command());
    println!(
        "renderer.path: {}",
        find_renderer(&config, &paths.project_root)
            .map(|path| normalize_path(&path))
            .unwrap_or_else(|| "<not found>".to_string())
    );
    println!("renderer.timeout_ms: {}", config.render_timeout().as_millis());
    if status.wiki_dir_exists {
        let sources = scan_wiki_sources(&paths.wiki_dir)?;
        print_scan_stats("scan", &sources.stats());
    }
    print_warnings(&status.warnings);
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_pages(runtime: &RuntimeOptions, args: PagesArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let (sources, pages) = load_pages(&paths, args.all)?;

    println!("page order");
    println!("wiki_dir: {}", normalize_path(&paths.wiki_dir));
    print_scan_stats("scan", &sources.stats());
    println!("pages.count: {}", pages.len());
    for page in &pages {
        println!(
            "page: {} | title={} | anchor={} | file={}",
            page.name,
            page.title,
            page.anchor_id(),
            page.output_file()
        );
    }
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_single(runtime: &RuntimeOptions, args: SingleArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let (_, pages) = load_pages(&paths, false)?;
    let footer = read_optional_text(&paths.footer_path())?;
    let mut assembler = build_assembler(&config, &paths)?;

    let site = assembler.build_single_page(&pages, footer.as_deref())?;
    let file_name = args
        .output
        .unwrap_or_else(|| config.single_page_file().to_string());
    let output_path = write_single_page(&paths.output_dir, &file_name, &site)?;

    println!("single-page build");
    println!("output: {}", normalize_path(&output_path));
    println!("pages.listed: {}", pages.len());
    print_page_summaries(&site.pages);
    print_failures(&site.failures);
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_docset(runtime: &RuntimeOptions, args: DocsetArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let (_, pages) = load_pages(&paths, !args.sidebar_only)?;
    let footer = read_optional_text(&paths.footer_path())?;
    let mut assembler = build_assembler(&config, &paths)?;

    let build = assembler.build_docset(&pages, footer.as_deref())?;
    let identity = config.docset_identity();
    let report = write_docset(&paths.output_dir, &identity, &build)?;

    println!("docset build");
    println!("bundle: {}", normalize_path(&report.bundle_path));
    println!("index_file: {}", build.index_file);
    println!("documents: {}", report.documents_written);
    println!("index.inserted: {}", report.index.inserted);
    println!("index.ignored: {}", report.index.ignored);
    print_page_summaries(&build.pages);
    print_failures(&build.failures);
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_outline(runtime: &RuntimeOptions, page_name: &str) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let status = inspect_runtime(&paths);
    ensure_wiki_ready(&paths, &status)?;
    let sources = scan_wiki_sources(&paths.wiki_dir)?;
    let name = page_name.trim().trim_end_matches(".md");
    let Some(source) = sources.get(name) else {
        bail!(
            "page `{name}` not found in {}\nRun `wikidoc pages --all` to list available pages.",
            normalize_path(&paths.wiki_dir)
        );
    };
    let page = PageRef {
        name: source.name.clone(),
        title: source.name.clone(),
        source_file: source.path.clone(),
    };

    let mut assembler = build_assembler(&config, &paths)?;
    let (_, toc) = assembler.page_outline(&page)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&toc.to_outline()).context("failed to serialize outline")?
    );
    Ok(())
}

fn run_index_stats(runtime: &RuntimeOptions, path: Option<PathBuf>) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let db_path = match path {
        Some(path) => path,
        None => {
            let config = load_config(&paths.config_path)?;
            DocsetLayout::new(&paths.output_dir, &config.docset_identity().name).search_index()
        }
    };

    println!("index stats");
    println!("db_path: {}", normalize_path(&db_path));
    match load_index_stats(&db_path)? {
        Some(stats) => print_stored_index_stats("index", &stats),
        None => println!("index.storage: <not built> (run `wikidoc docset`)"),
    }
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn load_pages(paths: &ResolvedPaths, include_unlisted: bool) -> Result<(WikiSources, Vec<PageRef>)> {
    let status = inspect_runtime(paths);
    ensure_wiki_ready(paths, &status)?;
    let sources = scan_wiki_sources(&paths.wiki_dir)?;
    if sources.is_empty() {
        bail!(
            "No wiki pages found.\nExpected *.md files in:\n  - {}",
            normalize_path(&paths.wiki_dir)
        );
    }
    let sidebar = read_optional_text(&paths.sidebar_path())?;
    if sidebar.is_none() {
        tracing::warn!(path = %normalize_path(&paths.sidebar_path()), "sidebar not found, using home page only");
    }
    let pages = resolve_page_order(
        sidebar.as_deref(),
        &sources,
        &PageOrderOptions { include_unlisted },
    );
    Ok((sources, pages))
}

fn build_assembler(config: &DocsConfig, paths: &ResolvedPaths) -> Result<Assembler<CommandRenderer>> {
    let renderer = CommandRenderer::from_config(config, &paths.project_root)?;
    tracing::info!(renderer = %normalize_path(&renderer.binary), "using renderer");
    Ok(Assembler::new(
        renderer,
        AssemblerOptions {
            site_title: config.site_title().to_string(),
        },
    ))
}

fn print_page_summaries(pages: &[PageSummary]) {
    println!("pages.assembled: {}", pages.len());
    for page in pages {
        println!(
            "page: {} | title={} | output={} | headings={} | links_rewritten={} | links_unresolved={}",
            page.name,
            page.title,
            page.output,
            page.headings,
            page.links_rewritten,
            page.links_unresolved
        );
    }
}

fn print_failures(failures: &[PageFailure]) {
    println!("pages.failed: {}", failures.len());
    for failure in failures {
        println!("failed: {} ({})", failure.name, failure.reason);
    }
}

fn print_scan_stats(prefix: &str, stats: &ScanStats) {
    println!("{prefix}.pages: {}", stats.pages);
    println!("{prefix}.skipped_special: {}", stats.skipped_special);
    println!("{prefix}.total_bytes: {}", stats.total_bytes);
}

fn print_stored_index_stats(prefix: &str, stats: &StoredIndexStats) {
    println!("{prefix}.rows: {}", stats.total_rows);
    if stats.by_type.is_empty() {
        println!("{prefix}.by_type: <empty>");
    } else {
        for (stored_type, count) in &stats.by_type {
            println!("{prefix}.type.{stored_type}: {count}");
        }
    }
}

fn print_warnings(warnings: &[String]) {
    if !warnings.is_empty() {
        println!("warnings:");
        for warning in warnings {
            println!("  - {warning}");
        }
    }
}

fn print_diagnostics(runtime: &RuntimeOptions, paths: &ResolvedPaths) {
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
}

fn resolve_runtime_paths(runtime: &RuntimeOptions) -> Result<ResolvedPaths> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        project_root: runtime.project_root.clone(),
        wiki_dir: runtime.wiki_dir.clone(),
        output_dir: runtime.output_dir.clone(),
        config: runtime.config.clone(),
    };

    let initial = resolve_paths(&context, &overrides)?;
    let project_env = initial.project_root.join(".env");
    if project_env.exists() {
        let _ = dotenvy::from_path_override(&project_env);
    }

    resolve_paths(&context, &overrides)
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
