use clap::{Parser, Subcommand};
use sitewright::imaging::RustBackend;
use sitewright::router::{BuildOptions, Router, Site};
use sitewright::source::MarkdownSource;
use sitewright::theme::Theme;
use sitewright::{config, generate, output};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Shared arguments of commands that build a site.
#[derive(clap::Args, Clone)]
struct SiteArgs {
    /// Site directory (the one holding content/)
    #[arg(default_value = ".")]
    site: PathBuf,

    /// Ignore the _wisdom cache and render every document again
    #[arg(long)]
    no_cache: bool,
}

#[derive(Parser)]
#[command(name = "sitewright")]
#[command(about = "Incremental build engine for taxonomy-driven static sites")]
#[command(long_about = "\
Incremental build engine for taxonomy-driven static sites

Documents are markdown files with TOML front matter. Taxonomy nodes classify
them; every listing (home, taxonomy, date archive, gallery) is paginated.

Site structure:

  site/
  ├── config.toml              # Site config (optional)
  ├── content/                 # Documents (*.md)
  │   ├── hello.md             # [meta] slug = \"hello\", pk = 42 → /42-hello/
  │   ├── trip/                # Gallery document + its images
  │   │   ├── index.md
  │   │   └── 001.jpg
  │   └── notes/
  │       ├── config.toml      # Subsite: parent_slug, subsite_slug
  │       └── first.md
  ├── taxonomy/                # Taxonomy nodes (*.md)
  │   ├── topics.md
  │   └── topics/rust.md
  └── theme/static/            # Assets served under /_static/

Output goes to site/publish/, cache state to site/_wisdom/.

Run 'sitewright gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Log build phases (RUST_LOG takes over when not set)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the site and publish it to publish/
    Build(SiteArgs),
    /// Run every build phase except publishing
    Check(SiteArgs),
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Build(args) => {
            println!("==> Building {}", args.site.display());
            let mut site = build(&args)?;
            output::print_build_summary(&site);

            println!("==> Publishing");
            init_thread_pool(&site.config.processing);
            let report = generate::publish(&mut site, &Theme, &RustBackend::new())?;
            output::print_publish_report(&report, &site.root.join(generate::PUBLISH_DIR));
            println!("==> Build complete");
        }
        Command::Check(args) => {
            println!("==> Checking {}", args.site.display());
            let site = build(&args)?;
            output::print_build_summary(&site);
            println!("==> Site is valid");
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

fn build(args: &SiteArgs) -> Result<Site, sitewright::router::BuildError> {
    let options = BuildOptions {
        use_cache: !args.no_cache,
    };
    Router::build(&args.site, &options, &MarkdownSource, &Theme)
}

/// `--verbose` logs at info; otherwise `RUST_LOG`, defaulting to warnings.
fn init_logging(verbose: bool) {
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

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; the config can constrain
/// down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
