use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bannertool_core::config::{BannerConfig, DEFAULT_CONFIG_FILE, load_config};
use bannertool_core::mediawiki::MediaWikiClientConfig;
use bannertool_core::pipeline::{PullOptions, pull_banners};
use bannertool_core::profile::GameProfile;
use clap::{Args, CommandFactory, Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Debug, Parser)]
#[command(
    name = "bannertool",
    version,
    about = "Rebuild gacha banner histories from fandom wiki categories"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    #[arg(short, long, global = true, help = "Enable debug logging")]
    verbose: bool,
    #[arg(short, long, global = true, conflicts_with = "verbose", help = "Only log errors")]
    quiet: bool,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Fetch banner pages and write YAML data plus icons")]
    Pull(PullArgs),
    #[command(about = "Print the resolved game profile as JSON")]
    Profile(ProfileArgs),
}

#[derive(Debug, Args)]
struct PullArgs {
    #[arg(long, value_name = "ID", help = "Game profile (gi, hsr, or a configured id)")]
    game: String,
    #[arg(long, value_name = "PATH", help = "YAML output file")]
    output: PathBuf,
    #[arg(long, value_name = "DIR", required_unless_present = "skip_images")]
    output_image_dir: Option<PathBuf>,
    #[arg(long, help = "Re-download icons that already exist")]
    force: bool,
    #[arg(long, help = "Write YAML only")]
    skip_images: bool,
    #[arg(long, value_name = "BYTES", help = "Abort when the YAML is smaller than this")]
    min_data_size: Option<usize>,
}

#[derive(Debug, Args)]
struct ProfileArgs {
    #[arg(long, value_name = "ID")]
    game: String,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    initialize_logging(&cli)?;

    match &cli.command {
        Some(Commands::Pull(args)) => run_pull(&cli, args),
        Some(Commands::Profile(args)) => run_profile(&cli, args),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn initialize_logging(cli: &Cli) -> Result<()> {
    let level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn run_pull(cli: &Cli, args: &PullArgs) -> Result<()> {
    let config = load_config(&cli.config)?;
    let profile = config.resolve_profile(&args.game)?;
    let client_config = MediaWikiClientConfig::from_config(&config, &profile);

    let options = PullOptions {
        output: args.output.clone(),
        image_dir: if args.skip_images {
            None
        } else {
            args.output_image_dir.clone()
        },
        force: args.force,
        min_data_size: args.min_data_size.unwrap_or_else(|| config.min_data_size()),
        image_size: config.image_size(),
        image_delay: config.image_delay(),
    };

    if cli.diagnostics {
        print_diagnostics(&cli.config, &config, &profile, &client_config);
    }

    let report = pull_banners(&profile, &client_config, &options)
        .with_context(|| format!("pull failed for {}", profile.id()))?;

    println!("pull complete");
    println!("game: {}", report.game);
    println!("output: {}", normalize_path(&options.output));
    println!("event_pages: {}", report.event_pages);
    println!("records: {}", report.records);
    println!("data_size: {}", report.data_size);
    println!(
        "images: {}",
        match &options.image_dir {
            Some(dir) => normalize_path(dir),
            None => "<skipped>".to_string(),
        }
    );
    println!("images_downloaded: {}", report.images_downloaded);
    println!("skipped_pages: {}", report.skipped_pages);
    println!("version_date_mismatches: {}", report.mismatches);
    println!("content_fetches: {}", report.content_fetches);
    println!("requests: {}", report.requests);
    Ok(())
}

fn run_profile(cli: &Cli, args: &ProfileArgs) -> Result<()> {
    let config = load_config(&cli.config)?;
    let profile = config.resolve_profile(&args.game)?;
    if cli.diagnostics {
        let client_config = MediaWikiClientConfig::from_config(&config, &profile);
        print_diagnostics(&cli.config, &config, &profile, &client_config);
    }
    let rendered = serde_json::to_string_pretty(profile.settings())
        .context("failed to serialize profile")?;
    println!("{rendered}");
    Ok(())
}

fn print_diagnostics(
    config_path: &Path,
    config: &BannerConfig,
    profile: &GameProfile,
    client: &MediaWikiClientConfig,
) {
    println!("[diagnostics]");
    println!(
        "config_path: {}{}",
        normalize_path(config_path),
        if config_path.exists() { "" } else { " (missing, using defaults)" }
    );
    println!("game: {} ({})", profile.id(), profile.settings().name);
    println!("api_url: {}", client.api_url);
    println!("wiki_url: {}", profile.wiki_url());
    println!("user_agent: {}", client.user_agent);
    println!("timeout_ms: {}", client.timeout_ms);
    println!("rate_limit_read_ms: {}", client.rate_limit_read_ms);
    println!("max_retries: {}", client.max_retries);
    println!("retry_delay_ms: {}", client.retry_delay_ms);
    println!("min_data_size: {}", config.min_data_size());
    println!("image_size: {}", config.image_size());
    println!("image_delay_ms: {}", config.image_delay().as_millis());
    println!(
        "chronicled_category: {}",
        profile
            .settings()
            .chronicled_category
            .as_deref()
            .unwrap_or("<none>")
    );
    println!();
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
