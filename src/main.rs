//! Main entry point for the multidl CLI

use anyhow::Context;
use clap::Parser;
use multidl::batch::{execute_batch, load_manifest, BatchOptions};
use multidl::cli::args::{AuthCommand, BatchArgs, DownloadArgs, FormArgs, SessionCommand};
use multidl::cli::output::create_progress_callback;
use multidl::cli::{Args, Command, OutputFormatter, VerbosityLevel};
use multidl::config::AppConfig;
use multidl::core::{detect_handler, Credentials, Downloader, HandlerOptions, Source};
use multidl::session::SessionStore;
use multidl::ui::{run_form, FormEvent, FormState};
use multidl::utils::is_http_url;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbosity_level());
    debug!("Starting multidl with args: {:?}", args);

    let config = AppConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    debug!("Loaded config: {:?}", config);

    // Initialize output formatter
    let formatter = Arc::new(OutputFormatter::new(args.verbosity_level()));
    let verbose = args.verbosity_level() == VerbosityLevel::Verbose;

    let exit_code = match args.command {
        Command::Download(download) => handle_download(&config, download, formatter, verbose).await?,
        Command::Batch(batch) => handle_batch(&config, batch, formatter, verbose).await?,
        Command::Form(form) => handle_form(&config, form, formatter, verbose).await?,
        Command::Auth { target } => handle_auth(&config, target, formatter).await?,
        Command::Session { action } => handle_session(&config, action, formatter)?,
    };

    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

/// Handle `download`: one handler call per URL, failures don't stop the rest
async fn handle_download(
    config: &AppConfig,
    args: DownloadArgs,
    formatter: Arc<OutputFormatter>,
    verbose: bool,
) -> anyhow::Result<i32> {
    let mut downloader = Downloader::from_config(config);
    if let Some(output) = &args.output {
        downloader = downloader.with_output_path(output);
    }
    if let Some(timeout) = args.timeout_duration() {
        downloader = downloader.with_timeout(timeout);
    }
    if let Some(retries) = args.retries {
        downloader = downloader.with_max_retries(retries);
    }
    if formatter.verbosity() != VerbosityLevel::Quiet {
        downloader = downloader.with_progress(create_progress_callback(formatter.clone()));
    }

    let mut options = HandlerOptions::default()
        .with_drive_method(args.drive_method.into())
        .with_instagram_auth(args.instagram_auth.into())
        .with_use_session(!args.no_session)
        .with_verbose(verbose);
    if let Some(username) = &args.username {
        options = options.with_instagram_username(username);
    }
    options.cookie_file = args.cookies.clone();
    options.extra_args = args.extra_args.clone();

    let mut failures = 0;
    for url in &args.urls {
        if !is_http_url(url) {
            formatter.error(&format!("Not an http(s) URL: {}", url));
            failures += 1;
            continue;
        }
        let Some(source) = args.source.or_else(|| detect_handler("", url)) else {
            formatter.error(&format!("Could not detect the source of {}; pass --source", url));
            failures += 1;
            continue;
        };

        formatter.print_download_start(url, downloader.output_path());
        let start_time = Instant::now();
        match downloader.download(source, url, &options).await {
            Ok(outcome) => formatter.print_download_complete(&outcome, start_time.elapsed()),
            Err(e) => {
                // Progress output already reported it
                debug!("Download of {} failed: {}", url, e);
                if formatter.verbosity() == VerbosityLevel::Quiet {
                    formatter.error(&format!("{}: {}", url, e));
                }
                failures += 1;
            }
        }
    }

    info!("Download finished: {} of {} failed", failures, args.urls.len());
    Ok(if failures > 0 { 1 } else { 0 })
}

/// Handle `batch`: exit code 1 when any item failed
async fn handle_batch(
    config: &AppConfig,
    args: BatchArgs,
    formatter: Arc<OutputFormatter>,
    verbose: bool,
) -> anyhow::Result<i32> {
    let items = load_manifest(&args.manifest, args.format.as_deref())
        .with_context(|| format!("failed to read manifest {}", args.manifest.display()))?;
    let out_dir = args.out_dir.clone().unwrap_or_else(|| config.output_dir.clone());

    let mut downloader = Downloader::from_config(config).with_output_path(&out_dir);
    if formatter.verbosity() != VerbosityLevel::Quiet {
        downloader = downloader.with_progress(create_progress_callback(formatter.clone()));
    }

    let options = BatchOptions {
        limit: args.limit,
        per_source_limit: args.per_source_limit,
        dry_run: args.dry_run,
        rate_per_minute: args.rate_per_minute,
        verbose,
    };

    formatter.info(&format!("Loaded {} items from {}", items.len(), args.manifest.display()));
    let report = execute_batch(items, &out_dir, &options, &downloader).await?;
    formatter.print_batch_report(&report, args.dry_run);

    Ok(if report.has_errors() { 1 } else { 0 })
}

/// Handle `form`
async fn handle_form(
    config: &AppConfig,
    args: FormArgs,
    formatter: Arc<OutputFormatter>,
    verbose: bool,
) -> anyhow::Result<i32> {
    let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();

    let progress_tx = events_tx.clone();
    let downloader = Arc::new(Downloader::from_config(config).with_progress(move |event| {
        let _ = progress_tx.send(FormEvent::Progress(event));
    }));

    let default_dir = args.output.unwrap_or_else(|| PathBuf::from("."));
    let state = FormState::new(default_dir).with_base_options(HandlerOptions::default().with_verbose(verbose));

    run_form(downloader, events_tx, events_rx, state, formatter).await?;
    Ok(0)
}

/// Handle `auth`
async fn handle_auth(
    config: &AppConfig,
    target: AuthCommand,
    formatter: Arc<OutputFormatter>,
) -> anyhow::Result<i32> {
    let downloader = Downloader::from_config(config);

    let (source, credentials) = match target {
        AuthCommand::Instagram {
            username,
            session_file: Some(path),
            ..
        } => (Source::Instagram, Credentials::SessionFile { username, path }),
        AuthCommand::Instagram {
            username, password, ..
        } => {
            let password = match password {
                Some(password) => password,
                None => rpassword::prompt_password(format!("Instagram password for {}: ", username))
                    .context("failed to read password")?,
            };
            (Source::Instagram, Credentials::Password { username, password })
        }
        AuthCommand::GoogleDrive { token } => (Source::GoogleDrive, Credentials::Token(token)),
    };

    downloader
        .authenticate(source, credentials)
        .await
        .with_context(|| format!("{} authentication failed", source))?;
    formatter.success(&format!("{} session saved", source));
    Ok(0)
}

/// Handle `session`
fn handle_session(
    config: &AppConfig,
    action: SessionCommand,
    formatter: Arc<OutputFormatter>,
) -> anyhow::Result<i32> {
    let store = SessionStore::new(&config.session_dir);

    match action {
        SessionCommand::ImportCookies { source, file } => {
            let path = store.import_cookie_file(source.display_name(), &file)?;
            formatter.success(&format!("Imported cookies for {} into {}", source, path.display()));
        }
        SessionCommand::List { source } => {
            let files = store.list_files(source.display_name(), None)?;
            if files.is_empty() {
                formatter.info(&format!("No stored files for {}", source));
            }
            for (name, path) in files {
                println!("{}\t{}", name, path.display());
            }
        }
        SessionCommand::Path { source } => {
            println!("{}", store.ensure_dir(source.display_name())?.display());
        }
    }

    Ok(0)
}

/// Initialize logging system
fn init_logging(verbosity: VerbosityLevel) {
    let default_level = match verbosity {
        VerbosityLevel::Quiet => "error",
        VerbosityLevel::Normal => "info",
        VerbosityLevel::Verbose => "debug",
    };

    // RUST_LOG wins over the verbosity flags
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();
}
