use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use arc_browser::app::{Browser, NullSink, SearchResult};
use arc_browser::config::{ConfigLoader, Overrides, ResolvedConfig};
use arc_browser::domain::{Attributes, Level, RETRIEVE_URI, SOP_INSTANCE_UID};
use arc_browser::error::BrowserError;
use arc_browser::inspector::{InspectorLine, inspect};
use arc_browser::output::{JsonOutput, OutputMode};
use arc_browser::qido::QidoHttpClient;
use arc_browser::query::Range;
use arc_browser::stow::{StowHttpClient, UploadQueue};
use arc_browser::tui::{Tui, TuiClients};
use arc_browser::wado::{InstanceLinks, WadoClient, WadoHttpClient, list_links};

#[derive(Parser)]
#[command(name = "arc-browser")]
#[command(about = "Browse a DICOM archive over QIDO-RS, WADO and STOW-RS")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    base_url: Option<String>,

    #[arg(long, global = true)]
    aet: Option<String>,

    #[arg(long, global = true)]
    limit: Option<usize>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Open the interactive browser (default)")]
    Browse(BrowseArgs),
    #[command(about = "Search studies")]
    Studies(StudiesArgs),
    #[command(about = "List the series of a study")]
    Series(SeriesArgs),
    #[command(about = "List the instances of a series")]
    Instances(InstancesArgs),
    #[command(about = "Show the attribute tree of a study, series or instance")]
    Attributes(TargetArgs),
    #[command(about = "Show view and download links of the instances of a series")]
    Links(InstancesArgs),
    #[command(about = "Download a study, series or instance")]
    Download(DownloadArgs),
    #[command(about = "Store DICOM files in the archive")]
    Upload(UploadArgs),
}

#[derive(Args, Default)]
struct SearchFilters {
    /// Attribute matcher, NAME=VALUE (repeatable)
    #[arg(long = "match", value_name = "NAME=VALUE")]
    matchers: Vec<String>,

    #[arg(long)]
    order_by: Option<String>,

    #[arg(long)]
    date_from: Option<String>,

    #[arg(long)]
    date_to: Option<String>,

    #[arg(long)]
    time_from: Option<String>,

    #[arg(long)]
    time_to: Option<String>,
}

#[derive(Args)]
struct BrowseArgs {
    #[command(flatten)]
    filters: SearchFilters,

    /// Files to put in the upload queue on start
    #[arg(long = "queue", value_name = "FILE")]
    queue: Vec<Utf8PathBuf>,
}

#[derive(Args)]
struct StudiesArgs {
    #[command(flatten)]
    filters: SearchFilters,

    #[arg(long, default_value_t = 0)]
    offset: usize,
}

#[derive(Args)]
struct SeriesArgs {
    study_uid: String,

    #[arg(long, default_value_t = 0)]
    offset: usize,
}

#[derive(Args)]
struct InstancesArgs {
    study_uid: String,
    series_uid: String,

    #[arg(long, default_value_t = 0)]
    offset: usize,
}

#[derive(Args)]
struct TargetArgs {
    study_uid: String,
    series_uid: Option<String>,
    sop_instance_uid: Option<String>,
}

#[derive(Args)]
struct DownloadArgs {
    #[command(flatten)]
    target: TargetArgs,

    /// Keep the archive's stored transfer syntax
    #[arg(long)]
    compressed: bool,

    /// Destination directory (defaults to the configured download_dir)
    #[arg(long)]
    out: Option<Utf8PathBuf>,
}

#[derive(Args)]
struct UploadArgs {
    #[arg(required = true)]
    files: Vec<Utf8PathBuf>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<BrowserError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &BrowserError) -> u8 {
    match error {
        BrowserError::ConfigRead(_)
        | BrowserError::ConfigParse(_)
        | BrowserError::InvalidLimit(_)
        | BrowserError::EmptyUpload
        | BrowserError::MissingAttribute(_)
        | BrowserError::RecordNotFound { .. } => 2,
        BrowserError::QidoHttp(_)
        | BrowserError::QidoStatus { .. }
        | BrowserError::WadoHttp(_)
        | BrowserError::WadoStatus { .. }
        | BrowserError::StowHttp(_)
        | BrowserError::StowStatus { .. }
        | BrowserError::InvalidResponse(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let mut resolved = ConfigLoader::resolve(cli.config.as_deref())?;
    resolved.apply(Overrides {
        base_url: cli.base_url,
        aet: cli.aet,
        limit: cli.limit,
        order_by: None,
    })?;

    match cli.command {
        None => {
            if matches!(output_mode, OutputMode::Interactive) {
                run_browse(
                    BrowseArgs {
                        filters: SearchFilters::default(),
                        queue: Vec::new(),
                    },
                    resolved,
                )
            } else {
                Err(miette::Report::msg(
                    "command required (try `arc-browser --help`)",
                ))
            }
        }
        Some(Commands::Browse(args)) => run_browse(args, resolved),
        Some(Commands::Studies(args)) => run_studies(args, resolved, output_mode),
        Some(Commands::Series(args)) => run_series(args, resolved, output_mode),
        Some(Commands::Instances(args)) => run_instances(args, resolved, output_mode),
        Some(Commands::Attributes(args)) => run_attributes(args, resolved, output_mode),
        Some(Commands::Links(args)) => run_links(args, resolved, output_mode),
        Some(Commands::Download(args)) => run_download(args, resolved, output_mode),
        Some(Commands::Upload(args)) => run_upload(args, resolved, output_mode),
    }
}

fn open_browser(
    resolved: &ResolvedConfig,
    filters: &SearchFilters,
) -> miette::Result<Browser<QidoHttpClient>> {
    let client = QidoHttpClient::new(&resolved.base_url)?;
    let mut form = resolved.search_form();
    if let Some(order_by) = &filters.order_by {
        form.order_by = order_by.clone();
    }
    for matcher in &filters.matchers {
        let Some((name, value)) = matcher.split_once('=') else {
            return Err(miette::Report::msg(format!(
                "invalid matcher `{matcher}` (expected NAME=VALUE)"
            )));
        };
        form.set_matcher(name.trim(), value.trim());
    }
    form.study_date = Range::new(
        filters.date_from.clone().unwrap_or_default(),
        filters.date_to.clone().unwrap_or_default(),
    );
    form.study_time = Range::new(
        filters.time_from.clone().unwrap_or_default(),
        filters.time_to.clone().unwrap_or_default(),
    );
    Ok(Browser::new(client, form))
}

fn run_browse(args: BrowseArgs, resolved: ResolvedConfig) -> miette::Result<()> {
    let browser = open_browser(&resolved, &args.filters)?;
    let clients = TuiClients {
        wado: WadoHttpClient::new(&resolved.base_url)?,
        stow: StowHttpClient::new(&resolved.base_url)?,
    };
    let mut uploads = UploadQueue::new();
    for file in args.queue {
        uploads.add(file);
    }
    let tui = Tui::new(
        browser,
        clients,
        resolved.base_url.clone(),
        resolved.download_dir.clone(),
        uploads,
    );
    tui.run(true)
}

fn run_studies(
    args: StudiesArgs,
    resolved: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let mut browser = open_browser(&resolved, &args.filters)?;
    let pending = browser.prepare_search(args.offset);
    browser.run(pending, &NullSink)?;
    print_result(&browser.studies_page(), output_mode)
}

fn run_series(
    args: SeriesArgs,
    resolved: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let browser = open_browser(&resolved, &SearchFilters::default())?;
    let records =
        browser.search_level(Level::Series, Some(&args.study_uid), None, args.offset)?;
    let result = SearchResult::from_records(Level::Series, args.offset, &records);
    print_result(&result, output_mode)
}

fn run_instances(
    args: InstancesArgs,
    resolved: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let browser = open_browser(&resolved, &SearchFilters::default())?;
    let records = browser.search_level(
        Level::Instance,
        Some(&args.study_uid),
        Some(&args.series_uid),
        args.offset,
    )?;
    let result = SearchResult::from_records(Level::Instance, args.offset, &records);
    print_result(&result, output_mode)
}

fn run_attributes(
    args: TargetArgs,
    resolved: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let browser = open_browser(&resolved, &SearchFilters::default())?;
    let (_, record) = find_target(&browser, &args)?;
    let lines = inspect(&record);
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_attributes(&lines).into_diagnostic(),
        OutputMode::Interactive => {
            for line in &lines {
                match line {
                    InspectorLine::Attribute {
                        name, tag, vr, value, ..
                    } => println!("{}{name} {tag} {vr} {value}", line.indent()),
                    InspectorLine::Item { number, .. } => {
                        println!("{}Item #{number}", line.indent())
                    }
                }
            }
            Ok(())
        }
    }
}

fn run_links(
    args: InstancesArgs,
    resolved: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let browser = open_browser(&resolved, &SearchFilters::default())?;
    let records = browser.search_level(
        Level::Instance,
        Some(&args.study_uid),
        Some(&args.series_uid),
        args.offset,
    )?;
    let listing = list_links(&records);
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_links(&listing).into_diagnostic(),
        OutputMode::Interactive => {
            for entry in &listing {
                println!("{}", entry.sop_instance_uid);
                if let Some(uri) = &entry.view_uri {
                    println!("  view:       {uri}");
                }
                if let Some(links) = &entry.links {
                    println!("  download:   {}", links.download);
                    println!("  compressed: {}", links.download_compressed);
                    if let Some(selector) = links.selector() {
                        println!("  {}s:  {}", selector.title(), selector.count());
                    }
                }
                if let Some(error) = &entry.error {
                    println!("  error:      {error}");
                }
            }
            Ok(())
        }
    }
}

fn run_download(
    args: DownloadArgs,
    resolved: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let browser = open_browser(&resolved, &SearchFilters::default())?;
    let (level, record) = find_target(&browser, &args.target)?;
    let (uri, name) = match level {
        Level::Instance => {
            let links = InstanceLinks::for_instance(&record)?;
            let uri = if args.compressed {
                links.download_compressed
            } else {
                links.download
            };
            let sop = record.require_string(SOP_INSTANCE_UID)?;
            (uri, format!("{sop}.dcm"))
        }
        Level::Study | Level::Series => {
            let uid = args
                .target
                .series_uid
                .as_deref()
                .unwrap_or(&args.target.study_uid);
            (record.require_string(RETRIEVE_URI)?, format!("{uid}.multipart"))
        }
    };

    let dir = args.out.unwrap_or(resolved.download_dir);
    let destination = dir.join(name);
    let client = WadoHttpClient::new(&resolved.base_url)?;
    let bytes = client.download(&uri, &destination)?;
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_json(&serde_json::json!({
            "uri": uri,
            "path": destination.as_str(),
            "bytes": bytes,
        }))
        .into_diagnostic(),
        OutputMode::Interactive => {
            println!("saved {destination} ({bytes} bytes)");
            Ok(())
        }
    }
}

fn run_upload(
    args: UploadArgs,
    resolved: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let browser = open_browser(&resolved, &SearchFilters::default())?;
    let client = StowHttpClient::new(&resolved.base_url)?;
    let mut queue = UploadQueue::new();
    for file in args.files {
        queue.add(file);
    }
    let receipt = queue.process(&client, &browser.store_path())?;
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_store(&receipt).into_diagnostic(),
        OutputMode::Interactive => {
            println!("stored {} files (HTTP {})", receipt.files, receipt.status);
            Ok(())
        }
    }
}

fn find_target(
    browser: &Browser<QidoHttpClient>,
    target: &TargetArgs,
) -> Result<(Level, Attributes), BrowserError> {
    let study = target.study_uid.as_str();
    match (target.series_uid.as_deref(), target.sop_instance_uid.as_deref()) {
        (None, _) => browser
            .find_record(Level::Study, study, None, study)
            .map(|record| (Level::Study, record)),
        (Some(series), None) => browser
            .find_record(Level::Series, study, None, series)
            .map(|record| (Level::Series, record)),
        (Some(series), Some(sop)) => browser
            .find_record(Level::Instance, study, Some(series), sop)
            .map(|record| (Level::Instance, record)),
    }
}

fn print_result(result: &SearchResult, output_mode: OutputMode) -> miette::Result<()> {
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_search(result).into_diagnostic(),
        OutputMode::Interactive => {
            let cyan = "\x1b[36m";
            let reset = "\x1b[0m";
            let Some(first) = result.rows.first() else {
                println!("no {} found", result.level.plural());
                return Ok(());
            };
            let headers = first
                .columns
                .iter()
                .map(|column| column.header)
                .collect::<Vec<_>>();
            println!("{cyan}#\t{}{reset}", headers.join("\t"));
            for row in &result.rows {
                let values = row
                    .columns
                    .iter()
                    .map(|column| column.value.as_str())
                    .collect::<Vec<_>>();
                println!("{}\t{}", row.number, values.join("\t"));
            }
            Ok(())
        }
    }
}
