use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser, Subcommand};
use log::{LevelFilter, info};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode, WriteLogger};

use evidence_lens::document::DocumentReference;
use evidence_lens::evidence::{CategoryFilter, EvidenceItem, parse_evidence};
use evidence_lens::export::ExportPayload;
use evidence_lens::render::PageStatus;
use evidence_lens::settings;
use evidence_lens::viewer::{EvidenceViewer, ViewerStatus};

const RENDER_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "evidence-lens", version, about = "Render documents with evidence highlights")]
struct Cli {
    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// More logging (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render one page with its highlights to a PNG
    Render {
        #[arg(long)]
        document: String,
        #[arg(long)]
        evidence: PathBuf,
        #[arg(long)]
        page: u32,
        #[arg(long)]
        scale: Option<f32>,
        #[arg(long, default_value = "all")]
        category: CategoryFilter,
        #[arg(long)]
        select: Option<String>,
        #[arg(long)]
        hover: Option<String>,
        #[arg(long)]
        out: PathBuf,
    },

    /// List pages with their render window membership
    Pages {
        #[arg(long)]
        document: String,
        #[arg(long)]
        evidence: PathBuf,
        /// Visible page range, e.g. 3-6
        #[arg(long)]
        visible: Option<String>,
    },

    /// Print the evidence under a page-pixel position
    Hit {
        #[arg(long)]
        document: String,
        #[arg(long)]
        evidence: PathBuf,
        #[arg(long)]
        page: u32,
        #[arg(long)]
        x: f32,
        #[arg(long)]
        y: f32,
        #[arg(long)]
        scale: Option<f32>,
    },

    /// Print the export payload of one evidence item
    Export {
        #[arg(long)]
        evidence: PathBuf,
        #[arg(long)]
        id: String,
    },

    /// Show settings, or store a new default scale
    Config {
        #[arg(long)]
        scale: Option<f32>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref(), cli.verbose)?;

    let settings = settings::load_settings(cli.config.as_deref());
    info!("Starting evidence-lens");

    match cli.command {
        Command::Render {
            document,
            evidence,
            page,
            scale,
            category,
            select,
            hover,
            out,
        } => {
            let mut viewer = open_viewer(&settings, &document, &evidence, scale)?;
            viewer.set_filter(category);
            viewer.select(select.as_deref());
            viewer.hover(hover.as_deref());
            settle(&mut viewer, page)?;

            let image = viewer
                .compose_page(page)
                .with_context(|| format!("page {page} has no bitmap"))?;
            image
                .save(&out)
                .with_context(|| format!("writing {}", out.display()))?;
            println!("{}", out.display());
        }

        Command::Pages {
            document,
            evidence,
            visible,
        } => {
            let mut viewer = open_viewer(&settings, &document, &evidence, None)?;
            if let Some(range) = visible {
                viewer.report_visible(parse_range(&range)?);
            }
            for page in 1..=viewer.page_count() {
                let kind = if viewer.window().contains(&page) {
                    "render"
                } else {
                    "placeholder"
                };
                println!(
                    "{page:>5}  {kind:<11}  evidence: {}",
                    viewer.index().count_for_page(page)
                );
            }
            println!("current page {} of {}", viewer.current_page(), viewer.page_count());
        }

        Command::Hit {
            document,
            evidence,
            page,
            x,
            y,
            scale,
        } => {
            let mut viewer = open_viewer(&settings, &document, &evidence, scale)?;
            settle(&mut viewer, page)?;
            match viewer.pointer_click(page, x, y) {
                Some(item) => println!("{}", item.id),
                None => println!("none"),
            }
        }

        Command::Export { evidence, id } => {
            let items = read_evidence(&evidence)?;
            let Some(item) = items.iter().find(|item| item.id == id) else {
                bail!("no evidence with id {id}");
            };
            println!("{}", ExportPayload::new(item).to_json()?);
        }

        Command::Config { scale } => {
            let path = cli
                .config
                .clone()
                .or_else(settings::preferred_config_path)
                .context("no config directory on this system")?;
            if let Some(scale) = scale {
                if !(scale.is_finite() && scale > 0.0) {
                    bail!("scale must be a positive number, got {scale}");
                }
                settings::set_scale(scale);
                settings::save_settings(Some(&path));
                info!("Default scale set to {scale}");
            }
            let current = settings::get_settings();
            println!("{}", path.display());
            println!("scale: {}", current.scale);
            println!("workers: {}", current.workers);
            println!("cache_capacity: {}", current.cache_capacity);
        }
    }

    Ok(())
}

fn init_logging(log_file: Option<&Path>, verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    match log_file {
        Some(path) => WriteLogger::init(
            level,
            Config::default(),
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )?,
        None => TermLogger::init(level, Config::default(), TerminalMode::Stderr, ColorChoice::Auto)?,
    }
    Ok(())
}

fn open_viewer(
    settings: &settings::Settings,
    document: &str,
    evidence: &Path,
    scale: Option<f32>,
) -> Result<EvidenceViewer> {
    let mut config = settings.viewer_config();
    if let Some(scale) = scale {
        config.scale = scale;
    }

    let mut viewer = EvidenceViewer::new(config);
    viewer.set_evidence(read_evidence(evidence)?);
    viewer
        .load(DocumentReference::parse(document))
        .with_context(|| format!("loading {document}"))?;
    Ok(viewer)
}

fn settle(viewer: &mut EvidenceViewer, page: u32) -> Result<()> {
    if !matches!(viewer.status(), ViewerStatus::Ready { .. }) {
        bail!("no document loaded");
    }
    let Some(state) = viewer.settle_page(page, RENDER_TIMEOUT) else {
        bail!("no document loaded");
    };
    match state.status {
        PageStatus::Ready => Ok(()),
        PageStatus::Error => match state.error {
            Some(error) => Err(error).with_context(|| format!("rendering page {page}")),
            None => bail!("rendering page {page} failed"),
        },
        status => bail!("page {page} still {status:?} after {RENDER_TIMEOUT:?}"),
    }
}

fn read_evidence(path: &Path) -> Result<Vec<EvidenceItem>> {
    let json = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    parse_evidence(&json).with_context(|| format!("parsing evidence in {}", path.display()))
}

fn parse_range(range: &str) -> Result<Vec<u32>> {
    let (start, end) = range.split_once('-').unwrap_or((range, range));
    let start: u32 = start.trim().parse().with_context(|| format!("bad page range {range}"))?;
    let end: u32 = end.trim().parse().with_context(|| format!("bad page range {range}"))?;
    if start == 0 || end < start {
        bail!("bad page range {range}");
    }
    Ok((start..=end).collect())
}
