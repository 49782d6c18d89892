use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;
use pagesession::engine::{DocumentSource, MupdfEngine, Quad};
use pagesession::{
    CancelToken, Patch, PixelBuffer, Point, RenderOutcome, Session, TileRequest, TocTarget,
    panic_handler, settings, speech_rates,
};
use serde::Serialize;
use simplelog::{Config, LevelFilter, WriteLogger};

#[derive(Debug, Parser)]
#[command(name = "pagesession")]
#[command(about = "Page-oriented document rendering, text and navigation")]
struct Cli {
    /// Log file path
    #[arg(long, global = true, default_value = "pagesession.log")]
    log_file: PathBuf,

    /// Log level (overrides the settings file)
    #[arg(long, global = true)]
    log_level: Option<LevelFilter>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
struct DocumentArgs {
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Password for encrypted documents
    #[arg(long)]
    password: Option<String>,

    /// Format hint (extension or MIME type); defaults to the file extension
    #[arg(long)]
    magic: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print document metadata as JSON.
    Info {
        #[command(flatten)]
        doc: DocumentArgs,
    },
    /// Print the flattened outline as JSON.
    Outline {
        #[command(flatten)]
        doc: DocumentArgs,
    },
    /// Print the text of one page, or of the whole document.
    Text {
        #[command(flatten)]
        doc: DocumentArgs,
        /// 1-based page number
        #[arg(long)]
        page: Option<usize>,
    },
    /// Search one page and print hit quads as JSON.
    Search {
        #[command(flatten)]
        doc: DocumentArgs,
        #[arg(long, default_value_t = 1)]
        page: usize,
        query: String,
    },
    /// Render a page (or a patch of it) to PNG.
    Render {
        #[command(flatten)]
        doc: DocumentArgs,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long)]
        width: u32,
        #[arg(long)]
        height: u32,
        /// Sub-rectangle of the page raster as X,Y,W,H
        #[arg(long, value_parser = parse_patch)]
        patch: Option<Patch>,
        #[arg(long)]
        output: PathBuf,
    },
    /// Select text between two page-space points and print it as JSON.
    Select {
        #[command(flatten)]
        doc: DocumentArgs,
        #[arg(long, default_value_t = 1)]
        page: usize,
        x0: f32,
        y0: f32,
        x1: f32,
        y1: f32,
    },
    /// Re-paginate for a viewport and report where a page moved.
    Layout {
        #[command(flatten)]
        doc: DocumentArgs,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long)]
        width: f32,
        #[arg(long)]
        height: f32,
        #[arg(long)]
        em: f32,
    },
    /// List speech-rate presets.
    Rates,
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    title: Option<String>,
    page_count: usize,
    reflowable: bool,
    needs_password: bool,
    has_outline: bool,
    first_page_size: Option<PageSizeOutput>,
}

#[derive(Debug, Serialize)]
struct PageSizeOutput {
    width: f32,
    height: f32,
}

#[derive(Debug, Serialize)]
struct TocOutput {
    title: String,
    level: usize,
    page: Option<usize>,
    uri: Option<String>,
}

#[derive(Debug, Serialize)]
struct SelectionOutput {
    text: String,
    quads: Vec<Quad>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    settings::load_settings();
    let level = cli.log_level.unwrap_or_else(settings::get_log_level);
    WriteLogger::init(level, Config::default(), File::create(&cli.log_file)?)?;
    panic_handler::initialize_panic_handler();

    info!("Starting pagesession {}", env!("CARGO_PKG_VERSION"));
    let result = run(cli.command);
    info!("Shutting down pagesession");
    result
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Info { doc } => run_info(&doc),
        Commands::Outline { doc } => run_outline(&doc),
        Commands::Text { doc, page } => run_text(&doc, page),
        Commands::Search { doc, page, query } => run_search(&doc, page, &query),
        Commands::Render {
            doc,
            page,
            width,
            height,
            patch,
            output,
        } => run_render(&doc, page, width, height, patch, &output),
        Commands::Select {
            doc,
            page,
            x0,
            y0,
            x1,
            y1,
        } => run_select(&doc, page, Point::new(x0, y0), Point::new(x1, y1)),
        Commands::Layout {
            doc,
            page,
            width,
            height,
            em,
        } => run_layout(&doc, page, width, height, em),
        Commands::Rates => {
            for (label, rate) in speech_rates::rates() {
                println!("{label}\t{rate}");
            }
            Ok(())
        }
    }
}

fn open(args: &DocumentArgs) -> Result<Session<MupdfEngine>> {
    ensure_file_exists(&args.file)?;
    let bytes =
        fs::read(&args.file).with_context(|| format!("failed to read {}", args.file.display()))?;
    let magic = args.magic.clone().unwrap_or_else(|| {
        args.file
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("pdf")
            .to_string()
    });

    let session = Session::open(
        MupdfEngine::new(),
        DocumentSource::Bytes(bytes),
        &magic,
        settings::session_config(),
    )
    .with_context(|| format!("failed to open {}", args.file.display()))?;

    if let Some(password) = &args.password {
        if !session.authenticate(password)? {
            anyhow::bail!("wrong password");
        }
    } else if session.needs_password()? {
        anyhow::bail!("document is encrypted; pass --password");
    }
    Ok(session)
}

fn page_index(page: usize) -> Result<usize> {
    page.checked_sub(1)
        .context("--page is 1-based and must be >= 1")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_info(args: &DocumentArgs) -> Result<()> {
    let session = open(args)?;
    let page_count = session.page_count()?;
    let first_page_size = if page_count > 0 {
        session.page_size(0)?.map(|size| PageSizeOutput {
            width: size.width,
            height: size.height,
        })
    } else {
        None
    };

    print_json(&InfoOutput {
        path: args.file.display().to_string(),
        title: session.title()?,
        page_count,
        reflowable: session.is_reflowable()?,
        needs_password: session.needs_password()?,
        has_outline: session.has_outline()?,
        first_page_size,
    })
}

fn run_outline(args: &DocumentArgs) -> Result<()> {
    let session = open(args)?;
    let entries: Vec<TocOutput> = session
        .outline()?
        .into_iter()
        .map(|entry| {
            let (page, uri) = match entry.target {
                TocTarget::InternalPage(page) => (Some(page + 1), None),
                TocTarget::External(uri) => (None, Some(uri)),
            };
            TocOutput {
                title: entry.title,
                level: entry.level,
                page,
                uri,
            }
        })
        .collect();
    print_json(&entries)
}

fn run_text(args: &DocumentArgs, page: Option<usize>) -> Result<()> {
    let session = open(args)?;
    let text = match page {
        Some(page) => session.page_text(page_index(page)?)?,
        None => session.document_text()?,
    };
    print!("{text}");
    Ok(())
}

fn run_search(args: &DocumentArgs, page: usize, query: &str) -> Result<()> {
    let session = open(args)?;
    let hits = session.search(page_index(page)?, query)?;
    print_json(&hits)
}

fn run_render(
    args: &DocumentArgs,
    page: usize,
    width: u32,
    height: u32,
    patch: Option<Patch>,
    output: &Path,
) -> Result<()> {
    let session = open(args)?;
    let mut request = TileRequest::full_page(page_index(page)?, width, height);
    if let Some(patch) = patch {
        request.patch = patch;
    }

    let mut buffer = PixelBuffer::new(request.patch.width, request.patch.height);
    let outcome = session
        .render_tile(&request, &mut buffer, &CancelToken::none())
        .context("failed to render page")?;
    if outcome != RenderOutcome::Painted {
        anyhow::bail!("nothing was rendered ({outcome:?}); see the log for details");
    }

    let (w, h) = (buffer.width(), buffer.height());
    let image = image::RgbaImage::from_raw(w, h, buffer.into_pixels())
        .context("pixel buffer does not match its dimensions")?;

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    image
        .save(output)
        .with_context(|| format!("failed to write image to {}", output.display()))?;

    println!("{}", output.display());
    Ok(())
}

fn run_select(args: &DocumentArgs, page: usize, down: Point, current: Point) -> Result<()> {
    let session = open(args)?;
    let selection = session.select(down, current, page_index(page)?)?;
    print_json(&SelectionOutput {
        text: selection.text,
        quads: selection.quads,
    })
}

fn run_layout(args: &DocumentArgs, page: usize, width: f32, height: f32, em: f32) -> Result<()> {
    let session = open(args)?;
    let new_page = session.layout(page_index(page)?, width, height, em)?;
    println!(
        "page {page} -> {} of {}",
        new_page + 1,
        session.page_count()?
    );
    Ok(())
}

fn ensure_file_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}

fn parse_patch(value: &str) -> std::result::Result<Patch, String> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    let [x, y, w, h] = parts.as_slice() else {
        return Err(format!("expected X,Y,W,H, got {value:?}"));
    };
    let int = |s: &str| s.parse::<i32>().map_err(|e| format!("{s:?}: {e}"));
    let uint = |s: &str| s.parse::<u32>().map_err(|e| format!("{s:?}: {e}"));
    Ok(Patch::new(int(*x)?, int(*y)?, uint(*w)?, uint(*h)?))
}
