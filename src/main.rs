use clap::{Parser, Subcommand};
use pixbatch::config::{self, AppConfig, Recipe};
use pixbatch::export::ZipExporter;
use pixbatch::history::EntryId;
use pixbatch::imaging::RustBackend;
use pixbatch::output::{self, ProcessingStats};
use pixbatch::pipeline::PipelineEvent;
use pixbatch::session::Session;
use pixbatch::slideshow::{self, FfmpegEncoder};
use pixbatch::types::{self, SourceFile};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread::JoinHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    let hash = env!("GIT_HASH");
    if on_tag == "true" || hash.is_empty() {
        env!("CARGO_PKG_VERSION")
    } else {
        concat!(env!("CARGO_PKG_VERSION"), "+", env!("GIT_HASH"))
    }
}

#[derive(Parser)]
#[command(name = "pixbatch")]
#[command(about = "Batch image editor")]
#[command(long_about = "\
Batch image editor

Runs a recipe of tools over a set of images and exports the result as one
file or a ZIP archive. Tools: format, size, color, balance, merge, watermark.

Recipe structure:

  [[steps]]
  op = \"size\"
  mode = \"percentage\"     # percentage | fixed | width | height | crop
  percentage = 50

  [[steps]]
  op = \"color\"
  type = \"replace\"        # replace | grayscale | sepia | invert
  source_color = \"#ff0000\"
  target_color = \"#00ff00\"
  tolerance = 30

  [[steps]]
  op = \"watermark\"
  text = \"(c) me\"
  position = \"bottom-right\"

Directories given as inputs are searched for png, jpg, webp and gif files.

Run 'pixbatch gen-config' to generate a documented pixbatch.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Config file (defaults to ./pixbatch.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply a recipe to images and export the result
    Run {
        /// Recipe file
        recipe: PathBuf,
        /// Image files or directories
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Directory the export is written to
        #[arg(long, default_value = "out")]
        output: PathBuf,
        /// Revert to this history entry before exporting
        #[arg(long)]
        revert_to: Option<u64>,
    },
    /// Validate a recipe without touching any image
    Check {
        recipe: PathBuf,
    },
    /// Render images into a slideshow video (requires ffmpeg)
    Slideshow {
        /// Image files or directories
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Video file to write
        #[arg(long, default_value = "slideshow.mp4")]
        output: PathBuf,
        /// Recipe to apply before rendering
        #[arg(long)]
        recipe: Option<PathBuf>,
    },
    /// Print a stock pixbatch.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pixbatch=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .init();

    match cli.command {
        Command::Run {
            recipe,
            inputs,
            output: out_dir,
            revert_to,
        } => {
            let app_config = config::load_config(cli.config.as_deref())?;
            init_thread_pool(&app_config.processing);
            let recipe = Recipe::load(&recipe)?;

            let (tx, printer) = spawn_printer();
            let mut session = Session::new(RustBackend::new()).with_events(tx);
            load_inputs(&mut session, &inputs)?;
            for step in &recipe.steps {
                session.apply(step)?;
            }
            session.close_events();
            join_printer(printer)?;

            if let Some(id) = revert_to {
                session.revert_to(EntryId(id))?;
            }

            println!();
            output::print_working_set(session.working());
            output::print_history(session.history());
            output::print_stats(&ProcessingStats::of(session.working()));

            export_working(&session, &app_config, &out_dir)?;

            std::fs::create_dir_all(&out_dir)?;
            let json = serde_json::to_string_pretty(&session.history().summaries())?;
            std::fs::write(out_dir.join("history.json"), json)?;
        }
        Command::Check { recipe } => {
            println!("==> Checking {}", recipe.display());
            let recipe = Recipe::load(&recipe)?;
            for (i, step) in recipe.steps.iter().enumerate() {
                println!("{:0>3} {}: {}", i + 1, step.kind(), step.describe());
            }
            println!("==> Recipe is valid");
        }
        Command::Slideshow {
            inputs,
            output: video_path,
            recipe,
        } => {
            let app_config = config::load_config(cli.config.as_deref())?;
            init_thread_pool(&app_config.processing);
            let encoder = FfmpegEncoder::locate(app_config.slideshow.ffmpeg.as_deref())?;
            let recipe = recipe.as_deref().map(Recipe::load).transpose()?;

            let (tx, printer) = spawn_printer();
            let mut session = Session::new(RustBackend::new()).with_events(tx);
            load_inputs(&mut session, &inputs)?;
            for step in recipe.iter().flat_map(|r| &r.steps) {
                session.apply(step)?;
            }
            session.close_events();
            join_printer(printer)?;

            println!("==> Rendering {} slides", session.working().len());
            let video = slideshow::make_slideshow(
                session.working(),
                session.backend(),
                &encoder,
                &app_config.slideshow,
            )?;
            if let Some(parent) = video_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&video_path, &video)?;
            println!(
                "==> Wrote {} ({})",
                video_path.display(),
                output::format_file_size(video.len() as u64)
            );
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Size the global rayon pool from `[processing] max_processes`.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

fn spawn_printer() -> (mpsc::Sender<PipelineEvent>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            for line in output::format_pipeline_event(&event) {
                println!("{}", line);
            }
        }
    });
    (tx, printer)
}

fn join_printer(printer: JoinHandle<()>) -> Result<(), Box<dyn std::error::Error>> {
    printer.join().map_err(|_| "event printer panicked".into())
}

/// Read every input image into the session; unreadable or non-image files
/// are reported and left out.
fn load_inputs(
    session: &mut Session<RustBackend>,
    inputs: &[PathBuf],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut files = Vec::new();
    for path in types::collect_image_paths(inputs) {
        match SourceFile::read(&path) {
            Ok(file) => files.push(file),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Cannot read input"),
        }
    }

    let report = session.intake(files);
    for rejected in &report.rejected {
        println!("Skipped {}", rejected);
    }
    if report.accepted == 0 {
        return Err("no usable images among the inputs".into());
    }
    println!("==> Loaded {} images", report.accepted);
    Ok(())
}

fn export_working(
    session: &Session<RustBackend>,
    app_config: &AppConfig,
    output_dir: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let exporter =
        ZipExporter::new(session.backend()).with_archive_suffix(&app_config.export.archive_suffix);
    match session.export_working(&exporter, &app_config.export.working_name)? {
        Some(export) => {
            let path = export.write_to(output_dir)?;
            println!(
                "==> Wrote {} ({})",
                path.display(),
                output::format_file_size(export.bytes().len() as u64)
            );
        }
        None => println!("==> Nothing to export"),
    }
    Ok(())
}
