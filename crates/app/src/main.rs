use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use track_animator_core::render::encode_png;
use track_animator_core::{
    format_utc, interpolated_positions, load_csv_file, AppConfig, ExportMethod,
    ExportOrchestrator, ExportOutcome, ExportRequest, ExportScene, FrameRenderer, Millis,
    RenderOptions, TrackSource, TrackStore,
};
use tracing_subscriber::EnvFilter;

fn main() -> track_animator_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };

    match cli.command {
        Commands::Inspect { tracks, at } => run_inspect(&tracks, at),
        Commands::Frame {
            tracks,
            at,
            width,
            output,
        } => run_frame(&config, &tracks, at, width, &output),
        Commands::Export(args) => run_export(config, args),
        Commands::Config { output } => run_config(&config, output.as_deref()),
    }
}

fn load_store(paths: &[PathBuf]) -> track_animator_core::Result<TrackStore> {
    let mut store = TrackStore::new();
    for path in paths {
        let tracks = load_csv_file(path)?;
        tracing::info!(?path, tracks = tracks.len(), "loaded csv");
        for track in tracks {
            store.add_track(track);
        }
    }
    Ok(store)
}

fn run_inspect(paths: &[PathBuf], at: Option<Millis>) -> track_animator_core::Result<()> {
    let store = load_store(paths)?;
    let range = store.time_range();
    let t = range.clamp(at.unwrap_or(range.start));
    println!(
        "{} tracks, {} -> {}",
        store.len(),
        format_utc(range.start),
        format_utc(range.end)
    );
    for track in store.tracks() {
        println!(
            "  {:<32} {:<8} {:>6} points  {}",
            track.id,
            track.category.default_icon(),
            track.points().len(),
            track.color
        );
    }
    println!("positions at {}:", format_utc(t));
    for position in interpolated_positions(store.tracks(), t) {
        println!(
            "  {:<32} {:>9.4} {:>9.4} {:>7.0} m {:>5.0} deg",
            position.track.id,
            position.point.lat,
            position.point.lon,
            position.point.altitude,
            position.point.direction
        );
    }
    if let Some(view) = store.fit_all() {
        println!(
            "map view: {:.4}, {:.4} at zoom {}",
            view.center.lat, view.center.lon, view.zoom
        );
    }
    Ok(())
}

fn run_frame(
    config: &AppConfig,
    paths: &[PathBuf],
    at: Option<Millis>,
    width: Option<u32>,
    output: &Path,
) -> track_animator_core::Result<()> {
    let store = load_store(paths)?;
    let range = store.time_range();
    let t = range.clamp(at.unwrap_or(range.end));
    let width = width.unwrap_or(config.export.width);

    let renderer = FrameRenderer::new(RenderOptions::from(&config.display));
    let frame = renderer.render_frame(store.tracks(), t, width, None, None);
    std::fs::write(output, encode_png(&frame)?)?;
    tracing::info!(?output, time = %format_utc(t), "frame written");
    Ok(())
}

fn run_export(mut config: AppConfig, args: ExportArgs) -> track_animator_core::Result<()> {
    if let Some(method) = args.method {
        config.export.method = method;
    }
    if let Some(fps) = args.fps {
        config.export.fps = fps;
    }
    if let Some(width) = args.width {
        config.export.width = width;
    }
    if let Some(speed) = args.speed {
        config.playback.speed = speed;
    }
    if let Some(url) = args.backend_url {
        config.export.backend_url = url;
    }

    let store = load_store(&args.tracks)?;
    let strategy = config.export.method.strategy(&config.export)?;
    let orchestrator = ExportOrchestrator::new(FrameRenderer::new(RenderOptions::from(
        &config.display,
    )));

    tracing::info!(method = %config.export.method, "starting export");
    let mut last_percent = u8::MAX;
    let outcome = orchestrator.run_to_completion(
        ExportScene::new(&store),
        ExportRequest::from_config(&config),
        strategy,
        &mut |progress| {
            if progress.percent != last_percent {
                last_percent = progress.percent;
                eprint!("\r{:?} {:>3}%", progress.phase, progress.percent);
            }
        },
    )?;
    eprintln!();

    match outcome {
        ExportOutcome::Done(artifact) => {
            let output = args
                .output
                .unwrap_or_else(|| PathBuf::from(&artifact.filename));
            std::fs::write(&output, &artifact.bytes)?;
            tracing::info!(?output, bytes = artifact.bytes.len(), "export written");
            Ok(())
        }
        ExportOutcome::Cancelled => {
            tracing::warn!("export cancelled");
            Ok(())
        }
        ExportOutcome::Failed(reason) => Err(reason.into()),
    }
}

fn run_config(config: &AppConfig, output: Option<&Path>) -> track_animator_core::Result<()> {
    match output {
        Some(path) => {
            config.save(path)?;
            tracing::info!(?path, "config written");
        }
        None => println!("{}", config.to_json()?),
    }
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Replay and export vehicle tracks", long_about = None)]
struct Cli {
    /// JSON config file; defaults apply when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Summarise the tracks found in one or more CSV files.
    Inspect {
        #[arg(required = true)]
        tracks: Vec<PathBuf>,
        /// Epoch milliseconds to report positions at; defaults to the start.
        #[arg(long)]
        at: Option<Millis>,
    },
    /// Render a single frame to PNG.
    Frame {
        #[arg(required = true)]
        tracks: Vec<PathBuf>,
        /// Epoch milliseconds to render; defaults to the end.
        #[arg(long)]
        at: Option<Millis>,
        #[arg(long)]
        width: Option<u32>,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Export the whole time range as a GIF or a ZIP of frames.
    Export(ExportArgs),
    /// Print the effective config, or write it to a file.
    Config {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct ExportArgs {
    #[arg(required = true)]
    tracks: Vec<PathBuf>,
    /// client-gif, server-gif or zip.
    #[arg(long)]
    method: Option<ExportMethod>,
    #[arg(long)]
    fps: Option<u32>,
    #[arg(long)]
    width: Option<u32>,
    /// Playback speed multiplier.
    #[arg(long)]
    speed: Option<f64>,
    #[arg(long)]
    backend_url: Option<String>,
    /// Defaults to the artifact's own filename.
    #[arg(short, long)]
    output: Option<PathBuf>,
}
