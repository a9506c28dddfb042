use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "panotour", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode a directions response into ordered tour points.
    Route(RouteArgs),
    /// Test whether a point lies inside a boundary polygon (edges count as
    /// inside).
    Contains(ContainsArgs),
    /// Run a full tour and render a spherical MP4 (requires `ffmpeg` on PATH).
    Tour(TourArgs),
}

#[derive(Parser, Debug)]
struct RouteArgs {
    /// Directions response JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Optional output path for the decoded point sequence as JSON.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct ContainsArgs {
    /// Boundary polygon JSON (`[{"lat":..,"lng":..}, ...]`, at least 3
    /// vertices).
    #[arg(long)]
    boundary: PathBuf,

    #[arg(long)]
    lat: f64,

    #[arg(long)]
    lng: f64,
}

#[derive(Parser, Debug)]
struct TourArgs {
    /// Directions response JSON.
    #[arg(long = "route")]
    route_path: PathBuf,

    /// Output MP4 path.
    #[arg(long)]
    out: PathBuf,

    /// Street View Static API key.
    #[arg(long)]
    api_key: String,

    /// Directional tile size in pixels (square).
    #[arg(long, default_value_t = 512)]
    tile_size: u32,

    /// Consecutive repeats per panorama in the output video.
    #[arg(long, default_value_t = 10)]
    frame_repeat: u32,

    /// Output frame rate.
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Interval between waypoint advances, in milliseconds.
    #[arg(long, default_value_t = 1500)]
    interval_ms: u64,

    /// Substitute gray tiles for failed directional fetches instead of
    /// skipping the waypoint.
    #[arg(long)]
    fill_missing: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Route(args) => cmd_route(args),
        Command::Contains(args) => cmd_contains(args),
        Command::Tour(args) => cmd_tour(args),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> anyhow::Result<T> {
    let f = File::open(path).with_context(|| format!("open {what} '{}'", path.display()))?;
    let r = BufReader::new(f);
    serde_json::from_reader(r).with_context(|| format!("parse {what} JSON"))
}

fn cmd_route(args: RouteArgs) -> anyhow::Result<()> {
    let response: panotour::RouteResponse = read_json(&args.in_path, "directions response")?;
    let points = panotour::extract_route_points(&response)?;
    eprintln!("decoded {} route points", points.len());

    if let Some(out) = args.out {
        let json = serde_json::to_string_pretty(&points)?;
        std::fs::write(&out, json)
            .with_context(|| format!("write points '{}'", out.display()))?;
        eprintln!("wrote {}", out.display());
    }
    Ok(())
}

fn cmd_contains(args: ContainsArgs) -> anyhow::Result<()> {
    let polygon: panotour::Polygon = read_json(&args.boundary, "boundary polygon")?;
    let point = panotour::Coordinate::new(args.lat, args.lng);
    point.validate()?;

    if polygon.contains(point) {
        println!("inside");
    } else {
        println!("outside");
    }
    Ok(())
}

fn cmd_tour(args: TourArgs) -> anyhow::Result<()> {
    let response: panotour::RouteResponse = read_json(&args.route_path, "directions response")?;
    let points = panotour::extract_route_points(&response)?;
    eprintln!("touring {} route points", points.len());

    let mut cfg = panotour::TourConfig::new(&args.out);
    cfg.capture.width = args.tile_size;
    cfg.capture.height = args.tile_size;
    cfg.encode.frame_repeat = args.frame_repeat;
    cfg.encode.fps = args.fps;
    cfg.scheduler.playback_interval = std::time::Duration::from_millis(args.interval_ms);
    if args.fill_missing {
        cfg.on_capture_failure = panotour::CaptureFailurePolicy::BlankTile;
    }

    let provider = panotour::StreetViewProvider::new(args.api_key)?;
    let mut tour = panotour::TourOrchestrator::new(provider, cfg)?;

    tour.start(points)?;
    while tour.scheduler().state() == panotour::TourState::Playing {
        std::thread::sleep(tour.scheduler().tick_interval());
        if let Some(index) = tour.tick() {
            eprintln!(
                "waypoint {} ({:.0}%)",
                index,
                tour.scheduler().progress() * 100.0
            );
        }
    }

    let video = tour.generate_video()?;
    eprintln!(
        "wrote {} ({} frames, {:.1}s)",
        video.path.display(),
        video.frame_count,
        video.duration_secs
    );
    Ok(())
}
