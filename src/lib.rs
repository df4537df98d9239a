//! Labelset: labeled image datasets for computer vision.
//!
//! Labelset keeps images, a class taxonomy and geometric annotations
//! (boxes, polygon segmentations, image-level labels) in one in-memory
//! [`Dataset`], converts it to and from COCO JSON and YOLO, and applies
//! transforms that keep annotation coordinates aligned with the pixels:
//! crops, train/val/test splits and mask rasterization.
//!
//! # Modules
//!
//! - [`geometry`]: points, boxes and crop rectangles in pixel or normalized space
//! - [`annotation`]: the annotation model, area and mask derivation
//! - [`dataset`]: the dataset aggregate, diagnostics and transforms
//! - [`formats`]: COCO and YOLO adapters
//! - [`store`]: access to image payloads
//! - [`report`]: diagnostics gathered into a printable report
//! - [`error`]: error types

pub mod annotation;
pub mod dataset;
pub mod error;
pub mod formats;
pub mod geometry;
pub mod report;
pub mod store;

use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

pub use annotation::{Annotation, AnnotationKind, AreaSource, Mask};
pub use dataset::{AnnotationId, ClassId, ClassTaxonomy, Dataset, ImageId, SplitRatios};
pub use error::{ErrorKind, LabelsetError};
pub use formats::Format;
pub use store::{FsImageStore, ImageStore};

/// The labelset CLI application.
#[derive(Parser)]
#[command(name = "labelset")]
#[command(version, author, about)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Log more (-v for info, -vv for debug). LABELSET_LOG overrides this.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a dataset between formats.
    Convert(ConvertArgs),
    /// Print per-class instance counts.
    Stats(StatsArgs),
    /// Check a dataset for missing images, orphans and stale boxes.
    Check(CheckArgs),
    /// Split a dataset into train/val/test COCO files.
    Split(SplitArgs),
    /// Copy a dataset and crop every image to its annotations.
    Crop(CropArgs),
}

/// Where to read a dataset from.
#[derive(clap::Args)]
struct InputArgs {
    /// Input annotation file (COCO JSON or YOLO manifest).
    input: PathBuf,

    /// Input format ('coco' or 'yolo').
    #[arg(long, env = "LABELSET_FORMAT")]
    format: Format,

    /// Image directory (COCO only; defaults to the JSON file's directory).
    #[arg(long, env = "LABELSET_IMAGES")]
    images: Option<PathBuf>,
}

impl InputArgs {
    fn load(&self) -> Result<Dataset, LabelsetError> {
        self.format.load(&self.input, self.images.as_deref())
    }
}

#[derive(clap::Args)]
struct ConvertArgs {
    /// Input format ('coco' or 'yolo').
    #[arg(long)]
    from: Format,

    /// Output format ('coco' or 'yolo').
    #[arg(long)]
    to: Format,

    /// Input annotation file.
    input: PathBuf,

    /// Output annotation file.
    output: PathBuf,

    /// Image directory (COCO input only).
    #[arg(long, env = "LABELSET_IMAGES")]
    images: Option<PathBuf>,
}

#[derive(clap::Args)]
struct StatsArgs {
    #[command(flatten)]
    input: InputArgs,
}

#[derive(clap::Args)]
struct CheckArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Treat warnings as errors (exit non-zero if any warnings).
    #[arg(long)]
    strict: bool,

    /// Output format for the report.
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    output: ReportFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Text,
    Json,
}

#[derive(clap::Args)]
struct SplitArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Directory for train.json, val.json and test.json.
    #[arg(long)]
    out: PathBuf,

    /// Train, val and test ratios, comma separated; must sum to 1.
    #[arg(long, default_value = "0.7,0.2,0.1", env = "LABELSET_SPLIT_RATIOS")]
    ratios: SplitRatios,

    /// Seed for a reproducible shuffle.
    #[arg(long, env = "LABELSET_SEED")]
    seed: Option<u64>,
}

#[derive(clap::Args)]
struct CropArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Directory to copy the images into and write annotations.json.
    #[arg(long)]
    out: PathBuf,

    /// Pixels of context to keep around the annotations.
    #[arg(long, default_value_t = 0)]
    margin: u32,
}

/// Runs the labelset CLI with already-parsed arguments.
///
/// This is the main entry point for the CLI, called from `main.rs` after
/// logging is set up.
pub fn run(cli: Cli) -> Result<(), LabelsetError> {
    match cli.command {
        Some(Commands::Convert(args)) => run_convert(args),
        Some(Commands::Stats(args)) => run_stats(args),
        Some(Commands::Check(args)) => run_check(args),
        Some(Commands::Split(args)) => run_split(args),
        Some(Commands::Crop(args)) => run_crop(args),
        None => {
            println!("labelset {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Labeled image datasets for computer vision.");
            println!();
            println!("Run 'labelset --help' for usage information.");
            Ok(())
        }
    }
}

fn run_convert(args: ConvertArgs) -> Result<(), LabelsetError> {
    let dataset = args.from.load(&args.input, args.images.as_deref())?;
    args.to.save(&args.output, &dataset)?;
    println!(
        "Converted {} image(s) and {} annotation(s) from {} to {}: {}",
        dataset.len(),
        dataset.annotation_count(),
        args.from,
        args.to,
        args.output.display()
    );
    Ok(())
}

fn run_stats(args: StatsArgs) -> Result<(), LabelsetError> {
    let dataset = args.input.load()?;
    println!(
        "{} image(s), {} annotation(s)",
        dataset.len(),
        dataset.annotation_count()
    );
    for (class_id, count) in dataset.count_instances_per_class() {
        let name = dataset.class_name(class_id).unwrap_or("<unknown>");
        println!("  {class_id:>4}  {name:<24} {count}");
    }
    Ok(())
}

fn run_check(args: CheckArgs) -> Result<(), LabelsetError> {
    let dataset = args.input.load()?;
    let report = report::check_dataset(&dataset, &FsImageStore);

    match args.output {
        ReportFormat::Json => {
            let json = report
                .to_json()
                .map_err(|source| LabelsetError::CocoJsonWrite {
                    path: PathBuf::from("<stdout>"),
                    source,
                })?;
            println!("{json}");
        }
        ReportFormat::Text => print!("{}", report),
    }

    let has_errors = report.error_count() > 0;
    let has_warnings = report.warning_count() > 0;

    if has_errors || (args.strict && has_warnings) {
        Err(LabelsetError::CheckFailed {
            error_count: report.error_count(),
            warning_count: report.warning_count(),
            report,
        })
    } else {
        Ok(())
    }
}

fn run_split(args: SplitArgs) -> Result<(), LabelsetError> {
    let dataset = args.input.load()?;
    let ratios = match args.seed {
        Some(seed) => args.ratios.with_seed(seed),
        None => args.ratios,
    };
    let split = dataset.split_dataset(ratios)?;

    fs::create_dir_all(&args.out).map_err(LabelsetError::Io)?;
    for (name, part) in [
        ("train", &split.train),
        ("val", &split.val),
        ("test", &split.test),
    ] {
        let path = args.out.join(format!("{name}.json"));
        formats::coco::write_coco_json(&path, part)?;
        println!(
            "{name}: {} image(s), {} annotation(s) -> {}",
            part.len(),
            part.annotation_count(),
            path.display()
        );
    }
    Ok(())
}

fn run_crop(args: CropArgs) -> Result<(), LabelsetError> {
    let dataset = args.input.load()?;
    let store = FsImageStore;
    let mut copy = dataset.copy_dataset(&store, &args.out)?;
    let cropped = copy.crop_images_by_annotations(&store, args.margin)?;

    let path = args.out.join("annotations.json");
    formats::coco::write_coco_json(&path, &copy)?;
    println!(
        "Cropped {} of {} image(s) into {}",
        cropped.len(),
        copy.len(),
        args.out.display()
    );
    Ok(())
}
