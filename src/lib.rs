//! Annopack: turns raw image annotations into packaged object-detection
//! training datasets.
//!
//! A run is a push pipeline. A parser reads an annotation file and emits one
//! unit (an image plus its boxes) per image. The image loader reads the
//! pixels, optional processing stages crop or draw, and a packager persists
//! the result. Stages are wired by registering listeners on each other; the
//! [`pipeline::Pipeline`] controller drives `start` and `stop`.
//!
//! # Modules
//!
//! - [`ir`]: annotation model, label registry, image lookup and parsers
//! - [`pipeline`]: listener traits, the image loader and the lifecycle controller
//! - [`process`]: crop and render stages
//! - [`package`]: TFRecord and image-copy packagers
//! - [`report`]: run summary
//! - [`error`]: error types for annopack operations

pub mod error;
pub mod ir;
pub mod package;
pub mod pipeline;
pub mod process;
pub mod report;

use std::path::{Path, PathBuf};
use std::rc::Rc;

use clap::{Parser, Subcommand, ValueEnum};

pub use error::AnnopackError;

use ir::io_cvat_xml::CvatAnnotationParser;
use ir::io_point_csv::{GroupingMode, PointCsvParser};
use ir::{AnnotationFileParser, ImageIndex, LabelMapWriter, LabelRegistry};
use package::{
    DatasetPackager, StoreByFullPath, StoreByLabel, StoreByShortName, TfRecordPackager,
};
use pipeline::{
    shared, AnnotatedImageListener, ImageLoader, ParseOnStart, Pipeline, PipelineStateListener,
    Shared,
};
use process::{load_font, CropPolicy, CropStage, DeclaredSize, RenderStage};
use report::{ReportFormat, RunReport};

/// The annopack CLI application.
#[derive(Parser)]
#[command(name = "annopack")]
#[command(version, author, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Package a CVAT-style XML annotation file.
    Cvat(CvatArgs),
    /// Package a point-record CSV, turning each point into a fixed-size patch.
    Points(PointArgs),
}

#[derive(clap::Args)]
struct CvatArgs {
    /// Annotation XML file.
    annotations: PathBuf,

    /// Directory searched recursively for the annotated images.
    #[arg(long, env = "ANNOPACK_IMAGES")]
    images: PathBuf,

    #[command(flatten)]
    chain: ChainArgs,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(clap::Args)]
struct PointArgs {
    /// Point CSV file.
    annotations: PathBuf,

    /// Directory searched recursively for `<key>.jpg` images.
    #[arg(long, env = "ANNOPACK_IMAGES")]
    images: PathBuf,

    /// Patch width in pixels.
    #[arg(long)]
    patch_width: u32,

    /// Patch height in pixels.
    #[arg(long)]
    patch_height: u32,

    /// Only use rows whose dataset column equals this tag.
    #[arg(long)]
    dataset_filter: Option<String>,

    /// Treat the first row as a header and emit each image when its key
    /// changes instead of grouping the whole file first.
    #[arg(long)]
    streaming: bool,

    /// Clear the label registry before parsing.
    #[arg(long)]
    fresh_labels: bool,

    #[command(flatten)]
    chain: ChainArgs,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(clap::Args)]
struct ChainArgs {
    /// Crop every object into its own image.
    #[arg(long, conflicts_with = "crop_margin")]
    crop: bool,

    /// Crop every object with half a patch of context on each side, skipping
    /// objects too close to the border.
    #[arg(long)]
    crop_margin: bool,

    /// Record the cropped size on crops instead of the source image size.
    #[arg(long)]
    actual_crop_size: bool,

    /// Draw boxes and their labels onto the images before packaging, using
    /// this TrueType/OpenType font for the label text.
    #[arg(long, value_name = "FONT")]
    render: Option<PathBuf>,
}

/// Output discipline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum PackagerKind {
    /// One tf.train.Example per image in a TFRecord file.
    Tfrecord,
    /// Copy images under the output root, keeping their full path.
    FullPath,
    /// Copy images into the output root by file name.
    ShortName,
    /// Copy images into a subdirectory named after their first label.
    ByLabel,
}

#[derive(clap::Args)]
struct OutputArgs {
    #[arg(long, value_enum, default_value_t = PackagerKind::Tfrecord)]
    packager: PackagerKind,

    /// Record file (tfrecord) or output root directory (copy packagers).
    #[arg(short, long)]
    output: PathBuf,

    /// Write the label map to this file when the run finishes.
    #[arg(long)]
    label_map: Option<PathBuf>,

    /// Store pixel coordinates instead of fractions of the image size.
    #[arg(long)]
    raw_boxes: bool,

    /// Format of the summary printed after the run.
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    report: ReportFormat,
}

/// Run the annopack CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), AnnopackError> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Cvat(args) => run_cvat(args),
        Commands::Points(args) => run_points(args),
    }
}

fn run_cvat(args: CvatArgs) -> Result<(), AnnopackError> {
    if args.chain.crop_margin {
        return Err(AnnopackError::InvalidArgument(
            "--crop-margin needs a patch size and is only available for `points`".into(),
        ));
    }
    let images = ImageIndex::build(&args.images)?;
    let chain = Chain::build(&args.chain, &args.output, None)?;

    let mut parser = CvatAnnotationParser::new(Vec::new(), images);
    // The XML parser does not assign ids itself, so the registry collects
    // labels ahead of the loader.
    parser.register(chain.labels.clone());
    parser.register(chain.loader.clone());

    execute(shared(parser), &args.annotations, chain, &args.output)
}

fn run_points(args: PointArgs) -> Result<(), AnnopackError> {
    PointCsvParser::<ImageIndex>::check_patch_size(args.patch_width, args.patch_height)?;
    let images = ImageIndex::build(&args.images)?;
    let patch = (args.patch_width, args.patch_height);
    let chain = Chain::build(&args.chain, &args.output, Some(patch))?;

    let mode = if args.streaming {
        GroupingMode::Streaming
    } else {
        GroupingMode::Buffered
    };
    let mut parser = PointCsvParser::new(Vec::new(), images, args.patch_width, args.patch_height)
        .with_mode(mode)
        .with_labels(chain.labels.clone(), args.fresh_labels);
    if let Some(dataset) = args.dataset_filter {
        parser = parser.with_dataset_filter(dataset);
    }
    parser.register(chain.loader.clone());

    execute(shared(parser), &args.annotations, chain, &args.output)
}

/// Handles onto a packager of any kind: its two listener roles plus its
/// counter.
struct PackagerHandle {
    sink: Shared<dyn AnnotatedImageListener>,
    lifecycle: Shared<dyn PipelineStateListener>,
    packaged: Box<dyn Fn() -> usize>,
}

impl PackagerHandle {
    fn new<P: DatasetPackager + 'static>(packager: P) -> Self {
        let packager = shared(packager);
        let counter = Rc::clone(&packager);
        Self {
            sink: packager.clone(),
            lifecycle: packager,
            packaged: Box::new(move || counter.borrow().packaged()),
        }
    }
}

/// Everything downstream of the parser.
struct Chain {
    labels: Shared<LabelRegistry>,
    loader: Shared<ImageLoader>,
    crop: Option<Shared<CropStage>>,
    packager: PackagerHandle,
}

impl Chain {
    /// Wires loader -> crop -> render -> packager, building from the packager
    /// up so every stage gets its downstream list at construction.
    fn build(
        chain: &ChainArgs,
        output: &OutputArgs,
        patch: Option<(u32, u32)>,
    ) -> Result<Self, AnnopackError> {
        // Before the packager creates any output.
        let font = chain.render.as_deref().map(load_font).transpose()?;
        let labels = shared(LabelRegistry::new());
        let packager = match output.packager {
            PackagerKind::Tfrecord => PackagerHandle::new(
                TfRecordPackager::new(&output.output)?
                    .with_shared_labels(labels.clone())
                    .with_normalize(!output.raw_boxes),
            ),
            PackagerKind::FullPath => PackagerHandle::new(StoreByFullPath::new(&output.output)?),
            PackagerKind::ShortName => {
                PackagerHandle::new(StoreByShortName::new(&output.output)?)
            }
            PackagerKind::ByLabel => PackagerHandle::new(StoreByLabel::new(&output.output)?),
        };

        let mut next = packager.sink.clone();
        if let Some(font) = font {
            next = shared(RenderStage::new(vec![next], font));
        }

        let crop_policy = match (chain.crop, chain.crop_margin, patch) {
            (_, true, Some((patch_width, patch_height))) => Some(CropPolicy::Margin {
                patch_width,
                patch_height,
            }),
            (true, _, _) => Some(CropPolicy::ObjectBounds),
            _ => None,
        };
        let crop = crop_policy.map(|policy| {
            let declared_size = if chain.actual_crop_size {
                DeclaredSize::Actual
            } else {
                DeclaredSize::Source
            };
            shared(
                CropStage::new(vec![next.clone()])
                    .with_policy(policy)
                    .with_declared_size(declared_size),
            )
        });
        if let Some(crop) = &crop {
            next = crop.clone();
        }

        Ok(Self {
            labels,
            loader: shared(ImageLoader::new(vec![next])),
            crop,
            packager,
        })
    }
}

fn execute<P>(
    parser: Shared<P>,
    source: &Path,
    chain: Chain,
    output: &OutputArgs,
) -> Result<(), AnnopackError>
where
    P: AnnotationFileParser + 'static,
{
    let mut pipeline = Pipeline::new();
    pipeline
        .register(shared(ParseOnStart::new(parser.clone(), source)))
        .register(chain.packager.lifecycle.clone());
    if let Some(label_map) = &output.label_map {
        pipeline.register(shared(LabelMapWriter::new(
            chain.labels.clone(),
            label_map,
        )?));
    }
    pipeline.run()?;

    let report = RunReport {
        source: source.display().to_string(),
        parse: parser.borrow().stats(),
        images_loaded: chain.loader.borrow().loaded(),
        crops: chain.crop.as_ref().map(|crop| crop.borrow().crops()),
        packaged: (chain.packager.packaged)(),
        labels: chain.labels.borrow().count(),
    };
    println!("{}", report.render(output.report)?);
    Ok(())
}
