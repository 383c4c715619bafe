//! Command-line interface for `geoverlay`, a streaming vector overlay engine.
//!
//! This binary is a thin layer over [`geoverlay_core`]: it reads `GeoJSON`
//! inputs, maps arguments onto the typed operation options, and writes the
//! result through a staged `GeoJSON` store so a failed run never leaves a
//! partial output file.
//!
//! # Available Commands
//!
//! - `buffer` - Buffer features by a fixed distance or a distance field
//! - `union`, `update`, `difference`, `intersect` - Polygon overlays
//! - `merge` - Concatenate two datasets under a merged schema
//! - `explode` - Split multi-part features
//! - `to-point`, `vertices` - Derive point features
//! - `envelope`, `convex-hull`, `bounding-circle`, `to-line` - Derive shapes
//! - `sum-line-length`, `count-points` - Per-polygon aggregates
//! - `near` - Nearest feature lookup
//! - `info` - Display dataset information

mod display;

use std::cell::Cell;

use anyhow::{Result, anyhow};
use clap::{Args, Parser, Subcommand};
use tracing::{Level, debug, info};
use tracing_log::LogTracer;
use tracing_subscriber::FmtSubscriber;

use geoverlay_core::operations::{
    self, BufferOptions, CountPointsOptions, NearOptions, OperationInput, OverlayOperation,
    OverlayOptions, SumLineLengthOptions, ToPointOptions, VerticesOptions,
};
use geoverlay_core::pipeline::{DistanceExpr, PointLocation};
use geoverlay_core::types::DatasetInfo;
use geoverlay_core::{DistanceUnit, GeoverlayError, MemoryCollection, SharedCollection};
use geoverlay_core_common::ProgressListener;
use geoverlay_geojson::{GeoJsonFileStore, read_geojson};

#[derive(Parser)]
#[command(
    name = "geoverlay",
    version,
    about = "Streaming vector overlay and feature transformation in Rust",
    long_about = "geoverlay composes lazy feature transformations (buffer, overlay, merge, \
                  aggregate joins) over GeoJSON data.\n\
                  Outputs are written atomically: a failed run leaves no partial file."
)]
/// Command-line arguments and options for the `geoverlay` CLI.
struct Cli {
    /// Enable verbose (INFO level) logging output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug (DEBUG level) logging output with detailed diagnostics.
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Single input, single output.
#[derive(Args)]
struct InputOutput {
    /// Path to the input `GeoJSON` dataset.
    #[arg(short, long, value_name = "DATASET")]
    input: String,

    /// Path for the output `GeoJSON` dataset.
    #[arg(short, long, value_name = "DATASET")]
    output: String,
}

/// Input overlaid with a second dataset.
#[derive(Args)]
struct OverlayArgs {
    #[command(flatten)]
    io: InputOutput,

    /// Path to the overlay `GeoJSON` dataset.
    #[arg(long, value_name = "DATASET")]
    overlay: String,

    /// Split multi-part results into single-part features.
    #[arg(long)]
    single_part: bool,
}

/// Polygons aggregated against a second dataset.
#[derive(Args)]
struct AggregateArgs {
    /// Path to the polygon `GeoJSON` dataset.
    #[arg(long, value_name = "DATASET")]
    polygons: String,

    /// Path for the output `GeoJSON` dataset.
    #[arg(short, long, value_name = "DATASET")]
    output: String,
}

/// Available subcommands for the `geoverlay` CLI.
#[derive(Subcommand)]
enum Commands {
    /// Buffers every feature.
    ///
    /// Geographic inputs with an explicit unit are buffered geodetically.
    Buffer {
        #[command(flatten)]
        io: InputOutput,

        /// Buffer distance applied to every feature.
        #[arg(long, allow_negative_numbers = true, conflicts_with = "field")]
        distance: Option<f64>,

        /// Numeric attribute holding each feature's buffer distance.
        #[arg(long, value_name = "FIELD")]
        field: Option<String>,

        /// Distance unit (e.g. "meter", "km", "mile"); defaults to CRS units.
        #[arg(long, default_value = "default")]
        unit: DistanceUnit,

        /// Segments per quarter circle.
        #[arg(long, default_value_t = 24)]
        segments: u32,
    },

    /// Splits input and overlay polygons into every distinct region.
    Union(OverlayArgs),

    /// Replaces input polygons where update polygons cover them.
    Update(OverlayArgs),

    /// Removes the parts of the input covered by the overlay.
    Difference(OverlayArgs),

    /// Keeps the parts shared by the input and the overlay.
    Intersect(OverlayArgs),

    /// Concatenates two datasets under a merged schema.
    Merge {
        #[command(flatten)]
        io: InputOutput,

        /// Dataset appended after the input.
        #[arg(long, value_name = "DATASET")]
        with: String,
    },

    /// Splits multi-part features into single-part features.
    Explode(InputOutput),

    /// Derives one point per feature.
    ToPoint {
        #[command(flatten)]
        io: InputOutput,

        /// Place each point inside its geometry rather than at the centroid.
        #[arg(long)]
        inside: bool,

        /// Derive one point per part.
        #[arg(long)]
        single_part: bool,
    },

    /// Turns vertices into point features.
    Vertices {
        #[command(flatten)]
        io: InputOutput,

        /// Vertices to keep: all, start, end, both-ends or mid.
        #[arg(long, default_value = "all")]
        location: PointLocation,
    },

    /// Replaces each geometry by its bounding rectangle.
    Envelope(InputOutput),

    /// Replaces each geometry by its convex hull.
    ConvexHull(InputOutput),

    /// Replaces each geometry by its minimum bounding circle.
    BoundingCircle(InputOutput),

    /// Turns polygon boundaries into lines.
    ToLine(InputOutput),

    /// Sums the length of lines inside each polygon.
    SumLineLength {
        #[command(flatten)]
        target: AggregateArgs,

        /// Path to the line `GeoJSON` dataset.
        #[arg(long, value_name = "DATASET")]
        lines: String,

        /// Output field for the summed length.
        #[arg(long, default_value = "sum_len")]
        length_field: String,

        /// Output field for the number of lines.
        #[arg(long, default_value = "line_cnt")]
        count_field: String,
    },

    /// Counts the points inside each polygon.
    CountPoints {
        #[command(flatten)]
        target: AggregateArgs,

        /// Path to the point `GeoJSON` dataset.
        #[arg(long, value_name = "DATASET")]
        points: String,

        /// Output field for the count.
        #[arg(long, default_value = "pnt_cnt")]
        count_field: String,
    },

    /// Appends the nearest feature of a second dataset.
    Near {
        #[command(flatten)]
        io: InputOutput,

        /// Dataset searched for the nearest feature.
        #[arg(long, value_name = "DATASET")]
        near: String,

        /// Attribute of the near features to report instead of their id.
        #[arg(long, value_name = "FIELD")]
        id_field: Option<String>,

        /// Search radius.
        #[arg(long)]
        max_distance: Option<f64>,

        /// Unit of the radius and of the reported distance.
        #[arg(long, default_value = "default")]
        unit: DistanceUnit,
    },

    /// Displays information about a `GeoJSON` dataset.
    Info {
        /// Path to the input dataset.
        #[arg(value_name = "DATASET")]
        input: String,
    },
}

/// Entry point for the `geoverlay` command-line interface.
///
/// # Errors
///
/// Returns an error if command execution fails or if the logging system cannot be initialized.
fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    // Bridge logs from the `log` crate used by the libraries.
    LogTracer::init()?;

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    run(cli.command)
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Buffer {
            io,
            distance,
            field,
            unit,
            segments,
        } => {
            let distance = match (distance, field) {
                (Some(d), None) => Some(DistanceExpr::Literal(d)),
                (None, Some(name)) => Some(DistanceExpr::Field(name)),
                _ => None,
            };
            let options = BufferOptions {
                distance,
                unit,
                quadrant_segments: segments,
            };
            let result = operations::buffer(load(&io.input)?, &options).map_err(report)?;
            write(&result, &io.output)
        },
        Commands::Union(args) => handle_overlay(OverlayOperation::Union, &args),
        Commands::Update(args) => handle_overlay(OverlayOperation::Update, &args),
        Commands::Difference(args) => handle_overlay(OverlayOperation::Difference, &args),
        Commands::Intersect(args) => handle_overlay(OverlayOperation::Intersect, &args),
        Commands::Merge { io, with } => {
            let result = operations::merge(load(&io.input)?, load(&with)?).map_err(report)?;
            write(&result, &io.output)
        },
        Commands::Explode(io) => {
            let result = operations::explode(load(&io.input)?).map_err(report)?;
            write(&result, &io.output)
        },
        Commands::ToPoint {
            io,
            inside,
            single_part,
        } => {
            let options = ToPointOptions {
                inside,
                single_part,
            };
            let result = operations::to_point(load(&io.input)?, &options).map_err(report)?;
            write(&result, &io.output)
        },
        Commands::Vertices { io, location } => {
            let options = VerticesOptions { location };
            let result =
                operations::vertices_to_points(load(&io.input)?, &options).map_err(report)?;
            write(&result, &io.output)
        },
        Commands::Envelope(io) => {
            let result = operations::envelope(load(&io.input)?).map_err(report)?;
            write(&result, &io.output)
        },
        Commands::ConvexHull(io) => {
            let result = operations::convex_hull(load(&io.input)?).map_err(report)?;
            write(&result, &io.output)
        },
        Commands::BoundingCircle(io) => {
            let result = operations::minimum_bounding_circle(load(&io.input)?).map_err(report)?;
            write(&result, &io.output)
        },
        Commands::ToLine(io) => {
            let result = operations::to_line(load(&io.input)?).map_err(report)?;
            write(&result, &io.output)
        },
        Commands::SumLineLength {
            target,
            lines,
            length_field,
            count_field,
        } => {
            let options = SumLineLengthOptions {
                length_field,
                count_field,
            };
            let result =
                operations::sum_line_length(load(&target.polygons)?, load(&lines)?, &options)
                    .map_err(report)?;
            write(&result, &target.output)
        },
        Commands::CountPoints {
            target,
            points,
            count_field,
        } => {
            let options = CountPointsOptions { count_field };
            let result =
                operations::count_points(load(&target.polygons)?, load(&points)?, &options)
                    .map_err(report)?;
            write(&result, &target.output)
        },
        Commands::Near {
            io,
            near,
            id_field,
            max_distance,
            unit,
        } => {
            let options = NearOptions {
                near_id_field: id_field,
                maximum_distance: max_distance,
                unit,
            };
            let result =
                operations::near(load(&io.input)?, load(&near)?, &options).map_err(report)?;
            write(&result, &io.output)
        },
        Commands::Info { input } => handle_info(&input),
    }
}

fn handle_overlay(operation: OverlayOperation, args: &OverlayArgs) -> Result<()> {
    let options = OverlayOptions {
        operation,
        single_part: args.single_part,
    };
    let result = operations::overlay(load(&args.io.input)?, load(&args.overlay)?, &options)
        .map_err(report)?;
    write(&result, &args.io.output)
}

fn handle_info(input: &str) -> Result<()> {
    let collection = collection(input)?;
    let info = DatasetInfo::describe(input, collection.as_ref()).map_err(report)?;
    display::display_dataset_info(&info);
    Ok(())
}

fn collection(path: &str) -> Result<SharedCollection> {
    let dataset = read_geojson(path)?;
    debug!("Schema of {path}: {:?}", dataset.schema);
    Ok(MemoryCollection::shared(dataset.schema, dataset.features))
}

fn load(path: &str) -> Result<OperationInput> {
    collection(path).map(OperationInput::Features)
}

/// Reports progress through the log and remembers the last count.
#[derive(Default)]
struct LogProgress {
    written: Cell<u64>,
}

impl ProgressListener for LogProgress {
    fn started(&self) {
        debug!("Run started");
    }

    fn progress(&self, written: u64) {
        self.written.set(written);
        if written % 10_000 == 0 {
            info!("{written} feature(s) processed");
        }
    }

    fn complete(&self) {
        debug!("Run complete after {} feature(s)", self.written.get());
    }
}

fn write(result: &SharedCollection, output: &str) -> Result<()> {
    let mut store = GeoJsonFileStore::new(output);
    let progress = LogProgress::default();
    let count =
        geoverlay_core::run_operation(result.as_ref(), &mut store, &progress).map_err(report)?;
    display::display_summary(result.schema(), count, output);
    Ok(())
}

/// Turns a library error into a CLI error with its recovery hint.
fn report(error: GeoverlayError) -> anyhow::Error {
    match error.recovery_suggestion() {
        Some(hint) => anyhow!("{}\nHint: {hint}", error.user_message()),
        None => anyhow!(error.user_message()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use geoverlay_core::error::{ConfigError, GeometryError};
    use geoverlay_core_common::GeometryKind;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn buffer_arguments_map_onto_options() {
        let cli = Cli::try_parse_from([
            "geoverlay", "buffer", "-i", "in.geojson", "-o", "out.geojson", "--field", "radius",
            "--unit", "km",
        ])
        .unwrap();
        match cli.command {
            Commands::Buffer {
                field, unit, segments, ..
            } => {
                assert_eq!(field.as_deref(), Some("radius"));
                assert_eq!(unit, DistanceUnit::Kilometer);
                assert_eq!(segments, 24);
            },
            _ => panic!("expected buffer"),
        }
    }

    #[test]
    fn distance_and_field_conflict() {
        let parsed = Cli::try_parse_from([
            "geoverlay", "buffer", "-i", "a", "-o", "b", "--distance", "1", "--field", "r",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn unknown_location_is_rejected() {
        let parsed = Cli::try_parse_from([
            "geoverlay", "vertices", "-i", "a", "-o", "b", "--location", "corner",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn report_uses_user_message() {
        let error: GeoverlayError = ConfigError::MissingRequired {
            option: "distance".to_string(),
        }
        .into();
        let message = report(error).to_string();
        assert_eq!(message, "Configuration error: Missing required option: distance");
    }

    #[test]
    fn report_appends_hint() {
        let error: GeoverlayError = GeometryError::WrongGeometryKind {
            role: "polygon features".to_string(),
            expected: "polygons".to_string(),
            found: GeometryKind::Point,
        }
        .into();
        let message = report(error).to_string();
        assert!(message.contains("\nHint: Check that each input"));
    }
}
