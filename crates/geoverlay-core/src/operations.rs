//! Typed entry points for every operation.
//!
//! Each operation takes its inputs as [`OperationInput`] and its parameters
//! as an options struct. Options are validated once, before any stage is
//! built, and the returned collection is lazy: nothing is read until it is
//! opened, typically by [`run_operation`](crate::writer::run_operation).

use std::sync::Arc;

use log::info;

use crate::buffer::DEFAULT_QUADRANT_SEGMENTS;
use crate::error::{ConfigError, PipelineError, Result};
use crate::pipeline::aggregate::{
    DEFAULT_LENGTH_FIELD, DEFAULT_LINE_COUNT_FIELD, DEFAULT_POINT_COUNT_FIELD,
};
use crate::pipeline::{
    AggregateMeasure, BufferCollection, DifferenceCollection, DistanceExpr, ExplodeCollection,
    IntersectCollection, MergeCollection, NearCollection, PointLocation, ShapeCollection,
    SharedCollection, SpatialAggregateJoin, ToPointCollection, VerticesToPointsCollection,
};
use crate::units::DistanceUnit;

/// Upper bound accepted for the number of segments per circle quadrant.
pub const MAX_QUADRANT_SEGMENTS: u32 = 1_000;

/// Input handed to an operation.
#[derive(Debug, Clone)]
pub enum OperationInput {
    /// A vector feature collection.
    Features(SharedCollection),
    /// A raster dataset; not handled by this engine.
    Raster {
        /// Dataset location
        path: String,
    },
}

impl OperationInput {
    /// Returns the feature collection, rejecting raster inputs.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnsupportedInput`] for raster inputs.
    pub fn into_features(self) -> Result<SharedCollection> {
        match self {
            Self::Features(collection) => Ok(collection),
            Self::Raster { path } => Err(PipelineError::UnsupportedInput {
                kind: format!("raster dataset '{path}'"),
            }
            .into()),
        }
    }
}

impl From<SharedCollection> for OperationInput {
    fn from(collection: SharedCollection) -> Self {
        Self::Features(collection)
    }
}

fn require_name(option: &str, name: &str) -> std::result::Result<(), ConfigError> {
    if name.trim().is_empty() {
        return Err(ConfigError::MissingRequired {
            option: option.to_string(),
        });
    }
    Ok(())
}

/// Options for [`buffer`].
#[derive(Debug, Clone, PartialEq)]
pub struct BufferOptions {
    /// Buffer distance, a literal or a numeric attribute
    pub distance: Option<DistanceExpr>,
    /// Unit of the distance
    pub unit: DistanceUnit,
    /// Segments per quarter circle; 0 selects the default
    pub quadrant_segments: u32,
}

impl Default for BufferOptions {
    fn default() -> Self {
        Self {
            distance: None,
            unit: DistanceUnit::Default,
            quadrant_segments: DEFAULT_QUADRANT_SEGMENTS,
        }
    }
}

impl BufferOptions {
    /// Options buffering every feature by the same distance.
    #[must_use]
    pub fn literal(distance: f64, unit: DistanceUnit) -> Self {
        Self {
            distance: Some(DistanceExpr::Literal(distance)),
            unit,
            ..Self::default()
        }
    }

    /// Options reading the distance from an attribute.
    #[must_use]
    pub fn field(name: impl Into<String>, unit: DistanceUnit) -> Self {
        Self {
            distance: Some(DistanceExpr::Field(name.into())),
            unit,
            ..Self::default()
        }
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] describing the first invalid option.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        match &self.distance {
            None => {
                return Err(ConfigError::MissingRequired {
                    option: "distance".to_string(),
                });
            },
            Some(DistanceExpr::Literal(d)) if !d.is_finite() => {
                return Err(ConfigError::InvalidOption {
                    option: "distance".to_string(),
                    message: format!("{d} is not a finite number"),
                });
            },
            Some(DistanceExpr::Field(name)) => require_name("distance field", name)?,
            Some(DistanceExpr::Literal(_)) => {},
        }
        if self.quadrant_segments > MAX_QUADRANT_SEGMENTS {
            return Err(ConfigError::InvalidOption {
                option: "quadrant segments".to_string(),
                message: format!(
                    "{} exceeds the maximum of {MAX_QUADRANT_SEGMENTS}",
                    self.quadrant_segments
                ),
            });
        }
        Ok(())
    }
}

/// Overlay operation applied by [`overlay`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlayOperation {
    /// Parts of the input not covered by the overlay.
    #[default]
    Difference,
    /// Parts shared by both inputs, with attributes of both.
    Intersect,
    /// Every region of either input, split where they overlap.
    Union,
    /// The input with overlay features replacing what they cover.
    Update,
}

impl std::fmt::Display for OverlayOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Difference => "difference",
            Self::Intersect => "intersect",
            Self::Union => "union",
            Self::Update => "update",
        };
        f.write_str(name)
    }
}

/// Options for [`overlay`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OverlayOptions {
    /// Operation to apply
    pub operation: OverlayOperation,
    /// Split multi-part results into single-part features
    pub single_part: bool,
}

impl OverlayOptions {
    /// Options for `operation` with multi-part output.
    #[must_use]
    pub fn new(operation: OverlayOperation) -> Self {
        Self {
            operation,
            single_part: false,
        }
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ConflictingOptions`] when single-part output
    /// is requested for an update, whose result must keep the update
    /// features unchanged.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.single_part && self.operation == OverlayOperation::Update {
            return Err(ConfigError::ConflictingOptions {
                options: "single-part output cannot be combined with update".to_string(),
            });
        }
        Ok(())
    }
}

/// Options for [`sum_line_length`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SumLineLengthOptions {
    /// Field receiving the summed length
    pub length_field: String,
    /// Field receiving the number of lines
    pub count_field: String,
}

impl Default for SumLineLengthOptions {
    fn default() -> Self {
        Self {
            length_field: DEFAULT_LENGTH_FIELD.to_string(),
            count_field: DEFAULT_LINE_COUNT_FIELD.to_string(),
        }
    }
}

impl SumLineLengthOptions {
    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for empty or identical field names.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        require_name("length field", &self.length_field)?;
        require_name("count field", &self.count_field)?;
        if self.length_field == self.count_field {
            return Err(ConfigError::ConflictingOptions {
                options: format!(
                    "length field and count field are both '{}'",
                    self.length_field
                ),
            });
        }
        Ok(())
    }
}

/// Options for [`count_points`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountPointsOptions {
    /// Field receiving the count
    pub count_field: String,
}

impl Default for CountPointsOptions {
    fn default() -> Self {
        Self {
            count_field: DEFAULT_POINT_COUNT_FIELD.to_string(),
        }
    }
}

impl CountPointsOptions {
    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingRequired`] for an empty field name.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        require_name("count field", &self.count_field)
    }
}

/// Options for [`to_point`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ToPointOptions {
    /// Place the point on the geometry instead of at its centroid
    pub inside: bool,
    /// Derive one point per part instead of one per feature
    pub single_part: bool,
}

/// Options for [`vertices_to_points`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VerticesOptions {
    /// Which vertices become points
    pub location: PointLocation,
}

/// Options for [`near`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NearOptions {
    /// Attribute of the near features reported instead of their id
    pub near_id_field: Option<String>,
    /// Search radius; unlimited when `None`
    pub maximum_distance: Option<f64>,
    /// Unit of the radius and of the reported distance
    pub unit: DistanceUnit,
}

impl NearOptions {
    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for a blank id field or a radius that is
    /// not a positive finite number.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if let Some(name) = &self.near_id_field {
            require_name("near id field", name)?;
        }
        if let Some(d) = self.maximum_distance {
            if !(d.is_finite() && d > 0.0) {
                return Err(ConfigError::InvalidOption {
                    option: "maximum distance".to_string(),
                    message: format!("{d} must be a positive number"),
                });
            }
        }
        Ok(())
    }
}

/// Buffers every feature of `input`.
///
/// # Errors
///
/// Returns a [`ConfigError`] for invalid options, or the error raised while
/// building the stage.
pub fn buffer(input: OperationInput, options: &BufferOptions) -> Result<SharedCollection> {
    options.validate()?;
    let source = input.into_features()?;
    let distance = options
        .distance
        .clone()
        .ok_or_else(|| ConfigError::MissingRequired {
            option: "distance".to_string(),
        })?;
    info!("Buffering '{}' by {distance} ({})", source.schema().type_name(), options.unit);
    let stage = BufferCollection::new(source, distance, options.unit, options.quadrant_segments)?;
    Ok(Arc::new(stage))
}

/// Splits multi-part features into single-part features.
///
/// # Errors
///
/// Returns [`PipelineError::UnsupportedInput`] for raster inputs.
pub fn explode(input: OperationInput) -> Result<SharedCollection> {
    Ok(Arc::new(ExplodeCollection::new(input.into_features()?)))
}

/// Overlays `input` with `other`.
///
/// # Errors
///
/// Returns a [`ConfigError`] for invalid options, a geometry error when an
/// input has the wrong geometry kind, or a CRS error when `other` cannot be
/// reprojected.
pub fn overlay(
    input: OperationInput,
    other: OperationInput,
    options: &OverlayOptions,
) -> Result<SharedCollection> {
    options.validate()?;
    let input = input.into_features()?;
    let other = other.into_features()?;
    info!(
        "Running {} of '{}' with '{}'",
        options.operation,
        input.schema().type_name(),
        other.schema().type_name()
    );
    let result: SharedCollection = match options.operation {
        OverlayOperation::Difference => Arc::new(DifferenceCollection::new(input, other)?),
        OverlayOperation::Intersect => Arc::new(IntersectCollection::new(input, other)?),
        OverlayOperation::Union => crate::pipeline::union(input, other)?,
        OverlayOperation::Update => crate::pipeline::update(input, other)?,
    };
    if options.single_part {
        return Ok(Arc::new(ExplodeCollection::new(result)));
    }
    Ok(result)
}

/// Parts of `input` not covered by `erase`.
///
/// # Errors
///
/// See [`overlay`].
pub fn difference(input: OperationInput, erase: OperationInput) -> Result<SharedCollection> {
    overlay(input, erase, &OverlayOptions::new(OverlayOperation::Difference))
}

/// Pairwise intersections of `input` and `other`.
///
/// # Errors
///
/// See [`overlay`].
pub fn intersect(input: OperationInput, other: OperationInput) -> Result<SharedCollection> {
    overlay(input, other, &OverlayOptions::new(OverlayOperation::Intersect))
}

/// Union of two polygon collections.
///
/// # Errors
///
/// See [`overlay`].
pub fn union(input: OperationInput, other: OperationInput) -> Result<SharedCollection> {
    overlay(input, other, &OverlayOptions::new(OverlayOperation::Union))
}

/// Replaces the parts of `input` covered by `update` with the update features.
///
/// # Errors
///
/// See [`overlay`].
pub fn update(input: OperationInput, update: OperationInput) -> Result<SharedCollection> {
    overlay(input, update, &OverlayOptions::new(OverlayOperation::Update))
}

/// Concatenates two collections under a merged schema.
///
/// # Errors
///
/// Returns a schema error when shared fields are incompatible, or a CRS
/// error when `second` cannot be reprojected.
pub fn merge(first: OperationInput, second: OperationInput) -> Result<SharedCollection> {
    let stage = MergeCollection::new(first.into_features()?, second.into_features()?)?;
    Ok(Arc::new(stage))
}

/// Sums the length of the lines inside each polygon.
///
/// # Errors
///
/// Returns a [`ConfigError`] for invalid options, or a geometry error when
/// an input has the wrong geometry kind.
pub fn sum_line_length(
    polygons: OperationInput,
    lines: OperationInput,
    options: &SumLineLengthOptions,
) -> Result<SharedCollection> {
    options.validate()?;
    let measure = AggregateMeasure::SumLength {
        length_field: options.length_field.clone(),
        count_field: options.count_field.clone(),
    };
    let stage =
        SpatialAggregateJoin::new(polygons.into_features()?, lines.into_features()?, measure)?;
    Ok(Arc::new(stage))
}

/// Counts the points inside each polygon.
///
/// # Errors
///
/// Returns a [`ConfigError`] for invalid options, or a geometry error when
/// an input has the wrong geometry kind.
pub fn count_points(
    polygons: OperationInput,
    points: OperationInput,
    options: &CountPointsOptions,
) -> Result<SharedCollection> {
    options.validate()?;
    let measure = AggregateMeasure::CountPoints {
        count_field: options.count_field.clone(),
    };
    let stage =
        SpatialAggregateJoin::new(polygons.into_features()?, points.into_features()?, measure)?;
    Ok(Arc::new(stage))
}

/// Derives a representative point for each feature, or each part.
///
/// # Errors
///
/// Returns [`PipelineError::UnsupportedInput`] for raster inputs.
pub fn to_point(input: OperationInput, options: &ToPointOptions) -> Result<SharedCollection> {
    let mut source = input.into_features()?;
    if options.single_part {
        source = Arc::new(ExplodeCollection::new(source));
    }
    Ok(Arc::new(ToPointCollection::new(source, options.inside)))
}

/// Turns vertices into point features.
///
/// # Errors
///
/// Returns [`PipelineError::UnsupportedInput`] for raster inputs.
pub fn vertices_to_points(
    input: OperationInput,
    options: &VerticesOptions,
) -> Result<SharedCollection> {
    let source = input.into_features()?;
    Ok(Arc::new(VerticesToPointsCollection::new(source, options.location)))
}

/// Replaces each geometry by its bounding rectangle.
///
/// # Errors
///
/// Returns [`PipelineError::UnsupportedInput`] for raster inputs.
pub fn envelope(input: OperationInput) -> Result<SharedCollection> {
    Ok(Arc::new(ShapeCollection::envelopes(input.into_features()?)))
}

/// Replaces each geometry by its convex hull.
///
/// # Errors
///
/// Returns [`PipelineError::UnsupportedInput`] for raster inputs.
pub fn convex_hull(input: OperationInput) -> Result<SharedCollection> {
    Ok(Arc::new(ShapeCollection::convex_hulls(input.into_features()?)))
}

/// Replaces each geometry by its minimum bounding circle.
///
/// Features whose vertices all coincide have no circle and are skipped.
///
/// # Errors
///
/// Returns [`PipelineError::UnsupportedInput`] for raster inputs.
pub fn minimum_bounding_circle(input: OperationInput) -> Result<SharedCollection> {
    Ok(Arc::new(ShapeCollection::bounding_circles(input.into_features()?)))
}

/// Turns polygon boundaries into line features.
///
/// # Errors
///
/// Returns [`PipelineError::UnsupportedInput`] for raster inputs.
pub fn to_line(input: OperationInput) -> Result<SharedCollection> {
    Ok(Arc::new(ShapeCollection::to_lines(input.into_features()?)))
}

/// Appends the nearest feature of `near` to every input feature.
///
/// # Errors
///
/// Returns a [`ConfigError`] for invalid options or an unknown id field, or
/// a CRS error when `near` cannot be reprojected.
pub fn near(
    input: OperationInput,
    near: OperationInput,
    options: &NearOptions,
) -> Result<SharedCollection> {
    options.validate()?;
    let stage = NearCollection::new(
        input.into_features()?,
        near.into_features()?,
        options.near_id_field.clone(),
        options.maximum_distance,
        options.unit,
    )?;
    Ok(Arc::new(stage))
}
