//! Common types and traits shared by the packing and allocation stages.
//!
//! Only aggregate volume and weight accounting is modelled, so geometry
//! reduces to a box extent (`Dims`) and the checks built on top of it.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Global numerical tolerance for floating-point comparisons.
///
/// Used for dimension, volume and weight comparisons so that rounding on
/// the edge of a limit does not strand a shipment.
pub const EPSILON_GENERAL: f64 = 1e-6;

/// Box extent in an arbitrary length unit.
///
/// # Examples
/// ```ignore
/// let dims = Dims::new(2.0, 3.0, 4.0);
/// assert_eq!(dims.volume(), 24.0);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Dims {
    pub width: f64,
    pub height: f64,
    pub length: f64,
}

impl Dims {
    #[inline]
    pub const fn new(width: f64, height: f64, length: f64) -> Self {
        Self {
            width,
            height,
            length,
        }
    }

    /// Product of all three components.
    #[inline]
    pub fn volume(&self) -> f64 {
        self.width * self.height * self.length
    }

    /// Checks if every component is dominated by the matching component of `outer`.
    ///
    /// # Parameters
    /// * `outer` - The enclosing extent (e.g. container type dimensions)
    /// * `tolerance` - Numerical tolerance for the comparison
    #[inline]
    pub fn fits_within(&self, outer: &Self, tolerance: f64) -> bool {
        self.width <= outer.width + tolerance
            && self.height <= outer.height + tolerance
            && self.length <= outer.length + tolerance
    }
}

/// Trait for objects with a box extent.
pub trait Dimensional {
    /// Returns the dimensions of the object.
    fn dims(&self) -> Dims;

    /// Calculates the volume.
    fn volume(&self) -> f64 {
        self.dims().volume()
    }

    /// Checks if this object fits in an extent with the given dimensions.
    fn fits_in(&self, outer: &Dims, tolerance: f64) -> bool {
        self.dims().fits_within(outer, tolerance)
    }
}

/// Trait for objects with weight.
pub trait Weighted {
    /// Returns the weight in kg.
    fn weight(&self) -> f64;
}

/// Sums the weights of a collection.
pub fn total_weight<'a, W: Weighted + 'a>(items: impl IntoIterator<Item = &'a W>) -> f64 {
    items.into_iter().map(Weighted::weight).sum()
}

/// Validation functions shared by the model constructors.
pub mod validation {

    /// Validates a single dimension.
    ///
    /// # Returns
    /// `Ok(())` for valid values, otherwise error text
    pub fn validate_dimension(value: f64, name: &str) -> Result<(), String> {
        if value.is_nan() {
            return Err(format!("{} must not be NaN", name));
        }
        if value.is_infinite() {
            return Err(format!("{} must not be infinite", name));
        }
        if value <= 0.0 {
            return Err(format!("{} must be positive, got: {}", name, value));
        }
        Ok(())
    }

    /// Validates a weight that must be strictly positive.
    pub fn validate_weight(value: f64) -> Result<(), String> {
        validate_dimension(value, "Weight")
    }

    /// Validates a weight that may be zero (tare weights, averages).
    pub fn validate_non_negative(value: f64, name: &str) -> Result<(), String> {
        if !value.is_finite() {
            return Err(format!("{} must be finite, got: {}", name, value));
        }
        if value < 0.0 {
            return Err(format!("{} must not be negative, got: {}", name, value));
        }
        Ok(())
    }

    /// Validates all three components of an extent.
    pub fn validate_dims(dims: &super::Dims, owner: &str) -> Result<(), String> {
        validate_dimension(dims.width, &format!("{owner} width"))?;
        validate_dimension(dims.height, &format!("{owner} height"))?;
        validate_dimension(dims.length, &format!("{owner} length"))?;
        Ok(())
    }
}
