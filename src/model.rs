//! Data models for the load planning run.
//!
//! This module defines the fundamental data structures shared by every stage:
//! - `ShipmentItem`: A freight item with box dimensions and weight
//! - `ContainerType`: A catalog box class (AKE, PAG, PMC, ...)
//! - `ContainerInstance`: One physical container holding shipments or bulk luggage
//! - `CompartmentTarget`: An aircraft hold section with a weight ceiling
//! - `LuggageSummary`: The bulk passenger luggage figures for the flight

use std::fmt;

use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use utoipa::ToSchema;

use crate::types::{Dimensional, Dims, EPSILON_GENERAL, Weighted, validation};

pub type ShipmentId = u64;
pub type CompartmentId = u32;

/// Validation error for input data.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    InvalidDimension(String),
    InvalidWeight(String),
    InvalidConfiguration(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::InvalidDimension(msg) => write!(f, "Invalid dimension: {}", msg),
            ValidationError::InvalidWeight(msg) => write!(f, "Invalid weight: {}", msg),
            ValidationError::InvalidConfiguration(msg) => {
                write!(f, "Invalid configuration: {}", msg)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Stable catalog key of a container type, e.g. `AKE`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = String, example = "AKE")]
pub struct TypeCode(String);

impl TypeCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeCode {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

/// Wire shape of a shipment as delivered by the cargo service.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "id": 17, "weight": 120.0, "width": 40.0, "height": 30.0, "length": 60.0 }))]
pub struct ShipmentRecord {
    #[serde(alias = "awb")]
    pub id: ShipmentId,
    pub weight: f64,
    pub width: f64,
    pub height: f64,
    pub length: f64,
}

/// A single freight item.
///
/// Volume and density are derived once at construction and never recomputed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ShipmentRecord", into = "ShipmentRecord")]
pub struct ShipmentItem {
    id: ShipmentId,
    weight: f64,
    dims: Dims,
    volume: f64,
    density: f64,
}

impl ShipmentItem {
    /// Creates a new shipment with validation.
    ///
    /// # Returns
    /// `Ok(ShipmentItem)` for valid values, otherwise `Err(ValidationError)`
    pub fn new(id: ShipmentId, weight: f64, dims: Dims) -> Result<Self, ValidationError> {
        validation::validate_dims(&dims, &format!("Shipment {id}"))
            .map_err(ValidationError::InvalidDimension)?;
        validation::validate_weight(weight).map_err(|msg| {
            ValidationError::InvalidWeight(format!("shipment {id}: {msg}"))
        })?;
        let volume = dims.volume();
        Ok(Self {
            id,
            weight,
            dims,
            volume,
            density: weight / volume,
        })
    }

    pub fn id(&self) -> ShipmentId {
        self.id
    }

    /// Weight per unit of volume.
    pub fn density(&self) -> f64 {
        self.density
    }
}

impl Dimensional for ShipmentItem {
    fn dims(&self) -> Dims {
        self.dims
    }

    fn volume(&self) -> f64 {
        self.volume
    }
}

impl Weighted for ShipmentItem {
    fn weight(&self) -> f64 {
        self.weight
    }
}

impl TryFrom<ShipmentRecord> for ShipmentItem {
    type Error = ValidationError;

    fn try_from(record: ShipmentRecord) -> Result<Self, Self::Error> {
        Self::new(
            record.id,
            record.weight,
            Dims::new(record.width, record.height, record.length),
        )
    }
}

impl From<ShipmentItem> for ShipmentRecord {
    fn from(item: ShipmentItem) -> Self {
        Self {
            id: item.id,
            weight: item.weight,
            width: item.dims.width,
            height: item.dims.height,
            length: item.dims.length,
        }
    }
}

/// Wire shape of a container type.
///
/// The cargo service only reports dimensions; weight limits are completed
/// from the catalog by type code when they are missing.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({ "type": "AKE", "height": 160.0, "width": 156.0, "length": 153.0 }))]
pub struct ContainerTypeRecord {
    #[serde(rename = "type", alias = "containerType")]
    pub code: String,
    pub height: f64,
    pub width: f64,
    pub length: f64,
    #[serde(default)]
    pub max_weight: Option<f64>,
    #[serde(default)]
    pub tare_weight: Option<f64>,
}

/// Catalog entry for a container box class.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContainerType {
    pub code: TypeCode,
    pub dims: Dims,
    /// Maximum gross weight (tare included) in kg.
    pub max_weight: f64,
    /// Empty weight in kg.
    pub tare_weight: f64,
}

impl ContainerType {
    /// Creates a new container type after validating the parameters.
    pub fn new(
        code: impl Into<TypeCode>,
        dims: Dims,
        max_weight: f64,
        tare_weight: f64,
    ) -> Result<Self, ValidationError> {
        let code = code.into();
        validation::validate_dims(&dims, &format!("Container type {code}"))
            .map_err(ValidationError::InvalidDimension)?;
        validation::validate_weight(max_weight)
            .map_err(|msg| ValidationError::InvalidWeight(format!("{code} max weight: {msg}")))?;
        validation::validate_non_negative(tare_weight, "Tare weight")
            .map_err(|msg| ValidationError::InvalidWeight(format!("{code}: {msg}")))?;
        if tare_weight >= max_weight {
            return Err(ValidationError::InvalidWeight(format!(
                "{code}: tare weight {tare_weight} leaves no payload under max weight {max_weight}"
            )));
        }
        Ok(Self {
            code,
            dims,
            max_weight,
            tare_weight,
        })
    }

    /// Payload capacity (max gross weight minus tare).
    pub fn net_capacity(&self) -> f64 {
        self.max_weight - self.tare_weight
    }

    /// Checks if the shipment fits in all three dimensions and within the net capacity.
    pub fn can_hold(&self, shipment: &ShipmentItem, tolerance: f64) -> bool {
        shipment.fits_in(&self.dims, tolerance)
            && shipment.weight() <= self.net_capacity() + tolerance
    }
}

impl Dimensional for ContainerType {
    fn dims(&self) -> Dims {
        self.dims
    }
}

/// What a container instance carries.
#[derive(Clone, Debug, PartialEq)]
pub enum ContainerLoad {
    /// Freight in packing order.
    Shipments(Vec<ShipmentItem>),
    /// Bulk passenger luggage.
    Luggage { items: u32 },
}

/// One physical container of a given type.
///
/// Created by the packer or the luggage splitter; allocation only selects
/// instances and never edits them.
#[derive(Clone, Debug, PartialEq)]
pub struct ContainerInstance {
    pub id: usize,
    pub kind: ContainerType,
    pub load: ContainerLoad,
    /// Fully loaded luggage containers that every plan must carry.
    pub required: bool,
    occupied_volume: f64,
    gross_weight: f64,
}

impl ContainerInstance {
    /// Opens an empty shipment container; gross weight starts at tare.
    pub fn empty(id: usize, kind: ContainerType) -> Self {
        let gross_weight = kind.tare_weight;
        Self {
            id,
            kind,
            load: ContainerLoad::Shipments(Vec::new()),
            required: false,
            occupied_volume: 0.0,
            gross_weight,
        }
    }

    /// Builds a luggage container holding `items` bags out of `items_per_full`.
    pub fn luggage(
        id: usize,
        kind: ContainerType,
        items: u32,
        items_per_full: u32,
        avg_weight: f64,
        required: bool,
    ) -> Self {
        let fill = if items_per_full == 0 {
            0.0
        } else {
            f64::from(items) / f64::from(items_per_full)
        };
        let occupied_volume = kind.volume() * fill;
        let gross_weight = kind.tare_weight + avg_weight * f64::from(items);
        Self {
            id,
            kind,
            load: ContainerLoad::Luggage { items },
            required,
            occupied_volume,
            gross_weight,
        }
    }

    pub fn type_code(&self) -> &TypeCode {
        &self.kind.code
    }

    pub fn occupied_volume(&self) -> f64 {
        self.occupied_volume
    }

    pub fn gross_weight(&self) -> f64 {
        self.gross_weight
    }

    /// Weight of the contents without tare.
    pub fn payload_weight(&self) -> f64 {
        self.gross_weight - self.kind.tare_weight
    }

    /// Occupied volume as a fraction of the type volume.
    pub fn fill_ratio(&self) -> f64 {
        let total = self.kind.volume();
        if total <= 0.0 {
            return 0.0;
        }
        self.occupied_volume / total
    }

    /// Shipments in packing order; empty for luggage containers.
    pub fn shipments(&self) -> &[ShipmentItem] {
        match &self.load {
            ContainerLoad::Shipments(items) => items,
            ContainerLoad::Luggage { .. } => &[],
        }
    }

    /// Bag count if this container came out of the luggage splitter.
    pub fn luggage_count(&self) -> Option<u32> {
        match self.load {
            ContainerLoad::Luggage { items } => Some(items),
            ContainerLoad::Shipments(_) => None,
        }
    }

    /// Checks whether the shipment can join without breaking the fill ceiling
    /// or the max gross weight.
    ///
    /// # Parameters
    /// * `shipment` - The shipment to check
    /// * `fill_ceiling` - Maximum occupied fraction of the type volume
    pub fn can_accept(&self, shipment: &ShipmentItem, fill_ceiling: f64) -> bool {
        if !matches!(self.load, ContainerLoad::Shipments(_)) {
            return false;
        }
        let volume_limit = self.kind.volume() * fill_ceiling;
        self.occupied_volume + shipment.volume() <= volume_limit + EPSILON_GENERAL
            && self.gross_weight + shipment.weight() <= self.kind.max_weight + EPSILON_GENERAL
    }

    /// Appends a shipment and updates the running totals.
    ///
    /// Callers check `can_accept` first; luggage containers ignore the call.
    pub(crate) fn push_shipment(&mut self, shipment: ShipmentItem) {
        if let ContainerLoad::Shipments(items) = &mut self.load {
            self.occupied_volume += shipment.volume();
            self.gross_weight += shipment.weight();
            items.push(shipment);
        }
    }
}

impl Weighted for ContainerInstance {
    fn weight(&self) -> f64 {
        self.gross_weight
    }
}

/// Hands out container instance ids for one planning run.
#[derive(Debug)]
pub struct InstanceIds {
    next: usize,
}

impl Default for InstanceIds {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl InstanceIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> usize {
        let id = self.next;
        self.next += 1;
        id
    }
}

/// An aircraft hold section and its maximum total weight.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({ "id": 1, "maxWeight": 18000.0 }))]
pub struct CompartmentTarget {
    #[serde(alias = "compartmentId")]
    pub id: CompartmentId,
    pub max_weight: f64,
}

/// Bulk passenger luggage figures for the flight.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({ "count": 250, "firstClassCount": 30, "avgWeight": 20.0 }))]
pub struct LuggageSummary {
    #[serde(alias = "nbOfLuggage", alias = "nb_luggage")]
    pub count: u32,
    #[serde(default, alias = "nbOfFirstClassLuggage")]
    pub first_class_count: u32,
    #[serde(alias = "averageWeight", alias = "avg_weight")]
    pub avg_weight: f64,
}

impl LuggageSummary {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.first_class_count > self.count {
            return Err(ValidationError::InvalidConfiguration(format!(
                "first class luggage count {} exceeds total count {}",
                self.first_class_count, self.count
            )));
        }
        validation::validate_non_negative(self.avg_weight, "Average luggage weight")
            .map_err(ValidationError::InvalidWeight)
    }

    /// Bags that are not first class.
    pub fn standard_count(&self) -> u32 {
        self.count - self.first_class_count
    }
}
