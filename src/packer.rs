//! Packing logic: assigns shipments to container instances.
//!
//! Each shipment goes to the first container type (by ascending volume)
//! that can hold it. Within a type, shipments are taken densest first and
//! poured into one open container at a time, opening a fresh one whenever
//! the fill ceiling or the max gross weight would be crossed.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use log::{debug, info};
use serde::Serialize;

use crate::catalog::Catalog;
use crate::model::{ContainerInstance, ContainerType, InstanceIds, ShipmentId, ShipmentItem, TypeCode};
use crate::types::{Dimensional, EPSILON_GENERAL, Weighted};

/// Configuration for the packer.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PackingConfig {
    /// Maximum occupied fraction of a container's volume (below 1.0 leaves a safety margin)
    pub volume_max_percentage: f64,
    /// General numerical tolerance
    pub general_epsilon: f64,
}

impl PackingConfig {
    pub const DEFAULT_VOLUME_MAX_PERCENTAGE: f64 = 0.9;
    pub const DEFAULT_GENERAL_EPSILON: f64 = EPSILON_GENERAL;

    /// Creates a builder for custom configuration.
    pub fn builder() -> PackingConfigBuilder {
        PackingConfigBuilder::default()
    }
}

impl Default for PackingConfig {
    fn default() -> Self {
        Self {
            volume_max_percentage: Self::DEFAULT_VOLUME_MAX_PERCENTAGE,
            general_epsilon: Self::DEFAULT_GENERAL_EPSILON,
        }
    }
}

/// Builder for PackingConfig.
#[derive(Clone, Debug, Default)]
pub struct PackingConfigBuilder {
    config: PackingConfig,
}

impl PackingConfigBuilder {
    /// Sets the fill ceiling.
    pub fn volume_max_percentage(mut self, ratio: f64) -> Self {
        self.config.volume_max_percentage = ratio;
        self
    }

    /// Sets the general tolerance.
    pub fn general_epsilon(mut self, epsilon: f64) -> Self {
        self.config.general_epsilon = epsilon;
        self
    }

    pub fn build(self) -> PackingConfig {
        self.config
    }
}

/// Reasons why a shipment fits no container type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnplacedReason {
    TooHeavyForContainer,
    DimensionsExceedContainer,
    ExceedsFillCeiling,
}

impl UnplacedReason {
    pub fn code(&self) -> &'static str {
        match self {
            UnplacedReason::TooHeavyForContainer => "too_heavy_for_container",
            UnplacedReason::DimensionsExceedContainer => "dimensions_exceed_container",
            UnplacedReason::ExceedsFillCeiling => "exceeds_fill_ceiling",
        }
    }
}

impl fmt::Display for UnplacedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnplacedReason::TooHeavyForContainer => {
                write!(f, "shipment exceeds the net capacity of every container type")
            }
            UnplacedReason::DimensionsExceedContainer => {
                write!(
                    f,
                    "shipment exceeds every container type in at least one dimension"
                )
            }
            UnplacedReason::ExceedsFillCeiling => {
                write!(f, "shipment volume exceeds the fill ceiling of every fitting type")
            }
        }
    }
}

/// Errors raised while packing.
#[derive(Clone, Debug, PartialEq)]
pub enum PackError {
    UnplaceableShipment {
        shipment_id: ShipmentId,
        reason: UnplacedReason,
    },
    NoContainerTypes,
}

impl fmt::Display for PackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackError::UnplaceableShipment {
                shipment_id,
                reason,
            } => write!(
                f,
                "Shipment {shipment_id} cannot be placed [{}]: {reason}",
                reason.code()
            ),
            PackError::NoContainerTypes => write!(f, "No container types available"),
        }
    }
}

impl std::error::Error for PackError {}

/// Events emitted while packing, for live progress reporting.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type")]
pub enum PackEvent {
    /// A new container instance was opened.
    ContainerOpened {
        container_id: usize,
        container_type: TypeCode,
    },
    /// A shipment was added to a container.
    ShipmentPacked {
        container_id: usize,
        shipment_id: ShipmentId,
        gross_weight: f64,
        fill_ratio: f64,
    },
}

/// Filled containers per type, each list in opening order.
pub type PackedContainers = BTreeMap<TypeCode, Vec<ContainerInstance>>;

/// Assigns shipments to container instances of the best-fitting type.
#[derive(Clone, Debug)]
pub struct Packer<'a> {
    catalog: &'a Catalog,
    config: PackingConfig,
}

impl<'a> Packer<'a> {
    pub fn new(catalog: &'a Catalog, config: PackingConfig) -> Self {
        Self { catalog, config }
    }

    /// Buckets shipments by the first container type able to hold them and
    /// orders each bucket by descending density.
    pub fn sort(
        &self,
        shipments: &[ShipmentItem],
    ) -> Result<BTreeMap<TypeCode, Vec<ShipmentItem>>, PackError> {
        let kinds = self.catalog.types_by_volume();
        if kinds.is_empty() && !shipments.is_empty() {
            return Err(PackError::NoContainerTypes);
        }

        let mut buckets: BTreeMap<TypeCode, Vec<ShipmentItem>> = BTreeMap::new();
        for shipment in shipments {
            match kinds.iter().find(|kind| self.qualifies(kind, shipment)) {
                Some(kind) => buckets
                    .entry(kind.code.clone())
                    .or_default()
                    .push(shipment.clone()),
                None => {
                    return Err(PackError::UnplaceableShipment {
                        shipment_id: shipment.id(),
                        reason: self.unfit_reason(&kinds, shipment),
                    });
                }
            }
        }

        for bucket in buckets.values_mut() {
            bucket.sort_by(|a, b| {
                b.density()
                    .partial_cmp(&a.density())
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.id().cmp(&b.id()))
            });
        }
        Ok(buckets)
    }

    /// Packs shipments into container instances.
    pub fn pack(
        &self,
        shipments: &[ShipmentItem],
        ids: &mut InstanceIds,
    ) -> Result<PackedContainers, PackError> {
        self.pack_with_progress(shipments, ids, |_| {})
    }

    /// Like `pack`, calling `on_event` for every opened container and packed shipment.
    pub fn pack_with_progress(
        &self,
        shipments: &[ShipmentItem],
        ids: &mut InstanceIds,
        mut on_event: impl FnMut(&PackEvent),
    ) -> Result<PackedContainers, PackError> {
        let buckets = self.sort(shipments)?;
        let mut packed = PackedContainers::new();

        for (code, bucket) in buckets {
            let Some(kind) = self.catalog.container_type(&code) else {
                continue;
            };
            let mut closed: Vec<ContainerInstance> = Vec::new();
            let mut current: Option<ContainerInstance> = None;

            for shipment in bucket {
                let fits_current = current
                    .as_ref()
                    .is_some_and(|open| open.can_accept(&shipment, self.config.volume_max_percentage));
                if !fits_current {
                    closed.extend(current.take());
                    let opened = ContainerInstance::empty(ids.next_id(), kind.clone());
                    on_event(&PackEvent::ContainerOpened {
                        container_id: opened.id,
                        container_type: code.clone(),
                    });
                    current = Some(opened);
                }
                if let Some(open) = current.as_mut() {
                    let shipment_id = shipment.id();
                    open.push_shipment(shipment);
                    on_event(&PackEvent::ShipmentPacked {
                        container_id: open.id,
                        shipment_id,
                        gross_weight: open.gross_weight(),
                        fill_ratio: open.fill_ratio(),
                    });
                }
            }
            closed.extend(current);

            info!(
                "📦 {}: {} containers, {:.1} kg gross",
                code,
                closed.len(),
                closed.iter().map(Weighted::weight).sum::<f64>()
            );
            packed.insert(code, closed);
        }

        Ok(packed)
    }

    /// A type qualifies when it dominates every dimension, has the net
    /// capacity, and the shipment alone stays under the fill ceiling.
    fn qualifies(&self, kind: &ContainerType, shipment: &ShipmentItem) -> bool {
        let eps = self.config.general_epsilon;
        kind.can_hold(shipment, eps)
            && shipment.volume() <= kind.volume() * self.config.volume_max_percentage + eps
    }

    fn unfit_reason(&self, kinds: &[&ContainerType], shipment: &ShipmentItem) -> UnplacedReason {
        let eps = self.config.general_epsilon;
        let weight_blocked = kinds
            .iter()
            .all(|kind| shipment.weight() > kind.net_capacity() + eps);
        if weight_blocked {
            return UnplacedReason::TooHeavyForContainer;
        }
        let dimension_blocked = kinds.iter().all(|kind| !shipment.fits_in(&kind.dims, eps));
        if dimension_blocked {
            return UnplacedReason::DimensionsExceedContainer;
        }
        debug!(
            "shipment {} fits dimensionally but not under the {} fill ceiling",
            shipment.id(),
            self.config.volume_max_percentage
        );
        UnplacedReason::ExceedsFillCeiling
    }
}
