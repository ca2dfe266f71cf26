//! Static reference data: container types, compartment classes and the
//! feasible container-count combinations per class.
//!
//! The catalog is an explicit value owned by the caller and handed to the
//! planner; there is no process-wide registry.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::model::{CompartmentId, ContainerType, ContainerTypeRecord, TypeCode, ValidationError};
use crate::types::{Dimensional, Dims};

/// One feasible way to fill a compartment class: a container count per type.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Combination {
    counts: BTreeMap<TypeCode, u32>,
}

impl Combination {
    pub fn new<C: Into<TypeCode>>(counts: impl IntoIterator<Item = (C, u32)>) -> Self {
        Self {
            counts: counts
                .into_iter()
                .map(|(code, count)| (code.into(), count))
                .collect(),
        }
    }

    /// Requested count for a type; types not mentioned count as zero.
    pub fn count(&self, code: &TypeCode) -> u32 {
        self.counts.get(code).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TypeCode, u32)> {
        self.counts.iter().map(|(code, count)| (code, *count))
    }

    /// Copy with the count for `code` lowered by `by`, never below zero.
    pub fn reduced(&self, code: &TypeCode, by: u32) -> Self {
        let mut counts = self.counts.clone();
        if let Some(count) = counts.get_mut(code) {
            *count = count.saturating_sub(by);
        }
        Self { counts }
    }
}

impl fmt::Display for Combination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .counts
            .iter()
            .map(|(code, count)| format!("{count} {code}"))
            .collect();
        f.write_str(&parts.join(", "))
    }
}

/// A group of compartments searched together (e.g. aft or forward hold).
#[derive(Clone, Debug, PartialEq)]
pub struct CompartmentClass {
    pub name: String,
    pub compartments: Vec<CompartmentId>,
    pub combinations: Vec<Combination>,
    /// Explicit weight ceiling; when absent the compartments' own limits are summed.
    pub ceiling: Option<f64>,
}

impl CompartmentClass {
    pub fn new(
        name: impl Into<String>,
        compartments: Vec<CompartmentId>,
        combinations: Vec<Combination>,
    ) -> Self {
        Self {
            name: name.into(),
            compartments,
            combinations,
            ceiling: None,
        }
    }

    pub fn with_ceiling(mut self, ceiling: f64) -> Self {
        self.ceiling = Some(ceiling);
        self
    }

    /// Largest count of `code` any combination of this class asks for.
    pub fn max_count(&self, code: &TypeCode) -> u32 {
        self.combinations
            .iter()
            .map(|combination| combination.count(code))
            .max()
            .unwrap_or(0)
    }

    /// Combinations with room for `reserved` containers of `code`, lowered
    /// by that many and paired with their position in `combinations`.
    pub fn remaining_combinations(
        &self,
        code: &TypeCode,
        reserved: u32,
    ) -> Vec<(usize, Combination)> {
        self.combinations
            .iter()
            .enumerate()
            .filter(|(_, combination)| combination.count(code) >= reserved)
            .map(|(idx, combination)| (idx, combination.reduced(code, reserved)))
            .collect()
    }
}

/// Reference data for one aircraft configuration.
#[derive(Clone, Debug)]
pub struct Catalog {
    container_types: BTreeMap<TypeCode, ContainerType>,
    classes: Vec<CompartmentClass>,
    bulk_compartment: Option<CompartmentId>,
}

impl Catalog {
    /// Creates a catalog after checking that classes only reference known
    /// container types and never share a compartment.
    pub fn new(
        container_types: Vec<ContainerType>,
        classes: Vec<CompartmentClass>,
        bulk_compartment: Option<CompartmentId>,
    ) -> Result<Self, ValidationError> {
        let container_types: BTreeMap<TypeCode, ContainerType> = container_types
            .into_iter()
            .map(|kind| (kind.code.clone(), kind))
            .collect();

        let mut seen: BTreeSet<CompartmentId> = bulk_compartment.into_iter().collect();
        for class in &classes {
            if class.compartments.is_empty() {
                return Err(ValidationError::InvalidConfiguration(format!(
                    "compartment class '{}' has no compartments",
                    class.name
                )));
            }
            if class.combinations.is_empty() {
                return Err(ValidationError::InvalidConfiguration(format!(
                    "compartment class '{}' has no combinations",
                    class.name
                )));
            }
            for id in &class.compartments {
                if !seen.insert(*id) {
                    return Err(ValidationError::InvalidConfiguration(format!(
                        "compartment {id} is assigned more than once"
                    )));
                }
            }
            for combination in &class.combinations {
                if let Some((code, _)) = combination
                    .iter()
                    .find(|(code, _)| !container_types.contains_key(*code))
                {
                    return Err(ValidationError::InvalidConfiguration(format!(
                        "compartment class '{}' references unknown container type {code}",
                        class.name
                    )));
                }
            }
        }

        Ok(Self {
            container_types,
            classes,
            bulk_compartment,
        })
    }

    /// Built-in narrow-body freighter configuration: AKE/PAG/PMC, an aft
    /// and a forward class, and compartment 5 as the bulk luggage hold.
    pub fn default_fleet() -> Self {
        let container_types = [
            ContainerType {
                code: TypeCode::new("AKE"),
                dims: Dims::new(156.0, 160.0, 153.0),
                max_weight: 1588.0,
                tare_weight: 82.0,
            },
            ContainerType {
                code: TypeCode::new("PAG"),
                dims: Dims::new(318.0, 162.0, 224.0),
                max_weight: 6033.0,
                tare_weight: 110.0,
            },
            ContainerType {
                code: TypeCode::new("PMC"),
                dims: Dims::new(318.0, 163.0, 244.0),
                max_weight: 6804.0,
                tare_weight: 120.0,
            },
        ]
        .into_iter()
        .map(|kind| (kind.code.clone(), kind))
        .collect();

        let aft = CompartmentClass::new(
            "aft",
            vec![3, 4],
            vec![
                Combination::new([("PMC", 0), ("PAG", 1), ("AKE", 16)]),
                Combination::new([("PMC", 1), ("PAG", 0), ("AKE", 14)]),
                Combination::new([("PMC", 0), ("PAG", 2), ("AKE", 12)]),
                Combination::new([("PMC", 2), ("PAG", 0), ("AKE", 10)]),
                Combination::new([("PMC", 1), ("PAG", 2), ("AKE", 6)]),
                Combination::new([("PMC", 3), ("PAG", 0), ("AKE", 6)]),
                Combination::new([("PMC", 0), ("PAG", 4), ("AKE", 4)]),
            ],
        );
        let forward = CompartmentClass::new(
            "forward",
            vec![1, 2],
            vec![
                Combination::new([("PMC", 0), ("PAG", 1), ("AKE", 12)]),
                Combination::new([("PMC", 1), ("PAG", 0), ("AKE", 10)]),
                Combination::new([("PMC", 0), ("PAG", 2), ("AKE", 8)]),
                Combination::new([("PMC", 2), ("PAG", 0), ("AKE", 6)]),
                Combination::new([("PMC", 1), ("PAG", 2), ("AKE", 2)]),
                Combination::new([("PMC", 3), ("PAG", 0), ("AKE", 2)]),
            ],
        );

        Self {
            container_types,
            classes: vec![aft, forward],
            bulk_compartment: Some(5),
        }
    }

    pub fn container_type(&self, code: &TypeCode) -> Option<&ContainerType> {
        self.container_types.get(code)
    }

    /// Container types ordered by ascending volume, then max weight.
    pub fn types_by_volume(&self) -> Vec<&ContainerType> {
        let mut kinds: Vec<&ContainerType> = self.container_types.values().collect();
        kinds.sort_by(|a, b| {
            a.volume()
                .partial_cmp(&b.volume())
                .unwrap_or(Ordering::Equal)
                .then_with(|| {
                    a.max_weight
                        .partial_cmp(&b.max_weight)
                        .unwrap_or(Ordering::Equal)
                })
        });
        kinds
    }

    /// Classes in processing order.
    pub fn classes(&self) -> &[CompartmentClass] {
        &self.classes
    }

    pub fn bulk_compartment(&self) -> Option<CompartmentId> {
        self.bulk_compartment
    }

    /// Replaces the container types with the ones reported by the cargo
    /// service, completing missing weight limits from this catalog.
    ///
    /// Combinations that mention a type the service did not report simply
    /// see an empty pool for it later on.
    pub fn with_fetched_types(
        &self,
        records: &[ContainerTypeRecord],
    ) -> Result<Self, ValidationError> {
        let mut container_types = BTreeMap::new();
        for record in records {
            let code = TypeCode::new(record.code.as_str());
            let known = self.container_types.get(&code);
            let max_weight = record
                .max_weight
                .or_else(|| known.map(|kind| kind.max_weight));
            let tare_weight = record
                .tare_weight
                .or_else(|| known.map(|kind| kind.tare_weight));
            let (Some(max_weight), Some(tare_weight)) = (max_weight, tare_weight) else {
                return Err(ValidationError::InvalidConfiguration(format!(
                    "container type {code} has no weight limits in the catalog"
                )));
            };
            let kind = ContainerType::new(
                code,
                Dims::new(record.width, record.height, record.length),
                max_weight,
                tare_weight,
            )?;
            container_types.insert(kind.code.clone(), kind);
        }

        Ok(Self {
            container_types,
            classes: self.classes.clone(),
            bulk_compartment: self.bulk_compartment,
        })
    }
}
