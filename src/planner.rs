//! Load planning: packs shipments, splits luggage, allocates containers to
//! compartment classes one after the other and assembles the plan.
//!
//! Classes are processed in catalog order. Containers chosen for a class
//! leave the shared pools before the next class searches, so no container
//! is ever planned twice. Fully loaded luggage containers never enter the
//! search: each class first reserves as many as it can carry, and whatever
//! is left goes to the bulk compartment.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use utoipa::ToSchema;

use crate::allocator::{AllocationError, Allocator, AllocatorConfig, ContainerPools};
use crate::catalog::{Catalog, CompartmentClass};
use crate::luggage::LuggageSplitter;
use crate::model::{
    CompartmentId, CompartmentTarget, ContainerInstance, ContainerTypeRecord, InstanceIds,
    LuggageSummary, ShipmentId, ShipmentItem, TypeCode, ValidationError,
};
use crate::packer::{PackError, PackEvent, Packer, PackingConfig};
use crate::types::{EPSILON_GENERAL, Weighted, total_weight, validation};

/// Luggage handling parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct LuggageConfig {
    /// Bags that fill one luggage container
    pub items_per_container: u32,
    /// Container type used for luggage
    pub container_type: TypeCode,
}

impl LuggageConfig {
    pub const DEFAULT_CONTAINER_TYPE: &'static str = "AKE";
}

impl Default for LuggageConfig {
    fn default() -> Self {
        Self {
            items_per_container: LuggageSplitter::DEFAULT_ITEMS_PER_CONTAINER,
            container_type: TypeCode::new(Self::DEFAULT_CONTAINER_TYPE),
        }
    }
}

/// Everything the planner can be tuned with.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlannerConfig {
    pub packing: PackingConfig,
    pub allocator: AllocatorConfig,
    pub luggage: LuggageConfig,
}

/// Inputs of one planning run, as fetched from the cargo service.
#[derive(Clone, Debug, Default)]
pub struct PlanInput {
    pub compartments: Vec<CompartmentTarget>,
    /// Reported container types; empty means "use the catalog as is".
    pub container_types: Vec<ContainerTypeRecord>,
    pub shipments: Vec<ShipmentItem>,
    pub luggage: LuggageSummary,
}

/// Errors raised while planning.
#[derive(Debug)]
pub enum PlanError {
    Validation(ValidationError),
    Packing(PackError),
    Allocation {
        class: String,
        source: AllocationError,
    },
    UnknownCompartment {
        class: String,
        compartment: CompartmentId,
    },
    RequiredLuggageUnassigned {
        count: usize,
    },
}

impl fmt::Display for PlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanError::Validation(err) => write!(f, "{err}"),
            PlanError::Packing(err) => write!(f, "Packing failed: {err}"),
            PlanError::Allocation { class, source } => {
                write!(f, "Compartment class '{class}': {source}")
            }
            PlanError::UnknownCompartment { class, compartment } => write!(
                f,
                "Compartment class '{class}' refers to compartment {compartment}, which was not reported"
            ),
            PlanError::RequiredLuggageUnassigned { count } => write!(
                f,
                "{count} full luggage containers fit no compartment class and no bulk compartment is configured"
            ),
        }
    }
}

impl std::error::Error for PlanError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PlanError::Validation(err) => Some(err),
            PlanError::Packing(err) => Some(err),
            PlanError::Allocation { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ValidationError> for PlanError {
    fn from(err: ValidationError) -> Self {
        PlanError::Validation(err)
    }
}

impl From<PackError> for PlanError {
    fn from(err: PackError) -> Self {
        PlanError::Packing(err)
    }
}

/// Events emitted while planning, for live progress reporting.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type")]
pub enum PlanEvent {
    ContainerOpened {
        container_id: usize,
        container_type: TypeCode,
    },
    ShipmentPacked {
        container_id: usize,
        shipment_id: ShipmentId,
        gross_weight: f64,
        fill_ratio: f64,
    },
    LuggageSplit {
        required: usize,
        optional: usize,
        total_weight: f64,
    },
    LuggageReserved {
        class: String,
        containers: usize,
        weight: f64,
    },
    ClassAllocated {
        class: String,
        combination: String,
        searched_combination: String,
        containers: usize,
        total_weight: f64,
        target: f64,
        trials_run: usize,
    },
    Finished {
        compartments: usize,
        unallocated: usize,
        total_weight: f64,
    },
}

impl From<&PackEvent> for PlanEvent {
    fn from(event: &PackEvent) -> Self {
        match event {
            PackEvent::ContainerOpened {
                container_id,
                container_type,
            } => PlanEvent::ContainerOpened {
                container_id: *container_id,
                container_type: container_type.clone(),
            },
            PackEvent::ShipmentPacked {
                container_id,
                shipment_id,
                gross_weight,
                fill_ratio,
            } => PlanEvent::ShipmentPacked {
                container_id: *container_id,
                shipment_id: *shipment_id,
                gross_weight: *gross_weight,
                fill_ratio: *fill_ratio,
            },
        }
    }
}

/// Containers planned into one compartment.
#[derive(Clone, Debug, PartialEq)]
pub struct CompartmentLoad {
    pub compartment: CompartmentTarget,
    pub class: Option<String>,
    pub containers: Vec<ContainerInstance>,
}

impl CompartmentLoad {
    fn new(compartment: CompartmentTarget) -> Self {
        Self {
            compartment,
            class: None,
            containers: Vec::new(),
        }
    }

    pub fn weight(&self) -> f64 {
        total_weight(&self.containers)
    }

    pub fn headroom(&self) -> f64 {
        self.compartment.max_weight - self.weight()
    }
}

/// What the search did for one compartment class.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClassOutcome {
    pub class: String,
    pub ceiling: f64,
    pub reserved_luggage: usize,
    pub reserved_weight: f64,
    /// Catalog combination the class was filled by.
    pub combination: String,
    /// The same combination minus the reserved luggage positions.
    pub searched_combination: String,
    pub allocated_weight: f64,
    pub trials_run: usize,
}

/// The assembled load plan.
#[derive(Clone, Debug, PartialEq)]
pub struct Plan {
    /// Ordered by compartment id.
    pub compartments: Vec<CompartmentLoad>,
    /// Containers no class picked; the plan is incomplete while this is non-empty.
    pub unallocated: Vec<ContainerInstance>,
    pub classes: Vec<ClassOutcome>,
}

impl Plan {
    pub fn total_weight(&self) -> f64 {
        self.compartments.iter().map(CompartmentLoad::weight).sum()
    }

    /// Submission payload, one entry per compartment.
    pub fn payload(&self) -> Vec<CompartmentPayload> {
        self.compartments
            .iter()
            .map(|load| {
                let mut entry = CompartmentPayload {
                    compartment_id: load.compartment.id,
                    containers_with_shipments: Vec::new(),
                    containers_with_luggage: Vec::new(),
                };
                for container in &load.containers {
                    match container.luggage_count() {
                        Some(nb_of_luggage) => {
                            entry.containers_with_luggage.push(LuggageContainerPayload {
                                container_type: container.type_code().clone(),
                                nb_of_luggage,
                            })
                        }
                        None => entry.containers_with_shipments.push(ShipmentContainerPayload {
                            container_type: container.type_code().clone(),
                            shipments: container.shipments().iter().map(ShipmentItem::id).collect(),
                        }),
                    }
                }
                entry
            })
            .collect()
    }

    /// Per-compartment weights and the containers left over.
    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            compartments: self
                .compartments
                .iter()
                .map(|load| CompartmentSummary {
                    compartment_id: load.compartment.id,
                    class: load.class.clone(),
                    max_weight: load.compartment.max_weight,
                    loaded_weight: load.weight(),
                    containers: load.containers.len(),
                })
                .collect(),
            classes: self.classes.clone(),
            total_weight: self.total_weight(),
            unallocated: self
                .unallocated
                .iter()
                .map(|container| UnallocatedContainer {
                    id: container.id,
                    container_type: container.type_code().clone(),
                    gross_weight: container.gross_weight(),
                    payload_weight: container.payload_weight(),
                    shipments: container.shipments().iter().map(ShipmentItem::id).collect(),
                    nb_of_luggage: container.luggage_count(),
                })
                .collect(),
        }
    }
}

/// Submission entry for one compartment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "compartmentId": 1,
    "containersWithShipments": [{ "containerType": "PMC", "shipments": [1, 3, 4] }],
    "containersWithLuggage": [{ "containerType": "AKE", "nbOfLuggage": 38 }]
}))]
pub struct CompartmentPayload {
    pub compartment_id: CompartmentId,
    pub containers_with_shipments: Vec<ShipmentContainerPayload>,
    pub containers_with_luggage: Vec<LuggageContainerPayload>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentContainerPayload {
    pub container_type: TypeCode,
    pub shipments: Vec<ShipmentId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LuggageContainerPayload {
    pub container_type: TypeCode,
    pub nb_of_luggage: u32,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    pub compartments: Vec<CompartmentSummary>,
    pub classes: Vec<ClassOutcome>,
    pub total_weight: f64,
    pub unallocated: Vec<UnallocatedContainer>,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompartmentSummary {
    pub compartment_id: CompartmentId,
    pub class: Option<String>,
    pub max_weight: f64,
    pub loaded_weight: f64,
    pub containers: usize,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UnallocatedContainer {
    pub id: usize,
    pub container_type: TypeCode,
    pub gross_weight: f64,
    /// Gross weight minus tare.
    pub payload_weight: f64,
    pub shipments: Vec<ShipmentId>,
    pub nb_of_luggage: Option<u32>,
}

/// Runs the packing and allocation stages for one flight.
#[derive(Clone, Debug)]
pub struct Planner {
    catalog: Catalog,
    config: PlannerConfig,
}

impl Planner {
    pub fn new(catalog: Catalog, config: PlannerConfig) -> Self {
        Self { catalog, config }
    }

    pub fn plan(&self, input: PlanInput) -> Result<Plan, PlanError> {
        self.plan_with_progress(input, |_| {})
    }

    /// Like `plan`, calling `on_event` at every step worth reporting.
    pub fn plan_with_progress(
        &self,
        input: PlanInput,
        mut on_event: impl FnMut(&PlanEvent),
    ) -> Result<Plan, PlanError> {
        input.luggage.validate()?;
        for compartment in &input.compartments {
            validation::validate_weight(compartment.max_weight).map_err(|msg| {
                ValidationError::InvalidWeight(format!("compartment {}: {msg}", compartment.id))
            })?;
        }

        let catalog = if input.container_types.is_empty() {
            self.catalog.clone()
        } else {
            self.catalog.with_fetched_types(&input.container_types)?
        };

        let mut ids = InstanceIds::new();
        let packer = Packer::new(&catalog, self.config.packing);
        let packed = packer.pack_with_progress(&input.shipments, &mut ids, |event| {
            on_event(&PlanEvent::from(event))
        })?;
        let mut pools = ContainerPools::from(packed);

        let luggage_code = &self.config.luggage.container_type;
        let luggage_type = catalog.container_type(luggage_code).ok_or_else(|| {
            ValidationError::InvalidConfiguration(format!(
                "luggage container type {luggage_code} is not in the catalog"
            ))
        })?;
        let splitter =
            LuggageSplitter::new(luggage_type.clone(), self.config.luggage.items_per_container)?;
        let split = splitter.split(&input.luggage, &mut ids)?;
        let split_weight = split.total_weight();
        let (required, optional) = split.into_parts();
        on_event(&PlanEvent::LuggageSplit {
            required: required.len(),
            optional: optional.len(),
            total_weight: split_weight,
        });
        for container in optional {
            pools.add(container);
        }
        info!("📦 {} containers available for allocation", pools.len());
        let mut required: VecDeque<ContainerInstance> = required.into();

        let mut loads: BTreeMap<CompartmentId, CompartmentLoad> = input
            .compartments
            .iter()
            .map(|target| (target.id, CompartmentLoad::new(*target)))
            .collect();
        let mut allocator = Allocator::new(self.config.allocator);
        let mut outcomes = Vec::new();
        let mut stranded = Vec::new();

        for class in catalog.classes() {
            let members = class_members(class, &loads)?;
            let ceiling = class
                .ceiling
                .unwrap_or_else(|| members.iter().map(|target| target.max_weight).sum());

            let reserved = reserve_luggage(&mut required, class, luggage_code, ceiling);
            let reserved_weight = total_weight(&reserved);
            if !reserved.is_empty() {
                info!(
                    "🧳 {}: {} full luggage containers reserved ({:.1} kg)",
                    class.name,
                    reserved.len(),
                    reserved_weight
                );
                on_event(&PlanEvent::LuggageReserved {
                    class: class.name.clone(),
                    containers: reserved.len(),
                    weight: reserved_weight,
                });
            }

            let reserved_count = u32::try_from(reserved.len()).unwrap_or(u32::MAX);
            let (positions, combinations): (Vec<usize>, Vec<_>) = class
                .remaining_combinations(luggage_code, reserved_count)
                .into_iter()
                .unzip();
            let target = ceiling - reserved_weight;

            let allocation = allocator
                .allocate(&pools, &combinations, target)
                .map_err(|source| PlanError::Allocation {
                    class: class.name.clone(),
                    source,
                })?;
            let chosen = pools.take(&allocation);
            let combination = positions
                .get(allocation.combination_index)
                .and_then(|idx| class.combinations.get(*idx))
                .map(ToString::to_string)
                .unwrap_or_default();
            let searched_combination = allocation.combination.to_string();
            on_event(&PlanEvent::ClassAllocated {
                class: class.name.clone(),
                combination: combination.clone(),
                searched_combination: searched_combination.clone(),
                containers: allocation.container_count(),
                total_weight: allocation.total_weight,
                target,
                trials_run: allocation.trials_run,
            });
            outcomes.push(ClassOutcome {
                class: class.name.clone(),
                ceiling,
                reserved_luggage: reserved.len(),
                reserved_weight,
                combination,
                searched_combination,
                allocated_weight: allocation.total_weight,
                trials_run: allocation.trials_run,
            });

            for id in &class.compartments {
                if let Some(load) = loads.get_mut(id) {
                    load.class = Some(class.name.clone());
                }
            }
            let mut containers = reserved;
            containers.extend(chosen);
            for container in distribute(&mut loads, &class.compartments, containers) {
                if container.required {
                    required.push_back(container);
                } else {
                    stranded.push(container);
                }
            }
        }

        if !required.is_empty() {
            let Some(bulk_id) = catalog.bulk_compartment() else {
                return Err(PlanError::RequiredLuggageUnassigned {
                    count: required.len(),
                });
            };
            let Some(bulk) = loads.get_mut(&bulk_id) else {
                return Err(PlanError::UnknownCompartment {
                    class: "bulk".to_string(),
                    compartment: bulk_id,
                });
            };
            info!(
                "🧳 {} full luggage containers go to bulk compartment {}",
                required.len(),
                bulk_id
            );
            bulk.containers.extend(required.drain(..));
            if bulk.headroom() < 0.0 {
                warn!(
                    "⚠️ Bulk compartment {} is {:.1} kg over its ceiling",
                    bulk_id,
                    -bulk.headroom()
                );
            }
        }

        if !pools.is_empty() {
            debug!("{} containers left over after every class", pools.len());
        }
        let mut unallocated = pools.into_remaining();
        unallocated.extend(stranded);
        if !unallocated.is_empty() {
            warn!(
                "⚠️ {} containers ({:.1} kg) were not allocated to any compartment",
                unallocated.len(),
                total_weight(&unallocated)
            );
        }

        let plan = Plan {
            compartments: loads.into_values().collect(),
            unallocated,
            classes: outcomes,
        };
        on_event(&PlanEvent::Finished {
            compartments: plan.compartments.len(),
            unallocated: plan.unallocated.len(),
            total_weight: plan.total_weight(),
        });
        Ok(plan)
    }
}

fn class_members(
    class: &CompartmentClass,
    loads: &BTreeMap<CompartmentId, CompartmentLoad>,
) -> Result<Vec<CompartmentTarget>, PlanError> {
    class
        .compartments
        .iter()
        .map(|id| {
            loads
                .get(id)
                .map(|load| load.compartment)
                .ok_or_else(|| PlanError::UnknownCompartment {
                    class: class.name.clone(),
                    compartment: *id,
                })
        })
        .collect()
}

/// Takes full luggage containers from the front of `required` while the
/// class has luggage positions left and their weight stays under `ceiling`.
fn reserve_luggage(
    required: &mut VecDeque<ContainerInstance>,
    class: &CompartmentClass,
    luggage_code: &TypeCode,
    ceiling: f64,
) -> Vec<ContainerInstance> {
    let positions = class.max_count(luggage_code) as usize;
    let mut reserved = Vec::new();
    let mut weight = 0.0;
    while reserved.len() < positions {
        let Some(next) = required.front() else {
            break;
        };
        if weight + next.weight() >= ceiling {
            break;
        }
        weight += next.weight();
        reserved.extend(required.pop_front());
    }
    reserved
}

/// Spreads containers over the class's compartments, heaviest first, each
/// into the compartment with the most headroom. A container heavier than the
/// largest headroom left is returned instead of overloading a compartment.
fn distribute(
    loads: &mut BTreeMap<CompartmentId, CompartmentLoad>,
    members: &[CompartmentId],
    mut containers: Vec<ContainerInstance>,
) -> Vec<ContainerInstance> {
    containers.sort_by(|a, b| {
        b.gross_weight()
            .total_cmp(&a.gross_weight())
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut stranded = Vec::new();
    for container in containers {
        let roomiest = members
            .iter()
            .filter_map(|id| loads.get(id).map(|load| (*id, load.headroom())))
            .min_by(|a, b| b.1.total_cmp(&a.1))
            .map(|(id, _)| id);
        match roomiest.and_then(|id| loads.get_mut(&id)) {
            Some(load) if load.headroom() + EPSILON_GENERAL >= container.gross_weight() => {
                load.containers.push(container)
            }
            _ => stranded.push(container),
        }
    }
    stranded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Combination;
    use crate::model::ContainerType;
    use crate::types::{Dims, EPSILON_GENERAL};
    use std::collections::BTreeSet;

    fn compartments() -> Vec<CompartmentTarget> {
        [(1, 9_000.0), (2, 9_000.0), (3, 11_000.0), (4, 11_000.0), (5, 3_500.0)]
            .into_iter()
            .map(|(id, max_weight)| CompartmentTarget { id, max_weight })
            .collect()
    }

    fn shipments(count: u64) -> Vec<ShipmentItem> {
        (1..=count)
            .map(|id| {
                let weight = 40.0 + ((id * 37) % 260) as f64;
                let side = 30.0 + ((id * 13) % 90) as f64;
                ShipmentItem::new(id, weight, Dims::new(side, side * 0.8, side * 1.2)).unwrap()
            })
            .collect()
    }

    fn seeded_config(trials: usize) -> PlannerConfig {
        PlannerConfig {
            allocator: AllocatorConfig {
                trials,
                seed: Some(17),
                time_budget: None,
            },
            ..PlannerConfig::default()
        }
    }

    fn input(shipment_count: u64, luggage: LuggageSummary) -> PlanInput {
        PlanInput {
            compartments: compartments(),
            container_types: Vec::new(),
            shipments: shipments(shipment_count),
            luggage,
        }
    }

    fn luggage(count: u32, first_class_count: u32) -> LuggageSummary {
        LuggageSummary {
            count,
            first_class_count,
            avg_weight: 20.0,
        }
    }

    fn all_ids(plan: &Plan) -> Vec<usize> {
        plan.compartments
            .iter()
            .flat_map(|load| load.containers.iter())
            .chain(plan.unallocated.iter())
            .map(|container| container.id)
            .collect()
    }

    #[test]
    fn default_fleet_plan_keeps_every_container_once() {
        let planner = Planner::new(Catalog::default_fleet(), seeded_config(300));
        let plan = planner.plan(input(120, luggage(250, 30))).unwrap();

        let ids = all_ids(&plan);
        let unique: BTreeSet<usize> = ids.iter().copied().collect();
        assert_eq!(ids.len(), unique.len());

        let planned_shipments: BTreeSet<ShipmentId> = plan
            .compartments
            .iter()
            .flat_map(|load| load.containers.iter())
            .chain(plan.unallocated.iter())
            .flat_map(|container| container.shipments().iter().map(ShipmentItem::id))
            .collect();
        assert_eq!(planned_shipments.len(), 120);

        let bags: u32 = plan
            .compartments
            .iter()
            .flat_map(|load| load.containers.iter())
            .chain(plan.unallocated.iter())
            .filter_map(ContainerInstance::luggage_count)
            .sum();
        assert_eq!(bags, 250);
    }

    #[test]
    fn classes_stay_within_their_ceilings() {
        let planner = Planner::new(Catalog::default_fleet(), seeded_config(300));
        let plan = planner.plan(input(150, luggage(250, 30))).unwrap();

        assert_eq!(plan.classes.len(), 2);
        assert_eq!(plan.classes[0].class, "aft");
        for outcome in &plan.classes {
            let class_weight: f64 = plan
                .compartments
                .iter()
                .filter(|load| load.class.as_deref() == Some(outcome.class.as_str()))
                .map(CompartmentLoad::weight)
                .sum();
            assert!(class_weight <= outcome.ceiling + EPSILON_GENERAL);
            assert!(class_weight <= outcome.allocated_weight + outcome.reserved_weight + 1e-3);
        }
        for load in plan.compartments.iter().filter(|load| load.class.is_some()) {
            assert!(load.weight() <= load.compartment.max_weight + EPSILON_GENERAL);
        }
    }

    #[test]
    fn reserved_luggage_narrows_the_class_combinations() {
        let catalog = Catalog::default_fleet();
        let types: Vec<ContainerType> = ["AKE", "PAG"]
            .iter()
            .filter_map(|code| catalog.container_type(&TypeCode::new(*code)).cloned())
            .collect();
        let classes = vec![CompartmentClass::new(
            "main",
            vec![1, 2, 3, 4],
            vec![Combination::new([("AKE", 4)]), Combination::new([("PAG", 2)])],
        )];
        let catalog = Catalog::new(types, classes, Some(5)).unwrap();
        let planner = Planner::new(catalog, seeded_config(50));
        // too wide for an AKE, so every shipment ends up in a PAG
        let wide: Vec<ShipmentItem> = (1..=6)
            .map(|id| ShipmentItem::new(id, 500.0, Dims::new(200.0, 100.0, 100.0)).unwrap())
            .collect();
        let plan_input = PlanInput {
            shipments: wide,
            ..input(0, luggage(152, 0))
        };

        let plan = planner.plan(plan_input).unwrap();
        let pag = TypeCode::new("PAG");
        assert!(
            plan.compartments
                .iter()
                .flat_map(|load| load.containers.iter())
                .all(|container| container.type_code() != &pag)
        );
        assert!(plan.unallocated.iter().any(|container| container.type_code() == &pag));
        for entry in plan.summary().unallocated {
            // PAG tare is 110 kg
            assert!((entry.gross_weight - entry.payload_weight - 110.0).abs() < EPSILON_GENERAL);
        }

        let outcome = &plan.classes[0];
        assert_eq!(outcome.reserved_luggage, 4);
        assert_eq!(outcome.combination, "4 AKE");
        assert_eq!(outcome.searched_combination, "0 AKE");
    }

    #[test]
    fn overweight_luggage_containers_are_rejected() {
        let planner = Planner::new(Catalog::default_fleet(), seeded_config(10));
        let heavy = LuggageSummary {
            count: 38,
            first_class_count: 0,
            avg_weight: 45.0,
        };

        let err = planner.plan(input(0, heavy)).unwrap_err();
        assert!(matches!(err, PlanError::Validation(_)));
    }

    #[test]
    fn every_required_luggage_container_is_planned_exactly_once() {
        let planner = Planner::new(Catalog::default_fleet(), seeded_config(100));
        let plan = planner.plan(input(40, luggage(400, 76))).unwrap();

        let required: Vec<usize> = plan
            .compartments
            .iter()
            .flat_map(|load| load.containers.iter())
            .filter(|container| container.required)
            .map(|container| container.id)
            .collect();
        // 324 standard -> 8 full, 76 first class -> 2 full
        assert_eq!(required.len(), 10);
        assert!(plan.unallocated.iter().all(|container| !container.required));
    }

    #[test]
    fn required_luggage_overflows_into_bulk() {
        let catalog = Catalog::default_fleet();
        let types: Vec<ContainerType> = ["AKE", "PAG", "PMC"]
            .iter()
            .filter_map(|code| catalog.container_type(&TypeCode::new(*code)).cloned())
            .collect();
        // no AKE positions outside the bulk compartment
        let classes = vec![CompartmentClass::new(
            "main",
            vec![1, 2, 3, 4],
            vec![Combination::new([("PMC", 2), ("PAG", 2)])],
        )];
        let catalog = Catalog::new(types, classes, Some(5)).unwrap();
        let planner = Planner::new(catalog, seeded_config(50));

        let plan = planner.plan(input(10, luggage(114, 0))).unwrap();
        let bulk = plan
            .compartments
            .iter()
            .find(|load| load.compartment.id == 5)
            .unwrap();
        assert_eq!(bulk.containers.len(), 3);
        assert!(bulk.containers.iter().all(|container| container.required));
        assert_eq!(bulk.class, None);
    }

    #[test]
    fn missing_bulk_compartment_is_an_error() {
        let catalog = Catalog::default_fleet();
        let types: Vec<ContainerType> = ["AKE", "PMC"]
            .iter()
            .filter_map(|code| catalog.container_type(&TypeCode::new(*code)).cloned())
            .collect();
        let classes = vec![CompartmentClass::new(
            "main",
            vec![1],
            vec![Combination::new([("PMC", 1)])],
        )];
        let catalog = Catalog::new(types, classes, None).unwrap();
        let planner = Planner::new(catalog, seeded_config(10));

        let err = planner.plan(input(0, luggage(76, 0))).unwrap_err();
        assert!(matches!(err, PlanError::RequiredLuggageUnassigned { count: 2 }));
    }

    #[test]
    fn unreported_compartment_is_an_error() {
        let planner = Planner::new(Catalog::default_fleet(), seeded_config(10));
        let mut plan_input = input(5, luggage(0, 0));
        plan_input.compartments.retain(|target| target.id != 4);

        let err = planner.plan(plan_input).unwrap_err();
        assert!(matches!(
            err,
            PlanError::UnknownCompartment { compartment: 4, .. }
        ));
    }

    #[test]
    fn unplaceable_shipment_aborts_the_plan() {
        let planner = Planner::new(Catalog::default_fleet(), seeded_config(10));
        let mut plan_input = input(5, luggage(0, 0));
        plan_input
            .shipments
            .push(ShipmentItem::new(999, 10.0, Dims::new(500.0, 10.0, 10.0)).unwrap());

        let err = planner.plan(plan_input).unwrap_err();
        match err {
            PlanError::Packing(PackError::UnplaceableShipment { shipment_id, .. }) => {
                assert_eq!(shipment_id, 999)
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn explicit_class_ceiling_limits_the_search() {
        let fleet = Catalog::default_fleet();
        let types: Vec<ContainerType> = ["AKE", "PAG", "PMC"]
            .iter()
            .filter_map(|code| fleet.container_type(&TypeCode::new(*code)).cloned())
            .collect();
        let classes = vec![
            CompartmentClass::new("aft", vec![3, 4], fleet.classes()[0].combinations.clone())
                .with_ceiling(2_000.0),
        ];
        let catalog = Catalog::new(types, classes, Some(5)).unwrap();
        let planner = Planner::new(catalog, seeded_config(100));

        let plan = planner.plan(input(60, luggage(0, 0))).unwrap();
        assert!(plan.classes[0].allocated_weight <= 2_000.0);
        assert!(!plan.unallocated.is_empty());
    }

    #[test]
    fn payload_separates_shipments_and_luggage() {
        let planner = Planner::new(Catalog::default_fleet(), seeded_config(200));
        let plan = planner.plan(input(30, luggage(100, 0))).unwrap();
        let payload = plan.payload();
        assert_eq!(payload.len(), 5);
        assert_eq!(
            payload.iter().map(|entry| entry.compartment_id).collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 5]
        );

        let json = serde_json::to_value(&payload).unwrap();
        let first = &json[0];
        assert!(first.get("compartmentId").is_some());
        assert!(first.get("containersWithShipments").is_some());
        assert!(first.get("containersWithLuggage").is_some());

        for (entry, load) in payload.iter().zip(&plan.compartments) {
            let luggage_containers = load
                .containers
                .iter()
                .filter(|container| container.luggage_count().is_some())
                .count();
            assert_eq!(entry.containers_with_luggage.len(), luggage_containers);
            assert_eq!(
                entry.containers_with_shipments.len(),
                load.containers.len() - luggage_containers
            );
        }
    }

    #[test]
    fn payload_keeps_packing_order() {
        let kind = ContainerType::new("AKE", Dims::new(10.0, 10.0, 10.0), 100.0, 5.0).unwrap();
        let mut container = ContainerInstance::empty(1, kind.clone());
        for id in [7, 3, 9] {
            container.push_shipment(ShipmentItem::new(id, 1.0, Dims::new(1.0, 1.0, 1.0)).unwrap());
        }
        let plan = Plan {
            compartments: vec![CompartmentLoad {
                compartment: CompartmentTarget {
                    id: 2,
                    max_weight: 500.0,
                },
                class: None,
                containers: vec![container, ContainerInstance::luggage(2, kind, 12, 38, 20.0, false)],
            }],
            unallocated: Vec::new(),
            classes: Vec::new(),
        };

        let payload = plan.payload();
        assert_eq!(payload[0].containers_with_shipments[0].shipments, vec![7, 3, 9]);
        assert_eq!(payload[0].containers_with_luggage[0].nb_of_luggage, 12);
    }

    #[test]
    fn distribute_fills_the_roomiest_compartment_first() {
        let kind = ContainerType::new("AKE", Dims::new(10.0, 10.0, 10.0), 10_000.0, 0.0).unwrap();
        let mut loads: BTreeMap<CompartmentId, CompartmentLoad> = [(1, 1_000.0), (2, 1_200.0)]
            .into_iter()
            .map(|(id, max_weight)| (id, CompartmentLoad::new(CompartmentTarget { id, max_weight })))
            .collect();
        let containers = [300.0, 500.0, 400.0]
            .iter()
            .enumerate()
            .map(|(idx, weight)| ContainerInstance::luggage(idx + 1, kind.clone(), 1, 1, *weight, false))
            .collect();

        let stranded = distribute(&mut loads, &[1, 2, 9], containers);
        assert!(stranded.is_empty());
        // 500 -> 2 (1200 free), 400 -> 1 (1000 free), 300 -> 2 (700 free vs 600)
        let weights = |id: CompartmentId| -> Vec<f64> {
            loads[&id].containers.iter().map(|c| c.gross_weight()).collect()
        };
        assert_eq!(weights(1), vec![400.0]);
        assert_eq!(weights(2), vec![500.0, 300.0]);
    }

    #[test]
    fn distribute_never_overloads_a_compartment() {
        let kind = ContainerType::new("AKE", Dims::new(10.0, 10.0, 10.0), 10_000.0, 0.0).unwrap();
        let mut loads: BTreeMap<CompartmentId, CompartmentLoad> = [(1, 1_000.0), (2, 1_000.0)]
            .into_iter()
            .map(|(id, max_weight)| (id, CompartmentLoad::new(CompartmentTarget { id, max_weight })))
            .collect();
        let containers = [700.0, 600.0, 700.0]
            .iter()
            .enumerate()
            .map(|(idx, weight)| ContainerInstance::luggage(idx + 1, kind.clone(), 1, 1, *weight, false))
            .collect();

        let stranded = distribute(&mut loads, &[1, 2], containers);
        assert_eq!(stranded.len(), 1);
        assert_eq!(stranded[0].gross_weight(), 600.0);
        for load in loads.values() {
            assert!(load.weight() <= load.compartment.max_weight);
            assert_eq!(load.containers.len(), 1);
        }
    }

    #[test]
    fn reservation_respects_positions_and_ceiling() {
        let kind = ContainerType::new("AKE", Dims::new(10.0, 10.0, 10.0), 10_000.0, 0.0).unwrap();
        let mut required: VecDeque<ContainerInstance> = (1..=5)
            .map(|id| ContainerInstance::luggage(id, kind.clone(), 1, 1, 100.0, true))
            .collect();
        let class = CompartmentClass::new("aft", vec![1], vec![Combination::new([("AKE", 3)])]);
        let code = TypeCode::new("AKE");

        let reserved = reserve_luggage(&mut required, &class, &code, 1_000.0);
        assert_eq!(reserved.len(), 3);
        assert_eq!(required.len(), 2);

        let reserved = reserve_luggage(&mut required, &class, &code, 150.0);
        assert_eq!(reserved.len(), 1);
        assert_eq!(required.len(), 1);
    }

    #[test]
    fn progress_events_end_with_finished() {
        let planner = Planner::new(Catalog::default_fleet(), seeded_config(20));
        let mut events = Vec::new();
        planner
            .plan_with_progress(input(8, luggage(40, 0)), |event| events.push(event.clone()))
            .unwrap();

        assert!(matches!(events.first(), Some(PlanEvent::ContainerOpened { .. })));
        assert!(matches!(events.last(), Some(PlanEvent::Finished { compartments: 5, .. })));
        let allocated = events
            .iter()
            .filter(|event| matches!(event, PlanEvent::ClassAllocated { .. }))
            .count();
        assert_eq!(allocated, 2);
    }
}
