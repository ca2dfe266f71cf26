//! Turns the bulk luggage count into luggage containers.
//!
//! Standard and first-class bags are split separately with the same rule:
//! every full load becomes a required container, and a remainder (if any)
//! becomes one partially loaded, optional container.

use log::info;

use crate::model::{ContainerInstance, ContainerType, InstanceIds, LuggageSummary, ValidationError};
use crate::types::{EPSILON_GENERAL, total_weight};

/// Luggage containers produced for one flight.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LuggageSplit {
    pub containers: Vec<ContainerInstance>,
}

impl LuggageSplit {
    /// Gross weight of all produced containers.
    pub fn total_weight(&self) -> f64 {
        total_weight(&self.containers)
    }

    /// Number of bags across all containers.
    pub fn bag_count(&self) -> u32 {
        self.containers
            .iter()
            .filter_map(ContainerInstance::luggage_count)
            .sum()
    }

    /// Splits into (required, optional remainder) containers.
    pub fn into_parts(self) -> (Vec<ContainerInstance>, Vec<ContainerInstance>) {
        self.containers
            .into_iter()
            .partition(|container| container.required)
    }
}

/// Splits luggage counts into containers of one designated type.
#[derive(Clone, Debug)]
pub struct LuggageSplitter {
    container_type: ContainerType,
    items_per_container: u32,
}

impl LuggageSplitter {
    pub const DEFAULT_ITEMS_PER_CONTAINER: u32 = 38;

    pub fn new(
        container_type: ContainerType,
        items_per_container: u32,
    ) -> Result<Self, ValidationError> {
        if items_per_container == 0 {
            return Err(ValidationError::InvalidConfiguration(
                "luggage items per container must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            container_type,
            items_per_container,
        })
    }

    /// Splits standard then first-class luggage and concatenates the results.
    ///
    /// Fails when the heaviest container produced would exceed the max weight
    /// of the luggage container type.
    pub fn split(
        &self,
        summary: &LuggageSummary,
        ids: &mut InstanceIds,
    ) -> Result<LuggageSplit, ValidationError> {
        self.check_load(summary.standard_count(), summary.avg_weight)?;
        self.check_load(summary.first_class_count, summary.avg_weight)?;

        let mut containers = self.split_count(summary.standard_count(), summary.avg_weight, ids);
        containers.extend(self.split_count(summary.first_class_count, summary.avg_weight, ids));

        let split = LuggageSplit { containers };
        info!(
            "🧳 {} bags -> {} {} containers ({:.1} kg)",
            split.bag_count(),
            split.containers.len(),
            self.container_type.code,
            split.total_weight()
        );
        Ok(split)
    }

    fn check_load(&self, count: u32, avg_weight: f64) -> Result<(), ValidationError> {
        let heaviest = count.min(self.items_per_container);
        if heaviest == 0 {
            return Ok(());
        }
        let gross = self.container_type.tare_weight + avg_weight * f64::from(heaviest);
        if gross > self.container_type.max_weight + EPSILON_GENERAL {
            return Err(ValidationError::InvalidWeight(format!(
                "{heaviest} bags of {avg_weight:.1} kg weigh {gross:.1} kg in a {} container, \
                 which carries at most {:.1} kg",
                self.container_type.code, self.container_type.max_weight
            )));
        }
        Ok(())
    }

    fn split_count(
        &self,
        count: u32,
        avg_weight: f64,
        ids: &mut InstanceIds,
    ) -> Vec<ContainerInstance> {
        let full = count / self.items_per_container;
        let remainder = count % self.items_per_container;

        let mut containers: Vec<ContainerInstance> = (0..full)
            .map(|_| {
                ContainerInstance::luggage(
                    ids.next_id(),
                    self.container_type.clone(),
                    self.items_per_container,
                    self.items_per_container,
                    avg_weight,
                    true,
                )
            })
            .collect();
        if remainder > 0 {
            containers.push(ContainerInstance::luggage(
                ids.next_id(),
                self.container_type.clone(),
                remainder,
                self.items_per_container,
                avg_weight,
                false,
            ));
        }
        containers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Dims;

    fn splitter(items_per_container: u32) -> LuggageSplitter {
        let ake = ContainerType::new("AKE", Dims::new(10.0, 10.0, 10.0), 1588.0, 82.0).unwrap();
        LuggageSplitter::new(ake, items_per_container).unwrap()
    }

    fn summary(count: u32, first_class_count: u32) -> LuggageSummary {
        LuggageSummary {
            count,
            first_class_count,
            avg_weight: 20.0,
        }
    }

    #[test]
    fn hundred_bags_make_two_full_and_one_remainder() {
        let split = splitter(38).split(&summary(100, 0), &mut InstanceIds::new()).unwrap();
        assert_eq!(split.containers.len(), 3);
        assert_eq!(split.bag_count(), 100);

        let counts: Vec<Option<u32>> = split.containers.iter().map(|c| c.luggage_count()).collect();
        assert_eq!(counts, vec![Some(38), Some(38), Some(24)]);
        assert!(split.containers[0].required && split.containers[1].required);
        assert!(!split.containers[2].required);
        assert!((split.containers[0].fill_ratio() - 1.0).abs() < EPSILON_GENERAL);
        assert!((split.containers[2].fill_ratio() - 24.0 / 38.0).abs() < EPSILON_GENERAL);
        assert!((split.containers[0].payload_weight() - 760.0).abs() < EPSILON_GENERAL);
        assert!((split.containers[2].payload_weight() - 480.0).abs() < EPSILON_GENERAL);
    }

    #[test]
    fn first_class_is_split_separately() {
        let split = splitter(38).split(&summary(100, 40), &mut InstanceIds::new()).unwrap();
        // 60 standard -> 38 + 22, 40 first class -> 38 + 2
        let counts: Vec<u32> = split
            .containers
            .iter()
            .filter_map(|c| c.luggage_count())
            .collect();
        assert_eq!(counts, vec![38, 22, 38, 2]);
        assert_eq!(split.bag_count(), 100);

        let (required, optional) = split.into_parts();
        assert_eq!(required.len(), 2);
        assert_eq!(optional.len(), 2);
    }

    #[test]
    fn exact_multiple_has_no_remainder() {
        let split = splitter(38).split(&summary(76, 0), &mut InstanceIds::new()).unwrap();
        assert_eq!(split.containers.len(), 2);
        assert!(split.containers.iter().all(|c| c.required));
    }

    #[test]
    fn total_weight_includes_tare() {
        let split = splitter(10).split(&summary(15, 0), &mut InstanceIds::new()).unwrap();
        // 10 * 20 + 82, 5 * 20 + 82
        assert!((split.total_weight() - 464.0).abs() < EPSILON_GENERAL);
    }

    #[test]
    fn no_luggage_means_no_containers() {
        let split = splitter(38).split(&summary(0, 0), &mut InstanceIds::new()).unwrap();
        assert!(split.containers.is_empty());
        assert_eq!(split.total_weight(), 0.0);
    }

    #[test]
    fn rejects_zero_items_per_container() {
        let ake = ContainerType::new("AKE", Dims::new(10.0, 10.0, 10.0), 1588.0, 82.0).unwrap();
        assert!(LuggageSplitter::new(ake, 0).is_err());
    }

    #[test]
    fn instance_ids_continue_across_groups() {
        let mut ids = InstanceIds::new();
        let split = splitter(38).split(&summary(50, 10), &mut ids).unwrap();
        let container_ids: Vec<usize> = split.containers.iter().map(|c| c.id).collect();
        assert_eq!(container_ids, vec![1, 2, 3]);
        assert_eq!(ids.next_id(), 4);
    }

    #[test]
    fn rejects_loads_over_the_container_max_weight() {
        let heavy = LuggageSummary {
            count: 38,
            first_class_count: 0,
            avg_weight: 40.0,
        };
        // 82 + 38 * 40 = 1602 > 1588
        let err = splitter(38).split(&heavy, &mut InstanceIds::new()).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidWeight(_)));

        // a lone remainder of 10 bags stays well below the limit
        let light = LuggageSummary { count: 10, ..heavy };
        let split = splitter(38).split(&light, &mut InstanceIds::new()).unwrap();
        assert!(split.containers.iter().all(|c| c.gross_weight() <= 1588.0));
    }
}
