//! Randomized combination and subset search for one compartment class.
//!
//! Every trial walks the class's combinations, draws a uniform random subset
//! of each type's pool sized by the combination's count, and scores the
//! subset by total gross weight. Counts are capacities, not quotas: a subset
//! that overshoots the target is trimmed until it fits. The heaviest subset
//! that stays within the weight target wins. Ties keep the earliest
//! candidate found: a later candidate must be strictly heavier to replace
//! the running best.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use log::{debug, info};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand::seq::index;

use crate::catalog::Combination;
use crate::model::{ContainerInstance, TypeCode};
use crate::packer::PackedContainers;
use crate::types::Weighted;

/// Containers still available for allocation, per type.
///
/// Pools are read-only during one `Allocator::allocate` call; chosen
/// containers are removed afterwards with `take`.
#[derive(Clone, Debug, Default)]
pub struct ContainerPools {
    pools: BTreeMap<TypeCode, Vec<ContainerInstance>>,
}

impl ContainerPools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, container: ContainerInstance) {
        self.pools
            .entry(container.type_code().clone())
            .or_default()
            .push(container);
    }

    /// Remaining containers of a type; empty when the type has no pool.
    pub fn pool(&self, code: &TypeCode) -> &[ContainerInstance] {
        self.pools.get(code).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.pools.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.values().all(Vec::is_empty)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContainerInstance> {
        self.pools.values().flatten()
    }

    /// Removes the containers picked by `allocation` and returns them.
    ///
    /// Remaining containers keep their relative order.
    pub fn take(&mut self, allocation: &Allocation) -> Vec<ContainerInstance> {
        let mut taken = Vec::new();
        for (code, picks) in &allocation.picks {
            let Some(pool) = self.pools.get_mut(code) else {
                continue;
            };
            let mut indices = picks.clone();
            indices.sort_unstable_by(|a, b| b.cmp(a));
            indices.dedup();
            let mut batch = Vec::with_capacity(indices.len());
            for idx in indices {
                if idx < pool.len() {
                    batch.push(pool.remove(idx));
                }
            }
            batch.reverse();
            taken.extend(batch);
        }
        taken
    }

    /// Everything nobody allocated.
    pub fn into_remaining(self) -> Vec<ContainerInstance> {
        self.pools.into_values().flatten().collect()
    }
}

impl From<PackedContainers> for ContainerPools {
    fn from(packed: PackedContainers) -> Self {
        Self { pools: packed }
    }
}

/// Search parameters for the allocator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AllocatorConfig {
    /// Number of trials; each trial scores every combination once
    pub trials: usize,
    /// PRNG seed. If undefined, the search runs non-deterministically using entropy
    pub seed: Option<u64>,
    /// Wall-clock budget checked between trials
    pub time_budget: Option<Duration>,
}

impl AllocatorConfig {
    pub const DEFAULT_TRIALS: usize = 10_000;
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            trials: Self::DEFAULT_TRIALS,
            seed: None,
            time_budget: None,
        }
    }
}

/// Best combination and container subset found for one class.
#[derive(Clone, Debug, PartialEq)]
pub struct Allocation {
    /// Position of the winning combination in the list that was searched.
    pub combination_index: usize,
    pub combination: Combination,
    /// Chosen pool positions per type, ascending.
    pub picks: BTreeMap<TypeCode, Vec<usize>>,
    pub total_weight: f64,
    pub trials_run: usize,
}

impl Allocation {
    pub fn container_count(&self) -> usize {
        self.picks.values().map(Vec::len).sum()
    }
}

/// Errors raised by the allocator.
#[derive(Clone, Debug, PartialEq)]
pub enum AllocationError {
    NoFeasibleAllocation { target: f64, trials_run: usize },
}

impl fmt::Display for AllocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocationError::NoFeasibleAllocation { target, trials_run } => write!(
                f,
                "no feasible allocation within {target:.1} kg after {trials_run} trials"
            ),
        }
    }
}

impl std::error::Error for AllocationError {}

/// Randomized search over combinations and container subsets.
pub struct Allocator {
    config: AllocatorConfig,
    /// SmallRng is a fast, non-cryptographic PRNG
    rng: SmallRng,
}

impl Allocator {
    pub fn new(config: AllocatorConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_os_rng(),
        };
        Self { config, rng }
    }

    /// Searches for the heaviest subset not exceeding `target`.
    ///
    /// # Parameters
    /// * `pools` - Containers available to this class
    /// * `combinations` - Feasible container counts per type for the class
    /// * `target` - Weight ceiling for the class in kg
    pub fn allocate(
        &mut self,
        pools: &ContainerPools,
        combinations: &[Combination],
        target: f64,
    ) -> Result<Allocation, AllocationError> {
        for combination in combinations {
            for (code, count) in combination.iter() {
                let available = pools.pool(code).len();
                if count as usize > available {
                    debug!(
                        "combination [{combination}] asks for {count} {code}, only {available} available"
                    );
                }
            }
        }

        let started = Instant::now();
        let mut best: Option<Allocation> = None;
        let mut trials_run = 0;

        'trials: for _ in 0..self.config.trials {
            if self
                .config
                .time_budget
                .is_some_and(|budget| started.elapsed() >= budget)
            {
                debug!("time budget exhausted after {trials_run} trials");
                break;
            }
            trials_run += 1;

            for (combination_index, combination) in combinations.iter().enumerate() {
                let (picks, total_weight) = self.sample(pools, combination, target);
                if total_weight > target {
                    continue;
                }
                let improves = best
                    .as_ref()
                    .is_none_or(|current| total_weight > current.total_weight);
                if improves {
                    best = Some(Allocation {
                        combination_index,
                        combination: combination.clone(),
                        picks,
                        total_weight,
                        trials_run,
                    });
                    if total_weight == target {
                        break 'trials;
                    }
                }
            }
        }

        match best {
            Some(mut allocation) => {
                allocation.trials_run = trials_run;
                info!(
                    "🎯 [{}] {:.1} / {:.1} kg after {} trials",
                    allocation.combination, allocation.total_weight, target, trials_run
                );
                Ok(allocation)
            }
            None => Err(AllocationError::NoFeasibleAllocation { target, trials_run }),
        }
    }

    /// Draws one random subset per type for a combination, trimmed to `target`.
    fn sample(
        &mut self,
        pools: &ContainerPools,
        combination: &Combination,
        target: f64,
    ) -> (BTreeMap<TypeCode, Vec<usize>>, f64) {
        let mut drawn: Vec<(&TypeCode, usize, f64)> = Vec::new();
        for (code, count) in combination.iter() {
            let pool = pools.pool(code);
            let amount = (count as usize).min(pool.len());
            if amount == 0 {
                continue;
            }
            drawn.extend(
                index::sample(&mut self.rng, pool.len(), amount)
                    .into_iter()
                    .map(|idx| (code, idx, pool[idx].weight())),
            );
        }

        let mut total_weight: f64 = drawn.iter().map(|(_, _, weight)| weight).sum();
        while total_weight > target && !drawn.is_empty() {
            let position = trim_position(&drawn, total_weight - target);
            total_weight -= drawn.swap_remove(position).2;
        }

        let mut picks: BTreeMap<TypeCode, Vec<usize>> = BTreeMap::new();
        for (code, idx, _) in drawn {
            picks.entry(code.clone()).or_default().push(idx);
        }
        for chosen in picks.values_mut() {
            chosen.sort_unstable();
        }
        (picks, total_weight)
    }
}

/// Picks the lightest container that alone covers `excess`, or the heaviest
/// one when none does.
fn trim_position(drawn: &[(&TypeCode, usize, f64)], excess: f64) -> usize {
    let covering = drawn
        .iter()
        .enumerate()
        .filter(|(_, (_, _, weight))| *weight >= excess)
        .min_by(|a, b| a.1.2.total_cmp(&b.1.2))
        .map(|(position, _)| position);
    covering
        .or_else(|| {
            drawn
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.2.total_cmp(&b.1.2))
                .map(|(position, _)| position)
        })
        .unwrap_or(0)
}
