//! Client side of the cargo service that owns the flight data.
//!
//! The service reports compartments, container types, shipments and the
//! luggage summary, and accepts the finished plan. Requests are made once
//! per planning run and are never retried.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use log::{info, warn};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::config::RemoteConfig;
use crate::model::{CompartmentTarget, ContainerTypeRecord, LuggageSummary, ShipmentItem};
use crate::planner::{CompartmentPayload, PlanInput};

fn user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;
    format!("stow-it-now/{version} ({os}; {arch})")
}

/// Errors at the cargo service boundary.
#[derive(Debug)]
pub enum RemoteError {
    Client {
        source: reqwest::Error,
    },
    Fetch {
        endpoint: String,
        source: reqwest::Error,
    },
    Submit {
        source: reqwest::Error,
    },
    Status {
        endpoint: String,
        status: StatusCode,
    },
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteError::Client { source } => write!(f, "Could not build HTTP client: {source}"),
            RemoteError::Fetch { endpoint, source } => {
                write!(f, "Fetching {endpoint} failed: {source}")
            }
            RemoteError::Submit { source } => write!(f, "Submitting the plan failed: {source}"),
            RemoteError::Status { endpoint, status } => {
                write!(f, "{endpoint} answered with {status}")
            }
        }
    }
}

impl std::error::Error for RemoteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RemoteError::Client { source }
            | RemoteError::Fetch { source, .. }
            | RemoteError::Submit { source } => Some(source),
            RemoteError::Status { .. } => None,
        }
    }
}

/// The four data fetches and the plan submission the planner relies on.
pub trait CargoService {
    fn fetch_compartments(
        &self,
    ) -> impl Future<Output = Result<Vec<CompartmentTarget>, RemoteError>> + Send;

    fn fetch_container_types(
        &self,
    ) -> impl Future<Output = Result<Vec<ContainerTypeRecord>, RemoteError>> + Send;

    fn fetch_shipments(&self) -> impl Future<Output = Result<Vec<ShipmentItem>, RemoteError>> + Send;

    fn fetch_luggage_summary(
        &self,
    ) -> impl Future<Output = Result<LuggageSummary, RemoteError>> + Send;

    /// Posts the plan and returns the service's acknowledgement as is.
    fn submit_plan(
        &self,
        payload: &[CompartmentPayload],
    ) -> impl Future<Output = Result<serde_json::Value, RemoteError>> + Send;
}

/// Fetches everything a planning run needs, concurrently.
pub async fn fetch_inputs<S: CargoService>(service: &S) -> Result<PlanInput, RemoteError> {
    let (compartments, container_types, shipments, luggage) = tokio::try_join!(
        service.fetch_compartments(),
        service.fetch_container_types(),
        service.fetch_shipments(),
        service.fetch_luggage_summary(),
    )?;
    info!(
        "📥 Fetched {} compartments, {} container types, {} shipments, {} bags",
        compartments.len(),
        container_types.len(),
        shipments.len(),
        luggage.count
    );
    Ok(PlanInput {
        compartments,
        container_types,
        shipments,
        luggage,
    })
}

/// `reqwest`-backed cargo service client.
#[derive(Clone, Debug)]
pub struct HttpCargoService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCargoService {
    pub fn new(config: &RemoteConfig) -> Result<Self, RemoteError> {
        Self::with_timeout(config.base_url(), config.timeout())
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent())
            .build()
            .map_err(|source| RemoteError::Client { source })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, RemoteError> {
        let endpoint = self.endpoint(path);
        info!("🌐 GET {endpoint}");
        let response = self
            .client
            .get(&endpoint)
            .send()
            .await
            .map_err(|source| RemoteError::Fetch {
                endpoint: endpoint.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status { endpoint, status });
        }
        response
            .json::<T>()
            .await
            .map_err(|source| RemoteError::Fetch { endpoint, source })
    }
}

impl CargoService for HttpCargoService {
    async fn fetch_compartments(&self) -> Result<Vec<CompartmentTarget>, RemoteError> {
        self.get_json("compartment").await
    }

    async fn fetch_container_types(&self) -> Result<Vec<ContainerTypeRecord>, RemoteError> {
        self.get_json("container").await
    }

    async fn fetch_shipments(&self) -> Result<Vec<ShipmentItem>, RemoteError> {
        self.get_json("shipment").await
    }

    async fn fetch_luggage_summary(&self) -> Result<LuggageSummary, RemoteError> {
        self.get_json("luggage").await
    }

    async fn submit_plan(
        &self,
        payload: &[CompartmentPayload],
    ) -> Result<serde_json::Value, RemoteError> {
        let endpoint = self.endpoint("submit");
        info!("📤 POST {endpoint} ({} compartments)", payload.len());
        let response = self
            .client
            .post(&endpoint)
            .json(payload)
            .send()
            .await
            .map_err(|source| RemoteError::Submit { source })?;

        let status = response.status();
        if !status.is_success() {
            warn!("⚠️ Plan submission rejected with {status}");
            return Err(RemoteError::Status { endpoint, status });
        }
        response
            .json()
            .await
            .map_err(|source| RemoteError::Submit { source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::planner::{Planner, PlannerConfig};
    use crate::types::Dims;
    use std::sync::Mutex;

    #[derive(Default)]
    struct InMemoryCargoService {
        compartments: Vec<CompartmentTarget>,
        shipments: Vec<ShipmentItem>,
        luggage: LuggageSummary,
        offline: bool,
        submitted: Mutex<Vec<Vec<CompartmentPayload>>>,
    }

    impl InMemoryCargoService {
        fn check(&self, endpoint: &str) -> Result<(), RemoteError> {
            if self.offline {
                return Err(RemoteError::Status {
                    endpoint: endpoint.to_string(),
                    status: StatusCode::SERVICE_UNAVAILABLE,
                });
            }
            Ok(())
        }
    }

    impl CargoService for InMemoryCargoService {
        async fn fetch_compartments(&self) -> Result<Vec<CompartmentTarget>, RemoteError> {
            self.check("compartment")?;
            Ok(self.compartments.clone())
        }

        async fn fetch_container_types(&self) -> Result<Vec<ContainerTypeRecord>, RemoteError> {
            self.check("container")?;
            Ok(vec![ContainerTypeRecord {
                code: "AKE".to_string(),
                height: 160.0,
                width: 156.0,
                length: 153.0,
                max_weight: None,
                tare_weight: None,
            }])
        }

        async fn fetch_shipments(&self) -> Result<Vec<ShipmentItem>, RemoteError> {
            self.check("shipment")?;
            Ok(self.shipments.clone())
        }

        async fn fetch_luggage_summary(&self) -> Result<LuggageSummary, RemoteError> {
            self.check("luggage")?;
            Ok(self.luggage)
        }

        async fn submit_plan(
            &self,
            payload: &[CompartmentPayload],
        ) -> Result<serde_json::Value, RemoteError> {
            self.check("submit")?;
            if let Ok(mut submitted) = self.submitted.lock() {
                submitted.push(payload.to_vec());
            }
            Ok(serde_json::json!({ "warnings": [] }))
        }
    }

    fn service() -> InMemoryCargoService {
        InMemoryCargoService {
            compartments: (1..=5)
                .map(|id| CompartmentTarget {
                    id,
                    max_weight: 8_000.0,
                })
                .collect(),
            shipments: (1..=6)
                .map(|id| ShipmentItem::new(id, 50.0, Dims::new(40.0, 40.0, 40.0)).unwrap())
                .collect(),
            luggage: LuggageSummary {
                count: 80,
                first_class_count: 0,
                avg_weight: 18.0,
            },
            ..InMemoryCargoService::default()
        }
    }

    #[tokio::test]
    async fn fetch_inputs_collects_all_four_sources() {
        let input = fetch_inputs(&service()).await.unwrap();
        assert_eq!(input.compartments.len(), 5);
        assert_eq!(input.container_types.len(), 1);
        assert_eq!(input.shipments.len(), 6);
        assert_eq!(input.luggage.count, 80);
    }

    #[tokio::test]
    async fn fetch_failure_is_propagated() {
        let offline = InMemoryCargoService {
            offline: true,
            ..service()
        };
        let err = fetch_inputs(&offline).await.unwrap_err();
        assert!(matches!(
            err,
            RemoteError::Status {
                status: StatusCode::SERVICE_UNAVAILABLE,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn fetched_inputs_plan_and_submit() {
        let remote = service();
        let input = fetch_inputs(&remote).await.unwrap();
        let config = PlannerConfig {
            allocator: crate::allocator::AllocatorConfig {
                trials: 50,
                seed: Some(3),
                time_budget: None,
            },
            ..PlannerConfig::default()
        };
        let plan = Planner::new(Catalog::default_fleet(), config)
            .plan(input)
            .unwrap();

        let ack = remote.submit_plan(&plan.payload()).await.unwrap();
        assert!(ack.get("warnings").is_some());
        let submitted = remote.submitted.lock().unwrap();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].len(), 5);
    }

    #[test]
    fn endpoints_join_without_double_slashes() {
        let service =
            HttpCargoService::with_timeout("https://cargo.example/api/", Duration::from_secs(5))
                .unwrap();
        assert_eq!(service.endpoint("shipment"), "https://cargo.example/api/shipment");
        assert_eq!(service.endpoint("/submit"), "https://cargo.example/api/submit");
    }

    #[test]
    fn user_agent_names_the_crate() {
        assert!(user_agent().starts_with("stow-it-now/"));
    }
}
