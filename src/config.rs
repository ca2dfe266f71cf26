use std::env;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use log::{info, warn};

use crate::allocator::AllocatorConfig;
use crate::model::TypeCode;
use crate::packer::PackingConfig;
use crate::planner::{LuggageConfig, PlannerConfig};

/// Complete application configuration, loaded from environment variables or default values.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub remote: RemoteConfig,
    pub planning: PlanningConfig,
}

impl AppConfig {
    /// Creates a configuration from the currently available environment variables.
    pub fn from_env() -> Self {
        Self {
            api: ApiConfig::from_env(),
            remote: RemoteConfig::from_env(),
            planning: PlanningConfig::from_env(),
        }
    }
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    bind_ip: IpAddr,
    display_host: String,
    port: u16,
}

impl ApiConfig {
    const DEFAULT_HOST: &'static str = "0.0.0.0";
    const DEFAULT_PORT: u16 = 8080;
    const HOST_VAR: &'static str = "STOW_IT_NOW_API_HOST";
    const PORT_VAR: &'static str = "STOW_IT_NOW_API_PORT";

    fn from_env() -> Self {
        let host_value =
            env_string(Self::HOST_VAR).unwrap_or_else(|| Self::DEFAULT_HOST.to_string());
        let (bind_ip, display_host) = match host_value.parse::<IpAddr>() {
            Ok(ip) => (ip, host_value),
            Err(err) => {
                warn!(
                    "⚠️ Could not parse {} ('{}'): {}. Using {}.",
                    Self::HOST_VAR,
                    host_value,
                    err,
                    Self::DEFAULT_HOST
                );
                (
                    IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                    Self::DEFAULT_HOST.to_string(),
                )
            }
        };

        let port = load_parsed_with_warning(
            Self::PORT_VAR,
            Self::DEFAULT_PORT,
            |value: u16| value != 0,
            "must not be 0",
        );

        Self {
            bind_ip,
            display_host,
            port,
        }
    }

    /// Socket address to bind the server to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }

    /// Visible hostname for logging and hints.
    pub fn display_host(&self) -> &str {
        &self.display_host
    }

    /// Configured port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Indicates whether binding to all interfaces.
    pub fn binds_to_all_interfaces(&self) -> bool {
        match self.bind_ip {
            IpAddr::V4(addr) => addr == Ipv4Addr::UNSPECIFIED,
            IpAddr::V6(addr) => addr == Ipv6Addr::UNSPECIFIED,
        }
    }
}

/// Configuration for the cargo service client.
#[derive(Clone, Debug)]
pub struct RemoteConfig {
    base_url: String,
    timeout: Duration,
    submit_plan: bool,
}

impl RemoteConfig {
    const DEFAULT_BASE_URL: &'static str = "https://af-cargo-api-cargo.azuremicroservices.io/api";
    const DEFAULT_TIMEOUT_SECS: u64 = 30;
    const BASE_URL_VAR: &'static str = "STOW_IT_NOW_REMOTE_BASE_URL";
    const TIMEOUT_VAR: &'static str = "STOW_IT_NOW_HTTP_TIMEOUT_SECS";
    const SUBMIT_VAR: &'static str = "STOW_IT_NOW_SUBMIT_PLAN";

    fn from_env() -> Self {
        let timeout_secs = load_parsed_with_warning(
            Self::TIMEOUT_VAR,
            Self::DEFAULT_TIMEOUT_SECS,
            |value: u64| value > 0,
            "must be greater than 0",
        );
        let submit_plan = env_string(Self::SUBMIT_VAR)
            .and_then(|raw| parse_bool(&raw, Self::SUBMIT_VAR))
            .unwrap_or(false);

        Self {
            base_url: env_string(Self::BASE_URL_VAR)
                .unwrap_or_else(|| Self::DEFAULT_BASE_URL.to_string()),
            timeout: Duration::from_secs(timeout_secs),
            submit_plan,
        }
    }

    /// Root URL the endpoint paths are appended to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether `/plan/remote` posts the finished plan back to the service.
    pub fn submit_plan(&self) -> bool {
        self.submit_plan
    }
}

/// Configuration for packing, luggage handling and the allocator search.
#[derive(Clone, Debug)]
pub struct PlanningConfig {
    planner: PlannerConfig,
}

impl PlanningConfig {
    const VOLUME_MAX_VAR: &'static str = "STOW_IT_NOW_VOLUME_MAX_PERCENTAGE";
    const GENERAL_EPSILON_VAR: &'static str = "STOW_IT_NOW_PACKING_GENERAL_EPSILON";
    const TRIALS_VAR: &'static str = "STOW_IT_NOW_ALLOCATOR_TRIALS";
    const SEED_VAR: &'static str = "STOW_IT_NOW_ALLOCATOR_SEED";
    const TIME_BUDGET_VAR: &'static str = "STOW_IT_NOW_ALLOCATOR_TIME_BUDGET_MS";
    const LUGGAGE_PER_CONTAINER_VAR: &'static str = "STOW_IT_NOW_LUGGAGE_PER_CONTAINER";
    const LUGGAGE_TYPE_VAR: &'static str = "STOW_IT_NOW_LUGGAGE_CONTAINER_TYPE";

    fn from_env() -> Self {
        let volume_max_percentage = load_f64_with_warning(
            Self::VOLUME_MAX_VAR,
            PackingConfig::DEFAULT_VOLUME_MAX_PERCENTAGE,
            |value| value > 0.0 && value <= 1.0,
            "must be in (0, 1]",
            "Warning: Adjusted fill ceiling changes how many containers are opened",
        );
        let general_epsilon = load_f64_with_warning(
            Self::GENERAL_EPSILON_VAR,
            PackingConfig::DEFAULT_GENERAL_EPSILON,
            |value| value > 0.0,
            "must be greater than 0",
            "Warning: Adjusted tolerances may cause numerical instabilities",
        );
        let packing = PackingConfig::builder()
            .volume_max_percentage(volume_max_percentage)
            .general_epsilon(general_epsilon)
            .build();

        let trials = load_parsed_with_warning(
            Self::TRIALS_VAR,
            AllocatorConfig::DEFAULT_TRIALS,
            |value: usize| value > 0,
            "must be greater than 0",
        );
        let seed = env_string(Self::SEED_VAR).and_then(|raw| parse_or_warn::<u64>(Self::SEED_VAR, &raw));
        let time_budget = env_string(Self::TIME_BUDGET_VAR)
            .and_then(|raw| parse_or_warn::<u64>(Self::TIME_BUDGET_VAR, &raw))
            .map(Duration::from_millis);
        if let Some(seed) = seed {
            info!("🎲 Allocator runs deterministically with seed {seed}");
        }

        let items_per_container = load_parsed_with_warning(
            Self::LUGGAGE_PER_CONTAINER_VAR,
            LuggageConfig::default().items_per_container,
            |value: u32| value > 0,
            "must be greater than 0",
        );
        let container_type = env_string(Self::LUGGAGE_TYPE_VAR)
            .map(TypeCode::new)
            .unwrap_or_else(|| TypeCode::new(LuggageConfig::DEFAULT_CONTAINER_TYPE));

        Self {
            planner: PlannerConfig {
                packing,
                allocator: AllocatorConfig {
                    trials,
                    seed,
                    time_budget,
                },
                luggage: LuggageConfig {
                    items_per_container,
                    container_type,
                },
            },
        }
    }

    /// Returns the configured PlannerConfig.
    pub fn planner_config(&self) -> PlannerConfig {
        self.planner.clone()
    }
}

fn env_string(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            }
        }
        Err(env::VarError::NotPresent) => None,
        Err(err) => {
            warn!(
                "⚠️ Access to {} failed: {}. Using default value.",
                name, err
            );
            None
        }
    }
}

fn parse_bool(raw: &str, var_name: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        other => {
            warn!(
                "⚠️ Could not interpret {} ('{}') as boolean value. Using default value.",
                var_name, other
            );
            None
        }
    }
}

fn parse_or_warn<T>(var_name: &str, raw: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(err) => {
            warn!("⚠️ Could not parse {} ('{}'): {}. Ignoring it.", var_name, raw, err);
            None
        }
    }
}

fn load_parsed_with_warning<T>(
    var_name: &str,
    default: T,
    validator: impl Fn(T) -> bool,
    invalid_hint: &str,
) -> T
where
    T: FromStr + Copy + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    match env_string(var_name) {
        Some(raw) => match raw.parse::<T>() {
            Ok(value) if validator(value) => value,
            Ok(_) => {
                warn!(
                    "⚠️ {} contains invalid value '{}': {}. Using {}.",
                    var_name, raw, invalid_hint, default
                );
                default
            }
            Err(err) => {
                warn!(
                    "⚠️ Could not parse {} ('{}'): {}. Using {}.",
                    var_name, raw, err, default
                );
                default
            }
        },
        None => default,
    }
}

fn load_f64_with_warning(
    var_name: &str,
    default: f64,
    validator: impl Fn(f64) -> bool,
    invalid_hint: &str,
    warning: &str,
) -> f64 {
    let value = load_parsed_with_warning(var_name, default, validator, invalid_hint);
    let tolerance = (default.abs().max(1.0)) * 1e-9;
    if (value - default).abs() > tolerance {
        info!("⚠️ {} ({} = {}).", warning, var_name, value);
    }
    value
}
