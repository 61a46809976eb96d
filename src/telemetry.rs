//! Tracing and OpenTelemetry bootstrap for blockreaper binaries.

use crate::{Error, Result};

use opentelemetry::global;
use opentelemetry::KeyValue;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{self, Sampler, TracerProvider};
use opentelemetry_sdk::Resource;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

const ATTR_SERVICE_NAME: &str = "service.name";
const ATTR_SERVICE_NAMESPACE: &str = "service.namespace";
const SERVICE_NAMESPACE: &str = "blockreaper";

/// Whether OTel SDK providers are installed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryMode {
    /// Only the tracing subscriber; OTel instruments stay no-ops
    Disabled,
    /// SDK tracer and meter providers installed globally
    Sdk,
}

impl TelemetryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TelemetryMode::Disabled => "disabled",
            TelemetryMode::Sdk => "sdk",
        }
    }
}

/// Telemetry settings read from the environment.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub mode: TelemetryMode,
    pub service_name: String,
    sampler: Sampler,
}

impl TelemetryConfig {
    pub fn from_env(default_service_name: &str) -> Result<Self> {
        let service_name =
            std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| default_service_name.to_string());
        let service_name = service_name.trim();
        if service_name.is_empty() {
            return Err(Error::Config("OTEL_SERVICE_NAME cannot be empty".to_string()));
        }

        let mode = telemetry_mode(parse_optional_bool("BLOCKREAPER_TELEMETRY_ENABLED")?);

        let sampler = match std::env::var("OTEL_TRACES_SAMPLER_ARG").ok() {
            Some(raw) => {
                Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(parse_ratio(&raw)?)))
            }
            None => Sampler::ParentBased(Box::new(Sampler::AlwaysOn)),
        };

        Ok(Self {
            mode,
            service_name: service_name.to_string(),
            sampler,
        })
    }
}

struct Providers {
    tracer: TracerProvider,
    meter: SdkMeterProvider,
}

/// Keeps tracing and OTel providers alive for the process lifetime.
pub struct Telemetry {
    config: TelemetryConfig,
    providers: Option<Providers>,
}

impl Telemetry {
    /// Install a JSON tracing subscriber, plus OTel SDK providers when enabled.
    pub fn init_for_component(default_service_name: &str, log_level: &str) -> Result<Self> {
        let config = TelemetryConfig::from_env(default_service_name)?;
        let level = parse_log_level(log_level)?;

        FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .json()
            .try_init()
            .map_err(|e| Error::Config(format!("failed to initialize tracing subscriber: {e}")))?;

        let providers = match config.mode {
            TelemetryMode::Disabled => None,
            TelemetryMode::Sdk => Some(install_providers(&config)),
        };

        info!(
            service_name = %config.service_name,
            telemetry_mode = config.mode.as_str(),
            "Telemetry bootstrap initialized"
        );

        Ok(Self { config, providers })
    }

    pub fn service_name(&self) -> &str {
        &self.config.service_name
    }

    pub fn mode(&self) -> TelemetryMode {
        self.config.mode
    }
}

impl Drop for Telemetry {
    fn drop(&mut self) {
        if let Some(providers) = &self.providers {
            let _ = providers.meter.shutdown();
            let _ = providers.tracer.shutdown();
        }
    }
}

fn install_providers(config: &TelemetryConfig) -> Providers {
    let resource = Resource::default().merge(&Resource::new(vec![
        KeyValue::new(ATTR_SERVICE_NAME, config.service_name.clone()),
        KeyValue::new(ATTR_SERVICE_NAMESPACE, SERVICE_NAMESPACE),
    ]));

    let tracer = TracerProvider::builder()
        .with_config(
            trace::Config::default()
                .with_sampler(config.sampler.clone())
                .with_resource(resource.clone()),
        )
        .build();
    let _ = global::set_tracer_provider(tracer.clone());

    let meter = SdkMeterProvider::builder().with_resource(resource).build();
    global::set_meter_provider(meter.clone());
    global::set_text_map_propagator(TraceContextPropagator::new());

    Providers { tracer, meter }
}

fn telemetry_mode(enabled: Option<bool>) -> TelemetryMode {
    match enabled {
        Some(true) => TelemetryMode::Sdk,
        Some(false) | None => TelemetryMode::Disabled,
    }
}

fn parse_log_level(raw: &str) -> Result<Level> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => Err(Error::Config(format!(
            "invalid log level '{other}', expected one of [trace, debug, info, warn, error]"
        ))),
    }
}

fn parse_optional_bool(name: &str) -> Result<Option<bool>> {
    let Some(raw) = std::env::var(name).ok() else {
        return Ok(None);
    };
    parse_bool(name, &raw).map(Some)
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Config(format!(
            "{name} must be a boolean (true/false/1/0), got '{raw}'"
        ))),
    }
}

fn parse_ratio(raw: &str) -> Result<f64> {
    let value = raw.trim().parse::<f64>().map_err(|e| {
        Error::Config(format!("OTEL_TRACES_SAMPLER_ARG must be a float in [0,1]: {e}"))
    })?;
    if !(0.0..=1.0).contains(&value) {
        return Err(Error::Config(format!(
            "OTEL_TRACES_SAMPLER_ARG must be in [0,1], got {value}"
        )));
    }
    Ok(value)
}
