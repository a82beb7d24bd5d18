use serde::{Deserialize, Deserializer};
use std::net::IpAddr;
use tracing::Level;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
	pub telemetry: TelemetryConfig,
	pub server: ServerConfig,
	pub thumbnail: ThumbnailConfig,
}

impl AppConfig {
	/// Loads the configuration from the built-in defaults, an optional `config.toml` in the
	/// working directory and `DICOM_EXPLORER_` prefixed environment variables (in that order).
	pub fn new() -> Result<Self, config::ConfigError> {
		use config::Config;
		let s = Config::builder()
			.add_source(config::File::from_str(
				include_str!("defaults.toml"),
				config::FileFormat::Toml,
			))
			.add_source(config::File::with_name("config.toml").required(false))
			.add_source(
				config::Environment::with_prefix("DICOM_EXPLORER")
					.prefix_separator("_")
					.separator("__"),
			)
			.build()?;

		let config: Self = s.try_deserialize()?;
		config.validate()?;
		Ok(config)
	}

	/// The built-in defaults without any file or environment overrides.
	#[cfg(test)]
	pub fn defaults() -> Self {
		Self::from_defaults(config::Config::builder()).unwrap()
	}

	#[cfg(test)]
	fn from_defaults(
		builder: config::ConfigBuilder<config::builder::DefaultState>,
	) -> Result<Self, config::ConfigError> {
		builder
			.add_source(config::File::from_str(
				include_str!("defaults.toml"),
				config::FileFormat::Toml,
			))
			.build()?
			.try_deserialize()
	}

	fn validate(&self) -> Result<(), config::ConfigError> {
		let ThumbnailConfig {
			default_size,
			max_size,
		} = self.thumbnail;
		if default_size == 0 || default_size > max_size {
			return Err(config::ConfigError::Message(format!(
				"thumbnail.default_size ({default_size}) must be within 1..={max_size}"
			)));
		}
		Ok(())
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
	/// Configurable logging level. RUST_LOG takes precedence if set.
	#[serde(deserialize_with = "deserialize_level")]
	pub level: Level,
	/// Sentry DSN. Sentry is disabled if unset.
	pub sentry: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
	pub http: HttpServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
	/// The interface the HTTP server will be listening on
	pub interface: IpAddr,
	/// The port for the HTTP server
	pub port: u16,
	/// Prefix for all routes
	pub base_path: String,
	/// Maximum size of an uploaded file in bytes
	pub max_upload_size: usize,
	/// Request timeout in seconds
	pub request_timeout: u64,
	pub graceful_shutdown: bool,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ThumbnailConfig {
	/// Bounding side length used if the request does not specify one.
	pub default_size: u32,
	/// Largest bounding side length a request may ask for.
	pub max_size: u32,
}

fn deserialize_level<'de, D>(deserializer: D) -> Result<Level, D::Error>
where
	D: Deserializer<'de>,
{
	let s = String::deserialize(deserializer)?;
	s.parse().map_err(serde::de::Error::custom)
}
