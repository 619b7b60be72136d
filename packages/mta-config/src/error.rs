use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Config file {} could not be read.", path.display())]
	Read { path: PathBuf, source: std::io::Error },
	#[error("Config source {origin} is not valid TOML for this service.")]
	Parse { origin: String, source: toml::de::Error },
	#[error("Invalid configuration: {message}")]
	Invalid { message: String },
}
