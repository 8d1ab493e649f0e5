//! Version information for carpark.

/// carpark version from Cargo.toml
pub const CARPARK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version information reported by the health endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct VersionInfo {
    pub carpark: &'static str,
    /// Build or deployment label supplied at startup, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<String>,
}

impl Default for VersionInfo {
    fn default() -> Self {
        Self {
            carpark: CARPARK_VERSION,
            build: None,
        }
    }
}

impl VersionInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_build(mut self, build: String) -> Self {
        self.build = Some(build);
        self
    }
}
