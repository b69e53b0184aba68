use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Availability of one backend subsystem, normalized onto a closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubsystemState {
    Available,
    Unavailable,
    Disconnected,
    #[default]
    Unknown,
    Error,
}

impl SubsystemState {
    /// Maps the free-form strings the server reports ("connected (documents: 4)",
    /// "not available", "error: timeout", ...) onto the closed set.
    pub fn parse(raw: &str) -> Self {
        let value = raw.trim().to_ascii_lowercase();

        if value.starts_with("error") {
            Self::Error
        } else if value == "unavailable" || value.starts_with("not available") {
            Self::Unavailable
        } else if value == "disconnected"
            || value.starts_with("not configured")
            || value.starts_with("not connected")
        {
            Self::Disconnected
        } else if value == "available"
            || value == "healthy"
            || value == "ok"
            || value.starts_with("connected")
        {
            Self::Available
        } else {
            Self::Unknown
        }
    }

    pub fn is_available(self) -> bool {
        self == Self::Available
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Unavailable => "unavailable",
            Self::Disconnected => "disconnected",
            Self::Unknown => "unknown",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SubsystemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SubsystemState {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map(Self::parse).unwrap_or_default())
    }
}

/// Backend services whose availability the server reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subsystem {
    MongoDb,
    ChromaDb,
    Ollama,
}

impl Subsystem {
    pub fn name(self) -> &'static str {
        match self {
            Self::MongoDb => "MongoDB",
            Self::ChromaDb => "ChromaDB",
            Self::Ollama => "Ollama",
        }
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Snapshot of `GET /health`. Every field always has a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HealthStatus {
    #[serde(default)]
    pub mongodb: SubsystemState,
    #[serde(default)]
    pub ollama: SubsystemState,
    #[serde(default)]
    pub chromadb: SubsystemState,
    #[serde(default)]
    pub status: SubsystemState,
}

impl HealthStatus {
    /// Status reported when the probe itself could not reach the server.
    pub fn unavailable() -> Self {
        Self {
            mongodb: SubsystemState::Disconnected,
            ollama: SubsystemState::Unavailable,
            chromadb: SubsystemState::Disconnected,
            status: SubsystemState::Error,
        }
    }

    pub fn subsystem(&self, subsystem: Subsystem) -> SubsystemState {
        match subsystem {
            Subsystem::MongoDb => self.mongodb,
            Subsystem::ChromaDb => self.chromadb,
            Subsystem::Ollama => self.ollama,
        }
    }

    pub fn llm_available(&self) -> bool {
        self.ollama.is_available()
    }

    /// True when no field reports `available`.
    pub fn is_down(&self) -> bool {
        ![self.mongodb, self.ollama, self.chromadb, self.status]
            .iter()
            .any(|s| s.is_available())
    }
}
