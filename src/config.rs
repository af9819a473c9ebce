use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the SQLite database
    pub database_path: PathBuf,
    /// Port the API server listens on
    pub port: u16,
    /// Path to the access token file
    pub tokens_path: PathBuf,
    /// Room layout: numbering range, capacity and special-purpose table
    pub rooms: RoomLayout,
}

/// The fixed room plan of the hostel.
///
/// Room numbers run `first_room..=last_room`. Rooms listed in `special` are
/// excluded from student allocation; their purpose label is fixed at seed time
/// and never changes afterwards.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoomLayout {
    pub first_room: u32,
    pub last_room: u32,
    pub default_capacity: u32,
    pub special: BTreeMap<u32, String>,
}

impl Default for RoomLayout {
    fn default() -> Self {
        let special = [
            (1, "Cooking Staff Room"),
            (8, "Digital Lab 1"),
            (15, "Book Library"),
            (16, "Warden Office"),
            (17, "Store Room"),
            (31, "Digital Lab 2"),
        ]
        .into_iter()
        .map(|(n, p)| (n, p.to_string()))
        .collect();

        Self {
            first_room: 1,
            last_room: 31,
            default_capacity: 6,
            special,
        }
    }
}

impl RoomLayout {
    /// Returns true if `room_number` is inside the hostel's numbering range.
    pub fn contains(&self, room_number: u32) -> bool {
        (self.first_room..=self.last_room).contains(&room_number)
    }

    /// The purpose label for a special-purpose room, if the number is one.
    pub fn special_purpose(&self, room_number: u32) -> Option<&str> {
        self.special.get(&room_number).map(String::as_str)
    }

    /// Purpose label a room gets at creation time.
    pub fn purpose_label(&self, room_number: u32) -> &str {
        self.special_purpose(room_number).unwrap_or("Regular")
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hostelmgr");
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hostelmgr");
        Self {
            database_path: data_dir.join("hostel.db"),
            port: 8080,
            tokens_path: config_dir.join("tokens.yaml"),
            rooms: RoomLayout::default(),
        }
    }
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        // Start with defaults
        let mut config = Self::default();

        // Try to load from config file
        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            config = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;
        }

        // Apply environment variable overrides
        if let Ok(db_path) = std::env::var("HOSTELMGR_DATABASE_PATH") {
            config.database_path = PathBuf::from(db_path);
        }
        if let Ok(port) = std::env::var("HOSTELMGR_PORT") {
            if let Ok(port) = port.parse() {
                config.port = port;
            }
        }
        if let Ok(tokens_path) = std::env::var("HOSTELMGR_TOKENS_PATH") {
            config.tokens_path = PathBuf::from(tokens_path);
        }

        Ok(config)
    }

    /// Default config file path: ~/.config/hostelmgr/config.yaml
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hostelmgr")
            .join("config.yaml")
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
