use serde::Deserialize;
use std::path::{Path, PathBuf};
use strata_detectors::{DetectorFamily, FrameGeometry, GeometryError};

/// Static description of one detector, shared by every process of a run.
///
/// The flat keys are the ones detector JSON files have always carried; the
/// sections are optional and fall back to built-in defaults.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    pub detector_name: String,
    pub detector_type: String,
    pub n_modules: u16,
    pub bit_depth: u16,
    pub image_pixel_height: u32,
    pub image_pixel_width: u32,
    pub start_udp_port: u16,
    #[serde(default)]
    pub buffer: BufferSettings,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub stats: StatsSettings,
    #[serde(default = "defaults::log_level")]
    pub log_level: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct BufferSettings {
    #[serde(default = "defaults::shm_root")]
    pub shm_root: PathBuf,
    #[serde(default = "defaults::n_buffer_slots")]
    pub n_buffer_slots: usize,
    #[serde(default = "defaults::notify_hwm")]
    pub notify_hwm: usize,
    #[serde(default = "defaults::udp_timeout_ms")]
    pub udp_timeout_ms: u64,
    #[serde(default = "defaults::udp_rcvbuf_bytes")]
    pub udp_rcvbuf_bytes: usize,
    /// Datagrams per receive call; one frame's worth when unset.
    #[serde(default)]
    pub recv_batch_packets: Option<usize>,
}

/// How the sync process matches module streams.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Wait for every synchronized module of an image.
    #[default]
    Modules,
    /// Pairwise matching of two streams in a bounded window.
    Window,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct SyncSettings {
    #[serde(default)]
    pub mode: SyncMode,
    /// Pending ids the window synchronizer holds before evicting the oldest.
    #[serde(default = "defaults::drop_after")]
    pub drop_after: usize,
    /// Incomplete images the module synchronizer tracks at once.
    #[serde(default = "defaults::n_images_buffer")]
    pub n_images_buffer: usize,
    #[serde(default = "defaults::retry_limit")]
    pub retry_limit: u32,
    /// Modules to wait for, all of them when unset.
    #[serde(default)]
    pub modules: Option<Vec<u16>>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct StatsSettings {
    #[serde(default = "defaults::stats_period_secs")]
    pub period_secs: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read '{path}'")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),

    #[error("failed to parse JSON config")]
    ParseJson(#[from] serde_json::Error),

    #[error(transparent)]
    Detector(#[from] GeometryError),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub const MAX_MODULES: u16 = 128;
const BIT_DEPTHS: [u16; 4] = [4, 8, 16, 32];

mod defaults {
    use std::path::PathBuf;

    pub fn shm_root() -> PathBuf {
        PathBuf::from("/dev/shm")
    }

    pub fn n_buffer_slots() -> usize {
        100
    }

    pub fn notify_hwm() -> usize {
        1 << 16
    }

    pub fn udp_timeout_ms() -> u64 {
        2
    }

    pub fn udp_rcvbuf_bytes() -> usize {
        128 * 100 * 8246
    }

    pub fn drop_after() -> usize {
        1000
    }

    pub fn n_images_buffer() -> usize {
        1000
    }

    pub fn retry_limit() -> u32 {
        3
    }

    pub fn stats_period_secs() -> u64 {
        10
    }

    pub fn log_level() -> String {
        "info".into()
    }
}

impl Default for BufferSettings {
    fn default() -> Self {
        Self {
            shm_root: defaults::shm_root(),
            n_buffer_slots: defaults::n_buffer_slots(),
            notify_hwm: defaults::notify_hwm(),
            udp_timeout_ms: defaults::udp_timeout_ms(),
            udp_rcvbuf_bytes: defaults::udp_rcvbuf_bytes(),
            recv_batch_packets: None,
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            mode: SyncMode::default(),
            drop_after: defaults::drop_after(),
            n_images_buffer: defaults::n_images_buffer(),
            retry_limit: defaults::retry_limit(),
            modules: None,
        }
    }
}

impl Default for StatsSettings {
    fn default() -> Self {
        Self {
            period_secs: defaults::stats_period_secs(),
        }
    }
}

impl DetectorConfig {
    /// Loads and validates a detector file. `.json` files are read as JSON,
    /// anything else as TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let config = if is_json {
            Self::from_json(&text)?
        } else {
            Self::from_toml(&text)?
        };
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: DetectorConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: DetectorConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.detector_name.is_empty() {
            return Err(ConfigError::Invalid("detector_name is empty".into()));
        }
        if !(1..=MAX_MODULES).contains(&self.n_modules) {
            return Err(ConfigError::Invalid(format!(
                "n_modules {} outside 1..={MAX_MODULES}",
                self.n_modules
            )));
        }
        if !BIT_DEPTHS.contains(&self.bit_depth) {
            return Err(ConfigError::Invalid(format!(
                "bit_depth {} not one of {BIT_DEPTHS:?}",
                self.bit_depth
            )));
        }
        if self.image_pixel_height == 0 || self.image_pixel_width == 0 {
            return Err(ConfigError::Invalid(format!(
                "image size {}x{} is empty",
                self.image_pixel_height, self.image_pixel_width
            )));
        }
        if self.buffer.n_buffer_slots == 0 || self.buffer.notify_hwm == 0 {
            return Err(ConfigError::Invalid(
                "n_buffer_slots and notify_hwm must be non-zero".into(),
            ));
        }
        if self.sync.drop_after == 0 || self.sync.n_images_buffer == 0 {
            return Err(ConfigError::Invalid(
                "drop_after and n_images_buffer must be non-zero".into(),
            ));
        }
        if let Some(modules) = &self.sync.modules {
            if modules.is_empty() {
                return Err(ConfigError::Invalid(
                    "sync.modules must name at least one module".into(),
                ));
            }
            for &module_id in modules {
                if module_id >= MAX_MODULES {
                    return Err(ConfigError::Invalid(format!(
                        "sync module {module_id} beyond the {MAX_MODULES} module limit"
                    )));
                }
                self.check_module(module_id)?;
            }
        }
        if self.sync.mode == SyncMode::Window && self.sync_modules().len() != 2 {
            return Err(ConfigError::Invalid(
                "window sync matches exactly two modules".into(),
            ));
        }
        self.geometry()?;
        if u32::from(self.start_udp_port) + u32::from(self.n_modules) > u32::from(u16::MAX) + 1 {
            return Err(ConfigError::Invalid(format!(
                "start_udp_port {} leaves no port for {} modules",
                self.start_udp_port, self.n_modules
            )));
        }
        Ok(())
    }

    pub fn family(&self) -> Result<DetectorFamily, ConfigError> {
        Ok(self.detector_type.parse::<DetectorFamily>()?)
    }

    /// Per-module frame geometry of this detector.
    pub fn geometry(&self) -> Result<FrameGeometry, ConfigError> {
        let family = self.family()?;
        Ok(FrameGeometry::for_detector(
            family,
            self.bit_depth,
            self.image_pixel_height,
            self.image_pixel_width,
        )?)
    }

    /// Modules the synchronizer waits for.
    pub fn sync_mask(&self) -> u128 {
        match &self.sync.modules {
            Some(modules) => modules
                .iter()
                .fold(0, |mask, &m| mask | 1u128.checked_shl(m.into()).unwrap_or(0)),
            None if self.n_modules >= MAX_MODULES => u128::MAX,
            None => (1u128 << self.n_modules) - 1,
        }
    }

    /// Module ids the synchronizer subscribes to, ascending.
    pub fn sync_modules(&self) -> Vec<u16> {
        let mask = self.sync_mask();
        (0..self.n_modules).filter(|&m| (mask >> m) & 1 == 1).collect()
    }

    pub fn udp_port(&self, module_id: u16) -> Result<u16, ConfigError> {
        self.check_module(module_id)?;
        self.start_udp_port.checked_add(module_id).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "port of module {module_id} beyond {}",
                u16::MAX
            ))
        })
    }

    /// Buffer the receiver of `module_id` writes to.
    pub fn module_buffer_name(&self, module_id: u16) -> String {
        format!("{}-{module_id}", self.detector_name)
    }

    /// Buffer carrying synchronized image ids.
    pub fn image_buffer_name(&self) -> String {
        format!("{}-image", self.detector_name)
    }

    pub(crate) fn check_module(&self, module_id: u16) -> Result<(), ConfigError> {
        if module_id >= self.n_modules {
            return Err(ConfigError::Invalid(format!(
                "module_id {module_id} out of range for {} modules",
                self.n_modules
            )));
        }
        Ok(())
    }
}
