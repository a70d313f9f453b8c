use crate::config::{ConfigError, DetectorConfig};
use std::path::PathBuf;
use strata_detectors::{DetectorFamily, FRAME_META_BYTES};
use strata_icc::BufferConfig;

/// Sizing contract between one module's receiver and everything reading its
/// buffer. Both sides derive it from the same [`DetectorConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceiveConfig {
    pub buffer_name: String,
    pub module_id: u16,
    pub family: DetectorFamily,
    pub udp_port: u16,
    /// Largest datagram the detector sends.
    pub packet_bytes: usize,
    /// Frame bytes carried by one full packet.
    pub payload_bytes: usize,
    pub packets_per_frame: usize,
    pub n_slots: usize,
    pub meta_bytes: usize,
    pub data_bytes: usize,
    pub shm_root: PathBuf,
    pub notify_hwm: usize,
}

impl SendReceiveConfig {
    pub fn for_module(config: &DetectorConfig, module_id: u16) -> Result<Self, ConfigError> {
        let geometry = config.geometry()?;
        Ok(Self {
            buffer_name: config.module_buffer_name(module_id),
            module_id,
            family: geometry.family,
            udp_port: config.udp_port(module_id)?,
            packet_bytes: geometry.family.layout().packet_bytes,
            payload_bytes: geometry.packet_bytes,
            packets_per_frame: geometry.packets_per_frame,
            n_slots: config.buffer.n_buffer_slots,
            meta_bytes: FRAME_META_BYTES,
            data_bytes: geometry.frame_bytes,
            shm_root: config.buffer.shm_root.clone(),
            notify_hwm: config.buffer.notify_hwm,
        })
    }

    pub fn buffer_config(&self) -> BufferConfig {
        BufferConfig {
            n_slots: self.n_slots,
            meta_bytes: self.meta_bytes,
            data_bytes: self.data_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gigafrost() -> DetectorConfig {
        DetectorConfig::from_toml(
            r#"
            detector_name = "GF2"
            detector_type = "gigafrost"
            n_modules = 8
            bit_depth = 16
            image_pixel_height = 2016
            image_pixel_width = 2016
            start_udp_port = 2000
            [buffer]
            n_buffer_slots = 50
            "#,
        )
        .unwrap()
    }

    #[test]
    fn module_contract_follows_geometry() {
        let rc = SendReceiveConfig::for_module(&gigafrost(), 3).unwrap();
        assert_eq!(rc.buffer_name, "GF2-3");
        assert_eq!(rc.udp_port, 2003);
        assert_eq!(rc.packet_bytes, 7432);
        assert_eq!(rc.payload_bytes, 4 * 1512);
        assert_eq!(rc.packets_per_frame, 126);
        assert_eq!(rc.data_bytes, 1008 * 504 * 3 / 2);

        let cfg = rc.buffer_config();
        assert_eq!(cfg.n_slots, 50);
        assert_eq!(cfg.meta_bytes, 64);
    }

    #[test]
    fn unknown_module_is_rejected() {
        assert!(matches!(
            SendReceiveConfig::for_module(&gigafrost(), 8),
            Err(ConfigError::Invalid(_))
        ));
    }
}
