//! Persisted configuration and the store boundary.
//!
//! The settings block travels over the wire byte-for-byte (SEND_SETTINGS /
//! SAVE_SETTINGS) and is the same image the flash store persists, so the
//! layout is `#[repr(C)]` with explicit padding.

use bytemuck::{Pod, Zeroable};

use crate::protocol::frame::checksum;

/// Byte length of the settings image on the wire and in flash.
pub const SETTINGS_WIRE_LEN: usize = core::mem::size_of::<SettingsData>();

#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Debug, Zeroable, Pod)]
#[cfg_attr(feature = "stm32f072", derive(defmt::Format))]
pub struct SettingsData {
    /// Strain-gauge average at or above this value reports "shifting".
    pub sensor_threshold: u32,
    /// Below or at these, slip is forced to zero.
    pub min_speed: u32,
    pub min_rpm: u32,
    /// Potentiometer trim setpoint. Independent of `sensor_threshold`.
    pub wiper: u8,
    pub _pad: [u8; 3],
}

impl SettingsData {
    pub const fn boot_default() -> Self {
        Self {
            sensor_threshold: 2048,
            min_speed: 5,
            min_rpm: 10,
            wiper: 0,
            _pad: [0; 3],
        }
    }

    /// Parse a save-settings payload. Anything shorter than a whole image is
    /// rejected; trailing bytes are ignored.
    pub fn from_wire(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < SETTINGS_WIRE_LEN {
            return None;
        }
        let mut raw = [0u8; SETTINGS_WIRE_LEN];
        raw.copy_from_slice(&bytes[..SETTINGS_WIRE_LEN]);
        Some(bytemuck::cast(raw))
    }

    pub fn as_wire(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

impl Default for SettingsData {
    fn default() -> Self {
        Self::boot_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "stm32f072", derive(defmt::Format))]
pub enum StoreError {
    /// Backing medium rejected the access.
    Io,
    /// Stored block failed validation.
    Corrupt,
}

/// Persistent settings store collaborator. Loaded once at boot, written only
/// by a validated save-settings command.
pub trait SettingsStore {
    fn load(&mut self) -> Result<SettingsData, StoreError>;
    fn save(&mut self, data: &SettingsData) -> Result<(), StoreError>;
}

pub const BLOCK_MAGIC: [u8; 4] = *b"TCS1";
/// magic + image + trailer, padded to a write-aligned length.
pub const BLOCK_LEN: usize = 24;

/// Persisted block image: magic, settings bytes, 8-bit wrapping-sum trailer
/// (the same checksum family as the wire protocol).
pub fn encode_block(data: &SettingsData) -> [u8; BLOCK_LEN] {
    let mut block = [0u8; BLOCK_LEN];
    block[..4].copy_from_slice(&BLOCK_MAGIC);
    block[4..4 + SETTINGS_WIRE_LEN].copy_from_slice(data.as_wire());
    block[4 + SETTINGS_WIRE_LEN] = checksum(data.as_wire());
    block
}

/// Validate a persisted block. Anything that fails the magic or trailer
/// check reads as `Corrupt` and the caller falls back to defaults.
pub fn decode_block(block: &[u8]) -> Result<SettingsData, StoreError> {
    if block.len() < BLOCK_LEN || block[..4] != BLOCK_MAGIC {
        return Err(StoreError::Corrupt);
    }
    let image = &block[4..4 + SETTINGS_WIRE_LEN];
    if checksum(image) != block[4 + SETTINGS_WIRE_LEN] {
        return Err(StoreError::Corrupt);
    }
    SettingsData::from_wire(image).ok_or(StoreError::Corrupt)
}

/// Flash-page store keeping the block in the last 2 KB page.
#[cfg(feature = "stm32f072")]
pub mod flash {
    use super::{decode_block, encode_block, SettingsData, SettingsStore, StoreError, BLOCK_LEN};
    use embassy_stm32::flash::{Blocking, Flash};

    /// Last page of the 128 KB part.
    const BLOCK_OFFSET: u32 = 0x1F800;
    const PAGE_SIZE: u32 = 2048;

    pub struct FlashStore {
        flash: Flash<'static, Blocking>,
    }

    impl FlashStore {
        pub fn new(flash: Flash<'static, Blocking>) -> Self {
            Self { flash }
        }
    }

    impl SettingsStore for FlashStore {
        fn load(&mut self) -> Result<SettingsData, StoreError> {
            let mut block = [0u8; BLOCK_LEN];
            self.flash
                .blocking_read(BLOCK_OFFSET, &mut block)
                .map_err(|_| StoreError::Io)?;
            decode_block(&block)
        }

        fn save(&mut self, data: &SettingsData) -> Result<(), StoreError> {
            let block = encode_block(data);
            self.flash
                .blocking_erase(BLOCK_OFFSET, BLOCK_OFFSET + PAGE_SIZE)
                .map_err(|_| StoreError::Io)?;
            self.flash
                .blocking_write(BLOCK_OFFSET, &block)
                .map_err(|_| StoreError::Io)?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_image_is_16_bytes() {
        assert_eq!(SETTINGS_WIRE_LEN, 16);
    }

    #[test]
    fn from_wire_round_trips() {
        let original = SettingsData {
            sensor_threshold: 1500,
            min_speed: 12,
            min_rpm: 900,
            wiper: 0x85,
            _pad: [0; 3],
        };
        let parsed = SettingsData::from_wire(original.as_wire()).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn from_wire_rejects_short_payload() {
        let bytes = [0u8; SETTINGS_WIRE_LEN - 1];
        assert!(SettingsData::from_wire(&bytes).is_none());
    }

    #[test]
    fn block_round_trips() {
        let s = SettingsData {
            sensor_threshold: 1234,
            min_speed: 7,
            min_rpm: 300,
            wiper: 0x22,
            _pad: [0; 3],
        };
        assert_eq!(decode_block(&encode_block(&s)), Ok(s));
    }

    #[test]
    fn erased_page_reads_as_corrupt() {
        // Fresh flash is all ones: no magic.
        assert_eq!(decode_block(&[0xFF; BLOCK_LEN]), Err(StoreError::Corrupt));
    }

    #[test]
    fn bad_magic_reads_as_corrupt() {
        let mut block = encode_block(&SettingsData::boot_default());
        block[0] = b'X';
        assert_eq!(decode_block(&block), Err(StoreError::Corrupt));
    }

    #[test]
    fn flipped_image_byte_reads_as_corrupt() {
        let mut block = encode_block(&SettingsData::boot_default());
        block[6] ^= 0x01;
        assert_eq!(decode_block(&block), Err(StoreError::Corrupt));
    }

    #[test]
    fn short_block_reads_as_corrupt() {
        let block = encode_block(&SettingsData::boot_default());
        assert_eq!(
            decode_block(&block[..BLOCK_LEN - 1]),
            Err(StoreError::Corrupt)
        );
    }

    #[test]
    fn store_round_trips() {
        let mut store = crate::mock::MemStore::default();
        assert!(store.load().is_err());
        let s = SettingsData {
            sensor_threshold: 4000,
            ..SettingsData::boot_default()
        };
        store.save(&s).unwrap();
        assert_eq!(store.load().unwrap(), s);
    }

    #[test]
    fn from_wire_ignores_trailing_bytes() {
        let original = SettingsData::boot_default();
        let mut long = [0xEEu8; SETTINGS_WIRE_LEN + 7];
        long[..SETTINGS_WIRE_LEN].copy_from_slice(original.as_wire());
        assert_eq!(SettingsData::from_wire(&long), Some(original));
    }
}
