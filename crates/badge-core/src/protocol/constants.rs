//! Protocol constants for the badge WebUSB link.
//!
//! Request codes come from the RP2040 co-processor firmware (`webusb_task.c`),
//! boot modes from the ESP32 firmware (`main.c`).

// ============================================================================
// Device Identification
// ============================================================================

/// Badge.team Vendor ID (shared pid.codes block).
pub const BADGE_VENDOR_ID: u16 = 0x16D0;

/// MCH2022 badge Product ID.
pub const BADGE_PRODUCT_ID: u16 = 0x0F9A;

/// Interface carrying the ESP32 WebUSB bridge.
pub const ESP32_INTERFACE: u8 = 4;

// ============================================================================
// Framing
// ============================================================================

/// Start-of-frame sentinel.
pub const PACKET_MAGIC: u32 = 0xFEED_F00D;

/// Fixed header size: magic, identifier, command, length, crc.
pub const HEADER_SIZE: usize = 20;

/// Size of a file data chunk exchanged with `CHNK`.
pub const CHUNK_SIZE: usize = 8192;

/// Full speed bulk endpoint size, used when the descriptor is unavailable.
pub const DEFAULT_MAX_PACKET_SIZE: usize = 64;

// ============================================================================
// Read Policy Defaults
// ============================================================================

/// Per-call bulk IN timeout.
pub const READ_TIMEOUT_MS: u64 = 5;

/// Consecutive empty reads tolerated before a request gives up.
pub const READ_ATTEMPTS: u32 = 200;

/// Pause after a mode switch while the device re-enumerates.
pub const REENUMERATE_DELAY_MS: u64 = 1000;

/// Timeout applied to vendor control transfers.
pub const CONTROL_TIMEOUT_MS: u64 = 1000;

// ============================================================================
// Vendor Control Requests (Host -> RP2040)
// ============================================================================

/// Set connect state of the ESP32 bridge.
pub const REQUEST_STATE: u8 = 0x22;

/// Reset the ESP32.
pub const REQUEST_RESET: u8 = 0x23;

/// Set UART baud rate between RP2040 and ESP32 (value is baud / 100).
pub const REQUEST_BAUDRATE: u8 = 0x24;

/// Set the ESP32 boot mode applied on next reset.
pub const REQUEST_MODE: u8 = 0x25;

/// Read the current ESP32 boot mode.
pub const REQUEST_MODE_GET: u8 = 0x26;

/// Read the RP2040 firmware version.
pub const REQUEST_FW_VERSION_GET: u8 = 0x27;

/// `REQUEST_STATE` values.
pub const STATE_DISCONNECT: u16 = 0x0000;
pub const STATE_CONNECT: u16 = 0x0001;

/// `REQUEST_BAUDRATE` values.
pub const BAUDRATE_WEBUSB: u16 = 9216; // 921600
pub const BAUDRATE_NORMAL: u16 = 1152; // 115200

// ============================================================================
// Command Tags (Host <-> ESP32)
// ============================================================================

pub const CMD_SYNC: [u8; 4] = *b"SYNC";
pub const CMD_PING: [u8; 4] = *b"PING";
pub const CMD_FS_LIST: [u8; 4] = *b"FSLS";
pub const CMD_FS_EXISTS: [u8; 4] = *b"FSEX";
pub const CMD_FS_MKDIR: [u8; 4] = *b"FSMD";
pub const CMD_FS_REMOVE: [u8; 4] = *b"FSRM";
pub const CMD_FS_FILE_WRITE: [u8; 4] = *b"FSFW";
pub const CMD_FS_FILE_READ: [u8; 4] = *b"FSFR";
pub const CMD_FS_FILE_CLOSE: [u8; 4] = *b"FSFC";
pub const CMD_CHUNK: [u8; 4] = *b"CHNK";
pub const CMD_APP_LIST: [u8; 4] = *b"APPL";
pub const CMD_NVS_LIST: [u8; 4] = *b"NVSL";

/// Directory could not be opened.
pub const ERR_DIR_OPEN: [u8; 4] = *b"ERR5";

// ============================================================================
// Directory Entry Types
// ============================================================================

pub const ENTRY_TYPE_FILE: u8 = 1;
pub const ENTRY_TYPE_DIRECTORY: u8 = 2;
