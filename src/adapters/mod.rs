//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements          | Connects to                    |
//! |-------------|---------------------|--------------------------------|
//! | `gpio`      | IndicatorPort       | Activity / link LEDs           |
//! | `log_sink`  | EventSink           | Serial log output              |
//! | `nvs`       | ConfigPort          | NVS / file-backed store        |
//! |             | StoragePort         |                                |
//! | `sim_token` | CommandProcessor    | HMAC demo token                |
//! |             | Provisioner         |                                |
//! | `system`    | SystemPort          | esp_restart / re-exec          |
//! | `tcp`       | Dialer, Connection  | lwIP / std TCP sockets         |
//! | `time`      | ClockPort           | ESP32 system timer             |
//! | `volume`    | VolumePort          | Wear-levelled FAT partition    |
//! | `wifi`      | StationPort         | ESP-IDF WiFi STA               |

pub mod gpio;
pub mod log_sink;
pub mod nvs;
pub mod sim_token;
pub mod system;
pub mod tcp;
pub mod time;
pub mod volume;
pub mod wifi;
