//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements   | Connects to                 |
//! |-------------|--------------|-----------------------------|
//! | `ble`       | LinkPort     | Bluedroid GATT server       |
//! | `hardware`  | PinBackend   | ESP32 GPIO, ADC1 oneshot    |
//! | `device_id` | —            | eFuse MAC → advertised name |
//! | `time`      | —            | ESP32 system timer          |

pub mod ble;
pub mod device_id;
pub mod hardware;
pub mod time;
