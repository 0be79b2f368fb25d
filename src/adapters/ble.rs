//! BLE link adapter.
//!
//! Implements [`LinkPort`] — the hexagonal boundary to the wireless
//! stack.  Stack callbacks turn into [`LinkEvent`]s on the link channel;
//! the consumer loop calls back in through the port.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: Bluedroid BLE GATT server via raw
//!   `esp_idf_svc::sys` calls.
//! - **all other targets**: in-memory simulation for host-side tests.
//!
//! ## GATT Service Layout
//!
//! | Attribute          | UUID     | Perms                  |
//! |--------------------|----------|------------------------|
//! | Pin service        | `0x1234` | primary                |
//! | Pin state          | `0x5678` | Read+Write+Notify      |
//! | CCCD               | `0x2902` | Read+Write             |
//!
//! ## Advertising
//!
//! Legacy, connectable, 31 bytes max:
//! `02 01 06 | len 09 <name> | 03 03 34 12`.  Names that do not fit are
//! cut and sent as a shortened local name (`0x08`).  Advertising
//! restarts on every disconnect.
//!
//! [`LinkEvent`]: crate::events::LinkEvent

use log::info;

use crate::app::ports::{AttrHandle, ConnHandle, LinkPort};
use crate::app::protocol::MAX_PAYLOAD;
use crate::error::LinkError;
#[cfg(not(target_os = "espidf"))]
use crate::events::{LinkEvent, WriteBuf};

// ───────────────────────────────────────────────────────────────
// Constants
// ───────────────────────────────────────────────────────────────

pub const SERVICE_UUID: u16 = 0x1234;
pub const CHAR_PIN_STATE: u16 = 0x5678;
pub const DESCR_CCCD: u16 = 0x2902;

/// Largest characteristic value the stack stores.
pub const MAX_ATTR_LEN: usize = MAX_PAYLOAD;

/// Local MTU offered during exchange; fits a full attribute in one PDU.
pub const LOCAL_MTU: u16 = (MAX_ATTR_LEN + 5) as u16;

/// ATT MTU before any exchange.
pub const DEFAULT_MTU: u16 = 23;

const ADV_MAX_LEN: usize = 31;
const AD_FLAGS: [u8; 3] = [0x02, 0x01, 0x06];
const AD_SERVICE_LIST: [u8; 4] = [
    0x03,
    0x03,
    SERVICE_UUID.to_le_bytes()[0],
    SERVICE_UUID.to_le_bytes()[1],
];
const AD_TYPE_SHORT_NAME: u8 = 0x08;
const AD_TYPE_COMPLETE_NAME: u8 = 0x09;

/// Name bytes that still fit next to flags and the service list.
pub const MAX_ADV_NAME_LEN: usize = ADV_MAX_LEN - AD_FLAGS.len() - AD_SERVICE_LIST.len() - 2;

pub type AdvPayload = heapless::Vec<u8, ADV_MAX_LEN>;

/// Build the raw advertising payload for `name`.
pub fn advertising_payload(name: &str) -> AdvPayload {
    let (name, ad_type) = if name.len() <= MAX_ADV_NAME_LEN {
        (name, AD_TYPE_COMPLETE_NAME)
    } else {
        let mut cut = MAX_ADV_NAME_LEN;
        while !name.is_char_boundary(cut) {
            cut -= 1;
        }
        (&name[..cut], AD_TYPE_SHORT_NAME)
    };

    let mut adv = AdvPayload::new();
    // Lengths are bounded by MAX_ADV_NAME_LEN, so none of these overflow.
    let _ = adv.extend_from_slice(&AD_FLAGS);
    let _ = adv.push(name.len() as u8 + 1);
    let _ = adv.push(ad_type);
    let _ = adv.extend_from_slice(name.as_bytes());
    let _ = adv.extend_from_slice(&AD_SERVICE_LIST);
    adv
}

/// Largest notification that fits one PDU at `mtu`.
pub const fn max_notify_len(mtu: u16) -> usize {
    mtu.saturating_sub(3) as usize
}

// ───────────────────────────────────────────────────────────────
// BLE state
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BleState {
    Idle,
    Advertising,
    Registered,
    Failed,
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF BLE static state
// ───────────────────────────────────────────────────────────────
//
// Bluedroid callbacks are C function pointers that cannot capture Rust
// closures.  These atomics bridge the callback context to the adapter.

#[cfg(target_os = "espidf")]
use core::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

#[cfg(target_os = "espidf")]
use crate::events::{push_link_event, LinkEvent, WriteBuf};

#[cfg(target_os = "espidf")]
static BLE_GATTS_IF: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_SVC_HANDLE: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_VALUE_HANDLE: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_PEER_MTU: AtomicU32 = AtomicU32::new(DEFAULT_MTU as u32);

#[cfg(target_os = "espidf")]
const REGISTRATION_TIMEOUT_MS: u32 = 5_000;

#[cfg(target_os = "espidf")]
fn uuid16_to_esp(uuid: u16) -> esp_idf_svc::sys::esp_bt_uuid_t {
    // SAFETY: esp_bt_uuid_t is plain data; all-zero is a valid value.
    let mut t: esp_idf_svc::sys::esp_bt_uuid_t = unsafe { core::mem::zeroed() };
    t.len = 2;
    t.uuid.uuid16 = uuid;
    t
}

#[cfg(target_os = "espidf")]
fn start_advertising() {
    use esp_idf_svc::sys::*;
    // SAFETY: plain-data params struct; Bluedroid copies it.
    unsafe {
        let mut adv_params = esp_ble_adv_params_t {
            adv_int_min: 0x20,
            adv_int_max: 0x40,
            adv_type: esp_ble_adv_type_t_ADV_TYPE_IND,
            own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
            channel_map: esp_ble_adv_channel_t_ADV_CHNL_ALL,
            adv_filter_policy: esp_ble_adv_filter_t_ADV_FILTER_ALLOW_SCAN_ANY_CON_ANY,
            ..core::mem::zeroed()
        };
        esp_ble_gap_start_advertising(&mut adv_params);
    }
}

/// Copy a client write into a link event.  The stack reuses its buffer
/// once the callback returns.
#[cfg(target_os = "espidf")]
fn push_write(conn: ConnHandle, attr: AttrHandle, data: &[u8]) {
    match WriteBuf::from_slice(data) {
        Ok(value) => push_link_event(LinkEvent::DataWritten { conn, attr, value }),
        Err(()) => log::warn!("BLE GATTS: {} byte write dropped (max {})", data.len(), MAX_PAYLOAD),
    }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn ble_gap_event_handler(
    event: esp_idf_svc::sys::esp_gap_ble_cb_event_t,
    param: *mut esp_idf_svc::sys::esp_ble_gap_cb_param_t,
) {
    use esp_idf_svc::sys::*;
    match event {
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_DATA_RAW_SET_COMPLETE_EVT => {
            start_advertising();
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_START_COMPLETE_EVT => {
            // SAFETY: param is valid for this event per Bluedroid.
            let status = unsafe { (*param).adv_start_cmpl.status };
            if status == esp_bt_status_t_ESP_BT_STATUS_SUCCESS {
                log::info!("BLE GAP: advertising started");
            } else {
                log::warn!("BLE GAP: advertising start failed ({})", status);
            }
        }
        _ => {}
    }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn ble_gatts_event_handler(
    event: esp_idf_svc::sys::esp_gatts_cb_event_t,
    gatts_if: esp_idf_svc::sys::esp_gatt_if_t,
    param: *mut esp_idf_svc::sys::esp_ble_gatts_cb_param_t,
) {
    use esp_idf_svc::sys::*;

    match event {
        esp_gatts_cb_event_t_ESP_GATTS_REG_EVT => {
            BLE_GATTS_IF.store(gatts_if as u32, AtomicOrdering::Relaxed);
            log::info!("BLE GATTS: app registered (if={})", gatts_if);
            let mut svc_id = esp_gatt_srvc_id_t {
                id: esp_gatt_id_t {
                    uuid: uuid16_to_esp(SERVICE_UUID),
                    inst_id: 0,
                },
                is_primary: true,
            };
            // Service, characteristic declaration, value, CCCD.
            unsafe { esp_ble_gatts_create_service(gatts_if, &mut svc_id, 4) };
        }
        esp_gatts_cb_event_t_ESP_GATTS_CREATE_EVT => {
            let svc_handle = unsafe { (*param).create.service_handle };
            BLE_SVC_HANDLE.store(svc_handle as u32, AtomicOrdering::Relaxed);
            log::info!("BLE GATTS: service created (handle={})", svc_handle);

            let mut char_uuid = uuid16_to_esp(CHAR_PIN_STATE);
            let mut value = esp_attr_value_t {
                attr_max_len: MAX_ATTR_LEN as u16,
                attr_len: 0,
                attr_value: core::ptr::null_mut(),
            };
            let mut control = esp_attr_control_t {
                auto_rsp: ESP_GATT_AUTO_RSP as u8,
            };
            unsafe {
                esp_ble_gatts_start_service(svc_handle);
                esp_ble_gatts_add_char(
                    svc_handle,
                    &mut char_uuid,
                    (ESP_GATT_PERM_READ | ESP_GATT_PERM_WRITE) as esp_gatt_perm_t,
                    (ESP_GATT_CHAR_PROP_BIT_READ
                        | ESP_GATT_CHAR_PROP_BIT_WRITE
                        | ESP_GATT_CHAR_PROP_BIT_NOTIFY) as esp_gatt_char_prop_t,
                    &mut value,
                    &mut control,
                );
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_EVT => {
            let handle = unsafe { (*param).add_char.attr_handle };
            let svc_handle = BLE_SVC_HANDLE.load(AtomicOrdering::Relaxed) as u16;

            let mut cccd_uuid = uuid16_to_esp(DESCR_CCCD);
            let mut cccd = [0u8; 2];
            let mut value = esp_attr_value_t {
                attr_max_len: 2,
                attr_len: 2,
                attr_value: cccd.as_mut_ptr(),
            };
            let mut control = esp_attr_control_t {
                auto_rsp: ESP_GATT_AUTO_RSP as u8,
            };
            // SAFETY: Bluedroid deep-copies the value before returning.
            unsafe {
                esp_ble_gatts_add_char_descr(
                    svc_handle,
                    &mut cccd_uuid,
                    (ESP_GATT_PERM_READ | ESP_GATT_PERM_WRITE) as esp_gatt_perm_t,
                    &mut value,
                    &mut control,
                );
            }
            // Published last: register_service() polls for it.
            BLE_VALUE_HANDLE.store(handle as u32, AtomicOrdering::Release);
            log::info!("BLE GATTS: pin state char (handle={})", handle);
        }
        esp_gatts_cb_event_t_ESP_GATTS_CONNECT_EVT => {
            let conn_id = unsafe { (*param).connect.conn_id };
            BLE_PEER_MTU.store(DEFAULT_MTU as u32, AtomicOrdering::Relaxed);
            push_link_event(LinkEvent::Connected(conn_id));
        }
        esp_gatts_cb_event_t_ESP_GATTS_DISCONNECT_EVT => {
            let reason = unsafe { (*param).disconnect.reason };
            log::info!("BLE GATTS: client disconnected (reason=0x{:02x})", reason);
            push_link_event(LinkEvent::Disconnected);
            start_advertising();
        }
        esp_gatts_cb_event_t_ESP_GATTS_MTU_EVT => {
            let p = unsafe { &(*param).mtu };
            BLE_PEER_MTU.store(p.mtu as u32, AtomicOrdering::Relaxed);
            log::info!("BLE GATTS: MTU {}", p.mtu);
            push_link_event(LinkEvent::MtuChanged {
                conn: p.conn_id,
                mtu: p.mtu,
            });
        }
        esp_gatts_cb_event_t_ESP_GATTS_WRITE_EVT => {
            let p = unsafe { &(*param).write };
            // Prepared writes are assembled by the stack; wait for EXEC.
            if p.is_prep || p.handle as u32 != BLE_VALUE_HANDLE.load(AtomicOrdering::Acquire) {
                return;
            }
            let data = if p.value.is_null() {
                &[][..]
            } else {
                // SAFETY: the stack owns `value` for the duration of the
                // callback; it is copied out before returning.
                unsafe { core::slice::from_raw_parts(p.value, p.len as usize) }
            };
            push_write(p.conn_id, p.handle, data);
        }
        esp_gatts_cb_event_t_ESP_GATTS_EXEC_WRITE_EVT => {
            let p = unsafe { &(*param).exec_write };
            if p.exec_write_flag != ESP_GATT_PREP_WRITE_EXEC as u8 {
                return;
            }
            let attr = BLE_VALUE_HANDLE.load(AtomicOrdering::Acquire) as u16;
            let mut len: u16 = 0;
            let mut ptr: *const u8 = core::ptr::null();
            // SAFETY: on success `ptr` points at the stack's copy of the
            // assembled value.  Only this task writes it, so it stays put
            // until the callback returns.
            let ret = unsafe { esp_ble_gatts_get_attr_value(attr, &mut len, &mut ptr) };
            if ret != ESP_OK as i32 || ptr.is_null() {
                log::warn!("BLE GATTS: reading prepared write failed (rc={})", ret);
                return;
            }
            // SAFETY: `ptr` is valid for `len` bytes, see above.
            push_write(p.conn_id, attr, unsafe { core::slice::from_raw_parts(ptr, len as usize) });
        }
        _ => {}
    }
}

// ───────────────────────────────────────────────────────────────
// BLE adapter
// ───────────────────────────────────────────────────────────────

pub struct BleLink {
    state: BleState,
    device_name: heapless::String<32>,
    /// Simulation: stored characteristic value.
    #[cfg(not(target_os = "espidf"))]
    sim_value: heapless::Vec<u8, MAX_ATTR_LEN>,
    /// Simulation: every notification sent, newest last.
    #[cfg(not(target_os = "espidf"))]
    sim_sent: std::vec::Vec<(ConnHandle, std::vec::Vec<u8>)>,
    /// Simulation: negotiated ATT MTU of the current link.
    #[cfg(not(target_os = "espidf"))]
    sim_mtu: u16,
}

impl BleLink {
    pub fn new(device_name: &str) -> Self {
        let mut name = heapless::String::new();
        for c in device_name.chars() {
            if name.push(c).is_err() {
                break;
            }
        }
        Self {
            state: BleState::Idle,
            device_name: name,
            #[cfg(not(target_os = "espidf"))]
            sim_value: heapless::Vec::new(),
            #[cfg(not(target_os = "espidf"))]
            sim_sent: std::vec::Vec::new(),
            #[cfg(not(target_os = "espidf"))]
            sim_mtu: DEFAULT_MTU,
        }
    }

    pub fn state(&self) -> BleState {
        self.state
    }

    /// Bring up the controller and host, then start advertising.
    pub fn start(&mut self) -> Result<(), LinkError> {
        info!("BLE: starting, advertising as '{}'", self.device_name);
        match self.platform_start() {
            Ok(()) => {
                self.state = BleState::Advertising;
                Ok(())
            }
            Err(e) => {
                self.state = BleState::Failed;
                Err(e)
            }
        }
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_start(&mut self) -> Result<(), LinkError> {
        use esp_idf_svc::sys::*;

        let check = |ret: esp_err_t| {
            if ret == ESP_OK as i32 { Ok(()) } else { Err(LinkError::StackInit(ret)) }
        };

        // SAFETY: called once from the main task before any callback
        // can fire; pointers passed below outlive each call.
        unsafe {
            // Release classic BT memory (BLE-only mode saves ~30 KB).
            esp_bt_controller_mem_release(esp_bt_mode_t_ESP_BT_MODE_CLASSIC_BT);

            let mut bt_cfg = esp_bt_controller_config_t::default();
            check(esp_bt_controller_init(&mut bt_cfg))?;
            check(esp_bt_controller_enable(esp_bt_mode_t_ESP_BT_MODE_BLE))?;
            check(esp_bluedroid_init())?;
            check(esp_bluedroid_enable())?;

            check(esp_ble_gap_register_callback(Some(ble_gap_event_handler)))?;
            check(esp_ble_gatts_register_callback(Some(ble_gatts_event_handler)))?;
            check(esp_ble_gatt_set_local_mtu(LOCAL_MTU))?;

            let mut cname: heapless::Vec<u8, 33> = heapless::Vec::new();
            let _ = cname.extend_from_slice(self.device_name.as_bytes());
            let _ = cname.push(0);
            esp_ble_gap_set_device_name(cname.as_ptr() as *const _);

            // Advertising starts from the GAP callback once the data is set.
            let mut adv = advertising_payload(&self.device_name);
            check(esp_ble_gap_config_adv_data_raw(adv.as_mut_ptr(), adv.len() as u32))?;
        }
        info!("BLE(espidf): Bluedroid up, local MTU {}", LOCAL_MTU);
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_start(&mut self) -> Result<(), LinkError> {
        info!(
            "BLE(sim): advertising {:02x?}",
            advertising_payload(&self.device_name).as_slice()
        );
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_register(&mut self) -> Result<AttrHandle, LinkError> {
        use esp_idf_svc::hal::delay::FreeRtos;
        use esp_idf_svc::sys::*;

        // SAFETY: plain call into Bluedroid; the rest happens in callbacks.
        let ret = unsafe { esp_ble_gatts_app_register(0) };
        if ret != ESP_OK as i32 {
            return Err(LinkError::Rejected(ret));
        }

        let mut waited = 0;
        loop {
            let handle = BLE_VALUE_HANDLE.load(AtomicOrdering::Acquire);
            if handle != 0 {
                return Ok(handle as AttrHandle);
            }
            if waited >= REGISTRATION_TIMEOUT_MS {
                return Err(LinkError::RegistrationTimeout);
            }
            FreeRtos::delay_ms(10);
            waited += 10;
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_register(&mut self) -> Result<AttrHandle, LinkError> {
        Ok(42)
    }

    #[cfg(target_os = "espidf")]
    fn platform_set_value(&mut self, attr: AttrHandle, data: &[u8]) -> Result<(), LinkError> {
        // SAFETY: the stack copies `data` before returning.
        let ret = unsafe {
            esp_idf_svc::sys::esp_ble_gatts_set_attr_value(attr, data.len() as u16, data.as_ptr())
        };
        if ret != esp_idf_svc::sys::ESP_OK as i32 {
            return Err(LinkError::Rejected(ret));
        }
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_set_value(&mut self, _attr: AttrHandle, data: &[u8]) -> Result<(), LinkError> {
        self.sim_value.clear();
        self.sim_value
            .extend_from_slice(data)
            .map_err(|()| LinkError::Rejected(-1))
    }

    #[cfg(target_os = "espidf")]
    fn platform_notify(&mut self, conn: ConnHandle, attr: AttrHandle, data: &[u8]) -> Result<(), LinkError> {
        let mtu = BLE_PEER_MTU.load(AtomicOrdering::Relaxed) as u16;
        if data.len() > max_notify_len(mtu) {
            return Err(LinkError::MtuExceeded { len: data.len(), mtu });
        }
        // SAFETY: the stack copies `data` before returning; the pointer
        // is only read despite the `*mut` signature.
        let ret = unsafe {
            esp_idf_svc::sys::esp_ble_gatts_send_indicate(
                BLE_GATTS_IF.load(AtomicOrdering::Relaxed) as u8,
                conn,
                attr,
                data.len() as u16,
                data.as_ptr() as *mut u8,
                false,
            )
        };
        if ret != esp_idf_svc::sys::ESP_OK as i32 {
            return Err(LinkError::Rejected(ret));
        }
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_notify(&mut self, conn: ConnHandle, _attr: AttrHandle, data: &[u8]) -> Result<(), LinkError> {
        let mtu = self.sim_mtu;
        if data.len() > max_notify_len(mtu) {
            return Err(LinkError::MtuExceeded { len: data.len(), mtu });
        }
        self.sim_sent.push((conn, data.to_vec()));
        Ok(())
    }

    // ── Simulation hooks ──────────────────────────────────────

    /// Simulation: a central connects.  The link starts at the default MTU.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_connect(&mut self, conn: ConnHandle) -> LinkEvent {
        self.sim_mtu = DEFAULT_MTU;
        LinkEvent::Connected(conn)
    }

    /// Simulation: the central asks for `mtu`; the link settles on the
    /// smaller of that and ours.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_exchange_mtu(&mut self, conn: ConnHandle, mtu: u16) -> LinkEvent {
        self.sim_mtu = mtu.clamp(DEFAULT_MTU, LOCAL_MTU);
        LinkEvent::MtuChanged {
            conn,
            mtu: self.sim_mtu,
        }
    }

    /// Simulation: a central writes the characteristic.  Like the stack
    /// callback, the bytes are stored and copied into the event.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_client_write(
        &mut self,
        conn: ConnHandle,
        attr: AttrHandle,
        data: &[u8],
    ) -> Option<LinkEvent> {
        let value = WriteBuf::from_slice(data).ok()?;
        self.platform_set_value(attr, data).ok()?;
        Some(LinkEvent::DataWritten { conn, attr, value })
    }

    /// Simulation: the stored characteristic value.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_value(&self) -> &[u8] {
        &self.sim_value
    }

    /// Simulation: drain the notifications sent so far.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_take_sent(&mut self) -> std::vec::Vec<(ConnHandle, std::vec::Vec<u8>)> {
        core::mem::take(&mut self.sim_sent)
    }
}

// ───────────────────────────────────────────────────────────────
// LinkPort implementation
// ───────────────────────────────────────────────────────────────

impl LinkPort for BleLink {
    fn register_service(&mut self) -> Result<AttrHandle, LinkError> {
        let handle = self.platform_register()?;
        self.state = BleState::Registered;
        info!("BLE: service 0x{:04x} registered, value handle {}", SERVICE_UUID, handle);
        Ok(handle)
    }

    fn write_value(&mut self, attr: AttrHandle, data: &[u8]) -> Result<(), LinkError> {
        if data.len() > MAX_ATTR_LEN {
            return Err(LinkError::Rejected(-1));
        }
        self.platform_set_value(attr, data)
    }

    fn notify(&mut self, conn: ConnHandle, attr: AttrHandle, data: &[u8]) -> Result<(), LinkError> {
        self.platform_notify(conn, attr, data)
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
