//! JSON wire codec for the single pin characteristic.
//!
//! Inbound (client → device):
//!
//! ```text
//! {"c"|"cmd": "s"|"set"|"r"|"read",
//!  "t"|"category": "do"|"di"|"ai",
//!  "p"|"pin": <name>,
//!  "v"|"val": <int>}
//! ```
//!
//! Aliases are folded into [`Command`] here, once, so nothing
//! downstream ever looks at field names.  When a payload carries both
//! spellings of a field the short one wins.
//!
//! Outbound (device → client): `{"status": ..}` or `{"data": <snapshot>}`,
//! plus the combined initial value written at registration.

extern crate alloc;

use alloc::vec::Vec;

use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, NotifyError};

use super::registry::{Category, PinName, StateSnapshot};

/// Attribute size ceiling; nothing larger is ever handed to the link.
pub const MAX_PAYLOAD: usize = 512;

// ───────────────────────────────────────────────────────────────
// Inbound
// ───────────────────────────────────────────────────────────────

/// A decoded, alias-free client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Reply with a full snapshot.
    Read,
    /// Drive a pin.  Any non-zero wire value means high.
    Set {
        category: Category,
        pin: PinName,
        high: bool,
    },
}

type WireWord = heapless::String<16>;

/// Both spellings are separate fields: a serde `alias` would turn a
/// payload carrying both into a duplicate-field error.
#[derive(Deserialize)]
struct WireCommand {
    c: Option<WireWord>,
    cmd: Option<WireWord>,
    t: Option<WireWord>,
    category: Option<WireWord>,
    p: Option<PinName>,
    pin: Option<PinName>,
    v: Option<i64>,
    val: Option<i64>,
}

/// Decode one inbound write.
pub fn decode(raw: &[u8]) -> Result<Command, DecodeError> {
    let wire: WireCommand = serde_json::from_slice(raw)?;
    let action = wire.c.or(wire.cmd).ok_or(DecodeError::MissingAction)?;

    match action.as_str() {
        "r" | "read" => Ok(Command::Read),
        "s" | "set" => {
            let category = wire.t.or(wire.category).ok_or(DecodeError::MissingField("t"))?;
            let category =
                Category::from_wire(&category).ok_or(DecodeError::UnknownCategory)?;
            let pin = wire.p.or(wire.pin).ok_or(DecodeError::MissingField("p"))?;
            let value = wire.v.or(wire.val).ok_or(DecodeError::MissingField("v"))?;
            Ok(Command::Set {
                category,
                pin,
                high: value != 0,
            })
        }
        _ => Err(DecodeError::UnknownAction),
    }
}

// ───────────────────────────────────────────────────────────────
// Outbound
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Initial characteristic value, before any client.
    Ready,
    Connected,
    Ok,
    /// Only sent when error replies are enabled.
    Error,
}

/// One notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outbound {
    Status(Status),
    Data(StateSnapshot),
}

/// Stored characteristic value after registration:
/// `{"status":"ready","data":<snapshot>}`.
#[derive(Debug, Serialize)]
pub struct InitialValue<'a> {
    pub status: Status,
    pub data: &'a StateSnapshot,
}

/// Serialise an outbound message, enforcing [`MAX_PAYLOAD`].
pub fn encode<T: Serialize + ?Sized>(msg: &T) -> Result<Vec<u8>, NotifyError> {
    let bytes = serde_json::to_vec(msg).map_err(|_| NotifyError::Encode)?;
    if bytes.len() > MAX_PAYLOAD {
        return Err(NotifyError::PayloadTooLarge(bytes.len()));
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(category: Category, pin: &str, high: bool) -> Command {
        Command::Set {
            category,
            pin: PinName::try_from(pin).unwrap(),
            high,
        }
    }

    #[test]
    fn short_and_long_forms_decode_alike() {
        let short = decode(br#"{"c":"s","t":"do","p":"LED1","v":1}"#).unwrap();
        let long = decode(br#"{"cmd":"set","category":"do","pin":"LED1","val":1}"#).unwrap();
        assert_eq!(short, set(Category::DigitalOutput, "LED1", true));
        assert_eq!(short, long);
    }

    #[test]
    fn mixed_aliases_and_long_category_names() {
        let cmd = decode(br#"{"cmd":"s","t":"digital_outputs","pin":"LED2","v":0}"#).unwrap();
        assert_eq!(cmd, set(Category::DigitalOutput, "LED2", false));
    }

    #[test]
    fn short_form_wins_when_both_are_present() {
        assert_eq!(decode(br#"{"c":"r","cmd":"set"}"#), Ok(Command::Read));
        let cmd = decode(
            br#"{"cmd":"read","c":"s","t":"do","category":"ai","p":"LED1","pin":"LED2","v":1,"val":0}"#,
        )
        .unwrap();
        assert_eq!(cmd, set(Category::DigitalOutput, "LED1", true));
    }

    #[test]
    fn read_needs_only_the_action() {
        assert_eq!(decode(br#"{"c":"r"}"#), Ok(Command::Read));
        assert_eq!(decode(br#"{"cmd":"read","extra":[1,2]}"#), Ok(Command::Read));
    }

    #[test]
    fn any_nonzero_value_is_high() {
        let cmd = decode(br#"{"c":"s","t":"do","p":"LED1","v":-7}"#).unwrap();
        assert_eq!(cmd, set(Category::DigitalOutput, "LED1", true));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(decode(b"not json"), Err(DecodeError::Json(_))));
        assert!(matches!(decode(b"[1,2]"), Err(DecodeError::Json(_))));
        assert_eq!(decode(b"{}"), Err(DecodeError::MissingAction));
        assert_eq!(decode(br#"{"c":"x"}"#), Err(DecodeError::UnknownAction));
        assert_eq!(
            decode(br#"{"c":"s","t":"zz","p":"LED1","v":1}"#),
            Err(DecodeError::UnknownCategory)
        );
        assert_eq!(
            decode(br#"{"c":"s","t":"do","p":"LED1"}"#),
            Err(DecodeError::MissingField("v"))
        );
        assert_eq!(
            decode(br#"{"c":"s","t":"do","v":1}"#),
            Err(DecodeError::MissingField("p"))
        );
    }

    #[test]
    fn outbound_shapes() {
        let status = encode(&Outbound::Status(Status::Connected)).unwrap();
        assert_eq!(status, br#"{"status":"connected"}"#);
        let ok = encode(&Outbound::Status(Status::Ok)).unwrap();
        assert_eq!(ok, br#"{"status":"ok"}"#);
        let data = encode(&Outbound::Data(StateSnapshot::default())).unwrap();
        assert_eq!(data, br#"{"data":{"d":{"do":{},"di":{},"ai":{}}}}"#);
    }

    #[test]
    fn initial_value_combines_status_and_data() {
        let snap = StateSnapshot::default();
        let bytes = encode(&InitialValue {
            status: Status::Ready,
            data: &snap,
        })
        .unwrap();
        assert_eq!(bytes, br#"{"status":"ready","data":{"d":{"do":{},"di":{},"ai":{}}}}"#);
    }

    #[test]
    fn oversized_payload_is_refused() {
        let big = "x".repeat(MAX_PAYLOAD);
        assert_eq!(encode(&big), Err(NotifyError::PayloadTooLarge(MAX_PAYLOAD + 2)));
    }
}
