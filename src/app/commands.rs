//! Command processor — decode, validate, apply, reply.
//!
//! Runs only while a client is connected (the connection state machine
//! gates it).  Side effects are confined to the pin registry and the
//! indicator; the connection handle is never touched here.
//!
//! | Input                        | Replies                              |
//! |------------------------------|--------------------------------------|
//! | `read`                       | `{"data":..}`                        |
//! | `set` on a digital output    | `{"status":"ok"}`, `{"data":..}`     |
//! | `set` on anything else       | none (or `{"status":"error"}`)       |
//! | undecodable / unknown action | none (or `{"status":"error"}`)       |

use log::{debug, info, warn};

use crate::error::{DecodeError, Error, PinError};

use super::ports::{IndicatorPort, PinBackend};
use super::protocol::{self, Command, Outbound, Status};
use super::registry::PinRegistry;

/// Replies to one command, in send order.
pub type Replies = heapless::Vec<Outbound, 2>;

/// What a processed command did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Read,
    Set,
}

#[derive(Debug)]
pub struct Outcome {
    pub result: Result<Applied, Error>,
    pub replies: Replies,
}

pub struct CommandProcessor {
    error_replies: bool,
}

impl CommandProcessor {
    /// `error_replies` turns the silent discard of bad commands into a
    /// `{"status":"error"}` reply.
    pub fn new(error_replies: bool) -> Self {
        Self { error_replies }
    }

    pub fn process<B: PinBackend>(
        &self,
        raw: &[u8],
        registry: &mut PinRegistry<B>,
        indicator: &mut impl IndicatorPort,
    ) -> Outcome {
        let result = match protocol::decode(raw) {
            Ok(cmd) => self.apply(cmd, registry, indicator),
            Err(e) => {
                match e {
                    DecodeError::UnknownAction => debug!("CMD: ignoring unknown action"),
                    _ => warn!("CMD: discarding {} byte payload: {}", raw.len(), e),
                }
                Err(Error::Decode(e))
            }
        };

        let mut replies = Replies::new();
        match &result {
            Ok(Applied::Read) => {
                let _ = replies.push(Outbound::Data(registry.snapshot()));
            }
            Ok(Applied::Set) => {
                let _ = replies.push(Outbound::Status(Status::Ok));
                let _ = replies.push(Outbound::Data(registry.snapshot()));
            }
            Err(_) if self.error_replies => {
                let _ = replies.push(Outbound::Status(Status::Error));
            }
            Err(_) => {}
        }
        Outcome { result, replies }
    }

    fn apply<B: PinBackend>(
        &self,
        cmd: Command,
        registry: &mut PinRegistry<B>,
        indicator: &mut impl IndicatorPort,
    ) -> Result<Applied, Error> {
        match cmd {
            Command::Read => Ok(Applied::Read),
            Command::Set {
                category,
                pin,
                high,
            } => match registry.write(category, &pin, high) {
                Ok(()) => {
                    indicator.set(high);
                    info!("CMD: {}.{} <- {}", category.wire_key(), pin, u8::from(high));
                    Ok(Applied::Set)
                }
                Err(PinError::UnknownPin) => {
                    debug!("CMD: {}.{} is not a writable pin", category.wire_key(), pin);
                    Err(Error::Pin(PinError::UnknownPin))
                }
                Err(e) => {
                    warn!("CMD: write {}.{} failed: {}", category.wire_key(), pin, e);
                    Err(Error::Pin(e))
                }
            },
        }
    }
}
