//! PDU type codes of the data transfer protocol.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Type of a PDU as encoded in the PCI.
///
/// Management PDUs carry layer-management traffic; data and the control
/// subtypes belong to a connection and are demultiplexed by CEP id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum PduType {
    /// Layer management PDU.
    Management = 0x40,
    /// Data transfer PDU.
    Data = 0x80,
    /// Control ack.
    ControlAck = 0xC0,
    /// Positive ack.
    Ack = 0xC1,
    /// Negative ack.
    Nack = 0xC2,
    /// Flow control only.
    FlowControl = 0xC4,
    /// Ack and flow control.
    AckAndFlowControl = 0xC5,
    /// Nack and flow control.
    NackAndFlowControl = 0xC6,
    /// Selective ack.
    SelectiveAck = 0xC9,
    /// Selective nack.
    SelectiveNack = 0xCA,
    /// Selective ack and flow control.
    SelectiveAckAndFlowControl = 0xCD,
    /// Selective nack and flow control.
    SelectiveNackAndFlowControl = 0xCE,
    /// Rendezvous, sent while the peer window is closed.
    Rendezvous = 0xCF,
}

impl PduType {
    /// Returns the wire code.
    pub const fn code(&self) -> u8 {
        *self as u8
    }

    /// Returns true for management PDUs.
    pub const fn is_management(&self) -> bool {
        matches!(self, PduType::Management)
    }

    /// Returns true for PDUs that are delivered to a connection endpoint.
    pub const fn is_connection(&self) -> bool {
        !self.is_management()
    }

    /// Returns true for the control subtypes (anything but data/management).
    pub const fn is_control(&self) -> bool {
        (*self as u8) & 0xC0 == 0xC0
    }

    fn name(&self) -> &'static str {
        match self {
            PduType::Management => "mgmt",
            PduType::Data => "dt",
            PduType::ControlAck => "cack",
            PduType::Ack => "ack",
            PduType::Nack => "nack",
            PduType::FlowControl => "fc",
            PduType::AckAndFlowControl => "ack_fc",
            PduType::NackAndFlowControl => "nack_fc",
            PduType::SelectiveAck => "sack",
            PduType::SelectiveNack => "snack",
            PduType::SelectiveAckAndFlowControl => "sack_fc",
            PduType::SelectiveNackAndFlowControl => "snack_fc",
            PduType::Rendezvous => "rendezvous",
        }
    }

    const ALL: [PduType; 13] = [
        PduType::Management,
        PduType::Data,
        PduType::ControlAck,
        PduType::Ack,
        PduType::Nack,
        PduType::FlowControl,
        PduType::AckAndFlowControl,
        PduType::NackAndFlowControl,
        PduType::SelectiveAck,
        PduType::SelectiveNack,
        PduType::SelectiveAckAndFlowControl,
        PduType::SelectiveNackAndFlowControl,
        PduType::Rendezvous,
    ];
}

impl TryFrom<u8> for PduType {
    type Error = ParseError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        PduType::ALL
            .iter()
            .copied()
            .find(|t| t.code() == code)
            .ok_or(ParseError::InvalidPduType(code))
    }
}

impl From<PduType> for u8 {
    fn from(t: PduType) -> u8 {
        t.code()
    }
}

impl fmt::Display for PduType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for PduType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        PduType::ALL
            .iter()
            .copied()
            .find(|t| t.name() == lower)
            .ok_or_else(|| ParseError::UnknownPduTypeName(s.to_string()))
    }
}
