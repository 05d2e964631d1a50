//! Common RINA types for the relaying and multiplexing layer.
//!
//! This crate provides type-safe representations of the identifiers that
//! flow through an IPC process data path:
//!
//! - [`Address`]: IPC process address within a DIF
//! - [`QosId`]: QoS cube identifier carried in the PCI
//! - [`PortId`]: N-1 flow port identifier
//! - [`CepId`]: connection endpoint identifier
//! - [`PduType`]: PDU type codes of the data transfer protocol

mod ids;
mod pdu_type;

pub use ids::{Address, CepId, PortId, QosId};
pub use pdu_type::PduType;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid QoS id: {0}")]
    InvalidQosId(String),

    #[error("invalid port id: {0}")]
    InvalidPortId(String),

    #[error("invalid CEP id: {0}")]
    InvalidCepId(String),

    #[error("invalid PDU type: {0:#04x}")]
    InvalidPduType(u8),

    #[error("unknown PDU type name: {0}")]
    UnknownPduTypeName(String),
}
