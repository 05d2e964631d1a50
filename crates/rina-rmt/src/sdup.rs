//! SDU protection hooks.
//!
//! Invoked once per PDU per direction: `protect_outbound` right before a PDU
//! first reaches the transport, `unprotect_inbound` right after it arrives,
//! and `check_lifetime` when a PDU is relayed through this IPC process.

use crate::error::{Result, RmtError};
use crate::pdu::Pdu;
use rina_types::PortId;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU8, Ordering};
use tracing::{debug, info, warn};

/// Default hop budget stamped on outbound PDUs.
pub const DEFAULT_TTL: u8 = 64;

/// Per-PDU protection transforms.
pub trait SduProtection: Send + Sync {
    /// Transforms a PDU before it is written to `port`.
    fn protect_outbound(&self, port: PortId, pdu: &mut Pdu) -> Result<()>;

    /// Reverses the outbound transform for a PDU read from `port`.
    fn unprotect_inbound(&self, port: PortId, pdu: &mut Pdu) -> Result<()>;

    /// Consumes one unit of the PDU's lifetime. Returns false once expired.
    fn check_lifetime(&self, port: PortId, pdu: &mut Pdu) -> bool;

    /// Sets a named parameter.
    fn set_param(&self, name: &str, _value: &str) -> Result<()> {
        Err(RmtError::UnknownParameter {
            scope: "sdup".to_string(),
            name: name.to_string(),
        })
    }

    /// Current parameter values.
    fn params(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
}

/// Pass-through protection.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProtection;

impl SduProtection for NoProtection {
    fn protect_outbound(&self, _port: PortId, _pdu: &mut Pdu) -> Result<()> {
        Ok(())
    }

    fn unprotect_inbound(&self, _port: PortId, _pdu: &mut Pdu) -> Result<()> {
        Ok(())
    }

    fn check_lifetime(&self, _port: PortId, _pdu: &mut Pdu) -> bool {
        true
    }
}

/// Hop-count lifetime limit.
///
/// Outbound PDUs without a lifetime get `initial_ttl`; each relay hop takes
/// one off and a PDU reaching zero is expired. An `initial_ttl` of 0 turns
/// the limit off.
#[derive(Debug)]
pub struct LifetimeLimit {
    initial_ttl: AtomicU8,
}

impl LifetimeLimit {
    pub fn new(initial_ttl: u8) -> Self {
        if initial_ttl == 0 {
            warn!("LifetimeLimit: initial TTL is 0, lifetime limit disabled");
        }
        Self {
            initial_ttl: AtomicU8::new(initial_ttl),
        }
    }

    pub fn initial_ttl(&self) -> u8 {
        self.initial_ttl.load(Ordering::Relaxed)
    }
}

impl Default for LifetimeLimit {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl SduProtection for LifetimeLimit {
    fn protect_outbound(&self, _port: PortId, pdu: &mut Pdu) -> Result<()> {
        let ttl = self.initial_ttl();
        if ttl > 0 && pdu.lifetime.is_none() {
            pdu.lifetime = Some(ttl);
        }
        Ok(())
    }

    /// With the limit on, every PDU from a peer must carry a lifetime.
    fn unprotect_inbound(&self, port: PortId, pdu: &mut Pdu) -> Result<()> {
        if self.initial_ttl() > 0 && pdu.lifetime.is_none() {
            return Err(RmtError::protection(port, "PDU carries no lifetime"));
        }
        Ok(())
    }

    fn check_lifetime(&self, port: PortId, pdu: &mut Pdu) -> bool {
        if self.initial_ttl() == 0 {
            return true;
        }
        let Some(ttl) = pdu.lifetime else {
            return true;
        };

        let ttl = ttl.saturating_sub(1);
        if ttl == 0 {
            debug!(port = %port, pdu = pdu.id(), "LifetimeLimit: TTL expired");
            return false;
        }
        pdu.lifetime = Some(ttl);
        true
    }

    fn set_param(&self, name: &str, value: &str) -> Result<()> {
        match name {
            "initial_ttl" => {
                let ttl: u8 = value.trim().parse().map_err(|_| RmtError::InvalidParameter {
                    name: name.to_string(),
                    value: value.to_string(),
                })?;
                self.initial_ttl.store(ttl, Ordering::Relaxed);
                info!(initial_ttl = ttl, "LifetimeLimit: initial TTL updated");
                Ok(())
            }
            _ => {
                warn!(name, "LifetimeLimit: unknown parameter");
                Err(RmtError::UnknownParameter {
                    scope: "sdup".to_string(),
                    name: name.to_string(),
                })
            }
        }
    }

    fn params(&self) -> BTreeMap<String, String> {
        BTreeMap::from([("initial_ttl".to_string(), self.initial_ttl().to_string())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rina_types::{Address, CepId, QosId};

    fn pdu() -> Pdu {
        Pdu::data(Address::new(1), QosId::new(1), CepId::new(1), vec![0u8; 2])
    }

    #[test]
    fn test_stamps_initial_ttl_once() {
        let sdup = LifetimeLimit::default();
        let mut pdu = pdu();

        sdup.protect_outbound(PortId::new(1), &mut pdu).unwrap();
        assert_eq!(pdu.lifetime, Some(DEFAULT_TTL));

        pdu.lifetime = Some(3);
        sdup.protect_outbound(PortId::new(1), &mut pdu).unwrap();
        assert_eq!(pdu.lifetime, Some(3));
    }

    #[test]
    fn test_check_lifetime_expires_at_zero() {
        let sdup = LifetimeLimit::new(2);
        let mut pdu = pdu();
        sdup.protect_outbound(PortId::new(1), &mut pdu).unwrap();

        assert!(sdup.check_lifetime(PortId::new(1), &mut pdu));
        assert_eq!(pdu.lifetime, Some(1));
        assert!(!sdup.check_lifetime(PortId::new(1), &mut pdu));
    }

    #[test]
    fn test_inbound_requires_lifetime() {
        let sdup = LifetimeLimit::default();
        let mut bare = pdu();

        let err = sdup.unprotect_inbound(PortId::new(4), &mut bare).unwrap_err();
        assert!(matches!(err, RmtError::Protection { port, .. } if port == PortId::new(4)));
        assert!(LifetimeLimit::new(0).unprotect_inbound(PortId::new(4), &mut bare).is_ok());

        bare.lifetime = Some(5);
        assert!(sdup.unprotect_inbound(PortId::new(4), &mut bare).is_ok());
    }

    #[test]
    fn test_zero_ttl_disables() {
        let sdup = LifetimeLimit::new(0);
        let mut pdu = pdu();
        sdup.protect_outbound(PortId::new(1), &mut pdu).unwrap();
        assert_eq!(pdu.lifetime, None);

        pdu.lifetime = Some(1);
        assert!(sdup.check_lifetime(PortId::new(1), &mut pdu));
    }

    #[test]
    fn test_params() {
        let sdup = LifetimeLimit::default();
        sdup.set_param("initial_ttl", "8").unwrap();
        assert_eq!(sdup.initial_ttl(), 8);
        assert_eq!(sdup.params().get("initial_ttl").map(String::as_str), Some("8"));

        assert!(matches!(
            sdup.set_param("initial_ttl", "300"),
            Err(RmtError::InvalidParameter { .. })
        ));
        assert!(matches!(
            sdup.set_param("ttl", "3"),
            Err(RmtError::UnknownParameter { .. })
        ));
        assert!(NoProtection.set_param("anything", "1").is_err());
    }
}
