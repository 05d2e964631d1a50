//! Identifier newtypes carried in PCI headers and port bindings.
//!
//! Every identifier reserves its all-ones value as the "wrong" sentinel. The
//! sentinel is representable (a received header can carry it) but never valid.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident($repr:ty), $err:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name($repr);

        impl $name {
            /// Sentinel for an unset or invalid identifier.
            pub const WRONG: $name = $name(<$repr>::MAX);

            /// Creates an identifier from its raw value.
            pub const fn new(raw: $repr) -> Self {
                $name(raw)
            }

            /// Returns the raw value.
            pub const fn value(&self) -> $repr {
                self.0
            }

            /// Returns true unless this is the [`Self::WRONG`] sentinel.
            pub const fn is_valid(&self) -> bool {
                self.0 != <$repr>::MAX
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim()
                    .parse::<$repr>()
                    .map($name)
                    .map_err(|_| ParseError::$err(s.to_string()))
            }
        }

        impl From<$repr> for $name {
            fn from(raw: $repr) -> Self {
                $name(raw)
            }
        }

        impl From<$name> for $repr {
            fn from(id: $name) -> $repr {
                id.0
            }
        }
    };
}

id_newtype!(
    /// Address of an IPC process inside a DIF.
    ///
    /// Address `0` names the directly attached neighbour whose address is not
    /// yet known; PDUs sent to it are always handed to management.
    Address(u32),
    InvalidAddress
);

id_newtype!(
    /// QoS cube identifier. `0` acts as a wildcard in forwarding entries.
    QosId(u16),
    InvalidQosId
);

id_newtype!(
    /// Identifier of an N-1 flow (port) bound below the RMT.
    PortId(u32),
    InvalidPortId
);

id_newtype!(
    /// Connection endpoint identifier used to demultiplex local data PDUs.
    CepId(u32),
    InvalidCepId
);

impl Address {
    /// The unnamed-neighbour address.
    pub const NEIGHBOR: Address = Address(0);

    /// Returns true for the unnamed-neighbour address.
    pub const fn is_neighbor(&self) -> bool {
        self.0 == 0
    }
}

impl QosId {
    /// Wildcard QoS id: a forwarding entry with it matches any QoS.
    pub const ANY: QosId = QosId(0);

    /// Returns true for the wildcard QoS id.
    pub const fn is_any(&self) -> bool {
        self.0 == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_wrong_sentinels() {
        assert!(!Address::WRONG.is_valid());
        assert!(!QosId::WRONG.is_valid());
        assert!(!PortId::WRONG.is_valid());
        assert!(!CepId::WRONG.is_valid());
        assert!(Address::new(0).is_valid());
        assert!(PortId::new(7).is_valid());
    }

    #[test]
    fn test_parse() {
        let addr: Address = "16".parse().unwrap();
        assert_eq!(addr, Address::new(16));

        let qos: QosId = " 3 ".parse().unwrap();
        assert_eq!(qos.value(), 3);

        assert_eq!(
            "abc".parse::<PortId>(),
            Err(ParseError::InvalidPortId("abc".to_string()))
        );
        assert!("70000".parse::<QosId>().is_err());
    }

    #[test]
    fn test_special_values() {
        assert!(Address::NEIGHBOR.is_neighbor());
        assert!(!Address::new(5).is_neighbor());
        assert!(QosId::ANY.is_any());
        assert!(!QosId::new(1).is_any());
    }

    #[test]
    fn test_display_and_ordering() {
        assert_eq!(PortId::new(42).to_string(), "42");
        assert!(Address::new(1) < Address::new(2));
    }
}
