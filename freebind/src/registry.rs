use freebind_common::{AddressFamily, CidrRange};

/// Delimiters between ranges in the config value, runs of them produce no empty tokens.
const DELIMITERS: [char; 2] = [',', ' '];

/// The configured ranges, split by family into fixed arrays for O(1) random indexing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeRegistry {
    ipv4: Box<[CidrRange]>,
    ipv6: Box<[CidrRange]>,
}

impl RangeRegistry {
    /// Parse every token of `config`, silently skipping the malformed ones.
    pub fn from_config(config: &str) -> Self {
        let mut ipv4 = Vec::new();
        let mut ipv6 = Vec::new();

        for token in config.split(DELIMITERS).filter(|t| !t.is_empty()) {
            match CidrRange::parse(token) {
                Ok(range) => match range.family() {
                    AddressFamily::V4 => ipv4.push(range),
                    AddressFamily::V6 => ipv6.push(range),
                },
                Err(e) => {
                    tracing::warn!(?token, %e, "Ignoring malformed range");
                }
            }
        }

        Self {
            ipv4: ipv4.into_boxed_slice(),
            ipv6: ipv6.into_boxed_slice(),
        }
    }

    pub fn ranges(&self, family: AddressFamily) -> &[CidrRange] {
        match family {
            AddressFamily::V4 => &self.ipv4,
            AddressFamily::V6 => &self.ipv6,
        }
    }

    pub fn len(&self) -> usize {
        self.ipv4.len() + self.ipv6.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
