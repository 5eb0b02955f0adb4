//! Weighted choice between request kinds.

use exchange_types::RequestKind;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Relative weights of the two request kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMix {
    #[serde(default)]
    pub create: u32,
    #[serde(default)]
    pub transaction: u32,
}

impl Default for RequestMix {
    fn default() -> Self {
        Self {
            create: 1,
            transaction: 3,
        }
    }
}

impl RequestMix {
    pub fn new(create: u32, transaction: u32) -> Self {
        Self {
            create,
            transaction,
        }
    }

    pub fn total(&self) -> u64 {
        u64::from(self.create) + u64::from(self.transaction)
    }

    /// Pick a kind with probability proportional to its weight.
    /// A mix with both weights at zero only issues transactions.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> RequestKind {
        let total = self.total();
        if total == 0 {
            return RequestKind::Transaction;
        }
        if rng.gen_range(0..total) < u64::from(self.create) {
            RequestKind::Create
        } else {
            RequestKind::Transaction
        }
    }
}

impl std::fmt::Display for RequestMix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "create:transaction = {}:{}", self.create, self.transaction)
    }
}

impl std::str::FromStr for RequestMix {
    type Err = String;

    /// Parse `"1:3"` as create:transaction weights.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (create, transaction) = s
            .split_once(':')
            .ok_or_else(|| format!("Invalid request mix '{s}', expected CREATE:TRANSACTION"))?;
        let create = create
            .trim()
            .parse()
            .map_err(|e| format!("Invalid create weight '{create}': {e}"))?;
        let transaction = transaction
            .trim()
            .parse()
            .map_err(|e| format!("Invalid transaction weight '{transaction}': {e}"))?;
        Ok(Self::new(create, transaction))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_single_kind_mixes() {
        let mut rng = StdRng::seed_from_u64(42);
        let create_only = RequestMix::new(1, 0);
        let tx_only = RequestMix::new(0, 5);

        for _ in 0..100 {
            assert_eq!(create_only.pick(&mut rng), RequestKind::Create);
            assert_eq!(tx_only.pick(&mut rng), RequestKind::Transaction);
        }
    }

    #[test]
    fn test_default_mix_is_roughly_one_to_three() {
        let mut rng = StdRng::seed_from_u64(42);
        let mix = RequestMix::default();

        let creates = (0..4000)
            .filter(|_| mix.pick(&mut rng) == RequestKind::Create)
            .count();
        assert!((800..1200).contains(&creates), "creates = {creates}");
    }

    #[test]
    fn test_parse_mix() {
        assert_eq!("1:3".parse::<RequestMix>(), Ok(RequestMix::new(1, 3)));
        assert_eq!(" 2 : 0 ".parse::<RequestMix>(), Ok(RequestMix::new(2, 0)));
        assert!("13".parse::<RequestMix>().is_err());
        assert!("a:3".parse::<RequestMix>().is_err());
    }
}
