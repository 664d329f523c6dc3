//! Admin registry boundary. Gates every parameter-mutation entry point.

use crate::types::TraderId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub trait AdminRegistry {
    fn is_admin(&self, identity: TraderId) -> bool;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminSet {
    admins: HashSet<TraderId>,
}

impl AdminSet {
    pub fn with(admins: impl IntoIterator<Item = TraderId>) -> Self {
        Self {
            admins: admins.into_iter().collect(),
        }
    }
}

impl AdminRegistry for AdminSet {
    fn is_admin(&self, identity: TraderId) -> bool {
        self.admins.contains(&identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership() {
        let set = AdminSet::with([TraderId(1)]);
        assert!(set.is_admin(TraderId(1)));
        assert!(!set.is_admin(TraderId(2)));
    }
}
