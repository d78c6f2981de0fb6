use serde::{Deserialize, Serialize};

/// Account credit split as reported by the commerce endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditBalance {
    pub gift_credit: i64,
    pub purchase_credit: i64,
    pub vip_credit: i64,
    pub total_credit: i64,
}

impl CreditBalance {
    pub fn from_parts(gift_credit: i64, purchase_credit: i64, vip_credit: i64) -> Self {
        Self {
            gift_credit,
            purchase_credit,
            vip_credit,
            total_credit: gift_credit + purchase_credit + vip_credit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CreditBalance;

    #[test]
    fn total_is_the_sum_of_parts() {
        let balance = CreditBalance::from_parts(66, 10, 0);
        assert_eq!(balance.total_credit, 76);
    }
}
