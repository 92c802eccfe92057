//! Status enums for various entities.

use serde::{Deserialize, Serialize};

/// Lifecycle state of an order.
///
/// Only `Completed` and `Refunded` are *settled*: they are the outcome of a
/// finished payment. `Pending` and `Failed` never affect entitlement.
///
/// Stored as lowercase text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl OrderStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [Self; 4] = [Self::Pending, Self::Completed, Self::Failed, Self::Refunded];

    /// Whether this status is the result of a finished payment.
    #[must_use]
    pub const fn is_settled(self) -> bool {
        matches!(self, Self::Completed | Self::Refunded)
    }

    /// Whether an order in this status grants access to its product.
    #[must_use]
    pub const fn grants_access(self) -> bool {
        matches!(self, Self::Completed)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "refunded" => Ok(Self::Refunded),
            _ => Err(format!("invalid order status: {s}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_settled_statuses() {
        assert!(OrderStatus::Completed.is_settled());
        assert!(OrderStatus::Refunded.is_settled());
        assert!(!OrderStatus::Pending.is_settled());
        assert!(!OrderStatus::Failed.is_settled());
    }

    #[test]
    fn test_only_completed_grants_access() {
        let granting: Vec<_> = OrderStatus::ALL
            .into_iter()
            .filter(|s| s.grants_access())
            .collect();
        assert_eq!(granting, vec![OrderStatus::Completed]);
    }

    #[test]
    fn test_display_parse_roundtrip() {
        for status in OrderStatus::ALL {
            assert_eq!(status.to_string().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("COMPLETED".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::Refunded).unwrap(),
            "\"refunded\""
        );
        let parsed: OrderStatus = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(parsed, OrderStatus::Failed);
    }
}
