//! Order status.

use serde::{Deserialize, Serialize};

/// The status of an order.
///
/// Any status may be set from any other; there is no enforced lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// Order was placed and is waiting to be worked on.
    #[default]
    Pending,

    /// Order is being fulfilled.
    Processing,

    /// Order was delivered.
    Completed,

    /// Order was cancelled.
    Cancelled,
}

impl OrderStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [OrderStatus; 4] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Processing => "Processing",
            OrderStatus::Completed => "Completed",
            OrderStatus::Cancelled => "Cancelled",
        }
    }

    /// Resolves an optional caller-supplied status.
    ///
    /// Blank or unrecognised values fall back to `Pending`.
    pub fn parse_or_default(value: Option<&str>) -> OrderStatus {
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            None => OrderStatus::default(),
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(status = raw, "Unrecognised order status, using Pending");
                OrderStatus::default()
            }),
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown order status: {s}"))
    }
}
