//! Order status lifecycle and its transition table.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use workshop_core::DomainError;

/// Service-order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Open,
    InProgress,
    WaitingParts,
    WaitingApproval,
    Completed,
    Canceled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Open,
        OrderStatus::InProgress,
        OrderStatus::WaitingParts,
        OrderStatus::WaitingApproval,
        OrderStatus::Completed,
        OrderStatus::Canceled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Open => "open",
            OrderStatus::InProgress => "in_progress",
            OrderStatus::WaitingParts => "waiting_parts",
            OrderStatus::WaitingApproval => "waiting_approval",
            OrderStatus::Completed => "completed",
            OrderStatus::Canceled => "canceled",
        }
    }

    /// Statuses reachable from `self` in one step.
    ///
    /// This table is the whole policy: any pair not listed here is rejected,
    /// including a status to itself.
    pub fn allowed_targets(self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Open => &[InProgress, WaitingApproval, Canceled],
            InProgress => &[Completed, WaitingParts, Open],
            WaitingParts => &[InProgress, Canceled],
            WaitingApproval => &[InProgress, Canceled],
            Completed => &[InProgress],
            Canceled => &[Open],
        }
    }

    pub fn can_transition_to(self, target: OrderStatus) -> bool {
        self.allowed_targets().contains(&target)
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown order status '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_status_lists_itself_as_a_target() {
        for status in OrderStatus::ALL {
            assert!(!status.can_transition_to(status), "{status} -> {status}");
        }
    }

    #[test]
    fn closed_statuses_have_exactly_one_reopening_edge() {
        assert_eq!(OrderStatus::Completed.allowed_targets(), &[OrderStatus::InProgress]);
        assert_eq!(OrderStatus::Canceled.allowed_targets(), &[OrderStatus::Open]);
    }

    #[test]
    fn waiting_parts_cannot_complete_directly() {
        assert!(!OrderStatus::WaitingParts.can_transition_to(OrderStatus::Completed));
    }

    #[test]
    fn parsing_matches_wire_names_and_rejects_unknown_values() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
        assert!("done".parse::<OrderStatus>().is_err());
        assert!("cancelled".parse::<OrderStatus>().is_err());
        assert!(serde_json::from_str::<OrderStatus>("\"archived\"").is_err());
    }
}
