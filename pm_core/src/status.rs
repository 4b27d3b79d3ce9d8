//! ABOUTME: Lifecycle enums for marketplace entities and their allowed transitions
//! ABOUTME: Database spelling is upper snake case; roles are lowercase

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Implements `as_str`, `Display` and `FromStr` for a fieldless enum
macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                match s.trim().to_ascii_uppercase().as_str() {
                    $(t if t == $text.to_ascii_uppercase() => Ok($name::$variant),)+
                    _ => Err(Error::Validation(format!(
                        "Unknown {} '{}'",
                        stringify!($name),
                        s
                    ))),
                }
            }
        }
    };
}

/// Order lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Cancelled,
    Refunded,
}

string_enum!(OrderStatus {
    Pending => "PENDING",
    Processing => "PROCESSING",
    Completed => "COMPLETED",
    Cancelled => "CANCELLED",
    Refunded => "REFUNDED",
});

impl OrderStatus {
    /// States reachable in one step from `self`
    pub fn next_states(&self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::Pending => &[OrderStatus::Processing, OrderStatus::Cancelled],
            OrderStatus::Processing => &[OrderStatus::Completed, OrderStatus::Cancelled],
            OrderStatus::Completed => &[OrderStatus::Refunded],
            OrderStatus::Cancelled | OrderStatus::Refunded => &[],
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        self.next_states().contains(&next)
    }

    /// Check a transition, producing the error the API reports on refusal
    pub fn ensure_transition(&self, next: OrderStatus) -> Result<()> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(Error::InvalidState(format!(
                "Order cannot move from {} to {}",
                self, next
            )))
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.next_states().is_empty()
    }
}

/// Product listing lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductStatus {
    PendingReview,
    Published,
    Rejected,
    Archived,
}

string_enum!(ProductStatus {
    PendingReview => "PENDING_REVIEW",
    Published => "PUBLISHED",
    Rejected => "REJECTED",
    Archived => "ARCHIVED",
});

impl ProductStatus {
    /// Moderation decisions only apply to listings waiting for review
    pub fn is_moderatable(&self) -> bool {
        matches!(self, ProductStatus::PendingReview)
    }

    /// Sellers may edit anything that is not archived
    pub fn is_editable(&self) -> bool {
        !matches!(self, ProductStatus::Archived)
    }
}

/// Review moderation lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
}

string_enum!(ReviewStatus {
    Pending => "PENDING",
    Approved => "APPROVED",
    Rejected => "REJECTED",
});

/// Invoice lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Issued,
    Void,
}

string_enum!(InvoiceStatus {
    Issued => "ISSUED",
    Void => "VOID",
});

/// Payout lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayoutStatus {
    Pending,
    Processing,
    Paid,
    Failed,
}

string_enum!(PayoutStatus {
    Pending => "PENDING",
    Processing => "PROCESSING",
    Paid => "PAID",
    Failed => "FAILED",
});

impl PayoutStatus {
    /// Payouts that still reserve part of the seller balance
    pub fn reserves_balance(&self) -> bool {
        !matches!(self, PayoutStatus::Failed)
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self, PayoutStatus::Pending | PayoutStatus::Processing)
    }
}

/// User roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Buyer,
    Seller,
    Admin,
}

string_enum!(Role {
    Buyer => "buyer",
    Seller => "seller",
    Admin => "admin",
});
