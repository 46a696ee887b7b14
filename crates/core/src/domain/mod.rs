pub mod buyer;
pub mod call;
pub mod campaign;
pub mod conversion;
pub mod number;
pub mod offer;

use serde::{Deserialize, Serialize};

/// Activation flag shared by campaigns, buyers and tracking numbers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityStatus {
    Active,
    Inactive,
}

impl ActivityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
        }
    }

    /// Anything other than `ACTIVE` is treated as inactive.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("active") {
            Self::Active
        } else {
            Self::Inactive
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

#[cfg(test)]
mod tests {
    use super::ActivityStatus;

    #[test]
    fn unknown_status_strings_are_inactive() {
        assert_eq!(ActivityStatus::parse("ACTIVE"), ActivityStatus::Active);
        assert_eq!(ActivityStatus::parse(" active "), ActivityStatus::Active);
        assert_eq!(ActivityStatus::parse("PAUSED"), ActivityStatus::Inactive);
    }
}
