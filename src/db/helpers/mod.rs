use anyhow::{anyhow, Result};

use crate::posture::PostureStatus;

pub fn to_u64(value: i64, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("{field} contains negative value {value}"))
}

pub fn parse_status(value: &str) -> Result<PostureStatus> {
    value.parse()
}

pub fn bool_to_sql(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_negative_counts() {
        assert!(to_u64(-1, "total").is_err());
        assert_eq!(to_u64(42, "total").unwrap(), 42);
    }

    #[test]
    fn unknown_status_is_an_error() {
        assert_eq!(parse_status("Good").unwrap(), PostureStatus::Good);
        assert!(parse_status("").is_err());
    }
}
