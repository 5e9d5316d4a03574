use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use super::error::{ApiError, ApiResult, InvalidIdSnafu};

// Backend rows use integer primary keys; every wrapper serializes as the bare number.
macro_rules! define_api_id {
    ($name:ident, $id_type:literal) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// Parses a decimal id, ignoring surrounding whitespace.
            pub fn parse(raw: &str) -> ApiResult<Self> {
                let parsed = raw.trim().parse::<u64>().context(InvalidIdSnafu {
                    stage: "parse-api-id",
                    id_type: $id_type,
                    raw: raw.to_string(),
                })?;
                Ok(Self(parsed))
            }

            pub fn get(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(formatter, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self::new(value)
            }
        }

        impl FromStr for $name {
            type Err = ApiError;

            fn from_str(raw: &str) -> ApiResult<Self> {
                Self::parse(raw)
            }
        }
    };
}

define_api_id!(ConversationId, "conversation-id");
define_api_id!(MessageId, "message-id");
