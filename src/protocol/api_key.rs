//! ApiKey to tag request types.
//!
//! Only the APIs this client issues get a named variant; everything else a
//! broker may advertise round-trips through [`ApiKey::Unknown`].
//!
//! # References
//! - <https://kafka.apache.org/protocol#protocol_api_keys>

use super::primitives::Int16;

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub enum ApiKey {
    Produce,
    Metadata,
    ApiVersions,
    CreateTopics,
    DeleteTopics,
    Unknown(Int16),
}

impl From<Int16> for ApiKey {
    fn from(key: Int16) -> Self {
        match key.0 {
            0 => Self::Produce,
            3 => Self::Metadata,
            18 => Self::ApiVersions,
            19 => Self::CreateTopics,
            20 => Self::DeleteTopics,
            _ => Self::Unknown(key),
        }
    }
}

impl From<ApiKey> for Int16 {
    fn from(key: ApiKey) -> Self {
        match key {
            ApiKey::Produce => Self(0),
            ApiKey::Metadata => Self(3),
            ApiKey::ApiVersions => Self(18),
            ApiKey::CreateTopics => Self(19),
            ApiKey::DeleteTopics => Self(20),
            ApiKey::Unknown(code) => code,
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    proptest! {
        #[test]
        fn test_roundtrip_int16(code: Int16) {
            let api_key = ApiKey::from(code);
            let code2 = Int16::from(api_key);
            assert_eq!(code, code2);
        }

        #[test]
        fn test_roundtrip_api_key(key: ApiKey) {
            let key = match key {
                // Ensure key is actually unknown
                ApiKey::Unknown(x) => ApiKey::from(x),
                _ => key,
            };

            let code = Int16::from(key);
            let key2 = ApiKey::from(code);
            assert_eq!(key, key2);
        }
    }
}
