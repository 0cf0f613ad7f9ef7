use std::io::{Read, Write};

use crate::protocol::{
    api_key::ApiKey,
    api_version::{ApiVersion, ApiVersionRange},
    error::Error as ApiError,
    primitives::{Int16, Int32},
    traits::ReadType,
};

use super::{
    ReadVersionedError, ReadVersionedType, RequestBody, WriteVersionedError, WriteVersionedType,
    read_versioned_array,
};

/// Issued once after connect to learn the version ranges the broker speaks.
///
/// Versions 0-2 carry no request fields at all; the client deliberately stays
/// below version 3 (the first flexible version) so that a single header
/// layout serves every supported API.
#[derive(Debug, Default)]
pub struct ApiVersionsRequest {}

impl<W> WriteVersionedType<W> for ApiVersionsRequest
where
    W: Write,
{
    fn write_versioned(
        &self,
        _writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        match version.0.0 {
            0..=2 => Ok(()),
            _ => Err(WriteVersionedError::InvalidVersion { version }),
        }
    }
}

impl RequestBody for ApiVersionsRequest {
    type ResponseBody = ApiVersionsResponse;
    const API_KEY: ApiKey = ApiKey::ApiVersions;
    const API_VERSION_RANGE: ApiVersionRange =
        ApiVersionRange::new(ApiVersion(Int16(0)), ApiVersion(Int16(2)));
}

#[derive(Debug, PartialEq, Eq)]
pub struct ApiVersionsResponseApiKey {
    /// The API index.
    pub api_key: ApiKey,

    /// The minimum supported version, inclusive.
    pub min_version: ApiVersion,

    /// The maximum supported version, inclusive.
    pub max_version: ApiVersion,
}

impl<R> ReadVersionedType<R> for ApiVersionsResponseApiKey
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        match version.0.0 {
            0..=2 => Ok(Self {
                api_key: Int16::read(reader)?.into(),
                min_version: ApiVersion(Int16::read(reader)?),
                max_version: ApiVersion(Int16::read(reader)?),
            }),
            _ => Err(ReadVersionedError::InvalidVersion { version }),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ApiVersionsResponse {
    /// The top-level error code.
    pub error_code: Option<ApiError>,

    /// The APIs supported by the broker.
    pub api_keys: Vec<ApiVersionsResponseApiKey>,

    /// The duration in milliseconds for which the request was throttled due
    /// to a quota violation, or zero if the request did not violate any quota.
    ///
    /// Added in version 1.
    pub throttle_time_ms: Option<Int32>,
}

impl<R> ReadVersionedType<R> for ApiVersionsResponse
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0.0;
        if !(0..=2).contains(&v) {
            return Err(ReadVersionedError::InvalidVersion { version });
        }

        let error_code = ApiError::new(Int16::read(reader)?.0);
        let api_keys = read_versioned_array(reader, version)?.unwrap_or_default();
        let throttle_time_ms = (v >= 1).then(|| Int32::read(reader)).transpose()?;

        Ok(Self {
            error_code,
            api_keys,
            throttle_time_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use crate::protocol::traits::WriteType;

    use super::*;

    #[test]
    fn test_request_has_no_body() {
        for v in 0..=2 {
            let mut buf = vec![];
            ApiVersionsRequest::default()
                .write_versioned(&mut buf, ApiVersion(Int16(v)))
                .unwrap();
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn test_request_rejects_unsupported_version() {
        let mut buf = vec![];
        let err = ApiVersionsRequest::default()
            .write_versioned(&mut buf, ApiVersion(Int16(3)))
            .unwrap_err();
        assert!(matches!(err, WriteVersionedError::InvalidVersion { .. }));
    }

    #[test]
    fn test_response_decode() {
        // error_code=0, one entry (Produce 3..7), throttle 100ms
        let mut buf = vec![];
        Int16(0).write(&mut buf).unwrap();
        Int32(1).write(&mut buf).unwrap();
        Int16(0).write(&mut buf).unwrap();
        Int16(3).write(&mut buf).unwrap();
        Int16(7).write(&mut buf).unwrap();
        Int32(100).write(&mut buf).unwrap();

        let resp =
            ApiVersionsResponse::read_versioned(&mut Cursor::new(buf), ApiVersion(Int16(1)))
                .unwrap();
        assert_eq!(
            resp,
            ApiVersionsResponse {
                error_code: None,
                api_keys: vec![ApiVersionsResponseApiKey {
                    api_key: ApiKey::Produce,
                    min_version: ApiVersion(Int16(3)),
                    max_version: ApiVersion(Int16(7)),
                }],
                throttle_time_ms: Some(Int32(100)),
            }
        );
    }
}
