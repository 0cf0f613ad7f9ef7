use std::io::{Read, Write};

use crate::protocol::{
    api_key::ApiKey,
    api_version::{ApiVersion, ApiVersionRange},
    error::Error as ApiError,
    primitives::{Array, Int16, Int32, String_},
    traits::{ReadType, WriteType},
};

use super::{
    ReadVersionedError, ReadVersionedType, RequestBody, WriteVersionedError, WriteVersionedType,
    read_versioned_array,
};

#[derive(Debug)]
pub struct DeleteTopicsRequest {
    /// The names of the topics to delete.
    pub topic_names: Array<String_>,

    /// The length of time in milliseconds to wait for the deletions to
    /// complete.
    pub timeout_ms: Int32,
}

impl RequestBody for DeleteTopicsRequest {
    type ResponseBody = DeleteTopicsResponse;

    const API_KEY: ApiKey = ApiKey::DeleteTopics;

    /// Version 4 switches to the flexible encoding, which we do not speak.
    const API_VERSION_RANGE: ApiVersionRange =
        ApiVersionRange::new(ApiVersion(Int16(0)), ApiVersion(Int16(3)));
}

impl<W> WriteVersionedType<W> for DeleteTopicsRequest
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        if !(0..=3).contains(&version.0.0) {
            return Err(WriteVersionedError::InvalidVersion { version });
        }

        self.topic_names.write(writer)?;
        self.timeout_ms.write(writer)?;

        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct DeleteTopicsResponse {
    /// The duration in milliseconds for which the request was throttled due
    /// to a quota violation, or zero if the request did not violate any
    /// quota.
    ///
    /// Added in version 1.
    pub throttle_time_ms: Option<Int32>,

    /// The results for each topic we tried to delete.
    pub responses: Vec<DeleteTopicsResponseTopic>,
}

impl<R> ReadVersionedType<R> for DeleteTopicsResponse
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0.0;
        if !(0..=3).contains(&v) {
            return Err(ReadVersionedError::InvalidVersion { version });
        }

        let throttle_time_ms = (v >= 1).then(|| Int32::read(reader)).transpose()?;
        let responses = read_versioned_array(reader, version)?.unwrap_or_default();

        Ok(Self {
            throttle_time_ms,
            responses,
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct DeleteTopicsResponseTopic {
    /// The topic name.
    pub name: String_,

    /// The error, or None if the deletion succeeded.
    pub error: Option<ApiError>,
}

impl<R> ReadVersionedType<R> for DeleteTopicsResponseTopic
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        if !(0..=3).contains(&version.0.0) {
            return Err(ReadVersionedError::InvalidVersion { version });
        }

        Ok(Self {
            name: String_::read(reader)?,
            error: ApiError::new(Int16::read(reader)?.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_request_encoding() {
        let request = DeleteTopicsRequest {
            topic_names: Array(Some(vec![String_("t1".to_owned())])),
            timeout_ms: Int32(5_000),
        };

        let mut buf = vec![];
        request
            .write_versioned(&mut buf, ApiVersion(Int16(1)))
            .unwrap();

        let mut expected = vec![];
        Int32(1).write(&mut expected).unwrap();
        String_("t1".to_owned()).write(&mut expected).unwrap();
        Int32(5_000).write(&mut expected).unwrap();
        assert_eq!(buf, expected);
    }

    #[test]
    fn test_response_partial_failure() {
        // deleting [known, unknown] reports per-topic outcomes
        let mut buf = vec![];
        Int32(0).write(&mut buf).unwrap(); // throttle_time_ms
        Int32(2).write(&mut buf).unwrap();
        String_("known".to_owned()).write(&mut buf).unwrap();
        Int16(0).write(&mut buf).unwrap();
        String_("unknown".to_owned()).write(&mut buf).unwrap();
        Int16(3).write(&mut buf).unwrap();

        let resp =
            DeleteTopicsResponse::read_versioned(&mut Cursor::new(buf), ApiVersion(Int16(1)))
                .unwrap();

        assert_eq!(resp.throttle_time_ms, Some(Int32(0)));
        assert_eq!(resp.responses.len(), 2);
        assert_eq!(resp.responses[0].error, None);
        assert_eq!(
            resp.responses[1].error,
            Some(ApiError::UnknownTopicOrPartition)
        );
    }
}
