use std::io::{Read, Write};

use crate::protocol::{
    api_key::ApiKey,
    api_version::{ApiVersion, ApiVersionRange},
    error::Error as ApiError,
    primitives::{Int16, Int32, Int64, NullableString, Records, String_},
    traits::{ReadType, WriteType},
};

use super::{
    ReadVersionedError, ReadVersionedType, RequestBody, WriteVersionedError, WriteVersionedType,
    read_versioned_array, write_versioned_array,
};

#[derive(Debug)]
pub struct ProduceRequestPartitionData {
    /// The partition index.
    pub index: Int32,

    /// The record data to be produced.
    pub records: Records,
}

impl<W> WriteVersionedType<W> for ProduceRequestPartitionData
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        if !(3..=7).contains(&version.0.0) {
            return Err(WriteVersionedError::InvalidVersion { version });
        }

        self.index.write(writer)?;
        self.records.write(writer)?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct ProduceRequestTopicData {
    /// The topic name.
    pub name: String_,

    /// Each partition to produce to.
    pub partition_data: Vec<ProduceRequestPartitionData>,
}

impl<W> WriteVersionedType<W> for ProduceRequestTopicData
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        if !(3..=7).contains(&version.0.0) {
            return Err(WriteVersionedError::InvalidVersion { version });
        }

        self.name.write(writer)?;
        write_versioned_array(writer, version, Some(&self.partition_data))?;

        Ok(())
    }
}

#[derive(Debug)]
pub struct ProduceRequest {
    /// The transactional ID, or null if the producer is not transactional.
    ///
    /// Added in version 3. Always null for this client.
    pub transactional_id: NullableString,

    /// The number of acknowledgments the producer requires the leader to have
    /// received before considering a request complete.
    ///
    /// Allowed values: 0 for no acknowledgments, 1 for only the leader and -1
    /// for the full ISR.
    pub acks: Int16,

    /// The timeout to await a response in milliseconds.
    pub timeout_ms: Int32,

    /// Each topic to produce to.
    pub topic_data: Vec<ProduceRequestTopicData>,
}

impl<W> WriteVersionedType<W> for ProduceRequest
where
    W: Write,
{
    fn write_versioned(
        &self,
        writer: &mut W,
        version: ApiVersion,
    ) -> Result<(), WriteVersionedError> {
        if !(3..=7).contains(&version.0.0) {
            return Err(WriteVersionedError::InvalidVersion { version });
        }

        self.transactional_id.write(writer)?;
        self.acks.write(writer)?;
        self.timeout_ms.write(writer)?;
        write_versioned_array(writer, version, Some(&self.topic_data))?;

        Ok(())
    }
}

impl RequestBody for ProduceRequest {
    type ResponseBody = ProduceResponse;

    const API_KEY: ApiKey = ApiKey::Produce;

    /// Versions prior to 3 predate message format version 2 ([KIP-98]) and
    /// are not supported.
    ///
    /// [KIP-98]: https://cwiki.apache.org/confluence/display/KAFKA/KIP-98+-+Exactly+Once+Delivery+and+Transactional+Messaging
    const API_VERSION_RANGE: ApiVersionRange =
        ApiVersionRange::new(ApiVersion(Int16(3)), ApiVersion(Int16(7)));
}

#[derive(Debug, PartialEq, Eq)]
pub struct ProduceResponsePartitionResponse {
    /// The partition index.
    pub index: Int32,

    /// The error, or None if the partition write succeeded.
    pub error: Option<ApiError>,

    /// The base offset.
    pub base_offset: Int64,

    /// The timestamp returned by broker after appending the messages.
    ///
    /// If CreateTime is used for the topic, the timestamp will be -1. If
    /// LogAppendTime is used for the topic, the timestamp will be the broker
    /// local time when the messages are appended.
    ///
    /// Added in version 2.
    pub log_append_time_ms: Option<Int64>,

    /// The log start offset.
    ///
    /// Added in version 5.
    pub log_start_offset: Option<Int64>,
}

impl<R> ReadVersionedType<R> for ProduceResponsePartitionResponse
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        let v = version.0.0;
        if !(3..=7).contains(&v) {
            return Err(ReadVersionedError::InvalidVersion { version });
        }

        Ok(Self {
            index: Int32::read(reader)?,
            error: ApiError::new(Int16::read(reader)?.0),
            base_offset: Int64::read(reader)?,
            log_append_time_ms: Some(Int64::read(reader)?),
            log_start_offset: (v >= 5).then(|| Int64::read(reader)).transpose()?,
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ProduceResponseTopicResponse {
    /// The topic name.
    pub name: String_,

    /// Each partition that we produced to within the topic.
    pub partition_responses: Vec<ProduceResponsePartitionResponse>,
}

impl<R> ReadVersionedType<R> for ProduceResponseTopicResponse
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        if !(3..=7).contains(&version.0.0) {
            return Err(ReadVersionedError::InvalidVersion { version });
        }

        Ok(Self {
            name: String_::read(reader)?,
            partition_responses: read_versioned_array(reader, version)?.unwrap_or_default(),
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ProduceResponse {
    /// Each produce response.
    pub responses: Vec<ProduceResponseTopicResponse>,

    /// The duration in milliseconds for which the request was throttled due
    /// to a quota violation, or zero if the request did not violate any
    /// quota.
    ///
    /// Added in version 1.
    pub throttle_time_ms: Int32,
}

impl<R> ReadVersionedType<R> for ProduceResponse
where
    R: Read,
{
    fn read_versioned(reader: &mut R, version: ApiVersion) -> Result<Self, ReadVersionedError> {
        if !(3..=7).contains(&version.0.0) {
            return Err(ReadVersionedError::InvalidVersion { version });
        }

        Ok(Self {
            responses: read_versioned_array(reader, version)?.unwrap_or_default(),
            throttle_time_ms: Int32::read(reader)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_request_encoding_v3() {
        let request = ProduceRequest {
            transactional_id: NullableString(None),
            acks: Int16(-1),
            timeout_ms: Int32(1_500),
            topic_data: vec![ProduceRequestTopicData {
                name: String_("events".to_owned()),
                partition_data: vec![ProduceRequestPartitionData {
                    index: Int32(2),
                    records: Records(vec![]),
                }],
            }],
        };

        let mut buf = vec![];
        request
            .write_versioned(&mut buf, ApiVersion(Int16(3)))
            .unwrap();

        let mut expected = vec![];
        NullableString(None).write(&mut expected).unwrap();
        Int16(-1).write(&mut expected).unwrap();
        Int32(1_500).write(&mut expected).unwrap();
        Int32(1).write(&mut expected).unwrap();
        String_("events".to_owned()).write(&mut expected).unwrap();
        Int32(1).write(&mut expected).unwrap();
        Int32(2).write(&mut expected).unwrap();
        // empty record set still carries its nullable-bytes length
        Int32(0).write(&mut expected).unwrap();

        assert_eq!(buf, expected);
    }

    #[test]
    fn test_response_decode_v3() {
        let mut buf = vec![];
        Int32(1).write(&mut buf).unwrap();
        String_("events".to_owned()).write(&mut buf).unwrap();
        Int32(1).write(&mut buf).unwrap();
        Int32(2).write(&mut buf).unwrap(); // partition index
        Int16(0).write(&mut buf).unwrap(); // no error
        Int64(42).write(&mut buf).unwrap(); // base offset
        Int64(-1).write(&mut buf).unwrap(); // log append time
        Int32(0).write(&mut buf).unwrap(); // throttle

        let resp =
            ProduceResponse::read_versioned(&mut Cursor::new(buf), ApiVersion(Int16(3))).unwrap();

        assert_eq!(resp.responses.len(), 1);
        let partition = &resp.responses[0].partition_responses[0];
        assert_eq!(partition.index, Int32(2));
        assert_eq!(partition.error, None);
        assert_eq!(partition.base_offset, Int64(42));
    }

    #[test]
    fn test_response_decode_partition_error() {
        let mut buf = vec![];
        Int32(1).write(&mut buf).unwrap();
        String_("events".to_owned()).write(&mut buf).unwrap();
        Int32(1).write(&mut buf).unwrap();
        Int32(0).write(&mut buf).unwrap();
        Int16(6).write(&mut buf).unwrap(); // NOT_LEADER_OR_FOLLOWER
        Int64(-1).write(&mut buf).unwrap();
        Int64(-1).write(&mut buf).unwrap();
        Int32(0).write(&mut buf).unwrap();

        let resp =
            ProduceResponse::read_versioned(&mut Cursor::new(buf), ApiVersion(Int16(3))).unwrap();

        assert_eq!(
            resp.responses[0].partition_responses[0].error,
            Some(ApiError::NotLeaderOrFollower)
        );
    }
}
