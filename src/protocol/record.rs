//! The record batch payload format, which is also the on-disk format for
//! Kafka-style brokers.
//!
//! Only message format version 2 (introduced by [KIP-98]) is supported.
//! Compressed batches and transactional control batches are rejected as
//! malformed input: compression codecs and transactions are outside this
//! client's scope.
//!
//! # References
//! - <https://kafka.apache.org/documentation/#messageformat>
//!
//! [KIP-98]: https://cwiki.apache.org/confluence/display/KAFKA/KIP-98+-+Exactly+Once+Delivery+and+Transactional+Messaging

use std::io::{Cursor, Read, Write};

#[cfg(test)]
use proptest::prelude::*;

use super::{
    primitives::{Int8, Int16, Int32, Int64, Varint, Varlong},
    traits::{ReadError, ReadType, WriteError, WriteType},
    vec_builder::VecBuilder,
};

/// Record Header
///
/// # References
/// - <https://kafka.apache.org/documentation/#recordheader>
#[derive(Debug, PartialEq, Eq, Clone)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct RecordHeader {
    pub key: String,
    pub value: Vec<u8>,
}

impl<R> ReadType<R> for RecordHeader
where
    R: Read,
{
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        // key
        let len = Varint::read(reader)?;
        let len = usize::try_from(len.0).map_err(|e| ReadError::Malformed(Box::new(e)))?;
        let buf = VecBuilder::new(len).read_exact(reader)?;
        let key = String::from_utf8(buf.into()).map_err(|e| ReadError::Malformed(Box::new(e)))?;

        // value
        let len = Varint::read(reader)?;
        let len = usize::try_from(len.0).map_err(|e| ReadError::Malformed(Box::new(e)))?;
        let value = VecBuilder::new(len).read_exact(reader)?;

        Ok(Self {
            key,
            value: value.into(),
        })
    }
}

impl<W> WriteType<W> for RecordHeader
where
    W: Write,
{
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        // key
        let l = i32::try_from(self.key.len()).map_err(|e| WriteError::Malformed(Box::new(e)))?;
        Varint(l).write(writer)?;
        writer.write_all(self.key.as_bytes())?;

        // value
        let l = i32::try_from(self.value.len()).map_err(|e| WriteError::Malformed(Box::new(e)))?;
        Varint(l).write(writer)?;
        writer.write_all(&self.value)?;

        Ok(())
    }
}

/// Record
///
/// A null key is encoded with length -1, distinct from an empty key.
///
/// # References
/// - <https://kafka.apache.org/documentation/#record>
#[derive(Debug, PartialEq, Eq, Clone)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct Record {
    pub timestamp_delta: i64,
    pub offset_delta: i32,
    pub key: Option<Vec<u8>>,
    pub value: Vec<u8>,
    pub headers: Vec<RecordHeader>,
}

impl<R> ReadType<R> for Record
where
    R: Read,
{
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        // length
        let len = Varint::read(reader)?;
        let len = u64::try_from(len.0).map_err(|e| ReadError::Malformed(Box::new(e)))?;
        let reader = &mut reader.take(len);

        // attributes (unused in message version 2)
        Int8::read(reader)?;

        // timestampDelta
        let timestamp_delta = Varlong::read(reader)?.0;

        // offsetDelta
        let offset_delta = Varint::read(reader)?.0;

        // key
        let len = Varint::read(reader)?;
        let key = if len.0 == -1 {
            None
        } else {
            let len = usize::try_from(len.0).map_err(|e| ReadError::Malformed(Box::new(e)))?;
            Some(VecBuilder::new(len).read_exact(reader)?.into())
        };

        // value
        let len = Varint::read(reader)?;
        let len = usize::try_from(len.0).map_err(|e| ReadError::Malformed(Box::new(e)))?;
        let value: Vec<u8> = VecBuilder::new(len).read_exact(reader)?.into();

        // headers
        // Note: This is NOT a normal array but uses a Varint instead.
        let n_headers = Varint::read(reader)?;
        let n_headers =
            usize::try_from(n_headers.0).map_err(|e| ReadError::Malformed(Box::new(e)))?;
        let mut headers = Vec::with_capacity(n_headers.min(1024));
        for _ in 0..n_headers {
            headers.push(RecordHeader::read(reader)?);
        }

        // check if there is any trailing data because this is likely a bug
        if reader.limit() != 0 {
            return Err(ReadError::Malformed(
                format!("Found {} trailing bytes after Record", reader.limit()).into(),
            ));
        }

        Ok(Self {
            timestamp_delta,
            offset_delta,
            key,
            value,
            headers,
        })
    }
}

impl<W> WriteType<W> for Record
where
    W: Write,
{
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        // write data to buffer because we need to prepend the length
        let mut data = vec![];

        // attributes
        Int8(0).write(&mut data)?;

        // timestampDelta
        Varlong(self.timestamp_delta).write(&mut data)?;

        // offsetDelta
        Varint(self.offset_delta).write(&mut data)?;

        // key
        match &self.key {
            Some(key) => {
                let l = i32::try_from(key.len()).map_err(|e| WriteError::Malformed(Box::new(e)))?;
                Varint(l).write(&mut data)?;
                data.write_all(key)?;
            }
            None => {
                Varint(-1).write(&mut data)?;
            }
        }

        // value
        let l = i32::try_from(self.value.len()).map_err(|e| WriteError::Malformed(Box::new(e)))?;
        Varint(l).write(&mut data)?;
        data.write_all(&self.value)?;

        // headers
        // Note: This is NOT a normal array but uses a Varint instead.
        let l =
            i32::try_from(self.headers.len()).map_err(|e| WriteError::Malformed(Box::new(e)))?;
        Varint(l).write(&mut data)?;
        for header in &self.headers {
            header.write(&mut data)?;
        }

        // now write accumulated data
        let l = i32::try_from(data.len()).map_err(|e| WriteError::Malformed(Box::new(e)))?;
        Varint(l).write(writer)?;
        writer.write_all(&data)?;

        Ok(())
    }
}

/// Record batch timestamp type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub enum RecordBatchTimestampType {
    CreateTime,
    LogAppendTime,
}

/// Record Batch
///
/// The on-wire layout is `baseOffset`, `batchLength`, `partitionLeaderEpoch`,
/// `magic`, `crc`, then the CRC-protected body. The CRC is crc32c
/// (Castagnoli) over everything following the CRC field.
///
/// # References
/// - <https://kafka.apache.org/documentation/#recordbatch>
#[derive(Debug, PartialEq, Eq, Clone)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct RecordBatch {
    pub base_offset: i64,
    pub partition_leader_epoch: i32,
    pub last_offset_delta: i32,
    pub first_timestamp: i64,
    pub max_timestamp: i64,
    pub producer_id: i64,
    pub producer_epoch: i16,
    pub base_sequence: i32,

    // tell proptest to only generate small vectors, otherwise tests take forever
    #[cfg_attr(
        test,
        proptest(strategy = "prop::collection::vec(any::<Record>(), 0..3)")
    )]
    pub records: Vec<Record>,

    pub timestamp_type: RecordBatchTimestampType,
}

impl<R> ReadType<R> for RecordBatch
where
    R: Read,
{
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        // baseOffset
        let base_offset = Int64::read(reader)?.0;

        // batchLength
        //
        // Contains all fields AFTER the length field (so excluding `baseOffset` and `batchLength`). To determine the
        // size of the CRC-checked part we must subtract all fields up to and including the CRC field.
        let len = Int32::read(reader)?;
        let len = usize::try_from(len.0).map_err(|e| ReadError::Malformed(Box::new(e)))?;
        let len = len
            .checked_sub(
                4 // partitionLeaderEpoch
            + 1 // magic
            + 4, // crc
            )
            .ok_or_else(|| {
                ReadError::Malformed(format!("Record batch len too small: {len}").into())
            })?;

        // partitionLeaderEpoch
        let partition_leader_epoch = Int32::read(reader)?.0;

        // magic
        let magic = Int8::read(reader)?.0;
        if magic != 2 {
            return Err(ReadError::Malformed(
                format!("Invalid magic number in record batch: {magic}").into(),
            ));
        }

        // crc
        let crc = Int32::read(reader)?.0;
        let crc = u32::from_be_bytes(crc.to_be_bytes());

        // data
        let data: Vec<u8> = VecBuilder::new(len).read_exact(reader)?.into();
        let actual_crc = crc32c::crc32c(&data);
        if crc != actual_crc {
            return Err(ReadError::Malformed(
                format!("CRC error, got 0x{actual_crc:x}, expected 0x{crc:x}").into(),
            ));
        }

        let mut data = Cursor::new(data);
        let body = RecordBatchBody::read(&mut data)?;

        // check if there is any trailing data because this is likely a bug
        let bytes_read = data.position();
        let bytes_total = data.into_inner().len() as u64;
        let bytes_left = bytes_total - bytes_read;
        if bytes_left != 0 {
            return Err(ReadError::Malformed(
                format!("Found {bytes_left} trailing bytes after RecordBatch").into(),
            ));
        }

        Ok(Self {
            base_offset,
            partition_leader_epoch,
            last_offset_delta: body.last_offset_delta,
            first_timestamp: body.first_timestamp,
            max_timestamp: body.max_timestamp,
            producer_id: body.producer_id,
            producer_epoch: body.producer_epoch,
            base_sequence: body.base_sequence,
            records: body.records,
            timestamp_type: body.timestamp_type,
        })
    }
}

impl<W> WriteType<W> for RecordBatch
where
    W: Write,
{
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        // collect everything that is part of the CRC calculation
        let mut data = vec![];
        let body = RecordBatchBody {
            last_offset_delta: self.last_offset_delta,
            first_timestamp: self.first_timestamp,
            max_timestamp: self.max_timestamp,
            producer_id: self.producer_id,
            producer_epoch: self.producer_epoch,
            base_sequence: self.base_sequence,
            records: self.records.clone(),
            timestamp_type: self.timestamp_type,
        };
        body.write(&mut data)?;

        // baseOffset
        Int64(self.base_offset).write(writer)?;

        // batchLength
        //
        // Contains all fields AFTER the length field (so excluding `baseOffset` and `batchLength`, but including
        // `partitionLeaderEpoch`, `magic`, and `crc`).
        let l = i32::try_from(
            data.len()
            + 4 // partitionLeaderEpoch
            + 1 // magic
            + 4, // crc
        )
        .map_err(|e| WriteError::Malformed(Box::new(e)))?;
        Int32(l).write(writer)?;

        // partitionLeaderEpoch
        Int32(self.partition_leader_epoch).write(writer)?;

        // magic
        Int8(2).write(writer)?;

        // crc
        let crc = crc32c::crc32c(&data);
        let crc = i32::from_be_bytes(crc.to_be_bytes());
        Int32(crc).write(writer)?;

        // the actual CRC-checked data
        writer.write_all(&data)?;

        Ok(())
    }
}

/// Inner part of a [`RecordBatch`] that is protected by a header containing
/// its length and a CRC checksum.
#[derive(Debug, PartialEq, Eq)]
struct RecordBatchBody {
    last_offset_delta: i32,
    first_timestamp: i64,
    max_timestamp: i64,
    producer_id: i64,
    producer_epoch: i16,
    base_sequence: i32,
    records: Vec<Record>,
    timestamp_type: RecordBatchTimestampType,
}

impl<R> ReadType<R> for RecordBatchBody
where
    R: Read,
{
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        // attributes
        let attributes = Int16::read(reader)?.0;
        let compression = attributes & 0x7;
        if compression != 0 {
            return Err(ReadError::Malformed(
                format!("Unsupported compression type: {compression}").into(),
            ));
        }
        let timestamp_type = if ((attributes >> 3) & 0x1) == 0 {
            RecordBatchTimestampType::CreateTime
        } else {
            RecordBatchTimestampType::LogAppendTime
        };
        if ((attributes >> 4) & 0x1) == 1 {
            return Err(ReadError::Malformed(
                "Transactional record batches are not supported".into(),
            ));
        }
        if ((attributes >> 5) & 0x1) == 1 {
            return Err(ReadError::Malformed(
                "Control record batches are not supported".into(),
            ));
        }

        // lastOffsetDelta
        let last_offset_delta = Int32::read(reader)?.0;

        // firstTimestamp
        let first_timestamp = Int64::read(reader)?.0;

        // maxTimestamp
        let max_timestamp = Int64::read(reader)?.0;

        // producerId
        let producer_id = Int64::read(reader)?.0;

        // producerEpoch
        let producer_epoch = Int16::read(reader)?.0;

        // baseSequence
        let base_sequence = Int32::read(reader)?.0;

        // records
        //
        // Note: records use a plain INT32 count, not an Array.
        let n_records = Int32::read(reader)?.0;
        let n_records =
            usize::try_from(n_records).map_err(|e| ReadError::Malformed(Box::new(e)))?;
        let mut records = Vec::with_capacity(n_records.min(1024));
        for _ in 0..n_records {
            records.push(Record::read(reader)?);
        }

        Ok(Self {
            last_offset_delta,
            first_timestamp,
            max_timestamp,
            producer_id,
            producer_epoch,
            base_sequence,
            records,
            timestamp_type,
        })
    }
}

impl<W> WriteType<W> for RecordBatchBody
where
    W: Write,
{
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        // attributes: no compression, not transactional, not a control batch
        let mut attributes: i16 = 0;
        if matches!(self.timestamp_type, RecordBatchTimestampType::LogAppendTime) {
            attributes |= 1 << 3;
        }
        Int16(attributes).write(writer)?;

        // lastOffsetDelta
        Int32(self.last_offset_delta).write(writer)?;

        // firstTimestamp
        Int64(self.first_timestamp).write(writer)?;

        // maxTimestamp
        Int64(self.max_timestamp).write(writer)?;

        // producerId
        Int64(self.producer_id).write(writer)?;

        // producerEpoch
        Int16(self.producer_epoch).write(writer)?;

        // baseSequence
        Int32(self.base_sequence).write(writer)?;

        // records
        let l = i32::try_from(self.records.len()).map_err(|e| WriteError::Malformed(Box::new(e)))?;
        Int32(l).write(writer)?;
        for record in &self.records {
            record.write(writer)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn batch() -> RecordBatch {
        RecordBatch {
            base_offset: 0,
            partition_leader_epoch: -1,
            last_offset_delta: 1,
            first_timestamp: 1667295173000,
            max_timestamp: 1667295173001,
            producer_id: -1,
            producer_epoch: -1,
            base_sequence: -1,
            records: vec![
                Record {
                    timestamp_delta: 0,
                    offset_delta: 0,
                    key: Some(b"k1".to_vec()),
                    value: b"v1".to_vec(),
                    headers: vec![RecordHeader {
                        key: "source".to_owned(),
                        value: b"test".to_vec(),
                    }],
                },
                Record {
                    timestamp_delta: 1,
                    offset_delta: 1,
                    key: None,
                    value: b"v2".to_vec(),
                    headers: vec![],
                },
            ],
            timestamp_type: RecordBatchTimestampType::CreateTime,
        }
    }

    #[test]
    fn test_roundtrip() {
        let orig = batch();
        let mut buf = Cursor::new(Vec::<u8>::new());
        orig.write(&mut buf).unwrap();
        buf.set_position(0);

        let restored = RecordBatch::read(&mut buf).unwrap();
        assert_eq!(orig, restored);
    }

    #[test]
    fn test_null_key_roundtrips_as_null() {
        let orig = batch();
        let mut buf = Cursor::new(Vec::<u8>::new());
        orig.write(&mut buf).unwrap();
        buf.set_position(0);

        let restored = RecordBatch::read(&mut buf).unwrap();
        assert_eq!(restored.records[1].key, None);
        assert_eq!(restored.records[0].key.as_deref(), Some(b"k1".as_slice()));
    }

    #[test]
    fn test_crc_mismatch() {
        let mut data = vec![];
        batch().write(&mut data).unwrap();

        // flip one bit inside the CRC-protected body
        let last = data.len() - 1;
        data[last] ^= 0x01;

        let err = RecordBatch::read(&mut Cursor::new(data)).unwrap_err();
        assert_matches!(err, ReadError::Malformed(_));
        assert!(err.to_string().starts_with("CRC error"));
    }

    #[test]
    fn test_invalid_magic() {
        let mut data = vec![];
        batch().write(&mut data).unwrap();

        // magic lives right after baseOffset (8), batchLength (4) and
        // partitionLeaderEpoch (4)
        data[16] = 1;

        let err = RecordBatch::read(&mut Cursor::new(data)).unwrap_err();
        assert_matches!(err, ReadError::Malformed(_));
        assert_eq!(err.to_string(), "Invalid magic number in record batch: 1");
    }

    #[test]
    fn test_compressed_batch_rejected() {
        let orig = batch();
        let mut data = vec![];
        orig.write(&mut data).unwrap();

        // attributes are the first two bytes of the CRC-protected body,
        // located after baseOffset(8) + batchLength(4) + epoch(4) + magic(1)
        // + crc(4); set a compression codec bit and fix up the checksum.
        let body_start = 8 + 4 + 4 + 1 + 4;
        data[body_start + 1] |= 0x2;
        let crc = crc32c::crc32c(&data[body_start..]);
        data[17..21].copy_from_slice(&crc.to_be_bytes());

        let err = RecordBatch::read(&mut Cursor::new(data)).unwrap_err();
        assert_matches!(err, ReadError::Malformed(_));
        assert_eq!(err.to_string(), "Unsupported compression type: 2");
    }

    #[test]
    fn test_batch_length_too_small() {
        let mut data = vec![];
        batch().write(&mut data).unwrap();

        // batchLength sits right after baseOffset
        data[8..12].copy_from_slice(&2i32.to_be_bytes());

        let err = RecordBatch::read(&mut Cursor::new(data)).unwrap_err();
        assert_matches!(err, ReadError::Malformed(_));
        assert_eq!(err.to_string(), "Record batch len too small: 2");
    }
}
