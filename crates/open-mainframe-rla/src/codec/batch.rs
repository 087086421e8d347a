//! Record buffers: N record slots of `record_increment` bytes each.
//!
//! Offsets inside a slot come from the file's [`OpenFeedback`] and nowhere
//! else. The null map position in particular differs between host releases,
//! so it is never recomputed from the record format.

use std::ops::Range;
use std::sync::Arc;

use open_mainframe_encoding::CodePage;

use crate::codec::feedback::{IoFeedback, OpenFeedback};
use crate::error::{RlaError, RlaResult};
use crate::record::{FieldValue, Record, RecordFormat};

/// Null map byte for a null field.
pub const NULL_MARKER: u8 = 0xF1;
/// Null map byte for a field with a value.
pub const NOT_NULL_MARKER: u8 = 0xF0;

/// Reject a record whose format does not match the open file.
pub fn check_record_length(record: &Record, feedback: &OpenFeedback) -> RlaResult<()> {
    let actual = record.format().record_length();
    if actual != feedback.record_length() {
        return Err(RlaError::RecordLengthMismatch {
            expected: feedback.record_length(),
            actual,
        });
    }
    Ok(())
}

/// Where the null map of `field_count` fields sits in a record slot. A format
/// with more fields than the host laid out would run past the slot.
fn null_map_range(feedback: &OpenFeedback, field_count: usize) -> RlaResult<Range<usize>> {
    let start = feedback.null_map_offset();
    let end = start + field_count;
    if end > feedback.record_increment() {
        return Err(RlaError::UnexpectedReply(format!(
            "null map for {} fields at offset {} overruns the {} byte record slot; the host reported {} fields",
            field_count,
            start,
            feedback.record_increment(),
            feedback.field_count()
        )));
    }
    Ok(start..end)
}

/// Decode the records of a data reply.
pub fn decode_record_batch(
    buffer: &[u8],
    io_feedback: &IoFeedback,
    feedback: &OpenFeedback,
    format: &Arc<RecordFormat>,
    job_page: &'static CodePage,
) -> RlaResult<Vec<Record>> {
    if format.record_length() != feedback.record_length() {
        return Err(RlaError::RecordLengthMismatch {
            expected: feedback.record_length(),
            actual: format.record_length(),
        });
    }
    let increment = feedback.record_increment();
    let count = io_feedback.records_transferred as usize;
    if buffer.len() < count * increment {
        return Err(RlaError::UnexpectedReply(format!(
            "{} records of {} bytes announced, buffer holds {} bytes",
            count,
            increment,
            buffer.len()
        )));
    }

    let record_length = feedback.record_length();
    let rrn_offset = feedback.record_number_offset();
    let null_map = if feedback.is_null_capable() {
        Some(null_map_range(feedback, format.field_count())?)
    } else {
        None
    };

    let mut records = Vec::with_capacity(count);
    for slot in buffer.chunks_exact(increment).take(count) {
        let mut record = Record::from_bytes(Arc::clone(format), &slot[..record_length], job_page)?;
        if let Some(range) = &null_map {
            for (value, &flag) in record.values_mut().iter_mut().zip(&slot[range.clone()]) {
                if flag == NULL_MARKER {
                    *value = FieldValue::Null;
                }
            }
        }
        record.record_number = u32::from_be_bytes([
            slot[rrn_offset],
            slot[rrn_offset + 1],
            slot[rrn_offset + 2],
            slot[rrn_offset + 3],
        ]);
        records.push(record);
    }
    Ok(records)
}

/// Lay records out in slots of `record_increment` bytes. The buffer holds
/// exactly `records.len()` slots; a short final batch is not padded.
pub fn encode_record_batch(
    records: &[Record],
    feedback: &OpenFeedback,
    job_page: &'static CodePage,
) -> RlaResult<Vec<u8>> {
    for record in records {
        check_record_length(record, feedback)?;
    }

    let increment = feedback.record_increment();
    let record_length = feedback.record_length();
    let rrn_offset = feedback.record_number_offset();
    let widest = records.iter().map(|r| r.values().len()).max().unwrap_or(0);
    let null_map = if feedback.is_null_capable() {
        Some(null_map_range(feedback, widest)?)
    } else {
        None
    };

    let mut buffer = vec![0u8; feedback.buffer_length(records.len())];
    for (record, slot) in records.iter().zip(buffer.chunks_exact_mut(increment)) {
        let data = record.to_bytes(job_page)?;
        if data.len() != record_length {
            return Err(RlaError::RecordLengthMismatch {
                expected: record_length,
                actual: data.len(),
            });
        }
        slot[..record_length].copy_from_slice(&data);
        slot[rrn_offset..rrn_offset + 4].copy_from_slice(&record.record_number.to_be_bytes());
        if let Some(range) = &null_map {
            for (flag, value) in slot[range.clone()].iter_mut().zip(record.values()) {
                *flag = if value.is_null() { NULL_MARKER } else { NOT_NULL_MARKER };
            }
        }
    }
    Ok(buffer)
}
