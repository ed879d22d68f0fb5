use crate::{
    resp::RespValue,
    stream::{Stream, StreamFields, StreamId, StreamIdError},
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RangeBound {
    Start,
    End,
}

/// Parses an `XRANGE` boundary.
///
/// `-` and `+` stand for the first and last entries. A bare millisecond value
/// covers every sequence number of that millisecond.
pub fn parse_range_bound(
    argument: &str,
    stream: &Stream,
    bound: RangeBound,
) -> Result<StreamId, StreamIdError> {
    match (argument, bound) {
        ("-", _) => Ok(StreamId::new(
            stream.first_id().map(|id| id.ms).unwrap_or(0),
            0,
        )),
        ("+", _) => Ok(StreamId::new(stream.last_id().ms, u64::MAX)),
        (argument, bound) if !argument.contains('-') => {
            let ms = argument
                .parse::<u64>()
                .map_err(|_| StreamIdError::Malformed)?;

            match bound {
                RangeBound::Start => Ok(StreamId::new(ms, 0)),
                RangeBound::End => Ok(StreamId::new(ms, u64::MAX)),
            }
        }
        (argument, _) => argument.parse::<StreamId>(),
    }
}

/// Parses an explicit `XREAD` ID. A bare millisecond value means sequence 0.
pub fn parse_read_id(argument: &str) -> Result<StreamId, StreamIdError> {
    if argument.contains('-') {
        return argument.parse::<StreamId>();
    }

    let ms = argument
        .parse::<u64>()
        .map_err(|_| StreamIdError::Malformed)?;

    Ok(StreamId::new(ms, 0))
}

pub fn parse_stream_entries_to_resp(entries: Vec<(&StreamId, &StreamFields)>) -> RespValue {
    let resp_entries = entries
        .into_iter()
        .map(|(id, fields)| {
            let mut flattened_fields: Vec<RespValue> = Vec::with_capacity(fields.len() * 2);

            for (field, value) in fields {
                flattened_fields.push(RespValue::BulkString(field.clone()));
                flattened_fields.push(RespValue::BulkString(value.clone()));
            }

            RespValue::Array(vec![
                RespValue::BulkString(id.to_string()),
                RespValue::Array(flattened_fields),
            ])
        })
        .collect::<Vec<RespValue>>();

    RespValue::Array(resp_entries)
}
