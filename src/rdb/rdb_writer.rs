use crate::{
    key_value_store::{DataType, KeyValueStore},
    rdb::{
        encoding::{encode_length, encode_string},
        opcode::{
            DATABASE_OPCODE, END_OF_FILE_OPCODE, EXPIRATION_MILLISECONDS_OPCODE,
            INTEGER_VALUE_TYPE, LIST_VALUE_TYPE, MAGIC_STRING, METADATA_OPCODE, RDB_VERSION,
            STREAM_VALUE_TYPE, STRING_VALUE_TYPE,
        },
    },
    stream::Stream,
};

/// Serializes every live key into snapshot bytes.
pub fn save_snapshot(store: &mut KeyValueStore) -> Vec<u8> {
    let mut output = Vec::new();

    output.extend_from_slice(MAGIC_STRING.as_bytes());
    output.extend_from_slice(RDB_VERSION.as_bytes());

    output.push(METADATA_OPCODE);
    encode_string("redis-ver", &mut output);
    encode_string(env!("CARGO_PKG_VERSION"), &mut output);

    output.push(DATABASE_OPCODE);
    encode_length(0, &mut output);

    for (key, value) in store.entries() {
        if let Some(expires_at) = value.expires_at_unix_ms() {
            output.push(EXPIRATION_MILLISECONDS_OPCODE);
            output.extend_from_slice(&expires_at.to_le_bytes());
        }

        match &value.data {
            DataType::String(string) => {
                output.push(STRING_VALUE_TYPE);
                encode_string(key, &mut output);
                encode_string(string, &mut output);
            }
            DataType::Integer(integer) => {
                output.push(INTEGER_VALUE_TYPE);
                encode_string(key, &mut output);
                output.extend_from_slice(&integer.to_le_bytes());
            }
            DataType::List(list) => {
                output.push(LIST_VALUE_TYPE);
                encode_string(key, &mut output);
                encode_length(list.len(), &mut output);

                for element in list {
                    encode_string(element, &mut output);
                }
            }
            DataType::Stream(stream) => {
                output.push(STREAM_VALUE_TYPE);
                encode_string(key, &mut output);
                encode_stream(stream, &mut output);
            }
        }
    }

    output.push(END_OF_FILE_OPCODE);
    output.extend_from_slice(&[0; 8]);

    output
}

fn encode_stream(stream: &Stream, output: &mut Vec<u8>) {
    let last_id = stream.last_id();
    output.extend_from_slice(&last_id.ms.to_le_bytes());
    output.extend_from_slice(&last_id.seq.to_le_bytes());

    encode_length(stream.len(), output);

    for (id, fields) in stream.iter() {
        output.extend_from_slice(&id.ms.to_le_bytes());
        output.extend_from_slice(&id.seq.to_le_bytes());
        encode_length(fields.len(), output);

        for (field, value) in fields {
            encode_string(field, output);
            encode_string(value, output);
        }
    }
}
