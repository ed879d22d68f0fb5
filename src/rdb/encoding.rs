use crate::rdb::get_slice::get_buffer_slice;

#[derive(Debug, PartialEq)]
enum ValueEncoding {
    Length(usize),
    Int8,
    Int16,
    Int32,
    LzfCompressedString,
}

fn invalid_data(message: &str) -> tokio::io::Error {
    tokio::io::Error::new(tokio::io::ErrorKind::InvalidData, message.to_string())
}

fn parse_length_encoding(bytes: &[u8], cursor: usize) -> tokio::io::Result<(ValueEncoding, usize)> {
    let mut temp_cursor = cursor;
    let byte = get_buffer_slice(bytes, temp_cursor, 1)?[0];
    temp_cursor += 1;

    // The two most significant bits select the encoding.
    let value_encoding = match byte >> 6 {
        0b00 => ValueEncoding::Length((byte & 0b0011_1111) as usize),
        0b01 => {
            // 14 bits: the low 6 bits of this byte are the high bits of the length.
            let lower_8_bits = get_buffer_slice(bytes, temp_cursor, 1)?[0] as usize;
            temp_cursor += 1;

            let high_6_bits = (byte & 0b0011_1111) as usize;

            ValueEncoding::Length((high_6_bits << 8) | lower_8_bits)
        }
        0b10 => match byte {
            0x80 => {
                let slice: [u8; 4] = get_buffer_slice(bytes, temp_cursor, 4)?
                    .try_into()
                    .map_err(|_| invalid_data("Not enough bytes for u32"))?;
                temp_cursor += 4;

                ValueEncoding::Length(u32::from_be_bytes(slice) as usize)
            }
            0x81 => {
                let slice: [u8; 8] = get_buffer_slice(bytes, temp_cursor, 8)?
                    .try_into()
                    .map_err(|_| invalid_data("Not enough bytes for u64"))?;
                temp_cursor += 8;

                let length = usize::try_from(u64::from_be_bytes(slice))
                    .map_err(|_| invalid_data("Length does not fit in memory"))?;

                ValueEncoding::Length(length)
            }
            _ => return Err(invalid_data("Invalid length encoding")),
        },
        _ => match byte & 0b0011_1111 {
            0 => ValueEncoding::Int8,
            1 => ValueEncoding::Int16,
            2 => ValueEncoding::Int32,
            3 => ValueEncoding::LzfCompressedString,
            _ => return Err(invalid_data("Invalid length encoding")),
        },
    };

    Ok((value_encoding, temp_cursor - cursor))
}

/// Reads a plain length (element counts, database numbers).
pub fn parse_length(bytes: &[u8], cursor: usize) -> tokio::io::Result<(usize, usize)> {
    match parse_length_encoding(bytes, cursor)? {
        (ValueEncoding::Length(length), bytes_read) => Ok((length, bytes_read)),
        _ => Err(invalid_data("Value should be a length encoded integer")),
    }
}

/// Reads a string, including the integer-encoded forms.
pub fn parse_string(bytes: &[u8], cursor: usize) -> tokio::io::Result<(String, usize)> {
    let mut temp_cursor = cursor;
    let (value_encoding, length_bytes) = parse_length_encoding(bytes, temp_cursor)?;
    temp_cursor += length_bytes;

    let value = match value_encoding {
        ValueEncoding::Length(length) => {
            let slice = get_buffer_slice(bytes, temp_cursor, length)?;
            temp_cursor += length;

            String::from_utf8(slice.to_vec()).map_err(|_| invalid_data("Invalid UTF-8"))?
        }
        ValueEncoding::Int8 => {
            let slice = get_buffer_slice(bytes, temp_cursor, 1)?;
            temp_cursor += 1;

            (slice[0] as i8).to_string()
        }
        ValueEncoding::Int16 => {
            let slice: [u8; 2] = get_buffer_slice(bytes, temp_cursor, 2)?
                .try_into()
                .map_err(|_| invalid_data("Not enough bytes for i16"))?;
            temp_cursor += 2;

            i16::from_le_bytes(slice).to_string()
        }
        ValueEncoding::Int32 => {
            let slice: [u8; 4] = get_buffer_slice(bytes, temp_cursor, 4)?
                .try_into()
                .map_err(|_| invalid_data("Not enough bytes for i32"))?;
            temp_cursor += 4;

            i32::from_le_bytes(slice).to_string()
        }
        ValueEncoding::LzfCompressedString => {
            return Err(tokio::io::Error::new(
                tokio::io::ErrorKind::Unsupported,
                "LZF compressed strings are not supported",
            ));
        }
    };

    Ok((value, temp_cursor - cursor))
}

/// Appends the shortest length encoding for `length`.
pub fn encode_length(length: usize, output: &mut Vec<u8>) {
    if length < 1 << 6 {
        output.push(length as u8);
    } else if length < 1 << 14 {
        output.push(0b0100_0000 | (length >> 8) as u8);
        output.push((length & 0xFF) as u8);
    } else if let Ok(length) = u32::try_from(length) {
        output.push(0x80);
        output.extend_from_slice(&length.to_be_bytes());
    } else {
        output.push(0x81);
        output.extend_from_slice(&(length as u64).to_be_bytes());
    }
}

pub fn encode_string(value: &str, output: &mut Vec<u8>) {
    encode_length(value.len(), output);
    output.extend_from_slice(value.as_bytes());
}
