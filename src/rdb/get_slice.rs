pub fn get_buffer_slice(buffer: &[u8], cursor: usize, len: usize) -> tokio::io::Result<&[u8]> {
    let end = cursor.checked_add(len).filter(|end| *end <= buffer.len());

    let Some(end) = end else {
        return Err(tokio::io::Error::new(
            tokio::io::ErrorKind::UnexpectedEof,
            "Not enough data in buffer",
        ));
    };

    Ok(&buffer[cursor..end])
}

pub fn read_u64_le(buffer: &[u8], cursor: usize) -> tokio::io::Result<u64> {
    let bytes: [u8; 8] = get_buffer_slice(buffer, cursor, 8)?
        .try_into()
        .map_err(|_| {
            tokio::io::Error::new(tokio::io::ErrorKind::UnexpectedEof, "Not enough bytes for u64")
        })?;

    Ok(u64::from_le_bytes(bytes))
}
