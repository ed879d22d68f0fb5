use std::path::Path;

use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncWriteExt, BufReader},
};
use tracing::info;

use crate::{key_value_store::KeyValueStore, rdb::RdbParser};

async fn parse_rdb_from_reader<R>(reader: &mut R) -> tokio::io::Result<RdbParser>
where
    R: AsyncReadExt + Unpin,
{
    let mut buf_reader = BufReader::new(reader);
    let mut buffer: [u8; 4096] = [0; 4096];

    let mut rdb_parser = RdbParser::new();

    loop {
        let n = buf_reader.read(&mut buffer).await?;

        if n == 0 {
            break;
        }

        rdb_parser.parse(&buffer[..n])?;
    }

    Ok(rdb_parser)
}

/// Loads the snapshot at `path`. A missing file is an empty keyspace.
pub async fn load_snapshot(path: &Path) -> tokio::io::Result<KeyValueStore> {
    let mut file = match File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == tokio::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "no snapshot found, starting empty");
            return Ok(KeyValueStore::new());
        }
        Err(e) => return Err(e),
    };

    let rdb_parser = parse_rdb_from_reader(&mut file).await?;
    let expired_keys = rdb_parser.expired_keys;
    let mut store = rdb_parser.finish()?;

    info!(
        path = %path.display(),
        keys = store.len(),
        expired_keys,
        "snapshot loaded"
    );

    Ok(store)
}

/// Writes the snapshot next to its destination and renames it into place.
pub async fn write_snapshot_file(path: &Path, snapshot: &[u8]) -> tokio::io::Result<()> {
    let temporary_path = path.with_extension("rdb.tmp");

    let mut file = File::create(&temporary_path).await?;
    file.write_all(snapshot).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&temporary_path, path).await
}
