//! Transparent gzip handling for input files.

use std::io::{self, Read};

use flate2::read::MultiGzDecoder;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.starts_with(&GZIP_MAGIC)
}

/// Inflate a gzip stream. Concatenated members are read as one stream.
pub fn inflate(compressed: &[u8]) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    MultiGzDecoder::new(compressed).read_to_end(&mut out)?;
    Ok(out)
}

/// Inflate `bytes` when they carry the gzip magic; plain input is returned
/// as is.
pub fn maybe_inflate(bytes: Vec<u8>) -> io::Result<Vec<u8>> {
    if is_gzip(&bytes) {
        inflate(&bytes)
    } else {
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn gz(data: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn test_plain_passthrough() {
        assert!(!is_gzip(b"# GRID"));
        assert_eq!(maybe_inflate(b"# GRID".to_vec()).unwrap(), b"# GRID".to_vec());
    }

    #[test]
    fn test_gzip_inflates() {
        let compressed = gz(b"# NROWS: 2\n");
        assert!(is_gzip(&compressed));
        assert_eq!(maybe_inflate(compressed).unwrap(), b"# NROWS: 2\n".to_vec());
    }

    #[test]
    fn test_concatenated_members() {
        let mut compressed = gz(b"# NROWS: 2\n");
        compressed.extend(gz(b"# NCOLS_ODD: 3\n"));
        assert_eq!(
            inflate(&compressed).unwrap(),
            b"# NROWS: 2\n# NCOLS_ODD: 3\n".to_vec()
        );
    }

    #[test]
    fn test_truncated_gzip_fails() {
        assert!(maybe_inflate(vec![0x1f, 0x8b, 0x08]).is_err());
    }
}
