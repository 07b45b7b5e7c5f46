// Gzip handling for input and output documents.
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;

use crate::error::{Result, SceneError};

// Function to detect if data is gzipped (checking for gzip magic number)
fn is_gzipped(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0x1F && data[1] == 0x8B
}

// Function to decompress gzipped data, passing plain data through
pub fn decompress_gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    if !is_gzipped(data) {
        return Ok(data.to_vec());
    }

    let mut decoder = GzDecoder::new(data);
    let mut decompressed_data = Vec::new();
    decoder.read_to_end(&mut decompressed_data)?;
    Ok(decompressed_data)
}

/// Read a text document, decompressing it when it starts with the gzip magic.
pub fn read_document(path: &Path) -> Result<String> {
    let raw = std::fs::read(path).map_err(|e| SceneError::io(path, e))?;
    let data = decompress_gzip(&raw).map_err(|e| SceneError::io(path, e))?;
    String::from_utf8(data).map_err(|e| {
        SceneError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        )
    })
}

pub fn wants_gzip(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false)
}

/// Serialize `value` as JSON to `path`, gzip-compressed when the path ends in
/// `.gz`. Returns the number of bytes handed to the file.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<u64> {
    let bytes = serde_json::to_vec(value)?;
    let file = File::create(path).map_err(|e| SceneError::io(path, e))?;
    let mut writer = BufWriter::new(file);

    if wants_gzip(path) {
        let mut encoder = GzEncoder::new(&mut writer, Compression::default());
        encoder.write_all(&bytes).map_err(|e| SceneError::io(path, e))?;
        encoder.finish().map_err(|e| SceneError::io(path, e))?;
    } else {
        writer.write_all(&bytes).map_err(|e| SceneError::io(path, e))?;
    }
    writer.flush().map_err(|e| SceneError::io(path, e))?;

    let written = std::fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| SceneError::io(path, e))?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("cityscene-{}-{}", std::process::id(), name))
    }

    #[test]
    fn plain_data_passes_through() {
        let data = b"{\"type\":\"FeatureCollection\"}";
        assert_eq!(decompress_gzip(data).expect("plain"), data.to_vec());
    }

    #[test]
    fn gz_suffix_compresses_and_reads_back() {
        let path = temp_path("doc.json.gz");
        let value = serde_json::json!({ "answer": 42 });
        write_json(&path, &value).expect("write");

        let raw = std::fs::read(&path).expect("read raw");
        assert!(is_gzipped(&raw));

        let text = read_document(&path).expect("read back");
        let parsed: serde_json::Value = serde_json::from_str(&text).expect("json");
        assert_eq!(parsed, value);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn gzip_detection_is_by_extension() {
        assert!(wants_gzip(Path::new("out/scene.city.json.gz")));
        assert!(wants_gzip(Path::new("scene.GZ")));
        assert!(!wants_gzip(Path::new("scene.city.json")));
    }
}
