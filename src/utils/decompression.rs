//! Raw dataset decompression
//!
//! Trending datasets are published as zip archives, but gzip and plain files are
//! accepted too. The format is detected from magic bytes, never from the file name.

use std::io::Read;
use thiserror::Error;

/// Supported compression formats detected by magic bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    Gzip,
    Zip,
    Uncompressed,
}

impl CompressionFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionFormat::Gzip => "gzip",
            CompressionFormat::Zip => "zip",
            CompressionFormat::Uncompressed => "uncompressed",
        }
    }
}

#[derive(Error, Debug)]
pub enum DecompressionError {
    #[error("{format} input is not supported by this build (enable the compression-{format} feature)")]
    Unsupported { format: &'static str },

    #[error("Zip archive is empty")]
    EmptyArchive,

    #[error("Zip archive holds {entries} files, expected exactly one")]
    MultipleEntries { entries: usize },

    #[cfg(feature = "compression-zip")]
    #[error("Failed to read zip archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Failed to decompress {format} data: {source}")]
    Io {
        format: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Detect compression format using magic bytes
pub fn detect_compression_format(data: &[u8]) -> CompressionFormat {
    match infer::get(data).map(|kind| kind.mime_type()) {
        Some("application/gzip") => CompressionFormat::Gzip,
        Some("application/zip") => CompressionFormat::Zip,
        _ => CompressionFormat::Uncompressed,
    }
}

/// Decompress data based on detected format.
///
/// A zip archive must hold exactly one file.
pub fn decompress(data: Vec<u8>) -> Result<(CompressionFormat, Vec<u8>), DecompressionError> {
    let format = detect_compression_format(&data);
    let decoded = match format {
        CompressionFormat::Gzip => decompress_gzip(&data)?,
        CompressionFormat::Zip => decompress_zip(&data)?,
        CompressionFormat::Uncompressed => data,
    };
    Ok((format, decoded))
}

#[cfg(feature = "compression-gzip")]
fn decompress_gzip(data: &[u8]) -> Result<Vec<u8>, DecompressionError> {
    let mut decoder = flate2::read::GzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|source| DecompressionError::Io {
            format: "gzip",
            source,
        })?;
    Ok(decompressed)
}

#[cfg(not(feature = "compression-gzip"))]
fn decompress_gzip(_data: &[u8]) -> Result<Vec<u8>, DecompressionError> {
    Err(DecompressionError::Unsupported { format: "gzip" })
}

#[cfg(feature = "compression-zip")]
fn decompress_zip(data: &[u8]) -> Result<Vec<u8>, DecompressionError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(data))?;
    match archive.len() {
        0 => return Err(DecompressionError::EmptyArchive),
        1 => {}
        entries => return Err(DecompressionError::MultipleEntries { entries }),
    }

    let mut file = archive.by_index(0)?;
    let mut decompressed = Vec::new();
    file.read_to_end(&mut decompressed)
        .map_err(|source| DecompressionError::Io {
            format: "zip",
            source,
        })?;
    Ok(decompressed)
}

#[cfg(not(feature = "compression-zip"))]
fn decompress_zip(_data: &[u8]) -> Result<Vec<u8>, DecompressionError> {
    Err(DecompressionError::Unsupported { format: "zip" })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CSV: &[u8] = b"video_id,trending_date\nabc,17.14.11\n";

    #[test]
    fn test_detect_uncompressed() {
        assert_eq!(
            detect_compression_format(CSV),
            CompressionFormat::Uncompressed
        );
        let (format, data) = decompress(CSV.to_vec()).unwrap();
        assert_eq!(format, CompressionFormat::Uncompressed);
        assert_eq!(data, CSV);
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn test_detect_and_decompress_gzip() {
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(CSV).unwrap();
        let compressed = encoder.finish().unwrap();

        assert_eq!(
            detect_compression_format(&compressed),
            CompressionFormat::Gzip
        );
        let (format, data) = decompress(compressed).unwrap();
        assert_eq!(format, CompressionFormat::Gzip);
        assert_eq!(data, CSV);
    }

    #[cfg(feature = "compression-zip")]
    fn zip_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        for (name, contents) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(contents).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[cfg(feature = "compression-zip")]
    #[test]
    fn test_zip_yields_its_single_entry() {
        let (format, data) = decompress(zip_archive(&[("USvideos.csv", CSV)])).unwrap();
        assert_eq!(format, CompressionFormat::Zip);
        assert_eq!(data, CSV);
    }

    #[cfg(feature = "compression-zip")]
    #[test]
    fn test_zip_with_several_files_is_rejected() {
        let compressed = zip_archive(&[("USvideos.csv", CSV), ("README.txt", b"notes")]);

        let err = decompress(compressed).unwrap_err();
        assert!(matches!(
            err,
            DecompressionError::MultipleEntries { entries: 2 }
        ));
    }
}
