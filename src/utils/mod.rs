pub mod decompression;
pub mod human_format;

pub use decompression::{
    CompressionFormat, DecompressionError, decompress, detect_compression_format,
};
pub use human_format::{format_bytes, format_duration};
