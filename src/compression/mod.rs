//! # 圧縮モジュール
//!
//! LZMA2（xz）によるストリーミング圧縮と分割アーカイブを提供します。

pub mod archive;

pub use archive::{
    ArchiveEntry, ArchiveInfo, ArchivePart, Compressor, DEFAULT_COMPRESSION_LEVEL,
    DEFAULT_SPLIT_SIZE, MIN_SPLIT_SIZE,
};
