//! Video decode and mux seams.
//!
//! Container decoding is an external collaborator; `VideoFrameReader` is the
//! interface the preprocess stage needs from it: decode a specific set of
//! frame indices from one exocentric source. The shipped backend reads
//! pre-extracted JPEG sequences (one file per frame number); a real container
//! decoder would implement the same trait.
//!
//! The egocentric extraction tool and the composite muxer are subprocesses;
//! `VrsExtractor` and `FfmpegMuxer` wrap them behind traits so tests can
//! substitute in-process fakes.

use std::path::Path;

use anyhow::{anyhow, Context as _, Result};
use image::RgbImage;

use crate::storage::ArtifactStore;
use crate::tool::ExternalTool;
use crate::vis;

pub trait VideoFrameReader {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Decode the requested frame indices, in the given order.
    fn read_frames(
        &self,
        store: &dyn ArtifactStore,
        source: &Path,
        frame_indices: &[u64],
    ) -> Result<Vec<(u64, RgbImage)>>;
}

/// Reads a directory of `{frame_number:06}.jpg` files as if it were a video.
#[derive(Clone, Debug, Default)]
pub struct JpegSequenceReader;

impl JpegSequenceReader {
    pub fn new() -> Self {
        Self
    }
}

impl VideoFrameReader for JpegSequenceReader {
    fn name(&self) -> &'static str {
        "jpeg_sequence"
    }

    fn read_frames(
        &self,
        store: &dyn ArtifactStore,
        source: &Path,
        frame_indices: &[u64],
    ) -> Result<Vec<(u64, RgbImage)>> {
        let mut frames = Vec::with_capacity(frame_indices.len());
        for &index in frame_indices {
            let path = source.join(format!("{index:06}.jpg"));
            if !store.exists(&path) {
                return Err(anyhow!(
                    "source {} has no frame {:06}",
                    source.display(),
                    index
                ));
            }
            let raw = store.get(&path)?;
            let image = vis::decode_image(&raw)
                .with_context(|| format!("decode frame {}", path.display()))?;
            frames.push((index, image));
        }
        Ok(frames)
    }
}

/// Extracts all frames of the egocentric recording into per-stream
/// directories under `out_dir`, optionally bounded to a capture-time window.
pub trait EgoFrameExtractor {
    fn name(&self) -> &'static str;

    fn extract(
        &self,
        store: &dyn ArtifactStore,
        video_path: &Path,
        out_dir: &Path,
        window: Option<(f64, f64)>,
    ) -> Result<()>;
}

/// The `vrs extract-all` command-line tool.
pub struct VrsExtractor {
    tool: ExternalTool,
}

impl VrsExtractor {
    pub fn new(bin_path: &str) -> Self {
        Self {
            tool: ExternalTool::new(bin_path),
        }
    }
}

impl EgoFrameExtractor for VrsExtractor {
    fn name(&self) -> &'static str {
        "vrs"
    }

    // The tool writes straight to the local filesystem; the store is part of
    // the trait for backends that do not.
    fn extract(
        &self,
        _store: &dyn ArtifactStore,
        video_path: &Path,
        out_dir: &Path,
        window: Option<(f64, f64)>,
    ) -> Result<()> {
        let mut args = vec![
            "extract-all".to_string(),
            video_path.display().to_string(),
        ];
        if let Some((after, before)) = window {
            args.push("--after".to_string());
            args.push(after.to_string());
            args.push("--before".to_string());
            args.push(before.to_string());
        }
        args.push("--to".to_string());
        args.push(out_dir.display().to_string());
        self.tool.run(&args)
    }
}

/// Muxes an ordered image sequence into a video at a fixed frame rate.
pub trait VideoMuxer {
    fn name(&self) -> &'static str;

    /// `images_dir` holds `{index:05}.jpg` composites; `output` is replaced
    /// if it exists.
    fn mux(
        &self,
        store: &dyn ArtifactStore,
        images_dir: &Path,
        output: &Path,
        fps: u32,
    ) -> Result<()>;
}

/// The `ffmpeg` command-line muxer. Prior output is removed first; ffmpeg
/// rejects odd frame dimensions, which the compositor guarantees against.
pub struct FfmpegMuxer {
    tool: ExternalTool,
}

impl FfmpegMuxer {
    pub fn new() -> Self {
        Self {
            tool: ExternalTool::new("ffmpeg"),
        }
    }
}

impl Default for FfmpegMuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoMuxer for FfmpegMuxer {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn mux(
        &self,
        store: &dyn ArtifactStore,
        images_dir: &Path,
        output: &Path,
        fps: u32,
    ) -> Result<()> {
        store.remove(output)?;
        self.tool.run(&[
            "-r".to_string(),
            fps.to_string(),
            "-f".to_string(),
            "image2".to_string(),
            "-i".to_string(),
            images_dir.join("%05d.jpg").display().to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            output.display().to_string(),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryArtifactStore;
    use image::Rgb;

    #[test]
    fn reads_the_requested_indices_in_order() {
        let store = InMemoryArtifactStore::new();
        let source = Path::new("/videos/cam01");
        for index in [7u64, 8, 9] {
            let image = RgbImage::from_pixel(4, 4, Rgb([index as u8, 0, 0]));
            store
                .put(
                    &source.join(format!("{index:06}.jpg")),
                    &vis::encode_jpeg(&image).expect("encode"),
                )
                .expect("seed");
        }

        let reader = JpegSequenceReader::new();
        let frames = reader
            .read_frames(&store, source, &[9, 7])
            .expect("read frames");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].0, 9);
        assert_eq!(frames[1].0, 7);
    }

    #[test]
    fn missing_frame_is_an_error_naming_the_index() {
        let store = InMemoryArtifactStore::new();
        let reader = JpegSequenceReader::new();
        let err = reader
            .read_frames(&store, Path::new("/videos/cam01"), &[42])
            .expect_err("missing frame");
        assert!(err.to_string().contains("000042"));
    }
}
