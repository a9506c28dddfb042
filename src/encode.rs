use std::{
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use anyhow::Context as _;

use crate::{
    error::{PanotourError, PanotourResult},
    stitch::Panorama,
};

/// H.264/MP4 encode parameters for a tour.
#[derive(Clone, Debug)]
pub struct EncodeConfig {
    pub out_path: PathBuf,
    /// Container frame rate.
    pub fps: u32,
    /// Consecutive repeats per panorama; gives each waypoint a readable
    /// dwell time at playback speed.
    pub frame_repeat: u32,
    /// libx264 constant-quality factor.
    pub crf: u8,
    /// libx264 preset.
    pub preset: String,
    pub overwrite: bool,
    /// Root for the per-attempt frame working area. Defaults to the system
    /// temp directory.
    pub work_root: Option<PathBuf>,
}

impl EncodeConfig {
    pub fn validate(&self) -> PanotourResult<()> {
        if self.fps == 0 {
            return Err(PanotourError::validation("encode fps must be non-zero"));
        }
        if self.frame_repeat == 0 {
            return Err(PanotourError::validation(
                "encode frame_repeat must be non-zero",
            ));
        }
        if self.crf > 51 {
            return Err(PanotourError::validation(
                "encode crf must be within libx264's 0..=51 range",
            ));
        }
        if self.preset.trim().is_empty() {
            return Err(PanotourError::validation("encode preset must be non-empty"));
        }
        Ok(())
    }
}

pub fn default_mp4_config(out_path: impl Into<PathBuf>) -> EncodeConfig {
    EncodeConfig {
        out_path: out_path.into(),
        fps: 30,
        frame_repeat: 10,
        crf: 18,
        preset: "slow".to_string(),
        overwrite: true,
        work_root: None,
    }
}

/// The finished artifact: MP4 path plus the metadata tag set it carries.
#[derive(Clone, Debug)]
pub struct EncodedVideo {
    pub path: PathBuf,
    pub frame_count: u64,
    pub duration_secs: f64,
    pub tags: Vec<(String, String)>,
}

/// Codec-level spherical tags, applied to the video stream.
const STREAM_TAGS: &[(&str, &str)] = &[
    ("spherical", "true"),
    ("stereo_mode", "mono"),
    ("projection", "equirectangular"),
];

/// XMP-compatible and spatial-media tags, applied at container level. Some
/// players only read one family, so both are required for the output to be
/// recognized as navigable everywhere.
const GLOBAL_TAGS: &[(&str, &str)] = &[
    ("XMP-GPano:Spherical", "True"),
    ("XMP-GPano:ProjectionType", "equirectangular"),
    ("XMP-GPano:Stitched", "True"),
    ("GSpherical:Spherical", "true"),
    ("GSpherical:Stitched", "true"),
    ("GSpherical:ProjectionType", "equirectangular"),
];

/// The complete tag set stamped onto every encoded tour video.
pub fn spherical_tag_set() -> Vec<(String, String)> {
    STREAM_TAGS
        .iter()
        .chain(GLOBAL_TAGS)
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn metadata_args() -> Vec<String> {
    let mut args = Vec::new();
    for (key, value) in STREAM_TAGS {
        args.push("-metadata:s:v:0".to_string());
        args.push(format!("{key}={value}"));
    }
    for (key, value) in GLOBAL_TAGS {
        args.push("-metadata".to_string());
        args.push(format!("{key}={value}"));
    }
    args
}

pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

pub fn ensure_parent_dir(path: &Path) -> PanotourResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Per-attempt frame working area, discarded wholesale when the attempt ends
/// (success or failure), so stale frames can never leak into a later encode.
struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    fn create(root: &Path) -> PanotourResult<Self> {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let path = root.join(format!("panotour_encode_{}_{}", std::process::id(), nanos));
        if path.exists() {
            std::fs::remove_dir_all(&path)
                .with_context(|| format!("purge stale working area '{}'", path.display()))?;
        }
        std::fs::create_dir_all(&path)
            .with_context(|| format!("create working area '{}'", path.display()))?;
        Ok(Self { path })
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

/// Lay out the repeated frame sequence under `dir` as `frame_%05d.jpg`.
///
/// Purges any existing content of `dir` first; a previous attempt's frames
/// must never merge into a fresh sequence by frame-number collision.
pub(crate) fn write_frame_sequence(
    dir: &Path,
    frames: &[Panorama],
    frame_repeat: u32,
) -> PanotourResult<u64> {
    let total = frames.len() as u64 * u64::from(frame_repeat);
    if total > 99_999 {
        return Err(PanotourError::validation(format!(
            "frame sequence of {total} exceeds the %05d frame namespace"
        )));
    }

    if dir.exists() {
        std::fs::remove_dir_all(dir)
            .with_context(|| format!("purge working area '{}'", dir.display()))?;
    }
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create working area '{}'", dir.display()))?;

    let mut written = 0u64;
    for frame in frames {
        for _ in 0..frame_repeat {
            let name = format!("frame_{written:05}.jpg");
            std::fs::write(dir.join(&name), &frame.jpeg)
                .with_context(|| format!("write frame '{name}'"))?;
            written += 1;
        }
    }
    Ok(written)
}

/// Encode an ordered panorama sequence into a spherical 360° MP4.
///
/// Each panorama is repeated `frame_repeat` times, the sequence is encoded
/// with libx264 at constant quality, and the container is stamped with both
/// spherical tag families plus faststart layout for streaming playback.
///
/// Re-encoding the same sequence is idempotent; a failed attempt leaves no
/// frame artifacts behind.
#[tracing::instrument(skip(frames, cfg), fields(frames = frames.len(), out = %cfg.out_path.display()))]
pub fn encode_tour_video(frames: &[Panorama], cfg: &EncodeConfig) -> PanotourResult<EncodedVideo> {
    cfg.validate()?;

    if frames.is_empty() {
        return Err(PanotourError::validation(
            "no panoramas captured, nothing to encode",
        ));
    }

    let (width, height) = (frames[0].width, frames[0].height);
    for (i, frame) in frames.iter().enumerate() {
        if (frame.width, frame.height) != (width, height) {
            return Err(PanotourError::validation(format!(
                "panorama {i} is {}x{}, sequence started at {width}x{height}",
                frame.width, frame.height
            )));
        }
    }
    if width != height * 2 {
        return Err(PanotourError::validation(format!(
            "panoramas must be 2:1 equirectangular, got {width}x{height}"
        )));
    }
    if !width.is_multiple_of(2) || !height.is_multiple_of(2) {
        // yuv420p requires even output dimensions.
        return Err(PanotourError::validation(
            "panorama dimensions must be even (required for yuv420p mp4 output)",
        ));
    }

    if !cfg.overwrite && cfg.out_path.exists() {
        return Err(PanotourError::validation(format!(
            "output file '{}' already exists",
            cfg.out_path.display()
        )));
    }

    if !is_ffmpeg_on_path() {
        return Err(PanotourError::encoding(
            "ffmpeg is required for MP4 encoding, but was not found on PATH",
        ));
    }

    ensure_parent_dir(&cfg.out_path)?;

    let work_root = cfg
        .work_root
        .clone()
        .unwrap_or_else(std::env::temp_dir);
    let scratch = ScratchDir::create(&work_root)?;
    let frame_count = write_frame_sequence(&scratch.path, frames, cfg.frame_repeat)?;

    // We intentionally use the system `ffmpeg` binary rather than a native
    // binding to avoid FFmpeg dev header/lib requirements.
    let mut cmd = Command::new("ffmpeg");
    cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::piped());
    cmd.arg(if cfg.overwrite { "-y" } else { "-n" });
    cmd.args(["-loglevel", "error"]);
    cmd.args(["-framerate", &cfg.fps.to_string()]);
    cmd.arg("-i").arg(scratch.path.join("frame_%05d.jpg"));
    cmd.args([
        "-vf",
        &format!("scale={width}:{height},setsar=1:1,format=yuv420p"),
        "-c:v",
        "libx264",
        "-preset",
        &cfg.preset,
        "-crf",
        &cfg.crf.to_string(),
        "-pix_fmt",
        "yuv420p",
        "-profile:v",
        "high",
        "-tune",
        "stillimage",
        // use_metadata_tags keeps the XMP/GSpherical keys through the mp4
        // muxer; without it they are silently dropped.
        "-movflags",
        "+faststart+use_metadata_tags",
    ]);
    cmd.args(metadata_args());
    cmd.arg(&cfg.out_path);

    let output = cmd
        .output()
        .map_err(|e| PanotourError::encoding(format!("failed to spawn ffmpeg: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PanotourError::encoding(format!(
            "ffmpeg exited with status {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(EncodedVideo {
        path: cfg.out_path.clone(),
        frame_count,
        duration_secs: frame_count as f64 / f64::from(cfg.fps),
        tags: spherical_tag_set(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn pano(point_index: usize, payload: u8) -> Panorama {
        Panorama {
            point_index,
            width: 256,
            height: 128,
            jpeg: vec![payload; 16],
            captured_at: SystemTime::now(),
        }
    }

    fn unique_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "panotour_{tag}_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ))
    }

    #[test]
    fn config_validation_catches_bad_values() {
        let mut cfg = default_mp4_config("out.mp4");
        cfg.fps = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = default_mp4_config("out.mp4");
        cfg.frame_repeat = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = default_mp4_config("out.mp4");
        cfg.crf = 52;
        assert!(cfg.validate().is_err());

        let mut cfg = default_mp4_config("out.mp4");
        cfg.preset = "  ".to_string();
        assert!(cfg.validate().is_err());

        assert!(default_mp4_config("out.mp4").validate().is_ok());
    }

    #[test]
    fn tag_set_carries_both_spherical_families() {
        let tags = spherical_tag_set();
        let has = |k: &str, v: &str| tags.iter().any(|(tk, tv)| tk == k && tv == v);

        // Codec-level family.
        assert!(has("spherical", "true"));
        assert!(has("stereo_mode", "mono"));
        assert!(has("projection", "equirectangular"));
        // XMP family.
        assert!(has("XMP-GPano:Spherical", "True"));
        assert!(has("XMP-GPano:ProjectionType", "equirectangular"));
        assert!(has("XMP-GPano:Stitched", "True"));
        // Spatial-media family.
        assert!(has("GSpherical:Spherical", "true"));
    }

    #[test]
    fn metadata_args_scope_codec_tags_to_the_video_stream() {
        let args = metadata_args();
        let idx = args
            .iter()
            .position(|a| a == "spherical=true")
            .expect("stream tag present");
        assert_eq!(args[idx - 1], "-metadata:s:v:0");

        let idx = args
            .iter()
            .position(|a| a == "XMP-GPano:Spherical=True")
            .expect("xmp tag present");
        assert_eq!(args[idx - 1], "-metadata");
    }

    #[test]
    fn frame_sequence_repeats_each_panorama_in_order() {
        let dir = unique_dir("frames");
        let frames = vec![pano(0, 0xaa), pano(1, 0xbb), pano(2, 0xcc)];
        let written = write_frame_sequence(&dir, &frames, 10).unwrap();
        assert_eq!(written, 30);

        for i in 0..30u64 {
            let path = dir.join(format!("frame_{i:05}.jpg"));
            let bytes = std::fs::read(&path).unwrap();
            let expected = [0xaa, 0xbb, 0xcc][(i / 10) as usize];
            assert!(bytes.iter().all(|&b| b == expected), "frame {i} payload");
        }
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn stale_frames_are_purged_before_a_new_sequence() {
        let dir = unique_dir("stale");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("frame_00042.jpg"), b"stale").unwrap();

        let written = write_frame_sequence(&dir, &[pano(0, 0x11)], 2).unwrap();
        assert_eq!(written, 2);
        assert!(!dir.join("frame_00042.jpg").exists());
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 2);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn frame_namespace_overflow_is_rejected() {
        let dir = unique_dir("overflow");
        let frames = vec![pano(0, 0); 10];
        let err = write_frame_sequence(&dir, &frames, 10_000).unwrap_err();
        assert!(matches!(err, PanotourError::Validation(_)));
    }

    #[test]
    fn encode_rejects_mixed_and_non_equirect_dimensions() {
        let cfg = default_mp4_config(unique_dir("reject").join("out.mp4"));

        let mut frames = vec![pano(0, 0), pano(1, 0)];
        frames[1].width = 512;
        frames[1].height = 256;
        assert!(matches!(
            encode_tour_video(&frames, &cfg),
            Err(PanotourError::Validation(_))
        ));

        let mut square = pano(0, 0);
        square.width = 128;
        square.height = 128;
        assert!(matches!(
            encode_tour_video(&[square], &cfg),
            Err(PanotourError::Validation(_))
        ));

        assert!(matches!(
            encode_tour_video(&[], &cfg),
            Err(PanotourError::Validation(_))
        ));
    }
}
