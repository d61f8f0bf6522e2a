use bytes::Bytes;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::media::{MediaError, MediaFetcher, ReferenceImage};

/// Social-vertical output frame: 1080x1920, letterboxed, 30 fps.
const SCALE_PAD_FILTER: &str =
    "scale=1080:1920:force_original_aspect_ratio=decrease,pad=1080:1920:(ow-iw)/2:(oh-ih)/2";
const AUDIO_BITRATE: &str = "192k";
const FRAME_RATE: &str = "30";

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("could not fetch image: {0}")]
    Image(MediaError),
    #[error("media toolkit unavailable: {0}")]
    Toolkit(String),
    #[error("encode failed: {0}")]
    Encode(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct VideoConfig {
    pub ffmpeg_path: String,
}

impl VideoConfig {
    pub fn from_env() -> Self {
        Self {
            ffmpeg_path: std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AssembledVideo {
    pub bytes: Bytes,
    pub mime_type: String,
    pub duration_seconds: u32,
    pub silent: bool,
}

impl AssembledVideo {
    pub fn to_data_url(&self) -> String {
        ReferenceImage::new(self.bytes.clone(), self.mime_type.clone()).to_data_url()
    }
}

/// Combines one static image and one audio track into a fixed-duration
/// vertical clip. Audio problems degrade to a silent clip; image problems
/// are fatal.
pub struct VideoAssembler {
    config: VideoConfig,
    media: MediaFetcher,
    toolkit: OnceCell<()>,
}

impl VideoAssembler {
    pub fn new(config: VideoConfig, media: MediaFetcher) -> Self {
        Self { config, media, toolkit: OnceCell::new() }
    }

    /// One-time ffmpeg probe, shared by every assembly on this process.
    async fn ensure_toolkit(&self) -> Result<(), VideoError> {
        self.toolkit
            .get_or_try_init(|| async {
                let output = Command::new(&self.config.ffmpeg_path)
                    .arg("-version")
                    .output()
                    .await
                    .map_err(|e| VideoError::Toolkit(e.to_string()))?;
                if !output.status.success() {
                    return Err(VideoError::Toolkit(format!(
                        "{} -version exited with {}",
                        self.config.ffmpeg_path, output.status
                    )));
                }
                info!("🎬 ffmpeg toolkit ready");
                Ok(())
            })
            .await
            .map(|_| ())
    }

    pub async fn assemble(
        &self,
        image_url: &str,
        audio_url: Option<&str>,
        duration_seconds: u32,
        progress: impl Fn(u8, &str),
    ) -> Result<AssembledVideo, VideoError> {
        progress(0, "Loading FFmpeg...");
        self.ensure_toolkit().await?;

        progress(20, "Fetching image...");
        let image = self.media.fetch(image_url).await.map_err(VideoError::Image)?;

        progress(40, "Fetching audio...");
        let audio = fetch_audio(&self.media, audio_url).await;
        let silent = audio.is_none();

        // Work dir is removed on every path when the guard drops.
        let work_dir = tempfile::tempdir()?;
        let image_path = work_dir.path().join("input.jpg");
        let output_path = work_dir.path().join("output.mp4");
        tokio::fs::write(&image_path, &image.bytes).await?;

        let audio_path = work_dir.path().join("input.mp3");
        if let Some(audio) = &audio {
            tokio::fs::write(&audio_path, &audio.bytes).await?;
        }

        progress(60, if silent { "Creating video (no audio)..." } else { "Creating video..." });
        let args = build_encode_args(
            &image_path.to_string_lossy(),
            audio.as_ref().map(|_| audio_path.to_string_lossy().to_string()).as_deref(),
            duration_seconds,
            &output_path.to_string_lossy(),
        );

        let output = Command::new(&self.config.ffmpeg_path).args(&args).output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr
                .lines()
                .rev()
                .take(8)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n");
            return Err(VideoError::Encode(tail));
        }

        progress(90, "Finalizing...");
        let bytes = tokio::fs::read(&output_path).await?;

        progress(100, "Complete!");
        info!("✅ Assembled {}s video ({} bytes, silent={})", duration_seconds, bytes.len(), silent);
        Ok(AssembledVideo {
            bytes: bytes.into(),
            mime_type: "video/mp4".to_string(),
            duration_seconds,
            silent,
        })
    }
}

/// Audio is best-effort: a cross-origin or network failure downgrades the
/// clip to silent instead of failing the pipeline.
pub async fn fetch_audio(media: &MediaFetcher, audio_url: Option<&str>) -> Option<ReferenceImage> {
    let url = audio_url.filter(|u| !u.is_empty())?;
    match media.fetch(url).await {
        Ok(audio) => Some(audio),
        Err(e) => {
            warn!("Could not fetch audio, creating video without sound: {e}");
            None
        }
    }
}

fn build_encode_args(
    image_path: &str,
    audio_path: Option<&str>,
    duration_seconds: u32,
    output_path: &str,
) -> Vec<String> {
    let mut args: Vec<String> = vec!["-y".into(), "-loop".into(), "1".into(), "-i".into(), image_path.into()];

    if let Some(audio) = audio_path {
        args.extend(["-i".into(), audio.into()]);
    }

    args.extend(["-c:v".into(), "libx264".into()]);

    if audio_path.is_some() {
        args.extend(["-c:a".into(), "aac".into(), "-b:a".into(), AUDIO_BITRATE.into()]);
    }

    args.extend([
        "-t".into(),
        duration_seconds.to_string(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-vf".into(),
        SCALE_PAD_FILTER.into(),
        "-r".into(),
        FRAME_RATE.into(),
    ]);

    if audio_path.is_some() {
        args.push("-shortest".into());
    }

    args.push(output_path.into());
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn silent_encode_has_no_audio_arguments() {
        let args = build_encode_args("in.jpg", None, 15, "out.mp4");
        assert!(!args.contains(&"-c:a".to_string()));
        assert!(!args.contains(&"-shortest".to_string()));
        assert_eq!(args.iter().filter(|a| *a == "-i").count(), 1);

        let t = args.iter().position(|a| a == "-t").unwrap();
        assert_eq!(args[t + 1], "15");
        assert!(args.contains(&SCALE_PAD_FILTER.to_string()));
        assert_eq!(args.last().unwrap(), "out.mp4");
    }

    #[test]
    fn audio_encode_muxes_both_inputs() {
        let args = build_encode_args("in.jpg", Some("in.mp3"), 30, "out.mp4");
        assert_eq!(args.iter().filter(|a| *a == "-i").count(), 2);
        assert!(args.contains(&"aac".to_string()));
        assert!(args.contains(&AUDIO_BITRATE.to_string()));
        assert!(args.contains(&"-shortest".to_string()));

        // Image input comes first so -loop applies to it.
        let first_input = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[first_input + 1], "in.jpg");
    }

    #[tokio::test]
    async fn unreachable_audio_degrades_to_silent() {
        let media = MediaFetcher::new();
        assert!(fetch_audio(&media, Some("data:audio/mpeg,broken")).await.is_none());
        assert!(fetch_audio(&media, None).await.is_none());
        assert!(fetch_audio(&media, Some("")).await.is_none());
    }

    #[tokio::test]
    async fn embedded_audio_is_used_when_readable() {
        let media = MediaFetcher::new();
        let audio = fetch_audio(&media, Some("data:audio/mpeg;base64,QUJDRA==")).await.unwrap();
        assert_eq!(audio.mime_type, "audio/mpeg");
        assert_eq!(&audio.bytes[..], b"ABCD");
    }
}
