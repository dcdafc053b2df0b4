//! Command-line configuration for the scanner.
//!
//! `ScannerArgs` is what clap parses (flags with environment fallbacks);
//! `ScannerConfig` is the validated form every component is built from.

use std::{path::PathBuf, time::Duration};

use anyhow::{Result, bail};
use clap::Parser;
use video_ingest::{CameraSettings, ReconnectPolicy};

use crate::scanner::data::GuidingRegion;

/// Camera barcode scanner with product lookup and a live MJPEG preview.
#[derive(Debug, Parser)]
#[command(name = "barcode-scanner", version, about)]
pub(crate) struct ScannerArgs {
    /// Camera index tried first.
    #[arg(long, env = "SCANNER_CAMERA_INDEX", default_value_t = 1)]
    pub(crate) camera_index: i32,
    /// Camera index tried when the preferred one cannot be opened.
    #[arg(long, env = "SCANNER_FALLBACK_INDEX", default_value_t = 0)]
    pub(crate) fallback_index: i32,
    /// Requested capture width in pixels.
    #[arg(long, env = "SCANNER_WIDTH", default_value_t = 640)]
    pub(crate) width: i32,
    /// Requested capture height in pixels.
    #[arg(long, env = "SCANNER_HEIGHT", default_value_t = 480)]
    pub(crate) height: i32,
    /// Product lookup endpoint, queried as `<URL>?barcode=<code>`.
    #[arg(
        long,
        env = "SCANNER_LOOKUP_URL",
        default_value = "http://localhost:8080/product",
        value_name = "URL"
    )]
    pub(crate) lookup_url: String,
    /// Product lookup timeout.
    #[arg(long, env = "SCANNER_LOOKUP_TIMEOUT_MS", default_value_t = 5000)]
    pub(crate) lookup_timeout_ms: u64,
    /// Pause after a new code is detected before decoding again.
    #[arg(long, env = "SCANNER_SCAN_INTERVAL_MS", default_value_t = 2000)]
    pub(crate) scan_interval_ms: u64,
    /// Sleep between capture iterations.
    #[arg(long, env = "SCANNER_IDLE_INTERVAL_MS", default_value_t = 30)]
    pub(crate) idle_interval_ms: u64,
    /// Delay between releasing a failed camera and reopening it.
    #[arg(long, env = "SCANNER_RECONNECT_DELAY_MS", default_value_t = 1000)]
    pub(crate) reconnect_delay_ms: u64,
    /// Back-off after a failed reopen attempt.
    #[arg(long, env = "SCANNER_RECONNECT_BACKOFF_MS", default_value_t = 5000)]
    pub(crate) reconnect_backoff_ms: u64,
    /// Guiding region where decoding is attempted.
    #[arg(
        long,
        env = "SCANNER_GUIDE",
        default_value = "100,100,540,380",
        value_name = "LEFT,TOP,RIGHT,BOTTOM",
        value_parser = parse_guide
    )]
    pub(crate) guide: GuidingRegion,
    /// JPEG quality of the preview stream (1-100).
    #[arg(long, env = "SCANNER_JPEG_QUALITY", default_value_t = 85)]
    pub(crate) jpeg_quality: u8,
    /// Address the HTTP server binds to.
    #[arg(long, env = "SCANNER_HOST", default_value = "0.0.0.0")]
    pub(crate) host: String,
    /// Port the HTTP server binds to.
    #[arg(long, env = "SCANNER_PORT", default_value_t = 5001)]
    pub(crate) port: u16,
    /// Emit Chrome trace JSON for post-mortem analysis.
    #[arg(long = "chrome-trace", value_name = "PATH")]
    pub(crate) chrome_trace: Option<PathBuf>,
    /// Enable debug logging.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub(crate) verbose: bool,
}

/// Optional tracing knobs.
#[derive(Clone, Debug, Default)]
pub(crate) struct TelemetryOptions {
    pub(crate) chrome_trace_path: Option<PathBuf>,
    pub(crate) verbose: bool,
}

/// Validated scanner configuration.
#[derive(Clone, Debug)]
pub(crate) struct ScannerConfig {
    pub(crate) camera: CameraSettings,
    pub(crate) reconnect: ReconnectPolicy,
    pub(crate) lookup_url: String,
    pub(crate) lookup_timeout: Duration,
    pub(crate) scan_interval: Duration,
    pub(crate) idle_interval: Duration,
    pub(crate) guide: GuidingRegion,
    pub(crate) jpeg_quality: u8,
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) telemetry: TelemetryOptions,
}

impl TryFrom<ScannerArgs> for ScannerConfig {
    type Error = anyhow::Error;

    fn try_from(args: ScannerArgs) -> Result<Self> {
        if args.width <= 0 || args.height <= 0 {
            bail!("Capture width and height must be positive integers");
        }
        if args.camera_index < 0 || args.fallback_index < 0 {
            bail!("Camera indices must not be negative");
        }

        let guide = args.guide;
        if guide.right > args.width as u32 || guide.bottom > args.height as u32 {
            bail!(
                "--guide {},{},{},{} does not fit inside a {}x{} frame",
                guide.left,
                guide.top,
                guide.right,
                guide.bottom,
                args.width,
                args.height
            );
        }

        if !(1..=100).contains(&args.jpeg_quality) {
            bail!("--jpeg-quality must be an integer between 1 and 100");
        }

        for (flag, value) in [
            ("--lookup-timeout-ms", args.lookup_timeout_ms),
            ("--scan-interval-ms", args.scan_interval_ms),
            ("--idle-interval-ms", args.idle_interval_ms),
            ("--reconnect-delay-ms", args.reconnect_delay_ms),
            ("--reconnect-backoff-ms", args.reconnect_backoff_ms),
        ] {
            if value == 0 {
                bail!("{flag} must be at least 1");
            }
        }

        if args.lookup_url.trim().is_empty() {
            bail!("--lookup-url must not be empty");
        }

        Ok(Self {
            camera: CameraSettings {
                preferred_index: args.camera_index,
                fallback_index: args.fallback_index,
                size: (args.width, args.height),
            },
            reconnect: ReconnectPolicy {
                retry_delay: Duration::from_millis(args.reconnect_delay_ms),
                backoff_delay: Duration::from_millis(args.reconnect_backoff_ms),
            },
            lookup_url: args.lookup_url,
            lookup_timeout: Duration::from_millis(args.lookup_timeout_ms),
            scan_interval: Duration::from_millis(args.scan_interval_ms),
            idle_interval: Duration::from_millis(args.idle_interval_ms),
            guide,
            jpeg_quality: args.jpeg_quality,
            host: args.host,
            port: args.port,
            telemetry: TelemetryOptions {
                chrome_trace_path: args.chrome_trace,
                verbose: args.verbose,
            },
        })
    }
}

fn parse_guide(raw: &str) -> Result<GuidingRegion, String> {
    let parts = raw
        .split(',')
        .map(|part| part.trim().parse::<u32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| format!("expected four non-negative integers: {err}"))?;
    let [left, top, right, bottom] = parts[..] else {
        return Err(format!("expected LEFT,TOP,RIGHT,BOTTOM, got {} value(s)", parts.len()));
    };
    if right <= left || bottom <= top {
        return Err("right must exceed left and bottom must exceed top".to_string());
    }
    Ok(GuidingRegion {
        left,
        top,
        right,
        bottom,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Result<ScannerConfig> {
        let mut argv = vec!["barcode-scanner"];
        argv.extend_from_slice(extra);
        let args = ScannerArgs::try_parse_from(argv)?;
        ScannerConfig::try_from(args)
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = parse(&[]).unwrap();

        assert_eq!(config.camera.preferred_index, 1);
        assert_eq!(config.camera.fallback_index, 0);
        assert_eq!(config.camera.size, (640, 480));
        assert_eq!(config.lookup_url, "http://localhost:8080/product");
        assert_eq!(config.lookup_timeout, Duration::from_secs(5));
        assert_eq!(config.scan_interval, Duration::from_secs(2));
        assert_eq!(config.idle_interval, Duration::from_millis(30));
        assert_eq!(config.reconnect.retry_delay, Duration::from_secs(1));
        assert_eq!(config.reconnect.backoff_delay, Duration::from_secs(5));
        assert_eq!(config.guide, GuidingRegion::default());
        assert_eq!(config.jpeg_quality, 85);
        assert_eq!((config.host.as_str(), config.port), ("0.0.0.0", 5001));
        assert!(config.telemetry.chrome_trace_path.is_none());
    }

    #[test]
    fn flags_override_defaults() {
        let config = parse(&[
            "--camera-index",
            "2",
            "--guide",
            "10, 20, 300, 200",
            "--port",
            "8081",
            "--verbose",
        ])
        .unwrap();

        assert_eq!(config.camera.preferred_index, 2);
        assert_eq!(
            config.guide,
            GuidingRegion {
                left: 10,
                top: 20,
                right: 300,
                bottom: 200
            }
        );
        assert_eq!(config.port, 8081);
        assert!(config.telemetry.verbose);
    }

    #[test]
    fn guide_must_be_well_formed() {
        assert!(parse(&["--guide", "1,2,3"]).is_err());
        assert!(parse(&["--guide", "100,100,50,380"]).is_err());
        assert!(parse(&["--guide", "a,b,c,d"]).is_err());
    }

    #[test]
    fn guide_must_fit_the_frame() {
        let err = parse(&["--width", "320", "--height", "240"]).unwrap_err();
        assert!(err.to_string().contains("does not fit"));
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(parse(&["--jpeg-quality", "0"]).is_err());
        assert!(parse(&["--jpeg-quality", "101"]).is_err());
        assert!(parse(&["--scan-interval-ms", "0"]).is_err());
        assert!(parse(&["--width", "0"]).is_err());
    }
}
