/*!
 * Filter-graph and overlay-script helpers.
 *
 * Pure functions only; every stage builds its ffmpeg filter strings here so
 * they can be tested without running ffmpeg.
 */

use std::path::Path;

use crate::models::Resolution;

/// Escape a path for use inside a filter argument (`subtitles=`, `textfile=`)
pub fn escape_filter_path(path: &Path) -> String {
    let normalized = path.to_string_lossy().replace('\\', "/");
    let mut escaped = String::with_capacity(normalized.len() + 12);
    for ch in normalized.chars() {
        match ch {
            ':' => escaped.push_str("\\:"),
            '\'' => escaped.push_str("\\'"),
            ',' => escaped.push_str("\\,"),
            ';' => escaped.push_str("\\;"),
            '[' => escaped.push_str("\\["),
            ']' => escaped.push_str("\\]"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// `H:MM:SS.cc` as used by ASS events
pub fn ass_timestamp(seconds: f64) -> String {
    let clamped = seconds.max(0.0);
    let total_cs = (clamped * 100.0).round() as u64;
    let cs = total_cs % 100;
    let total_secs = total_cs / 100;
    let secs = total_secs % 60;
    let total_mins = total_secs / 60;
    let mins = total_mins % 60;
    let hours = total_mins / 60;
    format!("{hours}:{mins:02}:{secs:02}.{cs:02}")
}

/// `RRGGBB` to ASS `&H00BBGGRR`
pub fn ass_color(rgb: &str) -> String {
    let channel = |i: usize| u8::from_str_radix(rgb.get(i..i + 2).unwrap_or("FF"), 16).unwrap_or(255);
    format!("&H00{:02X}{:02X}{:02X}", channel(4), channel(2), channel(0))
}

/// `RRGGBB` to ffmpeg's `0xRRGGBB`
pub fn ffmpeg_color(rgb: &str) -> String {
    format!("0x{}", rgb.to_uppercase())
}

fn even(value: f64) -> u32 {
    let rounded = value.round() as u32;
    (rounded + rounded % 2).max(2)
}

/// How a source frame is placed into a band without stretching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandFit {
    /// Size the source is scaled to (aspect ratio preserved)
    pub scaled: Resolution,
    /// Horizontal offset of a centre crop when the scaled frame is too wide
    pub crop_x: Option<u32>,
    /// Horizontal offset of a centring pad when it is too narrow
    pub pad_x: Option<u32>,
    /// The band itself
    pub band: Resolution,
}

/// Scale a `source` frame to the band height; centre-crop horizontal
/// overflow, pad horizontal underflow. Never stretches.
pub fn fit_to_band(source: Resolution, band: Resolution) -> BandFit {
    let scale = band.height as f64 / source.height.max(1) as f64;
    let scaled = Resolution::new(even(source.width as f64 * scale), band.height);

    let (crop_x, pad_x) = if scaled.width > band.width {
        (Some((scaled.width - band.width) / 2), None)
    } else if scaled.width < band.width {
        (None, Some((band.width - scaled.width) / 2))
    } else {
        (None, None)
    };

    BandFit {
        scaled,
        crop_x,
        pad_x,
        band,
    }
}

impl BandFit {
    /// Filter chain implementing the fit
    pub fn filter(&self) -> String {
        let mut chain = format!("scale={}:{}", self.scaled.width, self.scaled.height);
        if let Some(x) = self.crop_x {
            chain.push_str(&format!(",crop={}:{}:{}:0", self.band.width, self.band.height, x));
        }
        if let Some(x) = self.pad_x {
            chain.push_str(&format!(
                ",pad={}:{}:{}:0:black",
                self.band.width, self.band.height, x
            ));
        }
        chain.push_str(",setsar=1");
        chain
    }
}

/// Fit inside a frame, keeping aspect ratio, with black bars
pub fn letterbox_filter(target: Resolution) -> String {
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:black,setsar=1",
        w = target.width,
        h = target.height
    )
}

/// Extend a video stream by holding its last frame for `secs`
pub fn hold_filter(secs: f64) -> Option<String> {
    (secs > 0.0005).then(|| format!("tpad=stop_mode=clone:stop_duration={:.3}", secs))
}

/// Per-segment normalisation plus `concat`, producing `[v]` and `[a]`.
/// Segment `i` takes video from input `i` and audio from input
/// `audio_inputs[i]` (a silent source stands in for clips without audio).
pub fn concat_filter_graph(audio_inputs: &[usize], target: Resolution, fps: u32, sample_rate: u32) -> String {
    let inputs = audio_inputs.len();
    let mut graph = String::new();
    for (i, audio) in audio_inputs.iter().enumerate() {
        graph.push_str(&format!(
            "[{i}:v:0]{},fps={fps},format=yuv420p,setpts=PTS-STARTPTS[v{i}];",
            letterbox_filter(target)
        ));
        graph.push_str(&format!(
            "[{audio}:a:0]aresample={sample_rate},aformat=sample_fmts=fltp:channel_layouts=stereo,asetpts=PTS-STARTPTS[a{i}];"
        ));
    }
    for i in 0..inputs {
        graph.push_str(&format!("[v{i}][a{i}]"));
    }
    graph.push_str(&format!("concat=n={inputs}:v=1:a=1[v][a]"));
    graph
}

/// Duplicate one input `n` times through `split`/`asplit` and `concat`,
/// producing `[v]` and optionally `[a]`
pub fn repeat_filter_graph(n: u32, has_audio: bool) -> String {
    let n = n.max(1);
    let mut graph = String::new();
    graph.push_str("[0:v:0]setpts=PTS-STARTPTS,");
    graph.push_str(&format!("split={n}"));
    for i in 0..n {
        graph.push_str(&format!("[v{i}]"));
    }
    graph.push(';');
    if has_audio {
        graph.push_str("[0:a:0]asetpts=PTS-STARTPTS,");
        graph.push_str(&format!("asplit={n}"));
        for i in 0..n {
            graph.push_str(&format!("[a{i}]"));
        }
        graph.push(';');
    }
    for i in 0..n {
        graph.push_str(&format!("[v{i}]"));
        if has_audio {
            graph.push_str(&format!("[a{i}]"));
        }
    }
    let audio_streams = if has_audio { 1 } else { 0 };
    graph.push_str(&format!("concat=n={n}:v=1:a={audio_streams}[v]"));
    if has_audio {
        graph.push_str("[a]");
    }
    graph
}

/// Concat demuxer playlist; `'` in paths is escaped the way the demuxer
/// expects
pub fn concat_playlist<'a, I>(paths: I) -> String
where
    I: IntoIterator<Item = &'a Path>,
{
    paths
        .into_iter()
        .map(|p| format!("file '{}'\n", p.to_string_lossy().replace('\'', "'\\''")))
        .collect()
}
